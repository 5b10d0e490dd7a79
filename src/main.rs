use anyhow::{Context, anyhow, bail};
use awips_tiler::metadata::StoreMetadata;
use awips_tiler::raster::parse_datetime;
use awips_tiler::{
    LookupPolicy, NamingContext, NamingConvention, Partitioner, RasterRequest, TileWriter,
    TilerConfig, ZarrStore, ZarrTileSink, assemble_template,
};
use chrono::Utc;
use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use std::path::PathBuf;
use std::process;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Subcommand)]
enum Command {
    /// Print the base tile file name (with the unresolved tile token) and exit
    Name {
        /// Path to the Zarr store root directory
        path: PathBuf,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum ConventionArg {
    /// Composite-color naming for GeoColor products, standard otherwise
    Auto,
    Standard,
    CompositeColor,
}

#[derive(Parser)]
#[command(name = "awips-tiler")]
#[command(version)]
#[command(about = "Split a geolocated satellite raster into AWIPS tiles")]
#[command(arg_required_else_help = true)]
#[command(subcommand_precedence_over_arg = true)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// Path to the Zarr store root directory
    path: Option<PathBuf>,

    /// Variable to tile
    #[arg(short, long, value_name = "VAR", global = true)]
    variable: Option<String>,

    /// Directory receiving the tiles
    #[arg(short, long, value_name = "DIR", default_value = ".")]
    output_dir: PathBuf,

    /// JSON configuration file
    #[arg(long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Number of tile rows
    #[arg(long, global = true)]
    nrows: Option<usize>,

    /// Number of tile columns
    #[arg(long, global = true)]
    ncols: Option<usize>,

    /// Product name used in file names (defaults to the variable name)
    #[arg(long, global = true)]
    product: Option<String>,

    /// Sensor name (defaults to the store's `source_name` attribute)
    #[arg(long, global = true)]
    source: Option<String>,

    /// Platform name (defaults to the store's `platform_name` attribute)
    #[arg(long, global = true)]
    platform: Option<String>,

    /// Acquisition start time (defaults to the store's `start_datetime` attribute)
    #[arg(long, value_name = "DATETIME", global = true)]
    start: Option<String>,

    /// File naming convention
    #[arg(long, value_enum, default_value = "auto", global = true)]
    convention: ConventionArg,

    /// Suffix appended to every tile name, e.g. `.nc` (empty for none)
    #[arg(long, global = true)]
    extension: Option<String>,

    /// Fail instead of substituting fallback codes for unknown names
    #[arg(long, global = true)]
    strict_lookup: bool,

    /// Print the tile paths without writing anything
    #[arg(long)]
    dry_run: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,

    /// Log filter used when RUST_LOG is unset
    #[arg(long, default_value = "info", global = true)]
    log_level: String,
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("{} {}", "Error:".red().bold(), e);

        // Print the error chain for better context
        for cause in e.chain().skip(1) {
            eprintln!("  Caused by: {}", cause);
        }

        process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    let args = Args::parse();

    if args.no_color {
        colored::control::set_override(false);
    }
    init_logging(&args.log_level, !args.no_color);

    let (path, name_only) = match &args.command {
        Some(Command::Name { path }) => (path.clone(), true),
        None => (
            args.path
                .clone()
                .ok_or_else(|| anyhow!("Missing Zarr store path"))?,
            false,
        ),
    };

    // `name` only needs a product name; tiling needs the variable to read.
    let variable = args.variable.clone();
    if variable.is_none() && !name_only {
        bail!("--variable is required");
    }
    let product_name = args
        .product
        .clone()
        .or_else(|| variable.clone())
        .ok_or_else(|| anyhow!("--product or --variable is required to name tiles"))?;

    let config = load_config(&args)?;
    let partitioner = Partitioner::new(config.partition_options())?;

    let store = ZarrStore::new(&path)?;
    let metadata = store
        .load_metadata()
        .await
        .with_context(|| format!("Failed to load Zarr store from '{}'", path.display()))?;

    let start_override = args
        .start
        .as_deref()
        .map(parse_datetime)
        .transpose()
        .context("Invalid --start value")?;
    let start_datetime = store.start_datetime(&metadata, start_override)?;

    let convention = match args.convention {
        ConventionArg::Auto => NamingConvention::for_product(&product_name),
        ConventionArg::Standard => NamingConvention::Standard,
        ConventionArg::CompositeColor => NamingConvention::CompositeColor,
    };

    let naming = NamingContext {
        source_name: name_attribute(
            &metadata,
            args.source.as_deref(),
            "source_name",
            "--source",
        )?,
        platform_name: name_attribute(
            &metadata,
            args.platform.as_deref(),
            "platform_name",
            "--platform",
        )?,
        product_name,
        start_datetime,
        creation_datetime: Utc::now(),
        extension: config.extension.clone(),
        convention,
    };
    let template = assemble_template(&naming, &config.code_tables())?;

    if name_only {
        println!("{}", template);
        return Ok(());
    }

    let variable = variable.ok_or_else(|| anyhow!("--variable is required"))?;
    let writer = TileWriter::new(&[template], &args.output_dir)?;
    let options = partitioner.options();

    let request = RasterRequest {
        variable: variable.clone(),
        latitude_name: options.latitude_name.clone(),
        longitude_name: options.longitude_name.clone(),
        start_datetime: Some(start_datetime),
    };
    let dataset = store.load_raster(&metadata, &request).await?;
    let tiles = partitioner
        .partition(&dataset, &variable)
        .with_context(|| format!("Failed to partition variable '{}'", variable))?;

    if args.dry_run {
        for path in writer.planned_paths(tiles.len())? {
            println!("{}", path.display());
        }
        eprintln!(
            "{} {} tiles would be written to {}",
            "Dry run:".yellow().bold(),
            tiles.len(),
            writer.output_dir().display()
        );
        return Ok(());
    }

    let written = writer.write_all(&tiles, &mut ZarrTileSink)?;
    for path in &written {
        println!("{}", path.display());
    }

    info!(count = written.len(), variable = %variable, "Tiling complete");
    eprintln!(
        "{} {} tiles to {}",
        "Wrote".green().bold(),
        written.len(),
        writer.output_dir().display()
    );
    Ok(())
}

fn init_logging(level: &str, ansi: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(ansi)
        .init();
}

/// Config file (or defaults) with command-line overrides applied
fn load_config(args: &Args) -> anyhow::Result<TilerConfig> {
    let mut config = match &args.config {
        Some(path) => TilerConfig::load(path)?,
        None => TilerConfig::default(),
    };

    if let Some(nrows) = args.nrows {
        config.grid.nrows = nrows;
    }
    if let Some(ncols) = args.ncols {
        config.grid.ncols = ncols;
    }
    if args.strict_lookup {
        config.lookup_policy = LookupPolicy::Strict;
    }
    if let Some(ext) = &args.extension {
        config.extension = (!ext.is_empty()).then(|| ext.clone());
    }

    Ok(config)
}

/// A naming input from its flag, falling back to a store global attribute
fn name_attribute(
    metadata: &StoreMetadata,
    flag: Option<&str>,
    attribute: &str,
    flag_name: &str,
) -> anyhow::Result<String> {
    if let Some(value) = flag {
        return Ok(value.to_string());
    }

    metadata
        .global_attributes
        .get(attribute)
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .ok_or_else(|| {
            anyhow!(
                "Store has no '{}' global attribute; pass {} to set it.",
                attribute,
                flag_name
            )
        })
}
