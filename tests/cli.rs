use std::fs;
use std::path::Path;
use std::process::{Command, Output};
use tempfile::TempDir;

const ROWS: usize = 20;
const COLS: usize = 16;

/// Write an uncompressed single-chunk `<f8` array
fn write_array(
    root: &Path,
    name: &str,
    value: impl Fn(usize, usize) -> f64,
) -> std::io::Result<()> {
    let dir = root.join(name);
    fs::create_dir_all(&dir)?;

    let zarray = format!(
        r#"{{
        "zarr_format": 2,
        "shape": [{rows}, {cols}],
        "chunks": [{rows}, {cols}],
        "dtype": "<f8",
        "compressor": null,
        "fill_value": "NaN",
        "order": "C",
        "filters": null
    }}"#,
        rows = ROWS,
        cols = COLS
    );
    fs::write(dir.join(".zarray"), zarray)?;
    fs::write(dir.join(".zattrs"), r#"{"units": "m s-1", "_ARRAY_DIMENSIONS": ["rows", "cols"]}"#)?;

    let mut bytes = Vec::with_capacity(ROWS * COLS * 8);
    for r in 0..ROWS {
        for c in 0..COLS {
            bytes.extend_from_slice(&value(r, c).to_le_bytes());
        }
    }
    fs::write(dir.join("0.0"), bytes)
}

/// Helper function to create a 20x16 geolocated raster store for testing
fn create_sample_store(temp_dir: &Path, variable: &str) -> std::io::Result<()> {
    fs::write(temp_dir.join(".zgroup"), r#"{"zarr_format": 2}"#)?;

    let zattrs_content = r#"{
        "start_datetime": "2024-03-01T12:00:00Z",
        "source_name": "abi",
        "platform_name": "goes-16"
    }"#;
    fs::write(temp_dir.join(".zattrs"), zattrs_content)?;

    write_array(temp_dir, variable, |r, c| (r * COLS + c) as f64)?;
    write_array(temp_dir, "latitude", |r, _| 40.0 - r as f64 * 0.5)?;
    write_array(temp_dir, "longitude", |_, c| -100.0 + c as f64 * 0.5)?;
    Ok(())
}

fn run_tiler(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_awips-tiler"))
        .args(args)
        .arg("--no-color")
        .output()
        .expect("Failed to execute awips-tiler")
}

fn file_names(stdout: &[u8]) -> Vec<String> {
    String::from_utf8_lossy(stdout)
        .lines()
        .map(|line| {
            Path::new(line)
                .file_name()
                .unwrap()
                .to_string_lossy()
                .into_owned()
        })
        .collect()
}

#[test]
fn test_cli_writes_tiles() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let store = temp_dir.path().join("store");
    let out = temp_dir.path().join("tiles");
    fs::create_dir_all(&store).unwrap();
    create_sample_store(&store, "winds").expect("Failed to create sample store");

    let output = run_tiler(&[
        store.to_str().unwrap(),
        "--variable",
        "winds",
        "--output-dir",
        out.to_str().unwrap(),
        "--nrows",
        "2",
        "--ncols",
        "2",
    ]);

    assert!(
        output.status.success(),
        "Command failed with status: {:?}\nStderr: {}",
        output.status,
        String::from_utf8_lossy(&output.stderr)
    );

    let names = file_names(&output.stdout);
    assert_eq!(names.len(), 4);
    for (i, name) in names.iter().enumerate() {
        let expected_head = format!("OR_ABI-WINDS-T{:03}_EFD_s2024061120000_c", i + 1);
        assert!(name.starts_with(&expected_head), "Unexpected name: {}", name);
        assert!(name.ends_with(".zarr"), "Missing extension: {}", name);
        assert!(out.join(name).join(".zgroup").is_file());
    }

    // Tile 2 is the top-right quadrant
    let tile = out.join(&names[1]);
    let zattrs: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(tile.join(".zattrs")).unwrap()).unwrap();
    assert_eq!(zattrs["tile_row_offset"], 0);
    assert_eq!(zattrs["tile_column_offset"], 8);
    assert_eq!(zattrs["start_date_time"], "20240301_1200");
    assert_eq!(zattrs["tile_center_latitude"], 37.75);
    assert_eq!(zattrs["tile_center_longitude"], -94.25);

    let chunk = fs::read(tile.join("winds").join("0.0")).unwrap();
    assert_eq!(chunk.len(), 10 * 8 * 8);
    assert_eq!(&chunk[..8], &8.0f64.to_le_bytes());

    let var_attrs = fs::read_to_string(tile.join("winds").join(".zattrs")).unwrap();
    assert!(var_attrs.contains("m s-1"));
}

#[test]
fn test_cli_default_grid() {
    let temp_dir = TempDir::new().unwrap();
    let store = temp_dir.path().join("store");
    let out = temp_dir.path().join("tiles");
    fs::create_dir_all(&store).unwrap();
    create_sample_store(&store, "winds").unwrap();

    let output = run_tiler(&[
        store.to_str().unwrap(),
        "-v",
        "winds",
        "-o",
        out.to_str().unwrap(),
    ]);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let names = file_names(&output.stdout);
    assert_eq!(names.len(), 80);
    assert!(names[79].contains("-T080_"));
    assert_eq!(fs::read_dir(&out).unwrap().count(), 80);
}

#[test]
fn test_cli_composite_color_names() {
    let temp_dir = TempDir::new().unwrap();
    let store = temp_dir.path().join("store");
    let out = temp_dir.path().join("tiles");
    fs::create_dir_all(&store).unwrap();
    create_sample_store(&store, "geocolor_g").unwrap();

    let output = run_tiler(&[
        store.to_str().unwrap(),
        "--variable",
        "geocolor_g",
        "--output-dir",
        out.to_str().unwrap(),
        "--nrows",
        "1",
        "--ncols",
        "2",
        "--extension",
        "",
    ]);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    assert_eq!(
        file_names(&output.stdout),
        vec![
            "RAMMB_A2ECFG_GEOC_G_20240301_1200_T001",
            "RAMMB_A2ECFG_GEOC_G_20240301_1200_T002"
        ]
    );
}

#[test]
fn test_cli_dry_run_writes_nothing() {
    let temp_dir = TempDir::new().unwrap();
    let store = temp_dir.path().join("store");
    let out = temp_dir.path().join("tiles");
    fs::create_dir_all(&store).unwrap();
    create_sample_store(&store, "geocolor_b").unwrap();

    let output = run_tiler(&[
        store.to_str().unwrap(),
        "--variable",
        "geocolor_b",
        "--output-dir",
        out.to_str().unwrap(),
        "--nrows",
        "2",
        "--ncols",
        "2",
        "--dry-run",
    ]);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let names = file_names(&output.stdout);
    assert_eq!(names.len(), 4);
    assert_eq!(names[3], "RAMMB_A2ECFG_GEOC_B_20240301_1200_T004.zarr");
    assert!(!out.exists());
}

#[test]
fn test_cli_name_subcommand() {
    let temp_dir = TempDir::new().unwrap();
    create_sample_store(temp_dir.path(), "winds").unwrap();

    let output = run_tiler(&[
        "name",
        temp_dir.path().to_str().unwrap(),
        "--variable",
        "winds",
        "--product",
        "Surface-Winds",
        "--platform",
        "goes-17",
    ]);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let stdout = String::from_utf8_lossy(&output.stdout);
    let name = stdout.trim();
    assert!(
        name.starts_with("OR_ABI-SURFACE-WINDS-T{tilenum}_WFD_s2024061120000_c"),
        "Unexpected template: {}",
        name
    );
    assert!(name.ends_with(".zarr"));
}

#[test]
fn test_cli_degenerate_grid() {
    let temp_dir = TempDir::new().unwrap();
    create_sample_store(temp_dir.path(), "winds").unwrap();
    let out = temp_dir.path().join("tiles");

    let output = run_tiler(&[
        temp_dir.path().to_str().unwrap(),
        "--variable",
        "winds",
        "--output-dir",
        out.to_str().unwrap(),
        "--nrows",
        "40",
    ]);

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("Cannot split row extent of 20 pixels into 40 tiles"),
        "Unexpected stderr: {}",
        stderr
    );
    assert!(!out.exists());
}

#[test]
fn test_cli_strict_lookup_rejects_unknown_platform() {
    let temp_dir = TempDir::new().unwrap();
    create_sample_store(temp_dir.path(), "winds").unwrap();

    let output = run_tiler(&[
        temp_dir.path().to_str().unwrap(),
        "--variable",
        "winds",
        "--platform",
        "goes-19",
        "--strict-lookup",
        "--dry-run",
    ]);

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("No platform code for 'goes-19'"), "{}", stderr);
}

#[test]
fn test_cli_unknown_platform_falls_back() {
    let temp_dir = TempDir::new().unwrap();
    create_sample_store(temp_dir.path(), "winds").unwrap();

    let output = run_tiler(&[
        "name",
        temp_dir.path().to_str().unwrap(),
        "--variable",
        "winds",
        "--platform",
        "goes-19",
    ]);
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("_UNK_s2024061120000_"));
}

#[test]
fn test_cli_start_override_and_missing_start() {
    let temp_dir = TempDir::new().unwrap();
    create_sample_store(temp_dir.path(), "winds").unwrap();
    fs::write(
        temp_dir.path().join(".zattrs"),
        r#"{"source_name": "abi", "platform_name": "goes-16"}"#,
    )
    .unwrap();

    let output = run_tiler(&["name", temp_dir.path().to_str().unwrap(), "--variable", "winds"]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("--start"));

    let output = run_tiler(&[
        "name",
        temp_dir.path().to_str().unwrap(),
        "--variable",
        "winds",
        "--start",
        "2024-12-31 23:59:30",
    ]);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    assert!(String::from_utf8_lossy(&output.stdout).contains("_s2024366235930_"));
}

#[test]
fn test_cli_config_file() {
    let temp_dir = TempDir::new().unwrap();
    let store = temp_dir.path().join("store");
    fs::create_dir_all(&store).unwrap();
    create_sample_store(&store, "winds").unwrap();

    let config = temp_dir.path().join("tiler.json");
    fs::write(&config, r#"{"grid": {"nrows": 5, "ncols": 4}, "extension": ".nc"}"#).unwrap();

    let output = run_tiler(&[
        store.to_str().unwrap(),
        "--variable",
        "winds",
        "--config",
        config.to_str().unwrap(),
        "--dry-run",
    ]);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let names = file_names(&output.stdout);
    assert_eq!(names.len(), 20);
    assert!(names.iter().all(|n| n.ends_with(".nc")));
}

#[test]
fn test_cli_missing_variable() {
    let temp_dir = TempDir::new().unwrap();
    create_sample_store(temp_dir.path(), "winds").unwrap();

    let output = run_tiler(&[
        temp_dir.path().to_str().unwrap(),
        "--variable",
        "precip",
        "--dry-run",
    ]);

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Variable 'precip' not found"), "{}", stderr);
}

#[test]
fn test_cli_nonexistent_path() {
    let output = run_tiler(&["/nonexistent/path/to/store", "--variable", "winds"]);

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Path does not exist"), "{}", stderr);
}

#[test]
fn test_cli_name_with_product_only() {
    let temp_dir = TempDir::new().unwrap();
    create_sample_store(temp_dir.path(), "winds").unwrap();

    let output = run_tiler(&[
        "name",
        temp_dir.path().to_str().unwrap(),
        "--product",
        "geocolor_r",
    ]);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    assert_eq!(
        String::from_utf8_lossy(&output.stdout).trim(),
        "RAMMB_A2ECFG_GEOC_R_20240301_1200_T{tilenum}.zarr"
    );
}

#[test]
fn test_cli_grid_over_tile_limit_fails_before_tiling() {
    let temp_dir = TempDir::new().unwrap();
    create_sample_store(temp_dir.path(), "winds").unwrap();
    let out = temp_dir.path().join("tiles");

    let output = run_tiler(&[
        temp_dir.path().to_str().unwrap(),
        "--variable",
        "winds",
        "--output-dir",
        out.to_str().unwrap(),
        "--nrows",
        "40",
        "--ncols",
        "25",
    ]);

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("more than the 999-tile limit"), "{}", stderr);
    assert!(!stderr.contains("Loaded raster"), "{}", stderr);
    assert!(!out.exists());
}
