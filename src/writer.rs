use crate::error::{Result, TilerError};
use crate::metadata::{AttributeValue, Attributes, ZArrayMetadata, ZGroupMetadata};
use crate::naming::{MAX_TILE_ORDINAL, resolve_tile_name, validate_template};
use crate::partition::Tile;
use byteorder::{LittleEndian, WriteBytesExt};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Storage backend receiving each tile at its resolved path.
pub trait TileSink {
    fn write_tile(&mut self, tile: &Tile, path: &Path) -> Result<()>;
}

/// Resolves the tile-index token per tile and writes tiles in ordinal order.
#[derive(Debug, Clone)]
pub struct TileWriter {
    template: String,
    output_dir: PathBuf,
}

impl TileWriter {
    /// Accepts exactly one template containing the tile-index token.
    pub fn new(templates: &[String], output_dir: impl Into<PathBuf>) -> Result<Self> {
        let [template] = templates else {
            return Err(TilerError::Config(format!(
                "Expected exactly one file name template, got {}",
                templates.len()
            )));
        };
        validate_template(template)?;

        Ok(Self {
            template: template.clone(),
            output_dir: output_dir.into(),
        })
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Destination of the tile with the given ordinal.
    pub fn tile_path(&self, ordinal: usize) -> Result<PathBuf> {
        Ok(self
            .output_dir
            .join(resolve_tile_name(&self.template, ordinal)?))
    }

    /// Destinations for tiles `1..=count` without touching the filesystem.
    pub fn planned_paths(&self, count: usize) -> Result<Vec<PathBuf>> {
        (1..=count).map(|ordinal| self.tile_path(ordinal)).collect()
    }

    /// Write every tile and return the written paths in tile-ordinal order.
    pub fn write_all<S: TileSink>(&self, tiles: &[Tile], sink: &mut S) -> Result<Vec<PathBuf>> {
        if tiles.len() > MAX_TILE_ORDINAL {
            return Err(TilerError::Config(format!(
                "{} tiles exceed the {}-tile limit of the 3-digit tile index",
                tiles.len(),
                MAX_TILE_ORDINAL
            )));
        }

        let mut ordered: Vec<&Tile> = tiles.iter().collect();
        ordered.sort_by_key(|t| t.ordinal);
        let paths = ordered
            .iter()
            .map(|t| self.tile_path(t.ordinal))
            .collect::<Result<Vec<_>>>()?;

        fs::create_dir_all(&self.output_dir)?;

        for (tile, path) in ordered.iter().zip(&paths) {
            sink.write_tile(tile, path)?;
            info!(ordinal = tile.ordinal, path = %path.display(), "Wrote tile");
        }

        Ok(paths)
    }
}

/// Writes each tile as an uncompressed Zarr v2 group: the product array
/// `(y, x)`, 1D `y`/`x` coordinate arrays, and a scalar
/// `fixedgrid_projection` carrying the grid mapping.
#[derive(Debug, Default)]
pub struct ZarrTileSink;

impl TileSink for ZarrTileSink {
    fn write_tile(&mut self, tile: &Tile, path: &Path) -> Result<()> {
        fs::create_dir_all(path)?;
        write_json(&path.join(".zgroup"), &ZGroupMetadata { zarr_format: 2 })?;
        write_json(&path.join(".zattrs"), &tile.attributes)?;

        let (rows, cols) = tile.data.dim();
        let mut var_attrs = tile.variable_attributes.clone();
        var_attrs.insert("_ARRAY_DIMENSIONS", dims(&["y", "x"]));
        write_f64_array(
            &path.join(&tile.variable),
            vec![rows as u64, cols as u64],
            tile.data.iter().copied(),
            &var_attrs,
            "0.0",
        )?;

        let axes = [("y", "latitude", &tile.coords.y), ("x", "longitude", &tile.coords.x)];
        for (name, long_name, values) in axes {
            let mut attrs = Attributes::new();
            attrs.insert("long_name", long_name);
            attrs.insert("_ARRAY_DIMENSIONS", dims(&[name]));
            write_f64_array(
                &path.join(name),
                vec![values.len() as u64],
                values.iter().copied(),
                &attrs,
                "0",
            )?;
        }

        let proj_dir = path.join("fixedgrid_projection");
        fs::create_dir_all(&proj_dir)?;
        let mut proj_attrs = tile.projection.clone();
        proj_attrs.insert("_ARRAY_DIMENSIONS", dims(&[]));
        write_json(
            &proj_dir.join(".zarray"),
            &ZArrayMetadata::single_chunk(vec![], "<i4", serde_json::json!(0)),
        )?;
        write_json(&proj_dir.join(".zattrs"), &proj_attrs)?;
        let mut scalar = Vec::with_capacity(4);
        scalar.write_i32::<LittleEndian>(0)?;
        fs::write(proj_dir.join("0"), scalar)?;

        debug!(path = %path.display(), rows, cols, "Wrote Zarr tile group");
        Ok(())
    }
}

fn dims(names: &[&str]) -> AttributeValue {
    AttributeValue::Array(names.iter().map(|&n| AttributeValue::from(n)).collect())
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    fs::write(path, serde_json::to_vec_pretty(value)?)?;
    Ok(())
}

fn write_f64_array(
    dir: &Path,
    shape: Vec<u64>,
    values: impl Iterator<Item = f64>,
    attrs: &Attributes,
    chunk_key: &str,
) -> Result<()> {
    fs::create_dir_all(dir)?;
    write_json(
        &dir.join(".zarray"),
        &ZArrayMetadata::single_chunk(shape, "<f8", serde_json::json!("NaN")),
    )?;
    write_json(&dir.join(".zattrs"), attrs)?;

    let mut bytes = Vec::new();
    for v in values {
        bytes.write_f64::<LittleEndian>(v)?;
    }
    fs::write(dir.join(chunk_key), bytes)?;
    Ok(())
}
