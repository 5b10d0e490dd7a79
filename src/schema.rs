use crate::coords::{AxisCoordinates, axis_mean};
use crate::error::{Result, TilerError};
use crate::metadata::{AttributeValue, Attributes};
use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt::Write;

/// Canonical textual form of the temporal attributes.
pub const LEGACY_TIME_FORMAT: &str = "%Y%m%d_%H%M";

/// Per-tile inputs to attribute derivation
#[derive(Debug, Clone, Copy)]
pub struct TileContext<'a> {
    pub start_datetime: DateTime<Utc>,
    pub row_offset: usize,
    pub col_offset: usize,
    pub coords: &'a AxisCoordinates,
}

/// Values computed from the tile rather than fixed in the schema
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Derivation {
    /// Dataset start time rendered with a strftime pattern
    StartTime { format: String },
    /// Mean of the tile's row (latitude) coordinates
    CenterLatitude,
    /// Mean of the tile's column (longitude) coordinates
    CenterLongitude,
    /// First pixel row of the tile in the source raster
    RowOffset,
    /// First pixel column of the tile in the source raster
    ColumnOffset,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributeSource {
    Value(AttributeValue),
    Derive(Derivation),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaEntry {
    pub key: String,
    #[serde(flatten)]
    pub source: AttributeSource,
}

impl SchemaEntry {
    pub fn constant(key: &str, value: impl Into<AttributeValue>) -> Self {
        Self {
            key: key.to_string(),
            source: AttributeSource::Value(value.into()),
        }
    }

    pub fn derived(key: &str, derivation: Derivation) -> Self {
        Self {
            key: key.to_string(),
            source: AttributeSource::Derive(derivation),
        }
    }

    fn start_time(key: &str) -> Self {
        Self::derived(
            key,
            Derivation::StartTime {
                format: LEGACY_TIME_FORMAT.to_string(),
            },
        )
    }
}

/// Product- and channel-specific constants of the legacy record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProductConstants {
    pub title: String,
    pub product_name: String,
    pub satellite_id: String,
    pub channel_id: i64,
    pub central_wavelength: f64,
    pub abi_mode: i64,
    pub source_scene: String,
    pub production_site: String,
    pub institution: String,
    pub project: String,
}

impl Default for ProductConstants {
    fn default() -> Self {
        Self {
            title: "GeoColor AWIPS tiles for ECONUS (GOES-16)".to_string(),
            product_name: "GEGEOC-010-B12-M3C02".to_string(),
            satellite_id: "GEOCOLR".to_string(),
            channel_id: 2,
            central_wavelength: 0.64,
            abi_mode: 3,
            source_scene: "CONUS".to_string(),
            production_site: "RAMMB".to_string(),
            institution: "NOAA/NESDIS".to_string(),
            project: "GOES-R Series".to_string(),
        }
    }
}

/// Geostationary grid-mapping record attached to every tile as the scalar
/// `fixedgrid_projection` variable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FixedGridProjection {
    pub latitude_of_projection_origin: f64,
    pub longitude_of_projection_origin: f64,
    pub semi_major_axis: f64,
    pub semi_minor_axis: f64,
    pub perspective_point_height: f64,
    pub sweep_angle_axis: String,
}

impl Default for FixedGridProjection {
    fn default() -> Self {
        Self {
            latitude_of_projection_origin: 0.0,
            longitude_of_projection_origin: -137.0,
            semi_major_axis: 6378137.0,
            semi_minor_axis: 6356752.31414,
            perspective_point_height: 35786023.0,
            sweep_angle_axis: "x".to_string(),
        }
    }
}

impl FixedGridProjection {
    /// CF grid-mapping attributes; numeric parameters are one-element arrays.
    pub fn to_attributes(&self) -> Attributes {
        let single = |v: f64| AttributeValue::Array(vec![AttributeValue::Number(v)]);

        let mut attrs = Attributes::new();
        attrs.insert("grid_mapping_name", "geostationary");
        attrs.insert(
            "latitude_of_projection_origin",
            single(self.latitude_of_projection_origin),
        );
        attrs.insert(
            "longitude_of_projection_origin",
            single(self.longitude_of_projection_origin),
        );
        attrs.insert("semi_major_axis", single(self.semi_major_axis));
        attrs.insert("semi_minor_axis", single(self.semi_minor_axis));
        attrs.insert("perspective_point_height", single(self.perspective_point_height));
        attrs.insert("sweep_angle_axis", self.sweep_angle_axis.as_str());
        attrs
    }
}

/// Ordered list of constant or derived entries. Every tile of a run is built
/// from the same schema, so all tiles share keys and key order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AttributeSchema {
    pub entries: Vec<SchemaEntry>,
}

impl AttributeSchema {
    /// Schema of the legacy GeoColor tile generator, with product constants
    /// supplied by configuration.
    pub fn legacy(product: &ProductConstants) -> Self {
        use Derivation::*;

        let entries = vec![
            // general
            SchemaEntry::constant("title", product.title.as_str()),
            SchemaEntry::constant("ICD_version", "ICD-GEO-16-001"),
            SchemaEntry::constant("Conventions", "CF-1.6"),
            SchemaEntry::constant("product_name", product.product_name.as_str()),
            SchemaEntry::constant("satellite_id", product.satellite_id.as_str()),
            SchemaEntry::constant("projection", "Fixed Grid"),
            // channel and band
            SchemaEntry::constant("channel_id", product.channel_id),
            SchemaEntry::constant("central_wavelength", product.central_wavelength),
            SchemaEntry::constant("abi_mode", product.abi_mode),
            // provenance
            SchemaEntry::constant("source_scene", product.source_scene.as_str()),
            SchemaEntry::constant("production_location", product.production_site.as_str()),
            SchemaEntry::constant("production_site", product.production_site.as_str()),
            SchemaEntry::constant("institution", product.institution.as_str()),
            SchemaEntry::constant("project", product.project.as_str()),
            SchemaEntry::constant("bit_depth", 12i64),
            // temporal
            SchemaEntry::start_time("start_date_time"),
            SchemaEntry::start_time("time_coverage_start"),
            SchemaEntry::start_time("time_coverage_end"),
            // tile geometry
            SchemaEntry::derived("product_center_latitude", CenterLatitude),
            SchemaEntry::derived("product_center_longitude", CenterLongitude),
            SchemaEntry::derived("tile_center_latitude", CenterLatitude),
            SchemaEntry::derived("tile_center_longitude", CenterLongitude),
            SchemaEntry::derived("tile_row_offset", RowOffset),
            SchemaEntry::derived("tile_column_offset", ColumnOffset),
            SchemaEntry::constant("product_rows", 1024i64),
            SchemaEntry::constant("product_columns", 1024i64),
            SchemaEntry::constant("product_tile_width", 1024i64),
            SchemaEntry::constant("product_tile_height", 1024i64),
            SchemaEntry::constant("number_product_tiles", 15i64),
            // spatial resolution
            SchemaEntry::constant("pixel_x_size", 2.0),
            SchemaEntry::constant("pixel_y_size", 2.0),
            SchemaEntry::constant("source_spatial_resolution", 1.0),
            SchemaEntry::constant("request_spatial_resolution", 1.0),
            SchemaEntry::constant("periodicity", 5.0),
        ];

        Self { entries }
    }

    /// Reject duplicate keys and unparseable time patterns before any tile is built.
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for entry in &self.entries {
            if !seen.insert(entry.key.as_str()) {
                return Err(TilerError::Config(format!(
                    "Attribute schema lists '{}' more than once",
                    entry.key
                )));
            }

            if let AttributeSource::Derive(Derivation::StartTime { format }) = &entry.source {
                if StrftimeItems::new(format).any(|item| matches!(item, Item::Error)) {
                    return Err(TilerError::Config(format!(
                        "Invalid time format '{}' for attribute '{}'",
                        format, entry.key
                    )));
                }
            }
        }
        Ok(())
    }

    /// Build the attribute record for one tile.
    pub fn synthesize(&self, ctx: &TileContext<'_>) -> Result<Attributes> {
        let mut attrs = Attributes::new();
        for entry in &self.entries {
            let value = match &entry.source {
                AttributeSource::Value(value) => value.clone(),
                AttributeSource::Derive(derivation) => derive(derivation, ctx)?,
            };
            attrs.insert(entry.key.as_str(), value);
        }
        Ok(attrs)
    }
}

fn derive(derivation: &Derivation, ctx: &TileContext<'_>) -> Result<AttributeValue> {
    let value = match derivation {
        Derivation::StartTime { format } => {
            AttributeValue::String(format_time(&ctx.start_datetime, format)?)
        }
        Derivation::CenterLatitude => AttributeValue::Number(axis_mean(&ctx.coords.y)),
        Derivation::CenterLongitude => AttributeValue::Number(axis_mean(&ctx.coords.x)),
        Derivation::RowOffset => AttributeValue::Integer(ctx.row_offset as i64),
        Derivation::ColumnOffset => AttributeValue::Integer(ctx.col_offset as i64),
    };
    Ok(value)
}

/// Render `dt` with a strftime pattern, failing instead of panicking on a bad pattern.
pub fn format_time(dt: &DateTime<Utc>, format: &str) -> Result<String> {
    let mut out = String::new();
    write!(out, "{}", dt.format(format))
        .map_err(|_| TilerError::Config(format!("Invalid time format '{}'", format)))?;
    Ok(out)
}
