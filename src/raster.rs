use crate::error::{Result, TilerError};
use crate::metadata::Attributes;
use chrono::{DateTime, NaiveDateTime, Utc};
use ndarray::Array2;
use std::collections::HashMap;

/// A 2D field indexed `[row, col]`.
pub type Field = Array2<f64>;

/// A named 2D variable plus its own attributes
#[derive(Debug, Clone)]
pub struct RasterVariable {
    pub data: Field,
    pub attributes: Attributes,
}

/// Geolocated raster product: named 2D variables (the primary field and the
/// latitude/longitude fields), dataset attributes, and acquisition start time.
#[derive(Debug, Clone)]
pub struct RasterDataset {
    variables: HashMap<String, RasterVariable>,
    pub global_attributes: Attributes,
    pub start_datetime: DateTime<Utc>,
}

impl RasterDataset {
    pub fn new(start_datetime: DateTime<Utc>) -> Self {
        Self {
            variables: HashMap::new(),
            global_attributes: Attributes::new(),
            start_datetime,
        }
    }

    pub fn with_variable(
        mut self,
        name: impl Into<String>,
        data: Field,
        attributes: Attributes,
    ) -> Self {
        self.insert_variable(name, data, attributes);
        self
    }

    pub fn insert_variable(
        &mut self,
        name: impl Into<String>,
        data: Field,
        attributes: Attributes,
    ) {
        self.variables
            .insert(name.into(), RasterVariable { data, attributes });
    }

    pub fn variable(&self, name: &str) -> Result<&RasterVariable> {
        self.variables
            .get(name)
            .ok_or_else(|| TilerError::MissingVariable(name.to_string()))
    }

    pub fn variable_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.variables.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Check that the geolocation fields share the primary field's extent,
    /// returning that extent as `(ny, nx)`.
    pub fn geolocated_extent(
        &self,
        product: &str,
        lat_name: &str,
        lon_name: &str,
    ) -> Result<(usize, usize)> {
        let (ny, nx) = self.variable(product)?.data.dim();

        for name in [lat_name, lon_name] {
            let (rows, cols) = self.variable(name)?.data.dim();
            if (rows, cols) != (ny, nx) {
                return Err(TilerError::ShapeMismatch {
                    field: name.to_string(),
                    expected_rows: ny,
                    expected_cols: nx,
                    actual_rows: rows,
                    actual_cols: cols,
                });
            }
        }

        Ok((ny, nx))
    }
}

/// Parse a start/creation time given as RFC 3339 or `YYYY-MM-DD HH:MM:SS` (UTC).
pub fn parse_datetime(value: &str) -> Result<DateTime<Utc>> {
    let trimmed = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(dt.with_timezone(&Utc));
    }

    for fmt in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(trimmed, fmt) {
            return Ok(naive.and_utc());
        }
    }

    Err(TilerError::InvalidTime {
        value: value.to_string(),
        reason: "expected RFC 3339 or 'YYYY-MM-DD HH:MM:SS'".to_string(),
    })
}
