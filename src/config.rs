use crate::coords::CoordinateStrategy;
use crate::naming::{CodeTables, LookupPolicy};
use crate::partition::{GridShape, PartitionOptions};
use crate::schema::{AttributeSchema, FixedGridProjection, ProductConstants};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Run configuration read from JSON. Every field has a legacy default, so an
/// empty object is a complete configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TilerConfig {
    pub grid: GridShape,
    pub latitude_name: String,
    pub longitude_name: String,
    pub coordinate_strategy: CoordinateStrategy,
    pub tables: CodeTables,
    pub lookup_policy: LookupPolicy,
    pub extension: Option<String>,
    pub product: ProductConstants,
    /// Replaces the legacy schema built from `product` when present
    pub schema: Option<AttributeSchema>,
    pub projection: FixedGridProjection,
}

impl Default for TilerConfig {
    fn default() -> Self {
        Self {
            grid: GridShape::default(),
            latitude_name: "latitude".to_string(),
            longitude_name: "longitude".to_string(),
            coordinate_strategy: CoordinateStrategy::default(),
            tables: CodeTables::default(),
            lookup_policy: LookupPolicy::default(),
            extension: Some(".zarr".to_string()),
            product: ProductConstants::default(),
            schema: None,
            projection: FixedGridProjection::default(),
        }
    }
}

impl TilerConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let data = fs::read(path)
            .with_context(|| format!("Failed to read config file '{}'", path.display()))?;
        serde_json::from_slice(&data)
            .with_context(|| format!("Invalid config JSON in '{}'", path.display()))
    }

    /// Code tables with the configured lookup policy applied.
    pub fn code_tables(&self) -> CodeTables {
        CodeTables {
            policy: self.lookup_policy,
            ..self.tables.clone()
        }
    }

    pub fn attribute_schema(&self) -> AttributeSchema {
        self.schema
            .clone()
            .unwrap_or_else(|| AttributeSchema::legacy(&self.product))
    }

    pub fn partition_options(&self) -> PartitionOptions {
        PartitionOptions {
            grid: self.grid,
            latitude_name: self.latitude_name.clone(),
            longitude_name: self.longitude_name.clone(),
            strategy: self.coordinate_strategy,
            schema: self.attribute_schema(),
            projection: self.projection.clone(),
        }
    }
}
