pub mod config;
pub mod coords;
pub mod error;
pub mod metadata;
pub mod naming;
pub mod partition;
pub mod raster;
pub mod schema;
pub mod store;
pub mod writer;

// Re-export commonly used types
pub use config::TilerConfig;
pub use error::{Result, TilerError};
pub use metadata::{AttributeValue, Attributes};
pub use naming::{CodeTables, LookupPolicy, NamingContext, NamingConvention, assemble_template};
pub use partition::{GridShape, PartitionOptions, Partitioner, Tile};
pub use raster::RasterDataset;
pub use schema::AttributeSchema;
pub use store::{RasterRequest, ZarrStore};
pub use writer::{TileSink, TileWriter, ZarrTileSink};
