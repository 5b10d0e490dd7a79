use crate::coords::{AxisCoordinates, CoordinateStrategy};
use crate::error::{Result, TilerError};
use crate::metadata::Attributes;
use crate::naming::MAX_TILE_ORDINAL;
use crate::raster::{Field, RasterDataset};
use crate::schema::{AttributeSchema, FixedGridProjection, ProductConstants, TileContext};
use ndarray::s;
use serde::{Deserialize, Serialize};
use tracing::debug;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Number of tile rows and columns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridShape {
    pub nrows: usize,
    pub ncols: usize,
}

impl Default for GridShape {
    fn default() -> Self {
        Self { nrows: 10, ncols: 8 }
    }
}

impl GridShape {
    pub fn new(nrows: usize, ncols: usize) -> Result<Self> {
        let grid = Self { nrows, ncols };
        grid.validate()?;
        Ok(grid)
    }

    pub fn validate(&self) -> Result<()> {
        if self.nrows == 0 || self.ncols == 0 {
            return Err(TilerError::Config(format!(
                "Grid shape must be at least 1x1, got {}x{} (rows x cols)",
                self.nrows, self.ncols
            )));
        }
        if self.tile_count() > MAX_TILE_ORDINAL {
            return Err(TilerError::Config(format!(
                "Grid shape {}x{} makes {} tiles, more than the {}-tile limit of the 3-digit tile index",
                self.nrows,
                self.ncols,
                self.tile_count(),
                MAX_TILE_ORDINAL
            )));
        }
        Ok(())
    }

    pub fn tile_count(&self) -> usize {
        self.nrows.saturating_mul(self.ncols)
    }
}

/// Half-open pixel rectangle `[row_start, row_end) x [col_start, col_end)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TileWindow {
    pub row_start: usize,
    pub row_end: usize,
    pub col_start: usize,
    pub col_end: usize,
}

impl TileWindow {
    pub fn rows(&self) -> usize {
        self.row_end - self.row_start
    }

    pub fn cols(&self) -> usize {
        self.col_end - self.col_start
    }
}

/// `parts + 1` edges spanning `[0, extent]`, with interval lengths differing
/// by at most one pixel. Remainder pixels are spread across the intervals.
pub fn split_edges(extent: usize, parts: usize, axis: &'static str) -> Result<Vec<usize>> {
    if parts == 0 {
        return Err(TilerError::Config(format!(
            "Cannot split {} axis into zero tiles",
            axis
        )));
    }
    if parts > extent {
        return Err(TilerError::DegeneratePartition {
            axis,
            extent,
            parts,
        });
    }

    Ok((0..=parts).map(|k| k * extent / parts).collect())
}

/// Windows covering `[0, ny) x [0, nx)` in row-major order.
pub fn tile_windows(ny: usize, nx: usize, grid: GridShape) -> Result<Vec<TileWindow>> {
    grid.validate()?;
    let row_edges = split_edges(ny, grid.nrows, "row")?;
    let col_edges = split_edges(nx, grid.ncols, "column")?;

    let mut windows = Vec::with_capacity(grid.tile_count());
    for rows in row_edges.windows(2) {
        for cols in col_edges.windows(2) {
            windows.push(TileWindow {
                row_start: rows[0],
                row_end: rows[1],
                col_start: cols[0],
                col_end: cols[1],
            });
        }
    }
    Ok(windows)
}

/// One sub-region of the raster with its own coordinates and metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct Tile {
    /// 1-based row-major position in the grid
    pub ordinal: usize,
    pub window: TileWindow,
    pub variable: String,
    pub data: Field,
    pub variable_attributes: Attributes,
    pub coords: AxisCoordinates,
    pub attributes: Attributes,
    pub projection: Attributes,
}

/// Settings shared by every tile of a run
#[derive(Debug, Clone)]
pub struct PartitionOptions {
    pub grid: GridShape,
    pub latitude_name: String,
    pub longitude_name: String,
    pub strategy: CoordinateStrategy,
    pub schema: AttributeSchema,
    pub projection: FixedGridProjection,
}

impl Default for PartitionOptions {
    fn default() -> Self {
        Self {
            grid: GridShape::default(),
            latitude_name: "latitude".to_string(),
            longitude_name: "longitude".to_string(),
            strategy: CoordinateStrategy::default(),
            schema: AttributeSchema::legacy(&ProductConstants::default()),
            projection: FixedGridProjection::default(),
        }
    }
}

pub struct Partitioner {
    options: PartitionOptions,
    projection: Attributes,
}

impl Partitioner {
    pub fn new(options: PartitionOptions) -> Result<Self> {
        options.grid.validate()?;
        options.schema.validate()?;
        let projection = options.projection.to_attributes();
        Ok(Self {
            options,
            projection,
        })
    }

    pub fn options(&self) -> &PartitionOptions {
        &self.options
    }

    /// Split `variable` into `nrows * ncols` tiles ordered by ordinal.
    ///
    /// Either every tile is produced or an error is returned.
    pub fn partition(&self, ds: &RasterDataset, variable: &str) -> Result<Vec<Tile>> {
        let opts = &self.options;
        let (ny, nx) = ds.geolocated_extent(variable, &opts.latitude_name, &opts.longitude_name)?;
        let windows = tile_windows(ny, nx, opts.grid)?;

        debug!(
            variable,
            ny,
            nx,
            nrows = opts.grid.nrows,
            ncols = opts.grid.ncols,
            "Partitioning raster"
        );

        #[cfg(feature = "parallel")]
        let tiles = windows
            .par_iter()
            .enumerate()
            .map(|(idx, window)| self.build_tile(ds, variable, idx + 1, *window))
            .collect::<Result<Vec<_>>>()?;

        #[cfg(not(feature = "parallel"))]
        let tiles = windows
            .iter()
            .enumerate()
            .map(|(idx, window)| self.build_tile(ds, variable, idx + 1, *window))
            .collect::<Result<Vec<_>>>()?;

        Ok(tiles)
    }

    fn build_tile(
        &self,
        ds: &RasterDataset,
        variable: &str,
        ordinal: usize,
        window: TileWindow,
    ) -> Result<Tile> {
        let opts = &self.options;
        let product = ds.variable(variable)?;
        let lat = &ds.variable(&opts.latitude_name)?.data;
        let lon = &ds.variable(&opts.longitude_name)?.data;

        let rows = window.row_start..window.row_end;
        let cols = window.col_start..window.col_end;

        let data = product.data.slice(s![rows.clone(), cols.clone()]).to_owned();
        let coords = opts.strategy.extract(
            lat.slice(s![rows.clone(), cols.clone()]),
            lon.slice(s![rows, cols]),
        );

        let attributes = opts.schema.synthesize(&TileContext {
            start_datetime: ds.start_datetime,
            row_offset: window.row_start,
            col_offset: window.col_start,
            coords: &coords,
        })?;

        debug!(ordinal, ?window, "Built tile");

        Ok(Tile {
            ordinal,
            window,
            variable: variable.to_string(),
            data,
            variable_attributes: product.attributes.clone(),
            coords,
            attributes,
            projection: self.projection.clone(),
        })
    }
}
