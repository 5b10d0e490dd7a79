use ndarray::{Array1, ArrayView2, Axis};
use serde::{Deserialize, Serialize};

/// Which line of the 2D geolocation slices becomes the 1D coordinate.
///
/// Fixed-grid products are near-rectilinear over a tile: latitude varies along
/// rows and longitude along columns. Taking one line of each field is an
/// approximation for low-distortion fixed-grid projections only.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CoordinateStrategy {
    /// First column of latitude, first row of longitude.
    #[default]
    FirstLine,
    /// Middle column of latitude, middle row of longitude.
    CenterLine,
}

/// 1D axis coordinates for one tile window
#[derive(Debug, Clone, PartialEq)]
pub struct AxisCoordinates {
    /// Latitude per tile row, length `row_end - row_start`
    pub y: Array1<f64>,
    /// Longitude per tile column, length `col_end - col_start`
    pub x: Array1<f64>,
}

impl CoordinateStrategy {
    /// Reduce window slices of latitude and longitude to axis coordinates.
    ///
    /// Both slices must cover the same non-empty window.
    pub fn extract(self, lat: ArrayView2<'_, f64>, lon: ArrayView2<'_, f64>) -> AxisCoordinates {
        let (rows, cols) = lat.dim();
        let (col, row) = match self {
            CoordinateStrategy::FirstLine => (0, 0),
            CoordinateStrategy::CenterLine => (cols / 2, rows / 2),
        };

        AxisCoordinates {
            y: lat.index_axis(Axis(1), col).to_owned(),
            x: lon.index_axis(Axis(0), row).to_owned(),
        }
    }
}

/// Mean of the finite values of a coordinate axis.
///
/// Off-disk pixels carry NaN and are skipped. An axis with no finite value
/// yields NaN, which JSON attribute output records as `null`.
pub fn axis_mean(values: &Array1<f64>) -> f64 {
    let (sum, count) = values
        .iter()
        .filter(|v| v.is_finite())
        .fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));
    if count == 0 {
        f64::NAN
    } else {
        sum / count as f64
    }
}
