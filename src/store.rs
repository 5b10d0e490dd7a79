use crate::metadata::*;
use crate::raster::{RasterDataset, parse_datetime};
use anyhow::{Context, Result, anyhow, bail};
use byteorder::{LittleEndian, ReadBytesExt};
use chrono::{DateTime, Utc};
use ndarray::Array2;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Global attribute holding the acquisition start time.
pub const START_DATETIME_ATTR: &str = "start_datetime";

/// Which arrays of a store make up the raster to tile
#[derive(Debug, Clone)]
pub struct RasterRequest {
    pub variable: String,
    pub latitude_name: String,
    pub longitude_name: String,
    /// Used instead of the store's `start_datetime` attribute when set
    pub start_datetime: Option<DateTime<Utc>>,
}

pub struct ZarrStore {
    path: PathBuf,
}

impl ZarrStore {
    /// Create a new ZarrStore from a directory path
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if !path.exists() {
            bail!("Path does not exist: {}", path.display());
        }

        if !path.is_dir() {
            bail!("Path is not a directory: {}", path.display());
        }

        Ok(Self { path })
    }

    /// Load metadata from the Zarr store, attempting consolidated read first
    pub async fn load_metadata(&self) -> Result<StoreMetadata> {
        match self.load_consolidated_metadata().await {
            Ok(metadata) => {
                info!(store = %self.path.display(), "Loaded consolidated metadata from .zmetadata");
                Ok(metadata)
            }
            Err(e) => {
                debug!(error = %e, "Consolidated metadata not found, scanning hierarchy");
                self.load_hierarchical_metadata().await
            }
        }
    }

    /// Read the primary variable and the geolocation fields into a [`RasterDataset`].
    pub async fn load_raster(
        &self,
        metadata: &StoreMetadata,
        request: &RasterRequest,
    ) -> Result<RasterDataset> {
        let start_datetime = self.start_datetime(metadata, request.start_datetime)?;
        let mut dataset = RasterDataset::new(start_datetime);
        dataset.global_attributes = metadata.global_attributes.clone();

        for name in [
            &request.variable,
            &request.latitude_name,
            &request.longitude_name,
        ] {
            let array = metadata.arrays.get(name.as_str()).ok_or_else(|| {
                let mut keys: Vec<&String> = metadata.arrays.keys().collect();
                keys.sort();
                anyhow!(
                    "Variable '{}' not found in store. Available variables: {}",
                    name,
                    keys.iter().map(|k| k.as_str()).collect::<Vec<_>>().join(", ")
                )
            })?;

            let data = self
                .read_array_2d(array)
                .with_context(|| format!("Failed to read data for variable '{}'", name))?;
            dataset.insert_variable(name.as_str(), data, array.attributes.clone());
        }

        info!(
            variable = %request.variable,
            start = %start_datetime,
            "Loaded raster"
        );
        Ok(dataset)
    }

    /// Acquisition start time: `override_start` if given, else the
    /// `start_datetime` global attribute.
    pub fn start_datetime(
        &self,
        metadata: &StoreMetadata,
        override_start: Option<DateTime<Utc>>,
    ) -> Result<DateTime<Utc>> {
        if let Some(dt) = override_start {
            return Ok(dt);
        }

        let raw = metadata
            .global_attributes
            .get(START_DATETIME_ATTR)
            .and_then(|v| v.as_str())
            .ok_or_else(|| {
                anyhow!(
                    "Store '{}' has no '{}' global attribute; pass --start to set the acquisition time.",
                    self.path.display(),
                    START_DATETIME_ATTR
                )
            })?;
        Ok(parse_datetime(raw)?)
    }

    /// Attempt to load consolidated metadata from .zmetadata file
    async fn load_consolidated_metadata(&self) -> Result<StoreMetadata> {
        let zmetadata_path = self.path.join(".zmetadata");

        let data = fs::read(&zmetadata_path).with_context(|| {
            format!(
                "No consolidated metadata found at '{}'",
                zmetadata_path.display()
            )
        })?;

        let consolidated: ConsolidatedMetadata = serde_json::from_slice(&data).with_context(|| {
            format!(
                "Invalid consolidated metadata JSON format at '{}'. The file exists but contains malformed JSON.",
                zmetadata_path.display()
            )
        })?;

        self.parse_consolidated_metadata(consolidated)
            .with_context(|| "Failed to process consolidated metadata entries")
    }

    /// Load metadata by scanning the directory tree for .zarray/.zattrs files
    async fn load_hierarchical_metadata(&self) -> Result<StoreMetadata> {
        let mut array_paths = Vec::new();
        Self::scan_directory(&mut array_paths, "", &self.path)?;

        if array_paths.is_empty() {
            bail!(
                "No Zarr arrays found in '{}'. The directory must contain .zarray or .zmetadata files to be a valid Zarr store.",
                self.path.display()
            );
        }

        let mut metadata = StoreMetadata::new();
        for path in array_paths {
            let array = self.load_array_metadata(&path)?;
            metadata.arrays.insert(path, array);
        }

        metadata.global_attributes = read_attributes(&self.path.join(".zattrs"));
        Ok(metadata)
    }

    /// Recursively collect the store-relative paths of arrays
    fn scan_directory(
        array_paths: &mut Vec<String>,
        current_path: &str,
        fs_path: &Path,
    ) -> Result<()> {
        let entries = fs::read_dir(fs_path)
            .with_context(|| format!("Failed to read directory: {}", fs_path.display()))?;

        let mut has_zarray = false;
        let mut children = Vec::new();

        for entry in entries.flatten() {
            let filename = entry.file_name().to_string_lossy().to_string();
            match filename.as_str() {
                ".zarray" => has_zarray = true,
                name if !name.starts_with('.') && entry.path().is_dir() => {
                    children.push(name.to_string());
                }
                _ => {}
            }
        }

        if has_zarray {
            array_paths.push(current_path.to_string());
            return Ok(());
        }

        children.sort();
        for child in children {
            let child_path = if current_path.is_empty() {
                child.clone()
            } else {
                format!("{}/{}", current_path, child)
            };
            Self::scan_directory(array_paths, &child_path, &fs_path.join(&child))?;
        }

        Ok(())
    }

    /// Load array metadata from .zarray and .zattrs files
    fn load_array_metadata(&self, path: &str) -> Result<ArrayInfo> {
        let array_dir = self.path.join(path);
        let zarray_path = array_dir.join(".zarray");

        let array_data = fs::read(&zarray_path).with_context(|| {
            format!(
                "Missing .zarray file for variable '{}' at '{}'",
                path,
                zarray_path.display()
            )
        })?;

        let zarray: ZArrayMetadata = serde_json::from_slice(&array_data).with_context(|| {
            format!(
                "Invalid .zarray JSON format for variable '{}' at '{}'. The file exists but contains malformed JSON.",
                path,
                zarray_path.display()
            )
        })?;

        let attributes = read_attributes(&array_dir.join(".zattrs"));
        Ok(array_info_from_zarray(path, zarray, attributes))
    }

    /// Parse consolidated metadata into a StoreMetadata structure
    fn parse_consolidated_metadata(
        &self,
        consolidated: ConsolidatedMetadata,
    ) -> Result<StoreMetadata> {
        let mut metadata = StoreMetadata::new();

        for (key, value) in &consolidated.metadata {
            if key == ".zattrs" {
                metadata.global_attributes =
                    serde_json::from_value(value.clone()).unwrap_or_default();
            } else if let Some(path) = key.strip_suffix("/.zarray") {
                let zarray: ZArrayMetadata = serde_json::from_value(value.clone())
                    .with_context(|| format!("Failed to parse .zarray for {}", path))?;

                let attributes = consolidated
                    .metadata
                    .get(&format!("{}/.zattrs", path))
                    .and_then(|v| serde_json::from_value(v.clone()).ok())
                    .unwrap_or_default();

                metadata
                    .arrays
                    .insert(path.to_string(), array_info_from_zarray(path, zarray, attributes));
            }
        }

        Ok(metadata)
    }

    /// Read a 2D C-order array as `f64` values indexed `[row, col]`
    pub fn read_array_2d(&self, array: &ArrayInfo) -> Result<Array2<f64>> {
        let [rows, cols] = array.shape[..] else {
            bail!(
                "Variable '{}' has dimensions ({}); tiling needs a 2D (rows, cols) array.",
                array.name,
                array.dimension_names().join(", ")
            );
        };

        if array.order != "C" {
            bail!(
                "Only C-order arrays are supported. Variable '{}' has order='{}'.",
                array.name,
                array.order
            );
        }

        let data = self.try_zarrs_read(array).or_else(|e| {
            debug!(
                array = %array.path,
                error = %e,
                "zarrs read failed, trying direct chunk read"
            );
            self.read_single_chunk(array)
        })?;

        let shape = (usize::try_from(rows)?, usize::try_from(cols)?);
        Array2::from_shape_vec(shape, data).with_context(|| {
            format!(
                "Data for variable '{}' does not match its shape {}x{}",
                array.name, rows, cols
            )
        })
    }

    /// Read the whole array through the zarrs crate (handles codecs and chunking)
    fn try_zarrs_read(&self, array: &ArrayInfo) -> Result<Vec<f64>> {
        use zarrs::array::Array;
        use zarrs::array_subset::ArraySubset;
        use zarrs::storage::store::FilesystemStore;

        let store = FilesystemStore::new(&self.path)
            .map_err(|e| anyhow!("Failed to create zarrs FilesystemStore: {}", e))?;

        let array_path = format!("/{}", array.path);
        let zarr_array = Array::open(std::sync::Arc::new(store), &array_path)
            .map_err(|e| anyhow!("Failed to open array '{}': {}", array_path, e))?;

        let subset = ArraySubset::new_with_shape(zarr_array.shape().to_vec());
        let array_bytes = zarr_array
            .retrieve_array_subset(&subset)
            .map_err(|e| anyhow!("Failed to read array data: {}", e))?;

        let bytes: &[u8] = match &array_bytes {
            zarrs::array::ArrayBytes::Variable(data, _offsets) => data.as_ref(),
            zarrs::array::ArrayBytes::Fixed(data) => data.as_ref(),
        };

        decode_values(bytes, &array.dtype)
    }

    /// Read an uncompressed array stored as one chunk
    fn read_single_chunk(&self, array: &ArrayInfo) -> Result<Vec<f64>> {
        if let Some(compressor) = &array.compressor {
            bail!(
                "Variable '{}' uses compression ('{}'), which could not be handled by the zarrs crate.",
                array.name,
                compressor
            );
        }

        if array.chunks != array.shape {
            bail!(
                "Variable '{}' is split into chunks {:?} of shape {:?}; direct reads need a single chunk.",
                array.name,
                array.chunks,
                array.shape
            );
        }

        let chunk_key = vec!["0"; array.shape.len()].join(&array.dimension_separator);
        let chunk_path = self.path.join(&array.path).join(&chunk_key);
        let buffer = fs::read(&chunk_path)
            .with_context(|| format!("Failed to read chunk file: {}", chunk_path.display()))?;

        decode_values(&buffer, &array.dtype)
    }
}

fn array_info_from_zarray(path: &str, zarray: ZArrayMetadata, attributes: Attributes) -> ArrayInfo {
    let compressor = zarray
        .compressor
        .as_ref()
        .and_then(|c| c.get("id"))
        .and_then(|id| id.as_str())
        .map(|s| s.to_string());

    ArrayInfo {
        name: path.split('/').next_back().unwrap_or(path).to_string(),
        path: path.to_string(),
        dtype: zarray.dtype,
        shape: zarray.shape,
        chunks: zarray.chunks,
        compressor,
        order: zarray.order,
        dimension_separator: zarray.dimension_separator.unwrap_or_else(|| ".".to_string()),
        attributes,
    }
}

/// `.zattrs` is optional; a missing or unreadable file yields no attributes
fn read_attributes(path: &Path) -> Attributes {
    fs::read(path)
        .ok()
        .and_then(|data| serde_json::from_slice(&data).ok())
        .unwrap_or_default()
}

/// Decode little-endian numeric values to `f64`
fn decode_values(bytes: &[u8], dtype: &str) -> Result<Vec<f64>> {
    let width = match dtype {
        "<f8" | "<i8" | "<u8" => 8,
        "<f4" | "<i4" | "<u4" => 4,
        "<i2" | "<u2" => 2,
        "|i1" | "|u1" | "<i1" | "<u1" => 1,
        _ => bail!("Unsupported dtype for raster data: {}", dtype),
    };

    let count = bytes.len() / width;
    let mut reader = std::io::Cursor::new(bytes);
    let mut data = Vec::with_capacity(count);

    for _ in 0..count {
        let value = match dtype {
            "<f8" => reader.read_f64::<LittleEndian>()?,
            "<f4" => reader.read_f32::<LittleEndian>()? as f64,
            "<i8" => reader.read_i64::<LittleEndian>()? as f64,
            "<u8" => reader.read_u64::<LittleEndian>()? as f64,
            "<i4" => reader.read_i32::<LittleEndian>()? as f64,
            "<u4" => reader.read_u32::<LittleEndian>()? as f64,
            "<i2" => reader.read_i16::<LittleEndian>()? as f64,
            "<u2" => reader.read_u16::<LittleEndian>()? as f64,
            "|i1" | "<i1" => reader.read_i8()? as f64,
            _ => reader.read_u8()? as f64,
        };
        data.push(value);
    }

    Ok(data)
}
