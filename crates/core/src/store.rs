//! Raster and vector stores: where pipeline layers come from and go to
//!
//! `DirectoryStore` maps a layer id to `<root>/<id>.tif` (rasters) or
//! `<root>/<id>.geojson` (vectors). `MemoryStore` keeps everything in maps
//! and is what the tests use.

use crate::crs::{ensure_equivalent, CRS};
use crate::error::{Error, Result};
use crate::io::{read_geotiff, write_geotiff};
use crate::raster::{resample, GridSpec, Raster, ResampleMethod};
use crate::vector::{read_geojson, FeatureCollection};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Options applied to a raster before it is written
#[derive(Debug, Clone, Default)]
pub struct WriteOptions {
    /// Output resolution in CRS units; resamples when it differs
    pub scale: Option<f64>,
    /// Output extent `(min_x, min_y, max_x, max_y)`; crops when set
    pub region: Option<(f64, f64, f64, f64)>,
    /// Output CRS; must be equivalent to the raster's
    pub crs: Option<CRS>,
    /// Interpolation used when cropping or rescaling
    pub method: ResampleMethod,
}

/// Grid-aligned raster access
pub trait RasterStore {
    fn load(&self, id: &str) -> Result<Raster<f64>>;

    fn write(&mut self, id: &str, raster: &Raster<f64>, opts: &WriteOptions) -> Result<()>;

    fn contains(&self, id: &str) -> bool;

    /// Bring a raster into `crs`. Only the identity case is supported; a
    /// store backed by a projection engine overrides this.
    fn reproject(&self, id: &str, mut raster: Raster<f64>, crs: &CRS) -> Result<Raster<f64>> {
        ensure_equivalent(id, crs, raster.crs())?;
        raster.set_crs(Some(crs.clone()));
        Ok(raster)
    }
}

/// Feature collection access
pub trait VectorStore {
    fn load_features(&self, id: &str) -> Result<FeatureCollection>;
}

/// Apply crop/rescale/CRS options to a raster.
pub fn prepare_for_write(id: &str, raster: &Raster<f64>, opts: &WriteOptions) -> Result<Raster<f64>> {
    let mut raster = raster.clone();
    if let Some(crs) = &opts.crs {
        ensure_equivalent(id, crs, raster.crs())?;
        raster.set_crs(Some(crs.clone()));
    }
    if opts.scale.is_none() && opts.region.is_none() {
        return Ok(raster);
    }

    let crs = raster.crs().cloned().ok_or_else(|| {
        Error::invalid_param("crs", "none", format!("layer '{}' has no CRS; cannot crop or rescale", id))
    })?;
    let region = opts.region.unwrap_or_else(|| raster.bounds());
    let scale = opts.scale.unwrap_or_else(|| raster.cell_size());
    let grid = GridSpec::from_bounds(region, scale, crs)?;
    if !grid.intersects(raster.bounds()) {
        return Err(Error::ExtentOutsideStudyArea { layer: id.to_string() });
    }
    resample(id, &raster, &grid, opts.method)
}

/// Layers stored as files under one directory
#[derive(Debug, Clone)]
pub struct DirectoryStore {
    root: PathBuf,
}

impl DirectoryStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path for a layer id; an id that already has an extension is used as-is.
    pub fn path_for(&self, id: &str, ext: &str) -> PathBuf {
        let p = self.root.join(id);
        if p.extension().is_some() { p } else { p.with_extension(ext) }
    }
}

impl RasterStore for DirectoryStore {
    fn load(&self, id: &str) -> Result<Raster<f64>> {
        let path = self.path_for(id, "tif");
        if !path.exists() {
            return Err(Error::MissingLayer(id.to_string()));
        }
        read_geotiff(&path)
    }

    fn write(&mut self, id: &str, raster: &Raster<f64>, opts: &WriteOptions) -> Result<()> {
        let out = prepare_for_write(id, raster, opts)?;
        let path = self.path_for(id, "tif");
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        write_geotiff(&out, &path)
    }

    fn contains(&self, id: &str) -> bool {
        self.path_for(id, "tif").exists()
    }
}

impl VectorStore for DirectoryStore {
    fn load_features(&self, id: &str) -> Result<FeatureCollection> {
        let path = self.path_for(id, "geojson");
        if !path.exists() {
            return Err(Error::MissingLayer(id.to_string()));
        }
        read_geojson(&path)
    }
}

/// In-memory store
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    rasters: HashMap<String, Raster<f64>>,
    vectors: HashMap<String, FeatureCollection>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_raster(&mut self, id: impl Into<String>, raster: Raster<f64>) {
        self.rasters.insert(id.into(), raster);
    }

    pub fn insert_features(&mut self, id: impl Into<String>, features: FeatureCollection) {
        self.vectors.insert(id.into(), features);
    }

    pub fn raster_ids(&self) -> impl Iterator<Item = &str> {
        self.rasters.keys().map(String::as_str)
    }
}

impl RasterStore for MemoryStore {
    fn load(&self, id: &str) -> Result<Raster<f64>> {
        self.rasters
            .get(id)
            .cloned()
            .ok_or_else(|| Error::MissingLayer(id.to_string()))
    }

    fn write(&mut self, id: &str, raster: &Raster<f64>, opts: &WriteOptions) -> Result<()> {
        let out = prepare_for_write(id, raster, opts)?;
        self.rasters.insert(id.to_string(), out);
        Ok(())
    }

    fn contains(&self, id: &str) -> bool {
        self.rasters.contains_key(id)
    }
}

impl VectorStore for MemoryStore {
    fn load_features(&self, id: &str) -> Result<FeatureCollection> {
        self.vectors
            .get(id)
            .cloned()
            .ok_or_else(|| Error::MissingLayer(id.to_string()))
    }
}
