//! Ordered, co-registered band collection

use crate::error::{Error, Result};
use crate::raster::{GridSpec, Raster};

/// An ordered mapping from band name to raster, all on one [`GridSpec`].
///
/// Bands can only be appended. Every append checks the raster against the
/// stack grid, so a stack can never hold misaligned layers. Once sealed
/// (after export) any further append fails with [`Error::StackSealed`].
#[derive(Debug, Clone)]
pub struct FeatureStack {
    grid: GridSpec,
    bands: Vec<(String, Raster<f64>)>,
    sealed: bool,
}

impl FeatureStack {
    pub fn new(grid: GridSpec) -> Self {
        Self {
            grid,
            bands: Vec::new(),
            sealed: false,
        }
    }

    pub fn grid(&self) -> &GridSpec {
        &self.grid
    }

    /// Append a band at the end of the stack.
    pub fn append(&mut self, name: impl Into<String>, raster: Raster<f64>) -> Result<()> {
        let name = name.into();
        if self.sealed {
            return Err(Error::StackSealed(name));
        }
        if self.contains(&name) {
            return Err(Error::invalid_param("band", &name, "band already present in stack"));
        }
        self.grid.ensure_matches(&name, &raster)?;
        self.bands.push((name, raster.normalize_nodata()));
        Ok(())
    }

    /// Mark the stack immutable.
    pub fn seal(&mut self) {
        self.sealed = true;
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    pub fn len(&self) -> usize {
        self.bands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bands.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.bands.iter().any(|(n, _)| n == name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.bands.iter().map(|(n, _)| n.as_str()).collect()
    }

    pub fn get(&self, name: &str) -> Option<&Raster<f64>> {
        self.bands.iter().find(|(n, _)| n == name).map(|(_, r)| r)
    }

    /// Band by name, or [`Error::MissingLayer`].
    pub fn band(&self, name: &str) -> Result<&Raster<f64>> {
        self.get(name).ok_or_else(|| Error::MissingLayer(name.to_string()))
    }

    /// Bands in the given order.
    pub fn select<S: AsRef<str>>(&self, names: &[S]) -> Result<Vec<&Raster<f64>>> {
        names.iter().map(|n| self.band(n.as_ref())).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Raster<f64>)> {
        self.bands.iter().map(|(n, r)| (n.as_str(), r))
    }

    /// Feature vector of one pixel over `bands`, `None` if any value is NaN.
    pub fn pixel_features(bands: &[&Raster<f64>], row: usize, col: usize) -> Option<Vec<f64>> {
        let mut out = Vec::with_capacity(bands.len());
        for band in bands {
            let v = unsafe { band.get_unchecked(row, col) };
            if !v.is_finite() {
                return None;
            }
            out.push(v);
        }
        Some(out)
    }
}
