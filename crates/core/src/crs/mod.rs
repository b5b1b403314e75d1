//! Coordinate Reference System handling
//!
//! CRSs are carried as identifiers only. Two layers are co-registered when
//! their CRSs are equivalent and their grids match; transforming
//! coordinates between systems is left to the raster store.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Coordinate Reference System representation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CRS {
    /// EPSG code if known
    epsg: Option<u32>,
    /// WKT representation
    wkt: Option<String>,
}

impl CRS {
    /// Create a CRS from an EPSG code
    pub fn from_epsg(code: u32) -> Self {
        Self {
            epsg: Some(code),
            wkt: None,
        }
    }

    /// Create a CRS from a WKT string
    pub fn from_wkt(wkt: impl Into<String>) -> Self {
        Self {
            epsg: None,
            wkt: Some(wkt.into()),
        }
    }

    /// WGS84 geographic CRS (EPSG:4326)
    pub fn wgs84() -> Self {
        Self::from_epsg(4326)
    }

    /// SIRGAS 2000 / UTM south zone (EPSG:31960 + zone), e.g. zone 23 → 31983.
    pub fn sirgas2000_utm_south(zone: u32) -> Self {
        Self::from_epsg(31960 + zone)
    }

    /// Get EPSG code if known
    pub fn epsg(&self) -> Option<u32> {
        self.epsg
    }

    /// Get WKT representation
    pub fn wkt(&self) -> Option<&str> {
        self.wkt.as_deref()
    }

    /// Whether coordinates are in degrees (cell areas then need a
    /// latitude-dependent correction).
    pub fn is_geographic(&self) -> bool {
        matches!(self.epsg, Some(4326) | Some(4674) | Some(4269))
    }

    /// Check if two CRS are equivalent
    pub fn is_equivalent(&self, other: &CRS) -> bool {
        if let (Some(a), Some(b)) = (self.epsg, other.epsg) {
            return a == b;
        }
        if let (Some(a), Some(b)) = (&self.wkt, &other.wkt) {
            return a == b;
        }
        false
    }

    /// Get a string identifier for this CRS
    pub fn identifier(&self) -> String {
        if let Some(code) = self.epsg {
            return format!("EPSG:{}", code);
        }
        if let Some(wkt) = &self.wkt {
            return format!("WKT:{}", &wkt[..wkt.len().min(50)]);
        }
        "Unknown".to_string()
    }
}

impl fmt::Display for CRS {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.identifier())
    }
}

/// Check that an optional layer CRS matches the target.
///
/// A layer without CRS metadata is accepted as-is; the caller asserts it was
/// produced on the target grid.
pub fn ensure_equivalent(layer: &str, target: &CRS, found: Option<&CRS>) -> crate::Result<()> {
    match found {
        Some(crs) if !crs.is_equivalent(target) => Err(crate::Error::CrsMismatch {
            layer: layer.to_string(),
            expected: target.identifier(),
            found: crs.identifier(),
        }),
        _ => Ok(()),
    }
}
