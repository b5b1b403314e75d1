//! Raster-to-RGBA rendering using color schemes.

use crate::scheme::{evaluate, ColorScheme, Rgb};
use floodmap_core::raster::{Raster, RasterElement};

/// Parameters for colormap rendering.
#[derive(Debug, Clone)]
pub struct ColormapParams {
    pub scheme: ColorScheme,
    /// Values below this are clamped.
    pub min: f64,
    /// Values above this are clamped.
    pub max: f64,
    /// RGBA of nodata pixels. Default: fully transparent.
    pub nodata_color: [u8; 4],
}

impl ColormapParams {
    /// Params over [0, 1], the natural range of susceptibility and masks.
    pub fn new(scheme: ColorScheme) -> Self {
        Self::with_range(scheme, 0.0, 1.0)
    }

    pub fn with_range(scheme: ColorScheme, min: f64, max: f64) -> Self {
        Self {
            scheme,
            min,
            max,
            nodata_color: [0, 0, 0, 0],
        }
    }
}

/// Params spanning the valid data range of `raster`.
pub fn auto_params<T: RasterElement>(raster: &Raster<T>, scheme: ColorScheme) -> ColormapParams {
    let nodata = raster.nodata();
    let (mut min, mut max) = raster
        .data()
        .iter()
        .filter(|v| !v.is_nodata(nodata))
        .filter_map(|v| v.to_f64())
        .filter(|v| v.is_finite())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| (lo.min(v), hi.max(v)));

    // all nodata or constant
    if !min.is_finite() || !max.is_finite() {
        min = 0.0;
        max = 1.0;
    } else if (max - min).abs() < f64::EPSILON {
        max = min + 1.0;
    }

    ColormapParams::with_range(scheme, min, max)
}

/// Convert a raster to a row-major RGBA buffer of `rows * cols * 4` bytes.
pub fn raster_to_rgba<T: RasterElement>(raster: &Raster<T>, params: &ColormapParams) -> Vec<u8> {
    let nodata = raster.nodata();
    let range = params.max - params.min;
    let inv_range = if range.abs() > f64::EPSILON { 1.0 / range } else { 1.0 };

    let mut rgba = Vec::with_capacity(raster.len() * 4);
    for val in raster.data().iter() {
        let value = if val.is_nodata(nodata) { None } else { val.to_f64() };
        match value {
            Some(v) if v.is_finite() => {
                let Rgb { r, g, b } = evaluate(params.scheme, (v - params.min) * inv_range);
                rgba.extend_from_slice(&[r, g, b, 255]);
            }
            _ => rgba.extend_from_slice(&params.nodata_color),
        }
    }
    rgba
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raster_to_rgba_basic() {
        let mut r = Raster::<f64>::new(2, 2);
        r.set(0, 0, 0.0).unwrap();
        r.set(0, 1, 0.5).unwrap();
        r.set(1, 0, 1.0).unwrap();
        r.set(1, 1, f64::NAN).unwrap();
        r.set_nodata(Some(f64::NAN));

        let rgba = raster_to_rgba(&r, &ColormapParams::new(ColorScheme::Susceptibility));
        assert_eq!(rgba.len(), 16);
        assert_eq!(&rgba[0..4], &[0x22, 0xdd, 0x0e, 255]);
        assert_eq!(&rgba[4..8], &[0xf9, 0xfe, 0x31, 255]);
        assert_eq!(&rgba[8..12], &[0xd7, 0x0c, 0x0c, 255]);
        assert_eq!(&rgba[12..16], &[0, 0, 0, 0]);
    }

    #[test]
    fn binary_mask_with_nodata() {
        let mut r = Raster::<u8>::new(1, 3);
        r.set(0, 1, 1).unwrap();
        r.set(0, 2, 255).unwrap();
        r.set_nodata(Some(255));
        let rgba = raster_to_rgba(&r, &ColormapParams::new(ColorScheme::Binary));
        assert_eq!(&rgba[0..4], &[255, 255, 255, 255]);
        assert_eq!(&rgba[4..8], &[255, 6, 6, 255]);
        assert_eq!(rgba[11], 0);
    }

    #[test]
    fn auto_params_range() {
        let mut r = Raster::<f64>::new(1, 3);
        r.set(0, 0, 10.0).unwrap();
        r.set(0, 1, 50.0).unwrap();
        r.set(0, 2, 100.0).unwrap();
        let params = auto_params(&r, ColorScheme::Hand);
        assert_eq!((params.min, params.max), (10.0, 100.0));
    }

    #[test]
    fn auto_params_constant_raster() {
        let r = Raster::<f64>::filled(2, 2, 42.0);
        let params = auto_params(&r, ColorScheme::Terrain);
        assert_eq!((params.min, params.max), (42.0, 43.0));
    }
}
