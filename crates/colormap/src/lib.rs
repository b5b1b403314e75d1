//! # floodmap colormap
//!
//! Colour schemes and raster-to-RGBA rendering for the pipeline outputs:
//! the susceptibility surface and its threshold slices (animation frames),
//! HAND, and binary flood and hotspot masks.
//!
//! ## Usage
//!
//! ```ignore
//! use floodmap_colormap::{raster_to_rgba, ColorScheme, ColormapParams};
//!
//! let rgba = raster_to_rgba(&slice, &ColormapParams::new(ColorScheme::Susceptibility));
//! ```

mod render;
mod scheme;

pub use render::{auto_params, raster_to_rgba, ColormapParams};
pub use scheme::{evaluate, ColorScheme, ColorStop, Rgb};
