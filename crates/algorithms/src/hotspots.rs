//! Hotspot extraction
//!
//! A flood raster is intersected with the urban mask, split into connected
//! components and filtered by true ground area. Component growth stops at
//! `max_component_px`; the rest of an oversized region seeds further
//! components, and the capped component is flagged as truncated.

use crate::classification::{ClassifiedRaster, Method};
use crate::config::PipelineConfig;
use crate::covariates::band;
use crate::statistics::{class_mask, mask_and};
use floodmap_core::raster::{offset_cell, Connectivity, GridSpec, Raster};
use floodmap_core::{Error, FeatureStack, Result};
use serde::Serialize;
use std::collections::VecDeque;
use tracing::{info, warn};

/// Parameters for hotspot extraction
#[derive(Debug, Clone)]
pub struct HotspotParams {
    pub connectivity: Connectivity,
    pub max_component_px: usize,
    pub min_area_m2: f64,
}

impl Default for HotspotParams {
    fn default() -> Self {
        Self {
            connectivity: Connectivity::Four,
            max_component_px: 1024,
            min_area_m2: 3000.0,
        }
    }
}

impl HotspotParams {
    pub fn from_config(cfg: &PipelineConfig) -> Self {
        Self {
            connectivity: cfg.connectivity,
            max_component_px: cfg.max_component_px,
            min_area_m2: cfg.min_hotspot_area_m2,
        }
    }
}

/// One retained connected region
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Hotspot {
    /// Value of the region in the label raster, from 1
    pub id: u32,
    pub pixel_count: usize,
    pub area_m2: f64,
    /// `[min_row, min_col, max_row, max_col]`
    pub bbox: [usize; 4],
    /// Growth stopped at the size cap
    pub truncated: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct HotspotReport {
    pub method: String,
    pub connectivity: Connectivity,
    pub min_area_m2: f64,
    /// Flood and urban pixels before grouping
    pub candidate_pixels: usize,
    pub components: usize,
    pub kept: usize,
    pub truncated_components: usize,
    pub kept_area_m2: f64,
}

/// Hotspots of one classified raster
#[derive(Debug, Clone)]
pub struct HotspotSet {
    pub source: Method,
    pub connectivity: Connectivity,
    /// Binary raster holding only the retained hotspots
    pub mask: Raster<u8>,
    /// Component ids of the retained hotspots, 0 elsewhere
    pub labels: Raster<u32>,
    pub hotspots: Vec<Hotspot>,
    pub report: HotspotReport,
}

/// Urban cells of the stack's land-cover band.
pub fn urban_mask(stack: &FeatureStack, urban_class: u8) -> Result<Raster<u8>> {
    Ok(class_mask(stack.band(band::LANDCOVER)?, urban_class))
}

struct Component {
    cells: Vec<(usize, usize)>,
    truncated: bool,
}

/// Label connected non-zero cells of `mask`, capping component size.
fn connected_components(mask: &Raster<u8>, connectivity: Connectivity, max_px: usize) -> Vec<Component> {
    let (rows, cols) = mask.shape();
    let nodata = mask.nodata();
    let is_set = |r: usize, c: usize| {
        let v = unsafe { mask.get_unchecked(r, c) };
        v != 0 && Some(v) != nodata
    };
    let mut visited = vec![false; rows * cols];
    let mut components = Vec::new();
    let mut queue = VecDeque::new();

    for row in 0..rows {
        for col in 0..cols {
            if visited[row * cols + col] || !is_set(row, col) {
                continue;
            }
            visited[row * cols + col] = true;
            queue.clear();
            queue.push_back((row, col));
            let mut cells = Vec::new();
            let mut enqueued = 1usize;
            let mut truncated = false;

            while let Some((r, c)) = queue.pop_front() {
                cells.push((r, c));
                for &(dr, dc) in connectivity.offsets() {
                    let Some((nr, nc)) = offset_cell(r, c, dr, dc, rows, cols) else {
                        continue;
                    };
                    let idx = nr * cols + nc;
                    if visited[idx] || !is_set(nr, nc) {
                        continue;
                    }
                    if enqueued >= max_px {
                        truncated = true;
                        continue;
                    }
                    visited[idx] = true;
                    enqueued += 1;
                    queue.push_back((nr, nc));
                }
            }
            components.push(Component { cells, truncated });
        }
    }
    components
}

/// Extract hotspots of `classified` inside `urban`.
pub fn extract_hotspots(
    classified: &ClassifiedRaster,
    urban: &Raster<u8>,
    grid: &GridSpec,
    params: &HotspotParams,
) -> Result<HotspotSet> {
    if params.max_component_px == 0 {
        return Err(Error::invalid_param("max_component_px", 0, "must be >= 1"));
    }
    if !(params.min_area_m2 >= 0.0) {
        return Err(Error::invalid_param("min_hotspot_area_m2", params.min_area_m2, "must be >= 0"));
    }
    grid.ensure_matches(&classified.method.name(), &classified.raster)?;

    let candidates = mask_and(&classified.raster, urban)?;
    let candidate_pixels = candidates.data().iter().filter(|v| **v == 1).count();
    let components = connected_components(&candidates, params.connectivity, params.max_component_px);

    let mut mask = grid.raster(0u8);
    let mut labels = grid.raster(0u32);
    let mut hotspots = Vec::new();
    let mut truncated_components = 0;

    for comp in &components {
        if comp.truncated {
            truncated_components += 1;
        }
        let area_m2: f64 = comp.cells.iter().map(|(r, _)| grid.pixel_area_m2(*r)).sum();
        if area_m2 < params.min_area_m2 {
            continue;
        }
        let id = hotspots.len() as u32 + 1;
        let mut bbox = [usize::MAX, usize::MAX, 0, 0];
        for &(r, c) in &comp.cells {
            mask.set(r, c, 1)?;
            labels.set(r, c, id)?;
            bbox = [bbox[0].min(r), bbox[1].min(c), bbox[2].max(r), bbox[3].max(c)];
        }
        hotspots.push(Hotspot {
            id,
            pixel_count: comp.cells.len(),
            area_m2,
            bbox,
            truncated: comp.truncated,
        });
    }

    let method = classified.method.name();
    if truncated_components > 0 {
        warn!(
            method = %method,
            components = truncated_components,
            cap = params.max_component_px,
            "components truncated at size cap"
        );
    }
    let report = HotspotReport {
        method: method.clone(),
        connectivity: params.connectivity,
        min_area_m2: params.min_area_m2,
        candidate_pixels,
        components: components.len(),
        kept: hotspots.len(),
        truncated_components,
        kept_area_m2: hotspots.iter().map(|h| h.area_m2).sum(),
    };
    info!(
        method = %method,
        components = report.components,
        kept = report.kept,
        area_m2 = report.kept_area_m2,
        "hotspots extracted"
    );

    Ok(HotspotSet {
        source: classified.method.clone(),
        connectivity: params.connectivity,
        mask,
        labels,
        hotspots,
        report,
    })
}
