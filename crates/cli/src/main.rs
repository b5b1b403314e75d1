//! floodmap CLI - urban flood susceptibility pipeline

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use floodmap_algorithms::classification::{
    cluster_classify, hand_slice, refine_labels, rf_classify, ClassifiedRaster, ClusterParams, Method, PuParams,
    RfParams,
};
use floodmap_algorithms::config::PipelineConfig;
use floodmap_algorithms::covariates::{build_feature_stack, load_inputs};
use floodmap_algorithms::hotspots::{extract_hotspots, urban_mask, HotspotParams, HotspotSet};
use floodmap_algorithms::pipeline::{run_pipeline, to_f64, PipelineRun};
use floodmap_algorithms::sampling::{sample_labels, SamplingParams};
use floodmap_algorithms::statistics::describe;
use floodmap_algorithms::susceptibility::{susceptibility_index, SusceptibilityParams, ThresholdSlice};
use floodmap_colormap::{auto_params, raster_to_rgba, ColorScheme, ColormapParams};
use floodmap_core::io::{read_geotiff, read_samples, write_records, write_samples, CLASS_COLUMN, REFINED_CLASS_COLUMN};
use floodmap_core::raster::{Raster, RasterElement, ResampleMethod};
use floodmap_core::store::{DirectoryStore, RasterStore, WriteOptions};
use floodmap_core::FeatureStack;

// ─── CLI structure ──────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "floodmap")]
#[command(author, version, about = "Urban flood susceptibility mapping", long_about = None)]
struct Cli {
    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Options shared by every stage that reads the input layers
#[derive(clap::Args)]
struct StageArgs {
    /// Pipeline configuration (JSON); defaults apply when omitted
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Directory holding the input layers (`<id>.tif`, `<id>.geojson`)
    #[arg(short, long, default_value = ".")]
    data: PathBuf,
    /// Prefix of the layer ids written
    #[arg(long)]
    output_prefix: Option<String>,
    /// Target resolution in metres
    #[arg(long)]
    resolution: Option<f64>,
    /// Seed for sampling, PU refinement, clustering and the forest
    #[arg(long)]
    seed: Option<u64>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run every stage and write rasters, tables, frames and the run report
    Run {
        #[command(flatten)]
        stage: StageArgs,
        /// Skip rendering the threshold slice frames
        #[arg(long)]
        no_frames: bool,
    },
    /// Build the covariate stack and write one raster per band
    Covariates {
        #[command(flatten)]
        stage: StageArgs,
    },
    /// Draw labelled samples from the class band into a CSV table
    Sample {
        #[command(flatten)]
        stage: StageArgs,
        /// Output CSV
        output: PathBuf,
    },
    /// Refine a sample table with the spy technique
    Refine {
        /// Pipeline configuration (JSON)
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Sample table written by `sample`
        input: PathBuf,
        /// Output CSV with a `new_class` column
        output: PathBuf,
    },
    /// Classify the stack with the HAND slicer, x-means and random forest
    Classify {
        #[command(flatten)]
        stage: StageArgs,
        /// Refined sample table written by `refine`
        samples: PathBuf,
    },
    /// Extract urban hotspots from a binary flood raster
    Hotspots {
        #[command(flatten)]
        stage: StageArgs,
        /// Binary flood raster
        input: PathBuf,
        /// Output CSV of hotspot metadata
        output: PathBuf,
    },
    /// Build the susceptibility surface from a refined sample table
    Susceptibility {
        #[command(flatten)]
        stage: StageArgs,
        /// Refined sample table written by `refine`
        samples: PathBuf,
    },
    /// Render a raster to PNG
    Render {
        /// Input raster file
        input: PathBuf,
        /// Output PNG
        output: PathBuf,
        /// Scheme: susceptibility, hand, binary, blues, terrain, grayscale
        #[arg(short, long, default_value = "susceptibility")]
        scheme: String,
        /// Lower end of the colour ramp; data minimum when omitted
        #[arg(long)]
        min: Option<f64>,
        /// Upper end of the colour ramp; data maximum when omitted
        #[arg(long)]
        max: Option<f64>,
    },
    /// Show information about a raster file
    Info {
        /// Input raster file
        input: PathBuf,
    },
}

// ─── Helpers ────────────────────────────────────────────────────────────

fn setup_logging(verbose: bool) -> Result<()> {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber).context("setting default subscriber failed")
}

fn spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg}") {
        pb.set_style(style);
    }
    pb.set_message(msg.to_string());
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    pb
}

fn load_config(path: Option<&Path>) -> Result<PipelineConfig> {
    let Some(path) = path else {
        return Ok(PipelineConfig::default());
    };
    let text = std::fs::read_to_string(path).with_context(|| format!("Failed to read config {}", path.display()))?;
    PipelineConfig::from_json(&text).with_context(|| format!("Invalid config {}", path.display()))
}

impl StageArgs {
    fn config(&self) -> Result<PipelineConfig> {
        let mut cfg = load_config(self.config.as_deref())?;
        if let Some(prefix) = &self.output_prefix {
            cfg.output_prefix = prefix.clone();
        }
        if let Some(res) = self.resolution {
            cfg.target_resolution_m = res;
        }
        if let Some(seed) = self.seed {
            cfg.sample_seed = seed;
            cfg.pu_seed = seed;
            cfg.cluster_seed = seed;
            cfg.rf_seed = seed;
            cfg.split_seed = seed;
        }
        cfg.validate().context("Invalid configuration")?;
        Ok(cfg)
    }

    fn store(&self) -> DirectoryStore {
        DirectoryStore::new(&self.data)
    }

    /// Directory where tables, frames and the report land
    fn output_dir(&self, cfg: &PipelineConfig) -> Result<PathBuf> {
        let dir = self.data.join(&cfg.output_prefix);
        std::fs::create_dir_all(&dir).with_context(|| format!("Failed to create {}", dir.display()))?;
        Ok(dir)
    }
}

fn build_stack(stage: &StageArgs, cfg: &PipelineConfig) -> Result<FeatureStack> {
    let pb = spinner("Loading input layers...");
    let inputs = load_inputs(&stage.store(), cfg).context("Failed to load input layers")?;
    pb.finish_and_clear();
    let (stack, _report) = build_feature_stack(&inputs, cfg).context("Failed to build covariate stack")?;
    Ok(stack)
}

fn write_options(cfg: &PipelineConfig, categorical: bool) -> WriteOptions {
    WriteOptions {
        crs: Some(cfg.target_crs()),
        method: if categorical { ResampleMethod::Nearest } else { ResampleMethod::Bilinear },
        ..Default::default()
    }
}

fn write_layer(store: &mut DirectoryStore, id: &str, raster: &Raster<f64>, opts: &WriteOptions) -> Result<()> {
    store
        .write(id, raster, opts)
        .with_context(|| format!("Failed to write layer {}", id))
}

fn write_json<T: Serialize>(value: &T, path: &Path) -> Result<()> {
    let text = serde_json::to_string_pretty(value).context("Failed to serialise report")?;
    std::fs::write(path, text).with_context(|| format!("Failed to write {}", path.display()))
}

#[derive(Serialize)]
struct HotspotRow<'a> {
    method: &'a str,
    id: u32,
    pixel_count: usize,
    area_m2: f64,
    min_row: usize,
    min_col: usize,
    max_row: usize,
    max_col: usize,
    truncated: bool,
}

fn hotspot_rows(set: &HotspotSet) -> Vec<HotspotRow<'_>> {
    set.hotspots
        .iter()
        .map(|h| HotspotRow {
            method: &set.report.method,
            id: h.id,
            pixel_count: h.pixel_count,
            area_m2: h.area_m2,
            min_row: h.bbox[0],
            min_col: h.bbox[1],
            max_row: h.bbox[2],
            max_col: h.bbox[3],
            truncated: h.truncated,
        })
        .collect()
}

#[derive(Serialize)]
struct WeightRow<'a> {
    covariate: &'a str,
    weight: f64,
}

fn write_png<T: RasterElement>(raster: &Raster<T>, params: &ColormapParams, path: &Path) -> Result<()> {
    let (rows, cols) = raster.shape();
    let rgba = raster_to_rgba(raster, params);
    let img = image::RgbaImage::from_raw(cols as u32, rows as u32, rgba)
        .with_context(|| format!("RGBA buffer does not match {} x {}", cols, rows))?;
    img.save(path).with_context(|| format!("Failed to write {}", path.display()))
}

fn write_frames(slices: &[ThresholdSlice], dir: &Path) -> Result<usize> {
    std::fs::create_dir_all(dir).with_context(|| format!("Failed to create {}", dir.display()))?;
    let params = ColormapParams::new(ColorScheme::Susceptibility);
    for (i, slice) in slices.iter().enumerate() {
        let path = dir.join(format!("frame_{:02}_level_{}.png", i, slice.level));
        write_png(&slice.raster, &params, &path)?;
    }
    Ok(slices.len())
}

fn parse_scheme(s: &str) -> Result<ColorScheme> {
    match s.to_lowercase().as_str() {
        "susceptibility" | "risk" => Ok(ColorScheme::Susceptibility),
        "hand" => Ok(ColorScheme::Hand),
        "binary" | "mask" => Ok(ColorScheme::Binary),
        "blues" | "distance" => Ok(ColorScheme::Blues),
        "terrain" | "elevation" => Ok(ColorScheme::Terrain),
        "grayscale" | "gray" | "grey" => Ok(ColorScheme::Grayscale),
        _ => anyhow::bail!(
            "Unknown scheme: {}. Use susceptibility, hand, binary, blues, terrain or grayscale.",
            s
        ),
    }
}

fn classify_all(stack: &FeatureStack, refined_path: &Path, cfg: &PipelineConfig) -> Result<Vec<ClassifiedRaster>> {
    let covariates = SamplingParams::from_config(cfg).covariates;
    let refined = read_samples(refined_path, &covariates, REFINED_CLASS_COLUMN)
        .with_context(|| format!("Failed to read {}", refined_path.display()))?;

    let mut classified = Vec::new();
    for &h in &cfg.hand_thresholds_m {
        classified.push(hand_slice(stack, h).with_context(|| format!("HAND slice at {} m failed", h))?);
    }
    let (cluster, _) =
        cluster_classify(stack, &refined, &ClusterParams::from_config(cfg)).context("Clustering failed")?;
    classified.push(cluster);
    let (rf, _, report) = rf_classify(stack, &refined, &RfParams::from_config(cfg)).context("Random forest failed")?;
    if let Some(test) = &report.test {
        info!(accuracy = test.overall_accuracy, kappa = test.kappa, "random forest test accuracy");
    }
    classified.push(rf);
    Ok(classified)
}

fn done(name: &str, path: &Path, elapsed: std::time::Duration) {
    println!("{} saved to: {}", name, path.display());
    println!("  Processing time: {:.2?}", elapsed);
}

fn summarize(run: &PipelineRun) {
    println!("\nHotspots:");
    for h in &run.report.hotspots {
        println!(
            "  {:<24} {:>5} kept of {:>6} components, {:>10.1} m²",
            h.method, h.kept, h.components, h.kept_area_m2
        );
    }
    println!("\nCoverage of urban risk sectors ({:.2} ha):", run.report.validation.reference_area_ha);
    for c in &run.report.validation.methods {
        println!(
            "  {:<24} {:>8.2} ha overlap, {:>6.1}%",
            c.method, c.overlap_area_ha, c.coverage_pct
        );
    }
    println!("\nWeights:");
    for (name, w) in run.weights.iter() {
        println!("  {:<28} {:.4}", name, w);
    }
}

// ─── Main ───────────────────────────────────────────────────────────────

fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose)?;

    match cli.command {
        // ── Full pipeline ────────────────────────────────────────────
        Commands::Run { stage, no_frames } => {
            let cfg = stage.config()?;
            let out_dir = stage.output_dir(&cfg)?;
            let mut store = stage.store();

            let start = Instant::now();
            let run = run_pipeline(&mut store, &cfg).context("Pipeline failed")?;
            let elapsed = start.elapsed();

            let pb = spinner("Writing tables...");
            write_samples(out_dir.join("samples.csv"), &run.samples, CLASS_COLUMN)
                .context("Failed to write samples")?;
            write_samples(out_dir.join("samples_refined.csv"), &run.refined, REFINED_CLASS_COLUMN)
                .context("Failed to write refined samples")?;
            let rows: Vec<HotspotRow> = run.hotspots.iter().flat_map(hotspot_rows).collect();
            write_records(out_dir.join("hotspots.csv"), &rows).context("Failed to write hotspot table")?;
            let weights: Vec<WeightRow> = run
                .weights
                .iter()
                .map(|(covariate, weight)| WeightRow { covariate, weight })
                .collect();
            write_records(out_dir.join("weights.csv"), &weights).context("Failed to write weights")?;
            write_json(&run.report, &out_dir.join("report.json"))?;
            pb.finish_and_clear();

            if !no_frames {
                let pb = spinner("Rendering frames...");
                let n = write_frames(&run.slices, &out_dir.join("frames"))?;
                pb.finish_and_clear();
                info!(frames = n, "threshold slices rendered");
            }

            summarize(&run);
            done("Run", &out_dir, elapsed);
        }

        // ── Stages ───────────────────────────────────────────────────
        Commands::Covariates { stage } => {
            let cfg = stage.config()?;
            let start = Instant::now();
            let stack = build_stack(&stage, &cfg)?;
            let elapsed = start.elapsed();

            let mut store = stage.store();
            let pb = spinner("Writing bands...");
            for (name, raster) in stack.iter() {
                let categorical = name == floodmap_algorithms::covariates::band::LANDCOVER
                    || name == floodmap_algorithms::covariates::band::CLASS;
                let id = cfg.output_id(&format!("stack/{name}"));
                write_layer(&mut store, &id, raster, &write_options(&cfg, categorical))?;
            }
            pb.finish_and_clear();
            done("Covariate stack", &stage.data.join(&cfg.output_prefix).join("stack"), elapsed);
        }

        Commands::Sample { stage, output } => {
            let cfg = stage.config()?;
            let start = Instant::now();
            let stack = build_stack(&stage, &cfg)?;
            let (samples, report) =
                sample_labels(&stack, &SamplingParams::from_config(&cfg)).context("Sampling failed")?;
            let elapsed = start.elapsed();
            write_samples(&output, &samples, CLASS_COLUMN).context("Failed to write samples")?;
            println!(
                "Positives: {} / {}, unlabeled: {} / {}",
                report.realized_positive, report.requested_positive, report.realized_unlabeled, report.requested_unlabeled
            );
            done("Samples", &output, elapsed);
        }

        Commands::Refine { config, input, output } => {
            let cfg = load_config(config.as_deref())?;
            cfg.validate().context("Invalid configuration")?;
            let covariates = SamplingParams::from_config(&cfg).covariates;
            let samples = read_samples(&input, &covariates, CLASS_COLUMN)
                .with_context(|| format!("Failed to read {}", input.display()))?;

            let start = Instant::now();
            let (refined, report) = refine_labels(&samples, &PuParams::from_config(&cfg)).context("PU refinement failed")?;
            let elapsed = start.elapsed();
            write_samples(&output, &refined, REFINED_CLASS_COLUMN).context("Failed to write refined samples")?;
            println!(
                "Spies: {}, threshold: {:.4}, confident negatives: {} of {}",
                report.spies, report.threshold, report.confident_negatives, report.unlabeled
            );
            done("Refined samples", &output, elapsed);
        }

        Commands::Classify { stage, samples } => {
            let cfg = stage.config()?;
            let start = Instant::now();
            let stack = build_stack(&stage, &cfg)?;
            let classified = classify_all(&stack, &samples, &cfg)?;
            let elapsed = start.elapsed();

            let mut store = stage.store();
            let opts = write_options(&cfg, true);
            for c in &classified {
                let id = cfg.output_id(&format!("classified/{}", c.method.name()));
                write_layer(&mut store, &id, &to_f64(&c.raster), &opts)?;
                println!("  {:<24} {:>8} flood pixels", c.method.name(), c.flood_pixels());
            }
            done("Classified rasters", &stage.data.join(&cfg.output_prefix).join("classified"), elapsed);
        }

        Commands::Hotspots { stage, input, output } => {
            let cfg = stage.config()?;
            let stack = build_stack(&stage, &cfg)?;
            let flood: Raster<u8> = read_geotiff(&input).with_context(|| format!("Failed to read {}", input.display()))?;
            let classified = ClassifiedRaster {
                method: Method::External {
                    name: input
                        .file_stem()
                        .map(|s| s.to_string_lossy().into_owned())
                        .unwrap_or_else(|| "input".into()),
                },
                smoothing_radius: None,
                raster: flood,
            };

            let start = Instant::now();
            let urban = urban_mask(&stack, cfg.urban_class).context("Failed to build urban mask")?;
            let set = extract_hotspots(&classified, &urban, stack.grid(), &HotspotParams::from_config(&cfg))
                .context("Hotspot extraction failed")?;
            let elapsed = start.elapsed();

            write_records(&output, &hotspot_rows(&set)).context("Failed to write hotspot table")?;
            let mut store = stage.store();
            let opts = write_options(&cfg, true);
            let name = set.report.method.clone();
            write_layer(&mut store, &cfg.output_id(&format!("hotspots/{name}")), &to_f64(&set.mask), &opts)?;
            write_layer(&mut store, &cfg.output_id(&format!("hotspot_labels/{name}")), &to_f64(&set.labels), &opts)?;
            println!("Kept {} of {} components", set.report.kept, set.report.components);
            done("Hotspots", &output, elapsed);
        }

        Commands::Susceptibility { stage, samples } => {
            let cfg = stage.config()?;
            let out_dir = stage.output_dir(&cfg)?;
            let start = Instant::now();
            let stack = build_stack(&stage, &cfg)?;
            let covariates = SamplingParams::from_config(&cfg).covariates;
            let refined = read_samples(&samples, &covariates, REFINED_CLASS_COLUMN)
                .with_context(|| format!("Failed to read {}", samples.display()))?;
            let (_, _, rf) =
                rf_classify(&stack, &refined, &RfParams::from_config(&cfg)).context("Random forest failed")?;
            let (surface, report) =
                susceptibility_index(&stack, &rf.weights, cfg.urban_class, &SusceptibilityParams::from_config(&cfg))
                    .context("Susceptibility index failed")?;
            let slices = surface
                .threshold_slices(&cfg.slice_levels, cfg.smoothing_radius_px)
                .context("Threshold slicing failed")?;
            let elapsed = start.elapsed();

            let mut store = stage.store();
            let id = cfg.output_id("susceptibility");
            write_layer(&mut store, &id, surface.raster(), &write_options(&cfg, false))?;
            write_json(&report, &out_dir.join("susceptibility.json"))?;
            write_frames(&slices, &out_dir.join("frames"))?;
            println!(
                "Mean: {:.4}, median: {:.4}, effective weight: {:.4}",
                report.statistics.mean, report.statistics.median, report.effective_weight
            );
            done("Susceptibility", &store.path_for(&id, "tif"), elapsed);
        }

        // ── Utilities ────────────────────────────────────────────────
        Commands::Render {
            input,
            output,
            scheme,
            min,
            max,
        } => {
            let scheme = parse_scheme(&scheme)?;
            let raster: Raster<f64> =
                read_geotiff(&input).with_context(|| format!("Failed to read {}", input.display()))?;
            let mut params = auto_params(&raster, scheme);
            if let Some(min) = min {
                params.min = min;
            }
            if let Some(max) = max {
                params.max = max;
            }
            let start = Instant::now();
            write_png(&raster, &params, &output)?;
            done("Image", &output, start.elapsed());
        }

        Commands::Info { input } => {
            let pb = spinner("Reading raster...");
            let raster: Raster<f64> =
                read_geotiff(&input).with_context(|| format!("Failed to read {}", input.display()))?;
            pb.finish_and_clear();
            let (rows, cols) = raster.shape();
            let bounds = raster.bounds();

            println!("File: {}", input.display());
            println!("Dimensions: {} x {} ({} cells)", cols, rows, raster.len());
            println!("Cell size: {}", raster.cell_size());
            println!(
                "Bounds: ({:.3}, {:.3}) - ({:.3}, {:.3})",
                bounds.0, bounds.1, bounds.2, bounds.3
            );
            if let Some(crs) = raster.crs() {
                println!("CRS: {}", crs);
            }
            if let Some(nodata) = raster.nodata() {
                println!("NoData: {}", nodata);
            }
            let valid = raster.valid_count();
            println!(
                "Valid cells: {} ({:.1}%)",
                valid,
                100.0 * valid as f64 / raster.len().max(1) as f64
            );
            if valid > 0 {
                let stats = describe(&raster, &[], 10).context("Failed to compute statistics")?;
                println!("\nStatistics:");
                println!("  Min: {:.4}", stats.min);
                println!("  Max: {:.4}", stats.max);
                println!("  Mean: {:.4}", stats.mean);
                println!("  Std dev: {:.4}", stats.std_dev);
                for (p, v) in &stats.percentiles {
                    println!("  P{:<3} {:.4}", p, v);
                }
            }
        }
    }

    Ok(())
}
