//! Exposure-time sweep of the closed loop
//!
//! Runs the estimator over a grid of exposure times, drift scales and stellar
//! magnitudes and records the final averaged contrast above the coronagraph floor
//! for each cell.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use pastis::closed_loop::{ClosedLoop, EstimatorVariant};
use pastis::forward_model::{ForwardModel, Reference};
use pastis::models::LinearFieldModel;
use pastis::requirements::RequirementVector;
use pastis::shared_args::SharedAnalysisArgs;

/// Command line arguments for the exposure sweep
#[derive(Parser, Debug)]
#[command(
    name = "PASTIS Exposure Sweep",
    about = "Closed-loop contrast versus exposure time, drift scale and stellar magnitude"
)]
struct Args {
    #[command(flatten)]
    shared: SharedAnalysisArgs,

    /// Calibration model with science and sensor Jacobians (JSON)
    #[arg(long)]
    calibration: PathBuf,

    /// Drift tolerances per commandable mode, e.g. segment_requirements.json; identity drift when omitted
    #[arg(long)]
    tolerances: Option<PathBuf>,

    /// Estimator variant, overrides the configuration
    #[arg(long, value_enum)]
    variant: Option<EstimatorVariant>,
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();
    let config = args.shared.load_config()?;
    let variant = args.variant.unwrap_or(config.closed_loop.variant);

    let model = LinearFieldModel::load_from_file(&args.calibration)
        .with_context(|| format!("loading calibration {}", args.calibration.display()))?;
    let reference = Reference::compute(&model)?;

    let tolerances = match &args.tolerances {
        Some(path) => Some(RequirementVector::load_from_file(path)?.values),
        None => None,
    };
    let process_noise = config
        .closed_loop
        .process_noise(model.num_modes(), tolerances.as_ref().map(|t| t.view()).as_ref())?;

    let base = ClosedLoop::new(
        model.science_jacobian(),
        model.sensor_jacobian(),
        model.dark_hole(),
        reference.norm,
        process_noise,
        config.closed_loop.params(),
    )?;
    let sweep = config.sweep.sweep(variant, reference.contrast_floor);

    println!("=== PASTIS Exposure Sweep ===");
    println!("Variant: {variant:?}");
    println!(
        "Grid: {} times x {} drift scales x {} magnitudes",
        sweep.exposure_times.len(),
        sweep.drift_scales.len(),
        sweep.magnitudes.len()
    );

    let pb = ProgressBar::new(sweep.num_cells() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{msg} [{bar:40.cyan/blue}] {pos}/{len} ({per_sec}) ETA: {eta}")
            .context("progress bar template")?
            .progress_chars("#>-"),
    );
    pb.set_message("Sweeping");
    let result = sweep.run_with_progress(&base, || pb.inc(1))?;
    pb.finish_with_message("Done");

    let csv_path = args.shared.output_path("exposure_sweep.csv")?;
    result.write_csv(&csv_path)?;
    let json_path = args.shared.output_path("exposure_sweep.json")?;
    pastis::io::write_json(&json_path, &result)?;

    println!("Wrote {}", csv_path.display());
    println!("Wrote {}", json_path.display());
    Ok(())
}
