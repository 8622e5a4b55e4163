//! Closed-loop contrast estimation
//!
//! Replays a calibration (science and sensor Jacobians) through the
//! recursive or batch estimator and writes the iteration history as JSON and
//! CSV.

use std::path::PathBuf;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::Parser;
use pastis::closed_loop::{ClosedLoop, EstimatorVariant};
use pastis::forward_model::{ForwardModel, Reference};
use pastis::models::LinearFieldModel;
use pastis::requirements::RequirementVector;
use pastis::shared_args::SharedAnalysisArgs;

/// Command line arguments for the closed-loop estimator
#[derive(Parser, Debug)]
#[command(
    name = "PASTIS Closed Loop",
    about = "Estimates the contrast held by a closed wavefront-sensing loop"
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

    /// Number of iterations, overrides the configuration
    #[arg(long)]
    iterations: Option<usize>,
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();
    let mut config = args.shared.load_config()?;
    if let Some(iterations) = args.iterations {
        config.closed_loop.iterations = iterations;
    }
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

    let closed_loop = ClosedLoop::new(
        model.science_jacobian(),
        model.sensor_jacobian(),
        model.dark_hole(),
        reference.norm,
        process_noise,
        config.closed_loop.params(),
    )?;

    println!("=== PASTIS Closed Loop ===");
    println!("Modes: {}", model.num_modes());
    println!("Variant: {variant:?}");
    println!("Exposure: {} s, flux: {:.3e}", config.closed_loop.exposure_time, config.closed_loop.flux);
    println!("Iterations: {}", config.closed_loop.iterations);

    let start = Instant::now();
    let history = closed_loop.run(variant)?;
    log::info!("Estimator finished in {:.2?}", start.elapsed());

    let json_path = args.shared.output_path("closed_loop_history.json")?;
    history.save_to_file(&json_path)?;
    let csv_path = args.shared.output_path("closed_loop_history.csv")?;
    history.write_csv(&csv_path)?;

    println!();
    println!("Coronagraph floor: {:.4e}", reference.contrast_floor);
    if let Some(average) = history.final_average() {
        println!("Final averaged contrast: {average:.4e}");
    }
    if let Some(settled) = history.settled_average() {
        println!("Settled contrast above floor: {:.4e}", settled - reference.contrast_floor);
    }
    println!("Wrote {}", json_path.display());
    println!("Wrote {}", csv_path.display());
    Ok(())
}
