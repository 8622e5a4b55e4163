//! PASTIS error budget
//!
//! Turns a PASTIS matrix and a target contrast into tolerances:
//! - per-mode tolerances `σ` and their cumulative/individual contrast
//! - independent per-segment tolerances `μ` and the mode budget they imply
//! - Monte-Carlo checks of both against the target
//! - optionally a hockey-stick curve against the calibration model

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use ndarray::{Array1, Array2};
use pastis::forward_model::{Reference, ReferenceSummary};
use pastis::models::LinearFieldModel;
use pastis::monte_carlo::{hockeystick_curve, random_mode_contrasts, random_segment_contrasts};
use pastis::requirements::{delta_sigma, Accumulation, PastisModes, RequirementVector};
use pastis::shared_args::SharedAnalysisArgs;
use pastis::PastisMatrix;
use serde::Serialize;

/// Command line arguments for the error budget
#[derive(Parser, Debug)]
#[command(
    name = "PASTIS Error Budget",
    about = "Derives mode and segment tolerances from a PASTIS matrix"
)]
struct Args {
    #[command(flatten)]
    shared: SharedAnalysisArgs,

    /// PASTIS matrix (JSON)
    #[arg(long)]
    matrix: PathBuf,

    /// Reference summary written next to the matrix (JSON)
    #[arg(long)]
    reference: Option<PathBuf>,

    /// Calibration model for the hockey-stick comparison (JSON)
    #[arg(long)]
    calibration: Option<PathBuf>,

    /// Target contrast, overrides the configuration
    #[arg(long)]
    c_target: Option<f64>,
}

#[derive(Serialize)]
struct BudgetSummary {
    c_target: f64,
    c_floor: f64,
    eigenvalues: Array1<f64>,
    cumulative_contrast: Array1<f64>,
    individual_contrast: Array1<f64>,
    optimized_sigmas: Array1<f64>,
    dynamic_sigmas: Option<Array1<f64>>,
    statistical_mean_contrast: f64,
    contrast_std: f64,
    monte_carlo_segment_mean: f64,
    monte_carlo_mode_mean: f64,
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();
    let config = args.shared.load_config()?;

    let matrix = PastisMatrix::load_from_file(&args.matrix)
        .with_context(|| format!("loading matrix {}", args.matrix.display()))?;
    let c_target = args.c_target.unwrap_or(config.budget.c_target);
    let c_floor = match (config.budget.coronagraph_floor, &args.reference) {
        (Some(floor), _) => floor,
        (None, Some(path)) => ReferenceSummary::load_from_file(path)?.contrast_floor,
        (None, None) => 0.0,
    };

    println!("=== PASTIS Error Budget ===");
    println!("Modes: {}", matrix.num_modes());
    println!("Target contrast: {c_target:.3e}");
    println!("Coronagraph floor: {c_floor:.3e}");

    let modes = PastisModes::from_matrix(&matrix)?;
    let sigmas = modes.uniform_sigmas(c_target, c_floor)?;
    let mus = modes.segment_tolerances(&matrix, c_target, c_floor)?;
    let optimized_sigmas = modes.optimized_sigmas(&mus.view())?;

    let cumulative_contrast =
        modes.contrast_per_mode(&matrix, &sigmas.view(), c_floor, Accumulation::Cumulative)?;
    let individual_contrast =
        modes.contrast_per_mode(&matrix, &sigmas.view(), c_floor, Accumulation::Individual)?;

    let dynamic_sigmas = match config.budget.c_dynamic {
        Some(c_dyn) => Some(
            modes
                .eigenvalues()
                .iter()
                .map(|&lambda| delta_sigma(c_dyn, modes.num_modes(), lambda))
                .collect::<Result<Array1<f64>, _>>()?,
        ),
        None => None,
    };

    let segment_covariance = Array2::from_diag(&mus.mapv(|m| m * m));
    let statistical_mean_contrast =
        matrix.statistical_mean_contrast(&segment_covariance.view(), c_floor)?;
    let contrast_std = matrix.contrast_variance(&segment_covariance.view())?.sqrt();

    let seed = config.closed_loop.seed;
    let draws = config.budget.monte_carlo_draws;
    let segment_draws = random_segment_contrasts(&matrix, &mus.view(), c_floor, draws, seed)?;
    let mode_draws = random_mode_contrasts(&modes, &matrix, &sigmas.view(), c_floor, draws, seed)?;

    let summary = BudgetSummary {
        c_target,
        c_floor,
        eigenvalues: modes.eigenvalues().to_owned(),
        cumulative_contrast,
        individual_contrast,
        optimized_sigmas,
        dynamic_sigmas,
        statistical_mean_contrast,
        contrast_std,
        monte_carlo_segment_mean: segment_draws.mean().unwrap_or(f64::NAN),
        monte_carlo_mode_mean: mode_draws.mean().unwrap_or(f64::NAN),
    };

    let sigma_path = args.shared.output_path("mode_requirements.json")?;
    RequirementVector::modes(sigmas.clone()).save_to_file(&sigma_path)?;
    let mu_path = args.shared.output_path("segment_requirements.json")?;
    RequirementVector::segments(mus.clone()).save_to_file(&mu_path)?;
    let summary_path = args.shared.output_path("budget_summary.json")?;
    pastis::io::write_json(&summary_path, &summary)?;

    println!();
    println!("{:>6} {:>12} {:>12} {:>12}", "Mode", "Eigenvalue", "Sigma (nm)", "Cumulative");
    println!("{}", "-".repeat(46));
    for k in 0..modes.num_modes() {
        println!(
            "{:>6} {:>12.4e} {:>12.4} {:>12.4e}",
            k,
            summary.eigenvalues[k],
            sigmas[k],
            summary.cumulative_contrast[k]
        );
    }
    println!();
    println!(
        "Segment budget: mean contrast {:.4e} +/- {:.4e}",
        summary.statistical_mean_contrast, summary.contrast_std
    );
    println!(
        "Monte Carlo ({draws} draws): segments {:.4e}, modes {:.4e}",
        summary.monte_carlo_segment_mean, summary.monte_carlo_mode_mean
    );

    if let Some(path) = &args.calibration {
        let model = LinearFieldModel::load_from_file(path)
            .with_context(|| format!("loading calibration {}", path.display()))?;
        let reference = Reference::compute(&model)?;
        let calibration = config.calibration.calibration()?;
        let curve = hockeystick_curve(
            &model,
            &matrix,
            &reference,
            &calibration,
            &config.budget.hockeystick_rms,
            config.budget.hockeystick_realizations,
            seed,
        )?;
        let curve_path = args.shared.output_path("hockeystick.json")?;
        pastis::io::write_json(&curve_path, &curve)?;
        println!(
            "Hockey-stick: max relative deviation {:.3e}",
            curve.max_relative_error()
        );
        println!("Wrote {}", curve_path.display());
    }

    println!("Wrote {}", sigma_path.display());
    println!("Wrote {}", mu_path.display());
    println!("Wrote {}", summary_path.display());
    Ok(())
}
