//! PASTIS matrix builder
//!
//! Measures a PASTIS matrix from a linear field model, either loaded from a
//! calibration file or generated synthetically, and writes:
//! - `matrix.json`: the symmetric matrix in contrast/nm²
//! - `reference.json`: direct PSF peak and coronagraph floor
//! - `calibration.json`: the measured Jacobians as a replayable model, with
//!   the sensor plane binned if requested

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use pastis::forward_model::ForwardModel;
use pastis::matrix::{MatrixMode, PastisMatrixBuilder};
use pastis::models::{LinearFieldModel, SyntheticLayout};
use pastis::sensitivity::measure_jacobians;
use pastis::shared_args::SharedAnalysisArgs;

/// Command line arguments for matrix construction
#[derive(Parser, Debug)]
#[command(
    name = "PASTIS Matrix",
    about = "Builds the PASTIS contrast sensitivity matrix from a forward model"
)]
struct Args {
    #[command(flatten)]
    shared: SharedAnalysisArgs,

    /// Linear field model to calibrate (JSON); a synthetic model is used when omitted
    #[arg(long)]
    model: Option<PathBuf>,

    /// Number of modes of the synthetic model
    #[arg(long, default_value_t = 12)]
    synthetic_modes: usize,

    /// Measurement mode, overrides the configuration
    #[arg(long, value_enum)]
    mode: Option<MatrixMode>,
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();
    let config = args.shared.load_config()?;

    let model = match &args.model {
        Some(path) => LinearFieldModel::load_from_file(path)
            .with_context(|| format!("loading model {}", path.display()))?,
        None => {
            let layout = SyntheticLayout {
                num_modes: args.synthetic_modes,
                ..Default::default()
            };
            LinearFieldModel::synthetic(&layout, config.closed_loop.seed)?
        }
    };

    let calibration = config.calibration.calibration()?;
    let mode = args.mode.unwrap_or(config.calibration.mode);

    println!("=== PASTIS Matrix ===");
    println!("Modes: {}", model.num_modes());
    println!("Dark hole pixels: {}", model.dark_hole().num_pixels());
    println!("Calibration amplitude: {} nm", calibration.amplitude_nm());
    println!("Mode: {mode:?}");

    let build = PastisMatrixBuilder::new(&model, calibration)
        .mode(mode)
        .build()?;

    let matrix_path = args.shared.output_path("matrix.json")?;
    build.matrix.save_to_file(&matrix_path)?;
    let reference_path = args.shared.output_path("reference.json")?;
    build.reference.summary().save_to_file(&reference_path)?;

    let jacobians = match build.jacobians {
        Some(jacobians) => jacobians,
        None => measure_jacobians(&model, &build.reference, calibration.amplitude)?,
    }
    .with_sensor_binning(config.calibration.sensor_binning)?;
    let replay = LinearFieldModel::new(
        jacobians.science,
        jacobians.sensor,
        model.direct().clone(),
        model.dark_hole().clone(),
    )?;
    let calibration_path = args.shared.output_path("calibration.json")?;
    replay.save_to_file(&calibration_path)?;

    println!();
    println!("Forward evaluations: {}", build.forward_evaluations);
    println!("Normalization: {:.6e}", build.reference.norm);
    println!("Coronagraph floor: {:.6e}", build.reference.contrast_floor);
    if args.shared.debug {
        let m = build.matrix.view();
        for i in 0..m.nrows().min(6) {
            let row: Vec<String> = (0..m.ncols().min(6))
                .map(|j| format!("{:>11.3e}", m[[i, j]]))
                .collect();
            println!("{}", row.join(" "));
        }
    }
    println!("Wrote {}", matrix_path.display());
    println!("Wrote {}", reference_path.display());
    println!("Wrote {}", calibration_path.display());
    Ok(())
}
