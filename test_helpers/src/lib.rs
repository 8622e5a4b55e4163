//! Test helpers for the PASTIS workspace
//!
//! Fixtures shared by integration tests and benchmarks: toy forward models,
//! toy positive semi-definite matrices and a persistent directory for test
//! artifacts.

use std::env;
use std::path::{Path, PathBuf};

use ndarray::Array2;
use once_cell::sync::Lazy;
use pastis::models::{LinearFieldModel, SyntheticLayout};
use pastis::PastisMatrix;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, StandardNormal};

/// Error type for test helper operations
#[derive(thiserror::Error, Debug)]
pub enum TestHelperError {
    #[error("Failed to find project root: {0}")]
    ProjectRootNotFound(String),
}

/// Returns the path to the workspace root.
///
/// Walks up from the current directory until a `Cargo.toml` containing
/// `[workspace]` is found.
pub fn find_project_root() -> Result<PathBuf, TestHelperError> {
    let mut current_dir = env::current_dir().map_err(|e| {
        TestHelperError::ProjectRootNotFound(format!("Failed to get current directory: {e}"))
    })?;

    loop {
        let cargo_toml = current_dir.join("Cargo.toml");
        if cargo_toml.exists() {
            let content = std::fs::read_to_string(&cargo_toml).map_err(|e| {
                TestHelperError::ProjectRootNotFound(format!("Failed to read Cargo.toml: {e}"))
            })?;
            if content.contains("[workspace]") {
                return Ok(current_dir);
            }
        }
        if !current_dir.pop() {
            break;
        }
    }

    Err(TestHelperError::ProjectRootNotFound(
        "Workspace root not found".to_string(),
    ))
}

static PROJECT_ROOT: Lazy<PathBuf> =
    Lazy::new(|| find_project_root().expect("Failed to find project root directory"));

/// Directory for artifacts written by tests, created on first use
pub fn get_output_dir() -> PathBuf {
    let output_dir = PROJECT_ROOT.join("test_output");
    if !output_dir.exists() {
        std::fs::create_dir_all(&output_dir).expect("Failed to create output directory");
    }
    output_dir
}

/// Path of `path` inside [`get_output_dir`]
pub fn output_path<P: AsRef<Path>>(path: P) -> PathBuf {
    get_output_dir().join(path)
}

/// Small synthetic layout: 16x16 science image, 8x8 sensor
pub fn small_layout(num_modes: usize) -> SyntheticLayout {
    SyntheticLayout {
        num_modes,
        image_size: 16,
        sensor_size: 8,
        iwa: 2.0,
        owa: 6.0,
        sampling: 1.0,
        amplitude: 1.0,
        mode_amplitude: 1e-4,
        floor_amplitude: 0.0,
    }
}

/// Linear model with a perfectly dark coronagraphic reference
///
/// With `E0 = 0` the contrast is exactly quadratic in the modes, so
/// intensity-mode and field-mode matrices coincide.
pub fn dark_linear_model(num_modes: usize, seed: u64) -> LinearFieldModel {
    LinearFieldModel::synthetic(&small_layout(num_modes), seed)
        .expect("synthetic layout is valid")
}

/// Linear model with a residual coronagraph floor
pub fn leaky_linear_model(num_modes: usize, seed: u64) -> LinearFieldModel {
    let layout = SyntheticLayout {
        floor_amplitude: 1e-5,
        ..small_layout(num_modes)
    };
    LinearFieldModel::synthetic(&layout, seed).expect("synthetic layout is valid")
}

/// Random symmetric positive-definite matrix `A Aᵀ + n·I`, scaled by `scale`
pub fn random_spd_matrix(n: usize, scale: f64, seed: u64) -> PastisMatrix {
    let mut rng = StdRng::seed_from_u64(seed);
    let a = Array2::from_shape_fn((n, n), |_| {
        let v: f64 = StandardNormal.sample(&mut rng);
        v
    });
    let mut m = a.dot(&a.t()) + Array2::<f64>::eye(n) * n as f64;
    // Product is symmetric up to rounding; mirror to make it exact
    for i in 0..n {
        for j in (i + 1)..n {
            m[[j, i]] = m[[i, j]];
        }
    }
    PastisMatrix::new(m * scale).expect("mirrored matrix is symmetric")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pastis::ForwardModel;

    #[test]
    fn test_project_root_exists() {
        let root = find_project_root().expect("Failed to find project root");
        assert!(root.join("Cargo.toml").exists());
    }

    #[test]
    fn test_output_path() {
        let path = output_path("matrix.json");
        assert_eq!(path, get_output_dir().join("matrix.json"));
    }

    #[test]
    fn test_fixtures() {
        let model = dark_linear_model(5, 1);
        assert_eq!(model.num_modes(), 5);
        let m = random_spd_matrix(4, 1e-9, 2);
        assert_eq!(m.num_modes(), 4);
        assert!(m.view().diag().iter().all(|&v| v > 0.0));
    }
}
