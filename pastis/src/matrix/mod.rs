//! PASTIS matrix type and its construction

pub mod builder;
pub mod pastis_matrix;

pub use builder::{
    finalize_half_matrix, half_matrix_from_contrasts, half_matrix_from_fields, Calibration,
    CoronagraphFloor, MatrixBuild, MatrixMode, PastisMatrixBuilder,
};
pub use pastis_matrix::{PastisMatrix, MATRIX_UNITS};
