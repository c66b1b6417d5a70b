//! Numerical kernels: correlation-matrix composition, repair, and factorization.

pub mod correlation;

pub use correlation::{
    build_project_correlation, cholesky_lower_psd, is_positive_semidefinite,
    min_eigenvalue_symmetric, CategoryCorrelation, ProjectCorrelation, PsdProjectionConfig,
};
