//! Correlation-matrix composition and repair for the project portfolio.
//!
//! References:
//! - Higham, N. (2002), *Computing the nearest correlation matrix*.
//! - Glasserman, P. (2004), *Monte Carlo Methods in Financial Engineering*.
//!
//! This module centralizes correlation handling for the delivery-risk engine:
//! label-indexed category matrices (technology, country), pairwise
//! composition into a project-by-project matrix, eigenvalue-clamp PSD repair
//! with Gram-Schmidt re-orthonormalization, PSD checks, and a PSD-tolerant
//! Cholesky factorization used by the per-year simulation.
//!
//! Numerical considerations: clamping eigenvalues and then forcing the unit
//! diagonal in one pass can leave the matrix well short of PSD, so the repair
//! alternates between the PSD-cone projection (eigenvalue clamp with
//! Gram-Schmidt re-orthonormalized eigenvectors) and the unit-diagonal
//! constraint until the iterates settle (Higham 2002), and the finalized
//! matrix carries a `1e-8` diagonal jitter against the remaining floating
//! residue. The Cholesky here accepts semidefinite inputs by flooring pivots
//! at the tolerance instead of failing on exact rank deficiency.

use std::collections::HashMap;

use nalgebra::{DMatrix, DVector, SymmetricEigen};

use crate::core::RiskError;
use crate::portfolio::YearlySchedule;

/// Diagonal jitter applied after the repaired matrix is finalized.
const DIAGONAL_JITTER: f64 = 1.0e-8;

/// Configuration for the nearest-correlation projection.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PsdProjectionConfig {
    /// Convergence tolerance in Frobenius norm.
    pub tol: f64,
    /// Maximum number of alternating-projection iterations.
    pub max_iterations: usize,
}

impl Default for PsdProjectionConfig {
    fn default() -> Self {
        Self {
            tol: 1.0e-10,
            max_iterations: 100,
        }
    }
}

/// Square correlation matrix over string category labels (technologies or
/// countries), with an immutable label-to-dense-index lookup built once.
#[derive(Debug, Clone, PartialEq)]
pub struct CategoryCorrelation {
    labels: Vec<String>,
    index: HashMap<String, usize>,
    matrix: DMatrix<f64>,
}

impl CategoryCorrelation {
    /// Builds a category correlation matrix from its labels and entries.
    ///
    /// Fails when the matrix is not square, its dimension does not match the
    /// label count, or a label repeats. Entry-level properties (symmetry,
    /// unit diagonal, range) are checked separately by
    /// [`crate::validate::validate_category_correlation`] so that malformed
    /// user input can still be represented and reported downstream.
    pub fn new(labels: Vec<String>, matrix: DMatrix<f64>) -> Result<Self, RiskError> {
        if matrix.nrows() != matrix.ncols() {
            return Err(RiskError::InvalidInput(format!(
                "category matrix must be square, got {}x{}",
                matrix.nrows(),
                matrix.ncols()
            )));
        }
        if labels.len() != matrix.nrows() {
            return Err(RiskError::InvalidInput(format!(
                "{} labels do not match matrix dimension {}",
                labels.len(),
                matrix.nrows()
            )));
        }

        let mut index = HashMap::with_capacity(labels.len());
        for (i, label) in labels.iter().enumerate() {
            if index.insert(label.clone(), i).is_some() {
                return Err(RiskError::InvalidInput(format!(
                    "duplicate category label '{label}'"
                )));
            }
        }

        Ok(Self {
            labels,
            index,
            matrix,
        })
    }

    /// Category labels in storage order.
    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    /// Number of categories.
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    /// Returns `true` if the matrix has no categories.
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Returns `true` if `label` is a known category.
    pub fn contains(&self, label: &str) -> bool {
        self.index.contains_key(label)
    }

    /// Correlation between two category labels, if both are known.
    pub fn get(&self, a: &str, b: &str) -> Option<f64> {
        let i = *self.index.get(a)?;
        let j = *self.index.get(b)?;
        Some(self.matrix[(i, j)])
    }

    /// Raw entries.
    pub fn matrix(&self) -> &DMatrix<f64> {
        &self.matrix
    }
}

/// Derived project-by-project correlation matrix.
///
/// Immutable once built; row/column order is the schedule's project order and
/// fixes the ordering used by the simulator.
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectCorrelation {
    names: Vec<String>,
    matrix: DMatrix<f64>,
}

impl ProjectCorrelation {
    /// Wraps an externally supplied square matrix with its project names.
    ///
    /// Used by callers that bring their own correlation structure; matrices
    /// produced by [`build_project_correlation`] already satisfy the
    /// correlation-matrix invariants, externally supplied ones should be run
    /// through [`crate::validate::validate_project_correlation`].
    pub fn from_parts(names: Vec<String>, matrix: DMatrix<f64>) -> Result<Self, RiskError> {
        if matrix.nrows() != matrix.ncols() {
            return Err(RiskError::InvalidInput(format!(
                "project correlation matrix must be square, got {}x{}",
                matrix.nrows(),
                matrix.ncols()
            )));
        }
        if names.len() != matrix.nrows() {
            return Err(RiskError::InvalidInput(format!(
                "{} project names do not match matrix dimension {}",
                names.len(),
                matrix.nrows()
            )));
        }
        Ok(Self { names, matrix })
    }

    /// Project names in row/column order.
    pub fn project_names(&self) -> &[String] {
        &self.names
    }

    /// Matrix dimension.
    pub fn dim(&self) -> usize {
        self.names.len()
    }

    /// Raw entries.
    pub fn matrix(&self) -> &DMatrix<f64> {
        &self.matrix
    }

    /// Principal sub-matrix over the given row/column indices, in order.
    pub fn principal_submatrix(&self, indices: &[usize]) -> DMatrix<f64> {
        let k = indices.len();
        DMatrix::from_fn(k, k, |r, c| self.matrix[(indices[r], indices[c])])
    }
}

/// Builds the project correlation matrix from the schedule and the two
/// category correlation matrices.
///
/// For every ordered pair of projects `(p, q)` the raw entry is
/// `tech[tech(p), tech(q)] * country[country(p), country(q)]`; the raw matrix
/// is then symmetrized, repaired to the nearest correlation matrix by
/// alternating projections (Higham 2002) whose PSD-cone step clamps negative
/// eigenvalues over Gram-Schmidt re-orthonormalized eigenvectors, given an
/// exact unit diagonal, and jittered by `1e-8` on the diagonal. The result
/// always passes [`crate::validate::validate_project_correlation`]; an input
/// composition that is already a valid correlation matrix comes back
/// unchanged up to the jitter.
///
/// Deterministic: the same inputs produce the bitwise-identical matrix.
pub fn build_project_correlation(
    schedule: &YearlySchedule,
    technology: &CategoryCorrelation,
    country: &CategoryCorrelation,
) -> Result<ProjectCorrelation, RiskError> {
    if schedule.is_empty() {
        return Err(RiskError::InvalidInput("schedule is empty".to_string()));
    }
    if technology.is_empty() || country.is_empty() {
        return Err(RiskError::InvalidInput(
            "category correlation matrices must be non-empty".to_string(),
        ));
    }
    if technology.matrix().iter().any(|x| x.is_nan()) {
        return Err(RiskError::InvalidInput(
            "technology correlation matrix contains NaN".to_string(),
        ));
    }
    if country.matrix().iter().any(|x| x.is_nan()) {
        return Err(RiskError::InvalidInput(
            "country correlation matrix contains NaN".to_string(),
        ));
    }

    for row in schedule.rows() {
        if !technology.contains(&row.technology) {
            return Err(RiskError::LookupFailure(format!(
                "technology '{}' not found in technology correlation matrix",
                row.technology
            )));
        }
        if !country.contains(&row.country) {
            return Err(RiskError::LookupFailure(format!(
                "country '{}' not found in country correlation matrix",
                row.country
            )));
        }
    }

    let rows = schedule.rows();
    let n = rows.len();
    let mut raw = DMatrix::<f64>::zeros(n, n);
    for p in 0..n {
        for q in 0..n {
            let tech_corr = technology
                .get(&rows[p].technology, &rows[q].technology)
                .ok_or_else(|| {
                    RiskError::LookupFailure(format!(
                        "technology pair ('{}', '{}') not found",
                        rows[p].technology, rows[q].technology
                    ))
                })?;
            let country_corr = country
                .get(&rows[p].country, &rows[q].country)
                .ok_or_else(|| {
                    RiskError::LookupFailure(format!(
                        "country pair ('{}', '{}') not found",
                        rows[p].country, rows[q].country
                    ))
                })?;
            raw[(p, q)] = tech_corr * country_corr;
        }
    }

    let mut repaired = nearest_correlation(&symmetrize(&raw), PsdProjectionConfig::default());
    for i in 0..n {
        repaired[(i, i)] = 1.0 + DIAGONAL_JITTER;
    }

    let names = rows.iter().map(|r| r.project_name.clone()).collect();
    ProjectCorrelation::from_parts(names, repaired)
}

/// Projects a symmetric matrix onto the nearest correlation matrix by
/// alternating between the PSD cone and the unit-diagonal affine space
/// (Higham 2002), then clamps off-diagonal entries into `[-1, 1]`.
fn nearest_correlation(matrix: &DMatrix<f64>, cfg: PsdProjectionConfig) -> DMatrix<f64> {
    let n = matrix.nrows();

    let mut y = symmetrize(matrix);
    for i in 0..n {
        y[(i, i)] = 1.0;
    }

    let mut delta_s = DMatrix::<f64>::zeros(n, n);

    for _ in 0..cfg.max_iterations {
        let r = symmetrize(&(&y - &delta_s));
        let x = project_psd_clamped(&r);
        delta_s = &x - &r;

        let mut y_next = x;
        for i in 0..n {
            y_next[(i, i)] = 1.0;
        }
        y_next = symmetrize(&y_next);

        let diff = (&y_next - &y).norm();
        y = y_next;
        if diff < cfg.tol {
            break;
        }
    }

    // Final cleanup: PSD projection, exact unit diagonal, entries in [-1, 1].
    y = project_psd_clamped(&y);
    for i in 0..n {
        y[(i, i)] = 1.0;
        for j in (i + 1)..n {
            let clipped = y[(i, j)].clamp(-1.0, 1.0);
            y[(i, j)] = clipped;
            y[(j, i)] = clipped;
        }
    }

    y
}

/// Returns the minimum eigenvalue of a square symmetric matrix.
pub fn min_eigenvalue_symmetric(matrix: &DMatrix<f64>) -> Option<f64> {
    if matrix.nrows() == 0 || matrix.nrows() != matrix.ncols() {
        return None;
    }
    let eig = SymmetricEigen::new(matrix.clone());
    eig.eigenvalues.iter().copied().reduce(f64::min)
}

/// Returns `true` if the matrix is positive semidefinite within `tol`.
pub fn is_positive_semidefinite(matrix: &DMatrix<f64>, tol: f64) -> bool {
    min_eigenvalue_symmetric(matrix).is_some_and(|lmin| lmin >= -tol)
}

/// Cholesky decomposition for symmetric positive semidefinite matrices.
///
/// Returns lower-triangular `L` such that `L L^T ~= matrix`, or `None` when a
/// pivot falls below `-tol` (the matrix is not PSD within tolerance). Exactly
/// singular PSD inputs, such as the sub-matrix of two perfectly correlated
/// projects, factor successfully with near-zero pivots.
pub fn cholesky_lower_psd(matrix: &DMatrix<f64>, tol: f64) -> Option<DMatrix<f64>> {
    let n = matrix.nrows();
    if n == 0 || matrix.ncols() != n {
        return None;
    }

    let mut l = DMatrix::<f64>::zeros(n, n);
    for i in 0..n {
        for j in 0..=i {
            let mut sum = matrix[(i, j)];
            for k in 0..j {
                sum -= l[(i, k)] * l[(j, k)];
            }

            if i == j {
                if sum < -tol {
                    return None;
                }
                l[(i, j)] = sum.max(tol).sqrt();
            } else if l[(j, j)] > tol {
                l[(i, j)] = sum / l[(j, j)];
            }
        }
    }

    Some(l)
}

fn symmetrize(m: &DMatrix<f64>) -> DMatrix<f64> {
    0.5 * (m + m.transpose())
}

/// Projects a symmetric matrix onto the PSD cone by eigenvalue clamping.
///
/// Eigenvector columns are re-orthonormalized by Gram-Schmidt in
/// decomposition order before reconstruction, so the clamped reconstruction
/// cannot reintroduce asymmetry from drifted eigenvectors.
fn project_psd_clamped(m: &DMatrix<f64>) -> DMatrix<f64> {
    let eig = SymmetricEigen::new(m.clone());
    let clamped = eig
        .eigenvalues
        .iter()
        .map(|v| v.max(0.0))
        .collect::<Vec<_>>();

    let mut vectors = eig.eigenvectors;
    gram_schmidt_columns(&mut vectors);

    let d = DMatrix::from_diagonal(&DVector::from_vec(clamped));
    symmetrize(&(&vectors * d * vectors.transpose()))
}

/// In-place modified Gram-Schmidt over matrix columns, processed left to
/// right. Columns whose residual norm falls below `1e-12` are zeroed.
fn gram_schmidt_columns(m: &mut DMatrix<f64>) {
    let n = m.ncols();
    for k in 0..n {
        for j in 0..k {
            let proj = m.column(k).dot(&m.column(j));
            let prev = m.column(j).clone_owned();
            let mut col = m.column_mut(k);
            col.axpy(-proj, &prev, 1.0);
        }
        let norm = m.column(k).norm();
        let mut col = m.column_mut(k);
        if norm > 1.0e-12 {
            col /= norm;
        } else {
            col.fill(0.0);
        }
    }
}
