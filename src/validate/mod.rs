//! Sanity gates run between pipeline stages.
//!
//! Each gate returns an explicit error instead of a boolean, so a failing
//! check aborts the pipeline rather than being mistaken for "no data". The
//! result gate is the enforcement point for bounds the simulator itself does
//! not guarantee: the two-sigma downside convention can mathematically push
//! `portfolio_delivery` below zero or `delivery_rate` outside `[0, 1]`.

use std::collections::HashSet;

use crate::core::{RiskError, YearResult};
use crate::math::correlation::{min_eigenvalue_symmetric, CategoryCorrelation, ProjectCorrelation};
use crate::portfolio::YearlySchedule;

/// Calendar years accepted in schedule columns.
const YEAR_RANGE: std::ops::RangeInclusive<i32> = 2000..=2100;

/// Checks the yearly schedule: non-empty, unique project ids, and every
/// calendar-year column within `[2000, 2100]`.
pub fn validate_schedule(schedule: &YearlySchedule) -> Result<(), RiskError> {
    if schedule.is_empty() {
        return Err(RiskError::InvalidInput(
            "yearly schedule is empty".to_string(),
        ));
    }

    let mut ids = HashSet::new();
    for row in schedule.rows() {
        if !ids.insert(row.project_id) {
            return Err(RiskError::InvalidInput(format!(
                "yearly schedule contains duplicate project_id {}",
                row.project_id
            )));
        }
    }

    for &(quantity, year) in schedule.columns() {
        if !YEAR_RANGE.contains(&year) {
            return Err(RiskError::InvalidInput(format!(
                "calendar year {year} for {} is outside [2000, 2100]",
                quantity.as_str()
            )));
        }
    }

    Ok(())
}

/// Checks a category matrix is a valid correlation matrix: symmetric, unit
/// diagonal, entries finite and in `[-1, 1]`.
pub fn validate_category_correlation(matrix: &CategoryCorrelation) -> Result<(), RiskError> {
    let m = matrix.matrix();
    let n = m.nrows();
    if n == 0 {
        return Err(RiskError::InvalidInput(
            "category correlation matrix is empty".to_string(),
        ));
    }

    for i in 0..n {
        let di = m[(i, i)];
        if !di.is_finite() || (di - 1.0).abs() > 1.0e-10 {
            return Err(RiskError::InvalidInput(format!(
                "category correlation diagonal for '{}' must be 1",
                matrix.labels()[i]
            )));
        }
        for j in 0..n {
            let rho = m[(i, j)];
            if !rho.is_finite() || !(-1.0..=1.0).contains(&rho) {
                return Err(RiskError::InvalidInput(format!(
                    "category correlation ('{}', '{}') must be finite and in [-1, 1]",
                    matrix.labels()[i],
                    matrix.labels()[j]
                )));
            }
            if (rho - m[(j, i)]).abs() > 1.0e-10 {
                return Err(RiskError::InvalidInput(format!(
                    "category correlation matrix is not symmetric at ('{}', '{}')",
                    matrix.labels()[i],
                    matrix.labels()[j]
                )));
            }
        }
    }

    Ok(())
}

/// Checks the derived project correlation matrix: no NaN, symmetric within
/// `1e-9`, minimum eigenvalue at least `-1e-8`.
pub fn validate_project_correlation(correlation: &ProjectCorrelation) -> Result<(), RiskError> {
    let m = correlation.matrix();
    let n = m.nrows();
    if n == 0 {
        return Err(RiskError::InvalidInput(
            "project correlation matrix is empty".to_string(),
        ));
    }

    if m.iter().any(|x| x.is_nan()) {
        return Err(RiskError::InvalidInput(
            "project correlation matrix contains NaN".to_string(),
        ));
    }

    for i in 0..n {
        for j in (i + 1)..n {
            if (m[(i, j)] - m[(j, i)]).abs() > 1.0e-9 {
                return Err(RiskError::InvalidInput(format!(
                    "project correlation matrix is not symmetric at ({i}, {j})"
                )));
            }
        }
    }

    let lmin = min_eigenvalue_symmetric(m).ok_or_else(|| {
        RiskError::NumericalFailure("eigenvalue computation failed".to_string())
    })?;
    if lmin < -1.0e-8 {
        return Err(RiskError::NumericalFailure(format!(
            "project correlation matrix is not positive semidefinite (min eigenvalue {lmin:e})"
        )));
    }

    Ok(())
}

/// Checks the simulation results: non-empty, `std_dev >= 0`,
/// `portfolio_delivery >= 0`, `delivery_rate` in `[0, 1]`.
pub fn validate_simulation_results(results: &[YearResult]) -> Result<(), RiskError> {
    if results.is_empty() {
        return Err(RiskError::InvalidInput(
            "simulation results are empty".to_string(),
        ));
    }

    for result in results {
        if !(result.std_dev >= 0.0) {
            return Err(RiskError::InvalidInput(format!(
                "year {}: standard deviation {} is negative",
                result.year, result.std_dev
            )));
        }
        if !(result.portfolio_delivery >= 0.0) {
            return Err(RiskError::InvalidInput(format!(
                "year {}: portfolio delivery {} is negative",
                result.year, result.portfolio_delivery
            )));
        }
        if !(0.0..=1.0).contains(&result.delivery_rate) {
            return Err(RiskError::InvalidInput(format!(
                "year {}: delivery rate {} is outside [0, 1]",
                result.year, result.delivery_rate
            )));
        }
    }

    Ok(())
}
