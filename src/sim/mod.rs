//! Correlated per-year Monte Carlo simulation of portfolio delivery.
//!
//! For every calendar year in the portfolio horizon the simulator selects the
//! active projects, slices their principal sub-matrix out of the project
//! correlation matrix, Cholesky-factorizes it, and draws correlated normal
//! delivery samples (`sample = mean + Z . diag(sigma) . L`). Per-year draws
//! are independent with seeds derived from the base seed, so results are
//! reproducible and identical whether years run serially or in parallel
//! (enable the `parallel` feature for rayon workers).
//!
//! Numerical considerations: a principal sub-matrix of a PSD matrix is PSD
//! but not necessarily strictly positive definite (duplicate or degenerate
//! projects), so factorization uses the PSD-tolerant Cholesky; inputs that
//! still fail are handled per the configured [`YearFailurePolicy`].

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;
#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::core::{Quantity, RiskError, YearResult};
use crate::math::correlation::{cholesky_lower_psd, ProjectCorrelation};
use crate::portfolio::YearlySchedule;

/// Pivot tolerance for the per-year Cholesky factorization.
const CHOLESKY_TOL: f64 = 1.0e-12;

/// What to do when a single year cannot be simulated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum YearFailurePolicy {
    /// Fail the whole run.
    AbortRun,
    /// Drop the failing year and keep simulating the others.
    SkipYear,
}

/// Simulation controls.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimulationConfig {
    /// Number of Monte Carlo draws per year, at least 1.
    pub num_simulations: usize,
    /// Base seed; per-year streams are derived from it.
    pub seed: u64,
    /// Policy for years whose sub-matrix is not factorizable. Defaults to
    /// [`YearFailurePolicy::AbortRun`]: a non-PSD sub-matrix usually means a
    /// corrupted correlation input, not a property of the year.
    pub on_cholesky_failure: YearFailurePolicy,
    /// Policy for active years whose total offered volume is zero, leaving
    /// the delivery rate undefined. Defaults to
    /// [`YearFailurePolicy::SkipYear`]: such years carry no deliverable
    /// volume and the result validator still rejects a fully empty run.
    pub on_degenerate_offered: YearFailurePolicy,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            num_simulations: 10_000,
            seed: 0,
            on_cholesky_failure: YearFailurePolicy::AbortRun,
            on_degenerate_offered: YearFailurePolicy::SkipYear,
        }
    }
}

impl SimulationConfig {
    /// Config with the given draw count and seed, default failure policies.
    pub fn new(num_simulations: usize, seed: u64) -> Self {
        Self {
            num_simulations,
            seed,
            ..Self::default()
        }
    }

    /// Overrides the Cholesky failure policy.
    pub fn with_cholesky_policy(mut self, policy: YearFailurePolicy) -> Self {
        self.on_cholesky_failure = policy;
        self
    }

    /// Overrides the zero-offered-volume policy.
    pub fn with_degenerate_policy(mut self, policy: YearFailurePolicy) -> Self {
        self.on_degenerate_offered = policy;
        self
    }
}

/// Correlated Monte Carlo simulator over the portfolio's year horizon.
#[derive(Debug, Clone)]
pub struct PortfolioSimulator {
    config: SimulationConfig,
}

impl PortfolioSimulator {
    /// Builds a simulator, rejecting a zero draw count.
    pub fn new(config: SimulationConfig) -> Result<Self, RiskError> {
        if config.num_simulations == 0 {
            return Err(RiskError::InvalidInput(
                "num_simulations must be at least 1".to_string(),
            ));
        }
        Ok(Self { config })
    }

    /// Runs the simulation and returns one [`YearResult`] per calendar year
    /// that has at least one active project, years ascending.
    ///
    /// Years with an empty active set produce no row. A year whose total
    /// offered volume is zero or whose sub-matrix cannot be factorized
    /// follows the corresponding [`YearFailurePolicy`]; under `AbortRun` the
    /// run fails with [`RiskError::DegenerateDivision`] or
    /// [`RiskError::NumericalFailure`] respectively.
    pub fn run(
        &self,
        schedule: &YearlySchedule,
        correlation: &ProjectCorrelation,
    ) -> Result<Vec<YearResult>, RiskError> {
        if schedule.is_empty() {
            return Err(RiskError::InvalidInput("schedule is empty".to_string()));
        }
        if correlation.dim() != schedule.len() {
            return Err(RiskError::InvalidInput(format!(
                "correlation matrix dimension {} does not match {} schedule rows",
                correlation.dim(),
                schedule.len()
            )));
        }
        for (row, name) in schedule.rows().iter().zip(correlation.project_names()) {
            if row.project_name != *name {
                return Err(RiskError::InvalidInput(format!(
                    "correlation matrix ordering mismatch: schedule has '{}', matrix has '{name}'",
                    row.project_name
                )));
            }
        }

        // first_year/last_year are Some for a non-empty schedule
        let first = schedule
            .first_year()
            .ok_or_else(|| RiskError::InvalidInput("schedule is empty".to_string()))?;
        let last = schedule
            .last_year()
            .ok_or_else(|| RiskError::InvalidInput("schedule is empty".to_string()))?;

        let years: Vec<i32> = (first..=last).collect();

        #[cfg(feature = "parallel")]
        let outcomes = years
            .par_iter()
            .map(|&year| self.simulate_year(year, schedule, correlation))
            .collect::<Vec<_>>();
        #[cfg(not(feature = "parallel"))]
        let outcomes = years
            .iter()
            .map(|&year| self.simulate_year(year, schedule, correlation))
            .collect::<Vec<_>>();

        let mut results = Vec::new();
        for outcome in outcomes {
            if let Some(result) = outcome? {
                results.push(result);
            }
        }
        Ok(results)
    }

    /// Simulates one calendar year; `Ok(None)` when the year has no active
    /// projects or its Cholesky failure was configured to be skipped.
    fn simulate_year(
        &self,
        year: i32,
        schedule: &YearlySchedule,
        correlation: &ProjectCorrelation,
    ) -> Result<Option<YearResult>, RiskError> {
        let active: Vec<usize> = schedule
            .rows()
            .iter()
            .enumerate()
            .filter(|(_, row)| row.is_active(year))
            .map(|(i, _)| i)
            .collect();
        if active.is_empty() {
            return Ok(None);
        }

        let k = active.len();
        let mut mean = vec![0.0_f64; k];
        let mut sigma = vec![0.0_f64; k];
        let mut offered = vec![0.0_f64; k];
        for (slot, &idx) in active.iter().enumerate() {
            let row = &schedule.rows()[idx];
            mean[slot] = row.value(Quantity::DeliveryVolume, year).unwrap_or(0.0);
            sigma[slot] = row.value(Quantity::StandardDeviation, year).unwrap_or(0.0);
            offered[slot] = row.value(Quantity::OfferedVolume, year).unwrap_or(0.0);
        }

        let sub = correlation.principal_submatrix(&active);
        let chol = match cholesky_lower_psd(&sub, CHOLESKY_TOL) {
            Some(l) => l,
            None => {
                return match self.config.on_cholesky_failure {
                    YearFailurePolicy::AbortRun => Err(RiskError::NumericalFailure(format!(
                        "active sub-matrix for year {year} is not positive semidefinite"
                    ))),
                    YearFailurePolicy::SkipYear => Ok(None),
                };
            }
        };

        let offered_total: f64 = offered.iter().sum();
        if offered_total == 0.0 {
            return match self.config.on_degenerate_offered {
                YearFailurePolicy::AbortRun => Err(RiskError::DegenerateDivision(format!(
                    "total offered volume for year {year} is zero"
                ))),
                YearFailurePolicy::SkipYear => Ok(None),
            };
        }

        // Summing sample = mean + Z . diag(sigma) . L over projects collapses
        // each draw to mean_total + Z . w with w_i = sigma_i * rowsum_i(L).
        let mean_total: f64 = mean.iter().sum();
        let weights: Vec<f64> = (0..k)
            .map(|i| sigma[i] * chol.row(i).iter().sum::<f64>())
            .collect();

        let mut rng = StdRng::seed_from_u64(derive_year_seed(self.config.seed, year));
        let n = self.config.num_simulations;
        let mut totals = Vec::with_capacity(n);
        for _ in 0..n {
            let mut total = mean_total;
            for &w in &weights {
                let z: f64 = rng.sample(StandardNormal);
                total += z * w;
            }
            totals.push(total);
        }

        let std_dev = sample_std_dev(&totals);
        let portfolio_delivery = offered_total - 2.0 * std_dev;
        let delivery_rate = portfolio_delivery / offered_total;

        Ok(Some(YearResult {
            year,
            std_dev,
            portfolio_delivery,
            delivery_rate,
            offered_volume: offered_total,
        }))
    }
}

fn derive_year_seed(base_seed: u64, year: i32) -> u64 {
    base_seed.wrapping_add((year as u64).wrapping_mul(7_919))
}

fn sample_std_dev(values: &[f64]) -> f64 {
    let n = values.len();
    if n < 2 {
        return 0.0;
    }
    let mean = values.iter().sum::<f64>() / n as f64;
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n as f64 - 1.0);
    var.sqrt()
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use approx::assert_relative_eq;
    use chrono::NaiveDate;
    use nalgebra::DMatrix;

    use super::*;
    use crate::core::ProjectRecord;
    use crate::portfolio::build_yearly_schedule;

    fn project(
        id: u32,
        name: &str,
        start: i32,
        duration: u32,
        per_year: &[(u32, f64, f64, f64)],
    ) -> ProjectRecord {
        let mut yearly_values = BTreeMap::new();
        for &(idx, offered, delivery, sd) in per_year {
            yearly_values.insert((Quantity::OfferedVolume, idx), offered);
            yearly_values.insert((Quantity::DeliveryVolume, idx), delivery);
            yearly_values.insert((Quantity::StandardDeviation, idx), sd);
        }
        ProjectRecord {
            project_id: id,
            project_name: name.to_string(),
            country: "Germany".to_string(),
            technology: "Wind".to_string(),
            counterparty: "Acme Offtake GmbH".to_string(),
            start_year: start,
            contract_duration: duration,
            screening_date: NaiveDate::from_ymd_opt(2019, 6, 1).unwrap(),
            overall_project_rating: "A".to_string(),
            yearly_values,
        }
    }

    fn identity_correlation(schedule: &YearlySchedule) -> ProjectCorrelation {
        let n = schedule.len();
        ProjectCorrelation::from_parts(
            schedule
                .rows()
                .iter()
                .map(|r| r.project_name.clone())
                .collect(),
            DMatrix::identity(n, n),
        )
        .unwrap()
    }

    #[test]
    fn zero_simulation_count_is_rejected() {
        let err = PortfolioSimulator::new(SimulationConfig::new(0, 1)).unwrap_err();
        assert!(matches!(err, RiskError::InvalidInput(_)));
    }

    #[test]
    fn dimension_mismatch_is_rejected() {
        let schedule =
            build_yearly_schedule(&[project(1, "Alpha", 2020, 2, &[(1, 100.0, 90.0, 5.0)])])
                .unwrap();
        let wrong = ProjectCorrelation::from_parts(
            vec!["Alpha".to_string(), "Beta".to_string()],
            DMatrix::identity(2, 2),
        )
        .unwrap();

        let sim = PortfolioSimulator::new(SimulationConfig::new(100, 1)).unwrap();
        let err = sim.run(&schedule, &wrong).unwrap_err();
        assert!(matches!(err, RiskError::InvalidInput(_)));
    }

    #[test]
    fn ordering_mismatch_is_rejected() {
        let schedule = build_yearly_schedule(&[
            project(1, "Alpha", 2020, 2, &[(1, 100.0, 90.0, 5.0)]),
            project(2, "Beta", 2020, 2, &[(1, 50.0, 45.0, 2.0)]),
        ])
        .unwrap();
        let swapped = ProjectCorrelation::from_parts(
            vec!["Beta".to_string(), "Alpha".to_string()],
            DMatrix::identity(2, 2),
        )
        .unwrap();

        let sim = PortfolioSimulator::new(SimulationConfig::new(100, 1)).unwrap();
        let err = sim.run(&schedule, &swapped).unwrap_err();
        assert!(matches!(err, RiskError::InvalidInput(_)));
    }

    #[test]
    fn inactive_years_emit_no_rows() {
        // Gap in 2022: Alpha ends 2021, Beta starts 2023.
        let schedule = build_yearly_schedule(&[
            project(1, "Alpha", 2020, 2, &[(1, 100.0, 90.0, 5.0), (2, 100.0, 92.0, 4.0)]),
            project(2, "Beta", 2023, 1, &[(1, 60.0, 55.0, 3.0)]),
        ])
        .unwrap();
        let correlation = identity_correlation(&schedule);

        let sim = PortfolioSimulator::new(SimulationConfig::new(200, 7)).unwrap();
        let results = sim.run(&schedule, &correlation).unwrap();

        let horizon = (2023 - 2020 + 1) as usize;
        assert!(results.len() < horizon);
        assert_eq!(
            results.iter().map(|r| r.year).collect::<Vec<_>>(),
            vec![2020, 2021, 2023]
        );
    }

    #[test]
    fn zero_offered_volume_aborts_when_configured() {
        let schedule =
            build_yearly_schedule(&[project(1, "Alpha", 2020, 1, &[(1, 0.0, 0.0, 0.0)])]).unwrap();
        let correlation = identity_correlation(&schedule);

        let config =
            SimulationConfig::new(100, 7).with_degenerate_policy(YearFailurePolicy::AbortRun);
        let sim = PortfolioSimulator::new(config).unwrap();
        let err = sim.run(&schedule, &correlation).unwrap_err();
        assert!(matches!(err, RiskError::DegenerateDivision(_)));
    }

    #[test]
    fn zero_offered_volume_is_skipped_by_default() {
        // 2021 is active but carries no values at all.
        let schedule =
            build_yearly_schedule(&[project(1, "Alpha", 2020, 2, &[(1, 100.0, 90.0, 5.0)])])
                .unwrap();
        let correlation = identity_correlation(&schedule);

        let sim = PortfolioSimulator::new(SimulationConfig::new(100, 7)).unwrap();
        let results = sim.run(&schedule, &correlation).unwrap();
        assert_eq!(results.iter().map(|r| r.year).collect::<Vec<_>>(), vec![2020]);
    }

    #[test]
    fn cholesky_failure_aborts_by_default() {
        let schedule = build_yearly_schedule(&[
            project(1, "Alpha", 2020, 1, &[(1, 100.0, 90.0, 5.0)]),
            project(2, "Beta", 2020, 1, &[(1, 50.0, 45.0, 2.0)]),
        ])
        .unwrap();
        // Indefinite fake correlation input: off-diagonal above 1.
        let indefinite = ProjectCorrelation::from_parts(
            vec!["Alpha".to_string(), "Beta".to_string()],
            DMatrix::from_row_slice(2, 2, &[1.0, 2.0, 2.0, 1.0]),
        )
        .unwrap();

        let sim = PortfolioSimulator::new(SimulationConfig::new(100, 7)).unwrap();
        let err = sim.run(&schedule, &indefinite).unwrap_err();
        assert!(matches!(err, RiskError::NumericalFailure(_)));
    }

    #[test]
    fn cholesky_failure_can_skip_the_year() {
        let schedule = build_yearly_schedule(&[
            project(1, "Alpha", 2020, 1, &[(1, 100.0, 90.0, 5.0)]),
            project(2, "Beta", 2020, 1, &[(1, 50.0, 45.0, 2.0)]),
            project(3, "Gamma", 2021, 1, &[(1, 70.0, 66.0, 3.0)]),
        ])
        .unwrap();
        // 2020's active pair is indefinite; 2021's singleton is fine.
        let matrix = DMatrix::from_row_slice(
            3,
            3,
            &[1.0, 2.0, 0.0, 2.0, 1.0, 0.0, 0.0, 0.0, 1.0],
        );
        let correlation = ProjectCorrelation::from_parts(
            vec!["Alpha".to_string(), "Beta".to_string(), "Gamma".to_string()],
            matrix,
        )
        .unwrap();

        let config =
            SimulationConfig::new(100, 7).with_cholesky_policy(YearFailurePolicy::SkipYear);
        let sim = PortfolioSimulator::new(config).unwrap();
        let results = sim.run(&schedule, &correlation).unwrap();

        assert_eq!(results.iter().map(|r| r.year).collect::<Vec<_>>(), vec![2021]);
    }

    #[test]
    fn runs_are_reproducible_for_a_fixed_seed() {
        let schedule = build_yearly_schedule(&[
            project(1, "Alpha", 2020, 2, &[(1, 100.0, 90.0, 5.0), (2, 110.0, 95.0, 6.0)]),
            project(2, "Beta", 2021, 2, &[(1, 50.0, 45.0, 2.0), (2, 55.0, 48.0, 2.5)]),
        ])
        .unwrap();
        let correlation = identity_correlation(&schedule);

        let sim = PortfolioSimulator::new(SimulationConfig::new(500, 99)).unwrap();
        let a = sim.run(&schedule, &correlation).unwrap();
        let b = sim.run(&schedule, &correlation).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn missing_year_values_are_treated_as_zero() {
        // Alpha has no delivery/sigma entries for its second year.
        let mut alpha = project(1, "Alpha", 2020, 2, &[(1, 100.0, 90.0, 5.0)]);
        alpha
            .yearly_values
            .insert((Quantity::OfferedVolume, 2), 100.0);
        let schedule = build_yearly_schedule(&[alpha]).unwrap();
        let correlation = identity_correlation(&schedule);

        let sim = PortfolioSimulator::new(SimulationConfig::new(100, 3)).unwrap();
        let results = sim.run(&schedule, &correlation).unwrap();
        let year_2021 = results.iter().find(|r| r.year == 2021).unwrap();
        assert_relative_eq!(year_2021.std_dev, 0.0, epsilon = 1.0e-12);
        assert_relative_eq!(year_2021.portfolio_delivery, 100.0, epsilon = 1.0e-12);
        assert_relative_eq!(year_2021.delivery_rate, 1.0, epsilon = 1.0e-12);
    }
}
