//! Correlated Monte Carlo delivery-risk engine for portfolios of long-lived
//! offtake contracts (energy/commodity delivery agreements).
//!
//! The crate estimates the probability-weighted volume each contract in a
//! portfolio will actually deliver per calendar year, accounting for
//! correlation between projects driven by shared technology and shared
//! country risk. The pipeline:
//!
//! 1. [`portfolio::build_yearly_schedule`] reshapes one-record-per-project
//!    input into a per-calendar-year schedule.
//! 2. [`math::build_project_correlation`] composes the technology and country
//!    correlation matrices into a project-by-project matrix and repairs it
//!    into a valid correlation matrix (symmetric, unit diagonal, PSD).
//! 3. [`sim::PortfolioSimulator`] runs a correlated multivariate-normal
//!    Monte Carlo per calendar year over the active project subset.
//! 4. [`validate`] gates each stage's output before it is acted on.
//!
//! References:
//! - Higham, N. (2002), *Computing the nearest correlation matrix*.
//! - Glasserman, P. (2004), *Monte Carlo Methods in Financial Engineering*.
//!
//! Numerical considerations:
//! - User-supplied category matrices compose into a matrix that is in general
//!   only approximately a correlation matrix; the builder's alternating
//!   PSD/unit-diagonal projection plus diagonal jitter guarantees a
//!   factorizable structure.
//! - Principal sub-matrices of a PSD matrix stay PSD but can lose strict
//!   positive definiteness; the per-year Cholesky is PSD-tolerant and the
//!   residual failure policy is explicit configuration.
//! - The `delivery = offered - 2 * std_dev` downside convention can leave
//!   `delivery_rate` outside `[0, 1]`; the validator is the enforcement
//!   point, and a failing validation aborts the pipeline.
//!
//! # Feature Flags
//! - `parallel`: rayon-powered parallel simulation of independent years.
//!
//! # Quick Start
//! ```rust
//! use std::collections::BTreeMap;
//!
//! use chrono::NaiveDate;
//! use nalgebra::DMatrix;
//! use offtake_risk::core::{ProjectRecord, Quantity};
//! use offtake_risk::math::{build_project_correlation, CategoryCorrelation};
//! use offtake_risk::portfolio::build_yearly_schedule;
//! use offtake_risk::sim::{PortfolioSimulator, SimulationConfig};
//!
//! let mut yearly_values = BTreeMap::new();
//! yearly_values.insert((Quantity::OfferedVolume, 1), 100.0);
//! yearly_values.insert((Quantity::DeliveryVolume, 1), 90.0);
//! yearly_values.insert((Quantity::StandardDeviation, 1), 5.0);
//!
//! let record = ProjectRecord {
//!     project_id: 1,
//!     project_name: "Borealis Wind I".to_string(),
//!     country: "Norway".to_string(),
//!     technology: "Wind".to_string(),
//!     counterparty: "Nordlys Energi AS".to_string(),
//!     start_year: 2025,
//!     contract_duration: 1,
//!     screening_date: NaiveDate::from_ymd_opt(2024, 3, 14).unwrap(),
//!     overall_project_rating: "A".to_string(),
//!     yearly_values,
//! };
//!
//! let schedule = build_yearly_schedule(&[record]).unwrap();
//! let tech = CategoryCorrelation::new(
//!     vec!["Wind".to_string()],
//!     DMatrix::from_row_slice(1, 1, &[1.0]),
//! )
//! .unwrap();
//! let country = CategoryCorrelation::new(
//!     vec!["Norway".to_string()],
//!     DMatrix::from_row_slice(1, 1, &[1.0]),
//! )
//! .unwrap();
//!
//! let correlation = build_project_correlation(&schedule, &tech, &country).unwrap();
//! let simulator = PortfolioSimulator::new(SimulationConfig::new(5_000, 42)).unwrap();
//! let results = simulator.run(&schedule, &correlation).unwrap();
//!
//! assert_eq!(results.len(), 1);
//! assert_eq!(results[0].year, 2025);
//! assert!(results[0].std_dev > 0.0);
//! ```

pub mod core;
pub mod math;
pub mod portfolio;
pub mod sim;
pub mod validate;

pub use crate::core::{ProjectRecord, Quantity, RiskError, YearResult};
pub use crate::math::{build_project_correlation, CategoryCorrelation, ProjectCorrelation};
pub use crate::portfolio::{build_yearly_schedule, YearlySchedule};
pub use crate::sim::{PortfolioSimulator, SimulationConfig, YearFailurePolicy};
