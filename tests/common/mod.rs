//! Shared fixtures: a seeded synthetic portfolio with valid category
//! correlation matrices.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use nalgebra::DMatrix;
use offtake_risk::core::{ProjectRecord, Quantity};
use offtake_risk::math::CategoryCorrelation;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

pub const TECHNOLOGIES: [&str; 4] = ["Wind", "Solar", "Hydro", "Biomass"];
pub const COUNTRIES: [&str; 3] = ["Norway", "Spain", "Chile"];
const RATINGS: [&str; 4] = ["A", "B", "C", "D"];

/// Builds `size` random project records with per-year offered volume,
/// delivery volume, and standard deviation filled for every contract year.
pub fn synthetic_portfolio(seed: u64, size: usize) -> Vec<ProjectRecord> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..size)
        .map(|i| {
            let duration = rng.random_range(1..=8u32);
            let mut yearly_values = BTreeMap::new();
            for year_index in 1..=duration {
                let offered = rng.random_range(50.0..500.0f64);
                let delivery = offered * rng.random_range(0.75..0.99f64);
                let sigma = offered * rng.random_range(0.01..0.06f64);
                yearly_values.insert((Quantity::OfferedVolume, year_index), offered);
                yearly_values.insert((Quantity::DeliveryVolume, year_index), delivery);
                yearly_values.insert((Quantity::StandardDeviation, year_index), sigma);
            }
            ProjectRecord {
                project_id: i as u32 + 1,
                project_name: format!("Project {}", i + 1),
                country: COUNTRIES[rng.random_range(0..COUNTRIES.len())].to_string(),
                technology: TECHNOLOGIES[rng.random_range(0..TECHNOLOGIES.len())].to_string(),
                counterparty: format!("Counterparty {}", rng.random_range(1..=5u32)),
                start_year: rng.random_range(2024..=2030),
                contract_duration: duration,
                screening_date: NaiveDate::from_ymd_opt(2023, 1 + (i as u32 % 12), 1).unwrap(),
                overall_project_rating: RATINGS[rng.random_range(0..RATINGS.len())].to_string(),
                yearly_values,
            }
        })
        .collect()
}

/// Builds a random symmetric unit-diagonal category matrix over `labels`.
///
/// Entries land in `[-1, 1]` but the matrix is not necessarily PSD, matching
/// what user-maintained correlation sheets look like in practice.
pub fn random_category_matrix(seed: u64, labels: &[&str]) -> CategoryCorrelation {
    let mut rng = StdRng::seed_from_u64(seed);
    let n = labels.len();
    let mut m = DMatrix::<f64>::identity(n, n);
    for i in 0..n {
        for j in (i + 1)..n {
            let rho = rng.random_range(-1.0..1.0f64);
            m[(i, j)] = rho;
            m[(j, i)] = rho;
        }
    }
    CategoryCorrelation::new(labels.iter().map(|s| s.to_string()).collect(), m).unwrap()
}
