//! End-to-end pipeline: schedule, correlation matrix, simulation, and the
//! validation gates between stages.

mod common;

use offtake_risk::core::Quantity;
use offtake_risk::math::{build_project_correlation, is_positive_semidefinite};
use offtake_risk::portfolio::build_yearly_schedule;
use offtake_risk::sim::{PortfolioSimulator, SimulationConfig};
use offtake_risk::validate::{
    validate_project_correlation, validate_schedule, validate_simulation_results,
};

#[test]
fn full_pipeline_passes_every_validation_gate() {
    let records = common::synthetic_portfolio(2024, 12);
    let tech = common::random_category_matrix(11, &common::TECHNOLOGIES);
    let country = common::random_category_matrix(12, &common::COUNTRIES);

    let schedule = build_yearly_schedule(&records).unwrap();
    validate_schedule(&schedule).unwrap();
    assert_eq!(schedule.len(), records.len());

    let correlation = build_project_correlation(&schedule, &tech, &country).unwrap();
    validate_project_correlation(&correlation).unwrap();
    assert!(is_positive_semidefinite(correlation.matrix(), 1.0e-8));

    let simulator = PortfolioSimulator::new(SimulationConfig::new(2_000, 99)).unwrap();
    let results = simulator.run(&schedule, &correlation).unwrap();
    validate_simulation_results(&results).unwrap();

    // At most one result per horizon year, years strictly ascending.
    let first = schedule.first_year().unwrap();
    let last = schedule.last_year().unwrap();
    assert!(results.len() <= (last - first + 1) as usize);
    assert!(results.windows(2).all(|w| w[0].year < w[1].year));
}

#[test]
fn schedule_rows_preserve_project_metadata_and_span() {
    let records = common::synthetic_portfolio(7, 6);
    let schedule = build_yearly_schedule(&records).unwrap();

    for (record, row) in records.iter().zip(schedule.rows()) {
        assert_eq!(row.project_id, record.project_id);
        assert_eq!(row.project_name, record.project_name);
        assert_eq!(row.technology, record.technology);
        assert_eq!(row.country, record.country);

        // Every present value sits inside the contract span at the mapped
        // calendar year.
        for (quantity, year, value) in row.values() {
            assert!(row.is_active(year), "{quantity:?} at {year} out of span");
            let year_index = (year - record.start_year + 1) as u32;
            assert_eq!(record.yearly_values.get(&(quantity, year_index)), Some(&value));
        }
        // Offered volume exists for every contract year.
        for year in record.start_year..=record.start_year + record.contract_duration as i32 - 1 {
            assert!(row.value(Quantity::OfferedVolume, year).is_some());
        }
    }
}

#[test]
fn correlation_matrix_is_stable_across_rebuilds() {
    let records = common::synthetic_portfolio(55, 8);
    let tech = common::random_category_matrix(1, &common::TECHNOLOGIES);
    let country = common::random_category_matrix(2, &common::COUNTRIES);

    let schedule = build_yearly_schedule(&records).unwrap();
    let a = build_project_correlation(&schedule, &tech, &country).unwrap();
    let b = build_project_correlation(&schedule, &tech, &country).unwrap();
    assert_eq!(a, b);
}
