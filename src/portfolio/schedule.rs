//! Reshaping of raw project records into a per-calendar-year schedule.
//!
//! One input record per project becomes one schedule row per project, with a
//! typed `(quantity, calendar_year)` value map replacing the spreadsheet's
//! `<quantity>_year_<n>` wide columns. Values outside a project's contract
//! span are absent, never zero-filled.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::core::{ProjectRecord, Quantity, RiskError};

/// One project's row in the yearly schedule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleRow {
    /// Unique numeric identity.
    pub project_id: u32,
    /// Unique display name; join key for the correlation matrix.
    pub project_name: String,
    /// Country of delivery.
    pub country: String,
    /// Generation/abatement technology.
    pub technology: String,
    /// Contracting counterparty.
    pub counterparty: String,
    /// First calendar year of delivery.
    pub start_year: i32,
    /// Contract length in years.
    pub contract_duration: u32,
    /// Date the project was screened.
    pub screening_date: NaiveDate,
    /// Qualitative overall rating label.
    pub overall_project_rating: String,
    values: BTreeMap<(Quantity, i32), f64>,
}

impl ScheduleRow {
    /// Value of `quantity` in calendar year `year`, if present.
    pub fn value(&self, quantity: Quantity, year: i32) -> Option<f64> {
        self.values.get(&(quantity, year)).copied()
    }

    /// Iterates the present `(quantity, calendar_year) -> value` entries.
    pub fn values(&self) -> impl Iterator<Item = (Quantity, i32, f64)> + '_ {
        self.values.iter().map(|(&(q, y), &v)| (q, y, v))
    }

    /// Last calendar year of the contract span.
    pub fn end_year(&self) -> i32 {
        self.start_year + self.contract_duration as i32 - 1
    }

    /// Returns `true` if the contract span includes `year`.
    pub fn is_active(&self, year: i32) -> bool {
        self.start_year <= year && year <= self.end_year()
    }
}

/// Per-calendar-year schedule: one row per project, plus the ordered list of
/// `(quantity, calendar_year)` value columns present anywhere in the data.
///
/// Row order is input order and fixes the project ordering used by the
/// correlation matrix and the simulator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct YearlySchedule {
    rows: Vec<ScheduleRow>,
    columns: Vec<(Quantity, i32)>,
}

impl YearlySchedule {
    /// Schedule rows in project order.
    pub fn rows(&self) -> &[ScheduleRow] {
        &self.rows
    }

    /// Number of projects.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Returns `true` if the schedule has no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Value columns, quantities grouped in presentation order and calendar
    /// years ascending within each quantity. Only `(quantity, year)` pairs
    /// that exist somewhere in the data appear.
    pub fn columns(&self) -> &[(Quantity, i32)] {
        &self.columns
    }

    /// Project names in row order.
    pub fn project_names(&self) -> Vec<&str> {
        self.rows.iter().map(|r| r.project_name.as_str()).collect()
    }

    /// First calendar year any project is active.
    pub fn first_year(&self) -> Option<i32> {
        self.rows.iter().map(|r| r.start_year).min()
    }

    /// Last calendar year any project is active.
    pub fn last_year(&self) -> Option<i32> {
        self.rows.iter().map(ScheduleRow::end_year).max()
    }
}

/// Builds the yearly schedule from raw project records.
///
/// Each record's `(quantity, year_index)` entries are remapped to calendar
/// years via `start_year + year_index - 1`. Entries whose year index falls
/// outside `1..=contract_duration` are dropped. Fails fast with
/// [`RiskError::InvalidInput`] on an empty input, a blank identity field, a
/// zero contract duration, or a duplicate project id/name; this never
/// silently returns an empty schedule.
pub fn build_yearly_schedule(records: &[ProjectRecord]) -> Result<YearlySchedule, RiskError> {
    if records.is_empty() {
        return Err(RiskError::InvalidInput(
            "project table is empty".to_string(),
        ));
    }

    let mut seen_ids = HashSet::new();
    let mut seen_names = HashSet::new();
    let mut rows = Vec::with_capacity(records.len());
    let mut present: BTreeSet<(Quantity, i32)> = BTreeSet::new();

    for record in records {
        validate_identity(record)?;
        if !seen_ids.insert(record.project_id) {
            return Err(RiskError::InvalidInput(format!(
                "duplicate project_id {}",
                record.project_id
            )));
        }
        if !seen_names.insert(record.project_name.clone()) {
            return Err(RiskError::InvalidInput(format!(
                "duplicate project_name '{}'",
                record.project_name
            )));
        }

        let mut values = BTreeMap::new();
        for (&(quantity, year_index), &value) in &record.yearly_values {
            if year_index < 1 || year_index > record.contract_duration {
                continue;
            }
            let calendar_year = record.start_year + year_index as i32 - 1;
            values.insert((quantity, calendar_year), value);
            present.insert((quantity, calendar_year));
        }

        rows.push(ScheduleRow {
            project_id: record.project_id,
            project_name: record.project_name.clone(),
            country: record.country.clone(),
            technology: record.technology.clone(),
            counterparty: record.counterparty.clone(),
            start_year: record.start_year,
            contract_duration: record.contract_duration,
            screening_date: record.screening_date,
            overall_project_rating: record.overall_project_rating.clone(),
            values,
        });
    }

    let mut columns = Vec::with_capacity(present.len());
    for quantity in Quantity::ALL {
        columns.extend(
            present
                .iter()
                .filter(|(q, _)| *q == quantity)
                .copied(),
        );
    }

    Ok(YearlySchedule { rows, columns })
}

fn validate_identity(record: &ProjectRecord) -> Result<(), RiskError> {
    let labeled = [
        ("project_name", &record.project_name),
        ("country", &record.country),
        ("technology", &record.technology),
        ("counterparty", &record.counterparty),
    ];
    for (field, value) in labeled {
        if value.trim().is_empty() {
            return Err(RiskError::InvalidInput(format!(
                "project {} is missing required field '{field}'",
                record.project_id
            )));
        }
    }
    if record.contract_duration == 0 {
        return Err(RiskError::InvalidInput(format!(
            "project '{}' has zero contract_duration",
            record.project_name
        )));
    }
    Ok(())
}
