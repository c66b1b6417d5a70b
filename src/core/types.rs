//! Domain types shared across the schedule, correlation, and simulation modules.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Per-year quantity tracked for each project.
///
/// The engine works over a closed set of quantities rather than inferring
/// them from column-name patterns; ingestion maps raw columns onto this enum
/// once and everything downstream is typed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Quantity {
    /// Contractual nominal delivery commitment.
    OfferedVolume,
    /// Dispersion of modeled delivery around its mean.
    StandardDeviation,
    /// Expected/modeled actual delivery before risk adjustment.
    DeliveryVolume,
    /// Expected value as a percentage of offered volume.
    ExpectedValuePercentage,
}

impl Quantity {
    /// All quantities in presentation order: offered volume first, then
    /// standard deviation, delivery volume, expected-value percentage.
    pub const ALL: [Self; 4] = [
        Self::OfferedVolume,
        Self::StandardDeviation,
        Self::DeliveryVolume,
        Self::ExpectedValuePercentage,
    ];

    /// Returns the snake_case column prefix for this quantity.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::OfferedVolume => "offered_volume",
            Self::StandardDeviation => "standard_deviation",
            Self::DeliveryVolume => "delivery_volume",
            Self::ExpectedValuePercentage => "expected_value_percentage",
        }
    }
}

/// One raw project row as supplied by the loader.
///
/// `yearly_values` is keyed by `(quantity, year_index)` with year indices
/// counted from 1 up to `contract_duration`; the calendar year is derived as
/// `start_year + year_index - 1` when the schedule is built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectRecord {
    /// Unique numeric identity.
    pub project_id: u32,
    /// Unique display name; the simulation's join key.
    pub project_name: String,
    /// Country of delivery; must appear in the country correlation matrix.
    pub country: String,
    /// Generation/abatement technology; must appear in the technology
    /// correlation matrix.
    pub technology: String,
    /// Contracting counterparty.
    pub counterparty: String,
    /// First calendar year of delivery.
    pub start_year: i32,
    /// Contract length in years, at least 1.
    pub contract_duration: u32,
    /// Date the project was screened.
    pub screening_date: NaiveDate,
    /// Qualitative overall rating label.
    pub overall_project_rating: String,
    /// Per-year values keyed by `(quantity, year_index)`.
    pub yearly_values: BTreeMap<(Quantity, u32), f64>,
}

impl ProjectRecord {
    /// Last calendar year of the contract span.
    pub fn end_year(&self) -> i32 {
        self.start_year + self.contract_duration as i32 - 1
    }

    /// Returns `true` if the contract span includes `year`.
    pub fn is_active(&self, year: i32) -> bool {
        self.start_year <= year && year <= self.end_year()
    }
}

/// Aggregate simulation outcome for one calendar year.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct YearResult {
    /// Calendar year.
    pub year: i32,
    /// Sample standard deviation of the simulated portfolio totals.
    pub std_dev: f64,
    /// Offered volume less two standard deviations (downside-adjusted
    /// delivery estimate, not the sample mean).
    pub portfolio_delivery: f64,
    /// `portfolio_delivery / offered_volume`.
    pub delivery_rate: f64,
    /// Total offered volume across active projects.
    pub offered_volume: f64,
}
