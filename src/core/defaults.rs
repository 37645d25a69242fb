use serde::Deserialize;
use uuid::Uuid;

use super::types::{DeductibleCharge, SimulationData};

// Average 2025 coefficients for a "président assimilé salarié".
pub const EMPLOYEE_CONTRIB_RATE: f64 = 0.225;
pub const EMPLOYER_CONTRIB_RATE: f64 = 0.433;
/// Upper bound applied before the net to gross division.
pub const MAX_EMPLOYEE_CONTRIB_RATE: f64 = 0.99;

pub const DEFAULT_TJM: f64 = 650.0;
pub const DEFAULT_DAYS_WORKED: u32 = 180;
pub const DEFAULT_MONTHLY_NET_SALARY: f64 = 3_800.0;
pub const DEFAULT_MONTHLY_INCOME_TAX_RATE: f64 = 0.11;
pub const DEFAULT_CORPORATE_TAX_REDUCED_RATE: f64 = 0.15;
pub const DEFAULT_CORPORATE_TAX_NORMAL_RATE: f64 = 0.25;
pub const DEFAULT_CORPORATE_TAX_THRESHOLD: f64 = 42_500.0;
pub const DEFAULT_DIVIDEND_FLAT_TAX_RATE: f64 = 0.30;

pub const NEW_CHARGE_LABEL: &str = "Nouvelle charge";

const DEFAULT_CHARGES: [(&str, f64); 3] = [
    ("Logiciels et abonnements", 1_800.0),
    ("Matériel et amortissements", 2_200.0),
    ("Frais de déplacement", 1_200.0),
];

pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}

/// Default charge list. Each call mints fresh ids.
pub fn default_charges() -> Vec<DeductibleCharge> {
    DEFAULT_CHARGES
        .iter()
        .map(|(label, amount)| DeductibleCharge {
            id: new_id(),
            label: (*label).to_string(),
            amount: *amount,
        })
        .collect()
}

pub fn new_charge() -> DeductibleCharge {
    DeductibleCharge {
        id: new_id(),
        label: NEW_CHARGE_LABEL.to_string(),
        amount: 0.0,
    }
}

pub fn default_simulation_data() -> SimulationData {
    SimulationData {
        tjm: DEFAULT_TJM,
        days_worked: DEFAULT_DAYS_WORKED,
        monthly_net_salary: DEFAULT_MONTHLY_NET_SALARY,
        monthly_income_tax_rate: DEFAULT_MONTHLY_INCOME_TAX_RATE,
        deductible_charges: default_charges(),
        corporate_tax_reduced_rate: DEFAULT_CORPORATE_TAX_REDUCED_RATE,
        corporate_tax_normal_rate: DEFAULT_CORPORATE_TAX_NORMAL_RATE,
        corporate_tax_threshold: DEFAULT_CORPORATE_TAX_THRESHOLD,
        dividend_flat_tax_rate: DEFAULT_DIVIDEND_FLAT_TAX_RATE,
        employee_contrib_rate: EMPLOYEE_CONTRIB_RATE,
        employer_contrib_rate: EMPLOYER_CONTRIB_RATE,
    }
}

impl Default for SimulationData {
    fn default() -> Self {
        default_simulation_data()
    }
}

/// Stored charge as read back from older or hand-edited data.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PartialCharge {
    pub id: Option<String>,
    pub label: Option<String>,
    pub amount: Option<f64>,
}

/// Stored parameter set where any field may be missing.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PartialSimulationData {
    pub tjm: Option<f64>,
    pub days_worked: Option<f64>,
    pub monthly_net_salary: Option<f64>,
    pub monthly_income_tax_rate: Option<f64>,
    pub deductible_charges: Option<Vec<PartialCharge>>,
    pub corporate_tax_reduced_rate: Option<f64>,
    pub corporate_tax_normal_rate: Option<f64>,
    pub corporate_tax_threshold: Option<f64>,
    pub dividend_flat_tax_rate: Option<f64>,
    pub employee_contrib_rate: Option<f64>,
    pub employer_contrib_rate: Option<f64>,
}

/// Fills every absent field from the default set.
///
/// A missing or empty charge list is replaced wholesale by the default list;
/// present charges keep their order and only get their own gaps filled.
pub fn with_defaults(partial: PartialSimulationData) -> SimulationData {
    let defaults = default_simulation_data();

    let deductible_charges = match partial.deductible_charges {
        Some(charges) if !charges.is_empty() => charges
            .into_iter()
            .map(|charge| DeductibleCharge {
                id: charge.id.unwrap_or_else(new_id),
                label: charge.label.unwrap_or_default(),
                amount: charge.amount.unwrap_or(0.0),
            })
            .collect(),
        _ => defaults.deductible_charges,
    };

    SimulationData {
        tjm: partial.tjm.unwrap_or(defaults.tjm),
        days_worked: partial
            .days_worked
            .map(days_from_number)
            .unwrap_or(defaults.days_worked),
        monthly_net_salary: partial
            .monthly_net_salary
            .unwrap_or(defaults.monthly_net_salary),
        monthly_income_tax_rate: partial
            .monthly_income_tax_rate
            .unwrap_or(defaults.monthly_income_tax_rate),
        deductible_charges,
        corporate_tax_reduced_rate: partial
            .corporate_tax_reduced_rate
            .unwrap_or(defaults.corporate_tax_reduced_rate),
        corporate_tax_normal_rate: partial
            .corporate_tax_normal_rate
            .unwrap_or(defaults.corporate_tax_normal_rate),
        corporate_tax_threshold: partial
            .corporate_tax_threshold
            .unwrap_or(defaults.corporate_tax_threshold),
        dividend_flat_tax_rate: partial
            .dividend_flat_tax_rate
            .unwrap_or(defaults.dividend_flat_tax_rate),
        employee_contrib_rate: partial
            .employee_contrib_rate
            .unwrap_or(defaults.employee_contrib_rate),
        employer_contrib_rate: partial
            .employer_contrib_rate
            .unwrap_or(defaults.employer_contrib_rate),
    }
}

/// Whole days from a possibly fractional or negative number.
pub fn days_from_number(value: f64) -> u32 {
    if value.is_finite() && value > 0.0 {
        value.round().min(u32::MAX as f64) as u32
    } else {
        0
    }
}

/// Reads user-typed numeric text. Anything that is not a finite number reads as 0.
///
/// Accepts a comma decimal separator and grouping spaces ("1 800,50").
pub fn parse_number(text: &str) -> f64 {
    let cleaned: String = text
        .chars()
        .filter(|c| !c.is_whitespace())
        .map(|c| if c == ',' { '.' } else { c })
        .collect();

    match cleaned.parse::<f64>() {
        Ok(value) if value.is_finite() => value,
        _ => 0.0,
    }
}

/// Percent text ("11", "22,5") to a fraction.
pub fn parse_percent(text: &str) -> f64 {
    parse_number(text) / 100.0
}
