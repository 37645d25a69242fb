use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeductibleCharge {
    pub id: String,
    pub label: String,
    pub amount: f64,
}

/// Live or stored parameter set. Every rate is a fraction of 1.
///
/// Equality is structural: scalar fields plus a positional comparison of
/// `deductible_charges` (id, label and amount at each index).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationData {
    pub tjm: f64,
    pub days_worked: u32,
    pub monthly_net_salary: f64,
    pub monthly_income_tax_rate: f64,
    pub deductible_charges: Vec<DeductibleCharge>,
    pub corporate_tax_reduced_rate: f64,
    pub corporate_tax_normal_rate: f64,
    pub corporate_tax_threshold: f64,
    pub dividend_flat_tax_rate: f64,
    pub employee_contrib_rate: f64,
    pub employer_contrib_rate: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationResults {
    pub annual_turnover: f64,
    pub annual_net_salary: f64,
    pub annual_gross_salary: f64,
    pub annual_employer_contribution: f64,
    pub total_payroll_cost: f64,
    pub total_deductibles: f64,
    pub result_before_tax: f64,
    pub corporate_tax: f64,
    pub distributable_result: f64,
    pub net_dividends: f64,
    pub net_salary_after_withholding: f64,
    pub total_take_home: f64,
}
