use super::defaults::{EMPLOYEE_CONTRIB_RATE, MAX_EMPLOYEE_CONTRIB_RATE};
use super::types::{SimulationData, SimulationResults};

/// Evaluates the full income pipeline for one parameter snapshot.
///
/// Each step only reads raw inputs and the steps above it. The function is
/// total: losses flow through as negative pre-tax and distributable results,
/// while corporate tax and net dividends never go below zero.
pub fn compute(data: &SimulationData) -> SimulationResults {
    let annual_turnover = data.tjm * f64::from(data.days_worked);

    let annual_net_salary = data.monthly_net_salary * 12.0;
    let employee_rate = effective_employee_rate(data.employee_contrib_rate);
    let annual_gross_salary = annual_net_salary / (1.0 - employee_rate);
    let annual_employer_contribution = annual_gross_salary * data.employer_contrib_rate;
    let total_payroll_cost = annual_gross_salary + annual_employer_contribution;

    let total_deductibles = total_deductibles(data);

    let result_before_tax = annual_turnover - total_payroll_cost - total_deductibles;
    let corporate_tax = corporate_tax(
        result_before_tax,
        data.corporate_tax_threshold,
        data.corporate_tax_reduced_rate,
        data.corporate_tax_normal_rate,
    );
    let distributable_result = result_before_tax - corporate_tax;
    let net_dividends = (distributable_result * (1.0 - data.dividend_flat_tax_rate)).max(0.0);

    // The withholding rate is applied to the annual figure.
    let net_salary_after_withholding = annual_net_salary * (1.0 - data.monthly_income_tax_rate);
    let total_take_home = net_salary_after_withholding + net_dividends;

    SimulationResults {
        annual_turnover,
        annual_net_salary,
        annual_gross_salary,
        annual_employer_contribution,
        total_payroll_cost,
        total_deductibles,
        result_before_tax,
        corporate_tax,
        distributable_result,
        net_dividends,
        net_salary_after_withholding,
        total_take_home,
    }
}

/// Two-bracket corporate tax: the reduced rate up to `threshold`, the normal
/// rate above it. Losses are taxed at zero.
pub fn corporate_tax(
    result_before_tax: f64,
    threshold: f64,
    reduced_rate: f64,
    normal_rate: f64,
) -> f64 {
    let taxable = result_before_tax.max(0.0);
    let reduced_base = taxable.min(threshold);
    let normal_base = (taxable - threshold).max(0.0);
    reduced_base * reduced_rate + normal_base * normal_rate
}

pub fn total_deductibles(data: &SimulationData) -> f64 {
    data.deductible_charges.iter().map(|charge| charge.amount).sum()
}

fn effective_employee_rate(rate: f64) -> f64 {
    if rate.is_finite() {
        rate.clamp(0.0, MAX_EMPLOYEE_CONTRIB_RATE)
    } else {
        EMPLOYEE_CONTRIB_RATE
    }
}
