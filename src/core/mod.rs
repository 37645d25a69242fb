mod defaults;
mod engine;
mod types;

pub use defaults::{
    DEFAULT_CORPORATE_TAX_NORMAL_RATE, DEFAULT_CORPORATE_TAX_REDUCED_RATE,
    DEFAULT_CORPORATE_TAX_THRESHOLD, DEFAULT_DAYS_WORKED, DEFAULT_DIVIDEND_FLAT_TAX_RATE,
    DEFAULT_MONTHLY_INCOME_TAX_RATE, DEFAULT_MONTHLY_NET_SALARY, DEFAULT_TJM,
    EMPLOYEE_CONTRIB_RATE, EMPLOYER_CONTRIB_RATE, MAX_EMPLOYEE_CONTRIB_RATE, NEW_CHARGE_LABEL,
    PartialCharge, PartialSimulationData, days_from_number, default_charges,
    default_simulation_data, new_charge, new_id, parse_number, parse_percent, with_defaults,
};
pub use engine::{compute, corporate_tax, total_deductibles};
pub use types::{DeductibleCharge, SimulationData, SimulationResults};
