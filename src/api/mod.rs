use axum::{
    Router,
    extract::{Json, Path, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, patch, post},
};
use clap::{Args, Parser, Subcommand};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;
use tokio::net::TcpListener;

use crate::core::{
    DeductibleCharge, NEW_CHARGE_LABEL, SimulationData, SimulationResults, compute,
    days_from_number, default_charges, default_simulation_data, new_id, parse_number,
};
use crate::session::{Session, SessionError};
use crate::store::{FileStorage, KeyValueStorage, MemoryStorage, StoreError};

#[derive(Debug, Error)]
pub enum InputError {
    #[error("{field} must be between 0 and 100 percent, got {value}")]
    RateOutOfRange { field: &'static str, value: f64 },

    #[error("employee contribution rate must be below 100 percent, got {value}")]
    EmployeeRateTooHigh { value: f64 },

    #[error("invalid charge '{0}', expected LABEL=AMOUNT")]
    InvalidCharge(String),
}

#[derive(Parser, Debug)]
#[command(
    name = "sasu-sim",
    about = "SASU take-home income estimator (salary + dividends, président assimilé salarié)"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Evaluate one parameter set and print the results as JSON
    Compute(ComputeArgs),
    /// Serve the JSON API over a persisted simulation collection
    Serve(ServeArgs),
}

#[derive(Args, Debug)]
pub struct ComputeArgs {
    #[arg(long, default_value_t = 650.0, help = "Daily billing rate (TJM), excluding VAT")]
    tjm: f64,
    #[arg(long, default_value_t = 180, help = "Days billed in the year")]
    days_worked: u32,
    #[arg(long, default_value_t = 3800.0, help = "Target monthly net salary")]
    monthly_net_salary: f64,
    #[arg(
        long,
        default_value_t = 11.0,
        help = "Withholding income tax rate in percent, applied to the annual net salary"
    )]
    income_tax_rate: f64,
    #[arg(
        long = "charge",
        value_name = "LABEL=AMOUNT",
        value_parser = parse_charge,
        help = "Deductible charge; repeat for several. Defaults to the reference charge list"
    )]
    charges: Vec<DeductibleCharge>,
    #[arg(long, help = "Start from an empty charge list instead of the reference one")]
    no_default_charges: bool,
    #[arg(
        long,
        default_value_t = 15.0,
        help = "Reduced corporate tax rate in percent"
    )]
    corporate_tax_reduced_rate: f64,
    #[arg(
        long,
        default_value_t = 25.0,
        help = "Normal corporate tax rate in percent"
    )]
    corporate_tax_normal_rate: f64,
    #[arg(
        long,
        default_value_t = 42500.0,
        help = "Profit taxed at the reduced rate before the normal rate applies"
    )]
    corporate_tax_threshold: f64,
    #[arg(
        long,
        default_value_t = 30.0,
        help = "Flat tax on dividends (PFU) in percent"
    )]
    dividend_flat_tax_rate: f64,
    #[arg(
        long,
        default_value_t = 22.5,
        help = "Employee contributions in percent (net to gross uplift)"
    )]
    employee_contrib_rate: f64,
    #[arg(
        long,
        default_value_t = 43.3,
        help = "Employer contributions in percent of gross salary"
    )]
    employer_contrib_rate: f64,
}

#[derive(Args, Debug)]
pub struct ServeArgs {
    #[arg(long, default_value_t = 8080)]
    port: u16,
    #[arg(
        long,
        default_value = ".sasu-sim",
        help = "Directory holding the persisted simulations"
    )]
    data_dir: PathBuf,
    #[arg(long, help = "Keep simulations in memory only")]
    ephemeral: bool,
}

/// Number typed by a user: either a JSON number or free text.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum NumericInput {
    Number(f64),
    Text(String),
}

impl NumericInput {
    fn value(&self) -> f64 {
        match self {
            NumericInput::Number(v) if v.is_finite() => *v,
            NumericInput::Number(_) => 0.0,
            NumericInput::Text(text) => parse_number(text),
        }
    }

    fn percent(&self) -> f64 {
        self.value() / 100.0
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct ChargePayload {
    id: Option<String>,
    label: Option<String>,
    amount: Option<NumericInput>,
}

/// Parameter overlay. Rates are in percent.
#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct ParametersPayload {
    tjm: Option<NumericInput>,
    days_worked: Option<NumericInput>,
    monthly_net_salary: Option<NumericInput>,
    income_tax_rate: Option<NumericInput>,
    corporate_tax_reduced_rate: Option<NumericInput>,
    corporate_tax_normal_rate: Option<NumericInput>,
    corporate_tax_threshold: Option<NumericInput>,
    dividend_flat_tax_rate: Option<NumericInput>,
    employee_contrib_rate: Option<NumericInput>,
    employer_contrib_rate: Option<NumericInput>,
    charges: Option<Vec<ChargePayload>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct NamePayload {
    name: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ComputeResponse {
    pub inputs: SimulationData,
    pub results: SimulationResults,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SimulationSummary {
    id: String,
    name: String,
    updated_at: i64,
    total_take_home: f64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StateResponse {
    active_id: String,
    simulations: Vec<SimulationSummary>,
    live: SimulationData,
    results: SimulationResults,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

type SharedSession<S> = Arc<Mutex<Session<S>>>;

fn parse_charge(raw: &str) -> Result<DeductibleCharge, InputError> {
    let (label, amount) = raw
        .rsplit_once('=')
        .ok_or_else(|| InputError::InvalidCharge(raw.to_string()))?;
    let label = label.trim();
    if label.is_empty() {
        return Err(InputError::InvalidCharge(raw.to_string()));
    }
    Ok(DeductibleCharge {
        id: new_id(),
        label: label.to_string(),
        amount: non_negative(parse_number(amount)),
    })
}

fn non_negative(value: f64) -> f64 {
    if value.is_finite() { value.max(0.0) } else { 0.0 }
}

fn checked_rate(field: &'static str, rate: f64) -> Result<f64, InputError> {
    if !rate.is_finite() || !(0.0..=1.0).contains(&rate) {
        return Err(InputError::RateOutOfRange {
            field,
            value: rate * 100.0,
        });
    }
    Ok(rate)
}

fn checked_employee_rate(rate: f64) -> Result<f64, InputError> {
    let rate = checked_rate("employee contribution rate", rate)?;
    if rate >= 1.0 {
        return Err(InputError::EmployeeRateTooHigh { value: rate * 100.0 });
    }
    Ok(rate)
}

fn validate_data(data: &SimulationData) -> Result<(), InputError> {
    for (field, rate) in [
        ("income tax rate", data.monthly_income_tax_rate),
        ("reduced corporate tax rate", data.corporate_tax_reduced_rate),
        ("normal corporate tax rate", data.corporate_tax_normal_rate),
        ("dividend flat tax rate", data.dividend_flat_tax_rate),
        ("employer contribution rate", data.employer_contrib_rate),
    ] {
        checked_rate(field, rate)?;
    }
    checked_employee_rate(data.employee_contrib_rate)?;
    Ok(())
}

fn build_data(args: ComputeArgs) -> Result<SimulationData, InputError> {
    let deductible_charges = if args.charges.is_empty() && !args.no_default_charges {
        default_charges()
    } else {
        args.charges
    };

    let data = SimulationData {
        tjm: non_negative(args.tjm),
        days_worked: args.days_worked,
        monthly_net_salary: non_negative(args.monthly_net_salary),
        monthly_income_tax_rate: args.income_tax_rate / 100.0,
        deductible_charges,
        corporate_tax_reduced_rate: args.corporate_tax_reduced_rate / 100.0,
        corporate_tax_normal_rate: args.corporate_tax_normal_rate / 100.0,
        corporate_tax_threshold: non_negative(args.corporate_tax_threshold),
        dividend_flat_tax_rate: args.dividend_flat_tax_rate / 100.0,
        employee_contrib_rate: args.employee_contrib_rate / 100.0,
        employer_contrib_rate: args.employer_contrib_rate / 100.0,
    };
    validate_data(&data)?;
    Ok(data)
}

pub fn run_compute(args: ComputeArgs) -> Result<ComputeResponse, InputError> {
    let inputs = build_data(args)?;
    let results = compute(&inputs);
    Ok(ComputeResponse { inputs, results })
}

fn apply_payload(
    mut data: SimulationData,
    payload: ParametersPayload,
) -> Result<SimulationData, InputError> {
    if let Some(v) = payload.tjm {
        data.tjm = non_negative(v.value());
    }
    if let Some(v) = payload.days_worked {
        data.days_worked = days_from_number(v.value());
    }
    if let Some(v) = payload.monthly_net_salary {
        data.monthly_net_salary = non_negative(v.value());
    }
    if let Some(v) = payload.income_tax_rate {
        data.monthly_income_tax_rate = checked_rate("income tax rate", v.percent())?;
    }
    if let Some(v) = payload.corporate_tax_reduced_rate {
        data.corporate_tax_reduced_rate =
            checked_rate("reduced corporate tax rate", v.percent())?;
    }
    if let Some(v) = payload.corporate_tax_normal_rate {
        data.corporate_tax_normal_rate =
            checked_rate("normal corporate tax rate", v.percent())?;
    }
    if let Some(v) = payload.corporate_tax_threshold {
        data.corporate_tax_threshold = non_negative(v.value());
    }
    if let Some(v) = payload.dividend_flat_tax_rate {
        data.dividend_flat_tax_rate = checked_rate("dividend flat tax rate", v.percent())?;
    }
    if let Some(v) = payload.employee_contrib_rate {
        data.employee_contrib_rate = checked_employee_rate(v.percent())?;
    }
    if let Some(v) = payload.employer_contrib_rate {
        data.employer_contrib_rate =
            checked_rate("employer contribution rate", v.percent())?;
    }
    if let Some(charges) = payload.charges {
        data.deductible_charges = charges
            .into_iter()
            .map(|charge| DeductibleCharge {
                id: charge.id.unwrap_or_else(new_id),
                label: charge
                    .label
                    .unwrap_or_else(|| NEW_CHARGE_LABEL.to_string()),
                amount: charge
                    .amount
                    .map(|amount| non_negative(amount.value()))
                    .unwrap_or(0.0),
            })
            .collect();
    }

    Ok(data)
}

pub async fn run_http_server(args: ServeArgs) -> std::io::Result<()> {
    if args.ephemeral {
        log::info!("serving an in-memory simulation collection");
        serve(Session::open(MemoryStorage::new()), args.port).await
    } else {
        log::info!("serving simulations from {}", args.data_dir.display());
        serve(Session::open(FileStorage::new(args.data_dir)), args.port).await
    }
}

async fn serve<S>(mut session: Session<S>, port: u16) -> std::io::Result<()>
where
    S: KeyValueStorage + Send + 'static,
{
    session.subscribe(|_, results| {
        log::debug!(
            "live data changed, take-home now {:.2}",
            results.total_take_home
        );
    });

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let app = router(Arc::new(Mutex::new(session)));

    let listener = TcpListener::bind(addr).await?;
    log::info!("SASU simulator API listening on http://{addr}");

    axum::serve(listener, app).await
}

fn router<S>(shared: SharedSession<S>) -> Router
where
    S: KeyValueStorage + Send + 'static,
{
    Router::new()
        .route("/api/compute", post(compute_handler))
        .route("/api/state", get(state_handler::<S>))
        .route("/api/live", patch(live_handler::<S>))
        .route("/api/charges", post(add_charge_handler::<S>))
        .route(
            "/api/charges/:id",
            patch(update_charge_handler::<S>).delete(remove_charge_handler::<S>),
        )
        .route("/api/simulations", post(create_simulation_handler::<S>))
        .route(
            "/api/simulations/:id",
            patch(rename_simulation_handler::<S>).delete(delete_simulation_handler::<S>),
        )
        .route(
            "/api/simulations/:id/activate",
            post(activate_simulation_handler::<S>),
        )
        .fallback(not_found_handler)
        .with_state(shared)
}

fn lock<S>(shared: &SharedSession<S>) -> MutexGuard<'_, Session<S>> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

async fn not_found_handler() -> Response {
    error_response(StatusCode::NOT_FOUND, "Not found")
}

async fn compute_handler(Json(payload): Json<ParametersPayload>) -> Response {
    match apply_payload(default_simulation_data(), payload) {
        Ok(inputs) => {
            let results = compute(&inputs);
            json_response(StatusCode::OK, ComputeResponse { inputs, results })
        }
        Err(err) => error_response(StatusCode::BAD_REQUEST, &err.to_string()),
    }
}

async fn state_handler<S: KeyValueStorage>(State(shared): State<SharedSession<S>>) -> Response {
    let session = lock(&shared);
    json_response(StatusCode::OK, state_response(&session))
}

async fn live_handler<S: KeyValueStorage>(
    State(shared): State<SharedSession<S>>,
    Json(payload): Json<ParametersPayload>,
) -> Response {
    let mut session = lock(&shared);
    let candidate = match apply_payload(session.snapshot().clone(), payload) {
        Ok(candidate) => candidate,
        Err(err) => return error_response(StatusCode::BAD_REQUEST, &err.to_string()),
    };
    session.update(|data| *data = candidate);
    json_response(StatusCode::OK, state_response(&session))
}

async fn add_charge_handler<S: KeyValueStorage>(
    State(shared): State<SharedSession<S>>,
    Json(payload): Json<ChargePayload>,
) -> Response {
    let mut session = lock(&shared);
    let id = session.add_charge();
    let result = edit_charge(&mut session, &id, payload);
    session_result_response(&session, result)
}

async fn update_charge_handler<S: KeyValueStorage>(
    State(shared): State<SharedSession<S>>,
    Path(id): Path<String>,
    Json(payload): Json<ChargePayload>,
) -> Response {
    let mut session = lock(&shared);
    let result = edit_charge(&mut session, &id, payload);
    session_result_response(&session, result)
}

async fn remove_charge_handler<S: KeyValueStorage>(
    State(shared): State<SharedSession<S>>,
    Path(id): Path<String>,
) -> Response {
    let mut session = lock(&shared);
    let result = session.remove_charge(&id);
    session_result_response(&session, result)
}

async fn create_simulation_handler<S: KeyValueStorage>(
    State(shared): State<SharedSession<S>>,
    Json(payload): Json<NamePayload>,
) -> Response {
    let mut session = lock(&shared);
    session.create(&payload.name);
    json_response(StatusCode::CREATED, state_response(&session))
}

async fn rename_simulation_handler<S: KeyValueStorage>(
    State(shared): State<SharedSession<S>>,
    Path(id): Path<String>,
    Json(payload): Json<NamePayload>,
) -> Response {
    let mut session = lock(&shared);
    let result = session.rename(&id, &payload.name).map(|_| ());
    session_result_response(&session, result)
}

async fn delete_simulation_handler<S: KeyValueStorage>(
    State(shared): State<SharedSession<S>>,
    Path(id): Path<String>,
) -> Response {
    let mut session = lock(&shared);
    let result = session.delete(&id);
    session_result_response(&session, result)
}

async fn activate_simulation_handler<S: KeyValueStorage>(
    State(shared): State<SharedSession<S>>,
    Path(id): Path<String>,
) -> Response {
    let mut session = lock(&shared);
    let result = session.select(&id);
    session_result_response(&session, result)
}

fn edit_charge<S: KeyValueStorage>(
    session: &mut Session<S>,
    id: &str,
    payload: ChargePayload,
) -> Result<(), SessionError> {
    if let Some(label) = payload.label {
        session.update_charge_label(id, &label)?;
    }
    if let Some(amount) = payload.amount {
        session.update_charge_amount(id, amount.value())?;
    }
    Ok(())
}

fn state_response<S: KeyValueStorage>(session: &Session<S>) -> StateResponse {
    let store = session.store();
    StateResponse {
        active_id: store.active_id().to_string(),
        simulations: store
            .simulations()
            .iter()
            .map(|sim| SimulationSummary {
                id: sim.id.clone(),
                name: sim.name.clone(),
                updated_at: sim.updated_at,
                total_take_home: compute(&sim.data).total_take_home,
            })
            .collect(),
        live: session.snapshot().clone(),
        results: session.results(),
    }
}

fn session_result_response<S: KeyValueStorage>(
    session: &Session<S>,
    result: Result<(), SessionError>,
) -> Response {
    match result {
        Ok(()) => json_response(StatusCode::OK, state_response(session)),
        Err(err @ SessionError::ChargeNotFound(_))
        | Err(err @ SessionError::Store(StoreError::SimulationNotFound(_))) => {
            error_response(StatusCode::NOT_FOUND, &err.to_string())
        }
    }
}

fn json_response<T: Serialize>(status: StatusCode, body: T) -> Response {
    let mut response = (status, Json(body)).into_response();
    response.headers_mut().insert(
        header::CACHE_CONTROL,
        header::HeaderValue::from_static("no-store"),
    );
    response
}

fn error_response(status: StatusCode, msg: &str) -> Response {
    json_response(
        status,
        ErrorResponse {
            error: msg.to_string(),
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{DEFAULT_TJM, EMPLOYEE_CONTRIB_RATE, EMPLOYER_CONTRIB_RATE};

    const EPS: f64 = 1e-6;

    fn assert_approx(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() <= EPS,
            "expected {expected}, got {actual}"
        );
    }

    fn compute_args(extra: &[&str]) -> ComputeArgs {
        let mut argv = vec!["sasu-sim", "compute"];
        argv.extend_from_slice(extra);
        match Cli::try_parse_from(argv).expect("valid arguments").command {
            Command::Compute(args) => args,
            Command::Serve(_) => panic!("expected compute subcommand"),
        }
    }

    fn payload_from_json(json: &str) -> ParametersPayload {
        serde_json::from_str(json).expect("valid payload json")
    }

    fn shared_session() -> SharedSession<MemoryStorage> {
        Arc::new(Mutex::new(Session::open(MemoryStorage::new())))
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("readable body");
        serde_json::from_slice(&bytes).expect("json body")
    }

    #[test]
    fn cli_defaults_match_reference_parameters() {
        let data = build_data(compute_args(&[])).expect("valid inputs");
        let reference = default_simulation_data();

        assert_approx(data.tjm, DEFAULT_TJM);
        assert_eq!(data.days_worked, reference.days_worked);
        assert_approx(data.monthly_net_salary, reference.monthly_net_salary);
        assert_approx(data.monthly_income_tax_rate, reference.monthly_income_tax_rate);
        assert_approx(
            data.corporate_tax_reduced_rate,
            reference.corporate_tax_reduced_rate,
        );
        assert_approx(
            data.corporate_tax_normal_rate,
            reference.corporate_tax_normal_rate,
        );
        assert_approx(data.corporate_tax_threshold, reference.corporate_tax_threshold);
        assert_approx(data.dividend_flat_tax_rate, reference.dividend_flat_tax_rate);
        assert_approx(data.employee_contrib_rate, EMPLOYEE_CONTRIB_RATE);
        assert_approx(data.employer_contrib_rate, EMPLOYER_CONTRIB_RATE);
        assert_eq!(data.deductible_charges.len(), 3);
    }

    #[test]
    fn cli_charges_replace_defaults() {
        let args = compute_args(&["--charge", "Compta=1500", "--charge", "Banque = 120,5"]);
        let data = build_data(args).expect("valid inputs");
        let charges: Vec<(&str, f64)> = data
            .deductible_charges
            .iter()
            .map(|c| (c.label.as_str(), c.amount))
            .collect();
        assert_eq!(charges, vec![("Compta", 1_500.0), ("Banque", 120.5)]);
    }

    #[test]
    fn cli_can_start_without_charges() {
        let data = build_data(compute_args(&["--no-default-charges"])).expect("valid inputs");
        assert!(data.deductible_charges.is_empty());
    }

    #[test]
    fn cli_rejects_malformed_charge() {
        let err = Cli::try_parse_from(["sasu-sim", "compute", "--charge", "no-amount"])
            .expect_err("charge without '='");
        assert!(err.to_string().contains("LABEL=AMOUNT"));
    }

    #[test]
    fn parse_charge_coerces_amount_text() {
        let charge = parse_charge("Divers=abc").expect("label present");
        assert_eq!(charge.label, "Divers");
        assert_eq!(charge.amount, 0.0);
        assert_eq!(parse_charge("Remise=-30").expect("label present").amount, 0.0);
        assert!(parse_charge("=10").is_err());
    }

    #[test]
    fn build_data_rejects_rates_above_hundred_percent() {
        let err = build_data(compute_args(&["--dividend-flat-tax-rate", "130"]))
            .expect_err("must reject 130%");
        assert!(err.to_string().contains("dividend flat tax rate"));
    }

    #[test]
    fn build_data_rejects_full_employee_contribution() {
        let err = build_data(compute_args(&["--employee-contrib-rate", "100"]))
            .expect_err("must reject 100%");
        assert!(matches!(err, InputError::EmployeeRateTooHigh { .. }));
    }

    #[test]
    fn run_compute_reports_reference_turnover_and_salary() {
        let report = run_compute(compute_args(&[])).expect("valid inputs");
        assert_approx(report.results.annual_turnover, 117_000.0);
        assert_approx(report.results.annual_net_salary, 45_600.0);

        let json = serde_json::to_string(&report).expect("serializable");
        assert!(json.contains("\"totalTakeHome\""));
        assert!(json.contains("\"deductibleCharges\""));
    }

    #[test]
    fn payload_coerces_text_and_converts_percentages() {
        let payload = payload_from_json(
            r#"{
              "tjm": "700",
              "daysWorked": 199.6,
              "monthlyNetSalary": "quatre mille",
              "incomeTaxRate": "7,5",
              "dividendFlatTaxRate": 30,
              "charges": [{ "label": "Compta", "amount": "1 200" }, { "amount": -5 }]
            }"#,
        );
        let data = apply_payload(default_simulation_data(), payload).expect("valid payload");

        assert_approx(data.tjm, 700.0);
        assert_eq!(data.days_worked, 200);
        assert_approx(data.monthly_net_salary, 0.0);
        assert_approx(data.monthly_income_tax_rate, 0.075);
        assert_approx(data.dividend_flat_tax_rate, 0.3);
        assert_eq!(data.deductible_charges.len(), 2);
        assert_eq!(data.deductible_charges[0].label, "Compta");
        assert_approx(data.deductible_charges[0].amount, 1_200.0);
        assert_eq!(data.deductible_charges[1].label, NEW_CHARGE_LABEL);
        assert_approx(data.deductible_charges[1].amount, 0.0);
    }

    #[test]
    fn payload_rejects_out_of_range_rate() {
        let payload = payload_from_json(r#"{ "corporateTaxNormalRate": -5 }"#);
        let err = apply_payload(default_simulation_data(), payload).expect_err("negative rate");
        assert!(err.to_string().contains("normal corporate tax rate"));
    }

    #[test]
    fn payload_only_checks_the_rates_it_sets() {
        let mut stored = default_simulation_data();
        stored.monthly_income_tax_rate = 1.5;

        let payload = payload_from_json(r#"{ "tjm": 720 }"#);
        let data = apply_payload(stored.clone(), payload).expect("untouched rate is kept");
        assert_approx(data.tjm, 720.0);
        assert_approx(data.monthly_income_tax_rate, 1.5);

        let payload = payload_from_json(r#"{ "employeeContribRate": 100 }"#);
        let err = apply_payload(stored, payload).expect_err("full employee rate");
        assert!(matches!(err, InputError::EmployeeRateTooHigh { .. }));
    }

    #[tokio::test]
    async fn compute_endpoint_returns_results() {
        let payload = payload_from_json(r#"{ "tjm": 650, "daysWorked": 180 }"#);
        let response = compute_handler(Json(payload)).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(header::CACHE_CONTROL).map(|v| v.as_bytes()),
            Some(&b"no-store"[..])
        );
        let body = body_json(response).await;
        assert_eq!(body["results"]["annualTurnover"], 117_000.0);
    }

    #[tokio::test]
    async fn compute_endpoint_rejects_invalid_rate() {
        let payload = payload_from_json(r#"{ "incomeTaxRate": 150 }"#);
        let response = compute_handler(Json(payload)).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert!(body["error"].as_str().is_some_and(|msg| msg.contains("income tax rate")));
    }

    #[tokio::test]
    async fn live_patch_writes_back_into_active_simulation() {
        let shared = shared_session();
        let payload = payload_from_json(r#"{ "tjm": "720" }"#);
        let response = live_handler(State(Arc::clone(&shared)), Json(payload)).await;
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_json(response).await;
        assert_eq!(body["live"]["tjm"], 720.0);
        assert_eq!(body["results"]["annualTurnover"], 129_600.0);

        let session = lock(&shared);
        assert_eq!(session.store().active().data.tjm, 720.0);
    }

    #[tokio::test]
    async fn invalid_live_patch_leaves_state_untouched() {
        let shared = shared_session();
        let payload = payload_from_json(r#"{ "tjm": 900, "employeeContribRate": 100 }"#);
        let response = live_handler(State(Arc::clone(&shared)), Json(payload)).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(lock(&shared).snapshot().tjm, 650.0);
    }

    #[tokio::test]
    async fn charge_endpoints_edit_live_charges() {
        let shared = shared_session();
        let payload: ChargePayload =
            serde_json::from_str(r#"{ "label": "Mutuelle", "amount": "80" }"#).expect("json");
        let response = add_charge_handler(State(Arc::clone(&shared)), Json(payload)).await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["results"]["totalDeductibles"], 5_280.0);

        let id = lock(&shared)
            .snapshot()
            .deductible_charges
            .last()
            .map(|c| c.id.clone())
            .expect("charge added");
        let response = remove_charge_handler(State(Arc::clone(&shared)), Path(id)).await;
        assert_eq!(response.status(), StatusCode::OK);

        let response =
            remove_charge_handler(State(Arc::clone(&shared)), Path("ghost".to_string())).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn simulation_endpoints_manage_collection() {
        let shared = shared_session();
        let first = lock(&shared).store().active_id().to_string();

        let response = create_simulation_handler(
            State(Arc::clone(&shared)),
            Json(NamePayload {
                name: "Plan B".to_string(),
            }),
        )
        .await;
        assert_eq!(response.status(), StatusCode::CREATED);
        let body = body_json(response).await;
        assert_eq!(body["simulations"].as_array().map(Vec::len), Some(2));
        let second = body["activeId"].as_str().expect("active id").to_string();
        assert_ne!(second, first);

        let response = rename_simulation_handler(
            State(Arc::clone(&shared)),
            Path(second.clone()),
            Json(NamePayload {
                name: "Plan C".to_string(),
            }),
        )
        .await;
        let body = body_json(response).await;
        assert_eq!(body["simulations"][1]["name"], "Plan C");

        let response =
            activate_simulation_handler(State(Arc::clone(&shared)), Path(first.clone())).await;
        let body = body_json(response).await;
        assert_eq!(body["activeId"], first.as_str());

        let response =
            delete_simulation_handler(State(Arc::clone(&shared)), Path(first.clone())).await;
        let body = body_json(response).await;
        assert_eq!(body["activeId"], second.as_str());
        assert_eq!(body["simulations"].as_array().map(Vec::len), Some(1));

        let response =
            activate_simulation_handler(State(Arc::clone(&shared)), Path(first)).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
