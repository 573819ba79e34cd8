use axum::{
    Router,
    extract::{Json, Query},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use clap::{Parser, ValueEnum};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

use crate::core::{
    BatchReport, CohortSummary, Household, HouseholdRecord, HousingSituation, Region,
    ResolvedScenario, Scenario, ScenarioSelection, SeedPolicy, SimulationConfig,
    SimulationOutcome, SimulationParams, TimelineResult, amplify_edge_cases, generate_households,
    resolve, run_batch_with_progress, sample_households, simulate_record, simulate_timeline,
    summarize,
};

const MAX_HOUSEHOLDS: usize = 100_000;

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum CliSeedPolicy {
    Shared,
    Independent,
}

impl From<CliSeedPolicy> for SeedPolicy {
    fn from(value: CliSeedPolicy) -> Self {
        match value {
            CliSeedPolicy::Shared => SeedPolicy::Shared,
            CliSeedPolicy::Independent => SeedPolicy::Independent,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case")]
enum ApiSeedPolicy {
    #[serde(alias = "common")]
    Shared,
    #[serde(alias = "per-scenario", alias = "perScenario")]
    Independent,
}

impl From<ApiSeedPolicy> for CliSeedPolicy {
    fn from(value: ApiSeedPolicy) -> Self {
        match value {
            ApiSeedPolicy::Shared => CliSeedPolicy::Shared,
            ApiSeedPolicy::Independent => CliSeedPolicy::Independent,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct ParamsPayload {
    scenario: Option<String>,
    simulations: Option<u32>,
    years: Option<u32>,
    seed: Option<u64>,
    seed_policy: Option<ApiSeedPolicy>,

    income_growth: Option<f64>,
    income_volatility: Option<f64>,
    insurance_increase: Option<f64>,
    insurance_increase_min: Option<f64>,
    insurance_increase_max: Option<f64>,
    home_appreciation: Option<f64>,
    appreciation_volatility: Option<f64>,
    interest_rate: Option<f64>,
    interest_rate_volatility: Option<f64>,
    affordability_threshold: Option<f64>,
    rent_affordability_threshold: Option<f64>,
    rent_increase_min: Option<f64>,
    rent_increase_mode: Option<f64>,
    rent_increase_max: Option<f64>,
    rent_grace_months: Option<u32>,
}

impl ParamsPayload {
    fn apply(self, cli: &mut Cli) {
        if let Some(v) = self.scenario {
            cli.scenario = v;
        }
        if let Some(v) = self.simulations {
            cli.simulations = v;
        }
        if let Some(v) = self.years {
            cli.years = v;
        }
        if let Some(v) = self.seed {
            cli.seed = v;
        }
        if let Some(v) = self.seed_policy {
            cli.seed_policy = v.into();
        }

        if let Some(v) = self.income_growth {
            cli.income_growth = v;
        }
        if let Some(v) = self.income_volatility {
            cli.income_volatility = v;
        }
        if let Some(v) = self.insurance_increase {
            cli.insurance_increase = v;
        }
        if let Some(v) = self.insurance_increase_min {
            cli.insurance_increase_min = v;
        }
        if let Some(v) = self.insurance_increase_max {
            cli.insurance_increase_max = v;
        }
        if self.home_appreciation.is_some() {
            cli.home_appreciation = self.home_appreciation;
        }
        if let Some(v) = self.appreciation_volatility {
            cli.appreciation_volatility = v;
        }
        if self.interest_rate.is_some() {
            cli.interest_rate = self.interest_rate;
        }
        if let Some(v) = self.interest_rate_volatility {
            cli.interest_rate_volatility = v;
        }
        if let Some(v) = self.affordability_threshold {
            cli.affordability_threshold = v;
        }
        if let Some(v) = self.rent_affordability_threshold {
            cli.rent_affordability_threshold = v;
        }
        if let Some(v) = self.rent_increase_min {
            cli.rent_increase_min = v;
        }
        if let Some(v) = self.rent_increase_mode {
            cli.rent_increase_mode = v;
        }
        if let Some(v) = self.rent_increase_max {
            cli.rent_increase_max = v;
        }
        if let Some(v) = self.rent_grace_months {
            cli.rent_grace_months = v;
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct SimulatePayload {
    household_id: Option<String>,
    annual_income: Option<f64>,
    savings: Option<f64>,
    credit_score: Option<f64>,
    monthly_debt: Option<f64>,
    region: Option<String>,
    employment_sector: Option<String>,
    current_monthly_rent: Option<f64>,
    age: Option<u32>,
    household_size: Option<u32>,
    housing_situation: Option<HousingSituation>,

    scenario: Option<String>,
    simulations: Option<u32>,
    years: Option<u32>,
    seed: Option<u64>,
    seed_policy: Option<ApiSeedPolicy>,

    income_growth: Option<f64>,
    income_volatility: Option<f64>,
    insurance_increase: Option<f64>,
    insurance_increase_min: Option<f64>,
    insurance_increase_max: Option<f64>,
    home_appreciation: Option<f64>,
    appreciation_volatility: Option<f64>,
    interest_rate: Option<f64>,
    interest_rate_volatility: Option<f64>,
    affordability_threshold: Option<f64>,
    rent_affordability_threshold: Option<f64>,
    rent_increase_min: Option<f64>,
    rent_increase_mode: Option<f64>,
    rent_increase_max: Option<f64>,
    rent_grace_months: Option<u32>,
}

impl SimulatePayload {
    fn split(self) -> (HouseholdRecord, ParamsPayload) {
        let record = HouseholdRecord {
            household_id: self.household_id.unwrap_or_else(|| "HH000001".to_string()),
            annual_income: self.annual_income,
            savings: self.savings,
            credit_score: self.credit_score,
            monthly_debt: self.monthly_debt,
            region: self.region,
            employment_sector: self.employment_sector.unwrap_or_default(),
            current_monthly_rent: self.current_monthly_rent,
            age: self.age,
            household_size: self.household_size,
            housing_situation: self.housing_situation,
        };
        let params = ParamsPayload {
            scenario: self.scenario,
            simulations: self.simulations,
            years: self.years,
            seed: self.seed,
            seed_policy: self.seed_policy,
            income_growth: self.income_growth,
            income_volatility: self.income_volatility,
            insurance_increase: self.insurance_increase,
            insurance_increase_min: self.insurance_increase_min,
            insurance_increase_max: self.insurance_increase_max,
            home_appreciation: self.home_appreciation,
            appreciation_volatility: self.appreciation_volatility,
            interest_rate: self.interest_rate,
            interest_rate_volatility: self.interest_rate_volatility,
            affordability_threshold: self.affordability_threshold,
            rent_affordability_threshold: self.rent_affordability_threshold,
            rent_increase_min: self.rent_increase_min,
            rent_increase_mode: self.rent_increase_mode,
            rent_increase_max: self.rent_increase_max,
            rent_grace_months: self.rent_grace_months,
        };
        (record, params)
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct BatchPayload {
    records: Option<Vec<HouseholdRecord>>,
    households: Option<usize>,
    household_seed: Option<u64>,
    amplification: Option<f64>,
    sample: Option<usize>,
    #[serde(flatten)]
    params: ParamsPayload,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ScenariosQuery {
    region: Option<String>,
}

#[derive(Parser, Debug)]
#[command(
    name = "housecast",
    about = "Monte Carlo housing affordability simulator for Florida households (rent vs. buy)"
)]
pub struct Cli {
    #[arg(long, default_value_t = 100, help = "Synthetic households to generate")]
    households: usize,
    #[arg(long, default_value_t = 42, help = "Seed for the synthetic household generator")]
    household_seed: u64,
    #[arg(
        long,
        default_value_t = 30.0,
        help = "Extra edge-case households as a percent of the cohort"
    )]
    amplification: f64,
    #[arg(
        long,
        help = "Simulate a random subset of this many households from the cohort"
    )]
    sample: Option<usize>,
    #[arg(
        long,
        default_value = "all",
        help = "rent, starter, standard, premium or all"
    )]
    scenario: String,
    #[arg(long, default_value_t = 1_000)]
    simulations: u32,
    #[arg(long, default_value_t = 10, help = "Time horizon in years")]
    years: u32,
    #[arg(long, default_value_t = 42)]
    seed: u64,
    #[arg(long, value_enum, default_value_t = CliSeedPolicy::Shared)]
    seed_policy: CliSeedPolicy,
    #[arg(long, default_value_t = 4.0, help = "Mean annual income growth in percent")]
    income_growth: f64,
    #[arg(long, default_value_t = 8.0, help = "Income growth volatility in percent")]
    income_volatility: f64,
    #[arg(
        long,
        default_value_t = 8.0,
        help = "Most likely annual insurance increase in percent; clamped into [min, max]"
    )]
    insurance_increase: f64,
    #[arg(long, default_value_t = 3.0)]
    insurance_increase_min: f64,
    #[arg(long, default_value_t = 12.0)]
    insurance_increase_max: f64,
    #[arg(
        long,
        help = "Mean annual home appreciation in percent, defaults to each scenario's base"
    )]
    home_appreciation: Option<f64>,
    #[arg(long, default_value_t = 6.0)]
    appreciation_volatility: f64,
    #[arg(
        long,
        help = "Mortgage rate in percent, defaults to each scenario's base rate"
    )]
    interest_rate: Option<f64>,
    #[arg(long, default_value_t = 1.2)]
    interest_rate_volatility: f64,
    #[arg(
        long,
        default_value_t = 50.0,
        help = "Maximum housing cost plus debt as a percent of monthly income for owners"
    )]
    affordability_threshold: f64,
    #[arg(long, default_value_t = 35.0, help = "Same limit for renters")]
    rent_affordability_threshold: f64,
    #[arg(long, default_value_t = 3.0)]
    rent_increase_min: f64,
    #[arg(long, default_value_t = 5.5)]
    rent_increase_mode: f64,
    #[arg(long, default_value_t = 10.0)]
    rent_increase_max: f64,
    #[arg(
        long,
        default_value_t = 0,
        help = "Consecutive unaffordable months a renter tolerates before defaulting"
    )]
    rent_grace_months: u32,
    #[arg(long, help = "Print only the cohort summary")]
    summary_only: bool,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct BatchResponse {
    households: usize,
    report: BatchReport,
    summary: CohortSummary,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SummaryOnlyResponse {
    households: usize,
    failures: usize,
    cancelled: bool,
    summary: CohortSummary,
}

fn percent(flag: &str, value: f64, min_exclusive: f64) -> Result<f64, String> {
    if !value.is_finite() || value <= min_exclusive {
        return Err(format!("--{flag} must be > {min_exclusive}"));
    }
    Ok(value / 100.0)
}

fn volatility(flag: &str, value: f64) -> Result<f64, String> {
    if !value.is_finite() || value < 0.0 {
        return Err(format!("--{flag} must be >= 0"));
    }
    Ok(value / 100.0)
}

fn threshold(flag: &str, value: f64) -> Result<f64, String> {
    if !value.is_finite() || value <= 0.0 || value > 100.0 {
        return Err(format!("--{flag} must be > 0 and <= 100"));
    }
    Ok(value / 100.0)
}

fn build_params(cli: &Cli) -> Result<SimulationParams, String> {
    if cli.simulations == 0 {
        return Err("--simulations must be > 0".to_string());
    }

    if cli.years == 0 {
        return Err("--years must be > 0".to_string());
    }

    if cli.insurance_increase_min > cli.insurance_increase_max {
        return Err("--insurance-increase-min must be <= --insurance-increase-max".to_string());
    }

    if cli.rent_increase_min > cli.rent_increase_max {
        return Err("--rent-increase-min must be <= --rent-increase-max".to_string());
    }

    if let Some(rate) = cli.interest_rate {
        if !rate.is_finite() || !(0.0..100.0).contains(&rate) {
            return Err("--interest-rate must be >= 0 and < 100".to_string());
        }
    }

    Ok(SimulationParams {
        num_simulations: cli.simulations,
        time_horizon_years: cli.years,
        income_growth: percent("income-growth", cli.income_growth, -100.0)?,
        income_volatility: volatility("income-volatility", cli.income_volatility)?,
        insurance_increase: percent("insurance-increase", cli.insurance_increase, -100.0)?,
        insurance_increase_min: percent(
            "insurance-increase-min",
            cli.insurance_increase_min,
            -100.0,
        )?,
        insurance_increase_max: percent(
            "insurance-increase-max",
            cli.insurance_increase_max,
            -100.0,
        )?,
        home_appreciation: cli
            .home_appreciation
            .map(|v| percent("home-appreciation", v, -100.0))
            .transpose()?,
        appreciation_volatility: volatility(
            "appreciation-volatility",
            cli.appreciation_volatility,
        )?,
        interest_rate: cli.interest_rate.map(|v| v / 100.0),
        interest_rate_volatility: volatility(
            "interest-rate-volatility",
            cli.interest_rate_volatility,
        )?,
        affordability_threshold: threshold(
            "affordability-threshold",
            cli.affordability_threshold,
        )?,
        rent_affordability_threshold: threshold(
            "rent-affordability-threshold",
            cli.rent_affordability_threshold,
        )?,
        rent_increase_min: percent("rent-increase-min", cli.rent_increase_min, -100.0)?,
        rent_increase_mode: percent("rent-increase-mode", cli.rent_increase_mode, -100.0)?,
        rent_increase_max: percent("rent-increase-max", cli.rent_increase_max, -100.0)?,
        rent_grace_months: cli.rent_grace_months,
        seed: cli.seed,
        seed_policy: cli.seed_policy.into(),
    })
}

fn build_config(cli: &Cli) -> Result<SimulationConfig, String> {
    build_params(cli)?.validate().map_err(|e| e.to_string())
}

fn parse_selection(cli: &Cli) -> Result<ScenarioSelection, String> {
    cli.scenario
        .parse::<ScenarioSelection>()
        .map_err(|e| format!("--scenario: {e}"))
}

fn cohort_records(cli: &Cli) -> Result<Vec<HouseholdRecord>, String> {
    if cli.households == 0 || cli.households > MAX_HOUSEHOLDS {
        return Err(format!("--households must be between 1 and {MAX_HOUSEHOLDS}"));
    }
    if !cli.amplification.is_finite() || !(0.0..=100.0).contains(&cli.amplification) {
        return Err("--amplification must be between 0 and 100".to_string());
    }

    let base = generate_households(cli.households, cli.household_seed).map_err(|e| e.to_string())?;
    let cohort = amplify_edge_cases(&base, cli.amplification / 100.0, cli.household_seed)
        .map_err(|e| e.to_string())?;
    let records: Vec<HouseholdRecord> = cohort.iter().map(|h| h.to_record()).collect();
    subsample(cli, records)
}

fn subsample(cli: &Cli, records: Vec<HouseholdRecord>) -> Result<Vec<HouseholdRecord>, String> {
    match cli.sample {
        Some(0) => Err("--sample must be > 0".to_string()),
        Some(n) => Ok(sample_households(&records, n, cli.household_seed)),
        None => Ok(records),
    }
}

fn run_cohort(
    records: &[HouseholdRecord],
    selection: ScenarioSelection,
    config: &SimulationConfig,
    cancel: &AtomicBool,
) -> BatchResponse {
    let report = run_batch_with_progress(records, selection, config, cancel, |index| {
        debug!(household_index = index, "household simulated");
    });
    let summary = summarize(&report.entries);
    BatchResponse {
        households: records.len(),
        report,
        summary,
    }
}

pub fn run_cli(cli: Cli, cancel: &AtomicBool) -> Result<String, String> {
    let config = build_config(&cli)?;
    let selection = parse_selection(&cli)?;
    let records = cohort_records(&cli)?;
    let response = run_cohort(&records, selection, &config, cancel);

    let rendered = if cli.summary_only {
        serde_json::to_string_pretty(&SummaryOnlyResponse {
            households: response.households,
            failures: response.report.failures.len(),
            cancelled: response.report.cancelled,
            summary: response.summary,
        })
    } else {
        serde_json::to_string_pretty(&response)
    };
    rendered.map_err(|e| format!("failed to render report: {e}"))
}

pub async fn run_http_server(port: u16) -> std::io::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let app = Router::new()
        .route(
            "/api/simulate",
            get(simulate_get_handler).post(simulate_post_handler),
        )
        .route("/api/timeline", post(timeline_handler))
        .route("/api/batch", post(batch_handler))
        .route("/api/scenarios", get(scenarios_handler))
        .fallback(not_found_handler);

    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "housecast HTTP API listening");
    info!("local access: http://127.0.0.1:{port}/api/scenarios");

    axum::serve(listener, app).await
}

async fn not_found_handler() -> Response {
    error_response(StatusCode::NOT_FOUND, "Not found")
}

async fn simulate_get_handler(Query(payload): Query<SimulatePayload>) -> Response {
    blocking_response(move || simulate_from_payload(payload)).await
}

async fn simulate_post_handler(Json(payload): Json<SimulatePayload>) -> Response {
    blocking_response(move || simulate_from_payload(payload)).await
}

async fn timeline_handler(Json(payload): Json<SimulatePayload>) -> Response {
    blocking_response(move || timeline_from_payload(payload)).await
}

async fn batch_handler(Json(payload): Json<BatchPayload>) -> Response {
    let cancel = Arc::new(AtomicBool::new(false));
    // Dropped with the request future when the client goes away.
    let _guard = CancelOnDrop(Arc::clone(&cancel));
    blocking_response(move || batch_from_payload(payload, &cancel)).await
}

// Sets the flag when dropped, so a batch outlives its request by at most the
// households already in flight.
struct CancelOnDrop(Arc<AtomicBool>);

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        self.0.store(true, Ordering::Relaxed);
    }
}

// Simulations are CPU bound and the batch fans out on rayon, so none of them
// may run on an async worker thread.
async fn blocking_response<T, F>(job: F) -> Response
where
    T: Serialize + Send + 'static,
    F: FnOnce() -> Result<T, String> + Send + 'static,
{
    match tokio::task::spawn_blocking(job).await {
        Ok(Ok(body)) => json_response(StatusCode::OK, body),
        Ok(Err(msg)) => error_response(StatusCode::BAD_REQUEST, &msg),
        Err(e) => {
            warn!(error = %e, "simulation task failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Simulation failed")
        }
    }
}

async fn scenarios_handler(Query(query): Query<ScenariosQuery>) -> Response {
    match scenario_table(query.region.as_deref()) {
        Ok(table) => json_response(StatusCode::OK, table),
        Err(msg) => error_response(StatusCode::BAD_REQUEST, &msg),
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

fn simulate_from_payload(payload: SimulatePayload) -> Result<SimulationOutcome, String> {
    let (record, params) = payload.split();
    let mut cli = default_cli_for_api();
    params.apply(&mut cli);
    let config = build_config(&cli)?;
    simulate_record(&record, &cli.scenario, &config, 0).map_err(|e| e.to_string())
}

fn timeline_from_payload(payload: SimulatePayload) -> Result<TimelineResult, String> {
    let (record, params) = payload.split();
    let mut cli = default_cli_for_api();
    params.apply(&mut cli);
    let config = build_config(&cli)?;
    let scenario = match parse_selection(&cli)? {
        ScenarioSelection::One(scenario) => scenario,
        ScenarioSelection::All => {
            return Err("--scenario must name a single scenario for a timeline".to_string());
        }
    };
    let household = Household::from_record(&record).map_err(|e| e.to_string())?;
    simulate_timeline(&household, scenario, &config, 0).map_err(|e| e.to_string())
}

fn batch_from_payload(
    payload: BatchPayload,
    cancel: &AtomicBool,
) -> Result<BatchResponse, String> {
    let mut cli = default_cli_for_api();
    if let Some(v) = payload.households {
        cli.households = v;
    }
    if let Some(v) = payload.household_seed {
        cli.household_seed = v;
    }
    if let Some(v) = payload.amplification {
        cli.amplification = v;
    }
    if payload.sample.is_some() {
        cli.sample = payload.sample;
    }
    payload.params.apply(&mut cli);

    let config = build_config(&cli)?;
    let selection = parse_selection(&cli)?;
    let records = match payload.records {
        Some(records) if records.is_empty() => {
            return Err("records must not be empty".to_string());
        }
        Some(records) => subsample(&cli, records)?,
        None => cohort_records(&cli)?,
    };
    Ok(run_cohort(&records, selection, &config, cancel))
}

fn scenario_table(region: Option<&str>) -> Result<Vec<ResolvedScenario>, String> {
    let regions = match region {
        Some(name) => vec![name.parse::<Region>().map_err(|e| e.to_string())?],
        None => Region::ALL.to_vec(),
    };
    Ok(regions
        .into_iter()
        .flat_map(|region| Scenario::ALL.map(|scenario| resolve(scenario, region)))
        .collect())
}

fn default_cli_for_api() -> Cli {
    Cli {
        households: 100,
        household_seed: 42,
        amplification: 30.0,
        sample: None,
        scenario: "all".to_string(),
        simulations: 1_000,
        years: 10,
        seed: 42,
        seed_policy: CliSeedPolicy::Shared,
        income_growth: 4.0,
        income_volatility: 8.0,
        insurance_increase: 8.0,
        insurance_increase_min: 3.0,
        insurance_increase_max: 12.0,
        home_appreciation: None,
        appreciation_volatility: 6.0,
        interest_rate: None,
        interest_rate_volatility: 1.2,
        affordability_threshold: 50.0,
        rent_affordability_threshold: 35.0,
        rent_increase_min: 3.0,
        rent_increase_mode: 5.5,
        rent_increase_max: 10.0,
        rent_grace_months: 0,
        summary_only: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-9;

    fn assert_approx(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() <= EPS,
            "expected {expected}, got {actual}"
        );
    }

    fn sample_cli() -> Cli {
        default_cli_for_api()
    }

    fn simulate_payload_from_json(json: &str) -> SimulatePayload {
        serde_json::from_str(json).expect("valid payload JSON")
    }

    #[test]
    fn api_defaults_match_clap_defaults() {
        let parsed = Cli::parse_from(["housecast"]);
        assert_eq!(
            build_params(&parsed).expect("valid params"),
            build_params(&sample_cli()).expect("valid params")
        );
        assert_eq!(parsed.households, sample_cli().households);
        assert_eq!(parsed.amplification, sample_cli().amplification);
        assert_eq!(parsed.scenario, sample_cli().scenario);
    }

    #[test]
    fn build_params_converts_percent_to_fractions() {
        let mut cli = sample_cli();
        cli.home_appreciation = Some(3.0);
        cli.interest_rate = Some(7.25);
        let params = build_params(&cli).expect("valid params");

        assert_approx(params.income_growth, 0.04);
        assert_approx(params.insurance_increase, 0.08);
        assert_approx(params.affordability_threshold, 0.5);
        assert_approx(params.rent_affordability_threshold, 0.35);
        assert_approx(params.rent_increase_mode, 0.055);
        assert_approx(params.home_appreciation.expect("override"), 0.03);
        assert_approx(params.interest_rate.expect("override"), 0.0725);
        assert_eq!(params.num_simulations, 1_000);
        assert_eq!(params.seed_policy, SeedPolicy::Shared);
    }

    #[test]
    fn build_params_rejects_zero_simulations() {
        let mut cli = sample_cli();
        cli.simulations = 0;
        let err = build_params(&cli).expect_err("must reject");
        assert!(err.contains("--simulations"));
    }

    #[test]
    fn build_params_rejects_threshold_above_hundred() {
        let mut cli = sample_cli();
        cli.affordability_threshold = 120.0;
        let err = build_params(&cli).expect_err("must reject");
        assert!(err.contains("--affordability-threshold"));
    }

    #[test]
    fn build_params_rejects_inverted_insurance_bounds() {
        let mut cli = sample_cli();
        cli.insurance_increase_min = 15.0;
        let err = build_params(&cli).expect_err("must reject");
        assert!(err.contains("--insurance-increase-min"));
    }

    #[test]
    fn out_of_range_insurance_mode_is_clamped_not_rejected() {
        let mut cli = sample_cli();
        cli.insurance_increase = 25.0;
        let config = build_config(&cli).expect("mode is clamped");
        assert_approx(config.insurance_mode(), 0.12);
    }

    #[test]
    fn simulate_payload_runs_single_scenario() {
        let payload = simulate_payload_from_json(
            r#"{
                "householdId": "HH000042",
                "annualIncome": 76515,
                "savings": 38258,
                "creditScore": 696,
                "monthlyDebt": 250,
                "region": "Tampa Bay",
                "scenario": "starter",
                "simulations": 200,
                "years": 5,
                "incomeGrowth": 3.0
            }"#,
        );
        let outcome = simulate_from_payload(payload).expect("simulation runs");
        let SimulationOutcome::Single(result) = outcome else {
            panic!("expected single outcome");
        };
        assert_eq!(result.household_id, "HH000042");
        assert_eq!(result.scenario, Scenario::StarterHome);
        assert_eq!(result.simulations, 200);
        assert_eq!(result.time_horizon_years, 5);
        assert_approx(result.probability_affordable + result.default_risk, 1.0);
    }

    #[test]
    fn simulate_payload_reports_missing_household_field() {
        let payload = simulate_payload_from_json(
            r#"{"savings": 10000, "creditScore": 700, "monthlyDebt": 0, "region": "Orlando"}"#,
        );
        let err = simulate_from_payload(payload).expect_err("must reject");
        assert!(err.contains("annual_income"));
    }

    #[test]
    fn simulate_payload_reports_unknown_scenario() {
        let payload = simulate_payload_from_json(
            r#"{"annualIncome": 50000, "savings": 10000, "creditScore": 700,
                "monthlyDebt": 0, "region": "Orlando", "scenario": "yacht"}"#,
        );
        let err = simulate_from_payload(payload).expect_err("must reject");
        assert!(err.contains("invalid scenario"));
    }

    #[test]
    fn timeline_requires_a_single_scenario() {
        let payload = simulate_payload_from_json(
            r#"{"annualIncome": 50000, "savings": 10000, "creditScore": 700,
                "monthlyDebt": 0, "region": "Orlando", "simulations": 20}"#,
        );
        let err = timeline_from_payload(payload).expect_err("must reject");
        assert!(err.contains("single scenario"));

        let payload = simulate_payload_from_json(
            r#"{"annualIncome": 50000, "savings": 10000, "creditScore": 700,
                "monthlyDebt": 0, "region": "Orlando", "simulations": 20,
                "years": 3, "scenario": "rent"}"#,
        );
        let timeline = timeline_from_payload(payload).expect("timeline runs");
        assert_eq!(timeline.years, vec![0, 1, 2, 3]);
    }

    #[test]
    fn batch_payload_generates_and_summarizes_a_cohort() {
        let payload: BatchPayload = serde_json::from_str(
            r#"{"households": 12, "simulations": 50, "years": 3, "scenario": "rent",
                "seedPolicy": "independent"}"#,
        )
        .expect("valid payload JSON");
        let response = batch_from_payload(payload, &AtomicBool::new(false)).expect("batch runs");
        // 30% amplification adds three edge-case households.
        assert_eq!(response.households, 15);
        assert_eq!(response.report.entries.len(), 15);
        assert_eq!(response.summary.total_results, 15);
        let synthetic = response
            .report
            .entries
            .iter()
            .filter(|e| e.household_id.starts_with("SYN"))
            .count();
        assert_eq!(synthetic, 3);
        assert!(response.report.failures.is_empty());
    }

    #[test]
    fn batch_payload_samples_explicit_records() {
        let payload: BatchPayload = serde_json::from_str(
            r#"{"sample": 2, "simulations": 20, "years": 2, "scenario": "standard",
                "records": [
                  {"householdId": "A", "annualIncome": 80000, "savings": 50000,
                   "creditScore": 720, "monthlyDebt": 100, "region": "Orlando"},
                  {"householdId": "B", "annualIncome": 60000, "savings": 20000,
                   "creditScore": 680, "monthlyDebt": 300, "region": "Jacksonville"},
                  {"householdId": "C", "annualIncome": 120000, "savings": 90000,
                   "creditScore": 790, "monthlyDebt": 0, "region": "Miami"}
                ]}"#,
        )
        .expect("valid payload JSON");
        let response = batch_from_payload(payload, &AtomicBool::new(false)).expect("batch runs");
        assert_eq!(response.households, 2);
        assert_eq!(response.report.entries.len(), 2);
        assert!(
            response
                .report
                .entries
                .iter()
                .all(|e| e.result.scenario == Scenario::StandardHome)
        );
    }

    #[test]
    fn batch_payload_rejects_empty_records() {
        let payload: BatchPayload =
            serde_json::from_str(r#"{"records": []}"#).expect("valid payload JSON");
        assert!(batch_from_payload(payload, &AtomicBool::new(false)).is_err());
    }

    #[test]
    fn scenario_table_lists_every_scenario_for_a_region() {
        let table = scenario_table(Some("Miami")).expect("known region");
        assert_eq!(table.len(), 4);
        assert!(table.iter().all(|s| s.region == Region::MiamiDade));
        assert_eq!(scenario_table(None).expect("all regions").len(), 24);
        assert!(scenario_table(Some("Atlantis")).is_err());
    }

    #[test]
    fn run_cli_renders_summary_json() {
        let mut cli = sample_cli();
        cli.households = 5;
        cli.simulations = 30;
        cli.years = 2;
        cli.summary_only = true;
        let rendered = run_cli(cli, &AtomicBool::new(false)).expect("cli runs");
        let value: serde_json::Value = serde_json::from_str(&rendered).expect("valid JSON");
        // One synthetic household on top of five.
        assert_eq!(value["households"], 6);
        assert_eq!(value["summary"]["totalResults"], 24);
        assert_eq!(value["cancelled"], false);
    }

    #[test]
    fn run_cli_reports_a_cancelled_run() {
        let mut cli = sample_cli();
        cli.households = 5;
        cli.amplification = 0.0;
        cli.simulations = 30;
        cli.summary_only = true;
        let rendered = run_cli(cli, &AtomicBool::new(true)).expect("cli runs");
        let value: serde_json::Value = serde_json::from_str(&rendered).expect("valid JSON");
        assert_eq!(value["cancelled"], true);
        assert_eq!(value["summary"]["totalResults"], 0);
    }

    #[test]
    fn dropped_request_guard_cancels_its_batch() {
        let cancel = Arc::new(AtomicBool::new(false));
        let guard = CancelOnDrop(Arc::clone(&cancel));
        assert!(!cancel.load(Ordering::Relaxed));
        drop(guard);
        assert!(cancel.load(Ordering::Relaxed));
    }

    #[tokio::test]
    async fn blocking_response_maps_job_results_to_status() {
        let ok = blocking_response(|| Ok::<_, String>(vec![1, 2, 3])).await;
        assert_eq!(ok.status(), StatusCode::OK);
        let bad = blocking_response(|| Err::<Vec<u8>, _>("--years must be > 0".to_string())).await;
        assert_eq!(bad.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn run_cli_rejects_bad_scenario_flag() {
        let mut cli = sample_cli();
        cli.scenario = "castle".to_string();
        let err = run_cli(cli, &AtomicBool::new(false)).expect_err("must reject");
        assert!(err.contains("--scenario"));
    }
}
