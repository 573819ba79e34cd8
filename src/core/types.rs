use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::error::{Result, SimError};

#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Region {
    MiamiDade,
    TampaBay,
    Orlando,
    Jacksonville,
    SouthwestFlorida,
    Panhandle,
}

impl Region {
    pub const ALL: [Region; 6] = [
        Region::MiamiDade,
        Region::TampaBay,
        Region::Orlando,
        Region::Jacksonville,
        Region::SouthwestFlorida,
        Region::Panhandle,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Region::MiamiDade => "Miami-Dade",
            Region::TampaBay => "Tampa Bay",
            Region::Orlando => "Orlando",
            Region::Jacksonville => "Jacksonville",
            Region::SouthwestFlorida => "Southwest FL",
            Region::Panhandle => "Panhandle",
        }
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Region {
    type Err = SimError;

    fn from_str(s: &str) -> Result<Self> {
        match normalize_name(s).as_str() {
            "miamidade" | "miami" => Ok(Region::MiamiDade),
            "tampabay" | "tampa" => Ok(Region::TampaBay),
            "orlando" => Ok(Region::Orlando),
            "jacksonville" | "jax" => Ok(Region::Jacksonville),
            "southwestfl" | "southwestflorida" | "swfl" => Ok(Region::SouthwestFlorida),
            "panhandle" => Ok(Region::Panhandle),
            _ => Err(SimError::Configuration(format!("unknown region `{s}`"))),
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Scenario {
    Rent,
    StarterHome,
    StandardHome,
    PremiumHome,
}

impl Scenario {
    pub const ALL: [Scenario; 4] = [
        Scenario::Rent,
        Scenario::StarterHome,
        Scenario::StandardHome,
        Scenario::PremiumHome,
    ];

    pub const BUY: [Scenario; 3] = [
        Scenario::StarterHome,
        Scenario::StandardHome,
        Scenario::PremiumHome,
    ];

    pub fn index(self) -> u64 {
        match self {
            Scenario::Rent => 0,
            Scenario::StarterHome => 1,
            Scenario::StandardHome => 2,
            Scenario::PremiumHome => 3,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Scenario::Rent => "Keep Renting",
            Scenario::StarterHome => "Buy Starter Home",
            Scenario::StandardHome => "Buy Standard Home",
            Scenario::PremiumHome => "Buy Premium Home",
        }
    }

    pub fn is_purchase(self) -> bool {
        !matches!(self, Scenario::Rent)
    }
}

impl fmt::Display for Scenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Scenario {
    type Err = SimError;

    fn from_str(s: &str) -> Result<Self> {
        match normalize_name(s).as_str() {
            "rent" | "renting" | "keeprenting" => Ok(Scenario::Rent),
            "starter" | "starterhome" | "buystarterhome" => Ok(Scenario::StarterHome),
            "standard" | "standardhome" | "buystandardhome" => Ok(Scenario::StandardHome),
            "premium" | "premiumhome" | "buypremiumhome" => Ok(Scenario::PremiumHome),
            _ => Err(SimError::InvalidScenario(format!("unknown scenario `{s}`"))),
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ScenarioSelection {
    One(Scenario),
    All,
}

impl ScenarioSelection {
    pub fn scenarios(self) -> Vec<Scenario> {
        match self {
            ScenarioSelection::One(scenario) => vec![scenario],
            ScenarioSelection::All => Scenario::ALL.to_vec(),
        }
    }
}

impl FromStr for ScenarioSelection {
    type Err = SimError;

    fn from_str(s: &str) -> Result<Self> {
        match normalize_name(s).as_str() {
            "all" | "allscenarios" => Ok(ScenarioSelection::All),
            _ => s.parse::<Scenario>().map(ScenarioSelection::One),
        }
    }
}

fn normalize_name(s: &str) -> String {
    s.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HousingSituation {
    CurrentlyRenting,
    FirstTimeBuyer,
    MoveUpBuyer,
    Investor,
}

impl HousingSituation {
    pub fn name(self) -> &'static str {
        match self {
            HousingSituation::CurrentlyRenting => "Currently Renting",
            HousingSituation::FirstTimeBuyer => "First-Time Buyer",
            HousingSituation::MoveUpBuyer => "Move-Up Buyer",
            HousingSituation::Investor => "Investor",
        }
    }
}

// Numeric fields are optional so a malformed record can be reported rather
// than rejected at deserialization time.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct HouseholdRecord {
    pub household_id: String,
    pub annual_income: Option<f64>,
    pub savings: Option<f64>,
    pub credit_score: Option<f64>,
    pub monthly_debt: Option<f64>,
    pub region: Option<String>,
    pub employment_sector: String,
    pub current_monthly_rent: Option<f64>,
    pub age: Option<u32>,
    pub household_size: Option<u32>,
    pub housing_situation: Option<HousingSituation>,
}

pub const MIN_CREDIT_SCORE: f64 = 300.0;
pub const MAX_CREDIT_SCORE: f64 = 850.0;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Household {
    pub household_id: String,
    pub annual_income: f64,
    pub savings: f64,
    pub credit_score: f64,
    pub monthly_debt: f64,
    pub region: Region,
    pub employment_sector: String,
    pub current_monthly_rent: Option<f64>,
    pub age: Option<u32>,
    pub household_size: Option<u32>,
    pub housing_situation: Option<HousingSituation>,
}

impl Household {
    pub fn from_record(record: &HouseholdRecord) -> Result<Self> {
        let annual_income = record
            .annual_income
            .ok_or(SimError::EmptyHousehold {
                field: "annual_income",
            })?;
        let savings = record
            .savings
            .ok_or(SimError::EmptyHousehold { field: "savings" })?;
        let credit_score = record
            .credit_score
            .ok_or(SimError::EmptyHousehold {
                field: "credit_score",
            })?;
        let monthly_debt = record
            .monthly_debt
            .ok_or(SimError::EmptyHousehold {
                field: "monthly_debt",
            })?;
        let region_name = record
            .region
            .as_deref()
            .filter(|name| !name.trim().is_empty())
            .ok_or(SimError::EmptyHousehold { field: "region" })?;

        if !annual_income.is_finite() || annual_income <= 0.0 {
            return Err(SimError::household("annual_income", "must be > 0"));
        }
        if !savings.is_finite() || savings < 0.0 {
            return Err(SimError::household("savings", "must be >= 0"));
        }
        if !(MIN_CREDIT_SCORE..=MAX_CREDIT_SCORE).contains(&credit_score) {
            return Err(SimError::household(
                "credit_score",
                format!("must be between {MIN_CREDIT_SCORE} and {MAX_CREDIT_SCORE}"),
            ));
        }
        if !monthly_debt.is_finite() || monthly_debt < 0.0 {
            return Err(SimError::household("monthly_debt", "must be >= 0"));
        }
        if let Some(rent) = record.current_monthly_rent {
            if !rent.is_finite() || rent <= 0.0 {
                return Err(SimError::household("current_monthly_rent", "must be > 0"));
            }
        }
        if record.household_size == Some(0) {
            return Err(SimError::household("household_size", "must be >= 1"));
        }

        Ok(Self {
            household_id: record.household_id.clone(),
            annual_income,
            savings,
            credit_score,
            monthly_debt,
            region: region_name.parse()?,
            employment_sector: record.employment_sector.clone(),
            current_monthly_rent: record.current_monthly_rent,
            age: record.age,
            household_size: record.household_size,
            housing_situation: record.housing_situation,
        })
    }

    pub fn to_record(&self) -> HouseholdRecord {
        HouseholdRecord {
            household_id: self.household_id.clone(),
            annual_income: Some(self.annual_income),
            savings: Some(self.savings),
            credit_score: Some(self.credit_score),
            monthly_debt: Some(self.monthly_debt),
            region: Some(self.region.name().to_string()),
            employment_sector: self.employment_sector.clone(),
            current_monthly_rent: self.current_monthly_rent,
            age: self.age,
            household_size: self.household_size,
            housing_situation: self.housing_situation,
        }
    }
}

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SeedPolicy {
    // Every scenario of a household is driven by the same seed, so path `i`
    // sees the same income trajectory whichever housing choice is simulated.
    #[default]
    Shared,
    Independent,
}

pub const MAX_HORIZON_YEARS: u32 = 60;
pub const MAX_SIMULATIONS: u32 = 1_000_000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SimulationParams {
    pub num_simulations: u32,
    pub time_horizon_years: u32,
    pub income_growth: f64,
    pub income_volatility: f64,
    pub insurance_increase: f64,
    pub insurance_increase_min: f64,
    pub insurance_increase_max: f64,
    pub home_appreciation: Option<f64>,
    pub appreciation_volatility: f64,
    pub interest_rate: Option<f64>,
    pub interest_rate_volatility: f64,
    pub affordability_threshold: f64,
    pub rent_affordability_threshold: f64,
    pub rent_increase_min: f64,
    pub rent_increase_mode: f64,
    pub rent_increase_max: f64,
    pub rent_grace_months: u32,
    pub seed: u64,
    pub seed_policy: SeedPolicy,
}

impl Default for SimulationParams {
    fn default() -> Self {
        Self {
            num_simulations: 10_000,
            time_horizon_years: 10,
            income_growth: 0.04,
            income_volatility: 0.08,
            insurance_increase: 0.08,
            insurance_increase_min: 0.03,
            insurance_increase_max: 0.12,
            home_appreciation: None,
            appreciation_volatility: 0.06,
            interest_rate: None,
            interest_rate_volatility: 0.012,
            affordability_threshold: 0.50,
            rent_affordability_threshold: 0.35,
            rent_increase_min: 0.03,
            rent_increase_mode: 0.055,
            rent_increase_max: 0.10,
            rent_grace_months: 0,
            seed: 42,
            seed_policy: SeedPolicy::Shared,
        }
    }
}

impl SimulationParams {
    // Checks every parameter against its domain and clamps triangular modes
    // into their bounds. This is the only place a `SimulationConfig` is made.
    pub fn validate(&self) -> Result<SimulationConfig> {
        if self.num_simulations == 0 || self.num_simulations > MAX_SIMULATIONS {
            return Err(SimError::parameter(
                "num_simulations",
                format!("must be between 1 and {MAX_SIMULATIONS}"),
            ));
        }
        if self.time_horizon_years == 0 || self.time_horizon_years > MAX_HORIZON_YEARS {
            return Err(SimError::parameter(
                "time_horizon_years",
                format!("must be between 1 and {MAX_HORIZON_YEARS}"),
            ));
        }

        check_growth("income_growth", self.income_growth)?;
        check_volatility("income_volatility", self.income_volatility)?;
        check_volatility("appreciation_volatility", self.appreciation_volatility)?;
        check_volatility("interest_rate_volatility", self.interest_rate_volatility)?;
        check_growth("insurance_increase", self.insurance_increase)?;
        check_growth("rent_increase_mode", self.rent_increase_mode)?;
        check_bounds(
            "insurance_increase_min",
            self.insurance_increase_min,
            self.insurance_increase_max,
        )?;
        check_bounds("rent_increase_min", self.rent_increase_min, self.rent_increase_max)?;
        check_threshold("affordability_threshold", self.affordability_threshold)?;
        check_threshold(
            "rent_affordability_threshold",
            self.rent_affordability_threshold,
        )?;

        if let Some(appreciation) = self.home_appreciation {
            check_growth("home_appreciation", appreciation)?;
        }
        if let Some(rate) = self.interest_rate {
            if !rate.is_finite() || !(0.0..1.0).contains(&rate) {
                return Err(SimError::parameter("interest_rate", "must be in [0, 1)"));
            }
        }

        let mut params = self.clone();
        params.insurance_increase = self
            .insurance_increase
            .clamp(self.insurance_increase_min, self.insurance_increase_max);
        params.rent_increase_mode = self
            .rent_increase_mode
            .clamp(self.rent_increase_min, self.rent_increase_max);

        Ok(SimulationConfig { params })
    }
}

fn check_growth(name: &'static str, value: f64) -> Result<()> {
    if !value.is_finite() || value <= -1.0 {
        return Err(SimError::parameter(name, "must be finite and > -1"));
    }
    Ok(())
}

fn check_volatility(name: &'static str, value: f64) -> Result<()> {
    if !value.is_finite() || value < 0.0 {
        return Err(SimError::parameter(name, "must be finite and >= 0"));
    }
    Ok(())
}

fn check_bounds(name: &'static str, min: f64, max: f64) -> Result<()> {
    check_growth(name, min)?;
    check_growth(name, max)?;
    if min > max {
        return Err(SimError::parameter(name, "lower bound exceeds upper bound"));
    }
    Ok(())
}

fn check_threshold(name: &'static str, value: f64) -> Result<()> {
    if !value.is_finite() || value <= 0.0 || value > 1.0 {
        return Err(SimError::parameter(name, "must be in (0, 1]"));
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq)]
pub struct SimulationConfig {
    params: SimulationParams,
}

impl SimulationConfig {
    pub fn params(&self) -> &SimulationParams {
        &self.params
    }

    pub fn num_simulations(&self) -> usize {
        self.params.num_simulations as usize
    }

    pub fn horizon_months(&self) -> u32 {
        self.params.time_horizon_years * 12
    }

    pub fn insurance_mode(&self) -> f64 {
        self.params.insurance_increase
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PathOutcomes {
    pub total_cost_paid: Vec<f64>,
    pub solvent: Vec<bool>,
    pub default_month: Vec<Option<u32>>,
    pub months_solvent: Vec<u32>,
    pub final_equity: Vec<f64>,
    pub final_monthly_cost: Vec<f64>,
}

impl PathOutcomes {
    pub fn with_capacity(n: usize) -> Self {
        Self {
            total_cost_paid: Vec::with_capacity(n),
            solvent: Vec::with_capacity(n),
            default_month: Vec::with_capacity(n),
            months_solvent: Vec::with_capacity(n),
            final_equity: Vec::with_capacity(n),
            final_monthly_cost: Vec::with_capacity(n),
        }
    }

    pub fn len(&self) -> usize {
        self.solvent.len()
    }

    pub fn is_empty(&self) -> bool {
        self.solvent.is_empty()
    }

    pub(crate) fn push(&mut self, path: PathSummary) {
        self.total_cost_paid.push(path.total_cost_paid);
        self.solvent.push(path.default_month.is_none());
        self.default_month.push(path.default_month);
        self.months_solvent.push(path.months_solvent);
        self.final_equity.push(path.final_equity);
        self.final_monthly_cost.push(path.final_monthly_cost);
    }
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct PathSummary {
    pub total_cost_paid: f64,
    pub default_month: Option<u32>,
    pub months_solvent: u32,
    pub final_equity: f64,
    pub final_monthly_cost: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct YearTracePoint {
    pub equity: f64,
    pub monthly_cost: f64,
    pub cumulative_cost: f64,
}

impl YearTracePoint {
    pub fn frozen(self) -> Self {
        Self {
            monthly_cost: 0.0,
            ..self
        }
    }
}

pub(crate) fn push_frozen_tail(trace: &mut Vec<YearTracePoint>, point: YearTracePoint, len: usize) {
    let frozen = point.frozen();
    while trace.len() < len {
        trace.push(frozen);
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DistributionSummary {
    pub mean: f64,
    pub median: f64,
    pub p5: f64,
    pub p25: f64,
    pub p75: f64,
    pub p95: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthsSummary {
    pub mean: f64,
    pub median: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScenarioResult {
    pub household_id: String,
    pub scenario: Scenario,
    pub simulations: u32,
    pub time_horizon_years: u32,
    pub probability_affordable: f64,
    pub default_risk: f64,
    pub probability_negative_equity: f64,
    pub total_cost: DistributionSummary,
    pub equity_built: DistributionSummary,
    pub final_monthly_cost: DistributionSummary,
    pub months_solvent: MonthsSummary,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SimulationOutcome {
    Single(ScenarioResult),
    All(BTreeMap<Scenario, ScenarioResult>),
}

impl SimulationOutcome {
    pub fn results(&self) -> Vec<&ScenarioResult> {
        match self {
            SimulationOutcome::Single(result) => vec![result],
            SimulationOutcome::All(results) => results.values().collect(),
        }
    }

    pub fn into_results(self) -> Vec<ScenarioResult> {
        match self {
            SimulationOutcome::Single(result) => vec![result],
            SimulationOutcome::All(results) => results.into_values().collect(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimelineBand {
    pub pessimistic: Vec<f64>,
    pub expected: Vec<f64>,
    pub optimistic: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimelineResult {
    pub household_id: String,
    pub scenario: Scenario,
    pub years: Vec<u32>,
    pub equity: TimelineBand,
    pub monthly_costs: TimelineBand,
    pub cumulative_costs: TimelineBand,
}
