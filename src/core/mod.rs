mod analysis;
mod batch;
mod buying;
mod engine;
mod error;
mod households;
mod renting;
mod sampling;
mod scenarios;
mod types;

pub use analysis::{
    CohortSummary, GroupStats, HIGH_RISK_THRESHOLD, IncomeBracket, LOW_RISK_THRESHOLD,
    ScenarioStats, summarize,
};
pub use batch::{BatchEntry, BatchFailure, BatchReport, run_batch, run_batch_with_progress};
pub use buying::{amortized_payment, simulate_buying};
pub use engine::{reduce, run_paths, simulate, simulate_record, simulate_scenario, simulate_timeline};
pub use error::{Result, SimError};
pub use households::{
    amplify_edge_cases, financial_risk_score, generate_households, sample_households,
};
pub use renting::simulate_renting;
pub use sampling::{SEED_STRIDE, household_seed, percentile};
pub use scenarios::{
    CLOSING_COSTS_PCT, MORTGAGE_TERM_MONTHS, RegionAdjustment, ResolvedScenario,
    SELLING_COST_PCT, ScenarioDefinition, definition, market_rent, region_adjustment, resolve,
    resolve_named,
};
pub use types::{
    DistributionSummary, Household, HouseholdRecord, HousingSituation, MAX_HORIZON_YEARS,
    MAX_SIMULATIONS, MonthsSummary, PathOutcomes, Region, Scenario, ScenarioResult,
    ScenarioSelection, SeedPolicy, SimulationConfig, SimulationOutcome, SimulationParams,
    TimelineBand, TimelineResult,
};
