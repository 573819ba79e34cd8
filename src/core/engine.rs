use std::collections::BTreeMap;

use tracing::debug;

use super::buying::{BuyModel, simulate_buying};
use super::error::Result;
use super::renting::{RentModel, simulate_renting};
use super::sampling::{PathStreams, household_seed, percentile, summarize, summarize_months};
use super::scenarios::resolve;
use super::types::{
    DistributionSummary, Household, HouseholdRecord, PathOutcomes, PathSummary, Scenario,
    ScenarioResult, ScenarioSelection, SimulationConfig, SimulationOutcome, TimelineBand,
    TimelineResult, YearTracePoint,
};

pub fn simulate(
    household: &Household,
    selection: ScenarioSelection,
    config: &SimulationConfig,
    household_index: u64,
) -> Result<SimulationOutcome> {
    match selection {
        ScenarioSelection::One(scenario) => Ok(SimulationOutcome::Single(simulate_scenario(
            household,
            scenario,
            config,
            household_index,
        )?)),
        ScenarioSelection::All => {
            let mut results = BTreeMap::new();
            for scenario in Scenario::ALL {
                let result = simulate_scenario(household, scenario, config, household_index)?;
                results.insert(scenario, result);
            }
            Ok(SimulationOutcome::All(results))
        }
    }
}

pub fn simulate_record(
    record: &HouseholdRecord,
    scenario: &str,
    config: &SimulationConfig,
    household_index: u64,
) -> Result<SimulationOutcome> {
    let selection = scenario.parse::<ScenarioSelection>()?;
    let household = Household::from_record(record)?;
    simulate(&household, selection, config, household_index)
}

pub fn simulate_scenario(
    household: &Household,
    scenario: Scenario,
    config: &SimulationConfig,
    household_index: u64,
) -> Result<ScenarioResult> {
    let outcomes = run_paths(household, scenario, config, household_index)?;
    let result = reduce(&household.household_id, scenario, config, &outcomes);
    debug!(
        household = %household.household_id,
        scenario = %scenario,
        probability_affordable = result.probability_affordable,
        "scenario simulated"
    );
    Ok(result)
}

pub fn run_paths(
    household: &Household,
    scenario: Scenario,
    config: &SimulationConfig,
    household_index: u64,
) -> Result<PathOutcomes> {
    let seed = stream_seed(config, household_index, scenario);
    match scenario {
        Scenario::Rent => simulate_renting(household, config, seed),
        Scenario::StarterHome | Scenario::StandardHome | Scenario::PremiumHome => {
            simulate_buying(household, &resolve(scenario, household.region), config, seed)
        }
    }
}

fn stream_seed(config: &SimulationConfig, household_index: u64, scenario: Scenario) -> u64 {
    let params = config.params();
    household_seed(params.seed, household_index, scenario, params.seed_policy)
}

pub fn reduce(
    household_id: &str,
    scenario: Scenario,
    config: &SimulationConfig,
    outcomes: &PathOutcomes,
) -> ScenarioResult {
    let n = outcomes.len();
    let denom = n.max(1) as f64;
    let solvent = outcomes.solvent.iter().filter(|&&s| s).count();
    let negative_equity = if scenario.is_purchase() {
        outcomes.final_equity.iter().filter(|&&e| e < 0.0).count()
    } else {
        0
    };

    let equity_built = if scenario.is_purchase() {
        summarize(&outcomes.final_equity)
    } else {
        DistributionSummary::default()
    };

    ScenarioResult {
        household_id: household_id.to_string(),
        scenario,
        simulations: n as u32,
        time_horizon_years: config.params().time_horizon_years,
        probability_affordable: solvent as f64 / denom,
        default_risk: (n - solvent) as f64 / denom,
        probability_negative_equity: negative_equity as f64 / denom,
        total_cost: summarize(&outcomes.total_cost_paid),
        equity_built,
        final_monthly_cost: summarize(&outcomes.final_monthly_cost),
        months_solvent: summarize_months(&outcomes.months_solvent),
    }
}

enum PathModel {
    Rent(RentModel),
    Buy(BuyModel),
}

impl PathModel {
    fn new(household: &Household, scenario: Scenario, config: &SimulationConfig) -> Result<Self> {
        Ok(match scenario {
            Scenario::Rent => PathModel::Rent(RentModel::new(household, config)?),
            Scenario::StarterHome | Scenario::StandardHome | Scenario::PremiumHome => {
                PathModel::Buy(BuyModel::new(
                    household,
                    &resolve(scenario, household.region),
                    config,
                )?)
            }
        })
    }

    fn run_path(
        &self,
        streams: &mut PathStreams,
        trace: Option<&mut Vec<YearTracePoint>>,
    ) -> PathSummary {
        match self {
            PathModel::Rent(model) => model.run_path(streams, trace),
            PathModel::Buy(model) => model.run_path(streams, trace),
        }
    }
}

struct YearlyAccumulator {
    equity: Vec<Vec<f64>>,
    monthly_cost: Vec<Vec<f64>>,
    cumulative_cost: Vec<Vec<f64>>,
}

impl YearlyAccumulator {
    fn new(year_count: usize, expected_samples: usize) -> Self {
        let make = || {
            (0..year_count)
                .map(|_| Vec::with_capacity(expected_samples))
                .collect::<Vec<_>>()
        };

        Self {
            equity: make(),
            monthly_cost: make(),
            cumulative_cost: make(),
        }
    }

    fn push(&mut self, index: usize, point: YearTracePoint) {
        self.equity[index].push(point.equity);
        self.monthly_cost[index].push(point.monthly_cost);
        self.cumulative_cost[index].push(point.cumulative_cost);
    }

    fn into_result(self, household_id: &str, scenario: Scenario) -> TimelineResult {
        let years = (0..self.equity.len() as u32).collect();
        TimelineResult {
            household_id: household_id.to_string(),
            scenario,
            years,
            equity: bands(self.equity, false),
            monthly_costs: bands(self.monthly_cost, true),
            cumulative_costs: bands(self.cumulative_cost, true),
        }
    }
}

// p5/p50/p95 per year. For costs a high value is the pessimistic outcome.
fn bands(columns: Vec<Vec<f64>>, higher_is_worse: bool) -> TimelineBand {
    let mut band = TimelineBand::default();
    for mut column in columns {
        column.sort_by(|a, b| a.total_cmp(b));
        let low = percentile(&column, 5.0);
        let high = percentile(&column, 95.0);
        band.expected.push(percentile(&column, 50.0));
        if higher_is_worse {
            band.pessimistic.push(high);
            band.optimistic.push(low);
        } else {
            band.pessimistic.push(low);
            band.optimistic.push(high);
        }
    }
    band
}

pub fn simulate_timeline(
    household: &Household,
    scenario: Scenario,
    config: &SimulationConfig,
    household_index: u64,
) -> Result<TimelineResult> {
    let model = PathModel::new(household, scenario, config)?;
    let seed = stream_seed(config, household_index, scenario);
    let year_count = config.params().time_horizon_years as usize + 1;
    let mut acc = YearlyAccumulator::new(year_count, config.num_simulations());

    for path_id in 0..config.params().num_simulations {
        let mut streams = PathStreams::new(seed, path_id);
        let mut trace = Vec::with_capacity(year_count);
        model.run_path(&mut streams, Some(&mut trace));
        for (idx, point) in trace.into_iter().take(year_count).enumerate() {
            acc.push(idx, point);
        }
    }

    Ok(acc.into_result(&household.household_id, scenario))
}
