use std::sync::atomic::{AtomicBool, Ordering};

use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, info, warn};

use super::engine::simulate_scenario;
use super::types::{
    Household, HouseholdRecord, Region, Scenario, ScenarioResult, ScenarioSelection,
    SimulationConfig,
};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchEntry {
    pub household_index: usize,
    pub household_id: String,
    pub region: Region,
    pub annual_income: f64,
    pub result: ScenarioResult,
}

// `scenario` is `None` when the record itself was rejected.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchFailure {
    pub household_index: usize,
    pub household_id: String,
    pub scenario: Option<Scenario>,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchReport {
    pub entries: Vec<BatchEntry>,
    pub failures: Vec<BatchFailure>,
    pub cancelled: bool,
    pub completed_households: usize,
}

enum HouseholdRun {
    Skipped,
    Done {
        entries: Vec<BatchEntry>,
        failures: Vec<BatchFailure>,
    },
}

// Each household's seed comes from its index, so the report does not depend
// on the thread count. `cancel` is checked before a household starts; one
// already running finishes.
pub fn run_batch(
    records: &[HouseholdRecord],
    selection: ScenarioSelection,
    config: &SimulationConfig,
    cancel: &AtomicBool,
) -> BatchReport {
    run_batch_with_progress(records, selection, config, cancel, |_| {})
}

pub fn run_batch_with_progress<F>(
    records: &[HouseholdRecord],
    selection: ScenarioSelection,
    config: &SimulationConfig,
    cancel: &AtomicBool,
    on_household: F,
) -> BatchReport
where
    F: Fn(usize) + Sync,
{
    info!(
        households = records.len(),
        simulations = config.params().num_simulations,
        "batch started"
    );

    let runs: Vec<HouseholdRun> = records
        .par_iter()
        .enumerate()
        .map(|(index, record)| {
            if cancel.load(Ordering::Relaxed) {
                return HouseholdRun::Skipped;
            }
            let run = run_household(index, record, selection, config);
            on_household(index);
            run
        })
        .collect();

    let mut report = BatchReport::default();
    for run in runs {
        match run {
            HouseholdRun::Skipped => report.cancelled = true,
            HouseholdRun::Done { entries, failures } => {
                report.completed_households += 1;
                report.entries.extend(entries);
                report.failures.extend(failures);
            }
        }
    }

    if report.cancelled {
        warn!(
            completed = report.completed_households,
            total = records.len(),
            "batch cancelled"
        );
    } else {
        info!(
            entries = report.entries.len(),
            failures = report.failures.len(),
            "batch finished"
        );
    }
    report
}

fn run_household(
    index: usize,
    record: &HouseholdRecord,
    selection: ScenarioSelection,
    config: &SimulationConfig,
) -> HouseholdRun {
    let mut entries = Vec::new();
    let mut failures = Vec::new();

    let household = match Household::from_record(record) {
        Ok(household) => household,
        Err(err) => {
            warn!(household = %record.household_id, error = %err, "household rejected");
            failures.push(BatchFailure {
                household_index: index,
                household_id: record.household_id.clone(),
                scenario: None,
                message: err.to_string(),
            });
            return HouseholdRun::Done { entries, failures };
        }
    };

    for scenario in selection.scenarios() {
        match simulate_scenario(&household, scenario, config, index as u64) {
            Ok(result) => entries.push(BatchEntry {
                household_index: index,
                household_id: household.household_id.clone(),
                region: household.region,
                annual_income: household.annual_income,
                result,
            }),
            Err(err) => {
                warn!(
                    household = %household.household_id,
                    scenario = %scenario,
                    error = %err,
                    "scenario failed"
                );
                failures.push(BatchFailure {
                    household_index: index,
                    household_id: household.household_id.clone(),
                    scenario: Some(scenario),
                    message: err.to_string(),
                });
            }
        }
    }

    debug!(household = %household.household_id, "household finished");
    HouseholdRun::Done { entries, failures }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    use crate::core::types::SimulationParams;

    fn config() -> SimulationConfig {
        SimulationParams {
            num_simulations: 50,
            time_horizon_years: 5,
            ..SimulationParams::default()
        }
        .validate()
        .expect("valid params")
    }

    fn record(id: &str, income: Option<f64>, region: &str) -> HouseholdRecord {
        HouseholdRecord {
            household_id: id.to_string(),
            annual_income: income,
            savings: Some(40_000.0),
            credit_score: Some(710.0),
            monthly_debt: Some(200.0),
            region: Some(region.to_string()),
            employment_sector: "Education".to_string(),
            current_monthly_rent: None,
            ..HouseholdRecord::default()
        }
    }

    #[test]
    fn malformed_households_do_not_abort_the_batch() {
        let records = vec![
            record("A", Some(70_000.0), "Orlando"),
            record("B", None, "Orlando"),
            record("C", Some(90_000.0), "Atlantis"),
            record("D", Some(55_000.0), "Panhandle"),
        ];
        let report = run_batch(&records, ScenarioSelection::All, &config(), &AtomicBool::new(false));

        assert!(!report.cancelled);
        assert_eq!(report.completed_households, 4);
        assert_eq!(report.entries.len(), 8);
        assert_eq!(report.failures.len(), 2);
        assert_eq!(report.failures[0].household_id, "B");
        assert!(report.failures[0].message.contains("annual_income"));
        assert_eq!(report.failures[1].household_id, "C");
        assert!(report.failures.iter().all(|f| f.scenario.is_none()));
    }

    #[test]
    fn entries_keep_household_order_and_seeds() {
        let records: Vec<_> = (0..6)
            .map(|i| record(&format!("H{i}"), Some(60_000.0 + i as f64 * 5_000.0), "Tampa"))
            .collect();
        let selection = ScenarioSelection::One(Scenario::StarterHome);
        let report = run_batch(&records, selection, &config(), &AtomicBool::new(false));

        let indices: Vec<usize> = report.entries.iter().map(|e| e.household_index).collect();
        assert_eq!(indices, (0..6).collect::<Vec<_>>());

        let household = Household::from_record(&records[3]).expect("valid household");
        let direct = simulate_scenario(&household, Scenario::StarterHome, &config(), 3)
            .expect("simulation runs");
        assert_eq!(report.entries[3].result, direct);
    }

    #[test]
    fn cancellation_mid_batch_skips_remaining_households() {
        let records: Vec<_> = (0..8)
            .map(|i| record(&format!("H{i}"), Some(60_000.0 + i as f64 * 1_000.0), "Orlando"))
            .collect();
        let cancel = AtomicBool::new(false);
        let finished = AtomicUsize::new(0);

        let report = rayon::ThreadPoolBuilder::new()
            .num_threads(1)
            .build()
            .expect("thread pool")
            .install(|| {
                run_batch_with_progress(
                    &records,
                    ScenarioSelection::One(Scenario::Rent),
                    &config(),
                    &cancel,
                    |_| {
                        if finished.fetch_add(1, Ordering::SeqCst) + 1 == 3 {
                            cancel.store(true, Ordering::SeqCst);
                        }
                    },
                )
            });

        assert!(report.cancelled);
        assert_eq!(report.completed_households, 3);
        assert_eq!(finished.load(Ordering::SeqCst), 3);
        let indices: Vec<usize> = report.entries.iter().map(|e| e.household_index).collect();
        assert_eq!(indices, vec![0, 1, 2]);
    }

    #[test]
    fn cancellation_before_start_yields_no_entries() {
        let records = vec![record("A", Some(70_000.0), "Orlando")];
        let report = run_batch(&records, ScenarioSelection::All, &config(), &AtomicBool::new(true));
        assert!(report.cancelled);
        assert_eq!(report.completed_households, 0);
        assert!(report.entries.is_empty());
        assert!(report.failures.is_empty());
    }
}
