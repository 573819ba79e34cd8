use std::collections::BTreeMap;

use serde::Serialize;

use super::batch::BatchEntry;
use super::sampling::{mean, percentile};
use super::types::{Region, Scenario};

pub const HIGH_RISK_THRESHOLD: f64 = 0.5;
pub const LOW_RISK_THRESHOLD: f64 = 0.8;

#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum IncomeBracket {
    Under40k,
    From40kTo60k,
    From60kTo85k,
    From85kTo120k,
    Over120k,
}

impl IncomeBracket {
    pub fn of(annual_income: f64) -> Self {
        if annual_income < 40_000.0 {
            IncomeBracket::Under40k
        } else if annual_income < 60_000.0 {
            IncomeBracket::From40kTo60k
        } else if annual_income < 85_000.0 {
            IncomeBracket::From60kTo85k
        } else if annual_income < 120_000.0 {
            IncomeBracket::From85kTo120k
        } else {
            IncomeBracket::Over120k
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            IncomeBracket::Under40k => "<$40k",
            IncomeBracket::From40kTo60k => "$40-60k",
            IncomeBracket::From60kTo85k => "$60-85k",
            IncomeBracket::From85kTo120k => "$85-120k",
            IncomeBracket::Over120k => ">$120k",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScenarioStats {
    pub results: usize,
    pub mean_affordability: f64,
    // Sample standard deviation; zero with fewer than two results.
    pub std_affordability: f64,
    pub median_affordability: f64,
    pub mean_default_risk: f64,
    pub mean_equity: f64,
    pub mean_total_cost: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupStats {
    pub results: usize,
    pub mean_affordability: f64,
    pub mean_default_risk: f64,
    pub mean_equity: f64,
    pub mean_income: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CohortSummary {
    pub total_results: usize,
    pub mean_affordability: f64,
    pub mean_default_risk: f64,
    pub high_risk_results: usize,
    pub low_risk_results: usize,
    pub by_scenario: BTreeMap<Scenario, ScenarioStats>,
    pub by_region: BTreeMap<Region, GroupStats>,
    pub by_income: BTreeMap<IncomeBracket, GroupStats>,
}

pub fn summarize(entries: &[BatchEntry]) -> CohortSummary {
    let affordability: Vec<f64> = entries
        .iter()
        .map(|e| e.result.probability_affordable)
        .collect();
    let default_risk: Vec<f64> = entries.iter().map(|e| e.result.default_risk).collect();

    let mut by_scenario: BTreeMap<Scenario, Vec<&BatchEntry>> = BTreeMap::new();
    let mut by_region: BTreeMap<Region, Vec<&BatchEntry>> = BTreeMap::new();
    let mut by_income: BTreeMap<IncomeBracket, Vec<&BatchEntry>> = BTreeMap::new();
    for entry in entries {
        by_scenario.entry(entry.result.scenario).or_default().push(entry);
        by_region.entry(entry.region).or_default().push(entry);
        by_income
            .entry(IncomeBracket::of(entry.annual_income))
            .or_default()
            .push(entry);
    }

    CohortSummary {
        total_results: entries.len(),
        mean_affordability: mean(&affordability),
        mean_default_risk: mean(&default_risk),
        high_risk_results: affordability
            .iter()
            .filter(|&&p| p < HIGH_RISK_THRESHOLD)
            .count(),
        low_risk_results: affordability
            .iter()
            .filter(|&&p| p > LOW_RISK_THRESHOLD)
            .count(),
        by_scenario: by_scenario
            .into_iter()
            .map(|(k, v)| (k, scenario_stats(&v)))
            .collect(),
        by_region: by_region
            .into_iter()
            .map(|(k, v)| (k, group_stats(&v)))
            .collect(),
        by_income: by_income
            .into_iter()
            .map(|(k, v)| (k, group_stats(&v)))
            .collect(),
    }
}

fn field(entries: &[&BatchEntry], f: impl Fn(&BatchEntry) -> f64) -> Vec<f64> {
    entries.iter().map(|&e| f(e)).collect()
}

fn scenario_stats(entries: &[&BatchEntry]) -> ScenarioStats {
    let mut affordability = field(entries, |e| e.result.probability_affordable);
    affordability.sort_by(|a, b| a.total_cmp(b));
    ScenarioStats {
        results: entries.len(),
        mean_affordability: mean(&affordability),
        std_affordability: sample_std(&affordability),
        median_affordability: percentile(&affordability, 50.0),
        mean_default_risk: mean(&field(entries, |e| e.result.default_risk)),
        mean_equity: mean(&field(entries, |e| e.result.equity_built.mean)),
        mean_total_cost: mean(&field(entries, |e| e.result.total_cost.mean)),
    }
}

fn group_stats(entries: &[&BatchEntry]) -> GroupStats {
    GroupStats {
        results: entries.len(),
        mean_affordability: mean(&field(entries, |e| e.result.probability_affordable)),
        mean_default_risk: mean(&field(entries, |e| e.result.default_risk)),
        mean_equity: mean(&field(entries, |e| e.result.equity_built.mean)),
        mean_income: mean(&field(entries, |e| e.annual_income)),
    }
}

fn sample_std(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    let var = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    var.sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{DistributionSummary, MonthsSummary, ScenarioResult};

    const EPS: f64 = 1e-9;

    fn assert_approx(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() <= EPS,
            "expected {expected}, got {actual}"
        );
    }

    fn entry(
        index: usize,
        region: Region,
        income: f64,
        scenario: Scenario,
        affordable: f64,
        equity: f64,
    ) -> BatchEntry {
        BatchEntry {
            household_index: index,
            household_id: format!("HH{index:06}"),
            region,
            annual_income: income,
            result: ScenarioResult {
                household_id: format!("HH{index:06}"),
                scenario,
                simulations: 100,
                time_horizon_years: 10,
                probability_affordable: affordable,
                default_risk: 1.0 - affordable,
                probability_negative_equity: 0.0,
                total_cost: DistributionSummary {
                    mean: 100_000.0,
                    ..DistributionSummary::default()
                },
                equity_built: DistributionSummary {
                    mean: equity,
                    ..DistributionSummary::default()
                },
                final_monthly_cost: DistributionSummary::default(),
                months_solvent: MonthsSummary::default(),
            },
        }
    }

    #[test]
    fn income_brackets_use_half_open_bounds() {
        assert_eq!(IncomeBracket::of(39_999.0), IncomeBracket::Under40k);
        assert_eq!(IncomeBracket::of(40_000.0), IncomeBracket::From40kTo60k);
        assert_eq!(IncomeBracket::of(85_000.0), IncomeBracket::From85kTo120k);
        assert_eq!(IncomeBracket::of(250_000.0), IncomeBracket::Over120k);
        assert_eq!(IncomeBracket::Over120k.label(), ">$120k");
    }

    #[test]
    fn summary_counts_risk_groups_and_groups_by_key() {
        let entries = vec![
            entry(0, Region::Orlando, 35_000.0, Scenario::Rent, 0.2, 0.0),
            entry(0, Region::Orlando, 35_000.0, Scenario::StarterHome, 0.4, 20_000.0),
            entry(1, Region::MiamiDade, 150_000.0, Scenario::Rent, 0.9, 0.0),
            entry(1, Region::MiamiDade, 150_000.0, Scenario::StarterHome, 1.0, 60_000.0),
        ];
        let summary = summarize(&entries);

        assert_eq!(summary.total_results, 4);
        assert_approx(summary.mean_affordability, 0.625);
        assert_approx(summary.mean_default_risk, 0.375);
        assert_eq!(summary.high_risk_results, 2);
        assert_eq!(summary.low_risk_results, 2);

        let starter = &summary.by_scenario[&Scenario::StarterHome];
        assert_eq!(starter.results, 2);
        assert_approx(starter.mean_affordability, 0.7);
        assert_approx(starter.median_affordability, 0.7);
        assert_approx(starter.std_affordability, (0.18f64).sqrt());
        assert_approx(starter.mean_equity, 40_000.0);

        let orlando = &summary.by_region[&Region::Orlando];
        assert_eq!(orlando.results, 2);
        assert_approx(orlando.mean_income, 35_000.0);
        assert_eq!(summary.by_income[&IncomeBracket::Over120k].results, 2);
        assert!(!summary.by_income.contains_key(&IncomeBracket::From60kTo85k));
    }

    #[test]
    fn empty_batch_summarizes_to_zeroes() {
        let summary = summarize(&[]);
        assert_eq!(summary, CohortSummary::default());
    }
}
