use rand_distr::{Normal, Triangular};

use super::error::Result;
use super::sampling::{PathStreams, growth_factor, normal, triangular};
use super::scenarios::market_rent;
use super::types::{
    Household, PathOutcomes, PathSummary, SimulationConfig, YearTracePoint, push_frozen_tail,
};

pub(crate) const MIN_MONTHLY_INCOME: f64 = 1e-6;

pub fn simulate_renting(
    household: &Household,
    config: &SimulationConfig,
    stream_seed: u64,
) -> Result<PathOutcomes> {
    let model = RentModel::new(household, config)?;
    let mut outcomes = PathOutcomes::with_capacity(config.num_simulations());
    for path_id in 0..config.params().num_simulations {
        let mut streams = PathStreams::new(stream_seed, path_id);
        outcomes.push(model.run_path(&mut streams, None));
    }
    Ok(outcomes)
}

pub(crate) struct RentModel {
    initial_rent: f64,
    annual_income: f64,
    monthly_debt: f64,
    threshold: f64,
    grace_months: u32,
    years: u32,
    income_change: Normal<f64>,
    rent_increase: Triangular<f64>,
}

impl RentModel {
    pub fn new(household: &Household, config: &SimulationConfig) -> Result<Self> {
        let params = config.params();
        Ok(Self {
            initial_rent: household
                .current_monthly_rent
                .unwrap_or_else(|| market_rent(household.region)),
            annual_income: household.annual_income,
            monthly_debt: household.monthly_debt,
            threshold: params.rent_affordability_threshold,
            grace_months: params.rent_grace_months,
            years: params.time_horizon_years,
            income_change: normal("income_growth", params.income_growth, params.income_volatility)?,
            rent_increase: triangular(
                "rent_increase_mode",
                params.rent_increase_min,
                params.rent_increase_mode,
                params.rent_increase_max,
            )?,
        })
    }

    pub fn run_path(
        &self,
        streams: &mut PathStreams,
        mut trace: Option<&mut Vec<YearTracePoint>>,
    ) -> PathSummary {
        let trace_len = self.years as usize + 1;
        let mut rent = self.initial_rent;
        let mut income = self.annual_income;
        let mut cumulative = 0.0;
        let mut consecutive_breaches = 0_u32;
        let mut month = 0_u32;
        let mut default_month = None;

        if let Some(rows) = trace.as_deref_mut() {
            rows.push(YearTracePoint {
                equity: 0.0,
                monthly_cost: rent,
                cumulative_cost: 0.0,
            });
        }

        'years: for _ in 0..self.years {
            income *= growth_factor(&self.income_change, &mut streams.income);
            rent *= growth_factor(&self.rent_increase, &mut streams.market);

            let monthly_income = (income / 12.0).max(MIN_MONTHLY_INCOME);
            let ratio = (rent + self.monthly_debt) / monthly_income;

            for _ in 0..12 {
                if ratio > self.threshold {
                    consecutive_breaches += 1;
                    if consecutive_breaches > self.grace_months {
                        default_month = Some(month);
                        break 'years;
                    }
                } else {
                    consecutive_breaches = 0;
                }
                cumulative += rent;
                month += 1;
            }

            if let Some(rows) = trace.as_deref_mut() {
                rows.push(YearTracePoint {
                    equity: 0.0,
                    monthly_cost: rent,
                    cumulative_cost: cumulative,
                });
            }
        }

        if let Some(rows) = trace.as_deref_mut() {
            let last = YearTracePoint {
                equity: 0.0,
                monthly_cost: rent,
                cumulative_cost: cumulative,
            };
            push_frozen_tail(rows, last, trace_len);
        }

        PathSummary {
            total_cost_paid: cumulative,
            default_month,
            months_solvent: month,
            final_equity: 0.0,
            final_monthly_cost: rent,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{HouseholdRecord, SimulationParams};

    fn household(income: f64, debt: f64) -> Household {
        Household::from_record(&HouseholdRecord {
            household_id: "HH-R".to_string(),
            annual_income: Some(income),
            savings: Some(10_000.0),
            credit_score: Some(700.0),
            monthly_debt: Some(debt),
            region: Some("Jacksonville".to_string()),
            employment_sector: "Retail".to_string(),
            current_monthly_rent: None,
            ..HouseholdRecord::default()
        })
        .expect("valid household")
    }

    fn config(params: SimulationParams) -> SimulationConfig {
        params.validate().expect("valid params")
    }

    #[test]
    fn renting_paths_never_build_equity() {
        let params = SimulationParams {
            num_simulations: 200,
            ..SimulationParams::default()
        };
        let outcomes = simulate_renting(&household(60_000.0, 300.0), &config(params), 7)
            .expect("simulation runs");
        assert_eq!(outcomes.len(), 200);
        assert!(outcomes.final_equity.iter().all(|&e| e == 0.0));
        assert!(outcomes.total_cost_paid.iter().all(|&c| c >= 0.0));
    }

    #[test]
    fn unaffordable_rent_defaults_in_first_month_without_grace() {
        // 1,300 rent on 2,000/month income breaches 35% immediately.
        let params = SimulationParams {
            num_simulations: 50,
            income_volatility: 0.0,
            income_growth: 0.0,
            ..SimulationParams::default()
        };
        let outcomes = simulate_renting(&household(24_000.0, 0.0), &config(params), 1)
            .expect("simulation runs");
        assert!(outcomes.solvent.iter().all(|&s| !s));
        assert!(outcomes.default_month.iter().all(|&m| m == Some(0)));
        assert!(outcomes.total_cost_paid.iter().all(|&c| c == 0.0));
    }

    #[test]
    fn grace_period_tolerates_configured_breaches() {
        let params = SimulationParams {
            num_simulations: 20,
            income_volatility: 0.0,
            income_growth: 0.0,
            rent_grace_months: 3,
            ..SimulationParams::default()
        };
        let outcomes = simulate_renting(&household(24_000.0, 0.0), &config(params), 1)
            .expect("simulation runs");
        for (month, cost) in outcomes.default_month.iter().zip(&outcomes.total_cost_paid) {
            assert_eq!(*month, Some(3));
            assert!(*cost > 0.0);
        }
        assert!(outcomes.months_solvent.iter().all(|&m| m == 3));
    }

    #[test]
    fn comfortable_household_survives_full_horizon() {
        let params = SimulationParams {
            num_simulations: 100,
            time_horizon_years: 5,
            income_volatility: 0.0,
            ..SimulationParams::default()
        };
        let outcomes = simulate_renting(&household(400_000.0, 0.0), &config(params), 3)
            .expect("simulation runs");
        assert!(outcomes.solvent.iter().all(|&s| s));
        assert!(outcomes.months_solvent.iter().all(|&m| m == 60));
    }

    #[test]
    fn trace_has_one_point_per_year_even_after_default() {
        let params = SimulationParams {
            num_simulations: 1,
            time_horizon_years: 4,
            income_volatility: 0.0,
            income_growth: 0.0,
            ..SimulationParams::default()
        };
        let config = config(params);
        let model = RentModel::new(&household(24_000.0, 0.0), &config).expect("model");
        let mut trace = Vec::new();
        let mut streams = PathStreams::new(5, 0);
        model.run_path(&mut streams, Some(&mut trace));
        assert_eq!(trace.len(), 5);
        assert!(trace[1..].iter().all(|p| p.monthly_cost == 0.0));
    }
}
