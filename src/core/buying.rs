use rand_distr::{Distribution, Normal, Triangular, Uniform};

use super::error::{Result, SimError};
use super::renting::MIN_MONTHLY_INCOME;
use super::sampling::{PathStreams, growth_factor, normal, triangular};
use super::scenarios::{MORTGAGE_TERM_MONTHS, ResolvedScenario, region_adjustment};
use super::types::{
    Household, PathOutcomes, PathSummary, SimulationConfig, YearTracePoint, push_frozen_tail,
};

pub const MIN_MORTGAGE_RATE: f64 = 0.005;
// Rate adjustment per credit-score point below 750 (negative above it).
pub const CREDIT_RATE_ADJUSTMENT: f64 = 0.0001;
const CREDIT_REFERENCE_SCORE: f64 = 750.0;

pub fn simulate_buying(
    household: &Household,
    resolved: &ResolvedScenario,
    config: &SimulationConfig,
    stream_seed: u64,
) -> Result<PathOutcomes> {
    let model = BuyModel::new(household, resolved, config)?;
    let mut outcomes = PathOutcomes::with_capacity(config.num_simulations());
    for path_id in 0..config.params().num_simulations {
        let mut streams = PathStreams::new(stream_seed, path_id);
        outcomes.push(model.run_path(&mut streams, None));
    }
    Ok(outcomes)
}

pub fn amortized_payment(principal: f64, annual_rate: f64, months: u32) -> f64 {
    if months == 0 {
        return principal;
    }
    let r = annual_rate / 12.0;
    if r.abs() < 1e-12 {
        return principal / months as f64;
    }
    let growth = (1.0 + r).powi(months as i32);
    principal * r * growth / (growth - 1.0)
}

pub(crate) struct BuyModel {
    resolved: ResolvedScenario,
    savings: f64,
    annual_income: f64,
    monthly_debt: f64,
    threshold: f64,
    years: u32,
    income_change: Normal<f64>,
    appreciation: Normal<f64>,
    insurance_increase: Triangular<f64>,
    maintenance_variation: Uniform<f64>,
    interest_rate: Normal<f64>,
}

impl BuyModel {
    pub fn new(
        household: &Household,
        resolved: &ResolvedScenario,
        config: &SimulationConfig,
    ) -> Result<Self> {
        if !resolved.scenario.is_purchase() {
            return Err(SimError::Configuration(format!(
                "`{}` is not a purchase scenario",
                resolved.scenario
            )));
        }

        let params = config.params();
        let appreciation_mean = params
            .home_appreciation
            .map(|base| base + region_adjustment(resolved.region).appreciation_delta)
            .unwrap_or(resolved.appreciation_mean);
        let rate_mean = params.interest_rate.unwrap_or(resolved.interest_rate_mean)
            + (CREDIT_REFERENCE_SCORE - household.credit_score) * CREDIT_RATE_ADJUSTMENT;

        Ok(Self {
            resolved: *resolved,
            savings: household.savings,
            annual_income: household.annual_income,
            monthly_debt: household.monthly_debt,
            threshold: params.affordability_threshold,
            years: params.time_horizon_years,
            income_change: normal("income_growth", params.income_growth, params.income_volatility)?,
            appreciation: normal(
                "home_appreciation",
                appreciation_mean,
                params.appreciation_volatility,
            )?,
            insurance_increase: triangular(
                "insurance_increase",
                params.insurance_increase_min,
                config.insurance_mode(),
                params.insurance_increase_max,
            )?,
            maintenance_variation: Uniform::new_inclusive(0.8, 1.5)
                .map_err(|e| SimError::parameter("maintenance_variation", e.to_string()))?,
            interest_rate: normal("interest_rate", rate_mean, params.interest_rate_volatility)?,
        })
    }

    pub fn run_path(
        &self,
        streams: &mut PathStreams,
        mut trace: Option<&mut Vec<YearTracePoint>>,
    ) -> PathSummary {
        let trace_len = self.years as usize + 1;
        let s = &self.resolved;

        let price = s.sample_price(&mut streams.market);
        let down_payment = price * s.down_payment_pct;
        let closing_costs = price * s.closing_costs_pct;

        if self.savings < s.upfront_cost(price) {
            let lost = self.savings.min(closing_costs);
            if let Some(rows) = trace.as_deref_mut() {
                let point = YearTracePoint {
                    equity: -lost,
                    monthly_cost: 0.0,
                    cumulative_cost: lost,
                };
                push_frozen_tail(rows, point, trace_len);
            }
            return PathSummary {
                total_cost_paid: lost,
                default_month: Some(0),
                months_solvent: 0,
                final_equity: -lost,
                final_monthly_cost: 0.0,
            };
        }

        let rate = self
            .interest_rate
            .sample(&mut streams.market)
            .max(MIN_MORTGAGE_RATE);
        let monthly_rate = rate / 12.0;
        let mut principal = price - down_payment;
        let payment = amortized_payment(principal, rate, MORTGAGE_TERM_MONTHS);

        let mut home_value = price;
        let mut insurance_annual = s.insurance_annual;
        let mut income = self.annual_income;
        let mut cumulative = down_payment + closing_costs;
        let mut month = 0_u32;
        let mut monthly_cost = payment
            + home_value * s.property_tax_rate / 12.0
            + insurance_annual / 12.0
            + s.hoa_monthly
            + home_value * s.maintenance_annual_pct / 12.0;

        if let Some(rows) = trace.as_deref_mut() {
            rows.push(YearTracePoint {
                equity: home_value - principal,
                monthly_cost,
                cumulative_cost: cumulative,
            });
        }

        for _ in 0..self.years {
            income *= growth_factor(&self.income_change, &mut streams.income);
            home_value *= growth_factor(&self.appreciation, &mut streams.market);
            insurance_annual *= growth_factor(&self.insurance_increase, &mut streams.market);
            let maintenance_factor = self.maintenance_variation.sample(&mut streams.market);

            let monthly_income = (income / 12.0).max(MIN_MONTHLY_INCOME);
            let carrying_cost = home_value * s.property_tax_rate / 12.0
                + insurance_annual / 12.0
                + s.hoa_monthly
                + home_value * s.maintenance_annual_pct * maintenance_factor / 12.0;

            for _ in 0..12 {
                let mortgage_due = if principal > 0.0 {
                    payment.min(principal * (1.0 + monthly_rate))
                } else {
                    0.0
                };
                monthly_cost = mortgage_due + carrying_cost;

                if (monthly_cost + self.monthly_debt) / monthly_income > self.threshold {
                    let equity = home_value * (1.0 - s.selling_cost_pct) - principal;
                    if let Some(rows) = trace.as_deref_mut() {
                        let point = YearTracePoint {
                            equity,
                            monthly_cost: 0.0,
                            cumulative_cost: cumulative,
                        };
                        push_frozen_tail(rows, point, trace_len);
                    }
                    return PathSummary {
                        total_cost_paid: cumulative,
                        default_month: Some(month),
                        months_solvent: month,
                        final_equity: equity,
                        final_monthly_cost: monthly_cost,
                    };
                }

                cumulative += monthly_cost;
                let interest = principal * monthly_rate;
                principal = (principal - (mortgage_due - interest)).max(0.0);
                month += 1;
            }

            if let Some(rows) = trace.as_deref_mut() {
                rows.push(YearTracePoint {
                    equity: home_value - principal,
                    monthly_cost,
                    cumulative_cost: cumulative,
                });
            }
        }

        PathSummary {
            total_cost_paid: cumulative,
            default_month: None,
            months_solvent: month,
            final_equity: home_value - principal,
            final_monthly_cost: monthly_cost,
        }
    }
}
