use rand::Rng;
use serde::Serialize;

use super::error::{Result, SimError};
use super::types::{Region, Scenario};

pub const CLOSING_COSTS_PCT: f64 = 0.03;
pub const SELLING_COST_PCT: f64 = 0.08;
pub const MORTGAGE_TERM_MONTHS: u32 = 30 * 12;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScenarioDefinition {
    pub scenario: Scenario,
    pub price_min: f64,
    pub price_max: f64,
    pub down_payment_pct: f64,
    pub insurance_annual: f64,
    pub hoa_monthly: f64,
    pub maintenance_annual_pct: f64,
    pub property_tax_rate: f64,
    pub interest_rate_mean: f64,
    pub appreciation_mean: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegionAdjustment {
    pub price_multiplier: f64,
    pub insurance_multiplier: f64,
    pub appreciation_delta: f64,
    pub market_rent: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedScenario {
    pub scenario: Scenario,
    pub region: Region,
    pub price_min: f64,
    pub price_max: f64,
    pub down_payment_pct: f64,
    pub closing_costs_pct: f64,
    pub selling_cost_pct: f64,
    pub insurance_annual: f64,
    pub hoa_monthly: f64,
    pub maintenance_annual_pct: f64,
    pub property_tax_rate: f64,
    pub interest_rate_mean: f64,
    pub appreciation_mean: f64,
}

impl ResolvedScenario {
    pub fn sample_price<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        if self.price_max <= self.price_min {
            return self.price_min;
        }
        rng.random_range(self.price_min..self.price_max)
    }

    pub fn upfront_cost(&self, price: f64) -> f64 {
        price * (self.down_payment_pct + self.closing_costs_pct)
    }
}

const RENT: ScenarioDefinition = ScenarioDefinition {
    scenario: Scenario::Rent,
    price_min: 0.0,
    price_max: 0.0,
    down_payment_pct: 0.0,
    insurance_annual: 0.0,
    hoa_monthly: 0.0,
    maintenance_annual_pct: 0.0,
    property_tax_rate: 0.0,
    interest_rate_mean: 0.0,
    appreciation_mean: 0.0,
};

const STARTER_HOME: ScenarioDefinition = ScenarioDefinition {
    scenario: Scenario::StarterHome,
    price_min: 200_000.0,
    price_max: 300_000.0,
    down_payment_pct: 0.05,
    insurance_annual: 3_500.0,
    hoa_monthly: 150.0,
    maintenance_annual_pct: 0.015,
    property_tax_rate: 0.009,
    interest_rate_mean: 0.065,
    appreciation_mean: 0.04,
};

const STANDARD_HOME: ScenarioDefinition = ScenarioDefinition {
    scenario: Scenario::StandardHome,
    price_min: 300_000.0,
    price_max: 500_000.0,
    down_payment_pct: 0.10,
    insurance_annual: 5_500.0,
    hoa_monthly: 250.0,
    maintenance_annual_pct: 0.015,
    property_tax_rate: 0.009,
    interest_rate_mean: 0.0625,
    appreciation_mean: 0.045,
};

const PREMIUM_HOME: ScenarioDefinition = ScenarioDefinition {
    scenario: Scenario::PremiumHome,
    price_min: 500_000.0,
    price_max: 800_000.0,
    down_payment_pct: 0.20,
    insurance_annual: 8_500.0,
    hoa_monthly: 400.0,
    maintenance_annual_pct: 0.02,
    property_tax_rate: 0.009,
    interest_rate_mean: 0.06,
    appreciation_mean: 0.05,
};

pub fn definition(scenario: Scenario) -> &'static ScenarioDefinition {
    match scenario {
        Scenario::Rent => &RENT,
        Scenario::StarterHome => &STARTER_HOME,
        Scenario::StandardHome => &STANDARD_HOME,
        Scenario::PremiumHome => &PREMIUM_HOME,
    }
}

pub fn region_adjustment(region: Region) -> RegionAdjustment {
    let (price_multiplier, insurance_multiplier, appreciation_delta, market_rent) = match region {
        Region::MiamiDade => (1.35, 1.40, 0.005, 1_800.0),
        Region::TampaBay => (1.10, 1.20, 0.003, 1_500.0),
        Region::Orlando => (1.05, 1.15, 0.002, 1_450.0),
        Region::Jacksonville => (0.95, 1.10, 0.0, 1_300.0),
        Region::SouthwestFlorida => (1.20, 1.35, 0.002, 1_600.0),
        Region::Panhandle => (0.85, 1.25, -0.005, 1_200.0),
    };
    RegionAdjustment {
        price_multiplier,
        insurance_multiplier,
        appreciation_delta,
        market_rent,
    }
}

pub fn market_rent(region: Region) -> f64 {
    region_adjustment(region).market_rent
}

pub fn resolve(scenario: Scenario, region: Region) -> ResolvedScenario {
    let base = definition(scenario);
    let adj = region_adjustment(region);
    ResolvedScenario {
        scenario,
        region,
        price_min: base.price_min * adj.price_multiplier,
        price_max: base.price_max * adj.price_multiplier,
        down_payment_pct: base.down_payment_pct,
        closing_costs_pct: if scenario.is_purchase() {
            CLOSING_COSTS_PCT
        } else {
            0.0
        },
        selling_cost_pct: if scenario.is_purchase() {
            SELLING_COST_PCT
        } else {
            0.0
        },
        insurance_annual: base.insurance_annual * adj.insurance_multiplier,
        hoa_monthly: base.hoa_monthly,
        maintenance_annual_pct: base.maintenance_annual_pct,
        property_tax_rate: base.property_tax_rate,
        interest_rate_mean: base.interest_rate_mean,
        appreciation_mean: if scenario.is_purchase() {
            base.appreciation_mean + adj.appreciation_delta
        } else {
            0.0
        },
    }
}

pub fn resolve_named(scenario: &str, region: &str) -> Result<ResolvedScenario> {
    let scenario = scenario
        .parse::<Scenario>()
        .map_err(|_| SimError::Configuration(format!("unknown scenario `{scenario}`")))?;
    let region = region.parse::<Region>()?;
    Ok(resolve(scenario, region))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    const EPS: f64 = 1e-9;

    fn assert_approx(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() <= EPS,
            "expected {expected}, got {actual}"
        );
    }

    #[test]
    fn resolve_applies_region_multipliers() {
        let resolved = resolve(Scenario::StarterHome, Region::MiamiDade);
        assert_approx(resolved.price_min, 270_000.0);
        assert_approx(resolved.price_max, 405_000.0);
        assert_approx(resolved.insurance_annual, 4_900.0);
        assert_approx(resolved.appreciation_mean, 0.045);
        assert_approx(resolved.closing_costs_pct, CLOSING_COSTS_PCT);
    }

    #[test]
    fn rent_resolves_without_purchase_costs() {
        let resolved = resolve(Scenario::Rent, Region::Orlando);
        assert_approx(resolved.price_max, 0.0);
        assert_approx(resolved.closing_costs_pct, 0.0);
        assert_approx(resolved.appreciation_mean, 0.0);
    }

    #[test]
    fn resolve_named_rejects_unknown_names_as_configuration_errors() {
        assert!(matches!(
            resolve_named("castle", "Orlando"),
            Err(SimError::Configuration(_))
        ));
        assert!(matches!(
            resolve_named("starter", "Atlantis"),
            Err(SimError::Configuration(_))
        ));
        let resolved = resolve_named("Buy Premium Home", "Panhandle").expect("known names");
        assert_eq!(resolved.scenario, Scenario::PremiumHome);
        assert_eq!(resolved.region, Region::Panhandle);
    }

    #[test]
    fn sampled_price_stays_in_range() {
        let resolved = resolve(Scenario::StandardHome, Region::TampaBay);
        let mut rng = ChaCha8Rng::seed_from_u64(9);
        for _ in 0..1_000 {
            let price = resolved.sample_price(&mut rng);
            assert!(price >= resolved.price_min && price < resolved.price_max);
        }
    }

    #[test]
    fn every_region_has_positive_market_rent() {
        for region in Region::ALL {
            assert!(market_rent(region) > 0.0);
        }
    }
}
