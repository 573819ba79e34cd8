use rand::distr::weighted::WeightedIndex;
use rand::seq::index;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::{Beta, Distribution, Gamma, Normal, Uniform};

use super::error::{Result, SimError};
use super::sampling::percentile;
use super::scenarios::market_rent;
use super::types::{Household, HouseholdRecord, HousingSituation, MAX_CREDIT_SCORE, Region};

pub const MIN_GENERATED_INCOME: f64 = 25_000.0;
pub const MAX_GENERATED_INCOME: f64 = 200_000.0;
const MIN_GENERATED_CREDIT: f64 = 550.0;
const MAX_GENERATED_DEBT: f64 = 150_000.0;
const MAX_GENERATED_SAVINGS: f64 = 150_000.0;
const MIN_GENERATED_RENT: f64 = 800.0;
const DEBT_PAYMENT_RATE: f64 = 0.01;
const MAX_DEBT_TO_INCOME: f64 = 0.65;
const INVESTOR_SHARE: f64 = 0.3;

const HOUSEHOLD_SIZES: [(u32, f64); 5] = [(1, 0.25), (2, 0.35), (3, 0.20), (4, 0.15), (5, 0.05)];

const REGION_WEIGHTS: [(Region, f64); 6] = [
    (Region::MiamiDade, 0.25),
    (Region::TampaBay, 0.20),
    (Region::Orlando, 0.18),
    (Region::Jacksonville, 0.15),
    (Region::Panhandle, 0.12),
    (Region::SouthwestFlorida, 0.10),
];

// Sector, population share, income multiplier.
const SECTORS: [(&str, f64, f64); 9] = [
    ("Tourism/Hospitality", 0.20, 0.75),
    ("Healthcare", 0.15, 1.15),
    ("Technology", 0.12, 1.35),
    ("Education", 0.10, 1.05),
    ("Retail", 0.12, 0.80),
    ("Construction", 0.08, 1.00),
    ("Finance", 0.08, 1.25),
    ("Government", 0.10, 1.10),
    ("Agriculture", 0.05, 0.85),
];

fn distribution_error(name: &'static str, err: impl ToString) -> SimError {
    SimError::parameter(name, err.to_string())
}

struct Generator {
    age: Gamma<f64>,
    size: WeightedIndex<f64>,
    income_noise: Normal<f64>,
    sector: WeightedIndex<f64>,
    region: WeightedIndex<f64>,
    credit_noise: Normal<f64>,
    debt_share: Beta<f64>,
    rent_noise: Normal<f64>,
    years_saving: Uniform<f64>,
    saving_discipline: Uniform<f64>,
}

impl Generator {
    fn new() -> Result<Self> {
        fn weights(w: &[f64]) -> Result<WeightedIndex<f64>> {
            WeightedIndex::new(w).map_err(|e| distribution_error("weights", e))
        }
        Ok(Self {
            age: Gamma::new(6.0, 6.0).map_err(|e| distribution_error("age", e))?,
            size: weights(&HOUSEHOLD_SIZES.map(|(_, w)| w))?,
            income_noise: Normal::new(0.0, 15_000.0)
                .map_err(|e| distribution_error("income_noise", e))?,
            sector: weights(&SECTORS.map(|(_, w, _)| w))?,
            region: weights(&REGION_WEIGHTS.map(|(_, w)| w))?,
            credit_noise: Normal::new(0.0, 40.0)
                .map_err(|e| distribution_error("credit_noise", e))?,
            debt_share: Beta::new(2.0, 5.0).map_err(|e| distribution_error("debt_share", e))?,
            rent_noise: Normal::new(0.0, 150.0)
                .map_err(|e| distribution_error("rent_noise", e))?,
            years_saving: Uniform::new(0.0, 10.0)
                .map_err(|e| distribution_error("years_saving", e))?,
            saving_discipline: Uniform::new(0.5, 1.5)
                .map_err(|e| distribution_error("saving_discipline", e))?,
        })
    }

    fn household(&self, id: usize, rng: &mut ChaCha8Rng) -> Household {
        let age = (self.age.sample(rng) + 25.0).clamp(25.0, 75.0).floor();
        let size_count = HOUSEHOLD_SIZES[self.size.sample(rng)].0;
        let size = size_count as f64;

        let mut income = 35_000.0 + (age - 25.0) * 800.0 + (size - 1.0) * 8_000.0
            + self.income_noise.sample(rng);
        income = income.clamp(MIN_GENERATED_INCOME, MAX_GENERATED_INCOME);
        let (sector, _, multiplier) = SECTORS[self.sector.sample(rng)];
        income = (income * multiplier).clamp(MIN_GENERATED_INCOME, MAX_GENERATED_INCOME);

        let region = REGION_WEIGHTS[self.region.sample(rng)].0;

        let credit = (550.0
            + (income - MIN_GENERATED_INCOME) / 1_000.0
            + (age - 25.0) * 2.0
            + self.credit_noise.sample(rng))
        .clamp(MIN_GENERATED_CREDIT, MAX_CREDIT_SCORE)
        .floor();

        let debt = (self.debt_share.sample(rng) * income * 0.8).clamp(0.0, MAX_GENERATED_DEBT);

        let rent = (market_rent(region) + (size - 1.0) * 200.0 + self.rent_noise.sample(rng))
            .max(MIN_GENERATED_RENT);

        let savings_rate = ((income - rent * 12.0 - 20_000.0) / income).clamp(0.0, 0.25);
        let savings = (savings_rate
            * income
            * self.years_saving.sample(rng)
            * self.saving_discipline.sample(rng))
        .clamp(0.0, MAX_GENERATED_SAVINGS)
        .round();
        let situation = housing_situation(savings, rng);

        Household {
            household_id: format!("HH{id:06}"),
            annual_income: income.round(),
            savings,
            credit_score: credit,
            monthly_debt: (debt * DEBT_PAYMENT_RATE).round(),
            region,
            employment_sector: sector.to_string(),
            current_monthly_rent: Some(rent.round()),
            age: Some(age as u32),
            household_size: Some(size_count),
            housing_situation: Some(situation),
        }
    }
}

fn housing_situation(savings: f64, rng: &mut ChaCha8Rng) -> HousingSituation {
    if savings < 10_000.0 {
        HousingSituation::CurrentlyRenting
    } else if savings < 30_000.0 {
        HousingSituation::FirstTimeBuyer
    } else if savings < 60_000.0 || !rng.random_bool(INVESTOR_SHARE) {
        HousingSituation::MoveUpBuyer
    } else {
        HousingSituation::Investor
    }
}

pub fn generate_households(n: usize, seed: u64) -> Result<Vec<Household>> {
    let generator = Generator::new()?;
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    Ok((1..=n).map(|id| generator.household(id, &mut rng)).collect())
}

pub fn financial_risk_score(household: &Household) -> f64 {
    let monthly_income = household.annual_income / 12.0;
    let debt_to_income = (household.monthly_debt / monthly_income).clamp(0.0, MAX_DEBT_TO_INCOME);
    let score = (1.0 - (household.credit_score - MIN_GENERATED_CREDIT) / 300.0) * 30.0
        + debt_to_income * 40.0
        + (1.0 - household.savings / 50_000.0) * 0.2 * 30.0;
    score.clamp(0.0, 100.0)
}

struct Noise {
    income_sd: f64,
    debt_payment_sd: f64,
    credit: (i32, i32),
    savings_sd: f64,
}

const HIGH_RISK_NOISE: Noise = Noise {
    income_sd: 5_000.0,
    debt_payment_sd: 100.0,
    credit: (-20, 10),
    savings_sd: 2_000.0,
};

const LOW_RISK_NOISE: Noise = Noise {
    income_sd: 8_000.0,
    debt_payment_sd: 50.0,
    credit: (-10, 20),
    savings_sd: 5_000.0,
};

pub fn amplify_edge_cases(
    households: &[Household],
    factor: f64,
    seed: u64,
) -> Result<Vec<Household>> {
    if !factor.is_finite() || factor < 0.0 {
        return Err(SimError::parameter("amplification_factor", "must be >= 0"));
    }

    let mut out = households.to_vec();
    let n_synthetic = (households.len() as f64 * factor) as usize;
    if n_synthetic == 0 {
        return Ok(out);
    }

    let scores: Vec<f64> = households.iter().map(financial_risk_score).collect();
    let mut sorted = scores.clone();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let high_cut = percentile(&sorted, 90.0);
    let low_cut = percentile(&sorted, 10.0);

    let high_risk = select(households, &scores, |s| s >= high_cut);
    let low_risk = select(households, &scores, |s| s <= low_cut);

    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let n_high = n_synthetic / 2;
    let plan = [
        (&high_risk, n_high, &HIGH_RISK_NOISE),
        (&low_risk, n_synthetic - n_high, &LOW_RISK_NOISE),
    ];

    let mut next_id = 1;
    for (pool, count, noise) in plan {
        if pool.is_empty() {
            continue;
        }
        for _ in 0..count {
            let base = pool[rng.random_range(0..pool.len())];
            out.push(perturb(base, next_id, noise, &mut rng)?);
            next_id += 1;
        }
    }

    Ok(out)
}

fn select<'a>(
    households: &'a [Household],
    scores: &[f64],
    keep: impl Fn(f64) -> bool,
) -> Vec<&'a Household> {
    households
        .iter()
        .zip(scores)
        .filter(|&(_, &s)| keep(s))
        .map(|(h, _)| h)
        .collect()
}

fn jitter(sd: f64, rng: &mut ChaCha8Rng) -> Result<f64> {
    Ok(Normal::new(0.0, sd)
        .map_err(|e| distribution_error("amplification_noise", e))?
        .sample(rng))
}

fn perturb(base: &Household, id: usize, noise: &Noise, rng: &mut ChaCha8Rng) -> Result<Household> {
    let income = (base.annual_income + jitter(noise.income_sd, rng)?).max(1_000.0);
    let monthly_debt = (base.monthly_debt + jitter(noise.debt_payment_sd, rng)?).max(0.0);
    let credit = (base.credit_score + rng.random_range(noise.credit.0..noise.credit.1) as f64)
        .clamp(MIN_GENERATED_CREDIT, MAX_CREDIT_SCORE);
    let savings = (base.savings + jitter(noise.savings_sd, rng)?).max(0.0);

    Ok(Household {
        household_id: format!("SYN{id:06}"),
        annual_income: income.round(),
        savings: savings.round(),
        credit_score: credit,
        monthly_debt: monthly_debt.round(),
        ..base.clone()
    })
}

pub fn sample_households(records: &[HouseholdRecord], n: usize, seed: u64) -> Vec<HouseholdRecord> {
    if n >= records.len() {
        return records.to_vec();
    }
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut picked = index::sample(&mut rng, records.len(), n).into_vec();
    picked.sort_unstable();
    picked.into_iter().map(|i| records[i].clone()).collect()
}
