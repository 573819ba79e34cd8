use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal, Triangular};

use super::error::{Result, SimError};
use super::types::{DistributionSummary, MonthsSummary, Scenario, SeedPolicy};

pub const SEED_STRIDE: u64 = 1_000;

const INCOME_STREAM: u64 = 0x1;
const MARKET_STREAM: u64 = 0x2;

// Random streams owned by one simulated path. Income draws come from their
// own stream so that, under a shared seed, every scenario of a household
// sees the same income trajectory for the same path index.
pub struct PathStreams {
    pub income: ChaCha8Rng,
    pub market: ChaCha8Rng,
}

impl PathStreams {
    pub fn new(stream_seed: u64, path_id: u32) -> Self {
        Self {
            income: ChaCha8Rng::seed_from_u64(derive_seed(stream_seed, path_id, INCOME_STREAM)),
            market: ChaCha8Rng::seed_from_u64(derive_seed(stream_seed, path_id, MARKET_STREAM)),
        }
    }
}

// `base + household_index * SEED_STRIDE (+ scenario_index)`, so every
// household and scenario owns a stream independent of execution order.
pub fn household_seed(
    base_seed: u64,
    household_index: u64,
    scenario: Scenario,
    policy: SeedPolicy,
) -> u64 {
    let seed = base_seed.wrapping_add(household_index.wrapping_mul(SEED_STRIDE));
    match policy {
        SeedPolicy::Shared => seed,
        SeedPolicy::Independent => seed.wrapping_add(scenario.index()),
    }
}

fn derive_seed(stream_seed: u64, path_id: u32, stream: u64) -> u64 {
    let mixed = splitmix64(stream_seed) ^ ((path_id as u64) << 8) ^ stream;
    splitmix64(mixed)
}

fn splitmix64(mut x: u64) -> u64 {
    x = x.wrapping_add(0x9E3779B97F4A7C15);
    let mut z = x;
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58476D1CE4E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D049BB133111EB);
    z ^ (z >> 31)
}

pub(crate) fn normal(name: &'static str, mean: f64, std_dev: f64) -> Result<Normal<f64>> {
    Normal::new(mean, std_dev).map_err(|e| SimError::parameter(name, e.to_string()))
}

pub(crate) fn triangular(
    name: &'static str,
    min: f64,
    mode: f64,
    max: f64,
) -> Result<Triangular<f64>> {
    Triangular::new(min, max, mode).map_err(|e| SimError::parameter(name, e.to_string()))
}

// One year's multiplicative growth factor; the rate is bounded so a tail
// draw can never flip the sign of income, rent or home value.
pub(crate) fn growth_factor<D: Distribution<f64>>(dist: &D, rng: &mut ChaCha8Rng) -> f64 {
    1.0 + dist.sample(rng).clamp(-0.95, 2.5)
}

pub fn percentile(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }

    let n = sorted.len();
    if n == 1 {
        return sorted[0];
    }

    let rank = (p / 100.0) * (n as f64 - 1.0);
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;

    if lower == upper {
        sorted[lower]
    } else {
        let w = rank - lower as f64;
        sorted[lower] * (1.0 - w) + sorted[upper] * w
    }
}

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

pub fn summarize(values: &[f64]) -> DistributionSummary {
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    DistributionSummary {
        mean: mean(&sorted),
        median: percentile(&sorted, 50.0),
        p5: percentile(&sorted, 5.0),
        p25: percentile(&sorted, 25.0),
        p75: percentile(&sorted, 75.0),
        p95: percentile(&sorted, 95.0),
    }
}

pub fn summarize_months(months: &[u32]) -> MonthsSummary {
    let mut sorted = months.iter().map(|&m| m as f64).collect::<Vec<_>>();
    sorted.sort_by(|a, b| a.total_cmp(b));
    MonthsSummary {
        mean: mean(&sorted),
        median: percentile(&sorted, 50.0),
    }
}
