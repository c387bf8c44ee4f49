//! C4 — contextual Thompson sampler over (model, token_bucket) arms.
//!
//! No `rand_distr`/`statrs` dependency is carried for this, so the
//! Marsaglia–Tsang (shape >= 1) / Boost-trick (shape < 1) Beta/Gamma
//! sampling algorithm is implemented directly against `rand::Rng`.

use crate::models::{BanditArm, TokenBucket};
use rand::Rng;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::RwLock;

pub type ArmKey = (String, TokenBucket);

/// One aggregated reward row fed into a refresh cycle.
pub struct RewardSummaryRow {
    pub model_id: String,
    pub token_bucket: TokenBucket,
    pub count: f64,
    pub sum_reward: f64,
}

/// A function that fetches aggregated reward history for the refresh loop.
pub type FetchRewardSummary =
    std::sync::Arc<dyn Fn() -> Vec<RewardSummaryRow> + Send + Sync>;

/// Contextual Thompson sampler. Arms are lazily created at (1, 1) and
/// mutated only by `refresh`, which performs an atomic per-arm swap under
/// the writer lock — sampling never waits on a refresh in progress.
pub struct Bandit {
    arms: RwLock<HashMap<ArmKey, BanditArm>>,
}

impl Default for Bandit {
    fn default() -> Self {
        Self::new()
    }
}

impl Bandit {
    pub fn new() -> Self {
        Self {
            arms: RwLock::new(HashMap::new()),
        }
    }

    pub async fn arm(&self, model_id: &str, bucket: TokenBucket) -> BanditArm {
        self.arms
            .read()
            .await
            .get(&(model_id.to_string(), bucket))
            .copied()
            .unwrap_or_default()
    }

    /// Orders `candidates` descending by one Thompson draw per model.
    pub async fn sample<R: Rng>(
        &self,
        rng: &mut R,
        candidates: &[String],
        bucket: TokenBucket,
    ) -> Vec<String> {
        let arms = self.arms.read().await;
        let mut scored: Vec<(String, f64)> = candidates
            .iter()
            .map(|model_id| {
                let arm = arms
                    .get(&(model_id.clone(), bucket))
                    .copied()
                    .unwrap_or_default();
                let draw = sample_beta(rng, arm.alpha, arm.beta);
                (model_id.clone(), draw)
            })
            .collect();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.into_iter().map(|(id, _)| id).collect()
    }

    /// Replaces every observed arm's parameters from `rows`; arms absent
    /// from `rows` keep their current value (or the (1,1) prior if unseen).
    pub async fn refresh(&self, rows: Vec<RewardSummaryRow>) {
        let mut arms = self.arms.write().await;
        for row in rows {
            let alpha = row.sum_reward + 1.0;
            let beta = (row.count - row.sum_reward).max(0.0) + 1.0;
            arms.insert((row.model_id, row.token_bucket), BanditArm { alpha, beta });
        }
    }
}

/// Runs `bandit.refresh` every `interval`, fetching rows via `fetch`. Never
/// blocks the sampling path: the swap inside `refresh` holds the writer
/// lock only for the duration of the `HashMap` insert loop.
pub async fn refresh_loop(
    bandit: std::sync::Arc<Bandit>,
    fetch: FetchRewardSummary,
    interval: Duration,
    mut stop: tokio::sync::oneshot::Receiver<()>,
) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let rows = fetch();
                bandit.refresh(rows).await;
            }
            _ = &mut stop => break,
        }
    }
}

/// Coerces non-positive Beta/Gamma parameters to 1 so sampling never sees a
/// degenerate shape.
fn coerce(param: f64) -> f64 {
    if param > 0.0 {
        param
    } else {
        1.0
    }
}

/// Draws one `Beta(alpha, beta)` sample as `x / (x + y)` for independent
/// `Gamma(alpha, 1)` and `Gamma(beta, 1)` draws.
pub fn sample_beta<R: Rng>(rng: &mut R, alpha: f64, beta: f64) -> f64 {
    let x = sample_gamma(rng, coerce(alpha));
    let y = sample_gamma(rng, coerce(beta));
    if x + y == 0.0 {
        0.5
    } else {
        x / (x + y)
    }
}

/// Draws one `Gamma(shape, 1)` sample: Marsaglia–Tsang for `shape >= 1`, the
/// boost trick (`Gamma(shape + 1) * U^(1 / shape)`) for `0 < shape < 1`.
fn sample_gamma<R: Rng>(rng: &mut R, shape: f64) -> f64 {
    if shape < 1.0 {
        let u: f64 = rng.gen_range(0.0..1.0);
        let boosted = sample_gamma_ge_one(rng, shape + 1.0);
        boosted * u.powf(1.0 / shape)
    } else {
        sample_gamma_ge_one(rng, shape)
    }
}

fn sample_gamma_ge_one<R: Rng>(rng: &mut R, shape: f64) -> f64 {
    let d = shape - 1.0 / 3.0;
    let c = 1.0 / (9.0 * d).sqrt();
    loop {
        let (x, v) = loop {
            let x = sample_standard_normal(rng);
            let v = 1.0 + c * x;
            if v > 0.0 {
                break (x, v * v * v);
            }
        };
        let u: f64 = rng.gen_range(0.0..1.0);
        if u < 1.0 - 0.0331 * x.powi(4) {
            return d * v;
        }
        if u.ln() < 0.5 * x * x + d * (1.0 - v + v.ln()) {
            return d * v;
        }
    }
}

/// Box–Muller standard normal draw.
fn sample_standard_normal<R: Rng>(rng: &mut R) -> f64 {
    let u1: f64 = rng.gen_range(f64::EPSILON..1.0);
    let u2: f64 = rng.gen_range(0.0..1.0);
    (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn beta_10_1_has_high_empirical_mean() {
        let mut rng = rand::rngs::StdRng::seed_from_u64(42);
        let samples: Vec<f64> = (0..5000).map(|_| sample_beta(&mut rng, 10.0, 1.0)).collect();
        let mean: f64 = samples.iter().sum::<f64>() / samples.len() as f64;
        assert!(mean > 0.8, "mean was {mean}");
    }

    #[test]
    fn beta_1_10_has_low_empirical_mean() {
        let mut rng = rand::rngs::StdRng::seed_from_u64(7);
        let samples: Vec<f64> = (0..5000).map(|_| sample_beta(&mut rng, 1.0, 10.0)).collect();
        let mean: f64 = samples.iter().sum::<f64>() / samples.len() as f64;
        assert!(mean < 0.2, "mean was {mean}");
    }

    #[test]
    fn non_positive_params_are_coerced_to_one() {
        assert_eq!(coerce(0.0), 1.0);
        assert_eq!(coerce(-5.0), 1.0);
        assert_eq!(coerce(3.0), 3.0);
    }

    #[tokio::test]
    async fn unseen_arms_default_to_uniform_prior() {
        let bandit = Bandit::new();
        let arm = bandit.arm("m1", TokenBucket::Small).await;
        assert_eq!(arm.alpha, 1.0);
        assert_eq!(arm.beta, 1.0);
    }

    #[tokio::test]
    async fn refresh_updates_alpha_and_beta_with_floor_of_one() {
        let bandit = Bandit::new();
        bandit
            .refresh(vec![RewardSummaryRow {
                model_id: "m1".to_string(),
                token_bucket: TokenBucket::Small,
                count: 10.0,
                sum_reward: 7.0,
            }])
            .await;
        let arm = bandit.arm("m1", TokenBucket::Small).await;
        assert_eq!(arm.alpha, 8.0);
        assert_eq!(arm.beta, 4.0);
        assert!(arm.alpha >= 1.0 && arm.beta >= 1.0);
    }
}
