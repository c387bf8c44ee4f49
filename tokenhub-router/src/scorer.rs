//! C5 — deterministic scoring of eligible models, used only when the Bandit
//! is not engaged.
//!
//! A small, explicit, mode-keyed constant table drives weight/latency/cost
//! weighting per [`Mode`], rather than a generic routing-strategy enum.

use crate::models::{Mode, Model};

#[derive(Debug, Clone, Copy)]
struct Weights {
    cost: f64,
    latency: f64,
    quality: f64,
}

fn weights_for(mode: Mode) -> Weights {
    match mode {
        Mode::Cheap => Weights {
            cost: 0.7,
            latency: 0.15,
            quality: 0.15,
        },
        Mode::HighConfidence => Weights {
            cost: 0.1,
            latency: 0.1,
            // Inverted: high_confidence rewards higher quality most heavily.
            quality: 0.8,
        },
        Mode::Normal | Mode::Planning | Mode::Adversarial | Mode::Thompson => Weights {
            cost: 0.34,
            latency: 0.33,
            quality: 0.33,
        },
    }
}

/// Lower is better. `latency_ms` is the HealthTracker's smoothed average for
/// the model's provider; `latency_budget_ms` clamps the normalized value.
pub fn score(
    model: &Model,
    estimated_input_tokens: u64,
    estimated_output_tokens: u64,
    latency_ms: f64,
    latency_budget_ms: Option<u64>,
    mode: Mode,
) -> f64 {
    let weights = weights_for(mode);

    let cost = model.estimated_cost_usd(estimated_input_tokens, estimated_output_tokens);
    let cost_norm = cost.clamp(0.0, 1.0);

    let budget = latency_budget_ms.unwrap_or(10_000).max(1) as f64;
    let latency_norm = (latency_ms / budget).clamp(0.0, 1.0);

    let quality_norm = (1.0 - model.weight as f64 / 10.0).clamp(-1.0, 1.0);

    cost_norm * weights.cost + latency_norm * weights.latency + quality_norm * weights.quality
}

/// Orders `models` ascending by score; ties break by descending weight, then
/// ascending id.
pub fn order_candidates(
    models: &[Model],
    estimated_input_tokens: u64,
    estimated_output_tokens: u64,
    latencies_ms: impl Fn(&str) -> f64,
    latency_budget_ms: Option<u64>,
    mode: Mode,
) -> Vec<Model> {
    let mut scored: Vec<(Model, f64)> = models
        .iter()
        .map(|m| {
            let latency = latencies_ms(&m.provider_id);
            let s = score(
                m,
                estimated_input_tokens,
                estimated_output_tokens,
                latency,
                latency_budget_ms,
                mode,
            );
            (m.clone(), s)
        })
        .collect();

    scored.sort_by(|(model_a, score_a), (model_b, score_b)| {
        score_a
            .partial_cmp(score_b)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| model_b.weight.cmp(&model_a.weight))
            .then_with(|| model_a.id.cmp(&model_b.id))
    });

    scored.into_iter().map(|(m, _)| m).collect()
}
