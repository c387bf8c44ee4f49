use criterion::{black_box, criterion_group, criterion_main, Criterion};
use tokenhub_router::bandit::sample_beta;
use tokenhub_router::models::TokenBucket;

fn bench_beta_sampling(c: &mut Criterion) {
    let mut rng = rand::thread_rng();
    c.bench_function("sample_beta_uniform_prior", |b| {
        b.iter(|| black_box(sample_beta(&mut rng, 1.0, 1.0)));
    });
    c.bench_function("sample_beta_skewed", |b| {
        b.iter(|| black_box(sample_beta(&mut rng, 20.0, 3.0)));
    });
}

fn bench_bandit_sample_ordering(c: &mut Criterion) {
    use tokenhub_router::bandit::Bandit;

    let rt = tokio::runtime::Runtime::new().unwrap();
    let bandit = rt.block_on(async {
        let bandit = Bandit::new();
        bandit
            .refresh(vec![
                tokenhub_router::bandit::RewardSummaryRow {
                    model_id: "m1".to_string(),
                    token_bucket: TokenBucket::Small,
                    count: 100.0,
                    sum_reward: 80.0,
                },
                tokenhub_router::bandit::RewardSummaryRow {
                    model_id: "m2".to_string(),
                    token_bucket: TokenBucket::Small,
                    count: 100.0,
                    sum_reward: 20.0,
                },
            ])
            .await;
        bandit
    });

    let candidates = vec!["m1".to_string(), "m2".to_string(), "m3".to_string()];
    let mut rng = rand::thread_rng();
    c.bench_function("bandit_sample_three_arms", |b| {
        b.iter(|| {
            rt.block_on(bandit.sample(&mut rng, black_box(&candidates), TokenBucket::Small))
        });
    });
}

criterion_group!(benches, bench_beta_sampling, bench_bandit_sample_ordering);
criterion_main!(benches);
