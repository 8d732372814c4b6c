//! Benchmarks for zero-shot scoring.
//!
//! Run with: cargo bench -p convirt-core

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use convirt_core::math::l2_normalize_rows;
use convirt_core::prompts::{generate_template_prompts, PromptDomain};
use convirt_core::Reduction;
use ndarray::Array2;
use rand::rngs::StdRng;
use rand::SeedableRng;

/// Deterministic `[rows, cols]` matrix with values spread over [-1, 1].
fn matrix(rows: usize, cols: usize, salt: usize) -> Array2<f32> {
    Array2::from_shape_fn((rows, cols), |(i, j)| {
        (((i * 31 + j * 17 + salt) % 97) as f32 / 48.5) - 1.0
    })
}

fn benchmark_logits(c: &mut Criterion) {
    // One full batch against one class of prompts, 512-dim projections
    let images = l2_normalize_rows(matrix(128, 512, 1).view());
    let texts = l2_normalize_rows(matrix(10, 512, 2).view());

    c.bench_function("logits_128x10x512", |b| {
        b.iter(|| black_box(&images).dot(&black_box(&texts).t()) / 0.1)
    });
}

fn benchmark_reduction(c: &mut Criterion) {
    let logits = matrix(128, 50, 3);

    c.bench_function("reduce_mean_128x50", |b| {
        b.iter(|| Reduction::Mean.reduce(black_box(logits.view())))
    });
    c.bench_function("reduce_max_128x50", |b| {
        b.iter(|| Reduction::Max.reduce(black_box(logits.view())))
    });
}

fn benchmark_prompt_sampling(c: &mut Criterion) {
    let mut rng = StdRng::seed_from_u64(42);

    c.bench_function("sample_chexpert_prompts", |b| {
        b.iter(|| generate_template_prompts(PromptDomain::Chexpert.templates(), Some(10), &mut rng))
    });
}

criterion_group!(
    benches,
    benchmark_logits,
    benchmark_reduction,
    benchmark_prompt_sampling
);
criterion_main!(benches);
