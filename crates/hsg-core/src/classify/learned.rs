//! Per-tenant linear softmax classifier, SGD-trained over embedding
//! vectors. Consulted only when the rule-based pass returns the default
//! `semantic` classification.

use std::collections::HashMap;

use rand::Rng;
use serde::{Deserialize, Serialize};

use super::SectorClassification;
use crate::config::Sector;

/// A single `(vector, label)` training example.
#[derive(Debug, Clone)]
pub struct TrainingSample {
    pub vector: Vec<f32>,
    pub label: Sector,
}

/// A per-tenant linear classifier: one weight vector and bias per sector,
/// all sharing one embedding dimension.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifierModel {
    pub tenant: Option<String>,
    pub dim: usize,
    weights: HashMap<String, Vec<f32>>,
    biases: HashMap<String, f32>,
    pub version: u64,
    pub updated_at_ms: i64,
}

impl ClassifierModel {
    pub fn new(tenant: Option<String>, dim: usize, now_ms: i64) -> Self {
        Self {
            tenant,
            dim,
            weights: HashMap::new(),
            biases: HashMap::new(),
            version: 0,
            updated_at_ms: now_ms,
        }
    }

    fn ensure_sector(&mut self, sector: &str, rng: &mut impl Rng) {
        if !self.weights.contains_key(sector) {
            let w: Vec<f32> = (0..self.dim).map(|_| rng.gen_range(-0.005..0.005)).collect();
            self.weights.insert(sector.to_string(), w);
            self.biases.insert(sector.to_string(), 0.0);
        }
    }

    /// Reset the model to an empty state with a new dimension, discarding
    /// previously learned weights. Called on a dimension mismatch.
    pub fn reset(&mut self, dim: usize, now_ms: i64) {
        self.weights.clear();
        self.biases.clear();
        self.dim = dim;
        self.version += 1;
        self.updated_at_ms = now_ms;
    }

    fn scores(&self, vector: &[f32]) -> Vec<(String, f32)> {
        self.weights
            .iter()
            .map(|(sector, w)| {
                let bias = self.biases.get(sector).copied().unwrap_or(0.0);
                let dot: f32 = w.iter().zip(vector.iter()).map(|(a, b)| a * b).sum();
                (sector.clone(), bias + dot)
            })
            .collect()
    }

    fn softmax(scores: &[(String, f32)]) -> Vec<(String, f32)> {
        let max = scores
            .iter()
            .map(|(_, s)| *s)
            .fold(f32::NEG_INFINITY, f32::max);
        let exps: Vec<f32> = scores.iter().map(|(_, s)| (*s - max).exp()).collect();
        let sum: f32 = exps.iter().sum();
        scores
            .iter()
            .zip(exps.iter())
            .map(|((sector, _), e)| (sector.clone(), if sum > 0.0 { e / sum } else { 0.0 }))
            .collect()
    }

    /// Predict a sector classification from an embedding. Returns `None`
    /// if the model has no sectors trained yet.
    pub fn predict(&self, vector: &[f32]) -> Option<SectorClassification> {
        if self.weights.is_empty() || vector.len() != self.dim {
            return None;
        }
        let mut probs = Self::softmax(&self.scores(vector));
        probs.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

        let (primary_name, primary_prob) = probs[0].clone();
        let additional: Vec<Sector> = probs[1..]
            .iter()
            .filter(|(_, p)| *p >= 0.10 && *p >= 0.4 * primary_prob)
            .take(5)
            .map(|(name, _)| Sector::new(name.clone()))
            .collect();

        Some(SectorClassification {
            primary: Sector::new(primary_name),
            additional,
            confidence: primary_prob as f64,
        })
    }

    /// Train for `epochs` over `samples` using softmax cross-entropy SGD.
    /// Cooperatively yields every 50 samples via `yield_fn` (pass an
    /// async-runtime yield when training from an async context; a no-op
    /// closure is fine for synchronous tests).
    pub async fn train<F, Fut>(
        &mut self,
        samples: &[TrainingSample],
        epochs: usize,
        lr: f32,
        mut yield_fn: F,
    ) where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = ()>,
    {
        let mut rng = rand::thread_rng();

        for sample in samples {
            if sample.vector.len() != self.dim && !self.weights.is_empty() {
                tracing::warn!(
                    expected_dim = self.dim,
                    got_dim = sample.vector.len(),
                    "classifier dimension mismatch, resetting model"
                );
                self.reset(sample.vector.len(), 0);
            }
        }

        let mut n = 0usize;
        for _epoch in 0..epochs {
            for sample in samples {
                self.ensure_sector(sample.label.as_str(), &mut rng);
                for sector_name in sample_label_set(samples) {
                    self.ensure_sector(&sector_name, &mut rng);
                }

                let scores = self.scores(&sample.vector);
                let probs = Self::softmax(&scores);

                for (sector, p) in &probs {
                    let target = if sector == sample.label.as_str() { 1.0 } else { 0.0 };
                    let grad = lr * (target - p);
                    if let Some(w) = self.weights.get_mut(sector) {
                        for (wi, xi) in w.iter_mut().zip(sample.vector.iter()) {
                            *wi += grad * xi;
                        }
                    }
                    if let Some(b) = self.biases.get_mut(sector) {
                        *b += grad;
                    }
                }

                n += 1;
                if n % 50 == 0 {
                    yield_fn().await;
                }
            }
        }

        self.version += 1;
    }
}

fn sample_label_set(samples: &[TrainingSample]) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    samples
        .iter()
        .filter(|s| seen.insert(s.label.as_str().to_string()))
        .map(|s| s.label.as_str().to_string())
        .collect()
}
