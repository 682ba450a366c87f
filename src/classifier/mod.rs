//! Boundary with the sketch classifier.
//!
//! The classifier is a black box that runs off the game thread. Requests go
//! out through [`ClassificationService`]; answers come back later as
//! [`ServiceEvent`]s that the session controller polls for.

pub mod scripted;
pub mod worker;

use itertools::Itertools;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::ModelConfig;
use crate::labels::is_banned;
use crate::raster::Bitmap;
use crate::session::RoundId;

pub use scripted::ScriptedClassifier;
pub use worker::WorkerClassifier;

#[derive(Debug, Error)]
pub enum ClassifierError {
    #[error("failed to start classifier worker: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("classifier worker is gone")]
    Disconnected,
    #[error("failed to talk to classifier worker: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to encode classifier request: {0}")]
    Encode(#[from] serde_json::Error),
}

/// One `(label, score)` pair as reported by the classifier
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub label: String,
    pub score: f32,
}

impl Prediction {
    pub fn new(label: impl Into<String>, score: f32) -> Self {
        Self {
            label: label.into(),
            score,
        }
    }
}

/// Classifier output with banned labels removed, one entry per label,
/// best guess first
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RankedResult {
    entries: Vec<Prediction>,
}

impl RankedResult {
    pub fn from_predictions(predictions: Vec<Prediction>, banned: &[String]) -> Self {
        let entries = predictions
            .into_iter()
            .filter(|p| !is_banned(&p.label, banned))
            .unique_by(|p| p.label.clone())
            .map(|mut p| {
                if !p.score.is_finite() || p.score < 0.0 {
                    p.score = 0.0;
                }
                p
            })
            .collect();

        let mut ranked = Self { entries };
        ranked.sort();
        ranked
    }

    pub fn entries(&self) -> &[Prediction] {
        &self.entries
    }

    pub fn entries_mut(&mut self) -> &mut [Prediction] {
        &mut self.entries
    }

    pub fn top(&self) -> Option<&Prediction> {
        self.entries.first()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn total(&self) -> f32 {
        self.entries.iter().map(|p| p.score).sum()
    }

    /// Stable descending sort by score
    pub fn sort(&mut self) {
        self.entries.sort_by(|a, b| b.score.total_cmp(&a.score));
    }

    /// Scale scores to sum to one. A zero total is left alone.
    pub fn normalize(&mut self) {
        let total = self.total();
        if total > 0.0 {
            for p in &mut self.entries {
                p.score /= total;
            }
        }
    }
}

/// Identifies a dispatched request and the round it was asked for
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RequestTicket {
    pub seq: u64,
    pub round: RoundId,
}

/// Everything the classifier can say back
#[derive(Clone, Debug, PartialEq)]
pub enum ServiceEvent {
    Ready,
    LoadFailed(String),
    Classified {
        ticket: RequestTicket,
        outcome: Result<Vec<Prediction>, String>,
    },
}

/// Owned handle on an asynchronous classifier. Calls only enqueue work;
/// replies arrive through [`ClassificationService::poll`].
pub trait ClassificationService {
    fn load(&mut self) -> Result<(), ClassifierError>;
    fn classify(&mut self, ticket: RequestTicket, bitmap: Bitmap) -> Result<(), ClassifierError>;
    /// Next pending reply, without blocking.
    fn poll(&mut self) -> Option<ServiceEvent>;
    /// Drop the current model and prepare `model` instead. Readiness is
    /// signalled again through `poll`.
    fn reload(&mut self, model: &ModelConfig) -> Result<(), ClassifierError>;
}
