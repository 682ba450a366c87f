use std::time::Duration;

use crate::classifier::RankedResult;
use crate::config::GameConfig;

/// Easy-mode rejection parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DifficultyAdjuster {
    pub reject_time_delay: Duration,
    pub reject_time_per_label: Duration,
    pub start_reject_threshold: f32,
}

impl From<&GameConfig> for DifficultyAdjuster {
    fn from(cfg: &GameConfig) -> Self {
        Self {
            reject_time_delay: Duration::from_millis(cfg.reject_time_delay_ms),
            reject_time_per_label: Duration::from_millis(cfg.reject_time_per_label_ms.max(1)),
            start_reject_threshold: cfg.start_reject_threshold,
        }
    }
}

impl DifficultyAdjuster {
    /// Suppress confident non-target guesses more and more as drawing time
    /// goes on, then renormalize. The target's own score is never touched.
    pub fn adjust(&self, ranked: &RankedResult, drawing_time: Duration, target: &str) -> RankedResult {
        let mut adjusted = ranked.clone();

        let confident = adjusted
            .top()
            .is_some_and(|top| top.score > self.start_reject_threshold);

        if drawing_time > self.reject_time_delay && confident {
            let amount = (drawing_time - self.reject_time_delay).as_secs_f64()
                / self.reject_time_per_label.as_secs_f64();

            for (i, entry) in adjusted.entries_mut().iter_mut().enumerate() {
                let rank = i as f64;
                if rank >= amount + 1.0 {
                    break;
                }
                if entry.label == target {
                    continue;
                }
                if amount > rank {
                    entry.score = 0.0;
                } else {
                    entry.score *= (rank - amount).clamp(0.0, 1.0) as f32;
                }
            }
        }

        adjusted.sort();
        adjusted.normalize();
        adjusted
    }
}
