use std::time::Duration;

use crate::classifier::RankedResult;
use crate::ledger::RoundLedger;

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display)]
pub enum GameState {
    Menu,
    Loading,
    Countdown,
    Playing,
    End,
}

/// Which target of which target sequence a classification was asked for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RoundId {
    pub generation: u64,
    pub target_index: usize,
}

#[derive(Debug, Clone)]
pub struct GameSession {
    pub state: GameState,
    pub countdown_remaining: u32,
    pub target_sequence: Vec<String>,
    pub target_index: usize,
    /// Bumped every time a new target sequence is drawn up
    pub generation: u64,
    pub round_started_at: Option<Duration>,
    /// How far skip penalties have pulled the effective start back
    pub round_start_shift: Duration,
    pub round_now: Option<Duration>,
    /// Sampling time during which the sketch was changing, this round
    pub drawing_time: Duration,
    pub last_guess: Option<RankedResult>,
    pub predictions: RoundLedger,
}

impl GameSession {
    pub fn new(countdown_secs: u32) -> Self {
        Self {
            state: GameState::Menu,
            countdown_remaining: countdown_secs,
            target_sequence: Vec::new(),
            target_index: 0,
            generation: 0,
            round_started_at: None,
            round_start_shift: Duration::ZERO,
            round_now: None,
            drawing_time: Duration::ZERO,
            last_guess: None,
            predictions: RoundLedger::new(),
        }
    }

    pub fn round_id(&self) -> RoundId {
        RoundId {
            generation: self.generation,
            target_index: self.target_index,
        }
    }

    pub fn current_target(&self) -> Option<&str> {
        self.target_sequence
            .get(self.target_index)
            .map(String::as_str)
    }

    /// Time since the (penalty-adjusted) start of play
    pub fn elapsed(&self, now: Duration) -> Option<Duration> {
        let started = self.round_started_at?;
        Some(now.saturating_sub(started) + self.round_start_shift)
    }
}
