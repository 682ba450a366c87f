use std::time::Duration;

use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{debug, info, warn};

use crate::classifier::{ClassificationService, RankedResult, ServiceEvent};
use crate::clock::{Clock, Timer};
use crate::config::{GameConfig, ModelConfig};
use crate::difficulty::DifficultyAdjuster;
use crate::labels::LabelSet;
use crate::ledger::PredictionRecord;
use crate::scheduler::{ClassificationScheduler, Resolution, Sample};
use crate::session::{GameSession, GameState};
use crate::sketch::Sketch;
use crate::util::shuffle;

const COUNTDOWN_PERIOD: Duration = Duration::from_secs(1);

/// Things worth telling the front-end about
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    StateChanged { from: GameState, to: GameState },
    CountdownTick(u32),
    RoundWon { target: String },
    RoundSkipped { target: String },
    TimedOut,
    LoadFailed(String),
    ClassifierError(String),
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Finish {
    Timeout,
    OutOfTargets,
    Exit,
}

/// Owns the game session and is the only thing that changes it
pub struct SessionController<S: Sketch, C: ClassificationService, K: Clock> {
    config: GameConfig,
    labels: Vec<String>,
    session: GameSession,
    sketch: S,
    service: C,
    clock: K,
    scheduler: ClassificationScheduler,
    difficulty: DifficultyAdjuster,
    countdown: Option<Timer>,
    rng: StdRng,
    classifier_ready: bool,
    events: Vec<SessionEvent>,
}

impl<S: Sketch, C: ClassificationService, K: Clock> SessionController<S, C, K> {
    pub fn new(config: GameConfig, labels: &LabelSet, sketch: S, service: C, clock: K) -> Self {
        let scheduler =
            ClassificationScheduler::new(config.sampling_interval(), config.banned_labels.clone());
        Self {
            labels: labels.playable(&config.banned_labels),
            session: GameSession::new(config.countdown_secs),
            difficulty: DifficultyAdjuster::from(&config),
            scheduler,
            config,
            sketch,
            service,
            clock,
            countdown: None,
            rng: StdRng::from_entropy(),
            classifier_ready: false,
            events: Vec::new(),
        }
    }

    /// Fix the target shuffling so sessions can be replayed
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    pub fn session(&self) -> &GameSession {
        &self.session
    }

    pub fn state(&self) -> GameState {
        self.session.state
    }

    pub fn config(&self) -> &GameConfig {
        &self.config
    }

    pub fn sketch(&self) -> &S {
        &self.sketch
    }

    pub fn sketch_mut(&mut self) -> &mut S {
        &mut self.sketch
    }

    pub fn service(&self) -> &C {
        &self.service
    }

    pub fn service_mut(&mut self) -> &mut C {
        &mut self.service
    }

    pub fn scheduler(&self) -> &ClassificationScheduler {
        &self.scheduler
    }

    pub fn now(&self) -> Duration {
        self.clock.now()
    }

    pub fn is_classifier_ready(&self) -> bool {
        self.classifier_ready
    }

    pub fn current_target(&self) -> Option<&str> {
        self.session.current_target()
    }

    pub fn last_guess(&self) -> Option<&RankedResult> {
        self.session.last_guess.as_ref()
    }

    /// Time left on the session clock, while playing
    pub fn remaining(&self, now: Duration) -> Option<Duration> {
        let elapsed = self.session.elapsed(now)?;
        Some(self.config.game_duration().saturating_sub(elapsed))
    }

    pub fn drain_events(&mut self) -> Vec<SessionEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn request_start(&mut self) {
        match self.session.state {
            GameState::Menu | GameState::Countdown => self.start_or_load(),
            state => debug!(%state, "start ignored"),
        }
    }

    pub fn request_skip(&mut self) {
        if self.session.state != GameState::Playing {
            return;
        }
        let Some(target) = self.current_target().map(str::to_owned) else {
            return;
        };

        self.session.round_start_shift += self.config.skip_penalty();
        self.session.predictions.append(PredictionRecord {
            snapshot: self.sketch.snapshot(),
            guessed: None,
            target: target.clone(),
            correct: false,
        });
        info!(%target, "round skipped");
        self.events.push(SessionEvent::RoundSkipped { target });
        self.advance_round();
    }

    pub fn request_exit(&mut self) {
        match self.session.state {
            GameState::Countdown | GameState::Playing => self.finish(Finish::Exit),
            GameState::Loading | GameState::End => self.transition(GameState::Menu),
            GameState::Menu => {}
        }
    }

    /// Wipe the drawing without ending the round
    pub fn request_clear(&mut self) {
        self.sketch.clear();
        self.scheduler.reset_round();
    }

    /// Leave the game-over screen, either straight into a new countdown or
    /// back to the menu
    pub fn on_replay(&mut self, play_again: bool) {
        if self.session.state != GameState::End {
            return;
        }
        if play_again {
            self.start_or_load();
        } else {
            self.transition(GameState::Menu);
        }
    }

    pub fn reload_classifier(&mut self, model: &ModelConfig) {
        self.config.model = model.clone();
        self.classifier_ready = false;
        if let Err(err) = self.service.reload(model) {
            warn!(%err, "classifier reload failed");
            self.events
                .push(SessionEvent::ClassifierError(err.to_string()));
        }
    }

    pub fn on_service_event(&mut self, event: ServiceEvent) {
        match event {
            ServiceEvent::Ready => {
                info!("classifier ready");
                self.classifier_ready = true;
                if self.session.state == GameState::Loading {
                    self.begin_countdown();
                }
            }
            ServiceEvent::LoadFailed(message) => {
                warn!(%message, "classifier failed to load");
                self.classifier_ready = false;
                self.events.push(SessionEvent::LoadFailed(message));
                if self.session.state == GameState::Loading {
                    self.transition(GameState::Menu);
                }
            }
            ServiceEvent::Classified { ticket, outcome } => {
                let current = (self.session.state == GameState::Playing)
                    .then(|| self.session.round_id());
                match self.scheduler.resolve(ticket, outcome, current) {
                    Resolution::Accepted(ranked) => self.on_classification_result(ranked),
                    Resolution::Failed(message) => {
                        warn!(%message, "classification failed");
                        self.events.push(SessionEvent::ClassifierError(message));
                    }
                    Resolution::Stale | Resolution::Unknown => {}
                }
            }
        }
    }

    /// Apply a result for the current round: adjust for difficulty, then
    /// advance if the best guess is the target.
    pub fn on_classification_result(&mut self, result: RankedResult) {
        if self.session.state != GameState::Playing {
            return;
        }
        let Some(target) = self.current_target().map(str::to_owned) else {
            return;
        };

        let adjusted = self
            .difficulty
            .adjust(&result, self.session.drawing_time, &target);
        // an all-zero result is no guess at all
        let matched = adjusted
            .top()
            .is_some_and(|top| top.score > 0.0 && top.label == target);
        self.session.last_guess = Some(adjusted);

        if matched {
            self.session.predictions.append(PredictionRecord {
                snapshot: self.sketch.snapshot(),
                guessed: Some(target.clone()),
                target: target.clone(),
                correct: true,
            });
            info!(%target, "round won");
            self.events.push(SessionEvent::RoundWon { target });
            self.advance_round();
        }
    }

    pub fn on_tick(&mut self, now: Duration) {
        // the deadline is settled before any queued answer can score
        if self.session.state == GameState::Playing && self.timed_out(now) {
            self.finish(Finish::Timeout);
        }

        while let Some(event) = self.service.poll() {
            self.on_service_event(event);
        }

        match self.session.state {
            GameState::Countdown => self.countdown_tick(now),
            GameState::Playing => self.playing_tick(now),
            _ => {}
        }
    }

    fn countdown_tick(&mut self, now: Duration) {
        let Some(timer) = self.countdown.as_mut() else {
            return;
        };
        while self.session.countdown_remaining > 0 && timer.poll_once(now) {
            self.session.countdown_remaining -= 1;
            self.events
                .push(SessionEvent::CountdownTick(self.session.countdown_remaining));
        }
        if self.session.countdown_remaining == 0 {
            self.start_playing(now);
        }
    }

    fn timed_out(&self, now: Duration) -> bool {
        self.session
            .elapsed(now)
            .is_some_and(|elapsed| elapsed >= self.config.game_duration())
    }

    fn playing_tick(&mut self, now: Duration) {
        self.session.round_now = Some(now);

        if self.timed_out(now) {
            self.finish(Finish::Timeout);
            return;
        }

        let sample = self.scheduler.tick(
            now,
            self.session.round_id(),
            &mut self.sketch,
            &mut self.service,
        );
        if sample.saw_change() {
            self.session.drawing_time += self.scheduler.interval();
        }
        if let Sample::Failed(err) = sample {
            self.events
                .push(SessionEvent::ClassifierError(err.to_string()));
        }
    }

    fn start_or_load(&mut self) {
        if self.classifier_ready {
            self.begin_countdown();
            return;
        }

        self.transition(GameState::Loading);
        if let Err(err) = self.service.load() {
            warn!(%err, "could not ask classifier to load");
            self.events.push(SessionEvent::LoadFailed(err.to_string()));
            self.transition(GameState::Menu);
        }
    }

    fn begin_countdown(&mut self) {
        let mut targets = self.labels.clone();
        shuffle(&mut targets, &mut self.rng);
        self.session.target_sequence = targets;
        self.session.target_index = 0;
        self.session.generation += 1;

        self.scheduler.disarm();
        self.session.countdown_remaining = self.config.countdown_secs;
        let now = self.clock.now();
        self.countdown = Some(Timer::arm(now, COUNTDOWN_PERIOD));
        self.transition(GameState::Countdown);

        if self.session.countdown_remaining == 0 {
            self.start_playing(now);
        }
    }

    fn start_playing(&mut self, now: Duration) {
        self.countdown = None;
        self.session.predictions.clear();
        self.session.round_started_at = Some(now);
        self.session.round_start_shift = Duration::ZERO;
        self.session.round_now = Some(now);
        self.session.drawing_time = Duration::ZERO;
        self.session.last_guess = None;
        self.sketch.clear();
        self.scheduler.reset_round();
        self.scheduler.arm(now);
        self.transition(GameState::Playing);
    }

    fn advance_round(&mut self) {
        self.session.target_index += 1;
        self.session.drawing_time = Duration::ZERO;
        self.session.last_guess = None;
        self.sketch.clear();
        self.scheduler.reset_round();

        if self.session.target_index >= self.session.target_sequence.len() {
            info!("every target has been played");
            self.finish(Finish::OutOfTargets);
        }
    }

    fn finish(&mut self, reason: Finish) {
        if reason == Finish::Timeout {
            if let Some(target) = self.current_target().map(str::to_owned) {
                let guessed = self
                    .session
                    .last_guess
                    .as_ref()
                    .and_then(|guess| guess.top())
                    .filter(|top| top.score > 0.0)
                    .map(|top| top.label.clone());
                self.session.predictions.append(PredictionRecord {
                    snapshot: self.sketch.snapshot(),
                    guessed,
                    target,
                    correct: false,
                });
            }
            self.events.push(SessionEvent::TimedOut);
        }

        self.sketch.clear();
        self.scheduler.disarm();
        self.countdown = None;
        self.session.countdown_remaining = self.config.countdown_secs;
        self.session.round_started_at = None;
        self.session.round_start_shift = Duration::ZERO;
        self.session.round_now = None;
        self.session.drawing_time = Duration::ZERO;
        self.session.last_guess = None;

        let destination = match reason {
            Finish::Exit => GameState::Menu,
            Finish::Timeout | Finish::OutOfTargets => GameState::End,
        };
        self.transition(destination);
    }

    fn transition(&mut self, to: GameState) {
        let from = self.session.state;
        if from == to {
            return;
        }
        info!(%from, %to, "session state change");
        self.session.state = to;
        self.events.push(SessionEvent::StateChanged { from, to });
    }
}
