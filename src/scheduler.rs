use std::time::Duration;

use tracing::{debug, warn};

use crate::classifier::{
    ClassificationService, ClassifierError, Prediction, RankedResult, RequestTicket,
};
use crate::clock::Timer;
use crate::session::RoundId;
use crate::sketch::Sketch;

/// What a call to [`ClassificationScheduler::tick`] did
#[derive(Debug)]
pub enum Sample {
    /// Timer not armed or not due yet
    Idle,
    /// Due, but nothing new was drawn
    Unchanged,
    /// Something changed but the surface holds no ink
    Blank,
    /// Something changed while a request is still out; it will go next
    Deferred,
    Dispatched(RequestTicket),
    /// Sent a change that was already reported as [`Sample::Deferred`]
    Flushed(RequestTicket),
    Failed(ClassifierError),
}

impl Sample {
    /// Whether this sample saw the drawing change
    pub fn saw_change(&self) -> bool {
        !matches!(self, Sample::Idle | Sample::Unchanged | Sample::Flushed(_))
    }
}

/// What became of a classification response
#[derive(Debug, PartialEq)]
pub enum Resolution {
    Accepted(RankedResult),
    /// For a round that is over, or no longer being played
    Stale,
    Failed(String),
    /// Never dispatched by this scheduler, or already resolved
    Unknown,
}

/// Samples the sketch on a fixed cadence and keeps at most one
/// classification request in flight.
#[derive(Debug)]
pub struct ClassificationScheduler {
    interval: Duration,
    timer: Option<Timer>,
    outstanding: Option<RequestTicket>,
    pending_change: bool,
    next_seq: u64,
    banned: Vec<String>,
    latest: Option<RankedResult>,
}

impl ClassificationScheduler {
    pub fn new(interval: Duration, banned: Vec<String>) -> Self {
        Self {
            interval,
            timer: None,
            outstanding: None,
            pending_change: false,
            next_seq: 0,
            banned,
            latest: None,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn arm(&mut self, now: Duration) {
        self.timer = Some(Timer::arm(now, self.interval));
    }

    /// Stops sampling. A request already out stays outstanding until its
    /// answer arrives.
    pub fn disarm(&mut self) {
        self.timer = None;
        self.pending_change = false;
        self.latest = None;
    }

    pub fn is_armed(&self) -> bool {
        self.timer.is_some()
    }

    pub fn outstanding(&self) -> Option<RequestTicket> {
        self.outstanding
    }

    pub fn latest(&self) -> Option<&RankedResult> {
        self.latest.as_ref()
    }

    /// Forget the published result and any change waiting on the
    /// outstanding request, e.g. once the sketch has been wiped.
    pub fn reset_round(&mut self) {
        self.latest = None;
        self.pending_change = false;
    }

    pub fn tick<S, C>(&mut self, now: Duration, round: RoundId, sketch: &mut S, service: &mut C) -> Sample
    where
        S: Sketch + ?Sized,
        C: ClassificationService + ?Sized,
    {
        let Some(timer) = self.timer.as_mut() else {
            return Sample::Idle;
        };
        if !timer.poll(now) {
            return Sample::Idle;
        }

        let fresh = sketch.consume_dirty();
        if !fresh && !self.pending_change {
            return Sample::Unchanged;
        }
        if self.outstanding.is_some() {
            if !fresh {
                return Sample::Unchanged;
            }
            self.pending_change = true;
            return Sample::Deferred;
        }
        self.pending_change = false;

        let Some(bitmap) = sketch.snapshot() else {
            return Sample::Blank;
        };

        let ticket = RequestTicket {
            seq: self.next_seq,
            round,
        };
        self.next_seq += 1;

        match service.classify(ticket, bitmap) {
            Ok(()) => {
                debug!(seq = ticket.seq, ?round, "dispatched classification");
                self.outstanding = Some(ticket);
                if fresh {
                    Sample::Dispatched(ticket)
                } else {
                    Sample::Flushed(ticket)
                }
            }
            Err(err) => {
                warn!(%err, "classification dispatch failed");
                Sample::Failed(err)
            }
        }
    }

    /// Settle the outstanding request. `current` is the round being played,
    /// if any; answers for any other round are dropped.
    pub fn resolve(
        &mut self,
        ticket: RequestTicket,
        outcome: Result<Vec<Prediction>, String>,
        current: Option<RoundId>,
    ) -> Resolution {
        if self.outstanding != Some(ticket) {
            return Resolution::Unknown;
        }
        self.outstanding = None;

        let predictions = match outcome {
            Ok(predictions) => predictions,
            Err(message) => return Resolution::Failed(message),
        };
        if current != Some(ticket.round) {
            debug!(seq = ticket.seq, "dropping stale classification");
            return Resolution::Stale;
        }

        let ranked = RankedResult::from_predictions(predictions, &self.banned);
        self.latest = Some(ranked.clone());
        Resolution::Accepted(ranked)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::{ScriptedClassifier, ServiceEvent};
    use crate::raster::RasterCanvas;
    use crate::sketch::SketchSurface;

    const ROUND: RoundId = RoundId {
        generation: 1,
        target_index: 0,
    };

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    fn setup() -> (
        ClassificationScheduler,
        SketchSurface<RasterCanvas>,
        ScriptedClassifier,
    ) {
        let mut scheduler = ClassificationScheduler::new(ms(10), vec!["stitches".into()]);
        scheduler.arm(Duration::ZERO);
        (
            scheduler,
            SketchSurface::new(RasterCanvas::new(100, 100), 4),
            ScriptedClassifier::new(),
        )
    }

    #[test]
    fn disarmed_scheduler_does_nothing() {
        let (mut scheduler, mut sketch, mut service) = setup();
        scheduler.disarm();
        sketch.begin_stroke(10.0, 10.0, 1.0);

        assert!(matches!(
            scheduler.tick(ms(100), ROUND, &mut sketch, &mut service),
            Sample::Idle
        ));
        assert_eq!(service.dispatched(), 0);
    }

    #[test]
    fn waits_for_the_sampling_period() {
        let (mut scheduler, mut sketch, mut service) = setup();
        sketch.begin_stroke(10.0, 10.0, 1.0);

        assert!(matches!(
            scheduler.tick(ms(5), ROUND, &mut sketch, &mut service),
            Sample::Idle
        ));
        assert!(matches!(
            scheduler.tick(ms(10), ROUND, &mut sketch, &mut service),
            Sample::Dispatched(_)
        ));
    }

    #[test]
    fn clean_sketch_is_not_classified() {
        let (mut scheduler, mut sketch, mut service) = setup();
        assert!(matches!(
            scheduler.tick(ms(10), ROUND, &mut sketch, &mut service),
            Sample::Unchanged
        ));
        assert_eq!(service.dispatched(), 0);
    }

    #[test]
    fn cleared_sketch_is_blank() {
        let (mut scheduler, mut sketch, mut service) = setup();
        sketch.begin_stroke(10.0, 10.0, 1.0);
        scheduler.pending_change = true;
        sketch.clear();

        assert!(matches!(
            scheduler.tick(ms(10), ROUND, &mut sketch, &mut service),
            Sample::Blank
        ));
    }

    #[test]
    fn never_two_requests_in_flight() {
        let (mut scheduler, mut sketch, mut service) = setup();

        for step in 1..=50u64 {
            sketch.on_stroke_point(step as f32, 20.0, 1.0);
            let _ = scheduler.tick(ms(step * 10), ROUND, &mut sketch, &mut service);
            if step % 7 == 0 {
                service.respond(vec![Prediction::new("cat", 0.5)]);
                if let Some(ServiceEvent::Classified { ticket, outcome }) = service.poll() {
                    scheduler.resolve(ticket, outcome, Some(ROUND));
                }
            }
        }

        assert_eq!(service.max_in_flight(), 1);
        assert!(service.dispatched() > 1);
    }

    #[test]
    fn change_during_request_is_sent_afterwards() {
        let (mut scheduler, mut sketch, mut service) = setup();
        sketch.begin_stroke(10.0, 10.0, 1.0);
        let Sample::Dispatched(first) = scheduler.tick(ms(10), ROUND, &mut sketch, &mut service)
        else {
            panic!("expected dispatch");
        };

        sketch.on_stroke_point(30.0, 30.0, 1.0);
        assert!(matches!(
            scheduler.tick(ms(20), ROUND, &mut sketch, &mut service),
            Sample::Deferred
        ));

        // nothing new drawn, still waiting
        assert!(matches!(
            scheduler.tick(ms(30), ROUND, &mut sketch, &mut service),
            Sample::Unchanged
        ));

        scheduler.resolve(first, Ok(vec![]), Some(ROUND));
        let sample = scheduler.tick(ms(40), ROUND, &mut sketch, &mut service);
        assert!(matches!(sample, Sample::Flushed(t) if t.seq == first.seq + 1));
        assert!(!sample.saw_change());
    }

    #[test]
    fn accepted_result_is_filtered_and_published() {
        let (mut scheduler, mut sketch, mut service) = setup();
        sketch.begin_stroke(10.0, 10.0, 1.0);
        let Sample::Dispatched(ticket) = scheduler.tick(ms(10), ROUND, &mut sketch, &mut service)
        else {
            panic!("expected dispatch");
        };

        let resolution = scheduler.resolve(
            ticket,
            Ok(vec![
                Prediction::new("stitches", 0.9),
                Prediction::new("cat", 0.1),
            ]),
            Some(ROUND),
        );

        let Resolution::Accepted(ranked) = resolution else {
            panic!("expected acceptance");
        };
        assert_eq!(ranked.len(), 1);
        assert_eq!(scheduler.latest(), Some(&ranked));
        assert!(scheduler.outstanding().is_none());
    }

    #[test]
    fn result_for_old_round_is_stale() {
        let (mut scheduler, mut sketch, mut service) = setup();
        sketch.begin_stroke(10.0, 10.0, 1.0);
        let Sample::Dispatched(ticket) = scheduler.tick(ms(10), ROUND, &mut sketch, &mut service)
        else {
            panic!("expected dispatch");
        };

        let next_round = RoundId {
            generation: 1,
            target_index: 1,
        };
        assert_eq!(
            scheduler.resolve(ticket, Ok(vec![Prediction::new("cat", 1.0)]), Some(next_round)),
            Resolution::Stale
        );
        assert!(scheduler.latest().is_none());
        assert!(scheduler.outstanding().is_none());
    }

    #[test]
    fn failure_clears_outstanding() {
        let (mut scheduler, mut sketch, mut service) = setup();
        sketch.begin_stroke(10.0, 10.0, 1.0);
        let Sample::Dispatched(ticket) = scheduler.tick(ms(10), ROUND, &mut sketch, &mut service)
        else {
            panic!("expected dispatch");
        };

        assert_eq!(
            scheduler.resolve(ticket, Err("boom".into()), Some(ROUND)),
            Resolution::Failed("boom".into())
        );
        assert!(scheduler.outstanding().is_none());
        assert_eq!(
            scheduler.resolve(ticket, Err("again".into()), Some(ROUND)),
            Resolution::Unknown
        );
    }
}
