//! Terminal input plus the fixed game tick, merged into one stream.
//!
//! The tick is deadline driven: whatever input is pending, a `Tick` is
//! handed out as soon as the period has elapsed, so a player dragging the
//! mouse cannot stall the round clock.

use std::io;
use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::thread;
use std::time::Duration;

use crossterm::event::{self, Event as CtEvent, KeyEvent, KeyEventKind, MouseEvent};

use crate::clock::{Clock, Timer};

#[derive(Clone, Debug)]
pub enum GameEvent {
    Key(KeyEvent),
    Mouse(MouseEvent),
    Resize,
    Tick,
}

/// Anything that can wait a bounded time for player input
pub trait InputSource {
    /// `Ok(None)` when nothing usable arrived within `timeout`.
    fn next_event(&mut self, timeout: Duration) -> io::Result<Option<GameEvent>>;
}

/// Reads the terminal directly on the game thread
#[derive(Debug, Default)]
pub struct TerminalInput;

fn translate(event: CtEvent) -> Option<GameEvent> {
    match event {
        // windows reports releases too
        CtEvent::Key(key) if key.kind == KeyEventKind::Press => Some(GameEvent::Key(key)),
        CtEvent::Mouse(mouse) => Some(GameEvent::Mouse(mouse)),
        CtEvent::Resize(_, _) => Some(GameEvent::Resize),
        _ => None,
    }
}

impl InputSource for TerminalInput {
    fn next_event(&mut self, timeout: Duration) -> io::Result<Option<GameEvent>> {
        if !event::poll(timeout)? {
            return Ok(None);
        }
        Ok(translate(event::read()?))
    }
}

/// Scripted input for tests
impl InputSource for Receiver<GameEvent> {
    fn next_event(&mut self, timeout: Duration) -> io::Result<Option<GameEvent>> {
        match self.recv_timeout(timeout) {
            Ok(event) => Ok(Some(event)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => {
                thread::sleep(timeout);
                Ok(None)
            }
        }
    }
}

/// Hands out input as it arrives and a `Tick` every `period`
pub struct Runner<I: InputSource, K: Clock> {
    input: I,
    clock: K,
    tick: Timer,
}

impl<I: InputSource, K: Clock> Runner<I, K> {
    pub fn new(input: I, clock: K, period: Duration) -> Self {
        let tick = Timer::arm(clock.now(), period);
        Self { input, clock, tick }
    }

    pub fn period(&self) -> Duration {
        self.tick.period()
    }

    /// Next input event, or `Tick` once the deadline has passed. Missed
    /// periods collapse into a single tick.
    pub fn step(&mut self) -> io::Result<GameEvent> {
        loop {
            let now = self.clock.now();
            if self.tick.poll(now) {
                return Ok(GameEvent::Tick);
            }
            let wait = self.tick.next_due().saturating_sub(now);
            if let Some(event) = self.input.next_event(wait)? {
                return Ok(event);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{ManualClock, MonotonicClock};
    use crossterm::event::{KeyModifiers, MouseButton, MouseEventKind};
    use std::sync::mpsc;
    use std::time::Instant;

    fn drag(column: u16) -> GameEvent {
        GameEvent::Mouse(MouseEvent {
            kind: MouseEventKind::Drag(MouseButton::Left),
            column,
            row: 2,
            modifiers: KeyModifiers::NONE,
        })
    }

    /// Input that never runs dry
    struct Flood(u16);

    impl InputSource for Flood {
        fn next_event(&mut self, _timeout: Duration) -> io::Result<Option<GameEvent>> {
            self.0 = self.0.wrapping_add(1);
            Ok(Some(drag(self.0)))
        }
    }

    #[test]
    fn step_ticks_when_idle() {
        let (_tx, rx) = mpsc::channel::<GameEvent>();
        let mut runner = Runner::new(rx, MonotonicClock::new(), Duration::from_millis(1));

        assert!(matches!(runner.step().unwrap(), GameEvent::Tick));
    }

    #[test]
    fn step_ticks_when_source_is_gone() {
        let (tx, rx) = mpsc::channel::<GameEvent>();
        drop(tx);
        let mut runner = Runner::new(rx, MonotonicClock::new(), Duration::from_millis(5));

        assert!(matches!(runner.step().unwrap(), GameEvent::Tick));
    }

    #[test]
    fn step_passes_through_input() {
        let (tx, rx) = mpsc::channel();
        tx.send(drag(4)).unwrap();
        let mut runner = Runner::new(rx, MonotonicClock::new(), Duration::from_secs(10));

        match runner.step().unwrap() {
            GameEvent::Mouse(m) => assert_eq!((m.column, m.row), (4, 2)),
            other => panic!("expected mouse event, got {:?}", other),
        }
    }

    #[test]
    fn endless_input_cannot_hold_back_the_tick() {
        let clock = ManualClock::new();
        let mut runner = Runner::new(Flood(0), clock.clone(), Duration::from_millis(10));

        assert!(matches!(runner.step().unwrap(), GameEvent::Mouse(_)));
        clock.advance(Duration::from_millis(10));
        assert!(matches!(runner.step().unwrap(), GameEvent::Tick));
        assert!(matches!(runner.step().unwrap(), GameEvent::Mouse(_)));

        // a long stall yields one tick, not a burst
        clock.advance(Duration::from_millis(55));
        assert!(matches!(runner.step().unwrap(), GameEvent::Tick));
        assert!(matches!(runner.step().unwrap(), GameEvent::Mouse(_)));
    }

    #[test]
    fn ticks_keep_their_cadence_during_a_drag() {
        let (tx, rx) = mpsc::channel();
        let drawing = thread::spawn(move || {
            let started = Instant::now();
            let mut column = 0u16;
            while started.elapsed() < Duration::from_millis(600) {
                column = column.wrapping_add(1);
                if tx.send(drag(column)).is_err() {
                    break;
                }
                thread::sleep(Duration::from_millis(4));
            }
        });

        let mut runner = Runner::new(rx, MonotonicClock::new(), Duration::from_millis(10));
        let started = Instant::now();
        let (mut ticks, mut moves) = (0, 0);
        while started.elapsed() < Duration::from_millis(500) {
            match runner.step().unwrap() {
                GameEvent::Tick => ticks += 1,
                GameEvent::Mouse(_) => moves += 1,
                _ => {}
            }
        }
        drop(runner);
        drawing.join().unwrap();

        assert!(moves > 0);
        assert!(ticks >= 25, "only {} ticks in 500ms", ticks);
    }
}
