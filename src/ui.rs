use std::time::Duration;

use doodle_dash::{
    classifier::ClassificationService, clock::Clock, session::GameState, util::format_clock,
};
use ratatui::{
    buffer::Buffer,
    layout::{Alignment, Constraint, Layout, Rect},
    style::{Color, Modifier, Style},
    symbols::Marker,
    text::{Line, Span},
    widgets::{
        canvas::{Canvas as BrailleCanvas, Points},
        Block, Paragraph, Widget,
    },
};
use unicode_width::UnicodeWidthStr;

use crate::App;

const HORIZONTAL_MARGIN: u16 = 2;
const HEADER_LINES: u16 = 2;
const FOOTER_LINES: u16 = 2;

/// Where the drawing surface sits inside the whole terminal area. Each cell
/// holds a 2×4 grid of braille dots, one dot per sketch pixel.
pub fn canvas_area(area: Rect) -> Rect {
    let [_, board, _] = board_layout(area);
    Block::bordered().inner(board)
}

fn board_layout(area: Rect) -> [Rect; 3] {
    let inner = Rect {
        x: area.x + HORIZONTAL_MARGIN.min(area.width / 2),
        width: area.width.saturating_sub(HORIZONTAL_MARGIN * 2),
        ..area
    };
    Layout::vertical([
        Constraint::Length(HEADER_LINES),
        Constraint::Min(0),
        Constraint::Length(FOOTER_LINES),
    ])
    .areas(inner)
}

/// Vertically centre a block of lines
fn centered(lines: Vec<Line<'_>>, area: Rect, buf: &mut Buffer) {
    let height = (lines.len() as u16).min(area.height);
    let [_, middle, _] = Layout::vertical([
        Constraint::Fill(1),
        Constraint::Length(height),
        Constraint::Fill(1),
    ])
    .areas(area);
    Paragraph::new(lines)
        .alignment(Alignment::Center)
        .render(middle, buf);
}

fn hint(text: &str) -> Line<'_> {
    Line::from(Span::styled(
        text,
        Style::default().add_modifier(Modifier::DIM | Modifier::ITALIC),
    ))
}

impl<C: ClassificationService, K: Clock> App<C, K> {
    pub fn render_at(&self, now: Duration, area: Rect, buf: &mut Buffer) {
        let bold_style = Style::default().add_modifier(Modifier::BOLD);
        let title_style = bold_style.fg(Color::Magenta);
        let error_style = Style::default().fg(Color::Red);

        let ctl = &self.controller;
        match ctl.state() {
            GameState::Menu => {
                let mut lines = vec![
                    Line::from(Span::styled("Doodle Dash", title_style)),
                    Line::from("How fast can a neural network predict your doodles?"),
                    Line::default(),
                    hint("enter to start · q to quit"),
                ];
                if let Some(status) = &self.status {
                    lines.push(Line::default());
                    lines.push(Line::from(Span::styled(status.as_str(), error_style)));
                }
                centered(lines, area, buf);
            }
            GameState::Loading => {
                centered(
                    vec![
                        Line::from(Span::styled("Loading neural network...", bold_style)),
                        Line::default(),
                        hint("esc to cancel"),
                    ],
                    area,
                    buf,
                );
            }
            GameState::Countdown => {
                let remaining = ctl.session().countdown_remaining;
                let text = if remaining == 0 {
                    "Draw!".to_string()
                } else {
                    remaining.to_string()
                };
                centered(
                    vec![Line::from(Span::styled(text, title_style))],
                    area,
                    buf,
                );
            }
            GameState::Playing => self.render_board(now, area, buf),
            GameState::End => self.render_results(area, buf),
        }
    }

    fn render_board(&self, now: Duration, area: Rect, buf: &mut Buffer) {
        let ctl = &self.controller;
        let [header, board, footer] = board_layout(area);
        let bold_style = Style::default().add_modifier(Modifier::BOLD);

        let target = ctl.current_target().unwrap_or_default();
        let clock = format_clock(ctl.remaining(now).unwrap_or_default());
        Paragraph::new(vec![Line::from(vec![
            Span::raw("Draw "),
            Span::styled(format!("\"{}\"", target), bold_style.fg(Color::Cyan)),
            Span::raw("   "),
            Span::styled(clock, bold_style.fg(Color::Yellow)),
        ])])
        .alignment(Alignment::Center)
        .render(header, buf);

        let block = Block::bordered();
        let inner = block.inner(board);
        block.render(board, buf);

        let pixels = ctl.sketch().canvas().pixels();
        let height = pixels.height as f64;
        let ink: Vec<(f64, f64)> = (0..pixels.height)
            .flat_map(|y| (0..pixels.width).map(move |x| (x, y)))
            .filter(|&(x, y)| pixels.get(x, y) > 0)
            .map(|(x, y)| (x as f64 + 0.5, height - y as f64 - 0.5))
            .collect();
        BrailleCanvas::default()
            .marker(Marker::Braille)
            .x_bounds([0.0, inner.width as f64 * 2.0])
            .y_bounds([0.0, inner.height as f64 * 4.0])
            .paint(|ctx| {
                ctx.draw(&Points {
                    coords: &ink,
                    color: Color::White,
                })
            })
            .render(inner, buf);

        let guess = match ctl.last_guess().and_then(|g| g.top()) {
            Some(top) if top.score > 0.0 => {
                format!("Prediction: {} ({:.1}%)", top.label, top.score * 100.0)
            }
            _ => "Prediction: ...".to_string(),
        };
        let mut lines = vec![Line::from(guess)];
        match &self.status {
            Some(status) => lines.push(Line::from(Span::styled(
                status.as_str(),
                Style::default().fg(Color::Red),
            ))),
            None => lines.push(hint("s skip · c clear · esc quit")),
        }
        Paragraph::new(lines)
            .alignment(Alignment::Center)
            .render(footer, buf);
    }

    fn render_results(&self, area: Rect, buf: &mut Buffer) {
        let ctl = &self.controller;
        let bold_style = Style::default().add_modifier(Modifier::BOLD);
        let (correct, total) = ctl.session().predictions.score();

        let rounds: Vec<String> = ctl
            .session()
            .predictions
            .iter()
            .map(|record| {
                let mark = if record.correct { "✅" } else { "❌" };
                match (&record.guessed, record.correct) {
                    (Some(guess), false) => {
                        format!("{} {} (guessed {})", mark, record.target, guess)
                    }
                    _ => format!("{} {}", mark, record.target),
                }
            })
            .collect();

        // left-align the rounds inside a centred column
        let column = rounds.iter().map(|r| r.width()).max().unwrap_or(0);
        let room = area.height.saturating_sub(6) as usize;

        let mut lines = vec![
            Line::from(Span::styled("Game Over!", bold_style.fg(Color::Magenta))),
            Line::from(Span::styled(
                format!("Score: {} / {}", correct, total),
                bold_style,
            )),
            Line::default(),
        ];
        lines.extend(
            rounds
                .iter()
                .take(room)
                .map(|r| Line::from(format!("{}{}", r, " ".repeat(column - r.width())))),
        );
        if rounds.len() > room {
            lines.push(hint("…"));
        }
        lines.push(Line::default());
        lines.push(hint("enter play again · m main menu · q quit"));

        centered(lines, area, buf);
    }
}

impl<C: ClassificationService, K: Clock> Widget for &App<C, K> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        self.render_at(self.now(), area, buf);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use doodle_dash::classifier::{Prediction, RankedResult, ScriptedClassifier};
    use doodle_dash::clock::ManualClock;
    use doodle_dash::config::GameConfig;
    use doodle_dash::labels::LabelSet;

    fn app(clock: &ManualClock) -> App<ScriptedClassifier, ManualClock> {
        let labels = LabelSet::from_labels("test", vec!["cat".into(), "dog".into()]);
        let mut app = App::new(
            GameConfig::default(),
            &labels,
            ScriptedClassifier::new(),
            clock.clone(),
            Some(5),
        );
        app.on_resize(Rect::new(0, 0, 60, 20));
        app
    }

    fn rendered(app: &App<ScriptedClassifier, ManualClock>) -> String {
        let area = Rect::new(0, 0, 60, 20);
        let mut buffer = Buffer::empty(area);
        app.render(area, &mut buffer);
        buffer.content().iter().map(|c| c.symbol()).collect()
    }

    fn play(app: &mut App<ScriptedClassifier, ManualClock>, clock: &ManualClock) {
        app.controller.request_start();
        app.on_tick();
        for _ in 0..3 {
            clock.advance(Duration::from_secs(1));
            app.on_tick();
        }
        assert_eq!(app.controller.state(), GameState::Playing);
    }

    #[test]
    fn menu_shows_title() {
        let clock = ManualClock::new();
        let content = rendered(&app(&clock));
        assert!(content.contains("Doodle Dash"));
        assert!(content.contains("neural network"));
    }

    #[test]
    fn countdown_shows_number() {
        let clock = ManualClock::new();
        let mut app = app(&clock);
        app.controller.request_start();
        app.on_tick();
        assert!(rendered(&app).contains('3'));
    }

    #[test]
    fn board_shows_target_clock_and_guess() {
        let clock = ManualClock::new();
        let mut app = app(&clock);
        play(&mut app, &clock);
        let target = app.controller.current_target().unwrap().to_string();

        app.controller
            .on_classification_result(RankedResult::from_predictions(
                vec![Prediction::new("zebra", 0.75), Prediction::new(&target, 0.25)],
                &[],
            ));

        let content = rendered(&app);
        assert!(content.contains(&format!("\"{}\"", target)));
        assert!(content.contains("00:10"));
        assert!(content.contains("Prediction: zebra (75.0%)"));
    }

    #[test]
    fn board_shows_ink() {
        let clock = ManualClock::new();
        let mut app = app(&clock);
        play(&mut app, &clock);
        let blank = rendered(&app);

        app.controller
            .sketch_mut()
            .begin_stroke(10.0, 10.0, 2.0);

        assert_ne!(blank, rendered(&app));
    }

    #[test]
    fn results_show_score_and_rounds() {
        let clock = ManualClock::new();
        let mut app = app(&clock);
        play(&mut app, &clock);
        app.controller.request_skip();
        clock.advance(Duration::from_secs(20));
        app.on_tick();

        let content = rendered(&app);
        assert!(content.contains("Game Over!"));
        assert!(content.contains("Score: 0 / 2"));
        assert!(content.contains("❌"));
    }

    #[test]
    fn tiny_terminal_does_not_panic() {
        let clock = ManualClock::new();
        let mut app = app(&clock);
        play(&mut app, &clock);
        let area = Rect::new(0, 0, 3, 2);
        let mut buffer = Buffer::empty(area);
        app.render(area, &mut buffer);
    }
}
