mod ui;

use clap::{error::ErrorKind, CommandFactory, Parser};
use crossterm::{
    event::{
        DisableMouseCapture, EnableMouseCapture, KeyCode, KeyEvent, KeyModifiers, MouseButton,
        MouseEvent, MouseEventKind,
    },
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
    tty::IsTty,
};
use doodle_dash::{
    classifier::{ClassificationService, WorkerClassifier},
    clock::{Clock, MonotonicClock},
    config::{ConfigStore, FileConfigStore, GameConfig},
    controller::{SessionController, SessionEvent},
    labels::LabelSet,
    logging,
    raster::RasterCanvas,
    runtime::{GameEvent, Runner, TerminalInput},
    session::GameState,
    sketch::SketchSurface,
};
use ratatui::{
    backend::{Backend, CrosstermBackend},
    layout::Rect,
    Terminal,
};
use std::{
    error::Error,
    io::{self, stdin},
    path::PathBuf,
    time::Duration,
};
use tracing::{info, warn};

/// race a neural network at guessing your doodles
#[derive(Parser, Debug, Clone)]
#[clap(
    version,
    about,
    long_about = "Draw the prompted object with the mouse while a sketch classifier tries to guess it. Every correct guess moves on to the next prompt; the session ends when the clock runs out."
)]
pub struct Cli {
    /// program that runs the classification worker
    #[clap(long)]
    classifier: String,

    /// argument passed through to the worker, may be repeated
    #[clap(long = "arg", allow_hyphen_values = true)]
    args: Vec<String>,

    /// config file to use instead of the per-user one
    #[clap(short = 'c', long)]
    config: Option<PathBuf>,

    /// session length in seconds
    #[clap(short = 'd', long)]
    duration: Option<f64>,

    /// seconds of countdown before drawing starts
    #[clap(long)]
    countdown: Option<u32>,

    /// seed for the order of prompts
    #[clap(long)]
    seed: Option<u64>,

    /// model the worker should load
    #[clap(short = 'm', long)]
    model: Option<String>,

    /// ask the worker for the quantized model
    #[clap(long)]
    quantized: bool,

    /// file to write logs to
    #[clap(long)]
    log_file: Option<PathBuf>,

    /// verbose logging, honouring RUST_LOG
    #[clap(long)]
    debug: bool,
}

impl Cli {
    /// Load the stored config and layer the command line on top
    fn game_config(&self) -> GameConfig {
        let store = match &self.config {
            Some(path) => FileConfigStore::with_path(path),
            None => FileConfigStore::new(),
        };
        let mut config = store.load();

        if let Some(duration) = self.duration {
            config.game_duration_secs = duration;
        }
        if let Some(countdown) = self.countdown {
            config.countdown_secs = countdown;
        }
        if let Some(model) = &self.model {
            config.model.name = model.clone();
        }
        if self.quantized {
            config.model.quantized = true;
        }
        config
    }
}

pub type Surface = SketchSurface<RasterCanvas>;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Action {
    Continue,
    Quit,
}

pub struct App<C: ClassificationService, K: Clock> {
    pub controller: SessionController<Surface, C, K>,
    /// Terminal cells the sketch is drawn into
    pub canvas_area: Rect,
    /// Last problem worth showing the player
    pub status: Option<String>,
    drawing: bool,
}

fn surface_for(area: Rect, padding: u32) -> Surface {
    SketchSurface::new(
        RasterCanvas::new(area.width as u32 * 2, area.height as u32 * 4),
        padding,
    )
}

impl<C: ClassificationService, K: Clock> App<C, K> {
    pub fn new(
        config: GameConfig,
        labels: &LabelSet,
        service: C,
        clock: K,
        seed: Option<u64>,
    ) -> Self {
        let sketch = surface_for(Rect::default(), config.sketch_padding);
        let controller = SessionController::new(config, labels, sketch, service, clock);
        let controller = match seed {
            Some(seed) => controller.with_seed(seed),
            None => controller,
        };

        Self {
            controller,
            canvas_area: Rect::default(),
            status: None,
            drawing: false,
        }
    }

    pub fn now(&self) -> Duration {
        self.controller.now()
    }

    /// Resize the drawing surface to match the terminal. A round in progress
    /// keeps its surface.
    pub fn on_resize(&mut self, area: Rect) {
        let canvas_area = ui::canvas_area(area);
        if canvas_area == self.canvas_area || self.controller.state() == GameState::Playing {
            return;
        }
        self.canvas_area = canvas_area;
        let padding = self.controller.config().sketch_padding;
        *self.controller.sketch_mut() = surface_for(canvas_area, padding);
    }

    pub fn on_tick(&mut self) {
        let now = self.now();
        self.controller.on_tick(now);

        for event in self.controller.drain_events() {
            match event {
                SessionEvent::LoadFailed(message) => {
                    self.status = Some(format!("Could not load the model: {}", message));
                }
                SessionEvent::ClassifierError(message) => {
                    self.status = Some(format!("Classifier error: {}", message));
                }
                SessionEvent::StateChanged {
                    to: GameState::Playing | GameState::Loading,
                    ..
                } => {
                    self.status = None;
                    self.drawing = false;
                }
                _ => {}
            }
        }
    }

    pub fn on_key(&mut self, key: KeyEvent) -> Action {
        if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
            return Action::Quit;
        }

        let state = self.controller.state();
        match key.code {
            KeyCode::Char('q') => return Action::Quit,
            KeyCode::Esc if state == GameState::Menu => return Action::Quit,
            KeyCode::Esc => self.controller.request_exit(),
            KeyCode::Enter | KeyCode::Char(' ') => match state {
                GameState::Menu => self.controller.request_start(),
                GameState::End => self.controller.on_replay(true),
                _ => {}
            },
            KeyCode::Char('m') => self.controller.on_replay(false),
            KeyCode::Char('s') => self.controller.request_skip(),
            KeyCode::Char('c') => self.controller.request_clear(),
            _ => {}
        }
        Action::Continue
    }

    pub fn on_mouse(&mut self, mouse: MouseEvent) {
        if self.controller.state() != GameState::Playing {
            return;
        }
        let radius = self.controller.config().brush_radius;

        match mouse.kind {
            MouseEventKind::Down(MouseButton::Left) => {
                if let Some((x, y)) = self.to_canvas(mouse.column, mouse.row) {
                    self.controller.sketch_mut().begin_stroke(x, y, radius);
                    self.drawing = true;
                }
            }
            MouseEventKind::Drag(MouseButton::Left) if self.drawing => {
                if let Some((x, y)) = self.to_canvas(mouse.column, mouse.row) {
                    self.controller.sketch_mut().on_stroke_point(x, y, radius);
                }
            }
            MouseEventKind::Up(MouseButton::Left) => {
                self.controller.sketch_mut().end_stroke();
                self.drawing = false;
            }
            _ => {}
        }
    }

    /// Cell to sketch coordinates, at the centre of the cell's dot grid
    fn to_canvas(&self, column: u16, row: u16) -> Option<(f32, f32)> {
        let area = self.canvas_area;
        let inside = column >= area.x
            && column < area.x + area.width
            && row >= area.y
            && row < area.y + area.height;
        inside.then(|| {
            (
                (column - area.x) as f32 * 2.0 + 1.0,
                (row - area.y) as f32 * 4.0 + 2.0,
            )
        })
    }
}

fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();

    if !stdin().is_tty() {
        let mut cmd = Cli::command();
        cmd.error(ErrorKind::Io, "stdin must be a tty").exit();
    }

    logging::init(cli.log_file.as_deref(), cli.debug)?;

    let config = cli.game_config();
    let labels = LabelSet::new(&config.label_set)?;
    let service = WorkerClassifier::new(cli.classifier.clone(), cli.args.clone(), config.model.clone());
    info!(
        classifier = %cli.classifier,
        model = %config.model.name,
        labels = labels.size,
        "starting"
    );

    let mut app = App::new(config, &labels, service, MonotonicClock::new(), cli.seed);

    enable_raw_mode()?;

    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let result = start_tui(&mut terminal, &mut app);

    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        DisableMouseCapture,
        LeaveAlternateScreen
    )?;
    terminal.show_cursor()?;

    if let Err(err) = &result {
        warn!(%err, "game loop failed");
    }
    result
}

fn start_tui<B: Backend, C: ClassificationService, K: Clock>(
    terminal: &mut Terminal<B>,
    app: &mut App<C, K>,
) -> Result<(), Box<dyn Error>> {
    let period = app.controller.config().sampling_interval();
    let mut runner = Runner::new(TerminalInput, MonotonicClock::new(), period);

    let size = terminal.size()?;
    app.on_resize(Rect::new(0, 0, size.width, size.height));

    loop {
        match runner.step()? {
            GameEvent::Tick => app.on_tick(),
            GameEvent::Resize => {
                let size = terminal.size()?;
                app.on_resize(Rect::new(0, 0, size.width, size.height));
            }
            GameEvent::Key(key) => {
                if app.on_key(key) == Action::Quit {
                    break;
                }
                // the menu may need the surface resized for the next round
                let size = terminal.size()?;
                app.on_resize(Rect::new(0, 0, size.width, size.height));
            }
            GameEvent::Mouse(mouse) => {
                // ink shows up on the next tick's frame
                app.on_mouse(mouse);
                continue;
            }
        }
        terminal.draw(|f| f.render_widget(&*app, f.area()))?;
    }

    Ok(())
}
