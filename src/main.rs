mod app;
mod ui;

use anyhow::{Context, Result};
use app::App;
use clap::Parser;
use crossterm::event::{
    self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEventKind, MouseButton,
    MouseEvent, MouseEventKind,
};
use crossterm::execute;
use ratatui::DefaultTerminal;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use transit_access::config::DashboardConfig;
use transit_access::data::{load_backdrop, DatasetKind, FsSource, LineString};
use transit_access::map::Basemap;

/// Terminal dashboard of walking-time accessibility to metro stations
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Directory holding the GeoJSON datasets
    #[arg(long, default_value = "data")]
    data_dir: PathBuf,

    /// JSON config file; missing fields keep their defaults
    #[arg(long)]
    config: Option<PathBuf>,

    /// Initial hexagon resolution (snapped to the available ones)
    #[arg(long)]
    resolution: Option<f64>,

    /// Initial basemap: satellite, streets, topo or dark
    #[arg(long)]
    basemap: Option<String>,

    /// Log file (the terminal itself is taken by the UI)
    #[arg(long, default_value = "transit-access.log")]
    log_file: PathBuf,
}

fn init_tracing(path: &Path) -> Result<()> {
    let file = File::create(path).with_context(|| format!("creating log file {}", path.display()))?;
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .init();
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(&args.log_file)?;

    let mut config = DashboardConfig::load(args.config.as_deref())?;
    if let Some(resolution) = args.resolution {
        config.default_resolution = resolution;
    }
    let basemap_id = args.basemap.clone().unwrap_or_else(|| config.basemap.clone());
    let basemap = Basemap::from_id(&basemap_id).unwrap_or_else(|| {
        warn!(basemap = %basemap_id, "unknown basemap; using default");
        Basemap::default()
    });
    let backdrop = read_backdrop(&config, &args.data_dir);
    info!(data_dir = %args.data_dir.display(), basemap = basemap.id(), "starting dashboard");

    // Initialize terminal
    let mut terminal = ratatui::init();
    terminal.clear()?;

    // Enable mouse capture
    execute!(std::io::stdout(), EnableMouseCapture)?;

    let result = run(&mut terminal, config, &args.data_dir, backdrop, basemap);

    // Disable mouse capture and restore terminal
    let _ = execute!(std::io::stdout(), DisableMouseCapture);
    ratatui::restore();

    if let Err(e) = &result {
        error!(error = %e, "dashboard exited with an error");
    }
    result
}

/// Backdrop geometry is optional: a missing or broken file only costs the outline
fn read_backdrop(config: &DashboardConfig, data_dir: &Path) -> Vec<LineString> {
    let Some(name) = &config.data.backdrop_path else {
        return Vec::new();
    };
    let path = data_dir.join(name);
    if !path.exists() {
        info!(path = %path.display(), "no backdrop file");
        return Vec::new();
    }
    match load_backdrop(&path) {
        Ok(lines) => {
            info!(path = %path.display(), lines = lines.len(), "backdrop loaded");
            lines
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "failed to load backdrop");
            Vec::new()
        }
    }
}

/// Handle mouse events for panning, zooming, hovering and picking
fn handle_mouse(app: &mut App, mouse: MouseEvent) {
    // Always track mouse position for cursor marker and tooltip
    app.set_mouse_pos(mouse.column, mouse.row);

    match mouse.kind {
        // Scroll wheel for zooming towards mouse position
        MouseEventKind::ScrollUp => app.zoom_in_at(mouse.column, mouse.row),
        MouseEventKind::ScrollDown => app.zoom_out_at(mouse.column, mouse.row),
        // Horizontal scroll for panning (trackpad two-finger swipe)
        MouseEventKind::ScrollLeft => app.pan(-15, 0),
        MouseEventKind::ScrollRight => app.pan(15, 0),
        // Click and drag to pan; a click without movement picks
        MouseEventKind::Down(MouseButton::Left) => app.begin_drag(mouse.column, mouse.row),
        MouseEventKind::Drag(MouseButton::Left) => app.handle_drag(mouse.column, mouse.row),
        MouseEventKind::Up(MouseButton::Left) => app.end_drag(mouse.column, mouse.row),
        _ => {}
    }
}

fn handle_key(app: &mut App, code: KeyCode) {
    match code {
        KeyCode::Char('q') => app.quit(),
        KeyCode::Esc | KeyCode::Char('c') => app.clear_highlight(),

        // Pan with hjkl or arrow keys
        KeyCode::Left | KeyCode::Char('h') => app.pan(-10, 0),
        KeyCode::Right | KeyCode::Char('l') => app.pan(10, 0),
        KeyCode::Up | KeyCode::Char('k') => app.pan(0, -6),
        KeyCode::Down | KeyCode::Char('j') => app.pan(0, 6),

        // Zoom
        KeyCode::Char('+') | KeyCode::Char('=') => app.zoom_in(),
        KeyCode::Char('-') | KeyCode::Char('_') => app.zoom_out(),

        // Camera
        KeyCode::Char('p') => app.tilt(1.0),
        KeyCode::Char('P') => app.tilt(-1.0),
        KeyCode::Char('<') => app.rotate(-1.0),
        KeyCode::Char('>') => app.rotate(1.0),

        // Layer toggles
        KeyCode::Char('a') => app.toggle_layer(DatasetKind::Cells),
        KeyCode::Char('s') => app.toggle_layer(DatasetKind::Stations),
        KeyCode::Char('t') => app.toggle_layer(DatasetKind::Lines),

        // Extrusion and resolution
        KeyCode::Char('[') => app.nudge_multiplier(-1),
        KeyCode::Char(']') => app.nudge_multiplier(1),
        KeyCode::Char(',') => app.step_resolution(-1),
        KeyCode::Char('.') => app.step_resolution(1),

        KeyCode::Char('m') => app.cycle_basemap(),

        _ => {}
    }
}

fn run(
    terminal: &mut DefaultTerminal,
    config: DashboardConfig,
    data_dir: &Path,
    backdrop: Vec<LineString>,
    basemap: Basemap,
) -> Result<()> {
    let size = terminal.size()?;
    let source = Arc::new(FsSource::new(data_dir));
    let mut app = App::new(
        config,
        source,
        backdrop,
        basemap,
        size.width as usize,
        size.height as usize,
    );

    // Main loop
    loop {
        app.tick();

        // Draw
        terminal.draw(|frame| ui::render(frame, &app))?;

        // Handle events with ~60fps target
        if event::poll(Duration::from_millis(16))? {
            match event::read()? {
                // Only handle key press events (not release)
                Event::Key(key) if key.kind == KeyEventKind::Press => handle_key(&mut app, key.code),
                Event::Mouse(mouse) => handle_mouse(&mut app, mouse),
                Event::Resize(width, height) => app.resize(width as usize, height as usize),
                _ => {}
            }
        }

        if app.should_quit {
            break;
        }
    }

    Ok(())
}
