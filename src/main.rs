use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, mpsc};
use std::thread;

use anyhow::Result;
use crossterm::{
    execute,
    event::{EnableMouseCapture, DisableMouseCapture},
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{Terminal, backend::CrosstermBackend};

use autostep_core::platform::create_probe;
use autostep_core::sequence::Sequence;
use autostep_core::settings::Settings;
use autostep_core::types::{Command, RunEvent};
use autostep_core::{logger, project, runner, watcher};

/// Load the project named on the command line, or start empty. The flag
/// reports whether the sequence was replaced by its compiled watchers.
fn initial_sequence(project_path: Option<&Path>, watch: bool) -> (Sequence, bool) {
    let seq = match project_path {
        Some(path) => match project::load(path) {
            Ok(seq) => seq,
            Err(e) => {
                logger::error(&format!("failed to load {}: {:#}", path.display(), e));
                Sequence::default()
            }
        },
        None => Sequence::default(),
    };

    if watch {
        match watcher::compile(seq.name(), seq.watchers(), seq.objects()) {
            Ok(program) => {
                logger::info(&format!("watch mode: {} step(s) compiled from watchers", program.steps().len()));
                return (program, true);
            }
            Err(e) => logger::error(&format!("watch mode unavailable: {}", e)),
        }
    }
    (seq, false)
}

fn main() -> Result<()> {
    let mut project_path: Option<PathBuf> = None;
    let mut watch = false;
    for arg in std::env::args().skip(1) {
        if arg == "--watch" {
            watch = true;
        } else {
            project_path = Some(PathBuf::from(arg));
        }
    }

    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    logger::init(&cwd.join("logs"))?;

    let settings_path = cwd.join("settings.json");
    let mut settings = Settings::load(&settings_path);
    let run_config = settings.run_config();

    let (seq, watching) = initial_sequence(project_path.as_deref(), watch);
    let project_dir = project_path
        .as_deref()
        .and_then(Path::parent)
        .map(Path::to_path_buf)
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| cwd.clone());
    if let Some(path) = &project_path {
        settings.remember(path);
        settings.save(&settings_path);
    }

    // Shared state
    let sequence = Arc::new(Mutex::new(seq));

    // Channels
    let (log_tx, log_rx) = mpsc::channel::<String>();
    let (cmd_tx, cmd_rx) = mpsc::channel::<Command>();
    let (event_tx, event_rx) = mpsc::channel::<RunEvent>();

    // Wire logger to TUI
    logger::set_tui_sender(log_tx);
    logger::info("autostep started");

    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let mut app = autostep_tui::App::new(
        Arc::clone(&sequence),
        project_dir,
        settings,
        settings_path,
        log_rx,
        event_rx,
        cmd_tx,
    );
    app.watch_mode = watching;

    // Spawn run supervisor on a background thread
    let probe = create_probe();
    let shared = Arc::clone(&sequence);
    let supervisor = thread::spawn(move || {
        runner::supervise(shared, probe, run_config, cmd_rx, event_tx);
    });

    // Run TUI event loop on main thread
    let result = autostep_tui::event::run(&mut terminal, &mut app);

    // Restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen, DisableMouseCapture)?;
    terminal.show_cursor()?;

    // Dropping the app closes the command channel, which also stops the supervisor.
    drop(app);
    supervisor.join().ok();

    result
}
