use std::path::PathBuf;
use std::sync::{mpsc, Arc, Mutex};

use autostep_core::logger;
use autostep_core::project;
use autostep_core::sequence::Sequence;
use autostep_core::settings::Settings;
use autostep_core::types::{Command, RunEvent, RunState};

use crate::confirm::ConfirmDialog;

/// What a confirm dialog does when answered Yes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pending {
    DeleteStep(usize),
    Quit,
}

pub struct App {
    pub sequence: Arc<Mutex<Sequence>>,
    pub project_dir: PathBuf,
    pub settings: Settings,
    pub settings_path: PathBuf,
    pub selected: usize,
    pub run_state: RunState,
    /// 1-based position of the step being executed.
    pub current_step: Option<usize>,
    pub current_loop: Option<(u64, Option<u64>)>,
    pub log_visible: bool,
    pub log_messages: Vec<String>,
    pub log_scroll: usize, // scroll offset from bottom (0 = latest)
    pub log_rx: mpsc::Receiver<String>,
    pub event_rx: mpsc::Receiver<RunEvent>,
    pub cmd_tx: mpsc::Sender<Command>,
    pub confirm: Option<(ConfirmDialog, Pending)>,
    /// The sequence was compiled from watchers; it is never written back.
    pub watch_mode: bool,
    pub should_quit: bool,
}

impl App {
    pub fn new(
        sequence: Arc<Mutex<Sequence>>,
        project_dir: PathBuf,
        settings: Settings,
        settings_path: PathBuf,
        log_rx: mpsc::Receiver<String>,
        event_rx: mpsc::Receiver<RunEvent>,
        cmd_tx: mpsc::Sender<Command>,
    ) -> Self {
        Self {
            sequence,
            project_dir,
            settings,
            settings_path,
            selected: 0,
            run_state: RunState::Idle,
            current_step: None,
            current_loop: None,
            log_visible: true,
            log_messages: Vec::new(),
            log_scroll: 0,
            log_rx,
            event_rx,
            cmd_tx,
            confirm: None,
            watch_mode: false,
            should_quit: false,
        }
    }

    pub fn drain_logs(&mut self) {
        while let Ok(msg) = self.log_rx.try_recv() {
            self.log_messages.push(msg);
        }
    }

    /// Apply run events; the banner and step marker follow them only.
    pub fn drain_events(&mut self) {
        while let Ok(event) = self.event_rx.try_recv() {
            match event {
                RunEvent::StateChanged(state) => {
                    self.run_state = state;
                    if !state.is_active() {
                        self.current_step = None;
                    }
                }
                RunEvent::LoopStarted { iteration, total } => self.current_loop = Some((iteration, total)),
                RunEvent::StepStarted { position, .. } => self.current_step = Some(position),
                RunEvent::Finished(_) => {
                    self.current_step = None;
                    self.current_loop = None;
                }
                RunEvent::Warning { .. } | RunEvent::Timeout { .. } | RunEvent::StepFailed { .. } => {}
            }
        }
    }

    pub fn scroll_log_up(&mut self, n: usize) {
        self.log_scroll = self.log_scroll.saturating_add(n);
    }

    pub fn scroll_log_down(&mut self, n: usize) {
        self.log_scroll = self.log_scroll.saturating_sub(n);
    }

    fn step_count(&self) -> usize {
        self.sequence.lock().map(|s| s.steps().len()).unwrap_or(0)
    }

    pub fn select_up(&mut self) {
        if self.selected > 0 {
            self.selected -= 1;
        }
    }

    pub fn select_down(&mut self) {
        if self.selected + 1 < self.step_count() {
            self.selected += 1;
        }
    }

    /// Structural edits are refused while a run is active.
    fn editable(&self) -> bool {
        if self.watch_mode {
            logger::warn("watch mode: the generated program cannot be edited");
            return false;
        }
        if self.run_state.is_active() {
            logger::warn("cannot edit steps while the sequence is running");
            return false;
        }
        true
    }

    fn with_sequence<R>(&self, f: impl FnOnce(&mut Sequence) -> R) -> Option<R> {
        match self.sequence.lock() {
            Ok(mut seq) => Some(f(&mut seq)),
            Err(_) => {
                logger::error("sequence lock poisoned");
                None
            }
        }
    }

    pub fn move_step_up(&mut self) {
        if !self.editable() {
            return;
        }
        let index = self.selected;
        if let Some(Ok(true)) = self.with_sequence(|s| s.move_step_up(index)) {
            self.selected -= 1;
        }
    }

    pub fn move_step_down(&mut self) {
        if !self.editable() {
            return;
        }
        let index = self.selected;
        if let Some(Ok(true)) = self.with_sequence(|s| s.move_step_down(index)) {
            self.selected += 1;
        }
    }

    pub fn request_delete(&mut self) {
        if !self.editable() || self.selected >= self.step_count() {
            return;
        }
        let dialog = ConfirmDialog::new(format!("Delete step {}?", self.selected + 1));
        self.confirm = Some((dialog, Pending::DeleteStep(self.selected)));
    }

    pub fn request_quit(&mut self) {
        let modified = self.with_sequence(|s| s.is_modified()).unwrap_or(false);
        if modified {
            self.confirm = Some((ConfirmDialog::new("Quit without saving?"), Pending::Quit));
        } else {
            self.quit();
        }
    }

    /// Close the dialog; act on it if the selection is Yes.
    pub fn answer_confirm(&mut self) {
        let Some((dialog, pending)) = self.confirm.take() else { return };
        if !dialog.selected {
            return;
        }
        match pending {
            Pending::DeleteStep(index) => {
                if !self.editable() {
                    return;
                }
                match self.with_sequence(|s| s.delete_step(index)) {
                    Some(Ok(step)) => {
                        logger::info(&format!("deleted step {} ({})", index + 1, step.action.name()));
                        let len = self.step_count();
                        self.selected = self.selected.min(len.saturating_sub(1));
                    }
                    Some(Err(e)) => logger::error(&format!("delete failed: {}", e)),
                    None => {}
                }
            }
            Pending::Quit => self.quit(),
        }
    }

    pub fn cancel_confirm(&mut self) {
        self.confirm = None;
    }

    pub fn start_stop(&mut self) {
        let cmd = if self.run_state.is_active() { Command::Stop } else { Command::Start };
        self.cmd_tx.send(cmd).ok();
    }

    pub fn save(&mut self) {
        if self.watch_mode {
            logger::warn("watch mode: save is disabled so the project file keeps its authored steps");
            return;
        }
        let dir = self.project_dir.clone();
        match self.with_sequence(|s| project::save(s, &dir)) {
            Some(Ok(path)) => {
                self.settings.remember(&path);
                self.settings.save(&self.settings_path);
            }
            Some(Err(e)) => logger::error(&format!("save failed: {}", e)),
            None => {}
        }
    }

    pub fn toggle_log(&mut self) {
        self.log_visible = !self.log_visible;
    }

    pub fn quit(&mut self) {
        self.cmd_tx.send(Command::Quit).ok();
        self.should_quit = true;
    }
}
