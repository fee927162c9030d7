use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::interpreter::{Interpreter, RunConfig};
use crate::logger;
use crate::platform::ScreenProbe;
use crate::sequence::Sequence;
use crate::types::*;

type Worker = JoinHandle<Box<dyn ScreenProbe>>;

/// Owns the probe while idle; a run borrows it on the worker thread.
struct Supervisor {
    sequence: Arc<Mutex<Sequence>>,
    probe: Option<Box<dyn ScreenProbe>>,
    worker: Option<Worker>,
    cancel: Arc<AtomicBool>,
    config: RunConfig,
    event_tx: mpsc::Sender<RunEvent>,
}

impl Supervisor {
    fn start(&mut self) {
        self.reap();
        if self.worker.is_some() {
            logger::warn("a run is already active; start ignored");
            return;
        }
        let Some(mut probe) = self.probe.take() else {
            logger::error("screen probe unavailable; cannot start");
            return;
        };
        // Runs see a snapshot; edits made meanwhile apply to the next run.
        let snapshot = match self.sequence.lock() {
            Ok(seq) => seq.clone(),
            Err(_) => {
                logger::error("sequence lock poisoned; cannot start");
                self.probe = Some(probe);
                return;
            }
        };

        self.cancel.store(false, Ordering::Release);
        let cancel = Arc::clone(&self.cancel);
        let tx = self.event_tx.clone();
        let config = self.config;
        self.worker = Some(thread::spawn(move || {
            let mut interpreter = Interpreter::new(&snapshot, config, cancel).with_events(tx);
            // validation failures are logged by the interpreter
            interpreter.run(probe.as_mut()).ok();
            probe
        }));
    }

    fn stop(&mut self) {
        if self.worker.is_some() {
            logger::info("stop requested");
            self.cancel.store(true, Ordering::Release);
        }
    }

    /// Take the probe back from a finished worker.
    fn reap(&mut self) {
        if self.worker.as_ref().is_some_and(|w| w.is_finished()) {
            self.join();
        }
    }

    fn join(&mut self) {
        let Some(worker) = self.worker.take() else { return };
        match worker.join() {
            Ok(probe) => self.probe = Some(probe),
            Err(_) => logger::error("run worker panicked; screen probe lost"),
        }
    }
}

/// Supervisor loop. Runs on a background thread until `Quit` or until the
/// command channel closes.
pub fn supervise(
    sequence: Arc<Mutex<Sequence>>,
    probe: Box<dyn ScreenProbe>,
    config: RunConfig,
    cmd_rx: mpsc::Receiver<Command>,
    event_tx: mpsc::Sender<RunEvent>,
) {
    let mut sup = Supervisor {
        sequence,
        probe: Some(probe),
        worker: None,
        cancel: Arc::new(AtomicBool::new(false)),
        config,
        event_tx,
    };

    loop {
        let cmd = match cmd_rx.recv_timeout(Duration::from_millis(100)) {
            Ok(cmd) => cmd,
            Err(RecvTimeoutError::Timeout) => {
                sup.reap();
                continue;
            }
            Err(RecvTimeoutError::Disconnected) => Command::Quit,
        };
        match cmd {
            Command::Start => sup.start(),
            Command::Stop => sup.stop(),
            Command::Quit => {
                logger::info("shutting down");
                sup.cancel.store(true, Ordering::Release);
                sup.join();
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::scripted::{ProbeCall, ScriptedProbe};
    use crate::step::*;

    fn fast() -> RunConfig {
        RunConfig { poll_interval: Duration::from_millis(5), start_delay: Duration::ZERO }
    }

    fn press(key: &str) -> Step {
        Step::new(Action::PressKey(PressKeyParams { key: key.into() }))
    }

    struct Harness {
        seq: Arc<Mutex<Sequence>>,
        cmd_tx: mpsc::Sender<Command>,
        events: mpsc::Receiver<RunEvent>,
        handle: JoinHandle<()>,
    }

    fn spawn(seq: Sequence, probe: ScriptedProbe) -> Harness {
        let seq = Arc::new(Mutex::new(seq));
        let (cmd_tx, cmd_rx) = mpsc::channel();
        let (event_tx, events) = mpsc::channel();
        let shared = Arc::clone(&seq);
        let handle = thread::spawn(move || supervise(shared, Box::new(probe), fast(), cmd_rx, event_tx));
        Harness { seq, cmd_tx, events, handle }
    }

    fn wait_finished(events: &mpsc::Receiver<RunEvent>) -> RunOutcome {
        loop {
            match events.recv_timeout(Duration::from_secs(5)).unwrap() {
                RunEvent::Finished(outcome) => return outcome,
                _ => continue,
            }
        }
    }

    #[test]
    fn start_runs_a_snapshot() {
        let mut seq = Sequence::new("s");
        seq.push_step(press("a"));
        seq.push_step(Step::new(Action::Wait(WaitParams::fixed(0.05))));
        let probe = ScriptedProbe::new();
        let log = probe.call_log();
        let h = spawn(seq, probe);

        h.cmd_tx.send(Command::Start).unwrap();
        // edits during the run don't reach it
        thread::sleep(Duration::from_millis(10));
        h.seq.lock().unwrap().push_step(press("late"));

        assert_eq!(wait_finished(&h.events), RunOutcome::Completed { loops: 1 });
        let keys: Vec<ProbeCall> = log.lock().unwrap().iter().filter(|c| c.is_input()).cloned().collect();
        assert_eq!(keys, vec![ProbeCall::KeyPress("a".into())]);

        // the probe came back, so a second run works and sees the edit
        thread::sleep(Duration::from_millis(150));
        h.cmd_tx.send(Command::Start).unwrap();
        assert_eq!(wait_finished(&h.events), RunOutcome::Completed { loops: 1 });
        assert!(log.lock().unwrap().contains(&ProbeCall::KeyPress("late".into())));

        h.cmd_tx.send(Command::Quit).unwrap();
        h.handle.join().unwrap();
    }

    #[test]
    fn stop_ends_infinite_run_and_start_is_ignored_while_active() {
        let mut seq = Sequence::new("forever");
        seq.set_loop_count(0);
        seq.push_step(Step::new(Action::Wait(WaitParams::fixed(0.01))));
        let h = spawn(seq, ScriptedProbe::new());

        h.cmd_tx.send(Command::Start).unwrap();
        thread::sleep(Duration::from_millis(30));
        h.cmd_tx.send(Command::Start).unwrap();
        h.cmd_tx.send(Command::Stop).unwrap();

        assert!(matches!(wait_finished(&h.events), RunOutcome::Stopped { .. }));
        assert!(h.events.recv_timeout(Duration::from_millis(200)).is_err());

        h.cmd_tx.send(Command::Quit).unwrap();
        h.handle.join().unwrap();
    }

    #[test]
    fn quit_cancels_active_run() {
        let mut seq = Sequence::new("long");
        seq.push_step(Step::new(Action::Wait(WaitParams::fixed(30.0))));
        let h = spawn(seq, ScriptedProbe::new());

        h.cmd_tx.send(Command::Start).unwrap();
        thread::sleep(Duration::from_millis(20));
        h.cmd_tx.send(Command::Quit).unwrap();
        h.handle.join().unwrap();
        assert_eq!(wait_finished(&h.events), RunOutcome::Stopped { loops_completed: 0 });
    }
}
