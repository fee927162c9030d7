use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;

use crate::error::{Interrupt, ValidationError};
use crate::logger;
use crate::platform::ScreenProbe;
use crate::sequence::Sequence;
use crate::sleep::{random_secs, sleep_interruptible};
use crate::step::{Action, ClickParams, JumpTarget, Step};
use crate::types::*;

const PREFIX: &str = "run";

/// Timing knobs for a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunConfig {
    /// Sleep between polls of Wait-for-* steps; also the cancellation granularity.
    pub poll_interval: Duration,
    /// Settle time after minimizing the UI, before step 1.
    pub start_delay: Duration,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(250),
            start_delay: Duration::from_millis(500),
        }
    }
}

enum Flow {
    Next,
    Jump(usize),
}

enum LoopExit {
    Exhausted,
    Interrupted(Interrupt),
}

/// Restores the UI however the run ends.
struct UiGuard<'p> {
    probe: &'p mut dyn ScreenProbe,
}

impl Drop for UiGuard<'_> {
    fn drop(&mut self) {
        self.probe.restore_ui();
    }
}

fn secs(s: f64) -> Duration {
    Duration::try_from_secs_f64(s.max(0.0)).unwrap_or(Duration::ZERO)
}

/// Walks a sequence's steps with a program counter, loop after loop.
///
/// Borrows the sequence for the whole run; callers that keep editing should
/// hand it a snapshot.
pub struct Interpreter<'s> {
    seq: &'s Sequence,
    config: RunConfig,
    cancel: Arc<AtomicBool>,
    events: Option<Sender<RunEvent>>,
    state: RunState,
    pc: usize,
    loop_index: u64,
    completed: u64,
}

impl<'s> Interpreter<'s> {
    pub fn new(seq: &'s Sequence, config: RunConfig, cancel: Arc<AtomicBool>) -> Self {
        logger::register_prefix(PREFIX, logger::COLOR_BLUE);
        Self {
            seq,
            config,
            cancel,
            events: None,
            state: RunState::Idle,
            pc: 0,
            loop_index: 0,
            completed: 0,
        }
    }

    /// Report progress on `tx` as well as in the log.
    pub fn with_events(mut self, tx: Sender<RunEvent>) -> Self {
        self.events = Some(tx);
        self
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn program_counter(&self) -> usize {
        self.pc
    }

    pub fn loop_index(&self) -> u64 {
        self.loop_index
    }

    /// Execute the sequence to completion, stop, or abort.
    ///
    /// Validation failures are returned before anything touches the screen.
    /// With `loop_count == 0` this only returns once stopped or aborted, and a
    /// `Goto` back to an earlier step never ends its loop iteration.
    pub fn run(&mut self, probe: &mut dyn ScreenProbe) -> Result<RunOutcome, ValidationError> {
        if let Err(e) = self.seq.validate() {
            logger::error_p(PREFIX, &format!("cannot run '{}': {}", self.seq.name(), e));
            return Err(e);
        }
        for hazard in self.seq.steps().jump_hazards() {
            self.warn(hazard.position, hazard.to_string());
        }

        self.pc = 0;
        self.loop_index = 0;
        self.completed = 0;
        self.set_state(RunState::Running);

        let total = self.seq.loop_count() as u64;
        logger::info_p(PREFIX, &format!("--- running sequence: {} ---", self.seq.name()));
        if total == 0 {
            logger::info_p(PREFIX, "looping indefinitely; stop or abort to end");
        } else {
            logger::info_p(PREFIX, &format!("looping {} time(s)", total));
        }

        let exit = {
            let mut guard = UiGuard { probe };
            guard.probe.minimize_ui();
            let exit = match self.pause(&*guard.probe, self.config.start_delay) {
                Ok(()) => self.run_loops(&mut *guard.probe, total),
                Err(i) => LoopExit::Interrupted(i),
            };
            // Aborting is reported before the guard restores the UI
            if let LoopExit::Interrupted(Interrupt::Abort) = exit {
                logger::error_p(PREFIX, "!!! abort signal received, stopping all loops !!!");
                self.set_state(RunState::Aborting);
            }
            exit
        };

        let outcome = match exit {
            LoopExit::Exhausted => RunOutcome::Completed { loops: self.completed },
            LoopExit::Interrupted(Interrupt::Abort) => RunOutcome::Aborted { loops_completed: self.completed },
            LoopExit::Interrupted(Interrupt::Stop) => {
                RunOutcome::Stopped { loops_completed: self.completed }
            }
        };

        self.set_state(RunState::Stopped);
        logger::info_p(PREFIX, &format!("--- sequence finished: {} ({}) ---", self.seq.name(), outcome));
        self.emit(RunEvent::Finished(outcome));
        Ok(outcome)
    }

    fn run_loops(&mut self, probe: &mut dyn ScreenProbe, total: u64) -> LoopExit {
        let len = self.seq.steps().len();
        loop {
            if total != 0 && self.loop_index >= total {
                return LoopExit::Exhausted;
            }
            if let Some(i) = self.interrupt(&*probe) {
                return LoopExit::Interrupted(i);
            }

            self.loop_index += 1;
            if total == 0 {
                logger::info_p(PREFIX, &format!("executing loop {}", self.loop_index));
            } else {
                logger::info_p(PREFIX, &format!("executing loop {}/{}", self.loop_index, total));
            }
            self.emit(RunEvent::LoopStarted {
                iteration: self.loop_index,
                total: (total != 0).then_some(total),
            });

            self.pc = 0;
            while self.pc < len {
                match self.execute(probe, self.pc) {
                    Ok(next) => self.pc = next,
                    Err(i) => return LoopExit::Interrupted(i),
                }
            }
            self.completed += 1;
        }
    }

    /// Run the step at `pc` and return the next program counter.
    /// Only an interrupt escapes; step failures are logged and fall through.
    fn execute(&mut self, probe: &mut dyn ScreenProbe, pc: usize) -> Result<usize, Interrupt> {
        if let Some(i) = self.interrupt(&*probe) {
            return Err(i);
        }

        let seq = self.seq;
        let len = seq.steps().len();
        let Some(step) = seq.steps().get(pc) else {
            return Ok(len);
        };
        let position = pc + 1;
        let action = step.action.name();
        logger::info_p(
            PREFIX,
            &format!(
                "step {}/{}: {} on {} ({})",
                position,
                len,
                action,
                step.object.as_deref().unwrap_or("-"),
                step.action.summary()
            ),
        );
        self.emit(RunEvent::StepStarted { position, action });

        let object = self.resolve_object(position, step);
        let flow = match self.dispatch(probe, position, step, object) {
            Ok(flow) => flow,
            Err(err) => match err.downcast::<Interrupt>() {
                Ok(i) => return Err(i),
                Err(err) => {
                    let error = format!("{:#}", err);
                    logger::error_p(
                        PREFIX,
                        &format!(
                            "error executing step {} ({} on {}): {}",
                            position,
                            action,
                            step.object.as_deref().unwrap_or("-"),
                            error
                        ),
                    );
                    self.emit(RunEvent::StepFailed { position, action, error });
                    Flow::Next
                }
            },
        };

        Ok(match flow {
            Flow::Next => pc + 1,
            Flow::Jump(target) => target,
        })
    }

    fn resolve_object(&self, position: usize, step: &Step) -> Option<&'s ScreenObject> {
        let name = step.object.as_deref()?;
        let seq = self.seq;
        match seq.objects().get(name) {
            Some(obj) => {
                if let ScreenObject::Image { image_path, .. } = obj {
                    if !image_path.exists() {
                        self.warn(
                            position,
                            format!("image file missing for '{}' at {}", name, image_path.display()),
                        );
                    }
                }
                Some(obj)
            }
            None => {
                self.warn(position, format!("object '{}' not found; running without it", name));
                None
            }
        }
    }

    fn dispatch(
        &mut self,
        probe: &mut dyn ScreenProbe,
        position: usize,
        step: &Step,
        object: Option<&ScreenObject>,
    ) -> Result<Flow> {
        let len = self.seq.steps().len();
        let name = step.object.as_deref().unwrap_or("-");

        match &step.action {
            // --- control actions: choose the next pc, never inject input ---
            Action::GotoStep(p) => Ok(match p.target_step.resolve(len) {
                Some(target) => {
                    logger::info_p(PREFIX, &format!("    goto step {}", target + 1));
                    Flow::Jump(target)
                }
                None => {
                    self.warn(position, format!("invalid target step for Goto: {}", p.target_step));
                    Flow::Next
                }
            }),

            Action::IfImageFound(p) => {
                let Some(ScreenObject::Image { image_path, confidence, .. }) = object else {
                    self.warn(position, format!("invalid condition object for If Image Found: {}", name));
                    return Ok(Flow::Next);
                };
                let confidence = p.confidence.unwrap_or(*confidence);
                let found = probe.locate(image_path, confidence, None)?.is_some();
                logger::info_p(
                    PREFIX,
                    &format!("    IF: image '{}' {}", name, if found { "FOUND" } else { "NOT found" }),
                );
                Ok(self.branch(position, found, p.then_step, p.else_step, len))
            }

            Action::IfPixelColor(p) => {
                let Some(ScreenObject::Pixel { coords, rgb }) = object else {
                    self.warn(position, format!("invalid condition object for If Pixel Color: {}", name));
                    return Ok(Flow::Next);
                };
                let expected = p.expected_rgb.unwrap_or(*rgb);
                let actual = probe.pixel_color(*coords)?;
                let matched = actual == expected;
                if matched {
                    logger::info_p(PREFIX, &format!("    IF: pixel '{}' color MATCHED {}", name, expected));
                } else {
                    logger::info_p(
                        PREFIX,
                        &format!("    IF: pixel '{}' color {} did NOT match {}", name, actual, expected),
                    );
                }
                Ok(self.branch(position, matched, p.then_step, p.else_step, len))
            }

            // --- standard actions: always fall through ---
            Action::Click(p) => {
                self.click(probe, position, name, object, p)?;
                Ok(Flow::Next)
            }

            Action::Wait(p) => {
                let seconds = match p.random_range() {
                    Some((lo, hi)) => {
                        let s = random_secs(lo, hi);
                        logger::info_p(PREFIX, &format!("    random wait: {:.2}s", s));
                        s
                    }
                    None => {
                        logger::info_p(PREFIX, &format!("    static wait: {}s", p.duration_s));
                        p.duration_s
                    }
                };
                self.pause(&*probe, secs(seconds))?;
                Ok(Flow::Next)
            }

            Action::WaitForImage(p) => {
                let Some(ScreenObject::Image { image_path, confidence, .. }) = object else {
                    self.warn(position, format!("Wait for Image needs an image object, got '{}'", name));
                    return Ok(Flow::Next);
                };
                let confidence = p.confidence.unwrap_or(*confidence);
                let found = self.poll(probe, secs(p.timeout_s), |probe| {
                    Ok(probe.locate(image_path, confidence, None)?.is_some())
                })?;
                if found {
                    logger::info_p(PREFIX, &format!("    image '{}' found", name));
                } else {
                    self.timeout(position, format!("image '{}' not found after {}s", name, p.timeout_s));
                }
                Ok(Flow::Next)
            }

            Action::WaitForPixelColor(p) => {
                let Some(ScreenObject::Pixel { coords, rgb }) = object else {
                    self.warn(position, format!("Wait for Pixel Color needs a pixel object, got '{}'", name));
                    return Ok(Flow::Next);
                };
                let expected = p.expected_rgb.unwrap_or(*rgb);
                let mut last = None;
                let found = self.poll(probe, secs(p.timeout_s), |probe| {
                    let color = probe.pixel_color(*coords)?;
                    last = Some(color);
                    Ok(color == expected)
                })?;
                if found {
                    logger::info_p(PREFIX, &format!("    pixel '{}' color matched {}", name, expected));
                } else {
                    let last = last.map(|c| c.to_string()).unwrap_or_else(|| "none".into());
                    self.timeout(
                        position,
                        format!("pixel '{}' never matched {} within {}s, last {}", name, expected, p.timeout_s, last),
                    );
                }
                Ok(Flow::Next)
            }

            Action::KeyboardInput(p) => {
                if p.text.is_empty() {
                    self.warn(position, "no text specified for Keyboard Input".into());
                } else {
                    self.ensure_running(&*probe)?;
                    probe.type_text(&p.text, secs(p.interval))?;
                    logger::info_p(PREFIX, &format!("    typed: '{}'", p.text));
                }
                Ok(Flow::Next)
            }

            Action::PressKey(p) => {
                if p.key.is_empty() {
                    self.warn(position, "no key specified for Press Key".into());
                } else {
                    self.ensure_running(&*probe)?;
                    probe.key_press(&p.key)?;
                    logger::info_p(PREFIX, &format!("    pressed key: '{}'", p.key));
                }
                Ok(Flow::Next)
            }

            Action::HotkeyCombo(p) => {
                if p.key_combo.is_empty() {
                    self.warn(position, "no keys specified for Hotkey Combo".into());
                } else {
                    self.ensure_running(&*probe)?;
                    probe.hotkey(&p.key_combo)?;
                    logger::info_p(PREFIX, &format!("    hotkey: {}", p.key_combo.join("+")));
                }
                Ok(Flow::Next)
            }

            Action::Scroll(p) => {
                let at = match (p.x, p.y) {
                    (Some(x), Some(y)) => Some(Point::new(x, y)),
                    _ => None,
                };
                self.ensure_running(&*probe)?;
                probe.scroll(p.direction, p.amount, at)?;
                match at {
                    Some(at) => logger::info_p(PREFIX, &format!("    scrolled {} by {} at {}", p.direction, p.amount, at)),
                    None => logger::info_p(PREFIX, &format!("    scrolled {} by {}", p.direction, p.amount)),
                }
                Ok(Flow::Next)
            }
        }
    }

    fn click(
        &self,
        probe: &mut dyn ScreenProbe,
        position: usize,
        name: &str,
        object: Option<&ScreenObject>,
        p: &ClickParams,
    ) -> Result<()> {
        let at = match object {
            Some(ScreenObject::Region { coords }) => Some(coords.center()),
            Some(ScreenObject::Pixel { coords, .. }) => Some(*coords),
            Some(ScreenObject::Image { image_path, confidence, .. }) => {
                let confidence = p.confidence.unwrap_or(*confidence);
                match probe.locate(image_path, confidence, None)? {
                    Some(found) => Some(found.center()),
                    None => {
                        self.warn(position, format!("image '{}' not found for click", name));
                        return Ok(());
                    }
                }
            }
            None => None,
        };
        let Some(at) = at else {
            self.warn(position, format!("click coords not determined for '{}'", name));
            return Ok(());
        };

        self.ensure_running(&*probe)?;
        probe.click(at, p.button, p.clicks.max(1), secs(p.interval_s()))?;
        logger::info_p(PREFIX, &format!("    clicked {} {}x at {}", p.button, p.clicks.max(1), at));
        Ok(())
    }

    /// Pick the branch target; an invalid explicit target warns and falls through.
    fn branch(&self, position: usize, condition: bool, then_step: JumpTarget, else_step: JumpTarget, len: usize) -> Flow {
        let (label, target) = if condition { ("then", then_step) } else { ("else", else_step) };
        match target.resolve(len) {
            Some(pc) => Flow::Jump(pc),
            None => {
                if !target.is_next() {
                    self.warn(position, format!("invalid '{}' step {}; falling through", label, target));
                }
                Flow::Next
            }
        }
    }

    /// Check until `check` holds or `timeout` elapses. Always checks at least once.
    fn poll(
        &self,
        probe: &mut dyn ScreenProbe,
        timeout: Duration,
        mut check: impl FnMut(&mut dyn ScreenProbe) -> Result<bool>,
    ) -> Result<bool> {
        let start = Instant::now();
        loop {
            self.ensure_running(&*probe)?;
            if check(&mut *probe)? {
                return Ok(true);
            }
            let elapsed = start.elapsed();
            if elapsed >= timeout {
                return Ok(false);
            }
            self.pause(&*probe, self.config.poll_interval.min(timeout - elapsed))?;
        }
    }

    fn pause(&self, probe: &dyn ScreenProbe, duration: Duration) -> Result<(), Interrupt> {
        if sleep_interruptible(duration, self.config.poll_interval, || self.interrupt(probe).is_some()) {
            Ok(())
        } else {
            Err(self.interrupt(probe).unwrap_or(Interrupt::Stop))
        }
    }

    fn ensure_running(&self, probe: &dyn ScreenProbe) -> Result<(), Interrupt> {
        match self.interrupt(probe) {
            Some(i) => Err(i),
            None => Ok(()),
        }
    }

    fn interrupt(&self, probe: &dyn ScreenProbe) -> Option<Interrupt> {
        if probe.abort_requested() {
            Some(Interrupt::Abort)
        } else if self.cancel.load(Ordering::Acquire) {
            Some(Interrupt::Stop)
        } else {
            None
        }
    }

    fn set_state(&mut self, state: RunState) {
        self.state = state;
        self.emit(RunEvent::StateChanged(state));
    }

    fn warn(&self, position: usize, message: String) {
        logger::warn_p(PREFIX, &format!("step {}: {}", position, message));
        self.emit(RunEvent::Warning { position, message });
    }

    fn timeout(&self, position: usize, message: String) {
        logger::warn_p(PREFIX, &format!("step {}: TIMEOUT: {}", position, message));
        self.emit(RunEvent::Timeout { position, message });
    }

    fn emit(&self, event: RunEvent) {
        if let Some(tx) = &self.events {
            tx.send(event).ok();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use std::sync::mpsc;
    use std::thread;

    use crate::platform::scripted::{ProbeCall, ScriptedProbe};
    use crate::step::*;

    fn fast() -> RunConfig {
        RunConfig { poll_interval: Duration::from_millis(5), start_delay: Duration::ZERO }
    }

    fn press(key: &str) -> Step {
        Step::new(Action::PressKey(PressKeyParams { key: key.into() }))
    }

    fn goto(n: usize) -> Step {
        Step::new(Action::GotoStep(GotoParams { target_step: JumpTarget::Step(n) }))
    }

    fn wait(s: f64) -> Step {
        Step::new(Action::Wait(WaitParams::fixed(s)))
    }

    fn if_pixel(obj: &str, expected: Rgb, then_step: JumpTarget, else_step: JumpTarget) -> Step {
        Step::on(obj, Action::IfPixelColor(IfPixelParams { expected_rgb: Some(expected), then_step, else_step }))
    }

    fn sequence(loops: i64, steps: Vec<Step>) -> Sequence {
        let mut seq = Sequence::new("test");
        seq.set_loop_count(loops);
        for s in steps {
            seq.push_step(s);
        }
        seq
    }

    struct Run {
        outcome: Result<RunOutcome, ValidationError>,
        events: Vec<RunEvent>,
        calls: Vec<ProbeCall>,
    }

    impl Run {
        fn keys(&self) -> Vec<String> {
            self.calls
                .iter()
                .filter_map(|c| match c {
                    ProbeCall::KeyPress(k) => Some(k.clone()),
                    _ => None,
                })
                .collect()
        }

        fn warnings(&self) -> Vec<usize> {
            self.events
                .iter()
                .filter_map(|e| match e {
                    RunEvent::Warning { position, .. } => Some(*position),
                    _ => None,
                })
                .collect()
        }

        fn timeouts(&self) -> usize {
            self.events.iter().filter(|e| matches!(e, RunEvent::Timeout { .. })).count()
        }
    }

    fn run_with(seq: &Sequence, mut probe: ScriptedProbe, cancel: Arc<AtomicBool>) -> Run {
        let log = probe.call_log();
        let (tx, rx) = mpsc::channel();
        let outcome = Interpreter::new(seq, fast(), cancel).with_events(tx).run(&mut probe);
        let calls = log.lock().unwrap().clone();
        Run { outcome, events: rx.try_iter().collect(), calls }
    }

    fn run(seq: &Sequence, probe: ScriptedProbe) -> Run {
        run_with(seq, probe, Arc::new(AtomicBool::new(false)))
    }

    #[test]
    fn body_runs_exactly_loop_count_times() {
        let seq = sequence(3, vec![press("a"), press("b")]);
        let r = run(&seq, ScriptedProbe::new());
        assert_eq!(r.outcome, Ok(RunOutcome::Completed { loops: 3 }));
        assert_eq!(r.keys(), vec!["a", "b", "a", "b", "a", "b"]);
        assert_eq!(r.calls.first(), Some(&ProbeCall::MinimizeUi));
        assert_eq!(r.calls.last(), Some(&ProbeCall::RestoreUi));
        let loops = r.events.iter().filter(|e| matches!(e, RunEvent::LoopStarted { .. })).count();
        assert_eq!(loops, 3);
    }

    #[test]
    fn invalid_sequences_never_start() {
        let r = run(&sequence(1, vec![]), ScriptedProbe::new());
        assert_eq!(r.outcome, Err(ValidationError::EmptySteps));
        assert!(r.calls.is_empty());
        assert!(r.events.is_empty());

        let r = run(&sequence(-1, vec![press("a")]), ScriptedProbe::new());
        assert_eq!(r.outcome, Err(ValidationError::NegativeLoopCount(-1)));
        assert!(r.calls.is_empty());
    }

    #[test]
    fn state_transitions() {
        let r = run(&sequence(1, vec![press("a")]), ScriptedProbe::new());
        let states: Vec<RunState> = r
            .events
            .iter()
            .filter_map(|e| match e {
                RunEvent::StateChanged(s) => Some(*s),
                _ => None,
            })
            .collect();
        assert_eq!(states, vec![RunState::Running, RunState::Stopped]);
        assert_eq!(r.events.last(), Some(&RunEvent::Finished(RunOutcome::Completed { loops: 1 })));
    }

    #[test]
    fn goto_jumps_to_target() {
        let seq = sequence(1, vec![goto(3), press("skipped"), press("landed")]);
        let r = run(&seq, ScriptedProbe::new());
        assert_eq!(r.keys(), vec!["landed"]);
    }

    #[test]
    fn invalid_goto_warns_and_falls_through() {
        let seq = sequence(1, vec![goto(9), press("next")]);
        let r = run(&seq, ScriptedProbe::new());
        assert_eq!(r.keys(), vec!["next"]);
        // once at run start as a hazard, once when executed
        assert_eq!(r.warnings(), vec![1, 1]);
        assert_eq!(r.outcome, Ok(RunOutcome::Completed { loops: 1 }));
    }

    fn branch_program(expected: Rgb, then_step: JumpTarget, else_step: JumpTarget) -> Sequence {
        let mut seq = sequence(
            1,
            vec![
                if_pixel("px", expected, then_step, else_step),
                press("fallthrough"),
                press("then"),
                press("else"),
            ],
        );
        seq.add_object("px", ScreenObject::pixel(10, 20, Rgb(255, 0, 0))).unwrap();
        seq
    }

    fn red_screen() -> ScriptedProbe {
        ScriptedProbe::new().with_pixel(Point::new(10, 20), Rgb(255, 0, 0))
    }

    #[test]
    fn if_pixel_color_takes_then_on_match() {
        let seq = branch_program(Rgb(255, 0, 0), JumpTarget::Step(3), JumpTarget::Step(4));
        let r = run(&seq, red_screen());
        assert_eq!(r.keys(), vec!["then", "else"]);
        assert!(r.calls.contains(&ProbeCall::PixelColor(Point::new(10, 20))));
    }

    #[test]
    fn if_pixel_color_takes_else_on_mismatch() {
        let seq = branch_program(Rgb(0, 0, 0), JumpTarget::Step(3), JumpTarget::Step(4));
        let r = run(&seq, red_screen());
        assert_eq!(r.keys(), vec!["else"]);
        assert!(r.warnings().is_empty());
    }

    #[test]
    fn invalid_then_target_warns_and_falls_through() {
        let seq = branch_program(Rgb(255, 0, 0), JumpTarget::Step(99), JumpTarget::Step(4));
        let r = run(&seq, red_screen());
        assert_eq!(r.keys(), vec!["fallthrough", "then", "else"]);
        assert!(r.warnings().len() >= 2);
    }

    #[test]
    fn missing_else_target_falls_through_silently() {
        let seq = branch_program(Rgb(1, 2, 3), JumpTarget::Step(3), JumpTarget::Next);
        let r = run(&seq, red_screen());
        assert_eq!(r.keys(), vec!["fallthrough", "then", "else"]);
        assert!(r.warnings().is_empty());
    }

    #[test]
    fn if_pixel_color_defaults_to_captured_rgb() {
        let mut seq = sequence(
            1,
            vec![
                Step::on(
                    "px",
                    Action::IfPixelColor(IfPixelParams {
                        expected_rgb: None,
                        then_step: JumpTarget::Step(3),
                        else_step: JumpTarget::Next,
                    }),
                ),
                press("fallthrough"),
                press("then"),
            ],
        );
        seq.add_object("px", ScreenObject::pixel(10, 20, Rgb(255, 0, 0))).unwrap();
        let r = run(&seq, red_screen());
        assert_eq!(r.keys(), vec!["then"]);
    }

    fn image_program(confidence: Option<f64>) -> Sequence {
        let mut seq = sequence(
            1,
            vec![
                Step::on(
                    "logo",
                    Action::IfImageFound(IfImageParams {
                        then_step: JumpTarget::Step(3),
                        else_step: JumpTarget::Step(2),
                        confidence,
                    }),
                ),
                press("missing"),
                press("found"),
            ],
        );
        let mut logo = ScreenObject::image("logo.png");
        if let ScreenObject::Image { confidence, .. } = &mut logo {
            *confidence = 0.7;
        }
        seq.add_object("logo", logo).unwrap();
        seq
    }

    #[test]
    fn if_image_found_branches_on_locate() {
        let probe = ScriptedProbe::new().with_image("logo.png", Rect::new(0, 0, 10, 10));
        let r = run(&image_program(None), probe);
        assert_eq!(r.keys(), vec!["found"]);

        let r = run(&image_program(None), ScriptedProbe::new());
        assert_eq!(r.keys(), vec!["missing", "found"]);
    }

    #[test]
    fn step_confidence_overrides_object_default() {
        let confidences = |r: &Run| -> Vec<f64> {
            r.calls
                .iter()
                .filter_map(|c| match c {
                    ProbeCall::Locate { confidence, .. } => Some(*confidence),
                    _ => None,
                })
                .collect()
        };
        let r = run(&image_program(Some(0.95)), ScriptedProbe::new());
        assert_eq!(confidences(&r), vec![0.95]);
        let r = run(&image_program(None), ScriptedProbe::new());
        assert_eq!(confidences(&r), vec![0.7]);
    }

    #[test]
    fn dangling_reference_warns_and_continues() {
        let seq = sequence(1, vec![Step::on("ghost", Action::Click(ClickParams::default())), press("after")]);
        let r = run(&seq, ScriptedProbe::new());
        assert_eq!(r.outcome, Ok(RunOutcome::Completed { loops: 1 }));
        assert!(!r.calls.iter().any(|c| matches!(c, ProbeCall::Click { .. })));
        assert_eq!(r.keys(), vec!["after"]);
        // unknown object, then no click point
        assert_eq!(r.warnings(), vec![1, 1]);
    }

    #[test]
    fn click_point_per_object_kind() {
        let mut seq = sequence(
            1,
            vec![
                Step::on("area", Action::Click(ClickParams::default())),
                Step::on("dot", Action::Click(ClickParams { button: MouseButton::Right, clicks: 2, ..Default::default() })),
                Step::on("icon", Action::Click(ClickParams::default())),
                Step::on("gone", Action::Click(ClickParams::default())),
            ],
        );
        seq.add_object("area", ScreenObject::region(100, 200, 50, 30)).unwrap();
        seq.add_object("dot", ScreenObject::pixel(7, 8, Rgb(1, 1, 1))).unwrap();
        seq.add_object("icon", ScreenObject::image("icon.png")).unwrap();
        seq.add_object("gone", ScreenObject::image("gone.png")).unwrap();

        let probe = ScriptedProbe::new().with_image("icon.png", Rect::new(300, 300, 20, 10));
        let r = run(&seq, probe);
        let clicks: Vec<ProbeCall> = r.calls.iter().filter(|c| c.is_input()).cloned().collect();
        assert_eq!(
            clicks,
            vec![
                ProbeCall::Click { at: Point::new(125, 215), button: MouseButton::Left, clicks: 1 },
                ProbeCall::Click { at: Point::new(7, 8), button: MouseButton::Right, clicks: 2 },
                ProbeCall::Click { at: Point::new(310, 305), button: MouseButton::Left, clicks: 1 },
            ]
        );
        assert!(r.warnings().contains(&4));
    }

    #[test]
    fn wait_for_pixel_polls_until_match() {
        let mut seq = sequence(
            1,
            vec![
                Step::on(
                    "px",
                    Action::WaitForPixelColor(WaitForPixelParams { expected_rgb: Some(Rgb(0, 255, 0)), timeout_s: 5.0 }),
                ),
                press("go"),
            ],
        );
        seq.add_object("px", ScreenObject::pixel(1, 1, Rgb(0, 0, 0))).unwrap();
        let probe = ScriptedProbe::new().with_pixel_sequence(Point::new(1, 1), [Rgb(0, 0, 0), Rgb(0, 0, 0), Rgb(0, 255, 0)]);
        let r = run(&seq, probe);
        let reads = r.calls.iter().filter(|c| matches!(c, ProbeCall::PixelColor(_))).count();
        assert_eq!(reads, 3);
        assert_eq!(r.timeouts(), 0);
        assert_eq!(r.keys(), vec!["go"]);
    }

    #[test]
    fn wait_for_pixel_times_out_and_falls_through() {
        let mut seq = sequence(
            1,
            vec![
                Step::on(
                    "px",
                    Action::WaitForPixelColor(WaitForPixelParams { expected_rgb: Some(Rgb(9, 9, 9)), timeout_s: 0.03 }),
                ),
                press("after"),
            ],
        );
        seq.add_object("px", ScreenObject::pixel(1, 1, Rgb(0, 0, 0))).unwrap();
        let r = run(&seq, ScriptedProbe::new());
        assert_eq!(r.timeouts(), 1);
        assert_eq!(r.keys(), vec!["after"]);
        assert_eq!(r.outcome, Ok(RunOutcome::Completed { loops: 1 }));
    }

    #[test]
    fn wait_for_image_zero_timeout_checks_once() {
        let mut seq = sequence(
            1,
            vec![Step::on("logo", Action::WaitForImage(WaitForImageParams { timeout_s: 0.0, confidence: None }))],
        );
        seq.add_object("logo", ScreenObject::image("logo.png")).unwrap();
        let r = run(&seq, ScriptedProbe::new());
        let locates = r.calls.iter().filter(|c| matches!(c, ProbeCall::Locate { .. })).count();
        assert_eq!(locates, 1);
        assert_eq!(r.timeouts(), 1);
    }

    #[test]
    fn wait_for_image_on_wrong_kind_warns() {
        let mut seq = sequence(
            1,
            vec![Step::on("area", Action::WaitForImage(WaitForImageParams { timeout_s: 1.0, confidence: None }))],
        );
        seq.add_object("area", ScreenObject::region(0, 0, 1, 1)).unwrap();
        let r = run(&seq, ScriptedProbe::new());
        assert_eq!(r.warnings(), vec![1]);
        assert_eq!(r.timeouts(), 0);
    }

    #[test]
    fn wait_for_image_returns_once_it_appears() {
        let mut seq = sequence(
            1,
            vec![
                Step::on("logo", Action::WaitForImage(WaitForImageParams { timeout_s: 5.0, confidence: None })),
                press("after"),
            ],
        );
        seq.add_object("logo", ScreenObject::image("logo.png")).unwrap();
        let probe = ScriptedProbe::new().with_image_sequence("logo.png", [None, None, Some(Rect::new(3, 3, 4, 4))]);
        let r = run(&seq, probe);
        let locates = r.calls.iter().filter(|c| matches!(c, ProbeCall::Locate { .. })).count();
        assert_eq!(locates, 3);
        assert_eq!(r.timeouts(), 0);
        assert_eq!(r.keys(), vec!["after"]);
        assert_eq!(r.outcome, Ok(RunOutcome::Completed { loops: 1 }));
    }

    #[test]
    fn huge_wait_is_cancellable() {
        let seq = sequence(1, vec![wait(1e19), press("never")]);
        let cancel = Arc::new(AtomicBool::new(false));
        let stopper = {
            let cancel = Arc::clone(&cancel);
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(20));
                cancel.store(true, Ordering::Release);
            })
        };
        let r = run_with(&seq, ScriptedProbe::new(), cancel);
        stopper.join().unwrap();
        assert_eq!(r.outcome, Ok(RunOutcome::Stopped { loops_completed: 0 }));
        assert!(r.keys().is_empty());
    }

    #[test]
    fn step_failure_is_logged_and_run_continues() {
        let seq = sequence(
            1,
            vec![
                press("boom"),
                Step::new(Action::KeyboardInput(KeyboardInputParams { text: "ok".into(), interval: 0.0 })),
            ],
        );
        let r = run(&seq, ScriptedProbe::new().failing("key_press"));
        assert_eq!(r.outcome, Ok(RunOutcome::Completed { loops: 1 }));
        assert!(r
            .events
            .iter()
            .any(|e| matches!(e, RunEvent::StepFailed { position: 1, action: "Press Key", .. })));
        assert!(r.calls.contains(&ProbeCall::TypeText("ok".into())));
    }

    #[test]
    fn abort_from_input_layer_stops_all_loops() {
        let seq = sequence(5, vec![press("a"), press("b")]);
        let r = run(&seq, ScriptedProbe::new().abort_after_inputs(3));
        assert_eq!(r.outcome, Ok(RunOutcome::Aborted { loops_completed: 1 }));
        assert_eq!(r.keys(), vec!["a", "b", "a"]);
        assert_eq!(r.calls.last(), Some(&ProbeCall::RestoreUi));
        let states: Vec<RunState> = r
            .events
            .iter()
            .filter_map(|e| match e {
                RunEvent::StateChanged(s) => Some(*s),
                _ => None,
            })
            .collect();
        assert_eq!(states, vec![RunState::Running, RunState::Aborting, RunState::Stopped]);
    }

    /// Records which states had been reported by the time the UI came back.
    struct StatesAtRestore {
        inner: ScriptedProbe,
        events: mpsc::Receiver<RunEvent>,
        seen: Vec<RunState>,
    }

    impl ScreenProbe for StatesAtRestore {
        fn locate(&mut self, image: &Path, confidence: f64, region: Option<Rect>) -> anyhow::Result<Option<Location>> {
            self.inner.locate(image, confidence, region)
        }
        fn pixel_color(&mut self, at: Point) -> anyhow::Result<Rgb> {
            self.inner.pixel_color(at)
        }
        fn click(&mut self, at: Point, button: MouseButton, clicks: u32, interval: Duration) -> anyhow::Result<()> {
            self.inner.click(at, button, clicks, interval)
        }
        fn key_press(&mut self, key: &str) -> anyhow::Result<()> {
            self.inner.key_press(key)
        }
        fn hotkey(&mut self, keys: &[String]) -> anyhow::Result<()> {
            self.inner.hotkey(keys)
        }
        fn type_text(&mut self, text: &str, interval: Duration) -> anyhow::Result<()> {
            self.inner.type_text(text, interval)
        }
        fn scroll(&mut self, direction: ScrollDirection, amount: u32, at: Option<Point>) -> anyhow::Result<()> {
            self.inner.scroll(direction, amount, at)
        }
        fn abort_requested(&self) -> bool {
            self.inner.abort_requested()
        }
        fn restore_ui(&mut self) {
            self.seen.extend(self.events.try_iter().filter_map(|e| match e {
                RunEvent::StateChanged(s) => Some(s),
                _ => None,
            }));
        }
    }

    #[test]
    fn aborting_is_reported_before_ui_restore() {
        let seq = sequence(1, vec![press("a"), press("b")]);
        let (tx, rx) = mpsc::channel();
        let mut probe = StatesAtRestore { inner: ScriptedProbe::new().abort_after_inputs(1), events: rx, seen: Vec::new() };
        let outcome = Interpreter::new(&seq, fast(), Arc::new(AtomicBool::new(false))).with_events(tx).run(&mut probe);
        assert_eq!(outcome, Ok(RunOutcome::Aborted { loops_completed: 0 }));
        assert_eq!(probe.seen, vec![RunState::Running, RunState::Aborting]);
        let rest: Vec<RunEvent> = probe.events.try_iter().collect();
        assert!(rest.contains(&RunEvent::StateChanged(RunState::Stopped)));
    }

    #[test]
    fn abort_requested_is_checked_before_steps() {
        let probe = ScriptedProbe::new();
        probe.abort_handle().store(true, Ordering::Release);
        let r = run(&sequence(1, vec![press("a")]), probe);
        assert_eq!(r.outcome, Ok(RunOutcome::Aborted { loops_completed: 0 }));
        assert!(r.keys().is_empty());
        assert!(r.calls.contains(&ProbeCall::RestoreUi));
    }

    #[test]
    fn cancel_stops_infinite_loop() {
        let seq = sequence(0, vec![press("tick"), wait(0.0)]);
        let cancel = Arc::new(AtomicBool::new(false));
        let stopper = {
            let cancel = Arc::clone(&cancel);
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(40));
                cancel.store(true, Ordering::Release);
            })
        };
        let r = run_with(&seq, ScriptedProbe::new(), cancel);
        stopper.join().unwrap();
        match r.outcome {
            Ok(RunOutcome::Stopped { loops_completed }) => assert!(loops_completed > 1),
            other => panic!("unexpected outcome {:?}", other),
        }
        assert_eq!(r.calls.last(), Some(&ProbeCall::RestoreUi));
    }

    #[test]
    fn cancel_interrupts_long_wait_within_a_poll_interval() {
        let seq = sequence(1, vec![wait(30.0), press("never")]);
        let cancel = Arc::new(AtomicBool::new(false));
        let stopper = {
            let cancel = Arc::clone(&cancel);
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(20));
                cancel.store(true, Ordering::Release);
            })
        };
        let start = Instant::now();
        let r = run_with(&seq, ScriptedProbe::new(), cancel);
        stopper.join().unwrap();
        assert!(start.elapsed() < Duration::from_secs(2));
        assert_eq!(r.outcome, Ok(RunOutcome::Stopped { loops_completed: 0 }));
        assert!(r.keys().is_empty());
    }

    #[test]
    fn goto_back_within_one_loop_does_not_terminate() {
        let seq = sequence(1, vec![wait(0.0), goto(1)]);
        let cancel = Arc::new(AtomicBool::new(false));
        let stopper = {
            let cancel = Arc::clone(&cancel);
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(30));
                cancel.store(true, Ordering::Release);
            })
        };
        let r = run_with(&seq, ScriptedProbe::new(), cancel);
        stopper.join().unwrap();
        assert_eq!(r.outcome, Ok(RunOutcome::Stopped { loops_completed: 0 }));
        let started = r.events.iter().filter(|e| matches!(e, RunEvent::StepStarted { .. })).count();
        assert!(started > 2);
    }

    #[test]
    fn global_input_actions() {
        let seq = sequence(
            1,
            vec![
                Step::new(Action::HotkeyCombo(HotkeyParams::new(["ctrl", "c"]))),
                Step::new(Action::Scroll(ScrollParams { direction: ScrollDirection::Up, amount: 3, x: Some(4), y: Some(5) })),
                Step::new(Action::Scroll(ScrollParams { direction: ScrollDirection::Left, amount: 2, x: Some(4), y: None })),
                Step::new(Action::KeyboardInput(KeyboardInputParams { text: String::new(), interval: 0.0 })),
                Step::new(Action::Wait(WaitParams::random(0.0, 0.01))),
            ],
        );
        let r = run(&seq, ScriptedProbe::new());
        let inputs: Vec<ProbeCall> = r.calls.iter().filter(|c| c.is_input()).cloned().collect();
        assert_eq!(
            inputs,
            vec![
                ProbeCall::Hotkey(vec!["ctrl".into(), "c".into()]),
                ProbeCall::Scroll { direction: ScrollDirection::Up, amount: 3, at: Some(Point::new(4, 5)) },
                ProbeCall::Scroll { direction: ScrollDirection::Left, amount: 2, at: None },
            ]
        );
        assert_eq!(r.warnings(), vec![4]);
    }
}
