use std::collections::{HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{bail, Result};

use crate::error::Interrupt;
use crate::types::*;
use super::ScreenProbe;

/// One recorded probe call.
#[derive(Debug, Clone, PartialEq)]
pub enum ProbeCall {
    Locate { image: PathBuf, confidence: f64 },
    PixelColor(Point),
    Click { at: Point, button: MouseButton, clicks: u32 },
    KeyPress(String),
    Hotkey(Vec<String>),
    TypeText(String),
    Scroll { direction: ScrollDirection, amount: u32, at: Option<Point> },
    MinimizeUi,
    RestoreUi,
}

impl ProbeCall {
    /// True for calls that inject input.
    pub fn is_input(&self) -> bool {
        matches!(
            self,
            ProbeCall::Click { .. }
                | ProbeCall::KeyPress(_)
                | ProbeCall::Hotkey(_)
                | ProbeCall::TypeText(_)
                | ProbeCall::Scroll { .. }
        )
    }
}

/// Shared view of everything a [`ScriptedProbe`] was asked to do.
pub type CallLog = Arc<Mutex<Vec<ProbeCall>>>;

/// Deterministic probe fed from a script of screen states.
///
/// Pixel and image answers are queues: each read consumes the front entry
/// until one is left, which then repeats. Unscripted pixels read black and
/// unscripted images are never found.
#[derive(Debug, Default)]
pub struct ScriptedProbe {
    pixels: HashMap<Point, VecDeque<Rgb>>,
    images: HashMap<PathBuf, VecDeque<Option<Location>>>,
    abort_after_inputs: Option<usize>,
    failing: HashSet<&'static str>,
    inputs: usize,
    abort: Arc<AtomicBool>,
    calls: CallLog,
}

impl ScriptedProbe {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_pixel(self, at: Point, rgb: Rgb) -> Self {
        self.with_pixel_sequence(at, [rgb])
    }

    pub fn with_pixel_sequence(mut self, at: Point, colors: impl IntoIterator<Item = Rgb>) -> Self {
        self.pixels.insert(at, colors.into_iter().collect());
        self
    }

    pub fn with_image(self, image: impl Into<PathBuf>, at: Location) -> Self {
        self.with_image_sequence(image, [Some(at)])
    }

    pub fn with_image_sequence(
        mut self,
        image: impl Into<PathBuf>,
        results: impl IntoIterator<Item = Option<Location>>,
    ) -> Self {
        self.images.insert(image.into(), results.into_iter().collect());
        self
    }

    /// Fire the kill-switch on the input call after `n` successful ones.
    pub fn abort_after_inputs(mut self, n: usize) -> Self {
        self.abort_after_inputs = Some(n);
        self
    }

    /// Make every call of this kind (`"click"`, `"key_press"`, `"hotkey"`,
    /// `"type_text"`, `"scroll"`, `"locate"`, `"pixel_color"`) fail.
    pub fn failing(mut self, call: &'static str) -> Self {
        self.failing.insert(call);
        self
    }

    /// Flag read by `abort_requested`; set it to emulate the kill-switch gesture.
    pub fn abort_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.abort)
    }

    pub fn call_log(&self) -> CallLog {
        Arc::clone(&self.calls)
    }

    fn record(&self, call: ProbeCall) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(call);
        }
    }

    fn check_failing(&self, call: &'static str) -> Result<()> {
        if self.failing.contains(call) {
            bail!("scripted failure in {}", call);
        }
        Ok(())
    }

    fn input(&mut self, kind: &'static str, call: ProbeCall) -> Result<()> {
        if self.abort_after_inputs.is_some_and(|n| self.inputs >= n) {
            self.abort.store(true, Ordering::Release);
            return Err(Interrupt::Abort.into());
        }
        self.check_failing(kind)?;
        self.inputs += 1;
        self.record(call);
        Ok(())
    }
}

fn next_of<T: Clone>(queue: Option<&mut VecDeque<T>>) -> Option<T> {
    let queue = queue?;
    if queue.len() > 1 {
        queue.pop_front()
    } else {
        queue.front().cloned()
    }
}

impl ScreenProbe for ScriptedProbe {
    fn locate(&mut self, image: &Path, confidence: f64, _region: Option<Rect>) -> Result<Option<Location>> {
        self.record(ProbeCall::Locate { image: image.to_path_buf(), confidence });
        self.check_failing("locate")?;
        Ok(next_of(self.images.get_mut(image)).flatten())
    }

    fn pixel_color(&mut self, at: Point) -> Result<Rgb> {
        self.record(ProbeCall::PixelColor(at));
        self.check_failing("pixel_color")?;
        Ok(next_of(self.pixels.get_mut(&at)).unwrap_or_default())
    }

    fn click(&mut self, at: Point, button: MouseButton, clicks: u32, _interval: Duration) -> Result<()> {
        self.input("click", ProbeCall::Click { at, button, clicks })
    }

    fn key_press(&mut self, key: &str) -> Result<()> {
        self.input("key_press", ProbeCall::KeyPress(key.to_string()))
    }

    fn hotkey(&mut self, keys: &[String]) -> Result<()> {
        self.input("hotkey", ProbeCall::Hotkey(keys.to_vec()))
    }

    fn type_text(&mut self, text: &str, _interval: Duration) -> Result<()> {
        self.input("type_text", ProbeCall::TypeText(text.to_string()))
    }

    fn scroll(&mut self, direction: ScrollDirection, amount: u32, at: Option<Point>) -> Result<()> {
        self.input("scroll", ProbeCall::Scroll { direction, amount, at })
    }

    fn abort_requested(&self) -> bool {
        self.abort.load(Ordering::Acquire)
    }

    fn minimize_ui(&mut self) {
        self.record(ProbeCall::MinimizeUi);
    }

    fn restore_ui(&mut self) {
        self.record(ProbeCall::RestoreUi);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queued_answers_repeat_last() {
        let p = Point::new(1, 1);
        let mut probe = ScriptedProbe::new().with_pixel_sequence(p, [Rgb(1, 1, 1), Rgb(2, 2, 2)]);
        assert_eq!(probe.pixel_color(p).unwrap(), Rgb(1, 1, 1));
        assert_eq!(probe.pixel_color(p).unwrap(), Rgb(2, 2, 2));
        assert_eq!(probe.pixel_color(p).unwrap(), Rgb(2, 2, 2));
        assert_eq!(probe.pixel_color(Point::new(9, 9)).unwrap(), Rgb(0, 0, 0));
    }

    #[test]
    fn abort_after_inputs_raises_interrupt() {
        let mut probe = ScriptedProbe::new().abort_after_inputs(1);
        probe.key_press("a").unwrap();
        let err = probe.key_press("b").unwrap_err();
        assert_eq!(err.downcast_ref::<Interrupt>(), Some(&Interrupt::Abort));
        assert!(probe.abort_requested());
        assert_eq!(probe.call_log().lock().unwrap().len(), 1);
    }
}
