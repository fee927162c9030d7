pub mod stub;
pub mod scripted;

use std::path::Path;
use std::time::Duration;

use anyhow::Result;

use crate::types::*;
use crate::logger;

/// Screen reads and input injection the interpreter needs.
///
/// Implementations report the kill-switch by returning
/// [`Interrupt::Abort`](crate::error::Interrupt) from any call, or by
/// answering `true` from `abort_requested`. Any other error fails only the
/// current step.
pub trait ScreenProbe: Send {
    fn locate(&mut self, image: &Path, confidence: f64, region: Option<Rect>) -> Result<Option<Location>>;
    fn pixel_color(&mut self, at: Point) -> Result<Rgb>;
    fn click(&mut self, at: Point, button: MouseButton, clicks: u32, interval: Duration) -> Result<()>;
    fn key_press(&mut self, key: &str) -> Result<()>;
    fn hotkey(&mut self, keys: &[String]) -> Result<()>;
    fn type_text(&mut self, text: &str, interval: Duration) -> Result<()>;
    fn scroll(&mut self, direction: ScrollDirection, amount: u32, at: Option<Point>) -> Result<()>;
    fn abort_requested(&self) -> bool;

    /// Get the supervising UI out of the way before a run.
    fn minimize_ui(&mut self) {}

    /// Bring the supervising UI back; called on every run exit.
    fn restore_ui(&mut self) {}
}

/// Create the probe for this build. Native capture and injection live
/// outside this crate, so the logging stub is the only built-in backend.
pub fn create_probe() -> Box<dyn ScreenProbe> {
    logger::register_prefix("stub", logger::COLOR_GRAY);
    Box::new(stub::StubProbe::default())
}
