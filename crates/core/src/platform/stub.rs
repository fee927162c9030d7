use std::path::Path;
use std::time::Duration;

use anyhow::Result;

use crate::types::*;
use crate::logger;
use super::ScreenProbe;

/// Dry-run probe: logs every call, never finds an image, reads black pixels.
#[derive(Debug, Default)]
pub struct StubProbe;

impl ScreenProbe for StubProbe {
    fn locate(&mut self, image: &Path, confidence: f64, region: Option<Rect>) -> Result<Option<Location>> {
        logger::info_p("stub", &format!("locate({}, {:.2}, {:?})", image.display(), confidence, region));
        Ok(None)
    }

    fn pixel_color(&mut self, at: Point) -> Result<Rgb> {
        logger::info_p("stub", &format!("pixel_color{}", at));
        Ok(Rgb(0, 0, 0))
    }

    fn click(&mut self, at: Point, button: MouseButton, clicks: u32, interval: Duration) -> Result<()> {
        logger::info_p("stub", &format!("click{} {} x{} every {:?}", at, button, clicks, interval));
        Ok(())
    }

    fn key_press(&mut self, key: &str) -> Result<()> {
        logger::info_p("stub", &format!("key_press(\"{}\")", key));
        Ok(())
    }

    fn hotkey(&mut self, keys: &[String]) -> Result<()> {
        logger::info_p("stub", &format!("hotkey({})", keys.join("+")));
        Ok(())
    }

    fn type_text(&mut self, text: &str, interval: Duration) -> Result<()> {
        logger::info_p("stub", &format!("type_text(\"{}\", {:?})", text, interval));
        Ok(())
    }

    fn scroll(&mut self, direction: ScrollDirection, amount: u32, at: Option<Point>) -> Result<()> {
        match at {
            Some(p) => logger::info_p("stub", &format!("scroll({} {}) at {}", direction, amount, p)),
            None => logger::info_p("stub", &format!("scroll({} {})", direction, amount)),
        }
        Ok(())
    }

    fn abort_requested(&self) -> bool {
        false
    }

    fn minimize_ui(&mut self) {
        logger::info_p("stub", "minimize_ui()");
    }

    fn restore_ui(&mut self) {
        logger::info_p("stub", "restore_ui()");
    }
}
