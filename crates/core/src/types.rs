use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Confidence used when neither the step nor the image object sets one.
pub const DEFAULT_CONFIDENCE: f64 = 0.8;

pub(crate) fn default_confidence() -> f64 {
    DEFAULT_CONFIDENCE
}

/// Screen coordinate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "[i32; 2]", into = "[i32; 2]")]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

impl From<[i32; 2]> for Point {
    fn from([x, y]: [i32; 2]) -> Self {
        Self { x, y }
    }
}

impl From<Point> for [i32; 2] {
    fn from(p: Point) -> Self {
        [p.x, p.y]
    }
}

impl fmt::Display for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// Screen-coordinate rectangle, persisted as `[x, y, w, h]`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "[i32; 4]", into = "[i32; 4]")]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub w: i32,
    pub h: i32,
}

impl Rect {
    pub fn new(x: i32, y: i32, w: i32, h: i32) -> Self {
        Self { x, y, w, h }
    }

    pub fn center(&self) -> Point {
        Point::new(self.x + self.w / 2, self.y + self.h / 2)
    }
}

impl From<[i32; 4]> for Rect {
    fn from([x, y, w, h]: [i32; 4]) -> Self {
        Self { x, y, w, h }
    }
}

impl From<Rect> for [i32; 4] {
    fn from(r: Rect) -> Self {
        [r.x, r.y, r.w, r.h]
    }
}

/// Where a template image was found on screen.
pub type Location = Rect;

/// 8-bit RGB triple. Equality is exact, no tolerance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "[u8; 3]", into = "[u8; 3]")]
pub struct Rgb(pub u8, pub u8, pub u8);

impl From<[u8; 3]> for Rgb {
    fn from([r, g, b]: [u8; 3]) -> Self {
        Rgb(r, g, b)
    }
}

impl From<Rgb> for [u8; 3] {
    fn from(c: Rgb) -> Self {
        [c.0, c.1, c.2]
    }
}

impl fmt::Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.0, self.1, self.2)
    }
}

/// Kind discriminant of a [`ScreenObject`], used for filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectKind {
    Region,
    Pixel,
    Image,
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ObjectKind::Region => "region",
            ObjectKind::Pixel => "pixel",
            ObjectKind::Image => "image",
        })
    }
}

/// A named screen reference: a rectangle, a single pixel, or a template image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ScreenObject {
    Region {
        coords: Rect,
    },
    Pixel {
        coords: Point,
        rgb: Rgb,
    },
    #[serde(alias = "icon")]
    Image {
        image_path: PathBuf,
        #[serde(default)]
        capture_coords: Option<Rect>,
        #[serde(default = "default_confidence")]
        confidence: f64,
    },
}

impl ScreenObject {
    pub fn region(x: i32, y: i32, w: i32, h: i32) -> Self {
        ScreenObject::Region { coords: Rect::new(x, y, w, h) }
    }

    pub fn pixel(x: i32, y: i32, rgb: Rgb) -> Self {
        ScreenObject::Pixel { coords: Point::new(x, y), rgb }
    }

    pub fn image(path: impl Into<PathBuf>) -> Self {
        ScreenObject::Image {
            image_path: path.into(),
            capture_coords: None,
            confidence: DEFAULT_CONFIDENCE,
        }
    }

    pub fn kind(&self) -> ObjectKind {
        match self {
            ScreenObject::Region { .. } => ObjectKind::Region,
            ScreenObject::Pixel { .. } => ObjectKind::Pixel,
            ScreenObject::Image { .. } => ObjectKind::Image,
        }
    }

    /// One-line description for list views.
    pub fn describe(&self) -> String {
        match self {
            ScreenObject::Region { coords } => {
                format!("region {},{} {}x{}", coords.x, coords.y, coords.w, coords.h)
            }
            ScreenObject::Pixel { coords, rgb } => format!("pixel {} rgb{}", coords, rgb),
            ScreenObject::Image { image_path, confidence, .. } => {
                let file = image_path
                    .file_name()
                    .map(|f| f.to_string_lossy().into_owned())
                    .unwrap_or_else(|| image_path.to_string_lossy().into_owned());
                format!("image {} @{:.2}", file, confidence)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MouseButton {
    #[default]
    #[serde(alias = "Left")]
    Left,
    #[serde(alias = "Right")]
    Right,
    #[serde(alias = "Middle")]
    Middle,
}

impl fmt::Display for MouseButton {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            MouseButton::Left => "left",
            MouseButton::Right => "right",
            MouseButton::Middle => "middle",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScrollDirection {
    #[serde(alias = "Up")]
    Up,
    #[default]
    #[serde(alias = "Down")]
    Down,
    #[serde(alias = "Left")]
    Left,
    #[serde(alias = "Right")]
    Right,
}

impl fmt::Display for ScrollDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ScrollDirection::Up => "up",
            ScrollDirection::Down => "down",
            ScrollDirection::Left => "left",
            ScrollDirection::Right => "right",
        })
    }
}

/// Interpreter lifecycle. `Stopped` is terminal for a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunState {
    #[default]
    Idle,
    Running,
    Aborting,
    Stopped,
}

impl RunState {
    pub fn is_active(self) -> bool {
        matches!(self, RunState::Running | RunState::Aborting)
    }
}

/// Terminal status of one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// Every requested loop iteration finished.
    Completed { loops: u64 },
    /// The kill-switch fired.
    Aborted { loops_completed: u64 },
    /// A stop was requested through the cancellation flag.
    Stopped { loops_completed: u64 },
}

impl fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunOutcome::Completed { loops } => write!(f, "completed {} loop(s)", loops),
            RunOutcome::Aborted { loops_completed } => {
                write!(f, "aborted after {} complete loop(s)", loops_completed)
            }
            RunOutcome::Stopped { loops_completed } => {
                write!(f, "stopped by request after {} complete loop(s)", loops_completed)
            }
        }
    }
}

/// Progress reported by the interpreter while it runs.
#[derive(Debug, Clone, PartialEq)]
pub enum RunEvent {
    StateChanged(RunState),
    LoopStarted { iteration: u64, total: Option<u64> },
    StepStarted { position: usize, action: &'static str },
    Warning { position: usize, message: String },
    Timeout { position: usize, message: String },
    StepFailed { position: usize, action: &'static str, error: String },
    Finished(RunOutcome),
}

/// Command from TUI to the run supervisor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Start,
    Stop,
    Quit,
}
