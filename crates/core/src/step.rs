use std::fmt;

use serde::de::{self, Deserializer};
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::StepListError;
use crate::hotkeys;
use crate::types::{MouseButton, Rgb, ScrollDirection};

/// Absolute 1-based jump target, or fall through to the next step.
///
/// Targets are positions, not step identities: reordering or deleting steps
/// does not rewrite them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum JumpTarget {
    Step(usize),
    #[default]
    Next,
}

impl JumpTarget {
    /// 0-based program counter for a list of `len` steps, if in bounds.
    pub fn resolve(self, len: usize) -> Option<usize> {
        match self {
            JumpTarget::Step(n) if (1..=len).contains(&n) => Some(n - 1),
            _ => None,
        }
    }

    pub fn is_next(self) -> bool {
        matches!(self, JumpTarget::Next)
    }
}

impl fmt::Display for JumpTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JumpTarget::Step(n) => write!(f, "#{}", n),
            JumpTarget::Next => f.write_str("next"),
        }
    }
}

impl Serialize for JumpTarget {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        match self {
            JumpTarget::Step(n) => s.serialize_u64(*n as u64),
            JumpTarget::Next => s.serialize_none(),
        }
    }
}

impl<'de> Deserialize<'de> for JumpTarget {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        // Project files hold integers, numeric strings, null or "Next".
        Ok(match Value::deserialize(d)? {
            Value::Number(n) => {
                let whole = n
                    .as_u64()
                    .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0 && *f >= 0.0).map(|f| f as u64));
                JumpTarget::Step(whole.unwrap_or(0) as usize)
            }
            Value::String(s) => match s.trim().parse::<usize>() {
                Ok(v) => JumpTarget::Step(v),
                Err(_) => JumpTarget::Next,
            },
            _ => JumpTarget::Next,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClickParams {
    #[serde(default)]
    pub button: MouseButton,
    #[serde(default = "one")]
    pub clicks: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
}

impl ClickParams {
    /// Seconds between clicks; 0.1 for multi-clicks unless set.
    pub fn interval_s(&self) -> f64 {
        self.interval.unwrap_or(if self.clicks > 1 { 0.1 } else { 0.0 })
    }
}

impl Default for ClickParams {
    fn default() -> Self {
        Self { button: MouseButton::Left, clicks: 1, interval: None, confidence: None }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WaitParams {
    #[serde(default = "default_wait")]
    pub duration_s: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_s: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_s: Option<f64>,
}

impl WaitParams {
    pub fn fixed(duration_s: f64) -> Self {
        Self { duration_s, min_s: None, max_s: None }
    }

    pub fn random(min_s: f64, max_s: f64) -> Self {
        Self { duration_s: default_wait(), min_s: Some(min_s), max_s: Some(max_s) }
    }

    /// `(min, max)` when both bounds are set, ordered.
    pub fn random_range(&self) -> Option<(f64, f64)> {
        let (a, b) = (self.min_s?, self.max_s?);
        Some(if a <= b { (a, b) } else { (b, a) })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WaitForImageParams {
    #[serde(default = "default_timeout")]
    pub timeout_s: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WaitForPixelParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_rgb: Option<Rgb>,
    #[serde(default = "default_timeout")]
    pub timeout_s: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyboardInputParams {
    #[serde(default, alias = "text_to_type")]
    pub text: String,
    #[serde(default = "default_type_interval")]
    pub interval: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PressKeyParams {
    #[serde(default, alias = "key_to_press")]
    pub key: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HotkeyParams {
    #[serde(default)]
    pub key_combo: Vec<String>,
    #[serde(default, skip_serializing)]
    selected_hotkey_name: Option<String>,
}

impl HotkeyParams {
    pub fn new<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self { key_combo: keys.into_iter().map(Into::into).collect(), selected_hotkey_name: None }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScrollParams {
    #[serde(default)]
    pub direction: ScrollDirection,
    #[serde(default = "default_scroll")]
    pub amount: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GotoParams {
    #[serde(default)]
    pub target_step: JumpTarget,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IfImageParams {
    #[serde(default)]
    pub then_step: JumpTarget,
    #[serde(default)]
    pub else_step: JumpTarget,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IfPixelParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_rgb: Option<Rgb>,
    #[serde(default)]
    pub then_step: JumpTarget,
    #[serde(default)]
    pub else_step: JumpTarget,
}

fn one() -> u32 {
    1
}

fn default_wait() -> f64 {
    1.0
}

fn default_timeout() -> f64 {
    10.0
}

fn default_type_interval() -> f64 {
    0.01
}

fn default_scroll() -> u32 {
    10
}

/// Closed set of step instructions. Persisted as `"action"` (display name)
/// plus a `"params"` object.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "action", content = "params")]
pub enum Action {
    #[serde(rename = "Click")]
    Click(ClickParams),
    #[serde(rename = "Wait")]
    Wait(WaitParams),
    #[serde(rename = "Wait for Image")]
    WaitForImage(WaitForImageParams),
    #[serde(rename = "Wait for Pixel Color")]
    WaitForPixelColor(WaitForPixelParams),
    #[serde(rename = "Keyboard Input")]
    KeyboardInput(KeyboardInputParams),
    #[serde(rename = "Press Key")]
    PressKey(PressKeyParams),
    #[serde(rename = "Hotkey Combo")]
    HotkeyCombo(HotkeyParams),
    #[serde(rename = "Scroll")]
    Scroll(ScrollParams),
    #[serde(rename = "Goto Step")]
    GotoStep(GotoParams),
    #[serde(rename = "If Image Found")]
    IfImageFound(IfImageParams),
    #[serde(rename = "If Pixel Color")]
    IfPixelColor(IfPixelParams),
}

impl Action {
    pub fn name(&self) -> &'static str {
        match self {
            Action::Click(_) => "Click",
            Action::Wait(_) => "Wait",
            Action::WaitForImage(_) => "Wait for Image",
            Action::WaitForPixelColor(_) => "Wait for Pixel Color",
            Action::KeyboardInput(_) => "Keyboard Input",
            Action::PressKey(_) => "Press Key",
            Action::HotkeyCombo(_) => "Hotkey Combo",
            Action::Scroll(_) => "Scroll",
            Action::GotoStep(_) => "Goto Step",
            Action::IfImageFound(_) => "If Image Found",
            Action::IfPixelColor(_) => "If Pixel Color",
        }
    }

    /// Goto and If-* steps: they pick the next program counter and never inject input.
    pub fn is_control(&self) -> bool {
        matches!(self, Action::GotoStep(_) | Action::IfImageFound(_) | Action::IfPixelColor(_))
    }

    /// Every explicit jump target this action stores, with its param name.
    pub fn jump_targets(&self) -> Vec<(&'static str, JumpTarget)> {
        let all = match self {
            Action::GotoStep(p) => vec![("target_step", p.target_step)],
            Action::IfImageFound(p) => vec![("then_step", p.then_step), ("else_step", p.else_step)],
            Action::IfPixelColor(p) => vec![("then_step", p.then_step), ("else_step", p.else_step)],
            _ => Vec::new(),
        };
        all.into_iter().filter(|(_, t)| !t.is_next()).collect()
    }

    /// Short human description of the parameters.
    pub fn summary(&self) -> String {
        match self {
            Action::Click(p) => format!("{} x{}", p.button, p.clicks),
            Action::Wait(p) => match p.random_range() {
                Some((lo, hi)) => format!("{:.2}-{:.2}s", lo, hi),
                None => format!("{:.2}s", p.duration_s),
            },
            Action::WaitForImage(p) => format!("timeout {}s", p.timeout_s),
            Action::WaitForPixelColor(p) => match p.expected_rgb {
                Some(rgb) => format!("rgb{} timeout {}s", rgb, p.timeout_s),
                None => format!("timeout {}s", p.timeout_s),
            },
            Action::KeyboardInput(p) => format!("'{}'", p.text),
            Action::PressKey(p) => p.key.clone(),
            Action::HotkeyCombo(p) => p.key_combo.join("+"),
            Action::Scroll(p) => match (p.x, p.y) {
                (Some(x), Some(y)) => format!("{} {} at ({}, {})", p.direction, p.amount, x, y),
                _ => format!("{} {}", p.direction, p.amount),
            },
            Action::GotoStep(p) => format!("-> {}", p.target_step),
            Action::IfImageFound(p) => format!("then {} else {}", p.then_step, p.else_step),
            Action::IfPixelColor(p) => match p.expected_rgb {
                Some(rgb) => format!("rgb{} then {} else {}", rgb, p.then_step, p.else_step),
                None => format!("then {} else {}", p.then_step, p.else_step),
            },
        }
    }

    fn params_value(&self) -> Result<Value, serde_json::Error> {
        match self {
            Action::Click(p) => serde_json::to_value(p),
            Action::Wait(p) => serde_json::to_value(p),
            Action::WaitForImage(p) => serde_json::to_value(p),
            Action::WaitForPixelColor(p) => serde_json::to_value(p),
            Action::KeyboardInput(p) => serde_json::to_value(p),
            Action::PressKey(p) => serde_json::to_value(p),
            Action::HotkeyCombo(p) => serde_json::to_value(p),
            Action::Scroll(p) => serde_json::to_value(p),
            Action::GotoStep(p) => serde_json::to_value(p),
            Action::IfImageFound(p) => serde_json::to_value(p),
            Action::IfPixelColor(p) => serde_json::to_value(p),
        }
    }

    /// Fill derived fields from legacy parameter names.
    fn normalize(&mut self) {
        if let Action::HotkeyCombo(p) = self {
            if p.key_combo.is_empty() {
                if let Some(keys) = p.selected_hotkey_name.as_deref().and_then(hotkeys::combo_for_name) {
                    p.key_combo = keys;
                }
            }
            p.selected_hotkey_name = None;
        }
    }
}

/// One instruction: an action plus an optional object reference by name.
#[derive(Debug, Clone, PartialEq)]
pub struct Step {
    pub object: Option<String>,
    pub action: Action,
}

impl Step {
    pub fn new(action: Action) -> Self {
        Self { object: None, action }
    }

    pub fn on(object: impl Into<String>, action: Action) -> Self {
        Self { object: Some(object.into()), action }
    }
}

impl Serialize for Step {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        let params = self.action.params_value().map_err(serde::ser::Error::custom)?;
        let mut map = s.serialize_map(Some(3))?;
        map.serialize_entry("object_name", &self.object)?;
        map.serialize_entry("action", self.action.name())?;
        map.serialize_entry("params", &params)?;
        map.end()
    }
}

#[derive(Deserialize)]
struct StepRecord {
    #[serde(default)]
    object_name: Option<String>,
    action: String,
    #[serde(default)]
    params: Value,
}

impl<'de> Deserialize<'de> for Step {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let record = StepRecord::deserialize(d)?;
        let mut params = match record.params {
            Value::Object(map) => map,
            Value::Null => serde_json::Map::new(),
            other => return Err(de::Error::custom(format!("params must be an object, got {}", other))),
        };

        // If-* steps of older files name their condition object inside params.
        let condition = params
            .remove("condition_object_name")
            .and_then(|v| v.as_str().map(str::to_string))
            .filter(|s| !s.is_empty());

        let tagged = serde_json::json!({ "action": record.action, "params": Value::Object(params) });
        let mut action: Action = serde_json::from_value(tagged).map_err(de::Error::custom)?;
        action.normalize();

        let mut object = record.object_name.filter(|s| !s.is_empty());
        if action.is_control() && condition.is_some() {
            object = condition;
        }
        Ok(Step { object, action })
    }
}

/// A stored jump target that does not point inside the list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JumpHazard {
    pub position: usize,
    pub param: &'static str,
    pub target: usize,
}

impl fmt::Display for JumpHazard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "step {}: {} points at missing step {}", self.position, self.param, self.target)
    }
}

/// Ordered, mutable step sequence. Display positions are 1-based and
/// recomputed from the order on every read.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StepList {
    steps: Vec<Step>,
}

impl StepList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert at a 0-based index, or append with `None`. Returns the index used.
    pub fn insert(&mut self, step: Step, at: Option<usize>) -> Result<usize, StepListError> {
        let len = self.steps.len();
        let index = at.unwrap_or(len);
        if index > len {
            return Err(StepListError::OutOfBounds { index, len });
        }
        self.steps.insert(index, step);
        Ok(index)
    }

    pub fn push(&mut self, step: Step) {
        self.steps.push(step);
    }

    pub fn delete(&mut self, index: usize) -> Result<Step, StepListError> {
        self.check(index)?;
        Ok(self.steps.remove(index))
    }

    /// Swap with the previous step. Returns `false` at the top.
    pub fn move_up(&mut self, index: usize) -> Result<bool, StepListError> {
        self.check(index)?;
        if index == 0 {
            return Ok(false);
        }
        self.steps.swap(index - 1, index);
        Ok(true)
    }

    /// Swap with the next step. Returns `false` at the bottom.
    pub fn move_down(&mut self, index: usize) -> Result<bool, StepListError> {
        self.check(index)?;
        if index + 1 == self.steps.len() {
            return Ok(false);
        }
        self.steps.swap(index, index + 1);
        Ok(true)
    }

    pub fn get(&self, index: usize) -> Option<&Step> {
        self.steps.get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut Step> {
        self.steps.get_mut(index)
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Step> {
        self.steps.iter()
    }

    /// `(position, step)` pairs, positions starting at 1.
    pub fn positions(&self) -> impl Iterator<Item = (usize, &Step)> {
        self.steps.iter().enumerate().map(|(i, s)| (i + 1, s))
    }

    /// Explicit jump targets outside `1..=len`.
    pub fn jump_hazards(&self) -> Vec<JumpHazard> {
        let len = self.steps.len();
        self.positions()
            .flat_map(|(position, step)| {
                step.action
                    .jump_targets()
                    .into_iter()
                    .filter_map(move |(param, target)| match target {
                        JumpTarget::Step(n) if target.resolve(len).is_none() => {
                            Some(JumpHazard { position, param, target: n })
                        }
                        _ => None,
                    })
            })
            .collect()
    }

    fn check(&self, index: usize) -> Result<(), StepListError> {
        if index < self.steps.len() {
            Ok(())
        } else {
            Err(StepListError::OutOfBounds { index, len: self.steps.len() })
        }
    }
}

impl FromIterator<Step> for StepList {
    fn from_iter<I: IntoIterator<Item = Step>>(iter: I) -> Self {
        Self { steps: iter.into_iter().collect() }
    }
}

impl<'a> IntoIterator for &'a StepList {
    type Item = &'a Step;
    type IntoIter = std::slice::Iter<'a, Step>;

    fn into_iter(self) -> Self::IntoIter {
        self.steps.iter()
    }
}
