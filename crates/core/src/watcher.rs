use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::CompileError;
use crate::hotkeys;
use crate::object_store::ObjectStore;
use crate::sequence::Sequence;
use crate::step::*;
use crate::types::ObjectKind;

/// Pause after a watcher fires, before scanning again.
const COOLDOWN_S: f64 = 0.5;
/// Idle wait when nothing matched in a scan.
const IDLE_S: f64 = 0.1;

/// "When this image is on screen, press this key."
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "WatcherRecord")]
pub struct Watcher {
    pub name: String,
    /// Image object to look for.
    pub object: String,
    /// `"f1"`, `"alt+q"`, ...
    pub keybind: String,
    pub active: bool,
    /// Lower is checked first.
    pub priority: i32,
}

/// Listener entries of older files carry the icon object inline as
/// `object_data` (with its keybind) and name the object by `name`.
#[derive(Deserialize)]
struct WatcherRecord {
    name: String,
    #[serde(default)]
    object: Option<String>,
    #[serde(default)]
    keybind: Option<String>,
    #[serde(default)]
    object_data: Option<Value>,
    #[serde(default = "yes")]
    active: bool,
    #[serde(default)]
    priority: i32,
}

fn yes() -> bool {
    true
}

impl From<WatcherRecord> for Watcher {
    fn from(r: WatcherRecord) -> Self {
        let keybind = r.keybind.or_else(|| {
            r.object_data
                .as_ref()
                .and_then(|d| d.get("keybind"))
                .and_then(Value::as_str)
                .map(str::to_string)
        });
        Self {
            object: r.object.unwrap_or_else(|| r.name.clone()),
            name: r.name,
            keybind: keybind.unwrap_or_default(),
            active: r.active,
            priority: r.priority,
        }
    }
}

impl Watcher {
    pub fn new(name: impl Into<String>, object: impl Into<String>, keybind: impl Into<String>, priority: i32) -> Self {
        Self { name: name.into(), object: object.into(), keybind: keybind.into(), active: true, priority }
    }

    fn action(&self) -> Result<Action, CompileError> {
        let keys = hotkeys::parse_keybind(&self.keybind);
        match keys.len() {
            0 => Err(CompileError::EmptyKeybind(self.name.clone())),
            1 => Ok(Action::PressKey(PressKeyParams { key: keys[0].clone() })),
            _ => Ok(Action::HotkeyCombo(HotkeyParams::new(keys))),
        }
    }
}

/// Compile watchers into a looping program for the ordinary interpreter.
///
/// Each active watcher, by priority, becomes a four step block:
/// `If Image Found` (else skips the block), the key action, a short
/// cooldown, then `Goto Step 1`. A final idle wait closes the scan, and
/// the program loops forever.
pub fn compile(name: &str, watchers: &[Watcher], objects: &ObjectStore) -> Result<Sequence, CompileError> {
    let mut active: Vec<&Watcher> = watchers.iter().filter(|w| w.active).collect();
    // stable: ties keep list order
    active.sort_by_key(|w| w.priority);

    let mut steps = StepList::new();
    for (i, w) in active.iter().enumerate() {
        match objects.get(&w.object) {
            None => return Err(CompileError::UnknownObject(w.name.clone())),
            Some(obj) if obj.kind() != ObjectKind::Image => return Err(CompileError::NotAnImage(w.name.clone())),
            Some(_) => {}
        }
        let action = w.action()?;
        let block = 4 * i + 1;

        steps.push(Step::on(
            w.object.as_str(),
            Action::IfImageFound(IfImageParams {
                then_step: JumpTarget::Step(block + 1),
                else_step: JumpTarget::Step(block + 4),
                confidence: None,
            }),
        ));
        steps.push(Step::new(action));
        steps.push(Step::new(Action::Wait(WaitParams::fixed(COOLDOWN_S))));
        steps.push(Step::new(Action::GotoStep(GotoParams { target_step: JumpTarget::Step(1) })));
    }
    steps.push(Step::new(Action::Wait(WaitParams::fixed(IDLE_S))));

    Ok(Sequence::from_parts(name, 0, objects.clone(), steps, watchers.to_vec()))
}
