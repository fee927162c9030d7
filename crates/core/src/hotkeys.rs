use std::sync::OnceLock;

use regex::Regex;

/// Named key combinations offered for the Hotkey Combo action.
pub const PREDEFINED_HOTKEYS: &[(&str, &[&str])] = &[
    // System & navigation
    ("Switch Apps (Alt+Tab)", &["alt", "tab"]),
    ("Close Window (Alt+F4)", &["alt", "f4"]),
    ("Show Desktop (Win+D)", &["win", "d"]),
    ("Open File Explorer (Win+E)", &["win", "e"]),
    ("Open Run Dialog (Win+R)", &["win", "r"]),
    // Files & windows
    ("Copy (Ctrl+C)", &["ctrl", "c"]),
    ("Cut (Ctrl+X)", &["ctrl", "x"]),
    ("Paste (Ctrl+V)", &["ctrl", "v"]),
    ("Undo (Ctrl+Z)", &["ctrl", "z"]),
    ("Redo (Ctrl+Y)", &["ctrl", "y"]),
    ("Select All (Ctrl+A)", &["ctrl", "a"]),
    ("New Window (Ctrl+N)", &["ctrl", "n"]),
    ("New Folder (Ctrl+Shift+N)", &["ctrl", "shift", "n"]),
    ("Properties (Alt+Enter)", &["alt", "enter"]),
    // Browser
    ("New Tab (Ctrl+T)", &["ctrl", "t"]),
    ("Close Tab (Ctrl+W)", &["ctrl", "w"]),
    ("Reopen Closed Tab (Ctrl+Shift+T)", &["ctrl", "shift", "t"]),
    ("Next Tab (Ctrl+Tab)", &["ctrl", "tab"]),
    ("Previous Tab (Ctrl+Shift+Tab)", &["ctrl", "shift", "tab"]),
    ("Focus Address Bar (Ctrl+L)", &["ctrl", "l"]),
    // Text editing
    ("Move Cursor Word Left (Ctrl+Left)", &["ctrl", "left"]),
    ("Move Cursor Word Right (Ctrl+Right)", &["ctrl", "right"]),
    ("Delete Previous Word (Ctrl+Backspace)", &["ctrl", "backspace"]),
    ("Select Word Left (Ctrl+Shift+Left)", &["ctrl", "shift", "left"]),
    ("Select Word Right (Ctrl+Shift+Right)", &["ctrl", "shift", "right"]),
    ("Jump to Start of Doc (Ctrl+Home)", &["ctrl", "home"]),
    ("Jump to End of Doc (Ctrl+End)", &["ctrl", "end"]),
];

fn combo_in_parens() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\(([^()]+)\)\s*$").unwrap())
}

/// Resolve a hotkey display name ("Copy (Ctrl+C)") to its key list.
/// Unknown names fall back to the parenthesized combo, if any.
pub fn combo_for_name(name: &str) -> Option<Vec<String>> {
    let name = name.trim();
    if let Some((_, keys)) = PREDEFINED_HOTKEYS.iter().find(|(n, _)| *n == name) {
        return Some(keys.iter().map(|k| k.to_string()).collect());
    }
    let caps = combo_in_parens().captures(name)?;
    let keys = parse_keybind(&caps[1]);
    (!keys.is_empty()).then_some(keys)
}

/// Split a keybind such as `alt+q` or `Ctrl + Shift + T` into lowercase keys.
pub fn parse_keybind(keybind: &str) -> Vec<String> {
    keybind
        .split('+')
        .map(|k| k.trim().to_lowercase())
        .filter(|k| !k.is_empty())
        .collect()
}
