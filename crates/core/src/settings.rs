use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::interpreter::RunConfig;
use crate::logger;

const MAX_RECENT: usize = 10;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Most recent first.
    pub recent_projects: Vec<PathBuf>,
    pub poll_interval_ms: u64,
    pub start_delay_ms: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self { recent_projects: Vec::new(), poll_interval_ms: 250, start_delay_ms: 500 }
    }
}

impl Settings {
    /// Missing or malformed files give defaults.
    pub fn load(path: &Path) -> Self {
        std::fs::read_to_string(path)
            .ok()
            .and_then(|s| serde_json::from_str(&s).ok())
            .unwrap_or_default()
    }

    pub fn save(&self, path: &Path) {
        let result = serde_json::to_string_pretty(self)
            .map_err(|e| e.to_string())
            .and_then(|json| std::fs::write(path, json).map_err(|e| e.to_string()));
        if let Err(e) = result {
            logger::warn(&format!("failed to save settings to {}: {}", path.display(), e));
        }
    }

    /// Move `project` to the front of the recent list.
    pub fn remember(&mut self, project: &Path) {
        self.recent_projects.retain(|p| p != project);
        self.recent_projects.insert(0, project.to_path_buf());
        self.recent_projects.truncate(MAX_RECENT);
    }

    pub fn run_config(&self) -> RunConfig {
        RunConfig {
            poll_interval: Duration::from_millis(self.poll_interval_ms.max(1)),
            start_delay: Duration::from_millis(self.start_delay_ms),
        }
    }
}
