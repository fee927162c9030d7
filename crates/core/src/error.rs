use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("object name cannot be empty")]
    EmptyName,

    #[error("object with name '{0}' already exists")]
    DuplicateName(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StepListError {
    #[error("step index {index} out of bounds for {len} step(s)")]
    OutOfBounds { index: usize, len: usize },
}

/// Reasons a run refuses to start.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("no steps to run")]
    EmptySteps,

    #[error("loop count cannot be negative: {0}")]
    NegativeLoopCount(i64),
}

#[derive(Error, Debug)]
pub enum ProjectError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid project file {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid object '{name}': {source}")]
    InvalidObject {
        name: String,
        #[source]
        source: StoreError,
    },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CompileError {
    #[error("watcher '{0}' references unknown object")]
    UnknownObject(String),

    #[error("watcher '{0}' must reference an image object")]
    NotAnImage(String),

    #[error("watcher '{0}' has no keybind")]
    EmptyKeybind(String),
}

/// Early unwinding of a run. Screen probes return `Interrupt::Abort` when the
/// kill-switch fires; `Stop` comes from the cancellation flag.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interrupt {
    #[error("abort signal from input layer")]
    Abort,

    #[error("stop requested")]
    Stop,
}
