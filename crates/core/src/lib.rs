pub mod error;
pub mod hotkeys;
pub mod interpreter;
pub mod logger;
pub mod object_store;
pub mod platform;
pub mod project;
pub mod runner;
pub mod sequence;
pub mod settings;
pub mod sleep;
pub mod step;
pub mod types;
pub mod watcher;
