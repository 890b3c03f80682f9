pub mod config;
pub mod engine;
pub mod error;
pub mod hasher;
pub mod orchestrator;
pub mod platform;
pub mod progress;
pub mod scanner;
pub mod storage;
pub mod store;

pub use config::{AppConfig, TypeDetectorKind};
pub use engine::{Engine, PurgeSummary};
pub use error::Error;
pub use progress::{ProgressReporter, SilentReporter, Stage};
