pub mod audio;
pub mod conversation;
pub mod error;
pub mod gui;
pub mod http;
pub mod models;
pub mod orchestrator;
pub mod player;
pub mod range;
pub mod selection;
pub mod service;
pub mod session;
pub mod worker;

pub use error::{MixError, MixResult};
pub use models::AnalysisSettings;
pub use orchestrator::Orchestrator;
pub use range::TimeRange;
