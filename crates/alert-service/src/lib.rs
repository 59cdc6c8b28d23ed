pub mod capacity;
pub mod config;
pub mod error;
pub mod monitor;
pub mod routes;
pub mod rule_engine;
pub mod types;
pub mod video_source;

// Re-export commonly used types
pub use capacity::estimate_capacity;
pub use config::{CrowdConfig, ServiceConfig};
pub use error::{ApiError, MonitorError};
pub use monitor::{FrameAssessment, FrameMonitor, FrameSummary, VideoReport};
pub use routes::{create_router, AppState};
pub use rule_engine::evaluate_alert;
pub use types::*;
pub use video_source::resolve_video_path;
