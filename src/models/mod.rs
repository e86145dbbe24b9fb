pub mod engine_state;
pub mod job_ids;
pub mod keyword_tracking_task;
pub mod position_check_task;
pub mod task;

// Re-export core models for easy access
pub use engine_state::{clamp_percent, EngineState, EngineStates};
pub use job_ids::JobIds;
pub use keyword_tracking_task::KeywordTrackingTask;
pub use position_check_task::PositionCheckTask;
pub use task::{ProgressUpdate, Task, TaskKind, TaskProgress, TrackedTask};
