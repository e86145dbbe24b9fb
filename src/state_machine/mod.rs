// Status types for aggregate task reconciliation.
//
// External job services speak a loose status vocabulary; it is normalized once at the
// ingress boundary into `EngineStatus`, and everything downstream matches on enums.

pub mod states;
pub mod status_normalizer;

pub use states::{EngineStatus, TaskStatus};
pub use status_normalizer::normalize_status;
