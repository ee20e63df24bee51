//! Audit counters for recorder activity.

pub mod log;

// Re-export commonly used types
pub use log::{
    create_shared_log, create_shared_log_with_persistence, AuditLog, AuditStats, SharedAuditLog,
};
