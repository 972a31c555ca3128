use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub mod change;
pub mod product;

// Re-exports for convenience
pub use change::*;
pub use product::*;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "TEXT")]
pub enum RunStatus {
    #[sqlx(rename = "completed")]
    Completed,
    #[sqlx(rename = "completed_with_errors")]
    CompletedWithErrors,
    #[sqlx(rename = "failed")]
    Failed,
}

impl RunStatus {
    pub fn label(&self) -> &'static str {
        match self {
            RunStatus::Completed => "Completed",
            RunStatus::CompletedWithErrors => "Completed with errors",
            RunStatus::Failed => "Failed",
        }
    }
}

// Helper function to generate UUIDs in the format expected by the database
pub fn generate_id() -> String {
    Uuid::new_v4().simple().to_string()
}
