use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};

/// Workflow is a named, cron-schedulable collection of tasks.
///
/// The tasks themselves are separate aggregates referencing the workflow by
/// id; a workflow never embeds its children.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workflow {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    /// Standard 5-field cron expression, or empty for manually-triggered
    /// workflows.
    pub schedule_cron: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl Workflow {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            description: String::new(),
            schedule_cron: String::new(),
            is_active: true,
            created_at: Utc::now(),
        }
    }

    /// Check that the workflow has the minimum required fields.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::invalid("workflow name must not be empty"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_workflows_get_distinct_ids() {
        let a = Workflow::new("etl");
        let b = Workflow::new("etl");
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn empty_name_is_rejected() {
        let mut wf = Workflow::new("nightly");
        assert!(wf.validate().is_ok());
        wf.name = "  ".into();
        assert!(wf.validate().is_err());
    }
}
