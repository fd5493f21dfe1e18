//! Issue-tracker integration settings

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};

/// Settings shared by every issue-tracker modal on a page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IssueTrackerConfig {
    /// Statuses in which a linked ticket id can no longer change, so a
    /// ticket id becomes mandatory
    pub unchangeable_issue_id_statuses: Vec<String>,
    /// Hotlist applied when generating a new ticket
    pub default_hotlist_id: Option<String>,
    /// Component applied when generating a new ticket
    pub default_component_id: Option<String>,
}

impl Default for IssueTrackerConfig {
    fn default() -> Self {
        Self {
            unchangeable_issue_id_statuses: vec![
                "Fixed".to_string(),
                "Fixed and Verified".to_string(),
                "Deprecated".to_string(),
            ],
            default_hotlist_id: None,
            default_component_id: None,
        }
    }
}

impl IssueTrackerConfig {
    /// Parse and validate a JSON document
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a JSON file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        debug!(path = %path.display(), "loading issue tracker config");
        Self::from_json_str(&fs::read_to_string(path)?)
    }

    /// Whether a ticket id is mandatory in `status`
    pub fn is_issue_id_locked(&self, status: &str) -> bool {
        self.unchangeable_issue_id_statuses.iter().any(|s| s == status)
    }

    fn validate(&self) -> Result<()> {
        if let Some(blank) = self
            .unchangeable_issue_id_statuses
            .iter()
            .position(|s| s.trim().is_empty())
        {
            return Err(Error::config(format!(
                "unchangeable_issue_id_statuses[{}] is blank",
                blank
            )));
        }
        for (field, value) in [
            ("default_hotlist_id", &self.default_hotlist_id),
            ("default_component_id", &self.default_component_id),
        ] {
            if value.as_deref().is_some_and(|v| v.trim().is_empty()) {
                return Err(Error::config(format!("{} is blank", field)));
            }
        }
        Ok(())
    }
}
