use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Title given to requirements created without one
pub const DEFAULT_TITLE: &str = "Untitled Requirement";

/// Status given to requirements created without one
pub const DEFAULT_STATUS: &str = "Draft";

/// Canonical status labels offered to editors
pub const KNOWN_STATUSES: [&str; 3] = ["Draft", "In Progress", "Completed"];

/// Status of a requirement.
///
/// This is an open string rather than a closed enum: the backend relabels
/// values on some writes (`In Progress` becomes `in_progress`) and the seed
/// data already mixes both spellings, so any value must round-trip untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct Status(String);

/// Display tone of a status badge
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusTone {
    /// Gray badge, also used for unrecognized values
    Neutral,
    /// Yellow badge
    Warning,
    /// Green badge
    Success,
}

impl Status {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns the drifted form of this status: lowercased with spaces
    /// replaced by underscores (`In Progress` -> `in_progress`)
    pub fn drifted(&self) -> Self {
        Self(self.0.to_lowercase().replace(' ', "_"))
    }

    /// Badge tone for this status. Only the exact canonical labels get a
    /// distinct tone; drifted or unknown values fall back to neutral.
    pub fn tone(&self) -> StatusTone {
        match self.0.as_str() {
            "In Progress" => StatusTone::Warning,
            "Completed" => StatusTone::Success,
            _ => StatusTone::Neutral,
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Status {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for Status {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// A single requirement as stored in the entity table
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Requirement {
    /// Decimal string allocated from the persisted counter
    pub id: String,
    pub title: String,
    pub description: String,
    /// Missing in rows written by an update that carried no status
    #[serde(default)]
    pub status: Status,
}

impl Requirement {
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        description: impl Into<String>,
        status: impl Into<Status>,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            description: description.into(),
            status: status.into(),
        }
    }
}

/// Fields supplied when creating a requirement.
///
/// Omitted or empty fields fall back to [`DEFAULT_TITLE`], an empty
/// description and [`DEFAULT_STATUS`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewRequirement {
    pub title: Option<String>,
    pub description: Option<String>,
    pub status: Option<Status>,
}

impl NewRequirement {
    pub fn new(
        title: impl Into<String>,
        description: impl Into<String>,
        status: impl Into<Status>,
    ) -> Self {
        Self {
            title: Some(title.into()),
            description: Some(description.into()),
            status: Some(status.into()),
        }
    }
}

/// Fields supplied to an update.
///
/// The stored status is always replaced by `status`, so it is required here:
/// callers that only mean to change the title must pass the current status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequirementUpdate {
    pub title: Option<String>,
    pub description: Option<String>,
    pub status: Status,
}

impl RequirementUpdate {
    /// Update that replaces all three editable fields
    pub fn full(
        title: impl Into<String>,
        description: impl Into<String>,
        status: impl Into<Status>,
    ) -> Self {
        Self {
            title: Some(title.into()),
            description: Some(description.into()),
            status: status.into(),
        }
    }

    /// Update that only touches the status
    pub fn status(status: impl Into<Status>) -> Self {
        Self {
            title: None,
            description: None,
            status: status.into(),
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }
}

/// Shallow patch used by autosave; omitted fields keep their stored value
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequirementPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub status: Option<Status>,
}

impl RequirementPatch {
    pub fn apply_to(self, requirement: &mut Requirement) {
        if let Some(title) = self.title {
            requirement.title = title;
        }
        if let Some(description) = self.description {
            requirement.description = description;
        }
        if let Some(status) = self.status {
            requirement.status = status;
        }
    }
}

/// Immutable snapshot of a requirement's title and description
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Version {
    /// Decimal string from the global version counter
    pub id: String,
    pub requirement_id: String,
    pub title: String,
    pub description: String,
    pub timestamp: DateTime<Utc>,
}

/// Rows written on first run. The mixed status spellings are intentional.
pub fn seed_requirements() -> Vec<Requirement> {
    vec![
        Requirement::new(
            "1",
            "User Authentication",
            "Implement secure user authentication with OAuth 2.0 support",
            "Completed",
        ),
        Requirement::new(
            "2",
            "Dashboard Analytics",
            "Create a dashboard with real-time analytics and charts",
            "in_progress",
        ),
        Requirement::new(
            "3",
            "Export to PDF",
            "Allow users to export reports as PDF documents",
            "draft",
        ),
        Requirement::new(
            "4",
            "Email Notifications",
            "Send automated email notifications for important events",
            "Draft",
        ),
    ]
}
