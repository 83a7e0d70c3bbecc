//! Acceptance-criteria generation

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::Requirement;

/// Generated criteria for one requirement. Not persisted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AcceptanceCriteria {
    pub requirement_id: String,
    pub criteria: Vec<String>,
    pub generated_at: DateTime<Utc>,
}

/// Expands the Given/When/Then scaffold for the requirement's current title
pub fn generate(requirement: &Requirement) -> AcceptanceCriteria {
    let title = &requirement.title;
    let criteria = vec![
        format!("Given a user is on the {} feature", title),
        format!("When the user interacts with the {} functionality", title),
        "Then the system should respond within 2 seconds".to_string(),
        "And the user should see a confirmation message".to_string(),
        format!("Given the {} is configured correctly", title),
        format!("When an error occurs during {}", title),
        "Then the system should display a user-friendly error message".to_string(),
        "And log the error for debugging purposes".to_string(),
    ];

    AcceptanceCriteria {
        requirement_id: requirement.id.clone(),
        criteria,
        generated_at: Utc::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_substitutes_title() {
        let req = Requirement::new("3", "Export to PDF", "", "draft");
        let generated = generate(&req);

        assert_eq!(generated.requirement_id, "3");
        assert_eq!(generated.criteria.len(), 8);
        assert_eq!(generated.criteria[0], "Given a user is on the Export to PDF feature");
        assert_eq!(generated.criteria[5], "When an error occurs during Export to PDF");
        assert!(generated.criteria[7].starts_with("And "));
    }

    #[test]
    fn test_generate_is_fixed_at_call_time() {
        let mut req = Requirement::new("1", "Login", "", "Draft");
        let generated = generate(&req);
        req.title = "Logout".to_string();
        assert!(generated.criteria[0].contains("Login"));
    }
}
