use anyhow::Result;
use inquire::{Confirm, Select, Text};
use std::fmt;

use specflow_core::{Draft, NewRequirement, Status, KNOWN_STATUSES};

/// Prompts the user for a new requirement
pub fn prompt_new_requirement() -> Result<NewRequirement> {
    let title = Text::new("Title:").prompt()?;

    // Use the Editor type for multiline input
    let description = inquire::Editor::new("Description:").prompt()?;

    let status = Select::new("Status:", KNOWN_STATUSES.to_vec()).prompt()?;

    Ok(NewRequirement::new(title, description, status))
}

/// Prompts for a new title, keeping the current one on empty input
pub fn prompt_title(current: &str) -> Result<String> {
    let title = Text::new("Title:").with_initial_value(current).prompt()?;
    Ok(title)
}

pub fn prompt_description(current: &str) -> Result<String> {
    let description = inquire::Editor::new("Description:")
        .with_predefined_text(current)
        .prompt()?;
    Ok(description)
}

/// Prompts for a status, starting on the current one when it is a known value
pub fn prompt_status(current: &Status) -> Result<Status> {
    let options = KNOWN_STATUSES.to_vec();
    let start = options
        .iter()
        .position(|s| *s == current.as_str())
        .unwrap_or(0);
    let status = Select::new("Status:", options)
        .with_starting_cursor(start)
        .prompt()?;
    Ok(Status::from(status))
}

/// Asks for confirmation, defaulting to no
pub fn confirm(message: &str) -> Result<bool> {
    let answer = Confirm::new(message).with_default(false).prompt()?;
    Ok(answer)
}

/// Actions offered in an editing session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionAction {
    EditTitle,
    EditDescription,
    ChangeStatus,
    Save,
    Commit,
    RestoreLatest,
    GenerateCriteria,
    Show,
    Quit,
}

impl SessionAction {
    const ALL: [SessionAction; 9] = [
        SessionAction::EditTitle,
        SessionAction::EditDescription,
        SessionAction::ChangeStatus,
        SessionAction::Save,
        SessionAction::Commit,
        SessionAction::RestoreLatest,
        SessionAction::GenerateCriteria,
        SessionAction::Show,
        SessionAction::Quit,
    ];
}

impl fmt::Display for SessionAction {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let label = match self {
            SessionAction::EditTitle => "Edit title",
            SessionAction::EditDescription => "Edit description",
            SessionAction::ChangeStatus => "Change status",
            SessionAction::Save => "Save now",
            SessionAction::Commit => "Commit version",
            SessionAction::RestoreLatest => "Restore latest version",
            SessionAction::GenerateCriteria => "Generate acceptance criteria",
            SessionAction::Show => "Show draft",
            SessionAction::Quit => "Quit",
        };
        write!(f, "{}", label)
    }
}

/// Prompts for the next session action
pub fn prompt_session_action(draft: &Draft) -> Result<SessionAction> {
    let prompt = format!("[{}] {}:", draft.requirement_id, draft.title);
    let action = Select::new(&prompt, SessionAction::ALL.to_vec()).prompt()?;
    Ok(action)
}
