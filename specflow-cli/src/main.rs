mod cli;
mod prompts;

use anyhow::{Context, Result};
use clap::Parser;
use colored::{ColoredString, Colorize};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

use specflow_core::db::{copy_tables, export_to_json, import_from_json};
use specflow_core::{
    create_backend, get_config_path, AcceptanceCriteria, ChannelPolicy, NewRequirement, Requirement,
    RequirementUpdate, RequirementsApi, SpecFlowConfig, Status, StatusTone, SyncController, VersionHistory,
};

use crate::cli::{Cli, Command, DbCommand};
use crate::prompts::SessionAction;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config_path = match &cli.config {
        Some(path) => path.clone(),
        None => get_config_path()?,
    };
    let mut config = SpecFlowConfig::load_or_default(&config_path)?;
    if cli.reliable {
        config.channel = ChannelPolicy::reliable();
    }

    let data_path = match &cli.db {
        Some(path) => path.clone(),
        None => config.data_path()?,
    };

    // Data file commands never go through the channel
    if let Command::Db(db_cmd) = &cli.command {
        return handle_db_command(db_cmd, &config, &data_path);
    }

    let api = Arc::new(
        RequirementsApi::from_config(&config, &data_path)
            .with_context(|| format!("Failed to open data file {:?}", data_path))?,
    );

    match &cli.command {
        Command::List { status } => {
            list_requirements(&api, status.as_deref()).await?;
        }
        Command::Show { id } => {
            show_requirement(&api, id).await?;
        }
        Command::Add {
            title,
            description,
            status,
            interactive,
        } => {
            // Default to interactive mode if no specific arguments are provided
            let should_be_interactive =
                *interactive || (title.is_none() && description.is_none() && status.is_none());

            let draft = if should_be_interactive {
                prompts::prompt_new_requirement()?
            } else {
                NewRequirement {
                    title: title.clone(),
                    description: description.clone(),
                    status: status.as_deref().map(Status::from),
                }
            };
            add_requirement(&api, draft).await?;
        }
        Command::Edit {
            id,
            title,
            description,
            status,
        } => {
            edit_requirement(&api, id, title, description, status).await?;
        }
        Command::Del { id, yes } => {
            delete_requirement(&api, id, *yes).await?;
        }
        Command::Criteria { id } => {
            let generated = api.generate_acceptance_criteria(id).await?;
            print_criteria(&generated);
        }
        Command::History { id } => {
            show_history(&api, id).await?;
        }
        Command::Commit { id } => {
            let requirement = api.get_requirement(id).await?;
            let version = api
                .commit_version(id, &requirement.title, &requirement.description)
                .await?;
            println!("{}", "Version committed successfully!".green());
            println!("Version: {} ({})", version.id, version.timestamp.format("%Y-%m-%d %H:%M:%S"));
        }
        Command::Restore { id, version, yes } => {
            restore_requirement(&api, id, version.as_deref(), *yes).await?;
        }
        Command::Session { id } => {
            let controller = SyncController::from_config(Arc::clone(&api), &config.autosave);
            run_session(&controller, id).await?;
        }
        Command::Reset { yes } => {
            if !*yes && !prompts::confirm("Reset to seed data and clear all version history?")? {
                println!("Reset cancelled.");
                return Ok(());
            }
            api.reset()?;
            println!("{}", "Requirements reset to seed data.".green());
        }
        Command::Db(_) => {}
    }

    Ok(())
}

fn init_tracing(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn status_badge(status: &Status) -> ColoredString {
    match status.tone() {
        StatusTone::Success => status.as_str().green(),
        StatusTone::Warning => status.as_str().yellow(),
        StatusTone::Neutral => status.as_str().normal(),
    }
}

async fn list_requirements(api: &RequirementsApi, status: Option<&str>) -> Result<()> {
    let mut requirements = api.list_requirements().await;

    if let Some(status) = status {
        requirements.retain(|r| r.status.as_str() == status);
    }

    // A failed list call also lands here, as an empty list
    if requirements.is_empty() {
        println!("{}", "No requirements found.".yellow());
        return Ok(());
    }

    println!("{:<6} | {:<40} | {:<15}", "ID", "Title", "Status");
    println!("{}", "-".repeat(67));

    for req in requirements {
        println!("{:<6} | {:<40} | {:<15}", req.id, truncate(&req.title, 40), status_badge(&req.status));
    }

    Ok(())
}

fn truncate(text: &str, width: usize) -> String {
    if text.chars().count() <= width {
        return text.to_string();
    }
    let mut short: String = text.chars().take(width.saturating_sub(3)).collect();
    short.push_str("...");
    short
}

fn print_requirement(req: &Requirement) {
    println!("{}: {}", "ID".blue(), req.id);
    println!("{}: {}", "Title".blue(), req.title);
    println!("{}: {}", "Description".blue(), req.description);
    println!("{}: {}", "Status".blue(), status_badge(&req.status));
}

async fn show_requirement(api: &RequirementsApi, id: &str) -> Result<()> {
    let req = api.get_requirement(id).await?;
    print_requirement(&req);

    let history = VersionHistory::new(api.get_version_history(id).await);
    if let Some(latest) = history.latest() {
        println!(
            "{}: {} ({})",
            "Latest version".blue(),
            VersionHistory::label(history.len() - 1),
            latest.timestamp.format("%Y-%m-%d %H:%M:%S")
        );
    }

    Ok(())
}

async fn add_requirement(api: &RequirementsApi, draft: NewRequirement) -> Result<()> {
    let created = api.create_requirement(draft).await?;

    println!("{}", "Requirement added successfully!".green());
    println!("ID: {}", created.id.green());
    println!("Status: {}", status_badge(&created.status));

    Ok(())
}

async fn edit_requirement(
    api: &RequirementsApi,
    id: &str,
    title: &Option<String>,
    description: &Option<String>,
    status: &Option<String>,
) -> Result<()> {
    let current = api.get_requirement(id).await?;

    let update = if title.is_none() && description.is_none() && status.is_none() {
        RequirementUpdate::full(
            prompts::prompt_title(&current.title)?,
            prompts::prompt_description(&current.description)?,
            prompts::prompt_status(&current.status)?,
        )
    } else {
        // Status is always written, so carry the stored one when not given
        RequirementUpdate {
            title: title.clone(),
            description: description.clone(),
            status: status.as_deref().map(Status::from).unwrap_or(current.status),
        }
    };

    let updated = api.update_requirement(id, update).await?;
    println!("{}", "Requirement updated successfully!".green());
    print_requirement(&updated);

    Ok(())
}

async fn delete_requirement(api: &RequirementsApi, id: &str, skip_confirm: bool) -> Result<()> {
    let req = api.get_requirement(id).await?;

    println!("{}", "Requirement to delete:".yellow());
    println!("  ID: {}", req.id);
    println!("  Title: {}", req.title);
    println!("  Description: {}", req.description);

    // Confirm deletion unless --yes flag is used
    if !skip_confirm && !prompts::confirm("Are you sure you want to delete this requirement?")? {
        println!("Deletion cancelled.");
        return Ok(());
    }

    api.delete_requirement(id).await?;
    println!("{}", "Requirement deleted successfully!".green());

    Ok(())
}

fn print_criteria(generated: &AcceptanceCriteria) {
    println!(
        "{} {} ({})",
        "Acceptance criteria for".blue(),
        generated.requirement_id,
        generated.generated_at.format("%Y-%m-%d %H:%M:%S")
    );
    for line in &generated.criteria {
        println!("  {}", line);
    }
}

async fn show_history(api: &RequirementsApi, id: &str) -> Result<()> {
    let history = VersionHistory::new(api.get_version_history(id).await);

    if history.is_empty() {
        println!("{}", "No versions found.".yellow());
        return Ok(());
    }

    for (index, version) in history.iter().enumerate() {
        let label = VersionHistory::label(index);
        let marker = if history.is_latest(index) { " (latest)".green() } else { "".normal() };
        println!(
            "{}{} [{}] {}",
            label.blue(),
            marker,
            version.id,
            version.timestamp.format("%Y-%m-%d %H:%M:%S")
        );
        println!("  Title: {}", version.title);
        println!("  Description: {}", version.description);
    }

    Ok(())
}

async fn restore_requirement(api: &RequirementsApi, id: &str, version_id: Option<&str>, skip_confirm: bool) -> Result<()> {
    let current = api.get_requirement(id).await?;
    let history = VersionHistory::new(api.get_version_history(id).await);

    let version = match version_id {
        Some(version_id) => history
            .find(version_id)
            .with_context(|| format!("Version {} not found for requirement {}", version_id, id))?,
        None => history
            .latest()
            .with_context(|| format!("Requirement {} has no versions", id))?,
    };

    println!("{}", "Version to restore:".yellow());
    println!("  Title: {}", version.title);
    println!("  Description: {}", version.description);

    if !skip_confirm && !prompts::confirm("Replace the current title and description?")? {
        println!("Restore cancelled.");
        return Ok(());
    }

    let restored = api.restore_version(id, version).await?;
    // The restore itself leaves status alone; push it through the update path
    // with the status the requirement had before the restore.
    let update = RequirementUpdate::full(restored.title, restored.description, current.status);
    let updated = api.update_requirement(id, update).await?;

    println!("{}", "Version restored successfully!".green());
    print_requirement(&updated);

    Ok(())
}

/// Interactive editing session on one requirement. Edits arm the autosave
/// timer; the session waits for pending saves before exiting.
async fn run_session(controller: &SyncController, id: &str) -> Result<()> {
    if controller.refresh().await == 0 {
        anyhow::bail!("Could not load requirements, please try again");
    }
    controller.select(id).await?;

    loop {
        let Some(draft) = controller.draft() else {
            break;
        };

        let prompt_draft = draft.clone();
        let action = tokio::task::spawn_blocking(move || prompts::prompt_session_action(&prompt_draft)).await??;

        let outcome = match action {
            SessionAction::EditTitle => {
                let current = draft.title.clone();
                let title = tokio::task::spawn_blocking(move || prompts::prompt_title(&current)).await??;
                controller.edit_title(title);
                Ok(())
            }
            SessionAction::EditDescription => {
                let current = draft.description.clone();
                let description = tokio::task::spawn_blocking(move || prompts::prompt_description(&current)).await??;
                controller.edit_description(description);
                Ok(())
            }
            SessionAction::ChangeStatus => {
                let current = draft.status.clone();
                let status = tokio::task::spawn_blocking(move || prompts::prompt_status(&current)).await??;
                controller.edit_status(status);
                Ok(())
            }
            SessionAction::Save => controller.save().await.map(|saved| {
                println!("{} {}", "Saved:".green(), saved.title);
            }),
            SessionAction::Commit => controller.commit_version().await.map(|version| {
                let label = VersionHistory::label(controller.versions().len().saturating_sub(1));
                println!("{} {} [{}]", "Committed".green(), label, version.id);
            }),
            SessionAction::RestoreLatest => controller.restore_latest().await.map(|restored| match restored {
                Some(req) => println!("{} {}", "Restored:".green(), req.title),
                None => println!("{}", "No versions to restore.".yellow()),
            }),
            SessionAction::GenerateCriteria => controller.generate_criteria().await.map(|generated| {
                print_criteria(&generated);
            }),
            SessionAction::Show => {
                print_session(controller);
                Ok(())
            }
            SessionAction::Quit => break,
        };

        if let Err(e) = outcome {
            println!("{} {}", "Error:".red(), e);
            controller.clear_error();
        }
    }

    wait_for_pending_saves(controller).await;
    Ok(())
}

fn print_session(controller: &SyncController) {
    if let Some(draft) = controller.draft() {
        println!("{}: {}", "ID".blue(), draft.requirement_id);
        println!("{}: {}", "Title".blue(), draft.title);
        println!("{}: {}", "Description".blue(), draft.description);
        println!("{}: {}", "Status".blue(), status_badge(&draft.status));
        if controller.autosave_pending(&draft.requirement_id) {
            println!("{}", "Unsaved changes, autosave pending".yellow());
        }
    }
    match controller.last_saved() {
        Some(at) => println!("{}: {}", "Last saved".blue(), at.format("%H:%M:%S")),
        None => println!("{}: never", "Last saved".blue()),
    }
    let versions = controller.versions();
    println!("{}: {}", "Versions".blue(), versions.len());
}

async fn wait_for_pending_saves(controller: &SyncController) {
    if !controller.is_idle() {
        println!("{}", "Waiting for autosave...".yellow());
    }
    // Covers an autosave between leaving its timer and issuing its call
    while !controller.is_idle() {
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
}

fn handle_db_command(cmd: &DbCommand, config: &SpecFlowConfig, data_path: &Path) -> Result<()> {
    match cmd {
        DbCommand::Path => {
            println!("{}", data_path.display());
        }
        DbCommand::Migrate { to } => {
            let source = create_backend(data_path, config.storage.backend)?;
            let destination = create_backend(to, None)?;
            let count = copy_tables(source.as_ref(), destination.as_ref())?;
            println!(
                "{} {} tables from {} to {}",
                "Migrated".green(),
                count,
                source.backend_type(),
                to.display()
            );
        }
        DbCommand::Export { output } => {
            let source = create_backend(data_path, config.storage.backend)?;
            let count = export_to_json(source.as_ref(), output)?;
            println!("{} {} tables to {}", "Exported".green(), count, output.display());
        }
        DbCommand::Import { input } => {
            let destination = create_backend(data_path, config.storage.backend)?;
            let count = import_from_json(destination.as_ref(), input)?;
            println!("{} {} tables from {}", "Imported".green(), count, input.display());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use specflow_core::db::MemoryBackend;

    fn reliable_api() -> RequirementsApi {
        RequirementsApi::open(Arc::new(MemoryBackend::new()), ChannelPolicy::reliable()).unwrap()
    }

    #[tokio::test]
    async fn test_show_reads_through_channel() {
        let api = reliable_api();
        api.commit_version("1", "User Authentication", "").await.unwrap();
        let calls_before = api.channel().stats().calls;

        show_requirement(&api, "1").await.unwrap();
        // requirement and its history
        assert_eq!(api.channel().stats().calls, calls_before + 2);
    }

    #[tokio::test]
    async fn test_show_missing_requirement_fails() {
        let api = reliable_api();
        let err = show_requirement(&api, "404").await.unwrap_err();
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn test_truncate_long_titles() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("a much longer title", 10), "a much ...");
    }
}
