use anyhow::Result;
use clap::{ArgGroup, Args, Subcommand};
use serde_json::{json, Value};

use super::output::{print_report, Report};
use super::prompt::confirm_or_force;
use super::resolve;
use super::validation::{self as validate, ValidationResult};
use super::Session;
use crate::api::Request;

#[derive(Args, Debug)]
pub struct TodoCommand {
    #[command(subcommand)]
    pub command: TodoSubcommand,
}

#[derive(Subcommand, Debug)]
pub enum TodoSubcommand {
    /// Manage Microsoft To Do task lists
    List(ListCommand),
}

#[derive(Args, Debug)]
pub struct ListCommand {
    #[command(subcommand)]
    pub command: ListSubcommand,
}

#[derive(Subcommand, Debug)]
pub enum ListSubcommand {
    /// Add a task list
    Add(ListAddOptions),

    /// Retrieve a task list
    Get(ListRefOptions),

    /// List task lists of the signed-in user
    List,

    /// Remove a task list
    Remove(ListRemoveOptions),
}

#[derive(Args, Debug, Default)]
pub struct ListAddOptions {
    /// Name of the task list
    #[arg(short, long)]
    pub name: String,
}

/// Task list addressed by id or name
#[derive(Args, Debug, Default)]
#[command(group(ArgGroup::new("one_of:list").multiple(true).args(["id", "name"])))]
pub struct ListRefOptions {
    /// ID of the task list
    #[arg(short, long)]
    pub id: Option<String>,

    /// Name of the task list
    #[arg(short, long)]
    pub name: Option<String>,
}

impl ListRefOptions {
    fn validate(&self) -> ValidationResult {
        validate::exactly_one_of(&[("name", self.name.is_some()), ("id", self.id.is_some())])
    }

    async fn id(&self, session: &Session<'_>) -> Result<String> {
        match (&self.id, &self.name) {
            (Some(id), _) => Ok(id.clone()),
            (None, name) => resolve::todo_list_id_by_name(session, name.as_deref().unwrap_or_default()).await,
        }
    }
}

#[derive(Args, Debug, Default)]
pub struct ListRemoveOptions {
    #[command(flatten)]
    pub list: ListRefOptions,

    /// Don't prompt for confirmation
    #[arg(short, long)]
    pub force: bool,
}

const LISTS_URL: &str = "https://graph.microsoft.com/v1.0/me/todo/lists";

pub async fn add_list(session: &Session<'_>, options: ListAddOptions) -> Result<Option<Report>> {
    let list = session
        .transport
        .execute(Request::post(LISTS_URL).json(json!({ "displayName": options.name })))
        .await?;
    Ok(Some(Report::new(list)))
}

pub async fn get_list(session: &Session<'_>, options: ListRefOptions) -> Result<Option<Report>> {
    options.validate()?;

    let id = options.id(session).await?;
    let list = session.transport.get(&format!("{}/{}", LISTS_URL, id)).await?;
    Ok(Some(Report::new(list)))
}

pub async fn list_lists(session: &Session<'_>) -> Result<Option<Report>> {
    let lists = session.transport.get_all(LISTS_URL).await?;
    Ok(Some(Report::with_properties(Value::Array(lists), &["displayName", "id"])))
}

pub async fn remove_list(session: &Session<'_>, options: ListRemoveOptions) -> Result<Option<Report>> {
    options.list.validate()?;

    let label = options
        .list
        .name
        .as_deref()
        .or(options.list.id.as_deref())
        .unwrap_or_default();
    if !confirm_or_force(
        session,
        options.force,
        &format!("Are you sure you want to remove the task list {}?", label),
    )? {
        return Ok(None);
    }

    let id = options.list.id(session).await?;
    tracing::info!("Removing task list {}", id);
    session
        .transport
        .execute(Request::delete(format!("{}/{}", LISTS_URL, id)))
        .await?;

    Ok(None)
}

pub async fn execute(cmd: TodoCommand, session: &Session<'_>) -> Result<()> {
    let report = match cmd.command {
        TodoSubcommand::List(list) => match list.command {
            ListSubcommand::Add(options) => add_list(session, options).await?,
            ListSubcommand::Get(options) => get_list(session, options).await?,
            ListSubcommand::List => list_lists(session).await?,
            ListSubcommand::Remove(options) => remove_list(session, options).await?,
        },
    };

    if let Some(report) = report {
        print_report(&report, session.format);
    }
    Ok(())
}
