use anyhow::Result;
use clap::{ArgGroup, Args, Subcommand};
use serde_json::{json, Map, Value};

use super::output::{print_report, Report};
use super::prompt::confirm_or_force;
use super::resolve;
use super::utils::{encode_query_parameter, split_list};
use super::validation::{self as validate, ValidationResult};
use super::Session;
use crate::api::{Request, GRAPH_BETA, GRAPH_V1};
use crate::error::CommandError;
use crate::types::TaskPriority;

#[derive(Args, Debug)]
pub struct PlannerCommand {
    #[command(subcommand)]
    pub command: PlannerSubcommand,
}

#[derive(Subcommand, Debug)]
pub enum PlannerSubcommand {
    /// Manage Planner tasks
    Task(TaskCommand),

    /// Manage Planner plans
    Plan(PlanCommand),
}

#[derive(Args, Debug)]
pub struct TaskCommand {
    #[command(subcommand)]
    pub command: TaskSubcommand,
}

#[derive(Subcommand, Debug)]
pub enum TaskSubcommand {
    /// Retrieve a Planner task
    Get(TaskGetOptions),

    /// Update a Planner task
    Set(TaskSetOptions),

    /// Remove a Planner task
    Remove(TaskRemoveOptions),
}

#[derive(Args, Debug)]
pub struct PlanCommand {
    #[command(subcommand)]
    pub command: PlanSubcommand,
}

#[derive(Subcommand, Debug)]
pub enum PlanSubcommand {
    /// List Planner plans of a group or roster
    List(PlanListOptions),
}

/// Options locating a bucket, directly or through its plan
#[derive(Args, Debug, Default, Clone)]
#[command(group(ArgGroup::new("one_of:bucket").multiple(true).args(["bucket_id", "bucket_name"])))]
#[command(group(ArgGroup::new("one_of:plan").multiple(true).args(["plan_id", "plan_title", "roster_id"])))]
#[command(group(ArgGroup::new("one_of:owner").multiple(true).args(["owner_group_id", "owner_group_name"])))]
pub struct BucketOptions {
    /// ID of the bucket
    #[arg(long = "bucketId")]
    pub bucket_id: Option<String>,

    /// Name of the bucket
    #[arg(long = "bucketName")]
    pub bucket_name: Option<String>,

    /// ID of the plan the bucket belongs to
    #[arg(long = "planId")]
    pub plan_id: Option<String>,

    /// Title of the plan the bucket belongs to
    #[arg(long = "planTitle")]
    pub plan_title: Option<String>,

    /// ID of the group owning the plan
    #[arg(long = "ownerGroupId")]
    pub owner_group_id: Option<String>,

    /// Name of the group owning the plan
    #[arg(long = "ownerGroupName")]
    pub owner_group_name: Option<String>,

    /// ID of the roster containing the plan
    #[arg(long = "rosterId")]
    pub roster_id: Option<String>,
}

impl BucketOptions {
    fn named(&self) -> [(&'static str, bool); 7] {
        [
            ("bucketId", self.bucket_id.is_some()),
            ("bucketName", self.bucket_name.is_some()),
            ("planId", self.plan_id.is_some()),
            ("planTitle", self.plan_title.is_some()),
            ("ownerGroupId", self.owner_group_id.is_some()),
            ("ownerGroupName", self.owner_group_name.is_some()),
            ("rosterId", self.roster_id.is_some()),
        ]
    }

    /// Rules for locating the plan when the bucket is given by name
    fn validate_plan(&self) -> ValidationResult {
        validate::exactly_one_of_when(
            self.bucket_name.is_some(),
            &[
                ("planId", self.plan_id.is_some()),
                ("planTitle", self.plan_title.is_some()),
                ("rosterId", self.roster_id.is_some()),
            ],
        )?;
        validate::exactly_one_of_when(
            self.plan_title.is_some(),
            &[
                ("ownerGroupId", self.owner_group_id.is_some()),
                ("ownerGroupName", self.owner_group_name.is_some()),
            ],
        )?;
        if let Some(id) = &self.owner_group_id {
            validate::guid(id, "ownerGroupId")?;
        }
        Ok(())
    }

    async fn plan_id(&self, session: &Session<'_>) -> Result<String> {
        if let Some(plan_id) = &self.plan_id {
            return Ok(plan_id.clone());
        }
        if let Some(roster_id) = &self.roster_id {
            return resolve::plan_id_by_roster(session, roster_id).await;
        }

        let title = self.plan_title.as_deref().unwrap_or_default();
        let group_id = match (&self.owner_group_id, &self.owner_group_name) {
            (Some(id), _) => id.clone(),
            (None, Some(name)) => resolve::group_id_by_name(session, name).await?,
            (None, None) => return Err(CommandError::validation("Specify ownerGroupId or ownerGroupName.").into()),
        };
        resolve::plan_id_by_title(session, title, &group_id).await
    }

    /// Bucket id, resolving the name through the plan when needed
    async fn bucket_id(&self, session: &Session<'_>) -> Result<Option<String>> {
        if let Some(id) = &self.bucket_id {
            return Ok(Some(id.clone()));
        }
        let Some(name) = &self.bucket_name else {
            return Ok(None);
        };

        let plan_id = self.plan_id(session).await?;
        Ok(Some(resolve::bucket_id_by_name(session, name, &plan_id).await?))
    }
}

/// Task addressed by id or by title within a bucket
fn validate_task_ref(id: &Option<String>, title: &Option<String>, bucket: &BucketOptions) -> ValidationResult {
    validate::exactly_one_of(&[("id", id.is_some()), ("title", title.is_some())])?;

    if id.is_some() {
        for (name, set) in bucket.named() {
            validate::forbid("id", true, name, set)?;
        }
        return Ok(());
    }

    validate::exactly_one_of(&[
        ("bucketId", bucket.bucket_id.is_some()),
        ("bucketName", bucket.bucket_name.is_some()),
    ])?;
    bucket.validate_plan()
}

async fn task_id(session: &Session<'_>, id: &Option<String>, title: &Option<String>, bucket: &BucketOptions) -> Result<String> {
    if let Some(id) = id {
        return Ok(id.clone());
    }
    let title = title.as_deref().unwrap_or_default();
    let bucket_id = bucket.bucket_id(session).await?.unwrap_or_default();
    resolve::task_id_by_title(session, title, &bucket_id).await
}

async fn etag(session: &Session<'_>, url: &str, error: &str) -> Result<String> {
    let resource = session
        .transport
        .execute(Request::get(url).header("accept", "application/json"))
        .await?;

    resource
        .get("@odata.etag")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| CommandError::failed(error).into())
}

#[derive(Args, Debug, Default)]
#[command(group(ArgGroup::new("one_of:task").multiple(true).args(["id", "title"])))]
pub struct TaskGetOptions {
    /// ID of the task
    #[arg(short, long)]
    pub id: Option<String>,

    /// Title of the task
    #[arg(short, long)]
    pub title: Option<String>,

    #[command(flatten)]
    pub bucket: BucketOptions,
}

impl TaskGetOptions {
    fn validate(&self) -> ValidationResult {
        validate_task_ref(&self.id, &self.title, &self.bucket)
    }
}

pub async fn get_task(session: &Session<'_>, options: TaskGetOptions) -> Result<Option<Report>> {
    options.validate()?;

    let id = task_id(session, &options.id, &options.title, &options.bucket).await?;
    let task = session
        .transport
        .execute(
            Request::get(format!("{}/planner/tasks/{}", GRAPH_V1, encode_query_parameter(&id)))
                .header("accept", "application/json;odata.metadata=none"),
        )
        .await?;

    Ok(Some(Report::new(task)))
}

#[derive(Args, Debug, Default)]
#[command(group(ArgGroup::new("one_of:assignee").multiple(true).args(["assigned_to_user_ids", "assigned_to_user_names"])))]
pub struct TaskSetOptions {
    /// ID of the task to update
    #[arg(short, long)]
    pub id: String,

    /// New title of the task
    #[arg(short, long)]
    pub title: Option<String>,

    #[command(flatten)]
    pub bucket: BucketOptions,

    /// Date and time at which the task starts (ISO 8601)
    #[arg(long = "startDateTime")]
    pub start_date_time: Option<String>,

    /// Date and time at which the task is due (ISO 8601)
    #[arg(long = "dueDateTime")]
    pub due_date_time: Option<String>,

    /// Percentage of task completion (0-100)
    #[arg(long = "percentComplete")]
    pub percent_complete: Option<i64>,

    /// Comma-separated IDs of the assignees
    #[arg(long = "assignedToUserIds")]
    pub assigned_to_user_ids: Option<String>,

    /// Comma-separated UPNs of the assignees
    #[arg(long = "assignedToUserNames")]
    pub assigned_to_user_names: Option<String>,

    /// Hint used to order items of this type in a list view
    #[arg(long = "assigneePriority")]
    pub assignee_priority: Option<String>,

    /// Description of the task
    #[arg(long)]
    pub description: Option<String>,

    /// Comma-separated categories applied to the task (category1-category25)
    #[arg(long = "appliedCategories")]
    pub applied_categories: Option<String>,

    /// Hint used to order items of this type in a list view
    #[arg(long = "orderHint")]
    pub order_hint: Option<String>,

    /// Priority: 0-10, or Urgent, Important, Medium, Low
    #[arg(long)]
    pub priority: Option<String>,
}

fn is_valid_category(value: &str) -> bool {
    value
        .strip_prefix("category")
        .and_then(|n| n.parse::<u8>().ok())
        .is_some_and(|n| (1..=25).contains(&n) && !value.starts_with("category0"))
}

/// Numeric priority from a number or label
fn parse_priority(value: &str) -> Option<i64> {
    match value.parse::<i64>() {
        Ok(n) if (0..=10).contains(&n) => Some(n),
        Ok(_) => None,
        Err(_) => TaskPriority::from_label(value).map(TaskPriority::value),
    }
}

impl TaskSetOptions {
    fn validate(&self) -> ValidationResult {
        let bucket = &self.bucket;
        validate::at_most_one_of(&[
            ("bucketId", bucket.bucket_id.is_some()),
            ("bucketName", bucket.bucket_name.is_some()),
        ])?;
        bucket.validate_plan()?;

        if let Some(value) = &self.start_date_time {
            validate::iso_date_time(value, "startDateTime")?;
        }
        if let Some(value) = &self.due_date_time {
            validate::iso_date_time(value, "dueDateTime")?;
        }
        if let Some(value) = self.percent_complete {
            if !(0..=100).contains(&value) {
                return Err(CommandError::validation(format!(
                    "percentComplete should be between 0 and 100, {} given.",
                    value
                )));
            }
        }

        validate::at_most_one_of(&[
            ("assignedToUserIds", self.assigned_to_user_ids.is_some()),
            ("assignedToUserNames", self.assigned_to_user_names.is_some()),
        ])?;
        if let Some(ids) = &self.assigned_to_user_ids {
            validate::each_in_list(ids, "assignedToUserIds", validate::is_valid_guid, "GUIDs")?;
        }
        if let Some(names) = &self.assigned_to_user_names {
            validate::each_in_list(
                names,
                "assignedToUserNames",
                validate::is_valid_user_principal_name,
                "user principal names",
            )?;
        }

        if let Some(categories) = &self.applied_categories {
            let invalid: Vec<String> = split_list(categories)
                .into_iter()
                .filter(|c| !is_valid_category(c))
                .collect();
            if !invalid.is_empty() {
                return Err(CommandError::validation(format!(
                    "The appliedCategories contains invalid value. Specify either category1, category2, ..., category25 as properties. Invalid: {}.",
                    invalid.join(", ")
                )));
            }
        }

        if let Some(priority) = &self.priority {
            if parse_priority(priority).is_none() {
                return Err(CommandError::validation(format!(
                    "{} is not a valid priority value. Allowed values are 0-10|Urgent|Important|Medium|Low.",
                    priority
                )));
            }
        }

        Ok(())
    }

    /// Assignee ids, resolving user principal names when given
    async fn assignee_ids(&self, session: &Session<'_>) -> Result<Option<Vec<String>>> {
        if let Some(ids) = &self.assigned_to_user_ids {
            return Ok(Some(split_list(ids)));
        }
        match &self.assigned_to_user_names {
            Some(names) => Ok(Some(resolve::user_ids_by_upn(session, &split_list(names)).await?)),
            None => Ok(None),
        }
    }

    fn body(&self, bucket_id: Option<String>, assignees: Option<Vec<String>>) -> Value {
        let mut body = Map::new();
        if let Some(bucket_id) = bucket_id {
            body.insert("bucketId".into(), json!(bucket_id));
        }
        if let Some(title) = &self.title {
            body.insert("title".into(), json!(title));
        }
        if let Some(start) = &self.start_date_time {
            body.insert("startDateTime".into(), json!(start));
        }
        if let Some(due) = &self.due_date_time {
            body.insert("dueDateTime".into(), json!(due));
        }
        if let Some(percent) = self.percent_complete {
            body.insert("percentComplete".into(), json!(percent));
        }
        if let Some(assignees) = assignees {
            let assignments: Map<String, Value> = assignees
                .into_iter()
                .map(|id| {
                    (
                        id,
                        json!({
                            "@odata.type": "#microsoft.graph.plannerAssignment",
                            "orderHint": " !"
                        }),
                    )
                })
                .collect();
            body.insert("assignments".into(), Value::Object(assignments));
        }
        if let Some(hint) = &self.assignee_priority {
            body.insert("assigneePriority".into(), json!(hint));
        }
        if let Some(categories) = &self.applied_categories {
            let applied: Map<String, Value> = split_list(categories)
                .into_iter()
                .map(|c| (c.to_lowercase(), Value::Bool(true)))
                .collect();
            body.insert("appliedCategories".into(), Value::Object(applied));
        }
        if let Some(hint) = &self.order_hint {
            body.insert("orderHint".into(), json!(hint));
        }
        if let Some(priority) = self.priority.as_deref().and_then(parse_priority) {
            body.insert("priority".into(), json!(priority));
        }
        Value::Object(body)
    }
}

pub async fn set_task(session: &Session<'_>, options: TaskSetOptions) -> Result<Option<Report>> {
    options.validate()?;

    let bucket_id = options.bucket.bucket_id(session).await?;
    let assignees = options.assignee_ids(session).await?;

    let task_url = format!("{}/planner/tasks/{}", GRAPH_V1, encode_query_parameter(&options.id));
    let task_etag = etag(session, &task_url, "Error fetching task").await?;

    tracing::info!("Updating task {}", options.id);
    let mut task = session
        .transport
        .execute(
            Request::patch(&task_url)
                .header("accept", "application/json;odata.metadata=none")
                .header("If-Match", task_etag)
                .header("Prefer", "return=representation")
                .json(options.body(bucket_id, assignees)),
        )
        .await?;

    if let Some(description) = &options.description {
        let details_url = format!("{}/details", task_url);
        let details_etag = etag(session, &details_url, "Error fetching task details").await?;

        tracing::info!("Updating description of task {}", options.id);
        let details = session
            .transport
            .execute(
                Request::patch(&details_url)
                    .header("accept", "application/json;odata.metadata=none")
                    .header("If-Match", details_etag)
                    .header("Prefer", "return=representation")
                    .json(json!({ "description": description })),
            )
            .await?;

        if let (Some(task), Value::Object(details)) = (task.as_object_mut(), details) {
            task.extend(details);
        }
    }

    Ok(Some(Report::new(task)))
}

#[derive(Args, Debug, Default)]
#[command(group(ArgGroup::new("one_of:task").multiple(true).args(["id", "title"])))]
pub struct TaskRemoveOptions {
    /// ID of the task to remove
    #[arg(short, long)]
    pub id: Option<String>,

    /// Title of the task to remove
    #[arg(short, long)]
    pub title: Option<String>,

    #[command(flatten)]
    pub bucket: BucketOptions,

    /// Don't prompt for confirmation
    #[arg(short, long)]
    pub force: bool,
}

impl TaskRemoveOptions {
    fn validate(&self) -> ValidationResult {
        validate_task_ref(&self.id, &self.title, &self.bucket)
    }
}

pub async fn remove_task(session: &Session<'_>, options: TaskRemoveOptions) -> Result<Option<Report>> {
    options.validate()?;

    let label = options.id.as_deref().or(options.title.as_deref()).unwrap_or_default();
    if !confirm_or_force(
        session,
        options.force,
        &format!("Are you sure you want to remove the task {}?", label),
    )? {
        return Ok(None);
    }

    let id = task_id(session, &options.id, &options.title, &options.bucket).await?;
    let url = format!("{}/planner/tasks/{}", GRAPH_V1, encode_query_parameter(&id));
    let task_etag = etag(session, &url, "Error fetching task").await?;

    tracing::info!("Removing task {}", id);
    session
        .transport
        .execute(Request::delete(&url).header("If-Match", task_etag))
        .await?;

    Ok(None)
}

#[derive(Args, Debug, Default)]
#[command(group(ArgGroup::new("one_of:owner").multiple(true).args(["owner_group_id", "owner_group_name", "roster_id"])))]
pub struct PlanListOptions {
    /// ID of the group owning the plans
    #[arg(long = "ownerGroupId")]
    pub owner_group_id: Option<String>,

    /// Name of the group owning the plans
    #[arg(long = "ownerGroupName")]
    pub owner_group_name: Option<String>,

    /// ID of the roster containing the plan
    #[arg(long = "rosterId")]
    pub roster_id: Option<String>,
}

pub async fn list_plans(session: &Session<'_>, options: PlanListOptions) -> Result<Option<Report>> {
    validate::exactly_one_of(&[
        ("ownerGroupId", options.owner_group_id.is_some()),
        ("ownerGroupName", options.owner_group_name.is_some()),
        ("rosterId", options.roster_id.is_some()),
    ])?;
    if let Some(id) = &options.owner_group_id {
        validate::guid(id, "ownerGroupId")?;
    }

    let url = if let Some(roster_id) = &options.roster_id {
        format!("{}/planner/rosters/{}/plans", GRAPH_BETA, roster_id)
    } else {
        let group_id = match (&options.owner_group_id, &options.owner_group_name) {
            (Some(id), _) => id.clone(),
            (None, name) => resolve::group_id_by_name(session, name.as_deref().unwrap_or_default()).await?,
        };
        format!("{}/groups/{}/planner/plans", GRAPH_V1, group_id)
    };

    let plans = session.transport.get_all(&url).await?;
    Ok(Some(Report::with_properties(
        Value::Array(plans),
        &["id", "title", "createdDateTime", "owner"],
    )))
}

pub async fn execute(cmd: PlannerCommand, session: &Session<'_>) -> Result<()> {
    let report = match cmd.command {
        PlannerSubcommand::Task(task) => match task.command {
            TaskSubcommand::Get(options) => get_task(session, options).await?,
            TaskSubcommand::Set(options) => set_task(session, options).await?,
            TaskSubcommand::Remove(options) => remove_task(session, options).await?,
        },
        PlannerSubcommand::Plan(plan) => match plan.command {
            PlanSubcommand::List(options) => list_plans(session, options).await?,
        },
    };

    if let Some(report) = report {
        print_report(&report, session.format);
    }
    Ok(())
}
