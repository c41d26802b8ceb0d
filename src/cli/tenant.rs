use anyhow::Result;
use clap::{Args, Subcommand};
use serde_json::Value;

use super::output::{print_report, Report};
use super::{OutputFormat, Session};
use crate::api::GRAPH_V1;
use crate::error::CommandError;

#[derive(Args, Debug)]
pub struct TenantCommand {
    #[command(subcommand)]
    pub command: TenantSubcommand,
}

#[derive(Subcommand, Debug)]
pub enum TenantSubcommand {
    /// Microsoft 365 service announcements
    #[command(name = "serviceannouncement")]
    ServiceAnnouncement(ServiceAnnouncementCommand),
}

#[derive(Args, Debug)]
pub struct ServiceAnnouncementCommand {
    #[command(subcommand)]
    pub command: ServiceAnnouncementSubcommand,
}

#[derive(Subcommand, Debug)]
pub enum ServiceAnnouncementSubcommand {
    /// Service health of subscribed services
    Health(HealthCommand),
}

#[derive(Args, Debug)]
pub struct HealthCommand {
    #[command(subcommand)]
    pub command: HealthSubcommand,
}

#[derive(Subcommand, Debug)]
pub enum HealthSubcommand {
    /// List the health of all subscribed services
    List(HealthListOptions),

    /// Get the health of one service
    Get(HealthGetOptions),
}

#[derive(Args, Debug, Default)]
pub struct HealthListOptions {
    /// Include the issues of each service (JSON output only)
    #[arg(short, long)]
    pub issues: bool,
}

#[derive(Args, Debug, Default)]
pub struct HealthGetOptions {
    /// Name of the service, e.g. "Exchange Online"
    #[arg(short = 'i', long = "serviceName")]
    pub service_name: String,

    /// Include the issues of the service (JSON output only)
    #[arg(long)]
    pub issues: bool,
}

const HEALTH_URL: &str = "admin/serviceAnnouncement/healthOverviews";

const HEALTH_PROPERTIES: &[&str] = &["id", "status", "service"];

/// Issues are nested collections, only expanded when they can be shown
fn expand_issues(issues: bool, format: OutputFormat) -> &'static str {
    if issues && format == OutputFormat::Json {
        "?$expand=issues"
    } else {
        ""
    }
}

pub async fn list_health(session: &Session<'_>, options: HealthListOptions) -> Result<Option<Report>> {
    let url = format!(
        "{}/{}{}",
        GRAPH_V1,
        HEALTH_URL,
        expand_issues(options.issues, session.format)
    );
    let response = session.transport.get(&url).await?;

    match response.get("value") {
        Some(Value::Array(items)) => Ok(Some(Report::with_properties(
            Value::Array(items.clone()),
            HEALTH_PROPERTIES,
        ))),
        _ => Err(CommandError::failed("Error fetching service health").into()),
    }
}

pub async fn get_health(session: &Session<'_>, options: HealthGetOptions) -> Result<Option<Report>> {
    let url = format!(
        "{}/{}/{}{}",
        GRAPH_V1,
        HEALTH_URL,
        urlencoding::encode(&options.service_name),
        expand_issues(options.issues, session.format)
    );
    let health = session.transport.get(&url).await?;
    Ok(Some(Report::with_properties(health, HEALTH_PROPERTIES)))
}

pub async fn execute(cmd: TenantCommand, session: &Session<'_>) -> Result<()> {
    let report = match cmd.command {
        TenantSubcommand::ServiceAnnouncement(announcement) => match announcement.command {
            ServiceAnnouncementSubcommand::Health(health) => match health.command {
                HealthSubcommand::List(options) => list_health(session, options).await?,
                HealthSubcommand::Get(options) => get_health(session, options).await?,
            },
        },
    };

    if let Some(report) = report {
        print_report(&report, session.format);
    }
    Ok(())
}
