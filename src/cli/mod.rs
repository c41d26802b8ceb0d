pub mod auth;
pub mod completions;
pub mod context;
pub mod output;
pub mod planner;
pub mod prompt;
pub mod resolve;
pub mod spo;
pub mod spp;
pub mod teams;
pub mod tenant;
pub mod todo;
pub mod utils;
pub mod validation;

use clap::{Parser, Subcommand, ValueEnum};

use crate::api::Transport;
use prompt::Prompter;

/// Microsoft 365 CLI for Graph and SharePoint Online
#[derive(Parser, Debug)]
#[command(name = "m365")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Output format (default: from config, else json)
    #[arg(short, long, value_enum, global = true)]
    pub output: Option<OutputFormat>,

    /// Print progress messages to stderr
    #[arg(long, global = true)]
    pub verbose: bool,

    /// Print request-level diagnostics to stderr
    #[arg(long, global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Authentication commands
    Auth(auth::AuthCommand),

    /// Manage default option values for the current directory
    Context(context::ContextCommand),

    /// Microsoft Planner
    Planner(planner::PlannerCommand),

    /// Microsoft Teams
    Teams(teams::TeamsCommand),

    /// Microsoft To Do
    Todo(todo::TodoCommand),

    /// Tenant administration
    Tenant(tenant::TenantCommand),

    /// SharePoint Online
    Spo(spo::SpoCommand),

    /// SharePoint Premium
    Spp(spp::SppCommand),

    /// Generate shell completions
    Completions(completions::CompletionsCommand),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Default)]
pub enum OutputFormat {
    /// JSON output (raw API results)
    #[default]
    Json,
    /// Table output (default properties)
    Table,
    /// CSV output (default properties)
    Csv,
    /// Plain output, values joined with '|'
    Plain,
}

/// Services and settings a command runs with
pub struct Session<'a> {
    pub transport: &'a dyn Transport,
    pub prompter: &'a dyn Prompter,
    /// Interactive disambiguation when a name matches several objects
    pub prompt: bool,
    /// Confirmation before destructive operations
    pub confirm: bool,
    pub format: OutputFormat,
}

#[cfg(test)]
impl<'a> Session<'a> {
    pub fn for_test(transport: &'a dyn Transport, prompter: &'a dyn Prompter) -> Self {
        Self {
            transport,
            prompter,
            prompt: true,
            confirm: true,
            format: OutputFormat::Json,
        }
    }
}
