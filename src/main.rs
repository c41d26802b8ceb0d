mod api;
mod cache;
mod cli;
mod config;
mod error;
mod types;

use anyhow::Result;
use clap::{CommandFactory, Parser, ValueEnum};
use cli::context::{args_with_context, ContextFile};
use cli::output::print_warning;
use cli::prompt::ConsolePrompter;
use cli::{Cli, Commands, OutputFormat, Session};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command line with defaults from `.m365rc.json` applied
fn command_line() -> Vec<String> {
    let args: Vec<String> = std::env::args().collect();

    let options = match ContextFile::current().and_then(|file| file.options()) {
        Ok(options) => options,
        Err(err) => {
            print_warning(&err.to_string());
            return args;
        }
    };

    let mut command = Cli::command();
    command.build();
    args_with_context(&command, args, &options)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse_from(command_line());

    let level = if cli.debug {
        "debug"
    } else if cli.verbose {
        "info"
    } else {
        "warn"
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("m365_cli={}", level).into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();

    let command = match cli.command {
        Commands::Completions(cmd) => return cli::completions::execute(cmd),
        command => command,
    };

    let config = config::Config::load()?;
    if !config.output.color {
        colored::control::set_override(false);
    }

    let format = match cli.output {
        Some(format) => format,
        None => OutputFormat::from_str(&config.output.default_format, true).unwrap_or_else(|_| {
            print_warning(&format!(
                "Unknown output format '{}' in config, using json",
                config.output.default_format
            ));
            OutputFormat::Json
        }),
    };

    let client = api::M365Client::new(&config)?;
    let prompter = ConsolePrompter;
    let session = Session {
        transport: &client,
        prompter: &prompter,
        prompt: config.behavior.prompt,
        confirm: config.behavior.confirm,
        format,
    };

    match command {
        Commands::Auth(cmd) => cli::auth::execute(cmd, &client, &config, format).await,
        Commands::Context(cmd) => cli::context::execute(cmd, &session).await,
        Commands::Planner(cmd) => cli::planner::execute(cmd, &session).await,
        Commands::Teams(cmd) => cli::teams::execute(cmd, &session).await,
        Commands::Todo(cmd) => cli::todo::execute(cmd, &session).await,
        Commands::Tenant(cmd) => cli::tenant::execute(cmd, &session).await,
        Commands::Spo(cmd) => cli::spo::execute(cmd, &session).await,
        Commands::Spp(cmd) => cli::spp::execute(cmd, &session).await,
        Commands::Completions(_) => Ok(()),
    }
}
