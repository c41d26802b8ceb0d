use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::{Args, Subcommand};
use serde_json::{Map, Value};

use super::output::{print_report, Report};
use super::prompt::confirm_or_force;
use super::Session;
use crate::error::CommandError;

pub const CONTEXT_FILE: &str = ".m365rc.json";

const CONTEXT_KEY: &str = "context";

#[derive(Args, Debug)]
pub struct ContextCommand {
    #[command(subcommand)]
    pub command: ContextSubcommand,
}

#[derive(Subcommand, Debug)]
pub enum ContextSubcommand {
    /// Create the context in the current directory
    Init,

    /// Remove the context from the current directory
    Remove(ContextRemoveOptions),

    /// Manage context options
    Option(OptionCommand),
}

#[derive(Args, Debug)]
pub struct OptionCommand {
    #[command(subcommand)]
    pub command: OptionSubcommand,
}

#[derive(Subcommand, Debug)]
pub enum OptionSubcommand {
    /// Set a context option
    Set(OptionSetOptions),

    /// List context options
    List,

    /// Remove a context option
    Remove(OptionRemoveOptions),
}

#[derive(Args, Debug, Default)]
pub struct ContextRemoveOptions {
    /// Don't prompt for confirmation
    #[arg(short, long)]
    pub force: bool,
}

#[derive(Args, Debug, Default)]
pub struct OptionSetOptions {
    /// Name of the option, as the long option name of a command
    #[arg(short, long)]
    pub name: String,

    /// Value of the option
    #[arg(short, long)]
    pub value: String,
}

#[derive(Args, Debug, Default)]
pub struct OptionRemoveOptions {
    /// Name of the option
    #[arg(short, long)]
    pub name: String,

    /// Don't prompt for confirmation
    #[arg(short, long)]
    pub force: bool,
}

/// The `.m365rc.json` file of a directory
#[derive(Debug, Clone)]
pub struct ContextFile {
    path: PathBuf,
}

impl ContextFile {
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            path: dir.join(CONTEXT_FILE),
        }
    }

    pub fn current() -> Result<Self> {
        Ok(Self::in_dir(&std::env::current_dir()?))
    }

    /// File contents, `None` when there is no file
    fn read(&self) -> Result<Option<Map<String, Value>>> {
        if !self.path.exists() {
            return Ok(None);
        }

        let parsed = fs::read_to_string(&self.path)
            .map_err(anyhow::Error::from)
            .and_then(|content| Ok(serde_json::from_str::<Map<String, Value>>(&content)?));

        match parsed {
            Ok(map) => Ok(Some(map)),
            Err(err) => Err(CommandError::failed(format!(
                "Error reading {}: {}. Please add context info to {} manually.",
                CONTEXT_FILE, err, CONTEXT_FILE
            ))
            .into()),
        }
    }

    fn write(&self, content: &Map<String, Value>) -> Result<()> {
        let written = serde_json::to_string_pretty(content)
            .map_err(anyhow::Error::from)
            .and_then(|json| Ok(fs::write(&self.path, json)?));

        written.map_err(|err| {
            CommandError::failed(format!(
                "Error writing {}: {}. Please add context info to {} manually.",
                CONTEXT_FILE, err, CONTEXT_FILE
            ))
            .into()
        })
    }

    /// Ensure the file has a context object
    pub fn init(&self) -> Result<()> {
        let mut content = self.read()?.unwrap_or_default();
        if content.contains_key(CONTEXT_KEY) {
            return Ok(());
        }

        content.insert(CONTEXT_KEY.to_string(), Value::Object(Map::new()));
        self.write(&content)
    }

    /// Drop the context object, and the file when nothing else is left
    pub fn remove(&self) -> Result<()> {
        let Some(mut content) = self.read()? else {
            return Ok(());
        };
        if content.remove(CONTEXT_KEY).is_none() {
            return Ok(());
        }

        if content.is_empty() {
            fs::remove_file(&self.path).map_err(|err| {
                CommandError::failed(format!(
                    "Error removing {}: {}. Please remove context info from {} manually.",
                    CONTEXT_FILE, err, CONTEXT_FILE
                ))
            })?;
            return Ok(());
        }
        self.write(&content)
    }

    /// Context options, empty when there is no context
    pub fn options(&self) -> Result<Map<String, Value>> {
        Ok(self
            .read()?
            .and_then(|mut content| content.remove(CONTEXT_KEY))
            .and_then(|context| match context {
                Value::Object(options) => Some(options),
                _ => None,
            })
            .unwrap_or_default())
    }

    pub fn set_option(&self, name: &str, value: &str) -> Result<()> {
        let mut content = self.read()?.unwrap_or_default();
        let context = content
            .entry(CONTEXT_KEY)
            .or_insert_with(|| Value::Object(Map::new()));
        if !context.is_object() {
            *context = Value::Object(Map::new());
        }
        context[name] = Value::String(value.to_string());
        self.write(&content)
    }

    pub fn remove_option(&self, name: &str) -> Result<()> {
        let mut content = self.read()?.unwrap_or_default();
        let removed = content
            .get_mut(CONTEXT_KEY)
            .and_then(Value::as_object_mut)
            .and_then(|context| context.remove(name));

        if removed.is_none() {
            return Err(CommandError::not_found(format!(
                "There is no option {} in the context info",
                name
            ))
            .into());
        }
        self.write(&content)
    }
}

/// Prefix of argument groups whose options exclude each other
pub const ONE_OF_GROUP: &str = "one_of:";

/// Whether `arg` is given on the command line, by long or short name
fn is_present(args: &[String], arg: &clap::Arg) -> bool {
    let long_flag = arg.get_long().map(|long| format!("--{}", long));
    let short_flag = arg.get_short().map(|s| format!("-{}", s));
    args.iter().any(|a| match &long_flag {
        Some(long) if a == long || a.starts_with(&format!("{}=", long)) => true,
        _ => short_flag.as_deref() == Some(a.as_str()),
    })
}

/// Options sharing a `one_of:` group with `arg`
fn exclusive_with<'a>(command: &'a clap::Command, arg: &clap::Arg) -> Vec<&'a clap::Id> {
    command
        .get_groups()
        .filter(|group| group.get_id().as_str().starts_with(ONE_OF_GROUP))
        .filter(|group| group.get_args().any(|id| id == arg.get_id()))
        .flat_map(|group| group.get_args())
        .filter(|id| *id != arg.get_id())
        .collect()
}

/// Append context options the command line leaves unset.
///
/// Options apply to the leaf subcommand named on the command line, matched by
/// long option name. An option is skipped when the command line already sets
/// another option of its `one_of:` group.
pub fn args_with_context(
    command: &clap::Command,
    args: Vec<String>,
    options: &Map<String, Value>,
) -> Vec<String> {
    if options.is_empty() {
        return args;
    }

    let mut leaf = command;
    for arg in args.iter().skip(1) {
        if arg.starts_with('-') {
            continue;
        }
        // Values of global options may come before the subcommand names
        match leaf.find_subcommand(arg) {
            Some(sub) => leaf = sub,
            None if leaf.has_subcommands() => continue,
            None => break,
        }
    }
    if leaf.has_subcommands() {
        return args;
    }

    let mut extra = Vec::new();
    for arg in leaf.get_arguments() {
        let Some(long) = arg.get_long() else {
            continue;
        };
        let Some(value) = options.get(long) else {
            continue;
        };
        if is_present(&args, arg) {
            continue;
        }

        let excluded = exclusive_with(leaf, arg).into_iter().any(|id| {
            leaf.get_arguments()
                .any(|other| other.get_id() == id && is_present(&args, other))
        });
        if excluded {
            tracing::debug!("Skipping {} from {}: a conflicting option is set", long, CONTEXT_FILE);
            continue;
        }

        let value = match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        if arg.get_action().takes_values() {
            extra.push(format!("--{}", long));
            extra.push(value);
        } else if value == "true" {
            extra.push(format!("--{}", long));
        }
    }

    if !extra.is_empty() {
        tracing::debug!("Adding options from {}: {:?}", CONTEXT_FILE, extra);
    }
    args.into_iter().chain(extra).collect()
}

pub fn init(file: &ContextFile) -> Result<Option<Report>> {
    file.init()?;
    Ok(None)
}

pub fn remove(session: &Session<'_>, file: &ContextFile, options: ContextRemoveOptions) -> Result<Option<Report>> {
    if !confirm_or_force(session, options.force, "Are you sure you want to remove the context?")? {
        return Ok(None);
    }
    file.remove()?;
    Ok(None)
}

pub fn set_option(file: &ContextFile, options: OptionSetOptions) -> Result<Option<Report>> {
    tracing::info!("Saving option {} to {}", options.name, CONTEXT_FILE);
    file.set_option(&options.name, &options.value)?;
    Ok(None)
}

pub fn list_options(file: &ContextFile) -> Result<Option<Report>> {
    Ok(Some(Report::new(Value::Object(file.options()?))))
}

pub fn remove_option(
    session: &Session<'_>,
    file: &ContextFile,
    options: OptionRemoveOptions,
) -> Result<Option<Report>> {
    if !confirm_or_force(
        session,
        options.force,
        &format!("Are you sure you want to remove the context option {}?", options.name),
    )? {
        return Ok(None);
    }
    file.remove_option(&options.name)?;
    Ok(None)
}

pub async fn execute(cmd: ContextCommand, session: &Session<'_>) -> Result<()> {
    let file = ContextFile::current()?;

    let report = match cmd.command {
        ContextSubcommand::Init => init(&file)?,
        ContextSubcommand::Remove(options) => remove(session, &file, options)?,
        ContextSubcommand::Option(option) => match option.command {
            OptionSubcommand::Set(options) => set_option(&file, options)?,
            OptionSubcommand::List => list_options(&file)?,
            OptionSubcommand::Remove(options) => remove_option(session, &file, options)?,
        },
    };

    if let Some(report) = report {
        print_report(&report, session.format);
    }
    Ok(())
}
