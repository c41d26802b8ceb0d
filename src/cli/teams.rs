use anyhow::Result;
use clap::{ArgGroup, Args, Subcommand, ValueEnum};
use serde_json::{json, Map, Value};

use super::output::{print_report, Report};
use super::prompt::confirm_or_force;
use super::resolve::{self, MemberRef};
use super::utils::encode_query_parameter;
use super::validation::{self as validate, ValidationResult};
use super::Session;
use crate::api::{Request, GRAPH_V1};
use crate::error::CommandError;
use crate::types::ConversationMember;

#[derive(Args, Debug)]
pub struct TeamsCommand {
    #[command(subcommand)]
    pub command: TeamsSubcommand,
}

#[derive(Subcommand, Debug)]
pub enum TeamsSubcommand {
    /// Manage channels of a team
    Channel(ChannelCommand),
}

#[derive(Args, Debug)]
pub struct ChannelCommand {
    #[command(subcommand)]
    pub command: ChannelSubcommand,
}

#[derive(Subcommand, Debug)]
pub enum ChannelSubcommand {
    /// Add a channel to a team
    Add(ChannelAddOptions),

    /// List channels of a team
    List(ChannelListOptions),

    /// Manage members of a private or shared channel
    Member(MemberCommand),
}

#[derive(Args, Debug)]
pub struct MemberCommand {
    #[command(subcommand)]
    pub command: MemberSubcommand,
}

#[derive(Subcommand, Debug)]
pub enum MemberSubcommand {
    /// List members of a channel
    List(MemberListOptions),

    /// Remove a member from a private channel
    Remove(MemberRemoveOptions),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Default)]
pub enum ChannelType {
    #[default]
    Standard,
    Private,
    Shared,
}

impl ChannelType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Standard => "standard",
            Self::Private => "private",
            Self::Shared => "shared",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum MemberRole {
    Owner,
    Member,
    Guest,
}

impl MemberRole {
    fn matches(self, member: &ConversationMember) -> bool {
        match self {
            Self::Owner => member.roles.iter().any(|r| r == "owner"),
            Self::Guest => member.roles.iter().any(|r| r == "guest"),
            Self::Member => member.roles.is_empty(),
        }
    }
}

/// Team addressed by id or display name
#[derive(Args, Debug, Default, Clone)]
#[command(group(ArgGroup::new("one_of:team").multiple(true).args(["team_id", "team_name"])))]
pub struct TeamOptions {
    /// ID of the team
    #[arg(short = 'i', long = "teamId")]
    pub team_id: Option<String>,

    /// Display name of the team
    #[arg(long = "teamName")]
    pub team_name: Option<String>,
}

impl TeamOptions {
    fn validate(&self) -> ValidationResult {
        validate::exactly_one_of(&[
            ("teamId", self.team_id.is_some()),
            ("teamName", self.team_name.is_some()),
        ])?;
        if let Some(id) = &self.team_id {
            validate::guid(id, "teamId")?;
        }
        Ok(())
    }

    fn label(&self) -> &str {
        self.team_id
            .as_deref()
            .or(self.team_name.as_deref())
            .unwrap_or_default()
    }

    /// Team id, looking the name up among groups provisioned as teams
    async fn id(&self, session: &Session<'_>) -> Result<String> {
        match &self.team_id {
            Some(id) => Ok(id.clone()),
            None => resolve::team_id_by_name(session, self.label()).await,
        }
    }
}

/// Channel addressed by id or display name
#[derive(Args, Debug, Default, Clone)]
#[command(group(ArgGroup::new("one_of:channel").multiple(true).args(["channel_id", "channel_name"])))]
pub struct ChannelOptions {
    /// ID of the channel
    #[arg(long = "channelId")]
    pub channel_id: Option<String>,

    /// Display name of the channel
    #[arg(long = "channelName")]
    pub channel_name: Option<String>,
}

impl ChannelOptions {
    fn validate(&self) -> ValidationResult {
        validate::exactly_one_of(&[
            ("channelId", self.channel_id.is_some()),
            ("channelName", self.channel_name.is_some()),
        ])?;
        if let Some(id) = &self.channel_id {
            validate::teams_channel_id(id, "channelId")?;
        }
        Ok(())
    }

    fn label(&self) -> &str {
        self.channel_id
            .as_deref()
            .or(self.channel_name.as_deref())
            .unwrap_or_default()
    }
}

#[derive(Args, Debug, Default)]
pub struct ChannelAddOptions {
    #[command(flatten)]
    pub team: TeamOptions,

    /// Name of the channel to add
    #[arg(short, long)]
    pub name: String,

    /// Description of the channel
    #[arg(short, long)]
    pub description: Option<String>,

    /// Membership type of the channel
    #[arg(long = "type", value_enum)]
    pub channel_type: Option<ChannelType>,

    /// Owner of a private or shared channel (ID or user principal name)
    #[arg(long)]
    pub owner: Option<String>,
}

impl ChannelAddOptions {
    fn validate(&self) -> ValidationResult {
        self.team.validate()?;

        let channel_type = self.channel_type.unwrap_or_default();
        match (channel_type, &self.owner) {
            (ChannelType::Standard, Some(_)) => Err(CommandError::validation(
                "Specify owner only when creating a private or shared channel.",
            )),
            (ChannelType::Private | ChannelType::Shared, None) => Err(CommandError::validation(
                format!("Specify owner when creating a {} channel.", channel_type.as_str()),
            )),
            _ => Ok(()),
        }
    }

    fn body(&self) -> Value {
        let channel_type = self.channel_type.unwrap_or_default();
        let mut body = Map::new();
        body.insert("displayName".into(), json!(self.name));
        if let Some(description) = &self.description {
            body.insert("description".into(), json!(description));
        }
        body.insert("membershipType".into(), json!(channel_type.as_str()));

        if let Some(owner) = &self.owner {
            body.insert(
                "members".into(),
                json!([{
                    "@odata.type": "#microsoft.graph.aadUserConversationMember",
                    "user@odata.bind": format!("{}/users('{}')", GRAPH_V1, owner),
                    "roles": ["owner"]
                }]),
            );
        }
        Value::Object(body)
    }
}

pub async fn add_channel(session: &Session<'_>, options: ChannelAddOptions) -> Result<Option<Report>> {
    options.validate()?;

    let team_id = match &options.team.team_id {
        Some(id) => id.clone(),
        None => resolve::joined_team_id_by_name(session, options.team.label()).await?,
    };

    tracing::info!("Adding channel {} to team {}", options.name, team_id);
    let channel = session
        .transport
        .execute(
            Request::post(format!("{}/teams/{}/channels", GRAPH_V1, team_id)).json(options.body()),
        )
        .await?;

    Ok(Some(Report::new(channel)))
}

#[derive(Args, Debug, Default)]
pub struct ChannelListOptions {
    #[command(flatten)]
    pub team: TeamOptions,

    /// Only list channels of this membership type
    #[arg(long = "type", value_enum)]
    pub channel_type: Option<ChannelType>,
}

pub async fn list_channels(session: &Session<'_>, options: ChannelListOptions) -> Result<Option<Report>> {
    options.team.validate()?;

    let team_id = options.team.id(session).await?;
    let mut url = format!("{}/teams/{}/channels", GRAPH_V1, team_id);
    if let Some(channel_type) = options.channel_type {
        url.push_str(&format!(
            "?$filter=membershipType eq '{}'",
            encode_query_parameter(channel_type.as_str())
        ));
    }

    let channels = session.transport.get_all(&url).await?;
    Ok(Some(Report::with_properties(Value::Array(channels), &["id", "displayName"])))
}

async fn channel_id(session: &Session<'_>, team_id: &str, channel: &ChannelOptions, private_only: bool) -> Result<String> {
    if let Some(id) = &channel.channel_id {
        return Ok(id.clone());
    }

    let found = resolve::channel_by_name(session, team_id, channel.label()).await?;
    if private_only && found.membership_type.as_deref() != Some("private") {
        return Err(CommandError::failed("The specified channel is not a private channel").into());
    }
    Ok(found.id)
}

#[derive(Args, Debug, Default)]
pub struct MemberListOptions {
    #[command(flatten)]
    pub team: TeamOptions,

    #[command(flatten)]
    pub channel: ChannelOptions,

    /// Only list members with this role
    #[arg(short, long, value_enum)]
    pub role: Option<MemberRole>,
}

pub async fn list_members(session: &Session<'_>, options: MemberListOptions) -> Result<Option<Report>> {
    options.team.validate()?;
    options.channel.validate()?;

    let team_id = options.team.id(session).await?;
    let channel_id = channel_id(session, &team_id, &options.channel, false).await?;

    let members = session
        .transport
        .get_all(&format!("{}/teams/{}/channels/{}/members", GRAPH_V1, team_id, channel_id))
        .await?;

    let members: Vec<Value> = match options.role {
        Some(role) => members
            .into_iter()
            .filter(|m| {
                serde_json::from_value::<ConversationMember>(m.clone())
                    .map(|member| role.matches(&member))
                    .unwrap_or(false)
            })
            .collect(),
        None => members,
    };

    Ok(Some(Report::with_properties(
        Value::Array(members),
        &["id", "roles", "displayName", "userId", "email"],
    )))
}

#[derive(Args, Debug, Default)]
#[command(group(ArgGroup::new("one_of:member").multiple(true).args(["id", "user_id", "user_name"])))]
pub struct MemberRemoveOptions {
    #[command(flatten)]
    pub team: TeamOptions,

    #[command(flatten)]
    pub channel: ChannelOptions,

    /// Membership ID of the member to remove
    #[arg(long)]
    pub id: Option<String>,

    /// Entra ID of the user to remove
    #[arg(long = "userId")]
    pub user_id: Option<String>,

    /// User principal name of the user to remove
    #[arg(long = "userName")]
    pub user_name: Option<String>,

    /// Don't prompt for confirmation
    #[arg(short, long)]
    pub force: bool,
}

impl MemberRemoveOptions {
    fn validate(&self) -> ValidationResult {
        self.team.validate()?;
        self.channel.validate()?;
        validate::exactly_one_of(&[
            ("id", self.id.is_some()),
            ("userId", self.user_id.is_some()),
            ("userName", self.user_name.is_some()),
        ])?;
        if let Some(id) = &self.user_id {
            validate::guid(id, "userId")?;
        }
        Ok(())
    }

    fn member_label(&self) -> &str {
        self.id
            .as_deref()
            .or(self.user_name.as_deref())
            .or(self.user_id.as_deref())
            .unwrap_or_default()
    }
}

pub async fn remove_member(session: &Session<'_>, options: MemberRemoveOptions) -> Result<Option<Report>> {
    options.validate()?;

    let message = format!(
        "Are you sure you want to remove the member {} from the channel {} in team {}?",
        options.member_label(),
        options.channel.label(),
        options.team.label()
    );
    if !confirm_or_force(session, options.force, &message)? {
        return Ok(None);
    }

    let team_id = options.team.id(session).await?;
    let channel_id = channel_id(session, &team_id, &options.channel, true).await?;

    let member_id = match (&options.id, &options.user_id, &options.user_name) {
        (Some(id), _, _) => id.clone(),
        (None, Some(user_id), _) => {
            resolve::channel_member_id(session, &team_id, &channel_id, MemberRef::UserId(user_id)).await?
        }
        (None, None, user_name) => {
            let user_name = user_name.as_deref().unwrap_or_default();
            resolve::channel_member_id(session, &team_id, &channel_id, MemberRef::UserName(user_name)).await?
        }
    };

    tracing::info!("Removing member {} from channel {}", member_id, channel_id);
    session
        .transport
        .execute(Request::delete(format!(
            "{}/teams/{}/channels/{}/members/{}",
            GRAPH_V1, team_id, channel_id, member_id
        )))
        .await?;

    Ok(None)
}

pub async fn execute(cmd: TeamsCommand, session: &Session<'_>) -> Result<()> {
    let report = match cmd.command {
        TeamsSubcommand::Channel(channel) => match channel.command {
            ChannelSubcommand::Add(options) => add_channel(session, options).await?,
            ChannelSubcommand::List(options) => list_channels(session, options).await?,
            ChannelSubcommand::Member(member) => match member.command {
                MemberSubcommand::List(options) => list_members(session, options).await?,
                MemberSubcommand::Remove(options) => remove_member(session, options).await?,
            },
        },
    };

    if let Some(report) = report {
        print_report(&report, session.format);
    }
    Ok(())
}
