//! Resolution of human-friendly names to the identifiers REST endpoints expect.

use anyhow::Result;
use futures::future::join_all;

use super::prompt::handle_multiple_results_found;
use super::utils::{encode_query_parameter, server_relative_path};
use super::Session;
use crate::api::{fetch, fetch_all, GRAPH_BETA, GRAPH_V1};
use crate::error::CommandError;
use crate::types::*;

/// Id of the group with the given display name
pub async fn group_id_by_name(session: &Session<'_>, name: &str) -> Result<String> {
    let url = format!(
        "{}/groups?$filter=displayName eq '{}'&$select=id",
        GRAPH_V1,
        encode_query_parameter(name)
    );
    let groups: Vec<Group> = fetch_all(session.transport, &url).await?;

    match groups.len() {
        0 => Err(CommandError::not_found(format!("The specified group '{}' does not exist.", name)).into()),
        1 => Ok(groups[0].id.clone()),
        _ => handle_multiple_results_found(
            session,
            &format!("Multiple groups with name '{}' found.", name),
            groups.into_iter().map(|g| (g.id.clone(), g.id)).collect(),
        ),
    }
}

/// Id of the plan with the given title owned by a group
pub async fn plan_id_by_title(session: &Session<'_>, title: &str, group_id: &str) -> Result<String> {
    let url = format!("{}/groups/{}/planner/plans?$select=id,title", GRAPH_V1, group_id);
    let plans: Vec<PlannerPlan> = fetch_all(session.transport, &url).await?;
    let matches: Vec<PlannerPlan> = plans
        .into_iter()
        .filter(|p| p.title.as_deref().is_some_and(|t| t.eq_ignore_ascii_case(title)))
        .collect();

    match matches.len() {
        0 => Err(CommandError::not_found(format!("The specified plan '{}' does not exist.", title)).into()),
        1 => Ok(matches[0].id.clone()),
        _ => handle_multiple_results_found(
            session,
            &format!("Multiple plans with title '{}' found.", title),
            matches.into_iter().map(|p| (p.id.clone(), p.id)).collect(),
        ),
    }
}

/// Id of the plan contained in a roster
pub async fn plan_id_by_roster(session: &Session<'_>, roster_id: &str) -> Result<String> {
    let url = format!("{}/planner/rosters/{}/plans?$select=id", GRAPH_BETA, roster_id);
    let plans: Vec<PlannerPlan> = fetch_all(session.transport, &url).await?;

    plans.into_iter().next().map(|p| p.id).ok_or_else(|| {
        CommandError::not_found(format!("The specified roster '{}' does not have a plan.", roster_id)).into()
    })
}

/// Id of the bucket with the given name in a plan
pub async fn bucket_id_by_name(session: &Session<'_>, name: &str, plan_id: &str) -> Result<String> {
    let url = format!("{}/planner/plans/{}/buckets?$select=id,name", GRAPH_V1, plan_id);
    let buckets: Vec<PlannerBucket> = fetch_all(session.transport, &url).await?;
    let matches: Vec<PlannerBucket> = buckets
        .into_iter()
        .filter(|b| b.name.as_deref().is_some_and(|n| n.eq_ignore_ascii_case(name)))
        .collect();

    match matches.len() {
        0 => Err(CommandError::not_found(format!("The specified bucket '{}' does not exist.", name)).into()),
        1 => Ok(matches[0].id.clone()),
        _ => handle_multiple_results_found(
            session,
            &format!("Multiple buckets with name '{}' found.", name),
            matches.into_iter().map(|b| (b.id.clone(), b.id)).collect(),
        ),
    }
}

/// Id of the task with the given title in a bucket
pub async fn task_id_by_title(session: &Session<'_>, title: &str, bucket_id: &str) -> Result<String> {
    let url = format!("{}/planner/buckets/{}/tasks?$select=title,id", GRAPH_V1, bucket_id);
    let tasks: Vec<PlannerTask> = fetch_all(session.transport, &url).await?;
    let matches: Vec<PlannerTask> = tasks
        .into_iter()
        .filter(|t| t.title.as_deref().is_some_and(|n| n.eq_ignore_ascii_case(title)))
        .collect();

    match matches.len() {
        0 => Err(CommandError::not_found(format!("The specified task {} does not exist", title)).into()),
        1 => Ok(matches[0].id.clone()),
        _ => handle_multiple_results_found(
            session,
            &format!("Multiple tasks with title '{}' found.", title),
            matches.into_iter().map(|t| (t.id.clone(), t.id)).collect(),
        ),
    }
}

const TEAM_NOT_FOUND: &str = "The specified team does not exist in the Microsoft Teams";

fn pick_team(session: &Session<'_>, name: &str, ids: Vec<String>) -> Result<String> {
    match ids.len() {
        0 => Err(CommandError::not_found(TEAM_NOT_FOUND).into()),
        1 => Ok(ids[0].clone()),
        _ => handle_multiple_results_found(
            session,
            &format!("Multiple Microsoft Teams teams with name {} found.", name),
            ids.into_iter().map(|id| (id.clone(), id)).collect(),
        ),
    }
}

/// Id of a team the signed-in user has joined
pub async fn joined_team_id_by_name(session: &Session<'_>, name: &str) -> Result<String> {
    let url = format!("{}/me/joinedTeams", GRAPH_V1);
    let teams: Vec<Team> = fetch_all(session.transport, &url).await?;
    let ids = teams
        .into_iter()
        .filter(|t| t.display_name.as_deref() == Some(name))
        .map(|t| t.id)
        .collect();

    pick_team(session, name, ids)
}

/// Id of the group provisioned as a team with the given display name
pub async fn team_id_by_name(session: &Session<'_>, name: &str) -> Result<String> {
    let url = format!(
        "{}/groups?$filter=displayName eq '{}'",
        GRAPH_V1,
        encode_query_parameter(name)
    );
    let groups: Vec<Group> = fetch_all(session.transport, &url).await?;
    let ids = groups
        .into_iter()
        .filter(Group::is_team)
        .map(|g| g.id)
        .collect();

    pick_team(session, name, ids)
}

/// Channel of a team with the given display name
pub async fn channel_by_name(session: &Session<'_>, team_id: &str, name: &str) -> Result<Channel> {
    let url = format!(
        "{}/teams/{}/channels?$filter=displayName eq '{}'",
        GRAPH_V1,
        team_id,
        encode_query_parameter(name)
    );
    let mut channels: Vec<Channel> = fetch_all(session.transport, &url).await?;

    match channels.len() {
        0 => Err(CommandError::not_found(
            "The specified channel does not exist in the Microsoft Teams team",
        )
        .into()),
        1 => Ok(channels.remove(0)),
        _ => handle_multiple_results_found(
            session,
            &format!("Multiple Microsoft Teams channels with name {} found.", name),
            channels.into_iter().map(|c| (c.id.clone(), c)).collect(),
        ),
    }
}

/// How a channel member is identified
#[derive(Debug, Clone, Copy)]
pub enum MemberRef<'a> {
    UserId(&'a str),
    UserName(&'a str),
}

/// Membership id of a user in a channel
pub async fn channel_member_id(
    session: &Session<'_>,
    team_id: &str,
    channel_id: &str,
    member: MemberRef<'_>,
) -> Result<String> {
    let url = format!("{}/teams/{}/channels/{}/members", GRAPH_V1, team_id, channel_id);
    let members: Vec<ConversationMember> = fetch_all(session.transport, &url).await?;

    let (value, matches): (&str, Vec<ConversationMember>) = match member {
        MemberRef::UserId(user_id) => (
            user_id,
            members
                .into_iter()
                .filter(|m| m.user_id.as_deref().is_some_and(|u| u.eq_ignore_ascii_case(user_id)))
                .collect(),
        ),
        MemberRef::UserName(user_name) => (
            user_name,
            members
                .into_iter()
                .filter(|m| m.email.as_deref().is_some_and(|e| e.eq_ignore_ascii_case(user_name)))
                .collect(),
        ),
    };

    match matches.len() {
        0 => Err(CommandError::not_found(
            "The specified member does not exist in the Microsoft Teams channel",
        )
        .into()),
        1 => Ok(matches[0].id.clone()),
        _ => handle_multiple_results_found(
            session,
            &format!("Multiple Microsoft Teams channel members with name {} found.", value),
            matches.into_iter().map(|m| (m.id.clone(), m.id)).collect(),
        ),
    }
}

async fn user_id_by_upn(session: &Session<'_>, upn: &str) -> Result<Option<String>> {
    let url = format!(
        "{}/users?$filter=userPrincipalName eq '{}'&$select=id,userPrincipalName",
        GRAPH_V1,
        encode_query_parameter(upn)
    );
    let users: ODataList<User> = fetch(session.transport, &url).await?;
    Ok(users.value.into_iter().next().map(|u| u.id))
}

/// Ids of users by principal name, in order; unknown names fail the whole lookup
pub async fn user_ids_by_upn(session: &Session<'_>, upns: &[String]) -> Result<Vec<String>> {
    let results = join_all(upns.iter().map(|upn| user_id_by_upn(session, upn))).await;

    let mut ids = Vec::with_capacity(upns.len());
    let mut invalid = Vec::new();
    for (upn, result) in upns.iter().zip(results) {
        match result? {
            Some(id) => ids.push(id),
            None => invalid.push(upn.as_str()),
        }
    }

    if !invalid.is_empty() {
        return Err(CommandError::validation(format!(
            "Cannot proceed with planner task update. The following users provided are invalid : {}",
            invalid.join(",")
        ))
        .into());
    }

    Ok(ids)
}

/// Service principal of an Entra app, by app id or display name
pub async fn service_principal(
    session: &Session<'_>,
    app_id: Option<&str>,
    display_name: Option<&str>,
) -> Result<ServicePrincipal> {
    let filter = match (app_id, display_name) {
        (Some(app_id), _) => format!("appId eq '{}'", app_id),
        (None, Some(name)) => format!("displayName eq '{}'", encode_query_parameter(name)),
        (None, None) => {
            return Err(CommandError::validation("Specify appId or appDisplayName.").into())
        }
    };
    let url = format!(
        "{}/myorganization/servicePrincipals?$select=appId,displayName&$filter={}",
        GRAPH_V1, filter
    );
    let mut apps: Vec<ServicePrincipal> = fetch_all(session.transport, &url).await?;

    match apps.len() {
        0 => Err(CommandError::not_found("The specified Microsoft Entra app does not exist").into()),
        1 => Ok(apps.remove(0)),
        _ if session.prompt && session.prompter.is_interactive() => {
            let label = app_id.or(display_name).unwrap_or_default();
            handle_multiple_results_found(
                session,
                &format!("Multiple Microsoft Entra apps with displayName {} found.", label),
                apps.into_iter().map(|a| (a.app_id.clone(), a)).collect(),
            )
        }
        _ => Err(CommandError::failed(format!(
            "Multiple Microsoft Entra apps with displayName {} found: {}",
            display_name.or(app_id).unwrap_or_default(),
            apps.iter().map(|a| a.app_id.as_str()).collect::<Vec<_>>().join(",")
        ))
        .into()),
    }
}

/// Id of the To Do list with the given name
pub async fn todo_list_id_by_name(session: &Session<'_>, name: &str) -> Result<String> {
    let url = format!(
        "{}/me/todo/lists?$filter=displayName eq '{}'",
        GRAPH_V1,
        encode_query_parameter(name)
    );
    let lists: Vec<TodoList> = fetch_all(session.transport, &url).await?;

    match lists.len() {
        0 => Err(CommandError::not_found(format!("The list {} cannot be found", name)).into()),
        1 => Ok(lists[0].id.clone()),
        _ => handle_multiple_results_found(
            session,
            &format!("Multiple lists with name '{}' found.", name),
            lists.into_iter().map(|l| (l.id.clone(), l.id)).collect(),
        ),
    }
}

/// A SharePoint list addressed by id, title or URL
#[derive(Debug, Clone, Copy)]
pub enum ListRef<'a> {
    Id(&'a str),
    Title(&'a str),
    Url(&'a str),
}

impl<'a> ListRef<'a> {
    /// Pick the single list option that is set
    pub fn from_options(id: Option<&'a str>, title: Option<&'a str>, url: Option<&'a str>) -> Option<Self> {
        id.map(Self::Id)
            .or(title.map(Self::Title))
            .or(url.map(Self::Url))
    }

    /// REST URL of the list in the web at `site_url` (no trailing slash)
    pub fn request_url(&self, site_url: &str) -> Result<String> {
        Ok(match self {
            Self::Id(id) => format!("{}/_api/web/lists(guid'{}')", site_url, id),
            Self::Title(title) => format!(
                "{}/_api/web/lists/getByTitle('{}')",
                site_url,
                encode_query_parameter(title)
            ),
            Self::Url(url) => format!(
                "{}/_api/web/GetList('{}')",
                site_url,
                encode_query_parameter(&server_relative_path(site_url, url)?)
            ),
        })
    }
}
