use std::sync::LazyLock;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use regex::Regex;
use url::Url;
use uuid::Uuid;

use super::utils::split_list;
use crate::error::CommandError;

static UPN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("valid regex"));

static TEAMS_CHANNEL_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^19:[^@\s]+@thread\.(skype|tacv2)$").expect("valid regex"));

pub type ValidationResult = Result<(), CommandError>;

/// Hyphenated GUID, e.g. 00000000-0000-0000-0000-000000000000
pub fn is_valid_guid(value: &str) -> bool {
    value.len() == 36 && Uuid::try_parse(value).is_ok()
}

pub fn is_valid_sharepoint_url(value: &str) -> bool {
    Url::parse(value)
        .map(|url| url.scheme() == "https" && url.host_str().is_some_and(|h| !h.is_empty()))
        .unwrap_or(false)
}

pub fn is_valid_user_principal_name(value: &str) -> bool {
    UPN.is_match(value)
}

pub fn is_valid_iso_date_time(value: &str) -> bool {
    DateTime::parse_from_rfc3339(value).is_ok()
        || ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M"]
            .iter()
            .any(|f| NaiveDateTime::parse_from_str(value, f).is_ok())
        || NaiveDate::parse_from_str(value, "%Y-%m-%d").is_ok()
}

pub fn is_valid_teams_channel_id(value: &str) -> bool {
    TEAMS_CHANNEL_ID.is_match(value)
}

pub fn is_json(value: &str) -> bool {
    serde_json::from_str::<serde_json::Value>(value).is_ok()
}

pub fn guid(value: &str, option: &str) -> ValidationResult {
    if is_valid_guid(value) {
        Ok(())
    } else {
        Err(CommandError::validation(format!(
            "{} is not a valid GUID for option {}.",
            value, option
        )))
    }
}

pub fn sharepoint_url(value: &str, option: &str) -> ValidationResult {
    if is_valid_sharepoint_url(value) {
        Ok(())
    } else {
        Err(CommandError::validation(format!(
            "'{}' is not a valid SharePoint Online site URL for option {}.",
            value, option
        )))
    }
}

pub fn iso_date_time(value: &str, option: &str) -> ValidationResult {
    if is_valid_iso_date_time(value) {
        Ok(())
    } else {
        Err(CommandError::validation(format!(
            "{} is not a valid ISO date-time string for option {}.",
            value, option
        )))
    }
}

pub fn teams_channel_id(value: &str, option: &str) -> ValidationResult {
    if is_valid_teams_channel_id(value) {
        Ok(())
    } else {
        Err(CommandError::validation(format!(
            "{} is not a valid Teams channel ID for option {}.",
            value, option
        )))
    }
}

/// Every item of a comma-separated list must pass `check`; the failing items are reported
pub fn each_in_list(
    value: &str,
    option: &str,
    check: impl Fn(&str) -> bool,
    expected: &str,
) -> ValidationResult {
    let invalid: Vec<String> = split_list(value)
        .into_iter()
        .filter(|item| !check(item))
        .collect();

    if invalid.is_empty() {
        Ok(())
    } else {
        Err(CommandError::validation(format!(
            "The following values for option {} are not valid {}: {}.",
            option,
            expected,
            invalid.join(", ")
        )))
    }
}

fn option_names(options: &[(&str, bool)]) -> String {
    options
        .iter()
        .map(|(name, _)| *name)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Exactly one option of the set must be present
pub fn exactly_one_of(options: &[(&str, bool)]) -> ValidationResult {
    match options.iter().filter(|(_, set)| *set).count() {
        1 => Ok(()),
        0 => Err(CommandError::validation(format!(
            "Specify one of the following options: {}.",
            option_names(options)
        ))),
        _ => Err(CommandError::validation(format!(
            "Specify one of the following options: {}, but not multiple.",
            option_names(options)
        ))),
    }
}

/// At most one option of the set may be present
pub fn at_most_one_of(options: &[(&str, bool)]) -> ValidationResult {
    if options.iter().filter(|(_, set)| *set).count() > 1 {
        return Err(CommandError::validation(format!(
            "Specify at most one of the following options: {}.",
            option_names(options)
        )));
    }
    Ok(())
}

/// When `condition` holds, exactly one option of the set must be present
pub fn exactly_one_of_when(condition: bool, options: &[(&str, bool)]) -> ValidationResult {
    if condition {
        exactly_one_of(options)
    } else {
        Ok(())
    }
}

/// `option` is not allowed when `forbidden` is set
pub fn forbid(option: &str, set: bool, forbidden: &str, forbidden_set: bool) -> ValidationResult {
    if set && forbidden_set {
        return Err(CommandError::validation(format!(
            "Don't specify option {} when specifying {}.",
            forbidden, option
        )));
    }
    Ok(())
}
