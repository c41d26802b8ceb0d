use std::collections::HashMap;

use anyhow::{anyhow, Context, Result};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::Client;
use serde_json::Value;
use url::form_urlencoded;

use super::{AUTHORITY_URL, REFRESH_TOKEN_LIFETIME};
use crate::error::ApiError;
use crate::types::{AccessToken, DeviceCodeInfo};

fn get_epoch_s() -> i64 {
    chrono::Utc::now().timestamp()
}

fn form_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(
        HeaderName::from_static("content-type"),
        HeaderValue::from_static("application/x-www-form-urlencoded"),
    );
    headers
}

fn form_body(pairs: &[(&str, &str)]) -> String {
    let mut serializer = form_urlencoded::Serializer::new(String::new());
    for (name, value) in pairs {
        serializer.append_pair(name, value);
    }
    serializer.finish()
}

/// Scope requested for a resource, e.g. `https://contoso.sharepoint.com/.default`
pub fn scope_for(resource: &str) -> String {
    format!("{}/.default", resource.trim_end_matches('/'))
}

/// Generate a device code for OAuth login
pub async fn gen_device_code(tenant: &str, client_id: &str, resource: &str) -> Result<DeviceCodeInfo> {
    let url = format!("{}/{}/oauth2/v2.0/devicecode", AUTHORITY_URL, tenant);
    let scope = format!("{} offline_access", scope_for(resource));
    let body = form_body(&[("client_id", client_id), ("scope", &scope)]);

    let res = Client::new()
        .post(&url)
        .headers(form_headers())
        .body(body)
        .send()
        .await?;

    let status = res.status();
    let body = res.text().await?;
    if status.is_success() {
        serde_json::from_str(&body).context("Failed to parse device code response")
    } else {
        Err(anyhow!(
            "Failed to generate device code: {}",
            ApiError::from_response(status, &body)
        ))
    }
}

/// Outcome of one poll of the token endpoint during device code login
#[derive(Debug)]
pub enum DeviceCodePoll {
    Pending,
    SlowDown,
    Authorized(TokenGrant),
}

/// Tokens returned by the identity platform
#[derive(Debug, Clone)]
pub struct TokenGrant {
    pub access_token: AccessToken,
    pub refresh_token: Option<AccessToken>,
}

impl TokenGrant {
    fn from_response(token_data: &HashMap<String, Value>) -> Result<Self> {
        let value = token_data
            .get("access_token")
            .and_then(|v| v.as_str())
            .ok_or_else(|| anyhow!("No access_token in response"))?;

        let expires_in = token_data
            .get("expires_in")
            .and_then(|v| v.as_i64().or_else(|| v.as_str().and_then(|s| s.parse().ok())))
            .unwrap_or(3600);

        let now = get_epoch_s();
        let refresh_token = token_data
            .get("refresh_token")
            .and_then(|v| v.as_str())
            .map(|value| AccessToken {
                value: value.to_string(),
                expires: now + REFRESH_TOKEN_LIFETIME,
            });

        Ok(Self {
            access_token: AccessToken {
                value: value.to_string(),
                expires: now + expires_in,
            },
            refresh_token,
        })
    }
}

/// Poll the token endpoint once for a pending device code
pub async fn poll_device_code(
    tenant: &str,
    client_id: &str,
    device_code: &str,
) -> Result<DeviceCodePoll> {
    let url = format!("{}/{}/oauth2/v2.0/token", AUTHORITY_URL, tenant);
    let body = form_body(&[
        ("grant_type", "urn:ietf:params:oauth:grant-type:device_code"),
        ("client_id", client_id),
        ("device_code", device_code),
    ]);

    let res = Client::new()
        .post(&url)
        .headers(form_headers())
        .body(body)
        .send()
        .await?;

    let status = res.status();
    let text = res.text().await?;
    let token_data: HashMap<String, Value> = serde_json::from_str(&text).unwrap_or_default();

    if status.is_success() {
        return Ok(DeviceCodePoll::Authorized(TokenGrant::from_response(
            &token_data,
        )?));
    }

    match token_data.get("error").and_then(|v| v.as_str()) {
        Some("authorization_pending") => Ok(DeviceCodePoll::Pending),
        Some("slow_down") => Ok(DeviceCodePoll::SlowDown),
        _ => Err(ApiError::from_response(status, &text).into()),
    }
}

/// Redeem a refresh token for an access token to `resource`
pub async fn redeem_refresh_token(
    http: &Client,
    tenant: &str,
    client_id: &str,
    refresh_token: &AccessToken,
    resource: &str,
) -> Result<TokenGrant> {
    let url = format!("{}/{}/oauth2/v2.0/token", AUTHORITY_URL, tenant);
    let scope = format!("{} offline_access", scope_for(resource));
    let body = form_body(&[
        ("grant_type", "refresh_token"),
        ("client_id", client_id),
        ("refresh_token", &refresh_token.value),
        ("scope", &scope),
    ]);

    let res = http
        .post(&url)
        .headers(form_headers())
        .body(body)
        .send()
        .await?;

    let status = res.status();
    let text = res.text().await?;
    if !status.is_success() {
        return Err(anyhow!(
            "Failed to generate token for {}: {}",
            resource,
            ApiError::from_response(status, &text)
        ));
    }

    let token_data: HashMap<String, Value> =
        serde_json::from_str(&text).context("Failed to parse token response")?;
    TokenGrant::from_response(&token_data)
}

/// Decode the claims of a JWT access token without verifying it
pub fn decode_claims(token: &str) -> Result<Value> {
    let payload = token
        .split('.')
        .nth(1)
        .ok_or_else(|| anyhow!("Access token is not a JWT"))?;
    let bytes = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .context("Failed to decode access token")?;
    serde_json::from_slice(&bytes).context("Failed to parse access token claims")
}
