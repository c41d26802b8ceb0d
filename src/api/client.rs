use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::header::{HeaderName, HeaderValue, ACCEPT, AUTHORIZATION};
use reqwest::Client;
use serde_json::Value;
use tokio::sync::RwLock;
use url::Url;

use super::{
    redeem_refresh_token, Request, TokenGrant, Transport, GRAPH_HOST, GRAPH_RESOURCE,
    TOKEN_EXPIRY_SKEW,
};
use crate::cache::{Cache, TOKENS_FILE};
use crate::config::Config;
use crate::error::ApiError;
use crate::types::*;

fn get_epoch_s() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Resource (token audience) serving a request URL
pub fn resource_for(url: &str) -> Result<String> {
    let target = Url::parse(url).with_context(|| format!("Invalid request URL: {}", url))?;
    let host = target
        .host_str()
        .ok_or_else(|| anyhow!("Invalid request URL: {}", url))?;

    if host == GRAPH_HOST {
        return Ok(GRAPH_RESOURCE.to_string());
    }

    Ok(format!("{}://{}", target.scheme(), host))
}

/// Authenticated HTTP client for Microsoft Graph and SharePoint Online
pub struct M365Client {
    tokens: RwLock<TokenStore>,
    tenant: String,
    client_id: String,
    http: Client,
    cache: Cache,
}

impl M365Client {
    /// Create a new client from configuration and the token cache
    pub fn new(config: &Config) -> Result<Self> {
        Self::with_cache(config, Cache::new()?)
    }

    /// Create a client over an existing cache; an unreadable token file counts as logged out
    pub fn with_cache(config: &Config, cache: Cache) -> Result<Self> {
        let tokens: TokenStore = match cache.load(TOKENS_FILE) {
            Ok(tokens) => tokens.unwrap_or_default(),
            Err(err) => {
                tracing::warn!("Ignoring token cache: {:#}", err);
                TokenStore::default()
            }
        };
        let tenant = tokens
            .tenant
            .clone()
            .unwrap_or_else(|| config.auth.tenant.clone());

        Ok(Self {
            tokens: RwLock::new(tokens),
            tenant,
            client_id: config.auth.client_id.clone(),
            http: Client::builder()
                .timeout(Duration::from_secs(config.api.timeout))
                .build()?,
            cache,
        })
    }

    /// Check if the client is authenticated
    pub async fn is_authenticated(&self) -> bool {
        self.tokens.read().await.refresh_token().is_some()
    }

    /// Snapshot of the cached connection
    pub async fn connection(&self) -> TokenStore {
        self.tokens.read().await.clone()
    }

    async fn save_tokens(&self) -> Result<()> {
        let tokens = self.tokens.read().await;
        self.cache.save(TOKENS_FILE, &*tokens)
    }

    /// Store the tokens obtained at login
    pub async fn store_login(
        &self,
        grant: TokenGrant,
        tenant: &str,
        spo_url: Option<String>,
    ) -> Result<()> {
        {
            let mut tokens = self.tokens.write().await;
            tokens.tokens.clear();
            if let Some(refresh_token) = grant.refresh_token {
                tokens.set_refresh_token(refresh_token);
            }
            tokens.insert(GRAPH_RESOURCE.to_string(), grant.access_token);
            tokens.tenant = Some(tenant.to_string());
            tokens.spo_url = spo_url;
        }
        self.save_tokens().await
    }

    /// Clear all tokens (logout)
    pub async fn clear_tokens(&self) -> Result<()> {
        *self.tokens.write().await = TokenStore::default();
        self.cache.delete(TOKENS_FILE)
    }

    /// Get a valid access token for a resource, redeeming the refresh token when needed
    pub async fn get_token(&self, resource: &str) -> Result<AccessToken> {
        let (existing, refresh_token) = {
            let tokens = self.tokens.read().await;
            (tokens.get(resource).cloned(), tokens.refresh_token().cloned())
        };

        if let Some(token) = existing {
            if token.expires - TOKEN_EXPIRY_SKEW > get_epoch_s() {
                return Ok(token);
            }
        }

        let refresh_token = match refresh_token {
            Some(token) if token.expires > get_epoch_s() => token,
            Some(_) => return Err(anyhow!("Session expired. Run 'm365 auth login' again.")),
            None => return Err(anyhow!("Not authenticated. Run 'm365 auth login' first.")),
        };

        tracing::debug!("Redeeming refresh token for {}", resource);
        let grant = redeem_refresh_token(
            &self.http,
            &self.tenant,
            &self.client_id,
            &refresh_token,
            resource,
        )
        .await?;

        {
            let mut tokens = self.tokens.write().await;
            tokens.insert(resource.to_string(), grant.access_token.clone());
            if let Some(rotated) = grant.refresh_token {
                tokens.set_refresh_token(rotated);
            }
        }
        self.save_tokens().await?;

        Ok(grant.access_token)
    }
}

#[async_trait]
impl Transport for M365Client {
    async fn execute(&self, request: Request) -> Result<Value> {
        let resource = resource_for(&request.url)?;
        let token = self.get_token(&resource).await?;

        let default_accept = if resource == GRAPH_RESOURCE {
            "application/json"
        } else {
            "application/json;odata=nometadata"
        };

        let mut builder = self
            .http
            .request(request.method.clone(), &request.url)
            .header(AUTHORIZATION, format!("Bearer {}", token.value));

        if request.header_value("accept").is_none() {
            builder = builder.header(ACCEPT, default_accept);
        }
        for (name, value) in &request.headers {
            builder = builder.header(
                HeaderName::from_bytes(name.as_bytes())?,
                HeaderValue::from_str(value)?,
            );
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        tracing::debug!("{} {}", request.method, request.url);
        let res = builder.send().await?;
        let status = res.status();
        let text = res.text().await?;
        tracing::debug!("{} {} -> {}", request.method, request.url, status);

        if !status.is_success() {
            return Err(ApiError::from_response(status, &text).into());
        }

        if text.trim().is_empty() {
            return Ok(Value::Null);
        }

        Ok(serde_json::from_str(&text).unwrap_or(Value::String(text)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resource_for_graph() {
        let resource = resource_for("https://graph.microsoft.com/v1.0/planner/tasks/abc").unwrap();
        assert_eq!(resource, "https://graph.microsoft.com");
    }

    #[test]
    fn test_resource_for_sharepoint() {
        let resource =
            resource_for("https://contoso.sharepoint.com/sites/sales/_api/web?$select=Id").unwrap();
        assert_eq!(resource, "https://contoso.sharepoint.com");
    }

    #[test]
    fn test_resource_for_invalid_url() {
        assert!(resource_for("not a url").is_err());
    }

    #[tokio::test]
    async fn test_corrupt_token_cache_is_logged_out() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(TOKENS_FILE), "{not json").unwrap();
        let cache = Cache::at(dir.path().to_path_buf()).unwrap();

        let client = M365Client::with_cache(&Config::default(), cache).unwrap();
        assert!(!client.is_authenticated().await);

        client.clear_tokens().await.unwrap();
        assert!(!dir.path().join(TOKENS_FILE).exists());
    }
}
