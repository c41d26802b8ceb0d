mod directory;
mod planner;
mod team;
mod todo;

pub use directory::*;
pub use planner::*;
pub use team::*;
pub use todo::*;

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Access token with expiration (unix seconds)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessToken {
    pub value: String,
    pub expires: i64,
}

/// Device code information for the OAuth device authorization grant
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceCodeInfo {
    pub user_code: String,
    pub device_code: String,
    pub verification_uri: String,
    pub expires_in: u64,
    pub interval: u64,
    pub message: String,
}

/// Cached tokens plus the connection they belong to
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TokenStore {
    #[serde(default)]
    pub tokens: HashMap<String, AccessToken>,
    #[serde(default)]
    pub tenant: Option<String>,
    #[serde(default)]
    pub spo_url: Option<String>,
}

impl TokenStore {
    pub fn get(&self, resource: &str) -> Option<&AccessToken> {
        self.tokens.get(resource)
    }

    pub fn insert(&mut self, resource: String, token: AccessToken) {
        self.tokens.insert(resource, token);
    }

    pub fn refresh_token(&self) -> Option<&AccessToken> {
        self.tokens.get(REFRESH_TOKEN_KEY)
    }

    pub fn set_refresh_token(&mut self, token: AccessToken) {
        self.tokens.insert(REFRESH_TOKEN_KEY.to_string(), token);
    }
}

const REFRESH_TOKEN_KEY: &str = "refresh_token";

/// OData collection envelope
#[derive(Debug, Clone, Deserialize)]
pub struct ODataList<T> {
    #[serde(default = "Vec::new")]
    pub value: Vec<T>,
    #[serde(rename = "@odata.nextLink")]
    pub next_link: Option<String>,
}
