use serde::{Deserialize, Serialize};

/// Directory user (lookup projection)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub user_principal_name: Option<String>,
}

/// Service principal of an Entra app
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServicePrincipal {
    pub app_id: String,
    pub display_name: String,
}
