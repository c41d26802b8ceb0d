pub mod auth;
pub mod client;
pub mod transport;

#[cfg(test)]
pub mod mock;

pub use auth::*;
pub use client::*;
pub use transport::*;

// Identity platform
pub const AUTHORITY_URL: &str = "https://login.microsoftonline.com";

// Microsoft Graph
pub const GRAPH_HOST: &str = "graph.microsoft.com";
pub const GRAPH_RESOURCE: &str = "https://graph.microsoft.com";
pub const GRAPH_V1: &str = "https://graph.microsoft.com/v1.0";
pub const GRAPH_BETA: &str = "https://graph.microsoft.com/beta";

/// Refresh tokens issued to public clients live for 90 days
pub const REFRESH_TOKEN_LIFETIME: i64 = 90 * 24 * 60 * 60;

/// Access tokens are renewed this many seconds before they expire
pub const TOKEN_EXPIRY_SKEW: i64 = 60;
