//! m365-cli - command-line client for Microsoft Graph and SharePoint Online
//!
//! The library exposes the authenticated transport, configuration and token cache
//! used by the `m365` binary.

pub mod api;
pub mod cache;
pub mod config;
pub mod error;
pub mod types;

pub use api::client::M365Client;
pub use api::transport::{Request, Transport};
pub use config::Config;
