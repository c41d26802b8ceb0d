use std::time::{Duration, Instant};

use anyhow::Result;
use clap::{Args, Subcommand};
use serde_json::json;
use tokio::time::sleep;

use crate::api::{decode_claims, gen_device_code, poll_device_code, DeviceCodePoll, M365Client, GRAPH_RESOURCE};
use crate::config::Config;
use crate::error::CommandError;

use super::output::{print_error, print_info, print_report, print_success, Report};
use super::validation as validate;
use super::OutputFormat;

#[derive(Args, Debug)]
pub struct AuthCommand {
    #[command(subcommand)]
    pub command: AuthSubcommand,
}

#[derive(Subcommand, Debug)]
pub enum AuthSubcommand {
    /// Login using device code flow
    Login(LoginOptions),

    /// Check authentication status
    Status,

    /// Logout and clear tokens
    Logout,
}

#[derive(Args, Debug, Default)]
pub struct LoginOptions {
    /// Tenant ID or domain (default: from config)
    #[arg(short, long)]
    pub tenant: Option<String>,

    /// SharePoint Online root URL, e.g. https://contoso.sharepoint.com
    #[arg(long = "spoUrl")]
    pub spo_url: Option<String>,
}

pub async fn execute(cmd: AuthCommand, client: &M365Client, config: &Config, format: OutputFormat) -> Result<()> {
    match cmd.command {
        AuthSubcommand::Login(options) => login(client, config, options).await,
        AuthSubcommand::Status => status(client, format).await,
        AuthSubcommand::Logout => logout(client).await,
    }
}

async fn login(client: &M365Client, config: &Config, options: LoginOptions) -> Result<()> {
    let tenant = options.tenant.as_deref().unwrap_or(&config.auth.tenant);
    let spo_url = options
        .spo_url
        .or_else(|| Some(config.auth.spo_url.clone()))
        .filter(|url| !url.is_empty())
        .map(|url| url.trim_end_matches('/').to_string());
    if let Some(url) = &spo_url {
        validate::sharepoint_url(url, "spoUrl")?;
    }

    print_info(&format!("Generating device code for tenant: {}", tenant));
    let device_code_info = gen_device_code(tenant, &config.auth.client_id, GRAPH_RESOURCE).await?;

    eprintln!();
    eprintln!("To sign in, open a browser and go to:");
    eprintln!("  {}", device_code_info.verification_uri);
    eprintln!();
    eprintln!("Enter this code when prompted:");
    eprintln!("  {}", device_code_info.user_code);
    eprintln!();
    print_info("Waiting for authorization...");

    let deadline = Instant::now() + Duration::from_secs(device_code_info.expires_in);
    let mut interval = device_code_info.interval.max(1);

    loop {
        sleep(Duration::from_secs(interval)).await;
        if Instant::now() >= deadline {
            return Err(CommandError::failed("Authentication timed out. Please try again.").into());
        }

        match poll_device_code(tenant, &config.auth.client_id, &device_code_info.device_code).await? {
            DeviceCodePoll::Pending => continue,
            DeviceCodePoll::SlowDown => {
                interval += 5;
                tracing::debug!("Polling slowed down to every {}s", interval);
            }
            DeviceCodePoll::Authorized(grant) => {
                client.store_login(grant, tenant, spo_url).await?;
                eprintln!();
                print_success("Successfully authenticated!");
                return Ok(());
            }
        }
    }
}

async fn status(client: &M365Client, format: OutputFormat) -> Result<()> {
    if !client.is_authenticated().await {
        print_error("Not authenticated");
        print_info("Run 'm365 auth login' to authenticate.");
        return Ok(());
    }

    let token = client.get_token(GRAPH_RESOURCE).await?;
    let claims = decode_claims(&token.value)?;
    let connection = client.connection().await;

    let report = Report::new(json!({
        "connectedAs": claims.get("upn").or_else(|| claims.get("unique_name")),
        "tenantId": claims.get("tid"),
        "spoUrl": connection.spo_url,
    }));
    print_report(&report, format);
    Ok(())
}

async fn logout(client: &M365Client) -> Result<()> {
    client.clear_tokens().await?;
    print_success("Logged out successfully");
    Ok(())
}
