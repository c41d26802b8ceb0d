use anyhow::{Context, Result};
use clap::{ArgGroup, Args, Subcommand, ValueEnum};
use futures::future::try_join_all;
use serde_json::{json, Value};
use url::Url;

use super::output::{print_report, Report};
use super::resolve;
use super::utils::{remove_trailing_slashes, web_relative_path};
use super::validation::{self as validate, ValidationResult};
use super::Session;
use crate::api::{Request, GRAPH_V1};
use crate::error::CommandError;

#[derive(Args, Debug)]
pub struct SpoCommand {
    #[command(subcommand)]
    pub command: SpoSubcommand,
}

#[derive(Subcommand, Debug)]
pub enum SpoSubcommand {
    /// Single-part app pages
    #[command(name = "apppage")]
    AppPage(AppPageCommand),

    /// SharePoint sites
    Site(SiteCommand),
}

#[derive(Args, Debug)]
pub struct AppPageCommand {
    #[command(subcommand)]
    pub command: AppPageSubcommand,
}

#[derive(Subcommand, Debug)]
pub enum AppPageSubcommand {
    /// Create a single-part app page
    Add(AppPageAddOptions),
}

#[derive(Args, Debug)]
pub struct SiteCommand {
    #[command(subcommand)]
    pub command: SiteSubcommand,
}

#[derive(Subcommand, Debug)]
pub enum SiteSubcommand {
    /// Application permissions on a site
    #[command(name = "apppermission")]
    AppPermission(AppPermissionCommand),
}

#[derive(Args, Debug)]
pub struct AppPermissionCommand {
    #[command(subcommand)]
    pub command: AppPermissionSubcommand,
}

#[derive(Subcommand, Debug)]
pub enum AppPermissionSubcommand {
    /// Grant an Entra app access to a site
    Add(AppPermissionAddOptions),

    /// List the app permissions of a site
    List(AppPermissionListOptions),
}

#[derive(Args, Debug, Default)]
pub struct AppPageAddOptions {
    /// Title of the page
    #[arg(short, long)]
    pub title: String,

    /// URL of the site where the page is created
    #[arg(short = 'u', long = "webUrl")]
    pub web_url: String,

    /// JSON string of the web part to put on the page
    #[arg(short = 'd', long = "webPartData")]
    pub web_part_data: String,

    /// Add the page to the quick launch
    #[arg(long = "addToQuickLaunch")]
    pub add_to_quick_launch: bool,
}

impl AppPageAddOptions {
    fn validate(&self) -> ValidationResult {
        validate::sharepoint_url(&self.web_url, "webUrl")?;
        if !validate::is_json(&self.web_part_data) {
            return Err(CommandError::validation(
                "Specified webPartData is not a valid JSON string.",
            ));
        }
        Ok(())
    }
}

/// Permission level granted to an app on a site
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Default)]
pub enum SitePermission {
    #[default]
    Read,
    Write,
    Manage,
    #[value(name = "fullcontrol")]
    FullControl,
}

impl SitePermission {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Write => "write",
            Self::Manage => "manage",
            Self::FullControl => "fullcontrol",
        }
    }

    /// Graph only grants read and write directly, higher levels are set by update
    fn initial_role(&self) -> &'static str {
        match self {
            Self::Read => "read",
            _ => "write",
        }
    }

    fn needs_elevation(&self) -> bool {
        matches!(self, Self::Manage | Self::FullControl)
    }
}

#[derive(Args, Debug, Default)]
pub struct AppPermissionAddOptions {
    /// URL of the site
    #[arg(short = 'u', long = "siteUrl")]
    pub site_url: String,

    /// Permission to grant
    #[arg(short, long, value_enum)]
    pub permission: SitePermission,

    /// Client ID of the Entra app
    #[arg(short = 'i', long = "appId")]
    pub app_id: Option<String>,

    /// Display name of the Entra app
    #[arg(short = 'n', long = "appDisplayName")]
    pub app_display_name: Option<String>,
}

impl AppPermissionAddOptions {
    fn validate(&self) -> ValidationResult {
        validate::sharepoint_url(&self.site_url, "siteUrl")?;
        if let Some(app_id) = &self.app_id {
            validate::guid(app_id, "appId")?;
        }
        if self.app_id.is_none() && self.app_display_name.is_none() {
            return Err(CommandError::validation(
                "Specify appId or appDisplayName, or both.",
            ));
        }
        Ok(())
    }
}

#[derive(Args, Debug, Default)]
#[command(group(ArgGroup::new("one_of:app").multiple(true).args(["app_id", "app_display_name"])))]
pub struct AppPermissionListOptions {
    /// URL of the site
    #[arg(short = 'u', long = "siteUrl")]
    pub site_url: String,

    /// Only permissions of the app with this client ID
    #[arg(short = 'i', long = "appId")]
    pub app_id: Option<String>,

    /// Only permissions of the app with this display name
    #[arg(short = 'n', long = "appDisplayName")]
    pub app_display_name: Option<String>,
}

impl AppPermissionListOptions {
    fn validate(&self) -> ValidationResult {
        validate::sharepoint_url(&self.site_url, "siteUrl")?;
        if let Some(app_id) = &self.app_id {
            validate::guid(app_id, "appId")?;
        }
        validate::at_most_one_of(&[
            ("appId", self.app_id.is_some()),
            ("appDisplayName", self.app_display_name.is_some()),
        ])
    }
}

pub async fn add_app_page(session: &Session<'_>, options: AppPageAddOptions) -> Result<Option<Report>> {
    options.validate()?;

    let web_url = remove_trailing_slashes(&options.web_url);

    let created = session
        .transport
        .execute(
            Request::post(format!("{}/_api/sitepages/Pages/CreateAppPage", web_url)).json(json!({
                "title": options.title,
                "webPartDataAsJson": options.web_part_data,
            })),
        )
        .await?;
    let page_path = created
        .get("value")
        .and_then(Value::as_str)
        .ok_or_else(|| CommandError::failed("Failed to create a single-part app page"))?;
    tracing::debug!("Created app page {}", page_path);

    let file = session
        .transport
        .get(&format!(
            "{}/_api/web/GetFileByServerRelativePath(DecodedUrl='{}/{}')?$expand=ListItemAllFields",
            web_url,
            web_relative_path(web_url)?,
            page_path
        ))
        .await?;
    let page_id = file
        .pointer("/ListItemAllFields/Id")
        .cloned()
        .ok_or_else(|| CommandError::not_found("Page not found"))?;

    let mut body = json!({
        "pageId": page_id,
        "webPartDataAsJson": options.web_part_data,
        "title": options.title,
    });
    if options.add_to_quick_launch {
        body["includeInNavigation"] = json!(true);
    }

    let updated = session
        .transport
        .execute(Request::post(format!("{}/_api/sitepages/Pages/UpdateAppPage", web_url)).json(body))
        .await?;
    Ok(Some(Report::new(updated)))
}

/// Graph id of the site at `site_url`
async fn site_id(session: &Session<'_>, site_url: &str) -> Result<String> {
    let url = Url::parse(site_url).with_context(|| format!("Invalid URL: {}", site_url))?;
    let host = url.host_str().unwrap_or_default();

    let site = session
        .transport
        .get(&format!("{}/sites/{}:{}", GRAPH_V1, host, url.path()))
        .await?;
    site.get("id")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| CommandError::not_found("Requested site could not be found").into())
}

pub async fn add_app_permission(
    session: &Session<'_>,
    options: AppPermissionAddOptions,
) -> Result<Option<Report>> {
    options.validate()?;

    let site_id = site_id(session, &options.site_url).await?;

    let (app_id, display_name) = match (&options.app_id, &options.app_display_name) {
        (Some(id), Some(name)) => (id.clone(), name.clone()),
        (id, name) => {
            let app = resolve::service_principal(session, id.as_deref(), name.as_deref()).await?;
            (app.app_id, app.display_name)
        }
    };

    let permissions_url = format!("{}/sites/{}/permissions", GRAPH_V1, site_id);
    let permission = session
        .transport
        .execute(Request::post(&permissions_url).json(json!({
            "roles": [options.permission.initial_role()],
            "grantedToIdentities": [
                { "application": { "id": app_id, "displayName": display_name } }
            ],
        })))
        .await?;

    if !options.permission.needs_elevation() {
        return Ok(Some(Report::new(permission)));
    }

    let permission_id = permission
        .get("id")
        .and_then(Value::as_str)
        .ok_or_else(|| CommandError::failed("Permission was granted without an id"))?;
    tracing::info!("Elevating permission {} to {}", permission_id, options.permission.as_str());

    let elevated = session
        .transport
        .execute(
            Request::patch(format!("{}/{}", permissions_url, permission_id))
                .json(json!({ "roles": [options.permission.as_str()] })),
        )
        .await?;
    Ok(Some(Report::new(elevated)))
}

/// Flatten a site permission to one row per granted application
fn permission_rows(permission: &Value) -> Vec<Value> {
    let identities = permission
        .get("grantedToIdentities")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    identities
        .iter()
        .filter_map(|identity| identity.get("application"))
        .map(|app| {
            json!({
                "appDisplayName": app.get("displayName").cloned().unwrap_or(Value::Null),
                "appId": app.get("id").cloned().unwrap_or(Value::Null),
                "permissionId": permission.get("id").cloned().unwrap_or(Value::Null),
                "roles": permission.get("roles").cloned().unwrap_or_else(|| json!([])),
            })
        })
        .collect()
}

pub async fn list_app_permissions(
    session: &Session<'_>,
    options: AppPermissionListOptions,
) -> Result<Option<Report>> {
    options.validate()?;

    let site_id = site_id(session, &options.site_url).await?;
    let permissions_url = format!("{}/sites/{}/permissions", GRAPH_V1, site_id);
    let summaries = session.transport.get_all(&permissions_url).await?;

    // The collection omits roles, each permission is read on its own
    let urls: Vec<String> = summaries
        .iter()
        .filter_map(|p| p.get("id").and_then(Value::as_str))
        .map(|id| format!("{}/{}", permissions_url, id))
        .collect();
    let permissions = try_join_all(urls.iter().map(|url| session.transport.get(url))).await?;

    let rows: Vec<Value> = permissions
        .iter()
        .flat_map(permission_rows)
        .filter(|row| match (&options.app_id, &options.app_display_name) {
            (Some(app_id), _) => row["appId"].as_str() == Some(app_id.as_str()),
            (None, Some(name)) => row["appDisplayName"].as_str() == Some(name.as_str()),
            (None, None) => true,
        })
        .collect();

    Ok(Some(Report::with_properties(
        Value::Array(rows),
        &["appDisplayName", "appId", "permissionId", "roles"],
    )))
}

pub async fn execute(cmd: SpoCommand, session: &Session<'_>) -> Result<()> {
    let report = match cmd.command {
        SpoSubcommand::AppPage(page) => match page.command {
            AppPageSubcommand::Add(options) => add_app_page(session, options).await?,
        },
        SpoSubcommand::Site(site) => match site.command {
            SiteSubcommand::AppPermission(permission) => match permission.command {
                AppPermissionSubcommand::Add(options) => add_app_permission(session, options).await?,
                AppPermissionSubcommand::List(options) => list_app_permissions(session, options).await?,
            },
        },
    };

    if let Some(report) = report {
        print_report(&report, session.format);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::mock::MockTransport;
    use crate::cli::prompt::testing::ScriptedPrompter;
    use reqwest::Method;

    const WEB_PART: &str = r#"{"id": "e84a4f44-30d2-4962-b203-f8bf42114860", "title": "Milestone Tracking", "properties": {"description": "Milestone Tracking"}}"#;
    const SITE_URL: &str = "https://contoso.sharepoint.com/sites/sitecollection-name";
    const SITE_LOOKUP: &str =
        "https://graph.microsoft.com/v1.0/sites/contoso.sharepoint.com:/sites/sitecollection-name";
    const SITE_ID: &str = "contoso.sharepoint.com,00000000-0000-0000-0000-000000000000,00000000-0000-0000-0000-000000000000";
    const APP_ID: &str = "89ea5c94-7736-4e25-95ad-3fa95f62b66e";
    const PERMISSION_ID: &str = "aTowaS50fG1zLnNwLmV4dHxjY2EwMDE2OS1kMzhi";

    fn permissions_url() -> String {
        format!("https://graph.microsoft.com/v1.0/sites/{}/permissions", SITE_ID)
    }

    fn app_page_transport() -> MockTransport {
        MockTransport::new()
            .on(
                Method::POST,
                "https://contoso.sharepoint.com/_api/sitepages/Pages/CreateAppPage",
                json!({ "value": "SitePages/lp4blf70.aspx" }),
            )
            .on(
                Method::GET,
                "https://contoso.sharepoint.com/_api/web/GetFileByServerRelativePath(DecodedUrl='/SitePages/lp4blf70.aspx')?$expand=ListItemAllFields",
                json!({ "ListItemAllFields": { "Id": 20 }, "Name": "lp4blf70.aspx" }),
            )
            .on(
                Method::POST,
                "https://contoso.sharepoint.com/_api/sitepages/Pages/UpdateAppPage",
                json!({ "value": "SitePages/lp4blf70.aspx" }),
            )
    }

    fn app_page_options(add_to_quick_launch: bool) -> AppPageAddOptions {
        AppPageAddOptions {
            title: "test-single".to_string(),
            web_url: "https://contoso.sharepoint.com/".to_string(),
            web_part_data: WEB_PART.to_string(),
            add_to_quick_launch,
        }
    }

    #[test]
    fn test_app_page_rejects_invalid_web_part_data() {
        let options = AppPageAddOptions {
            web_part_data: "abc".to_string(),
            ..app_page_options(false)
        };
        assert!(options.validate().is_err());
        assert!(app_page_options(false).validate().is_ok());
    }

    #[tokio::test]
    async fn test_add_app_page() {
        let transport = app_page_transport();
        let prompter = ScriptedPrompter::silent();
        let session = Session::for_test(&transport, &prompter);

        let report = add_app_page(&session, app_page_options(false)).await.unwrap().unwrap();
        assert_eq!(report.value["value"], "SitePages/lp4blf70.aspx");

        let create = &transport.mutations()[0];
        assert_eq!(create.body.as_ref().unwrap()["webPartDataAsJson"], WEB_PART);
        let update = &transport.mutations()[1];
        assert_eq!(
            update.body,
            Some(json!({ "pageId": 20, "webPartDataAsJson": WEB_PART, "title": "test-single" }))
        );
    }

    #[tokio::test]
    async fn test_add_app_page_to_quick_launch() {
        let transport = app_page_transport();
        let prompter = ScriptedPrompter::silent();
        let session = Session::for_test(&transport, &prompter);

        add_app_page(&session, app_page_options(true)).await.unwrap();
        let update = &transport.mutations()[1];
        assert_eq!(update.body.as_ref().unwrap()["includeInNavigation"], true);
    }

    #[tokio::test]
    async fn test_add_app_page_in_subsite() {
        let transport = MockTransport::new()
            .on(
                Method::POST,
                "https://contoso.sharepoint.com/sites/team/_api/sitepages/Pages/CreateAppPage",
                json!({ "value": "SitePages/page.aspx" }),
            )
            .on(
                Method::GET,
                "https://contoso.sharepoint.com/sites/team/_api/web/GetFileByServerRelativePath(DecodedUrl='/sites/team/SitePages/page.aspx')?$expand=ListItemAllFields",
                json!({ "ListItemAllFields": { "Id": 3 } }),
            )
            .on(
                Method::POST,
                "https://contoso.sharepoint.com/sites/team/_api/sitepages/Pages/UpdateAppPage",
                json!({ "value": "SitePages/page.aspx" }),
            );
        let prompter = ScriptedPrompter::silent();
        let session = Session::for_test(&transport, &prompter);

        let options = AppPageAddOptions {
            web_url: "https://contoso.sharepoint.com/sites/team".to_string(),
            ..app_page_options(false)
        };
        add_app_page(&session, options).await.unwrap();
        assert_eq!(transport.mutations()[1].body.as_ref().unwrap()["pageId"], 3);
    }

    #[tokio::test]
    async fn test_add_app_page_fails_when_page_missing() {
        let transport = MockTransport::new()
            .on(
                Method::POST,
                "https://contoso.sharepoint.com/_api/sitepages/Pages/CreateAppPage",
                json!({ "value": "SitePages/lp4blf70.aspx" }),
            )
            .on_error(
                Method::GET,
                "https://contoso.sharepoint.com/_api/web/GetFileByServerRelativePath(DecodedUrl='/SitePages/lp4blf70.aspx')?$expand=ListItemAllFields",
                404,
                json!({ "odata.error": { "message": { "value": "Page not found" } } }),
            );
        let prompter = ScriptedPrompter::silent();
        let session = Session::for_test(&transport, &prompter);

        let err = add_app_page(&session, app_page_options(false)).await.unwrap_err();
        assert_eq!(err.to_string(), "Page not found");
        assert_eq!(transport.mutations().len(), 1);
    }

    fn granted(role: &str) -> Value {
        json!({
            "id": PERMISSION_ID,
            "roles": [role],
            "grantedToIdentities": [
                { "application": { "displayName": "Foo App", "id": APP_ID } }
            ]
        })
    }

    #[test]
    fn test_app_permission_requires_app() {
        let options = AppPermissionAddOptions {
            site_url: SITE_URL.to_string(),
            permission: SitePermission::Write,
            ..Default::default()
        };
        assert!(options.validate().is_err());

        let options = AppPermissionAddOptions {
            site_url: SITE_URL.to_string(),
            app_id: Some("123".to_string()),
            ..Default::default()
        };
        assert!(options.validate().is_err());
    }

    #[test]
    fn test_permission_value_names() {
        assert_eq!(
            SitePermission::from_str("fullcontrol", true).unwrap(),
            SitePermission::FullControl
        );
        assert!(SitePermission::from_str("Invalid", true).is_err());
    }

    #[tokio::test]
    async fn test_add_app_permission_by_app_id() {
        let transport = MockTransport::new()
            .on(Method::GET, SITE_LOOKUP, json!({ "id": SITE_ID }))
            .on(
                Method::GET,
                &format!(
                    "https://graph.microsoft.com/v1.0/myorganization/servicePrincipals?$select=appId,displayName&$filter=appId eq '{}'",
                    APP_ID
                ),
                json!({ "value": [{ "appId": APP_ID, "displayName": "Foo App" }] }),
            )
            .on(Method::POST, &permissions_url(), granted("write"));
        let prompter = ScriptedPrompter::silent();
        let session = Session::for_test(&transport, &prompter);

        let options = AppPermissionAddOptions {
            site_url: SITE_URL.to_string(),
            permission: SitePermission::Write,
            app_id: Some(APP_ID.to_string()),
            app_display_name: None,
        };
        let report = add_app_permission(&session, options).await.unwrap().unwrap();
        assert_eq!(report.value, granted("write"));
        assert_eq!(
            transport.mutations()[0].body,
            Some(json!({
                "roles": ["write"],
                "grantedToIdentities": [{ "application": { "id": APP_ID, "displayName": "Foo App" } }]
            }))
        );
    }

    #[tokio::test]
    async fn test_add_app_permission_elevates_to_manage() {
        let transport = MockTransport::new()
            .on(Method::GET, SITE_LOOKUP, json!({ "id": SITE_ID }))
            .on(Method::POST, &permissions_url(), granted("write"))
            .on(
                Method::PATCH,
                &format!("{}/{}", permissions_url(), PERMISSION_ID),
                granted("manage"),
            );
        let prompter = ScriptedPrompter::silent();
        let session = Session::for_test(&transport, &prompter);

        let options = AppPermissionAddOptions {
            site_url: SITE_URL.to_string(),
            permission: SitePermission::Manage,
            app_id: Some(APP_ID.to_string()),
            app_display_name: Some("Foo App".to_string()),
        };
        let report = add_app_permission(&session, options).await.unwrap().unwrap();
        assert_eq!(report.value["roles"], json!(["manage"]));

        let mutations = transport.mutations();
        assert_eq!(mutations[0].body.as_ref().unwrap()["roles"], json!(["write"]));
        assert_eq!(mutations[1].body, Some(json!({ "roles": ["manage"] })));
    }

    #[tokio::test]
    async fn test_add_app_permission_site_not_found() {
        let transport = MockTransport::new().on_error(
            Method::GET,
            "https://graph.microsoft.com/v1.0/sites/contoso.sharepoint.com:/sites/sitecollection-name-non-existing",
            404,
            json!({ "error": { "code": "itemNotFound", "message": "Requested site could not be found" } }),
        );
        let prompter = ScriptedPrompter::silent();
        let session = Session::for_test(&transport, &prompter);

        let options = AppPermissionAddOptions {
            site_url: format!("{}-non-existing", SITE_URL),
            permission: SitePermission::Write,
            app_id: Some(APP_ID.to_string()),
            app_display_name: None,
        };
        let err = add_app_permission(&session, options).await.unwrap_err();
        assert_eq!(err.to_string(), "Requested site could not be found");
    }

    #[tokio::test]
    async fn test_add_app_permission_ambiguous_app_name() {
        let transport = MockTransport::new()
            .on(Method::GET, SITE_LOOKUP, json!({ "id": SITE_ID }))
            .on(
                Method::GET,
                "https://graph.microsoft.com/v1.0/myorganization/servicePrincipals?$select=appId,displayName&$filter=displayName eq 'Foo%20App'",
                json!({ "value": [
                    { "appId": "3166f9d8-f4e9-4b56-b634-dafcc9ecba8e", "displayName": "Foo App" },
                    { "appId": "9bd7b7c0-e4a7-4b85-b0c6-20aaca0e25b7", "displayName": "Foo App" }
                ] }),
            );
        let prompter = ScriptedPrompter::silent();
        let session = Session::for_test(&transport, &prompter);

        let options = AppPermissionAddOptions {
            site_url: SITE_URL.to_string(),
            permission: SitePermission::Write,
            app_id: None,
            app_display_name: Some("Foo App".to_string()),
        };
        let err = add_app_permission(&session, options).await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "Multiple Microsoft Entra apps with displayName Foo App found: 3166f9d8-f4e9-4b56-b634-dafcc9ecba8e,9bd7b7c0-e4a7-4b85-b0c6-20aaca0e25b7"
        );
    }

    fn listing_transport() -> MockTransport {
        MockTransport::new()
            .on(Method::GET, SITE_LOOKUP, json!({ "id": SITE_ID }))
            .on(
                Method::GET,
                &permissions_url(),
                json!({ "value": [{ "id": PERMISSION_ID }, { "id": "other" }] }),
            )
            .on(
                Method::GET,
                &format!("{}/{}", permissions_url(), PERMISSION_ID),
                granted("read"),
            )
            .on(
                Method::GET,
                &format!("{}/other", permissions_url()),
                json!({
                    "id": "other",
                    "roles": ["write"],
                    "grantedToIdentities": [
                        { "application": { "displayName": "Bar App", "id": "00000000-0000-0000-0000-000000000001" } }
                    ]
                }),
            )
    }

    #[tokio::test]
    async fn test_list_app_permissions() {
        let transport = listing_transport();
        let prompter = ScriptedPrompter::silent();
        let session = Session::for_test(&transport, &prompter);

        let options = AppPermissionListOptions {
            site_url: SITE_URL.to_string(),
            ..Default::default()
        };
        let report = list_app_permissions(&session, options).await.unwrap().unwrap();
        assert_eq!(
            report.value[0],
            json!({ "appDisplayName": "Foo App", "appId": APP_ID, "permissionId": PERMISSION_ID, "roles": ["read"] })
        );
        assert_eq!(report.value.as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_list_app_permissions_by_display_name() {
        let transport = listing_transport();
        let prompter = ScriptedPrompter::silent();
        let session = Session::for_test(&transport, &prompter);

        let options = AppPermissionListOptions {
            site_url: SITE_URL.to_string(),
            app_display_name: Some("Bar App".to_string()),
            ..Default::default()
        };
        let report = list_app_permissions(&session, options).await.unwrap().unwrap();
        assert_eq!(report.value.as_array().unwrap().len(), 1);
        assert_eq!(report.value[0]["permissionId"], "other");
    }
}
