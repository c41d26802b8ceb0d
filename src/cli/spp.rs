use anyhow::Result;
use clap::{ArgGroup, Args, Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::output::{print_report, Report};
use super::resolve::ListRef;
use super::utils::{encode_query_parameter, remove_trailing_slashes, server_relative_path};
use super::validation::{self as validate, ValidationResult};
use super::Session;
use crate::api::Request;
use crate::error::CommandError;

const NOMETADATA: &str = "application/json;odata=nometadata";

/// List base type of document libraries
const DOCUMENT_LIBRARY: i64 = 1;

#[derive(Args, Debug)]
pub struct SppCommand {
    #[command(subcommand)]
    pub command: SppSubcommand,
}

#[derive(Subcommand, Debug)]
pub enum SppSubcommand {
    /// Document understanding models
    Model(ModelCommand),

    /// Autofill columns
    #[command(name = "autofillcolumn")]
    AutofillColumn(AutofillColumnCommand),
}

#[derive(Args, Debug)]
pub struct ModelCommand {
    #[command(subcommand)]
    pub command: ModelSubcommand,
}

#[derive(Subcommand, Debug)]
pub enum ModelSubcommand {
    /// Apply a model to a document library
    Apply(ModelApplyOptions),
}

#[derive(Args, Debug)]
pub struct AutofillColumnCommand {
    #[command(subcommand)]
    pub command: AutofillColumnSubcommand,
}

#[derive(Subcommand, Debug)]
pub enum AutofillColumnSubcommand {
    /// Apply the autofill option to a column
    Set(AutofillColumnSetOptions),
}

/// Document library addressed by id, title or URL
#[derive(Args, Debug, Default)]
#[command(group(ArgGroup::new("one_of:list").multiple(true).args(["list_title", "list_id", "list_url"])))]
pub struct LibraryOptions {
    /// Title of the document library
    #[arg(long = "listTitle")]
    pub list_title: Option<String>,

    /// ID of the document library
    #[arg(long = "listId")]
    pub list_id: Option<String>,

    /// Server- or site-relative URL of the document library
    #[arg(long = "listUrl")]
    pub list_url: Option<String>,
}

impl LibraryOptions {
    fn validate(&self) -> ValidationResult {
        if let Some(list_id) = &self.list_id {
            guid_parameter(list_id, "listId")?;
        }
        validate::exactly_one_of(&[
            ("listTitle", self.list_title.is_some()),
            ("listId", self.list_id.is_some()),
            ("listUrl", self.list_url.is_some()),
        ])
    }

    fn list_ref(&self) -> Result<ListRef<'_>> {
        ListRef::from_options(
            self.list_id.as_deref(),
            self.list_title.as_deref(),
            self.list_url.as_deref(),
        )
        .ok_or_else(|| CommandError::validation("Specify listTitle, listId or listUrl.").into())
    }
}

fn guid_parameter(value: &str, option: &str) -> ValidationResult {
    if validate::is_valid_guid(value) {
        Ok(())
    } else {
        Err(CommandError::validation(format!(
            "{} in parameter {} is not a valid GUID",
            value, option
        )))
    }
}

/// How the library's views change after the model is applied
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Default)]
pub enum ViewOption {
    #[default]
    #[value(name = "NewViewAsDefault")]
    NewViewAsDefault,
    #[value(name = "DoNotChangeDefault")]
    DoNotChangeDefault,
    #[value(name = "TileViewAsDefault")]
    TileViewAsDefault,
}

impl ViewOption {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NewViewAsDefault => "NewViewAsDefault",
            Self::DoNotChangeDefault => "DoNotChangeDefault",
            Self::TileViewAsDefault => "TileViewAsDefault",
        }
    }
}

#[derive(Args, Debug, Default)]
#[command(group(ArgGroup::new("one_of:model").multiple(true).args(["id", "title"])))]
pub struct ModelApplyOptions {
    /// URL of the site with the document library
    #[arg(short = 'u', long = "siteUrl")]
    pub site_url: String,

    /// URL of the content center site
    #[arg(long = "contentCenterUrl")]
    pub content_center_url: String,

    /// Unique ID of the model
    #[arg(short, long)]
    pub id: Option<String>,

    /// Title of the model
    #[arg(short, long)]
    pub title: Option<String>,

    #[command(flatten)]
    pub library: LibraryOptions,

    /// View applied to the library
    #[arg(long = "viewOption", value_enum, ignore_case = true)]
    pub view_option: Option<ViewOption>,
}

impl ModelApplyOptions {
    fn validate(&self) -> ValidationResult {
        if let Some(id) = &self.id {
            guid_parameter(id, "id")?;
        }
        validate::sharepoint_url(&self.content_center_url, "contentCenterUrl")?;
        validate::sharepoint_url(&self.site_url, "siteUrl")?;
        validate::exactly_one_of(&[("id", self.id.is_some()), ("title", self.title.is_some())])?;
        self.library.validate()
    }
}

#[derive(Args, Debug, Default)]
#[command(group(ArgGroup::new("one_of:column").multiple(true).args(["column_id", "column_title"])))]
pub struct AutofillColumnSetOptions {
    /// URL of the site with the document library
    #[arg(short = 'u', long = "siteUrl")]
    pub site_url: String,

    #[command(flatten)]
    pub library: LibraryOptions,

    /// ID of the column
    #[arg(short = 'i', long = "columnId")]
    pub column_id: Option<String>,

    /// Title or internal name of the column
    #[arg(short = 't', long = "columnTitle")]
    pub column_title: Option<String>,

    /// Prompt used to fill the column
    #[arg(long)]
    pub prompt: Option<String>,

    /// Enable or disable autofill on the column
    #[arg(long = "isEnabled")]
    pub is_enabled: Option<bool>,
}

impl AutofillColumnSetOptions {
    fn validate(&self) -> ValidationResult {
        if let Some(column_id) = &self.column_id {
            guid_parameter(column_id, "columnId")?;
        }
        validate::sharepoint_url(&self.site_url, "siteUrl")?;
        validate::exactly_one_of(&[
            ("columnTitle", self.column_title.is_some()),
            ("columnId", self.column_id.is_some()),
        ])?;
        self.library.validate()
    }
}

async fn assert_content_center(session: &Session<'_>, url: &str) -> Result<()> {
    let web = session
        .transport
        .get(&format!("{}/_api/web?$select=WebTemplateConfiguration", url))
        .await?;

    if web.get("WebTemplateConfiguration").and_then(Value::as_str) != Some("CONTENTCTR#0") {
        return Err(CommandError::failed(format!("{} is not a content site.", url)).into());
    }
    Ok(())
}

async fn get_model(session: &Session<'_>, content_center_url: &str, options: &ModelApplyOptions) -> Result<Value> {
    let lookup = match (&options.id, &options.title) {
        (Some(id), _) => format!("getbyuniqueid('{}')", id),
        (None, Some(title)) => {
            let mut title = title.to_lowercase();
            if !title.ends_with(".classifier") {
                title.push_str(".classifier");
            }
            format!("getbytitle('{}')", encode_query_parameter(&title))
        }
        (None, None) => return Err(CommandError::validation("Specify id or title.").into()),
    };

    let model = session
        .transport
        .get(&format!("{}/_api/machinelearning/models/{}", content_center_url, lookup))
        .await?;

    if model.get("odata.null").and_then(Value::as_bool) == Some(true) {
        return Err(CommandError::not_found("Model not found.").into());
    }
    Ok(model)
}

fn is_document_library(list: &Value) -> bool {
    list.get("BaseType").and_then(Value::as_i64) == Some(DOCUMENT_LIBRARY)
}

pub async fn apply_model(session: &Session<'_>, options: ModelApplyOptions) -> Result<Option<Report>> {
    options.validate()?;

    tracing::info!("Applying a model to a document library...");
    let content_center_url = remove_trailing_slashes(&options.content_center_url);
    let site_url = remove_trailing_slashes(&options.site_url);

    assert_content_center(session, content_center_url).await?;
    let model = get_model(session, content_center_url, &options).await?;

    let list = session
        .transport
        .get(&format!(
            "{}?$select=BaseType,RootFolder/ServerRelativeUrl&$expand=RootFolder",
            options.library.list_ref()?.request_url(site_url)?
        ))
        .await?;
    if !is_document_library(&list) {
        return Err(CommandError::failed("The specified list is not a document library.").into());
    }

    let publication = json!({
        "__metadata": { "type": "Microsoft.Office.Server.ContentCenter.SPMachineLearningPublicationsEntityData" },
        "Publications": {
            "results": [{
                "ModelUniqueId": model.get("UniqueId").cloned().unwrap_or(Value::Null),
                "TargetSiteUrl": options.site_url,
                "TargetWebServerRelativeUrl": server_relative_path(site_url, "")?,
                "TargetLibraryServerRelativeUrl": list.pointer("/RootFolder/ServerRelativeUrl").cloned().unwrap_or(Value::Null),
                "ViewOption": options.view_option.unwrap_or_default().as_str(),
            }]
        }
    });

    let result = session
        .transport
        .execute(
            Request::post(format!("{}/_api/machinelearning/publications", content_center_url))
                .header("accept", NOMETADATA)
                .header("Content-Type", "application/json;odata=verbose")
                .json(publication),
        )
        .await?;

    if let Some(message) = result.pointer("/Details/0/ErrorMessage").and_then(Value::as_str) {
        if !message.is_empty() {
            return Err(CommandError::failed(message).into());
        }
    }

    Ok(None)
}

/// Field kinds that can be filled by autofill
const AUTOFILL_FIELD_KINDS: &[i64] = &[1, 2, 3, 4, 5, 6, 8, 9, 10, 11, 12, 15, 16];

/// Stored autofill settings of a column, kept as a JSON string on the field
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct AutofillInfo {
    #[serde(rename = "LLM")]
    llm: LlmInfo,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct LlmInfo {
    prompt: Option<String>,
    is_enabled: Option<bool>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ColumnPrompt<'a> {
    column_id: &'a str,
    column_name: &'a str,
    prompt: &'a str,
    is_enabled: bool,
}

pub async fn set_autofill_column(
    session: &Session<'_>,
    options: AutofillColumnSetOptions,
) -> Result<Option<Report>> {
    options.validate()?;

    tracing::info!("Applying an autofill column to a column...");
    let site_url = remove_trailing_slashes(&options.site_url);

    let list = session
        .transport
        .get(&format!(
            "{}?$select=Id,BaseType",
            options.library.list_ref()?.request_url(site_url)?
        ))
        .await?;
    if !is_document_library(&list) {
        return Err(CommandError::failed("The specified list is not a document library.").into());
    }
    let list_id = list.get("Id").and_then(Value::as_str).unwrap_or_default();

    let field_lookup = match (&options.column_id, &options.column_title) {
        (Some(id), _) => format!("getbyid('{}')", encode_query_parameter(id)),
        (None, title) => format!(
            "getbyinternalnameortitle('{}')",
            encode_query_parameter(title.as_deref().unwrap_or_default())
        ),
    };
    let column = session
        .transport
        .get(&format!(
            "{}/_api/web/lists(guid'{}')/fields/{}?&$select=Id,Title,FieldTypeKind,AutofillInfo",
            site_url,
            encode_query_parameter(list_id),
            field_lookup
        ))
        .await?;

    let kind = column.get("FieldTypeKind").and_then(Value::as_i64).unwrap_or_default();
    if !AUTOFILL_FIELD_KINDS.contains(&kind) {
        return Err(CommandError::failed("The specified column has incorrect type.").into());
    }
    let column_id = column.get("Id").and_then(Value::as_str).unwrap_or_default();
    let doc_lib_id = format!("{{{}}}", list_id);

    let autofill_info = column
        .get("AutofillInfo")
        .and_then(Value::as_str)
        .filter(|info| !info.is_empty());

    if let Some(info) = autofill_info {
        let stored: AutofillInfo = serde_json::from_str(info)?;
        tracing::debug!("Updating existing autofill settings of column {}", column_id);
        let prompt = options.prompt.filter(|p| !p.is_empty()).or(stored.llm.prompt);
        session
            .transport
            .execute(
                Request::post(format!("{}/_api/machinelearning/SetColumnLLMInfo", site_url))
                    .header("accept", NOMETADATA)
                    .json(json!({
                        "autofillPrompt": prompt,
                        "columnId": column_id,
                        "docLibId": doc_lib_id,
                        "isEnabled": options.is_enabled.or(stored.llm.is_enabled),
                    })),
            )
            .await?;
        return Ok(None);
    }

    let prompt = options.prompt.as_deref().filter(|p| !p.is_empty()).ok_or_else(|| {
        CommandError::validation(
            "The prompt parameter is required for the first time setting the autofill column.",
        )
    })?;

    let prompts = serde_json::to_string(&[ColumnPrompt {
        column_id,
        column_name: column.get("Title").and_then(Value::as_str).unwrap_or_default(),
        prompt,
        is_enabled: options.is_enabled.unwrap_or(true),
    }])?;

    session
        .transport
        .execute(
            Request::post(format!("{}/_api/machinelearning/SetSyntexPoweredColumnPrompts", site_url))
                .header("accept", NOMETADATA)
                .json(json!({
                    "docLibId": doc_lib_id,
                    "syntexPoweredColumnPrompts": prompts,
                })),
        )
        .await?;

    Ok(None)
}

pub async fn execute(cmd: SppCommand, session: &Session<'_>) -> Result<()> {
    let report = match cmd.command {
        SppSubcommand::Model(model) => match model.command {
            ModelSubcommand::Apply(options) => apply_model(session, options).await?,
        },
        SppSubcommand::AutofillColumn(column) => match column.command {
            AutofillColumnSubcommand::Set(options) => set_autofill_column(session, options).await?,
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

    const CONTENT_CENTER: &str = "https://contoso.sharepoint.com/sites/contentCenter";
    const SITE: &str = "https://contoso.sharepoint.com/sites/sales";
    const MODEL_ID: &str = "9b1b1e42-794b-4c71-93ac-5ed92488b67f";
    const LIST_ID: &str = "421b1e42-794b-4c71-93ac-5ed92488b67d";
    const COLUMN_ID: &str = "1a2b3c4d-794b-4c71-93ac-5ed92488b67d";

    fn content_center() -> MockTransport {
        MockTransport::new().on(
            Method::GET,
            &format!("{}/_api/web?$select=WebTemplateConfiguration", CONTENT_CENTER),
            json!({ "WebTemplateConfiguration": "CONTENTCTR#0" }),
        )
    }

    fn model_options() -> ModelApplyOptions {
        ModelApplyOptions {
            site_url: SITE.to_string(),
            content_center_url: CONTENT_CENTER.to_string(),
            id: Some(MODEL_ID.to_string()),
            library: LibraryOptions {
                list_id: Some(LIST_ID.to_string()),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn library(base_type: i64) -> Value {
        json!({ "BaseType": base_type, "RootFolder": { "ServerRelativeUrl": "/sites/sales/Shared Documents" } })
    }

    #[test]
    fn test_model_apply_validation() {
        assert!(model_options().validate().is_ok());

        let options = ModelApplyOptions {
            id: Some("invalid".to_string()),
            ..model_options()
        };
        assert_eq!(
            options.validate().unwrap_err().to_string(),
            "invalid in parameter id is not a valid GUID"
        );

        let options = ModelApplyOptions {
            content_center_url: "foo".to_string(),
            ..model_options()
        };
        assert!(options.validate().is_err());
    }

    #[test]
    fn test_view_option_is_case_insensitive() {
        assert_eq!(
            ViewOption::from_str("tileviewasdefault", true).unwrap(),
            ViewOption::TileViewAsDefault
        );
        assert!(ViewOption::from_str("invalid", true).is_err());
    }

    #[tokio::test]
    async fn test_apply_model_by_id() {
        let transport = content_center()
            .on(
                Method::GET,
                &format!("{}/_api/machinelearning/models/getbyuniqueid('{}')", CONTENT_CENTER, MODEL_ID),
                json!({ "UniqueId": MODEL_ID }),
            )
            .on(
                Method::GET,
                &format!(
                    "{}/_api/web/lists(guid'{}')?$select=BaseType,RootFolder/ServerRelativeUrl&$expand=RootFolder",
                    SITE, LIST_ID
                ),
                library(1),
            )
            .on(
                Method::POST,
                &format!("{}/_api/machinelearning/publications", CONTENT_CENTER),
                json!({ "Details": [{ "ErrorMessage": null }], "TotalFailures": 0 }),
            );
        let prompter = ScriptedPrompter::silent();
        let session = Session::for_test(&transport, &prompter);

        let options = ModelApplyOptions {
            view_option: Some(ViewOption::TileViewAsDefault),
            ..model_options()
        };
        apply_model(&session, options).await.unwrap();

        let request = &transport.mutations()[0];
        assert_eq!(request.header_value("Content-Type"), Some("application/json;odata=verbose"));
        assert_eq!(
            request.body.as_ref().unwrap()["Publications"]["results"][0],
            json!({
                "ModelUniqueId": MODEL_ID,
                "TargetSiteUrl": SITE,
                "TargetWebServerRelativeUrl": "/sites/sales",
                "TargetLibraryServerRelativeUrl": "/sites/sales/Shared Documents",
                "ViewOption": "TileViewAsDefault"
            })
        );
    }

    #[tokio::test]
    async fn test_apply_model_by_title_to_library_url() {
        let transport = content_center()
            .on(
                Method::GET,
                &format!("{}/_api/machinelearning/models/getbytitle('modeltitle.classifier')", CONTENT_CENTER),
                json!({ "UniqueId": MODEL_ID }),
            )
            .on(
                Method::GET,
                &format!(
                    "{}/_api/web/GetList('%2Fsites%2Fsales%2FShared%20Documents')?$select=BaseType,RootFolder/ServerRelativeUrl&$expand=RootFolder",
                    SITE
                ),
                library(1),
            )
            .on(
                Method::POST,
                &format!("{}/_api/machinelearning/publications", CONTENT_CENTER),
                json!({ "Details": [] }),
            );
        let prompter = ScriptedPrompter::silent();
        let session = Session::for_test(&transport, &prompter);

        let options = ModelApplyOptions {
            id: None,
            title: Some("ModelTitle".to_string()),
            library: LibraryOptions {
                list_url: Some("/Shared Documents".to_string()),
                ..Default::default()
            },
            ..model_options()
        };
        apply_model(&session, options).await.unwrap();
        assert_eq!(
            transport.mutations()[0].body.as_ref().unwrap()["Publications"]["results"][0]["ViewOption"],
            "NewViewAsDefault"
        );
    }

    #[tokio::test]
    async fn test_apply_model_requires_content_center() {
        let transport = MockTransport::new().on(
            Method::GET,
            &format!("{}/_api/web?$select=WebTemplateConfiguration", CONTENT_CENTER),
            json!({ "WebTemplateConfiguration": "SITEPAGEPUBLISHING#0" }),
        );
        let prompter = ScriptedPrompter::silent();
        let session = Session::for_test(&transport, &prompter);

        let err = apply_model(&session, model_options()).await.unwrap_err();
        assert_eq!(err.to_string(), format!("{} is not a content site.", CONTENT_CENTER));
    }

    #[tokio::test]
    async fn test_apply_model_not_found() {
        let transport = content_center().on(
            Method::GET,
            &format!("{}/_api/machinelearning/models/getbyuniqueid('{}')", CONTENT_CENTER, MODEL_ID),
            json!({ "odata.null": true }),
        );
        let prompter = ScriptedPrompter::silent();
        let session = Session::for_test(&transport, &prompter);

        let err = apply_model(&session, model_options()).await.unwrap_err();
        assert_eq!(err.to_string(), "Model not found.");
    }

    #[tokio::test]
    async fn test_apply_model_to_generic_list() {
        let transport = content_center()
            .on(
                Method::GET,
                &format!("{}/_api/machinelearning/models/getbyuniqueid('{}')", CONTENT_CENTER, MODEL_ID),
                json!({ "UniqueId": MODEL_ID }),
            )
            .on(
                Method::GET,
                &format!(
                    "{}/_api/web/lists(guid'{}')?$select=BaseType,RootFolder/ServerRelativeUrl&$expand=RootFolder",
                    SITE, LIST_ID
                ),
                library(0),
            );
        let prompter = ScriptedPrompter::silent();
        let session = Session::for_test(&transport, &prompter);

        let err = apply_model(&session, model_options()).await.unwrap_err();
        assert_eq!(err.to_string(), "The specified list is not a document library.");
        assert!(transport.mutations().is_empty());
    }

    #[tokio::test]
    async fn test_apply_model_publication_error() {
        let transport = content_center()
            .on(
                Method::GET,
                &format!("{}/_api/machinelearning/models/getbyuniqueid('{}')", CONTENT_CENTER, MODEL_ID),
                json!({ "UniqueId": MODEL_ID }),
            )
            .on(
                Method::GET,
                &format!(
                    "{}/_api/web/lists(guid'{}')?$select=BaseType,RootFolder/ServerRelativeUrl&$expand=RootFolder",
                    SITE, LIST_ID
                ),
                library(1),
            )
            .on(
                Method::POST,
                &format!("{}/_api/machinelearning/publications", CONTENT_CENTER),
                json!({ "Details": [{ "ErrorMessage": "Model is already applied." }] }),
            );
        let prompter = ScriptedPrompter::silent();
        let session = Session::for_test(&transport, &prompter);

        let err = apply_model(&session, model_options()).await.unwrap_err();
        assert_eq!(err.to_string(), "Model is already applied.");
    }

    fn autofill_transport(column: Value) -> MockTransport {
        MockTransport::new()
            .on(
                Method::GET,
                &format!("{}/_api/web/lists/getByTitle('Documents')?$select=Id,BaseType", SITE),
                json!({ "Id": LIST_ID, "BaseType": 1 }),
            )
            .on(
                Method::GET,
                &format!(
                    "{}/_api/web/lists(guid'{}')/fields/getbyid('{}')?&$select=Id,Title,FieldTypeKind,AutofillInfo",
                    SITE, LIST_ID, COLUMN_ID
                ),
                column,
            )
            .on(
                Method::POST,
                &format!("{}/_api/machinelearning/SetSyntexPoweredColumnPrompts", SITE),
                Value::Null,
            )
            .on(
                Method::POST,
                &format!("{}/_api/machinelearning/SetColumnLLMInfo", SITE),
                Value::Null,
            )
    }

    fn autofill_options(prompt: Option<&str>, is_enabled: Option<bool>) -> AutofillColumnSetOptions {
        AutofillColumnSetOptions {
            site_url: SITE.to_string(),
            library: LibraryOptions {
                list_title: Some("Documents".to_string()),
                ..Default::default()
            },
            column_id: Some(COLUMN_ID.to_string()),
            column_title: None,
            prompt: prompt.map(str::to_string),
            is_enabled,
        }
    }

    #[tokio::test]
    async fn test_autofill_first_time() {
        let transport = autofill_transport(json!({
            "Id": COLUMN_ID, "Title": "Summary", "FieldTypeKind": 3, "AutofillInfo": null
        }));
        let prompter = ScriptedPrompter::silent();
        let session = Session::for_test(&transport, &prompter);

        set_autofill_column(&session, autofill_options(Some("Summarize the document"), None))
            .await
            .unwrap();

        let body = transport.mutations()[0].body.clone().unwrap();
        assert_eq!(body["docLibId"], format!("{{{}}}", LIST_ID));
        assert_eq!(
            body["syntexPoweredColumnPrompts"],
            format!(
                r#"[{{"columnId":"{}","columnName":"Summary","prompt":"Summarize the document","isEnabled":true}}]"#,
                COLUMN_ID
            )
        );
    }

    #[tokio::test]
    async fn test_autofill_first_time_requires_prompt() {
        let transport = autofill_transport(json!({
            "Id": COLUMN_ID, "Title": "Summary", "FieldTypeKind": 2
        }));
        let prompter = ScriptedPrompter::silent();
        let session = Session::for_test(&transport, &prompter);

        let err = set_autofill_column(&session, autofill_options(None, None)).await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "The prompt parameter is required for the first time setting the autofill column."
        );
    }

    #[tokio::test]
    async fn test_autofill_updates_existing_settings() {
        let transport = autofill_transport(json!({
            "Id": COLUMN_ID,
            "Title": "Summary",
            "FieldTypeKind": 2,
            "AutofillInfo": "{\"LLM\":{\"IsEnabled\":true,\"Prompt\":\"Old prompt\"}}"
        }));
        let prompter = ScriptedPrompter::silent();
        let session = Session::for_test(&transport, &prompter);

        set_autofill_column(&session, autofill_options(None, Some(false)))
            .await
            .unwrap();

        let request = &transport.mutations()[0];
        assert!(request.url.ends_with("/SetColumnLLMInfo"));
        assert_eq!(
            request.body,
            Some(json!({
                "autofillPrompt": "Old prompt",
                "columnId": COLUMN_ID,
                "docLibId": format!("{{{}}}", LIST_ID),
                "isEnabled": false
            }))
        );
    }

    #[tokio::test]
    async fn test_autofill_empty_prompt_keeps_stored_prompt() {
        let transport = autofill_transport(json!({
            "Id": COLUMN_ID,
            "Title": "Summary",
            "FieldTypeKind": 2,
            "AutofillInfo": "{\"LLM\":{\"IsEnabled\":false,\"Prompt\":\"Old prompt\"}}"
        }));
        let prompter = ScriptedPrompter::silent();
        let session = Session::for_test(&transport, &prompter);

        set_autofill_column(&session, autofill_options(Some(""), None))
            .await
            .unwrap();

        let body = transport.mutations()[0].body.clone().unwrap();
        assert_eq!(body["autofillPrompt"], "Old prompt");
        assert_eq!(body["isEnabled"], false);
    }

    #[tokio::test]
    async fn test_autofill_rejects_column_type() {
        let transport = autofill_transport(json!({
            "Id": COLUMN_ID, "Title": "Lookup", "FieldTypeKind": 7
        }));
        let prompter = ScriptedPrompter::silent();
        let session = Session::for_test(&transport, &prompter);

        let err = set_autofill_column(&session, autofill_options(Some("x"), None))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "The specified column has incorrect type.");
        assert!(transport.mutations().is_empty());
    }
}
