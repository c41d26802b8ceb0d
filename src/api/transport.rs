use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde_json::Value;

/// A single REST call against Graph or SharePoint
#[derive(Debug, Clone)]
pub struct Request {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<Value>,
}

impl Request {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: Vec::new(),
            body: None,
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::GET, url)
    }

    pub fn post(url: impl Into<String>) -> Self {
        Self::new(Method::POST, url)
    }

    pub fn patch(url: impl Into<String>) -> Self {
        Self::new(Method::PATCH, url)
    }

    pub fn delete(url: impl Into<String>) -> Self {
        Self::new(Method::DELETE, url)
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn json(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Case-insensitive header lookup
    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Executes REST calls on behalf of commands.
///
/// Responses are parsed as JSON; an empty body yields `Value::Null`.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn execute(&self, request: Request) -> Result<Value>;

    async fn get(&self, url: &str) -> Result<Value> {
        self.execute(Request::get(url)).await
    }

    /// Follow `@odata.nextLink` and collect every `value` item
    async fn get_all(&self, url: &str) -> Result<Vec<Value>> {
        let mut items = Vec::new();
        let mut next = Some(url.to_string());

        while let Some(url) = next {
            let page = self.get(&url).await?;
            if let Some(values) = page.get("value").and_then(Value::as_array) {
                items.extend(values.iter().cloned());
            }
            next = page
                .get("@odata.nextLink")
                .and_then(Value::as_str)
                .map(str::to_string);
        }

        Ok(items)
    }
}

/// GET a URL and deserialize the response
pub async fn fetch<T: DeserializeOwned>(transport: &dyn Transport, url: &str) -> Result<T> {
    let value = transport.get(url).await?;
    serde_json::from_value(value).with_context(|| format!("Failed to parse response from {}", url))
}

/// GET every page of a collection and deserialize the items
pub async fn fetch_all<T: DeserializeOwned>(transport: &dyn Transport, url: &str) -> Result<Vec<T>> {
    transport
        .get_all(url)
        .await?
        .into_iter()
        .map(|item| {
            serde_json::from_value(item)
                .with_context(|| format!("Failed to parse response from {}", url))
        })
        .collect()
}
