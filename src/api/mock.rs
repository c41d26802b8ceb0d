use std::collections::HashMap;
use std::sync::Mutex;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reqwest::{Method, StatusCode};
use serde_json::Value;

use super::transport::{Request, Transport};
use crate::error::ApiError;

enum Reply {
    Json(Value),
    Error(StatusCode, String),
}

/// Canned responses keyed by method and exact URL; every request is recorded.
///
/// Unknown requests fail with `Invalid request`.
pub struct MockTransport {
    replies: HashMap<(Method, String), Reply>,
    requests: Mutex<Vec<Request>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self {
            replies: HashMap::new(),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn on(mut self, method: Method, url: &str, body: Value) -> Self {
        self.replies
            .insert((method, url.to_string()), Reply::Json(body));
        self
    }

    pub fn on_error(mut self, method: Method, url: &str, status: u16, body: Value) -> Self {
        let status = StatusCode::from_u16(status).unwrap();
        self.replies.insert(
            (method, url.to_string()),
            Reply::Error(status, body.to_string()),
        );
        self
    }

    pub fn requests(&self) -> Vec<Request> {
        self.requests.lock().unwrap().clone()
    }

    pub fn requests_to(&self, method: Method, url: &str) -> Vec<Request> {
        self.requests()
            .into_iter()
            .filter(|r| r.method == method && r.url == url)
            .collect()
    }

    /// Requests other than GET
    pub fn mutations(&self) -> Vec<Request> {
        self.requests()
            .into_iter()
            .filter(|r| r.method != Method::GET)
            .collect()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn execute(&self, request: Request) -> Result<Value> {
        let key = (request.method.clone(), request.url.clone());
        self.requests.lock().unwrap().push(request);

        match self.replies.get(&key) {
            Some(Reply::Json(body)) => Ok(body.clone()),
            Some(Reply::Error(status, body)) => Err(ApiError::from_response(*status, body).into()),
            None => Err(anyhow!("Invalid request {} {}", key.0, key.1)),
        }
    }
}
