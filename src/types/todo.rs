use serde::{Deserialize, Serialize};

/// Microsoft To Do task list
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TodoList {
    pub id: String,
    pub display_name: Option<String>,
}
