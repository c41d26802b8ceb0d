use serde::{Deserialize, Serialize};

/// Planner plan (only the fields used for lookups)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlannerPlan {
    pub id: String,
    pub title: Option<String>,
}

/// Planner bucket
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlannerBucket {
    pub id: String,
    pub name: Option<String>,
}

/// Planner task
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlannerTask {
    pub id: String,
    pub title: Option<String>,
}

/// Planner task priority labels and their numeric values
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskPriority {
    Urgent,
    Important,
    Medium,
    Low,
}

impl TaskPriority {
    pub const ALL: [TaskPriority; 4] = [Self::Urgent, Self::Important, Self::Medium, Self::Low];

    pub fn label(self) -> &'static str {
        match self {
            Self::Urgent => "Urgent",
            Self::Important => "Important",
            Self::Medium => "Medium",
            Self::Low => "Low",
        }
    }

    pub fn value(self) -> i64 {
        match self {
            Self::Urgent => 1,
            Self::Important => 3,
            Self::Medium => 5,
            Self::Low => 9,
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|p| p.label().eq_ignore_ascii_case(label))
    }
}
