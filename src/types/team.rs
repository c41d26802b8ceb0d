use serde::{Deserialize, Serialize};

/// Team the signed-in user belongs to (`me/joinedTeams`)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Team {
    pub id: String,
    pub display_name: Option<String>,
}

/// Microsoft 365 group, used to find teams by name
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Group {
    pub id: String,
    pub display_name: Option<String>,
    #[serde(default)]
    pub resource_provisioning_options: Vec<String>,
}

impl Group {
    pub fn is_team(&self) -> bool {
        self.resource_provisioning_options.iter().any(|o| o == "Team")
    }
}

/// Channel within a team
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Channel {
    pub id: String,
    pub display_name: Option<String>,
    pub membership_type: Option<String>,
}

/// Member of a team channel
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationMember {
    pub id: String,
    pub display_name: Option<String>,
    pub user_id: Option<String>,
    pub email: Option<String>,
    #[serde(default)]
    pub roles: Vec<String>,
}
