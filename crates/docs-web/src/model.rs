use serde::{Deserialize, Serialize};

fn default_empty() -> String {
    String::new()
}

#[derive(Debug, Clone, Deserialize)]
pub struct GenerateDocsBody {
    pub source_branch: String,
    pub target_branch: String,
    pub model_key: String,
    #[serde(default = "default_empty")]
    pub user_instructions: String,
    #[serde(default)]
    pub docs_branch_override: Option<String>,
    #[serde(default)]
    pub session_key: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GenerateDocsFromBranchBody {
    pub branch: String,
    pub model_key: String,
    #[serde(default = "default_empty")]
    pub instructions: String,
    #[serde(default)]
    pub docs_branch_override: Option<String>,
    #[serde(default)]
    pub session_key: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RefineDocsBody {
    pub source_branch: String,
    pub instruction: String,
    #[serde(default)]
    pub session_key: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CommitDocsBody {
    pub branch: String,
    pub files: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MergeDocsBody {
    pub source_branch: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StopStreamBody {
    pub source_branch: String,
    #[serde(default)]
    pub session_key: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TabBody {
    pub source_branch: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ValidateBranchPairBody {
    pub source_branch: String,
    pub target_branch: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResolveDeleteBody {
    pub source_branch: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResolveRenameBody {
    pub new_docs_branch: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct OkResponse {
    pub ok: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ResolveRenameResponse {
    pub docs_branch_override: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EventsQuery {
    #[serde(default)]
    pub session_key: Option<String>,
}
