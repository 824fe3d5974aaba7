use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct CreateFileParams {
    #[schemars(description = "Owner of the document; the path is resolved under users/<user_id>/")]
    pub user_id: String,

    #[schemars(description = "Markdown path relative to the user's directory. Must end in .md and must not exist yet.")]
    pub path: String,

    #[schemars(description = "Template: 'overview' (user overview scaffold) or 'blank'. Ignored when content is given.")]
    pub template: Option<String>,

    #[schemars(description = "Initial document content")]
    pub content: Option<String>,
}
