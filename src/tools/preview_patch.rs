use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct PreviewPatchParams {
    #[schemars(description = "Owner of the document; the path is resolved under users/<user_id>/")]
    pub user_id: String,

    #[schemars(description = "Markdown path relative to the user's directory, e.g. 'overview.md' or 'parts/<id>/profile.md'")]
    pub path: String,

    #[schemars(description = "Anchor id of the target section, e.g. 'current_focus'")]
    pub anchor: String,

    #[schemars(description = "Replace the section body with this text. Exactly one of replace/append is required.")]
    pub replace: Option<String>,

    #[schemars(description = "Append this text after the section body. Exactly one of replace/append is required.")]
    pub append: Option<String>,
}
