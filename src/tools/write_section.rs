use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct WriteSectionParams {
    #[schemars(description = "Owner of the document; the path is resolved under users/<user_id>/")]
    pub user_id: String,

    #[schemars(description = "Markdown path relative to the user's directory")]
    pub path: String,

    #[schemars(description = "Anchor id of the target section")]
    pub anchor: String,

    #[schemars(description = "Replace the section body with this text. Exactly one of replace/append is required.")]
    pub replace: Option<String>,

    #[schemars(description = "Append this text after the section body. Exactly one of replace/append is required.")]
    pub append: Option<String>,

    #[schemars(description = "Hash the document had when it was read (sha256:<hex>). The write is rejected with conflict=true if the document changed since.")]
    pub expected_before_hash: Option<String>,

    #[schemars(description = "Why this change is being made; recorded on the mutation event")]
    pub rationale: Option<String>,
}
