use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct UpdateSyncParams {
    #[schemars(description = "User whose pending updates should be listed")]
    pub user_id: String,

    #[schemars(description = "Maximum number of updates to return (1-50). Defaults to 20.")]
    pub limit: Option<usize>,
}
