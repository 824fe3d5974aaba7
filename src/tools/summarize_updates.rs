use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct SummarizeUpdatesParams {
    #[schemars(description = "Summarize this user only. Omit to run for every user with pending updates.")]
    pub user_id: Option<String>,

    #[schemars(description = "Maximum pending updates per user to include. Defaults to the configured batch limit.")]
    pub limit: Option<usize>,
}
