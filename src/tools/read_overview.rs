use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct ReadOverviewParams {
    #[schemars(description = "User whose overview snapshot should be loaded. The overview is created on first read.")]
    pub user_id: String,

    #[schemars(description = "If true, also return the last N change-log entries (1-25)")]
    pub change_log_limit: Option<usize>,
}
