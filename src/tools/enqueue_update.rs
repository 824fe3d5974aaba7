use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct EnqueueUpdateParams {
    #[schemars(description = "User the update belongs to")]
    pub user_id: String,

    #[schemars(description = "Update kind: 'session', 'check_in', 'onboarding', 'inbox_action', or 'manual'")]
    pub kind: String,

    #[schemars(description = "Id of the source event. Re-enqueueing the same (user, kind, ref_id) is a no-op.")]
    pub ref_id: String,

    #[schemars(description = "Optional JSON object describing the event")]
    pub payload: Option<serde_json::Value>,

    #[schemars(description = "Optional JSON object of extra metadata")]
    pub metadata: Option<serde_json::Value>,
}
