//! CLI `enqueue` and `pending` commands.

use anyhow::{Context, Result};

use mdmemory::memory::queue::{EnqueueInput, UpdateKind};
use mdmemory::summarizer::types::pending_tool_payload;

use crate::server::AppState;

fn parse_object(raw: Option<&str>, name: &str) -> Result<Option<serde_json::Value>> {
    raw.map(|s| serde_json::from_str(s).with_context(|| format!("{name} is not valid JSON")))
        .transpose()
}

/// Queue one update and print `{inserted, id}`.
pub async fn enqueue(
    state: &AppState,
    user_id: &str,
    kind: &str,
    ref_id: &str,
    payload: Option<&str>,
    metadata: Option<&str>,
) -> Result<()> {
    let kind: UpdateKind = kind.parse().map_err(anyhow::Error::msg)?;
    let result = state
        .queue
        .enqueue(EnqueueInput {
            user_id: user_id.to_string(),
            kind,
            ref_id: ref_id.to_string(),
            payload: parse_object(payload, "payload")?,
            metadata: parse_object(metadata, "metadata")?,
        })
        .await?;

    if result.inserted {
        println!("Queued update {}", result.id);
    } else {
        println!("Already queued as {}", result.id);
    }
    Ok(())
}

/// List pending updates for one user, or the users that have any.
pub async fn pending(state: &AppState, user_id: Option<&str>, limit: usize) -> Result<()> {
    match user_id {
        Some(user_id) => {
            let pending = state.queue.fetch_pending(user_id, limit).await?;
            if pending.is_empty() {
                println!("No pending updates for {user_id}.");
                return Ok(());
            }
            super::print_json(&pending_tool_payload(&pending, limit));
        }
        None => {
            let users = state.queue.users_with_pending().await?;
            if users.is_empty() {
                println!("No pending updates.");
                return Ok(());
            }
            println!("Users with pending updates:");
            for user in users {
                let count = state.queue.fetch_pending(&user, limit).await?.len();
                println!("  {user:<40} {count}");
            }
        }
    }
    Ok(())
}
