//! CLI `overview` command.

use anyhow::{bail, Result};

use mdmemory::memory::overview::{
    format_overview_fragments, load_overview_snapshot, read_change_log_entries,
};

use crate::server::AppState;

/// Print a user's overview snapshot, recent change-log entries and, when
/// `events > 0`, the latest audited mutations.
pub async fn overview(
    state: &AppState,
    user_id: &str,
    entries: usize,
    events: usize,
) -> Result<()> {
    let Some(snapshot) = load_overview_snapshot(&state.updater, user_id).await else {
        bail!("overview unavailable for user '{user_id}'");
    };

    if snapshot.created {
        println!("(overview created)");
        println!();
    }
    println!("{}", format_overview_fragments(&snapshot.fragments));

    if entries > 0 {
        let log = read_change_log_entries(&state.updater, user_id.trim(), entries).await?;
        println!();
        println!("Recent change log ({}):", log.len());
        for line in log {
            println!("  {line}");
        }
    }

    if events > 0 {
        let recent = state.events.recent(user_id.trim(), events).await?;
        println!();
        println!("Recent mutations ({}):", recent.len());
        for e in recent {
            println!(
                "  {} {} {} {}#{} [{}] {}",
                e.created_at,
                e.operation.as_str(),
                e.status.as_str(),
                e.file_path,
                e.anchor.as_deref().unwrap_or("-"),
                e.entity_type.as_str(),
                e.rationale,
            );
        }
    }

    Ok(())
}
