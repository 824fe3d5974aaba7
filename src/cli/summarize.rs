//! CLI `summarize` command.

use anyhow::Result;

use crate::server::AppState;

/// Run the summarizer for one user or for all users with pending updates.
pub async fn summarize(state: &AppState, user_id: Option<&str>, limit: Option<usize>) -> Result<()> {
    match user_id {
        Some(user_id) => {
            let result = state
                .runner
                .summarize_pending_updates_for_user(user_id, limit)
                .await?;
            match result.reason {
                Some(reason) => println!("{user_id}: skipped ({reason})"),
                None => println!(
                    "{user_id}: processed {} update(s), claimed {}",
                    result.item_count, result.claimed
                ),
            }
            if let Some(digest) = &result.digest {
                println!("  digest: {digest}");
            }
        }
        None => {
            let report = state.runner.summarize_all_pending(limit).await?;
            for result in &report.results {
                match result.reason {
                    Some(reason) => println!("{}: skipped ({reason})", result.user_id),
                    None => println!("{}: processed {}", result.user_id, result.item_count),
                }
            }
            for failure in &report.failures {
                println!("{}: FAILED ({})", failure.user_id, failure.error);
            }
            println!(
                "Done: {} user(s), {} update(s) processed, {} failure(s)",
                report.results.len(),
                report.processed_total(),
                report.failures.len()
            );
        }
    }
    Ok(())
}
