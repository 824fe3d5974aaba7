//! CLI `doctor` command: database diagnostics plus storage and summarizer checks.

use anyhow::{Context, Result};

use mdmemory::config::MemoryConfig;
use mdmemory::db;
use mdmemory::storage;

/// Run diagnostics and print a health report.
pub async fn doctor(config: &MemoryConfig) -> Result<()> {
    let db_path = config.resolved_db_path();

    println!("mdmemory Health Report");
    println!("======================");
    println!();

    if !db_path.exists() {
        println!("Database: not found at {}", db_path.display());
        println!("Run `mdmemory serve` or `mdmemory enqueue` to initialize.");
    } else {
        let file_size = std::fs::metadata(&db_path).map(|m| m.len()).unwrap_or(0);
        let conn = db::open_database(&db_path)
            .context("failed to open database (may be corrupt)")?;
        let report = db::check_database_health(&conn).context("failed to run health check")?;

        println!("Database:          {}", db_path.display());
        println!("File size:         {}", format_bytes(file_size));
        println!("Schema version:    {}", report.schema_version);
        println!(
            "Hash format:       {}",
            report.hash_format.as_deref().unwrap_or("(not set)")
        );
        println!();
        println!("Row counts:");
        println!("  Pending updates:   {}", report.pending_updates);
        println!("  Processed updates: {}", report.processed_updates);
        println!("  Mutation events:   {}", report.event_count);
        println!();
        if report.integrity_ok {
            println!("Integrity check:   PASSED");
        } else {
            println!("Integrity check:   FAILED ({})", report.integrity_details);
            println!();
            println!("Recovery steps:");
            println!("  1. Restore from a backup: cp backup.db {}", db_path.display());
            println!("  2. Pending updates can be re-enqueued; enqueue is idempotent.");
        }
    }

    println!();
    match storage::create_adapter(config) {
        Ok(adapter) => match adapter.list("users/").await {
            Ok(paths) => println!(
                "Storage:           {} ({} documents)",
                adapter.backend(),
                paths.len()
            ),
            Err(e) => println!("Storage:           {} (unreachable: {e:#})", adapter.backend()),
        },
        Err(e) => println!("Storage:           misconfigured ({e:#})"),
    }

    let key_set = std::env::var(&config.summarizer.api_key_env)
        .map(|k| !k.trim().is_empty())
        .unwrap_or(false);
    println!(
        "Summarizer:        {} via {} ({}, {} {})",
        if config.summarizer.enabled { "enabled" } else { "disabled" },
        config.summarizer.provider,
        config.summarizer.model,
        config.summarizer.api_key_env,
        if key_set { "set" } else { "missing" }
    );

    Ok(())
}

fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{bytes} B")
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}
