mod helpers;

use std::sync::Arc;

use helpers::{digest_item, harness, Script, ScriptedSummarizer};
use mdmemory::markdown::read_section_map;
use mdmemory::memory::overview::read_change_log_entries;
use mdmemory::memory::paths::EntityRef;
use mdmemory::memory::queue::get_update;
use mdmemory::storage::StorageAdapter;
use mdmemory::summarizer::runner::digest_fingerprint;
use mdmemory::summarizer::types::{GeneratorError, SkipReason, UpdateDigest};

const OVERVIEW: &str = "users/u1/overview.md";

fn scripted(script: Vec<Script>) -> Arc<ScriptedSummarizer> {
    Arc::new(ScriptedSummarizer::new(script))
}

#[tokio::test]
async fn empty_queue_skips_without_calling_generator() {
    let generator = scripted(vec![]);
    let h = harness(Some(generator.clone()));

    let result = h
        .runner
        .summarize_pending_updates_for_user("u1", None)
        .await
        .unwrap();

    assert!(result.skipped);
    assert_eq!(result.reason, Some(SkipReason::NoUpdates));
    assert!(generator.requests().is_empty());
}

#[tokio::test]
async fn missing_summarizer_leaves_queue_untouched() {
    let h = harness(None);
    h.enqueue("u1", "s1");

    let result = h
        .runner
        .summarize_pending_updates_for_user("u1", None)
        .await
        .unwrap();

    assert_eq!(result.reason, Some(SkipReason::SummarizerMissing));
    assert_eq!(h.pending_count("u1"), 1);
    assert!(h.storage.get_text(OVERVIEW).await.unwrap().is_none());
}

#[tokio::test]
async fn generator_failures_map_to_typed_reasons() {
    let cases = vec![
        (
            Script::ModelFails(GeneratorError::MissingCredentials("no key".into())),
            SkipReason::OpenrouterMissing,
        ),
        (
            Script::ModelFails(GeneratorError::Model("bad model".into())),
            SkipReason::ModelError,
        ),
        (
            Script::Answer(Err(GeneratorError::Generation("timeout".into()))),
            SkipReason::GenerationError,
        ),
        (
            Script::Answer(Err(GeneratorError::MissingCredentials("401".into()))),
            SkipReason::OpenrouterMissing,
        ),
        (Script::Answer(Ok(None)), SkipReason::NoDigest),
    ];

    for (script, expected) in cases {
        let h = harness(Some(scripted(vec![script])));
        h.enqueue("u1", "s1");

        let result = h
            .runner
            .summarize_pending_updates_for_user("u1", None)
            .await
            .unwrap();

        assert_eq!(result.reason, Some(expected));
        assert!(result.processed_ids.is_empty());
        assert_eq!(h.pending_count("u1"), 1, "{expected} must not mark rows");
        assert!(h.events.events().is_empty(), "{expected} must not write");
    }
}

#[tokio::test]
async fn invented_ids_are_never_honored() {
    let generator = scripted(vec![Script::Answer(Ok(Some(UpdateDigest {
        digest: "Made-up progress.".into(),
        items: vec![digest_item("00000000-0000-0000-0000-000000000000", "fabricated")],
        leftover_ids: vec![],
    })))]);
    let h = harness(Some(generator));
    h.enqueue("u1", "s1");

    let result = h
        .runner
        .summarize_pending_updates_for_user("u1", None)
        .await
        .unwrap();

    assert_eq!(result.reason, Some(SkipReason::NoMatchingUpdates));
    assert_eq!(result.digest.as_deref(), Some("Made-up progress."));
    assert_eq!(h.pending_count("u1"), 1);
    assert!(h.storage.get_text(OVERVIEW).await.unwrap().is_none());
    assert!(h.events.events().is_empty());
}

#[tokio::test]
async fn successful_run_appends_one_line_and_marks_only_valid_ids() {
    let h = harness(None);
    let a = h.enqueue("u1", "s1");
    let b = h.enqueue("u1", "s2");
    let c = h.enqueue("u1", "s3");

    let generator = scripted(vec![Script::Answer(Ok(Some(UpdateDigest {
        digest: "  Two calm sessions focused on the inner critic.  ".into(),
        items: vec![
            digest_item(&a, "Session about the critic."),
            digest_item("invented", "nope"),
            digest_item(&b, "Follow-up session."),
        ],
        leftover_ids: vec![c.clone()],
    })))]);
    let runner = mdmemory::summarizer::UpdateRunner::new(
        h.queue.clone(),
        h.updater.clone(),
        Some(generator.clone()),
        25,
    );

    let result = runner
        .summarize_pending_updates_for_user("u1", None)
        .await
        .unwrap();

    assert!(!result.skipped);
    assert_eq!(result.processed_ids, vec![a.clone(), b.clone()]);
    assert_eq!(result.item_count, 2);
    assert_eq!(result.claimed, 2);
    assert_eq!(
        result.digest.as_deref(),
        Some("Two calm sessions focused on the inner critic.")
    );

    // The generator saw exactly the pending set.
    let requests = generator.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].pending.len(), 3);
    assert!(requests[0].prompt.contains("update_sync"));

    let text = h.storage.get_text(OVERVIEW).await.unwrap().unwrap();
    let log = &read_section_map(&text)["change_log"].text;
    let fp = digest_fingerprint(
        "Two calm sessions focused on the inner critic.",
        &[b.clone(), a.clone()],
    );
    assert_eq!(log.lines().count(), 2);
    assert!(log.contains(&format!(
        "Two calm sessions focused on the inner critic. [fp:{fp}]"
    )));

    let conn = h.db.lock().unwrap();
    let record = get_update(&conn, &a).unwrap().unwrap();
    assert_eq!(
        record.processed_digest.as_deref(),
        Some("Two calm sessions focused on the inner critic.")
    );
    assert_eq!(record.processed_summary.as_deref(), Some("Session about the critic."));
    assert!(get_update(&conn, &c).unwrap().unwrap().processed_at.is_none());
}

#[tokio::test]
async fn blank_digest_marks_items_without_a_change_log_line() {
    let generator = scripted(vec![Script::EchoPending {
        digest: "   ".into(),
    }]);
    let h = harness(Some(generator));
    h.enqueue("u1", "s1");

    let result = h
        .runner
        .summarize_pending_updates_for_user("u1", None)
        .await
        .unwrap();

    assert!(!result.skipped);
    assert_eq!(result.item_count, 1);
    assert!(result.digest.is_none());
    assert_eq!(h.pending_count("u1"), 0);
    assert!(h.storage.get_text(OVERVIEW).await.unwrap().is_none());
}

#[tokio::test]
async fn rerun_after_append_without_mark_does_not_duplicate_the_line() {
    let generator = scripted(vec![Script::EchoPending {
        digest: "Weekly check-in noted.".into(),
    }]);
    let h = harness(Some(generator));
    let id = h.enqueue("u1", "c1");

    // Line already written by a run that died before marking.
    let overview = h.updater.ensure_user_overview_exists("u1").await.unwrap();
    let fp = digest_fingerprint("Weekly check-in noted.", &[id.clone()]);
    h.updater
        .append_change_log_with_event(
            "u1",
            EntityRef::User,
            &overview.path,
            "Weekly check-in noted.",
            Some(&fp),
        )
        .await
        .unwrap();

    let result = h
        .runner
        .summarize_pending_updates_for_user("u1", None)
        .await
        .unwrap();
    assert_eq!(result.processed_ids, vec![id]);
    assert_eq!(h.pending_count("u1"), 0);

    let text = h.storage.get_text(OVERVIEW).await.unwrap().unwrap();
    assert_eq!(text.matches("Weekly check-in noted.").count(), 1);
}

#[tokio::test]
async fn distinct_batches_with_same_digest_each_get_a_line() {
    let generator = scripted(vec![
        Script::EchoPending {
            digest: "User checked in.".into(),
        },
        Script::EchoPending {
            digest: "User checked in.".into(),
        },
    ]);
    let h = harness(Some(generator));
    h.enqueue("u1", "c1");
    h.runner
        .summarize_pending_updates_for_user("u1", None)
        .await
        .unwrap();

    h.enqueue("u1", "c2");
    let second = h
        .runner
        .summarize_pending_updates_for_user("u1", None)
        .await
        .unwrap();
    assert!(!second.skipped);
    assert_eq!(second.item_count, 1);

    let entries = read_change_log_entries(&h.updater, "u1", 25).await.unwrap();
    let lines = entries
        .iter()
        .filter(|l| l.contains("User checked in."))
        .count();
    assert_eq!(lines, 2);
}

#[tokio::test]
async fn batch_run_covers_every_user() {
    let generator = scripted(vec![
        Script::EchoPending {
            digest: "First user digest.".into(),
        },
        Script::Answer(Err(GeneratorError::Generation("boom".into()))),
    ]);
    let h = harness(Some(generator));
    h.enqueue("alice", "s1");
    h.enqueue("bob", "s1");

    let report = h.runner.summarize_all_pending(None).await.unwrap();

    assert_eq!(report.results.len(), 2);
    assert!(report.failures.is_empty());
    assert_eq!(report.results[0].user_id, "alice");
    assert!(!report.results[0].skipped);
    assert_eq!(report.results[1].reason, Some(SkipReason::GenerationError));
    assert_eq!(report.processed_total(), 1);
    assert_eq!(h.pending_count("bob"), 1);
}
