pub mod create_file;
pub mod enqueue_update;
pub mod preview_patch;
pub mod read_overview;
pub mod summarize_updates;
pub mod update_sync;
pub mod write_section;

use create_file::CreateFileParams;
use enqueue_update::EnqueueUpdateParams;
use preview_patch::PreviewPatchParams;
use read_overview::ReadOverviewParams;
use rmcp::handler::server::tool::ToolRouter;
use rmcp::handler::server::wrapper::Parameters;
use rmcp::{tool, tool_handler, tool_router, ServerHandler};
use summarize_updates::SummarizeUpdatesParams;
use update_sync::UpdateSyncParams;
use write_section::WriteSectionParams;

use mdmemory::markdown::content_hash;
use mdmemory::markdown::editor::{
    create_markdown_file, preview_markdown_section, resolve_user_markdown_path, NewDocument,
};
use mdmemory::markdown::SectionChange;
use mdmemory::memory::events::{log_markdown_mutation, MarkdownMutation, MutationMode};
use mdmemory::memory::overview::{
    format_overview_fragments, load_overview_snapshot, read_change_log_entries,
};
use mdmemory::memory::paths::infer_entity_ref;
use mdmemory::memory::queue::{EnqueueInput, UpdateKind};
use mdmemory::summarizer::types::pending_tool_payload;

use crate::server::AppState;

const DEFAULT_SYNC_LIMIT: usize = 20;
const MAX_SYNC_LIMIT: usize = 50;

fn section_change(replace: Option<String>, append: Option<String>) -> Result<SectionChange, String> {
    match (replace, append) {
        (Some(text), None) => Ok(SectionChange::Replace(text)),
        (None, Some(text)) => Ok(SectionChange::Append(text)),
        _ => Err("exactly one of replace or append is required".into()),
    }
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<String, String> {
    serde_json::to_string(value).map_err(|e| format!("serialization failed: {e}"))
}

/// MCP tool handler over the markdown store, the pending-update queue and
/// the summarizer runner.
#[derive(Clone)]
pub struct MemoryTools {
    tool_router: ToolRouter<Self>,
    state: AppState,
}

#[tool_router]
impl MemoryTools {
    pub fn new(state: AppState) -> Self {
        Self {
            tool_router: Self::tool_router(),
            state,
        }
    }

    #[tool(description = "Load the identity, current focus and change log sections of a user's overview, creating the overview on first use.")]
    async fn read_overview_snapshot(
        &self,
        Parameters(params): Parameters<ReadOverviewParams>,
    ) -> Result<String, String> {
        tracing::info!(user_id = %params.user_id, "read_overview_snapshot called");

        let snapshot = load_overview_snapshot(&self.state.updater, &params.user_id)
            .await
            .ok_or_else(|| "overview unavailable".to_string())?;

        let change_log = match params.change_log_limit {
            Some(limit) => Some(
                read_change_log_entries(&self.state.updater, params.user_id.trim(), limit)
                    .await
                    .map_err(|e| format!("change log read failed: {e:#}"))?,
            ),
            None => None,
        };

        Ok(serde_json::json!({
            "created": snapshot.created,
            "fragments": snapshot.fragments,
            "formatted": format_overview_fragments(&snapshot.fragments),
            "change_log": change_log,
        })
        .to_string())
    }

    #[tool(description = "Preview a section patch without writing. Returns before/after hashes, the patched document, and lint warnings.")]
    async fn preview_markdown_section_patch(
        &self,
        Parameters(params): Parameters<PreviewPatchParams>,
    ) -> Result<String, String> {
        let path = resolve_user_markdown_path(&params.user_id, &params.path).map_err(|e| e.to_string())?;
        let change = section_change(params.replace, params.append)?;

        tracing::info!(%path, anchor = %params.anchor, mode = change.mode(), "preview_markdown_section_patch called");

        let preview = preview_markdown_section(
            self.state.storage.as_ref(),
            &path,
            &params.anchor,
            &change,
        )
        .await
        .map_err(|e| format!("{e:#}"))?;

        to_json(&preview)
    }

    #[tool(description = "Replace or append one anchored section of a markdown document. Pass expected_before_hash to reject the write if the document changed since it was read.")]
    async fn write_markdown_section(
        &self,
        Parameters(params): Parameters<WriteSectionParams>,
    ) -> Result<String, String> {
        let user_id = params.user_id.trim().to_string();
        let path = resolve_user_markdown_path(&user_id, &params.path).map_err(|e| e.to_string())?;
        let change = section_change(params.replace, params.append)?;
        let entity = infer_entity_ref(&path, &user_id);

        tracing::info!(
            %user_id,
            %path,
            anchor = %params.anchor,
            mode = change.mode(),
            guarded = params.expected_before_hash.is_some(),
            "write_markdown_section called"
        );

        let outcome = self
            .state
            .updater
            .write_section_with_event(
                &user_id,
                entity,
                &path,
                &params.anchor,
                &change,
                params.expected_before_hash.as_deref(),
                params.rationale,
            )
            .await
            .map_err(|e| format!("{e:#}"))?;

        let mut json = outcome.to_json();
        json["path"] = serde_json::Value::String(path);
        Ok(json.to_string())
    }

    #[tool(description = "Create a new markdown document under the user's directory. Fails if the file already exists.")]
    async fn create_markdown_file(
        &self,
        Parameters(params): Parameters<CreateFileParams>,
    ) -> Result<String, String> {
        let user_id = params.user_id.trim().to_string();
        let path = resolve_user_markdown_path(&user_id, &params.path).map_err(|e| e.to_string())?;

        let template = match (params.content, params.template.as_deref()) {
            (Some(content), _) => NewDocument::Initial(content),
            (None, Some("overview")) => NewDocument::Overview {
                user_id: user_id.clone(),
            },
            (None, None | Some("blank")) => NewDocument::Blank,
            (None, Some(other)) => return Err(format!("unknown template: {other}")),
        };

        tracing::info!(%user_id, %path, "create_markdown_file called");

        let created = create_markdown_file(self.state.storage.as_ref(), &path, template)
            .await
            .map_err(|e| format!("{e:#}"))?;

        let text = self
            .state
            .storage
            .get_text(&path)
            .await
            .map_err(|e| format!("{e:#}"))?
            .unwrap_or_default();

        log_markdown_mutation(
            self.state.updater.events(),
            MarkdownMutation {
                user_id: user_id.clone(),
                entity: infer_entity_ref(&path, &user_id),
                file_path: path.clone(),
                anchor: None,
                mode: MutationMode::Create,
                after_hash: content_hash(&text),
                text,
                before_hash: None,
                warnings: Vec::new(),
                rationale: None,
            },
        )
        .await;

        to_json(&created)
    }

    #[tool(description = "Queue an application event for the next change-log digest. Idempotent on (user_id, kind, ref_id).")]
    async fn enqueue_memory_update(
        &self,
        Parameters(params): Parameters<EnqueueUpdateParams>,
    ) -> Result<String, String> {
        let kind: UpdateKind = params.kind.parse().map_err(|e: String| e)?;

        tracing::info!(user_id = %params.user_id, kind = %params.kind, ref_id = %params.ref_id, "enqueue_memory_update called");

        let result = self
            .state
            .queue
            .enqueue(EnqueueInput {
                user_id: params.user_id,
                kind,
                ref_id: params.ref_id,
                payload: params.payload,
                metadata: params.metadata,
            })
            .await
            .map_err(|e| format!("{e:#}"))?;

        to_json(&result)
    }

    #[tool(description = "List a user's pending (not yet summarized) memory updates, oldest first.")]
    async fn update_sync(
        &self,
        Parameters(params): Parameters<UpdateSyncParams>,
    ) -> Result<String, String> {
        let limit = params
            .limit
            .unwrap_or(DEFAULT_SYNC_LIMIT)
            .clamp(1, MAX_SYNC_LIMIT);

        let pending = self
            .state
            .queue
            .fetch_pending(&params.user_id, limit)
            .await
            .map_err(|e| format!("{e:#}"))?;

        Ok(pending_tool_payload(&pending, limit).to_string())
    }

    #[tool(description = "Fold pending updates into a change-log digest for one user, or for every user with pending updates.")]
    async fn summarize_pending_updates(
        &self,
        Parameters(params): Parameters<SummarizeUpdatesParams>,
    ) -> Result<String, String> {
        match params.user_id {
            Some(user_id) => {
                let result = self
                    .state
                    .runner
                    .summarize_pending_updates_for_user(user_id.trim(), params.limit)
                    .await
                    .map_err(|e| format!("{e:#}"))?;
                to_json(&result)
            }
            None => {
                let report = self
                    .state
                    .runner
                    .summarize_all_pending(params.limit)
                    .await
                    .map_err(|e| format!("{e:#}"))?;
                to_json(&report)
            }
        }
    }
}

#[tool_handler]
impl ServerHandler for MemoryTools {
    fn get_info(&self) -> rmcp::model::ServerInfo {
        rmcp::model::ServerInfo {
            instructions: Some(
                "mdmemory keeps per-user markdown memory documents. Use read_overview_snapshot \
                 for context, preview_markdown_section_patch and write_markdown_section to edit \
                 anchored sections, and enqueue_memory_update to queue events for the change log."
                    .into(),
            ),
            capabilities: rmcp::model::ServerCapabilities::builder()
                .enable_tools()
                .build(),
            ..Default::default()
        }
    }
}
