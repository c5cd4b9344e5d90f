//! BuildIngestor - normalizes CI build notifications, writes `Build`
//! rows, and fans out to any live release app for the affected application.

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use serde::Deserialize;
use uuid::Uuid;

use crate::domain::{BuildEvent, BuildStatus};
use crate::error::CoreError;
use crate::lifecycle;
use crate::store::{NormalizedBuild, Store};

/// Raw CI webhook payload. Field names mirror what CI
/// platforms actually send (Drone-compatible aliases included); the
/// ingestor is responsible for reconciling them, not the HTTP layer.
#[derive(Debug, Clone, Deserialize)]
pub struct BuildNotification {
    pub repo: Option<String>,
    pub repo_namespace: Option<String>,
    pub repo_owner: Option<String>,
    pub repo_name: String,
    pub build_number: i64,
    pub build_status: String,
    pub build_created: i64,
    pub build_started: i64,
    pub build_finished: i64,
    pub build_link: Option<String>,
    pub build_event: String,
    pub git_author_name: Option<String>,
    pub commit_author: Option<String>,
    pub commit_author_name: Option<String>,
    pub commit_ref: String,
    pub commit_id: String,
    pub commit_branch: Option<String>,
    pub commit_after: String,
    pub apps: Vec<BuildApp>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BuildApp {
    pub name: String,
    pub image_tag: String,
    pub image: Option<String>,
    #[serde(default = "default_true")]
    pub build_success: bool,
}

fn default_true() -> bool {
    true
}

/// Outcome of one `ingest` call: per-app success/skip bookkeeping so the
/// HTTP layer can render `PartialSuccess`.
#[derive(Debug, Default)]
pub struct IngestReport {
    pub succeeded: Vec<Uuid>,
    pub skipped: Vec<String>,
}

impl IngestReport {
    pub fn is_partial(&self) -> bool {
        !self.succeeded.is_empty() && !self.skipped.is_empty()
    }
}

pub struct BuildIngestor {
    store: Arc<dyn Store>,
}

impl BuildIngestor {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    pub async fn ingest(&self, notif: BuildNotification) -> Result<IngestReport, CoreError> {
        let (namespace, name) = resolve_repo_identity(&notif);
        let repo = self
            .store
            .get_repository_by_namespace_name(&namespace, &name)
            .await
            .ok_or_else(|| CoreError::NotFound(format!("repository {namespace}/{name}")))?;

        let build_status = parse_build_status(&notif.build_status);
        let build_event = parse_build_event(&notif.build_event);
        let commit_author = first_non_empty(&[
            notif.commit_author_name.as_deref(),
            notif.commit_author.as_deref(),
            notif.git_author_name.as_deref(),
        ]);

        let build_created = to_datetime(notif.build_created);
        let build_started = to_datetime(notif.build_started);
        let build_finished = to_datetime(notif.build_finished);

        let mut report = IngestReport::default();
        for app_entry in &notif.apps {
            let Some(app) = self
                .store
                .get_application_by_repo_and_name(repo.id, &app_entry.name)
                .await
            else {
                report.skipped.push(app_entry.name.clone());
                continue;
            };

            let status = if app_entry.build_success {
                build_status
            } else {
                BuildStatus::Failure
            };

            let normalized = NormalizedBuild {
                repo_id: repo.id,
                app_id: app.id,
                build_number: notif.build_number,
                build_status: status,
                build_event,
                commit_sha: notif.commit_id.clone(),
                commit_ref: notif.commit_ref.clone(),
                commit_branch: notif.commit_branch.clone().unwrap_or_default(),
                commit_author: commit_author.clone(),
                image_tag: app_entry.image_tag.clone(),
                image_url: app_entry.image.clone(),
                build_created,
                build_started,
                build_finished,
            };

            let (build, _inserted) = self.store.upsert_build(normalized).await?;
            lifecycle::on_new_build(self.store.as_ref(), app.id, &build).await?;
            report.succeeded.push(app.id);
        }

        if report.succeeded.is_empty() {
            return Err(CoreError::BadRequest(format!(
                "no known application matched any of: {:?}",
                report.skipped
            )));
        }
        Ok(report)
    }
}

fn resolve_repo_identity(notif: &BuildNotification) -> (String, String) {
    let namespace = notif
        .repo_namespace
        .clone()
        .or_else(|| notif.repo_owner.clone())
        .or_else(|| notif.repo.as_deref().and_then(|r| r.split('/').next().map(str::to_string)))
        .unwrap_or_default();
    let name = if !notif.repo_name.is_empty() {
        notif.repo_name.clone()
    } else {
        notif
            .repo
            .as_deref()
            .and_then(|r| r.split('/').nth(1))
            .unwrap_or_default()
            .to_string()
    };
    (namespace, name)
}

fn first_non_empty(candidates: &[Option<&str>]) -> String {
    candidates
        .iter()
        .filter_map(|c| *c)
        .find(|s| !s.is_empty())
        .unwrap_or("")
        .to_string()
}

fn to_datetime(unix_seconds: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(unix_seconds, 0).single().unwrap_or_else(Utc::now)
}

fn parse_build_status(raw: &str) -> BuildStatus {
    match raw {
        "success" => BuildStatus::Success,
        "error" => BuildStatus::Error,
        "killed" => BuildStatus::Killed,
        _ => BuildStatus::Failure,
    }
}

fn parse_build_event(raw: &str) -> BuildEvent {
    match raw {
        "tag" => BuildEvent::Tag,
        "pull_request" => BuildEvent::PullRequest,
        "promote" => BuildEvent::Promote,
        "rollback" => BuildEvent::Rollback,
        _ => BuildEvent::Push,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_repo_identity_from_combined_field() {
        let notif = BuildNotification {
            repo: Some("acme/widgets".into()),
            repo_namespace: None,
            repo_owner: None,
            repo_name: String::new(),
            build_number: 1,
            build_status: "success".into(),
            build_created: 0,
            build_started: 0,
            build_finished: 0,
            build_link: None,
            build_event: "push".into(),
            git_author_name: None,
            commit_author: None,
            commit_author_name: None,
            commit_ref: "refs/tags/v1".into(),
            commit_id: "abc".into(),
            commit_branch: None,
            commit_after: "abc".into(),
            apps: vec![],
        };
        assert_eq!(resolve_repo_identity(&notif), ("acme".into(), "widgets".into()));
    }

    #[test]
    fn first_non_empty_skips_blank_candidates() {
        assert_eq!(first_non_empty(&[Some(""), Some("bob"), None]), "bob");
    }

    #[test]
    fn unknown_build_status_falls_back_to_failure() {
        assert_eq!(parse_build_status("weird"), BuildStatus::Failure);
    }
}
