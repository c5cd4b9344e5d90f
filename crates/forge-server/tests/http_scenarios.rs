//! End-to-end scenarios driving the HTTP surface against
//! the in-memory store. Reference data (projects/repos/apps/builds) is
//! seeded directly on the store - that CRUD layer is owned by an external
//! system in the real deployment and is out of scope for the HTTP surface.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;

use axum::body::{to_bytes, Body};
use axum::http::{Method, Request, StatusCode};
use forge_core::config::EngineConfig;
use forge_core::dispatcher::{DeployDriver, DeploySpec, DriverOutcome, SimulatedDriver};
use forge_core::domain::{AppEnvConfig, Application, Project, Repository};
use forge_core::store::Store;
use forge_server::{router, AppState};
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

async fn send(state: &AppState, method: Method, uri: &str, body: Option<Value>) -> Value {
    let body = match body {
        Some(v) => Body::from(serde_json::to_vec(&v).unwrap()),
        None => Body::empty(),
    };
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(body)
        .unwrap();
    let response = router(state.clone()).oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

/// Seeds a project allowing `pre`/`c-pre` and `prod`/`c-prod`, a repository,
/// and `n` applications (each with a `pre` and `prod` env-config), wired to
/// that project/repository. Returns `(project_id, repo_id, app_ids)`.
async fn seed_project_and_apps(state: &AppState, n: usize) -> (Uuid, Uuid, Vec<Uuid>) {
    let project_id = Uuid::new_v4();
    let mut allowed = BTreeMap::new();
    allowed.insert("pre".to_string(), BTreeSet::from(["c-pre".to_string()]));
    allowed.insert("prod".to_string(), BTreeSet::from(["c-prod".to_string()]));
    let project = Project {
        id: project_id,
        name: "P1".to_string(),
        allowed_env_clusters: allowed.clone(),
        default_env_clusters: allowed,
        require_approval_to_seal: false,
        lifecycle_envs: ["pre".to_string(), "prod".to_string()],
    };
    state.store.put_project(project).await;

    let repo_id = Uuid::new_v4();
    let repo = Repository {
        id: repo_id,
        namespace: "acme".to_string(),
        name: "widgets".to_string(),
        git_type: "git".to_string(),
        project_id: Some(project_id),
        team_id: None,
    };
    state.store.put_repository(repo).await;

    let mut app_ids = Vec::with_capacity(n);
    for i in 0..n {
        let app_id = Uuid::new_v4();
        let app = Application {
            id: app_id,
            name: format!("A{}", i + 1),
            project_id,
            repo_id,
            app_type: "service".to_string(),
            team_id: None,
            deployed_tag: None,
            default_depends_on: Vec::new(),
            env_configs: vec![
                AppEnvConfig {
                    id: Uuid::new_v4(),
                    app_id,
                    env: "pre".to_string(),
                    cluster: "c-pre".to_string(),
                    replicas: 1,
                    deployment_name_override: None,
                },
                AppEnvConfig {
                    id: Uuid::new_v4(),
                    app_id,
                    env: "prod".to_string(),
                    cluster: "c-prod".to_string(),
                    replicas: 1,
                    deployment_name_override: None,
                },
            ],
        };
        state.store.put_application(app).await;
        app_ids.push(app_id);
    }
    (project_id, repo_id, app_ids)
}

/// Seeds a success build for `app_id` via the raw webhook path, so the
/// `BuildIngestor` pipeline (not a store shortcut) is what produces it.
async fn seed_success_build(state: &AppState, app_name: &str, build_number: i64, image_tag: &str) -> Value {
    let payload = json!({
        "repo_namespace": "acme",
        "repo_name": "widgets",
        "build_number": build_number,
        "build_status": "success",
        "build_created": 1_700_000_000i64,
        "build_started": 1_700_000_001i64,
        "build_finished": 1_700_000_002i64,
        "build_event": "tag",
        "commit_author": "bob",
        "commit_ref": "refs/tags/v1",
        "commit_id": "abc123",
        "commit_branch": "main",
        "commit_after": "abc123",
        "apps": [{ "name": app_name, "image_tag": image_tag }],
    });
    send(state, Method::POST, "/webhook/build", Some(payload)).await
}

fn data(envelope: &Value) -> &Value {
    &envelope["data"]
}

/// Drains the dispatcher until it stops claiming work, or `max_cycles` is
/// reached (the in-memory driver is synchronous, so one call per pending
/// batch of work is enough in practice).
async fn drain_dispatcher(state: &AppState, max_cycles: usize) {
    for _ in 0..max_cycles {
        if state.dispatcher.run_once().await == 0 {
            // one more cycle in case a retry just got re-armed
            tokio::time::sleep(Duration::from_millis(5)).await;
            if state.dispatcher.run_once().await == 0 {
                return;
            }
        }
    }
}

#[tokio::test]
async fn full_lifecycle_happy_path_single_app() {
    let state = AppState::new(EngineConfig::default());
    let (project_id, _repo_id, app_ids) = seed_project_and_apps(&state, 1).await;
    let a1 = app_ids[0];

    let create_resp = send(
        &state,
        Method::POST,
        "/batch",
        Some(json!({
            "batch_number": "BN-001",
            "project_id": project_id,
            "initiator": "alice",
            "app_ids": [a1],
        })),
    )
    .await;
    assert_eq!(create_resp["code"], 2_000_000);
    let batch_id: Uuid = serde_json::from_value(data(&create_resp)["id"].clone()).unwrap();

    // Build lands on the live (Draft) release app via onNewBuild.
    let build_resp = seed_success_build(&state, "A1", 1, "v1").await;
    assert_eq!(build_resp["code"], 2_000_000);

    let approve_resp = send(
        &state,
        Method::POST,
        "/batch/approve",
        Some(json!({ "batch_id": batch_id, "operator": "alice" })),
    )
    .await;
    assert_eq!(approve_resp["code"], 2_000_000);

    let seal_resp = send(
        &state,
        Method::POST,
        "/batch/action",
        Some(json!({ "batch_id": batch_id, "action": "seal", "operator": "alice" })),
    )
    .await;
    assert_eq!(seal_resp["code"], 2_000_000, "{seal_resp:?}");

    let release_apps = send(&state, Method::GET, &format!("/batch?id={batch_id}"), None).await;
    let ra = &data(&release_apps)["release_apps"][0];
    assert_eq!(ra["previous_deployed_tag"], Value::Null);
    assert_eq!(ra["target_tag"], "v1");

    let deployments = state.store.list_deployments_for_batch(batch_id).await;
    assert_eq!(deployments.len(), 2, "one pre + one prod deployment");

    let start_pre = send(
        &state,
        Method::POST,
        "/batch/action",
        Some(json!({ "batch_id": batch_id, "action": "start_pre_deploy", "operator": "alice" })),
    )
    .await;
    assert_eq!(start_pre["code"], 2_000_000, "{start_pre:?}");

    drain_dispatcher(&state, 5).await;

    let finish_pre = send(
        &state,
        Method::POST,
        "/batch/action",
        Some(json!({ "batch_id": batch_id, "action": "finish_pre_deploy", "operator": "alice" })),
    )
    .await;
    assert_eq!(finish_pre["code"], 2_000_000, "{finish_pre:?}");

    let start_prod = send(
        &state,
        Method::POST,
        "/batch/action",
        Some(json!({ "batch_id": batch_id, "action": "start_prod_deploy", "operator": "alice" })),
    )
    .await;
    assert_eq!(start_prod["code"], 2_000_000, "{start_prod:?}");

    drain_dispatcher(&state, 5).await;

    let finish_prod = send(
        &state,
        Method::POST,
        "/batch/action",
        Some(json!({ "batch_id": batch_id, "action": "finish_prod_deploy", "operator": "alice" })),
    )
    .await;
    assert_eq!(finish_prod["code"], 2_000_000, "{finish_prod:?}");

    let complete = send(
        &state,
        Method::POST,
        "/batch/action",
        Some(json!({ "batch_id": batch_id, "action": "complete", "operator": "alice" })),
    )
    .await;
    assert_eq!(complete["code"], 2_000_000, "{complete:?}");
    assert_eq!(data(&complete)["status"], "completed");
}

#[tokio::test]
async fn create_batch_rejects_app_already_live_elsewhere() {
    let state = AppState::new(EngineConfig::default());
    let (project_id, _repo_id, app_ids) = seed_project_and_apps(&state, 1).await;
    let a1 = app_ids[0];

    let create_resp = send(
        &state,
        Method::POST,
        "/batch",
        Some(json!({ "batch_number": "BN-001", "project_id": project_id, "initiator": "alice", "app_ids": [a1] })),
    )
    .await;
    let batch_id: Uuid = serde_json::from_value(data(&create_resp)["id"].clone()).unwrap();
    seed_success_build(&state, "A1", 1, "v1").await;
    send(
        &state,
        Method::POST,
        "/batch/action",
        Some(json!({ "batch_id": batch_id, "action": "seal", "operator": "alice" })),
    )
    .await;

    let conflict_resp = send(
        &state,
        Method::POST,
        "/batch",
        Some(json!({ "batch_number": "BN-002", "project_id": project_id, "initiator": "bob", "app_ids": [a1] })),
    )
    .await;
    assert_eq!(conflict_resp["code"], 4_009_000, "{conflict_resp:?}");
    let conflicts = &data(&conflict_resp)["conflicts"][0];
    assert_eq!(conflicts["app_id"], a1.to_string());
    assert_eq!(conflicts["batch_number"], "BN-001");
}

#[tokio::test]
async fn dependency_gating_blocks_dependent_until_upstream_deployed() {
    let state = AppState::new(EngineConfig::default());
    let (project_id, _repo_id, app_ids) = seed_project_and_apps(&state, 2).await;
    let (a1, a2) = (app_ids[0], app_ids[1]);

    // A2 depends on A1.
    let mut app2 = state.store.get_application(a2).await.unwrap();
    app2.default_depends_on = vec![a1];
    state.store.put_application(app2).await;

    let create_resp = send(
        &state,
        Method::POST,
        "/batch",
        Some(json!({ "batch_number": "BN-003", "project_id": project_id, "initiator": "alice", "app_ids": [a1, a2] })),
    )
    .await;
    let batch_id: Uuid = serde_json::from_value(data(&create_resp)["id"].clone()).unwrap();
    seed_success_build(&state, "A1", 1, "v1").await;
    seed_success_build(&state, "A2", 1, "v1").await;
    send(
        &state,
        Method::POST,
        "/batch/action",
        Some(json!({ "batch_id": batch_id, "action": "seal", "operator": "alice" })),
    )
    .await;
    send(
        &state,
        Method::POST,
        "/batch/action",
        Some(json!({ "batch_id": batch_id, "action": "start_pre_deploy", "operator": "alice" })),
    )
    .await;

    // Only A1's pre deployment should be claimable on the first cycle.
    let processed_first = state.dispatcher.run_once().await;
    assert_eq!(processed_first, 1, "only A1 should be dispatchable before it deploys");

    drain_dispatcher(&state, 5).await;

    let release_apps = state.store.list_release_apps(batch_id).await;
    let ra2 = release_apps.iter().find(|ra| ra.app_id == a2).unwrap();
    assert_eq!(
        ra2.status,
        forge_core::domain::ReleaseAppStatus::PreDeployed,
        "A2 should have become eligible and proceeded once A1 finished"
    );
}

#[tokio::test]
async fn seal_rejects_temp_dep_cycle() {
    let state = AppState::new(EngineConfig::default());
    let (project_id, _repo_id, app_ids) = seed_project_and_apps(&state, 2).await;
    let (a1, a2) = (app_ids[0], app_ids[1]);

    let create_resp = send(
        &state,
        Method::POST,
        "/batch",
        Some(json!({ "batch_number": "BN-004", "project_id": project_id, "initiator": "alice", "app_ids": [a1, a2] })),
    )
    .await;
    let batch_id: Uuid = serde_json::from_value(data(&create_resp)["id"].clone()).unwrap();
    seed_success_build(&state, "A1", 1, "v1").await;
    seed_success_build(&state, "A2", 1, "v1").await;

    let release_apps = state.store.list_release_apps(batch_id).await;
    let ra1 = release_apps.iter().find(|ra| ra.app_id == a1).unwrap();
    let ra2 = release_apps.iter().find(|ra| ra.app_id == a2).unwrap();

    send(
        &state,
        Method::PUT,
        "/release_app/temp_deps",
        Some(json!({ "release_app_id": ra1.id, "temp_depends_on": [a2] })),
    )
    .await;
    send(
        &state,
        Method::PUT,
        "/release_app/temp_deps",
        Some(json!({ "release_app_id": ra2.id, "temp_depends_on": [a1] })),
    )
    .await;

    let seal_resp = send(
        &state,
        Method::POST,
        "/batch/action",
        Some(json!({ "batch_id": batch_id, "action": "seal", "operator": "alice" })),
    )
    .await;
    assert_eq!(seal_resp["code"], 4_000_000, "{seal_resp:?}");
}

#[tokio::test]
async fn build_upsert_updates_target_tag_before_seal_only() {
    let state = AppState::new(EngineConfig::default());
    let (project_id, _repo_id, app_ids) = seed_project_and_apps(&state, 1).await;
    let a1 = app_ids[0];

    let create_resp = send(
        &state,
        Method::POST,
        "/batch",
        Some(json!({ "batch_number": "BN-005", "project_id": project_id, "initiator": "alice", "app_ids": [a1] })),
    )
    .await;
    let batch_id: Uuid = serde_json::from_value(data(&create_resp)["id"].clone()).unwrap();

    seed_success_build(&state, "A1", 1, "v1").await;
    seed_success_build(&state, "A1", 2, "v2").await;
    let release_apps = state.store.list_release_apps(batch_id).await;
    assert_eq!(release_apps[0].target_tag.as_deref(), Some("v2"));

    send(
        &state,
        Method::POST,
        "/batch/action",
        Some(json!({ "batch_id": batch_id, "action": "seal", "operator": "alice" })),
    )
    .await;

    seed_success_build(&state, "A1", 3, "v3").await;
    let release_apps = state.store.list_release_apps(batch_id).await;
    assert_eq!(
        release_apps[0].target_tag.as_deref(),
        Some("v2"),
        "target_tag stays at the sealed build once locked"
    );
    assert!(release_apps[0].latest_build_id.is_some());
}

struct FlakyDriver {
    fail_calls: std::sync::atomic::AtomicUsize,
    fail_until: usize,
}

#[async_trait::async_trait]
impl DeployDriver for FlakyDriver {
    async fn apply(&self, spec: &DeploySpec) -> DriverOutcome {
        let call = self.fail_calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        if call < self.fail_until {
            DriverOutcome::Transient(format!("flaky failure #{call} for {}", spec.deployment_name))
        } else {
            DriverOutcome::Success
        }
    }
}

#[tokio::test]
async fn dispatcher_retries_transient_failure_then_succeeds() {
    let mut engine_config = EngineConfig::default();
    engine_config.retry.default_max_retry_count = 3;
    engine_config.retry.base_delay_ms = 1;
    engine_config.retry.max_delay_ms = 2;

    let driver: Arc<dyn DeployDriver> = Arc::new(FlakyDriver {
        fail_calls: std::sync::atomic::AtomicUsize::new(0),
        fail_until: 2,
    });
    let state = AppState::with_driver(engine_config, driver);
    let (project_id, _repo_id, app_ids) = seed_project_and_apps(&state, 1).await;
    let a1 = app_ids[0];

    let create_resp = send(
        &state,
        Method::POST,
        "/batch",
        Some(json!({ "batch_number": "BN-006", "project_id": project_id, "initiator": "alice", "app_ids": [a1] })),
    )
    .await;
    let batch_id: Uuid = serde_json::from_value(data(&create_resp)["id"].clone()).unwrap();
    seed_success_build(&state, "A1", 1, "v1").await;
    send(
        &state,
        Method::POST,
        "/batch/action",
        Some(json!({ "batch_id": batch_id, "action": "seal", "operator": "alice" })),
    )
    .await;
    send(
        &state,
        Method::POST,
        "/batch/action",
        Some(json!({ "batch_id": batch_id, "action": "start_pre_deploy", "operator": "alice" })),
    )
    .await;

    let deployments = state.store.list_deployments_for_batch(batch_id).await;
    let pre_deployment = deployments.iter().find(|d| d.env == "pre").unwrap().clone();

    // Attempt 1: transient failure, retryCount -> 1, stays pending.
    state.dispatcher.run_once().await;
    tokio::time::sleep(Duration::from_millis(20)).await;
    let after_first = state.store.get_deployment(pre_deployment.id).await.unwrap();
    assert_eq!(after_first.retry_count, 1);
    assert_eq!(after_first.status, forge_core::domain::DeploymentStatus::Pending);

    // Attempt 2: transient failure, retryCount -> 2, still pending (maxRetryCount=3).
    state.dispatcher.run_once().await;
    tokio::time::sleep(Duration::from_millis(20)).await;
    let after_second = state.store.get_deployment(pre_deployment.id).await.unwrap();
    assert_eq!(after_second.retry_count, 2);
    assert_eq!(after_second.status, forge_core::domain::DeploymentStatus::Pending);

    // Attempt 3: succeeds.
    state.dispatcher.run_once().await;
    let after_third = state.store.get_deployment(pre_deployment.id).await.unwrap();
    assert_eq!(after_third.status, forge_core::domain::DeploymentStatus::Success);
}

#[tokio::test]
async fn dispatcher_exhausts_retries_then_manual_retry_recovers() {
    let mut engine_config = EngineConfig::default();
    engine_config.retry.default_max_retry_count = 2;
    engine_config.retry.base_delay_ms = 1;
    engine_config.retry.max_delay_ms = 2;

    struct AlwaysFails;
    #[async_trait::async_trait]
    impl DeployDriver for AlwaysFails {
        async fn apply(&self, spec: &DeploySpec) -> DriverOutcome {
            DriverOutcome::Transient(format!("permanent-ish failure for {}", spec.deployment_name))
        }
    }

    let state = AppState::with_driver(engine_config, Arc::new(AlwaysFails));
    let (project_id, _repo_id, app_ids) = seed_project_and_apps(&state, 1).await;
    let a1 = app_ids[0];

    let create_resp = send(
        &state,
        Method::POST,
        "/batch",
        Some(json!({ "batch_number": "BN-007", "project_id": project_id, "initiator": "alice", "app_ids": [a1] })),
    )
    .await;
    let batch_id: Uuid = serde_json::from_value(data(&create_resp)["id"].clone()).unwrap();
    seed_success_build(&state, "A1", 1, "v1").await;
    send(
        &state,
        Method::POST,
        "/batch/action",
        Some(json!({ "batch_id": batch_id, "action": "seal", "operator": "alice" })),
    )
    .await;
    send(
        &state,
        Method::POST,
        "/batch/action",
        Some(json!({ "batch_id": batch_id, "action": "start_pre_deploy", "operator": "alice" })),
    )
    .await;

    let deployments = state.store.list_deployments_for_batch(batch_id).await;
    let pre_deployment = deployments.iter().find(|d| d.env == "pre").unwrap().clone();

    state.dispatcher.run_once().await; // attempt 1: pending, retry_count=1
    tokio::time::sleep(Duration::from_millis(20)).await;
    state.dispatcher.run_once().await; // attempt 2: exhausted (maxRetryCount=2), status=failed

    let failed = state.store.get_deployment(pre_deployment.id).await.unwrap();
    assert_eq!(failed.status, forge_core::domain::DeploymentStatus::Failed);

    let retry_resp = send(
        &state,
        Method::POST,
        &format!("/deployment/{}/retry", pre_deployment.id),
        None,
    )
    .await;
    assert_eq!(retry_resp["code"], 2_000_000, "{retry_resp:?}");
    let reset = state.store.get_deployment(pre_deployment.id).await.unwrap();
    assert_eq!(reset.status, forge_core::domain::DeploymentStatus::Pending);
}
