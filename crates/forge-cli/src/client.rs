//! Thin `reqwest` client against forge-server's JSON API.
//!
//! Every endpoint responds `200 OK` with a `{code, message, detail?, data?}`
//! envelope regardless of outcome; a non-2000000-family code is surfaced as
//! `CliError::Api` rather than inspecting the HTTP status.

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::CliError;

#[derive(Debug, Deserialize)]
struct Envelope {
    code: i32,
    message: String,
    #[serde(default)]
    detail: Option<String>,
    #[serde(default)]
    data: Option<Value>,
}

const SUCCESS_FAMILY: i32 = 2_000_000;
const PARTIAL_SUCCESS: i32 = 2_060_000;

pub struct ForgeClient {
    http: reqwest::Client,
    base_url: String,
}

impl ForgeClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    async fn unwrap_envelope<T: DeserializeOwned>(&self, url: String, envelope: Envelope) -> Result<T, CliError> {
        if envelope.code != SUCCESS_FAMILY && envelope.code != PARTIAL_SUCCESS {
            return Err(CliError::Api {
                url,
                code: envelope.code,
                message: envelope.message,
                detail: envelope
                    .detail
                    .map(|d| format!(" ({d})"))
                    .unwrap_or_default(),
            });
        }
        let data = envelope.data.unwrap_or(Value::Null);
        serde_json::from_value(data).map_err(CliError::from_serde)
    }

    async fn post<B: Serialize, T: DeserializeOwned>(&self, path: &str, body: &B) -> Result<T, CliError> {
        let url = self.url(path);
        let envelope: Envelope = self.http.post(&url).json(body).send().await?.json().await?;
        self.unwrap_envelope(url, envelope).await
    }

    async fn put<B: Serialize, T: DeserializeOwned>(&self, path: &str, body: &B) -> Result<T, CliError> {
        let url = self.url(path);
        let envelope: Envelope = self.http.put(&url).json(body).send().await?.json().await?;
        self.unwrap_envelope(url, envelope).await
    }

    async fn get<T: DeserializeOwned>(&self, path: &str, query: &[(&str, String)]) -> Result<T, CliError> {
        let url = self.url(path);
        let envelope: Envelope = self
            .http
            .get(&url)
            .query(query)
            .send()
            .await?
            .json()
            .await?;
        self.unwrap_envelope(url, envelope).await
    }

    pub async fn create_batch(
        &self,
        batch_number: String,
        project_id: Uuid,
        initiator: String,
        release_notes: Option<String>,
        app_ids: Vec<Uuid>,
    ) -> Result<Value, CliError> {
        self.post(
            "/batch",
            &serde_json::json!({
                "batch_number": batch_number,
                "project_id": project_id,
                "initiator": initiator,
                "release_notes": release_notes,
                "app_ids": app_ids,
            }),
        )
        .await
    }

    pub async fn delete_batch(&self, batch_id: Uuid) -> Result<Value, CliError> {
        self.post("/batch/delete", &serde_json::json!({ "batch_id": batch_id }))
            .await
    }

    pub async fn batch_action(
        &self,
        batch_id: Uuid,
        action: String,
        operator: String,
        reason: Option<String>,
    ) -> Result<Value, CliError> {
        self.post(
            "/batch/action",
            &serde_json::json!({
                "batch_id": batch_id,
                "action": action,
                "operator": operator,
                "reason": reason,
            }),
        )
        .await
    }

    pub async fn approve_batch(&self, batch_id: Uuid, operator: String) -> Result<Value, CliError> {
        self.post(
            "/batch/approve",
            &serde_json::json!({ "batch_id": batch_id, "operator": operator }),
        )
        .await
    }

    pub async fn reject_batch(
        &self,
        batch_id: Uuid,
        operator: String,
        reason: Option<String>,
    ) -> Result<Value, CliError> {
        self.post(
            "/batch/reject",
            &serde_json::json!({ "batch_id": batch_id, "operator": operator, "reason": reason }),
        )
        .await
    }

    pub async fn get_batch(&self, id: Uuid) -> Result<Value, CliError> {
        self.get("/batch", &[("id", id.to_string())]).await
    }

    pub async fn list_batches(&self, initiator: Option<String>, keyword: Option<String>) -> Result<Value, CliError> {
        let mut query = Vec::new();
        if let Some(initiator) = initiator {
            query.push(("initiator", initiator));
        }
        if let Some(keyword) = keyword {
            query.push(("keyword", keyword));
        }
        self.get("/batches", &query).await
    }

    pub async fn update_release_app_builds(
        &self,
        batch_id: Uuid,
        selections: Vec<(Uuid, Uuid)>,
    ) -> Result<Value, CliError> {
        let selections: Vec<_> = selections
            .into_iter()
            .map(|(app_id, build_id)| serde_json::json!({ "app_id": app_id, "build_id": build_id }))
            .collect();
        self.put(
            "/batch/release_app",
            &serde_json::json!({ "batch_id": batch_id, "selections": selections }),
        )
        .await
    }

    pub async fn update_temp_deps(
        &self,
        release_app_id: Uuid,
        temp_depends_on: Option<Vec<Uuid>>,
    ) -> Result<Value, CliError> {
        self.put(
            "/release_app/temp_deps",
            &serde_json::json!({ "release_app_id": release_app_id, "temp_depends_on": temp_depends_on }),
        )
        .await
    }

    pub async fn trigger_deploy(
        &self,
        release_app_id: Uuid,
        new_build_id: Uuid,
        env: String,
    ) -> Result<Value, CliError> {
        self.post(
            "/release_app/trigger_deploy",
            &serde_json::json!({ "release_app_id": release_app_id, "new_build_id": new_build_id, "env": env }),
        )
        .await
    }

    pub async fn manual_deploy(&self, release_app_id: Uuid, env: String) -> Result<Value, CliError> {
        self.post(
            "/release_app/manual_deploy",
            &serde_json::json!({ "release_app_id": release_app_id, "env": env }),
        )
        .await
    }

    pub async fn retry_deployment(&self, deployment_id: Uuid) -> Result<Value, CliError> {
        let url = self.url(&format!("/deployment/{deployment_id}/retry"));
        let envelope: Envelope = self.http.post(&url).send().await?.json().await?;
        self.unwrap_envelope(url, envelope).await
    }
}

impl CliError {
    fn from_serde(err: serde_json::Error) -> Self {
        CliError::InvalidInput(format!("malformed server response: {err}"))
    }
}
