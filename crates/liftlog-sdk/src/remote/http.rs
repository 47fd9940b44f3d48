//! HTTP 远端实现（reqwest + rustls）
//!
//! 路由：
//! - `GET   {base}/reference/{kind}`
//! - `PATCH {base}/sets/{id}` / `POST {base}/sets/batch`
//! - `POST  {base}/workout-days/{id}/complete` / `PATCH {base}/workout-days/{id}` / `PUT {base}/workout-days/{id}/sync`
//! - `GET   {base}/me/workouts`

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::{ApplyOutcome, ApplyRequest, BatchOutcome, RemoteError, RemoteService};
use crate::error::{LiftlogSDKError, Result};
use crate::sdk::RemoteConfig;
use crate::storage::entities::UserWorkoutSnapshot;
use crate::storage::queue::{FailureReason, SyncIntent};
use crate::sync::ReferenceKind;

const IDEMPOTENCY_HEADER: &str = "Idempotency-Key";

/// 批量接口的逐条结果（服务端可选返回）
#[derive(Debug, Deserialize)]
struct BatchResponse {
    #[serde(default)]
    results: Option<Vec<BatchItemResult>>,
}

#[derive(Debug, Deserialize)]
struct BatchItemResult {
    status: u16,
}

pub struct HttpRemoteService {
    client: Client,
    base_url: String,
    access_token: Option<String>,
}

impl HttpRemoteService {
    pub fn new(config: &RemoteConfig) -> Result<Self> {
        let mut builder = Client::builder();

        if let Some(timeout) = config.connect_timeout_secs {
            builder = builder.connect_timeout(Duration::from_secs(timeout));
        }

        if let Some(timeout) = config.request_timeout_secs {
            builder = builder.timeout(Duration::from_secs(timeout));
        }

        let client = builder
            .build()
            .map_err(|e| LiftlogSDKError::Other(format!("创建 HTTP 客户端失败: {}", e)))?;

        let base_url = config.base_url.trim_end_matches('/').to_string();
        info!("✅ HTTP 远端客户端已创建 (base_url: {})", base_url);

        Ok(Self {
            client,
            base_url,
            access_token: config.access_token.clone(),
        })
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        let builder = self.client.request(method, url);
        match &self.access_token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    /// 单条推送对应的 (method, path)
    fn route(intent: &SyncIntent) -> (Method, String) {
        match intent {
            SyncIntent::SetUpdate { set_id, .. } => (Method::PATCH, format!("/sets/{}", set_id)),
            SyncIntent::DayComplete { day_id, .. } => {
                (Method::POST, format!("/workout-days/{}/complete", day_id))
            }
            SyncIntent::DayUpdate { day_id, .. } => (Method::PATCH, format!("/workout-days/{}", day_id)),
            SyncIntent::DaySync { day_id, .. } => (Method::PUT, format!("/workout-days/{}/sync", day_id)),
        }
    }

    async fn get_json<T: for<'de> Deserialize<'de>>(&self, path: &str) -> std::result::Result<T, RemoteError> {
        let response = self
            .request(Method::GET, path)
            .send()
            .await
            .map_err(remote_error_from_reqwest)?;

        let status = response.status().as_u16();
        if !response.status().is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(RemoteError::Status { code: status, message });
        }

        response
            .json::<T>()
            .await
            .map_err(|e| RemoteError::Decode(e.to_string()))
    }
}

fn remote_error_from_reqwest(e: reqwest::Error) -> RemoteError {
    if e.is_timeout() {
        RemoteError::Timeout
    } else if e.is_decode() {
        RemoteError::Decode(e.to_string())
    } else {
        RemoteError::Unreachable(e.to_string())
    }
}

fn outcome_from_status(code: u16) -> ApplyOutcome {
    match FailureReason::from_status(code) {
        None => ApplyOutcome::Applied,
        Some(reason) => ApplyOutcome::failed(reason),
    }
}

#[async_trait]
impl RemoteService for HttpRemoteService {
    async fn pull(&self, kind: ReferenceKind) -> std::result::Result<Vec<serde_json::Value>, RemoteError> {
        debug!("📥 GET reference/{}", kind);
        self.get_json(&format!("/reference/{}", kind.as_str())).await
    }

    async fn apply(&self, request: &ApplyRequest) -> ApplyOutcome {
        let body = match request.intent.payload() {
            Ok(body) => body,
            Err(e) => return ApplyOutcome::Rejected(FailureReason::Malformed(e.to_string())),
        };
        let (method, path) = Self::route(&request.intent);
        debug!("📤 {} {} (entry={})", method, path, request.entry_id);

        match self
            .request(method, &path)
            .header(IDEMPOTENCY_HEADER, &request.idempotency_key)
            .json(&body)
            .send()
            .await
        {
            Ok(response) => outcome_from_status(response.status().as_u16()),
            Err(e) => ApplyOutcome::failed(remote_error_from_reqwest(e).failure_reason()),
        }
    }

    async fn apply_set_batch(&self, requests: &[ApplyRequest]) -> BatchOutcome {
        let mut items = Vec::with_capacity(requests.len());
        for request in requests {
            let mut item = match request.intent.payload() {
                Ok(serde_json::Value::Object(map)) => map,
                Ok(_) | Err(_) => {
                    return BatchOutcome::Whole(ApplyOutcome::Rejected(FailureReason::Malformed(
                        format!("entry {} payload 不是对象", request.entry_id),
                    )));
                }
            };
            item.insert("id".to_string(), request.intent.record_id().into());
            item.insert("idempotency_key".to_string(), request.idempotency_key.clone().into());
            items.push(serde_json::Value::Object(item));
        }
        debug!("📤 POST /sets/batch ({} items)", items.len());

        let response = match self
            .request(Method::POST, "/sets/batch")
            .json(&serde_json::json!({ "items": items }))
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                return BatchOutcome::Whole(ApplyOutcome::failed(
                    remote_error_from_reqwest(e).failure_reason(),
                ));
            }
        };

        let status = response.status().as_u16();
        if !response.status().is_success() {
            return BatchOutcome::Whole(outcome_from_status(status));
        }

        // 逐条结果可选；body 为空或不含 results 视为整批成功
        match response.json::<BatchResponse>().await {
            Ok(BatchResponse { results: Some(results) }) => BatchOutcome::PerItem(
                results.into_iter().map(|r| outcome_from_status(r.status)).collect(),
            ),
            Ok(BatchResponse { results: None }) => BatchOutcome::Whole(ApplyOutcome::Applied),
            Err(e) => {
                warn!("⚠️ 批量推送响应无法解析，按整批成功处理: {}", e);
                BatchOutcome::Whole(ApplyOutcome::Applied)
            }
        }
    }

    async fn pull_user_workouts(&self) -> std::result::Result<UserWorkoutSnapshot, RemoteError> {
        self.get_json("/me/workouts").await
    }
}
