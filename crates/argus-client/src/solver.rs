use std::time::Duration;

use argus_core::error::AppError;
use argus_core::traits::{ChallengeSolver, TaskId, TaskStatus};
use reqwest::Client;
use serde::{Deserialize, Serialize};

const DEFAULT_BASE_URL: &str = "https://api.rucaptcha.com";
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);
const SOFTWARE_ID: u32 = 3898;
const TASK_TYPE: &str = "RecaptchaV2TaskProxyless";

/// Client for the RuCaptcha `createTask` / `getTaskResult` JSON API.
///
/// Also works against any 2Captcha-compatible endpoint via
/// [`with_base_url`](Self::with_base_url).
#[derive(Clone)]
pub struct RuCaptchaSolver {
    client: Client,
    base_url: String,
    client_key: String,
    timeout_secs: u64,
}

impl RuCaptchaSolver {
    pub fn new(client_key: &str) -> Result<Self, AppError> {
        Self::with_base_url(client_key, DEFAULT_BASE_URL)
    }

    pub fn with_base_url(client_key: &str, base_url: &str) -> Result<Self, AppError> {
        Self::build(client_key, base_url, DEFAULT_HTTP_TIMEOUT)
    }

    pub fn with_timeout(self, timeout: Duration) -> Result<Self, AppError> {
        Self::build(&self.client_key, &self.base_url, timeout)
    }

    fn build(client_key: &str, base_url: &str, timeout: Duration) -> Result<Self, AppError> {
        if client_key.trim().is_empty() {
            return Err(AppError::ConfigError("solver client key is empty".into()));
        }
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::HttpError(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            client_key: client_key.to_string(),
            timeout_secs: timeout.as_secs(),
        })
    }

    async fn post<B: Serialize, T: for<'de> Deserialize<'de>>(
        &self,
        method: &str,
        body: &B,
    ) -> Result<T, AppError> {
        let url = format!("{}/{method}", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    AppError::Timeout(self.timeout_secs)
                } else if e.is_connect() {
                    AppError::NetworkError(format!("Connection failed: {e}"))
                } else {
                    AppError::HttpError(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::HttpError(format!(
                "{method} returned HTTP {}: {body}",
                status.as_u16()
            )));
        }

        response
            .json()
            .await
            .map_err(|e| AppError::HttpError(format!("Failed to parse {method} response: {e}")))
    }
}

// ---- RuCaptcha API types ----

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateTaskRequest<'a> {
    client_key: &'a str,
    task: RecaptchaTask<'a>,
    soft_id: u32,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RecaptchaTask<'a> {
    #[serde(rename = "type")]
    task_type: &'a str,
    #[serde(rename = "websiteURL")]
    website_url: &'a str,
    website_key: &'a str,
    is_invisible: bool,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateTaskResponse {
    #[serde(default)]
    error_id: i64,
    error_code: Option<String>,
    error_description: Option<String>,
    task_id: Option<serde_json::Value>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TaskResultRequest<'a> {
    client_key: &'a str,
    task_id: &'a serde_json::Value,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TaskResultResponse {
    #[serde(default)]
    error_id: i64,
    error_code: Option<String>,
    error_description: Option<String>,
    status: Option<String>,
    solution: Option<Solution>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Solution {
    g_recaptcha_response: String,
}

fn describe(code: Option<String>, description: Option<String>) -> String {
    match (code, description) {
        (Some(code), Some(desc)) => format!("{code}: {desc}"),
        (Some(s), None) | (None, Some(s)) => s,
        (None, None) => "unknown solver error".to_string(),
    }
}

fn task_id_from(response: CreateTaskResponse) -> Result<TaskId, AppError> {
    if response.error_id != 0 {
        return Err(AppError::SolverError {
            code: response.error_id,
            description: describe(response.error_code, response.error_description),
        });
    }
    match response.task_id {
        Some(serde_json::Value::Number(n)) => Ok(TaskId(n.to_string())),
        Some(serde_json::Value::String(s)) if !s.is_empty() => Ok(TaskId(s)),
        _ => Err(AppError::HttpError("createTask response has no taskId".into())),
    }
}

fn status_from(response: TaskResultResponse) -> Result<TaskStatus, AppError> {
    if response.error_id != 0 {
        return Ok(TaskStatus::Error {
            code: response.error_id,
            description: describe(response.error_code, response.error_description),
        });
    }
    match response.status.as_deref() {
        Some("ready") => response
            .solution
            .map(|s| TaskStatus::Ready {
                token: s.g_recaptcha_response,
            })
            .ok_or_else(|| AppError::HttpError("ready task without solution".into())),
        Some("processing") | None => Ok(TaskStatus::Pending),
        Some(other) => Err(AppError::HttpError(format!("unknown task status '{other}'"))),
    }
}

/// Task ids are numeric on the wire; send them back as numbers when they parse.
fn wire_task_id(task: &TaskId) -> serde_json::Value {
    task.0
        .parse::<u64>()
        .map(serde_json::Value::from)
        .unwrap_or_else(|_| serde_json::Value::String(task.0.clone()))
}

impl ChallengeSolver for RuCaptchaSolver {
    async fn create_task(&self, site_key: &str, page_url: &str) -> Result<TaskId, AppError> {
        let request = CreateTaskRequest {
            client_key: &self.client_key,
            task: RecaptchaTask {
                task_type: TASK_TYPE,
                website_url: page_url,
                website_key: site_key,
                is_invisible: false,
            },
            soft_id: SOFTWARE_ID,
        };
        let response: CreateTaskResponse = self.post("createTask", &request).await?;
        let task = task_id_from(response)?;
        tracing::debug!(task_id = %task.0, "Solver task created");
        Ok(task)
    }

    async fn poll_task(&self, task: &TaskId) -> Result<TaskStatus, AppError> {
        let task_id = wire_task_id(task);
        let request = TaskResultRequest {
            client_key: &self.client_key,
            task_id: &task_id,
        };
        let response: TaskResultResponse = self.post("getTaskResult", &request).await?;
        status_from(response)
    }
}
