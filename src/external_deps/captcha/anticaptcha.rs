use super::{
    CaptchaError, CaptchaProvider, CaptchaResult, CaptchaSolution, CaptchaTask, PollState,
    PollingConfig, endpoint, poll_for_token, read_json,
};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use url::Url;

const NAME: &str = "AntiCaptcha";
const TASK_TYPE: &str = "RecaptchaV2TaskProxyless";

/// Adapter for the Anti-Captcha JSON API (`createTask` / `getTaskResult`).
#[derive(Debug, Clone)]
pub struct AntiCaptchaProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: Url,
    polling: PollingConfig,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateTaskReply {
    error_id: i64,
    #[serde(default)]
    error_description: Option<String>,
    #[serde(default)]
    task_id: Option<u64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TaskResultReply {
    error_id: i64,
    #[serde(default)]
    error_description: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    solution: Option<RecaptchaSolution>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RecaptchaSolution {
    g_recaptcha_response: String,
}

impl AntiCaptchaProvider {
    pub fn new(client: reqwest::Client, api_key: impl Into<String>, base_url: Url) -> Self {
        Self {
            client,
            api_key: api_key.into(),
            base_url,
            polling: PollingConfig::default(),
        }
    }

    pub fn with_polling(mut self, polling: PollingConfig) -> Self {
        self.polling = polling;
        self
    }

    fn provider_error(description: Option<String>) -> CaptchaError {
        CaptchaError::Provider {
            provider: NAME,
            message: description.unwrap_or_else(|| "unknown error".into()),
        }
    }

    async fn create_task(&self, task: &CaptchaTask) -> Result<u64, CaptchaError> {
        let url = endpoint(&self.base_url, "createTask")?;
        let body = json!({
            "clientKey": self.api_key,
            "task": {
                "type": TASK_TYPE,
                "websiteURL": task.page_url.as_str(),
                "websiteKey": task.site_key,
            },
        });

        let response = self.client.post(url).json(&body).send().await?;
        let reply: CreateTaskReply = read_json(response).await?;
        if reply.error_id != 0 {
            return Err(Self::provider_error(reply.error_description));
        }

        reply
            .task_id
            .ok_or_else(|| CaptchaError::InvalidResponse("createTask reply without taskId".into()))
    }

    async fn poll_result(&self, task_id: u64) -> Result<PollState, CaptchaError> {
        let url = endpoint(&self.base_url, "getTaskResult")?;
        let body = json!({
            "clientKey": self.api_key,
            "taskId": task_id,
        });

        let response = self.client.post(url).json(&body).send().await?;
        let reply: TaskResultReply = read_json(response).await?;
        if reply.error_id != 0 {
            return Err(Self::provider_error(reply.error_description));
        }

        if reply.status.as_deref() != Some("ready") {
            return Ok(PollState::Pending);
        }

        reply
            .solution
            .map(|solution| PollState::Ready(solution.g_recaptcha_response))
            .ok_or_else(|| CaptchaError::InvalidResponse("ready task without solution".into()))
    }
}

#[async_trait]
impl CaptchaProvider for AntiCaptchaProvider {
    fn name(&self) -> &'static str {
        NAME
    }

    async fn solve(&self, task: &CaptchaTask) -> CaptchaResult {
        let task_id = self.create_task(task).await?;
        log::debug!("{NAME} task {task_id} created");

        let token = poll_for_token(NAME, &self.polling, |_| self.poll_result(task_id)).await?;
        Ok(CaptchaSolution::new(token).with_task_id(task_id.to_string()))
    }
}
