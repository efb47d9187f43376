use super::{
    CaptchaError, CaptchaProvider, CaptchaResult, CaptchaSolution, CaptchaTask, PollState,
    PollingConfig, endpoint, poll_for_token, read_json,
};
use async_trait::async_trait;
use serde::Deserialize;
use url::Url;

const NAME: &str = "2Captcha";
const NOT_READY: &str = "CAPCHA_NOT_READY";

/// Adapter for the 2Captcha `in.php` / `res.php` API.
#[derive(Debug, Clone)]
pub struct TwoCaptchaProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: Url,
    polling: PollingConfig,
}

/// Both endpoints answer `{"status": 0|1, "request": "..."}` when `json=1`.
#[derive(Debug, Deserialize)]
struct TwoCaptchaReply {
    status: i64,
    #[serde(default)]
    request: String,
}

impl TwoCaptchaProvider {
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

    async fn create_task(&self, task: &CaptchaTask) -> Result<String, CaptchaError> {
        let url = endpoint(&self.base_url, "in.php")?;
        let response = self
            .client
            .get(url)
            .query(&[
                ("key", self.api_key.as_str()),
                ("method", "userrecaptcha"),
                ("googlekey", task.site_key.as_str()),
                ("pageurl", task.page_url.as_str()),
                ("json", "1"),
            ])
            .send()
            .await?;

        let reply: TwoCaptchaReply = read_json(response).await?;
        if reply.status != 1 {
            return Err(CaptchaError::Provider {
                provider: NAME,
                message: reply.request,
            });
        }
        Ok(reply.request)
    }

    async fn poll_result(&self, task_id: &str) -> Result<PollState, CaptchaError> {
        let url = endpoint(&self.base_url, "res.php")?;
        let response = self
            .client
            .get(url)
            .query(&[
                ("key", self.api_key.as_str()),
                ("action", "get"),
                ("id", task_id),
                ("json", "1"),
            ])
            .send()
            .await?;

        let reply: TwoCaptchaReply = read_json(response).await?;
        if reply.status == 1 {
            Ok(PollState::Ready(reply.request))
        } else if reply.request == NOT_READY {
            Ok(PollState::Pending)
        } else {
            Err(CaptchaError::Provider {
                provider: NAME,
                message: reply.request,
            })
        }
    }
}

#[async_trait]
impl CaptchaProvider for TwoCaptchaProvider {
    fn name(&self) -> &'static str {
        NAME
    }

    async fn solve(&self, task: &CaptchaTask) -> CaptchaResult {
        let task_id = self.create_task(task).await?;
        log::debug!("{NAME} task {task_id} created");

        let token = poll_for_token(NAME, &self.polling, |_| self.poll_result(&task_id)).await?;
        Ok(CaptchaSolution::new(token).with_task_id(task_id))
    }
}
