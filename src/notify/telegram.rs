use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, StatusCode};
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

use crate::config::Config;
use crate::error::NotifyError;
use crate::notify::{Notifier, OutgoingMessage};

const API_BASE: &str = "https://api.telegram.org";
const CAPTION_LIMIT: usize = 1024;

/// Telegram Bot API over plain HTTPS.
pub struct TelegramNotifier {
    client: Client,
    base_url: String,
    token: String,
    chat_id: String,
    timeout: Duration,
}

impl TelegramNotifier {
    pub fn new(cfg: &Config) -> Result<Self, NotifyError> {
        let client = Client::builder()
            .timeout(cfg.telegram_timeout)
            .build()
            .map_err(|e| NotifyError::Delivery(format!("http client: {e}")))?;
        Ok(Self {
            client,
            base_url: API_BASE.to_string(),
            token: cfg.telegram_bot_token.clone(),
            chat_id: cfg.telegram_chat_id.clone(),
            timeout: cfg.telegram_timeout,
        })
    }

    fn url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.base_url, self.token, method)
    }

    fn map_err(&self, e: reqwest::Error) -> NotifyError {
        if e.is_timeout() {
            NotifyError::Timeout(self.timeout)
        } else {
            NotifyError::Delivery(e.to_string())
        }
    }

    async fn send_message(&self, text: &str) -> Result<(), NotifyError> {
        let body = serde_json::json!({
            "chat_id": self.chat_id,
            "text": text,
            "disable_web_page_preview": true,
        });
        let resp = self
            .client
            .post(self.url("sendMessage"))
            .json(&body)
            .send()
            .await
            .map_err(|e| self.map_err(e))?;
        let status = resp.status();
        let body = resp.text().await.map_err(|e| self.map_err(e))?;
        check_response(status, &body)
    }

    async fn send_photo(&self, image: &[u8], caption: Option<&str>) -> Result<(), NotifyError> {
        let photo = Part::bytes(image.to_vec())
            .file_name("chart.png")
            .mime_str("image/png")
            .map_err(|e| NotifyError::Delivery(e.to_string()))?;
        let mut form = Form::new()
            .text("chat_id", self.chat_id.clone())
            .part("photo", photo);
        if let Some(caption) = caption {
            form = form.text("caption", caption.to_string());
        }
        let resp = self
            .client
            .post(self.url("sendPhoto"))
            .multipart(form)
            .send()
            .await
            .map_err(|e| self.map_err(e))?;
        let status = resp.status();
        let body = resp.text().await.map_err(|e| self.map_err(e))?;
        check_response(status, &body)
    }
}

/// How one message maps onto Bot API calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Delivery {
    Text,
    CaptionedPhoto,
    /// Text too long for a caption goes out as a follow-up message.
    PhotoThenText,
}

fn plan(msg: &OutgoingMessage) -> Delivery {
    match &msg.image {
        None => Delivery::Text,
        Some(_) if msg.text.chars().count() <= CAPTION_LIMIT => Delivery::CaptionedPhoto,
        Some(_) => Delivery::PhotoThenText,
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn send(&self, msg: &OutgoingMessage) -> Result<(), NotifyError> {
        match (plan(msg), msg.image.as_deref()) {
            (Delivery::CaptionedPhoto, Some(image)) => {
                self.send_photo(image, Some(&msg.text)).await?;
            }
            (Delivery::PhotoThenText, Some(image)) => {
                self.send_photo(image, None).await?;
                self.send_message(&msg.text).await?;
            }
            _ => self.send_message(&msg.text).await?,
        }
        debug!("Telegram message delivered");
        Ok(())
    }
}

/// Bot API replies `{"ok": bool, "description": ...}`; a 2xx with `ok: false`
/// is still a rejection.
fn check_response(status: StatusCode, body: &str) -> Result<(), NotifyError> {
    let parsed: Option<Value> = serde_json::from_str(body).ok();
    let ok = parsed
        .as_ref()
        .and_then(|v| v["ok"].as_bool())
        .unwrap_or(status.is_success());
    if status.is_success() && ok {
        return Ok(());
    }
    let description = parsed
        .as_ref()
        .and_then(|v| v["description"].as_str())
        .unwrap_or(body);
    Err(NotifyError::Delivery(format!("Telegram API error {}: {}", status, description)))
}
