pub mod types;

use log::debug;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::future::Future;
use std::time::Duration;

use crate::error::{BotError, Result};
use types::{ReplyKeyboardMarkup, SendMessage, TgResponse};
pub use types::Update;

pub const TELEGRAM_API_URL: &str = "https://api.telegram.org";

/// Where command replies and alert notifications are written.
pub trait ChatSink: Send + Sync {
    fn send_text(&self, chat_id: i64, text: &str) -> impl Future<Output = Result<()>> + Send;

    /// Text with a reply keyboard, one inner vec per keyboard row.
    fn send_menu(
        &self,
        chat_id: i64,
        text: &str,
        keyboard: &[Vec<String>],
    ) -> impl Future<Output = Result<()>> + Send;

    fn send_photo(
        &self,
        chat_id: i64,
        png: Vec<u8>,
        file_name: &str,
        caption: &str,
    ) -> impl Future<Output = Result<()>> + Send;
}

/// Minimal Bot API client: long polling plus the three send calls the bot uses.
#[derive(Clone)]
pub struct TelegramClient {
    http: Client,
    base_url: String,
    request_timeout: Duration,
}

impl TelegramClient {
    pub fn new(api_url: &str, token: &str, request_timeout: Duration) -> Result<Self> {
        let http = Client::builder().build()?;
        Ok(Self {
            http,
            base_url: format!("{}/bot{}", api_url.trim_end_matches('/'), token),
            request_timeout,
        })
    }

    fn url(&self, method: &str) -> String {
        format!("{}/{}", self.base_url, method)
    }

    /// Long-polls for updates after `offset`. The HTTP timeout is stretched
    /// past the poll timeout so an idle poll is not reported as a failure.
    pub async fn get_updates(&self, offset: i64, poll_timeout: Duration) -> Result<Vec<Update>> {
        let response = self
            .http
            .get(self.url("getUpdates"))
            .query(&[
                ("offset", offset.to_string()),
                ("timeout", poll_timeout.as_secs().to_string()),
            ])
            .timeout(poll_timeout + self.request_timeout)
            .send()
            .await?;

        read_result(response).await
    }

    pub async fn send_message(
        &self,
        chat_id: i64,
        text: &str,
        keyboard: Option<&[Vec<String>]>,
    ) -> Result<()> {
        debug!("sendMessage to {}", chat_id);
        let body = SendMessage {
            chat_id,
            text,
            reply_markup: keyboard.map(ReplyKeyboardMarkup::from_rows),
        };
        let response = self
            .http
            .post(self.url("sendMessage"))
            .timeout(self.request_timeout)
            .json(&body)
            .send()
            .await?;

        read_result::<Value>(response).await.map(|_| ())
    }

    pub async fn send_photo_bytes(
        &self,
        chat_id: i64,
        png: Vec<u8>,
        file_name: &str,
        caption: &str,
    ) -> Result<()> {
        debug!("sendPhoto to {} ({} bytes)", chat_id, png.len());
        let photo = Part::bytes(png)
            .file_name(file_name.to_string())
            .mime_str("image/png")?;
        let form = Form::new()
            .text("chat_id", chat_id.to_string())
            .text("caption", caption.to_string())
            .part("photo", photo);

        let response = self
            .http
            .post(self.url("sendPhoto"))
            .timeout(self.request_timeout)
            .multipart(form)
            .send()
            .await?;

        read_result::<Value>(response).await.map(|_| ())
    }
}

impl ChatSink for TelegramClient {
    async fn send_text(&self, chat_id: i64, text: &str) -> Result<()> {
        self.send_message(chat_id, text, None).await
    }

    async fn send_menu(&self, chat_id: i64, text: &str, keyboard: &[Vec<String>]) -> Result<()> {
        self.send_message(chat_id, text, Some(keyboard)).await
    }

    async fn send_photo(
        &self,
        chat_id: i64,
        png: Vec<u8>,
        file_name: &str,
        caption: &str,
    ) -> Result<()> {
        self.send_photo_bytes(chat_id, png, file_name, caption).await
    }
}

async fn read_result<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
    let body = response.bytes().await?;
    let parsed: TgResponse<T> = serde_json::from_slice(&body)?;
    if !parsed.ok {
        return Err(BotError::Telegram(
            parsed
                .description
                .unwrap_or_else(|| "request rejected".to_string()),
        ));
    }
    parsed
        .result
        .ok_or_else(|| BotError::MalformedPayload("Telegram response has no result".to_string()))
}
