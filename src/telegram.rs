//! Telegram Bot API transport: long-poll ingestion and outbound delivery.

use std::future::Future;
use std::path::Path;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::sync::mpsc;

use crate::flow::Delivery;
use crate::session::ChatId;

pub const DEFAULT_API_BASE: &str = "https://api.telegram.org";

const INITIAL_BACKOFF_SECS: u64 = 2;
const MAX_BACKOFF_SECS: u64 = 60;
const POLL_RETRY_SECS: u64 = 5;

/// One text message lifted out of an update, already allowlist-filtered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub chat: ChatId,
    pub text: String,
}

/// Telegram channel — long-polls the Bot API for updates.
pub struct TelegramChannel {
    api_base: String,
    bot_token: String,
    allowed_users: Vec<String>,
    client: reqwest::Client,
}

impl TelegramChannel {
    pub fn new(bot_token: impl Into<String>, allowed_users: Vec<String>) -> Self {
        Self::with_api_base(DEFAULT_API_BASE, bot_token, allowed_users)
    }

    /// Channel against a non-default API base; tests point this at a mock.
    pub fn with_api_base(
        api_base: impl Into<String>,
        bot_token: impl Into<String>,
        allowed_users: Vec<String>,
    ) -> Self {
        Self {
            api_base: api_base.into().trim_end_matches('/').to_string(),
            bot_token: bot_token.into(),
            allowed_users,
            client: reqwest::Client::new(),
        }
    }

    fn api_url(&self, method: &str) -> String {
        format!("{}/bot{}/{method}", self.api_base, self.bot_token)
    }

    /// `["*"]` admits everyone; otherwise an entry must match the numeric
    /// user id or the username (a leading `@` in the entry is tolerated).
    fn is_sender_allowed(&self, user_id: Option<i64>, username: Option<&str>) -> bool {
        self.allowed_users.iter().any(|entry| {
            if entry == "*" {
                return true;
            }
            if let Some(name) = username
                && entry.trim_start_matches('@') == name
            {
                return true;
            }
            user_id.is_some_and(|id| *entry == id.to_string())
        })
    }

    pub async fn send_message(&self, chat: ChatId, text: &str) -> anyhow::Result<()> {
        let body = serde_json::json!({
            "chat_id": chat,
            "text": text,
        });

        let resp = self
            .client
            .post(self.api_url("sendMessage"))
            .json(&body)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let err = resp
                .text()
                .await
                .unwrap_or_else(|e| format!("<failed to read response body: {e}>"));
            anyhow::bail!("Telegram sendMessage failed ({status}): {err}");
        }

        Ok(())
    }

    pub async fn send_photo_file(
        &self,
        chat: ChatId,
        path: &Path,
        caption: &str,
    ) -> anyhow::Result<()> {
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("read artifact {}", path.display()))?;
        let filename = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("stamp.jpg")
            .to_string();
        let part = reqwest::multipart::Part::bytes(bytes)
            .file_name(filename)
            .mime_str(photo_mime(path))
            .context("set photo MIME type")?;
        let form = reqwest::multipart::Form::new()
            .text("chat_id", chat.to_string())
            .text("caption", caption.to_string())
            .part("photo", part);

        let resp = self
            .client
            .post(self.api_url("sendPhoto"))
            .multipart(form)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let err = resp
                .text()
                .await
                .unwrap_or_else(|e| format!("<failed to read response body: {e}>"));
            anyhow::bail!("Telegram sendPhoto failed ({status}): {err}");
        }

        Ok(())
    }

    /// Token and connectivity check; returns the bot's username.
    pub async fn get_me(&self) -> anyhow::Result<String> {
        let resp = self.client.get(self.api_url("getMe")).send().await?;
        if !resp.status().is_success() {
            anyhow::bail!("Telegram getMe failed ({})", resp.status());
        }
        let data: serde_json::Value = resp.json().await?;
        let username = data
            .get("result")
            .and_then(|r| r.get("username"))
            .and_then(serde_json::Value::as_str)
            .unwrap_or("unknown");
        Ok(username.to_string())
    }

    /// Long-poll loop. Exits cleanly once the dispatch side hangs up.
    pub async fn listen(&self, tx: mpsc::Sender<InboundMessage>) -> anyhow::Result<()> {
        let mut offset: i64 = 0;

        tracing::info!("Telegram channel listening for messages...");

        loop {
            let body = serde_json::json!({
                "offset": offset,
                "timeout": 30,
                "allowed_updates": ["message"]
            });

            let resp = match self
                .client
                .post(self.api_url("getUpdates"))
                .json(&body)
                .send()
                .await
            {
                Ok(r) => r,
                Err(e) => {
                    tracing::warn!("Telegram poll error: {e}");
                    tokio::time::sleep(Duration::from_secs(POLL_RETRY_SECS)).await;
                    continue;
                }
            };

            let data: serde_json::Value = match resp.json().await {
                Ok(d) => d,
                Err(e) => {
                    tracing::warn!("Telegram parse error: {e}");
                    tokio::time::sleep(Duration::from_secs(POLL_RETRY_SECS)).await;
                    continue;
                }
            };

            if let Some(results) = data.get("result").and_then(serde_json::Value::as_array) {
                for update in results {
                    // Advance offset past this update
                    if let Some(uid) = update.get("update_id").and_then(serde_json::Value::as_i64) {
                        offset = uid + 1;
                    }

                    let Some(message) = update.get("message") else {
                        continue;
                    };
                    let Some(text) = message.get("text").and_then(serde_json::Value::as_str) else {
                        continue;
                    };
                    let Some(chat) = message
                        .get("chat")
                        .and_then(|c| c.get("id"))
                        .and_then(serde_json::Value::as_i64)
                    else {
                        continue;
                    };

                    let username = message
                        .get("from")
                        .and_then(|f| f.get("username"))
                        .and_then(serde_json::Value::as_str);
                    let user_id = message
                        .get("from")
                        .and_then(|f| f.get("id"))
                        .and_then(serde_json::Value::as_i64);

                    if !self.is_sender_allowed(user_id, username) {
                        tracing::warn!(
                            "ignoring message from unauthorized user: username={}, user_id={}",
                            username.unwrap_or("unknown"),
                            user_id.map_or_else(|| "unknown".to_string(), |id| id.to_string()),
                        );
                        continue;
                    }

                    let inbound = InboundMessage {
                        chat,
                        text: text.to_string(),
                    };
                    if tx.send(inbound).await.is_err() {
                        return Ok(());
                    }
                }
            }
        }
    }
}

impl Delivery for TelegramChannel {
    fn send_text<'a>(
        &'a self,
        chat: ChatId,
        text: &'a str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + 'a>> {
        Box::pin(self.send_message(chat, text))
    }

    fn send_photo<'a>(
        &'a self,
        chat: ChatId,
        path: &'a Path,
        caption: &'a str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + 'a>> {
        Box::pin(self.send_photo_file(chat, path, caption))
    }
}

impl std::fmt::Debug for TelegramChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramChannel")
            .field("api_base", &self.api_base)
            .field("allowed_users", &self.allowed_users)
            .finish_non_exhaustive()
    }
}

/// Keep the listener alive across crashes with doubling backoff. Stops once
/// the dispatch side is gone.
pub fn spawn_supervised_listener(
    channel: Arc<TelegramChannel>,
    tx: mpsc::Sender<InboundMessage>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut backoff = INITIAL_BACKOFF_SECS;

        loop {
            tracing::debug!("telegram listener starting");
            let result = channel.listen(tx.clone()).await;

            if tx.is_closed() {
                break;
            }

            match result {
                Ok(()) => {
                    tracing::warn!("Telegram listener exited unexpectedly; restarting");
                    // Clean exit -- reset backoff since the listener ran successfully
                    backoff = INITIAL_BACKOFF_SECS;
                }
                Err(e) => {
                    tracing::error!("Telegram listener error: {e}; restarting");
                }
            }

            tokio::time::sleep(Duration::from_secs(backoff)).await;
            // Double backoff AFTER sleeping so the first retry is prompt
            backoff = backoff.saturating_mul(2).min(MAX_BACKOFF_SECS);
        }
    })
}

fn photo_mime(path: &Path) -> &'static str {
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("png") => "image/png",
        _ => "image/jpeg",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn channel(allowed: &[&str]) -> TelegramChannel {
        TelegramChannel::new("123:abc", allowed.iter().map(ToString::to_string).collect())
    }

    #[test]
    fn api_url_embeds_token_and_method() {
        let ch = channel(&["*"]);
        assert_eq!(
            ch.api_url("sendMessage"),
            "https://api.telegram.org/bot123:abc/sendMessage"
        );
    }

    #[test]
    fn custom_api_base_trims_trailing_slash() {
        let ch = TelegramChannel::with_api_base("http://127.0.0.1:9999/", "tok", vec!["*".into()]);
        assert_eq!(ch.api_url("getMe"), "http://127.0.0.1:9999/bottok/getMe");
    }

    #[test]
    fn wildcard_admits_everyone() {
        let ch = channel(&["*"]);
        assert!(ch.is_sender_allowed(None, None));
        assert!(ch.is_sender_allowed(Some(42), Some("whoever")));
    }

    #[test]
    fn allowlist_matches_user_id() {
        let ch = channel(&["42"]);
        assert!(ch.is_sender_allowed(Some(42), None));
        assert!(!ch.is_sender_allowed(Some(7), None));
    }

    #[test]
    fn allowlist_matches_username_with_or_without_at() {
        let ch = channel(&["@maria", "ivan"]);
        assert!(ch.is_sender_allowed(None, Some("maria")));
        assert!(ch.is_sender_allowed(None, Some("ivan")));
        assert!(!ch.is_sender_allowed(None, Some("other")));
    }

    #[test]
    fn empty_allowlist_rejects_everyone() {
        let ch = channel(&[]);
        assert!(!ch.is_sender_allowed(Some(42), Some("maria")));
    }

    #[test]
    fn photo_mime_follows_extension() {
        assert_eq!(photo_mime(&PathBuf::from("/tmp/a.png")), "image/png");
        assert_eq!(photo_mime(&PathBuf::from("/tmp/a.PNG")), "image/png");
        assert_eq!(photo_mime(&PathBuf::from("/tmp/a.jpg")), "image/jpeg");
        assert_eq!(photo_mime(&PathBuf::from("/tmp/noext")), "image/jpeg");
    }
}
