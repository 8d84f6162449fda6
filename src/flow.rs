//! Conversation flow: the two-step dialogue that turns `/generate` into a
//! delivered photo.
//!
//! The engine talks to the outside world only through [`Delivery`] and pulls
//! the render section through [`ConfigProvider`] at every step, so placement
//! edits in the TOML take effect mid-conversation.

use std::future::Future;
use std::path::Path;
use std::pin::Pin;
use std::sync::Arc;

use crate::commands::{Command, parse_command};
use crate::config::ConfigProvider;
use crate::input;
use crate::render::Renderer;
use crate::session::{ChatId, ConversationState, Phase, SessionStore};

/// Outbound half of a chat transport.
pub trait Delivery: Send + Sync {
    fn send_text<'a>(
        &'a self,
        chat: ChatId,
        text: &'a str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + 'a>>;

    fn send_photo<'a>(
        &'a self,
        chat: ChatId,
        path: &'a Path,
        caption: &'a str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + 'a>>;
}

pub struct FlowEngine {
    provider: Arc<dyn ConfigProvider>,
    delivery: Arc<dyn Delivery>,
    sessions: SessionStore,
}

impl FlowEngine {
    pub fn new(provider: Arc<dyn ConfigProvider>, delivery: Arc<dyn Delivery>) -> Self {
        Self {
            provider,
            delivery,
            sessions: SessionStore::new(),
        }
    }

    /// Route one inbound message. Errors reaching the caller are delivery
    /// failures; everything recoverable is handled here by re-prompting.
    pub async fn handle(&self, chat: ChatId, text: &str) -> anyhow::Result<()> {
        match parse_command(text) {
            Some(Command::Start) => self.on_start(chat).await,
            Some(Command::Generate) => self.on_generate(chat).await,
            Some(Command::Cancel) => self.on_cancel(chat).await,
            None => self.on_text(chat, text).await,
        }
    }

    async fn on_start(&self, chat: ChatId) -> anyhow::Result<()> {
        self.sessions.clear(chat);
        self.delivery.send_text(chat, &t!("flow.greeting")).await
    }

    async fn on_generate(&self, chat: ChatId) -> anyhow::Result<()> {
        self.sessions.set(chat, ConversationState::awaiting_amount());
        self.delivery.send_text(chat, &t!("flow.ask_amount")).await
    }

    async fn on_cancel(&self, chat: ChatId) -> anyhow::Result<()> {
        self.sessions.clear(chat);
        self.delivery.send_text(chat, &t!("flow.cancelled")).await
    }

    async fn on_text(&self, chat: ChatId, text: &str) -> anyhow::Result<()> {
        // Free text from idle chats is not ours to answer.
        let Some(state) = self.sessions.get(chat) else {
            return Ok(());
        };
        match state.phase {
            Phase::AwaitingAmount => self.on_amount(chat, text).await,
            Phase::AwaitingTime => self.on_time(chat, state, text).await,
        }
    }

    async fn on_amount(&self, chat: ChatId, text: &str) -> anyhow::Result<()> {
        let Some(canonical) = input::normalize_amount(text) else {
            return self.delivery.send_text(chat, &t!("flow.bad_amount")).await;
        };
        let config = match self.provider.load() {
            Ok(config) => config,
            Err(e) => return self.generation_failure(chat, &e).await,
        };
        self.sessions
            .set(chat, ConversationState::awaiting_time(canonical));
        self.ask_time(chat, &config.time_format, "flow.ask_time").await
    }

    async fn on_time(
        &self,
        chat: ChatId,
        state: ConversationState,
        text: &str,
    ) -> anyhow::Result<()> {
        let config = match self.provider.load() {
            Ok(config) => config,
            Err(e) => return self.generation_failure(chat, &e).await,
        };

        let Some(parsed) = input::parse_time(text, &config.time_format) else {
            return self.ask_time(chat, &config.time_format, "flow.bad_time").await;
        };
        let Some(time_text) = input::format_time(parsed, &config.time_format) else {
            return self.ask_time(chat, &config.time_format, "flow.bad_time").await;
        };

        let Some(amount) = state.amount else {
            // The store lost the first step; restart cleanly instead of
            // rendering a half-empty stamp.
            tracing::warn!("chat {chat} reached the time step without an amount, resetting");
            self.sessions.clear(chat);
            return self.delivery.send_text(chat, &t!("flow.state_lost")).await;
        };

        let amount_text = input::format_amount_display(&amount);
        let renderer = Renderer::new(config);
        let rendered =
            match tokio::task::spawn_blocking(move || renderer.render(&amount_text, &time_text))
                .await
            {
                Ok(result) => result,
                Err(e) => return self.generation_failure(chat, &e).await,
            };
        let artifact = match rendered {
            Ok(path) => path,
            Err(e) => return self.generation_failure(chat, &e).await,
        };

        let delivered = self
            .delivery
            .send_photo(chat, &artifact, &t!("flow.done"))
            .await;

        // The artifact dies with the delivery attempt, successful or not,
        // and the conversation returns to idle either way.
        cleanup_artifact(&artifact);
        self.sessions.clear(chat);
        delivered
    }

    async fn ask_time(&self, chat: ChatId, pattern: &str, key: &str) -> anyhow::Result<()> {
        let example = input::format_time(input::example_timestamp(), pattern)
            .unwrap_or_else(|| pattern.to_string());
        self.delivery
            .send_text(chat, &t!(key, format = pattern, example = example))
            .await
    }

    // `Send + Sync` on the error keeps the handle future spawnable.
    async fn generation_failure(
        &self,
        chat: ChatId,
        error: &(dyn std::fmt::Display + Send + Sync),
    ) -> anyhow::Result<()> {
        tracing::warn!("generation failed for chat {chat}: {error}");
        self.sessions.clear(chat);
        self.delivery.send_text(chat, &t!("flow.render_failed")).await
    }
}

impl std::fmt::Debug for FlowEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlowEngine")
            .field("sessions", &self.sessions)
            .finish_non_exhaustive()
    }
}

/// Best-effort delete; a leftover artifact is worth a warning, not a failure.
fn cleanup_artifact(path: &Path) {
    if let Err(e) = std::fs::remove_file(path) {
        tracing::warn!("failed to remove artifact {}: {e}", path.display());
    }
}
