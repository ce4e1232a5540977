use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::{
    domain::{ChatId, ChatInfo, ForumTopic, HistoryMessage, LoginState, MessageId, Participant},
    Result,
};

/// Hexagonal port for the Telegram user-account client.
///
/// Implementations own connection management, authentication and entity
/// resolution. Ids passed in are bare ids (see [`ChatId::bare`]).
#[async_trait]
pub trait TelegramClient: Send + Sync {
    /// Dialogs of the logged-in account, most recent first.
    async fn list_dialogs(&self, limit: usize) -> Result<Vec<ChatInfo>>;

    async fn resolve_chat(&self, chat: ChatId) -> Result<ChatInfo>;

    /// Leave a group/channel. Small groups are left by deleting the dialog.
    async fn leave_chat(&self, chat: &ChatInfo) -> Result<()>;

    /// Total messages in the chat, when the server reports it.
    async fn message_count(&self, chat: ChatId) -> Result<Option<u64>>;

    /// One page of history, newest first, strictly older than `offset` when set.
    async fn fetch_history(
        &self,
        chat: ChatId,
        offset: Option<MessageId>,
        limit: usize,
    ) -> Result<Vec<HistoryMessage>>;

    /// Download the media of a message. `dest_stem` has no extension; the
    /// implementation appends one and returns the final path, or `None` when
    /// the message carries nothing downloadable.
    async fn download_media(
        &self,
        chat: ChatId,
        message: MessageId,
        dest_stem: &Path,
    ) -> Result<Option<PathBuf>>;

    async fn participants(&self, chat: ChatId) -> Result<Vec<Participant>>;

    /// Topics of a forum supergroup; empty for any other chat.
    async fn forum_topics(&self, chat: ChatId) -> Result<Vec<ForumTopic>>;

    /// Forward with attribution. Returns how many messages were forwarded.
    async fn forward_messages(
        &self,
        source: ChatId,
        destination: ChatId,
        ids: &[MessageId],
    ) -> Result<usize>;

    async fn send_text(&self, destination: ChatId, text: &str) -> Result<()>;

    /// Re-send the media of `message` as a new message (no attribution).
    async fn send_media_copy(
        &self,
        source: ChatId,
        message: MessageId,
        destination: ChatId,
        caption: &str,
    ) -> Result<()>;
}

/// Port for the interactive login flow.
#[async_trait]
pub trait Authenticator: Send + Sync {
    async fn is_authorized(&self) -> Result<bool>;

    /// Request a login code for `phone` (no-op when already authorized).
    async fn start_login(&self, phone: &str) -> Result<LoginState>;

    /// Submit the code and, if the account has 2FA, the password.
    async fn complete_login(&self, code: Option<&str>, password: Option<&str>)
        -> Result<LoginState>;
}

/// Asks the operator before destructive actions.
#[async_trait]
pub trait Confirmer: Send + Sync {
    async fn confirm(&self, prompt: &str) -> bool;
}

/// Answers every prompt with a fixed value (HTTP requests, `--yes`).
#[derive(Clone, Copy, Debug)]
pub struct AutoConfirm(pub bool);

#[async_trait]
impl Confirmer for AutoConfirm {
    async fn confirm(&self, _prompt: &str) -> bool {
        self.0
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Progress {
    Started { label: String, total: Option<u64> },
    Advanced { done: u64 },
    Finished,
}

/// Receives progress of long-running operations (progress bar, nothing).
pub trait ProgressSink: Send + Sync {
    fn update(&self, progress: Progress);
}

pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn update(&self, _progress: Progress) {}
}
