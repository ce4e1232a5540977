//! In-memory fakes of the ports, for tests in this and downstream crates.

use std::{
    collections::{HashMap, HashSet, VecDeque},
    path::{Path, PathBuf},
    sync::Mutex,
    time::Duration,
};

use async_trait::async_trait;
use chrono::{TimeZone, Utc};

use crate::{
    domain::{
        ChatId, ChatInfo, ChatKind, ForumTopic, HistoryMessage, LoginState, MediaInfo, MediaKind,
        MessageId, Participant,
    },
    errors::Error,
    ports::{Authenticator, Confirmer, Progress, ProgressSink, TelegramClient},
    Result,
};

pub fn chat(id: i64, title: &str, kind: ChatKind) -> ChatInfo {
    ChatInfo {
        id: ChatId(id),
        title: title.to_string(),
        username: None,
        kind,
        participants_count: 0,
        is_forum: false,
        creator: false,
        admin_rights: false,
        date: None,
    }
}

/// Message `id` sent at `2024-01-01T00:00:00Z + id minutes`.
pub fn text_message(id: i32, text: &str) -> HistoryMessage {
    HistoryMessage {
        id: MessageId(id),
        date: Utc
            .with_ymd_and_hms(2024, 1, 1, 0, 0, 0)
            .single()
            .unwrap_or_default()
            + chrono::Duration::minutes(i64::from(id)),
        text: text.to_string(),
        sender_id: Some(1000 + i64::from(id)),
        reply_to_msg_id: None,
        topic_id: None,
        media: None,
        views: 0,
        forwards: 0,
    }
}

pub fn media_message(id: i32, text: &str, size: u64) -> HistoryMessage {
    HistoryMessage {
        media: Some(MediaInfo {
            kind: MediaKind::Photo,
            size: Some(size),
            extension: Some(".jpg".to_string()),
        }),
        ..text_message(id, text)
    }
}

/// Media message of `kind`, posted in forum topic `topic` when set.
pub fn kind_message(id: i32, kind: MediaKind, ext: &str, topic: Option<i32>) -> HistoryMessage {
    HistoryMessage {
        topic_id: topic.map(MessageId),
        media: Some(MediaInfo {
            kind,
            size: Some(10),
            extension: Some(ext.to_string()),
        }),
        ..text_message(id, "")
    }
}

#[derive(Default)]
struct FakeState {
    dialogs: Vec<ChatInfo>,
    /// Oldest first, as a chat reads.
    history: HashMap<i64, Vec<HistoryMessage>>,
    participants: HashMap<i64, Vec<Participant>>,
    restricted_participants: HashSet<i64>,
    unreadable_history: HashSet<i64>,
    forum_topics: HashMap<i64, Vec<ForumTopic>>,
    failing_downloads: HashSet<i32>,
    download_delay: Option<Duration>,
    send_failures: VecDeque<Error>,
    forward_failures: VecDeque<Error>,
    leave_failures: VecDeque<Error>,

    left: Vec<ChatId>,
    forwarded: Vec<(ChatId, ChatId, Vec<MessageId>)>,
    texts: Vec<(ChatId, String)>,
    media_copies: Vec<(ChatId, MessageId, ChatId, String)>,
    downloads: Vec<PathBuf>,
    downloads_in_flight: usize,
    peak_downloads: usize,
    history_calls: usize,
}

/// Scriptable `TelegramClient`.
#[derive(Default)]
pub struct FakeTelegram {
    state: Mutex<FakeState>,
}

impl FakeTelegram {
    pub fn new() -> Self {
        Self::default()
    }

    fn st(&self) -> std::sync::MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn with_dialogs(self, dialogs: Vec<ChatInfo>) -> Self {
        self.st().dialogs = dialogs;
        self
    }

    pub fn with_history(self, chat: i64, messages: Vec<HistoryMessage>) -> Self {
        self.st().history.insert(chat, messages);
        self
    }

    pub fn with_participants(self, chat: i64, participants: Vec<Participant>) -> Self {
        self.st().participants.insert(chat, participants);
        self
    }

    /// Participant listing for `chat` fails as if admin rights were missing.
    pub fn with_restricted_participants(self, chat: i64) -> Self {
        self.st().restricted_participants.insert(chat);
        self
    }

    /// Reading the history of `chat` fails as if the account was banned.
    pub fn with_unreadable_history(self, chat: i64) -> Self {
        self.st().unreadable_history.insert(chat);
        self
    }

    pub fn with_forum_topics(self, chat: i64, topics: &[(i32, &str)]) -> Self {
        let topics = topics
            .iter()
            .map(|(id, title)| ForumTopic {
                id: MessageId(*id),
                title: title.to_string(),
            })
            .collect();
        self.st().forum_topics.insert(chat, topics);
        self
    }

    /// Every download takes `delay` (in tokio time).
    pub fn with_download_delay(self, delay: Duration) -> Self {
        self.st().download_delay = Some(delay);
        self
    }

    pub fn with_failing_download(self, message: i32) -> Self {
        self.st().failing_downloads.insert(message);
        self
    }

    pub fn fail_next_send(&self, err: Error) {
        self.st().send_failures.push_back(err);
    }

    pub fn fail_next_forward(&self, err: Error) {
        self.st().forward_failures.push_back(err);
    }

    pub fn fail_next_leave(&self, err: Error) {
        self.st().leave_failures.push_back(err);
    }

    pub fn left(&self) -> Vec<ChatId> {
        self.st().left.clone()
    }

    pub fn forwarded(&self) -> Vec<(ChatId, ChatId, Vec<MessageId>)> {
        self.st().forwarded.clone()
    }

    pub fn sent_texts(&self) -> Vec<(ChatId, String)> {
        self.st().texts.clone()
    }

    pub fn media_copies(&self) -> Vec<(ChatId, MessageId, ChatId, String)> {
        self.st().media_copies.clone()
    }

    pub fn downloads(&self) -> Vec<PathBuf> {
        self.st().downloads.clone()
    }

    /// Most downloads that ran at the same time.
    pub fn peak_downloads(&self) -> usize {
        self.st().peak_downloads
    }

    pub fn history_calls(&self) -> usize {
        self.st().history_calls
    }
}

#[async_trait]
impl TelegramClient for FakeTelegram {
    async fn list_dialogs(&self, limit: usize) -> Result<Vec<ChatInfo>> {
        Ok(self.st().dialogs.iter().take(limit).cloned().collect())
    }

    async fn resolve_chat(&self, chat: ChatId) -> Result<ChatInfo> {
        let chat = chat.bare()?;
        self.st()
            .dialogs
            .iter()
            .find(|c| c.id == chat)
            .cloned()
            .ok_or(Error::ChatNotFound(chat.0))
    }

    async fn leave_chat(&self, chat: &ChatInfo) -> Result<()> {
        let mut st = self.st();
        if let Some(err) = st.leave_failures.pop_front() {
            return Err(err);
        }
        st.left.push(chat.id);
        Ok(())
    }

    async fn message_count(&self, chat: ChatId) -> Result<Option<u64>> {
        Ok(self
            .st()
            .history
            .get(&chat.0)
            .map(|h| h.len() as u64))
    }

    async fn fetch_history(
        &self,
        chat: ChatId,
        offset: Option<MessageId>,
        limit: usize,
    ) -> Result<Vec<HistoryMessage>> {
        let mut st = self.st();
        st.history_calls += 1;
        if st.unreadable_history.contains(&chat.0) {
            return Err(Error::PermissionDenied("CHANNEL_PRIVATE".to_string()));
        }
        let Some(history) = st.history.get(&chat.0) else {
            return Ok(Vec::new());
        };
        Ok(history
            .iter()
            .rev()
            .filter(|m| offset.map(|o| m.id < o).unwrap_or(true))
            .take(limit)
            .cloned()
            .collect())
    }

    async fn download_media(
        &self,
        chat: ChatId,
        message: MessageId,
        dest_stem: &Path,
    ) -> Result<Option<PathBuf>> {
        let delay = self.st().download_delay;
        if let Some(delay) = delay {
            {
                let mut st = self.st();
                st.downloads_in_flight += 1;
                st.peak_downloads = st.peak_downloads.max(st.downloads_in_flight);
            }
            tokio::time::sleep(delay).await;
            self.st().downloads_in_flight -= 1;
        }
        let ext = {
            let st = self.st();
            if st.failing_downloads.contains(&message.0) {
                return Err(Error::Network("download interrupted".to_string()));
            }
            let found = st
                .history
                .get(&chat.0)
                .and_then(|h| h.iter().find(|m| m.id == message))
                .and_then(|m| m.media.clone());
            match found {
                Some(media) => media.extension.unwrap_or_default(),
                None => return Ok(None),
            }
        };
        let path = PathBuf::from(format!("{}{ext}", dest_stem.display()));
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, b"media")?;
        self.st().downloads.push(path.clone());
        Ok(Some(path))
    }

    async fn participants(&self, chat: ChatId) -> Result<Vec<Participant>> {
        let st = self.st();
        if st.restricted_participants.contains(&chat.0) {
            return Err(Error::PermissionDenied("CHAT_ADMIN_REQUIRED".to_string()));
        }
        Ok(st.participants.get(&chat.0).cloned().unwrap_or_default())
    }

    async fn forum_topics(&self, chat: ChatId) -> Result<Vec<ForumTopic>> {
        Ok(self
            .st()
            .forum_topics
            .get(&chat.0)
            .cloned()
            .unwrap_or_default())
    }

    async fn forward_messages(
        &self,
        source: ChatId,
        destination: ChatId,
        ids: &[MessageId],
    ) -> Result<usize> {
        let mut st = self.st();
        if let Some(err) = st.forward_failures.pop_front() {
            return Err(err);
        }
        st.forwarded.push((source, destination, ids.to_vec()));
        Ok(ids.len())
    }

    async fn send_text(&self, destination: ChatId, text: &str) -> Result<()> {
        let mut st = self.st();
        if let Some(err) = st.send_failures.pop_front() {
            return Err(err);
        }
        st.texts.push((destination, text.to_string()));
        Ok(())
    }

    async fn send_media_copy(
        &self,
        source: ChatId,
        message: MessageId,
        destination: ChatId,
        caption: &str,
    ) -> Result<()> {
        let mut st = self.st();
        if let Some(err) = st.send_failures.pop_front() {
            return Err(err);
        }
        st.media_copies
            .push((source, message, destination, caption.to_string()));
        Ok(())
    }
}

/// Scriptable `Authenticator`: a fixed code and optional 2FA password.
pub struct FakeAuth {
    state: Mutex<LoginState>,
    code: String,
    password: Option<String>,
}

impl FakeAuth {
    pub fn authorized() -> Self {
        Self {
            state: Mutex::new(LoginState::Authorized),
            code: String::new(),
            password: None,
        }
    }

    pub fn logged_out(code: &str, password: Option<&str>) -> Self {
        Self {
            state: Mutex::new(LoginState::NotStarted),
            code: code.to_string(),
            password: password.map(|s| s.to_string()),
        }
    }

    fn get(&self) -> LoginState {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn set(&self, s: LoginState) -> LoginState {
        *self.state.lock().unwrap_or_else(|e| e.into_inner()) = s;
        s
    }
}

#[async_trait]
impl Authenticator for FakeAuth {
    async fn is_authorized(&self) -> Result<bool> {
        Ok(self.get().is_authorized())
    }

    async fn start_login(&self, phone: &str) -> Result<LoginState> {
        if self.get().is_authorized() {
            return Ok(LoginState::Authorized);
        }
        if phone.trim().is_empty() {
            return Err(Error::InvalidInput("phone is required".to_string()));
        }
        Ok(self.set(LoginState::CodeSent))
    }

    async fn complete_login(
        &self,
        code: Option<&str>,
        password: Option<&str>,
    ) -> Result<LoginState> {
        match self.get() {
            LoginState::Authorized => Ok(LoginState::Authorized),
            LoginState::NotStarted => Ok(LoginState::NotStarted),
            LoginState::CodeSent => {
                let Some(code) = code else {
                    return Ok(LoginState::CodeSent);
                };
                if code != self.code {
                    return Err(Error::InvalidInput("invalid login code".to_string()));
                }
                if self.password.is_none() {
                    return Ok(self.set(LoginState::Authorized));
                }
                let next = self.set(LoginState::PasswordRequired);
                self.check_password(password, next)
            }
            LoginState::PasswordRequired => {
                self.check_password(password, LoginState::PasswordRequired)
            }
        }
    }
}

impl FakeAuth {
    fn check_password(&self, given: Option<&str>, pending: LoginState) -> Result<LoginState> {
        match (given, self.password.as_deref()) {
            (None, _) => Ok(pending),
            (Some(g), Some(p)) if g == p => Ok(self.set(LoginState::Authorized)),
            _ => Err(Error::InvalidInput("invalid password".to_string())),
        }
    }
}

/// Confirmer that answers from a script and records the prompts.
#[derive(Default)]
pub struct ScriptedConfirmer {
    answers: Mutex<VecDeque<bool>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedConfirmer {
    pub fn new(answers: &[bool]) -> Self {
        Self {
            answers: Mutex::new(answers.iter().copied().collect()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

#[async_trait]
impl Confirmer for ScriptedConfirmer {
    async fn confirm(&self, prompt: &str) -> bool {
        self.prompts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(prompt.to_string());
        self.answers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front()
            .unwrap_or(false)
    }
}

/// Progress sink that keeps every update.
#[derive(Default)]
pub struct RecordingProgress {
    updates: Mutex<Vec<Progress>>,
}

impl RecordingProgress {
    pub fn updates(&self) -> Vec<Progress> {
        self.updates
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

impl ProgressSink for RecordingProgress {
    fn update(&self, progress: Progress) {
        self.updates
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(progress);
    }
}
