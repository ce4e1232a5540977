use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{errors::Error, Result};

const CHANNEL_MARK: i64 = 1_000_000_000_000;

/// Telegram chat id (numeric, bare form).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChatId(pub i64);

/// Peer type encoded in a Bot API style id.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum IdMark {
    /// Plain positive id: a user, or a group given by its bare id.
    Unmarked,
    /// `-<id>`: basic group.
    BasicGroup,
    /// `-100<id>`: supergroup or channel.
    Channel,
}

impl ChatId {
    /// Split a Bot API style id into its marker and the bare id dialogs
    /// report, so `-1001234567890` is `(Channel, 1234567890)` and `-42` is
    /// `(BasicGroup, 42)`.
    pub fn unmark(self) -> Result<(IdMark, ChatId)> {
        let id = self.0;
        if id >= 0 {
            return Ok((IdMark::Unmarked, self));
        }
        let positive = id
            .checked_neg()
            .ok_or_else(|| Error::InvalidInput(format!("chat id {id} is out of range")))?;
        if positive >= CHANNEL_MARK {
            Ok((IdMark::Channel, ChatId(positive - CHANNEL_MARK)))
        } else {
            Ok((IdMark::BasicGroup, ChatId(positive)))
        }
    }

    pub fn bare(self) -> Result<ChatId> {
        self.unmark().map(|(_, id)| id)
    }
}

impl std::fmt::Display for ChatId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Telegram message id (numeric, per chat).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(pub i32);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChatKind {
    User,
    Group,
    Supergroup,
    Channel,
}

impl ChatKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ChatKind::User => "User",
            ChatKind::Group => "Group",
            ChatKind::Supergroup => "Supergroup",
            ChatKind::Channel => "Channel",
        }
    }
}

/// What the client knows about a dialog.
#[derive(Clone, Debug, PartialEq)]
pub struct ChatInfo {
    pub id: ChatId,
    pub title: String,
    pub username: Option<String>,
    pub kind: ChatKind,
    pub participants_count: u64,
    pub is_forum: bool,
    pub creator: bool,
    pub admin_rights: bool,
    pub date: Option<DateTime<Utc>>,
}

impl ChatInfo {
    pub fn is_group(&self) -> bool {
        matches!(self.kind, ChatKind::Group | ChatKind::Supergroup)
    }

    /// Display title with a stable fallback for untitled chats.
    pub fn display_title(&self) -> String {
        if self.title.trim().is_empty() {
            format!("Chat_{}", self.id)
        } else {
            self.title.clone()
        }
    }
}

/// Entry of `groups_list.json` and of the `/groups/list` response.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GroupRecord {
    pub id: i64,
    pub title: String,
    pub username: Option<String>,
    #[serde(rename = "type")]
    pub kind: ChatKind,
    pub participants_count: u64,
    pub is_forum: bool,
    pub creator: bool,
    pub admin_rights: bool,
    pub date: Option<DateTime<Utc>>,
}

impl From<&ChatInfo> for GroupRecord {
    fn from(c: &ChatInfo) -> Self {
        Self {
            id: c.id.0,
            title: c.display_title(),
            username: c.username.clone(),
            kind: c.kind,
            participants_count: c.participants_count,
            is_forum: c.is_forum,
            creator: c.creator,
            admin_rights: c.admin_rights,
            date: c.date,
        }
    }
}

/// Entry of `chat_list.json` (every dialog, not only groups).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChatRecord {
    pub id: i64,
    pub title: String,
    pub username: Option<String>,
    #[serde(rename = "type")]
    pub kind: ChatKind,
    pub participants_count: u64,
    pub is_forum: bool,
    pub date: Option<DateTime<Utc>>,
}

impl From<&ChatInfo> for ChatRecord {
    fn from(c: &ChatInfo) -> Self {
        Self {
            id: c.id.0,
            title: c.display_title(),
            username: c.username.clone(),
            kind: c.kind,
            participants_count: c.participants_count,
            is_forum: c.is_forum,
            date: c.date,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Photo,
    Video,
    Document,
    Audio,
    Voice,
    Sticker,
    Other,
}

impl MediaKind {
    /// Directory the organized media download files this kind under.
    pub fn dir_name(self) -> &'static str {
        match self {
            MediaKind::Photo => "photos",
            MediaKind::Video => "videos",
            MediaKind::Document => "documents",
            MediaKind::Audio => "audio",
            MediaKind::Voice => "voice_messages",
            MediaKind::Sticker => "stickers",
            MediaKind::Other => "other",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct MediaInfo {
    pub kind: MediaKind,
    /// Size in bytes when the client knows it up front.
    pub size: Option<u64>,
    /// File extension including the leading dot (`.jpg`).
    pub extension: Option<String>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct HistoryMessage {
    pub id: MessageId,
    pub date: DateTime<Utc>,
    pub text: String,
    pub sender_id: Option<i64>,
    pub reply_to_msg_id: Option<MessageId>,
    /// Root message of the forum topic the message was posted in.
    pub topic_id: Option<MessageId>,
    pub media: Option<MediaInfo>,
    pub views: u64,
    pub forwards: u64,
}

impl HistoryMessage {
    pub fn has_media(&self) -> bool {
        self.media.is_some()
    }
}

/// Entry of `messages.json`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MessageRecord {
    pub id: i32,
    pub date: Option<String>,
    pub text: String,
    pub sender_id: Option<i64>,
    pub reply_to_msg_id: Option<i32>,
    pub has_media: bool,
    pub views: u64,
    pub forwards: u64,
}

impl From<&HistoryMessage> for MessageRecord {
    fn from(m: &HistoryMessage) -> Self {
        Self {
            id: m.id.0,
            date: Some(m.date.to_rfc3339()),
            text: m.text.clone(),
            sender_id: m.sender_id,
            reply_to_msg_id: m.reply_to_msg_id.map(|id| id.0),
            has_media: m.has_media(),
            views: m.views,
            forwards: m.forwards,
        }
    }
}

/// Topic of a forum supergroup. `id` is the topic's root message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ForumTopic {
    pub id: MessageId,
    pub title: String,
}

/// Entry of `participants.json`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Participant {
    pub id: i64,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub is_bot: bool,
}

/// Where an interactive login currently stands.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoginState {
    Authorized,
    CodeSent,
    PasswordRequired,
    NotStarted,
}

impl LoginState {
    pub fn is_authorized(self) -> bool {
        self == LoginState::Authorized
    }

    /// Machine-readable detail used by the HTTP login endpoints.
    pub fn detail(self) -> Option<&'static str> {
        match self {
            LoginState::Authorized => None,
            LoginState::CodeSent => Some("code_required"),
            LoginState::PasswordRequired => Some("2fa_required"),
            LoginState::NotStarted => Some("login_not_started"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_chat_id_strips_bot_api_markers() {
        assert_eq!(ChatId(-1001234567890).bare().unwrap(), ChatId(1234567890));
        assert_eq!(ChatId(-42).bare().unwrap(), ChatId(42));
        assert_eq!(ChatId(777).bare().unwrap(), ChatId(777));
        assert_eq!(
            ChatId(-1001234567890).unmark().unwrap(),
            (IdMark::Channel, ChatId(1234567890))
        );
        assert_eq!(ChatId(-42).unmark().unwrap().0, IdMark::BasicGroup);
        assert_eq!(ChatId(42).unmark().unwrap().0, IdMark::Unmarked);
    }

    #[test]
    fn out_of_range_chat_ids_are_rejected() {
        let err = ChatId(i64::MIN).bare().unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
        assert_eq!(
            ChatId(i64::MIN + 1).bare().unwrap(),
            ChatId(i64::MAX - CHANNEL_MARK)
        );
    }

    #[test]
    fn media_kinds_have_distinct_directories() {
        let kinds = [
            MediaKind::Photo,
            MediaKind::Video,
            MediaKind::Document,
            MediaKind::Audio,
            MediaKind::Voice,
            MediaKind::Sticker,
            MediaKind::Other,
        ];
        let dirs: std::collections::HashSet<&str> = kinds.iter().map(|k| k.dir_name()).collect();
        assert_eq!(dirs.len(), kinds.len());
        assert_eq!(MediaKind::Voice.dir_name(), "voice_messages");
    }

    #[test]
    fn group_record_serializes_kind_as_type() {
        let chat = ChatInfo {
            id: ChatId(5),
            title: "".to_string(),
            username: None,
            kind: ChatKind::Supergroup,
            participants_count: 10,
            is_forum: true,
            creator: false,
            admin_rights: true,
            date: None,
        };
        let v = serde_json::to_value(GroupRecord::from(&chat)).unwrap();
        assert_eq!(v["type"], "Supergroup");
        assert_eq!(v["title"], "Chat_5");
        assert_eq!(v["is_forum"], true);
        assert!(v["username"].is_null());
    }

    #[test]
    fn login_state_details() {
        assert_eq!(LoginState::Authorized.detail(), None);
        assert_eq!(LoginState::PasswordRequired.detail(), Some("2fa_required"));
        assert_eq!(LoginState::NotStarted.detail(), Some("login_not_started"));
    }
}
