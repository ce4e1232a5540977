//! Mapping between grammers types and `tgm-core` domain types.

use chrono::{DateTime, TimeZone, Utc};
use grammers_client::{
    types::{Chat, Media, Message},
    InvocationError,
};
use grammers_tl_types as tl;

use tgm_core::{
    domain::{
        ChatId, ChatInfo, ChatKind, ForumTopic, HistoryMessage, IdMark, MediaInfo, MediaKind,
        MessageId,
    },
    errors::Error,
    Result,
};

/// Id namespace of a peer. Users, basic groups and channels number their ids
/// independently, so a bare id alone does not name a chat.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub(crate) enum PeerKind {
    User,
    BasicGroup,
    Channel,
}

pub(crate) type PeerKey = (PeerKind, i64);

pub(crate) fn peer_key(chat: &Chat) -> PeerKey {
    let kind = match chat {
        Chat::User(_) => PeerKind::User,
        Chat::Group(group) => match &group.raw {
            tl::enums::Chat::Channel(_) | tl::enums::Chat::ChannelForbidden(_) => {
                PeerKind::Channel
            }
            _ => PeerKind::BasicGroup,
        },
        Chat::Channel(_) => PeerKind::Channel,
    };
    (kind, chat.id())
}

/// Cache keys `id` may name, most likely first. Marked ids name exactly one
/// peer; a bare id prefers groups and channels over users.
pub(crate) fn lookup_keys(id: ChatId) -> Result<Vec<PeerKey>> {
    let (mark, bare) = id.unmark()?;
    Ok(match mark {
        IdMark::Channel => vec![(PeerKind::Channel, bare.0)],
        IdMark::BasicGroup => vec![(PeerKind::BasicGroup, bare.0)],
        IdMark::Unmarked => vec![
            (PeerKind::Channel, bare.0),
            (PeerKind::BasicGroup, bare.0),
            (PeerKind::User, bare.0),
        ],
    })
}

fn unix_date(ts: i32) -> Option<DateTime<Utc>> {
    Utc.timestamp_opt(i64::from(ts), 0).single()
}

fn count(n: Option<i32>) -> u64 {
    n.and_then(|n| u64::try_from(n).ok()).unwrap_or(0)
}

pub(crate) fn chat_info(chat: &Chat) -> ChatInfo {
    let mut info = ChatInfo {
        id: ChatId(chat.id()),
        title: chat.name().to_string(),
        username: chat.username().map(str::to_string),
        kind: ChatKind::User,
        participants_count: 0,
        is_forum: false,
        creator: false,
        admin_rights: false,
        date: None,
    };

    match chat {
        Chat::User(_) => {}
        Chat::Group(group) => match &group.raw {
            tl::enums::Chat::Chat(c) => {
                info.kind = ChatKind::Group;
                info.participants_count = count(Some(c.participants_count));
                info.creator = c.creator;
                info.admin_rights = c.admin_rights.is_some();
                info.date = unix_date(c.date);
            }
            tl::enums::Chat::Channel(c) => {
                info.kind = ChatKind::Supergroup;
                info.participants_count = count(c.participants_count);
                info.is_forum = c.forum;
                info.creator = c.creator;
                info.admin_rights = c.admin_rights.is_some();
                info.date = unix_date(c.date);
            }
            _ => info.kind = ChatKind::Group,
        },
        Chat::Channel(channel) => {
            let c = &channel.raw;
            info.kind = if c.megagroup {
                ChatKind::Supergroup
            } else {
                ChatKind::Channel
            };
            info.participants_count = count(c.participants_count);
            info.is_forum = c.forum;
            info.creator = c.creator;
            info.admin_rights = c.admin_rights.is_some();
            info.date = unix_date(c.date);
        }
    }
    info
}

/// File extension (with dot) for a MIME type we know how to name.
pub(crate) fn extension_for_mime(mime: &str) -> Option<&'static str> {
    Some(match mime {
        "image/jpeg" => ".jpg",
        "image/png" => ".png",
        "image/gif" => ".gif",
        "image/webp" => ".webp",
        "video/mp4" => ".mp4",
        "video/quicktime" => ".mov",
        "video/webm" => ".webm",
        "audio/mpeg" => ".mp3",
        "audio/ogg" => ".ogg",
        "audio/mp4" | "audio/m4a" => ".m4a",
        "application/pdf" => ".pdf",
        "application/zip" => ".zip",
        "application/x-tgsticker" => ".tgs",
        "text/plain" => ".txt",
        _ => return None,
    })
}

fn kind_for_mime(mime: &str) -> MediaKind {
    match mime {
        "" => MediaKind::Other,
        "audio/ogg" => MediaKind::Voice,
        m if m.starts_with("image/") => MediaKind::Photo,
        m if m.starts_with("video/") => MediaKind::Video,
        m if m.starts_with("audio/") => MediaKind::Audio,
        _ => MediaKind::Document,
    }
}

pub(crate) fn media_info(media: &Media) -> Option<MediaInfo> {
    match media {
        Media::Photo(_) => Some(MediaInfo {
            kind: MediaKind::Photo,
            size: None,
            extension: Some(".jpg".to_string()),
        }),
        Media::Sticker(_) => Some(MediaInfo {
            kind: MediaKind::Sticker,
            size: None,
            extension: Some(".webp".to_string()),
        }),
        Media::Document(doc) => {
            let mime = doc.mime_type().unwrap_or_default();
            let from_name = std::path::Path::new(doc.name())
                .extension()
                .and_then(|e| e.to_str())
                .filter(|e| !e.is_empty())
                .map(|e| format!(".{e}"));
            Some(MediaInfo {
                kind: kind_for_mime(mime),
                size: u64::try_from(doc.size()).ok(),
                extension: from_name.or_else(|| extension_for_mime(mime).map(str::to_string)),
            })
        }
        // Contacts, polls, locations and web previews have nothing to download.
        _ => None,
    }
}

pub(crate) fn history_message(m: &Message) -> HistoryMessage {
    HistoryMessage {
        id: MessageId(m.id()),
        date: m.date(),
        text: m.text().to_string(),
        sender_id: m.sender().map(|s| s.id()),
        reply_to_msg_id: m.reply_to_message_id().map(MessageId),
        topic_id: forum_topic(m.raw.reply_to.as_ref()),
        media: m.media().as_ref().and_then(media_info),
        views: count(m.view_count()),
        forwards: count(m.forward_count()),
    }
}

/// Root message of the forum topic a message was posted in. Messages of the
/// General topic carry no topic header.
fn forum_topic(reply: Option<&tl::enums::MessageReplyHeader>) -> Option<MessageId> {
    match reply? {
        tl::enums::MessageReplyHeader::Header(h) if h.forum_topic => {
            h.reply_to_top_id.or(h.reply_to_msg_id).map(MessageId)
        }
        _ => None,
    }
}

pub(crate) fn forum_topics(topics: tl::enums::messages::ForumTopics) -> Vec<ForumTopic> {
    let tl::enums::messages::ForumTopics::Topics(topics) = topics;
    topics
        .topics
        .into_iter()
        .filter_map(|t| match t {
            tl::enums::ForumTopic::Topic(t) => Some(ForumTopic {
                id: MessageId(t.id),
                title: t.title,
            }),
            tl::enums::ForumTopic::Deleted(_) => None,
        })
        .collect()
}

/// Map an RPC error to the core error type. `chat` is the peer the request
/// was about, if any.
pub(crate) fn map_rpc_error(code: i32, name: &str, value: Option<u32>, chat: Option<ChatId>) -> Error {
    match name {
        "FLOOD_WAIT" | "FLOOD_PREMIUM_WAIT" | "SLOWMODE_WAIT" => Error::FloodWait {
            seconds: value.unwrap_or(1),
        },
        "AUTH_KEY_UNREGISTERED" | "SESSION_REVOKED" | "SESSION_EXPIRED" | "USER_DEACTIVATED" => {
            Error::NotAuthorized
        }
        "PEER_ID_INVALID" | "CHANNEL_INVALID" | "CHANNEL_PRIVATE" | "CHAT_ID_INVALID"
        | "MSG_ID_INVALID" => match chat {
            Some(chat) if name != "MSG_ID_INVALID" => Error::ChatNotFound(chat.0),
            _ => Error::InvalidInput(name.to_string()),
        },
        "CHAT_ADMIN_REQUIRED" | "USER_NOT_PARTICIPANT" => Error::PermissionDenied(name.to_string()),
        n if n.ends_with("_FORBIDDEN") => Error::PermissionDenied(n.to_string()),
        _ if code >= 500 || code < 0 => Error::Network(format!("{code} {name}")),
        _ => Error::External(format!("{code} {name}")),
    }
}

pub(crate) fn map_invocation(e: InvocationError, chat: Option<ChatId>) -> Error {
    match e {
        InvocationError::Rpc(rpc) => map_rpc_error(rpc.code, &rpc.name, rpc.value, chat),
        other => Error::Network(other.to_string()),
    }
}
