use crate::{
    domain::{ChatId, ChatInfo, HistoryMessage, MessageId},
    manager::GroupManager,
    metrics::timed,
    retry::{retry, retry_send},
    Result,
};

const COPY_PROGRESS_EVERY: usize = 10;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ForwardRequest {
    pub source: ChatId,
    pub destination: ChatId,
    /// Explicit messages to forward; empty or `None` means "the latest `limit`".
    pub message_ids: Option<Vec<MessageId>>,
    pub limit: Option<usize>,
    /// Case-insensitive substring the message text must contain.
    pub filter_text: Option<String>,
}

impl ForwardRequest {
    pub fn new(source: ChatId, destination: ChatId) -> Self {
        Self {
            source,
            destination,
            message_ids: None,
            limit: None,
            filter_text: None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CopyRequest {
    pub source: ChatId,
    pub destination: ChatId,
    pub limit: Option<usize>,
    pub copy_media: bool,
}

impl GroupManager {
    /// Forward messages with attribution. Returns how many were forwarded.
    pub async fn forward_conversation(&self, req: ForwardRequest) -> Result<usize> {
        let name = format!("Forward {} -> {}", req.source, req.destination);
        timed(&name, async {
            let (source, destination) = self.resolve_pair(req.source, req.destination).await?;
            tracing::info!(
                "Forwarding from '{}' to '{}'",
                source.display_title(),
                destination.display_title()
            );

            let ids: Vec<MessageId> = match req.message_ids.filter(|ids| !ids.is_empty()) {
                Some(ids) => ids,
                None => {
                    let limit = req.limit.unwrap_or(self.opts.default_transfer_limit);
                    let filter = req
                        .filter_text
                        .as_deref()
                        .filter(|f| !f.is_empty())
                        .map(str::to_lowercase);
                    self.recent_messages(source.id, limit)
                        .await?
                        .into_iter()
                        .filter(|m| match &filter {
                            Some(f) => m.text.to_lowercase().contains(f),
                            None => true,
                        })
                        .map(|m| m.id)
                        .collect()
                }
            };
            if ids.is_empty() {
                tracing::info!("No messages to forward");
                return Ok(0);
            }

            let mut forwarded = 0;
            for batch in ids.chunks(self.opts.forward_batch_size) {
                let res = retry_send(&self.opts.retry, "forward batch", || {
                    self.client.forward_messages(source.id, destination.id, batch)
                })
                .await;
                match res {
                    Ok(n) => {
                        forwarded += n;
                        tracing::info!("Forwarded {forwarded}/{} messages", ids.len());
                    }
                    Err(e) => tracing::error!(
                        "Failed to forward a batch of {} messages: {e}",
                        batch.len()
                    ),
                }
            }
            Ok(forwarded)
        })
        .await
    }

    /// Re-send messages as new ones, without attribution. Returns how many
    /// were copied.
    pub async fn copy_conversation(&self, req: CopyRequest) -> Result<usize> {
        let name = format!("Copy {} -> {}", req.source, req.destination);
        timed(&name, async {
            let (source, destination) = self.resolve_pair(req.source, req.destination).await?;
            tracing::info!(
                "Copying from '{}' to '{}'",
                source.display_title(),
                destination.display_title()
            );

            let limit = req.limit.unwrap_or(self.opts.default_transfer_limit);
            let messages = self.recent_messages(source.id, limit).await?;

            let mut copied = 0;
            for msg in &messages {
                let res = if msg.has_media() && req.copy_media {
                    retry_send(&self.opts.retry, "copy media", || {
                        self.client
                            .send_media_copy(source.id, msg.id, destination.id, &msg.text)
                    })
                    .await
                } else if !msg.text.trim().is_empty() {
                    retry_send(&self.opts.retry, "copy text", || {
                        self.client.send_text(destination.id, &msg.text)
                    })
                    .await
                } else {
                    continue;
                };

                match res {
                    Ok(()) => {
                        copied += 1;
                        if copied % COPY_PROGRESS_EVERY == 0 {
                            tracing::info!("Copied {copied} messages...");
                        }
                    }
                    Err(e) => tracing::error!("Failed to copy message {}: {e}", msg.id.0),
                }
            }
            tracing::info!("Copied {copied} of {} messages", messages.len());
            Ok(copied)
        })
        .await
    }

    async fn resolve_pair(&self, source: ChatId, destination: ChatId) -> Result<(ChatInfo, ChatInfo)> {
        let source = retry(&self.opts.retry, "resolve source chat", || {
            self.client.resolve_chat(source)
        })
        .await?;
        let destination = retry(&self.opts.retry, "resolve destination chat", || {
            self.client.resolve_chat(destination)
        })
        .await?;
        Ok((source, destination))
    }

    /// The latest `limit` messages of `chat`, oldest first.
    pub(crate) async fn recent_messages(&self, chat: ChatId, limit: usize) -> Result<Vec<HistoryMessage>> {
        let mut messages = Vec::new();
        let mut offset = None;
        while messages.len() < limit {
            let page_size = self.opts.history_page_size.min(limit - messages.len());
            let page = retry(&self.opts.retry, "fetch history", || {
                self.client.fetch_history(chat, offset, page_size)
            })
            .await?;
            let Some(last) = page.last() else {
                break;
            };
            offset = Some(last.id);
            let exhausted = page.len() < page_size;
            messages.extend(page);
            if exhausted {
                break;
            }
        }
        messages.truncate(limit);
        messages.reverse();
        Ok(messages)
    }
}
