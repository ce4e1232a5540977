use chrono::Utc;
use serde::Serialize;
use serde_json::json;

use crate::{
    domain::{ChatId, MessageRecord},
    download::DownloadPool,
    manager::GroupManager,
    metrics::timed,
    ports::{Progress, ProgressSink},
    retry::retry,
    Result,
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExportOptions {
    pub group_id: ChatId,
    pub include_media: bool,
    pub include_messages: bool,
    /// Newest messages to walk; `None` means the whole history.
    pub limit: Option<usize>,
}

impl ExportOptions {
    pub fn new(group_id: ChatId) -> Self {
        Self {
            group_id,
            include_media: true,
            include_messages: true,
            limit: None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ExportStats {
    pub group_name: String,
    pub messages_exported: usize,
    pub media_downloaded: usize,
    pub export_directory: String,
}

impl GroupManager {
    /// Export metadata, messages, media and participants of one group to
    /// `full_exports/<Name>_<ID>/`.
    pub async fn export_group_content(
        &self,
        opts: ExportOptions,
        progress: &dyn ProgressSink,
    ) -> Result<ExportStats> {
        let name = format!("Export group {}", opts.group_id);
        timed(&name, self.export_group_inner(opts, progress)).await
    }

    async fn export_group_inner(
        &self,
        opts: ExportOptions,
        progress: &dyn ProgressSink,
    ) -> Result<ExportStats> {
        let chat = retry(&self.opts.retry, "resolve group", || {
            self.client.resolve_chat(opts.group_id)
        })
        .await?;
        let title = chat.display_title();
        let dir = self.store.group_export_dir(&title, chat.id);
        tracing::info!("Exporting '{title}' to '{}'", dir.display());

        let metadata = json!({
            "group_id": chat.id.0,
            "group_name": title,
            "export_date": Utc::now().to_rfc3339(),
            "type": chat.kind.as_str(),
            "participants_count": chat.participants_count,
            "username": chat.username,
            "is_forum": chat.is_forum,
        });
        self.store.write_json(&dir.join("metadata.json"), &metadata)?;

        let limit = match opts.limit {
            Some(n) => n,
            None => match self.client.message_count(chat.id).await {
                Ok(Some(n)) => usize::try_from(n).unwrap_or(usize::MAX),
                Ok(None) => self.opts.fallback_export_limit,
                Err(e) => {
                    tracing::warn!("Could not count messages of '{title}': {e}");
                    self.opts.fallback_export_limit
                }
            },
        };

        progress.update(Progress::Started {
            label: format!("Exporting {title}"),
            total: Some(limit as u64),
        });

        let media_dir = dir.join("media");
        let mut pool = opts.include_media.then(|| {
            DownloadPool::new(
                self.client.clone(),
                chat.id,
                self.opts.max_file_size,
                self.opts.concurrent_downloads,
            )
        });
        let mut records = Vec::new();
        let mut processed = 0usize;
        let mut offset = None;

        while processed < limit {
            let page_size = self.opts.history_page_size.min(limit - processed);
            let page = retry(&self.opts.retry, "fetch history", || {
                self.client.fetch_history(chat.id, offset, page_size)
            })
            .await?;
            let Some(last) = page.last() else {
                break;
            };
            offset = Some(last.id);

            for msg in page.iter().take(limit - processed) {
                processed += 1;
                if opts.include_messages {
                    records.push(MessageRecord::from(msg));
                }
                if let Some(pool) = pool.as_mut() {
                    let stem = media_dir.join(format!(
                        "msg_{}_{}",
                        msg.id.0,
                        msg.date.format("%Y%m%d_%H%M%S")
                    ));
                    pool.submit(msg, stem, None).await?;
                }
                progress.update(Progress::Advanced {
                    done: processed as u64,
                });
            }
            if page.len() < page_size {
                break;
            }
        }

        let media_downloaded = match pool {
            Some(pool) => {
                let report = pool.finish().await;
                report.metrics.log_statistics();
                report.metrics.successful() as usize
            }
            None => 0,
        };

        if opts.include_messages {
            self.store.write_json(&dir.join("messages.json"), &records)?;
        }

        match self.client.participants(chat.id).await {
            Ok(participants) if !participants.is_empty() => {
                self.store
                    .write_json(&dir.join("participants.json"), &participants)?;
                tracing::info!("Exported {} participants", participants.len());
            }
            Ok(_) => tracing::info!("No participants to export for '{title}'"),
            Err(e) => {
                tracing::warn!("Could not export participants of '{title}' (admin rights required?): {e}")
            }
        }

        progress.update(Progress::Finished);
        let stats = ExportStats {
            group_name: title,
            messages_exported: processed,
            media_downloaded,
            export_directory: dir.display().to_string(),
        };
        tracing::info!(
            "Export of '{}' done: {} messages, {} media files",
            stats.group_name,
            stats.messages_exported,
            stats.media_downloaded
        );
        Ok(stats)
    }
}
