//! Bounded media download pool shared by the full export and the organized
//! media download.

use std::{path::PathBuf, sync::Arc, time::Duration};

use serde::Serialize;
use tokio::{
    sync::Semaphore,
    task::{JoinError, JoinSet},
    time::Instant,
};

use crate::{
    domain::{ChatId, HistoryMessage, MessageId},
    errors::Error,
    metrics::TransferMetrics,
    ports::TelegramClient,
    Result,
};

/// Entry of `download_log.json`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DownloadedFile {
    pub message_id: i32,
    pub date: String,
    pub path: String,
    pub topic: Option<String>,
}

/// What a pool did once every download has finished.
#[derive(Debug)]
pub(crate) struct DownloadReport {
    pub metrics: TransferMetrics,
    pub files: Vec<DownloadedFile>,
}

struct Job {
    id: MessageId,
    date: String,
    topic: Option<String>,
    res: Result<Option<(PathBuf, Duration)>>,
}

/// Media downloads of one chat, at most `concurrency` in flight.
pub(crate) struct DownloadPool {
    client: Arc<dyn TelegramClient>,
    chat: ChatId,
    max_file_size: u64,
    permits: Arc<Semaphore>,
    tasks: JoinSet<Job>,
    report: DownloadReport,
}

impl DownloadPool {
    pub fn new(
        client: Arc<dyn TelegramClient>,
        chat: ChatId,
        max_file_size: u64,
        concurrency: usize,
    ) -> Self {
        Self {
            client,
            chat,
            max_file_size,
            permits: Arc::new(Semaphore::new(concurrency.max(1))),
            tasks: JoinSet::new(),
            report: DownloadReport {
                metrics: TransferMetrics::new(),
                files: Vec::new(),
            },
        }
    }

    /// Queue the media of `msg` for download to `stem` (the adapter adds the
    /// extension). Waits for a free slot, so paging through history never runs
    /// far ahead of the downloads.
    pub async fn submit(
        &mut self,
        msg: &HistoryMessage,
        stem: PathBuf,
        topic: Option<String>,
    ) -> Result<()> {
        let Some(media) = &msg.media else {
            return Ok(());
        };
        if let Some(size) = media.size {
            if size > self.max_file_size {
                tracing::warn!(
                    "Skipping media of message {}: {size} bytes exceeds the {} byte limit",
                    msg.id.0,
                    self.max_file_size
                );
                self.report.metrics.record_skip();
                return Ok(());
            }
        }

        let permit = self
            .permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| Error::Cancelled)?;
        self.collect_finished();

        let client = self.client.clone();
        let chat = self.chat;
        let id = msg.id;
        let date = msg.date.to_rfc3339();
        self.tasks.spawn(async move {
            let _permit = permit;
            let started = Instant::now();
            let res = client
                .download_media(chat, id, &stem)
                .await
                .map(|p| p.map(|p| (p, started.elapsed())));
            Job {
                id,
                date,
                topic,
                res,
            }
        });
        Ok(())
    }

    fn collect_finished(&mut self) {
        while let Some(joined) = self.tasks.try_join_next() {
            self.record(joined);
        }
    }

    fn record(&mut self, joined: std::result::Result<Job, JoinError>) {
        let job = match joined {
            Ok(job) => job,
            Err(e) => {
                tracing::error!("Download task failed: {e}");
                self.report.metrics.record_failure();
                return;
            }
        };
        match job.res {
            Ok(Some((path, elapsed))) => {
                let bytes = std::fs::metadata(&path).map(|m| m.len()).unwrap_or(0);
                tracing::debug!(
                    "Downloaded media of message {} to '{}'",
                    job.id.0,
                    path.display()
                );
                self.report.metrics.record_success(bytes, elapsed);
                self.report.files.push(DownloadedFile {
                    message_id: job.id.0,
                    date: job.date,
                    path: path.display().to_string(),
                    topic: job.topic,
                });
            }
            Ok(None) => {
                tracing::debug!("Message {} has nothing downloadable", job.id.0);
                self.report.metrics.record_skip();
            }
            Err(e) => {
                tracing::error!("Failed to download media of message {}: {e}", job.id.0);
                self.report.metrics.record_failure();
            }
        }
    }

    /// Wait for every queued download.
    pub async fn finish(mut self) -> DownloadReport {
        while let Some(joined) = self.tasks.join_next().await {
            self.record(joined);
        }
        self.report.files.sort_by_key(|f| f.message_id);
        self.report
    }
}
