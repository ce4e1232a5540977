use std::collections::{BTreeMap, HashMap};

use serde::Serialize;

use crate::{
    domain::{ChatId, ChatInfo, MessageId},
    download::DownloadPool,
    manager::GroupManager,
    metrics::timed,
    ports::{Progress, ProgressSink},
    retry::retry,
    storage::sanitize_filename,
    Result,
};

/// Outcome of the organized media download of one chat.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ChatMediaStats {
    pub chat_name: String,
    pub messages_processed: usize,
    pub downloaded: u64,
    pub failed: u64,
    pub skipped: u64,
    /// Files per forum topic; empty for chats without topics.
    pub topics: BTreeMap<String, usize>,
    pub directory: String,
}

/// Outcome of a multi-chat media download. A chat without any media counts
/// as neither.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct MediaDownloadSummary {
    pub success: usize,
    pub failed: usize,
    #[serde(skip)]
    pub chats: Vec<ChatMediaStats>,
}

impl GroupManager {
    /// Download the media of every chat in `chat_ids`, one chat at a time.
    ///
    /// Unreachable chats, chats whose history cannot be read and chats whose
    /// download fails count as failed; the remaining chats are still
    /// processed.
    pub async fn download_media(
        &self,
        chat_ids: &[ChatId],
        limit: Option<usize>,
        progress: &dyn ProgressSink,
    ) -> Result<MediaDownloadSummary> {
        let name = format!("Download media of {} chats", chat_ids.len());
        timed(&name, async {
            let mut summary = MediaDownloadSummary::default();
            for (i, id) in chat_ids.iter().enumerate() {
                tracing::info!("Processing chat {}/{}: {id}", i + 1, chat_ids.len());
                let chat = match retry(&self.opts.retry, "resolve chat", || {
                    self.client.resolve_chat(*id)
                })
                .await
                {
                    Ok(chat) => chat,
                    Err(e) => {
                        tracing::warn!("Cannot access chat {id}: {e}");
                        summary.failed += 1;
                        continue;
                    }
                };
                if let Err(e) = self.client.fetch_history(chat.id, None, 1).await {
                    tracing::warn!("No permission to read '{}': {e}", chat.display_title());
                    summary.failed += 1;
                    continue;
                }

                match self.download_chat(&chat, limit, progress).await {
                    Ok(stats) => {
                        if stats.downloaded > 0 {
                            summary.success += 1;
                        } else {
                            tracing::info!("No media found in '{}'", stats.chat_name);
                        }
                        summary.chats.push(stats);
                    }
                    Err(e) => {
                        tracing::error!("Media download of '{}' failed: {e}", chat.display_title());
                        summary.failed += 1;
                    }
                }
            }
            tracing::info!(
                "Media download finished: {} chats succeeded, {} failed",
                summary.success,
                summary.failed
            );
            Ok(summary)
        })
        .await
    }

    /// Download the media of one chat into `<Name>_<ID>/[<Topic>/]<kind>/`.
    pub async fn download_chat_media(
        &self,
        chat: ChatId,
        limit: Option<usize>,
        progress: &dyn ProgressSink,
    ) -> Result<ChatMediaStats> {
        let chat = retry(&self.opts.retry, "resolve chat", || {
            self.client.resolve_chat(chat)
        })
        .await?;
        self.download_chat(&chat, limit, progress).await
    }

    async fn download_chat(
        &self,
        chat: &ChatInfo,
        limit: Option<usize>,
        progress: &dyn ProgressSink,
    ) -> Result<ChatMediaStats> {
        let title = chat.display_title();
        let name = format!("Download chat {title}");
        timed(&name, async {
            let topics = self.topics_of(chat).await;
            let base = self.store.media_dir(&title, chat.id);
            tracing::info!("Downloading media of '{title}' to '{}'", base.display());

            let limit = limit.unwrap_or(self.opts.media_limit_per_chat);
            let messages = self.recent_messages(chat.id, limit).await?;
            progress.update(Progress::Started {
                label: format!("Downloading {title}"),
                total: Some(messages.len() as u64),
            });
            let mut pool = DownloadPool::new(
                self.client.clone(),
                chat.id,
                self.opts.max_file_size,
                self.opts.concurrent_downloads,
            );
            for (done, msg) in messages.iter().enumerate() {
                progress.update(Progress::Advanced {
                    done: done as u64 + 1,
                });
                let Some(media) = &msg.media else {
                    continue;
                };
                let topic = msg.topic_id.and_then(|t| topics.get(&t)).cloned();
                let dir = match &topic {
                    Some(t) => base.join(sanitize_filename(t)),
                    None => base.clone(),
                };
                let stem = dir.join(media.kind.dir_name()).join(format!(
                    "msg_{}_{}",
                    msg.id.0,
                    msg.date.format("%Y%m%d_%H%M%S")
                ));
                pool.submit(msg, stem, topic).await?;
            }

            let report = pool.finish().await;
            progress.update(Progress::Finished);
            report.metrics.log_statistics();
            if !report.files.is_empty() {
                self.store
                    .write_json(&base.join("download_log.json"), &report.files)?;
            }

            let mut per_topic = BTreeMap::new();
            for topic in report.files.iter().filter_map(|f| f.topic.clone()) {
                *per_topic.entry(topic).or_insert(0) += 1;
            }
            for (topic, n) in &per_topic {
                tracing::info!("Topic '{topic}': {n} files");
            }

            let snapshot = report.metrics.snapshot();
            Ok(ChatMediaStats {
                chat_name: title.clone(),
                messages_processed: messages.len(),
                downloaded: snapshot.successful,
                failed: report.metrics.failed(),
                skipped: snapshot.skipped,
                topics: per_topic,
                directory: base.display().to_string(),
            })
        })
        .await
    }

    /// Topic titles by root message, for forum supergroups. A failed lookup
    /// only loses the per-topic layout.
    async fn topics_of(&self, chat: &ChatInfo) -> HashMap<MessageId, String> {
        if !chat.is_forum {
            return HashMap::new();
        }
        match retry(&self.opts.retry, "forum topics", || {
            self.client.forum_topics(chat.id)
        })
        .await
        {
            Ok(topics) => {
                tracing::info!("Found {} forum topics", topics.len());
                topics.into_iter().map(|t| (t.id, t.title)).collect()
            }
            Err(e) => {
                tracing::warn!("Could not list forum topics: {e}");
                HashMap::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{path::Path, sync::Arc};

    use super::*;
    use crate::{
        domain::{ChatKind, MediaKind},
        errors::Error,
        manager::ManagerOptions,
        ports::NoProgress,
        storage::ExportStore,
        testing::{chat, kind_message, text_message, FakeTelegram},
    };

    fn manager(fake: Arc<FakeTelegram>, root: &Path) -> GroupManager {
        GroupManager::new(fake, ExportStore::new(root), ManagerOptions::default())
    }

    fn forum() -> ChatInfo {
        let mut forum = chat(5, "Dev Forum", ChatKind::Supergroup);
        forum.is_forum = true;
        forum
    }

    #[tokio::test]
    async fn files_media_by_kind_and_topic() {
        let dir = tempfile::tempdir().unwrap();
        let fake = Arc::new(
            FakeTelegram::new()
                .with_dialogs(vec![forum()])
                .with_forum_topics(5, &[(100, "Releases"), (200, "Off/Topic")])
                .with_history(
                    5,
                    vec![
                        kind_message(1, MediaKind::Photo, ".jpg", None),
                        text_message(2, "no media"),
                        kind_message(3, MediaKind::Video, ".mp4", Some(100)),
                        kind_message(4, MediaKind::Voice, ".ogg", Some(200)),
                        kind_message(5, MediaKind::Document, ".pdf", Some(999)),
                    ],
                ),
        );
        let mgr = manager(fake.clone(), dir.path());

        let stats = mgr
            .download_chat_media(ChatId(5), None, &NoProgress)
            .await
            .unwrap();

        let base = dir.path().join("Dev Forum_5");
        let mut downloads = fake.downloads();
        downloads.sort();
        let mut expected = vec![
            base.join("photos/msg_1_20240101_000100.jpg"),
            base.join("Releases/videos/msg_3_20240101_000300.mp4"),
            base.join("Off_Topic/voice_messages/msg_4_20240101_000400.ogg"),
            base.join("documents/msg_5_20240101_000500.pdf"),
        ];
        expected.sort();
        assert_eq!(downloads, expected);

        assert_eq!(stats.messages_processed, 5);
        assert_eq!(stats.downloaded, 4);
        assert_eq!(
            stats.topics,
            BTreeMap::from([("Off/Topic".to_string(), 1), ("Releases".to_string(), 1)])
        );
        assert_eq!(stats.directory, base.display().to_string());

        let log: serde_json::Value = serde_json::from_str(
            &std::fs::read_to_string(base.join("download_log.json")).unwrap(),
        )
        .unwrap();
        assert_eq!(log.as_array().unwrap().len(), 4);
        assert_eq!(log[1]["topic"], "Releases");
    }

    #[tokio::test]
    async fn topics_are_ignored_outside_forums() {
        let dir = tempfile::tempdir().unwrap();
        let fake = Arc::new(
            FakeTelegram::new()
                .with_dialogs(vec![chat(6, "Plain", ChatKind::Group)])
                .with_forum_topics(6, &[(100, "Ghost")])
                .with_history(6, vec![kind_message(1, MediaKind::Audio, ".mp3", Some(100))]),
        );
        let mgr = manager(fake.clone(), dir.path());

        let stats = mgr
            .download_chat_media(ChatId(6), None, &NoProgress)
            .await
            .unwrap();
        assert!(stats.topics.is_empty());
        assert_eq!(
            fake.downloads(),
            vec![dir.path().join("Plain_6/audio/msg_1_20240101_000100.mp3")]
        );
    }

    #[tokio::test]
    async fn limit_keeps_the_newest_messages() {
        let dir = tempfile::tempdir().unwrap();
        let history = (1..=6)
            .map(|i| kind_message(i, MediaKind::Photo, ".jpg", None))
            .collect();
        let fake = Arc::new(
            FakeTelegram::new()
                .with_dialogs(vec![chat(6, "G", ChatKind::Group)])
                .with_history(6, history),
        );
        let mgr = manager(fake.clone(), dir.path());

        let stats = mgr
            .download_chat_media(ChatId(6), Some(2), &NoProgress)
            .await
            .unwrap();
        assert_eq!(stats.downloaded, 2);
        let mut names: Vec<String> = fake
            .downloads()
            .iter()
            .filter_map(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
            .collect();
        names.sort();
        assert_eq!(
            names,
            vec!["msg_5_20240101_000500.jpg", "msg_6_20240101_000600.jpg"]
        );
    }

    #[tokio::test]
    async fn multi_chat_download_counts_successes_and_failures() {
        let dir = tempfile::tempdir().unwrap();
        let fake = Arc::new(
            FakeTelegram::new()
                .with_dialogs(vec![
                    chat(1, "Media", ChatKind::Supergroup),
                    chat(2, "Text only", ChatKind::Group),
                    chat(3, "Banned", ChatKind::Supergroup),
                ])
                .with_history(1, vec![kind_message(1, MediaKind::Photo, ".jpg", None)])
                .with_history(2, vec![text_message(1, "hi")])
                .with_history(3, vec![kind_message(1, MediaKind::Photo, ".jpg", None)])
                .with_unreadable_history(3),
        );
        let mgr = manager(fake.clone(), dir.path());

        let summary = mgr
            .download_media(
                &[ChatId(1), ChatId(2), ChatId(3), ChatId(404), ChatId(i64::MIN)],
                None,
                &NoProgress,
            )
            .await
            .unwrap();
        assert_eq!(summary.success, 1);
        assert_eq!(summary.failed, 3);
        assert_eq!(summary.chats.len(), 2);
        assert_eq!(fake.downloads().len(), 1);
    }

    #[tokio::test]
    async fn failed_downloads_are_counted() {
        let dir = tempfile::tempdir().unwrap();
        let fake = Arc::new(
            FakeTelegram::new()
                .with_dialogs(vec![chat(6, "G", ChatKind::Group)])
                .with_history(
                    6,
                    vec![
                        kind_message(1, MediaKind::Photo, ".jpg", None),
                        kind_message(2, MediaKind::Photo, ".jpg", None),
                    ],
                )
                .with_failing_download(2),
        );
        let mgr = manager(fake, dir.path());

        let stats = mgr
            .download_chat_media(ChatId(6), None, &NoProgress)
            .await
            .unwrap();
        assert_eq!(stats.downloaded, 1);
        assert_eq!(stats.failed, 1);
    }

    #[tokio::test]
    async fn unknown_chat_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let mgr = manager(Arc::new(FakeTelegram::new()), dir.path());
        let err = mgr
            .download_chat_media(ChatId(8), None, &NoProgress)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ChatNotFound(8)));
    }
}
