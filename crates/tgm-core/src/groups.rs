use serde::Serialize;
use tokio::time::sleep;

use crate::{
    domain::{ChatId, ChatKind, ChatRecord, GroupRecord},
    manager::GroupManager,
    metrics::timed,
    ports::Confirmer,
    retry::retry,
    Result,
};

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct GroupsSummary {
    pub total: usize,
    pub supergroups: usize,
    pub groups: usize,
    pub forums: usize,
    pub creator: usize,
    pub admin: usize,
}

impl GroupsSummary {
    pub fn of(groups: &[GroupRecord]) -> Self {
        Self {
            total: groups.len(),
            supergroups: groups
                .iter()
                .filter(|g| g.kind == ChatKind::Supergroup)
                .count(),
            groups: groups.iter().filter(|g| g.kind == ChatKind::Group).count(),
            forums: groups.iter().filter(|g| g.is_forum).count(),
            creator: groups.iter().filter(|g| g.creator).count(),
            admin: groups.iter().filter(|g| g.admin_rights).count(),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct GroupListing {
    pub groups: Vec<GroupRecord>,
    pub summary: GroupsSummary,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LeaveOutcome {
    Left { title: String },
    Cancelled,
}

impl LeaveOutcome {
    pub fn is_left(&self) -> bool {
        matches!(self, LeaveOutcome::Left { .. })
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct LeaveSummary {
    pub successful: usize,
    pub failed: usize,
    /// The batch confirmation was declined; nothing was attempted.
    #[serde(skip)]
    pub cancelled: bool,
}

impl GroupManager {
    /// List groups and supergroups (channels and private chats are skipped)
    /// and save them to `groups_list.json`.
    pub async fn list_groups(&self) -> Result<GroupListing> {
        timed("Export groups only", async {
            let dialogs = self.client.list_dialogs(self.opts.dialog_limit).await?;
            let groups: Vec<GroupRecord> = dialogs
                .iter()
                .filter(|c| c.is_group())
                .map(GroupRecord::from)
                .collect();

            let path = self.store.groups_list_path();
            self.store.write_json(&path, &groups)?;

            let summary = GroupsSummary::of(&groups);
            tracing::info!(
                "Exported {} groups to '{}' ({} supergroups, {} groups, {} forums, creator of {}, admin of {})",
                summary.total,
                path.display(),
                summary.supergroups,
                summary.groups,
                summary.forums,
                summary.creator,
                summary.admin
            );
            Ok(GroupListing { groups, summary })
        })
        .await
    }

    /// Save every dialog (groups, channels, users) to `chat_list.json`.
    pub async fn export_chat_list(&self) -> Result<Vec<ChatRecord>> {
        timed("Export chat list", async {
            let dialogs = self.client.list_dialogs(self.opts.dialog_limit).await?;
            let chats: Vec<ChatRecord> = dialogs.iter().map(ChatRecord::from).collect();
            let path = self.store.chat_list_path();
            self.store.write_json(&path, &chats)?;
            tracing::info!("Exported {} chats to '{}'", chats.len(), path.display());
            Ok(chats)
        })
        .await
    }

    /// Leave one group, asking `confirmer` first when `confirm` is set.
    pub async fn leave_group(
        &self,
        group_id: ChatId,
        confirm: bool,
        confirmer: &dyn Confirmer,
    ) -> Result<LeaveOutcome> {
        tracing::info!("Leaving group {group_id}");
        let chat = retry(&self.opts.retry, "resolve group", || {
            self.client.resolve_chat(group_id)
        })
        .await?;
        let title = chat.display_title();
        tracing::info!("Group found: {title}");

        if confirm {
            let prompt = format!("Are you sure you want to leave '{title}'?");
            if !confirmer.confirm(&prompt).await {
                tracing::info!("Leaving '{title}' cancelled by the user");
                return Ok(LeaveOutcome::Cancelled);
            }
        }

        retry(&self.opts.retry, "leave group", || {
            self.client.leave_chat(&chat)
        })
        .await?;
        tracing::info!("Left group '{title}'");
        Ok(LeaveOutcome::Left { title })
    }

    /// Leave several groups in turn.
    ///
    /// Without `confirm_each` a single confirmation covers the whole batch.
    /// Declined or failed groups count as failed.
    pub async fn leave_multiple(
        &self,
        group_ids: &[ChatId],
        confirm_each: bool,
        confirmer: &dyn Confirmer,
    ) -> Result<LeaveSummary> {
        tracing::info!("Leaving {} groups", group_ids.len());
        if group_ids.is_empty() {
            return Ok(LeaveSummary::default());
        }

        if !confirm_each {
            let prompt = format!(
                "Are you sure you want to leave {} groups?",
                group_ids.len()
            );
            if !confirmer.confirm(&prompt).await {
                tracing::info!("Leaving {} groups cancelled by the user", group_ids.len());
                return Ok(LeaveSummary {
                    cancelled: true,
                    ..LeaveSummary::default()
                });
            }
        }

        let name = format!("Leave {} groups", group_ids.len());
        let summary = timed(&name, async {
            let mut summary = LeaveSummary::default();
            for (i, id) in group_ids.iter().enumerate() {
                match self.leave_group(*id, confirm_each, confirmer).await {
                    Ok(LeaveOutcome::Left { .. }) => summary.successful += 1,
                    Ok(LeaveOutcome::Cancelled) => summary.failed += 1,
                    Err(e) => {
                        tracing::error!("Failed to leave group {id}: {e}");
                        summary.failed += 1;
                    }
                }
                if i + 1 < group_ids.len() && !self.opts.leave_delay.is_zero() {
                    sleep(self.opts.leave_delay).await;
                }
            }
            Ok(summary)
        })
        .await?;

        tracing::info!(
            "Leaving groups finished: {} succeeded, {} failed",
            summary.successful,
            summary.failed
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, time::Duration};

    use super::*;
    use crate::{
        errors::Error,
        manager::ManagerOptions,
        ports::AutoConfirm,
        retry::RetryPolicy,
        storage::ExportStore,
        testing::{chat, FakeTelegram, ScriptedConfirmer},
    };

    fn opts() -> ManagerOptions {
        ManagerOptions {
            leave_delay: Duration::ZERO,
            retry: RetryPolicy {
                max_attempts: 3,
                base_delay: Duration::from_millis(1),
                exponential: true,
                max_flood_wait: Duration::from_secs(1),
            },
            ..ManagerOptions::default()
        }
    }

    fn dialogs() -> Vec<crate::domain::ChatInfo> {
        let mut forum = chat(3, "Forum", ChatKind::Supergroup);
        forum.is_forum = true;
        forum.admin_rights = true;
        let mut owned = chat(4, "Mine", ChatKind::Group);
        owned.creator = true;
        vec![
            chat(1, "Alice", ChatKind::User),
            chat(2, "News", ChatKind::Channel),
            forum,
            owned,
            chat(5, "Big", ChatKind::Supergroup),
        ]
    }

    fn manager(fake: Arc<FakeTelegram>, root: &std::path::Path) -> GroupManager {
        GroupManager::new(fake, ExportStore::new(root), opts())
    }

    #[tokio::test]
    async fn list_groups_keeps_only_groups_and_writes_json() {
        let dir = tempfile::tempdir().unwrap();
        let fake = Arc::new(FakeTelegram::new().with_dialogs(dialogs()));
        let mgr = manager(fake, dir.path());

        let listing = mgr.list_groups().await.unwrap();
        let ids: Vec<i64> = listing.groups.iter().map(|g| g.id).collect();
        assert_eq!(ids, vec![3, 4, 5]);
        assert_eq!(
            listing.summary,
            GroupsSummary {
                total: 3,
                supergroups: 2,
                groups: 1,
                forums: 1,
                creator: 1,
                admin: 1,
            }
        );

        let saved: Vec<GroupRecord> = serde_json::from_str(
            &std::fs::read_to_string(dir.path().join("groups_list.json")).unwrap(),
        )
        .unwrap();
        assert_eq!(saved, listing.groups);
    }

    #[tokio::test]
    async fn export_chat_list_includes_every_dialog() {
        let dir = tempfile::tempdir().unwrap();
        let fake = Arc::new(FakeTelegram::new().with_dialogs(dialogs()));
        let mgr = manager(fake, dir.path());

        let chats = mgr.export_chat_list().await.unwrap();
        assert_eq!(chats.len(), 5);
        assert!(dir.path().join("chat_list.json").exists());
    }

    #[tokio::test]
    async fn leave_group_asks_and_respects_decline() {
        let dir = tempfile::tempdir().unwrap();
        let fake = Arc::new(FakeTelegram::new().with_dialogs(dialogs()));
        let mgr = manager(fake.clone(), dir.path());

        let confirmer = ScriptedConfirmer::new(&[false]);
        let out = mgr.leave_group(ChatId(3), true, &confirmer).await.unwrap();
        assert_eq!(out, LeaveOutcome::Cancelled);
        assert_eq!(confirmer.prompts().len(), 1);
        assert!(confirmer.prompts()[0].contains("Forum"));
        assert!(fake.left().is_empty());

        let out = mgr
            .leave_group(ChatId(3), false, &AutoConfirm(false))
            .await
            .unwrap();
        assert!(out.is_left());
        assert_eq!(fake.left(), vec![ChatId(3)]);
    }

    #[tokio::test]
    async fn leave_group_accepts_marked_ids_and_reports_unknown_ones() {
        let dir = tempfile::tempdir().unwrap();
        let fake = Arc::new(FakeTelegram::new().with_dialogs(vec![chat(
            1234567890,
            "Marked",
            ChatKind::Supergroup,
        )]));
        let mgr = manager(fake.clone(), dir.path());

        mgr.leave_group(ChatId(-1001234567890), false, &AutoConfirm(true))
            .await
            .unwrap();
        assert_eq!(fake.left(), vec![ChatId(1234567890)]);

        let err = mgr
            .leave_group(ChatId(99), false, &AutoConfirm(true))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ChatNotFound(99)));
    }

    #[tokio::test]
    async fn leave_group_retries_flood_waits() {
        let dir = tempfile::tempdir().unwrap();
        let fake = Arc::new(FakeTelegram::new().with_dialogs(dialogs()));
        fake.fail_next_leave(Error::FloodWait { seconds: 0 });
        let mgr = manager(fake.clone(), dir.path());

        let out = mgr
            .leave_group(ChatId(4), false, &AutoConfirm(true))
            .await
            .unwrap();
        assert_eq!(
            out,
            LeaveOutcome::Left {
                title: "Mine".to_string()
            }
        );
        assert_eq!(fake.left(), vec![ChatId(4)]);
    }

    #[tokio::test]
    async fn leave_multiple_batch_confirmation() {
        let dir = tempfile::tempdir().unwrap();
        let fake = Arc::new(FakeTelegram::new().with_dialogs(dialogs()));
        let mgr = manager(fake.clone(), dir.path());

        let declined = mgr
            .leave_multiple(&[ChatId(3), ChatId(4)], false, &ScriptedConfirmer::new(&[false]))
            .await
            .unwrap();
        assert!(declined.cancelled);
        assert_eq!((declined.successful, declined.failed), (0, 0));
        assert!(fake.left().is_empty());

        let confirmer = ScriptedConfirmer::new(&[true]);
        let summary = mgr
            .leave_multiple(&[ChatId(3), ChatId(404), ChatId(4)], false, &confirmer)
            .await
            .unwrap();
        assert_eq!((summary.successful, summary.failed), (2, 1));
        assert_eq!(confirmer.prompts().len(), 1);
        assert_eq!(fake.left(), vec![ChatId(3), ChatId(4)]);
    }

    #[tokio::test]
    async fn leave_multiple_confirm_each_counts_declines_as_failed() {
        let dir = tempfile::tempdir().unwrap();
        let fake = Arc::new(FakeTelegram::new().with_dialogs(dialogs()));
        let mgr = manager(fake.clone(), dir.path());

        let confirmer = ScriptedConfirmer::new(&[true, false, true]);
        let summary = mgr
            .leave_multiple(&[ChatId(3), ChatId(4), ChatId(5)], true, &confirmer)
            .await
            .unwrap();
        assert_eq!((summary.successful, summary.failed), (2, 1));
        assert_eq!(confirmer.prompts().len(), 3);
        assert_eq!(fake.left(), vec![ChatId(3), ChatId(5)]);
    }

    #[tokio::test(start_paused = true)]
    async fn leave_multiple_pauses_between_groups() {
        let dir = tempfile::tempdir().unwrap();
        let fake = Arc::new(FakeTelegram::new().with_dialogs(dialogs()));
        let opts = ManagerOptions {
            leave_delay: Duration::from_secs(1),
            ..opts()
        };
        let mgr = GroupManager::new(fake.clone(), ExportStore::new(dir.path()), opts);

        let started = tokio::time::Instant::now();
        let summary = mgr
            .leave_multiple(&[ChatId(3), ChatId(4), ChatId(5)], false, &AutoConfirm(true))
            .await
            .unwrap();
        let elapsed = started.elapsed();

        assert_eq!(summary.successful, 3);
        assert!(elapsed >= Duration::from_secs(2), "{elapsed:?}");
        assert!(elapsed < Duration::from_secs(3), "{elapsed:?}");
    }
}
