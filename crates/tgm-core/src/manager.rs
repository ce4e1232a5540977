use std::{sync::Arc, time::Duration};

use crate::{ports::TelegramClient, retry::RetryPolicy, storage::ExportStore};

/// Telegram caps `messages.forwardMessages` at 100 ids per request.
pub const FORWARD_BATCH_LIMIT: usize = 100;

/// Tunables of [`GroupManager`].
#[derive(Clone, Debug)]
pub struct ManagerOptions {
    /// How many dialogs to scan when listing groups/chats.
    pub dialog_limit: usize,
    /// Messages taken by forward/copy when the caller gives no limit.
    pub default_transfer_limit: usize,
    /// Messages exported when neither a limit nor a server count is known.
    pub fallback_export_limit: usize,
    /// Messages scanned per chat by the organized media download.
    pub media_limit_per_chat: usize,
    pub history_page_size: usize,
    pub forward_batch_size: usize,
    pub max_file_size: u64,
    pub concurrent_downloads: usize,
    /// Pause between consecutive leaves of a multi-leave.
    pub leave_delay: Duration,
    pub retry: RetryPolicy,
}

impl Default for ManagerOptions {
    fn default() -> Self {
        Self {
            dialog_limit: 500,
            default_transfer_limit: 100,
            fallback_export_limit: 10_000,
            media_limit_per_chat: 1000,
            history_page_size: 100,
            forward_batch_size: FORWARD_BATCH_LIMIT,
            max_file_size: 1024 * 1024 * 1024,
            concurrent_downloads: 3,
            leave_delay: Duration::from_secs(1),
            retry: RetryPolicy::default(),
        }
    }
}

/// Application service behind the CLI and the HTTP API.
///
/// Operations live in `groups`, `export`, `media` and `transfer`; this type only holds
/// the client port, the export store and the options they share.
pub struct GroupManager {
    pub(crate) client: Arc<dyn TelegramClient>,
    pub(crate) store: ExportStore,
    pub(crate) opts: ManagerOptions,
}

impl GroupManager {
    pub fn new(client: Arc<dyn TelegramClient>, store: ExportStore, opts: ManagerOptions) -> Self {
        let mut opts = opts;
        opts.forward_batch_size = opts.forward_batch_size.clamp(1, FORWARD_BATCH_LIMIT);
        opts.history_page_size = opts.history_page_size.max(1);
        opts.concurrent_downloads = opts.concurrent_downloads.max(1);
        Self {
            client,
            store,
            opts,
        }
    }

    pub fn store(&self) -> &ExportStore {
        &self.store
    }
}
