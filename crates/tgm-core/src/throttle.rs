use std::{
    collections::VecDeque,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};

use crate::{
    config::RateLimitConfig,
    domain::{ChatId, ChatInfo, ForumTopic, HistoryMessage, MessageId, Participant},
    errors::Error,
    ports::TelegramClient,
    Result,
};

const MIN_CALLS_PER_SECOND: f64 = 0.1;
const FLOOD_WAIT_PADDING: Duration = Duration::from_secs(1);

#[derive(Debug)]
struct LimiterState {
    calls_per_second: f64,
    burst_size: usize,
    adaptive: bool,
    /// Reserved start times of the last `burst_size` calls.
    slots: VecDeque<Instant>,
    flood_wait_until: Option<Instant>,
}

impl LimiterState {
    fn window(&self) -> Duration {
        Duration::from_secs_f64(self.burst_size as f64 / self.calls_per_second)
    }

    /// Reserve the next slot and return how long the caller must wait.
    fn reserve(&mut self, now: Instant) -> Duration {
        let mut start = now;

        match self.flood_wait_until {
            Some(until) if until > start => start = until,
            Some(_) => self.flood_wait_until = None,
            None => {}
        }

        if self.slots.len() >= self.burst_size {
            if let Some(oldest) = self.slots.pop_front() {
                let earliest = oldest + self.window();
                if earliest > start {
                    start = earliest;
                }
            }
        }

        self.slots.push_back(start);
        start.saturating_duration_since(now)
    }

    fn set_flood_wait(&mut self, now: Instant, seconds: u32) {
        let until = now + Duration::from_secs(u64::from(seconds)) + FLOOD_WAIT_PADDING;
        if self.flood_wait_until.map(|u| u < until).unwrap_or(true) {
            self.flood_wait_until = Some(until);
        }
        if self.adaptive && self.calls_per_second > MIN_CALLS_PER_SECOND {
            self.calls_per_second = (self.calls_per_second * 0.8).max(MIN_CALLS_PER_SECOND);
            tracing::info!("Adapted rate to {:.2} calls/s", self.calls_per_second);
        }
    }
}

/// Sliding-window limiter for Telegram API calls.
///
/// At most `burst_size` calls start within any `burst_size / calls_per_second`
/// window. A flood wait holds every caller until it expires.
#[derive(Debug)]
pub struct RateLimiter {
    state: Mutex<LimiterState>,
}

impl RateLimiter {
    pub fn new(cfg: RateLimitConfig) -> Self {
        Self {
            state: Mutex::new(LimiterState {
                calls_per_second: cfg.calls_per_second.max(MIN_CALLS_PER_SECOND),
                burst_size: cfg.burst_size.max(1),
                adaptive: cfg.adaptive,
                slots: VecDeque::new(),
                flood_wait_until: None,
            }),
        }
    }

    /// Wait until a call may be issued.
    pub async fn acquire(&self) {
        let wait = { self.state.lock().await.reserve(Instant::now()) };
        if wait > Duration::from_millis(0) {
            tracing::debug!("Rate limiting: sleeping {:.2}s", wait.as_secs_f64());
            sleep(wait).await;
        }
    }

    /// Record a server-imposed flood wait.
    pub async fn set_flood_wait(&self, seconds: u32) {
        tracing::warn!("FloodWait set for {seconds}s");
        self.state
            .lock()
            .await
            .set_flood_wait(Instant::now(), seconds);
    }

    pub async fn calls_per_second(&self) -> f64 {
        self.state.lock().await.calls_per_second
    }
}

/// `TelegramClient` decorator that rate-limits outbound calls and feeds
/// flood waits back into the limiter.
pub struct ThrottledClient {
    inner: Arc<dyn TelegramClient>,
    limiter: Arc<RateLimiter>,
}

impl ThrottledClient {
    pub fn new(inner: Arc<dyn TelegramClient>, limiter: Arc<RateLimiter>) -> Self {
        Self { inner, limiter }
    }

    async fn observe<T>(&self, res: Result<T>) -> Result<T> {
        if let Err(Error::FloodWait { seconds }) = &res {
            self.limiter.set_flood_wait(*seconds).await;
        }
        res
    }
}

#[async_trait]
impl TelegramClient for ThrottledClient {
    async fn list_dialogs(&self, limit: usize) -> Result<Vec<ChatInfo>> {
        self.limiter.acquire().await;
        let res = self.inner.list_dialogs(limit).await;
        self.observe(res).await
    }

    async fn resolve_chat(&self, chat: ChatId) -> Result<ChatInfo> {
        self.limiter.acquire().await;
        let res = self.inner.resolve_chat(chat).await;
        self.observe(res).await
    }

    async fn leave_chat(&self, chat: &ChatInfo) -> Result<()> {
        self.limiter.acquire().await;
        let res = self.inner.leave_chat(chat).await;
        self.observe(res).await
    }

    async fn message_count(&self, chat: ChatId) -> Result<Option<u64>> {
        self.limiter.acquire().await;
        let res = self.inner.message_count(chat).await;
        self.observe(res).await
    }

    async fn fetch_history(
        &self,
        chat: ChatId,
        offset: Option<MessageId>,
        limit: usize,
    ) -> Result<Vec<HistoryMessage>> {
        self.limiter.acquire().await;
        let res = self.inner.fetch_history(chat, offset, limit).await;
        self.observe(res).await
    }

    async fn download_media(
        &self,
        chat: ChatId,
        message: MessageId,
        dest_stem: &Path,
    ) -> Result<Option<PathBuf>> {
        self.limiter.acquire().await;
        let res = self.inner.download_media(chat, message, dest_stem).await;
        self.observe(res).await
    }

    async fn participants(&self, chat: ChatId) -> Result<Vec<Participant>> {
        self.limiter.acquire().await;
        let res = self.inner.participants(chat).await;
        self.observe(res).await
    }

    async fn forum_topics(&self, chat: ChatId) -> Result<Vec<ForumTopic>> {
        self.limiter.acquire().await;
        let res = self.inner.forum_topics(chat).await;
        self.observe(res).await
    }

    async fn forward_messages(
        &self,
        source: ChatId,
        destination: ChatId,
        ids: &[MessageId],
    ) -> Result<usize> {
        self.limiter.acquire().await;
        let res = self.inner.forward_messages(source, destination, ids).await;
        self.observe(res).await
    }

    async fn send_text(&self, destination: ChatId, text: &str) -> Result<()> {
        self.limiter.acquire().await;
        let res = self.inner.send_text(destination, text).await;
        self.observe(res).await
    }

    async fn send_media_copy(
        &self,
        source: ChatId,
        message: MessageId,
        destination: ChatId,
        caption: &str,
    ) -> Result<()> {
        self.limiter.acquire().await;
        let res = self
            .inner
            .send_media_copy(source, message, destination, caption)
            .await;
        self.observe(res).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeTelegram;

    fn state(cps: f64, burst: usize, adaptive: bool) -> LimiterState {
        LimiterState {
            calls_per_second: cps,
            burst_size: burst,
            adaptive,
            slots: VecDeque::new(),
            flood_wait_until: None,
        }
    }

    #[test]
    fn burst_passes_then_waits_for_window() {
        let mut st = state(2.0, 3, false);
        let t0 = Instant::now();
        assert_eq!(st.reserve(t0), Duration::ZERO);
        assert_eq!(st.reserve(t0), Duration::ZERO);
        assert_eq!(st.reserve(t0), Duration::ZERO);
        // 3 calls per 1.5s window.
        assert_eq!(st.reserve(t0), Duration::from_millis(1500));
        assert_eq!(st.reserve(t0), Duration::from_millis(1500));
    }

    #[test]
    fn slots_free_up_as_time_passes() {
        let mut st = state(1.0, 2, false);
        let t0 = Instant::now();
        st.reserve(t0);
        st.reserve(t0);
        assert_eq!(st.reserve(t0 + Duration::from_secs(5)), Duration::ZERO);
    }

    #[test]
    fn flood_wait_blocks_and_adapts_rate() {
        let mut st = state(1.0, 5, true);
        let t0 = Instant::now();
        st.set_flood_wait(t0, 10);
        assert_eq!(st.reserve(t0), Duration::from_secs(11));
        assert!((st.calls_per_second - 0.8).abs() < 1e-9);

        // Expired waits are cleared.
        let later = t0 + Duration::from_secs(60);
        assert_eq!(st.reserve(later), Duration::ZERO);
        assert!(st.flood_wait_until.is_none());
    }

    #[test]
    fn adaptive_rate_has_a_floor() {
        let mut st = state(0.11, 5, true);
        let t0 = Instant::now();
        for _ in 0..10 {
            st.set_flood_wait(t0, 0);
        }
        assert!(st.calls_per_second >= MIN_CALLS_PER_SECOND);
    }

    #[test]
    fn shorter_flood_wait_does_not_shrink_a_longer_one() {
        let mut st = state(1.0, 5, false);
        let t0 = Instant::now();
        st.set_flood_wait(t0, 30);
        st.set_flood_wait(t0, 2);
        assert_eq!(st.reserve(t0), Duration::from_secs(31));
    }

    #[tokio::test]
    async fn throttled_client_records_flood_waits() {
        let fake = Arc::new(FakeTelegram::new());
        fake.fail_next_send(Error::FloodWait { seconds: 0 });
        let limiter = Arc::new(RateLimiter::new(RateLimitConfig {
            calls_per_second: 100.0,
            burst_size: 100,
            adaptive: true,
        }));
        let client = ThrottledClient::new(fake.clone(), limiter.clone());

        let err = client.send_text(ChatId(1), "hi").await.unwrap_err();
        assert!(matches!(err, Error::FloodWait { seconds: 0 }));
        assert!((limiter.calls_per_second().await - 80.0).abs() < 1e-9);

        client.send_text(ChatId(1), "again").await.unwrap();
        assert_eq!(fake.sent_texts(), vec![(ChatId(1), "again".to_string())]);
    }
}
