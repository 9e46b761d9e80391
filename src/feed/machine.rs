//! Generic load state machine over a page loader.
//!
//! One machine drives one logical feed. Fetches run on spawned tasks and
//! report back through an internal channel; every fetch carries a token and
//! only the result of the most recently issued fetch is applied, and only
//! while the machine is still `Loading`.

use std::future::Future;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::time::{Duration, sleep};

use super::{LoadState, merge_unique};
use crate::api::MastodonApi;
use crate::error::{Error, Result};
use crate::models::{Cursor, FeedKind, FeedRecord, Identity, Page};

/// Something that can fetch one page of records from a cursor
pub trait PageLoader: Send + Sync + 'static {
    /// Record type produced by this loader
    type Record: Identity + Clone + Send + Sync + 'static;

    /// Fetch the page starting at `cursor` (`None` for the first page)
    fn fetch_page(
        &self,
        cursor: Option<Cursor>,
    ) -> impl Future<Output = anyhow::Result<Page<Self::Record>>> + Send;
}

/// Loads one feed kind of one account
pub struct KindLoader<A> {
    api: A,
    kind: FeedKind,
    limit: usize,
}

impl<A: MastodonApi> KindLoader<A> {
    /// Load `kind` pages of `limit` records
    pub const fn new(api: A, kind: FeedKind, limit: usize) -> Self {
        Self { api, kind, limit }
    }
}

impl<A: MastodonApi + 'static> PageLoader for KindLoader<A> {
    type Record = FeedRecord;

    async fn fetch_page(&self, cursor: Option<Cursor>) -> anyhow::Result<Page<FeedRecord>> {
        self.api
            .feed_page(&self.kind, cursor.as_ref(), self.limit)
            .await
    }
}

/// Loads the ids an account follows
pub struct FollowingLoader<A> {
    api: A,
    user_id: String,
}

impl<A: MastodonApi> FollowingLoader<A> {
    /// Load the accounts `user_id` follows
    pub fn new(api: A, user_id: &str) -> Self {
        Self {
            api,
            user_id: user_id.to_string(),
        }
    }
}

impl<A: MastodonApi + 'static> PageLoader for FollowingLoader<A> {
    type Record = String;

    async fn fetch_page(&self, cursor: Option<Cursor>) -> anyhow::Result<Page<String>> {
        self.api.following(&self.user_id, cursor.as_ref()).await
    }
}

enum Event<R> {
    Fetched {
        token: u64,
        result: anyhow::Result<Page<R>>,
    },
    Retry {
        token: u64,
    },
}

/// Drives `Initial → Reloading → Loading → Idle/Fail/NoMore` for one feed
pub struct FeedStateMachine<L: PageLoader> {
    loader: Arc<L>,
    state: LoadState,
    cursor: Option<Cursor>,
    latest_token: u64,
    records: Vec<L::Record>,
    retry_delay: Duration,
    state_tx: watch::Sender<LoadState>,
    records_tx: watch::Sender<Vec<L::Record>>,
    events_tx: mpsc::UnboundedSender<Event<L::Record>>,
    events_rx: mpsc::UnboundedReceiver<Event<L::Record>>,
}

impl<L: PageLoader> FeedStateMachine<L> {
    /// Create a machine in `Initial`. A failed fetch is retried once after
    /// `retry_delay`.
    pub fn new(loader: L, retry_delay: Duration) -> Self {
        let (state_tx, _) = watch::channel(LoadState::Initial);
        let (records_tx, _) = watch::channel(Vec::new());
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        Self {
            loader: Arc::new(loader),
            state: LoadState::Initial,
            cursor: None,
            latest_token: 0,
            records: Vec::new(),
            retry_delay,
            state_tx,
            records_tx,
            events_tx,
            events_rx,
        }
    }

    /// Current state
    pub const fn state(&self) -> LoadState {
        self.state
    }

    /// Records loaded so far
    pub fn records(&self) -> &[L::Record] {
        &self.records
    }

    /// Cursor the next `Loading` will fetch from
    pub const fn cursor(&self) -> Option<&Cursor> {
        self.cursor.as_ref()
    }

    /// Watch state changes
    pub fn subscribe_state(&self) -> watch::Receiver<LoadState> {
        self.state_tx.subscribe()
    }

    /// Watch the record collection
    pub fn subscribe_records(&self) -> watch::Receiver<Vec<L::Record>> {
        self.records_tx.subscribe()
    }

    /// Move to `next`, running its entry actions.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn enter(&mut self, next: LoadState) -> Result<()> {
        if !self.state.can_enter(next) {
            return Err(Error::InvalidTransition {
                from: self.state.name(),
                to: next.name(),
            });
        }

        match next {
            LoadState::Reloading => {
                self.set_state(LoadState::Reloading);
                self.records.clear();
                self.cursor = None;
                self.publish_records();
                self.start_loading();
            }
            LoadState::Loading => self.start_loading(),
            LoadState::Fail => {
                self.set_state(LoadState::Fail);
                self.schedule_retry();
            }
            LoadState::NoMore => {
                self.set_state(LoadState::NoMore);
                // Views key their footer off a fresh publication
                self.publish_records();
            }
            LoadState::Idle | LoadState::Initial => self.set_state(next),
        }
        Ok(())
    }

    /// Pull to refresh
    pub fn reload(&mut self) -> Result<()> {
        self.enter(LoadState::Reloading)
    }

    /// Scroll to load more (or retry now after a failure)
    pub fn load_more(&mut self) -> Result<()> {
        self.enter(LoadState::Loading)
    }

    /// Wait for the next fetch result or retry timer and apply it.
    /// Returns the state afterwards.
    pub async fn process_next(&mut self) -> LoadState {
        if let Some(event) = self.events_rx.recv().await {
            self.handle(event);
        }
        self.state
    }

    /// Process events until the machine leaves `Loading`
    pub async fn run_until_settled(&mut self) -> LoadState {
        while self.state == LoadState::Loading {
            self.process_next().await;
        }
        self.state
    }

    fn handle(&mut self, event: Event<L::Record>) {
        match event {
            Event::Fetched { token, result } => {
                if token != self.latest_token || self.state != LoadState::Loading {
                    tracing::debug!("Discarding stale page (token {token}, latest {})", self.latest_token);
                    return;
                }
                self.apply(result);
            }
            Event::Retry { token } => {
                if token == self.latest_token && self.state == LoadState::Fail {
                    tracing::debug!("Retrying failed page load");
                    self.start_loading();
                }
            }
        }
    }

    fn apply(&mut self, result: anyhow::Result<Page<L::Record>>) {
        let next = match result {
            Err(e) => {
                tracing::warn!("Page load failed: {e:#}");
                LoadState::Fail
            }
            Ok(page) if page.items.is_empty() => LoadState::NoMore,
            Ok(page) => {
                let appended = merge_unique(&mut self.records, page.items);
                tracing::debug!("Appended {appended} records");
                self.publish_records();
                // A repeated page with a repeated cursor would page forever
                let stalled = appended == 0 && page.next_cursor == self.cursor;
                self.cursor = page.next_cursor;
                if self.cursor.is_some() && !stalled {
                    LoadState::Idle
                } else {
                    LoadState::NoMore
                }
            }
        };

        if let Err(e) = self.enter(next) {
            tracing::error!("Load state machine rejected its own transition: {e}");
        }
    }

    fn start_loading(&mut self) {
        self.latest_token += 1;
        self.set_state(LoadState::Loading);

        let token = self.latest_token;
        let cursor = self.cursor.clone();
        let loader = Arc::clone(&self.loader);
        let events = self.events_tx.clone();
        tokio::spawn(async move {
            let result = loader.fetch_page(cursor).await;
            let _ = events.send(Event::Fetched { token, result });
        });
    }

    fn schedule_retry(&self) {
        let token = self.latest_token;
        let delay = self.retry_delay;
        let events = self.events_tx.clone();
        tokio::spawn(async move {
            sleep(delay).await;
            let _ = events.send(Event::Retry { token });
        });
    }

    fn set_state(&mut self, state: LoadState) {
        self.state = state;
        self.state_tx.send_replace(state);
    }

    fn publish_records(&self) {
        self.records_tx.send_replace(self.records.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    type Scripted = (Duration, anyhow::Result<Page<String>>);

    /// Loader that replays scripted responses, each after a delay
    #[derive(Default)]
    struct ScriptedLoader {
        responses: Mutex<VecDeque<Scripted>>,
        calls: AtomicUsize,
        cursors: Mutex<Vec<Option<Cursor>>>,
    }

    impl ScriptedLoader {
        fn then(self, delay: u64, result: anyhow::Result<Page<String>>) -> Self {
            self.responses
                .lock()
                .unwrap()
                .push_back((Duration::from_secs(delay), result));
            self
        }
    }

    impl PageLoader for ScriptedLoader {
        type Record = String;

        async fn fetch_page(&self, cursor: Option<Cursor>) -> anyhow::Result<Page<String>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.cursors.lock().unwrap().push(cursor);
            let next = self.responses.lock().unwrap().pop_front();
            let (delay, result) = next.unwrap_or((Duration::ZERO, Ok(Page::last(Vec::new()))));
            sleep(delay).await;
            result
        }
    }

    fn ids(range: std::ops::Range<u32>) -> Vec<String> {
        range.map(|i| i.to_string()).collect()
    }

    fn page(range: std::ops::Range<u32>, next: Option<&str>) -> anyhow::Result<Page<String>> {
        Ok(Page::new(ids(range), next.map(Cursor::new)))
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_page_then_empty_page() {
        let loader = ScriptedLoader::default()
            .then(0, page(0..20, Some("19")))
            .then(0, page(0..0, None));
        let mut machine = FeedStateMachine::new(loader, Duration::from_secs(3));

        machine.reload().unwrap();
        assert_eq!(machine.run_until_settled().await, LoadState::Idle);
        assert_eq!(machine.records().len(), 20);

        machine.load_more().unwrap();
        assert_eq!(machine.run_until_settled().await, LoadState::NoMore);
        assert_eq!(machine.records().len(), 20);
        assert_eq!(
            *machine.loader.cursors.lock().unwrap(),
            vec![None, Some(Cursor::new("19"))]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_last_page_without_cursor_is_no_more() {
        let loader = ScriptedLoader::default().then(0, page(0..5, None));
        let mut machine = FeedStateMachine::new(loader, Duration::from_secs(3));

        machine.reload().unwrap();
        assert_eq!(machine.run_until_settled().await, LoadState::NoMore);
        assert_eq!(machine.records().len(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_overlapping_pages_never_duplicate() {
        let loader = ScriptedLoader::default()
            .then(0, page(0..10, Some("a")))
            .then(0, page(5..15, Some("b")))
            .then(0, page(10..20, None));
        let mut machine = FeedStateMachine::new(loader, Duration::from_secs(3));

        machine.reload().unwrap();
        machine.run_until_settled().await;
        machine.load_more().unwrap();
        machine.run_until_settled().await;
        machine.load_more().unwrap();

        assert_eq!(machine.run_until_settled().await, LoadState::NoMore);
        assert_eq!(machine.records(), ids(0..20).as_slice());
    }

    #[tokio::test(start_paused = true)]
    async fn test_repeated_page_ends_the_feed() {
        let loader = ScriptedLoader::default()
            .then(0, page(0..10, Some("9")))
            .then(0, page(0..10, Some("9")))
            .then(0, page(10..20, Some("19")));
        let mut machine = FeedStateMachine::new(loader, Duration::from_secs(3));

        machine.reload().unwrap();
        assert_eq!(machine.run_until_settled().await, LoadState::Idle);
        machine.load_more().unwrap();

        assert_eq!(machine.run_until_settled().await, LoadState::NoMore);
        assert_eq!(machine.records(), ids(0..10).as_slice());
        assert_eq!(machine.loader.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_duplicate_page_with_new_cursor_keeps_going() {
        let loader = ScriptedLoader::default()
            .then(0, page(0..10, Some("9")))
            .then(0, page(5..10, Some("4")))
            .then(0, page(10..12, None));
        let mut machine = FeedStateMachine::new(loader, Duration::from_secs(3));

        machine.reload().unwrap();
        machine.run_until_settled().await;
        machine.load_more().unwrap();
        assert_eq!(machine.run_until_settled().await, LoadState::Idle);
        machine.load_more().unwrap();

        assert_eq!(machine.run_until_settled().await, LoadState::NoMore);
        assert_eq!(machine.records(), ids(0..12).as_slice());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_retries_once_after_delay() {
        let loader = ScriptedLoader::default()
            .then(0, Err(anyhow::anyhow!("timeout")))
            .then(0, page(0..3, Some("2")));
        let mut machine = FeedStateMachine::new(loader, Duration::from_secs(3));
        let started = tokio::time::Instant::now();

        machine.reload().unwrap();
        assert_eq!(machine.run_until_settled().await, LoadState::Fail);

        // The retry timer re-enters Loading on its own
        assert_eq!(machine.process_next().await, LoadState::Loading);
        assert_eq!(started.elapsed(), Duration::from_secs(3));

        assert_eq!(machine.run_until_settled().await, LoadState::Idle);
        assert_eq!(machine.loader.calls.load(Ordering::SeqCst), 2);
        assert_eq!(machine.records().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_manual_retry_cancels_timer() {
        let loader = ScriptedLoader::default()
            .then(0, Err(anyhow::anyhow!("timeout")))
            .then(0, page(0..3, Some("2")));
        let mut machine = FeedStateMachine::new(loader, Duration::from_secs(3));

        machine.reload().unwrap();
        assert_eq!(machine.run_until_settled().await, LoadState::Fail);

        machine.load_more().unwrap();
        assert_eq!(machine.run_until_settled().await, LoadState::Idle);

        // The old timer still fires but is ignored
        assert_eq!(machine.process_next().await, LoadState::Idle);
        assert_eq!(machine.loader.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_result_is_discarded() {
        let loader = ScriptedLoader::default()
            .then(10, page(100..105, Some("slow")))
            .then(0, page(0..20, Some("19")));
        let mut machine = FeedStateMachine::new(loader, Duration::from_secs(3));
        let mut state_rx = machine.subscribe_state();

        machine.reload().unwrap();
        // Leave Loading before the slow fetch lands, then start a new one
        machine.enter(LoadState::Idle).unwrap();
        machine.load_more().unwrap();
        assert_eq!(machine.run_until_settled().await, LoadState::Idle);
        assert_eq!(machine.records(), ids(0..20).as_slice());
        state_rx.borrow_and_update();

        // Nothing to process until the slow fetch lands
        {
            let mut next = tokio_test::task::spawn(machine.process_next());
            tokio_test::assert_pending!(next.poll());
        }

        assert_eq!(machine.process_next().await, LoadState::Idle);
        assert_eq!(machine.records(), ids(0..20).as_slice());
        assert_eq!(machine.cursor(), Some(&Cursor::new("19")));
        assert!(!state_rx.has_changed().unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_reload_from_no_more_clears_records() {
        let loader = ScriptedLoader::default()
            .then(0, page(0..5, None))
            .then(0, page(10..12, Some("11")));
        let mut machine = FeedStateMachine::new(loader, Duration::from_secs(3));
        let mut records_rx = machine.subscribe_records();

        machine.reload().unwrap();
        assert_eq!(machine.run_until_settled().await, LoadState::NoMore);
        assert_eq!(records_rx.borrow_and_update().len(), 5);

        machine.reload().unwrap();
        assert!(records_rx.borrow_and_update().is_empty());
        assert_eq!(machine.run_until_settled().await, LoadState::Idle);
        assert_eq!(machine.records(), ids(10..12).as_slice());
    }

    #[tokio::test]
    async fn test_invalid_transitions_are_rejected() {
        let mut machine = FeedStateMachine::new(ScriptedLoader::default(), Duration::from_secs(3));

        assert!(matches!(
            machine.load_more(),
            Err(Error::InvalidTransition {
                from: "initial",
                to: "loading"
            })
        ));
        machine.reload().unwrap();
        assert!(machine.reload().is_err());
        assert_eq!(machine.state(), LoadState::Loading);
    }
}
