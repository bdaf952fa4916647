use crate::application::config::{LimitSpec, RateLimitConfig};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;

/// Remote operation categories, each with its own call budget
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RequestType {
    Query,
    Create,
    Join,
    QuickJoin,
    Get,
    Delete,
    UpdateLobby,
    UpdatePlayer,
    RemovePlayer,
    Heartbeat,
}

impl RequestType {
    pub const ALL: [RequestType; 10] = [
        RequestType::Query,
        RequestType::Create,
        RequestType::Join,
        RequestType::QuickJoin,
        RequestType::Get,
        RequestType::Delete,
        RequestType::UpdateLobby,
        RequestType::UpdatePlayer,
        RequestType::RemovePlayer,
        RequestType::Heartbeat,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RequestType::Query => "query",
            RequestType::Create => "create",
            RequestType::Join => "join",
            RequestType::QuickJoin => "quick-join",
            RequestType::Get => "get",
            RequestType::Delete => "delete",
            RequestType::UpdateLobby => "update-lobby",
            RequestType::UpdatePlayer => "update-player",
            RequestType::RemovePlayer => "remove-player",
            RequestType::Heartbeat => "heartbeat",
        }
    }
}

impl fmt::Display for RequestType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug)]
struct WindowState {
    window_start: Instant,
    calls: u32,
}

impl WindowState {
    /// Start a new window once the current one has elapsed
    fn roll(&mut self, now: Instant, window: Duration) {
        if now.saturating_duration_since(self.window_start) >= window {
            self.window_start = now;
            self.calls = 0;
        }
    }
}

/// Fixed-window call budget for one remote operation category
///
/// Rolling the window and consuming a slot happen under one lock, so
/// concurrent callers never observe a torn window. Waiters in
/// [`acquire`](Self::acquire) are not served in FIFO order; each one
/// re-checks the shared window after sleeping.
#[derive(Debug)]
pub struct RateLimiter {
    name: &'static str,
    max_calls: u32,
    window: Duration,
    state: Mutex<WindowState>,
    cooling_down: watch::Sender<bool>,
}

impl RateLimiter {
    /// Budget of `max_calls` per `cool_down`, padded by `ping_buffer`
    ///
    /// The window is `ceil(cool_down in ms) + ping_buffer`, at least 1ms.
    pub fn new(name: &'static str, max_calls: u32, cool_down: Duration, ping_buffer: Duration) -> Self {
        let cool_down_ms = cool_down.as_nanos().div_ceil(1_000_000);
        let window_ms = cool_down_ms.saturating_add(ping_buffer.as_millis());
        let window_ms = u64::try_from(window_ms).unwrap_or(u64::MAX);
        Self::with_window(name, max_calls, Duration::from_millis(window_ms))
    }

    /// Budget of `max_calls` per exact `window`
    pub fn with_window(name: &'static str, max_calls: u32, window: Duration) -> Self {
        let (cooling_down, _) = watch::channel(false);
        Self {
            name,
            max_calls: max_calls.max(1),
            window: window.max(Duration::from_millis(1)),
            state: Mutex::new(WindowState {
                window_start: Instant::now(),
                calls: 0,
            }),
            cooling_down,
        }
    }

    pub fn from_spec(name: &'static str, spec: &LimitSpec, ping_buffer: Duration) -> Self {
        Self::new(name, spec.max_calls, spec.cool_down(), ping_buffer)
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn max_calls(&self) -> u32 {
        self.max_calls
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Consume a slot if one is free right now
    pub fn try_acquire(&self) -> bool {
        let now = Instant::now();
        let mut state = self.lock_state();
        state.roll(now, self.window);

        if state.calls < self.max_calls {
            state.calls += 1;
            self.publish_cooldown(&state);
            true
        } else {
            tracing::debug!(limiter = self.name, "⏳ No slot available, skipping");
            false
        }
    }

    /// Wait until a slot is free, then consume it
    ///
    /// Unbounded: the caller already committed to the call.
    pub async fn acquire(&self) {
        loop {
            let delay = {
                let now = Instant::now();
                let mut state = self.lock_state();
                state.roll(now, self.window);

                if state.calls < self.max_calls {
                    state.calls += 1;
                    self.publish_cooldown(&state);
                    return;
                }

                let elapsed = now.saturating_duration_since(state.window_start);
                self.window
                    .saturating_sub(elapsed)
                    .max(Duration::from_millis(1))
            };

            tracing::debug!(limiter = self.name, ?delay, "⏳ Cooling down, waiting for slot");
            tokio::time::sleep(delay).await;
        }
    }

    /// Whether the current window's budget is spent
    pub fn is_cooling_down(&self) -> bool {
        let state = self.lock_state();
        let elapsed = Instant::now().saturating_duration_since(state.window_start);
        elapsed < self.window && state.calls >= self.max_calls
    }

    /// Watch the cooling-down flag; it only changes on edges
    pub fn cooldown_changes(&self) -> watch::Receiver<bool> {
        self.cooling_down.subscribe()
    }

    fn publish_cooldown(&self, state: &WindowState) {
        let cooling = state.calls >= self.max_calls;
        self.cooling_down.send_if_modified(|current| {
            if *current == cooling {
                false
            } else {
                *current = cooling;
                true
            }
        });
    }

    fn lock_state(&self) -> MutexGuard<'_, WindowState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// One limiter per remote operation category
#[derive(Debug)]
pub struct RateLimiters {
    query: RateLimiter,
    create: RateLimiter,
    join: RateLimiter,
    quick_join: RateLimiter,
    get: RateLimiter,
    delete: RateLimiter,
    update_lobby: RateLimiter,
    update_player: RateLimiter,
    remove_player: RateLimiter,
    heartbeat: RateLimiter,
}

impl RateLimiters {
    pub fn from_config(config: &RateLimitConfig) -> Self {
        let buffer = config.ping_buffer();
        Self {
            query: RateLimiter::from_spec("query", &config.query, buffer),
            create: RateLimiter::from_spec("create", &config.create, buffer),
            join: RateLimiter::from_spec("join", &config.join, buffer),
            quick_join: RateLimiter::from_spec("quick-join", &config.quick_join, buffer),
            get: RateLimiter::from_spec("get", &config.get, buffer),
            delete: RateLimiter::from_spec("delete", &config.delete, buffer),
            update_lobby: RateLimiter::from_spec("update-lobby", &config.update_lobby, buffer),
            update_player: RateLimiter::from_spec("update-player", &config.update_player, buffer),
            remove_player: RateLimiter::from_spec("remove-player", &config.remove_player, buffer),
            heartbeat: RateLimiter::from_spec("heartbeat", &config.heartbeat, buffer),
        }
    }

    pub fn get(&self, request: RequestType) -> &RateLimiter {
        match request {
            RequestType::Query => &self.query,
            RequestType::Create => &self.create,
            RequestType::Join => &self.join,
            RequestType::QuickJoin => &self.quick_join,
            RequestType::Get => &self.get,
            RequestType::Delete => &self.delete,
            RequestType::UpdateLobby => &self.update_lobby,
            RequestType::UpdatePlayer => &self.update_player,
            RequestType::RemovePlayer => &self.remove_player,
            RequestType::Heartbeat => &self.heartbeat,
        }
    }
}

impl Default for RateLimiters {
    fn default() -> Self {
        Self::from_config(&RateLimitConfig::default())
    }
}
