use cucumber::{given, then, when};
use rallypoint_session::application::RateLimiters;
use rallypoint_session::{RateLimitConfig, RateLimiter, RequestType};
use rallypoint_tests::RallyWorld;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

fn limiter(world: &RallyWorld) -> Arc<RateLimiter> {
    world.limiter.clone().expect("No rate limiter configured")
}

// ===== Given Steps =====

#[given(expr = "a rate limiter allowing {int} calls per {int} ms")]
async fn rate_limiter_allowing(world: &mut RallyWorld, max_calls: u32, window_ms: u64) {
    world.limiter = Some(Arc::new(RateLimiter::with_window(
        "scenario",
        max_calls,
        Duration::from_millis(window_ms),
    )));
}

#[given("the default directory limits")]
async fn default_directory_limits(_world: &mut RallyWorld) {
    // No-op: limits are derived from the default config below
}

// ===== When Steps =====

#[when(expr = "{int} calls are requested at once")]
async fn calls_requested_at_once(world: &mut RallyWorld, count: usize) {
    let limiter = limiter(world);
    let start = Instant::now();

    let handles: Vec<_> = (0..count)
        .map(|_| {
            let limiter = limiter.clone();
            tokio::spawn(async move {
                limiter.acquire().await;
                start.elapsed()
            })
        })
        .collect();

    let mut delays = Vec::with_capacity(count);
    for handle in handles {
        delays.push(handle.await.expect("acquire task panicked"));
    }
    delays.sort();
    world.acquire_delays = delays;
}

#[when("a call is made")]
async fn call_is_made(world: &mut RallyWorld) {
    assert!(limiter(world).try_acquire());
}

#[when(expr = "{int} ms pass")]
async fn millis_pass(_world: &mut RallyWorld, millis: u64) {
    tokio::time::sleep(Duration::from_millis(millis)).await;
}

// ===== Then Steps =====

#[then(expr = "{int} calls proceed immediately")]
async fn calls_proceed_immediately(world: &mut RallyWorld, count: usize) {
    let immediate = world
        .acquire_delays
        .iter()
        .filter(|delay| delay.is_zero())
        .count();
    assert_eq!(immediate, count);
}

#[then(expr = "the last call waits {int} ms")]
async fn last_call_waits(world: &mut RallyWorld, millis: u64) {
    let last = world.acquire_delays.last().copied().expect("No calls made");
    assert_eq!(last, Duration::from_millis(millis));
}

#[then("the limiter is cooling down")]
async fn limiter_cooling_down(world: &mut RallyWorld) {
    assert!(limiter(world).is_cooling_down());
}

#[then("another attempt is rejected")]
async fn another_attempt_rejected(world: &mut RallyWorld) {
    assert!(!limiter(world).try_acquire());
}

#[then("another attempt is accepted")]
async fn another_attempt_accepted(world: &mut RallyWorld) {
    assert!(limiter(world).try_acquire());
}

#[then(expr = "the {string} limiter allows {int} calls per {int} ms")]
async fn named_limiter_allows(_world: &mut RallyWorld, name: String, max_calls: u32, window_ms: u64) {
    let limiters = RateLimiters::from_config(&RateLimitConfig::default());
    let request = RequestType::ALL
        .into_iter()
        .find(|request| request.as_str() == name)
        .unwrap_or_else(|| panic!("Unknown request type '{}'", name));

    let limiter = limiters.get(request);
    assert_eq!(limiter.max_calls(), max_calls);
    assert_eq!(limiter.window(), Duration::from_millis(window_ms));
}
