use std::future::Future;
use std::sync::{Mutex, MutexGuard};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

#[derive(Debug)]
struct RunningLoop {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

impl RunningLoop {
    fn is_active(&self) -> bool {
        !self.token.is_cancelled() && !self.handle.is_finished()
    }
}

/// Holder for at most one background loop of a given role
///
/// Loops receive a [`CancellationToken`] and must stop at their next
/// suspension point once it fires. Stopping clears the slot under the same
/// lock that starting uses, so a stop never races a fresh start.
#[derive(Debug)]
pub struct LoopSlot {
    name: &'static str,
    current: Mutex<Option<RunningLoop>>,
}

impl LoopSlot {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            current: Mutex::new(None),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Spawn the loop unless one is already running
    ///
    /// Returns `false` (and spawns nothing) when the slot is busy.
    pub fn start<F, Fut>(&self, make_loop: F) -> bool
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut current = self.lock();
        if current.as_ref().is_some_and(RunningLoop::is_active) {
            tracing::debug!(slot = self.name, "🔁 Loop already running, ignoring start");
            return false;
        }

        let token = CancellationToken::new();
        let handle = tokio::spawn(make_loop(token.clone()));
        *current = Some(RunningLoop { token, handle });
        tracing::debug!(slot = self.name, "▶️ Loop started");
        true
    }

    /// Cancel whatever runs in the slot, then spawn the new loop
    pub fn restart<F, Fut>(&self, make_loop: F)
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut current = self.lock();
        if let Some(previous) = current.take() {
            previous.token.cancel();
            tracing::debug!(slot = self.name, "⏹️ Previous loop cancelled");
        }

        let token = CancellationToken::new();
        let handle = tokio::spawn(make_loop(token.clone()));
        *current = Some(RunningLoop { token, handle });
        tracing::debug!(slot = self.name, "▶️ Loop restarted");
    }

    /// Cancel the running loop; returns whether one was active
    pub fn stop(&self) -> bool {
        match self.lock().take() {
            Some(running) => {
                let was_active = running.is_active();
                running.token.cancel();
                if was_active {
                    tracing::debug!(slot = self.name, "⏹️ Loop stopped");
                }
                was_active
            }
            None => false,
        }
    }

    pub fn is_running(&self) -> bool {
        self.lock().as_ref().is_some_and(RunningLoop::is_active)
    }

    fn lock(&self) -> MutexGuard<'_, Option<RunningLoop>> {
        self.current
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Drop for LoopSlot {
    fn drop(&mut self) {
        if let Some(running) = self.lock().take() {
            running.token.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    fn ticking_loop(
        counter: Arc<AtomicUsize>,
    ) -> impl FnOnce(CancellationToken) -> std::pin::Pin<Box<dyn Future<Output = ()> + Send>> {
        move |token| {
            Box::pin(async move {
                let mut interval = tokio::time::interval(Duration::from_secs(1));
                loop {
                    tokio::select! {
                        _ = token.cancelled() => break,
                        _ = interval.tick() => {
                            counter.fetch_add(1, Ordering::SeqCst);
                        }
                    }
                }
            })
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_start_is_noop() {
        let slot = LoopSlot::new("test");
        let counter = Arc::new(AtomicUsize::new(0));

        assert!(slot.start(ticking_loop(counter.clone())));
        assert!(!slot.start(ticking_loop(counter.clone())));
        assert!(slot.is_running());

        tokio::time::sleep(Duration::from_millis(2500)).await;

        // One loop: ticks at 0s, 1s, 2s
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_cancels_loop() {
        let slot = LoopSlot::new("test");
        let counter = Arc::new(AtomicUsize::new(0));

        slot.start(ticking_loop(counter.clone()));
        tokio::time::sleep(Duration::from_millis(500)).await;

        assert!(slot.stop());
        assert!(!slot.is_running());
        assert!(!slot.stop());

        let seen = counter.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(counter.load(Ordering::SeqCst), seen);
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_after_finished_loop() {
        let slot = LoopSlot::new("test");

        slot.start(|_token| async {});
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert!(!slot.is_running());
        assert!(slot.start(|_token| async {}));
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_replaces_running_loop() {
        let slot = LoopSlot::new("test");
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));

        slot.start(ticking_loop(first.clone()));
        tokio::time::sleep(Duration::from_millis(10)).await;
        slot.restart(ticking_loop(second.clone()));
        tokio::time::sleep(Duration::from_millis(2500)).await;

        assert_eq!(first.load(Ordering::SeqCst), 1);
        assert_eq!(second.load(Ordering::SeqCst), 3);
    }
}
