//! Cooperative timer scheduler for the connection manager.
//!
//! Timers do not run callbacks. When one fires it posts an event back onto
//! the manager's queue, so all timer handling happens on the event loop.
//! Each timer carries an id; a fired timer whose id is no longer current was
//! cancelled or replaced after it had already been queued, and is ignored.

use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Timers owned by the manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerKind {
    Reconnect,
    HealthCheck,
    BackgroundExpiry,
}

/// A fired timer as seen by the event loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerFired {
    pub kind: TimerKind,
    pub id: u64,
}

/// Issues cancellable delayed notifications.
pub struct Scheduler<E> {
    tx: mpsc::Sender<E>,
    wrap: fn(TimerFired) -> E,
    timers: HashMap<TimerKind, (u64, CancellationToken)>,
    next_id: u64,
}

impl<E: Send + 'static> Scheduler<E> {
    /// Creates a scheduler that posts `wrap(fired)` onto `tx`.
    pub fn new(tx: mpsc::Sender<E>, wrap: fn(TimerFired) -> E) -> Self {
        Self {
            tx,
            wrap,
            timers: HashMap::new(),
            next_id: 0,
        }
    }

    /// Schedules `kind` to fire after `delay`, replacing any pending one.
    pub fn schedule(&mut self, kind: TimerKind, delay: Duration) -> u64 {
        self.cancel(kind);
        self.next_id += 1;
        let id = self.next_id;
        let token = CancellationToken::new();
        self.timers.insert(kind, (id, token.clone()));

        let tx = self.tx.clone();
        let event = (self.wrap)(TimerFired { kind, id });
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = tokio::time::sleep(delay) => {
                    if tx.send(event).await.is_err() {
                        log::trace!("[Scheduler] Event loop gone, dropping {:?}", kind);
                    }
                }
            }
        });
        id
    }

    /// Cancels a pending timer of this kind, if any.
    pub fn cancel(&mut self, kind: TimerKind) {
        if let Some((_, token)) = self.timers.remove(&kind) {
            token.cancel();
        }
    }

    pub fn cancel_all(&mut self) {
        for (_, (_, token)) in self.timers.drain() {
            token.cancel();
        }
    }

    /// Whether a timer of this kind is scheduled and has not been accepted.
    #[must_use]
    pub fn is_pending(&self, kind: TimerKind) -> bool {
        self.timers.contains_key(&kind)
    }

    /// Accepts a fired timer if it is still the current one for its kind.
    ///
    /// The timer is consumed: a second call with the same event returns false.
    pub fn accept(&mut self, fired: TimerFired) -> bool {
        match self.timers.get(&fired.kind) {
            Some((id, _)) if *id == fired.id => {
                self.timers.remove(&fired.kind);
                true
            }
            _ => false,
        }
    }
}

impl<E> Drop for Scheduler<E> {
    fn drop(&mut self) {
        for (_, (_, token)) in self.timers.drain() {
            token.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scheduler() -> (Scheduler<TimerFired>, mpsc::Receiver<TimerFired>) {
        let (tx, rx) = mpsc::channel(8);
        (Scheduler::new(tx, |fired| fired), rx)
    }

    #[tokio::test(start_paused = true)]
    async fn fires_after_delay() {
        let (mut s, mut rx) = scheduler();
        s.schedule(TimerKind::HealthCheck, Duration::from_secs(15));

        tokio::time::advance(Duration::from_secs(14)).await;
        assert!(rx.try_recv().is_err());

        let fired = rx.recv().await.unwrap();
        assert_eq!(fired.kind, TimerKind::HealthCheck);
        assert!(s.accept(fired));
        assert!(!s.accept(fired));
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_timer_never_fires() {
        let (mut s, mut rx) = scheduler();
        s.schedule(TimerKind::Reconnect, Duration::from_secs(2));
        s.cancel(TimerKind::Reconnect);

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(rx.try_recv().is_err());
        assert!(!s.is_pending(TimerKind::Reconnect));
    }

    #[tokio::test(start_paused = true)]
    async fn rescheduling_supersedes_queued_event() {
        let (mut s, mut rx) = scheduler();
        s.schedule(TimerKind::BackgroundExpiry, Duration::from_secs(1));
        tokio::time::sleep(Duration::from_secs(2)).await;
        let stale = rx.recv().await.unwrap();

        s.schedule(TimerKind::BackgroundExpiry, Duration::from_secs(10));
        assert!(!s.accept(stale));
        assert!(s.is_pending(TimerKind::BackgroundExpiry));
    }
}
