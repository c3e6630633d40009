//! A generic racer over a finite, ordered sequence of attempt factories,
//! starting them with a wall-clock stagger and cancelling all losers once a
//! winner is found.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use futures_util::stream::FuturesUnordered;
use futures_util::StreamExt;
use tokio::task::AbortHandle;
use tokio::time::Sleep;
use tracing::trace;

/// Lets [`race`] turn a cancelled/panicked child task's `JoinError` into a
/// domain-specific terminal error without knowing what that domain type is.
pub trait FromJoinError {
    fn from_join_error(err: tokio::task::JoinError) -> Self;
}

/// Outcome of a race: the winner (if any), its position in `factories`, and
/// one terminal-error slot per attempt actually started, in start order.
pub struct RaceOutcome<T, E> {
    pub winner: Option<T>,
    pub winner_index: Option<usize>,
    pub exceptions: Vec<Option<E>>,
}

/// Owns the [`AbortHandle`] of every attempt started so far and aborts all
/// of them when dropped — on a winning attempt this is called explicitly to
/// cancel the losers early; if the `race` future itself is dropped before
/// finishing (the caller cancelled it, e.g. via `tokio::time::timeout`),
/// this guard's own `Drop` fires as the function's stack frame unwinds and
/// aborts every attempt still outstanding, so no socket is left half-open.
struct AbortGuard(Vec<AbortHandle>);

impl AbortGuard {
    fn abort_all(&self) {
        for handle in &self.0 {
            handle.abort();
        }
    }
}

impl Drop for AbortGuard {
    fn drop(&mut self) {
        self.abort_all();
    }
}

/// Run `factories` with staggered starts and return the first success.
///
/// `factories[0]` starts immediately. Starting `factories[i]` for `i > 0` is
/// governed by a single-shot timer of `delay` armed when `factories[i-1]`
/// starts: whichever comes first, the timer firing or `factories[i-1]`
/// itself failing, starts `factories[i]`. `delay = None` disables the timer
/// entirely, so later attempts only start when their immediate predecessor
/// fails. The timer is never armed for the last factory.
///
/// The first attempt to *succeed*, from any position, wins; every other
/// still-running attempt is aborted and awaited so `exceptions` is always
/// fully populated, in start order, before this function returns.
pub async fn race<F, Fut, T, E>(factories: Vec<F>, delay: Option<Duration>) -> RaceOutcome<T, E>
where
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = Result<T, E>> + Send + 'static,
    T: Send + 'static,
    E: FromJoinError + Send + 'static,
{
    let total = factories.len();
    let mut factories = factories.into_iter().enumerate();

    let mut exceptions: Vec<Option<E>> = Vec::with_capacity(total);
    let mut abort_handles = AbortGuard(Vec::with_capacity(total));
    let mut in_flight: FuturesUnordered<Pin<Box<dyn Future<Output = (usize, Result<T, E>)> + Send>>> =
        FuturesUnordered::new();

    let mut winner: Option<(usize, T)> = None;
    let mut next_to_start = 0usize;
    let mut pending_predecessor: Option<usize> = None;
    let mut timer: Option<Pin<Box<Sleep>>> = None;

    let mut start_next = |factories: &mut std::iter::Enumerate<std::vec::IntoIter<F>>,
                           exceptions: &mut Vec<Option<E>>,
                           abort_handles: &mut AbortGuard,
                           in_flight: &mut FuturesUnordered<
        Pin<Box<dyn Future<Output = (usize, Result<T, E>)> + Send>>,
    >|
     -> Option<usize> {
        let (idx, factory) = factories.next()?;
        exceptions.push(None);
        let handle = tokio::spawn(factory());
        abort_handles.0.push(handle.abort_handle());
        in_flight.push(Box::pin(async move {
            match handle.await {
                Ok(result) => (idx, result),
                Err(join_err) => (idx, Err(E::from_join_error(join_err))),
            }
        }));
        trace!(attempt = idx, "started attempt");
        Some(idx)
    };

    if let Some(idx) = start_next(&mut factories, &mut exceptions, &mut abort_handles, &mut in_flight) {
        pending_predecessor = Some(idx);
        next_to_start += 1;
        if next_to_start < total {
            timer = delay.map(|d| Box::pin(tokio::time::sleep(d)));
        }
    }

    loop {
        if winner.is_some() && in_flight.is_empty() {
            break;
        }
        if in_flight.is_empty() && next_to_start >= total {
            break;
        }

        tokio::select! {
            _ = async { timer.as_mut().unwrap().as_mut().await }, if timer.is_some() && winner.is_none() => {
                timer = None;
                if let Some(idx) = start_next(&mut factories, &mut exceptions, &mut abort_handles, &mut in_flight) {
                    pending_predecessor = Some(idx);
                    next_to_start += 1;
                    if next_to_start < total {
                        timer = delay.map(|d| Box::pin(tokio::time::sleep(d)));
                    }
                }
            }
            Some((idx, result)) = in_flight.next(), if !in_flight.is_empty() => {
                match result {
                    Ok(value) => {
                        trace!(attempt = idx, "attempt succeeded");
                        if winner.is_none() {
                            winner = Some((idx, value));
                            abort_handles.abort_all(); // cancel every still-outstanding loser now
                        }
                    }
                    Err(e) => {
                        trace!(attempt = idx, "attempt failed");
                        exceptions[idx] = Some(e);
                        if winner.is_none() && pending_predecessor == Some(idx) {
                            timer = None;
                            if let Some(started) =
                                start_next(&mut factories, &mut exceptions, &mut abort_handles, &mut in_flight)
                            {
                                pending_predecessor = Some(started);
                                next_to_start += 1;
                                if next_to_start < total {
                                    timer = delay.map(|d| Box::pin(tokio::time::sleep(d)));
                                }
                            } else {
                                pending_predecessor = None;
                            }
                        }
                    }
                }
            }
        }
    }

    let (winner_value, winner_index) = match winner {
        Some((idx, value)) => (Some(value), Some(idx)),
        None => (None, None),
    };

    // The winner's own slot must read back as `None`.
    if let Some(idx) = winner_index {
        exceptions[idx] = None;
    }

    RaceOutcome {
        winner: winner_value,
        winner_index,
        exceptions,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Instant;

    #[derive(Debug, PartialEq, Eq)]
    struct Cancelled;

    impl FromJoinError for Cancelled {
        fn from_join_error(_: tokio::task::JoinError) -> Self {
            Cancelled
        }
    }

    fn forever_pending() -> impl Future<Output = Result<u32, Cancelled>> {
        std::future::pending()
    }

    /// P1: exceptions has one slot per started attempt; the winner's slot is
    /// `None`, every other slot is `Some`.
    #[tokio::test]
    async fn winner_slot_is_empty_others_are_not() {
        let factories: Vec<Box<dyn FnOnce() -> Pin<Box<dyn Future<Output = Result<u32, Cancelled>> + Send>> + Send>> = vec![
            Box::new(|| Box::pin(async { Err(Cancelled) }) as Pin<Box<dyn Future<Output = Result<u32, Cancelled>> + Send>>),
            Box::new(|| Box::pin(async { Ok(7) }) as Pin<Box<dyn Future<Output = Result<u32, Cancelled>> + Send>>),
        ];
        let outcome = race(factories, Some(Duration::from_millis(1))).await;

        assert_eq!(outcome.winner, Some(7));
        let w = outcome.winner_index.unwrap();
        assert!(outcome.exceptions[w].is_none());
        assert!(outcome.exceptions.iter().enumerate().all(|(i, e)| (i == w) == e.is_none()));
    }

    /// P6: with all attempts hanging, attempt i starts no earlier than
    /// t0 + i*delay.
    #[tokio::test(start_paused = true)]
    async fn stagger_timing_is_monotonic() {
        let start = Instant::now();
        let started_at: Arc<std::sync::Mutex<Vec<Duration>>> = Arc::new(std::sync::Mutex::new(Vec::new()));

        let factories: Vec<_> = (0..3)
            .map(|_| {
                let started_at = started_at.clone();
                move || {
                    started_at.lock().unwrap().push(start.elapsed());
                    forever_pending()
                }
            })
            .collect();

        let race_fut = race::<_, _, u32, Cancelled>(factories, Some(Duration::from_millis(50)));
        tokio::pin!(race_fut);

        // Nothing completes; drive the race forward in small time increments
        // and check each attempt started at or after its expected offset.
        for _ in 0..4 {
            tokio::time::advance(Duration::from_millis(60)).await;
            tokio::select! {
                _ = &mut race_fut => {}
                _ = tokio::time::sleep(Duration::from_millis(1)) => {}
            }
        }

        let times = started_at.lock().unwrap().clone();
        assert_eq!(times.len(), 3);
        for (i, t) in times.iter().enumerate() {
            assert!(*t >= Duration::from_millis(50 * i as u64));
        }
    }

    /// P7: a predecessor failing well before its stagger timer fires kicks
    /// off the next attempt immediately rather than waiting out the timer.
    #[tokio::test(start_paused = true)]
    async fn predecessor_failure_kicks_next_attempt_early() {
        let second_started = Arc::new(AtomicU64::new(u64::MAX));
        let start = Instant::now();
        let second_started_for_factory = second_started.clone();

        let factories: Vec<Box<dyn FnOnce() -> Pin<Box<dyn Future<Output = Result<u32, Cancelled>> + Send>> + Send>> = vec![
            Box::new(|| {
                Box::pin(async {
                    tokio::time::sleep(Duration::from_millis(5)).await;
                    Err(Cancelled)
                })
            }),
            Box::new(move || {
                second_started_for_factory.store(start.elapsed().as_millis() as u64, Ordering::SeqCst);
                Box::pin(forever_pending())
            }),
        ];

        let outcome = tokio::time::timeout(
            Duration::from_millis(20),
            race::<_, _, u32, Cancelled>(factories, Some(Duration::from_millis(100))),
        )
        .await;
        assert!(outcome.is_err(), "race should still be hanging on attempt 2");

        let started_ms = second_started.load(Ordering::SeqCst);
        assert!(started_ms < 100, "attempt 2 should start near t=5ms, not wait for the 100ms timer");
    }

    /// P3 / scenario 8: dropping the race before it resolves must close
    /// every still-open attempt, not just the ones it happened to cancel
    /// internally on a winner. `open_sockets` stands in for a real socket:
    /// incremented when an attempt starts, decremented only when that
    /// attempt's future is dropped (by success, failure, or cancellation).
    #[tokio::test(start_paused = true)]
    async fn dropping_the_race_closes_every_running_attempt() {
        struct SocketGuard(Arc<AtomicUsize>);
        impl Drop for SocketGuard {
            fn drop(&mut self) {
                self.0.fetch_sub(1, Ordering::SeqCst);
            }
        }

        async fn hang_open(open_sockets: Arc<AtomicUsize>) -> Result<u32, Cancelled> {
            open_sockets.fetch_add(1, Ordering::SeqCst);
            let _guard = SocketGuard(open_sockets);
            std::future::pending::<()>().await;
            unreachable!("never resolves on its own")
        }

        let open_sockets = Arc::new(AtomicUsize::new(0));
        let factories: Vec<_> = (0..2)
            .map(|_| {
                let open_sockets = open_sockets.clone();
                move || hang_open(open_sockets)
            })
            .collect();

        let handle = tokio::spawn(race::<_, _, u32, Cancelled>(
            factories,
            Some(Duration::from_millis(50)),
        ));

        // Let the first attempt start but not the second (stagger timer
        // hasn't fired yet), then cancel the whole race from outside.
        tokio::time::advance(Duration::from_millis(10)).await;
        for _ in 0..3 {
            tokio::task::yield_now().await;
        }
        assert_eq!(open_sockets.load(Ordering::SeqCst), 1);

        handle.abort();
        let _ = handle.await;
        for _ in 0..3 {
            tokio::task::yield_now().await;
        }

        assert_eq!(
            open_sockets.load(Ordering::SeqCst),
            0,
            "cancelling the race must drop every attempt still running, leaking no socket"
        );
    }
}
