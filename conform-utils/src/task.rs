//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::future::Future;
use std::ops::ControlFlow;
use std::pin::Pin;
use std::time::Duration;

use tokio::time::Instant;
use tokio::{task, time};
use tracing::Instrument;

/// A handle which can be used to manipulate the task created by the
/// [`Task::spawn`] function.
///
/// Dropping this handle cancels the task. Tasks are scoped to the operation
/// that created them.
#[derive(Debug)]
pub struct Task<T> {
    join_handle: task::JoinHandle<T>,
}

/// A handle which can be used to manipulate the timeout task created by the
/// [`TimeoutTask::new`] function.
///
/// Dropping this handle cancels the timeout task.
#[derive(Debug)]
pub struct TimeoutTask {
    _task: Task<()>,
}

/// A handle which can be used to manipulate the interval task created by the
/// [`IntervalTask::new`] function.
///
/// Dropping this handle cancels the interval task.
#[derive(Debug)]
pub struct IntervalTask {
    task: Task<()>,
}

// ===== impl Task =====

impl<T> Task<T> {
    /// Spawns a new asynchronous task, returning a handle for it.
    pub fn spawn<Fut>(future: Fut) -> Task<T>
    where
        Fut: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        Task {
            join_handle: task::spawn(future.in_current_span()),
        }
    }

    /// Returns whether the task has already run to completion.
    pub fn is_finished(&self) -> bool {
        self.join_handle.is_finished()
    }
}

impl<T> Future for Task<T> {
    type Output = Result<T, task::JoinError>;

    fn poll(
        mut self: Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Self::Output> {
        Pin::new(&mut self.join_handle).poll(cx)
    }
}

impl<T> Drop for Task<T> {
    fn drop(&mut self) {
        self.join_handle.abort();
    }
}

// ===== impl TimeoutTask =====

impl TimeoutTask {
    /// Spawns a new task that will call the provided async closure when the
    /// specified timeout expires.
    ///
    /// Returns a handler that can be used to manipulate the timeout task.
    pub fn new<F, Fut>(timeout: Duration, cb: F) -> TimeoutTask
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send,
    {
        let task = Task::spawn(async move {
            time::sleep(timeout).await;
            (cb)().await;
        });

        TimeoutTask { _task: task }
    }
}

// ===== impl IntervalTask =====

impl IntervalTask {
    /// Spawns a new task that will call the provided async closure whenever the
    /// specified interval timer ticks.
    ///
    /// The task ends on its own as soon as the closure returns
    /// [`ControlFlow::Break`].
    pub fn new<F, Fut>(
        interval: Duration,
        tick_on_start: bool,
        mut cb: F,
    ) -> IntervalTask
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ControlFlow<()>> + Send,
    {
        let task = Task::spawn(async move {
            let mut interval_fut = if tick_on_start {
                time::interval(interval)
            } else {
                let start = Instant::now() + interval;
                time::interval_at(start, interval)
            };
            interval_fut
                .set_missed_tick_behavior(time::MissedTickBehavior::Delay);

            loop {
                interval_fut.tick().await;
                if (cb)().await.is_break() {
                    break;
                }
            }
        });

        IntervalTask { task }
    }

    /// Returns whether the callback has asked the task to stop.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[tokio::test(start_paused = true)]
    async fn timeout_fires_once() {
        let fired = Arc::new(AtomicUsize::new(0));
        let fired_child = fired.clone();
        let timeout =
            TimeoutTask::new(Duration::from_secs(5), move || async move {
                fired_child.fetch_add(1, Ordering::SeqCst);
            });

        time::sleep(Duration::from_secs(4)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        time::sleep(Duration::from_secs(2)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        drop(timeout);
    }

    #[tokio::test(start_paused = true)]
    async fn dropped_timeout_never_fires() {
        let fired = Arc::new(AtomicUsize::new(0));
        let fired_child = fired.clone();
        let timeout =
            TimeoutTask::new(Duration::from_secs(1), move || async move {
                fired_child.fetch_add(1, Ordering::SeqCst);
            });
        drop(timeout);

        time::sleep(Duration::from_secs(2)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn interval_stops_on_break() {
        let ticks = Arc::new(AtomicUsize::new(0));
        let ticks_child = ticks.clone();
        let interval =
            IntervalTask::new(Duration::from_millis(100), true, move || {
                let ticks = ticks_child.clone();
                async move {
                    if ticks.fetch_add(1, Ordering::SeqCst) + 1 == 3 {
                        ControlFlow::Break(())
                    } else {
                        ControlFlow::Continue(())
                    }
                }
            });

        time::sleep(Duration::from_secs(1)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 3);
        assert!(interval.is_finished());
    }
}
