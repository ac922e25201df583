//! Cooperative per-frame tasks.
//!
//! Watchers that used to be host coroutines are expressed as [`Task`]s: each
//! [`Scheduler::tick`] wakes every live task once, and a task that has nothing to do yet
//! returns [`TaskStatus::Pending`] to be woken again on the next tick. Cancellation is a
//! flag ([`CancelToken`]) set by the owning extension. A cancelled task is woken one last
//! time so it can clean up, then dropped whatever it returns.

use std::{
    fmt,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex,
    },
};

use crate::Result;

/// What a task wants after being polled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    /// Wake the task again on the next tick
    Pending,
    /// The task is done and can be dropped
    Finished,
}

/// A unit of cooperative work woken once per tick.
pub trait Task: Send {
    /// Name used in log messages.
    fn name(&self) -> &str;

    /// Does one frame's worth of work.
    ///
    /// # Errors
    /// An error finishes the task; it is logged by the scheduler.
    fn poll(&mut self, cancel: &CancelToken) -> Result<TaskStatus>;
}

/// Shared cancellation flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// Creates a token that is not cancelled.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation. Idempotent.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    /// Whether cancellation was requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

struct Scheduled {
    task: Box<dyn Task>,
    cancel: CancelToken,
}

/// Runs [`Task`]s cooperatively, one poll per task per tick.
///
/// Tasks spawned while a tick is running are first polled on the following tick.
///
/// # Examples
///
/// ```rust
/// use modweave::extension::{CancelToken, Scheduler, Task, TaskStatus};
///
/// struct Countdown(u32);
///
/// impl Task for Countdown {
///     fn name(&self) -> &str {
///         "countdown"
///     }
///
///     fn poll(&mut self, _cancel: &CancelToken) -> modweave::Result<TaskStatus> {
///         self.0 -= 1;
///         Ok(if self.0 == 0 { TaskStatus::Finished } else { TaskStatus::Pending })
///     }
/// }
///
/// let scheduler = Scheduler::new();
/// scheduler.spawn(Box::new(Countdown(2)));
/// assert_eq!(scheduler.tick(), 1);
/// assert_eq!(scheduler.tick(), 0);
/// ```
#[derive(Default)]
pub struct Scheduler {
    tasks: Mutex<Vec<Scheduled>>,
}

impl Scheduler {
    /// Creates an idle scheduler.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `task`, returning the token that cancels it.
    pub fn spawn(&self, task: Box<dyn Task>) -> CancelToken {
        let cancel = CancelToken::new();
        log::debug!("spawning task {}", task.name());
        lock!(self.tasks).push(Scheduled {
            task,
            cancel: cancel.clone(),
        });
        cancel
    }

    /// Wakes every live task once. Returns the number of tasks still pending afterwards.
    pub fn tick(&self) -> usize {
        let current = std::mem::take(&mut *lock!(self.tasks));
        let mut pending = Vec::with_capacity(current.len());

        for mut scheduled in current {
            match scheduled.task.poll(&scheduled.cancel) {
                Ok(TaskStatus::Pending) if scheduled.cancel.is_cancelled() => {
                    log::debug!("task {} cancelled", scheduled.task.name());
                }
                Ok(TaskStatus::Pending) => pending.push(scheduled),
                Ok(TaskStatus::Finished) => {
                    log::debug!("task {} finished", scheduled.task.name());
                }
                Err(error) => {
                    log::warn!("task {} failed: {error}", scheduled.task.name());
                }
            }
        }

        let mut tasks = lock!(self.tasks);
        pending.append(&mut tasks);
        *tasks = pending;
        tasks.len()
    }

    /// Number of tasks not yet finished.
    #[must_use]
    pub fn len(&self) -> usize {
        lock!(self.tasks).len()
    }

    /// Returns `true` if no task is scheduled.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("tasks", &self.len())
            .finish()
    }
}
