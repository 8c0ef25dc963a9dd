//! Units of work and their cleanup registries.
//!
//! A [`UnitOfWork`] is the explicit context of one request-processing cycle.
//! Proxies record the instances they borrow in it and register one cleanup
//! task per borrow. Cleanup runs when the unit of work is finished or
//! dropped, so borrows are released on error and panic paths too.

use crate::error::ComponentError;
use serde::Serialize;
use std::any::Any;
use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use uuid::Uuid;

/// Key of a borrow record, unique per proxy.
pub(crate) type BorrowKey = u64;

type CleanupFn = Box<dyn FnOnce(&UnitOfWork) -> Result<(), ComponentError> + Send>;

struct CleanupTask {
    label: String,
    run: CleanupFn,
}

enum Slot {
    Bound(Box<dyn Any + Send>),
    /// The bound value is lent out to a call in progress.
    InCall,
}

/// A borrow record is already lent out to a call in progress.
#[derive(Debug)]
pub(crate) struct SlotInUse;

/// A cleanup task that failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CleanupFailure {
    /// Label given when the task was registered.
    pub task: String,
    /// Error or panic message.
    pub message: String,
}

/// Outcome of running a unit of work's cleanup tasks.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CleanupReport {
    /// Number of tasks executed.
    pub tasks_run: usize,
    /// Tasks that returned an error or panicked.
    pub failures: Vec<CleanupFailure>,
}

impl CleanupReport {
    /// Returns true if every task succeeded.
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// The context of one request-processing cycle.
///
/// Belongs to one thread at a time: it is `Send` but not `Sync`.
pub struct UnitOfWork {
    id: Uuid,
    span: tracing::Span,
    slots: RefCell<HashMap<BorrowKey, Slot>>,
    tasks: RefCell<VecDeque<CleanupTask>>,
    finished: bool,
}

impl UnitOfWork {
    /// Starts a new unit of work.
    pub fn new() -> Self {
        let id = Uuid::new_v4();
        Self {
            id,
            span: tracing::debug_span!("unit_of_work", id = %id),
            slots: RefCell::new(HashMap::new()),
            tasks: RefCell::new(VecDeque::new()),
            finished: false,
        }
    }

    /// Runs `f` inside a fresh unit of work and finishes it afterwards.
    ///
    /// If `f` panics the unit of work is still cleaned up while unwinding.
    pub fn run<R>(f: impl FnOnce(&UnitOfWork) -> R) -> (R, CleanupReport) {
        let cx = UnitOfWork::new();
        let result = f(&cx);
        (result, cx.finish())
    }

    /// Returns the unit of work identifier.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Returns the tracing span of this unit of work.
    pub fn span(&self) -> &tracing::Span {
        &self.span
    }

    /// Registers a task to run when this unit of work ends.
    ///
    /// Tasks run in registration order. A failing task is reported and does
    /// not prevent the remaining tasks from running.
    pub fn add_cleanup_task<F>(&self, label: impl Into<String>, task: F)
    where
        F: FnOnce(&UnitOfWork) -> Result<(), ComponentError> + Send + 'static,
    {
        self.tasks.borrow_mut().push_back(CleanupTask {
            label: label.into(),
            run: Box::new(task),
        });
    }

    /// Returns the number of cleanup tasks not yet run.
    pub fn pending_cleanup_tasks(&self) -> usize {
        self.tasks.borrow().len()
    }

    /// Returns the number of borrow records held.
    pub fn borrow_count(&self) -> usize {
        self.slots.borrow().len()
    }

    /// Runs all cleanup tasks and ends the unit of work.
    pub fn finish(mut self) -> CleanupReport {
        self.finished = true;
        self.run_cleanup()
    }

    fn run_cleanup(&self) -> CleanupReport {
        let _entered = self.span.enter();
        let mut report = CleanupReport::default();

        loop {
            let Some(task) = self.tasks.borrow_mut().pop_front() else {
                break;
            };
            report.tasks_run += 1;

            let CleanupTask { label, run } = task;
            let message = match catch_unwind(AssertUnwindSafe(|| run(self))) {
                Ok(Ok(())) => continue,
                Ok(Err(e)) => e.to_string(),
                Err(panic) => panic_message(panic.as_ref()),
            };
            tracing::warn!(task = %label, error = %message, "cleanup task failed");
            report.failures.push(CleanupFailure {
                task: label,
                message,
            });
        }

        // Records whose task never ran are dropped, returning leases on drop.
        let leftovers = std::mem::take(&mut *self.slots.borrow_mut());
        if !leftovers.is_empty() {
            tracing::warn!(
                count = leftovers.len(),
                "dropping borrow records without cleanup task"
            );
        }
        drop(leftovers);

        tracing::debug!(
            tasks = report.tasks_run,
            failures = report.failures.len(),
            "unit of work finished"
        );
        report
    }

    /// Takes the borrow record for `key` out for the duration of a call.
    ///
    /// The slot stays marked as in use until [`UnitOfWork::bind`] or
    /// [`UnitOfWork::vacate`] is called.
    pub(crate) fn enter<T: Any + Send>(&self, key: BorrowKey) -> Result<Option<T>, SlotInUse> {
        let mut slots = self.slots.borrow_mut();
        match slots.insert(key, Slot::InCall) {
            None => Ok(None),
            Some(Slot::Bound(value)) => Ok(value.downcast::<T>().ok().map(|value| *value)),
            Some(Slot::InCall) => Err(SlotInUse),
        }
    }

    /// Stores the borrow record for `key`.
    pub(crate) fn bind<T: Any + Send>(&self, key: BorrowKey, value: T) {
        self.slots.borrow_mut().insert(key, Slot::Bound(Box::new(value)));
    }

    /// Clears an in-use marker left by [`UnitOfWork::enter`] when nothing is rebound.
    pub(crate) fn vacate(&self, key: BorrowKey) {
        let mut slots = self.slots.borrow_mut();
        if matches!(slots.get(&key), Some(Slot::InCall)) {
            slots.remove(&key);
        }
    }

    /// Removes the borrow record for `key`.
    pub(crate) fn take_bound<T: Any + Send>(&self, key: BorrowKey) -> Option<T> {
        match self.slots.borrow_mut().remove(&key) {
            Some(Slot::Bound(value)) => value.downcast::<T>().ok().map(|value| *value),
            _ => None,
        }
    }

    /// Returns true if a borrow record exists for `key`.
    pub(crate) fn is_bound(&self, key: BorrowKey) -> bool {
        self.slots.borrow().contains_key(&key)
    }
}

impl Default for UnitOfWork {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for UnitOfWork {
    fn drop(&mut self) {
        if !self.finished {
            self.finished = true;
            let report = self.run_cleanup();
            if !report.is_clean() {
                tracing::warn!(
                    id = %self.id,
                    failures = report.failures.len(),
                    "unit of work dropped with failing cleanup"
                );
            }
        }
    }
}

impl fmt::Debug for UnitOfWork {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UnitOfWork")
            .field("id", &self.id)
            .field("borrows", &self.borrow_count())
            .field("pending_cleanup_tasks", &self.pending_cleanup_tasks())
            .finish()
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "cleanup task panicked".to_string()
    }
}
