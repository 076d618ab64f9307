//! The run loop: coalesces work scheduled during an update cycle and runs it in phases.

use crate::error::ViewError;
use crate::view::ViewId;
use core::fmt;
use parking_lot::Mutex;
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// Named phases of an update cycle, in the order they run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Phase {
    /// Propagating bindings between values.
    Sync,
    /// General work.
    Actions,
    /// Re-render checks; by now all values for the cycle have settled.
    Render,
    /// Work that needs up-to-date output.
    AfterRender,
    /// Teardown.
    Destroy,
}

impl Phase {
    pub const ALL: [Phase; 5] = [
        Phase::Sync,
        Phase::Actions,
        Phase::Render,
        Phase::AfterRender,
        Phase::Destroy,
    ];

    fn index(self) -> usize {
        self as usize
    }
}

type Task = Box<dyn FnOnce() -> Result<(), ViewError> + Send>;
type TaskKey = (Phase, ViewId, &'static str);

struct ScheduledTask {
    target: ViewId,
    method: &'static str,
    run: Task,
}

#[derive(Default)]
struct Queues {
    phases: [VecDeque<ScheduledTask>; 5],
    pending: HashSet<TaskKey>,
}

impl Queues {
    /// Takes all tasks of the earliest non-empty phase.
    fn take_next(&mut self) -> Option<(Phase, Vec<ScheduledTask>)> {
        let phase = Phase::ALL
            .iter()
            .copied()
            .find(|phase| !self.phases[phase.index()].is_empty())?;
        let tasks: Vec<_> = self.phases[phase.index()].drain(..).collect();
        for task in &tasks {
            self.pending.remove(&(phase, task.target, task.method));
        }
        Some((phase, tasks))
    }

    /// Puts unrun tasks back at the front of their phase, keeping their order.
    fn requeue(&mut self, phase: Phase, tasks: Vec<ScheduledTask>) {
        for task in tasks.into_iter().rev() {
            // rescheduled while we were running; the newer entry wins
            if self.pending.insert((phase, task.target, task.method)) {
                self.phases[phase.index()].push_front(task);
            }
        }
    }
}

/// Tasks taken out of a phase that haven't run yet.
///
/// Dropping this puts them back on the queue, including while unwinding from a panicking task.
struct Unrun<'a> {
    queues: &'a Mutex<Queues>,
    phase: Phase,
    tasks: std::vec::IntoIter<ScheduledTask>,
}

impl Drop for Unrun<'_> {
    fn drop(&mut self) {
        let rest: Vec<_> = self.tasks.by_ref().collect();
        if rest.is_empty() {
            return;
        }
        if std::thread::panicking() {
            warn!(phase = ?self.phase, tasks = rest.len(), "task panicked; requeueing the rest");
        }
        self.queues.lock().requeue(self.phase, rest);
    }
}

/// A coalescing task scheduler.
///
/// Tasks are keyed by `(phase, target, method)`; scheduling a key that is already queued does
/// nothing, so any number of change notifications within one cycle collapse into one task. A key
/// becomes schedulable again once its phase starts running.
///
/// Clones share the same queues.
#[derive(Clone, Default)]
pub struct RunLoop {
    queues: Arc<Mutex<Queues>>,
}

impl RunLoop {
    pub fn new() -> RunLoop {
        RunLoop::default()
    }

    /// Schedules `task` to run once in `phase` on behalf of `target`.
    ///
    /// Returns false if an identical `(phase, target, method)` task is already queued, in which
    /// case `task` is dropped.
    pub fn schedule_once<F>(&self, phase: Phase, target: ViewId, method: &'static str, task: F) -> bool
    where
        F: FnOnce() -> Result<(), ViewError> + Send + 'static,
    {
        let mut queues = self.queues.lock();
        if !queues.pending.insert((phase, target, method)) {
            trace!(?phase, view = %target, method, "already scheduled");
            return false;
        }
        trace!(?phase, view = %target, method, "scheduled");
        queues.phases[phase.index()].push_back(ScheduledTask {
            target,
            method,
            run: Box::new(task),
        });
        true
    }

    /// Returns true if a `(phase, target, method)` task is queued.
    pub fn is_scheduled(&self, phase: Phase, target: ViewId, method: &'static str) -> bool {
        self.queues.lock().pending.contains(&(phase, target, method))
    }

    /// Number of queued tasks across all phases.
    pub fn pending_count(&self) -> usize {
        self.queues.lock().pending.len()
    }

    /// Runs all queued tasks, phase by phase, until every queue is empty.
    ///
    /// After each phase, the earliest phase with work runs next, so tasks scheduled into earlier
    /// phases by later ones are handled before moving on. Tasks whose target view is gone are
    /// skipped. The first other error stops the flush; tasks that didn’t run stay queued. A
    /// panicking task unwinds out of `flush`, also leaving the tasks that didn’t run queued.
    ///
    /// Returns the number of tasks that ran.
    pub fn flush(&self) -> Result<usize, ViewError> {
        let mut ran = 0;
        loop {
            // the lock must not be held while tasks run; they may schedule more work
            let next = self.queues.lock().take_next();
            let (phase, tasks) = match next {
                Some(next) => next,
                None => break,
            };
            debug!(?phase, tasks = tasks.len(), "flushing phase");

            let mut unrun = Unrun {
                queues: &self.queues,
                phase,
                tasks: tasks.into_iter(),
            };
            while let Some(task) = unrun.tasks.next() {
                let (target, method) = (task.target, task.method);
                match (task.run)() {
                    Ok(()) => ran += 1,
                    Err(ViewError::ViewGone(_)) => {
                        trace!(?phase, view = %target, method, "target gone; task skipped");
                    }
                    Err(err) => {
                        debug!(?phase, view = %target, method, %err, "task failed");
                        return Err(err);
                    }
                }
            }
        }
        Ok(ran)
    }

    /// Runs `f`, then flushes everything it scheduled.
    pub fn run<R>(&self, f: impl FnOnce() -> R) -> Result<R, ViewError> {
        let result = f();
        self.flush()?;
        Ok(result)
    }
}

impl fmt::Debug for RunLoop {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("RunLoop")
            .field("pending", &self.pending_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::panic::{self, AssertUnwindSafe};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn log() -> Arc<Mutex<Vec<&'static str>>> {
        Arc::new(Mutex::new(Vec::new()))
    }

    fn push(log: &Arc<Mutex<Vec<&'static str>>>, entry: &'static str) -> impl FnOnce() -> Result<(), ViewError> + Send + 'static {
        let log = Arc::clone(log);
        move || {
            log.lock().push(entry);
            Ok(())
        }
    }

    #[test]
    fn schedule_once_coalesces() {
        let run_loop = RunLoop::new();
        let view = ViewId::new();
        let count = Arc::new(AtomicUsize::new(0));

        for _ in 0..3 {
            let count = Arc::clone(&count);
            run_loop.schedule_once(Phase::Render, view, "rerender_if_needed", move || {
                count.fetch_add(1, Ordering::SeqCst);
                Ok(())
            });
        }
        assert_eq!(run_loop.pending_count(), 1);
        assert!(run_loop.is_scheduled(Phase::Render, view, "rerender_if_needed"));

        assert_eq!(run_loop.flush(), Ok(1));
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(run_loop.pending_count(), 0);
    }

    #[test]
    fn distinct_keys_are_not_coalesced() {
        let run_loop = RunLoop::new();
        let log = log();
        let (a, b) = (ViewId::new(), ViewId::new());
        assert!(run_loop.schedule_once(Phase::Render, a, "rerender_if_needed", push(&log, "a")));
        assert!(run_loop.schedule_once(Phase::Render, b, "rerender_if_needed", push(&log, "b")));
        assert!(run_loop.schedule_once(Phase::Render, a, "other", push(&log, "a-other")));
        assert!(run_loop.schedule_once(Phase::Actions, a, "rerender_if_needed", push(&log, "a-actions")));

        assert_eq!(run_loop.flush(), Ok(4));
        assert_eq!(*log.lock(), vec!["a-actions", "a", "b", "a-other"]);
    }

    #[test]
    fn phases_run_in_order() {
        let run_loop = RunLoop::new();
        let log = log();
        let view = ViewId::new();
        run_loop.schedule_once(Phase::Destroy, view, "d", push(&log, "destroy"));
        run_loop.schedule_once(Phase::AfterRender, view, "a", push(&log, "after"));
        run_loop.schedule_once(Phase::Render, view, "r", push(&log, "render"));
        run_loop.schedule_once(Phase::Sync, view, "s", push(&log, "sync"));

        run_loop.flush().unwrap();
        assert_eq!(*log.lock(), vec!["sync", "render", "after", "destroy"]);
    }

    #[test]
    fn earlier_phases_rerun_first() {
        let run_loop = RunLoop::new();
        let log = log();
        let view = ViewId::new();

        let inner = run_loop.clone();
        let inner_log = Arc::clone(&log);
        run_loop.schedule_once(Phase::Render, view, "render", move || {
            inner_log.lock().push("render");
            inner.schedule_once(Phase::Sync, view, "sync", push(&inner_log, "sync"));
            Ok(())
        });
        run_loop.schedule_once(Phase::AfterRender, view, "after", push(&log, "after"));

        assert_eq!(run_loop.flush(), Ok(3));
        assert_eq!(*log.lock(), vec!["render", "sync", "after"]);
    }

    #[test]
    fn key_is_schedulable_again_once_its_phase_runs() {
        let run_loop = RunLoop::new();
        let view = ViewId::new();
        let count = Arc::new(AtomicUsize::new(0));

        let inner = run_loop.clone();
        let c = Arc::clone(&count);
        run_loop.schedule_once(Phase::Render, view, "again", move || {
            c.fetch_add(1, Ordering::SeqCst);
            let c = Arc::clone(&c);
            inner.schedule_once(Phase::Render, view, "again", move || {
                c.fetch_add(1, Ordering::SeqCst);
                Ok(())
            });
            Ok(())
        });

        assert_eq!(run_loop.flush(), Ok(2));
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn gone_targets_are_skipped() {
        let run_loop = RunLoop::new();
        let log = log();
        let (gone, alive) = (ViewId::new(), ViewId::new());
        run_loop.schedule_once(Phase::Render, gone, "r", move || Err(ViewError::ViewGone(gone)));
        run_loop.schedule_once(Phase::Render, alive, "r", push(&log, "alive"));

        assert_eq!(run_loop.flush(), Ok(1));
        assert_eq!(*log.lock(), vec!["alive"]);
    }

    #[test]
    fn errors_stop_the_flush_and_keep_the_rest() {
        let run_loop = RunLoop::new();
        let log = log();
        let (bad, good) = (ViewId::new(), ViewId::new());
        run_loop.schedule_once(Phase::Render, bad, "r", move || Err(ViewError::Destroyed(bad)));
        run_loop.schedule_once(Phase::Render, good, "r", push(&log, "good"));

        assert_eq!(run_loop.flush(), Err(ViewError::Destroyed(bad)));
        assert!(log.lock().is_empty());
        assert!(run_loop.is_scheduled(Phase::Render, good, "r"));

        assert_eq!(run_loop.flush(), Ok(1));
        assert_eq!(*log.lock(), vec!["good"]);
    }

    #[test]
    fn panics_propagate_and_keep_the_rest() {
        let run_loop = RunLoop::new();
        let log = log();
        let (bad, good) = (ViewId::new(), ViewId::new());
        run_loop.schedule_once(Phase::Render, bad, "r", || panic!("broken task"));
        run_loop.schedule_once(Phase::Render, good, "r", push(&log, "good"));
        run_loop.schedule_once(Phase::AfterRender, good, "a", push(&log, "after"));

        let result = panic::catch_unwind(AssertUnwindSafe(|| run_loop.flush()));
        assert!(result.is_err());
        assert!(log.lock().is_empty());
        assert!(!run_loop.is_scheduled(Phase::Render, bad, "r"));
        assert!(run_loop.is_scheduled(Phase::Render, good, "r"));
        assert!(run_loop.is_scheduled(Phase::AfterRender, good, "a"));

        assert_eq!(run_loop.flush(), Ok(2));
        assert_eq!(*log.lock(), vec!["good", "after"]);
    }

    #[test]
    fn run_flushes_afterwards() {
        let run_loop = RunLoop::new();
        let log = log();
        let view = ViewId::new();
        let value = run_loop
            .run(|| {
                run_loop.schedule_once(Phase::Render, view, "r", push(&log, "ran"));
                assert!(log.lock().is_empty());
                42
            })
            .unwrap();
        assert_eq!(value, 42);
        assert_eq!(*log.lock(), vec!["ran"]);
    }
}
