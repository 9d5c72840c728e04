//! Idle scheduler contract.
//!
//! "Background" prebuild work is a lower-priority task on the host's single
//! logical update thread, not a separate OS thread. The host hands each
//! task a deadline and a flag saying whether long prediction work is
//! allowed this round; a task that runs out of deadline simply returns and
//! the owner re-posts it.

use std::cell::RefCell;
use std::collections::VecDeque;

use web_time::Instant;

/// A unit of idle work: `(deadline, can_run_long_task)`.
pub type IdleTask = Box<dyn FnOnce(Instant, bool)>;

/// Host frame scheduler supplying idle time between frames.
pub trait IdleScheduler {
    fn post_idle_task(&self, task: IdleTask);
}

/// Queue-backed scheduler pumped explicitly by the caller.
///
/// For headless hosts and tests: tasks run only when [`ManualScheduler::pump_one`]
/// is called, with whatever deadline and long-task allowance the caller
/// chooses. Tasks posted while pumping (re-posts) land at the back of the
/// queue.
#[derive(Default)]
pub struct ManualScheduler {
    queue: RefCell<VecDeque<IdleTask>>,
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of tasks waiting to run.
    pub fn pending(&self) -> usize {
        self.queue.borrow().len()
    }

    /// Runs the task at the front of the queue. Returns whether a task ran.
    pub fn pump_one(&self, deadline: Instant, can_run_long_task: bool) -> bool {
        let task = self.queue.borrow_mut().pop_front();
        match task {
            Some(task) => {
                task(deadline, can_run_long_task);
                true
            }
            None => false,
        }
    }

    /// Pumps until the queue drains or `max_rounds` is hit, re-posts
    /// included. Returns the number of tasks run.
    pub fn pump_all(&self, deadline: Instant, can_run_long_task: bool, max_rounds: usize) -> usize {
        let mut rounds = 0;
        while rounds < max_rounds && self.pump_one(deadline, can_run_long_task) {
            rounds += 1;
        }
        rounds
    }
}

impl IdleScheduler for ManualScheduler {
    fn post_idle_task(&self, task: IdleTask) {
        self.queue.borrow_mut().push_back(task);
    }
}
