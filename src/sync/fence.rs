//! Monotonic timeline fences for CPU-GPU synchronization.
//!
//! A fence carries a monotonically increasing completed value. Queues signal
//! it as submissions retire; the CPU waits on values or polls them. Cleanup
//! closures can be attached to a value and run exactly once when the fence
//! reaches it; the scheduler uses this to return command allocators and
//! scratch spaces to their pools only after the GPU is done with them.

use std::fmt::{Debug, Formatter};
use std::sync::{Arc, Condvar, Mutex};

type CleanupFn = Box<dyn FnOnce() + Send>;

#[derive(Default)]
struct FenceState {
    completed: u64,
    cleanups: Vec<(u64, CleanupFn)>,
}

struct FenceShared {
    state: Mutex<FenceState>,
    cond: Condvar,
}

/// A clonable timeline fence. All clones observe the same completed value.
#[derive(Clone)]
pub struct Fence {
    shared: Arc<FenceShared>,
}

impl Fence {
    /// Create a fence with a completed value of zero.
    pub fn new() -> Self {
        Self {
            shared: Arc::new(FenceShared {
                state: Mutex::new(FenceState::default()),
                cond: Condvar::new(),
            }),
        }
    }

    /// Advance the completed value to at least `value` and run every cleanup
    /// attached to a value that is now complete. Signaling a value lower than
    /// the current completed value is a no-op.
    pub fn signal(&self, value: u64) {
        let due = {
            let mut state = self.shared.state.lock().unwrap();
            if value <= state.completed {
                return;
            }
            state.completed = value;
            let completed = state.completed;
            let mut due = Vec::new();
            let mut index = 0;
            while index < state.cleanups.len() {
                if state.cleanups[index].0 <= completed {
                    due.push(state.cleanups.swap_remove(index).1);
                } else {
                    index += 1;
                }
            }
            self.shared.cond.notify_all();
            due
        };
        // Run cleanups outside the lock; they may attach new cleanups or
        // inspect the fence themselves.
        for cleanup in due {
            cleanup();
        }
    }

    /// The highest value the fence has completed.
    pub fn completed_value(&self) -> u64 {
        self.shared.state.lock().unwrap().completed
    }

    /// Whether `value` has completed.
    pub fn is_complete(&self, value: u64) -> bool {
        self.completed_value() >= value
    }

    /// Block until the fence completes `value`.
    pub fn wait_value(&self, value: u64) {
        let mut state = self.shared.state.lock().unwrap();
        while state.completed < value {
            state = self.shared.cond.wait(state).unwrap();
        }
    }

    /// Attach a cleanup to run when the fence completes `value`. Runs
    /// immediately if the value has already completed.
    pub fn on_completed(&self, value: u64, f: impl FnOnce() + Send + 'static) {
        {
            let mut state = self.shared.state.lock().unwrap();
            if state.completed < value {
                state.cleanups.push((value, Box::new(f)));
                return;
            }
        }
        f();
    }
}

impl Default for Fence {
    fn default() -> Self {
        Self::new()
    }
}

impl Debug for Fence {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Fence")
            .field("completed", &self.completed_value())
            .finish()
    }
}
