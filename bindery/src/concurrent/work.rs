// Copyright (c) The bindery Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use debug_ignore::DebugIgnore;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Condvar, Mutex};
use std::thread;

/// A single-shot joinable computation.
///
/// A `WorkItem` binds a parameterless closure producing `T`. Any worker may
/// call [`run`](Self::run); the closure executes exactly once, and
/// [`join`](Self::join) blocks callers until it has finished. A panic
/// inside the closure is captured and re-raised in the first joiner.
///
/// The lifetime parameter lets the closure borrow from its environment, so
/// items can be fanned out on a scoped thread pool.
pub struct WorkItem<'a, T> {
    task: Mutex<Option<DebugIgnore<Box<dyn FnOnce() -> T + Send + 'a>>>>,
    state: Mutex<State<T>>,
    done: Condvar,
}

enum State<T> {
    Pending,
    Finished(Option<thread::Result<T>>),
}

impl<'a, T> WorkItem<'a, T> {
    /// Creates a work item from a closure.
    pub fn new(task: impl FnOnce() -> T + Send + 'a) -> Self {
        Self {
            task: Mutex::new(Some(DebugIgnore(Box::new(task)))),
            state: Mutex::new(State::Pending),
            done: Condvar::new(),
        }
    }

    /// Executes the bound closure if no other worker has claimed it yet.
    /// Subsequent calls return immediately.
    pub fn run(&self) {
        let task = match self.task.lock().expect("task lock poisoned").take() {
            Some(task) => task,
            None => return,
        };

        let result = panic::catch_unwind(AssertUnwindSafe(move || (task.0)()));

        let mut state = self.state.lock().expect("state lock poisoned");
        *state = State::Finished(Some(result));
        self.done.notify_all();
    }

    /// Blocks until the computation has finished and returns its value.
    ///
    /// If the closure panicked, the first joiner re-raises the panic;
    /// later joiners panic with a placeholder message.
    pub fn join(&self) -> T
    where
        T: Clone,
    {
        enum Outcome<T> {
            Value(T),
            Panic(Box<dyn std::any::Any + Send>),
        }

        let mut state = self.state.lock().expect("state lock poisoned");
        let outcome = loop {
            match &mut *state {
                State::Pending => {
                    state = self.done.wait(state).expect("state lock poisoned");
                }
                State::Finished(result) => match result {
                    Some(Ok(value)) => break Outcome::Value(value.clone()),
                    Some(Err(_)) => {
                        // Move the payload out so the lock can be released
                        // before rethrowing.
                        let payload = match result.take() {
                            Some(Err(payload)) => payload,
                            _ => unreachable!("checked above"),
                        };
                        break Outcome::Panic(payload);
                    }
                    None => panic!("work item panicked in a previous join"),
                },
            }
        };
        drop(state);

        match outcome {
            Outcome::Value(value) => value,
            Outcome::Panic(payload) => panic::resume_unwind(payload),
        }
    }
}

impl<T> fmt::Debug for WorkItem<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock().expect("state lock poisoned");
        let label = match &*state {
            State::Pending => "pending",
            State::Finished(_) => "finished",
        };
        f.debug_struct("WorkItem").field("state", &label).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn run_then_join() {
        let item = WorkItem::new(|| 7);
        item.run();
        assert_eq!(item.join(), 7);
    }

    #[test]
    fn join_blocks_until_run() {
        let item = Arc::new(WorkItem::new(|| "done".to_owned()));
        let joiner = {
            let item = Arc::clone(&item);
            thread::spawn(move || item.join())
        };
        // Give the joiner a chance to block first.
        thread::yield_now();
        item.run();
        assert_eq!(joiner.join().unwrap(), "done");
    }

    #[test]
    fn run_is_single_shot() {
        let item = WorkItem::new(|| 1);
        item.run();
        item.run();
        assert_eq!(item.join(), 1);
        // Joining again still returns the cached value.
        assert_eq!(item.join(), 1);
    }

    #[test]
    fn join_reraises_panic() {
        let item: WorkItem<()> = WorkItem::new(|| panic!("inspection exploded"));
        item.run();
        let err = panic::catch_unwind(AssertUnwindSafe(|| item.join()))
            .expect_err("join should re-raise");
        let message = err.downcast_ref::<&str>().copied().unwrap_or_default();
        assert_eq!(message, "inspection exploded");
    }
}
