//! A minimal cooperative scheduler: strict round-robin over a list of owned
//! coroutines, on one thread.

use crate::coroutine::Coroutine;
use crate::error::Error;

/// Runs a set of coroutines round-robin until all of them finish.
///
/// Tasks are resumed in insertion order, one resume per task per step.
/// Coroutines that finish are dropped from the list. The runner is as
/// single-threaded as the coroutines it owns; use one runner per thread.
#[derive(Default)]
pub struct TaskRunner {
    tasks: Vec<Coroutine>,
}

impl TaskRunner {
    /// Creates an empty runner.
    pub fn new() -> Self {
        TaskRunner { tasks: Vec::new() }
    }

    /// Appends a live coroutine to the schedule. Coroutines that are
    /// already done (or corrupted) are silently ignored.
    pub fn add(&mut self, coroutine: Coroutine) -> &mut Self {
        if coroutine.valid() && !coroutine.done() {
            self.tasks.push(coroutine);
        }
        self
    }

    /// Resumes every live task once, in insertion order, and returns
    /// whether any live tasks remain.
    ///
    /// A transient `NotSuspended` from a task is skipped over. Any other
    /// error aborts the step and surfaces to the caller; the offending
    /// coroutine is left in place.
    pub fn step(&mut self) -> Result<bool, Error> {
        let mut index = 0;
        while index < self.tasks.len() {
            if self.tasks[index].done() {
                self.tasks.remove(index);
                continue;
            }
            match self.tasks[index].resume() {
                Ok(()) | Err(Error::NotSuspended) => {}
                Err(err) => return Err(err),
            }
            if self.tasks[index].done() {
                self.tasks.remove(index);
            } else {
                index += 1;
            }
        }
        Ok(!self.tasks.is_empty())
    }

    /// Runs [`step`](Self::step) until no live tasks remain.
    pub fn run(&mut self) -> Result<(), Error> {
        while self.step()? {}
        Ok(())
    }

    /// Number of tasks still scheduled.
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Whether the schedule is empty.
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}
