//! Table of running commands, keyed by output sink name.

use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex, MutexGuard,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError};
use nix::{sys::signal::Signal, unistd::Pid};
use uuid::Uuid;

use crate::runner::RunStatus;

/// How long a terminated process gets before it is killed outright
const KILL_GRACE: Duration = Duration::from_secs(2);

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[derive(Debug, Default)]
pub(crate) struct RunControl {
    cancelled: AtomicBool,
    /// Process group ids of the live step processes
    groups: Mutex<Vec<u32>>,
    status: Mutex<Option<RunStatus>>,
}

impl RunControl {
    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Track a freshly spawned process, signalling it at once if the run was
    /// killed while it was starting
    pub(crate) fn register(&self, pid: u32) {
        lock(&self.groups).push(pid);
        if self.is_cancelled() {
            signal_group(pid, Signal::SIGTERM);
        }
    }

    pub(crate) fn unregister(&self, pid: u32) {
        lock(&self.groups).retain(|p| *p != pid);
    }

    pub(crate) fn set_status(&self, status: RunStatus) {
        *lock(&self.status) = Some(status);
    }

    fn signal_all(&self, signal: Signal) {
        for pid in lock(&self.groups).iter() {
            signal_group(*pid, signal);
        }
    }
}

fn signal_group(pid: u32, signal: Signal) {
    let Ok(raw) = i32::try_from(pid) else {
        return;
    };
    if let Err(e) = nix::sys::signal::killpg(Pid::from_raw(raw), signal) {
        tracing::debug!(%pid, ?signal, error = %e, "signalling process group");
    }
}

/// A handle on one dispatched command run.
///
/// The run's worker holds the matching sender and drops it once every
/// process has exited and the table entry is gone.
#[derive(Debug, Clone)]
pub struct RunHandle {
    id: Uuid,
    name: String,
    control: Arc<RunControl>,
    done: Receiver<()>,
}

impl RunHandle {
    pub(crate) fn new(name: impl Into<String>) -> (Self, Sender<()>) {
        let (tx, rx) = crossbeam_channel::bounded(0);
        let handle = Self {
            id: Uuid::new_v4(),
            name: name.into(),
            control: Arc::new(RunControl::default()),
            done: rx,
        };
        (handle, tx)
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn control(&self) -> &Arc<RunControl> {
        &self.control
    }

    pub fn is_finished(&self) -> bool {
        matches!(self.done.try_recv(), Err(TryRecvError::Disconnected))
    }

    /// Block until the run has finished, returning its final status
    pub fn wait(&self) -> RunStatus {
        // nothing is ever sent, the channel only disconnects
        let _ = self.done.recv();
        self.status().unwrap_or(RunStatus::Cancelled)
    }

    /// Like [`RunHandle::wait`], giving up after `timeout`
    pub fn wait_timeout(&self, timeout: Duration) -> Option<RunStatus> {
        match self.done.recv_timeout(timeout) {
            Err(RecvTimeoutError::Timeout) => None,
            _ => Some(self.status().unwrap_or(RunStatus::Cancelled)),
        }
    }

    pub fn status(&self) -> Option<RunStatus> {
        lock(&self.control.status).clone()
    }

    /// Terminate every live process of the run and wait until they are reaped
    #[tracing::instrument(skip(self), fields(name = %self.name, id = %self.id))]
    pub fn kill(&self) -> RunStatus {
        tracing::debug!("killing run");
        self.control.cancelled.store(true, Ordering::SeqCst);
        self.control.signal_all(Signal::SIGTERM);
        if let Some(status) = self.wait_timeout(KILL_GRACE) {
            return status;
        }
        tracing::warn!("run did not exit after SIGTERM, sending SIGKILL");
        self.control.signal_all(Signal::SIGKILL);
        self.wait()
    }
}

/// Process-wide map from command tab name to its active run
#[derive(Debug, Default)]
pub struct RunningTable {
    runs: Mutex<HashMap<String, RunHandle>>,
}

impl RunningTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handle`, killing and waiting out any run already using its name.
    ///
    /// The lock is never held while waiting, so the loop re-checks until the
    /// name is free.
    pub fn insert(&self, handle: RunHandle) {
        loop {
            let existing = {
                let mut runs = lock(&self.runs);
                match runs.get(handle.name()) {
                    Some(existing) => existing.clone(),
                    None => {
                        runs.insert(handle.name().to_string(), handle);
                        return;
                    }
                }
            };
            tracing::debug!(name = %existing.name(), "replacing running command");
            existing.kill();
            self.remove_run(existing.name(), existing.id());
        }
    }

    /// Remove the entry for `name` if it still belongs to run `id`
    pub(crate) fn remove_run(&self, name: &str, id: Uuid) -> bool {
        let mut runs = lock(&self.runs);
        if runs.get(name).is_some_and(|h| h.id() == id) {
            runs.remove(name);
            true
        } else {
            false
        }
    }

    pub fn get(&self, name: &str) -> Option<RunHandle> {
        lock(&self.runs).get(name).cloned()
    }

    pub fn is_running(&self, name: &str) -> bool {
        lock(&self.runs).contains_key(name)
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<_> = lock(&self.runs).keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        lock(&self.runs).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Kill the run called `name`, returning its final status if there was one
    pub fn kill_by_name(&self, name: &str) -> Option<RunStatus> {
        let handle = self.get(name)?;
        let status = handle.kill();
        self.remove_run(name, handle.id());
        Some(status)
    }

    pub fn kill_all(&self) {
        for name in self.names() {
            self.kill_by_name(&name);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use super::*;

    #[test]
    fn handle_finishes_when_sender_dropped() {
        let (handle, done) = RunHandle::new("x");
        assert!(!handle.is_finished());
        assert!(handle.wait_timeout(Duration::from_millis(10)).is_none());

        handle.control().set_status(RunStatus::Success);
        drop(done);
        assert!(handle.is_finished());
        assert_eq!(handle.wait(), RunStatus::Success);
    }

    #[test]
    fn insert_replaces_existing_run() {
        let table = Arc::new(RunningTable::new());
        let (first, first_done) = RunHandle::new("Build: Make");
        table.insert(first.clone());

        // stands in for the worker: finish once cancelled
        let worker_table = Arc::clone(&table);
        let worker_first = first.clone();
        let worker = thread::spawn(move || {
            while !worker_first.control().is_cancelled() {
                thread::sleep(Duration::from_millis(5));
            }
            worker_first.control().set_status(RunStatus::Cancelled);
            worker_table.remove_run(worker_first.name(), worker_first.id());
            drop(first_done);
        });

        let (second, _second_done) = RunHandle::new("Build: Make");
        table.insert(second.clone());
        worker.join().unwrap();

        assert_eq!(table.len(), 1);
        assert_eq!(table.get("Build: Make").unwrap().id(), second.id());
        assert_eq!(first.status(), Some(RunStatus::Cancelled));
    }

    #[test]
    fn remove_run_checks_identity() {
        let table = RunningTable::new();
        let (a, _a_done) = RunHandle::new("x");
        table.insert(a.clone());
        assert!(!table.remove_run("x", Uuid::new_v4()));
        assert!(table.is_running("x"));
        assert!(table.remove_run("x", a.id()));
        assert!(table.is_empty());
    }
}
