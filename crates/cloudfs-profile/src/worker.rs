//! Background workers and the startup barrier.
//!
//! Workers are started in list order, then the ones flagged must-join are
//! joined in list order. Only after that barrier does the filesystem get
//! mounted, so must-join work always finishes before the first callback.
//! Detached workers keep running alongside the session and are stopped
//! through their [`ShutdownSignal`] when it ends.

use crate::error::{ProfileError, Result};
use crate::logging::SessionLog;
use parking_lot::{Condvar, Mutex};
use std::any::Any;
use std::error::Error;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Outcome of a worker's task.
pub type WorkerResult = std::result::Result<(), Box<dyn Error + Send + Sync>>;

type Task = Box<dyn FnOnce(WorkerContext) -> WorkerResult + Send>;

/// A unit of background work paired with its must-join flag.
pub struct Worker {
    name: String,
    must_join: bool,
    task: Task,
}

impl Worker {
    /// A worker that must complete before the filesystem is mounted.
    pub fn joined<F>(name: impl Into<String>, task: F) -> Self
    where
        F: FnOnce(WorkerContext) -> WorkerResult + Send + 'static,
    {
        Self {
            name: name.into(),
            must_join: true,
            task: Box::new(task),
        }
    }

    /// A worker that keeps running alongside the mounted session.
    pub fn detached<F>(name: impl Into<String>, task: F) -> Self
    where
        F: FnOnce(WorkerContext) -> WorkerResult + Send + 'static,
    {
        Self {
            name: name.into(),
            must_join: false,
            task: Box::new(task),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn must_join(&self) -> bool {
        self.must_join
    }
}

impl std::fmt::Debug for Worker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Worker")
            .field("name", &self.name)
            .field("must_join", &self.must_join)
            .finish_non_exhaustive()
    }
}

/// One-shot shutdown flag shared by a session and its workers.
#[derive(Debug, Clone, Default)]
pub struct ShutdownSignal {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request shutdown and wake every waiter.
    pub fn trigger(&self) {
        let (flag, condvar) = &*self.inner;
        *flag.lock() = true;
        condvar.notify_all();
    }

    pub fn is_triggered(&self) -> bool {
        *self.inner.0.lock()
    }

    /// Sleep up to `timeout`, returning early on shutdown.
    ///
    /// Returns `true` once shutdown has been requested.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let (flag, condvar) = &*self.inner;
        let mut triggered = flag.lock();
        let Some(deadline) = Instant::now().checked_add(timeout) else {
            while !*triggered {
                condvar.wait(&mut triggered);
            }
            return true;
        };
        while !*triggered {
            if condvar.wait_until(&mut triggered, deadline).timed_out() {
                break;
            }
        }
        *triggered
    }
}

/// What a running worker gets to see.
#[derive(Debug, Clone)]
pub struct WorkerContext {
    name: String,
    shutdown: ShutdownSignal,
    log: SessionLog,
}

impl WorkerContext {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn log(&self) -> &SessionLog {
        &self.log
    }

    pub fn shutdown(&self) -> &ShutdownSignal {
        &self.shutdown
    }

    /// Whether the session has asked workers to stop.
    pub fn should_stop(&self) -> bool {
        self.shutdown.is_triggered()
    }
}

/// Counts workers that have begun running.
#[derive(Default)]
struct StartLatch {
    started: Mutex<usize>,
    condvar: Condvar,
}

impl StartLatch {
    fn arrive(&self) {
        *self.started.lock() += 1;
        self.condvar.notify_all();
    }

    fn wait_for(&self, count: usize) {
        let mut started = self.started.lock();
        while *started < count {
            self.condvar.wait(&mut started);
        }
    }
}

struct Spawned {
    name: String,
    must_join: bool,
    handle: JoinHandle<WorkerResult>,
}

/// Detached workers still running after the barrier.
#[derive(Debug)]
pub struct RunningWorkers {
    shutdown: ShutdownSignal,
    detached: Vec<(String, JoinHandle<WorkerResult>)>,
}

impl RunningWorkers {
    /// Signal shared with the detached workers.
    pub fn signal(&self) -> &ShutdownSignal {
        &self.shutdown
    }

    /// Number of detached workers.
    pub fn len(&self) -> usize {
        self.detached.len()
    }

    pub fn is_empty(&self) -> bool {
        self.detached.is_empty()
    }

    /// Ask detached workers to stop and wait for them.
    ///
    /// Worker failures at this point are logged, not returned.
    pub fn shutdown(self, log: &SessionLog) {
        self.shutdown.trigger();
        for (name, handle) in self.detached {
            match join(handle) {
                Ok(()) => log.debug(format!("Worker '{}' stopped", name)),
                Err(e) => log.warn(format!("Worker '{}' {}", name, e)),
            }
        }
    }
}

/// Start every worker, then wait for the must-join ones.
///
/// Each worker has begun running by the time this returns. If a must-join
/// worker fails or panics, the remaining workers are signalled to stop and
/// joined before the error is returned.
pub fn start_workers(workers: Vec<Worker>, log: &SessionLog) -> Result<RunningWorkers> {
    let shutdown = ShutdownSignal::new();
    let latch = Arc::new(StartLatch::default());
    let mut spawned = Vec::with_capacity(workers.len());

    for worker in workers {
        let Worker {
            name,
            must_join,
            task,
        } = worker;
        let ctx = WorkerContext {
            name: name.clone(),
            shutdown: shutdown.clone(),
            log: log.clone(),
        };
        let latch = Arc::clone(&latch);

        log.debug(format!("Starting worker '{}' (must_join={})", name, must_join));
        let handle = thread::Builder::new()
            .name(format!("worker-{}", name))
            .spawn(move || {
                latch.arrive();
                task(ctx)
            });

        match handle {
            Ok(handle) => spawned.push(Spawned {
                name,
                must_join,
                handle,
            }),
            Err(e) => {
                let err = format!("Failed to start worker '{}': {}", name, e);
                abort(spawned, &shutdown, log);
                return Err(ProfileError::Starting(err));
            }
        }
    }

    latch.wait_for(spawned.len());

    let mut detached = Vec::new();
    let mut pending = spawned.into_iter();
    while let Some(worker) = pending.next() {
        if !worker.must_join {
            detached.push((worker.name, worker.handle));
            continue;
        }
        log.debug(format!("Waiting for worker '{}'", worker.name));
        if let Err(e) = join(worker.handle) {
            let err = format!("Worker '{}' {}", worker.name, e);
            let rest = detached
                .into_iter()
                .map(|(name, handle)| Spawned {
                    name,
                    must_join: false,
                    handle,
                })
                .chain(pending)
                .collect();
            abort(rest, &shutdown, log);
            return Err(ProfileError::Starting(err));
        }
    }

    Ok(RunningWorkers { shutdown, detached })
}

fn abort(spawned: Vec<Spawned>, shutdown: &ShutdownSignal, log: &SessionLog) {
    shutdown.trigger();
    for worker in spawned {
        if let Err(e) = join(worker.handle) {
            log.warn(format!("Worker '{}' {}", worker.name, e));
        }
    }
}

fn join(handle: JoinHandle<WorkerResult>) -> std::result::Result<(), String> {
    match handle.join() {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(format!("failed: {}", e)),
        Err(payload) => Err(format!("panicked: {}", panic_message(payload.as_ref()))),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "unknown panic"
    }
}
