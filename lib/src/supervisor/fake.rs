//! An in-memory [`Launcher`] that records every signal and tracks how many of
//! its processes are alive, for testing the supervisor and its callers
//! without touching real renderers.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use super::{Launcher, RendererProcess};
use crate::command::RendererInvocation;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Behavior {
    /// Exits as soon as it receives SIGTERM.
    ExitOnTerminate,
    /// Only SIGKILL gets rid of it.
    IgnoreTerminate,
    /// Exits right after being spawned.
    ExitImmediately,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FakeEvent {
    Spawned(u32),
    Terminated(u32),
    Killed(u32),
    Exited(u32),
}

#[derive(Default)]
struct Record {
    events: Vec<FakeEvent>,
    invocations: Vec<RendererInvocation>,
    alive: usize,
    max_alive: usize,
    next_id: u32,
}

#[derive(Clone)]
pub struct FakeLauncher {
    behavior: Behavior,
    record: Arc<Mutex<Record>>,
    fail_next: Arc<AtomicBool>,
}

impl FakeLauncher {
    pub fn new(behavior: Behavior) -> Self {
        Self {
            behavior,
            record: Arc::default(),
            fail_next: Arc::default(),
        }
    }

    /// Makes the next `launch` fail as if the binary were missing.
    pub fn fail_next_launch(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }

    pub fn events(&self) -> Vec<FakeEvent> {
        lock(&self.record).events.clone()
    }

    /// Every invocation launched so far, oldest first.
    pub fn invocations(&self) -> Vec<RendererInvocation> {
        lock(&self.record).invocations.clone()
    }

    pub fn alive(&self) -> usize {
        lock(&self.record).alive
    }

    /// The largest number of processes that were ever alive at once.
    pub fn max_alive(&self) -> usize {
        lock(&self.record).max_alive
    }
}

impl Launcher for FakeLauncher {
    fn launch(&self, invocation: &RendererInvocation) -> io::Result<Box<dyn RendererProcess>> {
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                "no such renderer binary",
            ));
        }

        let mut record = lock(&self.record);
        record.next_id += 1;
        let id = record.next_id;
        record.events.push(FakeEvent::Spawned(id));
        record.invocations.push(invocation.clone());

        let exited = self.behavior == Behavior::ExitImmediately;
        if exited {
            record.events.push(FakeEvent::Exited(id));
        } else {
            record.alive += 1;
            record.max_alive = record.max_alive.max(record.alive);
        }

        Ok(Box::new(FakeProcess {
            id,
            behavior: self.behavior,
            record: self.record.clone(),
            exit_requested: exited,
            exited,
        }))
    }
}

struct FakeProcess {
    id: u32,
    behavior: Behavior,
    record: Arc<Mutex<Record>>,
    exit_requested: bool,
    exited: bool,
}

impl FakeProcess {
    fn mark_exited(&mut self) {
        if self.exited {
            return;
        }
        self.exited = true;
        let mut record = lock(&self.record);
        record.alive -= 1;
        record.events.push(FakeEvent::Exited(self.id));
    }
}

#[async_trait]
impl RendererProcess for FakeProcess {
    fn id(&self) -> Option<u32> {
        Some(self.id)
    }

    fn terminate(&mut self) -> io::Result<()> {
        lock(&self.record).events.push(FakeEvent::Terminated(self.id));
        if self.behavior != Behavior::IgnoreTerminate {
            self.exit_requested = true;
        }
        Ok(())
    }

    fn kill(&mut self) -> io::Result<()> {
        lock(&self.record).events.push(FakeEvent::Killed(self.id));
        self.exit_requested = true;
        Ok(())
    }

    fn try_wait(&mut self) -> io::Result<bool> {
        Ok(self.exited)
    }

    async fn wait(&mut self) -> io::Result<()> {
        if !self.exit_requested {
            std::future::pending::<()>().await;
        }
        self.mark_exited();
        Ok(())
    }
}

impl Drop for FakeProcess {
    // mirrors kill_on_drop on the real launcher
    fn drop(&mut self) {
        self.mark_exited();
    }
}

fn lock(record: &Mutex<Record>) -> MutexGuard<'_, Record> {
    record.lock().unwrap_or_else(PoisonError::into_inner)
}
