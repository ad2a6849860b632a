/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The dispatcher thread serializing every mutation of the manager's state.
//!
//! Caller-initiated methods lock the manager core directly for their duration. Everything
//! asynchronous funnels through one mpsc queue drained by the dispatcher thread, one message at a
//! time:
//!
//! - [`SyncerMessage::Engine`]: a transition completion event. The dispatcher re-acquires the core
//!   lock and routes the event to its task, so no engine callback ever interleaves with another
//!   mutation.
//! - [`SyncerMessage::Run`]: deferred work, run **without** the lock. User callbacks are delivered
//!   this way so they may freely call back into the manager.
//!
//! Queue order is FIFO per sender. Work running on the dispatcher must not call a blocking manager
//! method, since the next queued message cannot start until it returns.

use std::sync::mpsc::{Receiver, Sender};
use std::sync::{Mutex, Weak};
use std::thread::{self, JoinHandle};

use crate::engine::{EngineEvent, Observer, TaskId};
use crate::events::Event;
use crate::manager::task;
use crate::manager::ManagerCore;

pub(crate) enum SyncerMessage {
    Engine(EngineEvent),
    Run(Box<dyn FnOnce() + Send>),
    Shutdown,
}

/// A cheap handle for scheduling work onto the dispatcher.
#[derive(Clone)]
pub(crate) struct Syncer {
    tx: Sender<SyncerMessage>,
}

impl Syncer {
    pub(crate) fn new(tx: Sender<SyncerMessage>) -> Syncer {
        Syncer { tx }
    }

    /// Schedule `f` to run on the dispatcher without the core lock.
    pub(crate) fn call_later(&self, f: impl FnOnce() + Send + 'static) {
        let _ = self.tx.send(SyncerMessage::Run(Box::new(f)));
    }

    /// An [Observer] that routes a transition's completion events to `task` through this syncer.
    pub(crate) fn observer(&self, task: TaskId) -> Observer {
        Observer::task(task, self.tx.clone())
    }

    pub(crate) fn shutdown(&self) {
        let _ = self.tx.send(SyncerMessage::Shutdown);
    }
}

/// Starts the dispatcher thread. It holds only a weak reference to the core, so an abandoned
/// manager shuts its dispatcher down even if the shutdown message was never sent.
pub(crate) fn start_dispatcher(
    core: Weak<Mutex<ManagerCore>>,
    syncer: Syncer,
    receiver: Receiver<SyncerMessage>,
    event_publisher: Option<Sender<Event>>,
) -> JoinHandle<()> {
    thread::spawn(move || loop {
        match receiver.recv() {
            Ok(SyncerMessage::Engine(event)) => {
                let Some(core) = core.upgrade() else { return };
                let mut core = core.lock().unwrap();
                task::handle_engine_event(&mut core, &syncer, &event_publisher, event);
            }
            Ok(SyncerMessage::Run(f)) => f(),
            Ok(SyncerMessage::Shutdown) | Err(_) => return,
        }
    })
}
