/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Thread that receives events emitted by the manager and passes them to event handlers.
//!
//! When the thread receives a message containing an [event](crate::events::Event), it triggers the
//! execution of all handlers defined for the contained event type, where the handlers for each
//! event type are stored in [`EventHandlers`].
//!
//! When no handlers are present in a manager's instance of `EventHandlers` this thread is not
//! started.
//!
//! ## Event Handlers
//!
//! A manager's instance of `EventHandlers` contains:
//! 1. The handlers provided to [`BlockManager::new`](crate::manager::BlockManager::new), and
//! 2. If logging is enabled via the manager's [config](crate::config::BlockManagerConfig), the
//!    default logging handlers defined in [logging](crate::logging).

use std::{
    sync::mpsc::{Receiver, RecvTimeoutError, TryRecvError},
    thread,
    thread::JoinHandle,
    time::Duration,
};

use crate::{events::*, logging::Logger};

/// Pointer to a handler closure, parametrised by the argument (for our use case, event) type.
pub type HandlerPtr<T> = Box<dyn Fn(&T) + Send>;

/// Stores the two optional handlers enabled for an event type that implements the [`Logger`] trait,
/// namely one logging handler, defined in [`logging`](crate::logging), and one user-defined
/// handler, passed to [`BlockManager::new`](crate::manager::BlockManager::new).
pub(crate) struct HandlerPair<T: Logger> {
    pub(crate) user_defined_handler: Option<HandlerPtr<T>>,
    pub(crate) logging_handler: Option<HandlerPtr<T>>,
}

impl<T: Logger> HandlerPair<T> {
    // Checks if no event handlers are defined for this event.
    pub(crate) fn is_empty(&self) -> bool {
        self.user_defined_handler.is_none() && self.logging_handler.is_none()
    }

    /// Creates a new `HandlerPair` with the user-defined handler, and the default logging handler
    /// if logging is enabled.
    pub(crate) fn new(log: bool, user_defined_handler: Option<HandlerPtr<T>>) -> HandlerPair<T> {
        HandlerPair {
            user_defined_handler,
            logging_handler: if log { Some(T::get_logger()) } else { None },
        }
    }

    fn fire(&self, event: &T) {
        self.user_defined_handler
            .iter()
            .for_each(|handler| handler(event));
        self.logging_handler
            .iter()
            .for_each(|handler| handler(event));
    }
}

/// Stores the `HandlerPair` of user-defined and optional logging handlers for each pre-defined
/// event type from [events](crate::events).
pub(crate) struct EventHandlers {
    pub(crate) insert_block_handlers: HandlerPair<InsertBlockEvent>,
    pub(crate) finalize_block_handlers: HandlerPair<FinalizeBlockEvent>,
    pub(crate) prune_block_handlers: HandlerPair<PruneBlockEvent>,
}

impl EventHandlers {
    /// Creates the [handler pairs](HandlerPair) for all pre-defined event types from
    /// [events](crate::events) given the user-defined handlers, and information on whether logging
    /// is enabled.
    pub(crate) fn new(
        log: bool,
        insert_block_handler: Option<HandlerPtr<InsertBlockEvent>>,
        finalize_block_handler: Option<HandlerPtr<FinalizeBlockEvent>>,
        prune_block_handler: Option<HandlerPtr<PruneBlockEvent>>,
    ) -> EventHandlers {
        EventHandlers {
            insert_block_handlers: HandlerPair::new(log, insert_block_handler),
            finalize_block_handlers: HandlerPair::new(log, finalize_block_handler),
            prune_block_handlers: HandlerPair::new(log, prune_block_handler),
        }
    }

    /// Checks if no handlers are defined, i.e., neither user-defined handlers were defined nor
    /// logging is enabled.
    pub(crate) fn is_empty(&self) -> bool {
        self.insert_block_handlers.is_empty()
            && self.finalize_block_handlers.is_empty()
            && self.prune_block_handlers.is_empty()
    }

    /// Triggers the execution of each of the two handlers - the user-defined and the logging
    /// handler, if defined - for a given event type from [events](crate::events).
    pub(crate) fn fire_handlers(&self, event: Event) {
        match event {
            Event::InsertBlock(insert_block_event) => {
                self.insert_block_handlers.fire(&insert_block_event)
            }
            Event::FinalizeBlock(finalize_block_event) => {
                self.finalize_block_handlers.fire(&finalize_block_event)
            }
            Event::PruneBlock(prune_block_event) => {
                self.prune_block_handlers.fire(&prune_block_event)
            }
        }
    }
}

impl Default for EventHandlers {
    fn default() -> Self {
        EventHandlers::new(false, None, None, None)
    }
}

/// Starts the event bus thread, which runs until a shutdown signal is received from the parent
/// thread. In each iteration of the loop, the thread checks if it received any event
/// notifications, and if so, then triggers the execution of the handlers defined for the event.
pub(crate) fn start_event_bus(
    event_handlers: EventHandlers,
    event_subscriber: Receiver<Event>,
    shutdown_signal: Receiver<()>,
) -> JoinHandle<()> {
    thread::spawn(move || loop {
        match shutdown_signal.try_recv() {
            Ok(()) => return,
            Err(TryRecvError::Empty) => (),
            Err(TryRecvError::Disconnected) => {
                panic!("event_bus thread disconnected from main thread")
            }
        }

        match event_subscriber.recv_timeout(Duration::from_millis(10)) {
            Ok(event) => event_handlers.fire_handlers(event),
            Err(RecvTimeoutError::Timeout) => (),
            // The publisher is gone; nothing more will arrive.
            Err(RecvTimeoutError::Disconnected) => return,
        }
    })
}
