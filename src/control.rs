//! Controller attachment for trigger dispatch.
//!
//! A domain controller (WEPP, fork, team, ...) attaches itself to the socket
//! of its channel and receives every in-channel trigger. The slot holds one
//! controller at a time; attaching again replaces the previous one. The
//! slot only keeps a weak reference, so a dropped controller is simply no
//! longer called.
//!
//! Controller failures stay here: an `Err` return or a panic inside a
//! handler is logged and never reaches the socket read loop.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, Weak};

use tracing::{debug, warn};

use crate::error::{StatusError, StatusResult};

/// Error type controllers may return from handlers.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// Data carried with a trigger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriggerPayload {
    /// Whitespace-separated tokens of the trigger line
    pub tokens: Vec<String>,
    /// The trigger line as received
    pub raw: String,
}

/// A controller that handles named lifecycle events.
pub trait EventSink: Send + Sync {
    fn trigger_event(&self, event: &str, payload: &TriggerPayload) -> Result<(), HandlerError>;
}

/// Legacy controllers that only react to a bare event name.
pub trait FormTrigger: Send + Sync {
    fn trigger_form(&self, event: &str) -> Result<(), HandlerError>;
}

/// The capability a controller was attached with.
#[derive(Clone)]
pub enum Attachment {
    Events(Weak<dyn EventSink>),
    Form(Weak<dyn FormTrigger>),
}

impl Attachment {
    /// Attach a controller through its [`EventSink`] capability.
    pub fn events<T: EventSink + 'static>(controller: &Arc<T>) -> Self {
        let sink: Arc<dyn EventSink> = controller.clone();
        Attachment::Events(Arc::downgrade(&sink))
    }

    /// Attach a legacy controller through its [`FormTrigger`] capability.
    pub fn form<T: FormTrigger + 'static>(controller: &Arc<T>) -> Self {
        let trigger: Arc<dyn FormTrigger> = controller.clone();
        Attachment::Form(Arc::downgrade(&trigger))
    }

    /// Whether the attached controller is still alive.
    pub fn is_alive(&self) -> bool {
        match self {
            Attachment::Events(weak) => weak.strong_count() > 0,
            Attachment::Form(weak) => weak.strong_count() > 0,
        }
    }
}

impl std::fmt::Debug for Attachment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Attachment::Events(_) => write!(f, "Attachment::Events(alive={})", self.is_alive()),
            Attachment::Form(_) => write!(f, "Attachment::Form(alive={})", self.is_alive()),
        }
    }
}

/// Result of a dispatch attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The handler ran and returned Ok
    Delivered,
    /// Nothing is attached
    NoController,
    /// The attached controller has been dropped
    ControllerGone,
    /// The handler returned an error or panicked
    HandlerFailed,
}

/// Single-controller slot. Last attach wins.
#[derive(Default)]
pub struct ControlSlot {
    slot: Mutex<Option<Attachment>>,
}

impl ControlSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a controller, returning the one it replaces.
    pub fn attach(&self, attachment: Attachment) -> Option<Attachment> {
        let mut slot = self.slot.lock().unwrap_or_else(|e| e.into_inner());
        slot.replace(attachment)
    }

    /// Remove the attached controller.
    pub fn detach(&self) -> Option<Attachment> {
        let mut slot = self.slot.lock().unwrap_or_else(|e| e.into_inner());
        slot.take()
    }

    pub fn is_attached(&self) -> bool {
        let slot = self.slot.lock().unwrap_or_else(|e| e.into_inner());
        slot.as_ref().map(Attachment::is_alive).unwrap_or(false)
    }

    /// Deliver a trigger, logging a failed handler instead of returning it.
    pub fn dispatch(&self, event: &str, payload: &TriggerPayload) -> DispatchOutcome {
        match self.try_dispatch(event, payload) {
            Ok(outcome) => outcome,
            Err(err) => {
                warn!(event, category = %err.category(), error = %err, "Controller failed handling trigger");
                DispatchOutcome::HandlerFailed
            }
        }
    }

    /// Deliver a trigger to the attached controller.
    ///
    /// A handler `Err` or panic becomes [`StatusError::Dispatch`]. The slot
    /// lock is released before the handler runs, so handlers may re-attach
    /// or detach.
    pub fn try_dispatch(&self, event: &str, payload: &TriggerPayload) -> StatusResult<DispatchOutcome> {
        let attachment = {
            let slot = self.slot.lock().unwrap_or_else(|e| e.into_inner());
            slot.clone()
        };

        let result = match attachment {
            None => {
                debug!(event, "No controller attached, trigger not dispatched");
                return Ok(DispatchOutcome::NoController);
            }
            Some(Attachment::Events(weak)) => match weak.upgrade() {
                Some(sink) => catch_unwind(AssertUnwindSafe(|| sink.trigger_event(event, payload))),
                None => return Ok(DispatchOutcome::ControllerGone),
            },
            Some(Attachment::Form(weak)) => match weak.upgrade() {
                Some(trigger) => catch_unwind(AssertUnwindSafe(|| trigger.trigger_form(event))),
                None => return Ok(DispatchOutcome::ControllerGone),
            },
        };

        let message = match result {
            Ok(Ok(())) => return Ok(DispatchOutcome::Delivered),
            Ok(Err(e)) => e.to_string(),
            Err(panic) => format!("panicked: {}", panic_message(panic.as_ref())),
        };
        Err(StatusError::Dispatch {
            event: event.to_string(),
            message,
        })
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> &str {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s
    } else {
        "unknown panic"
    }
}
