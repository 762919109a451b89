//! Event payloads, message envelopes, and actor identity.
//!
//! Events are plain user values. Each program declares a closed enum of event
//! kinds via [`Event::KINDS`]; state tables are keyed by [`EventKind`] so the
//! dispatch table is built once per machine type.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::runtime::operation::{OperationGroup, OperationId};

/// Runtime type tag of an event.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EventKind(&'static str);

impl EventKind {
    /// Reserved kind of the built-in halt message.
    pub const HALT: EventKind = EventKind("Halt");

    pub const fn new(name: &'static str) -> Self {
        Self(name)
    }

    #[inline(always)]
    pub const fn name(self) -> &'static str {
        self.0
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

/// An immutable event payload.
///
/// `KINDS` must list every kind `kind()` can return. Schemas that bind a kind
/// outside this set are rejected at construction.
pub trait Event: Clone + fmt::Debug + 'static {
    const KINDS: &'static [EventKind];

    fn kind(&self) -> EventKind;
}

/// Anything that can sit in a mailbox: a user event or the built-in halt.
#[derive(Clone, Debug)]
pub enum Message<E> {
    Event(E),
    Halt,
}

impl<E: Event> Message<E> {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::Event(ev) => ev.kind(),
            Self::Halt => EventKind::HALT,
        }
    }
}

/// A message in flight, tagged with its sender and causal group.
#[derive(Clone, Debug)]
pub struct Envelope<E> {
    pub message: Message<E>,
    pub sender: OperationId,
    pub group: OperationGroup,
}

impl<E: Event> Envelope<E> {
    pub fn new(message: Message<E>, sender: OperationId, group: OperationGroup) -> Self {
        Self {
            message,
            sender,
            group,
        }
    }

    #[inline(always)]
    pub fn kind(&self) -> EventKind {
        self.message.kind()
    }
}

/// Opaque identifier of an actor instance.
///
/// `value` is unique within one iteration and allocated in creation order, so
/// the same schedule always produces the same ids.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ActorId {
    value: u64,
    type_name: String,
    name: Option<String>,
}

impl ActorId {
    pub(crate) fn new(value: u64, type_name: &str, name: Option<String>) -> Self {
        Self {
            value,
            type_name: type_name.to_string(),
            name,
        }
    }

    /// Generation counter assigned at allocation.
    #[inline(always)]
    pub fn value(&self) -> u64 {
        self.value
    }

    /// Declared machine type name.
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Optional user-supplied name.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }
}

impl fmt::Display for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) => write!(f, "{}({}:{})", self.type_name, name, self.value),
            None => write!(f, "{}({})", self.type_name, self.value),
        }
    }
}

/// Last path segment of a Rust type name, used for display names.
pub(crate) fn short_type_name<T: ?Sized>() -> &'static str {
    let full = std::any::type_name::<T>();
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}
