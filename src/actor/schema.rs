//! State graph declaration and construction-time flattening.
//!
//! A machine or monitor type declares its states once through a
//! [`SchemaBuilder`]. `build` validates the declaration and flattens parent
//! chains into one resolved transition table per state:
//! - child bindings override parent bindings for the same event kind;
//! - kinds the child does not bind fall through to the parent's binding.
//!
//! Entry and exit actions are not inherited. All errors here are reported
//! before any execution starts.

use std::any::{Any, TypeId};
use std::collections::BTreeMap;
use std::sync::Arc;

use ahash::AHashMap;

use crate::event::EventKind;

/// Action signatures for one kind of state machine (actor or monitor).
pub trait Host: 'static {
    type Entry: Copy + Send + Sync + 'static;
    type Exit: Copy + Send + Sync + 'static;
    type Action: Copy + Send + Sync + 'static;

    /// Monitors have no state stack (no push/pop/defer) and may carry
    /// temperatures.
    const IS_MONITOR: bool;
}

/// Liveness tag of a monitor state.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Temperature {
    /// The property is not yet satisfied.
    Hot,
    /// The property is satisfied.
    Cold,
    #[default]
    Neutral,
}

/// Index of a state inside its schema.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StateIndex(usize);

impl StateIndex {
    #[inline(always)]
    pub fn index(self) -> usize {
        self.0
    }
}

#[derive(Clone, Copy, Debug)]
enum Binding<A> {
    Do(A),
    Goto(&'static str),
    Push(&'static str),
    Ignore,
    Defer,
}

/// Resolved transition for one event kind.
#[derive(Clone, Copy, Debug)]
pub enum Transition<A> {
    Do(A),
    Goto(StateIndex),
    Push(StateIndex),
    Ignore,
    Defer,
}

/// Construction-time declaration errors.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum SchemaError {
    #[error("{machine}: no start state declared")]
    MissingStart { machine: &'static str },
    #[error("{machine}: multiple start states (`{first}` and `{second}`)")]
    DuplicateStart {
        machine: &'static str,
        first: &'static str,
        second: &'static str,
    },
    #[error("{machine}: state `{state}` declared twice")]
    DuplicateState {
        machine: &'static str,
        state: &'static str,
    },
    #[error("{machine}: state `{state}` binds `{event}` more than once")]
    DuplicateBinding {
        machine: &'static str,
        state: &'static str,
        event: &'static str,
    },
    #[error("{machine}: state `{state}` references unknown state `{target}`")]
    UnknownState {
        machine: &'static str,
        state: &'static str,
        target: &'static str,
    },
    #[error("{machine}: state `{state}` binds unknown event `{event}`")]
    UnknownEvent {
        machine: &'static str,
        state: &'static str,
        event: &'static str,
    },
    #[error("{machine}: inheritance cycle through state `{state}`")]
    InheritanceCycle {
        machine: &'static str,
        state: &'static str,
    },
    #[error("{machine}: state `{state}` uses {what}, which this machine kind does not support")]
    Unsupported {
        machine: &'static str,
        state: &'static str,
        what: &'static str,
    },
    #[error("{machine}: state `{state}` is declared both hot and cold")]
    ConflictingTemperature {
        machine: &'static str,
        state: &'static str,
    },
}

struct StateDecl<H: Host> {
    name: &'static str,
    start: bool,
    parent: Option<&'static str>,
    entry: Option<H::Entry>,
    exit: Option<H::Exit>,
    bindings: Vec<(EventKind, Binding<H::Action>)>,
    temperature: Option<Temperature>,
    temperature_conflict: bool,
}

/// Collects state declarations for one machine type.
pub struct SchemaBuilder<H: Host> {
    machine: &'static str,
    kinds: &'static [EventKind],
    states: Vec<StateDecl<H>>,
}

/// Chained configuration of a single state.
pub struct StateBuilder<'a, H: Host> {
    decl: &'a mut StateDecl<H>,
}

impl<H: Host> SchemaBuilder<H> {
    pub(crate) fn new(machine: &'static str, kinds: &'static [EventKind]) -> Self {
        Self {
            machine,
            kinds,
            states: Vec::new(),
        }
    }

    /// Declare a state.
    pub fn state(&mut self, name: &'static str) -> StateBuilder<'_, H> {
        let slot = self.states.len();
        self.states.push(StateDecl {
            name,
            start: false,
            parent: None,
            entry: None,
            exit: None,
            bindings: Vec::new(),
            temperature: None,
            temperature_conflict: false,
        });
        StateBuilder {
            decl: &mut self.states[slot],
        }
    }

    /// Declare the start state.
    pub fn start_state(&mut self, name: &'static str) -> StateBuilder<'_, H> {
        self.state(name).start()
    }

    /// Validate and flatten the declaration.
    pub fn build(self) -> Result<Schema<H>, SchemaError> {
        let machine = self.machine;
        let mut index = BTreeMap::new();
        for (i, decl) in self.states.iter().enumerate() {
            if index.insert(decl.name, StateIndex(i)).is_some() {
                return Err(SchemaError::DuplicateState {
                    machine,
                    state: decl.name,
                });
            }
        }

        let mut start: Option<StateIndex> = None;
        for (i, decl) in self.states.iter().enumerate() {
            if !decl.start {
                continue;
            }
            if let Some(first) = start {
                return Err(SchemaError::DuplicateStart {
                    machine,
                    first: self.states[first.0].name,
                    second: decl.name,
                });
            }
            start = Some(StateIndex(i));
        }
        let start = start.ok_or(SchemaError::MissingStart { machine })?;

        for decl in &self.states {
            self.check_decl(decl, &index)?;
        }

        let mut states = Vec::with_capacity(self.states.len());
        for i in 0..self.states.len() {
            let chain = self.parent_chain(i, &index)?;
            let mut table = BTreeMap::new();
            // Root ancestor first so nearer states override.
            for &ancestor in chain.iter().rev() {
                for (kind, binding) in &self.states[ancestor].bindings {
                    table.insert(*kind, resolve_binding(*binding, &index));
                }
            }
            let decl = &self.states[i];
            states.push(ResolvedState {
                name: decl.name,
                entry: decl.entry,
                exit: decl.exit,
                table,
                temperature: decl.temperature.unwrap_or_default(),
            });
        }

        Ok(Schema {
            machine,
            states,
            index,
            start,
        })
    }

    fn check_decl(
        &self,
        decl: &StateDecl<H>,
        index: &BTreeMap<&'static str, StateIndex>,
    ) -> Result<(), SchemaError> {
        let machine = self.machine;
        let state = decl.name;

        if decl.temperature_conflict {
            return Err(SchemaError::ConflictingTemperature { machine, state });
        }
        if !H::IS_MONITOR && decl.temperature.is_some() {
            return Err(SchemaError::Unsupported {
                machine,
                state,
                what: "a temperature",
            });
        }
        if let Some(parent) = decl.parent {
            if !index.contains_key(parent) {
                return Err(SchemaError::UnknownState {
                    machine,
                    state,
                    target: parent,
                });
            }
        }

        let mut seen: Vec<EventKind> = Vec::with_capacity(decl.bindings.len());
        for (kind, binding) in &decl.bindings {
            if !self.kinds.contains(kind) {
                return Err(SchemaError::UnknownEvent {
                    machine,
                    state,
                    event: kind.name(),
                });
            }
            if seen.contains(kind) {
                return Err(SchemaError::DuplicateBinding {
                    machine,
                    state,
                    event: kind.name(),
                });
            }
            seen.push(*kind);

            match *binding {
                Binding::Goto(target) | Binding::Push(target) if !index.contains_key(target) => {
                    return Err(SchemaError::UnknownState {
                        machine,
                        state,
                        target,
                    });
                }
                Binding::Push(_) if H::IS_MONITOR => {
                    return Err(SchemaError::Unsupported {
                        machine,
                        state,
                        what: "push transitions",
                    });
                }
                Binding::Defer if H::IS_MONITOR => {
                    return Err(SchemaError::Unsupported {
                        machine,
                        state,
                        what: "deferred events",
                    });
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// `[state, parent, grandparent, ...]`.
    fn parent_chain(
        &self,
        start: usize,
        index: &BTreeMap<&'static str, StateIndex>,
    ) -> Result<Vec<usize>, SchemaError> {
        let mut chain = vec![start];
        let mut cur = start;
        while let Some(parent) = self.states[cur].parent {
            let next = index[parent].0;
            if chain.contains(&next) {
                return Err(SchemaError::InheritanceCycle {
                    machine: self.machine,
                    state: self.states[start].name,
                });
            }
            chain.push(next);
            cur = next;
        }
        Ok(chain)
    }
}

fn resolve_binding<A: Copy>(
    binding: Binding<A>,
    index: &BTreeMap<&'static str, StateIndex>,
) -> Transition<A> {
    match binding {
        Binding::Do(action) => Transition::Do(action),
        Binding::Goto(target) => Transition::Goto(index[target]),
        Binding::Push(target) => Transition::Push(index[target]),
        Binding::Ignore => Transition::Ignore,
        Binding::Defer => Transition::Defer,
    }
}

impl<'a, H: Host> StateBuilder<'a, H> {
    /// Mark this state as the start state.
    pub fn start(self) -> Self {
        self.decl.start = true;
        self
    }

    /// Inherit bindings from `parent`.
    pub fn parent(self, parent: &'static str) -> Self {
        self.decl.parent = Some(parent);
        self
    }

    pub fn on_entry(self, action: H::Entry) -> Self {
        self.decl.entry = Some(action);
        self
    }

    pub fn on_exit(self, action: H::Exit) -> Self {
        self.decl.exit = Some(action);
        self
    }

    /// Run `action` when `kind` is delivered.
    pub fn on_event(self, kind: EventKind, action: H::Action) -> Self {
        self.bind(kind, Binding::Do(action))
    }

    /// Replace the current state with `target` when `kind` is delivered.
    pub fn on_goto(self, kind: EventKind, target: &'static str) -> Self {
        self.bind(kind, Binding::Goto(target))
    }

    /// Push `target` onto the state stack when `kind` is delivered.
    pub fn on_push(self, kind: EventKind, target: &'static str) -> Self {
        self.bind(kind, Binding::Push(target))
    }

    pub fn ignore(self, kind: EventKind) -> Self {
        self.bind(kind, Binding::Ignore)
    }

    pub fn defer(self, kind: EventKind) -> Self {
        self.bind(kind, Binding::Defer)
    }

    /// Tag as a hot (liveness not yet satisfied) monitor state.
    pub fn hot(self) -> Self {
        self.temperature(Temperature::Hot)
    }

    /// Tag as a cold (liveness satisfied) monitor state.
    pub fn cold(self) -> Self {
        self.temperature(Temperature::Cold)
    }

    fn temperature(self, t: Temperature) -> Self {
        if matches!(self.decl.temperature, Some(prev) if prev != t) {
            self.decl.temperature_conflict = true;
        }
        self.decl.temperature = Some(t);
        self
    }

    fn bind(self, kind: EventKind, binding: Binding<H::Action>) -> Self {
        self.decl.bindings.push((kind, binding));
        self
    }
}

/// One flattened state.
pub struct ResolvedState<H: Host> {
    pub name: &'static str,
    pub entry: Option<H::Entry>,
    pub exit: Option<H::Exit>,
    pub table: BTreeMap<EventKind, Transition<H::Action>>,
    pub temperature: Temperature,
}

/// Validated, flattened state graph of one machine type.
pub struct Schema<H: Host> {
    machine: &'static str,
    states: Vec<ResolvedState<H>>,
    index: BTreeMap<&'static str, StateIndex>,
    start: StateIndex,
}

impl<H: Host> Schema<H> {
    pub fn machine(&self) -> &'static str {
        self.machine
    }

    pub fn start(&self) -> StateIndex {
        self.start
    }

    pub fn state(&self, idx: StateIndex) -> &ResolvedState<H> {
        &self.states[idx.0]
    }

    pub fn lookup(&self, name: &str) -> Option<StateIndex> {
        self.index.get(name).copied()
    }

    pub fn transition(&self, idx: StateIndex, kind: EventKind) -> Option<Transition<H::Action>> {
        self.states[idx.0].table.get(&kind).copied()
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}

/// Schemas built once per machine type and shared across iterations.
#[derive(Default)]
pub(crate) struct SchemaCache {
    schemas: AHashMap<TypeId, Arc<dyn Any + Send + Sync>>,
}

impl SchemaCache {
    pub(crate) fn get_or_build<H: Host>(
        &mut self,
        build: impl FnOnce() -> Result<Schema<H>, SchemaError>,
    ) -> Result<Arc<Schema<H>>, SchemaError> {
        let key = TypeId::of::<H>();
        if let Some(cached) = self.schemas.get(&key) {
            if let Ok(schema) = Arc::clone(cached).downcast::<Schema<H>>() {
                return Ok(schema);
            }
        }
        let schema = Arc::new(build()?);
        self.schemas.insert(key, schema.clone());
        Ok(schema)
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.schemas.len()
    }
}
