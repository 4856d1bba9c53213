//! Machine instances and the registry that owns them.
//!
//! A [`Machine`] bundles a `&'static` state table, the index of the current
//! state, the user context and the machine's timers.  Machines with
//! different context types share one registry through the object-safe
//! [`Dispatch`] trait; the payload type `P` is common to the whole engine.

use core::any::Any;

use log::info;

use super::queue::EventQueue;
use super::timers::MachineTimers;
use super::{EventId, MachineHandle, StateDescriptor, StateId};
use crate::app::ports::Clock;
use crate::config::{MAX_MACHINES, MAX_STATES};
use crate::error::{EngineFault, raise};

// ---------------------------------------------------------------------------
// Machine instance
// ---------------------------------------------------------------------------

/// One running state machine.
pub struct Machine<C: 'static, P: 'static> {
    pub(super) name: &'static str,
    pub(super) table: &'static [StateDescriptor<C, P>],
    /// Index into `table` of the current state.
    pub(super) current: usize,
    pub(super) data: C,
    pub(super) timers: MachineTimers,
}

impl<C: 'static, P: 'static> Machine<C, P> {
    /// Validate the table and build an instance parked in `initial`.
    ///
    /// Raises an [`EngineFault`] for an empty or oversized table, duplicate
    /// ids, or an initial state missing from the table.
    pub fn new(
        name: &'static str,
        table: &'static [StateDescriptor<C, P>],
        initial: StateId,
        data: C,
    ) -> Self {
        if table.is_empty() {
            raise(EngineFault::EmptyStateTable { machine: name });
        }
        if table.len() > MAX_STATES {
            raise(EngineFault::StateTableTooLarge {
                machine: name,
                len: table.len(),
            });
        }
        for (i, row) in table.iter().enumerate() {
            if table[..i].iter().any(|prev| prev.id == row.id) {
                raise(EngineFault::DuplicateState {
                    machine: name,
                    state: row.id,
                });
            }
        }
        let Some(current) = table.iter().position(|s| s.id == initial) else {
            raise(EngineFault::UnknownInitialState {
                machine: name,
                state: initial,
            });
        };

        Self {
            name,
            table,
            current,
            data,
            timers: MachineTimers::new(),
        }
    }

    /// Table index of `id`, if present.
    pub(super) fn index_of(&self, id: StateId) -> Option<usize> {
        self.table.iter().position(|s| s.id == id)
    }
}

/// Result of delivering one event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Stayed,
    Transitioned { from: StateId, to: StateId },
}

/// Type-erased view of a [`Machine`] used by the dispatcher.
pub trait Dispatch<P> {
    fn name(&self) -> &'static str;
    fn current_state(&self) -> StateId;
    fn state_name(&self) -> &'static str;
    fn timers(&self) -> &MachineTimers;
    fn timers_mut(&mut self) -> &mut MachineTimers;

    /// Run the current state's handler and, if it asks for one, the full
    /// transition protocol.
    fn deliver(
        &mut self,
        handle: MachineHandle,
        event: EventId,
        payload: Option<P>,
        queue: &EventQueue<P>,
        clock: &dyn Clock,
    ) -> Delivery;

    fn data(&self) -> &dyn Any;
    fn data_mut(&mut self) -> &mut dyn Any;
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Boxed machines live for as long as the registry keeps them.
pub type DynMachine<P> = dyn Dispatch<P> + 'static;

struct Slot<P> {
    generation: u16,
    machine: Option<Box<DynMachine<P>>>,
}

/// Fixed-capacity set of machine instances.
pub struct Registry<P> {
    slots: [Slot<P>; MAX_MACHINES],
}

impl<P> Default for Registry<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P> Registry<P> {
    pub fn new() -> Self {
        Self {
            slots: core::array::from_fn(|_| Slot {
                generation: 0,
                machine: None,
            }),
        }
    }

    /// Store a machine in the first free slot.
    ///
    /// Raises [`EngineFault::MachineTableFull`] when no slot is free.
    pub fn insert(&mut self, machine: Box<DynMachine<P>>) -> MachineHandle {
        let name = machine.name();
        let Some(index) = self.slots.iter().position(|s| s.machine.is_none()) else {
            raise(EngineFault::MachineTableFull { machine: name });
        };
        let slot = &mut self.slots[index];
        slot.machine = Some(machine);
        MachineHandle::new(index, slot.generation)
    }

    /// Take a machine out of its slot.  The slot's generation advances so
    /// the old handle can no longer resolve.
    pub fn remove(&mut self, handle: MachineHandle) -> Option<Box<DynMachine<P>>> {
        let slot = self.slots.get_mut(handle.index())?;
        if slot.generation != handle.generation() {
            return None;
        }
        let machine = slot.machine.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        info!("FSM destroyed: {} (slot {})", machine.name(), handle.index());
        Some(machine)
    }

    pub fn get(&self, handle: MachineHandle) -> Option<&DynMachine<P>> {
        let slot = self.slots.get(handle.index())?;
        if slot.generation != handle.generation() {
            return None;
        }
        slot.machine.as_deref()
    }

    pub fn get_mut(&mut self, handle: MachineHandle) -> Option<&mut DynMachine<P>> {
        let slot = self.slots.get_mut(handle.index())?;
        if slot.generation != handle.generation() {
            return None;
        }
        slot.machine.as_deref_mut()
    }

    /// Like [`get`](Self::get) but raises [`EngineFault::StaleHandle`].
    pub fn expect(&self, handle: MachineHandle) -> &DynMachine<P> {
        self.get(handle).unwrap_or_else(|| raise(stale(handle)))
    }

    /// Like [`get_mut`](Self::get_mut) but raises [`EngineFault::StaleHandle`].
    pub fn expect_mut(&mut self, handle: MachineHandle) -> &mut DynMachine<P> {
        match self.get_mut(handle) {
            Some(m) => m,
            None => raise(stale(handle)),
        }
    }

    /// Live machines with their current handles.
    pub fn iter(&self) -> impl Iterator<Item = (MachineHandle, &DynMachine<P>)> {
        self.slots.iter().enumerate().filter_map(|(i, s)| {
            s.machine
                .as_deref()
                .map(|m| (MachineHandle::new(i, s.generation), m))
        })
    }

    /// Number of live machines.
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.machine.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn stale(handle: MachineHandle) -> EngineFault {
    EngineFault::StaleHandle {
        index: handle.index(),
        generation: handle.generation(),
    }
}
