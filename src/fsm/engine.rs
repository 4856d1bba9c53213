//! The dispatcher: one cooperative loop driving every machine.
//!
//! [`Engine`] owns the [`Registry`], the shared [`EventQueue`] and the
//! [`Clock`].  A single execution context calls [`Engine::run_once`] (or
//! awaits [`Engine::run`]); every handler call, including the whole
//! EXIT/ENTER sequence of a transition it triggers, completes before the
//! next queued event is looked at.
//!
//! Transition protocol for `Transition::To(next)`:
//!
//! ```text
//!   1. stop default timer      (drops a TIMEOUT that already fired)
//!   2. handler(EXIT)  on old   (result ignored)
//!   3. current = next
//!   4. handler(ENTER) on new   (result ignored; sends are queued, not run)
//! ```

use core::any::Any;
use core::time::Duration;
use std::sync::Arc;

use heapless::Vec;
use log::{debug, info, warn};

use super::queue::{EventQueue, EventSender};
use super::registry::{Delivery, Dispatch, Machine, Registry};
use super::timers::{Expired, MachineTimers};
use super::{Context, EventId, MachineHandle, StateDescriptor, StateId, Transition};
use crate::app::ports::Clock;
use crate::error::{EngineFault, raise};

// ---------------------------------------------------------------------------
// Per-machine dispatch (handler call + transition protocol)
// ---------------------------------------------------------------------------

impl<C: 'static, P: 'static> Machine<C, P> {
    fn call(
        &mut self,
        state: &'static StateDescriptor<C, P>,
        handle: MachineHandle,
        event: EventId,
        payload: Option<P>,
        queue: &EventQueue<P>,
        clock: &dyn Clock,
    ) -> Transition {
        let mut cx = Context {
            data: &mut self.data,
            machine: handle,
            name: self.name,
            state: state.name,
            timers: &mut self.timers,
            queue,
            clock,
        };
        (state.handler)(&mut cx, event, payload)
    }
}

impl<C: 'static, P: 'static> Dispatch<P> for Machine<C, P> {
    fn name(&self) -> &'static str {
        self.name
    }

    fn current_state(&self) -> StateId {
        self.table[self.current].id
    }

    fn state_name(&self) -> &'static str {
        self.table[self.current].name
    }

    fn timers(&self) -> &MachineTimers {
        &self.timers
    }

    fn timers_mut(&mut self) -> &mut MachineTimers {
        &mut self.timers
    }

    fn deliver(
        &mut self,
        handle: MachineHandle,
        event: EventId,
        payload: Option<P>,
        queue: &EventQueue<P>,
        clock: &dyn Clock,
    ) -> Delivery {
        let table = self.table;
        let from = &table[self.current];

        let result = self.call(from, handle, event, payload, queue, clock);

        let target = match result {
            Transition::Stay => return Delivery::Stayed,
            Transition::To(target) if event.is_lifecycle() => {
                warn!(
                    "{}[{}]: ignoring transition to {} requested on {}",
                    self.name, from.name, target.0, event
                );
                return Delivery::Stayed;
            }
            Transition::To(target) => target,
        };

        let Some(next) = self.index_of(target) else {
            raise(EngineFault::UnknownTargetState {
                machine: self.name,
                state: target,
            });
        };
        let to = &table[next];
        info!("{}: {} -> {} (on {})", self.name, from.name, to.name, event);

        self.timers.stop_default(handle, queue);
        let _ = self.call(from, handle, EventId::EXIT, None, queue, clock);
        self.current = next;
        let _ = self.call(to, handle, EventId::ENTER, None, queue, clock);

        Delivery::Transitioned {
            from: from.id,
            to: to.id,
        }
    }

    fn data(&self) -> &dyn Any {
        &self.data
    }

    fn data_mut(&mut self) -> &mut dyn Any {
        &mut self.data
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Counters for diagnostics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineStats {
    /// Handler deliveries of queued events (transition ENTER/EXIT excluded).
    pub dispatched: u64,
    /// Completed transitions.
    pub transitions: u64,
    /// Timer expiries turned into queue entries.
    pub timers_fired: u64,
    /// Queued events dropped because their machine was destroyed.
    pub stale_dropped: u64,
    /// Sends rejected on a full queue.
    pub rejected: u32,
}

/// Registry + event queue + timers, driven from one dispatch context.
pub struct Engine<P: 'static, K: Clock> {
    registry: Registry<P>,
    queue: Arc<EventQueue<P>>,
    clock: K,
    stats: EngineStats,
}

impl<P: 'static, K: Clock> Engine<P, K> {
    pub fn new(clock: K) -> Self {
        Self {
            registry: Registry::new(),
            queue: Arc::new(EventQueue::new()),
            clock,
            stats: EngineStats::default(),
        }
    }

    // ── Registry ──────────────────────────────────────────────

    /// Register a machine parked in `initial`.  No handler runs until
    /// [`start`](Self::start) (or any other event) is delivered.
    ///
    /// Raises an [`EngineFault`] on an empty/oversized table, duplicate
    /// state ids, an unknown initial state, or a full registry.
    pub fn create<C: 'static>(
        &mut self,
        name: &'static str,
        table: &'static [StateDescriptor<C, P>],
        initial: StateId,
        data: C,
    ) -> MachineHandle {
        let machine = Machine::new(name, table, initial, data);
        let handle = self.registry.insert(Box::new(machine));
        info!(
            "FSM created: {} (slot {}, {} states, initial {})",
            name,
            handle.index(),
            table.len(),
            self.registry.expect(handle).state_name()
        );
        handle
    }

    /// Remove a machine, dropping its context and timers and tombstoning
    /// every event still queued for it.
    pub fn destroy(&mut self, handle: MachineHandle) {
        if self.registry.remove(handle).is_none() {
            raise(EngineFault::StaleHandle {
                index: handle.index(),
                generation: handle.generation(),
            });
        }
        self.queue.invalidate(|e| e.machine == handle);
    }

    /// Number of live machines.
    pub fn machines(&self) -> usize {
        self.registry.len()
    }

    // ── Events ────────────────────────────────────────────────

    /// Queue ENTER for the machine's initial state.
    pub fn start(&self, handle: MachineHandle) -> bool {
        self.send_event(handle, EventId::ENTER, None)
    }

    /// Queue an event.  `false` only when the queue is full.
    pub fn send_event(&self, handle: MachineHandle, event: EventId, payload: Option<P>) -> bool {
        self.queue.enqueue(handle, event, payload)
    }

    /// Producer handle for other threads and callbacks.
    pub fn sender(&self) -> EventSender<P> {
        EventSender::new(Arc::clone(&self.queue))
    }

    pub fn queue(&self) -> &EventQueue<P> {
        &self.queue
    }

    // ── Timers ────────────────────────────────────────────────

    pub fn timer_start_default(&mut self, handle: MachineHandle, ms: u32) {
        let deadline = self.clock.now_ms() + u64::from(ms);
        self.registry
            .expect_mut(handle)
            .timers_mut()
            .start_default(handle, deadline, &self.queue);
    }

    pub fn timer_stop_default(&mut self, handle: MachineHandle) {
        self.registry
            .expect_mut(handle)
            .timers_mut()
            .stop_default(handle, &self.queue);
    }

    pub fn timer_start_named(&mut self, handle: MachineHandle, ms: u32, event: EventId) {
        let deadline = self.clock.now_ms() + u64::from(ms);
        let machine = self.registry.expect_mut(handle);
        let name = machine.name();
        machine
            .timers_mut()
            .start_named(name, handle, event, deadline, &self.queue);
    }

    pub fn timer_stop_named(&mut self, handle: MachineHandle, event: EventId) -> bool {
        self.registry
            .expect_mut(handle)
            .timers_mut()
            .stop_named(handle, event, &self.queue)
    }

    /// Earliest armed deadline across all machines.
    pub fn next_deadline(&self) -> Option<u64> {
        self.registry
            .iter()
            .filter_map(|(_, m)| m.timers().next_deadline())
            .min()
    }

    // ── Introspection ─────────────────────────────────────────

    pub fn current_state(&self, handle: MachineHandle) -> StateId {
        self.registry.expect(handle).current_state()
    }

    pub fn state_name(&self, handle: MachineHandle) -> &'static str {
        self.registry.expect(handle).state_name()
    }

    /// Typed access to a machine's context.  `None` if `C` is not its type.
    pub fn context<C: 'static>(&self, handle: MachineHandle) -> Option<&C> {
        self.registry.expect(handle).data().downcast_ref()
    }

    pub fn context_mut<C: 'static>(&mut self, handle: MachineHandle) -> Option<&mut C> {
        self.registry.expect_mut(handle).data_mut().downcast_mut()
    }

    pub fn clock(&self) -> &K {
        &self.clock
    }

    pub fn stats(&self) -> EngineStats {
        EngineStats {
            rejected: self.queue.rejected(),
            ..self.stats
        }
    }

    // ── Dispatch loop ─────────────────────────────────────────

    /// Queue an event for every expired timer, in firing order.
    ///
    /// A timer whose event cannot be queued stays armed and is retried on
    /// the next poll.  Returns the number of timers fired.
    pub fn poll_timers(&mut self) -> usize {
        let now = self.clock.now_ms();
        let mut expired: Vec<Expired, { super::timers::MAX_EXPIRED }> = Vec::new();
        for (handle, machine) in self.registry.iter() {
            machine.timers().collect_expired(now, handle, &mut expired);
        }
        expired.sort_unstable_by_key(Expired::order_key);

        let mut fired = 0;
        for e in &expired {
            if !self.queue.enqueue(e.machine, e.event, None) {
                continue;
            }
            if let Some(machine) = self.registry.get_mut(e.machine) {
                machine.timers_mut().disarm(e.slot);
            }
            fired += 1;
        }
        self.stats.timers_fired += fired as u64;
        fired
    }

    /// Deliver queued events until the queue is empty.
    ///
    /// Events queued by handlers during the drain land at the tail and are
    /// delivered in the same call.  Returns the number of deliveries.
    pub fn dispatch_pending(&mut self) -> usize {
        let mut delivered = 0;
        while let Some(pending) = self.queue.pop() {
            let Some(machine) = self.registry.get_mut(pending.machine) else {
                warn!(
                    "dropping event {} for stale machine handle {}/{}",
                    pending.event,
                    pending.machine.index(),
                    pending.machine.generation()
                );
                self.stats.stale_dropped += 1;
                continue;
            };
            debug!(
                "{}[{}] <- {}",
                machine.name(),
                machine.state_name(),
                pending.event
            );

            let outcome = machine.deliver(
                pending.machine,
                pending.event,
                pending.payload,
                &self.queue,
                &self.clock,
            );
            if let Delivery::Transitioned { .. } = outcome {
                self.stats.transitions += 1;
            }
            delivered += 1;
        }
        self.stats.dispatched += delivered as u64;
        delivered
    }

    /// Fire expired timers, then drain the queue.
    pub fn run_once(&mut self) -> usize {
        self.poll_timers();
        self.dispatch_pending()
    }

    /// Run the dispatcher.  Never returns.
    ///
    /// Sleeps on the reactor until either a producer enqueues something or
    /// the earliest timer deadline passes.  Must be the only consumer of
    /// this engine's queue.
    pub async fn run(&mut self) {
        info!("FSM dispatcher running ({} machines)", self.registry.len());
        loop {
            self.run_once();

            let queue = Arc::clone(&self.queue);
            let woken = async move { queue.wait().await };
            match self.next_deadline() {
                Some(deadline) => {
                    let delay = deadline.saturating_sub(self.clock.now_ms());
                    let expired = async move {
                        async_io_mini::Timer::after(Duration::from_millis(delay)).await;
                    };
                    futures_lite::future::or(woken, expired).await;
                }
                None => woken.await,
            }
        }
    }
}
