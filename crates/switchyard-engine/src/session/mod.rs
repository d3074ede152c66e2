//! Session table and per-session serialisation.
//!
//! Each live session is a [`SessionSlot`] holding its backend: the driver
//! instance and the plugin instances created for it. A request takes the
//! backend out of the slot as a [`Lease`] for the duration of one command and
//! the lease puts it back on drop, so at most one command per session is in
//! flight while later requests queue on the slot's condition variable.
//!
//! The [`SessionTable`] maps ids to slots. It is only ever inserted into and
//! removed from, and every slot carries its own lock, so commands for
//! different sessions never contend.

mod cancel;


use std::collections::HashMap;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, RwLock};
use std::time::{Duration, Instant};

use switchyard_extensions::{Capabilities, Extension, ExtensionClass};

use crate::dispatch::{CancelReason, DispatchError};

pub use self::cancel::CancellationToken;

/// How often a queued request re-checks its cancellation token.
const CANCELLATION_POLL: Duration = Duration::from_millis(20);

/// A plugin instance bound to one session.
pub(crate) struct PluginInstance {
    pub(crate) class: Arc<dyn ExtensionClass>,
    pub(crate) instance: Box<dyn Extension>,
}

impl PluginInstance {
    pub(crate) fn name(&self) -> &str {
        self.class.metadata().name()
    }
}

/// Everything a session owns.
pub(crate) struct SessionBackend {
    pub(crate) driver: Box<dyn Extension>,
    pub(crate) plugins: Vec<PluginInstance>,
}

impl SessionBackend {
    /// Terminates plugins in reverse registration order, then the driver.
    ///
    /// Every instance is terminated even when an earlier one fails; the
    /// failures are returned as `(extension, message)` pairs.
    pub(crate) fn terminate(mut self, driver_name: &str) -> Vec<(String, String)> {
        let mut failures = Vec::new();
        for plugin in self.plugins.iter_mut().rev() {
            if let Err(error) = plugin.instance.terminate() {
                failures.push((plugin.name().to_owned(), error.to_string()));
            }
        }
        if let Err(error) = self.driver.terminate() {
            failures.push((driver_name.to_owned(), error.to_string()));
        }
        failures
    }
}

struct SlotState {
    backend: Option<SessionBackend>,
    queued: usize,
    closed: bool,
    last_used: Instant,
}

/// One live session: identity, negotiated capabilities, and the backend it
/// owns.
pub(crate) struct SessionSlot {
    id: String,
    driver: Arc<dyn ExtensionClass>,
    capabilities: Capabilities,
    state: Mutex<SlotState>,
    returned: Condvar,
}

impl SessionSlot {
    pub(crate) fn new(
        id: String,
        driver: Arc<dyn ExtensionClass>,
        capabilities: Capabilities,
        backend: SessionBackend,
    ) -> Self {
        Self {
            id,
            driver,
            capabilities,
            state: Mutex::new(SlotState {
                backend: Some(backend),
                queued: 0,
                closed: false,
                last_used: Instant::now(),
            }),
            returned: Condvar::new(),
        }
    }

    pub(crate) fn id(&self) -> &str {
        &self.id
    }

    pub(crate) fn driver_name(&self) -> &str {
        self.driver.metadata().name()
    }

    pub(crate) const fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    fn lock(&self) -> Result<MutexGuard<'_, SlotState>, DispatchError> {
        self.state
            .lock()
            .map_err(|_| DispatchError::internal("session lock poisoned"))
    }

    /// Waits for exclusive use of the backend.
    ///
    /// The wait ends early when `token` is cancelled or `queue_timeout`
    /// elapses. A session closed while the request is queued reports
    /// [`DispatchError::SessionNotFound`].
    pub(crate) fn acquire(
        self: &Arc<Self>,
        token: &CancellationToken,
        queue_timeout: Option<Duration>,
    ) -> Result<Lease, DispatchError> {
        let started = Instant::now();
        let mut state = self.lock()?;
        state.queued += 1;
        let outcome = loop {
            if state.closed {
                break Err(DispatchError::session_not_found(self.id.as_str()));
            }
            if token.is_cancelled() {
                break Err(DispatchError::request_cancelled(
                    self.id.as_str(),
                    CancelReason::Cancelled,
                ));
            }
            if let Some(backend) = state.backend.take() {
                break Ok(backend);
            }
            let waited = started.elapsed();
            let mut wait = CANCELLATION_POLL;
            if let Some(limit) = queue_timeout {
                if waited >= limit {
                    break Err(DispatchError::request_cancelled(
                        self.id.as_str(),
                        CancelReason::QueueTimeout { waited },
                    ));
                }
                wait = wait.min(limit.saturating_sub(waited));
            }
            state = match self.returned.wait_timeout(state, wait) {
                Ok((guard, _)) => guard,
                Err(_) => return Err(DispatchError::internal("session lock poisoned")),
            };
        };
        state.queued = state.queued.saturating_sub(1);
        drop(state);
        outcome.map(|backend| Lease {
            slot: Arc::clone(self),
            backend: Some(backend),
        })
    }

    /// Closes the slot and waits for any in-flight command to return the
    /// backend. Queued requests fail with `SessionNotFound`.
    ///
    /// Returns `None` if the slot was already closed.
    pub(crate) fn close(&self) -> Result<Option<SessionBackend>, DispatchError> {
        let mut state = self.lock()?;
        if state.closed {
            return Ok(None);
        }
        state.closed = true;
        self.returned.notify_all();
        loop {
            if let Some(backend) = state.backend.take() {
                return Ok(Some(backend));
            }
            state = self
                .returned
                .wait(state)
                .map_err(|_| DispatchError::internal("session lock poisoned"))?;
        }
    }

    /// Closes the slot only if it is idle: no command in flight, none
    /// queued, and unused for at least `timeout`.
    pub(crate) fn close_if_idle(
        &self,
        timeout: Duration,
        now: Instant,
    ) -> Result<Option<SessionBackend>, DispatchError> {
        let mut state = self.lock()?;
        let idle = !state.closed
            && state.queued == 0
            && state.backend.is_some()
            && now.saturating_duration_since(state.last_used) >= timeout;
        if !idle {
            return Ok(None);
        }
        state.closed = true;
        self.returned.notify_all();
        Ok(state.backend.take())
    }

    fn give_back(&self, backend: SessionBackend) {
        // A poisoned lock still holds valid state; the backend must go back.
        let mut state = self
            .state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        state.backend = Some(backend);
        state.last_used = Instant::now();
        drop(state);
        self.returned.notify_all();
    }
}

/// Exclusive use of a session's backend for one command.
pub(crate) struct Lease {
    slot: Arc<SessionSlot>,
    backend: Option<SessionBackend>,
}

impl Lease {
    pub(crate) fn backend_mut(&mut self) -> Result<&mut SessionBackend, DispatchError> {
        self.backend
            .as_mut()
            .ok_or_else(|| DispatchError::internal("session lease is empty"))
    }
}

impl Drop for Lease {
    fn drop(&mut self) {
        if let Some(backend) = self.backend.take() {
            self.slot.give_back(backend);
        }
    }
}

/// Concurrent map from session id to slot.
#[derive(Default)]
pub(crate) struct SessionTable {
    slots: RwLock<HashMap<String, Arc<SessionSlot>>>,
}

impl SessionTable {
    pub(crate) fn insert(&self, slot: Arc<SessionSlot>) -> Result<(), DispatchError> {
        let mut slots = self
            .slots
            .write()
            .map_err(|_| DispatchError::internal("session table lock poisoned"))?;
        slots.insert(slot.id().to_owned(), slot);
        Ok(())
    }

    pub(crate) fn get(&self, id: &str) -> Result<Option<Arc<SessionSlot>>, DispatchError> {
        let slots = self
            .slots
            .read()
            .map_err(|_| DispatchError::internal("session table lock poisoned"))?;
        Ok(slots.get(id).cloned())
    }

    pub(crate) fn remove(&self, id: &str) -> Result<Option<Arc<SessionSlot>>, DispatchError> {
        let mut slots = self
            .slots
            .write()
            .map_err(|_| DispatchError::internal("session table lock poisoned"))?;
        Ok(slots.remove(id))
    }

    /// Snapshot of every slot, for sweeps.
    pub(crate) fn snapshot(&self) -> Result<Vec<Arc<SessionSlot>>, DispatchError> {
        let slots = self
            .slots
            .read()
            .map_err(|_| DispatchError::internal("session table lock poisoned"))?;
        Ok(slots.values().cloned().collect())
    }

    /// Removes `slot` only if the table still maps its id to it.
    pub(crate) fn remove_slot(&self, slot: &Arc<SessionSlot>) -> Result<(), DispatchError> {
        let mut slots = self
            .slots
            .write()
            .map_err(|_| DispatchError::internal("session table lock poisoned"))?;
        if slots
            .get(slot.id())
            .is_some_and(|current| Arc::ptr_eq(current, slot))
        {
            slots.remove(slot.id());
        }
        Ok(())
    }

    pub(crate) fn len(&self) -> Result<usize, DispatchError> {
        let slots = self
            .slots
            .read()
            .map_err(|_| DispatchError::internal("session table lock poisoned"))?;
        Ok(slots.len())
    }
}
