/// The process-wide "at most one session" slot
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::debug;

use crate::session::Session;

/// Holds the active session, if any.
///
/// Check-then-create happens under one lock, so concurrent attach attempts
/// see either the existing session or a fully built new one.
#[derive(Debug, Default)]
pub struct SessionSlot {
    current: Mutex<Option<Arc<Session>>>,
}

/// Outcome of [`SessionSlot::acquire_or_create`]
pub enum Acquired<T> {
    Existing(Arc<Session>),
    Created(Arc<Session>, T),
}

static GLOBAL_SLOT: SessionSlot = SessionSlot::new();

/// The slot shared by every attach in this process
pub fn global_slot() -> &'static SessionSlot {
    &GLOBAL_SLOT
}

impl SessionSlot {
    pub const fn new() -> Self {
        Self {
            current: Mutex::new(None),
        }
    }

    pub fn lock(&self) -> SlotGuard<'_> {
        let guard = match self.current.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        SlotGuard { guard }
    }

    pub fn current(&self) -> Option<Arc<Session>> {
        self.lock().try_acquire_existing()
    }

    /// Reuse the active session, or build and install a new one
    pub fn acquire_or_create<T, E, F>(&self, build: F) -> Result<Acquired<T>, E>
    where
        F: FnOnce() -> Result<(Arc<Session>, T), E>,
    {
        let mut slot = self.lock();
        if let Some(existing) = slot.try_acquire_existing() {
            debug!("SessionSlot: reusing the active session");
            return Ok(Acquired::Existing(existing));
        }
        let (session, extra) = slot.create_and_install(build)?;
        Ok(Acquired::Created(session, extra))
    }

    /// Empty the slot if it still holds `session`
    pub fn clear(&self, session: &Arc<Session>) -> bool {
        let mut slot = self.lock();
        match slot.guard.as_ref() {
            Some(current) if Arc::ptr_eq(current, session) => {
                *slot.guard = None;
                debug!("SessionSlot: cleared");
                true
            }
            _ => false,
        }
    }
}

/// The slot while its lock is held
pub struct SlotGuard<'a> {
    guard: MutexGuard<'a, Option<Arc<Session>>>,
}

impl SlotGuard<'_> {
    pub fn try_acquire_existing(&self) -> Option<Arc<Session>> {
        self.guard.clone()
    }

    /// Run `build` and install the session it returns.
    ///
    /// Nothing is installed if `build` fails.
    pub fn create_and_install<T, E, F>(&mut self, build: F) -> Result<(Arc<Session>, T), E>
    where
        F: FnOnce() -> Result<(Arc<Session>, T), E>,
    {
        let (session, extra) = build()?;
        *self.guard = Some(Arc::clone(&session));
        debug!("SessionSlot: installed a new session");
        Ok((session, extra))
    }
}
