//! The session registry: every live session, keyed by id.
//!
//! # Concurrency note
//!
//! `SessionRegistry` is NOT thread-safe by itself. It is owned by the
//! negotiation coordinator task and only touched from there; transport
//! and engine tasks post events to that task instead of reaching in.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use peerlink_transport::SessionId;

use crate::{Role, Session, SessionError};

/// Source of session epochs, unique across every registry in the process.
static NEXT_EPOCH: AtomicU64 = AtomicU64::new(1);

/// Holds at most one [`Session`] per id.
pub struct SessionRegistry<P> {
    sessions: HashMap<SessionId, Session<P>>,
}

impl<P> Default for SessionRegistry<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P> SessionRegistry<P> {
    pub fn new() -> Self {
        Self {
            sessions: HashMap::new(),
        }
    }

    /// Creates a session for `id`.
    ///
    /// `make` builds the per-peer resources and receives the new session's
    /// epoch. If it fails nothing is registered.
    ///
    /// # Errors
    /// [`SessionError::AlreadyExists`] (converted into `E`) if `id` is taken,
    /// or whatever `make` returns.
    pub fn create<E>(
        &mut self,
        id: SessionId,
        role: Role,
        make: impl FnOnce(u64) -> Result<P, E>,
    ) -> Result<&mut Session<P>, E>
    where
        E: From<SessionError>,
    {
        if self.sessions.contains_key(&id) {
            return Err(SessionError::AlreadyExists(id).into());
        }
        let epoch = NEXT_EPOCH.fetch_add(1, Ordering::Relaxed);
        let peer = make(epoch)?;

        tracing::info!(%id, %role, epoch, "session created");
        Ok(self
            .sessions
            .entry(id.clone())
            .or_insert_with(|| Session::new(id, role, epoch, peer)))
    }

    /// Returns the session for `id`, creating it with `role` if absent.
    ///
    /// An existing session keeps its original role.
    pub fn get_or_create<E>(
        &mut self,
        id: &SessionId,
        role: Role,
        make: impl FnOnce(u64) -> Result<P, E>,
    ) -> Result<&mut Session<P>, E>
    where
        E: From<SessionError>,
    {
        if self.sessions.contains_key(id) {
            return self.get_mut(id).map_err(E::from);
        }
        self.create(id.clone(), role, make)
    }

    /// # Errors
    /// [`SessionError::NotFound`] if no session exists for `id`.
    pub fn get(&self, id: &SessionId) -> Result<&Session<P>, SessionError> {
        self.sessions
            .get(id)
            .ok_or_else(|| SessionError::NotFound(id.clone()))
    }

    /// # Errors
    /// [`SessionError::NotFound`] if no session exists for `id`.
    pub fn get_mut(
        &mut self,
        id: &SessionId,
    ) -> Result<&mut Session<P>, SessionError> {
        self.sessions
            .get_mut(id)
            .ok_or_else(|| SessionError::NotFound(id.clone()))
    }

    pub fn contains(&self, id: &SessionId) -> bool {
        self.sessions.contains_key(id)
    }

    /// Removes the session for `id` and returns it in the `Closed` state.
    ///
    /// Returns `None` if there is nothing to remove, so only the first of
    /// several racing teardowns gets the session (and its resources).
    pub fn remove(&mut self, id: &SessionId) -> Option<Session<P>> {
        let mut session = self.sessions.remove(id)?;
        let from = session.state();
        session.close();
        tracing::info!(%id, %from, "session removed");
        Some(session)
    }

    /// Removes every session, e.g. on shutdown.
    pub fn drain(&mut self) -> Vec<Session<P>> {
        self.sessions
            .drain()
            .map(|(_, mut session)| {
                session.close();
                session
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Ids of all live sessions, in no particular order.
    pub fn ids(&self) -> Vec<SessionId> {
        self.sessions.keys().cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Session<P>> {
        self.sessions.values()
    }
}
