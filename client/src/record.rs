//! Optimistic bookkeeping for a single record.
//!
//! [`Tracked`] is the one reconciliation routine shared by tasks and subtasks. It keeps the
//! last value the server confirmed and layers the in-flight patches on top of it, in the
//! order they were issued. Confirmations and rollbacks may arrive in any order:
//!
//! * a rollback only drops its own patch, so the touched fields fall back to the newest
//!   value still standing (an older pending patch or the confirmed value);
//! * a confirmation only moves a field forward if no newer mutation already confirmed it.

use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;

/// Issue-ordered identifier of one optimistic mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MutationId(u64);

impl MutationId {
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }
}

/// A value that can be patched field by field.
pub trait Record: Clone + Debug {
    type Field: Copy + Eq + Hash + Debug;
    type Patch: Clone + Debug;

    fn apply(&mut self, patch: &Self::Patch);

    /// Fields a patch writes.
    fn fields(patch: &Self::Patch) -> Vec<Self::Field>;

    /// A patch that would set `fields` to their values in `self`.
    fn extract(&self, fields: &[Self::Field]) -> Self::Patch;
}

#[derive(Debug, Clone, Copy)]
struct Stamp {
    mutation: MutationId,
    epoch: u64,
}

#[derive(Debug, Clone)]
pub struct Tracked<R: Record> {
    confirmed: R,
    pending: Vec<(MutationId, R::Patch)>,
    stamps: HashMap<R::Field, Stamp>,
}

impl<R: Record> Tracked<R> {
    pub fn new(confirmed: R) -> Self {
        Self {
            confirmed,
            pending: Vec::new(),
            stamps: HashMap::new(),
        }
    }

    /// Confirmed value with every pending patch applied.
    pub fn current(&self) -> R {
        let mut value = self.confirmed.clone();
        for (_, patch) in &self.pending {
            value.apply(patch);
        }
        value
    }

    pub fn confirmed(&self) -> &R {
        &self.confirmed
    }

    pub fn is_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    pub fn begin(&mut self, mutation: MutationId, patch: R::Patch) {
        self.pending.push((mutation, patch));
    }

    /// Folds a successful mutation into the confirmed value.
    ///
    /// `echo` is the record as returned by the server, when it returned one; its values win
    /// over the ones we sent. `epoch` is the collection-wide confirmation counter, used by
    /// [`Tracked::replace`] to recognise values newer than a refresh. Returns `false` when
    /// the mutation is not pending here.
    pub fn confirm(&mut self, mutation: MutationId, echo: Option<&R>, epoch: u64) -> bool {
        let Some(position) = self.pending.iter().position(|(m, _)| *m == mutation) else {
            return false;
        };
        let (_, patch) = self.pending.remove(position);

        let fresh: Vec<R::Field> = R::fields(&patch)
            .into_iter()
            .filter(|field| {
                self.stamps
                    .get(field)
                    .map_or(true, |stamp| stamp.mutation < mutation)
            })
            .collect();
        if fresh.is_empty() {
            return true;
        }

        let settled = match echo {
            Some(server) => server.extract(&fresh),
            None => {
                let mut sent = self.confirmed.clone();
                sent.apply(&patch);
                sent.extract(&fresh)
            }
        };
        self.confirmed.apply(&settled);
        for field in fresh {
            self.stamps.insert(field, Stamp { mutation, epoch });
        }
        true
    }

    /// Drops a failed mutation. Returns `false` when the mutation is not pending here.
    pub fn rollback(&mut self, mutation: MutationId) -> bool {
        let before = self.pending.len();
        self.pending.retain(|(m, _)| *m != mutation);
        self.pending.len() != before
    }

    /// Adopts a value fetched from the server.
    ///
    /// Refused while anything is pending. Fields confirmed after `since` (the epoch the fetch
    /// was issued at) keep their local value, since the fetched copy may predate them.
    pub fn replace(&mut self, mut remote: R, since: u64) -> bool {
        if self.is_pending() {
            return false;
        }
        let newer: Vec<R::Field> = self
            .stamps
            .iter()
            .filter(|(_, stamp)| stamp.epoch > since)
            .map(|(field, _)| *field)
            .collect();
        if !newer.is_empty() {
            remote.apply(&self.confirmed.extract(&newer));
        }
        self.confirmed = remote;
        true
    }
}
