//! Id-keyed storage behind the engine.
//!
//! Entities are kept in maps keyed by a local key (the transient id for entities created
//! here, a fresh one for entities first seen in a refresh) and indexed by server id. Display
//! order comes from a rank stored on each entity, never from a position in a vector, so
//! concurrent inserts and deletes cannot shift a rollback onto the wrong entity.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use shared::{Subtask, Task};
use tracing::debug;
use uuid::Uuid;

use crate::error::{EngineError, EngineResult, MergeConflict};
use crate::model::{ItemId, SubtaskFields, SubtaskView, TaskFields, TaskView};
use crate::record::{MutationId, Tracked};

/// What a refresh did to the local collection. Counts include subtasks.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RefreshReport {
    pub replaced: usize,
    pub appended: usize,
    pub removed: usize,
    pub deferred: Vec<MergeConflict>,
}

pub(crate) trait Slot {
    type Remote;

    fn key(&self) -> Uuid;
    fn server_id(&self) -> Option<Uuid>;
    fn rank(&self) -> i64;
    /// A create, update or delete touching this entity is in flight.
    fn busy(&self) -> bool;
    /// Creation was confirmed after a fetch issued at `since`, so that fetch may not contain it.
    fn confirmed_after(&self, since: u64) -> bool;

    fn remote_id(remote: &Self::Remote) -> Uuid;
    fn from_remote(remote: &Self::Remote, rank: i64) -> Self;
    fn absorb(
        &mut self,
        remote: &Self::Remote,
        since: u64,
        parent: Option<ItemId>,
        report: &mut RefreshReport,
    );

    fn id(&self) -> ItemId {
        match self.server_id() {
            Some(id) => ItemId::Confirmed(id),
            None => ItemId::Transient(self.key()),
        }
    }
}

/// Live entities, entities parked by an in-flight delete, and the indexes over both.
#[derive(Debug)]
pub(crate) struct Slots<S> {
    live: HashMap<Uuid, S>,
    parked: HashMap<Uuid, S>,
    by_server: HashMap<Uuid, Uuid>,
    aliases: HashMap<Uuid, Uuid>,
    /// Server ids whose delete was confirmed, with the epoch of the confirmation.
    deleted: HashMap<Uuid, u64>,
    low: i64,
    high: i64,
}

impl<S> Default for Slots<S> {
    fn default() -> Self {
        Self {
            live: HashMap::new(),
            parked: HashMap::new(),
            by_server: HashMap::new(),
            aliases: HashMap::new(),
            deleted: HashMap::new(),
            low: 0,
            high: 0,
        }
    }
}

impl<S: Slot> Slots<S> {
    /// Local key of a live entity.
    pub fn resolve(&self, id: &ItemId) -> Option<Uuid> {
        let key = match id {
            ItemId::Transient(key) => self.aliases.get(key).copied().unwrap_or(*key),
            ItemId::Confirmed(server_id) => *self.by_server.get(server_id)?,
        };
        self.live.contains_key(&key).then_some(key)
    }

    pub fn get(&self, key: Uuid) -> Option<&S> {
        self.live.get(&key)
    }

    pub fn get_mut(&mut self, key: Uuid) -> Option<&mut S> {
        self.live.get_mut(&key)
    }

    /// Live or parked; continuations of in-flight calls must still find their target
    /// while a delete of it is pending.
    pub fn find_mut(&mut self, key: Uuid) -> Option<&mut S> {
        match self.live.get_mut(&key) {
            Some(slot) => Some(slot),
            None => self.parked.get_mut(&key),
        }
    }

    pub fn head_rank(&mut self) -> i64 {
        self.low -= 1;
        self.low
    }

    pub fn tail_rank(&mut self) -> i64 {
        self.high += 1;
        self.high
    }

    pub fn insert(&mut self, slot: S) {
        let key = slot.key();
        if let Some(server_id) = slot.server_id() {
            self.by_server.insert(server_id, key);
        }
        self.live.insert(key, slot);
    }

    pub fn bind(&mut self, key: Uuid, server_id: Uuid) {
        self.by_server.insert(server_id, key);
    }

    /// Makes a transient id that lost a race to a duplicate keep resolving to the survivor.
    pub fn alias(&mut self, transient: Uuid, key: Uuid) {
        self.aliases.insert(transient, key);
    }

    pub fn server_key(&self, server_id: Uuid) -> Option<Uuid> {
        self.by_server.get(&server_id).copied()
    }

    pub fn remove(&mut self, key: Uuid) -> Option<S> {
        let slot = self.live.remove(&key)?;
        if let Some(server_id) = slot.server_id() {
            if self.by_server.get(&server_id) == Some(&key) {
                self.by_server.remove(&server_id);
            }
        }
        Some(slot)
    }

    pub fn park(&mut self, key: Uuid) -> bool {
        match self.live.remove(&key) {
            Some(slot) => {
                self.parked.insert(key, slot);
                true
            }
            None => false,
        }
    }

    pub fn unpark(&mut self, key: Uuid) -> bool {
        match self.parked.remove(&key) {
            Some(slot) => {
                self.live.insert(key, slot);
                true
            }
            None => false,
        }
    }

    /// Drops a parked entity for good once its delete is confirmed.
    pub fn forget(&mut self, key: Uuid, epoch: u64) {
        if let Some(slot) = self.parked.remove(&key) {
            if let Some(server_id) = slot.server_id() {
                self.by_server.remove(&server_id);
                self.deleted.insert(server_id, epoch);
            }
        }
        self.aliases.retain(|_, target| *target != key);
    }

    pub fn busy(&self) -> bool {
        !self.parked.is_empty() || self.live.values().any(|slot| slot.busy())
    }

    pub fn ordered(&self) -> Vec<&S> {
        let mut slots: Vec<&S> = self.live.values().collect();
        slots.sort_by_key(|slot| slot.rank());
        slots
    }

    /// Non-destructive merge of a fetched list issued at epoch `since`.
    pub fn merge(
        &mut self,
        remote: &[S::Remote],
        since: u64,
        parent: Option<ItemId>,
        report: &mut RefreshReport,
    ) {
        let mut seen = HashSet::new();
        for item in remote {
            let server_id = S::remote_id(item);
            if !seen.insert(server_id) {
                continue;
            }
            if let Some(key) = self.server_key(server_id) {
                if self.parked.contains_key(&key) {
                    debug!(%server_id, "delete in flight, not resurrecting");
                    report.deferred.push(MergeConflict {
                        id: ItemId::Confirmed(server_id),
                        parent,
                    });
                } else if let Some(slot) = self.live.get_mut(&key) {
                    slot.absorb(item, since, parent, report);
                }
                continue;
            }
            if self.deleted.get(&server_id).is_some_and(|epoch| *epoch > since) {
                debug!(%server_id, "deleted after the fetch was issued, skipping");
                continue;
            }
            let rank = self.tail_rank();
            self.insert(S::from_remote(item, rank));
            report.appended += 1;
        }

        let gone: Vec<Uuid> = self
            .live
            .values()
            .filter(|slot| {
                slot.server_id().is_some_and(|id| !seen.contains(&id))
                    && !slot.busy()
                    && !slot.confirmed_after(since)
            })
            .map(|slot| slot.key())
            .collect();
        for key in gone {
            debug!(%key, "gone from server, removing");
            self.remove(key);
            report.removed += 1;
        }
    }

    /// Drops tombstones no refresh issued at or after `floor` can contradict. `None` means
    /// no refresh is in flight, so none is needed any more.
    pub fn prune_deleted(&mut self, floor: Option<u64>) {
        match floor {
            Some(floor) => self.deleted.retain(|_, epoch| *epoch > floor),
            None => self.deleted.clear(),
        }
    }
}

#[derive(Debug)]
pub(crate) struct SubtaskSlot {
    pub key: Uuid,
    pub server_id: Option<Uuid>,
    pub rank: i64,
    pub created_at: DateTime<Utc>,
    pub record: Tracked<SubtaskFields>,
    pub confirmed_epoch: u64,
}

impl SubtaskSlot {
    pub fn creating(key: Uuid, title: String, rank: i64) -> Self {
        Self {
            key,
            server_id: None,
            rank,
            created_at: Utc::now(),
            record: Tracked::new(SubtaskFields { title, done: false }),
            confirmed_epoch: 0,
        }
    }

    fn view(&self, task_id: ItemId) -> SubtaskView {
        let fields = self.record.current();
        SubtaskView {
            id: self.id(),
            task_id,
            title: fields.title,
            done: fields.done,
            created_at: self.created_at,
            pending: self.busy(),
        }
    }
}

impl Slot for SubtaskSlot {
    type Remote = Subtask;

    fn key(&self) -> Uuid {
        self.key
    }

    fn server_id(&self) -> Option<Uuid> {
        self.server_id
    }

    fn rank(&self) -> i64 {
        self.rank
    }

    fn busy(&self) -> bool {
        self.server_id.is_none() || self.record.is_pending()
    }

    fn confirmed_after(&self, since: u64) -> bool {
        self.confirmed_epoch > since
    }

    fn remote_id(remote: &Subtask) -> Uuid {
        remote.id
    }

    fn from_remote(remote: &Subtask, rank: i64) -> Self {
        Self {
            key: Uuid::new_v4(),
            server_id: Some(remote.id),
            rank,
            created_at: remote.created_at,
            record: Tracked::new(SubtaskFields::from(remote)),
            confirmed_epoch: 0,
        }
    }

    fn absorb(
        &mut self,
        remote: &Subtask,
        since: u64,
        parent: Option<ItemId>,
        report: &mut RefreshReport,
    ) {
        self.created_at = remote.created_at;
        if self.record.replace(SubtaskFields::from(remote), since) {
            report.replaced += 1;
        } else {
            debug!(subtask = %self.id(), "pending change, deferring merge");
            report.deferred.push(MergeConflict {
                id: self.id(),
                parent,
            });
        }
    }
}

#[derive(Debug)]
pub(crate) struct TaskSlot {
    pub key: Uuid,
    pub server_id: Option<Uuid>,
    pub rank: i64,
    pub created_at: DateTime<Utc>,
    pub owner_email: String,
    pub collaborators: Vec<String>,
    pub pending_requests: Vec<String>,
    pub record: Tracked<TaskFields>,
    pub subtasks: Slots<SubtaskSlot>,
    pub confirmed_epoch: u64,
}

impl TaskSlot {
    pub fn creating(key: Uuid, fields: TaskFields, owner_email: String, rank: i64) -> Self {
        Self {
            key,
            server_id: None,
            rank,
            created_at: Utc::now(),
            owner_email,
            collaborators: Vec::new(),
            pending_requests: Vec::new(),
            record: Tracked::new(fields),
            subtasks: Slots::default(),
            confirmed_epoch: 0,
        }
    }

    fn adopt_metadata(&mut self, task: &Task) {
        self.created_at = task.created_at;
        self.owner_email = task.user_email.clone();
        self.collaborators = task.collaborators.clone();
        self.pending_requests = task.pending_requests.clone();
    }

    /// Swaps the optimistic placeholder for the server's copy.
    pub fn confirm_creation(&mut self, task: &Task, epoch: u64) {
        self.server_id = Some(task.id);
        self.record = Tracked::new(TaskFields::from(task));
        self.adopt_metadata(task);
        self.confirmed_epoch = epoch;
        for subtask in &task.subtasks {
            if self.subtasks.server_key(subtask.id).is_none() {
                let rank = self.subtasks.tail_rank();
                self.subtasks.insert(SubtaskSlot::from_remote(subtask, rank));
            }
        }
    }

    /// Swaps an optimistic subtask for the server's copy, dropping a duplicate a refresh
    /// may have appended in the meantime. Returns the id the subtask is now known by.
    pub fn confirm_subtask_creation(&mut self, key: Uuid, subtask: &Subtask, epoch: u64) -> ItemId {
        if let Some(existing) = self.subtasks.server_key(subtask.id) {
            if existing != key {
                if self.subtasks.get(existing).is_some_and(|slot| slot.busy()) {
                    self.subtasks.remove(key);
                    self.subtasks.alias(key, existing);
                    return ItemId::Confirmed(subtask.id);
                }
                self.subtasks.remove(existing);
            }
        }
        if let Some(slot) = self.subtasks.get_mut(key) {
            slot.server_id = Some(subtask.id);
            slot.created_at = subtask.created_at;
            slot.record = Tracked::new(SubtaskFields::from(subtask));
            slot.confirmed_epoch = epoch;
            self.subtasks.bind(key, subtask.id);
        }
        ItemId::Confirmed(subtask.id)
    }

    fn view(&self) -> TaskView {
        let id = self.id();
        let fields = self.record.current();
        TaskView {
            id,
            title: fields.title,
            description: fields.description,
            due_date: fields.due_date,
            priority: fields.priority,
            done: fields.done,
            created_at: self.created_at,
            owner_email: self.owner_email.clone(),
            collaborators: self.collaborators.clone(),
            pending_requests: self.pending_requests.clone(),
            subtasks: self
                .subtasks
                .ordered()
                .into_iter()
                .map(|subtask| subtask.view(id))
                .collect(),
            pending: self.busy(),
        }
    }
}

impl Slot for TaskSlot {
    type Remote = Task;

    fn key(&self) -> Uuid {
        self.key
    }

    fn server_id(&self) -> Option<Uuid> {
        self.server_id
    }

    fn rank(&self) -> i64 {
        self.rank
    }

    fn busy(&self) -> bool {
        self.server_id.is_none() || self.record.is_pending() || self.subtasks.busy()
    }

    fn confirmed_after(&self, since: u64) -> bool {
        self.confirmed_epoch > since
    }

    fn remote_id(remote: &Task) -> Uuid {
        remote.id
    }

    fn from_remote(remote: &Task, rank: i64) -> Self {
        let mut subtasks = Slots::default();
        for subtask in &remote.subtasks {
            let rank = subtasks.tail_rank();
            subtasks.insert(SubtaskSlot::from_remote(subtask, rank));
        }
        Self {
            key: Uuid::new_v4(),
            server_id: Some(remote.id),
            rank,
            created_at: remote.created_at,
            owner_email: remote.user_email.clone(),
            collaborators: remote.collaborators.clone(),
            pending_requests: remote.pending_requests.clone(),
            record: Tracked::new(TaskFields::from(remote)),
            subtasks,
            confirmed_epoch: 0,
        }
    }

    fn absorb(
        &mut self,
        remote: &Task,
        since: u64,
        parent: Option<ItemId>,
        report: &mut RefreshReport,
    ) {
        // a pending subtask marks the whole task pending, so the task waits as a unit
        if self.busy() || !self.record.replace(TaskFields::from(remote), since) {
            debug!(task = %self.id(), "pending change, deferring merge");
            report.deferred.push(MergeConflict {
                id: self.id(),
                parent,
            });
            return;
        }
        report.replaced += 1;
        self.adopt_metadata(remote);
        let id = self.id();
        self.subtasks
            .merge(&remote.subtasks, since, Some(id), report);
    }
}

/// Keys and server ids of a subtask and its parent, resolved for a remote call.
#[derive(Debug, Clone, Copy)]
pub(crate) struct SubtaskTarget {
    pub task_key: Uuid,
    pub task_id: Uuid,
    pub key: Uuid,
    pub id: Uuid,
}

#[derive(Debug, Default)]
pub(crate) struct Collection {
    pub tasks: Slots<TaskSlot>,
    mutations: u64,
    epoch: u64,
    /// Epochs at which the refreshes still awaiting their listing were issued.
    refreshes: Vec<u64>,
}

impl Collection {
    pub fn next_mutation(&mut self) -> MutationId {
        self.mutations += 1;
        MutationId::new(self.mutations)
    }

    /// Bumps the confirmation epoch; every confirmed create, update or delete gets one.
    pub fn next_epoch(&mut self) -> u64 {
        self.epoch += 1;
        self.epoch
    }

    /// Registers a refresh about to fetch; its listing reflects nothing newer than the
    /// returned epoch.
    pub fn begin_refresh(&mut self) -> u64 {
        self.refreshes.push(self.epoch);
        self.epoch
    }

    /// Unregisters a refresh issued at `since`, whether it merged, failed or was dropped.
    /// Tombstones are kept as long as some refresh older than them is still in flight.
    pub fn end_refresh(&mut self, since: u64) {
        if let Some(index) = self.refreshes.iter().position(|issued| *issued == since) {
            self.refreshes.swap_remove(index);
        }
        let floor = self.refreshes.iter().min().copied();
        self.tasks.prune_deleted(floor);
        for task in self.tasks.live.values_mut().chain(self.tasks.parked.values_mut()) {
            task.subtasks.prune_deleted(floor);
        }
    }

    pub fn task_key(&self, id: &ItemId) -> EngineResult<Uuid> {
        self.tasks.resolve(id).ok_or(EngineError::NotFound(*id))
    }

    pub fn task(&self, id: &ItemId) -> EngineResult<&TaskSlot> {
        let key = self.task_key(id)?;
        self.tasks.get(key).ok_or(EngineError::NotFound(*id))
    }

    /// Local key and server id of a task the server already knows about.
    pub fn confirmed_task(&self, id: &ItemId) -> EngineResult<(Uuid, Uuid)> {
        let slot = self.task(id)?;
        let server_id = slot.server_id.ok_or(EngineError::Unconfirmed(*id))?;
        Ok((slot.key, server_id))
    }

    pub fn confirmed_subtask(&self, task: &ItemId, subtask: &ItemId) -> EngineResult<SubtaskTarget> {
        let (task_key, task_id) = self.confirmed_task(task)?;
        let parent = self.tasks.get(task_key).ok_or(EngineError::NotFound(*task))?;
        let key = parent
            .subtasks
            .resolve(subtask)
            .ok_or(EngineError::NotFound(*subtask))?;
        let id = parent
            .subtasks
            .get(key)
            .and_then(|slot| slot.server_id)
            .ok_or(EngineError::Unconfirmed(*subtask))?;
        Ok(SubtaskTarget {
            task_key,
            task_id,
            key,
            id,
        })
    }

    pub fn insert_created_task(&mut self, key: Uuid, fields: TaskFields, owner_email: String) {
        let rank = self.tasks.head_rank();
        self.tasks
            .insert(TaskSlot::creating(key, fields, owner_email, rank));
    }

    /// Replaces the transient entry `key` with the server's task. If a refresh already
    /// appended the same task, only one copy survives.
    pub fn confirm_created_task(&mut self, key: Uuid, task: &Task) -> ItemId {
        let epoch = self.next_epoch();
        if let Some(existing) = self.tasks.server_key(task.id) {
            if existing != key {
                if self.tasks.get(existing).is_some_and(|slot| slot.busy()) {
                    self.tasks.remove(key);
                    self.tasks.alias(key, existing);
                    return ItemId::Confirmed(task.id);
                }
                self.tasks.remove(existing);
            }
        }
        if let Some(slot) = self.tasks.get_mut(key) {
            slot.confirm_creation(task, epoch);
            self.tasks.bind(key, task.id);
        }
        ItemId::Confirmed(task.id)
    }

    pub fn merge(&mut self, remote: &[Task], since: u64) -> RefreshReport {
        let mut report = RefreshReport::default();
        self.tasks.merge(remote, since, None, &mut report);
        report
    }

    pub fn views(&self) -> Vec<TaskView> {
        self.tasks
            .ordered()
            .into_iter()
            .map(TaskSlot::view)
            .collect()
    }
}
