use std::collections::HashMap;

use tracestitch_types::{CanonicalEvent, EventKind};

use super::memory::{MEMORY_ARG, MemoryUsage};

/// Stack-discipline scope: one (domain, thread) pair
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContextKey {
    pub domain: String,
    pub thread_id: i64,
}

impl ContextKey {
    pub fn of(event: &CanonicalEvent) -> Self {
        Self {
            domain: event.domain.clone(),
            thread_id: event.thread_id,
        }
    }
}

/// Key of an id-discipline list inside one context.
///
/// Task markers pair under their own namespace so a marker id never closes a
/// task with the same numeric id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CorrelationKey {
    Id(u64),
    Marker(Option<u64>),
}

/// A begin awaiting its end
#[derive(Debug, Clone)]
pub struct OpenTask {
    pub begin: CanonicalEvent,
    /// Arrival order, used to close leftovers deterministically
    pub seq: u64,
    /// Allocations charged while the task was open
    pub memory: Option<MemoryUsage>,
}

impl OpenTask {
    fn new(begin: CanonicalEvent, seq: u64) -> Self {
        Self {
            begin,
            seq,
            memory: None,
        }
    }

    /// The begin record, carrying its memory attribution as an argument
    pub fn into_begin(self) -> CanonicalEvent {
        let mut begin = self.begin;
        if let Some(memory) = self.memory {
            begin.args.insert(MEMORY_ARG.to_string(), memory.to_value());
        }
        begin
    }
}

#[derive(Debug, Default)]
struct ThreadTasks {
    stack: Vec<OpenTask>,
    by_id: HashMap<CorrelationKey, Vec<OpenTask>>,
}

impl ThreadTasks {
    fn is_empty(&self) -> bool {
        self.stack.is_empty() && self.by_id.is_empty()
    }

    /// Most recent open entry for `id`: the id list first, then the stack top
    /// if it carries the same id
    fn peek(&self, id: u64) -> Option<&OpenTask> {
        if let Some(last) = self.by_id.get(&CorrelationKey::Id(id)).and_then(|l| l.last()) {
            return Some(last);
        }
        self.stack.last().filter(|t| t.begin.id == Some(id))
    }

    fn peek_mut(&mut self, id: u64) -> Option<&mut OpenTask> {
        let key = CorrelationKey::Id(id);
        if self.by_id.get(&key).is_some_and(|l| !l.is_empty()) {
            return self.by_id.get_mut(&key).and_then(|l| l.last_mut());
        }
        self.stack.last_mut().filter(|t| t.begin.id == Some(id))
    }
}

/// All partial-match state of one correlator.
///
/// Stack entries are scoped by (domain, thread). Id entries are stored under
/// their context too, but `id_owners` indexes them by id alone, so an end in
/// one domain can close a begin in another domain that used the same id.
#[derive(Debug, Default)]
pub struct OpenTaskState {
    threads: HashMap<ContextKey, ThreadTasks>,
    id_owners: HashMap<u64, Vec<ContextKey>>,
    next_seq: u64,
}

impl OpenTaskState {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_seq(&mut self) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        seq
    }

    fn index(&mut self, id: Option<u64>, ctx: &ContextKey) {
        if let Some(id) = id {
            self.id_owners.entry(id).or_default().push(ctx.clone());
        }
    }

    fn unindex(&mut self, id: Option<u64>, ctx: &ContextKey) {
        let Some(id) = id else {
            return;
        };
        if let Some(owners) = self.id_owners.get_mut(&id) {
            if let Some(pos) = owners.iter().rposition(|o| o == ctx) {
                owners.remove(pos);
            }
            if owners.is_empty() {
                self.id_owners.remove(&id);
            }
        }
    }

    pub fn push_stack(&mut self, ctx: ContextKey, begin: CanonicalEvent) {
        let seq = self.next_seq();
        self.index(begin.id, &ctx);
        self.threads
            .entry(ctx)
            .or_default()
            .stack
            .push(OpenTask::new(begin, seq));
    }

    pub fn push_keyed(&mut self, ctx: ContextKey, key: CorrelationKey, begin: CanonicalEvent) {
        let seq = self.next_seq();
        if let CorrelationKey::Id(id) = key {
            self.index(Some(id), &ctx);
        }
        self.threads
            .entry(ctx)
            .or_default()
            .by_id
            .entry(key)
            .or_default()
            .push(OpenTask::new(begin, seq));
    }

    /// Innermost stack entry that `end_kind` closes
    pub fn pop_stack(&mut self, ctx: &ContextKey, end_kind: EventKind) -> Option<OpenTask> {
        let thread = self.threads.get_mut(ctx)?;
        let pos = thread
            .stack
            .iter()
            .rposition(|t| t.begin.kind.is_closed_by(end_kind))?;
        let task = thread.stack.remove(pos);
        self.cleanup(ctx);
        self.unindex(task.begin.id, ctx);
        Some(task)
    }

    /// Close the most recent entry for `id`.
    ///
    /// Looks in the ending context's id list, then at its stack top (a task
    /// whose id became known after it was pushed), then in every other
    /// context that has an open entry for the id.
    pub fn pop_by_id(&mut self, ctx: &ContextKey, id: u64, end_kind: EventKind) -> Option<OpenTask> {
        if let Some(task) = self.take_id_entry(ctx, id, end_kind) {
            return Some(task);
        }
        let owners: Vec<ContextKey> = self
            .id_owners
            .get(&id)
            .map(|o| o.iter().rev().filter(|c| *c != ctx).cloned().collect())
            .unwrap_or_default();
        owners
            .iter()
            .find_map(|owner| self.take_id_entry(owner, id, end_kind))
    }

    fn take_id_entry(&mut self, ctx: &ContextKey, id: u64, end_kind: EventKind) -> Option<OpenTask> {
        let thread = self.threads.get_mut(ctx)?;
        let key = CorrelationKey::Id(id);

        let mut from_list = None;
        let mut drained = false;
        if let Some(list) = thread.by_id.get_mut(&key)
            && let Some(pos) = list
                .iter()
                .rposition(|t| t.begin.kind.is_closed_by(end_kind))
        {
            from_list = Some(list.remove(pos));
            drained = list.is_empty();
        }
        if drained {
            thread.by_id.remove(&key);
        }

        let task = match from_list {
            Some(task) => task,
            None => {
                let top = thread.stack.last()?;
                if top.begin.id != Some(id) || !top.begin.kind.is_closed_by(end_kind) {
                    return None;
                }
                thread.stack.pop()?
            }
        };

        self.cleanup(ctx);
        self.unindex(Some(id), ctx);
        Some(task)
    }

    /// Take the open task marker for `id`, if any
    pub fn pop_marker(&mut self, ctx: &ContextKey, id: Option<u64>) -> Option<OpenTask> {
        let thread = self.threads.get_mut(ctx)?;
        let key = CorrelationKey::Marker(id);
        let list = thread.by_id.get_mut(&key)?;
        let task = list.pop()?;
        if list.is_empty() {
            thread.by_id.remove(&key);
        }
        self.cleanup(ctx);
        Some(task)
    }

    /// Context whose most recent entry for `id` is visible, own context first
    fn owner_of(&self, ctx: &ContextKey, id: u64) -> Option<ContextKey> {
        if self.threads.get(ctx).and_then(|t| t.peek(id)).is_some() {
            return Some(ctx.clone());
        }
        self.id_owners.get(&id)?.iter().rev().find_map(|owner| {
            self.threads
                .get(owner)
                .and_then(|t| t.peek(id))
                .map(|_| owner.clone())
        })
    }

    /// Open begin for `id` through the context and the id index
    pub fn lookup(&self, ctx: &ContextKey, id: u64) -> Option<&CanonicalEvent> {
        let owner = self.owner_of(ctx, id)?;
        self.threads.get(&owner)?.peek(id).map(|t| &t.begin)
    }

    pub fn lookup_mut(&mut self, ctx: &ContextKey, id: u64) -> Option<&mut CanonicalEvent> {
        let owner = self.owner_of(ctx, id)?;
        self.threads
            .get_mut(&owner)?
            .peek_mut(id)
            .map(|t| &mut t.begin)
    }

    /// Scan every context for an open entry with `id`, anywhere in its stack.
    ///
    /// O(threads); only a fallback for when the indexed lookup misses.
    pub fn find_task(&self, id: u64) -> Option<&CanonicalEvent> {
        self.threads
            .values()
            .flat_map(|thread| {
                let listed = thread.by_id.get(&CorrelationKey::Id(id)).and_then(|l| l.last());
                let stacked = thread.stack.iter().rev().find(|t| t.begin.id == Some(id));
                listed.into_iter().chain(stacked)
            })
            .max_by_key(|t| t.seq)
            .map(|t| &t.begin)
    }

    /// Every entry open on `thread_id` in any domain, oldest begin first
    pub fn open_on_thread_mut(&mut self, thread_id: i64) -> Vec<&mut OpenTask> {
        let mut open: Vec<&mut OpenTask> = self
            .threads
            .iter_mut()
            .filter(|(ctx, _)| ctx.thread_id == thread_id)
            .flat_map(|(_, thread)| {
                let listed = thread.by_id.values_mut().flatten();
                listed.chain(thread.stack.iter_mut())
            })
            .collect();
        open.sort_by_key(|t| (t.begin.timestamp, t.seq));
        open
    }

    /// Remove and return every open entry, oldest first
    pub fn drain(&mut self) -> Vec<OpenTask> {
        let mut open: Vec<OpenTask> = self
            .threads
            .drain()
            .flat_map(|(_, thread)| {
                let listed = thread.by_id.into_values().flatten();
                thread.stack.into_iter().chain(listed)
            })
            .collect();
        self.id_owners.clear();
        open.sort_by_key(|t| t.seq);
        open
    }

    pub fn open_count(&self) -> usize {
        self.threads
            .values()
            .map(|t| t.stack.len() + t.by_id.values().map(Vec::len).sum::<usize>())
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.threads.values().all(ThreadTasks::is_empty)
    }

    fn cleanup(&mut self, ctx: &ContextKey) {
        if self.threads.get(ctx).is_some_and(ThreadTasks::is_empty) {
            self.threads.remove(ctx);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(domain: &str, thread_id: i64) -> ContextKey {
        ContextKey {
            domain: domain.to_string(),
            thread_id,
        }
    }

    fn begin(kind: EventKind, ts: u64) -> CanonicalEvent {
        CanonicalEvent::new("d", kind, ts)
    }

    #[test]
    fn test_stack_pops_innermost_compatible() {
        let mut state = OpenTaskState::new();
        let c = ctx("d", 1);
        state.push_stack(c.clone(), begin(EventKind::TaskBegin, 0));
        state.push_stack(c.clone(), begin(EventKind::FrameBegin, 1));

        let task = state.pop_stack(&c, EventKind::TaskEnd).unwrap();
        assert_eq!(task.begin.timestamp, 0);
        let frame = state.pop_stack(&c, EventKind::FrameEnd).unwrap();
        assert_eq!(frame.begin.timestamp, 1);
        assert!(state.is_empty());
        assert!(state.pop_stack(&c, EventKind::TaskEnd).is_none());
    }

    #[test]
    fn test_id_entries_are_lifo_per_id() {
        let mut state = OpenTaskState::new();
        let c = ctx("gpu", -1);
        let b = |ts| begin(EventKind::TaskBeginOverlapped, ts).with_id(5);
        state.push_keyed(c.clone(), CorrelationKey::Id(5), b(0));
        state.push_keyed(c.clone(), CorrelationKey::Id(5), b(1));

        let first = state.pop_by_id(&c, 5, EventKind::TaskEndOverlapped).unwrap();
        let second = state.pop_by_id(&c, 5, EventKind::TaskEndOverlapped).unwrap();
        assert_eq!(first.begin.timestamp, 1);
        assert_eq!(second.begin.timestamp, 0);
        assert_eq!(state.open_count(), 0);
    }

    #[test]
    fn test_id_end_falls_back_to_stack_top_with_same_id() {
        let mut state = OpenTaskState::new();
        let c = ctx("d", 1);
        state.push_stack(c.clone(), begin(EventKind::TaskBegin, 0).with_id(9));

        let task = state.pop_by_id(&c, 9, EventKind::TaskEndOverlapped).unwrap();
        assert_eq!(task.begin.id, Some(9));
    }

    #[test]
    fn test_stack_top_with_other_id_is_not_taken() {
        let mut state = OpenTaskState::new();
        let c = ctx("d", 1);
        state.push_stack(c.clone(), begin(EventKind::TaskBegin, 0).with_id(8));
        assert!(state.pop_by_id(&c, 9, EventKind::TaskEndOverlapped).is_none());
        assert_eq!(state.open_count(), 1);
    }

    #[test]
    fn test_id_end_reaches_other_thread_through_index() {
        let mut state = OpenTaskState::new();
        let submit = ctx("gpu", 3);
        let complete = ctx("gpu", 4);
        state.push_keyed(
            submit.clone(),
            CorrelationKey::Id(77),
            begin(EventKind::TaskBeginOverlapped, 0).with_id(77),
        );

        let task = state
            .pop_by_id(&complete, 77, EventKind::TaskEndOverlapped)
            .unwrap();
        assert_eq!(task.begin.timestamp, 0);
        assert!(state.lookup(&submit, 77).is_none());
    }

    #[test]
    fn test_ids_cross_domains() {
        let mut state = OpenTaskState::new();
        state.push_keyed(
            ctx("a", 1),
            CorrelationKey::Id(1),
            begin(EventKind::TaskBeginOverlapped, 0).with_id(1),
        );
        assert!(state.lookup(&ctx("b", 2), 1).is_some());
    }

    #[test]
    fn test_markers_do_not_collide_with_ids() {
        let mut state = OpenTaskState::new();
        let c = ctx("d", 1);
        state.push_keyed(c.clone(), CorrelationKey::Marker(Some(4)), begin(EventKind::Marker, 0));
        assert!(state.pop_by_id(&c, 4, EventKind::TaskEndOverlapped).is_none());
        assert!(state.pop_marker(&c, Some(4)).is_some());
    }

    #[test]
    fn test_open_on_thread_spans_domains() {
        let mut state = OpenTaskState::new();
        state.push_stack(ctx("a", 1), CanonicalEvent::new("a", EventKind::TaskBegin, 5));
        state.push_keyed(
            ctx("b", 1),
            CorrelationKey::Id(2),
            CanonicalEvent::new("b", EventKind::TaskBeginOverlapped, 3).with_id(2),
        );
        state.push_stack(ctx("a", 1), CanonicalEvent::new("a", EventKind::TaskBegin, 7));
        state.push_stack(ctx("a", 2), CanonicalEvent::new("a", EventKind::TaskBegin, 4));

        let stamps: Vec<u64> = state
            .open_on_thread_mut(1)
            .iter()
            .map(|t| t.begin.timestamp)
            .collect();
        assert_eq!(stamps, vec![3, 5, 7]);
    }

    #[test]
    fn test_memory_becomes_a_begin_argument() {
        let mut state = OpenTaskState::new();
        let c = ctx("d", 1);
        state.push_stack(c.clone(), begin(EventKind::TaskBegin, 0));
        if let Some(task) = state.open_on_thread_mut(1).pop() {
            task.memory.get_or_insert_default().charge(8, 2.0);
        }

        let begin = state.pop_stack(&c, EventKind::TaskEnd).unwrap().into_begin();
        assert_eq!(begin.args[MEMORY_ARG]["TOTAL"], 16.0);
        assert_eq!(begin.args[MEMORY_ARG]["CHILDREN"], 0.0);
    }

    #[test]
    fn test_find_task_sees_deep_stack_entries() {
        let mut state = OpenTaskState::new();
        let c = ctx("d", 1);
        state.push_stack(c.clone(), begin(EventKind::TaskBegin, 0).with_id(3));
        state.push_stack(c.clone(), begin(EventKind::TaskBegin, 1));

        assert!(state.lookup(&c, 3).is_none());
        assert_eq!(state.find_task(3).map(|b| b.timestamp), Some(0));
    }

    #[test]
    fn test_lookup_mut_edits_open_begin() {
        let mut state = OpenTaskState::new();
        let c = ctx("d", 1);
        state.push_keyed(
            c.clone(),
            CorrelationKey::Id(2),
            begin(EventKind::TaskBeginOverlapped, 0).with_id(2),
        );
        state
            .lookup_mut(&c, 2)
            .unwrap()
            .args
            .insert("k".to_string(), serde_json::json!(1));
        assert_eq!(state.lookup(&c, 2).unwrap().args["k"], 1);
    }

    #[test]
    fn test_drain_orders_by_arrival() {
        let mut state = OpenTaskState::new();
        state.push_keyed(
            ctx("b", 2),
            CorrelationKey::Id(1),
            begin(EventKind::TaskBeginOverlapped, 5).with_id(1),
        );
        state.push_stack(ctx("a", 1), begin(EventKind::TaskBegin, 7));
        state.push_stack(ctx("a", 1), begin(EventKind::TaskBegin, 9));

        let order: Vec<u64> = state.drain().iter().map(|t| t.begin.timestamp).collect();
        assert_eq!(order, vec![5, 7, 9]);
        assert!(state.is_empty());
        assert!(state.lookup(&ctx("b", 2), 1).is_none());
    }
}
