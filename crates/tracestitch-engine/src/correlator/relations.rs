use std::collections::HashMap;

use tracestitch_types::CanonicalEvent;
use tracing::trace;

use super::{ContextKey, Correlator};
use crate::sink::Sink;
use crate::Result;

/// Relations waiting for an endpoint, and the last closed begin per id
#[derive(Debug, Default)]
pub(super) struct RelationBook {
    pending: Vec<CanonicalEvent>,
    closed: HashMap<u64, CanonicalEvent>,
}

impl RelationBook {
    pub(super) fn remember_closed(&mut self, id: u64, begin: &CanonicalEvent) {
        self.closed.insert(id, begin.clone());
    }

    pub(super) fn drop_pending(&mut self) -> usize {
        let dropped = self.pending.len();
        self.pending.clear();
        dropped
    }

    fn waits_for(&self, id: u64) -> bool {
        self.pending
            .iter()
            .any(|r| r.id == Some(id) || r.parent_id == Some(id))
    }
}

impl Correlator {
    /// Begin record for a relation endpoint.
    ///
    /// Order: the relation's own context and the id index, then the last
    /// closed task with that id, then a scan of every open context.
    fn resolve_endpoint(&self, ctx: &ContextKey, id: u64) -> Option<CanonicalEvent> {
        self.state
            .lookup(ctx, id)
            .or_else(|| self.relations.closed.get(&id))
            .or_else(|| self.state.find_task(id))
            .cloned()
    }

    fn resolve_relation(&self, link: &CanonicalEvent) -> Option<(CanonicalEvent, CanonicalEvent)> {
        let ctx = ContextKey::of(link);
        let head = self.resolve_endpoint(&ctx, link.id?)?;
        let tail = self.resolve_endpoint(&ctx, link.parent_id?)?;
        Some((head, tail))
    }

    pub(super) fn on_relation(&mut self, link: CanonicalEvent, sink: &mut dyn Sink) -> Result<()> {
        match self.resolve_relation(&link) {
            Some((head, tail)) => self.emit_relation(link, head, tail, sink),
            None => {
                trace!(id = ?link.id, parent_id = ?link.parent_id, "relation parked");
                self.relations.pending.push(link);
                Ok(())
            }
        }
    }

    /// A task with `id` just opened: emit parked relations that now resolve
    pub(super) fn retry_relations(&mut self, id: u64, sink: &mut dyn Sink) -> Result<()> {
        if !self.relations.waits_for(id) {
            return Ok(());
        }

        let pending = std::mem::take(&mut self.relations.pending);
        let mut still_pending = Vec::with_capacity(pending.len());
        let mut ready = Vec::new();
        for link in pending {
            let involved = link.id == Some(id) || link.parent_id == Some(id);
            match involved.then(|| self.resolve_relation(&link)).flatten() {
                Some((head, tail)) => ready.push((link, head, tail)),
                None => still_pending.push(link),
            }
        }
        self.relations.pending = still_pending;

        for (link, head, tail) in ready {
            self.emit_relation(link, head, tail, sink)?;
        }
        Ok(())
    }

    /// Emit with the earlier endpoint as the start
    fn emit_relation(
        &mut self,
        link: CanonicalEvent,
        head: CanonicalEvent,
        tail: CanonicalEvent,
        sink: &mut dyn Sink,
    ) -> Result<()> {
        let (start, finish) = if tail.timestamp < head.timestamp {
            (tail, head)
        } else {
            (head, tail)
        };
        let link = self.timed(link);
        let start = self.timed(start);
        let finish = self.timed(finish);
        self.diagnostics.relations_emitted += 1;
        sink.relation(&link, &start, &finish)
    }
}
