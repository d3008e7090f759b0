// Read interface over the append-only audit event store.
use async_trait::async_trait;
use parking_lot::RwLock;
use uuid::Uuid;

use crate::cursor::PagePosition;
use crate::entry::AuditEvent;
use crate::error::AuditError;
use crate::filter::ScopedFilter;

/// One page of events in descending (timestamp, id) order. `next` is the
/// position of the last returned event when more matches remain.
#[derive(Debug, Clone)]
pub struct EventPage {
    pub events: Vec<AuditEvent>,
    pub next: Option<PagePosition>,
}

impl EventPage {
    pub fn empty() -> Self {
        Self {
            events: Vec::new(),
            next: None,
        }
    }
}

/// The external audit event store. Reads are keyset-paginated: `after` is
/// the sort key of the last event of the previous page, so consecutive pages
/// have no gaps or duplicates against a stable snapshot. There is no upper
/// bound on the total number of matching events.
#[async_trait]
pub trait AuditEventStore: Send + Sync {
    async fn query(
        &self,
        filter: &ScopedFilter,
        after: Option<PagePosition>,
        limit: usize,
    ) -> Result<EventPage, AuditError>;

    async fn fetch(
        &self,
        organization_id: Uuid,
        event_id: Uuid,
    ) -> Result<Option<AuditEvent>, AuditError>;

    async fn count(&self, filter: &ScopedFilter) -> Result<u64, AuditError>;
}

/// In-memory event store for tests and development.
pub struct InMemoryAuditEventStore {
    events: RwLock<Vec<AuditEvent>>,
}

impl InMemoryAuditEventStore {
    pub fn new() -> Self {
        Self {
            events: RwLock::new(Vec::new()),
        }
    }

    /// Append a recorded event. The store is append-only; events are never
    /// mutated or removed.
    pub fn append(&self, event: AuditEvent) {
        self.events.write().push(event);
    }

    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.read().is_empty()
    }

    fn matching(&self, filter: &ScopedFilter) -> Vec<AuditEvent> {
        let mut matches: Vec<AuditEvent> = self
            .events
            .read()
            .iter()
            .filter(|event| filter.matches(event))
            .cloned()
            .collect();
        matches.sort_by(|a, b| (b.timestamp, b.id).cmp(&(a.timestamp, a.id)));
        matches
    }
}

impl Default for InMemoryAuditEventStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AuditEventStore for InMemoryAuditEventStore {
    async fn query(
        &self,
        filter: &ScopedFilter,
        after: Option<PagePosition>,
        limit: usize,
    ) -> Result<EventPage, AuditError> {
        let matches = self.matching(filter);
        let remaining: Vec<AuditEvent> = match after {
            Some(pos) => matches
                .into_iter()
                .filter(|event| (event.timestamp, event.id) < pos.sort_key())
                .collect(),
            None => matches,
        };

        let has_more = remaining.len() > limit;
        let events: Vec<AuditEvent> = remaining.into_iter().take(limit).collect();
        let next = if has_more {
            events
                .last()
                .map(|event| PagePosition::of(event.timestamp, event.id))
        } else {
            None
        };

        Ok(EventPage { events, next })
    }

    async fn fetch(
        &self,
        organization_id: Uuid,
        event_id: Uuid,
    ) -> Result<Option<AuditEvent>, AuditError> {
        Ok(self
            .events
            .read()
            .iter()
            .find(|event| event.id == event_id && event.organization_id == organization_id)
            .cloned())
    }

    async fn count(&self, filter: &ScopedFilter) -> Result<u64, AuditError> {
        Ok(self.matching(filter).len() as u64)
    }
}
