use std::collections::HashMap;

use kanau::processor::Processor;

use super::MemoryProcessor;
use crate::entities::event_log::{
    AppendEvent, CountEventsByType, EventLogRecord, EventTypeCount, ListRecentEvents,
};
use crate::error::StoreError;

impl Processor<AppendEvent> for MemoryProcessor {
    type Output = EventLogRecord;
    type Error = StoreError;
    async fn process(&self, cmd: AppendEvent) -> Result<EventLogRecord, StoreError> {
        let mut state = self.state.lock().await;
        state
            .append_events(vec![cmd.event], time::OffsetDateTime::now_utc())?
            .pop()
            .ok_or(StoreError::Injected("event log append returned no rows"))
    }
}

impl Processor<ListRecentEvents> for MemoryProcessor {
    type Output = Vec<EventLogRecord>;
    type Error = StoreError;
    async fn process(&self, query: ListRecentEvents) -> Result<Vec<EventLogRecord>, StoreError> {
        let state = self.state.lock().await;
        let mut events: Vec<EventLogRecord> = state
            .events
            .iter()
            .filter(|record| record.store_id == query.store_id)
            .filter(|record| {
                query.event_types.is_empty()
                    || query
                        .event_types
                        .iter()
                        .any(|kind| kind == record.event.event_type())
            })
            .cloned()
            .collect();
        events.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        events.truncate(usize::try_from(query.limit).unwrap_or(0));
        Ok(events)
    }
}

impl Processor<CountEventsByType> for MemoryProcessor {
    type Output = Vec<EventTypeCount>;
    type Error = StoreError;
    async fn process(&self, query: CountEventsByType) -> Result<Vec<EventTypeCount>, StoreError> {
        let state = self.state.lock().await;
        let mut counts: HashMap<&str, i64> = HashMap::new();
        for record in state
            .events
            .iter()
            .filter(|record| record.store_id == query.store_id && record.created_at >= query.since)
        {
            *counts.entry(record.event.event_type()).or_default() += 1;
        }
        Ok(counts
            .into_iter()
            .map(|(event_type, count)| EventTypeCount {
                event_type: event_type.to_owned(),
                count,
            })
            .collect())
    }
}
