use std::{cmp::Ordering, collections::HashMap};

use tracing::{debug, info};

use crate::{
    conversions::change_event::{ChangeEvent, ChangeEventError, Operation},
    pipeline::stores::Store,
    table::{statement::PreparedBatch, TableDescriptor},
};

use super::{AppendTableWriter, WriterError};

#[derive(Debug, Clone)]
pub struct UpsertTableWriter {
    keep_deletes: bool,
    append: AppendTableWriter,
}

impl UpsertTableWriter {
    pub fn new(keep_deletes: bool) -> Self {
        UpsertTableWriter {
            keep_deletes,
            append: AppendTableWriter,
        }
    }

    pub async fn add_to_table<S: Store + ?Sized>(
        &self,
        store: &S,
        table: &TableDescriptor,
        events: &[ChangeEvent],
    ) -> Result<(), WriterError> {
        if !table.has_pk() {
            info!("{} has no primary key, appending instead", table.id());
            return self.append.add_to_table(store, table, events).await;
        }

        let latest = deduplicate(events)?;
        self.delete_insert(store, table, &latest).await
    }

    async fn delete_insert<S: Store + ?Sized>(
        &self,
        store: &S,
        table: &TableDescriptor,
        events: &[&ChangeEvent],
    ) -> Result<(), WriterError> {
        let mut delete = PreparedBatch::new(table.delete_statement()?);
        let mut insert = PreparedBatch::new(table.insert_statement());

        for event in events {
            let operation = event.operation()?;
            // a create has nothing to replace
            if operation != Operation::Create {
                delete.add(event.key_document()?.clone());
            }
            if self.keep_deletes || operation != Operation::Delete {
                insert.add(event.value_document()?.clone());
            }
        }

        let (deletes, inserts) = (delete.len(), insert.len());
        let affected = store.execute_batches(&[delete, insert]).await?;
        debug!(
            "upserted into {}: {deletes} deletes, {inserts} inserts, {affected} rows affected",
            table.id()
        );
        Ok(())
    }
}

/// Orders two events for the same key. The greater one is the more recent
/// change: later source timestamp first, then operation priority.
pub fn compare_by_ts_then_op(lhs: &ChangeEvent, rhs: &ChangeEvent) -> Ordering {
    lhs.source_ts_ms()
        .cmp(&rhs.source_ts_ms())
        .then_with(|| lhs.operation_priority().cmp(&rhs.operation_priority()))
}

/// Keeps the most recent event for every distinct key, in the order keys are
/// first seen. On a full tie the event seen later wins.
pub fn deduplicate(events: &[ChangeEvent]) -> Result<Vec<&ChangeEvent>, ChangeEventError> {
    let mut positions: HashMap<String, usize> = HashMap::with_capacity(events.len());
    let mut latest: Vec<&ChangeEvent> = Vec::with_capacity(events.len());

    for event in events {
        let key = event
            .key()
            .filter(|k| !k.is_null())
            .ok_or_else(|| ChangeEventError::MissingKey(event.destination().to_string()))?
            .to_string();

        match positions.get(&key) {
            Some(&i) => {
                if compare_by_ts_then_op(latest[i], event) != Ordering::Greater {
                    latest[i] = event;
                }
            }
            None => {
                positions.insert(key, latest.len());
                latest.push(event);
            }
        }
    }

    if latest.len() < events.len() {
        debug!("deduplicated {} events to {}", events.len(), latest.len());
    }
    Ok(latest)
}
