use tracing::debug;

use crate::{
    conversions::change_event::ChangeEvent,
    pipeline::stores::Store,
    table::{statement::PreparedBatch, TableDescriptor},
};

use super::WriterError;

#[derive(Debug, Default, Clone, Copy)]
pub struct AppendTableWriter;

impl AppendTableWriter {
    pub async fn add_to_table<S: Store + ?Sized>(
        &self,
        store: &S,
        table: &TableDescriptor,
        events: &[ChangeEvent],
    ) -> Result<(), WriterError> {
        let mut insert = PreparedBatch::new(table.insert_statement());
        for event in events {
            insert.add(event.value_document()?.clone());
        }
        if insert.is_empty() {
            return Ok(());
        }

        let inserted = store.execute_batches(&[insert]).await?;
        debug!("appended {inserted} rows to {}", table.id());
        Ok(())
    }
}
