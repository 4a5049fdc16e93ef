use std::{collections::HashMap, time::Duration};

use regex::Regex;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::{
    config::{ConfigError, SinkConfig},
    conversions::{
        change_event::ChangeEvent,
        deserializer::{EventDeserializer, JsonEventDeserializer, RawChangeRecord},
    },
    table::{statement::fold_identifier, TableDescriptor, TableError, TableId},
};

use super::{
    batch_size_wait::{self, BatchSizeWait},
    committers::RecordCommitter,
    stores::Store,
    writers::TableWriter,
    SinkError,
};

pub const LOG_INTERVAL: Duration = Duration::from_secs(15 * 60);

#[derive(Debug)]
pub struct ConsumerProgress {
    interval: Duration,
    consumed: u64,
    since: Instant,
}

impl ConsumerProgress {
    pub fn new(interval: Duration) -> Self {
        ConsumerProgress {
            interval,
            consumed: 0,
            since: Instant::now(),
        }
    }

    pub fn record(&mut self, records: usize) -> Option<u64> {
        self.consumed += records as u64;

        let elapsed = self.since.elapsed();
        if elapsed < self.interval {
            return None;
        }

        let consumed = std::mem::take(&mut self.consumed);
        info!("consumed {consumed} records after {elapsed:?}");
        self.since = Instant::now();
        Some(consumed)
    }

    pub fn consumed(&self) -> u64 {
        self.consumed
    }
}

impl Default for ConsumerProgress {
    fn default() -> Self {
        ConsumerProgress::new(LOG_INTERVAL)
    }
}

#[derive(Debug, Clone)]
pub struct DestinationMapper {
    prefix: String,
    pattern: Option<Regex>,
    replacement: String,
}

impl DestinationMapper {
    pub fn new(
        prefix: impl Into<String>,
        pattern: &str,
        replacement: impl Into<String>,
    ) -> Result<Self, ConfigError> {
        let pattern = if pattern.is_empty() {
            None
        } else {
            let regex = Regex::new(pattern).map_err(|source| ConfigError::InvalidRegex {
                pattern: pattern.to_string(),
                source,
            })?;
            Some(regex)
        };

        Ok(DestinationMapper {
            prefix: prefix.into(),
            pattern,
            replacement: replacement.into(),
        })
    }

    pub fn from_config(config: &SinkConfig) -> Result<Self, ConfigError> {
        DestinationMapper::new(
            config.table_prefix.clone(),
            &config.destination_regexp,
            config.destination_regexp_replace.clone(),
        )
    }

    pub fn table_name(&self, destination: &str) -> String {
        let rewritten = match &self.pattern {
            Some(regex) => regex.replace_all(destination, self.replacement.as_str()),
            None => destination.into(),
        };
        format!("{}{}", self.prefix, rewritten.replace('.', "_"))
    }
}

/// Applies batches of change records to their tables.
pub struct ChangeConsumer<S: Store> {
    store: S,
    writer: TableWriter,
    deserializer: Box<dyn EventDeserializer>,
    batch_size_wait: Box<dyn BatchSizeWait>,
    mapper: DestinationMapper,
    target_schema: String,
    identifier_quote: Option<char>,
    auto_create_tables: bool,
    progress: ConsumerProgress,
}

impl<S: Store> ChangeConsumer<S> {
    pub fn new(config: &SinkConfig, store: S) -> Result<Self, SinkError> {
        config.validate()?;
        let consumer = ChangeConsumer {
            store,
            writer: TableWriter::from_config(config),
            deserializer: Box::new(JsonEventDeserializer),
            batch_size_wait: batch_size_wait::by_name(&config.batch_size_wait)?,
            mapper: DestinationMapper::from_config(config)?,
            target_schema: config.target_schema.clone(),
            identifier_quote: config.identifier_quote_char,
            auto_create_tables: config.auto_create_tables(),
            progress: ConsumerProgress::default(),
        };
        info!(
            "consuming into schema {} using {:?}, auto create tables: {}",
            consumer.target_schema, consumer.writer, consumer.auto_create_tables
        );
        Ok(consumer)
    }

    pub fn with_deserializer(mut self, deserializer: Box<dyn EventDeserializer>) -> Self {
        self.deserializer = deserializer;
        self
    }

    pub fn with_batch_size_wait(mut self, batch_size_wait: Box<dyn BatchSizeWait>) -> Self {
        self.batch_size_wait = batch_size_wait;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn progress(&self) -> &ConsumerProgress {
        &self.progress
    }

    pub fn table_id(&self, destination: &str) -> TableId {
        TableId::new(
            fold_identifier(&self.target_schema, self.identifier_quote),
            fold_identifier(&self.mapper.table_name(destination), self.identifier_quote),
        )
    }

    pub async fn handle_batch<C: RecordCommitter + ?Sized>(
        &mut self,
        records: &[RawChangeRecord],
        committer: &mut C,
    ) -> Result<(), SinkError> {
        let start = Instant::now();

        for (table, events) in self.group_by_table(records)? {
            let destination = events
                .first()
                .map(|e| e.destination().to_string())
                .unwrap_or_default();

            let descriptor = match self.table_for(&table, &events).await {
                Ok(descriptor) => descriptor,
                Err(e) => {
                    error!("unable to resolve table {table} for destination {destination}: {e}");
                    return Err(e);
                }
            };

            if let Err(e) = self
                .writer
                .add_to_table(&self.store, &descriptor, &events)
                .await
            {
                error!(
                    "failed to write {} events from {destination} to {table}: {e}",
                    events.len()
                );
                return Err(e.into());
            }
        }

        for record in records {
            committer.mark_processed(record).await?;
        }
        committer.mark_batch_finished().await?;

        self.progress.record(records.len());
        self.batch_size_wait
            .wait(records.len(), start.elapsed())
            .await;
        Ok(())
    }

    fn group_by_table(
        &self,
        records: &[RawChangeRecord],
    ) -> Result<Vec<(TableId, Vec<ChangeEvent>)>, SinkError> {
        let mut positions: HashMap<TableId, usize> = HashMap::new();
        let mut groups: Vec<(TableId, Vec<ChangeEvent>)> = vec![];

        for record in records {
            let event = match self
                .deserializer
                .deserialize(record)
                .and_then(|event| event.operation().map(|_| event))
            {
                Ok(event) => event,
                Err(e) => {
                    error!("unable to parse record for {}: {e}", record.destination);
                    return Err(e.into());
                }
            };

            let table = self.table_id(event.destination());
            match positions.get(&table) {
                Some(&i) => groups[i].1.push(event),
                None => {
                    positions.insert(table.clone(), groups.len());
                    groups.push((table, vec![event]));
                }
            }
        }

        debug!(
            "routing {} records to {} tables",
            records.len(),
            groups.len()
        );
        Ok(groups)
    }

    async fn table_for(
        &self,
        table: &TableId,
        events: &[ChangeEvent],
    ) -> Result<TableDescriptor, SinkError> {
        match TableDescriptor::resolve(&self.store, table).await {
            Ok(descriptor) => Ok(descriptor.with_identifier_quote(self.identifier_quote)),
            Err(TableError::NotFound(id)) => {
                if !self.auto_create_tables {
                    return Err(SinkError::MissingTable(id));
                }
                let Some(first) = events.first() else {
                    return Err(TableError::NotFound(id).into());
                };

                warn!("table {id} not found, creating it");
                TableDescriptor::create_table(
                    &self.store,
                    &id,
                    first.schema(),
                    self.identifier_quote,
                )
                .await?;
                let descriptor = TableDescriptor::resolve(&self.store, &id).await?;
                Ok(descriptor.with_identifier_quote(self.identifier_quote))
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_destinations_to_table_names() {
        let identity = DestinationMapper::new("", "", "").unwrap();
        assert_eq!(
            identity.table_name("testc.inventory.customers"),
            "testc_inventory_customers"
        );

        let mapper = DestinationMapper::new("cdc_", "^testc\\.", "").unwrap();
        assert_eq!(
            mapper.table_name("testc.inventory.customers"),
            "cdc_inventory_customers"
        );

        let mapper = DestinationMapper::new("", "(\\w+)\\.(\\w+)\\.(\\w+)", "$2.${3}_v2").unwrap();
        assert_eq!(
            mapper.table_name("testc.inventory.customers"),
            "inventory_customers_v2"
        );
    }

    #[test]
    fn invalid_patterns_are_config_errors() {
        assert!(matches!(
            DestinationMapper::new("", "(unclosed", ""),
            Err(ConfigError::InvalidRegex { .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn progress_reports_once_per_interval() {
        let mut progress = ConsumerProgress::new(Duration::from_secs(60));
        assert_eq!(progress.record(10), None);
        assert_eq!(progress.consumed(), 10);

        tokio::time::advance(Duration::from_secs(61)).await;
        assert_eq!(progress.record(5), Some(15));
        assert_eq!(progress.consumed(), 0);

        assert_eq!(progress.record(1), None);
    }
}
