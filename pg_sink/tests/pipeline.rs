use std::io;

use bytes::Bytes;
use futures::stream;
use pg_sink::{
    config::SinkConfig,
    conversions::deserializer::RawChangeRecord,
    pipeline::{
        batching::BatchConfig, committers::memory::MemoryCommitter, consumer::ChangeConsumer,
        data_pipeline::DataPipeline, stores::memory::MemoryStore, SinkError,
    },
    table::TableId,
};
use serde_json::json;

fn record(id: i64) -> io::Result<RawChangeRecord> {
    let value = json!({
        "schema": {"type": "struct", "fields": [
            {"field": "id", "type": "int64"},
            {"field": "__op", "type": "string"}
        ]},
        "payload": {"id": id, "__op": "c"}
    });
    let key = json!({
        "schema": {"type": "struct", "fields": [{"field": "id", "type": "int64"}]},
        "payload": {"id": id}
    });
    Ok(RawChangeRecord::new(
        "shop.public.items",
        Some(Bytes::from(key.to_string())),
        Bytes::from(value.to_string()),
    ))
}

fn pipeline(store: &MemoryStore, max_batch_size: usize) -> DataPipeline<MemoryStore, MemoryCommitter> {
    let config = SinkConfig {
        schemas_enable: true,
        ..SinkConfig::default()
    };
    let consumer = ChangeConsumer::new(&config, store.clone()).unwrap();
    DataPipeline::new(
        consumer,
        MemoryCommitter::default(),
        BatchConfig::new(max_batch_size),
    )
}

fn items() -> TableId {
    TableId::new("debezium", "shop_public_items")
}

#[tokio::test]
async fn applies_the_source_in_batches() {
    let store = MemoryStore::default();
    let mut pipeline = pipeline(&store, 2);

    pipeline
        .run(stream::iter((1..=5).map(record)))
        .await
        .unwrap();

    assert_eq!(store.rows(&items()).len(), 5);
    assert_eq!(pipeline.committer().processed().len(), 5);
    assert_eq!(pipeline.committer().batches_finished(), 3);
    assert_eq!(pipeline.consumer().progress().consumed(), 5);
}

#[tokio::test]
async fn source_errors_stop_the_pipeline() {
    let store = MemoryStore::default();
    let mut pipeline = pipeline(&store, 2);

    let source = vec![
        record(1),
        record(2),
        Err(io::Error::new(io::ErrorKind::InvalidData, "bad line")),
        record(3),
    ];
    let err = pipeline.run(stream::iter(source)).await.unwrap_err();

    assert!(matches!(err, SinkError::IOError(_)));
    assert_eq!(store.rows(&items()).len(), 2);
    assert_eq!(pipeline.committer().batches_finished(), 1);
}

#[tokio::test]
async fn cancelled_pipeline_consumes_nothing() {
    let store = MemoryStore::default();
    let mut pipeline = pipeline(&store, 2);
    pipeline.cancellation_token().cancel();

    pipeline
        .run(stream::iter((1..=3).map(record)))
        .await
        .unwrap();

    assert!(store.rows(&items()).is_empty());
    assert_eq!(pipeline.committer().batches_finished(), 0);
}
