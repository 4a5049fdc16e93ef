use futures::{Stream, StreamExt};
use tokio::pin;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::conversions::deserializer::RawChangeRecord;

use super::{
    batching::{stream::RecordBatchStream, BatchConfig},
    committers::RecordCommitter,
    consumer::ChangeConsumer,
    stores::Store,
    SinkError,
};

/// Drives a [`ChangeConsumer`] from a stream of raw records until the stream
/// ends, a batch fails or the pipeline is cancelled.
pub struct DataPipeline<S: Store, C: RecordCommitter> {
    consumer: ChangeConsumer<S>,
    committer: C,
    batch_config: BatchConfig,
    cancel: CancellationToken,
}

impl<S: Store, C: RecordCommitter> DataPipeline<S, C> {
    pub fn new(consumer: ChangeConsumer<S>, committer: C, batch_config: BatchConfig) -> Self {
        DataPipeline {
            consumer,
            committer,
            batch_config,
            cancel: CancellationToken::new(),
        }
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn consumer(&self) -> &ChangeConsumer<S> {
        &self.consumer
    }

    pub fn committer(&self) -> &C {
        &self.committer
    }

    pub async fn run<Src>(&mut self, source: Src) -> Result<(), SinkError>
    where
        Src: Stream<Item = Result<RawChangeRecord, std::io::Error>>,
    {
        let res = self.main_loop(source).await;

        match &res {
            Ok(()) => info!("pipeline stopped"),
            Err(e) => error!("main loop exited with {e}"),
        }

        res
    }

    async fn main_loop<Src>(&mut self, source: Src) -> Result<(), SinkError>
    where
        Src: Stream<Item = Result<RawChangeRecord, std::io::Error>>,
    {
        let batches = RecordBatchStream::new(source, self.batch_config.clone());
        pin!(batches);

        loop {
            let batch = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    info!("pipeline cancelled");
                    break;
                }
                batch = batches.next() => batch,
            };

            let Some(batch) = batch else {
                break;
            };

            let records = batch.into_iter().collect::<Result<Vec<_>, _>>()?;
            self.consumer
                .handle_batch(&records, &mut self.committer)
                .await?;
        }

        Ok(())
    }
}
