use core::pin::Pin;
use core::task::{Context, Poll};
use futures::Stream;
use pin_project_lite::pin_project;

use super::{BatchBoundary, BatchConfig};

pin_project! {
    /// Adapter stream which cuts the items of the underlying stream into
    /// batches. A batch is emitted when it reaches the maximum batch size,
    /// when an item returns true from [`BatchBoundary::is_last_in_batch`], when
    /// the underlying stream has nothing ready, or when it ends.
    #[must_use = "streams do nothing unless polled"]
    #[derive(Debug)]
    pub struct RecordBatchStream<B: BatchBoundary, S: Stream<Item = B>> {
        #[pin]
        stream: S,
        items: Vec<S::Item>,
        inner_stream_ended: bool,
        batch_config: BatchConfig,
    }
}

impl<B: BatchBoundary, S: Stream<Item = B>> RecordBatchStream<B, S> {
    pub fn new(stream: S, batch_config: BatchConfig) -> Self {
        RecordBatchStream {
            stream,
            items: Vec::with_capacity(batch_config.max_batch_size()),
            inner_stream_ended: false,
            batch_config,
        }
    }
}

impl<B: BatchBoundary, S: Stream<Item = B>> Stream for RecordBatchStream<B, S> {
    type Item = Vec<S::Item>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let mut this = self.as_mut().project();

        if *this.inner_stream_ended {
            return Poll::Ready(None);
        }

        loop {
            if this.items.is_empty() {
                this.items.reserve_exact(this.batch_config.max_batch_size());
            }
            match this.stream.as_mut().poll_next(cx) {
                Poll::Pending => break,
                Poll::Ready(Some(item)) => {
                    let is_last_in_batch = item.is_last_in_batch();
                    this.items.push(item);
                    if is_last_in_batch || this.items.len() >= this.batch_config.max_batch_size() {
                        return Poll::Ready(Some(std::mem::take(this.items)));
                    }
                }
                Poll::Ready(None) => {
                    let last = if this.items.is_empty() {
                        None
                    } else {
                        Some(std::mem::take(this.items))
                    };

                    *this.inner_stream_ended = true;

                    return Poll::Ready(last);
                }
            }
        }

        if this.items.is_empty() {
            Poll::Pending
        } else {
            Poll::Ready(Some(std::mem::take(this.items)))
        }
    }
}
