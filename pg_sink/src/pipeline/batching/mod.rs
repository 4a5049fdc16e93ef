use crate::conversions::deserializer::RawChangeRecord;

pub mod stream;

/// Marks stream items that must close the batch they end up in.
pub trait BatchBoundary: Sized {
    fn is_last_in_batch(&self) -> bool;
}

impl BatchBoundary for RawChangeRecord {
    fn is_last_in_batch(&self) -> bool {
        false
    }
}

// An error closes the batch so that it surfaces without waiting for more
// records.
impl<T: BatchBoundary, E> BatchBoundary for Result<T, E> {
    fn is_last_in_batch(&self) -> bool {
        match self {
            Ok(v) => v.is_last_in_batch(),
            Err(_) => true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct BatchConfig {
    max_batch_size: usize,
}

impl BatchConfig {
    pub fn new(max_batch_size: usize) -> BatchConfig {
        BatchConfig {
            max_batch_size: max_batch_size.max(1),
        }
    }

    pub fn max_batch_size(&self) -> usize {
        self.max_batch_size
    }
}
