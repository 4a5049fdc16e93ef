use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::config::{BatchSizeWaitConfig, ConfigError};

#[async_trait]
pub trait BatchSizeWait: Send + Sync {
    async fn wait(&self, batch_size: usize, elapsed: Duration);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoBatchSizeWait;

#[async_trait]
impl BatchSizeWait for NoBatchSizeWait {
    async fn wait(&self, _batch_size: usize, _elapsed: Duration) {}
}

#[derive(Debug, Clone)]
pub struct MaxBatchSizeWait {
    max_batch_size: usize,
    max_wait: Duration,
}

impl MaxBatchSizeWait {
    pub fn new(max_batch_size: usize, max_wait: Duration) -> Self {
        MaxBatchSizeWait {
            max_batch_size,
            max_wait,
        }
    }
}

#[async_trait]
impl BatchSizeWait for MaxBatchSizeWait {
    async fn wait(&self, batch_size: usize, elapsed: Duration) {
        if batch_size >= self.max_batch_size {
            return;
        }
        let remaining = self.max_wait.saturating_sub(elapsed);
        if !remaining.is_zero() {
            debug!("batch of {batch_size} below {}, waiting {remaining:?}", self.max_batch_size);
            tokio::time::sleep(remaining).await;
        }
    }
}

type Constructor = fn(&BatchSizeWaitConfig) -> Box<dyn BatchSizeWait>;

fn no_batch_size_wait(_config: &BatchSizeWaitConfig) -> Box<dyn BatchSizeWait> {
    Box::new(NoBatchSizeWait)
}

fn max_batch_size_wait(config: &BatchSizeWaitConfig) -> Box<dyn BatchSizeWait> {
    Box::new(MaxBatchSizeWait::new(
        config.max_batch_size,
        Duration::from_millis(config.max_wait_ms),
    ))
}

const REGISTRY: &[(&str, Constructor)] = &[
    ("NoBatchSizeWait", no_batch_size_wait),
    ("MaxBatchSizeWait", max_batch_size_wait),
];

pub fn by_name(config: &BatchSizeWaitConfig) -> Result<Box<dyn BatchSizeWait>, ConfigError> {
    let (name, constructor) = REGISTRY
        .iter()
        .find(|(name, _)| *name == config.name)
        .ok_or_else(|| ConfigError::UnknownBatchSizeWait(config.name.clone()))?;
    info!("using batch size wait {name}");
    Ok(constructor(config))
}
