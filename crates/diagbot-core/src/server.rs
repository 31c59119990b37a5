//! The serve loop: pulls messages from a transport and answers them.
//!
//! Messages are handled batch by batch. Within a batch, each conversation's
//! messages are processed in arrival order while different conversations
//! proceed concurrently, bounded by a semaphore.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use futures::stream::{FuturesUnordered, StreamExt};
use tokio::sync::Semaphore;
use tokio::time::Interval;

use crate::dispatcher::Dispatcher;
use crate::model::ConversationId;
use crate::traits::{ChatTransport, ErrorAction, InboundMessage};

/// Configuration for the serve loop.
#[derive(Debug, Clone)]
pub struct ServeConfig {
    /// Maximum conversations handled at the same time.
    pub parallelism: usize,
    /// Drop sessions idle for longer than this. `None` keeps them forever.
    pub idle_timeout: Option<Duration>,
    /// How often to look for idle sessions.
    pub sweep_interval: Duration,
    /// Pause after a failed receive before polling again.
    pub retry_delay: Duration,
}

impl Default for ServeConfig {
    fn default() -> Self {
        Self {
            parallelism: 4,
            idle_timeout: None,
            sweep_interval: Duration::from_secs(60),
            retry_delay: Duration::from_secs(1),
        }
    }
}

/// Counters reported when the loop stops.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ServeStats {
    pub received: usize,
    pub replied: usize,
    pub failed_sends: usize,
    pub evicted: usize,
}

/// Run until the transport closes or `shutdown` resolves.
pub async fn serve<F>(
    transport: &dyn ChatTransport,
    dispatcher: &Dispatcher,
    config: &ServeConfig,
    shutdown: F,
) -> Result<ServeStats>
where
    F: Future<Output = ()>,
{
    tokio::pin!(shutdown);
    let semaphore = Arc::new(Semaphore::new(config.parallelism.max(1)));
    let mut sweep = config
        .idle_timeout
        .map(|_| tokio::time::interval(config.sweep_interval));
    let mut stats = ServeStats::default();

    tracing::info!(
        "serving on {} transport (parallelism {})",
        transport.name(),
        config.parallelism
    );

    loop {
        let received = tokio::select! {
            _ = &mut shutdown => {
                tracing::info!("shutdown requested");
                break;
            }
            _ = tick(&mut sweep) => {
                if let Some(max_idle) = config.idle_timeout {
                    let evicted = dispatcher.engine().evict_idle(max_idle);
                    if evicted > 0 {
                        tracing::info!("evicted {evicted} idle session(s)");
                    }
                    stats.evicted += evicted;
                }
                continue;
            }
            received = transport.receive() => received,
        };

        let batch = match received {
            Ok(Some(batch)) => batch,
            Ok(None) => {
                tracing::info!("{} transport closed", transport.name());
                break;
            }
            Err(e) => {
                let delay = match transport.classify_error(&e) {
                    ErrorAction::Stop => {
                        tracing::error!("giving up on {} transport: {e:#}", transport.name());
                        return Err(e.context(format!("{} transport failed", transport.name())));
                    }
                    ErrorAction::RetryAfter(delay) => delay,
                    ErrorAction::Retry => config.retry_delay,
                };
                tracing::warn!("failed to receive messages, retrying in {delay:?}: {e:#}");
                tokio::select! {
                    _ = &mut shutdown => {
                        tracing::info!("shutdown requested");
                        break;
                    }
                    _ = tokio::time::sleep(delay) => continue,
                }
            }
        };

        stats.received += batch.len();
        let (replied, failed) = process_batch(transport, dispatcher, &semaphore, batch).await;
        stats.replied += replied;
        stats.failed_sends += failed;
    }

    Ok(stats)
}

async fn tick(interval: &mut Option<Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}

/// Split a batch per conversation, keeping arrival order inside each.
fn group_by_conversation(
    batch: Vec<InboundMessage>,
) -> Vec<(ConversationId, Vec<InboundMessage>)> {
    let mut index: HashMap<ConversationId, usize> = HashMap::new();
    let mut groups: Vec<(ConversationId, Vec<InboundMessage>)> = Vec::new();
    for message in batch {
        match index.get(&message.conversation) {
            Some(&i) => groups[i].1.push(message),
            None => {
                index.insert(message.conversation.clone(), groups.len());
                groups.push((message.conversation.clone(), vec![message]));
            }
        }
    }
    groups
}

async fn process_batch(
    transport: &dyn ChatTransport,
    dispatcher: &Dispatcher,
    semaphore: &Arc<Semaphore>,
    batch: Vec<InboundMessage>,
) -> (usize, usize) {
    let mut futures = FuturesUnordered::new();

    for (conversation, messages) in group_by_conversation(batch) {
        let semaphore = Arc::clone(semaphore);
        futures.push(async move {
            let Ok(_permit) = semaphore.acquire_owned().await else {
                tracing::error!(%conversation, "semaphore closed");
                return (0, messages.len());
            };

            let (mut replied, mut failed) = (0, 0);
            for message in &messages {
                let Some(reply) = dispatcher.handle(message) else {
                    continue;
                };
                match transport.send(&reply).await {
                    Ok(()) => replied += 1,
                    Err(e) => {
                        tracing::error!(%conversation, "failed to send reply: {e:#}");
                        failed += 1;
                    }
                }
            }
            (replied, failed)
        });
    }

    let mut totals = (0, 0);
    while let Some((replied, failed)) = futures.next().await {
        totals.0 += replied;
        totals.1 += failed;
    }
    totals
}
