//! Backoff retry of transient failures
//!
//! [`NetQueryDelayer`] is a tokio task holding each delayed query on its own
//! timer. When the timer fires the query is reset to pending and dispatched
//! again through a weak handle, so the delayer never keeps the dispatcher
//! alive.

use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinSet;

use crate::constants::FLOOD_WAIT_CODE;
use crate::core::config::DelayerConfig;
use crate::net::dispatcher::NetQueryDispatcher;
use crate::net::migrate::parse_flood_wait;
use crate::net::session::QueryDelayer;
use crate::types::NetQuery;
use crate::{log_debug, log_error, log_info};

/// What to do with a transiently failed query
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    /// Dispatch again after the wait
    Retry(Duration),
    /// Give up and deliver the error as is
    Fail,
}

/// Decide how long `query` waits before its next attempt
pub fn compute_backoff(config: &DelayerConfig, query: &NetQuery) -> Backoff {
    let Some(error) = query.error() else {
        return Backoff::Retry(Duration::ZERO);
    };
    if error.code == FLOOD_WAIT_CODE {
        return match parse_flood_wait(&error.message) {
            Some(seconds) => {
                let wait = Duration::from_secs(seconds);
                if wait > config.max_flood_wait() {
                    Backoff::Fail
                } else {
                    Backoff::Retry(wait)
                }
            }
            None => Backoff::Retry(config.initial_timeout()),
        };
    }
    let factor = 1u32 << query.retry_count().min(16);
    Backoff::Retry(
        config
            .initial_timeout()
            .saturating_mul(factor)
            .min(config.max_timeout()),
    )
}

enum DelayerCommand {
    Delay(NetQuery),
    Hangup,
}

/// Tokio-backed [`QueryDelayer`]
pub struct NetQueryDelayer {
    tx: mpsc::UnboundedSender<DelayerCommand>,
}

impl NetQueryDelayer {
    /// Spawn the delayer task. Must be called inside a tokio runtime.
    pub fn spawn(config: DelayerConfig, dispatcher: Weak<NetQueryDispatcher>) -> Arc<Self> {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(run_delayer(config, dispatcher, rx));
        Arc::new(Self { tx })
    }
}

impl QueryDelayer for NetQueryDelayer {
    fn delay(&self, query: NetQuery) {
        if self.tx.send(DelayerCommand::Delay(query)).is_err() {
            log_debug!("Delayer is gone, dropping query");
        }
    }

    fn hangup(&self) {
        let _ = self.tx.send(DelayerCommand::Hangup);
    }
}

async fn run_delayer(
    config: DelayerConfig,
    dispatcher: Weak<NetQueryDispatcher>,
    mut rx: mpsc::UnboundedReceiver<DelayerCommand>,
) {
    let mut timers: JoinSet<NetQuery> = JoinSet::new();
    loop {
        tokio::select! {
            command = rx.recv() => match command {
                Some(DelayerCommand::Delay(mut query)) => match compute_backoff(&config, &query) {
                    Backoff::Fail => {
                        log_debug!("Not retrying {}", query);
                        if let Some(dispatcher) = dispatcher.upgrade() {
                            dispatcher.deliver(query);
                        }
                    }
                    Backoff::Retry(wait) => {
                        query.bump_retry_count();
                        log_debug!("Retrying {} in {:?}", query, wait);
                        timers.spawn(async move {
                            tokio::time::sleep(wait).await;
                            query
                        });
                    }
                },
                Some(DelayerCommand::Hangup) | None => break,
            },
            Some(finished) = timers.join_next(), if !timers.is_empty() => match finished {
                Ok(mut query) => {
                    query.resend();
                    match dispatcher.upgrade() {
                        Some(dispatcher) => dispatcher.dispatch(query),
                        None => break,
                    }
                }
                Err(e) => log_error!("Delay timer failed: {}", e),
            },
        }
    }
    log_info!("NetQueryDelayer stopped with {} queries pending", timers.len());
    timers.shutdown().await;
}
