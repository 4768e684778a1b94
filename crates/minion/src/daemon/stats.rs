//! Stats publisher
//!
//! Once per interval, asks every registered service for its stats and
//! republishes the raw output as a `stats:<id>` event.

use crate::daemon::events::EventSink;
use crate::daemon::manager::ServiceManager;
use crate::daemon::runner::ServiceExecutor;
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

/// Event name carrying the stats of service `id`
pub fn stats_event_name(id: &str) -> String {
    format!("stats:{}", id)
}

pub struct StatsPublisher<E: ServiceExecutor, S: EventSink> {
    manager: Arc<ServiceManager<E>>,
    sink: Arc<S>,
    interval: Duration,
}

impl<E: ServiceExecutor, S: EventSink + 'static> StatsPublisher<E, S> {
    pub fn new(manager: Arc<ServiceManager<E>>, sink: Arc<S>, interval: Duration) -> Self {
        Self {
            manager,
            sink,
            interval,
        }
    }

    /// Run one tick. Returns the number of events published.
    ///
    /// Stats for all services are collected concurrently and each result is
    /// published as soon as it arrives; a failing service is logged and skipped.
    pub async fn publish_once(&self) -> usize {
        let ids = self.manager.registry().ids();
        let published = join_all(ids.iter().map(|id| self.publish_service(id))).await;
        published.into_iter().filter(|ok| *ok).count()
    }

    async fn publish_service(&self, id: &str) -> bool {
        match self.manager.stats_raw(id).await {
            Ok(raw) => {
                self.sink.send_event_message(&raw, &stats_event_name(id), "");
                true
            }
            Err(e) => {
                log::warn!("[{}] stats failed: {}", id, e);
                false
            }
        }
    }

    /// Tick until `shutdown` fires.
    pub async fn run(self, mut shutdown: watch::Receiver<()>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        log::info!(
            "Stats publisher started (every {}ms)",
            self.interval.as_millis()
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let published = self.publish_once().await;
                    log::trace!("Published stats for {} services", published);
                }
                _ = shutdown.changed() => break,
            }
        }

        log::info!("Stats publisher stopped");
    }
}
