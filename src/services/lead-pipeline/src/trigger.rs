//! Trigger listener
//!
//! Plays the part a hosted platform plays for an on-create function: it
//! watches the store's change feed and runs the dispatcher once per new lead,
//! each in its own task. An invocation that errors or leaves an email
//! unsent is redelivered whole, with exponential backoff, up to
//! `trigger.max_redeliveries` times. Leads the feed never announced are
//! found by sweeping the store for `new` leads with emails outstanding.

use crate::config::TriggerConfig;
use crate::dispatcher::TriggerDispatcher;
use crate::error::Result;
use crate::metrics::PipelineMetrics;
use crate::store::{LeadChangeFeed, MAX_LIST_LIMIT};
use futures::StreamExt;
use std::sync::Arc;
use studio_shared::{DispatchReport, LeadCreated};
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

#[derive(Clone)]
pub struct TriggerListener {
    feed: Arc<dyn LeadChangeFeed>,
    dispatcher: Arc<TriggerDispatcher>,
    config: TriggerConfig,
    metrics: PipelineMetrics,
}

impl TriggerListener {
    pub fn new(
        feed: Arc<dyn LeadChangeFeed>,
        dispatcher: Arc<TriggerDispatcher>,
        config: TriggerConfig,
        metrics: PipelineMetrics,
    ) -> Self {
        Self {
            feed,
            dispatcher,
            config,
            metrics,
        }
    }

    /// Subscribe now and process events on a background task until
    /// `shutdown` fires. Leads inserted after this returns are seen.
    ///
    /// Before listening, and again after every resubscription, stored leads
    /// that are still `new` and missing an email are dispatched, which covers
    /// leads created while nothing was listening. A closed or failing feed is
    /// resubscribed with the redelivery backoff.
    pub fn spawn(self, shutdown: CancellationToken) -> Result<JoinHandle<()>> {
        let events = self.feed.subscribe()?;
        info!("Trigger listener subscribed to lead change feed");

        Ok(tokio::spawn(async move {
            let mut in_flight = JoinSet::new();
            let mut pending = Some(events);
            let mut reconnects: u32 = 0;

            'listen: loop {
                let mut events = match pending.take() {
                    Some(events) => events,
                    None => {
                        reconnects += 1;
                        let delay = self.config.redelivery_delay(reconnects);
                        warn!(
                            "Resubscribing to lead change feed in {:?} (attempt {})",
                            delay, reconnects
                        );
                        tokio::select! {
                            _ = shutdown.cancelled() => break 'listen,
                            _ = tokio::time::sleep(delay) => {}
                        }
                        match self.feed.subscribe() {
                            Ok(events) => {
                                info!("Trigger listener resubscribed to lead change feed");
                                events
                            }
                            Err(e) => {
                                error!("Lead change feed subscription failed: {}", e);
                                continue 'listen;
                            }
                        }
                    }
                };

                self.sweep(&mut in_flight, &shutdown).await;

                loop {
                    tokio::select! {
                        _ = shutdown.cancelled() => break 'listen,
                        next = events.next() => match next {
                            Some(Ok(event)) => {
                                reconnects = 0;
                                debug!("Lead created event for {}", event.id);
                                self.start(&mut in_flight, event, &shutdown);
                            }
                            Some(Err(e)) => {
                                error!("Lead change feed error: {}", e);
                                continue 'listen;
                            }
                            None => {
                                warn!("Lead change feed closed");
                                continue 'listen;
                            }
                        },
                        Some(joined) = in_flight.join_next(), if !in_flight.is_empty() => {
                            if let Err(e) = joined {
                                error!("Trigger invocation task failed: {}", e);
                            }
                        }
                    }
                }
            }
            info!("Trigger listener shutting down");

            // Let running invocations finish their current attempt
            while let Some(joined) = in_flight.join_next().await {
                if let Err(e) = joined {
                    error!("Trigger invocation task failed: {}", e);
                }
            }
            info!("Trigger listener stopped");
        }))
    }

    /// Dispatch stored leads that never got their emails
    ///
    /// Each lead gets one attempt here before live events are read, so a
    /// live event for the same lead finds the audit records already written.
    /// Leads still incomplete move on to the usual redelivery.
    async fn sweep(&self, in_flight: &mut JoinSet<()>, shutdown: &CancellationToken) {
        let leads = match self.dispatcher.undelivered_leads(MAX_LIST_LIMIT).await {
            Ok(leads) => leads,
            Err(e) => {
                error!("Sweep for undelivered leads failed: {}", e);
                return;
            }
        };
        if leads.is_empty() {
            debug!("No undelivered leads in the store");
            return;
        }

        info!("Dispatching {} undelivered lead(s)", leads.len());
        for lead in leads {
            let event = LeadCreated::new(lead);
            match self.dispatcher.handle(event.clone()).await {
                Ok(report) if report.is_complete() => {}
                Ok(_) => self.start(in_flight, event, shutdown),
                Err(e) if e.is_retryable() => self.start(in_flight, event, shutdown),
                Err(e) => error!("Sweep dispatch for lead {} failed: {}", event.id, e),
            }
        }
    }

    fn start(&self, in_flight: &mut JoinSet<()>, event: LeadCreated, shutdown: &CancellationToken) {
        let listener = self.clone();
        let shutdown = shutdown.clone();
        in_flight.spawn(async move {
            // Failures are logged inside deliver
            let _ = listener.deliver(event, &shutdown).await;
        });
    }

    /// Run the dispatcher for `event`, redelivering while the outcome is
    /// worth retrying and attempts remain
    pub async fn deliver(
        &self,
        event: LeadCreated,
        shutdown: &CancellationToken,
    ) -> Result<DispatchReport> {
        let mut redeliveries = 0;

        loop {
            let outcome = self.dispatcher.handle(event.clone()).await;

            let retry = match &outcome {
                Ok(report) => !report.is_complete(),
                Err(e) => {
                    error!("Dispatcher invocation for lead {} failed: {}", event.id, e);
                    e.is_retryable()
                }
            };
            if !retry {
                return outcome;
            }

            if redeliveries >= self.config.max_redeliveries {
                error!(
                    "Giving up on lead {} after {} redeliveries",
                    event.id, redeliveries
                );
                return outcome;
            }

            redeliveries += 1;
            let delay = self.config.redelivery_delay(redeliveries);
            warn!(
                "Redelivering lead {} in {:?} (redelivery {}/{})",
                event.id, delay, redeliveries, self.config.max_redeliveries
            );
            self.metrics.record_redelivery();

            tokio::select! {
                _ = shutdown.cancelled() => return outcome,
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }
}
