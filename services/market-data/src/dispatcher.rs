//! Async tick dispatch
//!
//! Feed handlers push ticks into a bounded mpsc channel; one dispatcher
//! task applies them to the engine in arrival order and fans the results
//! out on a broadcast channel. Only quotes that moved and candle heads
//! that were written are published. The task ends when every sender has
//! been dropped.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use types::candle::Candle;
use types::granularity::Granularity;
use types::ids::InstrumentCode;
use types::tick::Tick;
use types::ticket::Ticket;

use crate::engine::QuoteEngine;

/// Broadcast capacity for outbound updates.
pub const UPDATE_CHANNEL_CAPACITY: usize = 1024;

/// Published to subscribers after a tick is applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum QuoteUpdate {
    Ticket(Ticket),
    Candle {
        code: InstrumentCode,
        granularity: Granularity,
        candle: Candle,
    },
}

/// Counters returned when the dispatcher shuts down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct DispatchStats {
    pub received: u64,
    pub rejected: u64,
    pub incomplete: u64,
    pub published: u64,
}

pub struct Dispatcher {
    engine: Arc<QuoteEngine>,
    updates: broadcast::Sender<QuoteUpdate>,
}

impl Dispatcher {
    pub fn new(engine: Arc<QuoteEngine>) -> Self {
        let (updates, _) = broadcast::channel(UPDATE_CHANNEL_CAPACITY);
        Self { engine, updates }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<QuoteUpdate> {
        self.updates.subscribe()
    }

    /// Spawn the dispatch loop with the engine's configured
    /// `dispatch_buffer`.
    pub fn spawn_configured(self) -> (mpsc::Sender<Tick>, JoinHandle<DispatchStats>) {
        let buffer = self.engine.dispatch_buffer();
        self.spawn(buffer)
    }

    /// Spawn the dispatch loop. Returns the tick sender and the task
    /// handle; subscribe before spawning to see every update.
    ///
    /// A zero `buffer` is raised to one.
    pub fn spawn(self, buffer: usize) -> (mpsc::Sender<Tick>, JoinHandle<DispatchStats>) {
        if buffer == 0 {
            warn!("Dispatch buffer of zero raised to one");
        }
        let (tx, rx) = mpsc::channel(buffer.max(1));
        let handle = tokio::spawn(self.run(rx));
        (tx, handle)
    }

    /// Drain `ticks` until every sender is dropped.
    pub async fn run(self, mut ticks: mpsc::Receiver<Tick>) -> DispatchStats {
        let mut stats = DispatchStats::default();
        info!("Dispatcher started");

        while let Some(tick) = ticks.recv().await {
            self.handle(&tick, &mut stats);
        }

        info!(
            received = stats.received,
            rejected = stats.rejected,
            incomplete = stats.incomplete,
            published = stats.published,
            "Dispatcher stopped"
        );
        stats
    }

    fn handle(&self, tick: &Tick, stats: &mut DispatchStats) {
        stats.received += 1;

        let outcome = match self.engine.on_tick(tick) {
            Ok(outcome) => outcome,
            Err(err) => {
                stats.rejected += 1;
                debug!(code = %tick.code, error = %err, "Dispatcher dropped tick");
                return;
            }
        };
        if !outcome.report.is_complete() {
            stats.incomplete += 1;
        }

        if outcome.ticket.is_changed() {
            if let Some(ticket) = self.engine.tickets().get(&tick.code) {
                self.publish(QuoteUpdate::Ticket(ticket), stats);
            }
        }

        for granularity in outcome.touched() {
            match self.engine.load_candles(&tick.code, granularity, 1) {
                Ok(mut head) if !head.is_empty() => self.publish(
                    QuoteUpdate::Candle {
                        code: tick.code.clone(),
                        granularity,
                        candle: head.remove(0),
                    },
                    stats,
                ),
                Ok(_) => {}
                Err(err) => warn!(code = %tick.code, %granularity, error = %err, "Head read failed"),
            }
        }
    }

    fn publish(&self, update: QuoteUpdate, stats: &mut DispatchStats) {
        // no subscribers is not an error
        if self.updates.send(update).is_ok() {
            stats.published += 1;
        }
    }
}
