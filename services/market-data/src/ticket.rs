//! Last-quote cache with change detection
//!
//! One `Ticket` per instrument. Every update overwrites the snapshot; the
//! return value says whether price, bid or ask moved so callers can skip
//! notifying consumers of a quote that did not change.

use std::collections::BTreeMap;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::Serialize;
use tracing::debug;
use types::ids::InstrumentCode;
use types::tick::Tick;
use types::ticket::Ticket;

/// Whether an update changed the visible quote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TicketChange {
    Changed,
    Unchanged,
}

impl TicketChange {
    pub fn is_changed(&self) -> bool {
        matches!(self, TicketChange::Changed)
    }
}

/// Result of a ticket lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum TicketView {
    /// Lookup for one instrument; `None` when nothing is stored.
    Single(Option<Ticket>),
    /// Every stored ticket, keyed by instrument.
    All(BTreeMap<InstrumentCode, Ticket>),
}

/// Keyed last-quote cache.
#[derive(Debug, Default)]
pub struct TicketStore {
    tickets: DashMap<InstrumentCode, Ticket>,
}

impl TicketStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite the instrument's snapshot and report whether the quote
    /// changed. The first ticket for an instrument is always `Changed`.
    ///
    /// The entry guard holds the instrument's shard for the whole
    /// compare-and-write.
    pub fn update(&self, tick: &Tick) -> TicketChange {
        let incoming = Ticket::from(tick);
        match self.tickets.entry(tick.code.clone()) {
            Entry::Occupied(mut entry) => {
                let change = if entry.get().same_quote(&incoming) {
                    TicketChange::Unchanged
                } else {
                    TicketChange::Changed
                };
                entry.insert(incoming);
                change
            }
            Entry::Vacant(entry) => {
                debug!(code = %tick.code, "First ticket for instrument");
                entry.insert(incoming);
                TicketChange::Changed
            }
        }
    }

    pub fn get(&self, code: &InstrumentCode) -> Option<Ticket> {
        self.tickets.get(code).map(|t| t.value().clone())
    }

    /// Snapshot of every ticket.
    pub fn all(&self) -> BTreeMap<InstrumentCode, Ticket> {
        self.tickets
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect()
    }

    /// One instrument's ticket, or all of them when `code` is `None`.
    pub fn load(&self, code: Option<&InstrumentCode>) -> TicketView {
        match code {
            Some(code) => TicketView::Single(self.get(code)),
            None => TicketView::All(self.all()),
        }
    }

    pub fn len(&self) -> usize {
        self.tickets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tickets.is_empty()
    }

    /// Forget every ticket (process-level reset).
    pub fn clear(&self) {
        self.tickets.clear();
    }
}
