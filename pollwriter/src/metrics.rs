//! pollwriter metrics.
//!
//! Process-wide counters aggregated over every writer source. Exposed
//! through the `metriken` registry, so any exporter that walks it (e.g. a
//! Prometheus admin endpoint) picks them up.

use metriken::{Counter, Gauge, metric};

// ── Sources ──────────────────────────────────────────────────────

#[metric(
    name = "pollwriter/sources/active",
    description = "Writer sources with a descriptor currently set"
)]
pub static SOURCES_ACTIVE: Gauge = Gauge::new();

#[metric(
    name = "pollwriter/disconnects/peer",
    description = "Disconnections initiated by the peer or by an I/O error"
)]
pub static DISCONNECTS_PEER: Counter = Counter::new();

#[metric(
    name = "pollwriter/disconnects/local",
    description = "Disconnections completed after a requested close"
)]
pub static DISCONNECTS_LOCAL: Counter = Counter::new();

// ── Bytes ────────────────────────────────────────────────────────

#[metric(name = "pollwriter/bytes/received", description = "Total bytes received")]
pub static BYTES_RECEIVED: Counter = Counter::new();

#[metric(name = "pollwriter/bytes/sent", description = "Total bytes sent")]
pub static BYTES_SENT: Counter = Counter::new();

// ── Messages ─────────────────────────────────────────────────────

#[metric(
    name = "pollwriter/messages/sent",
    description = "Messages fully written to their descriptor"
)]
pub static MESSAGES_SENT: Counter = Counter::new();

#[metric(
    name = "pollwriter/messages/failed",
    description = "Messages whose write failed with an I/O error"
)]
pub static MESSAGES_FAILED: Counter = Counter::new();

#[metric(
    name = "pollwriter/messages/rejected",
    description = "Writes rejected because the queue was full"
)]
pub static MESSAGES_REJECTED: Counter = Counter::new();

#[metric(
    name = "pollwriter/messages/undelivered",
    description = "Messages returned undelivered on disconnection"
)]
pub static MESSAGES_UNDELIVERED: Counter = Counter::new();

// ── Faults ───────────────────────────────────────────────────────

#[metric(
    name = "pollwriter/faults/captured",
    description = "Handler faults routed to on_exception"
)]
pub static FAULTS_CAPTURED: Counter = Counter::new();
