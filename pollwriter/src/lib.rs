//! pollwriter: buffered, callback-driven writer for one epoll-notified
//! descriptor.
//!
//! A [`WriterSource`] owns an epoll instance, a wakeup eventfd and a bounded
//! outgoing message queue. One consumer thread drives it by calling
//! [`WriterSource::process_one`] (typically from an outer loop that polls
//! the source's [`AsRawFd`](std::os::fd::AsRawFd) handle alongside other
//! sources). Any number of producer threads enqueue messages through cloned
//! [`WriterHandle`]s without ever blocking: a full queue is reported back as
//! [`WriteError::QueueFull`].
//!
//! Outcomes are reported through a [`WriterHandler`]:
//! - `on_write_result` once per message, success or failure,
//! - `on_received_data` for bytes read from the descriptor,
//! - `on_disconnected` exactly once, with every message that was never sent,
//! - `on_exception` for faults returned by any other callback.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use std::os::unix::net::UnixStream;
//!
//! use bytes::Bytes;
//! use pollwriter::{Config, FnHandler, WriterSource};
//!
//! fn main() -> Result<(), pollwriter::Error> {
//!     let (local, _peer) = UnixStream::pair()?;
//!
//!     let handler = FnHandler::new(
//!         |from_peer, undelivered: Vec<Bytes>| {
//!             println!("closed by peer: {from_peer}, lost {}", undelivered.len());
//!             Ok(())
//!         },
//!         |error, written: &Bytes, size| {
//!             println!("write of {} bytes: errno {error}, sent {size}", written.len());
//!             Ok(())
//!         },
//!         |data: &[u8]| {
//!             println!("received {} bytes", data.len());
//!             Ok(())
//!         },
//!         |fault| eprintln!("handler fault: {fault}"),
//!     );
//!
//!     let mut source = WriterSource::new(Config::default(), handler)?;
//!     source.set_fd(local)?;
//!
//!     let producer = source.handle();
//!     std::thread::spawn(move || {
//!         producer.write("hello").ok();
//!         producer.request_close();
//!     });
//!
//!     while !source.is_failed() && source.fd().is_some() {
//!         source.poll(None)?;
//!     }
//!     Ok(())
//! }
//! ```
//!
//! # Platform
//!
//! Linux only. Requires epoll and eventfd.

// ── Internal modules ────────────────────────────────────────────────────
pub(crate) mod metrics;
pub(crate) mod queue;
pub(crate) mod wakeup;

// ── Public modules ──────────────────────────────────────────────────────
pub mod config;
pub mod error;
pub mod handler;
pub mod registry;
pub mod source;

// ── Re-exports ──────────────────────────────────────────────────────────

/// Writer configuration.
pub use config::Config;
/// Builder for [`Config`] with `build()` validation.
pub use config::ConfigBuilder;
/// Engine errors.
pub use error::Error;
/// Synchronous `write` errors.
pub use error::WriteError;
/// Handler built from closures.
pub use handler::FnHandler;
/// Fault returned by a handler callback.
pub use handler::Fault;
/// Result type of handler callbacks.
pub use handler::HandlerResult;
/// Callback trait for writer sources.
pub use handler::WriterHandler;
/// Readiness event passed to user descriptor callbacks.
pub use registry::Event;
/// Readiness interest flags.
pub use registry::Interest;
/// epoll instance with a descriptor → callback map.
pub use registry::Registry;
/// Boxed callback for a user-registered descriptor.
pub use source::FdCallback;
/// Thread-safe producer handle.
pub use source::WriterHandle;
/// The writer engine.
pub use source::WriterSource;
