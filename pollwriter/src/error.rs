use std::io;
use std::os::fd::RawFd;

use bytes::Bytes;
use thiserror::Error;

use crate::handler::Fault;

/// Errors returned by the writer source and its readiness registry.
#[derive(Debug, Error)]
pub enum Error {
    /// epoll or eventfd setup or operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    /// Configuration value out of range.
    #[error("invalid config: {0}")]
    Config(String),
    /// The descriptor is already present in the registry. Use modify instead.
    #[error("fd {0} already registered")]
    AlreadyRegistered(RawFd),
    /// The descriptor is not present in the registry.
    #[error("fd {0} not registered")]
    NotRegistered(RawFd),
    /// The descriptor is the primary descriptor or the wakeup eventfd.
    #[error("fd {0} is managed by the writer source")]
    ReservedFd(RawFd),
    /// `set_fd` called while a descriptor is already set.
    #[error("descriptor already set")]
    DescriptorAlreadySet,
    /// `set_fd` called after close was requested or the descriptor disconnected.
    #[error("writer source closed")]
    Closed,
    /// The disconnect handler returned a fault. The source is unusable.
    #[error("fault during disconnection: {0}")]
    Fatal(Fault),
    /// A previous disconnection fault left the source unusable.
    #[error("writer source failed")]
    Failed,
}

/// Errors returned synchronously by `write`.
#[derive(Debug, Error)]
pub enum WriteError {
    /// No descriptor is set, or it has been disconnected.
    #[error("descriptor not connected")]
    NotConnected,
    /// Close was requested; no new messages are accepted.
    #[error("close requested")]
    Closing,
    /// The queue already holds `max_messages` messages. The payload is
    /// handed back so the caller can retry or drop it.
    #[error("message queue full")]
    QueueFull(Bytes),
}

impl WriteError {
    /// Misuse by the caller: writing before the descriptor is set or after
    /// close was requested.
    pub fn is_configuration(&self) -> bool {
        matches!(self, WriteError::NotConnected | WriteError::Closing)
    }

    /// Backpressure: the queue is at capacity.
    pub fn is_capacity(&self) -> bool {
        matches!(self, WriteError::QueueFull(_))
    }

    /// Recover the rejected payload, if the error carries one.
    pub fn into_inner(self) -> Option<Bytes> {
        match self {
            WriteError::QueueFull(data) => Some(data),
            _ => None,
        }
    }
}
