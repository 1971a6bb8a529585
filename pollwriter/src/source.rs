use std::io;
use std::os::fd::{AsRawFd, OwnedFd, RawFd};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use bytes::Bytes;
use tracing::{debug, trace, warn};

use crate::config::Config;
use crate::error::{Error, WriteError};
use crate::handler::{Fault, HandlerResult, WriterHandler};
use crate::metrics;
use crate::queue::MessageQueue;
use crate::registry::{Event, Interest, Registry};
use crate::wakeup::Wakeup;

/// Callback for a user-registered descriptor.
pub type FdCallback = Box<dyn FnMut(&Event) -> HandlerResult + Send>;

/// What the registry dispatches an event to.
enum Dispatch {
    Primary,
    Wakeup,
    Custom(FdCallback),
}

/// Why event handling stopped early.
enum Interrupt {
    /// A handler fault, reported through `on_exception`.
    Fault(Fault),
    /// A fault raised by `on_disconnected`. Poisons the source.
    Fatal(Fault),
}

impl From<Fault> for Interrupt {
    fn from(fault: Fault) -> Self {
        Interrupt::Fault(fault)
    }
}

impl From<Error> for Interrupt {
    fn from(err: Error) -> Self {
        Interrupt::Fault(Box::new(err))
    }
}

/// State shared between the consumer and every [`WriterHandle`].
struct Shared {
    queue: MessageQueue,
    wakeup: Wakeup,
    /// A wakeup signal is outstanding and not yet acknowledged.
    wakeup_armed: AtomicBool,
    connected: AtomicBool,
    closing: AtomicBool,
}

impl Shared {
    fn can_send_messages(&self) -> bool {
        self.connected.load(Ordering::SeqCst) && !self.closing.load(Ordering::SeqCst)
    }

    fn write(&self, data: Bytes) -> Result<(), WriteError> {
        // Reserve before checking state: disconnection clears `connected`
        // and then waits for `pending` to reach zero, so either we observe
        // the disconnect or our message is collected as undelivered.
        self.queue.reserve();

        let rejected = if self.closing.load(Ordering::SeqCst) {
            Some(WriteError::Closing)
        } else if !self.connected.load(Ordering::SeqCst) {
            Some(WriteError::NotConnected)
        } else {
            None
        };
        if let Some(err) = rejected {
            self.release();
            return Err(err);
        }

        match self.queue.push(data) {
            Ok(()) => {
                self.notify();
                Ok(())
            }
            Err(data) => {
                self.release();
                metrics::MESSAGES_REJECTED.increment();
                Err(WriteError::QueueFull(data))
            }
        }
    }

    fn release(&self) {
        // A close may be waiting for the last reservation to go away.
        if self.queue.cancel()
            && self.closing.load(Ordering::SeqCst)
            && self.connected.load(Ordering::SeqCst)
        {
            self.notify();
        }
    }

    /// Signal the wakeup eventfd unless a signal is already outstanding.
    fn notify(&self) {
        if self.wakeup_armed.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Err(e) = self.wakeup.signal() {
            warn!(error = %e, "failed to signal wakeup eventfd");
        }
    }

    /// Consume outstanding signals. Must run before the queue is drained so
    /// that later pushes signal again.
    fn acknowledge(&self) -> io::Result<()> {
        self.wakeup.drain()?;
        self.wakeup_armed.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn request_close(&self) -> bool {
        let first = !self.closing.swap(true, Ordering::SeqCst);
        if first {
            debug!("close requested");
        }
        first
    }
}

/// Cloneable, thread-safe handle for enqueueing messages to a
/// [`WriterSource`] from producer threads.
#[derive(Clone)]
pub struct WriterHandle {
    shared: Arc<Shared>,
}

impl WriterHandle {
    /// Enqueue `data` for writing. Never blocks.
    ///
    /// # Errors
    ///
    /// [`WriteError::Closing`] after a close was requested,
    /// [`WriteError::NotConnected`] if no descriptor is set, and
    /// [`WriteError::QueueFull`] when `max_messages` are already pending.
    pub fn write(&self, data: impl Into<Bytes>) -> Result<(), WriteError> {
        self.shared.write(data.into())
    }

    /// Whether a descriptor is set and no close was requested.
    pub fn can_send_messages(&self) -> bool {
        self.shared.can_send_messages()
    }

    /// Request a close once every queued message has been written. The
    /// consumer completes it during its next dispatch call. Idempotent.
    pub fn request_close(&self) {
        self.shared.request_close();
        self.shared.notify();
    }

    /// Messages queued but not yet handed to the writer, plus writes still
    /// in flight on producer threads. Because a rejected write holds its
    /// slot until it backs off, this can briefly exceed `max_messages`.
    pub fn pending_messages(&self) -> usize {
        self.shared.queue.pending()
    }
}

/// The message currently being written and how much of it went out.
struct WriteCursor {
    message: Bytes,
    sent: usize,
}

impl WriteCursor {
    fn remaining(&self) -> &[u8] {
        &self.message[self.sent..]
    }

    fn is_complete(&self) -> bool {
        self.sent >= self.message.len()
    }
}

/// Buffered, callback-driven writer (and passthrough reader) for one
/// non-blocking descriptor.
///
/// The source owns an epoll instance and must be driven by a single
/// consumer thread calling [`process_one`](WriterSource::process_one) or
/// [`poll`](WriterSource::poll). Producers on other threads enqueue through
/// a [`WriterHandle`]. Every accepted message is reported exactly once:
/// through `on_write_result` (success or failure) or in the undelivered list
/// passed to `on_disconnected`.
pub struct WriterSource<H> {
    registry: Registry<Dispatch>,
    events: Vec<Event>,
    shared: Arc<Shared>,
    handler: H,

    fd: Option<OwnedFd>,
    write_ready: bool,
    read_buffer: Box<[u8]>,
    is_socket: bool,
    cursor: Option<WriteCursor>,
    disconnected: bool,
    failed: bool,

    bytes_sent: u64,
    bytes_received: u64,
    msgs_sent: u64,
}

impl<H: WriterHandler> WriterSource<H> {
    /// Create a source with its own epoll instance and wakeup eventfd. No
    /// descriptor is set yet; writes fail until [`set_fd`](WriterSource::set_fd).
    pub fn new(config: Config, handler: H) -> Result<Self, Error> {
        config.validate()?;

        let mut registry = Registry::new(config.max_events)?;
        let shared = Arc::new(Shared {
            queue: MessageQueue::new(config.max_messages),
            wakeup: Wakeup::new()?,
            wakeup_armed: AtomicBool::new(false),
            connected: AtomicBool::new(false),
            closing: AtomicBool::new(false),
        });
        let wakeup_fd = shared.wakeup.as_raw_fd();
        registry.register_callback(wakeup_fd, Dispatch::Wakeup)?;
        registry.add(wakeup_fd, Interest::READABLE)?;

        Ok(WriterSource {
            registry,
            events: Vec::with_capacity(config.max_events),
            shared,
            handler,
            fd: None,
            write_ready: false,
            read_buffer: vec![0u8; config.read_buffer_size].into_boxed_slice(),
            is_socket: false,
            cursor: None,
            disconnected: false,
            failed: false,
            bytes_sent: 0,
            bytes_received: 0,
            msgs_sent: 0,
        })
    }

    /// Set the primary descriptor. It is switched to non-blocking mode,
    /// owned by the source and closed on disconnection.
    ///
    /// Sockets are written with `MSG_NOSIGNAL`, so a vanished peer surfaces
    /// as `EPIPE` through `on_write_result`. Other descriptors (pipes, ttys)
    /// use plain `write(2)` and raise `SIGPIPE` unless the process ignores
    /// it. Rust binaries ignore `SIGPIPE` by default.
    pub fn set_fd(&mut self, fd: impl Into<OwnedFd>) -> Result<(), Error> {
        self.check_alive()?;
        if self.fd.is_some() {
            return Err(Error::DescriptorAlreadySet);
        }
        if self.disconnected || self.shared.closing.load(Ordering::SeqCst) {
            return Err(Error::Closed);
        }

        let fd: OwnedFd = fd.into();
        let raw = fd.as_raw_fd();
        set_nonblocking(raw)?;
        let socket = is_socket(raw)?;

        self.registry.register_callback(raw, Dispatch::Primary)?;
        if let Err(e) = self
            .registry
            .add_oneshot(raw, Interest::READABLE | Interest::WRITABLE)
        {
            self.registry.unregister_callback(raw);
            return Err(e);
        }

        self.fd = Some(fd);
        self.is_socket = socket;
        self.write_ready = false;
        self.shared.connected.store(true, Ordering::SeqCst);
        metrics::SOURCES_ACTIVE.increment();
        debug!(fd = raw, "descriptor set");
        Ok(())
    }

    /// The primary descriptor, if set.
    pub fn fd(&self) -> Option<RawFd> {
        self.fd.as_ref().map(AsRawFd::as_raw_fd)
    }

    /// A handle producers can clone and move to other threads.
    pub fn handle(&self) -> WriterHandle {
        WriterHandle {
            shared: self.shared.clone(),
        }
    }

    /// Enqueue `data` for writing. See [`WriterHandle::write`].
    pub fn write(&self, data: impl Into<Bytes>) -> Result<(), WriteError> {
        self.shared.write(data.into())
    }

    /// Whether a descriptor is set and no close was requested.
    pub fn can_send_messages(&self) -> bool {
        self.shared.can_send_messages()
    }

    /// Stop accepting messages and close the descriptor once the queue and
    /// the in-flight message are both written. If nothing is outstanding,
    /// the descriptor is closed and `on_disconnected(false, [])` fires
    /// before this returns. Idempotent.
    ///
    /// Before [`set_fd`](WriterSource::set_fd) there is nothing to close:
    /// only the closing flag is set, no disconnect fires, and a later
    /// `set_fd` returns [`Error::Closed`].
    pub fn request_close(&mut self) -> Result<(), Error> {
        self.check_alive()?;
        self.shared.request_close();
        if self.fd.is_none() {
            return Ok(());
        }
        let result = self.close_if_drained();
        self.settle(result)?;
        self.rearm_primary()
    }

    /// Dispatch whatever is ready without waiting. Returns whether any event
    /// was processed; `false` means the source is idle.
    pub fn process_one(&mut self) -> Result<bool, Error> {
        self.poll(Some(Duration::ZERO))
    }

    /// Like [`process_one`](WriterSource::process_one), waiting up to
    /// `timeout` for readiness (`None` waits indefinitely).
    ///
    /// Handler faults are passed to `on_exception` and do not stop
    /// dispatching. A fault from `on_disconnected` is returned as
    /// [`Error::Fatal`] and leaves the source unusable.
    pub fn poll(&mut self, timeout: Option<Duration>) -> Result<bool, Error> {
        self.check_alive()?;

        let mut events = std::mem::take(&mut self.events);
        events.clear();
        let n = match self.registry.wait(&mut events, timeout) {
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {
                self.events = events;
                return Ok(false);
            }
            Err(e) => {
                self.events = events;
                return Err(Error::Io(e));
            }
        };

        let mut outcome = Ok(n > 0);
        for event in &events {
            trace!(?event, "dispatch");
            let result = self.dispatch(event);
            if let Err(e) = self.settle(result) {
                outcome = Err(e);
                break;
            }
        }
        self.events = events;
        outcome
    }

    /// Add a user descriptor to the source's epoll instance with its own
    /// callback. Faults returned by `callback` go to `on_exception`.
    pub fn register_fd<F>(
        &mut self,
        fd: RawFd,
        interest: Interest,
        callback: F,
    ) -> Result<(), Error>
    where
        F: FnMut(&Event) -> HandlerResult + Send + 'static,
    {
        self.register_custom(fd, interest, false, Box::new(callback))
    }

    /// Same as [`register_fd`](WriterSource::register_fd) in oneshot mode;
    /// re-arm with [`modify_fd_oneshot`](WriterSource::modify_fd_oneshot).
    pub fn register_fd_oneshot<F>(
        &mut self,
        fd: RawFd,
        interest: Interest,
        callback: F,
    ) -> Result<(), Error>
    where
        F: FnMut(&Event) -> HandlerResult + Send + 'static,
    {
        self.register_custom(fd, interest, true, Box::new(callback))
    }

    fn register_custom(
        &mut self,
        fd: RawFd,
        interest: Interest,
        oneshot: bool,
        callback: FdCallback,
    ) -> Result<(), Error> {
        self.check_reserved(fd)?;
        self.registry.register_callback(fd, Dispatch::Custom(callback))?;
        let added = if oneshot {
            self.registry.add_oneshot(fd, interest)
        } else {
            self.registry.add(fd, interest)
        };
        if let Err(e) = added {
            self.registry.unregister_callback(fd);
            return Err(e);
        }
        Ok(())
    }

    pub fn modify_fd(&mut self, fd: RawFd, interest: Interest) -> Result<(), Error> {
        self.check_reserved(fd)?;
        self.registry.modify(fd, interest)
    }

    pub fn modify_fd_oneshot(&mut self, fd: RawFd, interest: Interest) -> Result<(), Error> {
        self.check_reserved(fd)?;
        self.registry.modify_oneshot(fd, interest)
    }

    /// Remove a user descriptor and drop its callback. The descriptor itself
    /// is not closed.
    pub fn unregister_fd(&mut self, fd: RawFd) -> Result<(), Error> {
        self.check_reserved(fd)?;
        self.registry.remove(fd)?;
        self.registry.unregister_callback(fd);
        Ok(())
    }

    // ── Accessors ────────────────────────────────────────────────────

    /// Bytes actually written to the descriptor.
    pub fn bytes_sent(&self) -> u64 {
        self.bytes_sent
    }

    pub fn bytes_received(&self) -> u64 {
        self.bytes_received
    }

    /// Messages fully written.
    pub fn msgs_sent(&self) -> u64 {
        self.msgs_sent
    }

    /// Same count as [`WriterHandle::pending_messages`], including
    /// reservations of writes that are about to be rejected.
    pub fn pending_messages(&self) -> usize {
        self.shared.queue.pending()
    }

    /// Whether a disconnect fault poisoned the source.
    pub fn is_failed(&self) -> bool {
        self.failed
    }

    pub fn handler(&self) -> &H {
        &self.handler
    }

    pub fn handler_mut(&mut self) -> &mut H {
        &mut self.handler
    }

    // ── Dispatch ─────────────────────────────────────────────────────

    fn dispatch(&mut self, event: &Event) -> Result<(), Interrupt> {
        match self.registry.callback_mut(event.fd()) {
            Some(Dispatch::Primary) => {}
            Some(Dispatch::Wakeup) => return self.handle_wakeup_event(),
            Some(Dispatch::Custom(callback)) => return callback(event).map_err(Interrupt::Fault),
            // Unregistered by an earlier event in this batch.
            None => return Ok(()),
        }
        let result = self.handle_fd_event(event);
        let rearmed = self.rearm_primary();
        result?;
        Ok(rearmed?)
    }

    /// Turn an interrupted dispatch into the exception channel or a fatal error.
    fn settle(&mut self, result: Result<(), Interrupt>) -> Result<(), Error> {
        match result {
            Ok(()) => Ok(()),
            Err(Interrupt::Fault(fault)) => {
                metrics::FAULTS_CAPTURED.increment();
                warn!(fault = %fault, "handler fault captured");
                self.handler.on_exception(fault);
                Ok(())
            }
            Err(Interrupt::Fatal(fault)) => {
                warn!(fault = %fault, "fault during disconnection; source failed");
                self.failed = true;
                Err(Error::Fatal(fault))
            }
        }
    }

    fn check_alive(&self) -> Result<(), Error> {
        if self.failed {
            return Err(Error::Failed);
        }
        Ok(())
    }

    fn check_reserved(&self, fd: RawFd) -> Result<(), Error> {
        if Some(fd) == self.fd() || fd == self.shared.wakeup.as_raw_fd() {
            return Err(Error::ReservedFd(fd));
        }
        Ok(())
    }

    fn handle_fd_event(&mut self, event: &Event) -> Result<(), Interrupt> {
        if event.is_writable() {
            self.write_ready = true;
        }
        if event.is_readable() {
            self.handle_read_ready()?;
        } else if event.is_hangup() || event.is_error() {
            return self.handle_disconnection(true);
        }
        if self.write_ready {
            self.flush()?;
        }
        Ok(())
    }

    fn handle_wakeup_event(&mut self) -> Result<(), Interrupt> {
        self.shared.acknowledge().map_err(Error::Io)?;
        if self.fd.is_none() {
            return Ok(());
        }
        let result = if self.write_ready {
            self.flush()
        } else {
            self.close_if_drained()
        };
        let rearmed = self.rearm_primary();
        result?;
        Ok(rearmed?)
    }

    /// Re-arm the oneshot registration of the primary descriptor. Write
    /// interest is requested whenever output is outstanding, so a flush cut
    /// short by a fault resumes on the next writable event.
    fn rearm_primary(&mut self) -> Result<(), Error> {
        let Some(fd) = self.fd() else {
            return Ok(());
        };
        let want_write = !self.write_ready
            || self.cursor.is_some()
            || self.shared.queue.pending() > 0
            || self.shared.closing.load(Ordering::SeqCst);
        self.registry
            .modify_oneshot(fd, Interest::new(true, want_write))
    }

    // ── Read path ────────────────────────────────────────────────────

    fn handle_read_ready(&mut self) -> Result<(), Interrupt> {
        loop {
            let Some(fd) = self.fd() else {
                return Ok(());
            };
            match read_fd(fd, &mut self.read_buffer) {
                Ok(0) => return self.handle_disconnection(true),
                Ok(n) => {
                    self.bytes_received += n as u64;
                    metrics::BYTES_RECEIVED.add(n as u64);
                    self.handler.on_received_data(&self.read_buffer[..n])?;
                }
                Err(e) => match e.raw_os_error() {
                    Some(libc::EAGAIN) => return Ok(()),
                    Some(libc::EINTR) => continue,
                    // Not readable (e.g. the write end of a pipe).
                    Some(libc::EBADF) | Some(libc::EINVAL) => return Ok(()),
                    _ => {
                        debug!(fd, error = %e, "read failed");
                        return self.handle_disconnection(true);
                    }
                },
            }
        }
    }

    // ── Write path ───────────────────────────────────────────────────

    /// Write queued messages until the queue is empty, the descriptor would
    /// block, or it disconnects.
    fn flush(&mut self) -> Result<(), Interrupt> {
        while self.write_ready {
            let Some(fd) = self.fd() else {
                return Ok(());
            };
            if self.cursor.is_none() {
                match self.shared.queue.pop() {
                    Some(message) => self.cursor = Some(WriteCursor { message, sent: 0 }),
                    None => return self.close_if_drained(),
                }
            }
            let Some(cursor) = self.cursor.as_mut() else {
                return Ok(());
            };

            if !cursor.is_complete() {
                match write_fd(fd, cursor.remaining(), self.is_socket) {
                    Ok(0) => {
                        self.write_ready = false;
                        return Ok(());
                    }
                    Ok(n) => {
                        cursor.sent += n;
                        self.bytes_sent += n as u64;
                        metrics::BYTES_SENT.add(n as u64);
                    }
                    Err(e) => match e.raw_os_error() {
                        Some(libc::EAGAIN) => {
                            trace!(fd, sent = cursor.sent, "write would block");
                            self.write_ready = false;
                            return Ok(());
                        }
                        Some(libc::EINTR) => continue,
                        errno => return self.fail_write(errno.unwrap_or(libc::EIO), e),
                    },
                }
            }

            if let Some(done) = self.cursor.take_if(|c| c.is_complete()) {
                self.msgs_sent += 1;
                metrics::MESSAGES_SENT.increment();
                self.handler
                    .on_write_result(0, &done.message, done.message.len())?;
            }
        }
        Ok(())
    }

    /// Report the in-flight message as failed, then disconnect.
    fn fail_write(&mut self, errno: i32, err: io::Error) -> Result<(), Interrupt> {
        debug!(fd = ?self.fd(), error = %err, "write failed");
        let reported = match self.cursor.take() {
            Some(failed) => {
                metrics::MESSAGES_FAILED.increment();
                self.handler
                    .on_write_result(errno, &failed.message, failed.sent)
            }
            None => Ok(()),
        };
        self.handle_disconnection(true)?;
        Ok(reported?)
    }

    fn close_if_drained(&mut self) -> Result<(), Interrupt> {
        if self.shared.closing.load(Ordering::SeqCst)
            && self.cursor.is_none()
            && self.shared.queue.pending() == 0
        {
            return self.handle_disconnection(false);
        }
        Ok(())
    }

    // ── Disconnection ────────────────────────────────────────────────

    fn handle_disconnection(&mut self, from_peer: bool) -> Result<(), Interrupt> {
        let Some(fd) = self.fd.take() else {
            return Ok(());
        };
        self.disconnected = true;
        self.write_ready = false;
        self.shared.connected.store(false, Ordering::SeqCst);

        let raw = fd.as_raw_fd();
        if let Err(e) = self.registry.remove(raw) {
            debug!(fd = raw, error = %e, "epoll removal failed");
        }
        self.registry.unregister_callback(raw);
        drop(fd);

        let mut undelivered = Vec::new();
        if let Some(cursor) = self.cursor.take() {
            undelivered.push(cursor.message);
        }
        self.shared.queue.drain_into(&mut undelivered);

        metrics::SOURCES_ACTIVE.decrement();
        metrics::MESSAGES_UNDELIVERED.add(undelivered.len() as u64);
        if from_peer {
            metrics::DISCONNECTS_PEER.increment();
        } else {
            metrics::DISCONNECTS_LOCAL.increment();
        }
        debug!(
            fd = raw,
            from_peer,
            undelivered = undelivered.len(),
            "disconnected"
        );

        self.handler
            .on_disconnected(from_peer, undelivered)
            .map_err(Interrupt::Fatal)
    }
}

impl<H> AsRawFd for WriterSource<H> {
    /// The epoll descriptor. Readable whenever [`WriterSource::process_one`]
    /// has work to do.
    fn as_raw_fd(&self) -> RawFd {
        self.registry.as_raw_fd()
    }
}

impl<H> Drop for WriterSource<H> {
    fn drop(&mut self) {
        // Handles outlive the source; make their writes fail from now on.
        self.shared.connected.store(false, Ordering::SeqCst);
        if self.fd.is_some() {
            metrics::SOURCES_ACTIVE.decrement();
        }
    }
}

fn set_nonblocking(fd: RawFd) -> io::Result<()> {
    let flags = unsafe { libc::fcntl(fd, libc::F_GETFL) };
    if flags < 0 {
        return Err(io::Error::last_os_error());
    }
    if flags & libc::O_NONBLOCK != 0 {
        return Ok(());
    }
    let ret = unsafe { libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK) };
    if ret < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

fn read_fd(fd: RawFd, buf: &mut [u8]) -> io::Result<usize> {
    let n = unsafe { libc::read(fd, buf.as_mut_ptr() as *mut libc::c_void, buf.len()) };
    if n < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(n as usize)
}

fn is_socket(fd: RawFd) -> io::Result<bool> {
    let mut stat = std::mem::MaybeUninit::<libc::stat>::uninit();
    let ret = unsafe { libc::fstat(fd, stat.as_mut_ptr()) };
    if ret < 0 {
        return Err(io::Error::last_os_error());
    }
    let stat = unsafe { stat.assume_init() };
    Ok(stat.st_mode & libc::S_IFMT == libc::S_IFSOCK)
}

fn write_fd(fd: RawFd, data: &[u8], is_socket: bool) -> io::Result<usize> {
    let ptr = data.as_ptr() as *const libc::c_void;
    let n = if is_socket {
        unsafe { libc::send(fd, ptr, data.len(), libc::MSG_NOSIGNAL) }
    } else {
        unsafe { libc::write(fd, ptr, data.len()) }
    };
    if n < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(n as usize)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::FnHandler;

    fn noop_handler() -> impl WriterHandler {
        FnHandler::new(
            |_, _| Ok(()),
            |_, _: &Bytes, _| Ok(()),
            |_: &[u8]| Ok(()),
            |_| {},
        )
    }

    #[test]
    fn idle_without_descriptor() {
        let mut source = WriterSource::new(Config::default(), noop_handler()).unwrap();
        assert_eq!(source.fd(), None);
        assert!(!source.can_send_messages());
        assert!(!source.process_one().unwrap());
    }

    #[test]
    fn invalid_config_rejected() {
        let config = Config {
            max_messages: 0,
            ..Config::default()
        };
        assert!(matches!(
            WriterSource::new(config, noop_handler()),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn descriptor_set_once() {
        let (a, b) = std::os::unix::net::UnixStream::pair().unwrap();
        let mut source = WriterSource::new(Config::default(), noop_handler()).unwrap();
        source.set_fd(a).unwrap();
        assert!(source.can_send_messages());
        assert!(matches!(source.set_fd(b), Err(Error::DescriptorAlreadySet)));
    }

    #[test]
    fn reserved_fds_rejected() {
        let (a, _b) = std::os::unix::net::UnixStream::pair().unwrap();
        let mut source = WriterSource::new(Config::default(), noop_handler()).unwrap();
        source.set_fd(a).unwrap();
        let primary = source.fd().unwrap();
        assert!(matches!(
            source.register_fd(primary, Interest::READABLE, |_| Ok(())),
            Err(Error::ReservedFd(_))
        ));
        assert!(matches!(
            source.unregister_fd(primary),
            Err(Error::ReservedFd(_))
        ));
    }

    #[test]
    fn rejected_write_releases_reservation() {
        let source = WriterSource::new(Config::default(), noop_handler()).unwrap();
        assert!(matches!(source.write("x"), Err(WriteError::NotConnected)));
        assert_eq!(source.pending_messages(), 0);
    }

    #[test]
    fn pending_count_includes_reservations() {
        let config = Config {
            max_messages: 1,
            ..Config::default()
        };
        let (local, _peer) = std::os::unix::net::UnixStream::pair().unwrap();
        let mut source = WriterSource::new(config, noop_handler()).unwrap();
        source.set_fd(local).unwrap();
        source.write("a").unwrap();

        // A producer between reserve and backing off from a full queue.
        source.shared.queue.reserve();
        assert_eq!(source.pending_messages(), 2);
        source.shared.queue.cancel();
        assert_eq!(source.pending_messages(), 1);
    }

    #[test]
    fn socket_detection() {
        let (local, _peer) = std::os::unix::net::UnixStream::pair().unwrap();
        assert!(is_socket(local.as_raw_fd()).unwrap());
        let (reader, _writer) = std::io::pipe().unwrap();
        assert!(!is_socket(reader.as_raw_fd()).unwrap());
    }

    #[test]
    fn cursor_tracks_remaining() {
        let mut cursor = WriteCursor {
            message: Bytes::from_static(b"hello"),
            sent: 0,
        };
        assert_eq!(cursor.remaining(), b"hello");
        cursor.sent = 3;
        assert_eq!(cursor.remaining(), b"lo");
        assert!(!cursor.is_complete());
        cursor.sent = 5;
        assert!(cursor.is_complete());
        assert!(cursor.remaining().is_empty());
    }
}
