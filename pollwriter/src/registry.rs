use std::collections::HashMap;
use std::fmt;
use std::io;
use std::ops::BitOr;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use std::time::Duration;

use crate::error::Error;

/// Readiness interest for a registered descriptor.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Interest(u32);

impl Interest {
    /// No readiness interest. Keeps the descriptor registered but silent
    /// (apart from `EPOLLHUP`/`EPOLLERR`, which epoll always reports).
    pub const NONE: Interest = Interest(0);
    pub const READABLE: Interest = Interest(libc::EPOLLIN as u32);
    pub const WRITABLE: Interest = Interest(libc::EPOLLOUT as u32);

    pub fn new(readable: bool, writable: bool) -> Self {
        let mut interest = Interest::NONE;
        if readable {
            interest = interest | Interest::READABLE;
        }
        if writable {
            interest = interest | Interest::WRITABLE;
        }
        interest
    }

    pub fn is_readable(self) -> bool {
        self.0 & Interest::READABLE.0 != 0
    }

    pub fn is_writable(self) -> bool {
        self.0 & Interest::WRITABLE.0 != 0
    }
}

impl BitOr for Interest {
    type Output = Interest;

    fn bitor(self, rhs: Interest) -> Interest {
        Interest(self.0 | rhs.0)
    }
}

impl fmt::Debug for Interest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Interest")
            .field("readable", &self.is_readable())
            .field("writable", &self.is_writable())
            .finish()
    }
}

/// A readiness event reported by epoll for one descriptor.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Event {
    fd: RawFd,
    events: u32,
}

impl Event {
    /// The descriptor this event was reported for.
    pub fn fd(&self) -> RawFd {
        self.fd
    }

    /// Raw `EPOLL*` bits.
    pub fn raw(&self) -> u32 {
        self.events
    }

    pub fn is_readable(&self) -> bool {
        self.events & libc::EPOLLIN as u32 != 0
    }

    pub fn is_writable(&self) -> bool {
        self.events & libc::EPOLLOUT as u32 != 0
    }

    /// `EPOLLHUP` or `EPOLLRDHUP`.
    pub fn is_hangup(&self) -> bool {
        self.events & (libc::EPOLLHUP | libc::EPOLLRDHUP) as u32 != 0
    }

    pub fn is_error(&self) -> bool {
        self.events & libc::EPOLLERR as u32 != 0
    }
}

impl fmt::Debug for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Event")
            .field("fd", &self.fd)
            .field("readable", &self.is_readable())
            .field("writable", &self.is_writable())
            .field("hangup", &self.is_hangup())
            .field("error", &self.is_error())
            .finish()
    }
}

/// An epoll instance plus a descriptor → callback map.
///
/// The registry tracks two things per descriptor, independently: whether it
/// is added to epoll (with which interest) and which callback handles its
/// events. At most one of each exists per descriptor. The epoll fd is owned
/// and closed when the registry is dropped, which also drops every
/// registration.
pub struct Registry<C> {
    epoll: OwnedFd,
    interests: HashMap<RawFd, Interest>,
    callbacks: HashMap<RawFd, C>,
    raw_events: Vec<libc::epoll_event>,
}

impl<C> Registry<C> {
    /// Create an epoll instance retrieving at most `max_events` events per
    /// [`wait`](Registry::wait).
    pub fn new(max_events: usize) -> io::Result<Self> {
        let fd = unsafe { libc::epoll_create1(libc::EPOLL_CLOEXEC) };
        if fd < 0 {
            return Err(io::Error::last_os_error());
        }
        // Safety: epoll_create1 returned a fresh descriptor that nothing else owns.
        let epoll = unsafe { OwnedFd::from_raw_fd(fd) };
        Ok(Registry {
            epoll,
            interests: HashMap::new(),
            callbacks: HashMap::new(),
            raw_events: vec![libc::epoll_event { events: 0, u64: 0 }; max_events.max(1)],
        })
    }

    /// Add `fd` to epoll. Fails with [`Error::AlreadyRegistered`] if it was
    /// already added; use [`modify`](Registry::modify) for that.
    pub fn add(&mut self, fd: RawFd, interest: Interest) -> Result<(), Error> {
        self.update(fd, interest, false, false)
    }

    /// Same as [`add`](Registry::add), with `EPOLLONESHOT`: the descriptor is
    /// disarmed after one event and must be re-armed with
    /// [`modify_oneshot`](Registry::modify_oneshot).
    pub fn add_oneshot(&mut self, fd: RawFd, interest: Interest) -> Result<(), Error> {
        self.update(fd, interest, false, true)
    }

    /// Change the interest of an already added descriptor.
    pub fn modify(&mut self, fd: RawFd, interest: Interest) -> Result<(), Error> {
        self.update(fd, interest, true, false)
    }

    /// Change the interest of an already added descriptor and re-arm it in
    /// oneshot mode.
    pub fn modify_oneshot(&mut self, fd: RawFd, interest: Interest) -> Result<(), Error> {
        self.update(fd, interest, true, true)
    }

    fn update(
        &mut self,
        fd: RawFd,
        interest: Interest,
        modify: bool,
        oneshot: bool,
    ) -> Result<(), Error> {
        let known = self.interests.contains_key(&fd);
        if modify && !known {
            return Err(Error::NotRegistered(fd));
        }
        if !modify && known {
            return Err(Error::AlreadyRegistered(fd));
        }

        let mut flags = interest.0;
        if oneshot {
            flags |= libc::EPOLLONESHOT as u32;
        }
        let mut event = libc::epoll_event {
            events: flags,
            u64: fd as u64,
        };
        let op = if modify {
            libc::EPOLL_CTL_MOD
        } else {
            libc::EPOLL_CTL_ADD
        };
        let ret = unsafe { libc::epoll_ctl(self.epoll.as_raw_fd(), op, fd, &mut event) };
        if ret < 0 {
            return Err(Error::Io(io::Error::last_os_error()));
        }
        self.interests.insert(fd, interest);
        Ok(())
    }

    /// Remove `fd` from epoll. Its callback, if any, stays registered.
    pub fn remove(&mut self, fd: RawFd) -> Result<(), Error> {
        if self.interests.remove(&fd).is_none() {
            return Err(Error::NotRegistered(fd));
        }
        let ret = unsafe {
            libc::epoll_ctl(
                self.epoll.as_raw_fd(),
                libc::EPOLL_CTL_DEL,
                fd,
                std::ptr::null_mut(),
            )
        };
        if ret < 0 {
            return Err(Error::Io(io::Error::last_os_error()));
        }
        Ok(())
    }

    /// Associate `callback` with `fd`. At most one callback per descriptor.
    pub fn register_callback(&mut self, fd: RawFd, callback: C) -> Result<(), Error> {
        if self.callbacks.contains_key(&fd) {
            return Err(Error::AlreadyRegistered(fd));
        }
        self.callbacks.insert(fd, callback);
        Ok(())
    }

    /// Disassociate the callback from `fd`, returning it.
    pub fn unregister_callback(&mut self, fd: RawFd) -> Option<C> {
        self.callbacks.remove(&fd)
    }

    pub fn callback_mut(&mut self, fd: RawFd) -> Option<&mut C> {
        self.callbacks.get_mut(&fd)
    }

    /// Whether `fd` is currently added to epoll.
    pub fn contains(&self, fd: RawFd) -> bool {
        self.interests.contains_key(&fd)
    }

    /// Number of descriptors added to epoll.
    pub fn len(&self) -> usize {
        self.interests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.interests.is_empty()
    }

    /// Wait for readiness and append the ready events to `out`. `None`
    /// blocks until an event arrives. Returns the number of events appended.
    ///
    /// The batch is bounded by both `max_events` and the number of added
    /// descriptors.
    pub fn wait(&mut self, out: &mut Vec<Event>, timeout: Option<Duration>) -> io::Result<usize> {
        let batch = self.raw_events.len().min(self.interests.len().max(1));
        let timeout_ms = match timeout {
            None => -1,
            Some(d) => d.as_millis().min(i32::MAX as u128) as i32,
        };
        let n = unsafe {
            libc::epoll_wait(
                self.epoll.as_raw_fd(),
                self.raw_events.as_mut_ptr(),
                batch as i32,
                timeout_ms,
            )
        };
        if n < 0 {
            return Err(io::Error::last_os_error());
        }
        let n = n as usize;
        out.extend(self.raw_events[..n].iter().map(|raw| Event {
            fd: raw.u64 as RawFd,
            events: raw.events,
        }));
        Ok(n)
    }
}

impl<C> AsRawFd for Registry<C> {
    fn as_raw_fd(&self) -> RawFd {
        self.epoll.as_raw_fd()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::os::unix::net::UnixStream;

    fn pair() -> (UnixStream, UnixStream) {
        let (a, b) = UnixStream::pair().unwrap();
        a.set_nonblocking(true).unwrap();
        b.set_nonblocking(true).unwrap();
        (a, b)
    }

    fn poll_once(registry: &mut Registry<&'static str>) -> Vec<Event> {
        let mut events = Vec::new();
        registry
            .wait(&mut events, Some(Duration::from_millis(50)))
            .unwrap();
        events
    }

    #[test]
    fn add_twice_is_rejected() {
        let (a, _b) = pair();
        let mut registry: Registry<&'static str> = Registry::new(8).unwrap();
        registry.add(a.as_raw_fd(), Interest::READABLE).unwrap();
        assert!(matches!(
            registry.add(a.as_raw_fd(), Interest::READABLE),
            Err(Error::AlreadyRegistered(_))
        ));
        registry.modify(a.as_raw_fd(), Interest::WRITABLE).unwrap();
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn modify_and_remove_require_registration() {
        let (a, _b) = pair();
        let mut registry: Registry<&'static str> = Registry::new(8).unwrap();
        let fd = a.as_raw_fd();
        assert!(matches!(
            registry.modify(fd, Interest::READABLE),
            Err(Error::NotRegistered(_))
        ));
        assert!(matches!(registry.remove(fd), Err(Error::NotRegistered(_))));

        registry.add(fd, Interest::READABLE).unwrap();
        registry.remove(fd).unwrap();
        assert!(!registry.contains(fd));
        assert!(registry.is_empty());
    }

    #[test]
    fn one_callback_per_fd() {
        let mut registry: Registry<&'static str> = Registry::new(8).unwrap();
        registry.register_callback(7, "first").unwrap();
        assert!(matches!(
            registry.register_callback(7, "second"),
            Err(Error::AlreadyRegistered(7))
        ));
        assert_eq!(registry.callback_mut(7).map(|c| *c), Some("first"));
        assert_eq!(registry.unregister_callback(7), Some("first"));
        assert_eq!(registry.unregister_callback(7), None);
    }

    #[test]
    fn readable_event_is_reported() {
        let (a, mut b) = pair();
        let mut registry: Registry<&'static str> = Registry::new(8).unwrap();
        registry.add(a.as_raw_fd(), Interest::READABLE).unwrap();

        assert!(poll_once(&mut registry).is_empty());

        b.write_all(b"ping").unwrap();
        let events = poll_once(&mut registry);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].fd(), a.as_raw_fd());
        assert!(events[0].is_readable());
        assert!(!events[0].is_writable());
    }

    #[test]
    fn oneshot_disarms_until_modified() {
        let (a, _b) = pair();
        let mut registry: Registry<&'static str> = Registry::new(8).unwrap();
        let fd = a.as_raw_fd();
        registry.add_oneshot(fd, Interest::WRITABLE).unwrap();

        let events = poll_once(&mut registry);
        assert_eq!(events.len(), 1);
        assert!(events[0].is_writable());

        // Still writable, but disarmed.
        assert!(poll_once(&mut registry).is_empty());

        registry.modify_oneshot(fd, Interest::WRITABLE).unwrap();
        assert_eq!(poll_once(&mut registry).len(), 1);
    }

    #[test]
    fn interest_flags() {
        let both = Interest::READABLE | Interest::WRITABLE;
        assert!(both.is_readable() && both.is_writable());
        assert_eq!(Interest::new(true, false), Interest::READABLE);
        assert_eq!(Interest::new(false, false), Interest::NONE);
    }
}
