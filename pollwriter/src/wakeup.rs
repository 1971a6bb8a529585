use std::io;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};

/// An eventfd used by producer threads to interrupt the consumer's epoll wait.
///
/// Signals are coalesced by the kernel: any number of `signal` calls before
/// a `drain` produce a single readable event.
pub struct Wakeup {
    fd: OwnedFd,
}

impl Wakeup {
    pub fn new() -> io::Result<Self> {
        let fd = unsafe { libc::eventfd(0, libc::EFD_NONBLOCK | libc::EFD_CLOEXEC) };
        if fd < 0 {
            return Err(io::Error::last_os_error());
        }
        // Safety: eventfd returned a fresh descriptor that nothing else owns.
        let fd = unsafe { OwnedFd::from_raw_fd(fd) };
        Ok(Wakeup { fd })
    }

    /// Make the eventfd readable. Never blocks.
    pub fn signal(&self) -> io::Result<()> {
        let val: u64 = 1;
        let ret = unsafe {
            libc::write(
                self.fd.as_raw_fd(),
                &val as *const u64 as *const libc::c_void,
                8,
            )
        };
        if ret < 0 {
            let err = io::Error::last_os_error();
            // Counter saturated: it is readable already.
            if err.kind() == io::ErrorKind::WouldBlock {
                return Ok(());
            }
            return Err(err);
        }
        Ok(())
    }

    /// Reset the counter. Returns the number of signals coalesced since the
    /// last drain (0 if none).
    pub fn drain(&self) -> io::Result<u64> {
        let mut val: u64 = 0;
        let ret = unsafe {
            libc::read(
                self.fd.as_raw_fd(),
                &mut val as *mut u64 as *mut libc::c_void,
                8,
            )
        };
        if ret < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::WouldBlock {
                return Ok(0);
            }
            return Err(err);
        }
        Ok(val)
    }
}

impl AsRawFd for Wakeup {
    fn as_raw_fd(&self) -> RawFd {
        self.fd.as_raw_fd()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signals_coalesce() {
        let wakeup = Wakeup::new().unwrap();
        assert_eq!(wakeup.drain().unwrap(), 0);

        wakeup.signal().unwrap();
        wakeup.signal().unwrap();
        wakeup.signal().unwrap();
        assert_eq!(wakeup.drain().unwrap(), 3);
        assert_eq!(wakeup.drain().unwrap(), 0);
    }

    #[test]
    fn signal_from_another_thread() {
        let wakeup = std::sync::Arc::new(Wakeup::new().unwrap());
        let remote = wakeup.clone();
        std::thread::spawn(move || remote.signal().unwrap())
            .join()
            .unwrap();
        assert_eq!(wakeup.drain().unwrap(), 1);
    }
}
