use bytes::Bytes;

/// A fault returned by a handler callback.
///
/// Faults are captured at the dispatch boundary and reported through
/// [`WriterHandler::on_exception`] instead of stopping the event loop.
pub type Fault = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result type of every fallible handler callback.
pub type HandlerResult = Result<(), Fault>;

/// Callbacks invoked by a [`WriterSource`](crate::WriterSource) on the
/// consumer thread.
///
/// # Example
///
/// ```no_run
/// use bytes::Bytes;
/// use pollwriter::{Fault, HandlerResult, WriterHandler};
///
/// struct Printer;
///
/// impl WriterHandler for Printer {
///     fn on_disconnected(&mut self, from_peer: bool, undelivered: Vec<Bytes>) -> HandlerResult {
///         println!("closed (peer: {from_peer}), {} undelivered", undelivered.len());
///         Ok(())
///     }
///
///     fn on_received_data(&mut self, data: &[u8]) -> HandlerResult {
///         println!("read {} bytes", data.len());
///         Ok(())
///     }
///
///     fn on_exception(&mut self, fault: Fault) {
///         eprintln!("handler fault: {fault}");
///     }
/// }
/// ```
pub trait WriterHandler {
    /// The descriptor was closed, either by the peer (`from_peer`) or after a
    /// requested close drained the queue. `undelivered` lists the messages
    /// that were never confirmed sent, in queue order.
    ///
    /// Called at most once per source. A fault returned here is fatal to the
    /// source.
    fn on_disconnected(&mut self, from_peer: bool, undelivered: Vec<Bytes>) -> HandlerResult;

    /// Outcome of one message. `error` is 0 on success, in which case
    /// `written_size == written.len()`; otherwise it is the errno of the
    /// failed write and `written_size` the bytes actually transferred.
    fn on_write_result(
        &mut self,
        _error: i32,
        _written: &Bytes,
        _written_size: usize,
    ) -> HandlerResult {
        Ok(())
    }

    /// Bytes read from the descriptor.
    fn on_received_data(&mut self, data: &[u8]) -> HandlerResult;

    /// A fault escaped another callback during dispatch.
    fn on_exception(&mut self, fault: Fault);
}

/// A [`WriterHandler`] assembled from four closures.
pub struct FnHandler<D, W, R, E> {
    on_disconnected: D,
    on_write_result: W,
    on_received_data: R,
    on_exception: E,
}

impl<D, W, R, E> FnHandler<D, W, R, E>
where
    D: FnMut(bool, Vec<Bytes>) -> HandlerResult,
    W: FnMut(i32, &Bytes, usize) -> HandlerResult,
    R: FnMut(&[u8]) -> HandlerResult,
    E: FnMut(Fault),
{
    pub fn new(
        on_disconnected: D,
        on_write_result: W,
        on_received_data: R,
        on_exception: E,
    ) -> Self {
        Self {
            on_disconnected,
            on_write_result,
            on_received_data,
            on_exception,
        }
    }
}

impl<D, W, R, E> WriterHandler for FnHandler<D, W, R, E>
where
    D: FnMut(bool, Vec<Bytes>) -> HandlerResult,
    W: FnMut(i32, &Bytes, usize) -> HandlerResult,
    R: FnMut(&[u8]) -> HandlerResult,
    E: FnMut(Fault),
{
    fn on_disconnected(&mut self, from_peer: bool, undelivered: Vec<Bytes>) -> HandlerResult {
        (self.on_disconnected)(from_peer, undelivered)
    }

    fn on_write_result(
        &mut self,
        error: i32,
        written: &Bytes,
        written_size: usize,
    ) -> HandlerResult {
        (self.on_write_result)(error, written, written_size)
    }

    fn on_received_data(&mut self, data: &[u8]) -> HandlerResult {
        (self.on_received_data)(data)
    }

    fn on_exception(&mut self, fault: Fault) {
        (self.on_exception)(fault)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fn_handler_routes_callbacks() {
        let mut disconnects = Vec::new();
        let mut results = Vec::new();
        let mut received = Vec::new();
        let mut faults = Vec::new();

        {
            let mut handler = FnHandler::new(
                |from_peer, msgs: Vec<Bytes>| {
                    disconnects.push((from_peer, msgs.len()));
                    Ok(())
                },
                |error, written: &Bytes, size| {
                    results.push((error, written.clone(), size));
                    Ok(())
                },
                |data: &[u8]| {
                    received.extend_from_slice(data);
                    Err("bad data".into())
                },
                |fault: Fault| faults.push(fault.to_string()),
            );

            handler.on_write_result(0, &Bytes::from_static(b"ab"), 2).unwrap();
            assert!(handler.on_received_data(b"xy").is_err());
            handler.on_exception("oops".into());
            handler.on_disconnected(true, vec![Bytes::from_static(b"z")]).unwrap();
        }

        assert_eq!(results, vec![(0, Bytes::from_static(b"ab"), 2)]);
        assert_eq!(received, b"xy");
        assert_eq!(faults, vec!["oops".to_string()]);
        assert_eq!(disconnects, vec![(true, 1)]);
    }

    #[test]
    fn write_result_defaults_to_noop() {
        struct Minimal;
        impl WriterHandler for Minimal {
            fn on_disconnected(&mut self, _: bool, _: Vec<Bytes>) -> HandlerResult {
                Ok(())
            }
            fn on_received_data(&mut self, _: &[u8]) -> HandlerResult {
                Ok(())
            }
            fn on_exception(&mut self, _: Fault) {}
        }

        assert!(Minimal.on_write_result(32, &Bytes::new(), 0).is_ok());
    }
}
