//! Forward stdin lines to a TCP peer through a writer source, printing
//! whatever the peer sends back.
//!
//! ```text
//! cargo run --example stdin_client -- 127.0.0.1:7878
//! ```

use std::io::{self, BufRead};
use std::net::TcpStream;

use bytes::Bytes;
use pollwriter::{Config, FnHandler, WriteError, WriterSource};

fn main() -> Result<(), pollwriter::Error> {
    let addr = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "127.0.0.1:7878".to_string());

    let stream = TcpStream::connect(&addr)?;
    eprintln!("connected to {addr}");

    let handler = FnHandler::new(
        |from_peer, undelivered: Vec<Bytes>| {
            eprintln!(
                "disconnected (from peer: {from_peer}, {} lines unsent)",
                undelivered.len()
            );
            Ok(())
        },
        |error, _written: &Bytes, _size| {
            if error != 0 {
                eprintln!("send failed: {}", io::Error::from_raw_os_error(error));
            }
            Ok(())
        },
        |data: &[u8]| {
            print!("{}", String::from_utf8_lossy(data));
            Ok(())
        },
        |fault| eprintln!("handler fault: {fault}"),
    );

    let mut source = WriterSource::new(Config::default(), handler)?;
    source.set_fd(stream)?;

    let producer = source.handle();
    std::thread::spawn(move || {
        for line in io::stdin().lock().lines() {
            let Ok(mut line) = line else { break };
            line.push('\n');
            let mut msg = Bytes::from(line);
            loop {
                match producer.write(msg) {
                    Ok(()) => break,
                    Err(WriteError::QueueFull(back)) => {
                        msg = back;
                        std::thread::yield_now();
                    }
                    Err(_) => return,
                }
            }
        }
        producer.request_close();
    });

    while source.fd().is_some() {
        source.poll(None)?;
    }
    Ok(())
}
