// Copyright (c) The fremtester Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The serial monitor.
//!
//! A dedicated thread owns the serial port for the whole session. It slices
//! the byte stream into lines, parses each line as a token, and pushes every
//! token into an unbounded channel. The runner on the other end correlates
//! tokens with the test currently on the device.
//!
//! The monitor never interprets tokens. It also never gives up on timeouts:
//! a quiet device is normal between tests. Only a real read error (or end of
//! input) stops the thread, at which point the channel disconnects and the
//! runner aborts the run.

use crate::{
    config::SerialConfig,
    errors::SerialError,
    protocol::{self, ResultToken},
};
use crossbeam_channel::Sender;
use std::{
    io,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, Ordering},
    },
    thread::JoinHandle,
};
use tracing::{debug, info, trace, warn};

/// Unterminated data beyond this length is discarded as noise.
const MAX_PENDING: usize = 4096;

/// Owns the serial reader thread.
#[derive(Debug)]
pub struct SerialMonitor {
    handle: Option<JoinHandle<()>>,
    stop: Arc<AtomicBool>,
    error: Arc<Mutex<Option<SerialError>>>,
}

impl SerialMonitor {
    /// Opens the configured serial port and starts the reader thread.
    pub fn connect(
        config: &SerialConfig,
        sender: Sender<ResultToken>,
    ) -> Result<Self, SerialError> {
        let port = serialport::new(config.port.as_str(), config.baud_rate)
            .timeout(config.read_timeout)
            .open()
            .map_err(|err| SerialError::Open {
                port: config.port.clone(),
                err,
            })?;
        info!("listening on {} at {} baud", config.port, config.baud_rate);
        Ok(Self::spawn(port, sender))
    }

    /// Starts a reader thread over an arbitrary byte source.
    ///
    /// Reads that fail with `TimedOut`, `WouldBlock` or `Interrupted` are
    /// retried; this is how the serial port's read timeout surfaces.
    pub fn spawn(source: impl io::Read + Send + 'static, sender: Sender<ResultToken>) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        let error = Arc::new(Mutex::new(None));
        let handle = {
            let stop = Arc::clone(&stop);
            let error = Arc::clone(&error);
            std::thread::Builder::new()
                .name("fremtester-monitor".to_owned())
                .spawn(move || {
                    if let Err(err) = read_loop(source, &sender, &stop) {
                        warn!("serial monitor stopped: {err}");
                        *error.lock().expect("monitor error lock poisoned") = Some(err);
                    }
                    // The sender drops here; a runner still waiting sees the
                    // channel disconnect.
                })
                .expect("failed to spawn serial monitor thread")
        };
        Self {
            handle: Some(handle),
            stop,
            error,
        }
    }

    /// Stops the reader thread and waits for it to wind down.
    ///
    /// Returns the error that stopped the monitor early, if there was one.
    pub fn stop(mut self) -> Result<(), SerialError> {
        self.join_reader();
        match self.error.lock().expect("monitor error lock poisoned").take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn join_reader(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for SerialMonitor {
    fn drop(&mut self) {
        self.join_reader();
    }
}

fn read_loop(
    mut source: impl io::Read,
    sender: &Sender<ResultToken>,
    stop: &AtomicBool,
) -> Result<(), SerialError> {
    let mut pending: Vec<u8> = Vec::with_capacity(256);
    let mut chunk = [0u8; 256];

    while !stop.load(Ordering::Acquire) {
        let n = match source.read(&mut chunk) {
            Ok(0) => return Err(SerialError::Closed),
            Ok(n) => n,
            Err(err)
                if matches!(
                    err.kind(),
                    io::ErrorKind::TimedOut
                        | io::ErrorKind::WouldBlock
                        | io::ErrorKind::Interrupted
                ) =>
            {
                continue;
            }
            Err(err) => return Err(SerialError::Read { err }),
        };
        pending.extend_from_slice(&chunk[..n]);

        while let Some(pos) = pending.iter().position(|&b| b == b'\n') {
            let raw: Vec<u8> = pending.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&raw);
            let line = line.trim_end_matches(['\n', '\r']);
            match protocol::parse_line(line) {
                Some(token) => {
                    debug!("token from device: {}:{:?}", token.test_id, token.kind);
                    if sender.send(token).is_err() {
                        // Receiver is gone; the session is over.
                        return Ok(());
                    }
                }
                None => {
                    if !line.is_empty() {
                        trace!("serial chatter: {line}");
                    }
                }
            }
        }

        // A device streaming forever without a newline is noise, not tokens.
        if pending.len() > MAX_PENDING {
            trace!("discarding {} bytes of unterminated serial data", pending.len());
            pending.clear();
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::TokenKind;
    use crossbeam_channel::{RecvTimeoutError, unbounded};
    use pretty_assertions::assert_eq;
    use std::{collections::VecDeque, time::Duration};

    /// Replays a fixed set of read results, then times out forever.
    struct ScriptReader {
        chunks: VecDeque<Vec<u8>>,
    }

    impl ScriptReader {
        fn new<const N: usize>(chunks: [&str; N]) -> Self {
            Self {
                chunks: chunks.iter().map(|chunk| chunk.as_bytes().to_vec()).collect(),
            }
        }
    }

    impl io::Read for ScriptReader {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match self.chunks.pop_front() {
                Some(chunk) => {
                    buf[..chunk.len()].copy_from_slice(&chunk);
                    Ok(chunk.len())
                }
                None => Err(io::Error::new(io::ErrorKind::TimedOut, "scripted timeout")),
            }
        }
    }

    /// Immediately reports end of input.
    struct ClosedReader;

    impl io::Read for ClosedReader {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            Ok(0)
        }
    }

    /// Immediately fails with a non-timeout error.
    struct BrokenReader;

    impl io::Read for BrokenReader {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::PermissionDenied, "yanked"))
        }
    }

    fn recv_token(receiver: &crossbeam_channel::Receiver<ResultToken>) -> ResultToken {
        receiver
            .recv_timeout(Duration::from_secs(5))
            .expect("token arrives")
    }

    #[test]
    fn tokens_split_across_reads_are_reassembled() {
        let reader = ScriptReader::new([
            "boot banner\r\n^^^FREMTE",
            "STER:id-1:BEGIN^^^\r\n^^^FREMTESTER:id-1:PA",
            "SS^^^\n",
        ]);
        let (sender, receiver) = unbounded();
        let monitor = SerialMonitor::spawn(reader, sender);

        assert_eq!(
            recv_token(&receiver),
            ResultToken {
                test_id: "id-1".to_owned(),
                kind: TokenKind::Begin,
            },
        );
        assert_eq!(
            recv_token(&receiver),
            ResultToken {
                test_id: "id-1".to_owned(),
                kind: TokenKind::Pass,
            },
        );
        monitor.stop().expect("monitor stops cleanly");
    }

    #[test]
    fn chatter_is_not_forwarded() {
        let reader = ScriptReader::new([
            "printf debugging at its finest\n",
            "^^^FREMTESTER:id-2:FAIL^^^\n",
            "more chatter\n",
        ]);
        let (sender, receiver) = unbounded();
        let monitor = SerialMonitor::spawn(reader, sender);

        assert_eq!(
            recv_token(&receiver),
            ResultToken {
                test_id: "id-2".to_owned(),
                kind: TokenKind::Fail,
            },
        );
        monitor.stop().expect("monitor stops cleanly");
    }

    #[test]
    fn read_error_disconnects_the_channel() {
        let (sender, receiver) = unbounded();
        let monitor = SerialMonitor::spawn(BrokenReader, sender);

        assert_eq!(
            receiver.recv_timeout(Duration::from_secs(5)),
            Err(RecvTimeoutError::Disconnected),
        );
        let err = monitor.stop().expect_err("monitor records the error");
        assert!(
            matches!(err, SerialError::Read { .. }),
            "unexpected error: {err:?}"
        );
    }

    #[test]
    fn end_of_input_disconnects_the_channel() {
        let (sender, receiver) = unbounded();
        let monitor = SerialMonitor::spawn(ClosedReader, sender);

        assert_eq!(
            receiver.recv_timeout(Duration::from_secs(5)),
            Err(RecvTimeoutError::Disconnected),
        );
        let err = monitor.stop().expect_err("monitor records the closure");
        assert!(
            matches!(err, SerialError::Closed),
            "unexpected error: {err:?}"
        );
    }

    #[test]
    fn stop_interrupts_an_idle_monitor() {
        let reader = ScriptReader::new([]);
        let (sender, receiver) = unbounded();
        let monitor = SerialMonitor::spawn(reader, sender);

        assert_eq!(
            receiver.recv_timeout(Duration::from_millis(50)),
            Err(RecvTimeoutError::Timeout),
        );
        monitor.stop().expect("idle monitor stops cleanly");
    }
}
