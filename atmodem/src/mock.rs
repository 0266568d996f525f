//! Scripted device on the other end of an in-memory stream.

use std::{
    io,
    sync::{Mutex, PoisonError},
};

use tokio::io::{duplex, AsyncReadExt, AsyncWriteExt, DuplexStream};

use crate::{helpers::LossyStr, Connector};

pub(crate) fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Streams for the client (reader, writer) and the device driving them.
pub(crate) fn pair() -> (DuplexStream, DuplexStream, MockDevice) {
    let (client_rx, device_tx) = duplex(4096);
    let (client_tx, device_rx) = duplex(4096);
    (
        client_rx,
        client_tx,
        MockDevice {
            tx: device_tx,
            rx: device_rx,
        },
    )
}

pub(crate) struct MockDevice {
    tx: DuplexStream,
    rx: DuplexStream,
}

impl MockDevice {
    /// Assert the next bytes written by the client are `command` + `\r`.
    pub(crate) async fn expect(&mut self, command: &[u8]) {
        let mut expected = command.to_vec();
        expected.push(b'\r');
        self.expect_raw(&expected).await;
    }

    pub(crate) async fn expect_raw(&mut self, bytes: &[u8]) {
        let mut buf = vec![0; bytes.len()];
        self.rx.read_exact(&mut buf).await.unwrap();
        assert_eq!(LossyStr(&buf).to_string(), LossyStr(bytes).to_string());
    }

    /// Next command written by the client, without its terminator.
    pub(crate) async fn read_command(&mut self) -> String {
        let mut command = Vec::new();
        loop {
            let b = self.rx.read_u8().await.unwrap();
            if b == b'\r' {
                break;
            }
            command.push(b);
        }
        String::from_utf8(command).unwrap()
    }

    /// Send each line followed by `\r\n`.
    pub(crate) async fn reply(&mut self, lines: &[&[u8]]) {
        for line in lines {
            self.tx.write_all(line).await.unwrap();
            self.tx.write_all(b"\r\n").await.unwrap();
        }
    }

    pub(crate) async fn send(&mut self, raw: &[u8]) {
        self.tx.write_all(raw).await.unwrap();
    }

    /// Close the device output. The returned stream keeps the client's
    /// writes from failing.
    pub(crate) fn hang_up(self) -> DuplexStream {
        self.rx
    }
}

/// Connector handing out a single prepared stream pair.
pub(crate) struct MockConnector {
    streams: Mutex<Option<(DuplexStream, DuplexStream)>>,
}

impl MockConnector {
    pub(crate) fn new() -> (Self, MockDevice) {
        let (reader, writer, device) = pair();
        (
            Self {
                streams: Mutex::new(Some((reader, writer))),
            },
            device,
        )
    }

    pub(crate) fn unavailable() -> Self {
        Self {
            streams: Mutex::new(None),
        }
    }
}

impl Connector for MockConnector {
    type Reader = DuplexStream;
    type Writer = DuplexStream;

    async fn connect(&self) -> io::Result<(DuplexStream, DuplexStream)> {
        self.streams
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no such device"))
    }
}
