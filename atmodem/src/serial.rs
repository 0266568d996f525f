use std::{future::Future, io};

use tokio::io::{split, ReadHalf, WriteHalf};
use tokio_serial::{SerialPortBuilderExt, SerialStream};

use crate::Connector;

/// Opens a serial port, e.g. `/dev/ttyUSB2` at 115200 baud.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerialConnector {
    address: String,
    baud_rate: u32,
}

impl SerialConnector {
    pub fn new(address: impl Into<String>, baud_rate: u32) -> Self {
        Self {
            address: address.into(),
            baud_rate,
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn baud_rate(&self) -> u32 {
        self.baud_rate
    }
}

impl Connector for SerialConnector {
    type Reader = ReadHalf<SerialStream>;
    type Writer = WriteHalf<SerialStream>;

    fn connect(&self) -> impl Future<Output = io::Result<(Self::Reader, Self::Writer)>> + Send {
        let builder = tokio_serial::new(self.address.clone(), self.baud_rate);
        let address = self.address.clone();
        async move {
            let port = builder.open_native_async()?;
            debug!("Opened {}", address);
            Ok(split(port))
        }
    }
}
