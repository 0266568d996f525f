use std::io;

use atmodem::{
    quectel::{self, SmsCodec, SubmitPdu},
    SerialConnector, Session,
};
use clap::Parser;

/// Serial port options shared by all demos.
#[derive(Debug, Clone, Parser)]
pub struct Args {
    /// Serial device of the modem's AT port
    #[clap(long, env = "ATMODEM_DEVICE", default_value = "/dev/ttyUSB2")]
    pub device: String,
    /// Baud rate of the serial device
    #[clap(long, default_value_t = 115_200)]
    pub baud_rate: u32,
}

impl Args {
    pub fn session(&self) -> Session<SerialConnector> {
        Session::new(
            SerialConnector::new(self.device.as_str(), self.baud_rate),
            quectel::registry(),
            quectel::config(),
        )
    }
}

/// Hands out stored PDUs as raw bytes. Cannot encode.
pub struct RawPdu;

impl SmsCodec for RawPdu {
    type Message = Vec<u8>;
    type Error = io::Error;

    fn encode(&self, _recipient: &str, _text: &str) -> Result<Vec<SubmitPdu>, io::Error> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "PDU encoding is not available in the demos",
        ))
    }

    fn decode(&self, pdu: &[u8]) -> Result<Vec<u8>, io::Error> {
        Ok(pdu.to_vec())
    }
}
