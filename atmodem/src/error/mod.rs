use core::time::Duration;
use std::io;

use nom::{
    bytes::complete::{tag, take_until},
    character::complete::{digit1, space0},
    combinator::map_res,
    IResult,
};

use crate::helpers::LossyStr;

/// Errors returned by the crate
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The transport could not be opened
    #[error("failed to open transport")]
    Connect(#[source] io::Error),
    /// The modem did not complete the initialization handshake
    #[error("modem did not answer handshake command {command}")]
    Handshake {
        command: String,
        #[source]
        source: Box<Error>,
    },
    /// No complete line arrived within the read bound
    #[error("read timed out after {0:?}")]
    ReadTimeout(Duration),
    /// A whole command transaction did not complete within its bound
    #[error("command {command} timed out after {timeout:?}")]
    CommandTimeout { command: String, timeout: Duration },
    /// The device answered with an error line
    #[error("command {command} returned error {:?}", LossyStr(.line))]
    CommandError { command: String, line: Vec<u8> },
    /// A transaction failed for an unanticipated reason
    #[error("command {command} failed")]
    CommandFailed {
        command: String,
        #[source]
        source: Box<Error>,
    },
    /// End of stream while a line was expected
    #[error("stream closed in the middle of a line")]
    StreamClosed,
    /// Serial read error
    #[error("serial read error")]
    Read(#[source] io::Error),
    /// Serial write error
    #[error("serial write error")]
    Write(#[source] io::Error),
    /// Writing or flushing did not complete within the write bound
    #[error("write timed out after {0:?}")]
    WriteTimeout(Duration),
    /// A single line exceeded the ingress buffer
    #[error("line exceeds the ingress buffer of {0} bytes")]
    Overflow(usize),
    /// The read was cancelled before a line completed
    #[error("read was aborted")]
    Aborted,
    /// Command bytes contain a terminator
    #[error("invalid command {:?}", LossyStr(.0))]
    InvalidCommand(Vec<u8>),
    /// The session is not in the `Ready` state
    #[error("modem is not connected")]
    NotConnected,
    /// The device answered with something the command layer cannot interpret
    #[error("invalid response: {0}")]
    InvalidResponse(String),
    /// Message encoding or decoding failed
    #[error("message codec error")]
    Codec(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl Error {
    /// Numeric code of a `+CME ERROR: <n>` / `+CMS ERROR: <n>` style error
    /// line, if this is a [`Error::CommandError`] carrying one.
    ///
    /// Verbose error reports (`AT+CMEE=2`) and the bare `ERROR` literal have
    /// no code.
    pub fn error_code(&self) -> Option<u16> {
        match self {
            Self::CommandError { line, .. } => match error_code(line) {
                Ok((rest, code)) if rest.is_empty() => Some(code),
                _ => None,
            },
            _ => None,
        }
    }

    /// Whether this error means the session could not be established.
    pub fn is_connection_fault(&self) -> bool {
        matches!(self, Self::Connect(_) | Self::Handshake { .. })
    }
}

fn error_code(input: &[u8]) -> IResult<&[u8], u16> {
    let (input, _) = take_until(&b":"[..])(input)?;
    let (input, _) = tag(&b":"[..])(input)?;
    let (input, _) = space0(input)?;
    let (input, code) = map_res(map_res(digit1, core::str::from_utf8), |s: &str| {
        s.parse::<u16>()
    })(input)?;
    let (input, _) = space0(input)?;
    Ok((input, code))
}

#[cfg(test)]
mod test {
    use super::*;

    fn command_error(line: &[u8]) -> Error {
        Error::CommandError {
            command: "AT+CMGR=3".into(),
            line: line.to_vec(),
        }
    }

    #[test]
    fn cme_code() {
        assert_eq!(command_error(b"+CME ERROR: 50").error_code(), Some(50));
        assert_eq!(command_error(b"+CMS ERROR: 500 ").error_code(), Some(500));
    }

    #[test]
    fn no_code() {
        assert_eq!(command_error(b"ERROR").error_code(), None);
        assert_eq!(
            command_error(b"+CME ERROR: SIM not inserted").error_code(),
            None
        );
        assert_eq!(Error::StreamClosed.error_code(), None);
    }

    #[test]
    fn display() {
        assert_eq!(
            command_error(b"+CME ERROR: 50").to_string(),
            "command AT+CMGR=3 returned error \"+CME ERROR: 50\""
        );
        assert!(Error::Connect(io::ErrorKind::NotFound.into()).is_connection_fault());
        assert!(!Error::Aborted.is_connection_fault());
    }
}
