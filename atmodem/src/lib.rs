//! An async AT command engine for GSM/LTE modems.
//!
//! The crate serializes commands on a single serial byte stream, collects the
//! line based responses and separates unsolicited result codes (URCs) from
//! them. While no command is running, a background monitor keeps reading the
//! stream so notifications such as an incoming SMS (`+CMTI`) are never lost,
//! and a delivery loop hands them to a user supplied handler.
//!
//! - [`Transport`]: line reads with a timeout and external cancellation,
//!   flushed writes, independent read and write locks
//! - [`Client`]: the command engine ([`Client::send_command`]) and
//!   multi-step [`Transaction`]s
//! - [`Session`]: connect, handshake, background loops and close
//! - [`quectel`]: a command layer for the Quectel EC25
//!
//! # Examples
//!
//! ```no_run
//! use atmodem::{quectel, Command, SerialConnector, Session, Urc};
//!
//! # async fn run() -> Result<(), atmodem::Error> {
//! let connector = SerialConnector::new("/dev/ttyUSB2", 115_200);
//! let mut session = Session::new(connector, quectel::registry(), quectel::config());
//!
//! session
//!     .register_notification_handler(|urc: Urc| async move {
//!         println!("{}", urc);
//!         Ok::<_, atmodem::HandlerError>(())
//!     })
//!     .await;
//!
//! session.connect().await?;
//! let response = session.send_command(&Command::new("AT+CSQ")?).await?;
//! println!("{}", response);
//! session.close().await;
//! # Ok(())
//! # }
//! ```
//!
//! # Logging
//!
//! All logging goes through the [`log`] facade. Every line received is
//! logged at `trace`, commands sent and notifications at `debug`.

#[macro_use]
extern crate log;

mod client;
mod command;
mod config;
mod digest;
mod error;
mod helpers;
mod monitor;
mod response;
mod session;
mod transport;
mod urc_channel;
mod urc_matcher;

#[cfg(test)]
mod mock;

pub mod quectel;

#[cfg(feature = "serial")]
mod serial;

pub use self::client::{Client, SendOptions, Transaction};
pub use self::command::{Command, ExtendedCommand};
pub use self::config::{
    Config, CMD_TERMINATOR, ERROR_TERMINATOR, LINE_SEP, PAYLOAD_TERMINATOR, PROMPT,
    RESP_TERMINATOR,
};
pub use self::digest::{Digester, Expect, LineClass};
pub use self::error::Error;
pub use self::helpers::LossyStr;
pub use self::response::{Response, Urc};
pub use self::session::{Connector, Session, SessionState};
pub use self::transport::{Transport, Writer, INGRESS_BUF_SIZE};
pub use self::urc_channel::{HandlerError, NotificationHandler, UrcQueue};
pub use self::urc_matcher::{UrcEntry, UrcRegistry};

#[cfg(feature = "serial")]
pub use self::serial::SerialConnector;
