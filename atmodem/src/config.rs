use core::time::Duration;

use crate::Command;

/// Configuration of the transport, the command engine and the background
/// loops of a session.
///
/// ```
/// use atmodem::Config;
/// use core::time::Duration;
///
/// let config = Config::default()
///     .command_timeout(Duration::from_secs(10))
///     .with_error_prefix("+QIURC ERROR");
/// assert_ne!(config, Config::new());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub(crate) cmd_terminator: Vec<u8>,
    pub(crate) line_separator: Vec<u8>,
    pub(crate) response_terminator: Vec<u8>,
    pub(crate) error_prefixes: Vec<Vec<u8>>,
    pub(crate) command_timeout: Duration,
    pub(crate) monitor_timeout: Duration,
    pub(crate) write_timeout: Duration,
    pub(crate) urc_poll_interval: Duration,
    pub(crate) urc_capacity: usize,
    pub(crate) at_echo_enabled: bool,
    pub(crate) blank_line_terminates: bool,
    pub(crate) handshake: Vec<Command>,
}

/// Line terminator appended to every command
pub const CMD_TERMINATOR: &[u8] = b"\r";
/// Separator between response lines
pub const LINE_SEP: &[u8] = b"\r\n";
/// Final result code of a successful command
pub const RESP_TERMINATOR: &[u8] = b"OK";
/// Final result code of a failed command
pub const ERROR_TERMINATOR: &[u8] = b"ERROR";
/// Terminates an SMS payload (Ctrl-Z)
pub const PAYLOAD_TERMINATOR: &[u8] = &[0x1A];
/// Prompt sent by the device when it is ready to receive a payload
pub const PROMPT: &[u8] = b"> ";

impl Default for Config {
    fn default() -> Self {
        Self {
            cmd_terminator: CMD_TERMINATOR.to_vec(),
            line_separator: LINE_SEP.to_vec(),
            response_terminator: RESP_TERMINATOR.to_vec(),
            error_prefixes: vec![b"+CME ERROR".to_vec(), b"+CMS ERROR".to_vec()],
            command_timeout: Duration::from_secs(5),
            monitor_timeout: Duration::from_secs(5),
            write_timeout: Duration::from_secs(1),
            urc_poll_interval: Duration::from_millis(100),
            urc_capacity: 128,
            at_echo_enabled: true,
            blank_line_terminates: true,
            handshake: vec![
                Command { raw: b"AT".to_vec() },
                Command { raw: b"ATE0".to_vec() },
            ],
        }
    }
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn cmd_terminator(mut self, terminator: impl Into<Vec<u8>>) -> Self {
        self.cmd_terminator = terminator.into();
        self
    }

    #[must_use]
    pub fn line_separator(mut self, separator: impl Into<Vec<u8>>) -> Self {
        self.line_separator = separator.into();
        self
    }

    #[must_use]
    pub fn response_terminator(mut self, terminator: impl Into<Vec<u8>>) -> Self {
        self.response_terminator = terminator.into();
        self
    }

    /// Replace the set of error prefixes.
    #[must_use]
    pub fn error_prefixes<I, P>(mut self, prefixes: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<Vec<u8>>,
    {
        self.error_prefixes = prefixes.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn with_error_prefix(mut self, prefix: impl Into<Vec<u8>>) -> Self {
        self.error_prefixes.push(prefix.into());
        self
    }

    /// Upper bound of a whole command transaction.
    #[must_use]
    pub const fn command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }

    /// Upper bound of a single read of the background monitor.
    #[must_use]
    pub const fn monitor_timeout(mut self, timeout: Duration) -> Self {
        self.monitor_timeout = timeout;
        self
    }

    #[must_use]
    pub const fn write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }

    #[must_use]
    pub const fn urc_poll_interval(mut self, interval: Duration) -> Self {
        self.urc_poll_interval = interval;
        self
    }

    /// Number of undelivered notifications kept before the oldest is
    /// dropped.
    #[must_use]
    pub const fn urc_capacity(mut self, capacity: usize) -> Self {
        self.urc_capacity = capacity;
        self
    }

    /// Drop the command echo when the device has echo (`ATE1`) enabled.
    #[must_use]
    pub const fn with_at_echo(mut self, enabled: bool) -> Self {
        self.at_echo_enabled = enabled;
        self
    }

    /// Whether an empty line ends a transaction like the final result code.
    #[must_use]
    pub const fn blank_line_terminates(mut self, enabled: bool) -> Self {
        self.blank_line_terminates = enabled;
        self
    }

    /// Commands sent in order while the session initializes.
    #[must_use]
    pub fn handshake(mut self, commands: Vec<Command>) -> Self {
        self.handshake = commands;
        self
    }
}
