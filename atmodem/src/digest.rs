use crate::{
    config::ERROR_TERMINATOR,
    urc_matcher::{UrcEntry, UrcRegistry},
    Config,
};

/// What a single response line means to the command engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineClass<'a> {
    /// The device repeated the command (`ATE1`)
    Echo,
    /// `ERROR` or a line starting with a registered error prefix
    Error,
    /// First line of an unsolicited notification
    Urc(&'a UrcEntry),
    /// Final result code of the transaction
    Terminator,
    /// Empty line that does not end the transaction
    Blank,
    /// Information response line belonging to the transaction
    Payload,
}

/// Per-transaction context of a classification.
#[derive(Debug, Clone, Copy, Default)]
pub struct Expect<'a> {
    /// The command as sent, while an echo of it may still arrive.
    pub echo: Option<&'a [u8]>,
    /// Prefix of the information response the transaction waits for. A
    /// registered notification with the same prefix is treated as payload.
    pub prefix: Option<&'a [u8]>,
    /// Final result code, when it differs from the configured one.
    pub terminator: Option<&'a [u8]>,
}

/// Classifies complete response lines.
///
/// Checks run in a fixed order: echo, error, notification, terminator, and
/// anything left over is payload. Empty lines terminate the transaction when
/// configured to, and are framing to be skipped otherwise.
///
/// ```
/// use atmodem::{Config, Digester, Expect, LineClass, UrcRegistry};
///
/// let digester = Digester::new(&Config::default(), UrcRegistry::new().with("+CMTI", 1));
///
/// assert_eq!(digester.classify(b"OK", Expect::default()), LineClass::Terminator);
/// assert_eq!(digester.classify(b"+CME ERROR: 10", Expect::default()), LineClass::Error);
/// assert!(matches!(
///     digester.classify(b"+CMTI: \"SM\",1", Expect::default()),
///     LineClass::Urc(_)
/// ));
/// ```
#[derive(Debug, Clone)]
pub struct Digester {
    error_prefixes: Vec<Vec<u8>>,
    registry: UrcRegistry,
    terminator: Vec<u8>,
    blank_line_terminates: bool,
}

impl Digester {
    pub fn new(config: &Config, registry: UrcRegistry) -> Self {
        Self {
            error_prefixes: config.error_prefixes.clone(),
            registry,
            terminator: config.response_terminator.clone(),
            blank_line_terminates: config.blank_line_terminates,
        }
    }

    pub fn registry(&self) -> &UrcRegistry {
        &self.registry
    }

    pub fn is_error(&self, line: &[u8]) -> bool {
        line == ERROR_TERMINATOR
            || self
                .error_prefixes
                .iter()
                .any(|prefix| line.starts_with(prefix))
    }

    pub fn classify<'a>(&'a self, line: &[u8], expect: Expect<'_>) -> LineClass<'a> {
        if expect.echo.is_some_and(|echo| echo == line) {
            return LineClass::Echo;
        }

        if self.is_error(line) {
            return LineClass::Error;
        }

        if let Some(entry) = self.registry.find(line) {
            let expected = expect
                .prefix
                .is_some_and(|prefix| !prefix.is_empty() && line.starts_with(prefix));
            if !expected {
                return LineClass::Urc(entry);
            }
        }

        let terminator = expect.terminator.unwrap_or(&self.terminator);
        if line == terminator {
            return LineClass::Terminator;
        }

        if line.is_empty() {
            return if self.blank_line_terminates {
                LineClass::Terminator
            } else {
                LineClass::Blank
            };
        }

        LineClass::Payload
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn digester() -> Digester {
        Digester::new(
            &Config::default(),
            UrcRegistry::new()
                .with("+CMTI", 1)
                .with("+CMT", 2)
                .with("+CREG", 1)
                .with("RDY", 1),
        )
    }

    #[test]
    fn terminators() {
        let d = digester();
        assert_eq!(d.classify(b"OK", Expect::default()), LineClass::Terminator);
        assert_eq!(d.classify(b"", Expect::default()), LineClass::Terminator);
        assert_eq!(d.classify(b"OK ", Expect::default()), LineClass::Payload);

        let custom = Expect {
            terminator: Some(b"> "),
            ..Expect::default()
        };
        assert_eq!(d.classify(b"> ", custom), LineClass::Terminator);
        assert_eq!(d.classify(b"OK", custom), LineClass::Payload);
    }

    #[test]
    fn blank_line_as_framing() {
        let d = Digester::new(
            &Config::default().blank_line_terminates(false),
            UrcRegistry::new(),
        );
        assert_eq!(d.classify(b"", Expect::default()), LineClass::Blank);
        assert_eq!(d.classify(b"OK", Expect::default()), LineClass::Terminator);
    }

    #[test]
    fn errors_win_over_everything() {
        let d = digester();
        assert_eq!(d.classify(b"ERROR", Expect::default()), LineClass::Error);
        assert_eq!(d.classify(b"+CMS ERROR: 500", Expect::default()), LineClass::Error);
        assert_eq!(d.classify(b"ERRORS", Expect::default()), LineClass::Payload);
        let expect = Expect {
            prefix: Some(b"+CME"),
            ..Expect::default()
        };
        assert_eq!(d.classify(b"+CME ERROR: 3", expect), LineClass::Error);
    }

    #[test]
    fn expected_prefix_is_payload() {
        let d = digester();
        let line = b"+CREG: 0,1";
        assert!(matches!(
            d.classify(line, Expect::default()),
            LineClass::Urc(entry) if entry.prefix() == b"+CREG"
        ));

        let expect = Expect {
            prefix: Some(b"+CREG"),
            ..Expect::default()
        };
        assert_eq!(d.classify(line, expect), LineClass::Payload);
        // Other notifications are still diverted
        assert!(matches!(
            d.classify(b"+CMTI: \"SM\",2", expect),
            LineClass::Urc(_)
        ));
    }

    #[test]
    fn empty_expected_prefix_is_ignored() {
        let d = digester();
        let expect = Expect {
            prefix: Some(b""),
            ..Expect::default()
        };
        assert!(matches!(d.classify(b"RDY", expect), LineClass::Urc(_)));
    }

    #[test]
    fn echo() {
        let d = digester();
        let expect = Expect {
            echo: Some(b"AT+CSQ"),
            ..Expect::default()
        };
        assert_eq!(d.classify(b"AT+CSQ", expect), LineClass::Echo);
        assert_eq!(d.classify(b"AT+CSQ", Expect::default()), LineClass::Payload);
        assert_eq!(d.classify(b"+CSQ: 16,99", expect), LineClass::Payload);
    }
}
