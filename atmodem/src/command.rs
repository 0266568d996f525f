use core::fmt;

use crate::helpers::LossyStr;
use crate::Error;

/// Bytes that may never appear inside a command, as they would end the
/// command line (or an SMS payload) early.
const FORBIDDEN: [u8; 3] = [b'\r', b'\n', 0x1A];

fn validate(raw: &[u8]) -> Result<(), Error> {
    if raw.iter().any(|b| FORBIDDEN.contains(b)) {
        return Err(Error::InvalidCommand(raw.to_vec()));
    }
    Ok(())
}

/// An outbound AT instruction, without its line terminator.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Command {
    pub(crate) raw: Vec<u8>,
}

impl Command {
    /// Create a command from its raw bytes, e.g. `b"ATI"`.
    ///
    /// Fails with [`Error::InvalidCommand`] if the bytes contain a carriage
    /// return, a line feed or Ctrl-Z.
    pub fn new(raw: impl Into<Vec<u8>>) -> Result<Self, Error> {
        let raw = raw.into();
        validate(&raw)?;
        Ok(Self { raw })
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.raw
    }

    pub fn len(&self) -> usize {
        self.raw.len()
    }

    pub fn is_empty(&self) -> bool {
        self.raw.is_empty()
    }
}

impl AsRef<[u8]> for Command {
    fn as_ref(&self) -> &[u8] {
        &self.raw
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", LossyStr(&self.raw))
    }
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Command({:?})", LossyStr(&self.raw))
    }
}

/// An extended AT command family such as `AT+CMGL`, from which the test,
/// read, write and execute syntax variants are derived.
///
/// ```
/// use atmodem::ExtendedCommand;
///
/// let cmgl = ExtendedCommand::new("AT+CMGL").unwrap();
/// assert_eq!(cmgl.test().as_bytes(), b"AT+CMGL=?");
/// assert_eq!(cmgl.read().as_bytes(), b"AT+CMGL?");
/// assert_eq!(cmgl.write(["4"]).unwrap().as_bytes(), b"AT+CMGL=4");
/// assert_eq!(cmgl.execute().as_bytes(), b"AT+CMGL");
/// assert_eq!(cmgl.response_prefix(), b"+CMGL");
/// ```
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct ExtendedCommand {
    base: Vec<u8>,
}

impl ExtendedCommand {
    pub fn new(base: impl Into<Vec<u8>>) -> Result<Self, Error> {
        let base = base.into();
        validate(&base)?;
        Ok(Self { base })
    }

    /// `<base>=?`
    pub fn test(&self) -> Command {
        self.derive(b"=?")
    }

    /// `<base>?`
    pub fn read(&self) -> Command {
        self.derive(b"?")
    }

    /// `<base>=<arg>,<arg>,...`
    pub fn write<I, A>(&self, args: I) -> Result<Command, Error>
    where
        I: IntoIterator<Item = A>,
        A: AsRef<[u8]>,
    {
        let mut raw = self.base.clone();
        raw.push(b'=');
        for (i, arg) in args.into_iter().enumerate() {
            if i > 0 {
                raw.push(b',');
            }
            raw.extend_from_slice(arg.as_ref());
        }
        Command::new(raw)
    }

    /// `<base>`
    pub fn execute(&self) -> Command {
        self.derive(b"")
    }

    /// The prefix the device uses for information responses to this command,
    /// i.e. the mnemonic without the leading `AT`.
    pub fn response_prefix(&self) -> &[u8] {
        self.base
            .strip_prefix(b"AT")
            .or_else(|| self.base.strip_prefix(b"at"))
            .unwrap_or(self.base.as_slice())
    }

    fn derive(&self, suffix: &[u8]) -> Command {
        let mut raw = Vec::with_capacity(self.base.len() + suffix.len());
        raw.extend_from_slice(&self.base);
        raw.extend_from_slice(suffix);
        Command { raw }
    }
}

impl fmt::Debug for ExtendedCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ExtendedCommand({:?})", LossyStr(&self.base))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn rejects_terminators() {
        assert!(matches!(
            Command::new("AT\r"),
            Err(Error::InvalidCommand(raw)) if raw == b"AT\r"
        ));
        assert!(Command::new(b"AT\nI".to_vec()).is_err());
        assert!(Command::new(vec![b'A', 0x1A]).is_err());
        assert!(ExtendedCommand::new("AT+CMGS\r").is_err());
    }

    #[test]
    fn write_args() {
        let cmgd = ExtendedCommand::new("AT+CMGD").unwrap();
        assert_eq!(cmgd.write(["0", "4"]).unwrap().as_bytes(), b"AT+CMGD=0,4");
        assert_eq!(
            cmgd.write([b"1".as_slice()]).unwrap().as_bytes(),
            b"AT+CMGD=1"
        );
        assert!(cmgd.write(["1\r"]).is_err());
        assert_eq!(cmgd.write(Vec::<&str>::new()).unwrap().as_bytes(), b"AT+CMGD=");
    }

    #[test]
    fn derived_forms_are_new_values() {
        let creg = ExtendedCommand::new("AT+CREG").unwrap();
        let read = creg.read();
        let test = creg.test();
        assert_ne!(read, test);
        assert_eq!(creg.execute(), Command::new("AT+CREG").unwrap());
        assert_eq!(creg.response_prefix(), b"+CREG");
    }

    #[test]
    fn display() {
        let cmd = Command::new("AT+CMGR=3").unwrap();
        assert_eq!(cmd.to_string(), "AT+CMGR=3");
        assert_eq!(format!("{cmd:?}"), "Command(\"AT+CMGR=3\")");
        assert_eq!(cmd.len(), 9);
        assert!(!cmd.is_empty());
    }
}
