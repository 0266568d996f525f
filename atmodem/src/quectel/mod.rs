//! Command layer for Quectel EC25 LTE modules.
//!
//! Built entirely on [`Client::send_command`] and, for message submission,
//! a [`Client::transaction`].

mod sms;

use core::{fmt, time::Duration};

use tokio::io::{AsyncRead, AsyncWrite};

use crate::{
    client::{command_error, SendOptions},
    config::{PAYLOAD_TERMINATOR, PROMPT},
    helpers::LossyStr,
    Client, Command, Config, Error, ExtendedCommand, Response, UrcRegistry,
};

pub use sms::{DeleteFlag, SmsCodec, SmsRecord, SmsStatus, SubmitPdu};

/// Unsolicited result codes of the EC25 with the number of lines each spans.
///
/// Longer prefixes come before shorter ones they start with.
pub const URC_TABLE: &[(&str, usize)] = &[
    ("+CREG", 1),
    ("+CGREG", 1),
    ("+CTZV", 1),
    ("+CTZE", 1),
    ("+CMTI", 1),
    ("+CMT", 2),
    ("^HCMT", 2),
    ("+CBM", 2),
    ("+CDSI", 1),
    ("+CDS", 1),
    ("^HCDS", 2),
    ("+COLP", 1),
    ("+CLIP", 1),
    ("+CRING", 1),
    ("+CCWA", 1),
    ("+CSSI", 1),
    ("+CSSU", 1),
    ("+CUSD", 1),
    ("RDY", 1),
    ("+CFUN", 1),
    ("+CPIN", 1),
    ("+QIND", 1),
    ("POWERED DOWN", 1),
    ("+CGEV", 1),
    ("NO CARRIER", 1),
];

pub const ERROR_PREFIXES: &[&str] = &["+CMS ERROR", "+CME ERROR"];

/// Upper bound of a single `AT+CMGS` submission. The network round trip can
/// take far longer than an ordinary command.
const SUBMIT_TIMEOUT: Duration = Duration::from_secs(60);

/// Notification registry of the EC25.
pub fn registry() -> UrcRegistry {
    URC_TABLE.iter().copied().collect()
}

/// Session configuration for the EC25.
///
/// The module frames every response with empty lines (`ATV1`), so blank
/// lines do not end a transaction.
pub fn config() -> Config {
    Config::default()
        .error_prefixes(ERROR_PREFIXES.iter().copied())
        .blank_line_terminates(false)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductInfo {
    pub manufacturer: String,
    pub model: String,
    pub revision: String,
}

impl fmt::Display for ProductInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.manufacturer, self.model, self.revision)
    }
}

fn text(line: &[u8]) -> String {
    String::from_utf8_lossy(line).into_owned()
}

fn invalid(command: &Command, response: &Response) -> Error {
    Error::InvalidResponse(format!("unexpected answer to {}: {}", command, response))
}

pub struct Ec25<R, W> {
    client: Client<R, W>,
}

impl<R, W> Ec25<R, W>
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    pub fn new(client: Client<R, W>) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &Client<R, W> {
        &self.client
    }

    pub async fn ping(&self) -> Result<(), Error> {
        self.client.send_command(&Command::new("AT")?).await?;
        Ok(())
    }

    /// `ATI`
    pub async fn product_info(&self) -> Result<ProductInfo, Error> {
        let command = Command::new("ATI")?;
        let response = self.client.send_command(&command).await?;
        match response.iter().collect::<Vec<_>>().as_slice() {
            [manufacturer, model, revision, ..] => Ok(ProductInfo {
                manufacturer: text(manufacturer),
                model: text(model),
                revision: text(revision.strip_prefix(b"Revision: ").unwrap_or(revision)),
            }),
            _ => Err(invalid(&command, &response)),
        }
    }

    /// `AT+GSN`
    pub async fn imei(&self) -> Result<String, Error> {
        let command = Command::new("AT+GSN")?;
        let response = self.client.send_command(&command).await?;
        response
            .get(0)
            .map(text)
            .ok_or_else(|| invalid(&command, &response))
    }

    /// `AT+CMGR=<index>`. `None` if the slot is empty.
    pub async fn read_message(&self, index: u32) -> Result<Option<SmsRecord>, Error> {
        let cmgr = ExtendedCommand::new("AT+CMGR")?;
        let command = cmgr.write([index.to_string()])?;
        let response = self
            .client
            .send_command_with(
                &command,
                SendOptions::new().expected_prefix(cmgr.response_prefix()),
            )
            .await?;

        let mut lines = response.iter();
        let Some(header_line) = lines.by_ref().find(|line| line.starts_with(b"+CMGR")) else {
            debug!("Message does not exist at index {}", index);
            return Ok(None);
        };
        let (_, header) =
            sms::cmgr_header(header_line).map_err(|_| invalid(&command, &response))?;
        let pdu = lines.next().ok_or_else(|| invalid(&command, &response))?;
        sms::record(header, index, pdu).map(Some)
    }

    /// `AT+CMGL=<stat>`
    pub async fn list_messages(&self, status: SmsStatus) -> Result<Vec<SmsRecord>, Error> {
        let cmgl = ExtendedCommand::new("AT+CMGL")?;
        let command = cmgl.write([status.code().to_string()])?;
        let response = self
            .client
            .send_command_with(
                &command,
                SendOptions::new().expected_prefix(cmgl.response_prefix()),
            )
            .await?;

        let mut messages = Vec::new();
        let mut lines = response.iter();
        while let Some(line) = lines.next() {
            let Ok((_, header)) = sms::cmgl_header(line) else {
                warn!("Skipping unexpected line {:?}", LossyStr(line));
                continue;
            };
            let pdu = lines.next().ok_or_else(|| invalid(&command, &response))?;
            messages.push(sms::record(header, 0, pdu)?);
        }
        debug!("Listed {} messages", messages.len());
        Ok(messages)
    }

    /// `AT+CMGD=<index>`
    pub async fn delete_message(&self, index: u32) -> Result<(), Error> {
        let command = ExtendedCommand::new("AT+CMGD")?.write([index.to_string()])?;
        self.client.send_command(&command).await?;
        debug!("Deleted message at index {}", index);
        Ok(())
    }

    /// `AT+CMGD=0,<flag>`
    pub async fn delete_messages(&self, flag: DeleteFlag) -> Result<(), Error> {
        let command =
            ExtendedCommand::new("AT+CMGD")?.write(["0".to_string(), flag.code().to_string()])?;
        self.client.send_command(&command).await?;
        debug!("Deleted {:?} messages", flag);
        Ok(())
    }

    /// Submit `text` to `recipient`, returning the message reference of each
    /// part.
    ///
    /// All parts are sent inside one transaction: `AT+CMGS=<length>`, wait
    /// for the `> ` prompt, then the hex PDU terminated by Ctrl-Z. An error
    /// line in place of the prompt fails with [`Error::CommandError`].
    pub async fn send_message<C: SmsCodec>(
        &self,
        codec: &C,
        recipient: &str,
        text: &str,
    ) -> Result<Vec<u8>, Error> {
        let pdus = codec
            .encode(recipient, text)
            .map_err(|e| Error::Codec(Box::new(e)))?;
        let cmgs = ExtendedCommand::new("AT+CMGS")?;
        let prompt_timeout = self.client.config().command_timeout;
        let options = SendOptions::new()
            .expected_prefix(cmgs.response_prefix())
            .timeout(SUBMIT_TIMEOUT);

        let mut references = Vec::with_capacity(pdus.len());
        let mut tx = self.client.transaction().await;
        for pdu in &pdus {
            let command = cmgs.write([pdu.tpdu_length.to_string()])?;
            tx.write(&command)
                .await
                .map_err(|e| command_error(&command, prompt_timeout, e))?;
            tx.read_prompt(&command, PROMPT, prompt_timeout)
                .await
                .map_err(|e| command_error(&command, prompt_timeout, e))?;

            let payload = Command::new(hex::encode_upper(&pdu.bytes))?;
            let response = async {
                tx.write_terminated(&payload, PAYLOAD_TERMINATOR).await?;
                tx.read_response(&payload, &options).await
            }
            .await
            .map_err(|e| command_error(&command, SUBMIT_TIMEOUT, e))?;

            let reference = response
                .iter()
                .find_map(|line| sms::cmgs_reference(line).ok().map(|(_, mr)| mr))
                .ok_or_else(|| invalid(&command, &response))?;
            debug!("Message part sent, reference {}", reference);
            references.push(reference);
        }
        Ok(references)
    }
}

#[cfg(test)]
mod test {
    use tokio::io::DuplexStream;

    use super::*;
    use crate::mock::{self, MockDevice};

    fn ec25() -> (Ec25<DuplexStream, DuplexStream>, MockDevice) {
        mock::init_logger();
        let (reader, writer, device) = mock::pair();
        let client = Client::new(reader, writer, registry(), config());
        (Ec25::new(client), device)
    }

    #[test]
    fn registry_prefers_longer_prefixes() {
        let registry = registry();
        assert_eq!(registry.len(), 25);
        assert_eq!(registry.find(b"+CMTI: \"SM\",1").unwrap().chunk_count(), 1);
        assert_eq!(registry.find(b"+CMT: ,24").unwrap().chunk_count(), 2);
        assert_eq!(registry.find(b"+CDSI: \"SR\",1").unwrap().prefix(), b"+CDSI");
    }

    #[tokio::test]
    async fn product_info_and_imei() {
        let (modem, mut device) = ec25();
        let dev = tokio::spawn(async move {
            device.expect(b"ATI").await;
            device
                .send(b"ATI\r\r\nQuectel\r\nEC25\r\nRevision: EC25AFFAR07A08M4G\r\n\r\nOK\r\n")
                .await;
            device.expect(b"AT+GSN").await;
            device.send(b"\r\n867962041234567\r\n\r\nOK\r\n").await;
            device
        });

        let info = modem.product_info().await.unwrap();
        assert_eq!(info.manufacturer, "Quectel");
        assert_eq!(info.model, "EC25");
        assert_eq!(info.revision, "EC25AFFAR07A08M4G");
        assert_eq!(info.to_string(), "Quectel EC25 EC25AFFAR07A08M4G");
        assert_eq!(modem.imei().await.unwrap(), "867962041234567");
        dev.await.unwrap();
    }

    #[tokio::test]
    async fn list_messages() {
        let (modem, mut device) = ec25();
        let dev = tokio::spawn(async move {
            device.expect(b"AT+CMGL=4").await;
            device
                .reply(&[
                    b"+CMGL: 0,1,,24",
                    b"07911326040000F0040B911346610089F60000208062917314080CC8F71D14969741F977FD07",
                    b"+CMTI: \"SM\",2",
                    b"+CMGL: 1,0,\"Bob\",22",
                    b"0791AB",
                    b"OK",
                ])
                .await;
            device
        });

        let messages = modem.list_messages(SmsStatus::All).await.unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].index, 0);
        assert_eq!(messages[0].status, SmsStatus::ReceivedRead);
        assert_eq!(messages[1].index, 1);
        assert_eq!(messages[1].alpha, "Bob");
        assert_eq!(messages[1].pdu, b"0791AB");
        assert_eq!(modem.client().urc_queue().len(), 1);
        dev.await.unwrap();
    }

    #[tokio::test]
    async fn read_message() {
        let (modem, mut device) = ec25();
        let dev = tokio::spawn(async move {
            device.expect(b"AT+CMGR=3").await;
            device.reply(&[b"+CMGR: 0,,24", b"0791AB", b"OK"]).await;
            device.expect(b"AT+CMGR=4").await;
            device.reply(&[b"OK"]).await;
            device.expect(b"AT+CMGR=99").await;
            device.reply(&[b"+CMS ERROR: 321"]).await;
            device
        });

        let record = modem.read_message(3).await.unwrap().unwrap();
        assert_eq!(record.index, 3);
        assert_eq!(record.status, SmsStatus::ReceivedUnread);
        assert_eq!(record.length, 24);
        assert!(modem.read_message(4).await.unwrap().is_none());
        let err = modem.read_message(99).await.unwrap_err();
        assert_eq!(err.error_code(), Some(321));
        dev.await.unwrap();
    }

    #[tokio::test]
    async fn delete() {
        let (modem, mut device) = ec25();
        let dev = tokio::spawn(async move {
            device.expect(b"AT+CMGD=2").await;
            device.reply(&[b"OK"]).await;
            device.expect(b"AT+CMGD=0,4").await;
            device.reply(&[b"OK"]).await;
            device
        });

        modem.delete_message(2).await.unwrap();
        modem.delete_messages(DeleteFlag::All).await.unwrap();
        dev.await.unwrap();
    }

    struct TwoParts;

    impl SmsCodec for TwoParts {
        type Message = ();
        type Error = std::io::Error;

        fn encode(&self, _: &str, _: &str) -> Result<Vec<SubmitPdu>, Self::Error> {
            Ok(vec![
                SubmitPdu {
                    bytes: vec![0x00, 0x11, 0xab],
                    tpdu_length: 2,
                },
                SubmitPdu {
                    bytes: vec![0x00, 0x22],
                    tpdu_length: 1,
                },
            ])
        }

        fn decode(&self, _: &[u8]) -> Result<(), Self::Error> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn send_message_parts() {
        let (modem, mut device) = ec25();
        let dev = tokio::spawn(async move {
            device.expect(b"AT+CMGS=2").await;
            device.send(b"AT+CMGS=2\r\r\n> ").await;
            device.expect_raw(b"0011AB\x1a").await;
            device.send(b"0011AB\x1a\r\n+CMGS: 41\r\n\r\nOK\r\n").await;
            device.expect(b"AT+CMGS=1").await;
            device.send(b"\r\n> ").await;
            device.expect_raw(b"0022\x1a").await;
            device.reply(&[b"", b"+CMGS: 42", b"", b"OK"]).await;
            device
        });

        let references = modem.send_message(&TwoParts, "+4712345678", "hi").await.unwrap();
        assert_eq!(references, vec![41, 42]);
        dev.await.unwrap();
    }

    #[tokio::test]
    async fn send_message_rejected() {
        let (modem, mut device) = ec25();
        let dev = tokio::spawn(async move {
            device.expect(b"AT+CMGS=2").await;
            device.send(b"\r\n> ").await;
            device.expect_raw(b"0011AB\x1a").await;
            device.reply(&[b"+CMS ERROR: 500"]).await;
            device
        });

        match modem.send_message(&TwoParts, "+4712345678", "hi").await {
            Err(e @ Error::CommandError { .. }) => assert_eq!(e.error_code(), Some(500)),
            other => panic!("unexpected result {other:?}"),
        }
        dev.await.unwrap();
    }

    #[tokio::test]
    async fn send_message_refused_before_prompt() {
        mock::init_logger();
        let (reader, writer, mut device) = mock::pair();
        let config = config().command_timeout(Duration::from_millis(500));
        let modem = Ec25::new(Client::new(reader, writer, registry(), config));
        let dev = tokio::spawn(async move {
            device.expect(b"AT+CMGS=2").await;
            device.reply(&[b"", b"+CMS ERROR: 304"]).await;
            device
        });

        let started = tokio::time::Instant::now();
        match modem.send_message(&TwoParts, "+4712345678", "hi").await {
            Err(e @ Error::CommandError { .. }) => assert_eq!(e.error_code(), Some(304)),
            other => panic!("unexpected result {other:?}"),
        }
        assert!(started.elapsed() < Duration::from_millis(500));
        dev.await.unwrap();
    }
}
