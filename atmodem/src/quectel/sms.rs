use core::fmt;

use nom::{
    branch::alt,
    bytes::complete::{tag, take_until, take_while},
    character::complete::{digit1, space0},
    combinator::{map_res, opt},
    sequence::{delimited, preceded, tuple},
    IResult,
};

use crate::{helpers::LossyStr, Error};

/// Storage status of a message, as used by `AT+CMGL` and reported by
/// `+CMGL`/`+CMGR`.
#[derive(Debug, Copy, Clone, Hash, PartialEq, Eq)]
pub enum SmsStatus {
    ReceivedUnread = 0,
    ReceivedRead = 1,
    StoredUnsent = 2,
    StoredSent = 3,
    /// Only valid as a listing filter
    All = 4,
}

impl SmsStatus {
    pub fn code(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for SmsStatus {
    type Error = Error;

    fn try_from(code: u8) -> Result<Self, Error> {
        Ok(match code {
            0 => Self::ReceivedUnread,
            1 => Self::ReceivedRead,
            2 => Self::StoredUnsent,
            3 => Self::StoredSent,
            4 => Self::All,
            _ => return Err(Error::InvalidResponse(format!("unknown SMS status {code}"))),
        })
    }
}

/// Which messages `AT+CMGD=0,<flag>` deletes.
#[derive(Debug, Copy, Clone, Hash, PartialEq, Eq)]
pub enum DeleteFlag {
    AllRead = 1,
    ReadAndSent = 2,
    ReadAndUnsent = 3,
    All = 4,
}

impl DeleteFlag {
    pub fn code(self) -> u8 {
        self as u8
    }
}

/// One PDU ready for `AT+CMGS`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitPdu {
    /// Complete PDU, SMSC address included
    pub bytes: Vec<u8>,
    /// Length of the TPDU, i.e. `bytes` without the SMSC address, as
    /// expected by `AT+CMGS=<length>`
    pub tpdu_length: usize,
}

/// SMS PDU encoding and decoding, provided by the application.
pub trait SmsCodec {
    type Message;
    type Error: std::error::Error + Send + Sync + 'static;

    /// Encode `text` for `recipient`, one PDU per message part.
    fn encode(&self, recipient: &str, text: &str) -> Result<Vec<SubmitPdu>, Self::Error>;

    /// Decode a binary PDU as stored on the device.
    fn decode(&self, pdu: &[u8]) -> Result<Self::Message, Self::Error>;
}

/// A message as listed or read from device storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmsRecord {
    pub index: u32,
    pub status: SmsStatus,
    pub alpha: String,
    pub length: usize,
    /// The PDU in hex, as sent by the device
    pub pdu: Vec<u8>,
}

impl SmsRecord {
    /// Decode the PDU with `codec`.
    pub fn decode<C: SmsCodec>(&self, codec: &C) -> Result<C::Message, Error> {
        let pdu = hex::decode(&self.pdu).map_err(|e| {
            Error::InvalidResponse(format!("PDU {:?} is not hex: {}", LossyStr(&self.pdu), e))
        })?;
        codec.decode(&pdu).map_err(|e| Error::Codec(Box::new(e)))
    }
}

impl fmt::Display for SmsRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "SMS(index={}, status={:?}, length={})",
            self.index, self.status, self.length
        )
    }
}

pub(crate) struct Header<'a> {
    pub index: Option<u32>,
    pub status: u8,
    pub alpha: &'a [u8],
    pub length: usize,
}

fn number<T: core::str::FromStr>(input: &[u8]) -> IResult<&[u8], T> {
    map_res(map_res(digit1, core::str::from_utf8), str::parse::<T>)(input)
}

fn comma(input: &[u8]) -> IResult<&[u8], &[u8]> {
    delimited(space0, tag(","), space0)(input)
}

fn alpha(input: &[u8]) -> IResult<&[u8], &[u8]> {
    alt((
        delimited(tag("\""), take_until("\""), tag("\"")),
        take_while(|c| c != b','),
    ))(input)
}

/// `+CMGL: <index>,<stat>,[<alpha>],<length>`
pub(crate) fn cmgl_header(input: &[u8]) -> IResult<&[u8], Header<'_>> {
    let (rest, (index, _, status, _, alpha, _, length)) = preceded(
        tuple((tag("+CMGL:"), space0)),
        tuple((number, comma, number, comma, alpha, comma, number)),
    )(input)?;
    Ok((
        rest,
        Header {
            index: Some(index),
            status,
            alpha,
            length,
        },
    ))
}

/// `+CMGR: <stat>,[<alpha>],<length>`
pub(crate) fn cmgr_header(input: &[u8]) -> IResult<&[u8], Header<'_>> {
    let (rest, (status, _, alpha, _, length)) = preceded(
        tuple((tag("+CMGR:"), space0)),
        tuple((number, comma, alpha, comma, number)),
    )(input)?;
    Ok((
        rest,
        Header {
            index: None,
            status,
            alpha,
            length,
        },
    ))
}

/// `+CMGS: <mr>[,<ackpdu>]`
pub(crate) fn cmgs_reference(input: &[u8]) -> IResult<&[u8], u8> {
    let (rest, (_, _, mr, _)) =
        tuple((tag("+CMGS:"), space0, number, opt(preceded(comma, alpha))))(input)?;
    Ok((rest, mr))
}

pub(crate) fn record(header: Header<'_>, index: u32, pdu: &[u8]) -> Result<SmsRecord, Error> {
    Ok(SmsRecord {
        index: header.index.unwrap_or(index),
        status: SmsStatus::try_from(header.status)?,
        alpha: String::from_utf8_lossy(header.alpha).into_owned(),
        length: header.length,
        pdu: pdu.to_vec(),
    })
}
