use core::fmt;
use core::ops::Index;

use crate::helpers::LossyStr;

/// The substantive lines collected for one command transaction.
///
/// Never contains the final result code (`OK`), the command echo or lines
/// that were diverted as unsolicited notifications.
///
/// A `Response` compares equal to a plain sequence of lines, which keeps
/// assertions short:
///
/// ```
/// use atmodem::Response;
///
/// let response = Response::new(vec![b"Quectel".to_vec(), b"EC25".to_vec()]);
/// assert_eq!(response, [b"Quectel".as_slice(), b"EC25"]);
/// assert_eq!(&response[1], b"EC25");
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Response {
    chunks: Vec<Vec<u8>>,
}

impl Response {
    pub fn new(chunks: Vec<Vec<u8>>) -> Self {
        Self { chunks }
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &[u8]> {
        self.chunks.iter().map(Vec::as_slice)
    }

    pub fn get(&self, index: usize) -> Option<&[u8]> {
        self.chunks.get(index).map(Vec::as_slice)
    }

    /// First line starting with `prefix`, if any.
    pub fn find(&self, prefix: &[u8]) -> Option<&[u8]> {
        self.iter().find(|chunk| chunk.starts_with(prefix))
    }

    pub fn into_chunks(self) -> Vec<Vec<u8>> {
        self.chunks
    }
}

fn lines_eq<T: AsRef<[u8]>>(chunks: &[Vec<u8>], other: &[T]) -> bool {
    chunks.len() == other.len()
        && chunks
            .iter()
            .zip(other)
            .all(|(a, b)| a.as_slice() == b.as_ref())
}

impl<T: AsRef<[u8]>> PartialEq<[T]> for Response {
    fn eq(&self, other: &[T]) -> bool {
        lines_eq(&self.chunks, other)
    }
}

impl<T: AsRef<[u8]>> PartialEq<&[T]> for Response {
    fn eq(&self, other: &&[T]) -> bool {
        lines_eq(&self.chunks, other)
    }
}

impl<T: AsRef<[u8]>, const N: usize> PartialEq<[T; N]> for Response {
    fn eq(&self, other: &[T; N]) -> bool {
        lines_eq(&self.chunks, other)
    }
}

impl<T: AsRef<[u8]>> PartialEq<Vec<T>> for Response {
    fn eq(&self, other: &Vec<T>) -> bool {
        lines_eq(&self.chunks, other)
    }
}

impl Index<usize> for Response {
    type Output = [u8];

    fn index(&self, index: usize) -> &[u8] {
        &self.chunks[index]
    }
}

impl IntoIterator for Response {
    type Item = Vec<u8>;
    type IntoIter = std::vec::IntoIter<Vec<u8>>;

    fn into_iter(self) -> Self::IntoIter {
        self.chunks.into_iter()
    }
}

impl<'a> IntoIterator for &'a Response {
    type Item = &'a Vec<u8>;
    type IntoIter = core::slice::Iter<'a, Vec<u8>>;

    fn into_iter(self) -> Self::IntoIter {
        self.chunks.iter()
    }
}

fn fmt_chunks(f: &mut fmt::Formatter<'_>, chunks: &[Vec<u8>]) -> fmt::Result {
    for (i, chunk) in chunks.iter().enumerate() {
        if i > 0 {
            f.write_str(" | ")?;
        }
        write!(f, "{}", LossyStr(chunk))?;
    }
    Ok(())
}

impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Response(")?;
        fmt_chunks(f, &self.chunks)?;
        f.write_str(")")
    }
}

/// An unsolicited result code: a notification the device sent on its own,
/// made up of the line carrying the registered prefix plus the lines that
/// belong to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Urc {
    code: Vec<u8>,
    chunks: Vec<Vec<u8>>,
}

impl Urc {
    pub(crate) fn new(code: Vec<u8>, chunks: Vec<Vec<u8>>) -> Self {
        Self { code, chunks }
    }

    /// The registered prefix that matched, e.g. `+CMTI`.
    pub fn code(&self) -> &[u8] {
        &self.code
    }

    pub fn chunks(&self) -> &[Vec<u8>] {
        &self.chunks
    }

    /// The first line with the prefix and the `": "` separator removed.
    ///
    /// `+CMTI: "SM",3` yields `"SM",3`.
    pub fn payload(&self) -> &[u8] {
        let first = self.chunks.first().map_or(&[][..], Vec::as_slice);
        let rest = first.strip_prefix(self.code.as_slice()).unwrap_or(first);
        let rest = rest.strip_prefix(b":").unwrap_or(rest);
        rest.strip_prefix(b" ").unwrap_or(rest)
    }
}

impl fmt::Display for Urc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Urc[{}](", LossyStr(&self.code))?;
        fmt_chunks(f, &self.chunks)?;
        f.write_str(")")
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn response(lines: &[&[u8]]) -> Response {
        Response::new(lines.iter().map(|l| l.to_vec()).collect())
    }

    #[test]
    fn equality_against_lines() {
        let r = response(&[b"+CSQ: 16,99"]);
        assert_eq!(r, [b"+CSQ: 16,99"]);
        assert_eq!(r, vec![b"+CSQ: 16,99".to_vec()]);
        assert_eq!(r, &[b"+CSQ: 16,99".as_slice()][..]);
        assert_ne!(r, [b"+CSQ: 16,98"]);
        assert_ne!(r, [b"+CSQ: 16,99".as_slice(), b"OK"]);
        assert_eq!(Response::default(), Vec::<Vec<u8>>::new());
        assert_eq!(r, response(&[b"+CSQ: 16,99"]));
    }

    #[test]
    fn indexing_and_iteration() {
        let r = response(&[b"+COPN: \"00101\"", b"+COPN: \"00102\""]);
        assert_eq!(r.len(), 2);
        assert!(!r.is_empty());
        assert_eq!(&r[0], b"+COPN: \"00101\"");
        assert_eq!(r.get(2), None);
        assert_eq!(r.iter().count(), 2);
        assert_eq!((&r).into_iter().count(), 2);
        assert_eq!(r.find(b"+COPN"), Some(&b"+COPN: \"00101\""[..]));
        assert_eq!(r.into_iter().last(), Some(b"+COPN: \"00102\"".to_vec()));
    }

    #[test]
    fn display() {
        let r = response(&[b"Quectel", b"EC25"]);
        assert_eq!(r.to_string(), "Response(Quectel | EC25)");

        let urc = Urc::new(b"+CMT".to_vec(), vec![b"+CMT: ,24".to_vec(), b"0791".to_vec()]);
        assert_eq!(urc.to_string(), "Urc[+CMT](+CMT: ,24 | 0791)");
    }

    #[test]
    fn urc_payload() {
        let urc = Urc::new(b"+CMTI".to_vec(), vec![b"+CMTI: \"SM\",3".to_vec()]);
        assert_eq!(urc.payload(), b"\"SM\",3");
        assert_eq!(urc.code(), b"+CMTI");
        assert_eq!(urc.chunks().len(), 1);

        let rdy = Urc::new(b"RDY".to_vec(), vec![b"RDY".to_vec()]);
        assert_eq!(rdy.payload(), b"");
    }
}
