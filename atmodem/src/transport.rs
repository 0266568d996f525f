use core::time::Duration;

use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt},
    sync::{watch, Mutex, MutexGuard},
    time::timeout,
};

use crate::{
    helpers::{LossyStr, SliceExt},
    Error,
};

/// Size of the ingress buffer. A line that does not fit together with its
/// separator fails the read with [`Error::Overflow`], so with `\r\n` the
/// longest line is `INGRESS_BUF_SIZE - 2` bytes.
pub const INGRESS_BUF_SIZE: usize = 2048;

const READ_CHUNK: usize = 64;

/// Buffered reader splitting the byte stream at a separator.
///
/// Bytes are pulled from the stream in small chunks and kept in a fixed size
/// buffer until a complete line is available. Dropping a pending
/// `read_until` loses no data: bytes already received stay buffered for the
/// next call.
pub(crate) struct LineReader<R> {
    inner: R,
    buf: heapless::Vec<u8, INGRESS_BUF_SIZE>,
}

impl<R: AsyncRead + Unpin> LineReader<R> {
    pub(crate) fn new(inner: R) -> Self {
        Self {
            inner,
            buf: heapless::Vec::new(),
        }
    }

    /// Next line up to whichever of `seps` comes first, with the separator
    /// removed, and the index of the separator that ended it.
    ///
    /// `Ok(None)` signals a clean end of stream at a line boundary.
    pub(crate) async fn read_until(
        &mut self,
        seps: &[&[u8]],
    ) -> Result<Option<(Vec<u8>, usize)>, Error> {
        loop {
            let first = seps
                .iter()
                .enumerate()
                .filter_map(|(i, sep)| self.buf.as_slice().find(sep).map(|pos| (pos, i)))
                .min();
            if let Some((pos, i)) = first {
                let line = self.buf[..pos].to_vec();
                self.consume(pos + seps[i].len());
                return Ok(Some((line, i)));
            }

            if self.buf.is_full() {
                self.buf.clear();
                return Err(Error::Overflow(INGRESS_BUF_SIZE));
            }

            let room = (INGRESS_BUF_SIZE - self.buf.len()).min(READ_CHUNK);
            let mut chunk = [0u8; READ_CHUNK];
            let n = self
                .inner
                .read(&mut chunk[..room])
                .await
                .map_err(Error::Read)?;

            if n == 0 {
                if self.buf.is_empty() {
                    return Ok(None);
                }
                warn!(
                    "Stream closed with {} unterminated bytes: {:?}",
                    self.buf.len(),
                    LossyStr(&self.buf)
                );
                self.buf.clear();
                return Err(Error::StreamClosed);
            }

            self.buf
                .extend_from_slice(&chunk[..n])
                .map_err(|_| Error::Overflow(INGRESS_BUF_SIZE))?;
        }
    }

    fn consume(&mut self, amt: usize) {
        let amt = amt.min(self.buf.len());
        self.buf.rotate_left(amt);
        self.buf.truncate(self.buf.len() - amt);
    }
}

/// Exclusive access to the write half of the stream.
///
/// Obtained from [`Transport::lock_writer`]; holding it is holding the write
/// lock.
pub struct Writer<'a, W> {
    guard: MutexGuard<'a, W>,
    timeout: Duration,
}

impl<W: AsyncWrite + Unpin> Writer<'_, W> {
    /// Write `bytes` followed by `terminator` and wait until both are
    /// flushed.
    pub async fn write(&mut self, bytes: &[u8], terminator: &[u8]) -> Result<(), Error> {
        if bytes.len() < 50 {
            debug!("Sending command: {:?}", LossyStr(bytes));
        } else {
            debug!("Sending command with long payload ({} bytes)", bytes.len());
        }

        let writer = &mut *self.guard;
        let t = self.timeout;
        timeout(t, async {
            writer.write_all(bytes).await?;
            writer.write_all(terminator).await?;
            writer.flush().await
        })
        .await
        .map_err(|_| Error::WriteTimeout(t))?
        .map_err(Error::Write)
    }
}

/// The shared byte stream, with independent read and write locks.
///
/// Reads are bounded by a timeout and can be cancelled from the outside with
/// [`Transport::cancel_read`]; at most one read is outstanding at a time.
pub struct Transport<R, W> {
    reader: Mutex<LineReader<R>>,
    writer: Mutex<W>,
    cancel: watch::Sender<u64>,
    write_timeout: Duration,
}

impl<R, W> Transport<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    pub fn new(reader: R, writer: W, write_timeout: Duration) -> Self {
        let (cancel, _) = watch::channel(0);
        Self {
            reader: Mutex::new(LineReader::new(reader)),
            writer: Mutex::new(writer),
            cancel,
            write_timeout,
        }
    }

    /// Read one line delimited by `sep`.
    ///
    /// The separator and any carriage returns left before it are stripped.
    /// Returns `Ok(None)` on a clean end of stream, [`Error::ReadTimeout`] if
    /// no line completes within `t`, and [`Error::Aborted`] if
    /// [`Transport::cancel_read`] is called meanwhile.
    pub async fn read_line(&self, sep: &[u8], t: Duration) -> Result<Option<Vec<u8>>, Error> {
        Ok(self
            .read_line_any(&[sep], t)
            .await?
            .map(|(line, _)| line))
    }

    /// Like [`Transport::read_line`], ending the line at whichever of `seps`
    /// arrives first. Also returns the index of that separator.
    pub async fn read_line_any(
        &self,
        seps: &[&[u8]],
        t: Duration,
    ) -> Result<Option<(Vec<u8>, usize)>, Error> {
        let mut cancelled = self.cancel.subscribe();

        let read = async {
            let mut reader = self.reader.lock().await;
            reader.read_until(seps).await
        };

        let line = tokio::select! {
            biased;
            _ = cancelled.changed() => return Err(Error::Aborted),
            res = timeout(t, read) => res.unwrap_or(Err(Error::ReadTimeout(t)))?,
        };

        Ok(line.map(|(line, i)| {
            let trimmed = line.trim_end_matches(b"\r");
            trace!("Received line: {:?}", LossyStr(trimmed));
            (trimmed.to_vec(), i)
        }))
    }

    /// Cancel the outstanding read, if any, and wait until it has released
    /// the read lock.
    pub async fn cancel_read(&self) {
        self.cancel.send_modify(|generation| *generation = generation.wrapping_add(1));
        drop(self.reader.lock().await);
    }

    /// Acquire the write lock.
    pub async fn lock_writer(&self) -> Writer<'_, W> {
        Writer {
            guard: self.writer.lock().await,
            timeout: self.write_timeout,
        }
    }

    pub fn is_reading(&self) -> bool {
        self.reader.try_lock().is_err()
    }

    pub fn is_writing(&self) -> bool {
        self.writer.try_lock().is_err()
    }

    /// Flush and close the write half.
    pub async fn shutdown(&self) -> Result<(), Error> {
        let mut writer = self.writer.lock().await;
        timeout(self.write_timeout, writer.shutdown())
            .await
            .map_err(|_| Error::WriteTimeout(self.write_timeout))?
            .map_err(Error::Write)
    }
}

#[cfg(test)]
mod test {
    use std::sync::Arc;

    use tokio::io::{duplex, AsyncWriteExt, DuplexStream};

    use super::*;

    const T: Duration = Duration::from_millis(200);

    fn transport() -> (Transport<DuplexStream, DuplexStream>, DuplexStream, DuplexStream) {
        let (rx, dev_tx) = duplex(4096);
        let (tx, dev_rx) = duplex(4096);
        (Transport::new(rx, tx, T), dev_tx, dev_rx)
    }

    #[tokio::test]
    async fn reads_lines() {
        let (t, mut dev, _dev_rx) = transport();
        dev.write_all(b"Quectel\r\nEC25\r\nATI\r\r\n").await.unwrap();

        assert_eq!(t.read_line(b"\r\n", T).await.unwrap(), Some(b"Quectel".to_vec()));
        assert_eq!(t.read_line(b"\r\n", T).await.unwrap(), Some(b"EC25".to_vec()));
        // A trailing carriage return of an echoed command is stripped
        assert_eq!(t.read_line(b"\r\n", T).await.unwrap(), Some(b"ATI".to_vec()));
    }

    #[tokio::test]
    async fn custom_separator() {
        let (t, mut dev, _dev_rx) = transport();
        dev.write_all(b"\r\n> ").await.unwrap();
        assert_eq!(t.read_line(b"> ", T).await.unwrap(), Some(b"\r\n".to_vec()));
    }

    #[tokio::test]
    async fn custom_separator_is_stripped_as_suffix() {
        let (t, mut dev, _dev_rx) = transport();
        dev.write_all(b"x>> a > \r\n").await.unwrap();
        assert_eq!(t.read_line(b"> ", T).await.unwrap(), Some(b"x>".to_vec()));
        assert_eq!(t.read_line(b"> ", T).await.unwrap(), Some(b"a ".to_vec()));
        assert_eq!(t.read_line(b"\r\n", T).await.unwrap(), Some(b"".to_vec()));
    }

    #[tokio::test]
    async fn first_of_several_separators() {
        let (t, mut dev, _dev_rx) = transport();
        dev.write_all(b"\r\n+CMS ERROR: 304\r\n> ").await.unwrap();
        let seps: &[&[u8]] = &[b"\r\n", b"> "];

        assert_eq!(t.read_line_any(seps, T).await.unwrap(), Some((b"".to_vec(), 0)));
        assert_eq!(
            t.read_line_any(seps, T).await.unwrap(),
            Some((b"+CMS ERROR: 304".to_vec(), 0))
        );
        assert_eq!(t.read_line_any(seps, T).await.unwrap(), Some((b"".to_vec(), 1)));
    }

    #[tokio::test]
    async fn longest_line_fits_with_separator() {
        let (t, mut dev, _dev_rx) = transport();
        let line = vec![b'A'; INGRESS_BUF_SIZE - 2];
        let expected = line.clone();
        tokio::spawn(async move {
            dev.write_all(&line).await.unwrap();
            dev.write_all(b"\r\n").await.unwrap();
            dev
        });
        assert_eq!(t.read_line(b"\r\n", T).await.unwrap(), Some(expected));
    }

    #[tokio::test]
    async fn timeout_keeps_partial_line() {
        let (t, mut dev, _dev_rx) = transport();
        dev.write_all(b"+CSQ: ").await.unwrap();
        assert!(matches!(
            t.read_line(b"\r\n", T).await,
            Err(Error::ReadTimeout(d)) if d == T
        ));

        dev.write_all(b"16,99\r\n").await.unwrap();
        assert_eq!(
            t.read_line(b"\r\n", T).await.unwrap(),
            Some(b"+CSQ: 16,99".to_vec())
        );
    }

    #[tokio::test]
    async fn eof() {
        let (t, mut dev, _dev_rx) = transport();
        dev.write_all(b"OK\r\nRD").await.unwrap();
        drop(dev);

        assert_eq!(t.read_line(b"\r\n", T).await.unwrap(), Some(b"OK".to_vec()));
        assert!(matches!(t.read_line(b"\r\n", T).await, Err(Error::StreamClosed)));
        assert_eq!(t.read_line(b"\r\n", T).await.unwrap(), None);
    }

    #[tokio::test]
    async fn overflow_clears_buffer() {
        let (t, mut dev, _dev_rx) = transport();
        let long = vec![b'A'; INGRESS_BUF_SIZE + 10];
        tokio::spawn(async move {
            dev.write_all(&long).await.unwrap();
            dev.write_all(b"\r\nOK\r\n").await.unwrap();
            dev
        });

        assert!(matches!(
            t.read_line(b"\r\n", T).await,
            Err(Error::Overflow(INGRESS_BUF_SIZE))
        ));
        // The tail of the oversized line is read as its own line
        assert_eq!(t.read_line(b"\r\n", T).await.unwrap(), Some(vec![b'A'; 10]));
        assert_eq!(t.read_line(b"\r\n", T).await.unwrap(), Some(b"OK".to_vec()));
    }

    #[tokio::test]
    async fn cancel_outstanding_read() {
        let (t, mut dev, _dev_rx) = transport();
        let t = Arc::new(t);

        let pending = tokio::spawn({
            let t = t.clone();
            async move { t.read_line(b"\r\n", Duration::from_secs(10)).await }
        });
        while !t.is_reading() {
            tokio::task::yield_now().await;
        }

        t.cancel_read().await;
        assert!(!t.is_reading());
        assert!(matches!(pending.await.unwrap(), Err(Error::Aborted)));

        // Idempotent, and later reads are unaffected
        t.cancel_read().await;
        dev.write_all(b"OK\r\n").await.unwrap();
        assert_eq!(t.read_line(b"\r\n", T).await.unwrap(), Some(b"OK".to_vec()));
    }

    #[tokio::test]
    async fn write_appends_terminator() {
        let (t, _dev, mut dev_rx) = transport();
        {
            let mut writer = t.lock_writer().await;
            assert!(t.is_writing());
            writer.write(b"AT+CMGF=0", b"\r").await.unwrap();
        }
        assert!(!t.is_writing());

        let mut buf = [0u8; 10];
        dev_rx.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"AT+CMGF=0\r");
    }
}
