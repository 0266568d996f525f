use core::time::Duration;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex, PoisonError,
};

use tokio::{
    io::{AsyncRead, AsyncWrite},
    runtime::Handle,
    sync::watch,
    task::JoinHandle,
    time::{timeout_at, Instant},
};

use crate::{
    digest::{Digester, Expect, LineClass},
    helpers::LossyStr,
    monitor,
    transport::{Transport, Writer},
    urc_channel::UrcQueue,
    urc_matcher::{UrcEntry, UrcRegistry},
    Command, Config, Error, Response, Urc,
};

/// Per-call overrides for [`Client::send_command_with`].
///
/// ```
/// use atmodem::SendOptions;
/// use core::time::Duration;
///
/// let options = SendOptions::new()
///     .expected_prefix(b"+CREG")
///     .timeout(Duration::from_secs(1));
/// # let _ = options;
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct SendOptions<'a> {
    pub(crate) terminator: Option<&'a [u8]>,
    pub(crate) separator: Option<&'a [u8]>,
    pub(crate) timeout: Option<Duration>,
    pub(crate) expected_prefix: Option<&'a [u8]>,
}

impl<'a> SendOptions<'a> {
    pub const fn new() -> Self {
        Self {
            terminator: None,
            separator: None,
            timeout: None,
            expected_prefix: None,
        }
    }

    /// Final result code ending the transaction, instead of `OK`.
    #[must_use]
    pub const fn terminator(mut self, terminator: &'a [u8]) -> Self {
        self.terminator = Some(terminator);
        self
    }

    #[must_use]
    pub const fn separator(mut self, separator: &'a [u8]) -> Self {
        self.separator = Some(separator);
        self
    }

    /// Bound of the whole transaction, write lock acquisition included.
    #[must_use]
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Information response prefix of the command. Lines starting with it
    /// are kept as response even when a notification with the same prefix
    /// is registered (`+CREG`, `+CGREG`).
    #[must_use]
    pub const fn expected_prefix(mut self, prefix: &'a [u8]) -> Self {
        self.expected_prefix = Some(prefix);
        self
    }
}

/// A notification whose first line has been read but not all of the lines
/// following it.
#[derive(Debug)]
pub(crate) struct PartialUrc {
    entry: UrcEntry,
    chunks: Vec<Vec<u8>>,
}

impl PartialUrc {
    pub(crate) fn new(entry: &UrcEntry, first: Vec<u8>) -> Self {
        let mut chunks = Vec::with_capacity(entry.chunk_count());
        chunks.push(first);
        Self {
            entry: entry.clone(),
            chunks,
        }
    }

    pub(crate) fn push(&mut self, line: Vec<u8>) {
        self.chunks.push(line);
    }

    pub(crate) fn is_complete(&self) -> bool {
        self.chunks.len() >= self.entry.chunk_count()
    }

    pub(crate) fn into_urc(self) -> Urc {
        let urc = Urc::new(self.entry.prefix().to_vec(), self.chunks);
        debug!("Received URC: {}", urc);
        urc
    }
}

pub(crate) struct Inner<R, W> {
    pub(crate) transport: Transport<R, W>,
    pub(crate) digester: Digester,
    pub(crate) config: Config,
    pub(crate) queue: Arc<UrcQueue>,
    monitor_enabled: AtomicBool,
    monitor: Mutex<Option<JoinHandle<()>>>,
    monitor_stop: watch::Sender<u64>,
    /// Left behind by a monitor stopped in the middle of a notification.
    partial_urc: Mutex<Option<PartialUrc>>,
}

impl<R, W> Inner<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    /// Read the lines following the first line of a notification.
    pub(crate) async fn read_urc(
        &self,
        mut urc: PartialUrc,
        separator: &[u8],
        timeout: Duration,
    ) -> Result<Urc, Error> {
        while !urc.is_complete() {
            match self.transport.read_line(separator, timeout).await? {
                Some(line) => urc.push(line),
                None => return Err(Error::StreamClosed),
            }
        }
        Ok(urc.into_urc())
    }

    pub(crate) fn take_partial_urc(&self) -> Option<PartialUrc> {
        self.partial_urc
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    pub(crate) fn set_partial_urc(&self, urc: PartialUrc) {
        trace!("Parking partial URC {:?}", LossyStr(urc.entry.prefix()));
        *self
            .partial_urc
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(urc);
    }

    fn take_monitor(&self) -> Option<JoinHandle<()>> {
        self.monitor
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }
}

impl<R, W> Drop for Inner<R, W> {
    fn drop(&mut self) {
        if let Some(handle) = self
            .monitor
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            handle.abort();
        }
    }
}

/// The command engine.
///
/// Owns the transport and serializes command transactions on it. While no
/// transaction is running, a background monitor task (once started with
/// [`Client::start_monitor`]) keeps reading the stream and moves unsolicited
/// notifications into the [`UrcQueue`].
///
/// Cloning a client is cheap; all clones share the same transport.
pub struct Client<R, W> {
    inner: Arc<Inner<R, W>>,
}

impl<R, W> Clone for Client<R, W> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<R, W> Client<R, W>
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    pub fn new(reader: R, writer: W, registry: UrcRegistry, config: Config) -> Self {
        Self {
            inner: Arc::new(Inner {
                transport: Transport::new(reader, writer, config.write_timeout),
                digester: Digester::new(&config, registry),
                queue: Arc::new(UrcQueue::new(config.urc_capacity)),
                config,
                monitor_enabled: AtomicBool::new(false),
                monitor: Mutex::new(None),
                monitor_stop: watch::channel(0).0,
                partial_urc: Mutex::new(None),
            }),
        }
    }

    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// Notifications captured so far and not yet delivered.
    pub fn urc_queue(&self) -> &Arc<UrcQueue> {
        &self.inner.queue
    }

    /// Send a command and collect its response, using the configured
    /// defaults.
    pub async fn send_command(&self, command: &Command) -> Result<Response, Error> {
        self.send_command_with(command, SendOptions::new()).await
    }

    /// Send a command and collect its response.
    ///
    /// The monitor is paused while the transaction holds the write lock and
    /// resumed when it releases it, on every exit path. Errors:
    ///
    /// - [`Error::CommandError`] if the device answered with an error line
    /// - [`Error::CommandTimeout`] if the transaction did not complete in
    ///   time; lines already received are discarded
    /// - [`Error::CommandFailed`] for any other fault
    pub async fn send_command_with(
        &self,
        command: &Command,
        options: SendOptions<'_>,
    ) -> Result<Response, Error> {
        let t = options.timeout.unwrap_or(self.inner.config.command_timeout);
        let deadline = Instant::now() + t;

        let result = timeout_at(deadline, async {
            let mut tx = self.transaction().await;
            tx.write(command).await?;
            tx.read_response_until(command, &options, deadline).await
        })
        .await;

        match result {
            Ok(Ok(response)) => {
                trace!("{} -> {}", command, response);
                Ok(response)
            }
            Ok(Err(e)) => Err(command_error(command, t, e)),
            Err(_) => Err(command_error(command, t, Error::ReadTimeout(t))),
        }
    }

    /// Take the write lock for a multi-step exchange.
    ///
    /// Pauses the monitor and cancels any outstanding read. Everything done
    /// through the returned [`Transaction`] is atomic with respect to other
    /// commands; dropping it releases the lock and resumes the monitor.
    ///
    /// A notification the monitor was in the middle of reading is completed
    /// by the first lines the transaction classifies.
    pub async fn transaction(&self) -> Transaction<'_, R, W> {
        let writer = self.inner.transport.lock_writer().await;
        let mut tx = Transaction {
            writer,
            resume: ResumeMonitor {
                client: self,
                partial_urc: None,
            },
        };
        self.pause_monitor().await;
        self.inner.transport.cancel_read().await;
        tx.resume.partial_urc = self.inner.take_partial_urc();
        tx
    }

    /// Start the background monitor. Does nothing when it is already running.
    pub fn start_monitor(&self) {
        self.inner.monitor_enabled.store(true, Ordering::SeqCst);
        self.spawn_monitor();
    }

    /// Stop the background monitor and wait until it has exited.
    pub async fn stop_monitor(&self) {
        self.inner.monitor_enabled.store(false, Ordering::SeqCst);
        self.pause_monitor().await;
    }

    pub fn is_monitor_running(&self) -> bool {
        self.inner
            .monitor
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Close the write half of the transport.
    pub async fn shutdown(&self) -> Result<(), Error> {
        self.inner.transport.shutdown().await
    }

    /// Signal the monitor to stop and wait for it. A monitor in the middle of
    /// a notification parks what it has read in `partial_urc`.
    async fn pause_monitor(&self) {
        if let Some(handle) = self.inner.take_monitor() {
            self.inner
                .monitor_stop
                .send_modify(|generation| *generation = generation.wrapping_add(1));
            if let Err(e) = handle.await {
                if !e.is_cancelled() {
                    error!("Monitor task failed: {}", e);
                }
            }
        }
    }

    fn spawn_monitor(&self) {
        if !self.inner.monitor_enabled.load(Ordering::SeqCst) {
            return;
        }
        let Ok(runtime) = Handle::try_current() else {
            warn!("No tokio runtime, monitor not started");
            return;
        };

        let mut slot = self
            .inner
            .monitor
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if slot.as_ref().is_some_and(|handle| !handle.is_finished()) {
            return;
        }
        let stop = self.inner.monitor_stop.subscribe();
        *slot = Some(runtime.spawn(monitor::run(Arc::downgrade(&self.inner), stop)));
    }
}

/// Map a fault raised inside a transaction to the error reported for
/// `command`.
pub(crate) fn command_error(command: &Command, timeout: Duration, e: Error) -> Error {
    match e {
        Error::ReadTimeout(_) => {
            warn!("Command {} timed out after {:?}", command, timeout);
            Error::CommandTimeout {
                command: command.to_string(),
                timeout,
            }
        }
        e @ (Error::CommandError { .. }
        | Error::CommandTimeout { .. }
        | Error::CommandFailed { .. }) => {
            debug!("{}", e);
            e
        }
        e => {
            error!("Failed to send command {}: {}", command, e);
            Error::CommandFailed {
                command: command.to_string(),
                source: Box::new(e),
            }
        }
    }
}

/// Resumes the monitor when dropped, handing back a notification that is
/// still incomplete. Declared after the writer in [`Transaction`] so the
/// write lock is released first.
struct ResumeMonitor<'a, R, W>
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    client: &'a Client<R, W>,
    partial_urc: Option<PartialUrc>,
}

impl<R, W> Drop for ResumeMonitor<'_, R, W>
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    fn drop(&mut self) {
        if let Some(urc) = self.partial_urc.take() {
            self.client.inner.set_partial_urc(urc);
        }
        self.client.spawn_monitor();
    }
}

/// Exclusive use of the transport for one exchange with the device.
///
/// Obtained from [`Client::transaction`]. Errors are returned unmapped, as
/// the transport produced them.
pub struct Transaction<'a, R, W>
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    writer: Writer<'a, W>,
    resume: ResumeMonitor<'a, R, W>,
}

impl<'a, R, W> Transaction<'a, R, W>
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    fn inner(&self) -> &'a Inner<R, W> {
        &self.resume.client.inner
    }

    /// Write a command followed by the configured command terminator.
    pub async fn write(&mut self, command: &Command) -> Result<(), Error> {
        let terminator = &self.inner().config.cmd_terminator;
        self.writer.write(command.as_bytes(), terminator).await
    }

    /// Write a command followed by `terminator`, e.g. Ctrl-Z after an SMS
    /// PDU.
    pub async fn write_terminated(
        &mut self,
        command: &Command,
        terminator: &[u8],
    ) -> Result<(), Error> {
        self.writer.write(command.as_bytes(), terminator).await
    }

    /// Read one raw line, without any classification.
    pub async fn read_line(
        &mut self,
        separator: Option<&[u8]>,
        timeout: Duration,
    ) -> Result<Option<Vec<u8>>, Error> {
        let inner = self.inner();
        let separator = separator.unwrap_or(&inner.config.line_separator);
        inner.transport.read_line(separator, timeout).await
    }

    /// Wait for `prompt`, e.g. the `> ` of `AT+CMGS`.
    ///
    /// Complete lines arriving before the prompt are classified: an error
    /// line fails with [`Error::CommandError`], notifications are queued and
    /// anything else is skipped.
    pub async fn read_prompt(
        &mut self,
        command: &Command,
        prompt: &[u8],
        timeout: Duration,
    ) -> Result<(), Error> {
        let inner = self.inner();
        let deadline = Instant::now() + timeout;
        let separator = inner.config.line_separator.as_slice();

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(Error::ReadTimeout(timeout));
            }

            let Some((line, i)) = inner
                .transport
                .read_line_any(&[separator, prompt], remaining)
                .await?
            else {
                return Err(Error::StreamClosed);
            };
            if i == 1 {
                trace!("Received prompt {:?}", LossyStr(prompt));
                return Ok(());
            }

            let expect = Expect {
                echo: Some(command.as_bytes()),
                ..Expect::default()
            };
            match inner.digester.classify(&line, expect) {
                LineClass::Error => {
                    return Err(Error::CommandError {
                        command: command.to_string(),
                        line,
                    });
                }
                LineClass::Urc(entry) => {
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    let urc = inner
                        .read_urc(PartialUrc::new(entry, line), separator, remaining)
                        .await?;
                    inner.queue.push(urc);
                }
                _ => trace!("Skipping {:?} before prompt", LossyStr(&line)),
            }
        }
    }

    /// Collect and classify lines until the final result code of `command`.
    pub async fn read_response(
        &mut self,
        command: &Command,
        options: &SendOptions<'_>,
    ) -> Result<Response, Error> {
        let t = options
            .timeout
            .unwrap_or(self.inner().config.command_timeout);
        self.read_response_until(command, options, Instant::now() + t)
            .await
    }

    async fn read_response_until(
        &mut self,
        command: &Command,
        options: &SendOptions<'_>,
        deadline: Instant,
    ) -> Result<Response, Error> {
        let inner = self.inner();
        let separator = options.separator.unwrap_or(&inner.config.line_separator);
        let mut echo = inner.config.at_echo_enabled.then_some(command.as_bytes());
        let mut chunks = Vec::new();

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(Error::ReadTimeout(Duration::ZERO));
            }

            let Some(line) = inner.transport.read_line(separator, remaining).await? else {
                debug!("Stream ended, completing {}", command);
                break;
            };

            let expect = Expect {
                echo,
                prefix: options.expected_prefix,
                terminator: options.terminator,
            };
            let class = inner.digester.classify(&line, expect);
            if class != LineClass::Echo {
                if let Some(mut urc) = self.resume.partial_urc.take() {
                    urc.push(line);
                    if urc.is_complete() {
                        inner.queue.push(urc.into_urc());
                    } else {
                        self.resume.partial_urc = Some(urc);
                    }
                    continue;
                }
            }

            match class {
                LineClass::Echo => {
                    trace!("Dropping echo of {}", command);
                    echo = None;
                }
                LineClass::Error => {
                    return Err(Error::CommandError {
                        command: command.to_string(),
                        line,
                    });
                }
                LineClass::Urc(entry) => {
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    let urc = inner
                        .read_urc(PartialUrc::new(entry, line), separator, remaining)
                        .await?;
                    inner.queue.push(urc);
                }
                LineClass::Terminator => break,
                LineClass::Blank => {}
                LineClass::Payload => {
                    trace!("Response line: {:?}", LossyStr(&line));
                    echo = None;
                    chunks.push(line);
                }
            }
        }

        Ok(Response::new(chunks))
    }
}
