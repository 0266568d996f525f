use core::time::Duration;
use std::sync::Weak;

use tokio::{
    io::{AsyncRead, AsyncWrite},
    sync::watch,
    time::sleep,
};

use crate::{
    client::{Inner, PartialUrc},
    digest::{Expect, LineClass},
    helpers::LossyStr,
    Error,
};

/// Background read loop, running while no transaction holds the write lock.
///
/// Each iteration performs one classified read: notifications are queued,
/// everything else is logged and discarded. The loop exits when the client
/// is gone, the stream has ended or `stop` changes. Stopping never loses
/// part of a notification: lines read so far are parked in the client and
/// completed by whoever reads next.
pub(crate) async fn run<R, W>(inner: Weak<Inner<R, W>>, mut stop: watch::Receiver<u64>)
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    debug!("Monitor started");
    loop {
        if stop.has_changed().unwrap_or(true) {
            break;
        }
        let Some(inner) = inner.upgrade() else {
            break;
        };
        let poll_interval = inner.config.urc_poll_interval;
        let separator = inner.config.line_separator.as_slice();
        let timeout = inner.config.monitor_timeout;

        if let Some(urc) = inner.take_partial_urc() {
            if !complete(&inner, urc, &mut stop).await {
                break;
            }
            continue;
        }

        if inner.transport.is_writing() || inner.transport.is_reading() {
            drop(inner);
            if !idle(&mut stop, poll_interval).await {
                break;
            }
            continue;
        }

        let read = tokio::select! {
            biased;
            _ = stop.changed() => None,
            res = inner.transport.read_line(separator, timeout) => Some(res),
        };
        let Some(read) = read else {
            break;
        };
        let line = match read {
            Ok(Some(line)) => line,
            Ok(None) => {
                debug!("Stream ended, monitor stopping");
                break;
            }
            Err(Error::ReadTimeout(_) | Error::Aborted) => continue,
            Err(Error::StreamClosed) => {
                warn!("Stream closed mid-line, monitor stopping");
                break;
            }
            Err(e) => {
                warn!("Monitor read failed: {}", e);
                drop(inner);
                if !idle(&mut stop, poll_interval).await {
                    break;
                }
                continue;
            }
        };

        match inner.digester.classify(&line, Expect::default()) {
            LineClass::Urc(entry) => {
                let urc = PartialUrc::new(entry, line);
                if !complete(&inner, urc, &mut stop).await {
                    break;
                }
            }
            LineClass::Terminator | LineClass::Blank => {
                trace!("Discarding stray terminator {:?}", LossyStr(&line));
            }
            LineClass::Error => {
                warn!(
                    "Error line outside of a command: {:?}",
                    LossyStr(&line)
                );
            }
            LineClass::Payload | LineClass::Echo => {
                debug!("Discarding unsolicited line {:?}", LossyStr(&line));
            }
        }
    }
    debug!("Monitor stopped");
}

/// Read the rest of `urc` and queue it. When stopped first, the lines read
/// so far are handed back to the client and `false` is returned.
async fn complete<R, W>(
    inner: &Inner<R, W>,
    mut urc: PartialUrc,
    stop: &mut watch::Receiver<u64>,
) -> bool
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let separator = inner.config.line_separator.as_slice();
    let timeout = inner.config.monitor_timeout;

    while !urc.is_complete() {
        let read = tokio::select! {
            biased;
            _ = stop.changed() => None,
            res = inner.transport.read_line(separator, timeout) => Some(res),
        };
        match read {
            None => {
                inner.set_partial_urc(urc);
                return false;
            }
            Some(Err(Error::Aborted)) => {
                inner.set_partial_urc(urc);
                return true;
            }
            Some(Ok(Some(line))) => urc.push(line),
            Some(Ok(None)) => {
                warn!("Dropping incomplete URC: {}", Error::StreamClosed);
                return true;
            }
            Some(Err(e)) => {
                warn!("Dropping incomplete URC: {}", e);
                return true;
            }
        }
    }
    inner.queue.push(urc.into_urc());
    true
}

/// Sleep for one poll interval. Returns `false` when stopped meanwhile.
async fn idle(stop: &mut watch::Receiver<u64>, poll_interval: Duration) -> bool {
    tokio::select! {
        biased;
        _ = stop.changed() => false,
        _ = sleep(poll_interval) => true,
    }
}
