//! Pushes a package to the device while a poller samples the destination's size.

mod progress;

use std::{
    io,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
    time::Duration,
};

use humansize::{DECIMAL, format_size};
pub use progress::TransferProgress;
use progress::ProgressTracker;
use tokio::{
    io::{AsyncRead, ReadBuf},
    sync::mpsc::UnboundedSender,
    time::sleep,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, trace, warn};

use crate::{
    adb::RemoteDevice,
    error::{Error, Result},
    source::PackageSource,
};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(200);
/// Permission bits of pushed packages.
pub const PUSH_FILE_MODE: u32 = 0o644;

/// Runs one push per [`TransferController::transfer`] call.
pub struct TransferController {
    device: Arc<dyn RemoteDevice>,
    poll_interval: Duration,
    cancel_token: CancellationToken,
}

impl TransferController {
    pub fn new(
        device: Arc<dyn RemoteDevice>,
        poll_interval: Duration,
        cancel_token: CancellationToken,
    ) -> Self {
        Self { device, poll_interval, cancel_token }
    }

    /// Streams `source` into `dest` and returns the number of bytes read from the source.
    ///
    /// Samples go to `progress` while the write runs. The poller is stopped and joined before
    /// this returns; on success one last sample with `finished` set follows all others.
    #[instrument(
        level = "debug",
        skip(self, source, progress),
        fields(location = source.location(), length = ?source.length()),
        err
    )]
    pub async fn transfer(
        &self,
        source: PackageSource,
        dest: &str,
        progress: UnboundedSender<TransferProgress>,
    ) -> Result<u64> {
        let total = source.length();
        let mut reader = CountingReader::new(source.into_reader());

        let stop = self.cancel_token.child_token();
        // stops the poller when this future is dropped mid-write
        let _stop_on_drop = stop.clone().drop_guard();
        let poller = tokio::spawn(poll_destination(
            self.device.clone(),
            dest.to_string(),
            total,
            self.poll_interval,
            stop.clone(),
            progress.clone(),
        ));

        let outcome = tokio::select! {
            biased;
            _ = self.cancel_token.cancelled() => Err(Error::Cancelled),
            r = self.device.write_file(dest, &mut reader, PUSH_FILE_MODE) => {
                r.map_err(|source| Error::RemoteWriteFailure { path: dest.to_string(), source })
            }
        };

        stop.cancel();
        let mut tracker = match poller.await {
            Ok(tracker) => tracker,
            Err(e) => {
                warn!(error = &e as &dyn std::error::Error, "Progress poller task failed");
                ProgressTracker::new(total)
            }
        };

        let transferred = reader.count();
        match &outcome {
            Ok(()) => {
                debug!(dest, size = %format_size(transferred, DECIMAL), "Transfer finished");
                let _ = progress.send(tracker.finish(transferred));
            }
            Err(e) => {
                debug!(dest, transferred, error = e as &dyn std::error::Error, "Transfer stopped");
            }
        }
        outcome.map(|()| transferred)
    }
}

/// Stats `path` every `interval` until `stop` fires, returning the tracker it fed.
async fn poll_destination(
    device: Arc<dyn RemoteDevice>,
    path: String,
    total: Option<u64>,
    interval: Duration,
    stop: CancellationToken,
    progress: UnboundedSender<TransferProgress>,
) -> ProgressTracker {
    let mut tracker = ProgressTracker::new(total);
    loop {
        let size = tokio::select! {
            biased;
            _ = stop.cancelled() => break,
            size = device.stat_size(&path) => size,
        };
        match size {
            Ok(size) => {
                if progress.send(tracker.observe(size)).is_err() {
                    trace!("Progress receiver dropped");
                }
            }
            // usually the file has not been created yet
            Err(e) => trace!(error = e.as_ref() as &dyn std::error::Error, "Destination stat failed"),
        }
        tokio::select! {
            biased;
            _ = stop.cancelled() => break,
            _ = sleep(interval) => {}
        }
    }
    trace!(path, "Progress poller stopped");
    tracker
}

/// Counts the bytes handed out by the wrapped reader.
struct CountingReader<R> {
    inner: R,
    count: u64,
}

impl<R> CountingReader<R> {
    fn new(inner: R) -> Self {
        Self { inner, count: 0 }
    }

    fn count(&self) -> u64 {
        self.count
    }
}

impl<R: AsyncRead + Unpin> AsyncRead for CountingReader<R> {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let before = buf.filled().len();
        let poll = Pin::new(&mut self.inner).poll_read(cx, buf);
        if let Poll::Ready(Ok(())) = poll {
            self.count += (buf.filled().len() - before) as u64;
        }
        poll
    }
}
