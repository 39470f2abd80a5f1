//! A background poller thread that periodically refreshes the campaign snapshot.
use std::{sync::Arc, time::Duration};

use rand::{thread_rng, Rng};
use tokio::sync::watch;

use crate::{refresher::Refresher, source::CampaignSource, Error, Result};

/// Configuration for [`PollerThread`].
// Not implementing `Copy` as we may add non-copyable fields in the future.
#[derive(Debug, Clone)]
pub struct PollerThreadConfig {
    /// Interval to wait between refreshes.
    ///
    /// Defaults to [`PollerThreadConfig::DEFAULT_POLL_INTERVAL`].
    pub interval: Duration,
    /// Jitter applies a randomized duration to wait between refreshes. This helps to avoid
    /// multiple server instances synchronizing and producing spiky load on the campaign source.
    ///
    /// Defaults to [`PollerThreadConfig::DEFAULT_POLL_JITTER`].
    pub jitter: Duration,
}

impl PollerThreadConfig {
    /// Default value for [`PollerThreadConfig::interval`].
    pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(30);
    /// Default value for [`PollerThreadConfig::jitter`].
    pub const DEFAULT_POLL_JITTER: Duration = Duration::from_secs(3);

    /// Create a new `PollerThreadConfig` using default configuration.
    pub fn new() -> PollerThreadConfig {
        PollerThreadConfig::default()
    }

    /// Update poll interval with `interval`.
    pub fn with_interval(mut self, interval: Duration) -> PollerThreadConfig {
        self.interval = interval;
        self
    }

    /// Update poll interval jitter with `jitter`.
    pub fn with_jitter(mut self, jitter: Duration) -> PollerThreadConfig {
        self.jitter = jitter;
        self
    }
}

impl Default for PollerThreadConfig {
    fn default() -> PollerThreadConfig {
        PollerThreadConfig {
            interval: PollerThreadConfig::DEFAULT_POLL_INTERVAL,
            jitter: PollerThreadConfig::DEFAULT_POLL_JITTER,
        }
    }
}

/// A snapshot poller thread.
///
/// Started by [`TargetingEngine::start_poller_thread`](crate::TargetingEngine::start_poller_thread).
/// The poller thread waits for the configured interval, refreshes the snapshot, and repeats until
/// stopped. Failed refreshes are logged and retried on the next tick. The previous snapshot stays
/// active in the meantime.
pub struct PollerThread {
    join_handle: std::thread::JoinHandle<()>,

    /// Used to send a stop command to the poller thread. A stop command also cancels a refresh
    /// that is in flight.
    stop_sender: watch::Sender<bool>,
}

impl PollerThread {
    /// Starts the poller thread with the provided configuration.
    ///
    /// The first refresh happens after the first interval elapses. Refresh beforehand if the
    /// snapshot needs to be populated immediately.
    ///
    /// # Errors
    ///
    /// This method can return the following errors:
    /// - IO Error if the poller runtime could not be built or the thread failed to start.
    pub(crate) fn start_with_config<S: CampaignSource>(
        refresher: Arc<Refresher<S>>,
        config: PollerThreadConfig,
    ) -> std::io::Result<PollerThread> {
        // Built on the calling thread so that a failure reaches the caller.
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        let (stop_sender, mut stop_receiver) = watch::channel(false);

        let join_handle = std::thread::Builder::new()
            .name("targeting-poller".to_owned())
            .spawn(move || {
                log::debug!(target: "targeting", "poller thread started");
                runtime.block_on(async move {
                    loop {
                        let timeout = jitter(config.interval, config.jitter);
                        tokio::select! {
                            _ = tokio::time::sleep(timeout) => {}
                            _ = stop_receiver.changed() => break,
                        }

                        tokio::select! {
                            // Errors are logged by the refresher and retried on the next tick.
                            _ = refresher.refresh() => {}
                            _ = stop_receiver.changed() => break,
                        }
                    }
                    log::debug!(target: "targeting", "poller thread received stop command");
                });
            })?;

        Ok(PollerThread {
            join_handle,
            stop_sender,
        })
    }

    /// Stop the poller thread.
    ///
    /// This function does not wait for the thread to actually stop.
    pub fn stop(&self) {
        // Dropped receiver means the thread already exited.
        self.stop_sender.send_replace(true);
    }

    /// Stop the poller thread and block waiting for it to exit.
    ///
    /// If you don't need to wait for the thread to exit, use [`PollerThread::stop`] instead.
    ///
    /// # Errors
    ///
    /// Returns an error of type [`Error`] in the following cases:
    ///
    /// - [`Error::PollerThreadPanicked`] if the thread has panicked.
    ///
    /// # Examples
    ///
    /// ```
    /// # fn test(poller_thread: targeting_engine::PollerThread) {
    /// poller_thread.shutdown().expect("Failed to shut down the poller thread");
    /// # }
    /// ```
    pub fn shutdown(self) -> Result<()> {
        // Send stop signal in case it wasn't sent before.
        self.stop();

        self.join_handle
            .join()
            .map_err(|_| Error::PollerThreadPanicked)?;

        Ok(())
    }
}

/// Apply randomized `jitter` to `interval`.
fn jitter(interval: Duration, jitter: Duration) -> Duration {
    Duration::saturating_sub(interval, thread_rng().gen_range(Duration::ZERO..=jitter))
}
