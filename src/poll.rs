//! Fixed-cadence polling of a telemetry source as an async stream
//!
//! [`sample_stream`] drives any [`TelemetrySource`] from a tokio interval on
//! the caller's task. Unchanged samples are skipped, retryable errors are
//! logged and retried after a delay, and the stream ends on cancellation or
//! on the first error that cannot be retried.

use futures::StreamExt;
use futures::stream::{self, BoxStream};
use std::time::Duration;
use tokio::time::{Interval, MissedTickBehavior, interval, sleep};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::Result;
use crate::config::TelemetryConfig;
use crate::provider::TelemetrySource;
use crate::types::{Sample, TelemetrySnapshot};

/// Stream of fresh snapshots. A non-retryable error is yielded once, then the
/// stream ends.
pub type SampleStream = BoxStream<'static, Result<TelemetrySnapshot>>;

/// Cadence settings for [`sample_stream`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollOptions {
    pub interval: Duration,
    pub retry_delay: Duration,
}

impl Default for PollOptions {
    fn default() -> Self {
        Self { interval: Duration::from_secs(1), retry_delay: Duration::from_secs(1) }
    }
}

impl PollOptions {
    pub fn from_config(config: &TelemetryConfig) -> Self {
        Self { interval: config.interval(), retry_delay: config.retry_delay() }
    }
}

struct PollState<S> {
    source: S,
    ticker: Interval,
    retry_delay: Duration,
    cancel: CancellationToken,
    samples: u64,
    finished: bool,
}

/// Poll an opened and resolved `source` every `options.interval`.
///
/// The source is closed when the stream ends.
pub fn sample_stream<S>(source: S, options: PollOptions, cancel: CancellationToken) -> SampleStream
where
    S: TelemetrySource + 'static,
{
    let mut ticker = interval(options.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let state = PollState {
        source,
        ticker,
        retry_delay: options.retry_delay,
        cancel,
        samples: 0,
        finished: false,
    };

    stream::unfold(state, |mut state| async move {
        if state.finished {
            return None;
        }

        loop {
            tokio::select! {
                biased;
                _ = state.cancel.cancelled() => {
                    info!(samples = state.samples, "Sampling cancelled");
                    state.source.close();
                    return None;
                }
                _ = state.ticker.tick() => {}
            }

            match state.source.sample() {
                Ok(Sample::Fresh(snapshot)) => {
                    state.samples += 1;
                    trace!(sample = state.samples, values = snapshot.len(), "Fresh snapshot");
                    return Some((Ok(snapshot), state));
                }
                Ok(Sample::NoNewData) => {
                    debug!("No new telemetry this tick");
                }
                Err(e) if e.is_retryable() => {
                    warn!(error = %e, delay = ?state.retry_delay, "Sampling failed, retrying");
                    tokio::select! {
                        biased;
                        _ = state.cancel.cancelled() => {
                            info!(samples = state.samples, "Sampling cancelled");
                            state.source.close();
                            return None;
                        }
                        _ = sleep(state.retry_delay) => {}
                    }
                }
                Err(e) => {
                    error!(error = %e, "Sampling stopped");
                    state.source.close();
                    state.finished = true;
                    return Some((Err(e), state));
                }
            }
        }
    })
    .boxed()
}
