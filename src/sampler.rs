use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::{CACHE_CONTROL, PRAGMA};
use reqwest::{Client, Url};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::{FetchError, SampleError};
use crate::metrics::{Accumulators, Rates, SampleResult, Summary};

/// Image endpoint; 800x600 keeps each sample a few tens of KB.
pub const DEFAULT_URL: &str = "https://picsum.photos/800/600";
pub const DEFAULT_SAMPLES: u32 = 3;
/// Gap between samples so server-side caching effects can decay.
pub const DEFAULT_PAUSE: Duration = Duration::from_millis(300);
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Retrieves one full payload of the measured resource.
#[async_trait]
pub trait Fetch: Send + Sync {
    async fn fetch(&self) -> Result<Bytes, FetchError>;
}

pub struct HttpFetcher {
    client: Client,
    url: Url,
}

impl HttpFetcher {
    pub fn new(url: Url, timeout: Duration) -> Result<Self, FetchError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client, url })
    }

    /// Appends `_=<unix millis>_<random>` so no cache along the way can answer.
    fn cache_busted_url(&self) -> Url {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or_default();
        let mut url = self.url.clone();
        url.query_pairs_mut()
            .append_pair("_", &format!("{millis}_{}", rand::random::<u32>()));
        url
    }
}

#[async_trait]
impl Fetch for HttpFetcher {
    async fn fetch(&self) -> Result<Bytes, FetchError> {
        let url = self.cache_busted_url();
        debug!(%url, "Fetching sample");
        let response = self
            .client
            .get(url)
            .header(CACHE_CONTROL, "no-store, no-cache")
            .header(PRAGMA, "no-cache")
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status));
        }
        // Byte count must come from the transferred body, not Content-Length
        Ok(response.bytes().await?)
    }
}

pub type Clock = Arc<dyn Fn() -> Instant + Send + Sync>;

/// Mutable state of one run. Built fresh for every run and owned by it.
pub struct RunState {
    sample_index: u32,
    total_samples: u32,
    accumulators: Accumulators,
    cancel: CancellationToken,
}

impl RunState {
    pub fn new(total_samples: u32, cancel: CancellationToken) -> Self {
        Self {
            sample_index: 0,
            total_samples: total_samples.max(1),
            accumulators: Accumulators::default(),
            cancel,
        }
    }

    pub fn sample_index(&self) -> u32 {
        self.sample_index
    }

    pub fn total_samples(&self) -> u32 {
        self.total_samples
    }

    pub fn accumulators(&self) -> &Accumulators {
        &self.accumulators
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn is_complete(&self) -> bool {
        self.sample_index >= self.total_samples
    }

    /// Adds one sample to the accumulators. Non-positive durations are rejected
    /// and leave the state untouched.
    pub fn record(&mut self, sample: &SampleResult) -> Result<Rates, SampleError> {
        if sample.elapsed_secs <= 0.0 {
            return Err(SampleError::ZeroDuration { elapsed_secs: sample.elapsed_secs });
        }
        let rates = Rates::from_sample(sample);
        self.accumulators.add(rates);
        self.sample_index += 1;
        Ok(rates)
    }

    pub fn summary(&self) -> Summary {
        self.accumulators.average(self.total_samples)
    }
}

pub struct SpeedSampler<F> {
    fetcher: F,
    pause: Duration,
    clock: Clock,
}

impl<F: Fetch> SpeedSampler<F> {
    pub fn new(fetcher: F, pause: Duration) -> Self {
        Self::with_clock(fetcher, pause, Arc::new(Instant::now))
    }

    pub fn with_clock(fetcher: F, pause: Duration, clock: Clock) -> Self {
        Self { fetcher, pause, clock }
    }

    #[cfg(test)]
    pub fn fetcher(&self) -> &F {
        &self.fetcher
    }

    /// Times one full download. Dropping the fetch on cancellation aborts the
    /// underlying request.
    pub async fn run_sample(&self, cancel: &CancellationToken) -> Result<SampleResult, SampleError> {
        if cancel.is_cancelled() {
            return Err(SampleError::Cancelled);
        }
        let start = (self.clock)();
        let payload = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(SampleError::Cancelled),
            res = self.fetcher.fetch() => res?,
        };
        let end = (self.clock)();

        let elapsed_secs = end.saturating_duration_since(start).as_secs_f64();
        if elapsed_secs <= 0.0 {
            return Err(SampleError::ZeroDuration { elapsed_secs });
        }
        Ok(SampleResult { bytes: payload.len() as u64, elapsed_secs })
    }

    /// Runs `total_samples` samples back to back and averages them. Any failure
    /// ends the run; there is no averaging over a partial set.
    pub async fn run_all(
        &self,
        total_samples: u32,
        cancel: CancellationToken,
        mut on_progress: impl FnMut(u32) + Send,
    ) -> Result<Summary, SampleError> {
        let mut state = RunState::new(total_samples, cancel);

        while !state.is_complete() {
            if state.sample_index() > 0 {
                tokio::select! {
                    biased;
                    _ = state.cancel_token().cancelled() => return Err(SampleError::Cancelled),
                    _ = tokio::time::sleep(self.pause) => {}
                }
            }
            if state.cancel_token().is_cancelled() {
                return Err(SampleError::Cancelled);
            }

            let index = state.sample_index() + 1;
            on_progress(index);
            let sample = self.run_sample(state.cancel_token()).await?;
            let rates = state.record(&sample)?;
            debug!(
                index,
                total = state.total_samples(),
                bytes = sample.bytes,
                secs = sample.elapsed_secs,
                bps = rates.bits_per_sec,
                bps_sum = state.accumulators().bits_per_sec,
                "Sample done"
            );
        }

        Ok(state.summary())
    }
}
