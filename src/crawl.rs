use core::{
    sync::atomic::{AtomicU64, Ordering},
    time::Duration,
};

use futures_util::{StreamExt, TryStreamExt, stream};
use parking_lot::Mutex;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::{
    config::{CrawlConfig, YearSelection},
    error::Error,
    fetch::{CrawlOutcome, Fetcher},
    roll::{Branch, RollNumber, YearPartition},
    scrape::{Connect, Session},
    sink::Sink,
    years,
};

/// How a (year, branch) sequence stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BranchEnd {
    /// The lookahead found nothing after this roll number.
    NotFound(RollNumber),
    /// Retries ran out at this roll number; the branch may not really be over.
    Exhausted(RollNumber),
    /// The sequence ran past `999`.
    Overflow,
    Cancelled,
}

#[derive(Debug, Default)]
struct Stats {
    inserted: AtomicU64,
    existing: AtomicU64,
    dropouts: AtomicU64,
    malformed: AtomicU64,
    ended: AtomicU64,
    overflowed: AtomicU64,
    exhausted: Mutex<Vec<RollNumber>>,
}

#[inline]
fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Summary {
    pub years: Vec<YearPartition>,
    pub inserted: u64,
    pub already_present: u64,
    pub dropouts: u64,
    pub malformed: u64,
    pub branches_ended: u64,
    pub branches_overflowed: u64,
    /// Roll numbers where retries ran out and the branch was cut short.
    pub exhausted_at: Vec<RollNumber>,
    pub cancelled: bool,
}

/// Everything one crawl run needs: the connector that opens a session per
/// branch, the sink, the configuration and the cancellation token.
pub struct CrawlContext<C, S> {
    pub connector: C,
    pub sink: S,
    pub config: CrawlConfig,
    cancel: CancellationToken,
    stats: Stats,
}

impl<C: Connect, S: Sink> CrawlContext<C, S> {
    pub fn new(connector: C, sink: S, config: CrawlConfig) -> Self {
        Self {
            connector,
            sink,
            config,
            cancel: CancellationToken::new(),
            stats: Stats::default(),
        }
    }

    #[must_use]
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub async fn years(&self) -> Result<Vec<YearPartition>, Error> {
        match &self.config.years {
            YearSelection::Fixed(years) => Ok(years.clone()),
            YearSelection::Discover { floor } => {
                years::discover(
                    &self.connector,
                    &self.config.portal,
                    *floor,
                    &self.config.retry,
                    &self.cancel,
                )
                .await
            }
        }
    }

    /// Crawls every configured branch of every year, `config.workers`
    /// branches at a time. Only sink failures abort the run.
    pub async fn run(&self) -> Result<Summary, Error> {
        self.config.validate()?;
        let years = self.years().await?;
        tracing::info!(target: "crawl", "crawling years {years:?}");

        let jobs = years
            .iter()
            .flat_map(|year| self.config.branches.iter().map(move |branch| (year, branch)))
            .collect::<Vec<_>>();

        stream::iter(jobs)
            .map(|(year, branch)| self.crawl_branch(year, branch))
            .buffer_unordered(self.config.workers)
            .try_for_each(|_| core::future::ready(Ok(())))
            .await?;

        Ok(self.summary(years))
    }

    pub async fn crawl_branch(
        &self,
        year: &YearPartition,
        branch: &Branch,
    ) -> Result<BranchEnd, Error> {
        tracing::info!(target: "crawl", "starting \x1b[1;36m{year}{branch}\x1b[0m");

        let session = Session::open(self.connector.connect()?, &self.config.portal, year);
        let fetcher = Fetcher {
            session: &session,
            retry: &self.config.retry,
            lookahead: self.config.lookahead,
            cancel: &self.cancel,
        };

        let mut roll =
            RollNumber::new(year, branch, 1).map_err(|e| Error::Config(e.to_string()))?;
        loop {
            let Ok(outcome) = fetcher.lookup(&roll).await else {
                tracing::info!(target: "crawl", "{year}{branch} cancelled at {roll}");
                return Ok(BranchEnd::Cancelled);
            };

            match outcome {
                CrawlOutcome::Record(record) => {
                    if self.sink.upsert_if_absent(year, &roll, &record).await? {
                        bump(&self.stats.inserted);
                        tracing::info!(target: "crawl", "\x1b[36m{roll}\x1b[0m {}", record.student_info.student_name);
                    } else {
                        bump(&self.stats.existing);
                    }
                }
                CrawlOutcome::Dropout => bump(&self.stats.dropouts),
                CrawlOutcome::Malformed(_) => bump(&self.stats.malformed),
                CrawlOutcome::NotFound => {
                    bump(&self.stats.ended);
                    tracing::info!(target: "crawl", "{year}{branch} ended at {roll}");
                    return Ok(BranchEnd::NotFound(roll));
                }
                CrawlOutcome::TransientError(e) => {
                    tracing::error!(target: "crawl", "\x1b[31m{year}{branch}: retries exhausted at {roll}, branch cut short: {e}\x1b[0m");
                    self.stats.exhausted.lock().push(roll.clone());
                    return Ok(BranchEnd::Exhausted(roll));
                }
            }

            if !self.pause().await {
                return Ok(BranchEnd::Cancelled);
            }
            let Some(next) = roll.advance(1) else {
                bump(&self.stats.overflowed);
                tracing::warn!(target: "crawl", "{year}{branch} ran past {roll}");
                return Ok(BranchEnd::Overflow);
            };
            roll = next;
        }
    }

    /// Sleeps the configured pause with jitter; `false` if cancelled meanwhile.
    async fn pause(&self) -> bool {
        let base = self.config.pause;
        if base.is_zero() {
            return true;
        }
        let jitter = rand::random_range(0..=base.as_millis() as u64 / 2);
        tokio::select! {
            () = self.cancel.cancelled() => false,
            () = tokio::time::sleep(base + Duration::from_millis(jitter)) => true,
        }
    }

    #[must_use]
    pub fn summary(&self, years: Vec<YearPartition>) -> Summary {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        Summary {
            years,
            inserted: load(&self.stats.inserted),
            already_present: load(&self.stats.existing),
            dropouts: load(&self.stats.dropouts),
            malformed: load(&self.stats.malformed),
            branches_ended: load(&self.stats.ended),
            branches_overflowed: load(&self.stats.overflowed),
            exhausted_at: self.stats.exhausted.lock().clone(),
            cancelled: self.cancel.is_cancelled(),
        }
    }
}
