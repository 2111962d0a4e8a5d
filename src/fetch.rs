use tokio_util::sync::CancellationToken;

use crate::{
    dropout::{self, Verdict},
    error::{Cancelled, Error, ParseError},
    parse::parse,
    record::StudentRecord,
    retry::{Retried, RetryPolicy, with_retry},
    roll::RollNumber,
    scrape::{Session, Transport},
};

/// Literal texts by which the portal rejects a submission.
pub mod marker {
    pub const ROLL_NUMBER_PROBLEM: &str = "Roll number Problem";
    pub const SERVER_ERROR: &str = "Server Error";
    pub const UMC: &str = "UMC";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    RollNumberProblem,
    ServerError,
    Umc,
}

/// The single place where response wording is interpreted.
#[must_use]
pub fn classify(body: &str) -> Option<Rejection> {
    if body.contains(marker::ROLL_NUMBER_PROBLEM) {
        Some(Rejection::RollNumberProblem)
    } else if body.contains(marker::SERVER_ERROR) {
        Some(Rejection::ServerError)
    } else if body.contains(marker::UMC) {
        Some(Rejection::Umc)
    } else {
        None
    }
}

/// Result of looking up one roll number.
#[derive(Debug)]
pub enum CrawlOutcome {
    Record(StudentRecord),
    /// The branch's sequence has ended.
    NotFound,
    /// No transcript here, but a later roll number in the window has one.
    Dropout,
    /// A transcript page came back but could not be parsed.
    Malformed(ParseError),
    /// Every retry failed; the last error is kept for the operator.
    TransientError(Error),
}

/// Looks up roll numbers through one session, with retries and dropout lookahead.
pub struct Fetcher<'a, T> {
    pub session: &'a Session<T>,
    pub retry: &'a RetryPolicy,
    pub lookahead: u32,
    pub cancel: &'a CancellationToken,
}

impl<T: Transport> Fetcher<'_, T> {
    pub async fn lookup(&self, roll: &RollNumber) -> Result<CrawlOutcome, Cancelled> {
        let what = roll.to_string();
        let body = match with_retry(self.retry, self.cancel, &what, || self.session.submit(roll)).await
        {
            Retried::Done(body) => body,
            Retried::Exhausted { attempts, last } => {
                tracing::error!(target: "fetch", "{roll}: retries exhausted after {attempts} attempts: {last}");
                return Ok(CrawlOutcome::TransientError(last));
            }
            Retried::Failed(e) => {
                tracing::error!(target: "fetch", "{roll}: {e}");
                return Ok(CrawlOutcome::TransientError(e));
            }
            Retried::Cancelled => return Err(Cancelled),
        };

        if let Some(rejection) = classify(&body) {
            tracing::debug!(target: "fetch", "{roll}: rejected ({rejection:?})");
            return Ok(match self.classify_gap(roll).await? {
                Verdict::Dropout => CrawlOutcome::Dropout,
                Verdict::NotFound => CrawlOutcome::NotFound,
                Verdict::Exhausted(e) => CrawlOutcome::TransientError(e),
            });
        }

        Ok(match parse(&body) {
            Ok(record) => CrawlOutcome::Record(record),
            Err(e) => {
                tracing::warn!(target: "fetch", "{roll}: malformed transcript: {e}");
                CrawlOutcome::Malformed(e)
            }
        })
    }

    #[inline]
    pub async fn classify_gap(&self, roll: &RollNumber) -> Result<Verdict, Cancelled> {
        dropout::classify(self.session, roll, self.lookahead, self.retry, self.cancel).await
    }
}
