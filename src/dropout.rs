use tokio_util::sync::CancellationToken;

use crate::{
    error::{Cancelled, Error},
    fetch::marker,
    retry::{Retried, RetryPolicy, with_retry},
    roll::RollNumber,
    scrape::{Session, Transport},
};

/// How many following roll numbers are probed before a rejected one is
/// taken to be the end of its branch.
pub const DEFAULT_LOOKAHEAD: u32 = 3;

#[derive(Debug)]
pub enum Verdict {
    Dropout,
    NotFound,
    /// No probe found anything, but at least one gave up; the branch may
    /// not really be over.
    Exhausted(Error),
}

/// Whether the portal has anything published for `roll`. Only the
/// roll-number marker counts as absence; a probe that gives up yields its
/// last error.
pub async fn exists<T: Transport>(
    session: &Session<T>,
    roll: &RollNumber,
    retry: &RetryPolicy,
    cancel: &CancellationToken,
) -> Result<Result<bool, Error>, Cancelled> {
    let what = format!("probe {roll}");
    match with_retry(retry, cancel, &what, || session.submit(roll)).await {
        Retried::Done(body) => Ok(Ok(!body.contains(marker::ROLL_NUMBER_PROBLEM))),
        Retried::Exhausted { last: e, .. } | Retried::Failed(e) => {
            tracing::warn!(target: "dropout", "{what} gave up: {e}");
            Ok(Err(e))
        }
        Retried::Cancelled => Err(Cancelled),
    }
}

/// Probes `roll+1 ..= roll+window` in order and stops at the first hit.
pub async fn classify<T: Transport>(
    session: &Session<T>,
    roll: &RollNumber,
    window: u32,
    retry: &RetryPolicy,
    cancel: &CancellationToken,
) -> Result<Verdict, Cancelled> {
    let mut gave_up = None;

    for n in 1..=window {
        let Some(next) = roll.advance(n) else {
            break;
        };
        match exists(session, &next, retry, cancel).await? {
            Ok(true) => {
                tracing::info!(target: "dropout", "{roll} missing but {next} exists: dropout");
                return Ok(Verdict::Dropout);
            }
            Ok(false) => {}
            Err(e) => gave_up = Some(e),
        }
    }

    if let Some(e) = gave_up {
        tracing::error!(target: "dropout", "nothing within {window} after {roll}, but retries exhausted on a probe: {e}");
        return Ok(Verdict::Exhausted(e));
    }
    tracing::debug!(target: "dropout", "nothing within {window} after {roll}");
    Ok(Verdict::NotFound)
}
