use tokio_util::sync::CancellationToken;

use crate::{
    error::{Cancelled, Error},
    fetch::marker,
    retry::{Retried, RetryPolicy, with_retry},
    roll::YearPartition,
    scrape::{Connect, Session},
};

/// First year the portal historically publishes.
pub const DEFAULT_FLOOR: u8 = 20;

/// Probes `scheme{floor}`, `scheme{floor+1}`, ... until an index page
/// answers with the server-error marker, and returns the years found,
/// most recent first. Cancellation is an error, never a partial list.
pub async fn discover<C: Connect>(
    connector: &C,
    portal: &str,
    floor: u8,
    retry: &RetryPolicy,
    cancel: &CancellationToken,
) -> Result<Vec<YearPartition>, Error> {
    let mut years = Vec::new();

    for n in floor..100 {
        let Some(year) = YearPartition::from_number(n) else {
            break;
        };
        let session = Session::open(connector.connect()?, portal, &year);
        let what = format!("probe {}", year.scheme());

        let body = match with_retry(retry, cancel, &what, || session.index()).await {
            Retried::Done(body) => body,
            Retried::Exhausted { last: e, .. } | Retried::Failed(e) => return Err(e),
            Retried::Cancelled => {
                tracing::warn!(target: "years", "discovery cancelled at {}", year.scheme());
                return Err(Cancelled.into());
            }
        };
        if body.contains(marker::SERVER_ERROR) {
            tracing::debug!(target: "years", "{} not published", year.scheme());
            break;
        }
        tracing::info!(target: "years", "found year \x1b[36m{year}\x1b[0m");
        years.push(year);
    }

    years.reverse();
    Ok(years)
}
