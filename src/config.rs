use core::time::Duration;
use std::{fs::File, io::BufReader, path::Path};

use serde::{Deserialize, Serialize};

use crate::{
    dropout::DEFAULT_LOOKAHEAD,
    error::Error,
    retry::RetryPolicy,
    roll::{Branch, YearPartition, default_branches},
    years::DEFAULT_FLOOR,
};

pub const DEFAULT_PORTAL: &str = "http://results.nith.ac.in";

/// Durations are written as integer milliseconds in config files.
pub mod millis {
    use core::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(d.as_millis().try_into().unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum YearSelection {
    /// Probe the portal starting from `floor`.
    Discover { floor: u8 },
    /// Crawl exactly these years, in this order.
    Fixed(Vec<YearPartition>),
}

impl Default for YearSelection {
    fn default() -> Self {
        Self::Discover {
            floor: DEFAULT_FLOOR,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CrawlConfig {
    pub portal: String,
    pub years: YearSelection,
    pub branches: Vec<Branch>,
    pub lookahead: u32,
    pub retry: RetryPolicy,
    #[serde(rename = "timeout_secs", with = "secs")]
    pub timeout: Duration,
    /// Branches crawled at once, each with its own session.
    pub workers: usize,
    /// Pause after every lookup, plus up to half again of random jitter.
    #[serde(rename = "pause_ms", with = "millis")]
    pub pause: Duration,
}

mod secs {
    use core::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            portal: DEFAULT_PORTAL.to_owned(),
            years: YearSelection::default(),
            branches: default_branches(),
            lookahead: DEFAULT_LOOKAHEAD,
            retry: RetryPolicy::default(),
            timeout: Duration::from_secs(30),
            workers: 1,
            pause: Duration::ZERO,
        }
    }
}

impl CrawlConfig {
    pub fn from_file(path: &Path) -> Result<Self, Error> {
        let file = File::open(path)
            .map_err(|e| Error::Config(format!("{}: {e}", path.display())))?;
        let reader = BufReader::new(file);
        let config: Self = serde_json::from_reader(reader)
            .map_err(|e| Error::Config(format!("{}: {e}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), Error> {
        let fail = |msg: &str| Err(Error::Config(msg.to_owned()));

        if self.retry.max_attempts == 0 {
            return fail("retry.max_attempts must be at least 1");
        }
        if self.retry.backoff.is_nan() || self.retry.backoff < 1.0 {
            return fail("retry.backoff must be at least 1.0");
        }
        if self.workers == 0 {
            return fail("workers must be at least 1");
        }
        if self.branches.is_empty() {
            return fail("no branches to crawl");
        }
        if self.timeout.is_zero() {
            return fail("timeout must be positive");
        }
        if matches!(&self.years, YearSelection::Fixed(years) if years.is_empty()) {
            return fail("no years to crawl");
        }
        Ok(())
    }
}
