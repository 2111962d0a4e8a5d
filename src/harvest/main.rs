use core::time::Duration;
use std::path::PathBuf;

use rhv::{
    config::{CrawlConfig, DEFAULT_PORTAL, YearSelection},
    crawl::CrawlContext,
    db::{DbArgs, PgSink},
    dropout::DEFAULT_LOOKAHEAD,
    fetch::{CrawlOutcome, Fetcher},
    retry::RetryPolicy,
    roll::{Branch, RollNumber, YearPartition},
    scrape::{Connect, HttpConnector, Session},
    years::{self, DEFAULT_FLOOR},
};
use tokio_util::sync::CancellationToken;

#[derive(clap::Parser)]
#[command(about = "Harvest transcripts from the results portal")]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Crawl every branch of every year into PostgreSQL.
    Crawl {
        #[command(flatten)]
        db: DbArgs,
        #[command(flatten)]
        crawl: CrawlArgs,
    },
    /// List the years the portal currently publishes.
    Years {
        #[arg(long, default_value = DEFAULT_PORTAL)]
        portal: String,
        #[arg(long, default_value_t = DEFAULT_FLOOR)]
        floor: u8,
    },
    /// Look up a single roll number and print the outcome.
    Lookup {
        #[arg(value_parser = RollNumber::parse)]
        roll: RollNumber,
        #[arg(long, default_value = DEFAULT_PORTAL)]
        portal: String,
        #[arg(long, default_value_t = DEFAULT_LOOKAHEAD)]
        lookahead: u32,
    },
}

#[derive(clap::Args)]
struct CrawlArgs {
    /// JSON configuration file; flags below override its values.
    #[arg(short, long, value_name = "file")]
    config: Option<PathBuf>,
    #[arg(long)]
    portal: Option<String>,
    /// Crawl exactly these years instead of discovering them.
    #[arg(long, value_delimiter = ',', value_parser = YearPartition::new)]
    years: Vec<YearPartition>,
    /// First year to probe when discovering.
    #[arg(long, conflicts_with = "years")]
    floor: Option<u8>,
    #[arg(long, value_delimiter = ',', value_parser = Branch::new)]
    branches: Vec<Branch>,
    #[arg(long)]
    lookahead: Option<u32>,
    #[arg(long)]
    retries: Option<u32>,
    #[arg(long)]
    delay_ms: Option<u64>,
    #[arg(long)]
    backoff: Option<f64>,
    #[arg(long)]
    timeout_secs: Option<u64>,
    #[arg(short, long)]
    workers: Option<usize>,
    #[arg(long)]
    pause_ms: Option<u64>,
}

impl CrawlArgs {
    fn into_config(self) -> Result<CrawlConfig, rhv::Error> {
        let mut config = match &self.config {
            Some(path) => CrawlConfig::from_file(path)?,
            None => CrawlConfig::default(),
        };

        if let Some(portal) = self.portal {
            config.portal = portal;
        }
        if !self.years.is_empty() {
            config.years = YearSelection::Fixed(self.years);
        } else if let Some(floor) = self.floor {
            config.years = YearSelection::Discover { floor };
        }
        if !self.branches.is_empty() {
            config.branches = self.branches;
        }
        if let Some(lookahead) = self.lookahead {
            config.lookahead = lookahead;
        }
        if let Some(retries) = self.retries {
            config.retry.max_attempts = retries;
        }
        if let Some(delay) = self.delay_ms {
            config.retry.initial_delay = Duration::from_millis(delay);
        }
        if let Some(backoff) = self.backoff {
            config.retry.backoff = backoff;
        }
        if let Some(timeout) = self.timeout_secs {
            config.timeout = Duration::from_secs(timeout);
        }
        if let Some(workers) = self.workers {
            config.workers = workers;
        }
        if let Some(pause) = self.pause_ms {
            config.pause = Duration::from_millis(pause);
        }

        config.validate()?;
        Ok(config)
    }
}

fn cancel_on_ctrl_c(cancel: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!(target: "main", "interrupted, finishing in-flight requests ...");
            cancel.cancel();
        }
    });
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    use clap::Parser;

    pretty_env_logger::init_timed();

    let args = Args::parse();

    match args.command {
        Commands::Crawl { db, crawl } => {
            let config = crawl.into_config()?;
            let pool = rhv::db::connect(&db).await?;
            let sink = PgSink::new(pool);
            sink.ensure_schema().await?;

            let connector = HttpConnector {
                timeout: config.timeout,
            };
            let ctx = CrawlContext::new(connector, sink, config);
            cancel_on_ctrl_c(ctx.cancel_token());

            let summary = ctx.run().await?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        Commands::Years { portal, floor } => {
            let connector = HttpConnector {
                timeout: CrawlConfig::default().timeout,
            };
            let cancel = CancellationToken::new();
            cancel_on_ctrl_c(cancel.clone());

            let years =
                years::discover(&connector, &portal, floor, &RetryPolicy::default(), &cancel)
                    .await?;
            for year in years {
                println!("{year}");
            }
        }
        Commands::Lookup {
            roll,
            portal,
            lookahead,
        } => {
            let connector = HttpConnector {
                timeout: CrawlConfig::default().timeout,
            };
            let session = Session::open(connector.connect()?, &portal, roll.year());
            let retry = RetryPolicy::default();
            let cancel = CancellationToken::new();
            cancel_on_ctrl_c(cancel.clone());

            let fetcher = Fetcher {
                session: &session,
                retry: &retry,
                lookahead,
                cancel: &cancel,
            };
            match fetcher.lookup(&roll).await? {
                CrawlOutcome::Record(record) => {
                    println!("{}", serde_json::to_string_pretty(&record)?);
                }
                CrawlOutcome::Dropout => println!("{roll}: dropout"),
                CrawlOutcome::NotFound => println!("{roll}: not found"),
                CrawlOutcome::Malformed(e) => anyhow::bail!("{roll}: malformed transcript: {e}"),
                CrawlOutcome::TransientError(e) => anyhow::bail!("{roll}: {e}"),
            }
        }
    }

    Ok(())
}
