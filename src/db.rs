use core::time::Duration;

use bb8_postgres::{PostgresConnectionManager, bb8};
use tokio_postgres::{NoTls, types::Json};

use crate::{
    error::Error,
    record::StudentRecord,
    roll::{RollNumber, YearPartition},
    sink::Sink,
};

pub type ConnectionManager = PostgresConnectionManager<NoTls>;
pub type Pool = bb8::Pool<ConnectionManager>;
pub type DBError = tokio_postgres::Error;
pub type BB8Error = bb8::RunError<DBError>;

pub const CONNECTION_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, clap::Args)]
pub struct DbArgs {
    /// Host name or unix socket directory.
    #[arg(long = "db-host", env = "DB_HOST", default_value = "/var/run/postgresql")]
    pub host: String,
    #[arg(long = "db-user", env = "DB_USER", default_value = "postgres")]
    pub user: String,
    #[arg(long = "db-name", env = "DB_NAME", default_value = "postgres")]
    pub dbname: String,
    #[arg(long = "db-password", env = "DB_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,
    #[arg(long = "db-pool-size", default_value_t = 8)]
    pub pool_size: u32,
}

impl From<BB8Error> for Error {
    fn from(e: BB8Error) -> Self {
        Self::Sink(Box::new(e))
    }
}

impl From<DBError> for Error {
    fn from(e: DBError) -> Self {
        Self::Sink(Box::new(e))
    }
}

pub async fn connect(args: &DbArgs) -> Result<Pool, Error> {
    let mut config = tokio_postgres::Config::new();
    config
        .host(&args.host)
        .user(&args.user)
        .dbname(&args.dbname)
        .connect_timeout(CONNECTION_TIMEOUT);
    if let Some(password) = &args.password {
        config.password(password);
    }

    let manager = PostgresConnectionManager::new(config, NoTls);

    Ok(Pool::builder()
        .max_size(args.pool_size.max(1))
        .connection_timeout(CONNECTION_TIMEOUT)
        .build(manager)
        .await?)
}

/// Transcripts live in `results.transcripts`, one row per
/// (partition, roll number), the record itself as `jsonb`.
#[derive(Clone)]
pub struct PgSink {
    pool: Pool,
}

impl PgSink {
    #[must_use]
    pub const fn new(pool: Pool) -> Self {
        Self { pool }
    }

    pub async fn ensure_schema(&self) -> Result<(), Error> {
        const SQL: &str = "create schema if not exists results; \
            create table if not exists results.transcripts (\
                partition text not null, \
                roll_number text not null, \
                record jsonb not null, \
                time timestamp not null default (now() at time zone 'UTC'), \
                primary key (partition, roll_number))";

        let conn = self.pool.get().await?;
        conn.batch_execute(SQL).await?;
        Ok(())
    }
}

impl Sink for PgSink {
    async fn upsert_if_absent(
        &self,
        partition: &YearPartition,
        key: &RollNumber,
        record: &StudentRecord,
    ) -> Result<bool, Error> {
        const SQL: &str = "insert into results.transcripts (partition, roll_number, record) values ($1, $2, $3) on conflict (partition, roll_number) do nothing";

        let partition = partition.collection();
        let roll_number = key.to_string();

        let conn = self.pool.get().await?;
        let stmt = conn.prepare(SQL).await?;
        let n_rows = conn
            .execute(&stmt, &[&&*partition, &roll_number, &Json(record)])
            .await?;

        if n_rows == 0 {
            tracing::debug!(target: "db", "{key} already stored in {partition}");
        }
        Ok(n_rows == 1)
    }
}
