use std::{error::Error, io};

use bytes::Bytes;
use clap::{Args, Parser};
use futures::stream;
use pg_sink::{
    config::SinkConfig,
    conversions::deserializer::RawChangeRecord,
    pipeline::{
        batching::BatchConfig, committers::memory::MemoryCommitter, consumer::ChangeConsumer,
        data_pipeline::DataPipeline, stores::postgres::PostgresStore,
    },
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Applies change events read from stdin, one per line formatted as
/// `destination<TAB>key-json<TAB>value-json`, to PostgreSQL.
#[derive(Debug, Parser)]
#[command(name = "stdin", version, about)]
struct AppArgs {
    #[clap(flatten)]
    db_args: DbArgs,

    #[clap(flatten)]
    sink_args: SinkArgs,
}

#[derive(Debug, Args)]
struct DbArgs {
    /// Host on which Postgres is running
    #[arg(long, default_value = "localhost")]
    db_host: String,

    /// Port on which Postgres is running
    #[arg(long, default_value_t = 5432)]
    db_port: u16,

    /// Postgres database name
    #[arg(long, default_value = "postgres")]
    db_name: String,

    /// Postgres database user name
    #[arg(long, default_value = "postgres")]
    db_username: String,

    /// Postgres database user password
    #[arg(long)]
    db_password: Option<String>,
}

#[derive(Debug, Args)]
struct SinkArgs {
    /// Schema the target tables live in
    #[arg(long, default_value = "debezium")]
    schema: String,

    /// Prefix added to every table name
    #[arg(long, default_value = "")]
    table_prefix: String,

    /// Append every event instead of upserting by primary key
    #[arg(long)]
    append: bool,

    /// Drop deleted rows instead of keeping them with their delete marker
    #[arg(long)]
    drop_deletes: bool,

    /// Create missing tables from the schema embedded in the events
    #[arg(long)]
    auto_create: bool,

    /// Maximum number of records per batch
    #[arg(long, default_value_t = 2048)]
    batch_size: usize,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    if let Err(e) = main_impl().await {
        error!("{e}");
    }

    Ok(())
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "stdin=info,pg_sink=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();
}

fn set_log_level() {
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "info");
    }
}

fn parse_line(line: &str) -> io::Result<RawChangeRecord> {
    let mut parts = line.splitn(3, '\t');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(destination), Some(key), Some(value)) => {
            let key = Some(key.trim())
                .filter(|k| !k.is_empty())
                .map(|k| Bytes::copy_from_slice(k.as_bytes()));
            Ok(RawChangeRecord::new(
                destination.trim(),
                key,
                Bytes::copy_from_slice(value.trim().as_bytes()),
            ))
        }
        _ => Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("expected destination<TAB>key<TAB>value, got {line:?}"),
        )),
    }
}

async fn main_impl() -> Result<(), Box<dyn Error>> {
    set_log_level();
    init_tracing();
    let args = AppArgs::parse();
    let db_args = args.db_args;
    let sink_args = args.sink_args;

    let mut config = SinkConfig {
        target_schema: sink_args.schema,
        table_prefix: sink_args.table_prefix,
        upsert: !sink_args.append,
        upsert_keep_deletes: !sink_args.drop_deletes,
        schemas_enable: sink_args.auto_create,
        ..SinkConfig::default()
    };
    config.database.host = db_args.db_host;
    config.database.port = db_args.db_port;
    config.database.dbname = db_args.db_name;
    config.database.username = db_args.db_username;
    config.database.password = db_args.db_password;

    let store = PostgresStore::new(&config.database)?;
    let consumer = ChangeConsumer::new(&config, store)?;
    let mut pipeline = DataPipeline::new(
        consumer,
        MemoryCommitter::default(),
        BatchConfig::new(sink_args.batch_size),
    );

    let cancel = pipeline.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel.cancel();
        }
    });

    let lines = BufReader::new(tokio::io::stdin()).lines();
    let records = stream::unfold(lines, |mut lines| async move {
        loop {
            match lines.next_line().await {
                Ok(Some(line)) if line.trim().is_empty() => continue,
                Ok(Some(line)) => return Some((parse_line(&line), lines)),
                Ok(None) => return None,
                Err(e) => return Some((Err(e), lines)),
            }
        }
    });

    pipeline.run(records).await?;

    info!(
        "applied {} records in {} batches",
        pipeline.committer().processed().len(),
        pipeline.committer().batches_finished()
    );

    Ok(())
}
