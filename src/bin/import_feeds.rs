use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use tracing::error;

use smartcart::catalog::db::Db;
use smartcart::catalog::stats::catalog_stats;
use smartcart::feed;
use smartcart::logging;
use smartcart::util::env as env_util;

#[derive(Parser, Debug)]
#[command(
    name = "import_feeds",
    version,
    about = "Parse chain price-transparency XML dumps into the catalog"
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    // Allow `import_feeds --root ./my_prices` without the explicit `run`
    // subcommand. If a subcommand is present, these args are ignored.
    #[command(flatten)]
    run: RunArgs,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run scheduler passes over the feed root (default when no command supplied)
    Run(RunArgs),
    /// Print catalog row counts
    Stats,
}

#[derive(Debug, Default, Args)]
struct RunArgs {
    /// Feed root directory; falls back to FEEDS_DIR
    #[arg(long)]
    root: Option<PathBuf>,
    /// Run continuously with this many seconds between passes
    #[arg(long)]
    loop_secs: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    logging::init_tracing("info,sqlx=warn")?;
    env_util::init_env();

    let cli = Cli::parse();

    let database_url = env_util::db_url()?;
    let max_connections: u32 = env_util::env_parse("DB_MAX_CONNS", 5u32);
    let db = Db::connect(&database_url, max_connections).await?;

    match cli.command {
        Some(Command::Stats) => {
            let stats = catalog_stats(&db).await?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
        Some(Command::Run(args)) => run(&db, args).await?,
        None => run(&db, cli.run).await?,
    }

    Ok(())
}

async fn run(db: &Db, args: RunArgs) -> Result<()> {
    let root = match args.root {
        Some(r) => r,
        None => PathBuf::from(env_util::feeds_dir()?),
    };
    anyhow::ensure!(root.is_dir(), "feed root not found: {}", root.display());

    match args.loop_secs {
        None => {
            feed::run_feed_scan(db, &root).await?;
        }
        Some(secs) => loop {
            // each pass retries whatever the previous one left in place
            if let Err(e) = feed::run_feed_scan(db, &root).await {
                error!(error = %e, "feed scan failed; will retry next pass");
            }
            tokio::time::sleep(Duration::from_secs(secs)).await;
        },
    }
    Ok(())
}
