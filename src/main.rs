use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use gleaner::config::Config;
use gleaner::feed::ReqwestClient;
use gleaner::ingest::{IngestReport, Ingestor};
use gleaner::storage::{Database, DatabaseError};
use std::path::PathBuf;
use std::sync::Arc;

/// Get the config directory path (~/.config/gleaner/)
fn get_config_dir() -> Result<PathBuf> {
    let home = std::env::var("HOME").context("HOME environment variable not set")?;
    Ok(PathBuf::from(home).join(".config").join("gleaner"))
}

#[derive(Parser, Debug)]
#[command(name = "gleaner", about = "Discover, fetch and store posts from website feeds")]
struct Args {
    /// Config file (default: ~/.config/gleaner/config.toml)
    #[arg(long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Database file, overriding the config
    #[arg(long, value_name = "FILE", global = true)]
    db: Option<PathBuf>,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Discover feeds for site URLs, register them and ingest their posts
    Add {
        #[arg(required = true, value_name = "URL")]
        urls: Vec<String>,
    },
    /// List registered sources
    Sources {
        /// Include paused sources
        #[arg(long)]
        all: bool,
    },
    /// Refresh one source, or every active source
    Refresh { source_id: Option<i64> },
    /// List stored posts, newest first
    Posts {
        #[arg(long, default_value_t = 20)]
        limit: i64,
        #[arg(long, default_value_t = 0)]
        offset: i64,
        /// Only posts from this source
        #[arg(long)]
        source: Option<i64>,
    },
    /// Mark a post as read
    Read { post_id: i64 },
    /// Mark a post as unread
    Unread { post_id: i64 },
    /// Stop refreshing a source (its posts are kept)
    Pause { source_id: i64 },
    /// Resume refreshing a source
    Resume { source_id: i64 },
    /// Delete a source and all of its posts
    Remove { source_id: i64 },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let config_dir = get_config_dir()?;
    let config_path = args
        .config
        .clone()
        .unwrap_or_else(|| config_dir.join("config.toml"));
    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;

    let db_path = match args.db.clone().or_else(|| config.database_path.clone()) {
        Some(path) => path,
        None => {
            std::fs::create_dir_all(&config_dir).context("Failed to create config directory")?;
            config_dir.join("gleaner.db")
        }
    };
    let db_path_str = db_path
        .to_str()
        .ok_or_else(|| anyhow::anyhow!("Invalid UTF-8 in database path"))?;

    let db = match Database::open(db_path_str).await {
        Ok(db) => db,
        Err(DatabaseError::InstanceLocked) => {
            eprintln!("Error: the database at {} is locked by another process.", db_path.display());
            std::process::exit(1);
        }
        Err(e) => return Err(e).context("Failed to open database"),
    };

    match args.command {
        Command::Add { urls } => {
            let ingestor = build_ingestor(db, &config)?;
            let report = ingestor.ingest_urls(&urls).await;
            print_report(&report, args.json)?;
        }
        Command::Refresh { source_id: Some(id) } => {
            let ingestor = build_ingestor(db, &config)?;
            let counts = ingestor
                .refresh_source(id)
                .await
                .with_context(|| format!("Failed to refresh source {}", id))?;
            if args.json {
                println!("{}", serde_json::to_string_pretty(&counts)?);
            } else {
                println!(
                    "Source {}: {} entries, {} added, {} rejected",
                    id, counts.found, counts.added, counts.rejected
                );
            }
        }
        Command::Refresh { source_id: None } => {
            let ingestor = build_ingestor(db, &config)?;
            let report = ingestor.refresh_all().await.context("Failed to refresh sources")?;
            print_report(&report, args.json)?;
        }
        Command::Sources { all } => {
            let sources = db.list_sources(!all).await.context("Failed to list sources")?;
            if args.json {
                println!("{}", serde_json::to_string_pretty(&sources)?);
            } else if sources.is_empty() {
                println!("No sources. Add one with: gleaner add <URL>");
            } else {
                for source in &sources {
                    println!(
                        "{:>4}  {}{}  {}",
                        source.id,
                        source.display_name(),
                        if source.is_active { "" } else { " (paused)" },
                        source.feed_url.as_deref().unwrap_or("-"),
                    );
                }
            }
        }
        Command::Posts {
            limit,
            offset,
            source,
        } => {
            let posts = match source {
                Some(source_id) => db.get_posts_for_source(source_id, Some(limit), offset).await,
                None => db.get_posts(Some(limit), offset).await,
            }
            .context("Failed to load posts")?;

            if args.json {
                println!("{}", serde_json::to_string_pretty(&posts)?);
            } else {
                let total = db.count_posts().await.context("Failed to count posts")?;
                for post in &posts {
                    println!(
                        "{:>6} {} {}  {}",
                        post.id,
                        if post.is_read { " " } else { "*" },
                        post.title,
                        post.external_link
                    );
                }
                println!("{} of {} posts", posts.len(), total);
            }
        }
        Command::Read { post_id } => {
            ensure_found(db.mark_read(post_id).await?, "post", post_id)?;
        }
        Command::Unread { post_id } => {
            ensure_found(db.mark_unread(post_id).await?, "post", post_id)?;
        }
        Command::Pause { source_id } => {
            ensure_found(db.set_source_active(source_id, false).await?, "source", source_id)?;
        }
        Command::Resume { source_id } => {
            ensure_found(db.set_source_active(source_id, true).await?, "source", source_id)?;
        }
        Command::Remove { source_id } => {
            ensure_found(db.delete_source(source_id).await?, "source", source_id)?;
            println!("Removed source {} and its posts.", source_id);
        }
    }

    Ok(())
}

fn build_ingestor(db: Database, config: &Config) -> Result<Ingestor> {
    let client = ReqwestClient::new(config.http_config()).context("Failed to build HTTP client")?;
    Ok(Ingestor::new(db, Arc::new(client), config.ingest_config()))
}

fn ensure_found(found: bool, kind: &str, id: i64) -> Result<()> {
    if !found {
        anyhow::bail!("No {} with id {}", kind, id);
    }
    Ok(())
}

fn print_report(report: &IngestReport, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }

    for outcome in &report.outcomes {
        match &outcome.error {
            None => println!(
                "ok    {}  {} found, {} added, {} skipped, {} rejected",
                outcome.url,
                outcome.posts_found,
                outcome.posts_added,
                outcome.posts_skipped(),
                outcome.posts_rejected
            ),
            Some(error) => println!("fail  {}  {}", outcome.url, error),
        }
    }
    println!(
        "{} succeeded, {} failed, {} posts added",
        report.succeeded(),
        report.failed(),
        report.posts_added()
    );
    Ok(())
}
