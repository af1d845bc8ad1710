//! worktrack CLI: operator interface to the work tracker.

use std::sync::Arc;

use clap::{Parser, Subcommand};
use worktrack::config::Config;
use worktrack::config::secrets::ExposeSecret;
use worktrack::connector::{ConnectorCatalog, ConnectorRegistry};
use worktrack::db::{Db, RedisCounters};
use worktrack::engine::WorkTracker;
use worktrack::model::{CreateWorkOptions, ErrorData, Work, WorkId, WorkStatus};
use worktrack::store::{WorkFilter, WorkQuery};
use worktrack::telemetry::{TelemetryConfig, init_telemetry};

#[derive(Parser)]
#[command(name = "worktrack", about = "Track connector works from creation to completion")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Apply database migrations
    Migrate,
    /// Work operations
    Work {
        #[command(subcommand)]
        action: WorkAction,
    },
    /// Report progress on a work
    Report {
        #[command(subcommand)]
        action: ReportAction,
    },
    /// Register more expected sub-items for a work
    Expect {
        id: String,
        /// Number of sub-items to add
        count: u32,
    },
    /// Delete a connector's expired completed works
    Gc { connector_id: String },
    /// Show in-flight or failed exports of a source
    Exports { source_id: String },
}

#[derive(Subcommand)]
enum WorkAction {
    /// Create a work for a registered connector
    Create {
        #[arg(long)]
        connector: String,
        #[arg(long)]
        user: String,
        #[arg(long)]
        name: String,
        #[arg(long)]
        source: String,
        /// Mark the work as already received by the connector
        #[arg(long)]
        received: bool,
    },
    /// List works, newest first
    List {
        #[arg(long)]
        connector: Option<String>,
        #[arg(long)]
        source: Option<String>,
        /// Filter by status (waiting, in_progress, complete)
        #[arg(long)]
        status: Option<String>,
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// Show a work with its live counters
    Show { id: String },
    /// Bump a work's heartbeat
    Ping { id: String },
    /// Delete one work
    Delete { id: String },
    /// Delete every work of a source
    DeleteSource { source_id: String },
    /// Delete every work of a connector
    DeleteConnector { connector_id: String },
}

#[derive(Subcommand)]
enum ReportAction {
    /// The connector picked the work up
    Received {
        id: String,
        #[arg(long)]
        message: Option<String>,
    },
    /// The connector finished processing
    Processed {
        id: String,
        #[arg(long)]
        message: Option<String>,
        /// Record the message as an error
        #[arg(long)]
        error: bool,
    },
    /// One sub-item was handled
    Action {
        id: String,
        /// Error raised while handling the sub-item
        #[arg(long, requires = "error_source")]
        error: Option<String>,
        #[arg(long)]
        error_source: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let config = Config::from_env()?;

    let _guard = init_telemetry(TelemetryConfig {
        endpoint: config.otel_endpoint.clone(),
        service_name: "worktrack".to_string(),
        default_level: config.log_level.clone(),
    })?;

    let db = Db::connect(config.database_url.expose_secret()).await?;
    db.migrate().await?;
    if let Command::Migrate = cli.command {
        println!("Migrations applied.");
        return Ok(());
    }

    let counters =
        RedisCounters::connect(config.redis_url.expose_secret(), &config.counter_key_prefix)
            .await?;
    let catalog = if config.connectors_dir.is_dir() {
        Arc::new(ConnectorCatalog::load_from_dir(&config.connectors_dir)?)
    } else {
        tracing::warn!(
            dir = %config.connectors_dir.display(),
            "connector dir missing, no connectors registered"
        );
        Arc::new(ConnectorCatalog::empty())
    };

    let tracker = WorkTracker::new(Arc::new(db), Arc::new(counters), catalog.clone())
        .with_config(config.tracker.clone());

    match cli.command {
        Command::Migrate => Ok(()),
        Command::Work { action } => cmd_work(&tracker, catalog.as_ref(), action).await,
        Command::Report { action } => cmd_report(&tracker, action).await,
        Command::Expect { id, count } => {
            let expected = tracker.add_expectations(&WorkId(id), count).await?;
            println!("Expected: {expected}");
            Ok(())
        }
        Command::Gc { connector_id } => {
            let deleted = tracker.purge_expired(&connector_id).await?;
            println!("Deleted {deleted} expired work(s).");
            Ok(())
        }
        Command::Exports { source_id } => {
            let files = tracker.export_progress(&source_id).await?;
            println!("{}", serde_json::to_string_pretty(&files)?);
            Ok(())
        }
    }
}

async fn cmd_work(
    tracker: &WorkTracker,
    catalog: &ConnectorCatalog,
    action: WorkAction,
) -> anyhow::Result<()> {
    match action {
        WorkAction::Create {
            connector,
            user,
            name,
            source,
            received,
        } => {
            let connector = catalog
                .get(&connector)
                .await?
                .ok_or_else(|| anyhow::anyhow!("unknown connector '{connector}'"))?;
            let mut options = CreateWorkOptions::default();
            if received {
                options = options.received_at(chrono::Utc::now());
            }
            let work = tracker
                .create_work(&user, &connector, &name, &source, options)
                .await?;
            println!("Created: {} (status: {})", work.id, work.status);
        }
        WorkAction::List {
            connector,
            source,
            status,
            limit,
        } => {
            let status = status
                .map(|s| s.parse::<WorkStatus>())
                .transpose()?;
            let filter = WorkFilter {
                connector_id: connector,
                source_id: source,
                status,
                ..Default::default()
            };
            let works = tracker.list_works(&WorkQuery::new(filter, limit)).await?;
            print_work_table(&works);
        }
        WorkAction::Show { id } => {
            let id = WorkId(id);
            let progress = tracker
                .work_progress(&id)
                .await?
                .ok_or_else(|| anyhow::anyhow!("no work '{id}'"))?;
            print_work(&progress.work);
            println!(
                "Counters:   {} / {} processed",
                progress.processed.map_or("-".to_string(), |n| n.to_string()),
                progress.expected.map_or("-".to_string(), |n| n.to_string()),
            );
        }
        WorkAction::Ping { id } => {
            let work = tracker.ping_work(&WorkId(id)).await?;
            println!("Pinged: {} at {}", work.id, work.updated_at);
        }
        WorkAction::Delete { id } => {
            tracker.delete_work(&WorkId(id.clone())).await?;
            println!("Deleted: {id}");
        }
        WorkAction::DeleteSource { source_id } => {
            let deleted = tracker.delete_work_for_source(&source_id).await?;
            println!("Deleted {deleted} work(s) for source {source_id}.");
        }
        WorkAction::DeleteConnector { connector_id } => {
            let deleted = tracker.delete_work_for_connector(&connector_id).await?;
            println!("Deleted {deleted} work(s) for connector {connector_id}.");
        }
    }
    Ok(())
}

async fn cmd_report(tracker: &WorkTracker, action: ReportAction) -> anyhow::Result<()> {
    match action {
        ReportAction::Received { id, message } => {
            let work = tracker
                .report_received(&WorkId(id), message.as_deref())
                .await?;
            println!("{}: {}", work.id, work.status);
        }
        ReportAction::Processed { id, message, error } => {
            let work = tracker
                .report_processed(&WorkId(id), message.as_deref(), error)
                .await?;
            println!("{}: {}", work.id, work.status);
        }
        ReportAction::Action {
            id,
            error,
            error_source,
        } => {
            let error_data = error.map(|e| ErrorData::new(e, error_source.unwrap_or_default()));
            let tick = tracker.report_action(&WorkId(id), error_data).await?;
            println!(
                "processed {} ({})",
                tick.total,
                if tick.is_complete { "complete" } else { "pending" }
            );
        }
    }
    Ok(())
}

fn print_work_table(works: &[Work]) {
    if works.is_empty() {
        println!("No works found.");
        return;
    }

    println!(
        "{:<36}  {:<22}  {:<11}  {:<24}  CREATED",
        "ID", "TYPE", "STATUS", "NAME"
    );
    println!("{}", "-".repeat(115));

    for work in works {
        let name = if work.name.chars().count() > 24 {
            work.name.chars().take(24).collect::<String>()
        } else {
            work.name.clone()
        };
        println!(
            "{:<36}  {:<22}  {:<11}  {:<24}  {}",
            work.id,
            work.work_type.to_string(),
            work.status.to_string(),
            name,
            work.timestamp.format("%Y-%m-%d %H:%M")
        );
    }

    println!("\n{} work(s)", works.len());
}

fn print_work(work: &Work) {
    println!("ID:         {}", work.id);
    println!("Name:       {}", work.name);
    println!("Type:       {}", work.work_type);
    println!("Status:     {}", work.status);
    println!("Source:     {}", work.source_id);
    println!("Connector:  {}", work.connector_id);
    println!("User:       {}", work.user_id);
    println!("Created:    {}", work.timestamp);
    println!("Updated:    {}", work.updated_at);
    if let Some(t) = work.received_time {
        println!("Received:   {t}");
    }
    if let Some(t) = work.processed_time {
        println!("Processed:  {t}");
    }
    if let Some(t) = work.completed_time {
        println!(
            "Completed:  {t} ({} item(s))",
            work.completed_count.unwrap_or_default()
        );
    }
    for entry in &work.messages {
        println!("  [msg] {} {}", entry.timestamp.format("%H:%M:%S"), entry.message);
    }
    for entry in &work.errors {
        println!(
            "  [err] {} {} ({})",
            entry.timestamp.format("%H:%M:%S"),
            entry.message,
            entry.source.as_deref().unwrap_or("-")
        );
    }
}
