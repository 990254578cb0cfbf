//! itemflow CLI: operator interface to item event logs and workflow
//! dispatch.

use chrono::Utc;
use clap::{Parser, Subcommand, ValueEnum};
use itemflow::component::ComponentRegistry;
use itemflow::config::Config;
use itemflow::db::Db;
use itemflow::engine::{CommandComponent, DispatchConfig, Dispatcher};
use itemflow::model::{EventOutcome, Item, ItemKey, NewItem, TriggerQuery};
use itemflow::telemetry::{TelemetryConfig, TelemetryGuard, init_telemetry};
use itemflow::{EventClient, EventRecord};
use secrecy::ExposeSecret;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "itemflow", about = "Event logs and triggers for digitization workflows")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a dispatcher for every component profile
    Serve {
        /// Directory containing component TOML profiles
        #[arg(long, default_value = "components")]
        components: PathBuf,
        /// Maximum concurrent runs per component, unless its profile says otherwise
        #[arg(long, default_value_t = 4)]
        max_concurrent: usize,
        /// Seconds between eligibility queries
        #[arg(long, default_value_t = 5)]
        poll_secs: u64,
    },
    /// Item operations
    Item {
        #[command(subcommand)]
        action: ItemAction,
    },
    /// Event log operations
    Event {
        #[command(subcommand)]
        action: EventAction,
    },
    /// Truncate an item's log so the workflow re-runs
    Restart {
        /// Item key or external id
        item: String,
        /// Restart from this step; defaults to the first failure
        #[arg(long)]
        from: Option<String>,
    },
    /// List items eligible for a step
    Find {
        /// Step that must have succeeded (repeatable)
        #[arg(long)]
        success: Vec<String>,
        /// Step that must have failed (repeatable)
        #[arg(long)]
        failure: Vec<String>,
        /// Step that must be absent or older than the last log change (repeatable)
        #[arg(long)]
        stale: Vec<String>,
        /// Step that must not appear at all (repeatable)
        #[arg(long)]
        forbid: Vec<String>,
        /// Restrict to one item kind
        #[arg(long = "type")]
        item_type: Option<String>,
        /// Include event details
        #[arg(long)]
        details: bool,
        /// Skip the exact re-check and list raw index candidates
        #[arg(long)]
        unchecked: bool,
        /// Maximum items to show
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
}

#[derive(Subcommand)]
enum ItemAction {
    /// Register an item, or show the existing one for the external id
    Register {
        external_id: String,
        #[arg(long = "type")]
        item_type: Option<String>,
    },
    /// Show an item and its log
    Show {
        /// Item key or external id
        item: String,
        /// Print the item as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum OutcomeArg {
    Success,
    Failure,
}

impl From<OutcomeArg> for EventOutcome {
    fn from(arg: OutcomeArg) -> Self {
        match arg {
            OutcomeArg::Success => EventOutcome::Success,
            OutcomeArg::Failure => EventOutcome::Failure,
        }
    }
}

#[derive(Subcommand)]
enum EventAction {
    /// Record a step event
    Append {
        /// Item key or external id
        item: String,
        event_id: String,
        #[arg(long, value_enum, default_value = "success")]
        outcome: OutcomeArg,
        #[arg(long, default_value = "")]
        details: String,
        /// Defaults to ITEMFLOW_AGENT
        #[arg(long)]
        agent: Option<String>,
        /// Insert at the head of the log instead of the tail
        #[arg(long)]
        prepend: bool,
    },
    /// Remove every occurrence of a step event
    Remove {
        /// Item key or external id
        item: String,
        event_id: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let config = Config::from_env()?;
    let _guard = telemetry(&config, matches!(cli.command, Command::Serve { .. }))?;

    let db = Arc::new(Db::connect(config.database_url.expose_secret()).await?);
    db.migrate().await?;
    let client = Arc::new(EventClient::new(
        db.clone(),
        db.clone(),
        config.client_settings(),
    ));

    match cli.command {
        Command::Serve {
            components,
            max_concurrent,
            poll_secs,
        } => cmd_serve(client, components, max_concurrent, poll_secs).await,
        Command::Item { action } => match action {
            ItemAction::Register {
                external_id,
                item_type,
            } => {
                let mut new = NewItem::new(external_id);
                if let Some(kind) = item_type {
                    new = new.item_type(kind);
                }
                let item = client.register_item(new).await?;
                println!("{}", item.key);
                Ok(())
            }
            ItemAction::Show { item, json } => {
                let item = resolve(&client, &item).await?;
                if json {
                    println!("{}", serde_json::to_string_pretty(&item)?);
                } else {
                    print_item(&item);
                }
                Ok(())
            }
        },
        Command::Event { action } => match action {
            EventAction::Append {
                item,
                event_id,
                outcome,
                details,
                agent,
                prepend,
            } => {
                let key = resolve(&client, &item).await?.key;
                let record = EventRecord {
                    agent: agent.unwrap_or_else(|| config.agent.clone()),
                    timestamp: Utc::now(),
                    details,
                    event_id,
                    outcome: outcome.into(),
                };
                let version = if prepend {
                    client.prepend_event(&key, record).await?
                } else {
                    client.append_event(&key, record).await?
                };
                println!("{key} now at {version}");
                Ok(())
            }
            EventAction::Remove { item, event_id } => {
                let key = resolve(&client, &item).await?.key;
                let removed = client.remove_events(&key, &event_id).await?;
                println!("removed {removed} event(s) from {key}");
                Ok(())
            }
        },
        Command::Restart { item, from } => {
            let key = resolve(&client, &item).await?.key;
            let removed = client
                .trigger_workflow_restart(&key, from.as_deref(), config.retry_policy())
                .await?;
            println!("removed {removed} event(s) from {key}");
            Ok(())
        }
        Command::Find {
            success,
            failure,
            stale,
            forbid,
            item_type,
            details,
            unchecked,
            limit,
        } => {
            let mut query = TriggerQuery::new();
            query.required_success.extend(success);
            query.required_failure.extend(failure);
            query.stale_or_absent.extend(stale);
            query.forbidden.extend(forbid);
            query.item_type = item_type;

            let mut shown = 0;
            if unchecked {
                let mut candidates = client.search_candidates(&query, details);
                while shown < limit {
                    let Some(item) = candidates.next().await? else { break };
                    print_row(&item);
                    shown += 1;
                }
            } else {
                let mut eligible = client.find_eligible_items(&query, details);
                while shown < limit {
                    let Some(item) = eligible.next().await? else { break };
                    print_row(&item);
                    shown += 1;
                }
            }
            println!("\n{shown} item(s)");
            Ok(())
        }
    }
}

/// Operator commands log to stderr only; `serve` also exports.
fn telemetry(config: &Config, export: bool) -> anyhow::Result<TelemetryGuard> {
    let guard = init_telemetry(TelemetryConfig {
        endpoint: if export {
            config.otel_endpoint.clone()
        } else {
            None
        },
        service_name: "itemflow".to_string(),
        log_level: config.log_level.clone(),
    })?;
    Ok(guard)
}

async fn cmd_serve(
    client: Arc<EventClient>,
    components: PathBuf,
    max_concurrent: usize,
    poll_secs: u64,
) -> anyhow::Result<()> {
    let registry = ComponentRegistry::load_from_dir(&components)?;
    if registry.is_empty() {
        anyhow::bail!("no component profiles in {}", components.display());
    }

    let mut dispatchers = Vec::new();
    for name in registry.names() {
        let Some(profile) = registry.get(name) else { continue };
        let config = DispatchConfig {
            poll_interval: Duration::from_secs(poll_secs.max(1)),
            max_concurrent: profile.max_concurrent.unwrap_or(max_concurrent),
        };
        dispatchers.push(Dispatcher::new(
            Arc::clone(&client),
            Arc::new(CommandComponent::new(profile.clone())),
            profile.trigger.clone(),
            config,
        ));
    }

    let handles: Vec<Dispatcher> = dispatchers.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        for dispatcher in &handles {
            dispatcher.shutdown();
        }
    });

    let mut running = tokio::task::JoinSet::new();
    for dispatcher in dispatchers {
        running.spawn(async move { dispatcher.run().await });
    }
    while let Some(joined) = running.join_next().await {
        joined??;
    }
    Ok(())
}

/// Accept either an item key or an external id.
async fn resolve(client: &EventClient, reference: &str) -> anyhow::Result<Item> {
    match client.get_item(&ItemKey::from(reference)).await {
        Ok(item) => Ok(item),
        Err(itemflow::Error::NotFound(_)) => Ok(client.find_item_by_external_id(reference).await?),
        Err(e) => Err(e.into()),
    }
}

fn print_row(item: &Item) {
    let newest = item
        .events
        .last()
        .map(|e| format!("{} ({})", e.event_id, e.outcome))
        .unwrap_or_else(|| "-".to_string());
    println!(
        "{:<42}  {:<24}  {:<10}  {}",
        item.key,
        item.external_id.as_deref().unwrap_or("-"),
        item.item_type.as_deref().unwrap_or("-"),
        newest
    );
}

fn print_item(item: &Item) {
    println!("Key:           {}", item.key);
    println!("External ID:   {}", item.external_id.as_deref().unwrap_or("-"));
    println!("Type:          {}", item.item_type.as_deref().unwrap_or("-"));
    println!("Last Modified: {}", item.last_modified);
    println!("---");
    for event in &item.events {
        println!(
            "{}  {:<28}  {:<8}  {}",
            event.timestamp.format("%Y-%m-%d %H:%M:%S"),
            event.event_id,
            event.outcome,
            event.agent
        );
        match event.details.as_deref() {
            Some(details) if !details.is_empty() => println!("    {details}"),
            _ => {}
        }
    }
    println!("\n{} event(s)", item.events.len());
}
