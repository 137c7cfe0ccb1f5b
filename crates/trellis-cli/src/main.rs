//! CLI entry point for the Trellis engine.
//!
//! Edits are read as JSON from stdin; every result is printed as JSON on stdout.
//! Logs go to stderr.

use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, EnvFilter};

use trellis_core::edits::{parse_bulk_edits, parse_edits};
use trellis_core::{ConnectionId, EntryId, PropertyId, SiteId, TrellisConfig};
use trellis_graph::properties::PropertyQuery;
use trellis_graph::relationships::RelationshipQuery;
use trellis_graph::{EditEngine, GraphClient, GraphConfig};

#[derive(Parser)]
#[command(name = "trellis")]
#[command(about = "Property and relationship engine for the Trellis knowledge graph")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Site to operate on.
    #[arg(long, global = true)]
    site_id: Option<String>,

    /// Config file prefix (default: trellis).
    #[arg(short, long, default_value = "trellis", global = true)]
    config: String,
}

#[derive(Subcommand)]
enum Command {
    /// Create constraints and indexes.
    InitSchema,
    /// Apply a JSON array of edits from stdin in one transaction.
    Apply,
    /// Reconcile a JSON array of bulk edits from stdin.
    Bulk {
        #[arg(long)]
        connection_id: String,
    },
    /// List the ancestors of an entry.
    Ancestors {
        #[arg(long)]
        entry_id: String,
    },
    /// Resolve property values of an entry.
    Properties {
        #[arg(long)]
        entry_id: String,
        #[arg(long)]
        max_importance: Option<i64>,
        #[arg(long)]
        skip: Option<usize>,
        #[arg(long)]
        limit: Option<usize>,
        #[arg(long)]
        property_id: Option<String>,
    },
    /// List relationship facts of an entry in both directions.
    Relationships {
        #[arg(long)]
        entry_id: String,
        #[arg(long)]
        rel_type_id: Option<String>,
        #[arg(long)]
        skip: Option<usize>,
        #[arg(long)]
        limit: Option<usize>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .json()
        .init();

    let cli = Cli::parse();
    let config = TrellisConfig::load(&cli.config)?;

    let graph = GraphClient::connect(&GraphConfig::from(&config.neo4j)).await?;
    let engine_config = &config.engine;

    match cli.command {
        Command::InitSchema => {
            graph.ensure_schema().await?;
        }
        Command::Apply => {
            let site_id = resolve_site_id(cli.site_id.as_deref())?;
            let edits = parse_edits(&std::io::read_to_string(std::io::stdin())?)?;
            let results = EditEngine::new(graph).apply_edits(&site_id, &edits).await?;
            println!("{}", serde_json::to_string(&results)?);
        }
        Command::Bulk { ref connection_id } => {
            let site_id = resolve_site_id(cli.site_id.as_deref())?;
            let connection_id: ConnectionId = connection_id.parse()?;
            let edits = parse_bulk_edits(&std::io::read_to_string(std::io::stdin())?)?;
            let outcome = EditEngine::new(graph)
                .apply_bulk(&site_id, &connection_id, &edits)
                .await?;
            println!("{}", serde_json::to_string(&outcome)?);
        }
        Command::Ancestors { ref entry_id } => {
            let site_id = resolve_site_id(cli.site_id.as_deref())?;
            let entry_id: EntryId = entry_id.parse()?;
            let ancestors = graph
                .get_ancestors(&site_id, &entry_id, engine_config.max_ancestor_depth)
                .await?;
            println!("{}", serde_json::to_string(&ancestors)?);
        }
        Command::Properties {
            ref entry_id,
            max_importance,
            skip,
            limit,
            ref property_id,
        } => {
            let site_id = resolve_site_id(cli.site_id.as_deref())?;
            let entry_id: EntryId = entry_id.parse()?;
            let mut query = PropertyQuery::from_config(engine_config);
            if let Some(max_importance) = max_importance {
                query.max_importance = max_importance;
            }
            query.skip = skip.unwrap_or(query.skip);
            query.limit = limit.unwrap_or(query.limit);
            query.specific_property_id = property_id
                .as_deref()
                .map(str::parse::<PropertyId>)
                .transpose()?;
            let page = graph
                .get_entry_properties(&site_id, &entry_id, &query, engine_config.max_ancestor_depth)
                .await?;
            println!("{}", serde_json::to_string(&page)?);
        }
        Command::Relationships {
            ref entry_id,
            ref rel_type_id,
            skip,
            limit,
        } => {
            let site_id = resolve_site_id(cli.site_id.as_deref())?;
            let entry_id: EntryId = entry_id.parse()?;
            let mut query = RelationshipQuery::from_config(engine_config);
            query.rel_type_id = rel_type_id
                .as_deref()
                .map(str::parse::<PropertyId>)
                .transpose()?;
            query.skip = skip.unwrap_or(query.skip);
            query.limit = limit.unwrap_or(query.limit);
            let groups = graph
                .get_entry_direct_relationship_facts(&site_id, &entry_id, &query)
                .await?;
            println!("{}", serde_json::to_string(&groups)?);
        }
    }

    Ok(())
}

fn resolve_site_id(raw: Option<&str>) -> anyhow::Result<SiteId> {
    let raw = raw.ok_or_else(|| anyhow::anyhow!("--site-id is required for this command"))?;
    Ok(raw.parse()?)
}
