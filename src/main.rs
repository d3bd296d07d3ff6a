mod output;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use sheaf::backend::file::read_snapshot_meta;
use sheaf::utils::{default_connection_dir, tokenize_query};
use sheaf::{BackendKind, Connections, IndexDefinition, RecordStore, RecordType, SearchQuery, SheafConfig};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "sheaf")]
#[command(about = "Route application records into several search connections")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file (defaults to $SHEAF_CONFIG, then the app data dir)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// JSON array of records to index
    #[arg(short, long, global = true)]
    data: Option<PathBuf>,

    /// More log output (-v debug, -vv trace); RUST_LOG wins when set
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Args)]
struct Scope {
    /// Connection to act on (repeatable; all connections when omitted)
    #[arg(short, long)]
    using: Vec<String>,

    /// Record type to act on (repeatable; every handled type when omitted)
    #[arg(short, long)]
    model: Vec<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// List configured connections
    Connections,
    /// Index current records without clearing first
    Update {
        #[command(flatten)]
        scope: Scope,
    },
    /// Clear, then index current records
    Reindex {
        #[command(flatten)]
        scope: Scope,
    },
    /// Delete indexed documents
    Clear {
        #[command(flatten)]
        scope: Scope,
    },
    /// Search one connection (put `--` before queries starting with `-`)
    Search {
        query: Vec<String>,

        /// Connection to search (default connection when omitted)
        #[arg(short, long)]
        using: Option<String>,

        /// Restrict to a record type (repeatable)
        #[arg(short, long)]
        model: Vec<String>,

        /// Sort key, `-field` for descending (repeatable)
        #[arg(short, long, allow_hyphen_values = true)]
        order_by: Vec<String>,

        #[arg(short, long, default_value_t = 20)]
        limit: usize,

        #[arg(long, default_value_t = 0)]
        offset: usize,

        /// Print stored fields under each hit
        #[arg(short, long)]
        fields: bool,

        /// Print results as JSON
        #[arg(long)]
        json: bool,

        #[arg(long)]
        no_color: bool,
    },
    /// Count matching documents
    Count {
        query: Vec<String>,

        #[arg(short, long)]
        using: Option<String>,

        #[arg(short, long)]
        model: Vec<String>,

        /// Break the count down per record type
        #[arg(long)]
        by_model: bool,
    },
    /// Show per-connection statistics
    Stats {
        #[arg(short, long)]
        using: Vec<String>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = SheafConfig::load(cli.config.as_deref())?;
    let connections = Connections::new(config).context("Invalid configuration")?;

    match cli.command {
        Commands::Connections => list_connections(&connections)?,
        Commands::Update { scope } => {
            let store = load_store(cli.data.as_deref())?;
            for_each_index(&connections, &scope, |index, name| {
                let indexed = index.update(&connections, &store, Some(name))?;
                println!("{}: indexed {} {} records", name, indexed, index.record_type);
                Ok(())
            })?;
        }
        Commands::Reindex { scope } => {
            let store = load_store(cli.data.as_deref())?;
            for_each_index(&connections, &scope, |index, name| {
                let indexed = index.reindex(&connections, &store, Some(name))?;
                println!("{}: reindexed {} {} records", name, indexed, index.record_type);
                Ok(())
            })?;
        }
        Commands::Clear { scope } => {
            for_each_index(&connections, &scope, |index, name| {
                index.clear(&connections, Some(name))?;
                println!("{}: cleared {}", name, index.name);
                Ok(())
            })?;
        }
        Commands::Search {
            query,
            using,
            model,
            order_by,
            limit,
            offset,
            fields,
            json,
            no_color,
        } => {
            let query_string = query.join(" ");
            let mut search = build_query(&connections, &query_string, using.as_deref(), &model)?
                .limit(limit)
                .offset(offset);
            for key in &order_by {
                search = search.order_by(key);
            }

            let results = search.execute()?;
            if json {
                output::print_json(&results)?;
            } else if results.results.is_empty() {
                println!("No results");
            } else {
                output::print_hits(&results, &tokenize_query(&query_string), !no_color, fields)?;
            }
        }
        Commands::Count {
            query,
            using,
            model,
            by_model,
        } => {
            let search = build_query(&connections, &query.join(" "), using.as_deref(), &model)?;
            if by_model {
                let unified = connections.get_unified_index(search.connection())?;
                let mut counts = Vec::new();
                for record_type in unified.indexed_types() {
                    if model.is_empty() || model.iter().any(|m| m == record_type.as_str()) {
                        counts.push((record_type.clone(), search.models([record_type.clone()]).count()?));
                    }
                }
                output::print_type_counts(&counts, true)?;
            } else {
                println!("{}", search.count()?);
            }
        }
        Commands::Stats { using } => show_stats(&connections, &using)?,
    }

    Ok(())
}

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "sheaf=debug,info",
        _ => "sheaf=trace,debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_store(data: Option<&Path>) -> Result<RecordStore> {
    let Some(path) = data else {
        bail!("--data <records.json> is required to index records");
    };
    let store = RecordStore::new();
    store
        .load_file(path)
        .with_context(|| format!("Failed to load records from {}", path.display()))?;
    Ok(store)
}

/// Connections named by `using`, or all of them
fn target_connections<'a>(connections: &'a Connections, using: &'a [String]) -> Result<Vec<&'a str>> {
    if using.is_empty() {
        return Ok(connections.names().collect());
    }
    using
        .iter()
        .map(|name| connections.resolve(Some(name.as_str())).map_err(Into::into))
        .collect()
}

fn for_each_index<F>(connections: &Connections, scope: &Scope, mut action: F) -> Result<()>
where
    F: FnMut(&IndexDefinition, &str) -> Result<()>,
{
    for model in &scope.model {
        let record_type = RecordType::from(model.as_str());
        if !connections
            .registered_indexes()
            .iter()
            .any(|index| index.record_type == record_type)
        {
            bail!("No index is registered for record type '{}'", model);
        }
    }

    for name in target_connections(connections, &scope.using)? {
        let unified = connections.get_unified_index(name)?;
        for index in unified.collect_indexes() {
            if scope.model.is_empty() || scope.model.iter().any(|m| m == index.record_type.as_str()) {
                action(&index, name)?;
            }
        }
    }
    Ok(())
}

fn build_query(
    connections: &Arc<Connections>,
    query_string: &str,
    using: Option<&str>,
    models: &[String],
) -> Result<SearchQuery> {
    let mut query = SearchQuery::new(Arc::clone(connections));
    if let Some(name) = using {
        query = query.using(name)?;
    }
    Ok(query.filter(query_string).models(models.iter().map(String::as_str)))
}

fn list_connections(connections: &Connections) -> Result<()> {
    let writes = connections.router().for_write();

    for name in connections.names() {
        let config = connections.connection(name)?;
        let unified = connections.get_unified_index(name)?;
        let types: Vec<_> = unified.indexed_types().map(RecordType::as_str).collect();

        let mut flags = Vec::new();
        if name == connections.default_name() {
            flags.push("default");
        }
        if writes.iter().any(|w| w == name) {
            flags.push("write");
        }

        println!(
            "{:20} {:8} [{}] {}",
            name,
            config.engine,
            types.join(", "),
            if flags.is_empty() {
                String::new()
            } else {
                format!("({})", flags.join(", "))
            }
        );
    }
    Ok(())
}

fn show_stats(connections: &Arc<Connections>, using: &[String]) -> Result<()> {
    println!("Connection Statistics");
    println!("=====================");

    for name in target_connections(connections, using)? {
        let config = connections.connection(name)?;
        let backend = connections.get_backend(name)?;
        let unified = connections.get_unified_index(name)?;
        let query = connections.get_query(name)?;

        println!();
        println!("Connection:       {}", name);
        println!("Engine:           {}", backend.kind());
        if config.engine == BackendKind::File {
            let dir = match &config.path {
                Some(path) => path.clone(),
                None => default_connection_dir(name)?,
            };
            println!("Path:             {}", dir.display());
            if let Some(meta) = read_snapshot_meta(&dir)? {
                println!("Updated:          {}", format_timestamp(meta.updated_at));
            }
        }
        println!("Documents:        {}", backend.document_count()?);

        for record_type in unified.indexed_types() {
            let count = query.models([record_type.clone()]).count()?;
            println!("  {:15} {}", record_type.as_str(), count);
        }
    }
    Ok(())
}

fn format_timestamp(secs: u64) -> String {
    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);

    let ago = now.saturating_sub(secs);
    if ago < 60 {
        format!("{} seconds ago", ago)
    } else if ago < 3600 {
        format!("{} minutes ago", ago / 60)
    } else if ago < 86400 {
        format!("{} hours ago", ago / 3600)
    } else {
        format!("{} days ago", ago / 86400)
    }
}
