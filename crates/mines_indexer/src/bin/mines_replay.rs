use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;

use mines_indexer::{
    EntityStore, FileEntityStore, InMemoryEntityStore, IndexerConfig, PartitionedIndexer,
};
use mines_proto::EventEnvelope;

#[derive(Debug, Clone, PartialEq, Eq)]
struct CliOptions {
    events_path: PathBuf,
    config_path: Option<PathBuf>,
    store_dir: Option<PathBuf>,
    shards: Option<usize>,
}

fn main() {
    let raw_args: Vec<String> = env::args().skip(1).collect();
    if raw_args.iter().any(|arg| arg == "--help" || arg == "-h") {
        print_help();
        return;
    }

    let options = match parse_options(raw_args.iter().map(|arg| arg.as_str())) {
        Ok(options) => options,
        Err(err) => {
            eprintln!("{err}");
            print_help();
            process::exit(1);
        }
    };

    init_tracing();
    if let Err(err) = run_replay(&options) {
        eprintln!("replay failed: {err}");
        process::exit(1);
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_writer(std::io::stderr)
        .try_init();
}

fn run_replay(options: &CliOptions) -> Result<(), String> {
    let mut config = match &options.config_path {
        Some(path) => IndexerConfig::from_config_file(path),
        None => IndexerConfig::from_default_sources(),
    }
    .map_err(|err| err.to_string())?;
    if let Some(store_dir) = &options.store_dir {
        config.store_dir = Some(store_dir.clone());
    }
    if let Some(shards) = options.shards {
        config.shards = shards;
    }

    let events = read_events(&options.events_path)?;
    tracing::info!(
        events = events.len(),
        shards = config.shards,
        store = ?config.store_dir,
        "replay starting"
    );
    let summary = match config.store_dir.clone() {
        Some(dir) => replay(Arc::new(FileEntityStore::new(dir)), &config, events)?,
        None => replay(Arc::new(InMemoryEntityStore::new()), &config, events)?,
    };
    let rendered = serde_json::to_string_pretty(&summary)
        .map_err(|err| format!("render summary failed: {err}"))?;
    println!("{rendered}");
    Ok(())
}

fn replay<S>(
    store: Arc<S>,
    config: &IndexerConfig,
    events: Vec<EventEnvelope>,
) -> Result<serde_json::Value, String>
where
    S: EntityStore + Send + Sync + 'static,
{
    let indexer = PartitionedIndexer::start(store, config).map_err(|err| err.to_string())?;
    for envelope in events {
        indexer.submit(envelope).map_err(|err| err.to_string())?;
    }
    let flushed = indexer.flush();
    let stats = indexer.stats().map_err(|err| err.to_string())?;
    let report = indexer.report();
    let rejected: Vec<serde_json::Value> = indexer
        .rejected_events()
        .iter()
        .map(|rejected| {
            serde_json::json!({
                "event_id": rejected.event_id(),
                "kind": rejected.envelope.event.kind_label(),
                "error": rejected.error.to_string(),
            })
        })
        .collect();
    let unapplied = indexer.shutdown();
    if let Err(err) = flushed {
        return Err(format!(
            "{} events left unapplied: {err}",
            unapplied.len()
        ));
    }
    Ok(serde_json::json!({
        "stats": stats,
        "report": report,
        "rejected": rejected,
    }))
}

/// One JSON envelope per line; blank lines and `#` comments are skipped.
fn read_events(path: &Path) -> Result<Vec<EventEnvelope>, String> {
    let content = fs::read_to_string(path)
        .map_err(|err| format!("read events file failed ({}): {err}", path.display()))?;
    let mut events = Vec::new();
    for (index, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let envelope: EventEnvelope = serde_json::from_str(line)
            .map_err(|err| format!("{}:{}: invalid event: {err}", path.display(), index + 1))?;
        events.push(envelope);
    }
    Ok(events)
}

fn parse_options<'a>(args: impl Iterator<Item = &'a str>) -> Result<CliOptions, String> {
    let mut positional = Vec::new();
    let mut store_dir = None;
    let mut shards = None;
    let mut iter = args.peekable();

    while let Some(arg) = iter.next() {
        match arg {
            "--store-dir" => {
                store_dir = Some(PathBuf::from(parse_required_value(&mut iter, "--store-dir")?));
            }
            "--shards" => {
                let raw = parse_required_value(&mut iter, "--shards")?;
                let value = raw
                    .parse::<usize>()
                    .map_err(|_| format!("--shards must be a positive integer, got `{raw}`"))?;
                if value == 0 {
                    return Err("--shards must be >= 1".to_string());
                }
                shards = Some(value);
            }
            _ if arg.starts_with("--") => return Err(format!("unknown option: {arg}")),
            _ => positional.push(PathBuf::from(arg)),
        }
    }

    let mut positional = positional.into_iter();
    let events_path = positional
        .next()
        .ok_or_else(|| "missing <events.jsonl> argument".to_string())?;
    let config_path = positional.next();
    if let Some(extra) = positional.next() {
        return Err(format!("unexpected argument: {}", extra.display()));
    }

    Ok(CliOptions {
        events_path,
        config_path,
        store_dir,
        shards,
    })
}

fn parse_required_value<'a, I>(
    iter: &mut std::iter::Peekable<I>,
    flag: &str,
) -> Result<String, String>
where
    I: Iterator<Item = &'a str>,
{
    let value = iter
        .next()
        .ok_or_else(|| format!("{flag} requires a value"))?;
    if value.starts_with("--") {
        return Err(format!("{flag} requires a value"));
    }
    Ok(value.to_string())
}

fn print_help() {
    println!(
        "Usage: mines_replay <events.jsonl> [config.toml] [options]\n\n\
Replay a JSON-lines file of event envelopes through the indexer and print\n\
the resulting platform stats.\n\n\
Options:\n\
  --store-dir <dir>    persist entities as JSON files under <dir>\n\
  --shards <n>         number of worker shards\n\
  -h, --help           show help\n\n\
Env:\n\
  MINES_INDEXER_*      see mines_indexer.toml keys"
    );
}
