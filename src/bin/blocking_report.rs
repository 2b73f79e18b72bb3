//! Offline blocking report.
//!
//! Loads a JSON array of entities, builds the blocking indexes, computes the
//! candidate set of every entity and prints index statistics plus the monitor
//! report as JSON on stdout.

use std::collections::{BTreeMap, BTreeSet};
use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;
use tracing::info;
use tracing_subscriber::EnvFilter;

use identilink::{
    BlockingEngine, BlockingStrategy, EngineConfig, Entity, EntityId, IndexStats,
    InMemoryEntityStore, PerformanceMonitor, PerformanceReport, ThresholdWarning,
};

/// Tool configuration
struct Config {
    /// Entity file; `None` reads stdin
    input: Option<PathBuf>,
    strategy: BlockingStrategy,
    /// Page size for an incremental rebuild; full rebuild when absent
    batch_size: Option<usize>,
    /// Include every candidate set in the output
    list_candidates: bool,
}

fn parse_args() -> Config {
    let args: Vec<String> = std::env::args().collect();
    let mut config = Config {
        input: None,
        strategy: BlockingStrategy::MultiPass,
        batch_size: None,
        list_candidates: false,
    };

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--input" | "-i" => {
                if i + 1 < args.len() {
                    let v = &args[i + 1];
                    config.input = (v != "-").then(|| PathBuf::from(v));
                    i += 2;
                } else {
                    eprintln!("error: --input requires a value");
                    std::process::exit(1);
                }
            }
            "--strategy" | "-s" => {
                if i + 1 < args.len() {
                    config.strategy = args[i + 1].parse().unwrap_or_else(|e| {
                        eprintln!("error: {e}");
                        std::process::exit(1);
                    });
                    i += 2;
                } else {
                    eprintln!("error: --strategy requires a value");
                    std::process::exit(1);
                }
            }
            "--batch-size" | "-b" => {
                if i + 1 < args.len() {
                    let n: usize = args[i + 1].parse().unwrap_or_else(|_| {
                        eprintln!("error: invalid batch size: {}", args[i + 1]);
                        std::process::exit(1);
                    });
                    config.batch_size = Some(n);
                    i += 2;
                } else {
                    eprintln!("error: --batch-size requires a value");
                    std::process::exit(1);
                }
            }
            "--candidates" | "-c" => {
                config.list_candidates = true;
                i += 1;
            }
            "--help" | "-h" => {
                println!("blocking-report - candidate-set report for an entity file");
                println!();
                println!("USAGE:");
                println!("    blocking-report [OPTIONS]");
                println!();
                println!("OPTIONS:");
                println!("    -i, --input <FILE>        JSON array of entities, '-' for stdin [default: -]");
                println!("    -s, --strategy <NAME>     phonetic | identifier | department | multi_pass [default: multi_pass]");
                println!("    -b, --batch-size <N>      Rebuild incrementally in pages of N entities");
                println!("    -c, --candidates          Print every candidate set");
                println!("    -h, --help                Print help information");
                println!();
                println!("Logging is controlled by RUST_LOG [default: info]; configuration by IDENTILINK_* variables.");
                std::process::exit(0);
            }
            arg => {
                eprintln!("error: unknown argument: {arg}");
                std::process::exit(1);
            }
        }
    }

    config
}

#[derive(Serialize)]
struct Output {
    strategy: String,
    entities: usize,
    indexed: usize,
    skipped: usize,
    index: IndexStats,
    mean_candidates: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    candidates: Option<BTreeMap<EntityId, BTreeSet<EntityId>>>,
    warnings: Vec<String>,
    report: PerformanceReport,
}

fn load(input: Option<&PathBuf>) -> Result<Vec<Entity>, Box<dyn std::error::Error>> {
    let raw = match input {
        Some(path) => std::fs::read_to_string(path)?,
        None => {
            let mut buf = String::new();
            std::io::stdin().read_to_string(&mut buf)?;
            buf
        }
    };
    Ok(serde_json::from_str(&raw)?)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let config = parse_args();
    let engine_cfg = EngineConfig::from_env()?;

    let entities = load(config.input.as_ref())?;
    info!(entities = entities.len(), "entities loaded");

    let monitor = Arc::new(PerformanceMonitor::new(engine_cfg.monitor.clone()));
    let store = Arc::new(InMemoryEntityStore::with_entities(entities.clone()));
    let engine = BlockingEngine::new(store, Arc::clone(&monitor), engine_cfg.blocking.clone());

    let build = match config.batch_size {
        Some(n) => engine.incremental_rebuild(n)?,
        None => engine.build_indexes()?,
    };

    let mut total = 0usize;
    let mut candidates = BTreeMap::new();
    for entity in &entities {
        let set = engine.get_candidates(entity, config.strategy);
        total += set.len();
        if config.list_candidates {
            candidates.insert(entity.id.clone(), set.into_iter().collect::<BTreeSet<_>>());
        }
    }

    let warnings: Vec<ThresholdWarning> = monitor.check_thresholds();
    #[allow(clippy::cast_precision_loss)]
    let mean_candidates = if entities.is_empty() {
        0.0
    } else {
        total as f64 / entities.len() as f64
    };

    let output = Output {
        strategy: config.strategy.to_string(),
        entities: entities.len(),
        indexed: build.indexed,
        skipped: build.skipped,
        index: engine.stats(),
        mean_candidates,
        candidates: config.list_candidates.then_some(candidates),
        warnings: warnings.iter().map(ToString::to_string).collect(),
        report: monitor.shutdown(),
    };
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
