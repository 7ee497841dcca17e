//! Degraph CLI: validate rule files and replay change logs.
//!
//! Usage:
//!   degraph check --rules rules.yaml
//!   degraph run --rules rules.yaml --input changes.jsonl [--config engine.yaml] [--watch]

use clap::{Parser, Subcommand};
use degraph::{
    load_rules, ChangeEvent, ChangeRecord, DegraphEngine, EngineConfig, MemoryIndexSink, RuleFileWatcher,
};
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::Level;

#[derive(Parser)]
#[command(name = "degraph", version, about = "Graph-walking denormalization engine")]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse a rule file and list its rules
    Check {
        #[arg(long)]
        rules: PathBuf,
    },
    /// Replay a JSON-lines change log and print the resulting target documents
    Run {
        #[arg(long)]
        rules: PathBuf,
        /// One `{"index","type","id","document"}` object per line
        #[arg(long)]
        input: PathBuf,
        /// Engine configuration (defaults to the user config dir)
        #[arg(long)]
        config: Option<PathBuf>,
        /// Keep running after the replay and reapply the rule file on every edit
        #[arg(long)]
        watch: bool,
        /// How often --watch checks the rule file, in milliseconds
        #[arg(long, default_value_t = 1000)]
        poll_ms: u64,
    },
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();
}

fn cmd_check(rules: &Path) -> i32 {
    let registry = match load_rules(rules) {
        Ok(registry) => registry,
        Err(e) => {
            eprintln!("Error: {}", e);
            return 1;
        }
    };
    println!("{:<32}  {:<32}  {:>5}", "SOURCE", "TARGET", "WALKS");
    println!("{}", "-".repeat(73));
    for rule in registry.iter() {
        println!(
            "{:<32}  {:<32}  {:>5}",
            rule.source().to_string(),
            rule.target().to_string(),
            rule.walks().len()
        );
    }
    println!("{} rule(s) OK", registry.len());
    0
}

fn read_changes(input: &Path) -> Result<Vec<ChangeEvent>, String> {
    let file = std::fs::File::open(input).map_err(|e| format!("failed to open {}: {}", input.display(), e))?;
    let mut events = Vec::new();
    for (n, line) in BufReader::new(file).lines().enumerate() {
        let line = line.map_err(|e| format!("failed to read {}: {}", input.display(), e))?;
        if line.trim().is_empty() {
            continue;
        }
        let record: ChangeRecord =
            serde_json::from_str(&line).map_err(|e| format!("{}:{}: {}", input.display(), n + 1, e))?;
        events.push(record.into());
    }
    Ok(events)
}

fn print_targets(sink: &MemoryIndexSink) {
    for (target, document) in sink.snapshot() {
        let line = serde_json::json!({
            "index": target.index,
            "type": target.doc_type,
            "id": target.id,
            "document": document,
        });
        println!("{}", line);
    }
}

/// Poll the rule file until Ctrl-C, reloading the engine on each edit.
async fn watch_rules(engine: &DegraphEngine, sink: &MemoryIndexSink, mut watcher: RuleFileWatcher, poll_ms: u64) {
    let mut ticker = tokio::time::interval(Duration::from_millis(poll_ms.max(1)));
    eprintln!("watching {} (Ctrl-C to stop)", watcher.path().display());
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            _ = ticker.tick() => {}
        }
        let registry = match watcher.poll() {
            Ok(Some(registry)) => registry,
            Ok(None) => continue,
            Err(e) => {
                eprintln!("Error: {} (keeping current rules)", e);
                continue;
            }
        };
        match engine.reload_rules(registry).await {
            Ok(report) => {
                engine.drain().await;
                eprintln!(
                    "rules reloaded: {} changed key(s), {} resubmitted, {} retracted",
                    report.changed.len(),
                    report.resubmitted,
                    report.retracted
                );
                print_targets(sink);
            }
            Err(e) => eprintln!("Error: {} (keeping current rules)", e),
        }
    }
}

async fn cmd_run(rules: &Path, input: &Path, config: Option<&Path>, watch: bool, poll_ms: u64) -> i32 {
    let config = match EngineConfig::resolve(config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            return 1;
        }
    };
    // Taken before loading so an edit made in between is still seen.
    let watcher = watch.then(|| RuleFileWatcher::new(rules));
    let registry = match load_rules(rules) {
        Ok(registry) => registry,
        Err(e) => {
            eprintln!("Error: {}", e);
            return 1;
        }
    };
    let events = match read_changes(input) {
        Ok(events) => events,
        Err(e) => {
            eprintln!("Error: {}", e);
            return 1;
        }
    };

    let sink = Arc::new(MemoryIndexSink::new());
    let engine = match DegraphEngine::builder(registry).config(config).sink(sink.clone()).start() {
        Ok(engine) => engine,
        Err(e) => {
            eprintln!("Error: {}", e);
            return 1;
        }
    };

    for event in events {
        if let Err(e) = engine.submit(event) {
            eprintln!("Error: {}", e);
            return 1;
        }
    }
    engine.drain().await;
    print_targets(&sink);

    match serde_json::to_string_pretty(&engine.stats()) {
        Ok(stats) => eprintln!("{}", stats),
        Err(e) => eprintln!("Error: {}", e),
    }
    let dead = engine.dead_letters();
    for letter in &dead {
        eprintln!(
            "dead letter: {} ({}, {} attempts): {}",
            letter.id, letter.job, letter.attempts, letter.reason
        );
    }
    if let Some(watcher) = watcher {
        watch_rules(&engine, &sink, watcher, poll_ms).await;
    }
    engine.shutdown();

    if dead.is_empty() {
        0
    } else {
        2
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let code = match &cli.command {
        Commands::Check { rules } => cmd_check(rules),
        Commands::Run {
            rules,
            input,
            config,
            watch,
            poll_ms,
        } => cmd_run(rules, input, config.as_deref(), *watch, *poll_ms).await,
    };
    std::process::exit(code);
}
