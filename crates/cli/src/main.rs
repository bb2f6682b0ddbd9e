use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use pixelynth_api::{CatalogEngine, EngineConfig, EngineView, ViewStatus};
use pixelynth_core::{CatalogSnapshot, FacetState, FacetUpdate, Item};
use pixelynth_search::{Index, QueryDebugInfo};
use pixelynth_store::{ItemStore, JsonFileProvider};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::signal;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "pixelctl", version, about = "Pixelynth catalog CLI")]
struct Cli {
    /// Output format
    #[arg(short = 'o', long = "output", value_enum, global = true, default_value_t = Output::Human)]
    output: Output,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum Output { Human, Json }

#[derive(Subcommand, Debug)]
enum Commands {
    /// One-shot query over a catalog export
    Search {
        /// JSON export: array, {"items": [...]} or id-keyed object
        file: PathBuf,
        /// Free text; every word must match
        #[arg(default_value = "")]
        query: String,
        #[arg(long)]
        category: Option<String>,
        #[arg(long)]
        color: Option<String>,
        #[arg(long)]
        people: Option<String>,
        #[arg(long)]
        orientation: Option<String>,
        /// relevance | popular | newest
        #[arg(long)]
        sort: Option<String>,
        /// Limit results
        #[arg(long = "limit", default_value_t = 16)]
        limit: usize,
        /// Explain filter stages and counts
        #[arg(long = "explain", action = ArgAction::SetTrue)]
        explain: bool,
    },
    /// Distinct facet values with item counts
    Facets {
        file: PathBuf,
    },
    /// Drive a live engine from stdin (`:more`, `:set <facet> <value>`, `:clear`, `:reload`, or text)
    Browse {
        file: PathBuf,
    },
}

fn init_tracing() {
    let env = std::env::var("PIXELYNTH_LOG").unwrap_or_else(|_| "info".to_string());
    let filter = tracing_subscriber::EnvFilter::from_str(&env).unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(true).with_writer(std::io::stderr).init();
}

fn init_metrics() {
    if let Ok(addr) = std::env::var("PIXELYNTH_METRICS_ADDR") {
        if let Ok(sock) = addr.parse::<std::net::SocketAddr>() {
            let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
            match builder.with_http_listener(sock).install() {
                Ok(_) => info!(addr = %addr, "Prometheus metrics exporter listening"),
                Err(e) => warn!(error = %e, "failed to install metrics exporter"),
            }
        } else {
            warn!(addr = %addr, "invalid PIXELYNTH_METRICS_ADDR; expected host:port");
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    init_metrics();
    let cli = Cli::parse();

    match cli.command {
        Commands::Search { file, query, category, color, people, orientation, sort, limit, explain } => {
            let snap = load_export(&file).await?;

            let mut facets = FacetState { search_text: query, ..FacetState::default() };
            for (name, value) in [("category", category), ("color", color), ("people", people), ("orientation", orientation), ("sort", sort)] {
                if let Some(value) = value {
                    facets.apply(FacetUpdate::parse(name, &value)?);
                }
            }

            let t0 = Instant::now();
            let index = Index::build_from_snapshot(&snap);
            let (ids, dbg) = index.query_with_debug(&facets);
            info!(hits = ids.len(), signature = %facets.signature(), took_ms = %t0.elapsed().as_millis(), "search done");
            let items: Vec<&Item> = ids.iter().take(limit).filter_map(|d| snap.items.get(*d as usize)).collect();

            match cli.output {
                Output::Human => {
                    print_items(&items);
                    if ids.len() > items.len() {
                        println!("... {} more", ids.len() - items.len());
                    }
                }
                Output::Json => {
                    if explain {
                        #[derive(serde::Serialize)]
                        struct Explain<'a> { total: usize, items: &'a [&'a Item], debug: &'a QueryDebugInfo }
                        println!("{}", serde_json::to_string_pretty(&Explain { total: ids.len(), items: &items, debug: &dbg })?);
                    } else {
                        println!("{}", serde_json::to_string_pretty(&items)?);
                    }
                }
            }
            if explain && matches!(cli.output, Output::Human) {
                eprintln!(
                    "debug: total={} malformed={} after_text={} after_category={} after_color={} after_orientation={} after_people={}",
                    dbg.total, dbg.malformed, dbg.after_text, dbg.after_category, dbg.after_color, dbg.after_orientation, dbg.after_people
                );
            }
        }
        Commands::Facets { file } => {
            let snap = load_export(&file).await?;
            let counts = Index::build_from_snapshot(&snap).facet_counts();
            match cli.output {
                Output::Human => {
                    println!("CATEGORY");
                    for (v, n) in &counts.categories { println!("  {:<24} {}", v, n); }
                    println!("COLOR");
                    for (v, n) in &counts.colors { println!("  {:<24} {}", v, n); }
                    println!("ORIENTATION");
                    for (v, n) in &counts.orientations { println!("  {:<24} {}", v, n); }
                    println!("PEOPLE");
                    for (v, n) in &counts.people { println!("  {:<24} {}", v, n); }
                    if counts.malformed > 0 {
                        println!("skipped {} record(s) without id", counts.malformed);
                    }
                }
                Output::Json => println!("{}", serde_json::to_string_pretty(&counts)?),
            }
        }
        Commands::Browse { file } => {
            let handle = CatalogEngine::spawn(Arc::new(JsonFileProvider::new(&file)), EngineConfig::from_env());
            let mut views = handle.subscribe();
            let output = cli.output;
            let printer = tokio::spawn(async move {
                while views.changed().await.is_ok() {
                    let view = views.borrow_and_update().clone();
                    if let Err(e) = print_view(&view, output) {
                        warn!(error = %e, "failed to render view");
                    }
                }
            });

            let mut lines = BufReader::new(tokio::io::stdin()).lines();
            loop {
                tokio::select! {
                    line = lines.next_line() => {
                        let Some(line) = line? else { break };
                        let line = line.trim_end();
                        let res = match line.split_once(' ').unwrap_or((line, "")) {
                            (":more", _) => handle.request_more().await,
                            (":clear", _) => handle.clear_filters().await,
                            (":reload", _) => handle.reload().await.map(|()| {
                                let snap = handle.snapshot();
                                eprintln!("reloaded: epoch {} with {} item(s)", snap.epoch, snap.items.len());
                            }),
                            (":set", rest) => match rest.trim().split_once(' ') {
                                Some((facet, value)) => handle.set_facet(facet, value.trim()).await,
                                None => handle.set_facet(rest.trim(), "").await,
                            },
                            _ => handle.set_search_text(line).await,
                        };
                        if let Err(e) = res {
                            eprintln!("error: {}", e);
                        }
                    }
                    _ = signal::ctrl_c() => {
                        info!("interrupted");
                        break;
                    }
                }
            }
            drop(handle);
            printer.abort();
        }
    }

    Ok(())
}

async fn load_export(file: &std::path::Path) -> Result<Arc<CatalogSnapshot>> {
    let provider = Arc::new(JsonFileProvider::new(file));
    let store = ItemStore::new(provider.clone());
    store.load().await.with_context(|| format!("loading {}", provider.path().display()))
}

fn print_items(items: &[&Item]) {
    println!("{:<14} {:<28} {:<12} {:<10} {:<10} {:>6} {:>6} {:>8}", "ID", "TITLE", "CATEGORY", "COLOR", "ORIENT", "PEOPLE", "FAVS", "AGE");
    for it in items {
        println!(
            "{:<14} {:<28} {:<12} {:<10} {:<10} {:>6} {:>6} {:>8}",
            it.id,
            truncate(&it.title, 28),
            it.category.as_deref().unwrap_or("-"),
            it.color.as_deref().unwrap_or("-"),
            it.orientation.map(|o| o.as_str()).unwrap_or("-"),
            it.people_count().map(|p| p.to_string()).unwrap_or_else(|| "-".to_string()),
            it.favorite_count,
            render_age(it.created_date()),
        );
    }
}

fn print_view(view: &EngineView, output: Output) -> Result<()> {
    match output {
        Output::Human => match view.status {
            ViewStatus::Loading => println!("loading..."),
            ViewStatus::Error => println!("error: {}", view.error.as_ref().map(|e| e.to_string()).unwrap_or_default()),
            ViewStatus::Empty => println!("no matches for {}", view.signature),
            ViewStatus::Ready => {
                let items: Vec<&Item> = view.page().collect();
                println!("# {} | showing {} of {}", view.signature, items.len(), view.total);
                print_items(&items);
                if view.has_more {
                    println!("(:more for the next page)");
                }
            }
        },
        Output::Json => {
            #[derive(serde::Serialize)]
            struct Page<'a> { view: &'a EngineView, items: Vec<&'a Item> }
            println!("{}", serde_json::to_string(&Page { view, items: view.page().collect() })?);
        }
    }
    Ok(())
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max.saturating_sub(1)).collect();
    out.push('…');
    out
}

fn render_age(created: Option<DateTime<Utc>>) -> String {
    let Some(created) = created else { return "-".to_string() };
    let mut secs = (Utc::now() - created).num_seconds().max(0) as u64;
    let days = secs / 86_400; secs %= 86_400;
    let hours = secs / 3600; secs %= 3600;
    let mins = secs / 60; secs %= 60;
    if days > 0 { format!("{}d{}h", days, hours) }
    else if hours > 0 { format!("{}h{}m", hours, mins) }
    else if mins > 0 { format!("{}m", mins) }
    else { format!("{}s", secs) }
}
