use std::env;
use std::fs;
use std::path::PathBuf;

use anyhow::{bail, Context};
use tracing::info;
use tracing_subscriber::EnvFilter;

use ragsearch_core::config::Config;
use ragsearch_core::types::{DocumentChunk, SearchRequest};
use ragsearch_hybrid::LocalStack;

const USAGE: &str = "Usage:
  ragsearch load <chunks.jsonl> --tenant <tenant>
  ragsearch query \"<text>\" --tenant <tenant> [--top-k N] [--hyde] [--decompose] [--no-cache]";

fn usage_exit() -> ! {
    eprintln!("{USAGE}");
    std::process::exit(2);
}

/// Value following `flag`, if present.
fn flag_value(args: &[String], flag: &str) -> Option<String> {
    args.iter().position(|a| a == flag).and_then(|i| args.get(i + 1)).cloned()
}

fn has_flag(args: &[String], flag: &str) -> bool { args.iter().any(|a| a == flag) }

/// First argument that is neither a flag nor a flag's value.
fn positional(args: &[String]) -> Option<String> {
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--tenant" | "--top-k" => i += 2,
            a if a.starts_with("--") => i += 1,
            a => return Some(a.to_string()),
        }
    }
    None
}

fn read_chunks(path: &PathBuf, tenant: &str) -> anyhow::Result<Vec<DocumentChunk>> {
    let raw = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let mut chunks = Vec::new();
    for (line_no, line) in raw.lines().enumerate() {
        if line.trim().is_empty() { continue; }
        let mut chunk: DocumentChunk = serde_json::from_str(line).with_context(|| format!("{}:{}", path.display(), line_no + 1))?;
        chunk.tenant_id = tenant.to_string();
        chunks.push(chunk);
    }
    Ok(chunks)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = env::args().skip(1).collect();
    let Some(command) = args.first().cloned() else { usage_exit() };
    let rest = &args[1..];
    let Some(tenant) = flag_value(rest, "--tenant") else { usage_exit() };

    let config = Config::load().map_err(|e| { eprintln!("Error loading config: {}", e); e })?;
    let settings = config.settings()?;
    let base_dir = env::current_dir()?;
    let stack = LocalStack::open(settings, &base_dir).await?;

    match command.as_str() {
        "load" => {
            let Some(path) = positional(rest) else { usage_exit() };
            let chunks = read_chunks(&PathBuf::from(path), &tenant)?;
            let count = stack.indexer.index(&chunks).await?;
            if let Some(report) = stack.orchestrator.invalidate_tenant(&tenant).await {
                info!(tenant = %tenant, removed = report.l1_removed + report.l2_removed, "invalidated cached responses");
            }
            println!("{}", serde_json::json!({ "tenant": tenant, "indexed": count }));
        }
        "query" => {
            let Some(text) = positional(rest) else { usage_exit() };
            let mut req = SearchRequest::new(text, tenant);
            if let Some(k) = flag_value(rest, "--top-k") {
                req = req.with_top_k(k.parse().with_context(|| format!("--top-k expects a number, got '{k}'"))?);
            }
            if has_flag(rest, "--hyde") { req = req.with_hyde(); }
            if has_flag(rest, "--decompose") { req = req.with_decomposition(); }
            if has_flag(rest, "--no-cache") { req = req.without_cache(); }
            let resp = stack.orchestrator.search(req).await?;
            println!("{}", serde_json::to_string_pretty(&resp)?);
        }
        other => bail!("unknown command '{other}'\n{USAGE}"),
    }
    stack.token.cancel();
    Ok(())
}
