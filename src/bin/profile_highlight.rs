//! Profiling binary for parse and highlight performance
//!
//! Opens a file, parses it, optionally replays synthetic keystrokes and
//! prints the layer hierarchy and the first highlight tokens.
//!
//! Usage:
//!   cargo build --profile profiling --bin strata-profile
//!   samply record ./target/profiling/strata-profile src/line_tree/mod.rs
//!
//! Or with edits:
//!   strata-profile index.html --keystrokes 500 --stats

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::Parser;

use strata::syntax::Layer;
use strata::{Buffer, LanguageRegistry, SyntaxConfig};

#[derive(Parser, Debug)]
#[command(name = "strata-profile")]
#[command(about = "Profile incremental parsing and highlighting")]
struct Args {
    /// File to open
    file: PathBuf,

    /// Language id or alias (detected from the extension if omitted)
    #[arg(long)]
    language: Option<String>,

    /// Number of synthetic keystrokes to replay
    #[arg(long, default_value = "0")]
    keystrokes: usize,

    /// Number of tokens to print
    #[arg(long, default_value = "20")]
    tokens: usize,

    /// Parse on a worker thread instead of inline
    #[arg(long)]
    background: bool,

    /// Optional syntax config (YAML)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Write debug logs to this directory
    #[arg(long)]
    log_dir: Option<PathBuf>,

    /// Print timing statistics
    #[arg(long)]
    stats: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();
    strata::tracing::init(args.log_dir.as_deref());

    let source = std::fs::read_to_string(&args.file)
        .with_context(|| format!("failed to read {}", args.file.display()))?;
    let registry = Arc::new(LanguageRegistry::builtin().context("failed to load languages")?);
    let language = match &args.language {
        Some(name) => registry.require(name)?,
        None => registry
            .for_path(&args.file)
            .with_context(|| format!("cannot detect language of {}", args.file.display()))?,
    };

    let mut config = args
        .config
        .as_deref()
        .map(SyntaxConfig::load)
        .unwrap_or_default();
    config.background_parsing = args.background;

    eprintln!("Profile Highlight");
    eprintln!("=================");
    eprintln!("File:     {}", args.file.display());
    eprintln!("Language: {}", language.id());
    eprintln!();

    let start = Instant::now();
    let mut buffer = Buffer::with_language(&source, language, Arc::clone(&registry), config)?;
    let parse_time = start.elapsed();

    eprintln!("Lines:         {}", buffer.line_count());
    eprintln!("Initial parse: {:.2}ms", parse_time.as_secs_f64() * 1000.0);
    eprintln!();

    if args.keystrokes > 0 {
        let edit_times = replay_keystrokes(&mut buffer, args.keystrokes);
        if args.stats {
            print_stats(&edit_times);
        }
    }

    if let Some(layers) = buffer.layers() {
        eprintln!("Layers:");
        print_layer(layers.root());
        eprintln!();
    }

    let visible = 0..buffer.len_bytes().min(4096);
    let start = Instant::now();
    let tokens = buffer.highlight_tokens(visible.clone());
    let highlight_time = start.elapsed();
    eprintln!(
        "Highlighted {} bytes into {} tokens in {:.2}ms",
        visible.len(),
        tokens.len(),
        highlight_time.as_secs_f64() * 1000.0
    );

    let text = buffer.text();
    for token in tokens.iter().take(args.tokens) {
        let range = token.local_range.start + visible.start..token.local_range.end + visible.start;
        let snippet: String = text.byte_slice(range.clone()).chars().take(40).collect();
        println!("{:>6}..{:<6} {:<24} {:?}", range.start, range.end, token.scope, snippet);
    }

    Ok(())
}

/// Type a character in the middle of the document, then delete it again
fn replay_keystrokes(buffer: &mut Buffer, count: usize) -> Vec<Duration> {
    let mut times = Vec::with_capacity(count);
    let mut offset = buffer.len_utf16() / 2;

    for i in 0..count {
        let start = Instant::now();
        if i % 2 == 0 {
            buffer.replace(offset..offset, "x");
            offset += 1;
        } else {
            offset -= 1;
            buffer.replace(offset..offset + 1, "");
        }
        buffer.wait_for_syntax(Duration::from_secs(5));
        times.push(start.elapsed());
    }
    times
}

fn print_layer(layer: &Layer) {
    eprintln!(
        "{:indent$}{} {:?} {:?}",
        "",
        layer.language_id(),
        layer.byte_range(),
        layer.state(),
        indent = layer.depth() * 2 + 2
    );
    for child in layer.children() {
        print_layer(child);
    }
}

fn print_stats(times: &[Duration]) {
    if times.is_empty() {
        return;
    }
    let mut sorted: Vec<_> = times.to_vec();
    sorted.sort();

    let total: Duration = sorted.iter().sum();
    let avg = total / sorted.len() as u32;
    let median = sorted[sorted.len() / 2];
    let p95 = sorted[(sorted.len() as f64 * 0.95) as usize];
    let max = sorted[sorted.len() - 1];

    eprintln!("Edit + Reparse Statistics:");
    eprintln!("  Min:    {:>8.2}ms", sorted[0].as_secs_f64() * 1000.0);
    eprintln!("  Max:    {:>8.2}ms", max.as_secs_f64() * 1000.0);
    eprintln!("  Avg:    {:>8.2}ms", avg.as_secs_f64() * 1000.0);
    eprintln!("  Median: {:>8.2}ms", median.as_secs_f64() * 1000.0);
    eprintln!("  P95:    {:>8.2}ms", p95.as_secs_f64() * 1000.0);
    eprintln!("  Total:  {:>8.2}s", total.as_secs_f64());
    eprintln!();
}
