//! `bson` CLI: convert between Extended JSON and native BSON documents.
//!
//! ## Usage
//!
//! ```sh
//! # Encode Extended JSON to native bytes (stdin → stdout)
//! echo '{"n":{"$numberLong":"7"}}' | bson encode > doc.bson
//!
//! # Decode native bytes back to Extended JSON
//! bson decode -i doc.bson --pretty
//!
//! # List every top-level key with its element type and size
//! bson inspect -i doc.bson
//!
//! # Reject documents nested deeper than 8 levels
//! bson --max-depth 8 encode -i deep.json -o deep.bson
//! ```

use anyhow::{Context, Result};
use bson_core::{CodecOptions, Document, DocumentSeed, DEFAULT_MAX_DEPTH};
use clap::{Parser, Subcommand};
use serde::de::DeserializeSeed;
use std::io::{self, Read, Write};
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "bson", version, about = "Extended JSON <-> BSON converter")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Maximum nesting depth accepted while encoding or decoding
    #[arg(long, global = true, default_value_t = DEFAULT_MAX_DEPTH)]
    max_depth: usize,
}

#[derive(Subcommand)]
enum Commands {
    /// Encode Extended JSON to native BSON bytes
    Encode {
        /// Input file (reads from stdin if omitted)
        #[arg(short, long)]
        input: Option<String>,
        /// Output file (writes to stdout if omitted)
        #[arg(short, long)]
        output: Option<String>,
    },
    /// Decode native BSON bytes to Extended JSON
    Decode {
        /// Input file (reads from stdin if omitted)
        #[arg(short, long)]
        input: Option<String>,
        /// Output file (writes to stdout if omitted)
        #[arg(short, long)]
        output: Option<String>,
        /// Indent the JSON output
        #[arg(long)]
        pretty: bool,
    },
    /// Show the element type and encoded size of every top-level key
    Inspect {
        /// Input file (reads from stdin if omitted)
        #[arg(short, long)]
        input: Option<String>,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    let options = CodecOptions::new().max_depth(cli.max_depth);

    match cli.command {
        Commands::Encode { input, output } => {
            let json = read_input(input.as_deref())?;
            let text = String::from_utf8(json).context("Input is not valid UTF-8")?;
            let doc = parse_json(&text, options)?;
            let bytes = doc
                .to_vec_with_options(options)
                .context("Failed to encode document")?;
            debug!(entries = doc.len(), len = bytes.len(), "encoded");
            write_output(output.as_deref(), &bytes)?;
        }
        Commands::Decode {
            input,
            output,
            pretty,
        } => {
            let bytes = read_input(input.as_deref())?;
            let doc = Document::from_slice_with_options(&bytes, options)
                .context("Failed to decode BSON")?;
            let json = if pretty {
                serde_json::to_string_pretty(&doc)?
            } else {
                serde_json::to_string(&doc)?
            };
            write_output(output.as_deref(), format!("{json}\n").as_bytes())?;
        }
        Commands::Inspect { input } => {
            let bytes = read_input(input.as_deref())?;
            let doc = Document::from_slice_with_options(&bytes, options)
                .context("Failed to decode BSON")?;
            println!("{} bytes, {} keys", bytes.len(), doc.len());
            for (key, value) in doc.iter() {
                let kind = value.map_or("null".to_string(), |v| v.element_type().to_string());
                let size = element_size(key, value)?;
                println!("  {key}: {kind} ({size} bytes)");
            }
        }
    }

    Ok(())
}

fn parse_json(text: &str, options: CodecOptions) -> Result<Document> {
    let mut de = serde_json::Deserializer::from_str(text);
    let doc = DocumentSeed::new(options)
        .deserialize(&mut de)
        .context("Failed to parse Extended JSON document")?;
    de.end().context("Trailing characters after JSON document")?;
    Ok(doc)
}

/// Encoded size of one element: type byte, key and payload.
fn element_size(key: &str, value: Option<&bson_core::Bson>) -> Result<usize> {
    let mut single = Document::new();
    match value {
        Some(v) => single.insert(key, v.clone()),
        None => single.insert_null(key),
    };
    let framed = single.to_vec().context("Failed to measure element")?;
    // Minus the length prefix and terminator.
    Ok(framed.len() - 5)
}

fn read_input(path: Option<&str>) -> Result<Vec<u8>> {
    match path {
        Some(path) => std::fs::read(path).with_context(|| format!("Failed to read file: {}", path)),
        None => {
            let mut buf = Vec::new();
            io::stdin()
                .read_to_end(&mut buf)
                .context("Failed to read from stdin")?;
            Ok(buf)
        }
    }
}

fn write_output(path: Option<&str>, content: &[u8]) -> Result<()> {
    match path {
        Some(path) => {
            std::fs::write(path, content)
                .with_context(|| format!("Failed to write file: {}", path))?;
        }
        None => {
            let mut stdout = io::stdout().lock();
            stdout.write_all(content).context("Failed to write to stdout")?;
            stdout.flush()?;
        }
    }
    Ok(())
}
