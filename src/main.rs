//! pcaphar CLI entry point.

use std::fs::File;
use std::io::{self, BufWriter, Write};

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use pcaphar::cli::Args;
use pcaphar::{convert, ConvertOptions};

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    // Set up logging
    let filter = args.log_filter();
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()))
        .init();

    let options = ConvertOptions {
        reader: args.reader_config(),
        assembly: args.assembly_config(),
    };
    let (har, summary) = convert(&args.files, options).await?;

    info!(
        "{} packets, {} TCP segments, {} retransmits, {} bytes skipped",
        summary.assembly.packets,
        summary.assembly.tcp_segments,
        summary.assembly.retransmits,
        summary.assembly.skipped_bytes
    );

    match &args.output {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("Failed to create output file: {}", path.display()))?;
            let mut writer = BufWriter::new(file);
            har.write_json(&mut writer, args.compact)?;
            writer.flush()?;
            eprintln!("Wrote {} entries to {}", summary.entries, path.display());
        }
        None => {
            let mut stdout = io::stdout().lock();
            har.write_json(&mut stdout, args.compact)?;
            writeln!(stdout)?;
        }
    }

    Ok(())
}
