//! Capture files in, HAR archive out.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use pcaphar_core::{
    Assembler, AssemblyConfig, AssemblyStats, CompletionSink, ConversationAggregator,
    ConversationReader, FactoryStats, PcapReader, ReaderConfig, StreamFactory,
};

use crate::har::Har;

/// Settings for one conversion run.
#[derive(Debug, Clone, Default)]
pub struct ConvertOptions {
    pub reader: ReaderConfig,
    pub assembly: AssemblyConfig,
}

/// What a conversion run saw.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConvertSummary {
    pub files: usize,
    /// Files whose reading stopped early on a damaged packet record.
    pub truncated_files: usize,
    pub assembly: AssemblyStats,
    pub factory: FactoryStats,
    pub entries: usize,
    /// Entries carrying a decode error.
    pub partial_entries: usize,
}

/// Reassemble and decode every TCP connection in `files`, in order, and
/// build one archive from the resulting conversations.
///
/// Must be called from within a Tokio runtime.
pub async fn convert<P: AsRef<Path>>(
    files: &[P],
    options: ConvertOptions,
) -> Result<(Har, ConvertSummary)> {
    let paths: Vec<PathBuf> = files.iter().map(|p| p.as_ref().to_path_buf()).collect();
    let ConvertOptions { reader, assembly } = options;

    let (sink, rx) = CompletionSink::channel(reader.sink_capacity);
    let reader =
        Arc::new(ConversationReader::new(sink, reader).context("Failed to set up decoders")?);
    let collector = tokio::spawn(ConversationAggregator::collect(rx));

    let factory = StreamFactory::new(Arc::clone(&reader));
    let read = tokio::task::spawn_blocking(move || read_captures(&paths, factory, assembly));
    let read = read.await.context("Capture reader task failed")?;
    let (factory, assembly_stats, truncated_files) = match read {
        Ok(read) => read,
        Err(e) => {
            // Unblock the collector before bailing out
            reader.sink().close();
            return Err(e);
        }
    };

    let factory_stats = factory.finish().await;
    let conversations = collector
        .await
        .context("Conversation collector task failed")?
        .finalize();

    let har = Har::from_conversations(&conversations);
    let summary = ConvertSummary {
        files: files.len(),
        truncated_files,
        assembly: assembly_stats,
        factory: factory_stats,
        entries: har.entries().len(),
        partial_entries: conversations.iter().filter(|c| c.error.is_some()).count(),
    };
    info!(
        "Converted {} files: {} entries ({} partial) from {} streams",
        summary.files, summary.entries, summary.partial_entries, summary.factory.streams
    );
    Ok((har, summary))
}

/// Feed every packet of every file to one assembler.
fn read_captures(
    paths: &[PathBuf],
    factory: StreamFactory,
    config: AssemblyConfig,
) -> Result<(StreamFactory, AssemblyStats, usize)> {
    let mut assembler = Assembler::new(factory, config);
    let mut truncated = 0;

    for path in paths {
        let reader = PcapReader::open(path)
            .with_context(|| format!("Failed to open capture file: {}", path.display()))?;
        debug!("Reading {} ({:?})", path.display(), reader.format());

        for packet in reader {
            match packet {
                Ok(packet) => assembler.process(&packet),
                Err(e) => {
                    warn!("Stopped reading {}: {}", path.display(), e);
                    truncated += 1;
                    break;
                }
            }
        }
    }

    let (factory, stats) = assembler.into_factory();
    debug!("{:?}", stats);
    Ok((factory, stats, truncated))
}
