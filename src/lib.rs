//! pcaphar - Reconstruct HTTP and FastCGI conversations from packet captures.
//!
//! This library reads pcap/pcapng files, reassembles their TCP connections
//! with [`pcaphar_core`], and writes the decoded request/response exchanges
//! as an HTTP Archive (HAR 1.2).
//!
//! # Example
//!
//! ```no_run
//! use pcaphar::{convert, ConvertOptions};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let (har, summary) = convert(&["capture.pcap"], ConvertOptions::default()).await?;
//!     har.write_json(std::io::stdout().lock(), false)?;
//!     eprintln!("{} entries", summary.entries);
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod convert;
pub mod har;

pub use convert::{convert, ConvertOptions, ConvertSummary};
pub use har::Har;
