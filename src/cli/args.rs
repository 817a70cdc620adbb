//! Command-line argument definitions.

use clap::{Parser, ValueEnum};
use std::path::PathBuf;

use pcaphar_core::config::DEFAULT_SINK_CAPACITY;
use pcaphar_core::{AssemblyConfig, ReaderConfig};

/// Application protocol carried by the captured connections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ProtocolChoice {
    /// Detect per connection from its first bytes
    Auto,
    /// HTTP/1.x
    Http,
    /// FastCGI
    Fastcgi,
}

impl ProtocolChoice {
    /// Decoder name to force, `None` for detection.
    pub fn decoder_name(self) -> Option<&'static str> {
        match self {
            ProtocolChoice::Auto => None,
            ProtocolChoice::Http => Some("http"),
            ProtocolChoice::Fastcgi => Some("fastcgi"),
        }
    }
}

/// Convert HTTP and FastCGI traffic in packet captures to a HAR archive.
#[derive(Parser, Debug)]
#[command(name = "pcaphar")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Capture files (pcap or pcapng, optionally gzipped), read in order
    #[arg(value_name = "FILE", required = true)]
    pub files: Vec<PathBuf>,

    /// Write the archive here instead of stdout
    #[arg(short = 'o', long = "output", value_name = "OUTPUT_FILE")]
    pub output: Option<PathBuf>,

    /// Only reassemble TCP segments to or from these ports
    #[arg(long = "server-ports", value_name = "PORT", value_delimiter = ',')]
    pub server_ports: Vec<u16>,

    /// Protocol decoder to use for every connection
    #[arg(long = "protocol", value_enum, default_value = "auto")]
    pub protocol: ProtocolChoice,

    /// Finished conversations buffered before stream workers block
    #[arg(long = "sink-capacity", default_value_t = DEFAULT_SINK_CAPACITY)]
    pub sink_capacity: usize,

    /// Write the archive without indentation
    #[arg(long = "compact")]
    pub compact: bool,

    /// Log TCP reassembly detail
    #[arg(long = "assembly-debug")]
    pub assembly_debug: bool,

    /// Enable verbose output
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    pub verbose: u8,
}

impl Args {
    /// Log filter directives for the verbosity flags.
    pub fn log_filter(&self) -> String {
        let level = match self.verbose {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        };
        if self.assembly_debug {
            format!("{level},pcaphar_core::assembly=trace")
        } else {
            level.to_string()
        }
    }

    pub fn reader_config(&self) -> ReaderConfig {
        let config = ReaderConfig::default().with_sink_capacity(self.sink_capacity);
        match self.protocol.decoder_name() {
            Some(name) => config.with_protocol(name),
            None => config,
        }
    }

    pub fn assembly_config(&self) -> AssemblyConfig {
        AssemblyConfig::default().with_server_ports(self.server_ports.iter().copied())
    }
}
