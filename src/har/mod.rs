//! HTTP Archive (HAR 1.2) output.
//!
//! [`Har::from_conversations`] turns the aggregator's ordered conversations
//! into one archive; entries keep the order they are given in.

mod entry;
mod model;

use std::io::Write;

use pcaphar_core::Conversation;

pub use model::{
    Cache, Content, Cookie, Creator, Entry, Har, Header, Log, PostData, QueryParam, Request,
    Response, Timings,
};

pub const HAR_VERSION: &str = "1.2";
pub const CREATOR_NAME: &str = "pcaphar";

impl Har {
    /// Empty archive credited to this tool.
    pub fn new() -> Self {
        Self {
            log: Log {
                version: HAR_VERSION.to_string(),
                creator: Creator {
                    name: CREATOR_NAME.to_string(),
                    version: env!("CARGO_PKG_VERSION").to_string(),
                },
                entries: Vec::new(),
                comment: None,
            },
        }
    }

    pub fn from_conversations<'a, I>(conversations: I) -> Self
    where
        I: IntoIterator<Item = &'a Conversation>,
    {
        let mut har = Self::new();
        for conversation in conversations {
            har.push(conversation);
        }
        har
    }

    pub fn push(&mut self, conversation: &Conversation) {
        self.log.entries.push(Entry::from_conversation(conversation));
    }

    pub fn entries(&self) -> &[Entry] {
        &self.log.entries
    }

    /// Serialize as JSON, indented unless `compact`.
    pub fn write_json<W: Write>(&self, writer: W, compact: bool) -> serde_json::Result<()> {
        if compact {
            serde_json::to_writer(writer, self)
        } else {
            serde_json::to_writer_pretty(writer, self)
        }
    }
}

impl Default for Har {
    fn default() -> Self {
        Self::new()
    }
}
