use std::sync::Arc;

use super::{FcgiDecoder, HttpDecoder, ProtocolDecoder};
use crate::error::{Error, Result};

/// Registry of available protocol decoders.
///
/// Decoders are tried in registration order, so stricter checks go first.
pub struct DecoderRegistry {
    decoders: Vec<Arc<dyn ProtocolDecoder>>,
    forced: Option<Arc<dyn ProtocolDecoder>>,
    fallback: Arc<dyn ProtocolDecoder>,
}

impl DecoderRegistry {
    /// Empty registry falling back to HTTP.
    pub fn new() -> Self {
        Self {
            decoders: Vec::new(),
            forced: None,
            fallback: Arc::new(HttpDecoder::new()),
        }
    }

    /// FastCGI and HTTP, in that order.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(FcgiDecoder::new());
        registry.register(HttpDecoder::new());
        registry
    }

    /// Register a decoder.
    pub fn register<D: ProtocolDecoder + 'static>(&mut self, decoder: D) {
        self.decoders.push(Arc::new(decoder));
    }

    /// Use the named decoder for every connection instead of probing.
    pub fn force(&mut self, name: &str) -> Result<()> {
        let decoder = self
            .get(name)
            .ok_or_else(|| Error::UnknownDecoder(name.to_string()))?;
        self.forced = Some(decoder);
        Ok(())
    }

    /// Pick the decoder for a connection from its first bytes.
    pub fn detect(&self, data: &[u8]) -> Arc<dyn ProtocolDecoder> {
        if let Some(forced) = &self.forced {
            return Arc::clone(forced);
        }
        self.decoders
            .iter()
            .find(|d| d.sniff(data))
            .unwrap_or(&self.fallback)
            .clone()
    }

    /// Get a decoder by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn ProtocolDecoder>> {
        self.decoders.iter().find(|d| d.name() == name).cloned()
    }

    /// Get all registered decoder names.
    pub fn decoder_names(&self) -> Vec<&'static str> {
        self.decoders.iter().map(|d| d.name()).collect()
    }
}

impl Default for DecoderRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}
