//! Address-to-builder map shared by every stream worker.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, trace};

use crate::builder::ConversationBuilder;
use crate::config::ReaderConfig;
use crate::decode::DecoderRegistry;
use crate::flow::{ConnectionAddress, Side};
use crate::sink::CompletionSink;

#[derive(Default)]
struct Builders {
    live: HashMap<ConnectionAddress, Arc<ConversationBuilder>>,
    /// Displaced by a newer connection on the same address before finishing.
    retired: Vec<Arc<ConversationBuilder>>,
}

/// Creates exactly one [`ConversationBuilder`] per live connection.
///
/// The map lock is held only for lookup and insertion, never while a
/// builder decodes.
pub struct ConnectionRegistry {
    builders: Mutex<Builders>,
    decoders: Arc<DecoderRegistry>,
    sink: Arc<CompletionSink>,
    config: ReaderConfig,
}

impl ConnectionRegistry {
    pub fn new(
        decoders: Arc<DecoderRegistry>,
        sink: Arc<CompletionSink>,
        config: ReaderConfig,
    ) -> Self {
        Self {
            builders: Mutex::new(Builders::default()),
            decoders,
            sink,
            config,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Builders> {
        self.builders.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Builder for `address`, created on first use.
    ///
    /// A finished builder still registered under the address belongs to an
    /// earlier connection that reused it and is replaced.
    pub fn get_or_create(&self, address: &ConnectionAddress) -> Arc<ConversationBuilder> {
        let mut builders = self.lock();
        if let Some(builder) = builders.live.get(address) {
            if !builder.is_finished() {
                return Arc::clone(builder);
            }
            trace!("Replacing finished builder for {}", address);
        }
        self.insert_new(&mut builders, address)
    }

    /// Builder for `address` with `side` attached to the calling stream.
    ///
    /// When the registered builder already has a stream on that side, the
    /// stream starts a new connection reusing the address: a fresh builder
    /// takes its place and the old one is kept for the final flush.
    pub fn claim(&self, address: &ConnectionAddress, side: Side) -> Arc<ConversationBuilder> {
        let mut builders = self.lock();
        if let Some(builder) = builders.live.get(address).cloned() {
            if builder.claim(side) {
                return builder;
            }
            if !builder.is_finished() {
                debug!("New connection on {} displaces an unfinished one", address);
                builders.retired.push(builder);
            }
        }

        let builder = self.insert_new(&mut builders, address);
        builder.claim(side);
        builder
    }

    fn insert_new(
        &self,
        builders: &mut Builders,
        address: &ConnectionAddress,
    ) -> Arc<ConversationBuilder> {
        let builder = Arc::new(ConversationBuilder::new(
            address.clone(),
            Arc::clone(&self.decoders),
            Arc::clone(&self.sink),
            &self.config,
        ));
        builders.live.insert(address.clone(), Arc::clone(&builder));
        builder
    }

    /// Forget `builder` if it is still the one registered for `address`.
    pub fn remove(&self, address: &ConnectionAddress, builder: &Arc<ConversationBuilder>) {
        let mut builders = self.lock();
        if builders
            .live
            .get(address)
            .is_some_and(|current| Arc::ptr_eq(current, builder))
        {
            builders.live.remove(address);
        }
        builders.retired.retain(|retired| !Arc::ptr_eq(retired, builder));
    }

    /// Take every builder still registered, displaced ones included.
    pub fn drain_unfinished(&self) -> Vec<Arc<ConversationBuilder>> {
        let mut builders = self.lock();
        let mut drained: Vec<_> = std::mem::take(&mut builders.retired);
        drained.extend(builders.live.drain().map(|(_, builder)| builder));
        drained
    }

    /// Live connections.
    pub fn len(&self) -> usize {
        self.lock().live.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().live.is_empty()
    }
}
