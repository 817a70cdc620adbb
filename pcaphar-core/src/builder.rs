//! Per-connection conversation building.
//!
//! A [`ConversationBuilder`] owns everything known about one connection.
//! Each direction is read by its own worker; both workers decode into the
//! shared slot list under the connection lock, requests by request position
//! and responses by response position, so request N pairs with response N
//! whatever order the workers run in.

use std::io::{self, Read};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};
use std::time::SystemTime;

use bytes::{Buf, Bytes, BytesMut};
use tracing::{debug, trace, warn};

use crate::config::ReaderConfig;
use crate::conversation::Conversation;
use crate::decode::{
    DecodeContext, DecodeResult, DecodedMessage, DecoderRegistry, Message, MessageKind,
    ProtocolDecoder, Request, Response, SNIFF_LEN,
};
use crate::error::{DecodeError, Error, Result};
use crate::flow::{ConnectionAddress, Side};
use crate::sink::CompletionSink;
use crate::timed::{Clock, TimedStreamReader};

const BOTH_SIDES: u8 = 2;

#[derive(Debug, Default)]
struct Slot {
    request: Option<(Request, Bytes, Vec<SystemTime>)>,
    response: Option<(Response, Bytes, Vec<SystemTime>)>,
    exit_status: Option<u32>,
    errors: Vec<String>,
    request_side: Option<Side>,
    response_side: Option<Side>,
}

impl Slot {
    fn is_empty(&self) -> bool {
        self.request.is_none() && self.response.is_none() && self.errors.is_empty()
    }

    fn into_conversation(mut self, address: &ConnectionAddress) -> Conversation {
        if self.response.is_some() && self.request.is_none() {
            self.errors.push(DecodeError::UnmatchedResponse.to_string());
        }

        let mut conversation = Conversation::new(address.clone());
        if let Some((request, body, seen)) = self.request {
            conversation.request = Some(request);
            conversation.request_body = body;
            conversation.request_seen = seen;
        }
        if let Some((response, body, seen)) = self.response {
            conversation.response = Some(response);
            conversation.response_body = body;
            conversation.response_seen = seen;
        }
        conversation.exit_status = self.exit_status;
        conversation.request_side = self
            .request_side
            .or_else(|| self.response_side.map(|side| side.opposite()));
        if !self.errors.is_empty() {
            conversation.error = Some(self.errors.join("; "));
        }
        conversation
    }
}

#[derive(Debug, Default)]
struct ConnectionState {
    sides_complete: u8,
    /// Streams attached so far, client then server.
    claimed: [bool; 2],
    finished: bool,
    slots: Vec<Slot>,
    next_request: usize,
    next_response: usize,
}

impl ConnectionState {
    fn slot(&mut self, position: usize) -> &mut Slot {
        if self.slots.len() <= position {
            self.slots.resize_with(position + 1, Slot::default);
        }
        &mut self.slots[position]
    }

    fn take_conversations(&mut self, address: &ConnectionAddress) -> Vec<Conversation> {
        std::mem::take(&mut self.slots)
            .into_iter()
            .filter(|slot| !slot.is_empty())
            .map(|slot| slot.into_conversation(address))
            .collect()
    }
}

/// Timestamps of the reads that contributed to the message being decoded.
#[derive(Debug, Default)]
struct SeenSpan {
    first: Option<SystemTime>,
    last: Option<SystemTime>,
}

impl SeenSpan {
    fn record(&mut self, at: Option<SystemTime>) {
        if let Some(at) = at {
            self.first.get_or_insert(at);
            self.last = Some(at);
        }
    }

    fn take(&mut self) -> Vec<SystemTime> {
        match (self.first.take(), self.last.take()) {
            (Some(first), Some(last)) if first != last => vec![first, last],
            (Some(first), _) => vec![first],
            _ => Vec::new(),
        }
    }
}

/// Driver for one connection.
pub struct ConversationBuilder {
    address: ConnectionAddress,
    decoders: Arc<DecoderRegistry>,
    decoder: OnceLock<Arc<dyn ProtocolDecoder>>,
    sink: Arc<CompletionSink>,
    read_chunk_size: usize,
    state: Mutex<ConnectionState>,
}

impl ConversationBuilder {
    pub fn new(
        address: ConnectionAddress,
        decoders: Arc<DecoderRegistry>,
        sink: Arc<CompletionSink>,
        config: &ReaderConfig,
    ) -> Self {
        Self {
            address,
            decoders,
            decoder: OnceLock::new(),
            sink,
            read_chunk_size: config.read_chunk_size.max(1),
            state: Mutex::new(ConnectionState::default()),
        }
    }

    pub fn address(&self) -> &ConnectionAddress {
        &self.address
    }

    /// Name of the decoder chosen for this connection, once known.
    pub fn protocol(&self) -> Option<&'static str> {
        self.decoder.get().map(|d| d.name())
    }

    /// Whether both sides completed, or the builder was flushed.
    pub fn is_finished(&self) -> bool {
        self.lock_state().finished
    }

    /// Attach a stream to `side`. Fails if that side already has one or the
    /// connection finished, meaning the stream belongs to a new connection
    /// on the same address.
    pub fn claim(&self, side: Side) -> bool {
        let mut state = self.lock_state();
        let slot = match side {
            Side::Client => 0,
            Side::Server => 1,
        };
        if state.finished || state.claimed[slot] {
            return false;
        }
        state.claimed[slot] = true;
        true
    }

    /// Decode the client-to-server stream until it ends.
    pub fn read_client_stream<R: Read, C: Clock>(
        &self,
        stream: &mut TimedStreamReader<R, C>,
    ) -> Result<()> {
        self.read_side(Side::Client, stream)
    }

    /// Decode the server-to-client stream until it ends.
    pub fn read_server_stream<R: Read, C: Clock>(
        &self,
        stream: &mut TimedStreamReader<R, C>,
    ) -> Result<()> {
        self.read_side(Side::Server, stream)
    }

    /// Record that one side has finished.
    ///
    /// The call that completes the second side finalizes the connection and
    /// publishes its conversations in position order, blocking while the
    /// sink is full. Returns `true` for that call only.
    pub fn read_done(&self) -> bool {
        let mut state = self.lock_state();
        state.sides_complete = state.sides_complete.saturating_add(1);
        if state.sides_complete < BOTH_SIDES || state.finished {
            return false;
        }
        state.finished = true;

        let conversations = state.take_conversations(&self.address);
        debug!(
            "Connection {} finished with {} conversations",
            self.address,
            conversations.len()
        );
        for conversation in conversations {
            if !self.sink.publish_blocking(conversation) {
                warn!("Completion sink closed, dropping conversations for {}", self.address);
                break;
            }
        }
        true
    }

    /// Finalize a connection whose other side never arrived.
    ///
    /// Returns nothing if the connection already finalized.
    pub fn finalize_unfinished(&self) -> Vec<Conversation> {
        let mut state = self.lock_state();
        if state.finished {
            return Vec::new();
        }
        state.finished = true;
        state.take_conversations(&self.address)
    }

    fn lock_state(&self) -> MutexGuard<'_, ConnectionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn decoder_for(&self, data: &[u8]) -> Arc<dyn ProtocolDecoder> {
        let decoder = self.decoder.get_or_init(|| {
            let decoder = self.decoders.detect(data);
            debug!("Decoding {} as {}", self.address, decoder.display_name());
            decoder
        });
        Arc::clone(decoder)
    }

    fn read_side<R: Read, C: Clock>(
        &self,
        side: Side,
        stream: &mut TimedStreamReader<R, C>,
    ) -> Result<()> {
        let mut ctx = DecodeContext::new(side);
        let mut buf = BytesMut::with_capacity(self.read_chunk_size);
        let mut chunk = vec![0u8; self.read_chunk_size];
        let mut span = SeenSpan::default();
        let mut decoder: Option<Arc<dyn ProtocolDecoder>> = None;
        let mut eof = false;
        let mut need_more = true;
        // Buffered length the decoder asked for before it is worth calling again.
        let mut wanted = 0usize;
        // Bytes an error asked to skip that have not arrived yet.
        let mut pending_skip = 0usize;

        loop {
            if need_more && !eof {
                match stream.read(&mut chunk) {
                    Ok(0) => eof = true,
                    Ok(n) => {
                        let skipped = pending_skip.min(n);
                        pending_skip -= skipped;
                        if skipped < n {
                            buf.extend_from_slice(&chunk[skipped..n]);
                            span.record(stream.seen());
                            if buf.len() >= wanted {
                                need_more = false;
                                wanted = 0;
                            }
                        }
                    }
                    Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                    Err(e) => {
                        return Err(Error::Stream {
                            address: self.address.to_string(),
                            source: e,
                        });
                    }
                }
                continue;
            }

            if buf.is_empty() {
                if eof {
                    break;
                }
                need_more = true;
                continue;
            }

            if decoder.is_none() {
                if buf.len() < SNIFF_LEN && !eof {
                    need_more = true;
                    continue;
                }
                let chosen = self.decoder_for(&buf);
                ctx.kind = chosen.classify(&buf);
                decoder = Some(chosen);
            }
            let Some(decoder) = decoder.clone() else {
                break;
            };

            let result = match decoder.decode(&buf, &ctx) {
                DecodeResult::NeedMore { .. } if eof => decoder.finish(&buf, &ctx),
                result => result,
            };

            match result {
                DecodeResult::Complete {
                    message,
                    bytes_consumed,
                } => {
                    if span.first.is_none() {
                        span.record(stream.seen());
                    }
                    let seen = span.take();
                    ctx.kind = Some(message.message.kind());
                    self.record_message(side, message, seen);
                    ctx.messages_decoded += 1;

                    if bytes_consumed == 0 {
                        warn!(
                            "{} decoder made no progress on {} {} side, abandoning",
                            decoder.name(),
                            self.address,
                            side.as_str()
                        );
                        break;
                    }
                    buf.advance(bytes_consumed.min(buf.len()));
                    if !buf.is_empty() {
                        // Leftover bytes arrived with the latest read.
                        span.record(stream.seen());
                    }
                }
                DecodeResult::Skip { bytes_consumed } if bytes_consumed > 0 => {
                    buf.advance(bytes_consumed.min(buf.len()));
                    if buf.is_empty() {
                        span.take();
                    }
                }
                DecodeResult::NeedMore { minimum_bytes } if !eof => {
                    wanted = minimum_bytes.unwrap_or(0);
                    need_more = true;
                }
                DecodeResult::Skip { .. } | DecodeResult::NeedMore { .. } => {
                    self.record_error(
                        side,
                        ctx.preferred(),
                        DecodeError::Truncated {
                            protocol: decoder.name(),
                            have: buf.len(),
                        }
                        .to_string(),
                    );
                    break;
                }
                DecodeResult::Error { error, skip_bytes } => {
                    self.record_error(side, ctx.preferred(), error.to_string());
                    match skip_bytes {
                        Some(skip) if skip > 0 => {
                            let available = skip.min(buf.len());
                            buf.advance(available);
                            pending_skip = skip - available;
                            span.take();
                            if !buf.is_empty() {
                                span.record(stream.seen());
                            }
                        }
                        _ => {
                            debug!(
                                "Abandoning {} side of {} after unrecoverable decode error",
                                side.as_str(),
                                self.address
                            );
                            break;
                        }
                    }
                }
            }
        }

        if !eof {
            // Keep the producer unblocked; the bytes are discarded.
            io::copy(stream, &mut io::sink()).map_err(|e| Error::Stream {
                address: self.address.to_string(),
                source: e,
            })?;
        }
        trace!(
            "{} side of {} done after {} bytes",
            side.as_str(),
            self.address,
            stream.bytes_read()
        );
        Ok(())
    }

    fn record_message(&self, side: Side, decoded: DecodedMessage, seen: Vec<SystemTime>) {
        let kind = decoded.message.kind();
        if kind != MessageKind::expected_on(side) {
            debug!(
                "{:?} decoded on {} side of {}",
                kind,
                side.as_str(),
                self.address
            );
        }
        if decoded.truncated {
            debug!("Surfacing truncated {:?} on {}", kind, self.address);
        }

        if let Some(error) = &decoded.error {
            warn!("Decode error on {} side of {}: {}", side.as_str(), self.address, error);
        }

        let mut state = self.lock_state();
        let slot = match decoded.message {
            Message::Request(request) => {
                let position = state.next_request;
                state.next_request += 1;
                let slot = state.slot(position);
                slot.request = Some((request, decoded.body, seen));
                slot.request_side = Some(side);
                slot
            }
            Message::Response(response) => {
                let position = state.next_response;
                state.next_response += 1;
                let slot = state.slot(position);
                slot.response = Some((response, decoded.body, seen));
                slot.response_side = Some(side);
                slot.exit_status = decoded.exit_status;
                slot
            }
        };
        if let Some(error) = decoded.error {
            slot.errors.push(error.to_string());
        }
    }

    /// Attach an error to the entry the side is currently decoding into,
    /// judged by the kind of message the side carries.
    fn record_error(&self, side: Side, kind: MessageKind, error: String) {
        warn!("Decode error on {} side of {}: {}", side.as_str(), self.address, error);

        let mut state = self.lock_state();
        let position = match kind {
            MessageKind::Request => state.next_request,
            MessageKind::Response => state.next_response,
        };
        state.slot(position).errors.push(error);
    }
}
