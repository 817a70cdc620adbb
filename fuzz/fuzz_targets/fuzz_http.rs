//! Fuzz target for the HTTP/1.x decoder.
//!
//! Drives the decoder the way the conversation builder does: decode until
//! it asks for more data, then call `finish` on whatever is left.

#![no_main]

use libfuzzer_sys::fuzz_target;
use pcaphar_core::{DecodeContext, DecodeResult, HttpDecoder, MessageKind, ProtocolDecoder, Side};

fuzz_target!(|data: &[u8]| {
    if data.is_empty() {
        return;
    }

    // First byte picks the side and message kind
    let side = if data[0] & 1 == 0 { Side::Client } else { Side::Server };
    let mut ctx = DecodeContext::new(side);
    if data[0] & 2 != 0 {
        ctx.kind = Some(MessageKind::Response);
    }

    let decoder = HttpDecoder::new();
    let mut rest = &data[1..];
    let _ = decoder.sniff(rest);
    let _ = decoder.classify(rest);

    while !rest.is_empty() {
        let consumed = match decoder.decode(rest, &ctx) {
            DecodeResult::Complete { bytes_consumed, .. } => {
                ctx.messages_decoded += 1;
                bytes_consumed
            }
            DecodeResult::Skip { bytes_consumed } => bytes_consumed,
            DecodeResult::Error {
                skip_bytes: Some(skip),
                ..
            } => skip,
            DecodeResult::NeedMore { .. } => {
                let _ = decoder.finish(rest, &ctx);
                break;
            }
            DecodeResult::Error { .. } => break,
        };
        if consumed == 0 {
            break;
        }
        rest = &rest[consumed.min(rest.len())..];
    }
});
