//! Fuzz target for the FastCGI record decoder.

#![no_main]

use libfuzzer_sys::fuzz_target;
use pcaphar_core::{DecodeContext, DecodeResult, FcgiDecoder, ProtocolDecoder, Side};

fuzz_target!(|data: &[u8]| {
    let decoder = FcgiDecoder::new();
    let _ = decoder.sniff(data);

    for side in [Side::Client, Side::Server] {
        let mut ctx = DecodeContext::new(side);
        ctx.kind = decoder.classify(data);

        let mut rest = data;
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
    }
});
