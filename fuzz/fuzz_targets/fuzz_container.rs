#![no_main]

use bitswarm_client::core::serialization::decode;
use bitswarm_client::protocol::message::Envelope;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Container decoding must reject hostile input without panicking or over-allocating
    if let Ok((_, consumed)) = decode(data) {
        assert!(consumed <= data.len());
    }
    let _ = Envelope::from_bytes(data);
});
