#![no_main]

use std::sync::Arc;

use bitswarm_client::core::codec::EnvelopeCodec;
use bitswarm_client::core::datagram::Datagram;
use bitswarm_client::utils::crypto::CipherSlot;
use bytes::BytesMut;
use libfuzzer_sys::fuzz_target;
use tokio_util::codec::Decoder;

fuzz_target!(|data: &[u8]| {
    // Feed the stream in two chunks to exercise partial headers
    let split = data.first().map_or(0, |b| usize::from(*b)).min(data.len());
    let mut codec = EnvelopeCodec::new(64 * 1024, Arc::new(CipherSlot::new()));
    let mut buf = BytesMut::from(&data[..split]);
    'stream: for chunk in [&data[split..], &[][..]] {
        buf.extend_from_slice(chunk);
        loop {
            match codec.decode(&mut buf) {
                Ok(Some(_)) => continue,
                Ok(None) => break,
                Err(_) => break 'stream,
            }
        }
    }

    if let Ok(datagram) = Datagram::parse(data) {
        let _ = datagram.envelope();
    }
});
