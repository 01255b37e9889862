//! Fuzz testing for block payload and metadata decoding.
//!
//! Feeds arbitrary bytes to the record scanner, the per-record decoder and
//! the metadata trailer codec. Malformed input must surface as an error,
//! never as a panic or an out-of-bounds read.

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;

use emberdb::event::scan_records;
use emberdb::storage::MetaCodec;

#[derive(Debug, Arbitrary)]
enum PayloadInput {
    Block(Vec<u8>),
    Trailer(Vec<u8>),
}

fuzz_target!(|input: PayloadInput| {
    match input {
        PayloadInput::Block(payload) => {
            if let Ok(spans) = scan_records(&payload) {
                for span in spans {
                    assert!(span.end <= payload.len());
                    let _ = span.decode(&payload);
                }
            }
        }
        PayloadInput::Trailer(bytes) => {
            if let Ok(meta) = MetaCodec::decode(&bytes) {
                let actions = meta.actions.iter().map(|(id, name)| (*id, name.as_str()));
                let properties = meta
                    .properties
                    .iter()
                    .map(|(id, name, property_type)| (*id, name.as_str(), *property_type));
                let encoded = MetaCodec::encode(actions, properties, &meta.blocks);
                let again = MetaCodec::decode(&encoded).expect("re-encoded trailer decodes");
                assert_eq!(again.actions, meta.actions);
                assert_eq!(again.properties, meta.properties);
                assert_eq!(again.blocks, meta.blocks);
            }
        }
    }
});
