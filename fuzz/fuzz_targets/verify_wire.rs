#![no_main]

use arbitrary::Arbitrary;
use jellyfish_core::{
    hasher::Blake3Hasher,
    proof::{decode_wire, encode_wire, verify_wire},
    ClassicCommitment,
};
use libfuzzer_sys::fuzz_target;

#[derive(Debug, Arbitrary)]
struct Run {
    root: [u8; 32],
    key: Vec<u8>,
    value: Option<Vec<u8>>,
    including: bool,
    wire: Vec<u8>,
}

fuzz_target!(|run: Run| {
    // must never panic, whatever the input.
    let _ = verify_wire::<Blake3Hasher, ClassicCommitment<Blake3Hasher>>(
        &run.root,
        &run.key,
        run.value.as_deref(),
        run.including,
        &run.wire,
    );

    // canonical decoding means anything accepted re-encodes to the same bytes.
    if let Ok(records) = decode_wire(&run.wire) {
        assert_eq!(encode_wire(&records), run.wire);
    }
});
