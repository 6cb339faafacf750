use alloc::vec::Vec;

use super::verify::{verify_records, ProofError};
use crate::cbor::{Decoder, Encoder};
use crate::hasher::{CommitmentScheme, HashFunction};
use crate::node::{Hash, Node};

/// Encode node records as a proof wire: a CBOR array of byte strings, each holding one record.
pub fn encode_wire(records: &[Node]) -> Vec<u8> {
    let mut enc = Encoder::new();
    enc.array(records.len());
    for record in records {
        enc.bytes(&record.encode());
    }
    enc.into_inner()
}

/// Decode the node records of a proof wire.
pub fn decode_wire(wire: &[u8]) -> Result<Vec<Node>, ProofError> {
    let mut dec = Decoder::new(wire);
    let count = dec.array()?;
    let mut records = Vec::with_capacity(count);
    for _ in 0..count {
        records.push(Node::decode(dec.bytes()?)?);
    }
    dec.finish()?;
    Ok(records)
}

/// Verify a proof wire for `key` against `expected_root`.
///
/// With `including` set, this checks that `key` maps to `value`; otherwise that `key` is absent
/// and `value` is ignored. Malformed wires are errors. A well-formed wire that proves something
/// else, or nothing, against the root yields `Ok(false)`.
pub fn verify_wire<H: HashFunction, C: CommitmentScheme>(
    expected_root: &Hash,
    key: &[u8],
    value: Option<&[u8]>,
    including: bool,
    wire: &[u8],
) -> Result<bool, ProofError> {
    let records = decode_wire(wire)?;
    let key_hash = H::digest(key);

    let verified = match verify_records::<C>(&records, &key_hash, expected_root) {
        Ok(verified) => verified,
        Err(e) if e.is_mismatch() => return Ok(false),
        Err(e) => return Err(e),
    };

    Ok(match (including, value) {
        (true, Some(value)) => verified.confirm_value(&H::digest(value)),
        (true, None) => false,
        (false, _) => verified.confirm_nonexistence(),
    })
}
