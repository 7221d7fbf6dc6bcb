//! Utility functions for id generation and serialization

use crate::error::Result;
use bech32::Bech32m;
use uuid7::uuid7;

// construct a unique reference then encode using bech32
pub fn new_uuid_to_bech32(hrp: &str) -> anyhow::Result<String> {
    let hrp = bech32::Hrp::parse(hrp)?;
    let encode = bech32::encode::<Bech32m>(hrp, uuid7().as_bytes())?;
    Ok(encode)
}

pub(crate) fn to_cbor<T: minicbor::Encode<()>>(value: &T) -> Result<Vec<u8>> {
    Ok(minicbor::to_vec(value)?)
}

pub(crate) fn from_cbor<T>(bytes: &[u8]) -> Result<T>
where
    T: for<'b> minicbor::Decode<'b, ()>,
{
    Ok(minicbor::decode(bytes)?)
}

/// Joins key segments with a NUL separator so prefix scans stop at segment boundaries.
pub(crate) fn compound_key(parts: &[&[u8]]) -> Vec<u8> {
    let mut key = Vec::with_capacity(parts.iter().map(|p| p.len() + 1).sum());
    for (i, part) in parts.iter().enumerate() {
        if i > 0 {
            key.push(0);
        }
        key.extend_from_slice(part);
    }
    key
}

pub(crate) fn prefix_key(part: &[u8]) -> Vec<u8> {
    let mut key = part.to_vec();
    key.push(0);
    key
}

pub fn count_words(text: &str) -> usize {
    text.split_whitespace().count()
}
