//! Index extensions: the TREE cache and unknown/raw passthrough.

pub mod tree;

/// Raw unknown extension, preserved byte-for-byte for round-trip.
#[derive(Debug, Clone)]
pub struct RawExtension {
    pub signature: [u8; 4],
    pub data: Vec<u8>,
}
