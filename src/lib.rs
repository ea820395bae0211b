//! Decoder and checksum verifier for Topsee firmware ROM images.

pub mod crc;
pub mod extract;
pub mod rom;
pub mod util;
