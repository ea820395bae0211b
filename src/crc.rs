use crc32fast::Hasher;

use crate::rom::{FormatError, Header, HEADER_CRC_OFFSET, HEADER_CRC_REGION_SIZE};

/// Standard CRC-32 (reflected 0xEDB88320, init and final XOR 0xFFFFFFFF).
pub fn crc32(data: &[u8]) -> u32 {
    let mut hasher = Hasher::new();
    hasher.update(data);
    hasher.finalize()
}

/// Computes the header checksum: CRC-32 over `[0, 0x614)` with the stored
/// checksum field hashed as zeros.
pub fn header_crc(data: &[u8]) -> Result<u32, FormatError> {
    let region = data.get(..HEADER_CRC_REGION_SIZE).ok_or(FormatError::TruncatedInput {
        what: "header checksum region",
        needed: HEADER_CRC_REGION_SIZE,
        actual: data.len(),
    })?;
    let field_end = HEADER_CRC_OFFSET + size_of::<u32>();
    let mut hasher = Hasher::new();
    hasher.update(&region[..HEADER_CRC_OFFSET]);
    hasher.update(&[0u8; size_of::<u32>()]);
    hasher.update(&region[field_end..]);
    Ok(hasher.finalize())
}

/// Checks the header checksum against the value stored in `header`.
pub fn verify_header_checksum(data: &[u8], header: &Header) -> Result<bool, FormatError> {
    Ok(header_crc(data)? == header.crc.get())
}

#[inline]
pub fn verify_payload_checksum(payload: &[u8], expected_crc: u32) -> bool {
    crc32(payload) == expected_crc
}
