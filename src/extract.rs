use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use tracing::info;

use crate::rom::Image;

/// Writes the header, kernel and rootfs regions of `image` into `out_dir`.
///
/// Returns the paths written, in region order.
pub fn extract_regions(image: &Image, out_dir: &Path) -> Result<Vec<PathBuf>> {
    fs::create_dir_all(out_dir)
        .with_context(|| format!("Failed to create {}", out_dir.display()))?;
    let mut written = Vec::with_capacity(3);
    for region in image.regions() {
        let path = out_dir.join(region.file_name);
        info!(section = %region.section, size = region.data.len(), "writing {}", path.display());
        fs::write(&path, region.data)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        written.push(path);
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        crc::{crc32, header_crc},
        rom::{
            decode_image, HEADER_CRC_OFFSET, HEADER_CRC_REGION_SIZE, KERNEL_DESCRIPTOR_OFFSET,
            ROOTFS_DESCRIPTOR_OFFSET,
        },
    };

    /// Minimal image: kernel and rootfs payloads directly after the checksum region.
    fn image_bytes() -> Vec<u8> {
        let kernel = b"uImage";
        let rootfs = b"hsqs-rootfs";
        let kernel_offset = HEADER_CRC_REGION_SIZE as u32;
        let rootfs_offset = kernel_offset + kernel.len() as u32;
        let mut data = vec![0u8; HEADER_CRC_REGION_SIZE];
        data[..8].copy_from_slice(b"FIRMWARE");

        let k = KERNEL_DESCRIPTOR_OFFSET;
        data[k + 4..k + 8].copy_from_slice(&kernel_offset.to_le_bytes());
        data[k + 8..k + 12].copy_from_slice(&(kernel.len() as u32).to_le_bytes());
        data[k + 12..k + 16].copy_from_slice(&crc32(kernel).to_le_bytes());

        let r = ROOTFS_DESCRIPTOR_OFFSET;
        data[r..r + 4].copy_from_slice(&rootfs_offset.to_le_bytes());
        data[r + 4..r + 8].copy_from_slice(&(rootfs.len() as u32).to_le_bytes());
        data[r + 0x108..r + 0x10C].copy_from_slice(&crc32(rootfs).to_le_bytes());

        data.extend_from_slice(kernel);
        data.extend_from_slice(rootfs);
        let len = data.len() as u32;
        data[12..16].copy_from_slice(&len.to_le_bytes());
        let crc = header_crc(&data).unwrap();
        data[HEADER_CRC_OFFSET..HEADER_CRC_OFFSET + 4].copy_from_slice(&crc.to_le_bytes());
        data
    }

    #[test]
    fn writes_all_regions() {
        let data = image_bytes();
        let image = decode_image(&data).unwrap();
        assert_eq!(image.mismatches().count(), 0);

        let dir = tempfile::tempdir().unwrap();
        let out_dir = dir.path().join("out");
        let written = extract_regions(&image, &out_dir).unwrap();
        assert_eq!(written, [
            out_dir.join("header.img"),
            out_dir.join("kernel.uimage"),
            out_dir.join("rootfs"),
        ]);
        assert_eq!(fs::read(&written[0]).unwrap(), &data[..HEADER_CRC_REGION_SIZE]);
        assert_eq!(fs::read(&written[1]).unwrap(), b"uImage");
        assert_eq!(fs::read(&written[2]).unwrap(), b"hsqs-rootfs");
    }

    #[test]
    fn output_dir_is_a_file() {
        let data = image_bytes();
        let image = decode_image(&data).unwrap();
        let file = tempfile::NamedTempFile::new().unwrap();
        let err = extract_regions(&image, file.path()).unwrap_err();
        assert!(err.to_string().starts_with("Failed to create"));
    }
}
