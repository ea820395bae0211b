use std::{
    fmt::{Display, Formatter},
    mem::offset_of,
};

use thiserror::Error;
use tracing::{debug, warn};
use zerocopy::{little_endian::U32, FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::{
    crc::{crc32, header_crc},
    static_assert,
    util::{trim_nul, window},
};

pub const TOPSEE_MAGIC: [u8; 8] = *b"FIRMWARE";

/// Offset of the header checksum field within the image.
pub const HEADER_CRC_OFFSET: usize = 0x8;
/// Size of the image prefix covered by the header checksum.
pub const HEADER_CRC_REGION_SIZE: usize = 0x614;

pub const KERNEL_DESCRIPTOR_OFFSET: usize = 0x10;
pub const ROOTFS_DESCRIPTOR_OFFSET: usize = 0x120;

pub const NAME_SIZE: usize = 0x100;

/// Image header.
#[derive(Clone, Debug, PartialEq, FromBytes, IntoBytes, Immutable, KnownLayout)]
#[repr(C)]
pub struct Header {
    pub magic: [u8; 8],
    pub crc: U32,
    /// Total image length. Advisory only.
    pub length: U32,
}

static_assert!(size_of::<Header>() == KERNEL_DESCRIPTOR_OFFSET);
static_assert!(offset_of!(Header, crc) == HEADER_CRC_OFFSET);

/// Kernel descriptor.
#[derive(Clone, Debug, PartialEq, FromBytes, IntoBytes, Immutable, KnownLayout)]
#[repr(C)]
pub struct KernelDescriptor {
    pub unknown: U32,
    pub offset: U32,
    pub length: U32,
    pub crc: U32,
    pub name: [u8; NAME_SIZE],
}

static_assert!(size_of::<KernelDescriptor>() == 0x110);
static_assert!(
    KERNEL_DESCRIPTOR_OFFSET + size_of::<KernelDescriptor>() == ROOTFS_DESCRIPTOR_OFFSET
);

impl KernelDescriptor {
    #[inline]
    pub fn name(&self) -> Name<'_> { Name::decode(&self.name) }
}

/// Rootfs descriptor. Note the checksum follows the name here.
#[derive(Clone, Debug, PartialEq, FromBytes, IntoBytes, Immutable, KnownLayout)]
#[repr(C)]
pub struct RootfsDescriptor {
    pub offset: U32,
    pub length: U32,
    pub name: [u8; NAME_SIZE],
    pub crc: U32,
}

static_assert!(size_of::<RootfsDescriptor>() == 0x10C);
static_assert!(
    ROOTFS_DESCRIPTOR_OFFSET + size_of::<RootfsDescriptor>() <= HEADER_CRC_REGION_SIZE
);

impl RootfsDescriptor {
    #[inline]
    pub fn name(&self) -> Name<'_> { Name::decode(&self.name) }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Section {
    Header,
    Kernel,
    Rootfs,
}

impl Section {
    pub fn as_str(self) -> &'static str {
        match self {
            Section::Header => "Header",
            Section::Kernel => "Kernel",
            Section::Rootfs => "Rootfs",
        }
    }
}

impl Display for Section {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result { f.write_str(self.as_str()) }
}

/// A fixed-width name field.
///
/// Names that are not valid UTF-8 are kept as raw bytes rather than failing
/// the descriptor.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Name<'a> {
    Text(&'a str),
    Raw(&'a [u8]),
}

impl<'a> Name<'a> {
    pub fn decode(field: &'a [u8]) -> Self {
        match std::str::from_utf8(field) {
            Ok(text) => Name::Text(text.trim_matches('\0')),
            Err(_) => Name::Raw(trim_nul(field)),
        }
    }

    #[inline]
    pub fn is_raw(&self) -> bool { matches!(self, Name::Raw(_)) }
}

impl Display for Name<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Name::Text(text) => f.write_str(text),
            Name::Raw(raw) => write!(f, "[raw] {}", hex::encode(raw)),
        }
    }
}

/// Fatal decode errors. Checksum mismatches are not errors; see [`ChecksumCheck`].
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum FormatError {
    #[error("invalid magic: {found:x?}")]
    BadMagic { found: [u8; 8] },
    #[error("truncated input: {what} needs {needed:#x} bytes, got {actual:#x}")]
    TruncatedInput { what: &'static str, needed: usize, actual: usize },
    #[error(
        "{section} payload out of range: offset {offset:#x}, length {length:#x}, image size {buffer_len:#x}"
    )]
    OutOfRange { section: Section, offset: u32, length: u32, buffer_len: usize },
}

fn decode_record<'a, T>(
    data: &'a [u8],
    offset: usize,
    what: &'static str,
) -> Result<&'a T, FormatError>
where T: FromBytes + Immutable + KnownLayout {
    let tail = data.get(offset..).unwrap_or_default();
    let (record, _) = T::ref_from_prefix(tail).map_err(|_| FormatError::TruncatedInput {
        what,
        needed: offset + size_of::<T>(),
        actual: data.len(),
    })?;
    Ok(record)
}

pub fn decode_header(data: &[u8]) -> Result<&Header, FormatError> {
    let header: &Header = decode_record(data, 0, "header")?;
    if header.magic != TOPSEE_MAGIC {
        return Err(FormatError::BadMagic { found: header.magic });
    }
    Ok(header)
}

pub fn decode_kernel_descriptor(data: &[u8]) -> Result<&KernelDescriptor, FormatError> {
    decode_record(data, KERNEL_DESCRIPTOR_OFFSET, "kernel descriptor")
}

pub fn decode_rootfs_descriptor(data: &[u8]) -> Result<&RootfsDescriptor, FormatError> {
    decode_record(data, ROOTFS_DESCRIPTOR_OFFSET, "rootfs descriptor")
}

/// Returns the payload `[offset, offset + length)` of `section`.
pub fn extract_payload(
    data: &[u8],
    section: Section,
    offset: u32,
    length: u32,
) -> Result<&[u8], FormatError> {
    window(data, offset as usize, length as usize).ok_or(FormatError::OutOfRange {
        section,
        offset,
        length,
        buffer_len: data.len(),
    })
}

/// Outcome of one checksum verification.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ChecksumCheck {
    pub section: Section,
    pub expected: u32,
    pub actual: u32,
}

impl ChecksumCheck {
    #[inline]
    pub fn is_ok(&self) -> bool { self.expected == self.actual }

    pub fn mismatch(&self) -> Option<ChecksumMismatch> {
        (!self.is_ok()).then_some(ChecksumMismatch {
            section: self.section,
            expected: self.expected,
            actual: self.actual,
        })
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ChecksumMismatch {
    pub section: Section,
    pub expected: u32,
    pub actual: u32,
}

impl Display for ChecksumMismatch {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} crc mismatch, expected: {:#x} got {:#x}",
            self.section, self.expected, self.actual
        )
    }
}

/// A named byte range that can be written out on its own.
#[derive(Copy, Clone, Debug)]
pub struct Region<'a> {
    pub section: Section,
    pub file_name: &'static str,
    pub data: &'a [u8],
}

/// A decoded image. Records and payloads borrow from the input buffer.
#[derive(Debug)]
pub struct Image<'a> {
    data: &'a [u8],
    pub header: &'a Header,
    pub kernel: &'a KernelDescriptor,
    pub rootfs: &'a RootfsDescriptor,
    pub kernel_payload: &'a [u8],
    pub rootfs_payload: &'a [u8],
    pub checks: [ChecksumCheck; 3],
}

impl<'a> Image<'a> {
    #[inline]
    pub fn header_check(&self) -> ChecksumCheck { self.checks[0] }

    #[inline]
    pub fn kernel_check(&self) -> ChecksumCheck { self.checks[1] }

    #[inline]
    pub fn rootfs_check(&self) -> ChecksumCheck { self.checks[2] }

    pub fn mismatches(&self) -> impl Iterator<Item = ChecksumMismatch> + '_ {
        self.checks.iter().filter_map(ChecksumCheck::mismatch)
    }

    /// Size of the buffer the image was decoded from.
    #[inline]
    #[allow(clippy::len_without_is_empty)]
    pub fn len(&self) -> usize { self.data.len() }

    /// Whether the advisory header length agrees with the actual size.
    #[inline]
    pub fn length_matches(&self) -> bool {
        self.header.length.get() as usize == self.data.len()
    }

    pub fn regions(&self) -> [Region<'a>; 3] {
        [
            Region {
                section: Section::Header,
                file_name: "header.img",
                data: &self.data[..HEADER_CRC_REGION_SIZE],
            },
            Region {
                section: Section::Kernel,
                file_name: "kernel.uimage",
                data: self.kernel_payload,
            },
            Region { section: Section::Rootfs, file_name: "rootfs", data: self.rootfs_payload },
        ]
    }
}

/// Decodes and verifies a complete image in one pass.
///
/// Fails on the first fatal condition. Checksum mismatches are recorded in
/// [`Image::checks`] and decoding carries on.
pub fn decode_image(data: &[u8]) -> Result<Image<'_>, FormatError> {
    let header = decode_header(data)?;
    let header_check = ChecksumCheck {
        section: Section::Header,
        expected: header.crc.get(),
        actual: header_crc(data)?,
    };
    debug!(length = header.length.get(), crc = header_check.actual, "decoded header");

    let kernel = decode_kernel_descriptor(data)?;
    let kernel_payload =
        extract_payload(data, Section::Kernel, kernel.offset.get(), kernel.length.get())?;
    let kernel_check = ChecksumCheck {
        section: Section::Kernel,
        expected: kernel.crc.get(),
        actual: crc32(kernel_payload),
    };
    debug!(offset = kernel.offset.get(), length = kernel.length.get(), "decoded kernel descriptor");

    let rootfs = decode_rootfs_descriptor(data)?;
    let rootfs_payload =
        extract_payload(data, Section::Rootfs, rootfs.offset.get(), rootfs.length.get())?;
    let rootfs_check = ChecksumCheck {
        section: Section::Rootfs,
        expected: rootfs.crc.get(),
        actual: crc32(rootfs_payload),
    };
    debug!(offset = rootfs.offset.get(), length = rootfs.length.get(), "decoded rootfs descriptor");

    let image = Image {
        data,
        header,
        kernel,
        rootfs,
        kernel_payload,
        rootfs_payload,
        checks: [header_check, kernel_check, rootfs_check],
    };
    for mismatch in image.mismatches() {
        warn!("{mismatch}");
    }
    if !image.length_matches() {
        warn!(
            declared = image.header.length.get(),
            actual = data.len(),
            "header length differs from image size"
        );
    }
    Ok(image)
}
