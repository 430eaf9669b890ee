//! SIF global header and descriptor table
//!
//! Only the fields needed to describe an image are decoded: architecture, signature and
//! encryption state. Everything is read from a prefix of the file (the header buffer), so a
//! descriptor table that does not fit in the header buffer is an error rather than a second read.

use crate::error::{LibraryError, Result};
use uuid::Uuid;

pub const SIF_MAGIC: &[u8] = b"SIF_MAGIC\0";

/// Size of the fixed global header
pub const HEADER_SIZE: usize = 128;
/// Size of one entry in the descriptor table
pub const DESCRIPTOR_SIZE: usize = 585;

pub const DATA_PARTITION: i32 = 0x4004;
pub const DATA_SIGNATURE: i32 = 0x4005;

pub const FS_ENCRYPTED_SQUASHFS: i32 = 5;
pub const PART_PRIMARY_SYSTEM: i32 = 2;

const ARCH_CODES: &[(&str, &str)] = &[
    ("01", "386"),
    ("02", "amd64"),
    ("03", "arm"),
    ("04", "arm64"),
    ("05", "ppc64"),
    ("06", "ppc64le"),
    ("07", "mips"),
    ("08", "mipsle"),
    ("09", "mips64"),
    ("10", "mips64le"),
    ("11", "s390x"),
    ("12", "riscv64"),
];

/// Map a two-digit SIF architecture code to its Go-style name
pub fn arch_from_code(code: &str) -> Option<&'static str> {
    ARCH_CODES
        .iter()
        .find(|(c, _)| *c == code)
        .map(|(_, name)| *name)
}

pub fn code_from_arch(arch: &str) -> Option<&'static str> {
    ARCH_CODES
        .iter()
        .find(|(_, name)| *name == arch)
        .map(|(code, _)| *code)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlobalHeader {
    pub launch_script: String,
    pub version: String,
    /// Two-digit architecture code
    pub arch_code: String,
    pub id: Uuid,
    pub created_at: i64,
    pub modified_at: i64,
    pub descriptors_free: i64,
    pub descriptors_total: i64,
    pub descriptors_offset: i64,
    pub descriptors_size: i64,
    pub data_offset: i64,
    pub data_size: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SifDescriptor {
    pub data_type: i32,
    pub used: bool,
    pub id: u32,
    pub group_id: u32,
    pub linked_id: u32,
    pub offset: i64,
    pub size: i64,
    pub name: String,
    extra: Vec<u8>,
}

impl SifDescriptor {
    /// Filesystem type, partition type and architecture code of a partition descriptor
    pub fn partition_info(&self) -> Option<(i32, i32, String)> {
        if self.data_type != DATA_PARTITION || self.extra.len() < 11 {
            return None;
        }
        let fs_type = read_i32(&self.extra, 0);
        let part_type = read_i32(&self.extra, 4);
        Some((fs_type, part_type, c_string(&self.extra[8..11])))
    }
}

/// Decoded header plus used descriptors
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SifHeader {
    pub global: GlobalHeader,
    pub descriptors: Vec<SifDescriptor>,
}

impl SifHeader {
    pub fn parse(buf: &[u8]) -> Result<Self> {
        if buf.len() < HEADER_SIZE {
            return Err(LibraryError::InvalidSif(format!(
                "need {} header bytes, have {}",
                HEADER_SIZE,
                buf.len()
            )));
        }
        if &buf[32..42] != SIF_MAGIC {
            return Err(LibraryError::InvalidSif("bad magic".to_string()));
        }

        let id = Uuid::from_slice(&buf[48..64])
            .map_err(|e| LibraryError::InvalidSif(format!("bad image id: {}", e)))?;
        let global = GlobalHeader {
            launch_script: c_string(&buf[0..32]),
            version: c_string(&buf[42..45]),
            arch_code: c_string(&buf[45..48]),
            id,
            created_at: read_i64(buf, 64),
            modified_at: read_i64(buf, 72),
            descriptors_free: read_i64(buf, 80),
            descriptors_total: read_i64(buf, 88),
            descriptors_offset: read_i64(buf, 96),
            descriptors_size: read_i64(buf, 104),
            data_offset: read_i64(buf, 112),
            data_size: read_i64(buf, 120),
        };

        if global.descriptors_total < 0 || global.descriptors_offset < 0 {
            return Err(LibraryError::InvalidSif("negative descriptor table bounds".to_string()));
        }
        let start = global.descriptors_offset as usize;
        let end = (global.descriptors_total as usize)
            .checked_mul(DESCRIPTOR_SIZE)
            .and_then(|len| len.checked_add(start))
            .ok_or_else(|| LibraryError::InvalidSif("descriptor table overflow".to_string()))?;
        if end > buf.len() {
            return Err(LibraryError::InvalidSif(format!(
                "descriptor table ends at {} but only {} bytes were read",
                end,
                buf.len()
            )));
        }

        let descriptors = buf[start..end]
            .chunks_exact(DESCRIPTOR_SIZE)
            .map(parse_descriptor)
            .filter(|d| d.used)
            .collect();

        Ok(Self {
            global,
            descriptors,
        })
    }

    /// Image architecture name; the primary system partition wins over the global header
    pub fn architecture(&self) -> String {
        let code = self
            .descriptors
            .iter()
            .filter_map(SifDescriptor::partition_info)
            .find(|(_, part_type, _)| *part_type == PART_PRIMARY_SYSTEM)
            .map(|(_, _, arch)| arch)
            .unwrap_or_else(|| self.global.arch_code.clone());
        arch_from_code(&code).unwrap_or("unknown").to_string()
    }

    pub fn is_signed(&self) -> bool {
        self.descriptors.iter().any(|d| d.data_type == DATA_SIGNATURE)
    }

    pub fn is_encrypted(&self) -> bool {
        self.descriptors
            .iter()
            .filter_map(SifDescriptor::partition_info)
            .any(|(fs_type, _, _)| fs_type == FS_ENCRYPTED_SQUASHFS)
    }
}

fn parse_descriptor(raw: &[u8]) -> SifDescriptor {
    SifDescriptor {
        data_type: read_i32(raw, 0),
        used: raw[4] != 0,
        id: read_u32(raw, 5),
        group_id: read_u32(raw, 9),
        linked_id: read_u32(raw, 13),
        offset: read_i64(raw, 17),
        size: read_i64(raw, 25),
        name: c_string(&raw[73..201]),
        extra: raw[201..585].to_vec(),
    }
}

fn read_i64(buf: &[u8], at: usize) -> i64 {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&buf[at..at + 8]);
    i64::from_le_bytes(bytes)
}

fn read_i32(buf: &[u8], at: usize) -> i32 {
    let mut bytes = [0u8; 4];
    bytes.copy_from_slice(&buf[at..at + 4]);
    i32::from_le_bytes(bytes)
}

fn read_u32(buf: &[u8], at: usize) -> u32 {
    let mut bytes = [0u8; 4];
    bytes.copy_from_slice(&buf[at..at + 4]);
    u32::from_le_bytes(bytes)
}

/// NUL-terminated string from a fixed-width field
fn c_string(field: &[u8]) -> String {
    let end = field.iter().position(|b| *b == 0).unwrap_or(field.len());
    String::from_utf8_lossy(&field[..end]).into_owned()
}


#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;

    #[test]
    fn test_arch_code_table() {
        assert_eq!(arch_from_code("02"), Some("amd64"));
        assert_eq!(arch_from_code("12"), Some("riscv64"));
        assert_eq!(arch_from_code("99"), None);
        assert_eq!(code_from_arch("arm64"), Some("04"));
    }

    #[test]
    fn test_parse_plain_header() {
        let buf = build_header("02", &[DescriptorSpec::partition(1, PART_PRIMARY_SYSTEM, "02")]);
        let header = SifHeader::parse(&buf).unwrap();
        assert_eq!(header.global.version, "02");
        assert_eq!(header.global.id, Uuid::from_u128(0x1234));
        assert_eq!(header.descriptors.len(), 1);
        assert_eq!(header.architecture(), "amd64");
        assert!(!header.is_signed());
        assert!(!header.is_encrypted());
    }

    #[test]
    fn test_primary_partition_arch_overrides_header() {
        let buf = build_header(
            "02",
            &[
                DescriptorSpec::partition(1, 3, "03"),
                DescriptorSpec::partition(1, PART_PRIMARY_SYSTEM, "04"),
            ],
        );
        assert_eq!(SifHeader::parse(&buf).unwrap().architecture(), "arm64");
    }

    #[test]
    fn test_signed_and_encrypted() {
        let buf = build_header(
            "02",
            &[
                DescriptorSpec::partition(FS_ENCRYPTED_SQUASHFS, PART_PRIMARY_SYSTEM, "02"),
                DescriptorSpec::signature(),
            ],
        );
        let header = SifHeader::parse(&buf).unwrap();
        assert!(header.is_signed());
        assert!(header.is_encrypted());
    }

    #[test]
    fn test_rejects_bad_magic_and_short_buffers() {
        assert!(matches!(SifHeader::parse(&[0u8; 10]), Err(LibraryError::InvalidSif(_))));
        let mut buf = build_header("02", &[]);
        buf[32] = b'X';
        assert!(matches!(SifHeader::parse(&buf), Err(LibraryError::InvalidSif(_))));
    }

    #[test]
    fn test_descriptor_table_beyond_header_buffer() {
        let buf = build_header("02", &[DescriptorSpec::signature()]);
        assert!(SifHeader::parse(&buf[..HEADER_SIZE + 10]).is_err());
    }
}
