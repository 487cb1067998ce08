//! Compiled-artifact header reader.
//!
//! A compiled script starts with a fixed header:
//!
//! | field          | size      |
//! |----------------|-----------|
//! | magic          | 4         |
//! | major version  | 1         |
//! | minor version  | 1         |
//! | game id        | 2         |
//! | compile time   | 8         |
//! | script path    | 2 + N     |
//! | user name      | 2 + N     |
//! | computer name  | 2 + N     |
//!
//! The magic, read as a little-endian `u32`, selects the byte order of every
//! multi-byte field that follows.

use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;
use thiserror::Error;

/// Magic of little-endian artifacts (`0xFA57C0DE`).
pub const MAGIC_LITTLE_ENDIAN: u32 = 4_200_055_006;
/// Magic of big-endian artifacts (`0xDEC057FA` byte-swapped).
pub const MAGIC_BIG_ENDIAN: u32 = 3_737_147_386;

/// Error while decoding an artifact header.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum HeaderError {
    /// The first four bytes are not a known magic number
    #[error("unrecognized artifact magic 0x{0:08X}")]
    UnknownMagic(u32),
    /// The file ended before the header did
    #[error("artifact header truncated while reading {0}")]
    Truncated(&'static str),
    /// The file could not be read
    #[error("cannot read artifact: {0}")]
    Io(#[from] io::Error),
    /// A string is longer than its `u16` length prefix can describe
    #[error("artifact header {field} is {len} bytes, more than {max}", max = u16::MAX)]
    StringTooLong {
        /// Field being encoded
        field: &'static str,
        /// Byte length of the value
        len: usize,
    },
}

impl HeaderError {
    /// Whether the error means "this is not an artifact we understand",
    /// as opposed to a damaged or unreadable one.
    pub fn is_unknown_format(&self) -> bool {
        matches!(self, HeaderError::UnknownMagic(_))
    }
}

/// Field byte order selected by the magic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderFormat {
    /// Little-endian fields
    LittleEndian,
    /// Big-endian fields
    BigEndian,
}

impl HeaderFormat {
    /// Map a magic number to a layout.
    pub fn from_magic(magic: u32) -> Option<Self> {
        match magic {
            MAGIC_LITTLE_ENDIAN => Some(HeaderFormat::LittleEndian),
            MAGIC_BIG_ENDIAN => Some(HeaderFormat::BigEndian),
            _ => None,
        }
    }

    /// The magic number identifying this layout.
    pub fn magic(self) -> u32 {
        match self {
            HeaderFormat::LittleEndian => MAGIC_LITTLE_ENDIAN,
            HeaderFormat::BigEndian => MAGIC_BIG_ENDIAN,
        }
    }

    fn u16(self, bytes: [u8; 2]) -> u16 {
        match self {
            HeaderFormat::LittleEndian => u16::from_le_bytes(bytes),
            HeaderFormat::BigEndian => u16::from_be_bytes(bytes),
        }
    }

    fn u64(self, bytes: [u8; 8]) -> u64 {
        match self {
            HeaderFormat::LittleEndian => u64::from_le_bytes(bytes),
            HeaderFormat::BigEndian => u64::from_be_bytes(bytes),
        }
    }
}

/// A length-prefixed header string and where its bytes start in the file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderString {
    /// Decoded text
    pub value: String,
    /// Byte offset of the first character (after the length prefix)
    pub offset: u64,
}

/// Decoded artifact header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactHeader {
    /// Layout selected by the magic
    pub format: HeaderFormat,
    /// Major format version
    pub major_version: u8,
    /// Minor format version
    pub minor_version: u8,
    /// Game identifier
    pub game_id: u16,
    /// Compile time, seconds since the Unix epoch
    pub compile_time: u64,
    /// Source script path recorded by the compiler
    pub script_path: HeaderString,
    /// Name of the user who compiled the script
    pub user_name: HeaderString,
    /// Name of the machine the script was compiled on
    pub computer_name: HeaderString,
}

/// Read the header of the artifact at `path`.
///
/// Parsed fresh on every call; nothing is cached.
pub fn read_header(path: &Path) -> Result<ArtifactHeader, HeaderError> {
    let file = File::open(path)?;
    parse_header(&mut BufReader::new(file))
}

/// Parse a header from any byte stream positioned at the start of an artifact.
pub fn parse_header<R: Read>(reader: &mut R) -> Result<ArtifactHeader, HeaderError> {
    let mut cursor = Cursor { reader, offset: 0 };

    let magic = u32::from_le_bytes(cursor.array("magic")?);
    let format = HeaderFormat::from_magic(magic).ok_or(HeaderError::UnknownMagic(magic))?;

    let [major_version] = cursor.array::<1>("major version")?;
    let [minor_version] = cursor.array::<1>("minor version")?;
    let game_id = format.u16(cursor.array("game id")?);
    let compile_time = format.u64(cursor.array("compile time")?);
    let script_path = cursor.string(format, "script path")?;
    let user_name = cursor.string(format, "user name")?;
    let computer_name = cursor.string(format, "computer name")?;

    Ok(ArtifactHeader {
        format,
        major_version,
        minor_version,
        game_id,
        compile_time,
        script_path,
        user_name,
        computer_name,
    })
}

/// Encode a header. Used to synthesize artifacts in tests and benches.
///
/// Fails if a string does not fit its `u16` length prefix.
pub fn encode_header(header: &ArtifactHeader) -> Result<Vec<u8>, HeaderError> {
    let mut out = Vec::new();
    out.extend_from_slice(&header.format.magic().to_le_bytes());
    out.push(header.major_version);
    out.push(header.minor_version);
    let le = header.format == HeaderFormat::LittleEndian;
    out.extend_from_slice(&if le {
        header.game_id.to_le_bytes()
    } else {
        header.game_id.to_be_bytes()
    });
    out.extend_from_slice(&if le {
        header.compile_time.to_le_bytes()
    } else {
        header.compile_time.to_be_bytes()
    });
    let strings = [
        ("script path", &header.script_path),
        ("user name", &header.user_name),
        ("computer name", &header.computer_name),
    ];
    for (field, s) in strings {
        let len = u16::try_from(s.value.len())
            .map_err(|_| HeaderError::StringTooLong { field, len: s.value.len() })?;
        out.extend_from_slice(&if le { len.to_le_bytes() } else { len.to_be_bytes() });
        out.extend_from_slice(s.value.as_bytes());
    }
    Ok(out)
}

struct Cursor<'a, R> {
    reader: &'a mut R,
    offset: u64,
}

impl<R: Read> Cursor<'_, R> {
    fn array<const N: usize>(&mut self, field: &'static str) -> Result<[u8; N], HeaderError> {
        let mut buf = [0u8; N];
        self.fill(&mut buf, field)?;
        Ok(buf)
    }

    fn fill(&mut self, buf: &mut [u8], field: &'static str) -> Result<(), HeaderError> {
        self.reader.read_exact(buf).map_err(|e| match e.kind() {
            io::ErrorKind::UnexpectedEof => HeaderError::Truncated(field),
            _ => HeaderError::Io(e),
        })?;
        self.offset += buf.len() as u64;
        Ok(())
    }

    fn string(
        &mut self,
        format: HeaderFormat,
        field: &'static str,
    ) -> Result<HeaderString, HeaderError> {
        let len = format.u16(self.array(field)?) as usize;
        let offset = self.offset;
        let mut bytes = vec![0u8; len];
        self.fill(&mut bytes, field)?;
        // Non-ASCII bytes are not valid in these fields; keep the length stable.
        let value = bytes.iter().map(|&b| if b.is_ascii() { b as char } else { '?' }).collect();
        Ok(HeaderString { value, offset })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    fn sample(format: HeaderFormat) -> ArtifactHeader {
        ArtifactHeader {
            format,
            major_version: 1,
            minor_version: 2,
            game_id: 1,
            compile_time: 1_700_000_123,
            script_path: HeaderString { value: "C:\\Mod\\Quest.psc".to_string(), offset: 0 },
            user_name: HeaderString { value: "modder".to_string(), offset: 0 },
            computer_name: HeaderString { value: "WORKSTATION".to_string(), offset: 0 },
        }
    }

    #[test]
    fn test_parse_little_endian_header() {
        let bytes = encode_header(&sample(HeaderFormat::LittleEndian)).unwrap();
        let header = parse_header(&mut bytes.as_slice()).unwrap();

        assert_eq!(header.format, HeaderFormat::LittleEndian);
        assert_eq!(header.major_version, 1);
        assert_eq!(header.minor_version, 2);
        assert_eq!(header.compile_time, 1_700_000_123);
        assert_eq!(header.script_path.value, "C:\\Mod\\Quest.psc");
        assert_eq!(header.user_name.value, "modder");
        assert_eq!(header.computer_name.value, "WORKSTATION");
    }

    #[test]
    fn test_parse_big_endian_header() {
        let bytes = encode_header(&sample(HeaderFormat::BigEndian)).unwrap();
        assert_eq!(&bytes[..4], &[0xFA, 0x57, 0xC0, 0xDE]);

        let header = parse_header(&mut bytes.as_slice()).unwrap();
        assert_eq!(header.format, HeaderFormat::BigEndian);
        assert_eq!(header.compile_time, 1_700_000_123);
        assert_eq!(header.game_id, 1);
    }

    #[test]
    fn test_little_endian_magic_bytes() {
        let bytes = encode_header(&sample(HeaderFormat::LittleEndian)).unwrap();
        assert_eq!(&bytes[..4], &[0xDE, 0xC0, 0x57, 0xFA]);
    }

    #[test]
    fn test_string_offsets() {
        let bytes = encode_header(&sample(HeaderFormat::LittleEndian)).unwrap();
        let header = parse_header(&mut bytes.as_slice()).unwrap();

        // 4 + 1 + 1 + 2 + 8 + 2
        assert_eq!(header.script_path.offset, 18);
        let user_start = header.user_name.offset as usize;
        assert_eq!(&bytes[user_start..user_start + 6], b"modder");
    }

    #[test]
    fn test_unknown_magic() {
        let bytes = [0u8, 1, 2, 3, 4, 5, 6, 7];
        let err = parse_header(&mut bytes.as_slice()).unwrap_err();
        assert!(matches!(err, HeaderError::UnknownMagic(0x0302_0100)));
        assert!(err.is_unknown_format());
    }

    #[test]
    fn test_truncated_header() {
        let mut bytes = encode_header(&sample(HeaderFormat::LittleEndian)).unwrap();
        bytes.truncate(12);
        let err = parse_header(&mut bytes.as_slice()).unwrap_err();
        assert!(matches!(err, HeaderError::Truncated("compile time")));
        assert!(!err.is_unknown_format());
    }

    #[test]
    fn test_non_ascii_bytes_decode_as_question_mark() {
        let mut header = sample(HeaderFormat::LittleEndian);
        header.user_name.value = "ab".to_string();
        let mut bytes = encode_header(&header).unwrap();
        let offset = parse_header(&mut bytes.as_slice()).unwrap().user_name.offset as usize;
        bytes[offset] = 0xE9;

        let parsed = parse_header(&mut bytes.as_slice()).unwrap();
        assert_eq!(parsed.user_name.value, "?b");
    }

    #[test]
    fn test_encode_rejects_oversized_string() {
        let mut header = sample(HeaderFormat::LittleEndian);
        header.computer_name.value = "x".repeat(usize::from(u16::MAX) + 1);
        let err = encode_header(&header).unwrap_err();
        assert!(matches!(err, HeaderError::StringTooLong { field: "computer name", len: 65_536 }));

        header.computer_name.value = "x".repeat(usize::from(u16::MAX));
        let bytes = encode_header(&header).unwrap();
        let parsed = parse_header(&mut bytes.as_slice()).unwrap();
        assert_eq!(parsed.computer_name.value.len(), 65_535);
    }

    #[test]
    fn test_read_header_from_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("Quest.pex");
        let mut file = File::create(&path).unwrap();
        file.write_all(&encode_header(&sample(HeaderFormat::LittleEndian)).unwrap()).unwrap();
        file.write_all(&[0u8; 64]).unwrap();

        let header = read_header(&path).unwrap();
        assert_eq!(header.compile_time, 1_700_000_123);
    }

    #[test]
    fn test_read_header_missing_file() {
        let temp = TempDir::new().unwrap();
        let err = read_header(&temp.path().join("missing.pex")).unwrap_err();
        assert!(matches!(err, HeaderError::Io(_)));
    }
}
