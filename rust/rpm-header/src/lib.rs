//! Streaming reader for the RPM package file layout.
//!
//! An RPM file is a fixed-size lead, a signature header padded to
//! an 8 byte boundary, the main header, and finally the (compressed)
//! payload.  This crate reads everything up to the payload from any
//! [`Read`] implementation without seeking, so it can be used directly
//! on a network stream; the payload is left for the caller.
//!
//! The [`HeaderBuilder`] and [`lead_bytes`] serializers go the other way;
//! they exist to build package fixtures for tests and are not needed to
//! read packages.
//!
//! For the format, see
//! <https://rpm-software-management.github.io/rpm/manual/format_v4.html>
// SPDX-License-Identifier: Apache-2.0 OR MIT

use binread::{BinRead, BinReaderExt};
use std::io::{Cursor, Read};

mod builder;
pub mod tags;

pub use builder::{lead_bytes, HeaderBuilder};

/// Size of the legacy lead in bytes.
pub const LEAD_SIZE: usize = 96;
/// The only signature type in use since RPM 3.0: a header-structured signature.
pub const SIGTYPE_HEADERSIG: u16 = 5;
/// Size of the header intro (magic, reserved, index count, data size).
pub const HEADER_INTRO_SIZE: usize = 16;
/// Size of one index entry.
pub const INDEX_ENTRY_SIZE: usize = 16;
/// Upper bound on index entries, matching librpm's `hdrchkTags`.
pub const HEADER_TAGS_MAX: u32 = 0xffff;
/// Upper bound on the data store, matching librpm's `hdrchkData`.
pub const HEADER_DATA_MAX: u32 = 0x0fff_ffff;

/// Errors from reading RPM structures.
#[derive(Debug, thiserror::Error)]
pub enum HeaderError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("not an RPM package: bad lead magic")]
    BadLeadMagic,
    #[error("unsupported signature type {0}")]
    UnsupportedSignatureType(u16),
    #[error("bad header magic")]
    BadHeaderMagic,
    #[error("header has {0} index entries (max 65535)")]
    TooManyEntries(u32),
    #[error("header data store is {0} bytes (max 268435455)")]
    DataTooLarge(u32),
    #[error("tag {tag}: unknown entry type {kind}")]
    UnknownType { tag: u32, kind: u32 },
    #[error("tag {tag}: entry is out of bounds of the data store")]
    OutOfBounds { tag: u32 },
    #[error("tag {tag}: expected {expected:?}, found {found:?}")]
    WrongType {
        tag: u32,
        expected: EntryType,
        found: EntryType,
    },
    #[error("tag {tag}: string is not valid UTF-8")]
    InvalidUtf8 { tag: u32 },
    #[error("missing required tag {0}")]
    MissingTag(u32),
    #[error("malformed structure: {0}")]
    Parse(String),
}

pub type Result<T> = std::result::Result<T, HeaderError>;

impl HeaderError {
    fn from_binread(e: binread::Error, bad_magic: HeaderError) -> Self {
        match e {
            binread::Error::BadMagic { .. } => bad_magic,
            binread::Error::Io(e) => HeaderError::Io(e),
            e => HeaderError::Parse(e.to_string()),
        }
    }
}

/// The legacy lead.  Almost entirely ignored by modern tools, but we
/// validate the magic and the signature type.
#[derive(BinRead, Debug, Clone)]
#[br(big, magic = b"\xed\xab\xee\xdb")]
pub struct Lead {
    pub major: u8,
    pub minor: u8,
    pub package_type: u16,
    pub archnum: u16,
    #[br(count = 66)]
    pub name: Vec<u8>,
    pub osnum: u16,
    pub signature_type: u16,
    #[br(count = 16)]
    pub reserved: Vec<u8>,
}

impl Lead {
    /// Read and validate the lead from the start of a package stream.
    pub fn read_from<R: Read>(r: &mut R) -> Result<Self> {
        let mut buf = [0u8; LEAD_SIZE];
        r.read_exact(&mut buf)?;
        let lead: Lead = Cursor::new(&buf[..])
            .read_be()
            .map_err(|e| HeaderError::from_binread(e, HeaderError::BadLeadMagic))?;
        if lead.signature_type != SIGTYPE_HEADERSIG {
            return Err(HeaderError::UnsupportedSignatureType(lead.signature_type));
        }
        Ok(lead)
    }

    /// The package name recorded in the lead, which is informational only.
    pub fn name(&self) -> String {
        let end = self
            .name
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(self.name.len());
        String::from_utf8_lossy(&self.name[..end]).into_owned()
    }
}

#[derive(BinRead, Debug)]
#[br(big, magic = b"\x8e\xad\xe8\x01")]
struct HeaderIntro {
    _reserved: u32,
    index_count: u32,
    data_size: u32,
}

#[derive(BinRead, Debug)]
#[br(big)]
struct RawIndexEntry {
    tag: u32,
    kind: u32,
    offset: u32,
    count: u32,
}

/// Data types of header entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryType {
    Null,
    Char,
    Int8,
    Int16,
    Int32,
    Int64,
    String,
    Bin,
    StringArray,
    I18nString,
}

impl EntryType {
    fn from_raw(tag: u32, kind: u32) -> Result<Self> {
        let t = match kind {
            0 => EntryType::Null,
            1 => EntryType::Char,
            2 => EntryType::Int8,
            3 => EntryType::Int16,
            4 => EntryType::Int32,
            5 => EntryType::Int64,
            6 => EntryType::String,
            7 => EntryType::Bin,
            8 => EntryType::StringArray,
            9 => EntryType::I18nString,
            kind => return Err(HeaderError::UnknownType { tag, kind }),
        };
        Ok(t)
    }

    pub(crate) fn to_raw(self) -> u32 {
        match self {
            EntryType::Null => 0,
            EntryType::Char => 1,
            EntryType::Int8 => 2,
            EntryType::Int16 => 3,
            EntryType::Int32 => 4,
            EntryType::Int64 => 5,
            EntryType::String => 6,
            EntryType::Bin => 7,
            EntryType::StringArray => 8,
            EntryType::I18nString => 9,
        }
    }
}

/// One index entry of a header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub tag: u32,
    pub kind: EntryType,
    pub offset: u32,
    pub count: u32,
}

/// A parsed header, retaining its exact on-disk bytes since those
/// are what header digests and header-only signatures cover.
#[derive(Debug, Clone)]
pub struct Header {
    raw: Vec<u8>,
    entries: Vec<Entry>,
}

/// Number of padding bytes following a signature header whose data
/// store has the given size.
pub fn signature_padding(data_size: usize) -> usize {
    (8 - data_size % 8) % 8
}

impl Header {
    /// Read the signature header, including its trailing alignment padding.
    pub fn read_signature<R: Read>(r: &mut R) -> Result<Self> {
        let h = Self::read_from(r)?;
        let pad = signature_padding(h.data().len());
        if pad > 0 {
            let mut buf = [0u8; 8];
            r.read_exact(&mut buf[..pad])?;
        }
        Ok(h)
    }

    /// Read a header (intro, index and data store) from the stream.
    pub fn read_from<R: Read>(r: &mut R) -> Result<Self> {
        let mut intro = [0u8; HEADER_INTRO_SIZE];
        r.read_exact(&mut intro)?;
        let parsed: HeaderIntro = Cursor::new(&intro[..])
            .read_be()
            .map_err(|e| HeaderError::from_binread(e, HeaderError::BadHeaderMagic))?;
        if parsed.index_count > HEADER_TAGS_MAX {
            return Err(HeaderError::TooManyEntries(parsed.index_count));
        }
        if parsed.data_size > HEADER_DATA_MAX {
            return Err(HeaderError::DataTooLarge(parsed.data_size));
        }
        let index_len = parsed.index_count as usize * INDEX_ENTRY_SIZE;
        let total = HEADER_INTRO_SIZE + index_len + parsed.data_size as usize;
        let mut raw = Vec::with_capacity(total);
        raw.extend_from_slice(&intro);
        raw.resize(total, 0);
        r.read_exact(&mut raw[HEADER_INTRO_SIZE..])?;
        Self::from_bytes(raw)
    }

    /// Parse a complete in-memory header.
    pub fn from_bytes(raw: Vec<u8>) -> Result<Self> {
        let mut cursor = Cursor::new(&raw[..]);
        let intro: HeaderIntro = cursor
            .read_be()
            .map_err(|e| HeaderError::from_binread(e, HeaderError::BadHeaderMagic))?;
        let index_len = intro.index_count as usize * INDEX_ENTRY_SIZE;
        let expected = HEADER_INTRO_SIZE + index_len + intro.data_size as usize;
        if raw.len() != expected {
            return Err(HeaderError::Parse(format!(
                "header is {} bytes, expected {}",
                raw.len(),
                expected
            )));
        }
        let data_size = intro.data_size as u64;
        let mut entries = Vec::with_capacity(intro.index_count as usize);
        for _ in 0..intro.index_count {
            let e: RawIndexEntry = cursor
                .read_be()
                .map_err(|e| HeaderError::from_binread(e, HeaderError::BadHeaderMagic))?;
            let kind = EntryType::from_raw(e.tag, e.kind)?;
            if e.offset as u64 >= data_size && !(e.offset as u64 == data_size && e.count == 0) {
                return Err(HeaderError::OutOfBounds { tag: e.tag });
            }
            entries.push(Entry {
                tag: e.tag,
                kind,
                offset: e.offset,
                count: e.count,
            });
        }
        Ok(Header { raw, entries })
    }

    /// The exact bytes of this header as read from the stream (without padding).
    pub fn raw(&self) -> &[u8] {
        &self.raw
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    fn data(&self) -> &[u8] {
        &self.raw[HEADER_INTRO_SIZE + self.entries.len() * INDEX_ENTRY_SIZE..]
    }

    pub fn get(&self, tag: u32) -> Option<&Entry> {
        self.entries.iter().find(|e| e.tag == tag)
    }

    pub fn contains(&self, tag: u32) -> bool {
        self.get(tag).is_some()
    }

    fn typed(&self, tag: u32, expected: &[EntryType]) -> Result<Option<(&Entry, &[u8])>> {
        let e = match self.get(tag) {
            Some(e) => e,
            None => return Ok(None),
        };
        if !expected.contains(&e.kind) {
            return Err(HeaderError::WrongType {
                tag,
                expected: expected[0],
                found: e.kind,
            });
        }
        let data = self.data();
        let start = e.offset as usize;
        if start > data.len() {
            return Err(HeaderError::OutOfBounds { tag });
        }
        Ok(Some((e, &data[start..])))
    }

    fn fixed(&self, tag: u32, kind: EntryType, width: usize) -> Result<Option<&[u8]>> {
        match self.typed(tag, &[kind])? {
            Some((e, data)) => {
                let len = (e.count as usize)
                    .checked_mul(width)
                    .ok_or(HeaderError::OutOfBounds { tag })?;
                data.get(..len)
                    .map(Some)
                    .ok_or(HeaderError::OutOfBounds { tag })
            }
            None => Ok(None),
        }
    }

    /// Binary blob value.
    pub fn bin(&self, tag: u32) -> Result<Option<&[u8]>> {
        self.fixed(tag, EntryType::Bin, 1)
    }

    pub fn int32(&self, tag: u32) -> Result<Option<Vec<u32>>> {
        Ok(self.fixed(tag, EntryType::Int32, 4)?.map(|b| {
            b.chunks_exact(4)
                .map(|c| u32::from_be_bytes([c[0], c[1], c[2], c[3]]))
                .collect()
        }))
    }

    pub fn int64(&self, tag: u32) -> Result<Option<Vec<u64>>> {
        Ok(self.fixed(tag, EntryType::Int64, 8)?.map(|b| {
            b.chunks_exact(8)
                .map(|c| {
                    let mut v = [0u8; 8];
                    v.copy_from_slice(c);
                    u64::from_be_bytes(v)
                })
                .collect()
        }))
    }

    /// First value of an integer tag, accepting either 32 or 64 bit storage.
    pub fn first_int(&self, tag: u32) -> Result<Option<u64>> {
        match self.get(tag).map(|e| e.kind) {
            Some(EntryType::Int64) => Ok(self.int64(tag)?.and_then(|v| v.first().copied())),
            Some(_) => Ok(self
                .int32(tag)?
                .and_then(|v| v.first().map(|&v| v as u64))),
            None => Ok(None),
        }
    }

    /// Single string value.
    pub fn string(&self, tag: u32) -> Result<Option<&str>> {
        let (_, data) = match self.typed(tag, &[EntryType::String])? {
            Some(v) => v,
            None => return Ok(None),
        };
        let mut strings = split_strings(tag, data, 1)?;
        Ok(strings.pop())
    }

    /// String array (or i18n string table) value.
    pub fn string_array(&self, tag: u32) -> Result<Option<Vec<&str>>> {
        match self.typed(tag, &[EntryType::StringArray, EntryType::I18nString])? {
            Some((e, data)) => Ok(Some(split_strings(tag, data, e.count as usize)?)),
            None => Ok(None),
        }
    }

    /// A string value that may be stored either as a string or a string array,
    /// returning the first element in the latter case.
    pub fn first_string(&self, tag: u32) -> Result<Option<&str>> {
        match self.get(tag).map(|e| e.kind) {
            Some(EntryType::String) => self.string(tag),
            Some(_) => Ok(self
                .string_array(tag)?
                .and_then(|v| v.into_iter().next())),
            None => Ok(None),
        }
    }

    /// Format `name-[epoch:]version-release.arch` from a main header.
    pub fn nevra(&self) -> Result<String> {
        let require = |tag| -> Result<&str> {
            self.first_string(tag)?
                .ok_or(HeaderError::MissingTag(tag))
        };
        let name = require(tags::NAME)?;
        let version = require(tags::VERSION)?;
        let release = require(tags::RELEASE)?;
        // Source packages have no arch tag.
        let arch = self.first_string(tags::ARCH)?.unwrap_or("src");
        let epoch = match self.first_int(tags::EPOCH)? {
            Some(e) => format!("{}:", e),
            None => String::new(),
        };
        Ok(format!("{name}-{epoch}{version}-{release}.{arch}"))
    }
}

fn split_strings(tag: u32, data: &[u8], count: usize) -> Result<Vec<&str>> {
    // Every string takes at least its NUL terminator.
    if count > data.len() {
        return Err(HeaderError::OutOfBounds { tag });
    }
    let mut ret = Vec::with_capacity(count);
    let mut rest = data;
    for _ in 0..count {
        let end = rest
            .iter()
            .position(|&b| b == 0)
            .ok_or(HeaderError::OutOfBounds { tag })?;
        let s = std::str::from_utf8(&rest[..end]).map_err(|_| HeaderError::InvalidUtf8 { tag })?;
        ret.push(s);
        rest = &rest[end + 1..];
    }
    Ok(ret)
}
