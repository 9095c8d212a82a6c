//! Serialization of headers and leads, used to construct packages
//! in tests and tooling.
// SPDX-License-Identifier: Apache-2.0 OR MIT

use crate::{EntryType, HEADER_INTRO_SIZE, LEAD_SIZE, SIGTYPE_HEADERSIG};

const HEADER_MAGIC: [u8; 4] = [0x8e, 0xad, 0xe8, 0x01];
const LEAD_MAGIC: [u8; 4] = [0xed, 0xab, 0xee, 0xdb];

/// Assembles a header from typed values.  Entries are written in
/// insertion order, with the data store aligned as librpm expects.
#[derive(Debug, Default, Clone)]
pub struct HeaderBuilder {
    entries: Vec<(u32, EntryType, u32, Vec<u8>)>,
}

impl HeaderBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(mut self, tag: u32, kind: EntryType, count: u32, data: Vec<u8>) -> Self {
        self.entries.push((tag, kind, count, data));
        self
    }

    pub fn string(self, tag: u32, v: &str) -> Self {
        let mut data = v.as_bytes().to_vec();
        data.push(0);
        self.push(tag, EntryType::String, 1, data)
    }

    pub fn string_array(self, tag: u32, v: &[&str]) -> Self {
        let mut data = Vec::new();
        for s in v {
            data.extend_from_slice(s.as_bytes());
            data.push(0);
        }
        self.push(tag, EntryType::StringArray, v.len() as u32, data)
    }

    pub fn bin(self, tag: u32, v: &[u8]) -> Self {
        self.push(tag, EntryType::Bin, v.len() as u32, v.to_vec())
    }

    pub fn int32(self, tag: u32, v: &[u32]) -> Self {
        let data = v.iter().flat_map(|n| n.to_be_bytes()).collect();
        self.push(tag, EntryType::Int32, v.len() as u32, data)
    }

    pub fn int64(self, tag: u32, v: &[u64]) -> Self {
        let data = v.iter().flat_map(|n| n.to_be_bytes()).collect();
        self.push(tag, EntryType::Int64, v.len() as u32, data)
    }

    /// Serialize to the on-disk representation (without signature padding).
    pub fn build(self) -> Vec<u8> {
        let mut index = Vec::new();
        let mut store: Vec<u8> = Vec::new();
        for (tag, kind, count, data) in &self.entries {
            let align = match kind {
                EntryType::Int16 => 2,
                EntryType::Int32 => 4,
                EntryType::Int64 => 8,
                _ => 1,
            };
            while store.len() % align != 0 {
                store.push(0);
            }
            index.extend_from_slice(&tag.to_be_bytes());
            index.extend_from_slice(&kind.to_raw().to_be_bytes());
            index.extend_from_slice(&(store.len() as u32).to_be_bytes());
            index.extend_from_slice(&count.to_be_bytes());
            store.extend_from_slice(data);
        }
        let mut out = Vec::with_capacity(HEADER_INTRO_SIZE + index.len() + store.len());
        out.extend_from_slice(&HEADER_MAGIC);
        out.extend_from_slice(&[0u8; 4]);
        out.extend_from_slice(&(self.entries.len() as u32).to_be_bytes());
        out.extend_from_slice(&(store.len() as u32).to_be_bytes());
        out.extend_from_slice(&index);
        out.extend_from_slice(&store);
        out
    }
}

/// A binary package lead for RPM format 3.0 with a header-style signature.
pub fn lead_bytes(name: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(LEAD_SIZE);
    out.extend_from_slice(&LEAD_MAGIC);
    out.extend_from_slice(&[3, 0]);
    // Binary package, arch 1
    out.extend_from_slice(&0u16.to_be_bytes());
    out.extend_from_slice(&1u16.to_be_bytes());
    let mut n = [0u8; 66];
    let len = name.len().min(65);
    n[..len].copy_from_slice(&name.as_bytes()[..len]);
    out.extend_from_slice(&n);
    // Linux
    out.extend_from_slice(&1u16.to_be_bytes());
    out.extend_from_slice(&SIGTYPE_HEADERSIG.to_be_bytes());
    out.extend_from_slice(&[0u8; 16]);
    debug_assert_eq!(out.len(), LEAD_SIZE);
    out
}
