use std::collections::BTreeSet;

use ring::digest::{SHA256, digest};

use super::errors::{CrlError, CrlResult};

/// Number of shards a CRL set is split into by default.
///
/// Each shard must fit into a single store entity after compression. Changing
/// this value changes [`shard_index`] for most serials, so every shard of a
/// CA has to be rewritten with the new count before readers switch to it.
pub const CRL_SHARD_COUNT: usize = 16;

/// Maps a serialized serial number to its shard.
///
/// Writers and readers must agree on this function, it is part of the
/// persisted layout.
pub fn shard_index(serialized: &[u8], shard_count: usize) -> usize {
    let hash = digest(&SHA256, serialized);
    let prefix: [u8; 4] = [
        hash.as_ref()[0],
        hash.as_ref()[1],
        hash.as_ref()[2],
        hash.as_ref()[3],
    ];
    u32::from_be_bytes(prefix) as usize % shard_count.max(1)
}

/// One shard of a revocation set: serialized serial numbers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Shard {
    members: BTreeSet<Vec<u8>>,
}

impl Shard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, serialized: Vec<u8>) -> bool {
        self.members.insert(serialized)
    }

    pub fn contains(&self, serialized: &[u8]) -> bool {
        self.members.contains(serialized)
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &[u8]> {
        self.members.iter().map(Vec::as_slice)
    }

    /// Deterministic binary form: member count, then length-prefixed members
    /// in sorted order. Equal shards always produce equal bytes.
    pub fn serialize(&self) -> Vec<u8> {
        let size = 4 + self.members.iter().map(|m| 4 + m.len()).sum::<usize>();
        let mut out = Vec::with_capacity(size);
        out.extend_from_slice(&(self.members.len() as u32).to_be_bytes());
        for member in &self.members {
            out.extend_from_slice(&(member.len() as u32).to_be_bytes());
            out.extend_from_slice(member);
        }
        out
    }

    pub fn parse(blob: &[u8]) -> CrlResult<Self> {
        let mut reader = blob;
        let count = read_u32(&mut reader)?;
        let mut shard = Shard::new();
        for _ in 0..count {
            let len = read_u32(&mut reader)? as usize;
            if reader.len() < len {
                return Err(truncated());
            }
            let (member, rest) = reader.split_at(len);
            shard.insert(member.to_vec());
            reader = rest;
        }
        if !reader.is_empty() {
            return Err(CrlError::CorruptState(format!(
                "{} trailing bytes after shard data",
                reader.len()
            )));
        }
        Ok(shard)
    }
}

fn read_u32(reader: &mut &[u8]) -> CrlResult<u32> {
    let bytes = *reader;
    let Some((head, rest)) = bytes.split_first_chunk::<4>() else {
        return Err(truncated());
    };
    *reader = rest;
    Ok(u32::from_be_bytes(*head))
}

fn truncated() -> CrlError {
    CrlError::CorruptState("truncated shard data".to_string())
}

/// A revocation set split into a fixed number of shards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShardSet {
    shards: Vec<Shard>,
}

impl ShardSet {
    /// Creates `shard_count` empty shards.
    pub fn new(shard_count: usize) -> Self {
        Self {
            shards: vec![Shard::new(); shard_count],
        }
    }

    /// Splits already serialized serials into `shard_count` shards.
    pub fn partition<I>(serials: I, shard_count: usize) -> Self
    where
        I: IntoIterator<Item = Vec<u8>>,
    {
        let mut set = Self::new(shard_count);
        for sn in serials {
            set.insert(sn);
        }
        set
    }

    pub fn insert(&mut self, serialized: Vec<u8>) {
        let idx = shard_index(&serialized, self.shards.len());
        self.shards[idx].insert(serialized);
    }

    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    /// Total number of members across all shards.
    pub fn len(&self) -> usize {
        self.shards.iter().map(Shard::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.shards.iter().all(Shard::is_empty)
    }

    pub fn shards(&self) -> &[Shard] {
        &self.shards
    }

    pub fn into_shards(self) -> Vec<Shard> {
        self.shards
    }
}
