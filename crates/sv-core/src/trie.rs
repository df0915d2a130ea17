//! Compact byte tries
//!
//! Two flavours share one arena representation:
//!
//! - [`HostnameTrie`] stores hostnames reversed and answers "does this
//!   hostname end with one of my entries, on a label boundary?".
//! - [`PrefixTrie`] stores literals forward and answers "does one of my
//!   entries start at this offset of the haystack?".
//!
//! Both serialize to a little-endian binary form for selfies.

use crate::selfie::format::{read_u16_le, read_u32_le};

/// Error type for trie decoding.
#[derive(Debug, thiserror::Error)]
pub enum TrieError {
    #[error("Trie data truncated at offset {0}")]
    Truncated(usize),
    #[error("Trie edge points to missing node {0}")]
    DanglingEdge(u32),
    #[error("Trie has no root node")]
    MissingRoot,
}

// =============================================================================
// Arena
// =============================================================================

/// Encoded node header: terminal flag and edge count.
const NODE_MIN_BYTES: usize = 3;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct TrieNode {
    /// Outgoing edges sorted by byte
    edges: Vec<(u8, u32)>,
    terminal: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct ByteTrie {
    nodes: Vec<TrieNode>,
    size: usize,
}

impl Default for ByteTrie {
    fn default() -> Self {
        Self {
            nodes: vec![TrieNode::default()],
            size: 0,
        }
    }
}

impl ByteTrie {
    #[inline]
    fn child(&self, node: u32, byte: u8) -> Option<u32> {
        let edges = &self.nodes[node as usize].edges;
        edges
            .binary_search_by_key(&byte, |&(b, _)| b)
            .ok()
            .map(|i| edges[i].1)
    }

    #[inline]
    fn is_terminal(&self, node: u32) -> bool {
        self.nodes[node as usize].terminal
    }

    /// Insert a byte sequence. Returns false if it was already present.
    fn insert(&mut self, bytes: impl Iterator<Item = u8>) -> bool {
        let mut node = 0u32;
        for byte in bytes {
            node = match self.child(node, byte) {
                Some(next) => next,
                None => {
                    let next = self.nodes.len() as u32;
                    self.nodes.push(TrieNode::default());
                    let edges = &mut self.nodes[node as usize].edges;
                    let pos = edges.partition_point(|&(b, _)| b < byte);
                    edges.insert(pos, (byte, next));
                    next
                }
            };
        }
        let terminal = &mut self.nodes[node as usize].terminal;
        if *terminal {
            return false;
        }
        *terminal = true;
        self.size += 1;
        true
    }

    fn optimize(&mut self) {
        for node in &mut self.nodes {
            node.edges.shrink_to_fit();
        }
        self.nodes.shrink_to_fit();
    }

    /// Layout: size u32, node count u32, then per node:
    /// terminal u8, edge count u16, edges as (byte u8, target u32).
    fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(8 + self.nodes.len() * 8);
        out.extend_from_slice(&(self.size as u32).to_le_bytes());
        out.extend_from_slice(&(self.nodes.len() as u32).to_le_bytes());
        for node in &self.nodes {
            out.push(node.terminal as u8);
            out.extend_from_slice(&(node.edges.len() as u16).to_le_bytes());
            for &(byte, target) in &node.edges {
                out.push(byte);
                out.extend_from_slice(&target.to_le_bytes());
            }
        }
        out
    }

    fn from_bytes(data: &[u8]) -> Result<Self, TrieError> {
        let need = |pos: usize, len: usize| -> Result<(), TrieError> {
            if pos + len > data.len() {
                Err(TrieError::Truncated(pos))
            } else {
                Ok(())
            }
        };

        need(0, 8)?;
        let size = read_u32_le(data, 0) as usize;
        let count = read_u32_le(data, 4);
        if count == 0 {
            return Err(TrieError::MissingRoot);
        }
        if count as usize > (data.len() - 8) / NODE_MIN_BYTES {
            return Err(TrieError::Truncated(data.len()));
        }

        let mut pos = 8;
        let mut nodes = Vec::with_capacity(count as usize);
        for _ in 0..count {
            need(pos, NODE_MIN_BYTES)?;
            let terminal = data[pos] != 0;
            let edge_count = read_u16_le(data, pos + 1) as usize;
            pos += NODE_MIN_BYTES;
            need(pos, edge_count * 5)?;
            let mut edges = Vec::with_capacity(edge_count);
            for _ in 0..edge_count {
                let target = read_u32_le(data, pos + 1);
                if target >= count {
                    return Err(TrieError::DanglingEdge(target));
                }
                edges.push((data[pos], target));
                pos += 5;
            }
            nodes.push(TrieNode { edges, terminal });
        }

        Ok(Self { nodes, size })
    }
}

// =============================================================================
// Hostname Trie
// =============================================================================

/// Set of hostnames matched by suffix on label boundaries.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HostnameTrie {
    trie: ByteTrie,
}

impl HostnameTrie {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a hostname. Returns false if it was already present.
    pub fn add(&mut self, hostname: &str) -> bool {
        if hostname.is_empty() {
            return false;
        }
        self.trie.insert(hostname.bytes().rev())
    }

    /// Number of hostnames in the set.
    pub fn len(&self) -> usize {
        self.trie.size
    }

    pub fn is_empty(&self) -> bool {
        self.trie.size == 0
    }

    /// Find an entry which `hostname` equals or is a subdomain of.
    ///
    /// Returns the byte offset in `hostname` where the matched entry
    /// starts. The shortest matching entry wins.
    pub fn matches(&self, hostname: &str) -> Option<usize> {
        let bytes = hostname.as_bytes();
        let mut node = 0u32;
        for i in (0..bytes.len()).rev() {
            node = self.trie.child(node, bytes[i])?;
            if self.trie.is_terminal(node) && (i == 0 || bytes[i - 1] == b'.') {
                return Some(i);
            }
        }
        None
    }

    pub fn optimize(&mut self) {
        self.trie.optimize();
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        self.trie.to_bytes()
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self, TrieError> {
        Ok(Self {
            trie: ByteTrie::from_bytes(data)?,
        })
    }
}

impl<'a> FromIterator<&'a str> for HostnameTrie {
    fn from_iter<I: IntoIterator<Item = &'a str>>(iter: I) -> Self {
        let mut trie = Self::new();
        for hostname in iter {
            trie.add(hostname);
        }
        trie
    }
}

// =============================================================================
// Prefix Trie
// =============================================================================

/// Set of literals matched as prefixes at a given haystack offset.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PrefixTrie {
    trie: ByteTrie,
}

impl PrefixTrie {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a literal. Returns false if it was already present.
    pub fn add(&mut self, literal: &str) -> bool {
        if literal.is_empty() {
            return false;
        }
        self.trie.insert(literal.bytes())
    }

    pub fn len(&self) -> usize {
        self.trie.size
    }

    pub fn is_empty(&self) -> bool {
        self.trie.size == 0
    }

    /// Find an entry which occurs in `haystack` at byte offset `start`.
    ///
    /// Returns the end offset of the matched entry. The shortest matching
    /// entry wins.
    pub fn matches(&self, haystack: &str, start: usize) -> Option<usize> {
        let bytes = haystack.as_bytes().get(start..)?;
        let mut node = 0u32;
        for (i, &byte) in bytes.iter().enumerate() {
            node = self.trie.child(node, byte)?;
            if self.trie.is_terminal(node) {
                return Some(start + i + 1);
            }
        }
        None
    }

    pub fn optimize(&mut self) {
        self.trie.optimize();
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        self.trie.to_bytes()
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self, TrieError> {
        Ok(Self {
            trie: ByteTrie::from_bytes(data)?,
        })
    }
}
