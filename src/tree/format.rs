//! Serialized tree formats for diagnostics and GPU consumers.
//!
//! Both formats are a flat `u32` array, little-endian on disk:
//!
//! ```text
//! binary: [nodeCount] then per node: bounds[3] left right meta      (6 words)
//! wide:   [nodeCount] then per node: bounds[3] child[K] meta        (4 + K words)
//! ```
//!
//! `meta` bit 31 marks a leaf; the low bits hold the primitive index.
//! Absent children are all-ones.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use super::binary::{BinaryNode, BinaryTree};
use super::wide::{WideNode, WideTree};
use super::INVALID;
use crate::config::MAX_ARITY;
use crate::util::{Error, PackedBounds, Result};

/// Words per serialized binary node.
pub const BINARY_NODE_WORDS: usize = 6;

/// Words per serialized wide node of arity `k`.
#[inline]
pub const fn wide_node_words(k: usize) -> usize {
    3 + k + 1
}

fn checked_count(words: &[u32], stride: usize) -> Result<usize> {
    let count = *words
        .first()
        .ok_or_else(|| Error::format("missing node count word"))? as usize;
    let expected = count
        .checked_mul(stride)
        .and_then(|w| w.checked_add(1))
        .ok_or_else(|| Error::format(format!("node count {count} overflows")))?;
    if words.len() != expected {
        return Err(Error::format(format!(
            "{count} nodes need {expected} words, got {}",
            words.len()
        )));
    }
    Ok(count)
}

fn check_child(child: u32, count: usize, node: usize) -> Result<()> {
    if child as usize >= count {
        return Err(Error::format(format!(
            "node {node} references child {child} beyond node count {count}"
        )));
    }
    Ok(())
}

impl BinaryTree {
    /// Serialize as `[nodeCount]` + 6 words per node.
    pub fn to_words(&self) -> Vec<u32> {
        let mut words = Vec::with_capacity(1 + self.nodes.len() * BINARY_NODE_WORDS);
        words.push(self.nodes.len() as u32);
        for node in &self.nodes {
            words.extend_from_slice(&node.bounds.words);
            words.extend_from_slice(&[node.left, node.right, node.meta]);
        }
        words
    }

    /// Parse the binary format. Parent links are rebuilt from child links.
    pub fn from_words(words: &[u32]) -> Result<Self> {
        let count = checked_count(words, BINARY_NODE_WORDS)?;
        let mut nodes: Vec<BinaryNode> = words[1..]
            .chunks_exact(BINARY_NODE_WORDS)
            .map(|w| BinaryNode {
                bounds: PackedBounds::from_words([w[0], w[1], w[2]]),
                left: w[3],
                right: w[4],
                meta: w[5],
                parent: INVALID,
            })
            .collect();

        for i in 0..count {
            let node = nodes[i];
            if node.is_leaf() {
                continue;
            }
            for child in [node.left, node.right] {
                check_child(child, count, i)?;
                let slot = &mut nodes[child as usize].parent;
                if *slot != INVALID || child == 0 {
                    return Err(Error::format(format!("node {child} has more than one parent")));
                }
                *slot = i as u32;
            }
        }
        Ok(Self { nodes })
    }
}

impl WideTree {
    /// Serialize as `[nodeCount]` + `4 + K` words per node.
    pub fn to_words(&self) -> Vec<u32> {
        let k = self.arity;
        let mut words = Vec::with_capacity(1 + self.nodes.len() * wide_node_words(k));
        words.push(self.nodes.len() as u32);
        for node in &self.nodes {
            words.extend_from_slice(&node.bounds.words);
            words.extend_from_slice(&node.children[..k]);
            words.push(node.meta);
        }
        words
    }

    /// Parse the wide format for arity `arity`.
    pub fn from_words(words: &[u32], arity: usize) -> Result<Self> {
        if !(2..=MAX_ARITY).contains(&arity) {
            return Err(Error::format(format!("arity {arity} outside 2..={MAX_ARITY}")));
        }
        let stride = wide_node_words(arity);
        let count = checked_count(words, stride)?;
        let mut nodes = Vec::with_capacity(count);
        for (i, w) in words[1..].chunks_exact(stride).enumerate() {
            let mut node = WideNode::PLACEHOLDER;
            node.bounds = PackedBounds::from_words([w[0], w[1], w[2]]);
            node.children[..arity].copy_from_slice(&w[3..3 + arity]);
            node.meta = w[3 + arity];
            for child in node.children() {
                check_child(child, count, i)?;
                if child as usize <= i {
                    return Err(Error::format(format!(
                        "node {i} references earlier node {child}"
                    )));
                }
            }
            nodes.push(node);
        }
        Ok(Self { arity, nodes })
    }
}

/// Write words little-endian.
pub fn write_words<W: Write>(mut w: W, words: &[u32]) -> Result<()> {
    for &word in words {
        w.write_u32::<LittleEndian>(word)?;
    }
    w.flush()?;
    Ok(())
}

/// Read little-endian words until EOF. Byte length must be a multiple of 4.
pub fn read_words<R: Read>(mut r: R) -> Result<Vec<u32>> {
    let mut bytes = Vec::new();
    r.read_to_end(&mut bytes)?;
    if bytes.len() % 4 != 0 {
        return Err(Error::format(format!(
            "byte length {} is not a multiple of 4",
            bytes.len()
        )));
    }
    let mut cursor = bytes.as_slice();
    let mut words = Vec::with_capacity(bytes.len() / 4);
    while !cursor.is_empty() {
        words.push(cursor.read_u32::<LittleEndian>()?);
    }
    Ok(words)
}

/// Write words to a file.
pub fn save_words(path: impl AsRef<Path>, words: &[u32]) -> Result<()> {
    write_words(BufWriter::new(File::create(path)?), words)
}

/// Read words from a file.
pub fn load_words(path: impl AsRef<Path>) -> Result<Vec<u32>> {
    read_words(BufReader::new(File::open(path)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::LEAF_FLAG;
    use crate::util::{Aabb, Vec3};

    fn bounds(lo: f32, hi: f32) -> PackedBounds {
        PackedBounds::from_aabb(&Aabb::new(Vec3::splat(lo), Vec3::splat(hi)))
    }

    fn small_binary() -> BinaryTree {
        BinaryTree::from_nodes(vec![
            BinaryNode::internal(bounds(0.0, 2.0), 1, 2, INVALID),
            BinaryNode::leaf(bounds(0.0, 1.0), 1, 0),
            BinaryNode::leaf(bounds(1.0, 2.0), 0, 0),
        ])
    }

    #[test]
    fn test_binary_words() {
        let tree = small_binary();
        let words = tree.to_words();
        assert_eq!(words.len(), 1 + 3 * BINARY_NODE_WORDS);
        assert_eq!(words[0], 3);
        assert_eq!(&words[4..7], &[1, 2, 0]);
        assert_eq!(words[7 + 5], LEAF_FLAG | 1);
        assert_eq!(BinaryTree::from_words(&words).unwrap(), tree);
    }

    #[test]
    fn test_empty_tree_words() {
        assert_eq!(BinaryTree::default().to_words(), vec![0]);
        assert!(BinaryTree::from_words(&[0]).unwrap().is_empty());
        assert_eq!(WideTree::new(4).to_words(), vec![0]);
    }

    #[test]
    fn test_rejects_malformed() {
        assert!(BinaryTree::from_words(&[]).is_err());
        assert!(BinaryTree::from_words(&[2, 0, 0, 0]).is_err());
        let mut words = small_binary().to_words();
        words[4] = 9; // left child out of range
        assert!(BinaryTree::from_words(&words).is_err());
        assert!(WideTree::from_words(&[0], 1).is_err());
    }

    #[test]
    fn test_wide_words() {
        let mut root = WideNode::PLACEHOLDER;
        root.bounds = bounds(0.0, 2.0);
        root.children[0] = 1;
        root.children[1] = 2;
        let tree = WideTree::from_nodes(
            4,
            vec![root, WideNode::leaf(bounds(0.0, 1.0), 0), WideNode::leaf(bounds(1.0, 2.0), 1)],
        );
        let words = tree.to_words();
        assert_eq!(words.len(), 1 + 3 * wide_node_words(4));
        assert_eq!(&words[4..8], &[1, 2, INVALID, INVALID]);
        assert_eq!(WideTree::from_words(&words, 4).unwrap(), tree);
    }

    #[test]
    fn test_file_roundtrip() {
        let temp = tempfile::NamedTempFile::new().expect("Failed to create temp file");
        let words = small_binary().to_words();
        save_words(temp.path(), &words).unwrap();
        assert_eq!(load_words(temp.path()).unwrap(), words);
    }

    #[test]
    fn test_read_rejects_partial_word() {
        assert!(read_words(&[1u8, 2, 3][..]).is_err());
    }
}
