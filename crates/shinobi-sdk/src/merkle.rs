//! Lean incremental Merkle tree (C3): append-only, poseidon2-hashed, and
//! - unlike a classical fixed-depth tree - a lone node at any level
//! propagates to the next level unchanged instead of being hashed against
//! a zero leaf. Proofs must mirror that exact convention or the circuit
//! verifier rejects them even though the proof "looks" valid.

use crate::error::{Result, SdkError};
use crate::field::{poseidon2, F};

/// An inclusion proof: `siblings[l]` is the sibling at level `l` counting
/// up from the leaf. When a level's node had no real sibling (the
/// single-child propagation case), `siblings[l]` equals the node's own
/// value at that level - this "node itself" convention is what
/// [`MerkleTree::verify_proof`] relies on to decide whether to hash or
/// propagate at each level.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MerkleProof {
    pub root: F,
    pub depth: usize,
    pub siblings: Vec<F>,
    pub index: u64,
}

/// Append-only Lean-IMT. `nodes[0]` holds the leaves in insertion order;
/// `nodes[l]` for `l > 0` holds that level's internal nodes, with
/// `nodes[depth()][0]` (when non-empty) the current root.
#[derive(Clone, Debug, Default)]
pub struct MerkleTree {
    nodes: Vec<Vec<F>>,
}

impl MerkleTree {
    pub fn new() -> Self {
        Self { nodes: vec![Vec::new()] }
    }

    /// Builds a tree by inserting `leaves` in order.
    pub fn from_leaves(leaves: impl IntoIterator<Item = F>) -> Result<Self> {
        let mut tree = Self::new();
        for leaf in leaves {
            tree.insert(leaf)?;
        }
        Ok(tree)
    }

    pub fn size(&self) -> usize {
        self.nodes[0].len()
    }

    /// `ceil(log2(size))`, or `0` for an empty or single-leaf tree.
    pub fn depth(&self) -> usize {
        Self::depth_for_size(self.size())
    }

    fn depth_for_size(size: usize) -> usize {
        if size <= 1 {
            0
        } else {
            (usize::BITS - (size - 1).leading_zeros()) as usize
        }
    }

    /// Current root. Errors on an empty tree - callers should never reach
    /// this on a real withdrawal path.
    pub fn root(&self) -> Result<F> {
        let depth = self.depth();
        self.nodes
            .get(depth)
            .and_then(|level| level.first())
            .copied()
            .ok_or_else(|| SdkError::MerkleTree("root requested on empty tree".into()))
    }

    /// Appends `leaf`, updating only the O(depth) nodes on its path to the
    /// root. At each level, an odd node combines with its left sibling
    /// (`poseidon2(sibling, node)`); an even node with no right sibling yet
    /// propagates unchanged to the next level.
    pub fn insert(&mut self, leaf: F) -> Result<()> {
        self.nodes[0].push(leaf);
        let mut index = self.nodes[0].len() - 1;
        let mut node = leaf;
        let target_depth = self.depth();

        for level in 0..target_depth {
            if index % 2 == 1 {
                let sibling = self.nodes[level][index - 1];
                node = poseidon2(sibling, node)?;
            }
            index /= 2;
            let next_level = level + 1;
            if self.nodes.len() <= next_level {
                self.nodes.push(Vec::new());
            }
            if self.nodes[next_level].len() > index {
                self.nodes[next_level][index] = node;
            } else {
                self.nodes[next_level].push(node);
            }
        }
        Ok(())
    }

    /// Inclusion proof for the leaf at `leaf_index`. `siblings.len()`
    /// always equals `self.depth()` at the time of the call.
    pub fn proof(&self, leaf_index: u64) -> Result<MerkleProof> {
        let size = self.size();
        let leaf_index_usize = leaf_index as usize;
        if leaf_index_usize >= size {
            return Err(SdkError::MerkleTree(format!(
                "index {leaf_index} out of range for tree of size {size}"
            )));
        }

        let depth = self.depth();
        let mut index = leaf_index_usize;
        let mut siblings = Vec::with_capacity(depth);
        for level in 0..depth {
            let sibling_index = index ^ 1;
            let sibling = if sibling_index < self.nodes[level].len() {
                self.nodes[level][sibling_index]
            } else {
                self.nodes[level][index]
            };
            siblings.push(sibling);
            index /= 2;
        }

        Ok(MerkleProof {
            root: self.root()?,
            depth,
            siblings,
            index: leaf_index,
        })
    }

    /// Recomputes a root from `leaf` and `proof.siblings` and checks it
    /// against `proof.root`. A sibling equal to the node's running value
    /// at that level is the propagation marker (see [`MerkleProof`]).
    pub fn verify_proof(proof: &MerkleProof, leaf: F) -> Result<bool> {
        let mut node = leaf;
        let mut index = proof.index;
        for level in 0..proof.depth {
            let sibling = proof.siblings[level];
            if sibling == node {
                // single-child propagation: no real sibling at this level
            } else if index % 2 == 1 {
                node = poseidon2(sibling, node)?;
            } else {
                node = poseidon2(node, sibling)?;
            }
            index /= 2;
        }
        Ok(node == proof.root)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_tree_has_zero_depth_and_no_root() {
        let tree = MerkleTree::new();
        assert_eq!(tree.depth(), 0);
        assert!(tree.root().is_err());
    }

    #[test]
    fn single_leaf_tree_depth_zero_root_is_leaf() {
        let mut tree = MerkleTree::new();
        tree.insert(F::from(7u64)).unwrap();
        assert_eq!(tree.depth(), 0);
        assert_eq!(tree.root().unwrap(), F::from(7u64));
    }

    #[test]
    fn two_leaves_hash_directly() {
        let mut tree = MerkleTree::new();
        tree.insert(F::from(1u64)).unwrap();
        tree.insert(F::from(2u64)).unwrap();
        assert_eq!(tree.depth(), 1);
        let expected = poseidon2(F::from(1u64), F::from(2u64)).unwrap();
        assert_eq!(tree.root().unwrap(), expected);
    }

    #[test]
    fn three_leaves_lone_node_propagates() {
        // P8 setup: with 3 leaves the lone third leaf must propagate
        // unchanged rather than being hashed against a zero padding leaf.
        let mut tree = MerkleTree::new();
        tree.insert(F::from(1u64)).unwrap();
        tree.insert(F::from(2u64)).unwrap();
        tree.insert(F::from(3u64)).unwrap();
        assert_eq!(tree.depth(), 2);

        let h01 = poseidon2(F::from(1u64), F::from(2u64)).unwrap();
        let expected_root = poseidon2(h01, F::from(3u64)).unwrap();
        assert_eq!(tree.root().unwrap(), expected_root);
    }

    #[test]
    fn inclusion_proof_round_trips_for_every_leaf() {
        // P8: for any Lean-IMT built from a sequence of leaves, the proof
        // of any inserted leaf verifies against the tree's root.
        let leaves: Vec<F> = (1u64..=7).map(F::from).collect();
        let tree = MerkleTree::from_leaves(leaves.iter().copied()).unwrap();

        for (i, leaf) in leaves.iter().enumerate() {
            let proof = tree.proof(i as u64).unwrap();
            assert_eq!(proof.root, tree.root().unwrap());
            assert!(MerkleTree::verify_proof(&proof, *leaf).unwrap(), "leaf {i} failed to verify");
        }
    }

    #[test]
    fn proof_rejects_wrong_leaf() {
        let leaves: Vec<F> = (1u64..=5).map(F::from).collect();
        let tree = MerkleTree::from_leaves(leaves.iter().copied()).unwrap();
        let proof = tree.proof(2).unwrap();
        assert!(!MerkleTree::verify_proof(&proof, F::from(999u64)).unwrap());
    }

    #[test]
    fn out_of_range_index_errors() {
        let tree = MerkleTree::from_leaves([F::from(1u64), F::from(2u64)]).unwrap();
        assert!(tree.proof(5).is_err());
    }

    #[test]
    fn incremental_insert_matches_rebuilt_tree() {
        let leaves: Vec<F> = (1u64..=10).map(F::from).collect();

        let mut incremental = MerkleTree::new();
        for leaf in &leaves {
            incremental.insert(*leaf).unwrap();
        }

        let rebuilt = MerkleTree::from_leaves(leaves).unwrap();
        assert_eq!(incremental.root().unwrap(), rebuilt.root().unwrap());
        assert_eq!(incremental.depth(), rebuilt.depth());
    }
}
