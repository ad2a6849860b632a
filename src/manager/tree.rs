/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The in-memory tree of candidate blocks, rooted at the last finalized block.
//!
//! Nodes are kept in an arena keyed by block id; parent and child links are stored as ids rather
//! than owning references, so subtree removal is a depth-first sweep over the id graph. A node
//! exclusively owns its block and the two [transitions](crate::transition::Transition) the
//! executor keeps for it; dropping the node releases them.

use std::collections::HashMap;
use std::sync::Arc;

use crate::transition::Transition;
use crate::types::basic::CryptoHash;
use crate::types::block::Block;

/// One candidate (or the finalized root) in the tree.
pub(crate) struct TreeNode {
    pub(crate) block: Arc<Block>,
    pub(crate) parent: Option<CryptoHash>,
    pub(crate) children: Vec<CryptoHash>,
    /// The transition that produced this block's result: the block's patch transactions applied on
    /// top of the parent's pre-execution.
    pub(crate) in_transition: Transition,
    /// The speculative execution of this block's normal transactions, which children build on.
    pub(crate) preexe: Transition,
}

impl TreeNode {
    pub(crate) fn new(block: Arc<Block>, in_transition: Transition, preexe: Transition) -> TreeNode {
        TreeNode {
            block,
            parent: None,
            children: Vec::new(),
            in_transition,
            preexe,
        }
    }
}

pub(crate) struct BlockTree {
    nodes: HashMap<CryptoHash, TreeNode>,
    finalized: Option<CryptoHash>,
}

impl BlockTree {
    pub(crate) fn new() -> BlockTree {
        BlockTree {
            nodes: HashMap::new(),
            finalized: None,
        }
    }

    pub(crate) fn contains(&self, id: &CryptoHash) -> bool {
        self.nodes.contains_key(id)
    }

    pub(crate) fn get(&self, id: &CryptoHash) -> Option<&TreeNode> {
        self.nodes.get(id)
    }

    pub(crate) fn finalized_id(&self) -> Option<CryptoHash> {
        self.finalized
    }

    pub(crate) fn finalized(&self) -> Option<&TreeNode> {
        self.finalized.and_then(|id| self.nodes.get(&id))
    }

    pub(crate) fn set_finalized(&mut self, id: CryptoHash) {
        self.finalized = Some(id);
    }

    /// Insert a parentless node (the genesis block during bootstrap, or the recovered tip on
    /// reload).
    pub(crate) fn insert_root(&mut self, node: TreeNode) {
        let id = node.block.id();
        self.nodes.insert(id, node);
    }

    /// Attach `node` as a child of `parent`. Returns `false` without attaching if the parent is not
    /// in the tree.
    pub(crate) fn attach(&mut self, parent: &CryptoHash, mut node: TreeNode) -> bool {
        let id = node.block.id();
        match self.nodes.get_mut(parent) {
            Some(parent_node) => {
                parent_node.children.push(id);
                node.parent = Some(*parent);
                self.nodes.insert(id, node);
                true
            }
            None => false,
        }
    }

    /// Remove the subtree rooted at `id`, depth-first, appending removed ids to `pruned`. Dropping
    /// each node disposes its transitions.
    pub(crate) fn remove_branch(&mut self, id: &CryptoHash, pruned: &mut Vec<CryptoHash>) {
        if let Some(node) = self.nodes.remove(id) {
            for child in &node.children {
                self.remove_branch(child, pruned);
            }
            pruned.push(*id);
        }
    }

    /// Remove the node `id` and every subtree under it except the one rooted at `except`, which is
    /// detached to become parentless. Removed ids are appended to `pruned`; `except` is not.
    pub(crate) fn remove_except(
        &mut self,
        id: &CryptoHash,
        except: &CryptoHash,
        pruned: &mut Vec<CryptoHash>,
    ) {
        if let Some(node) = self.nodes.remove(id) {
            for child in &node.children {
                if child == except {
                    if let Some(kept) = self.nodes.get_mut(child) {
                        kept.parent = None;
                    }
                } else {
                    self.remove_branch(child, pruned);
                }
            }
            pruned.push(*id);
        }
    }

    /// Drop every node, releasing all executor resources.
    pub(crate) fn clear(&mut self) {
        self.nodes.clear();
        self.finalized = None;
    }
}
