//! Read-only consistency audit of the whole tree

use crate::arena::PairStore;
use crate::core::{Error, Result};

use super::chain::ChainId;
use super::node::{NodeId, NodeShape};
use super::octant::{adjacent_across, step, DIRECTIONS};
use super::tree::Tree;

macro_rules! ensure {
    ($cond:expr, $($arg:tt)+) => {
        if !$cond {
            return Err(Error::Invariant(format!($($arg)+)));
        }
    };
}

impl<S: PairStore<ChainId>> Tree<S> {
    /// Walk every node and chain and check the structural invariants.
    /// Never modifies the tree.
    pub fn validate(&self) -> Result<()> {
        let Some(root) = self.root_node() else {
            ensure!(
                self.chains.len() == 0,
                "{} chains alive with nothing loaded",
                self.chains.len()
            );
            return Ok(());
        };
        for chain in self.node_chains(root) {
            ensure!(self.chain(*chain).parent.is_none(), "root chain {:?} has a parent", chain);
        }

        let mut reachable = 0;
        let mut pending = vec![root];
        while let Some(node) = pending.pop() {
            reachable += self.validate_node(node, node == root)?;
            if let Some(children) = self.node(node).children() {
                pending.extend(children.iter().filter(|child| !self.node(**child).is_empty()));
            }
        }
        ensure!(
            reachable == self.chains.len(),
            "{} chains alive but {} reachable from the root",
            self.chains.len(),
            reachable
        );
        Ok(())
    }

    /// Check one node and its chains. Returns the number of chains it holds.
    fn validate_node(&self, id: NodeId, is_root: bool) -> Result<usize> {
        let node = self.node(id);
        let size = node.size;
        ensure!(size > 0 && size.count_ones() == 1, "node {:?} has size {}", id, size);

        match node.shape() {
            NodeShape::Empty => Ok(0),
            NodeShape::Full(kind, chain) => {
                ensure!(self.is_active(chain), "full node {:?} holds dead chain {:?}", id, chain);
                let record = self.chain(chain);
                ensure!(record.node == id, "chain {:?} points at the wrong node", chain);
                ensure!(record.subchains.is_none(), "full chain {:?} has subchains", chain);
                ensure!(
                    record.supported == kind.is_supported(),
                    "full chain {:?} of kind {:?} has supported = {}",
                    chain,
                    kind,
                    record.supported
                );
                ensure!(
                    is_root == record.parent.is_none(),
                    "chain {:?} has a bad parent link",
                    chain
                );
                self.validate_edges(chain)?;
                Ok(1)
            }
            NodeShape::Internal(children) => {
                let chains = node.chains();
                for child in children {
                    ensure!(
                        self.node_size(child) * 2 == size,
                        "child {:?} of {:?} has size {}",
                        child,
                        id,
                        self.node_size(child)
                    );
                }
                for &chain in chains {
                    self.validate_composite(id, chain, &children, is_root)?;
                }
                for (octant, child) in children.iter().enumerate() {
                    for &sub in self.node_chains(*child) {
                        let parent = self.chain(sub).parent;
                        ensure!(
                            parent.is_some_and(|p| chains.contains(&p)),
                            "chain {:?} in octant {} is not owned by a chain of {:?}",
                            sub,
                            octant,
                            id
                        );
                    }
                }
                for (i, &a) in chains.iter().enumerate() {
                    for &b in &chains[i + 1..] {
                        ensure!(
                            !self.base_is_touching(a, b, 0),
                            "sibling chains {:?} and {:?} touch",
                            a,
                            b
                        );
                    }
                }
                for octant in 0..8u8 {
                    for direction in DIRECTIONS.into_iter().filter(|d| *d > 0) {
                        let other = step(octant, direction);
                        if other < octant {
                            continue;
                        }
                        for &a in self.node_chains(children[octant as usize]) {
                            for &b in self.node_chains(children[other as usize]) {
                                self.validate_touching(a, b, direction)?;
                            }
                        }
                    }
                }
                Ok(chains.len())
            }
        }
    }

    fn validate_composite(
        &self,
        node: NodeId,
        chain: ChainId,
        children: &[NodeId; 8],
        is_root: bool,
    ) -> Result<()> {
        ensure!(self.is_active(chain), "node {:?} holds dead chain {:?}", node, chain);
        let record = self.chain(chain);
        ensure!(record.node == node, "chain {:?} points at the wrong node", chain);
        ensure!(is_root == record.parent.is_none(), "chain {:?} has a bad parent link", chain);
        if let Some(parent) = record.parent {
            ensure!(self.is_active(parent), "chain {:?} has dead parent {:?}", chain, parent);
            ensure!(
                self.chain_size(parent) == self.node_size(node) * 2,
                "chain {:?} and its parent differ in size by more than one level",
                chain
            );
            let entries = self
                .subchain_list(parent)
                .into_iter()
                .filter(|(_, sub)| *sub == chain)
                .count();
            ensure!(entries == 1, "chain {:?} listed {} times in its parent", chain, entries);
        }

        let subchains = self.subchain_list(chain);
        ensure!(!subchains.is_empty(), "composite chain {:?} has no subchains", chain);
        let mut supported = false;
        for &(octant, sub) in &subchains {
            ensure!(self.is_active(sub), "chain {:?} holds dead subchain {:?}", chain, sub);
            ensure!(
                self.chain(sub).parent == Some(chain),
                "subchain {:?} does not point back at {:?}",
                sub,
                chain
            );
            ensure!(
                self.node_chains(children[octant as usize]).contains(&sub),
                "subchain {:?} is not registered in octant {}",
                sub,
                octant
            );
            supported |= self.chain(sub).supported;
        }
        ensure!(
            record.supported == supported,
            "chain {:?} has supported = {} but its subchains say {}",
            chain,
            record.supported,
            supported
        );
        self.validate_edges(chain)
    }

    /// Every cached edge is real, symmetric and unique
    fn validate_edges(&self, chain: ChainId) -> Result<()> {
        let edges = self.touching_list(chain);
        for (i, &(direction, far)) in edges.iter().enumerate() {
            ensure!(
                !edges[i + 1..].contains(&(direction, far)),
                "chain {:?} lists edge ({}, {:?}) twice",
                chain,
                direction,
                far
            );
            ensure!(self.is_active(far), "chain {:?} touches dead chain {:?}", chain, far);
            ensure!(far != chain, "chain {:?} touches itself", chain);
            ensure!(
                self.chain_size(far) == self.chain_size(chain),
                "chain {:?} touches {:?} of a different size",
                chain,
                far
            );
            ensure!(
                self.touching_list(far).contains(&(-direction, chain)),
                "edge {:?} -> {:?} in direction {} is one-sided",
                chain,
                far,
                direction
            );
            ensure!(
                self.base_is_touching(chain, far, direction),
                "chain {:?} caches an edge to {:?} that does not exist",
                chain,
                far
            );
        }
        Ok(())
    }

    /// Chains of face-adjacent nodes that touch must have the edge cached,
    /// at this level and every level below
    fn validate_touching(&self, a: ChainId, b: ChainId, direction: i8) -> Result<()> {
        let mut pending = vec![(a, b, direction)];
        while let Some((a, b, direction)) = pending.pop() {
            ensure!(
                !self.base_is_touching(a, b, direction) || self.is_touching(a, b, direction),
                "chains {:?} and {:?} touch in direction {} but no edge is cached",
                a,
                b,
                direction
            );
            for (a_octant, a_sub) in self.subchain_list(a) {
                for (b_octant, b_sub) in self.subchain_list(b) {
                    let across = adjacent_across(a_octant, b_octant, direction);
                    if across != 0 {
                        pending.push((a_sub, b_sub, across));
                    }
                }
            }
        }
        Ok(())
    }
}
