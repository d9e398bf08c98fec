//! Tree construction and validation
//!
//! Turns the flat head references of a [`Sentence`] into navigable
//! head/dependent links, checking that every head is in range, that the
//! head graph is acyclic and that at least one token is attached to the root.

use crate::tree::{NodeId, Sentence, TokenId, TokenRef};
use rustc_hash::{FxHashMap, FxHashSet};
use thiserror::Error;

/// Structural problems that prevent a sentence from forming a tree
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TreeError {
    #[error("Tree error: token {token} has head {head}, but the sentence has {len} tokens")]
    HeadOutOfRange { token: usize, head: usize, len: usize },

    #[error("Tree error: no token has head 0")]
    NoRoot,

    #[error("Tree error: token {0} is part of a head cycle")]
    CycleDetected(usize),
}

impl Sentence {
    /// (Re)compute positions, head/dependent links, roots and enhanced
    /// dependency references.
    ///
    /// On error every derived field is cleared and [`Sentence::is_built`]
    /// stays false; fix the input and call again.
    pub fn build_tree(&mut self) -> Result<(), TreeError> {
        self.clear_tree();
        if let Err(e) = self.try_build() {
            self.clear_tree();
            return Err(e);
        }

        log::trace!(
            "built tree: {} tokens, {} roots, max head distance {}",
            self.tokens.len(),
            self.roots.len(),
            self.max_head_distance
        );
        self.built = true;
        Ok(())
    }

    fn try_build(&mut self) -> Result<(), TreeError> {
        self.assign_positions();
        self.link_heads()?;
        self.resolve_enhanced_deps();

        if let Some(&token) = self.cycles().first() {
            return Err(TreeError::CycleDetected(token));
        }
        if self.roots.is_empty() {
            return Err(TreeError::NoRoot);
        }
        Ok(())
    }

    fn clear_tree(&mut self) {
        self.built = false;
        self.root = None;
        self.roots.clear();
        self.max_head_distance = 0;

        let all = self
            .tokens
            .iter_mut()
            .chain(self.empty_tokens.values_mut().flatten());
        for token in all {
            token.clear_derived();
        }
    }

    /// Linear positions, counting from 1 and interleaving empty nodes after
    /// the word they are anchored to
    fn assign_positions(&mut self) {
        let mut position = 1;
        if let Some(initial) = self.empty_tokens.get_mut(&0) {
            for token in initial {
                token.position = position;
                position += 1;
            }
        }
        for token in &mut self.tokens {
            token.position = position;
            position += 1;
            if let Some(empties) = self.empty_tokens.get_mut(&token.id()) {
                for empty in empties {
                    empty.position = position;
                    position += 1;
                }
            }
        }
    }

    fn link_heads(&mut self) -> Result<(), TreeError> {
        let len = self.tokens.len();
        for node in 0..len {
            let id = self.tokens[node].id();
            match self.tokens[node].head {
                None => {}
                Some(0) => {
                    if self.root.is_none() {
                        self.root = Some(node);
                    }
                    self.roots.push(node);
                }
                Some(head) => {
                    let out_of_range = TreeError::HeadOutOfRange { token: id, head, len };
                    if head > len {
                        return Err(out_of_range);
                    }
                    let Some(h) = self.node_id(head) else {
                        return Err(out_of_range);
                    };
                    self.tokens[node].head_token = Some(h);
                    self.tokens[h].dependents.push(node);
                    self.tokens[h].dependents_by_id.insert(id, node);
                    self.max_head_distance = self.max_head_distance.max(id.abs_diff(head));
                }
            }
        }
        Ok(())
    }

    /// Point enhanced dependencies at their head tokens. Unknown heads are
    /// left dangling.
    fn resolve_enhanced_deps(&mut self) {
        let mut table: FxHashMap<TokenId, TokenRef> = FxHashMap::default();
        for (node, token) in self.tokens.iter().enumerate() {
            table.insert(token.id, TokenRef::Word(node));
        }
        for (&anchor, empties) in &self.empty_tokens {
            for (index, token) in empties.iter().enumerate() {
                table.insert(token.id, TokenRef::Empty { anchor, index });
            }
        }

        let all = self
            .tokens
            .iter_mut()
            .chain(self.empty_tokens.values_mut().flatten());
        for token in all {
            for dep in &mut token.deps {
                dep.headword = table.get(&dep.head_id()).copied();
            }
        }
    }

    fn head_index(&self, node: NodeId) -> Option<NodeId> {
        match self.tokens[node].head {
            Some(h) if h > 0 => self.node_id(h),
            _ => None,
        }
    }

    /// Ids of tokens that lie on a head cycle, one per cycle (the smallest id
    /// on it), in ascending order
    ///
    /// Works from the raw head values, so it can be called on a sentence
    /// whose tree failed to build.
    pub fn cycles(&self) -> Vec<usize> {
        let mut found = Vec::new();
        for start in 0..self.tokens.len() {
            let mut visited: FxHashSet<NodeId> = FxHashSet::default();
            visited.insert(start);
            let mut lowest = self.tokens[start].id();
            let mut current = self.head_index(start);
            while let Some(n) = current {
                if n == start {
                    if lowest == self.tokens[start].id() {
                        found.push(lowest);
                    }
                    break;
                }
                if !visited.insert(n) {
                    // the walk entered a cycle that does not pass through start
                    break;
                }
                lowest = lowest.min(self.tokens[n].id());
                current = self.head_index(n);
            }
        }
        found.sort_unstable();
        found
    }
}
