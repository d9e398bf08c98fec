//! Pattern matching over built sentences
//!
//! The search pipeline:
//! 1. Collect candidate tokens for every pattern node
//! 2. Enumerate assignments of distinct tokens to nodes
//! 3. Check order constraints, then relation constraints
//! 4. Yield every surviving assignment as a [`Match`]

use crate::pattern::{Endpoint, OrderConstraint, Pattern, RelationConstraint};
use crate::query::{QueryError, compile_query};
use crate::tree::{NodeId, Sentence, Token};

/// A successful binding of pattern variables to tokens
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Match {
    /// Arena index of the token bound to each variable, in variable order
    pub bindings: Vec<NodeId>,
    /// Variable names (in pattern position order)
    pub var_names: Vec<String>,
}

impl Match {
    /// Get the node bound to a variable by name
    pub fn get(&self, name: &str) -> Option<NodeId> {
        let pos = self.var_names.iter().position(|n| n == name)?;
        self.bindings.get(pos).copied()
    }

    /// Yields (variable_name, node) pairs in variable order
    pub fn iter_named(&self) -> impl Iterator<Item = (&str, NodeId)> + '_ {
        self.var_names
            .iter()
            .map(String::as_str)
            .zip(self.bindings.iter().copied())
    }

    /// Yields (variable_name, token id) pairs in variable order
    pub fn token_ids<'a>(&'a self, sentence: &'a Sentence) -> impl Iterator<Item = (&'a str, usize)> + 'a {
        self.iter_named()
            .map(move |(name, node)| (name, sentence.node(node).id()))
    }
}

/// Search a built sentence with a compiled pattern
///
/// Returns every assignment of distinct tokens to the pattern's nodes that
/// satisfies all of its constraints, in lexicographic order of candidates.
/// A sentence whose tree is not built has no matches.
pub fn search(sentence: &Sentence, pattern: &Pattern) -> Vec<Match> {
    run(sentence, pattern).0
}

/// Matches plus the number of complete tuples that were checked against
/// order and relation constraints
fn run(sentence: &Sentence, pattern: &Pattern) -> (Vec<Match>, usize) {
    if !sentence.is_built() {
        log::warn!(
            "sentence {} has no built tree; skipping",
            sentence.sent_id.as_deref().unwrap_or("<unnamed>")
        );
        return (Vec::new(), 0);
    }
    if pattern.is_empty() {
        return (Vec::new(), 0);
    }

    let Some(candidates) = get_candidates(sentence, pattern) else {
        return (Vec::new(), 0);
    };

    let mut searcher = Searcher {
        sentence,
        pattern,
        candidates,
        tuple: Vec::with_capacity(pattern.n_vars()),
        matches: Vec::new(),
        tuples: 0,
    };
    searcher.extend();
    log::debug!(
        "{} distinct tuples, {} matches",
        searcher.tuples,
        searcher.matches.len()
    );
    (searcher.matches, searcher.tuples)
}

/// Search a built sentence with a query string
///
/// Parses and compiles the query and then searches the sentence.
pub fn search_query(sentence: &Sentence, query: &str) -> Result<Vec<Match>, QueryError> {
    let pattern = compile_query(query)?;
    Ok(search(sentence, &pattern))
}

/// Tokens satisfying each node's conditions, or `None` as soon as one node
/// has none
fn get_candidates(sentence: &Sentence, pattern: &Pattern) -> Option<Vec<Vec<NodeId>>> {
    let mut candidates = Vec::with_capacity(pattern.n_vars());
    for node in &pattern.nodes {
        let found: Vec<NodeId> = sentence
            .tokens()
            .iter()
            .enumerate()
            .filter(|(_, token)| node.matches(token))
            .map(|(n, _)| n)
            .collect();
        log::debug!("node {}: {} candidates", node.name, found.len());
        if found.is_empty() {
            return None;
        }
        candidates.push(found);
    }
    Some(candidates)
}

struct Searcher<'a> {
    sentence: &'a Sentence,
    pattern: &'a Pattern,
    candidates: Vec<Vec<NodeId>>,
    tuple: Vec<NodeId>,
    matches: Vec<Match>,
    tuples: usize,
}

impl Searcher<'_> {
    /// Depth-first walk of the candidate product, skipping tokens already
    /// bound to an earlier variable
    fn extend(&mut self) {
        let depth = self.tuple.len();
        if depth == self.candidates.len() {
            self.tuples += 1;
            if self.check_tuple() {
                self.matches.push(Match {
                    bindings: self.tuple.clone(),
                    var_names: self.pattern.var_names.clone(),
                });
            }
            return;
        }

        for i in 0..self.candidates[depth].len() {
            let node = self.candidates[depth][i];
            if self.tuple.contains(&node) {
                continue;
            }
            self.tuple.push(node);
            self.extend();
            self.tuple.pop();
        }
    }

    fn token(&self, var: usize) -> &Token {
        self.sentence.node(self.tuple[var])
    }

    fn check_tuple(&self) -> bool {
        if let Some(order) = self.pattern.orders.iter().find(|o| !self.check_order(o)) {
            log::trace!("tuple {:?} rejected by order {:?}", self.tuple, order);
            return false;
        }
        if let Some(relation) = self.pattern.relations.iter().find(|r| !self.check_relation(r)) {
            log::trace!("tuple {:?} rejected by relation {:?}", self.tuple, relation);
            return false;
        }
        true
    }

    fn check_order(&self, order: &OrderConstraint) -> bool {
        let earlier = self.token(order.earlier).id();
        let later = self.token(order.later).id();
        order.holds(earlier, later) != order.negated
    }

    /// Whether the tuple survives the relation constraint
    fn check_relation(&self, relation: &RelationConstraint) -> bool {
        match (&relation.head, &relation.dep) {
            (Endpoint::Bound(head), Endpoint::Bound(dep)) => {
                let dep_token = self.token(*dep);
                let present = dep_token.head_token == Some(self.tuple[*head])
                    && relation.accepts_label(&dep_token.deprel);
                present != relation.negated
            }
            // no dependent of head carries a forbidden label
            (Endpoint::Bound(head), Endpoint::Unbound(_)) => !self
                .sentence
                .dependents(self.tuple[*head])
                .any(|d| relation.accepts_label(&d.deprel)),
            // dep is not attached to any head with a forbidden label
            (Endpoint::Unbound(_), Endpoint::Bound(dep)) => {
                let dep_token = self.token(*dep);
                !(dep_token.head_token.is_some() && relation.accepts_label(&dep_token.deprel))
            }
            (Endpoint::Unbound(_), Endpoint::Unbound(_)) => true,
        }
    }
}
