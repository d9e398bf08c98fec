//! Pattern representation and compilation
//!
//! A [`Pattern`] is the compiled form of a Grew request: one
//! [`NodeConstraint`] per bound variable, plus relation and order
//! constraints between them. Patterns are immutable once built and can be
//! shared across threads and reused for any number of sentences.

use indexmap::IndexMap;
use rustc_hash::{FxHashMap, FxHashSet};
use std::collections::hash_map::Entry;
use std::fmt;
use thiserror::Error;

use crate::ast::{Clause, Condition, NodeClause, OrderClause, RelationClause, Request};
use crate::tree::Token;

/// Type alias for pattern variable identifiers (indices into Pattern.nodes)
pub type VarId = usize;

/// Errors raised while compiling a request into a pattern
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PatternError {
    #[error("Pattern error: relation {head} -> {dep} is negated and has an end that is not a pattern node, but no label is given")]
    InvalidNegatedRelation { head: String, dep: String },

    #[error("Pattern error: relation {head} -> {dep} refers to {node}, which is not a pattern node")]
    UnboundNode {
        head: String,
        dep: String,
        node: String,
    },

    #[error("Pattern error: inconsistent node {node}: {feature} is constrained more than once")]
    InconsistentNode { node: String, feature: String },
}

/// Token attribute a node condition looks at
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FeatureKey {
    Upos,
    Xpos,
    Form,
    Lemma,
    Deprel,
    /// Morphological feature from the FEATS column
    Feature(String),
}

impl FeatureKey {
    pub fn parse(name: &str) -> Self {
        match name {
            "upos" => FeatureKey::Upos,
            "xpos" => FeatureKey::Xpos,
            "form" => FeatureKey::Form,
            "lemma" => FeatureKey::Lemma,
            "deprel" | "deprels" => FeatureKey::Deprel,
            _ => FeatureKey::Feature(name.to_string()),
        }
    }

    /// The token's value for this key. Column attributes are always present;
    /// morphological features may be missing.
    pub fn lookup<'a>(&self, token: &'a Token) -> Option<&'a str> {
        match self {
            FeatureKey::Upos => Some(&token.upos),
            FeatureKey::Xpos => Some(&token.xpos),
            FeatureKey::Form => Some(&token.form),
            FeatureKey::Lemma => Some(&token.lemma),
            FeatureKey::Deprel => Some(&token.deprel),
            FeatureKey::Feature(name) => token.feats.get(name),
        }
    }
}

impl fmt::Display for FeatureKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeatureKey::Upos => f.write_str("upos"),
            FeatureKey::Xpos => f.write_str("xpos"),
            FeatureKey::Form => f.write_str("form"),
            FeatureKey::Lemma => f.write_str("lemma"),
            FeatureKey::Deprel => f.write_str("deprel"),
            FeatureKey::Feature(name) => f.write_str(name),
        }
    }
}

/// Conditions on a single pattern node
///
/// `must` values are alternatives (any one suffices) and keys are conjoined.
/// An empty list in `must` requires the attribute to be present; an empty
/// list in `must_not` requires it to be absent. A non-empty `must_not` list
/// requires the attribute to be present with some other value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeConstraint {
    pub name: String,
    pub must: IndexMap<FeatureKey, Vec<String>>,
    pub must_not: IndexMap<FeatureKey, Vec<String>>,
}

impl NodeConstraint {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Default::default()
        }
    }

    /// Whether any token qualifies
    pub fn is_any(&self) -> bool {
        self.must.is_empty() && self.must_not.is_empty()
    }

    pub fn matches(&self, token: &Token) -> bool {
        let required = self.must.iter().all(|(key, values)| match key.lookup(token) {
            Some(v) => values.is_empty() || values.iter().any(|w| w == v),
            None => false,
        });
        required
            && self.must_not.iter().all(|(key, values)| match key.lookup(token) {
                Some(v) => !values.is_empty() && !values.iter().any(|w| w == v),
                None => values.is_empty(),
            })
    }
}

/// Relation endpoint: a pattern node, or a name that only occurs in a
/// negated relation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    Bound(VarId),
    Unbound(String),
}

impl Endpoint {
    pub fn var(&self) -> Option<VarId> {
        match self {
            Endpoint::Bound(var) => Some(*var),
            Endpoint::Unbound(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationConstraint {
    pub name: Option<String>,
    pub head: Endpoint,
    pub dep: Endpoint,
    /// Accepted labels; empty accepts any
    pub labels: Vec<String>,
    pub negated: bool,
}

impl RelationConstraint {
    pub fn accepts_label(&self, deprel: &str) -> bool {
        self.labels.is_empty() || self.labels.iter().any(|l| l == deprel)
    }
}

/// `earlier` precedes `later` by id, immediately when `strict`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderConstraint {
    pub earlier: VarId,
    pub later: VarId,
    pub strict: bool,
    /// From a `without` block: the order must not hold
    pub negated: bool,
}

impl OrderConstraint {
    pub fn holds(&self, earlier_id: usize, later_id: usize) -> bool {
        if self.strict {
            earlier_id + 1 == later_id
        } else {
            earlier_id < later_id
        }
    }
}

/// A compiled pattern to match against sentences
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Pattern {
    pub var_ids: FxHashMap<String, VarId>,
    pub var_names: Vec<String>,
    pub nodes: Vec<NodeConstraint>,
    pub relations: Vec<RelationConstraint>,
    pub orders: Vec<OrderConstraint>,
}

impl Pattern {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compile a parsed request
    pub fn from_request(request: &Request) -> Result<Self, PatternError> {
        let mut builder = PatternBuilder::default();
        builder.block(&request.pattern, Polarity::Positive)?;
        for without in &request.withouts {
            builder.block(without, Polarity::Negative)?;
        }
        builder.finish()
    }

    /// Number of bound variables
    pub fn n_vars(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn var_id(&self, name: &str) -> Option<VarId> {
        self.var_ids.get(name).copied()
    }

    /// Get or create the variable for `name`
    pub fn add_var(&mut self, name: &str) -> VarId {
        match self.var_ids.entry(name.to_owned()) {
            Entry::Occupied(e) => *e.get(),
            Entry::Vacant(e) => {
                let var_id = self.nodes.len();
                e.insert(var_id);
                self.var_names.push(name.to_string());
                self.nodes.push(NodeConstraint::new(name));
                var_id
            }
        }
    }
}

/// Whether clauses are being read from the `pattern` block or a `without` block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Polarity {
    Positive,
    Negative,
}

impl Polarity {
    /// Effective negation of a clause written with `negated` under this polarity
    fn negates(self, negated: bool) -> bool {
        (self == Polarity::Negative) != negated
    }
}

/// Single fold over the request; relations are resolved at the end so
/// they may name nodes declared after them.
#[derive(Default)]
struct PatternBuilder {
    pattern: Pattern,
    sealed: Vec<FxHashSet<FeatureKey>>,
    relations: Vec<(RelationClause, Polarity)>,
}

impl PatternBuilder {
    fn block(&mut self, clauses: &[Clause], polarity: Polarity) -> Result<(), PatternError> {
        for clause in clauses {
            match clause {
                Clause::Node(node) => self.node(node, polarity)?,
                Clause::Relation(relation) => self.relation(relation, polarity),
                Clause::Order(order) => self.order(order, polarity),
            }
        }
        Ok(())
    }

    fn var(&mut self, name: &str) -> VarId {
        let var = self.pattern.add_var(name);
        if var == self.sealed.len() {
            self.sealed.push(FxHashSet::default());
        }
        var
    }

    fn node(&mut self, clause: &NodeClause, polarity: Polarity) -> Result<(), PatternError> {
        let var = self.var(&clause.name);
        for condition in &clause.conditions {
            let key = FeatureKey::parse(condition.feature());
            if !self.sealed[var].insert(key.clone()) {
                return Err(PatternError::InconsistentNode {
                    node: clause.name.clone(),
                    feature: key.to_string(),
                });
            }

            let (values, negated) = match condition {
                Condition::Present { negated, .. } => (&[][..], *negated),
                Condition::Values {
                    values, negated, ..
                } => (&values[..], *negated),
            };
            let node = &mut self.pattern.nodes[var];
            let target = if polarity.negates(negated) {
                &mut node.must_not
            } else {
                &mut node.must
            };
            target.entry(key).or_default().extend(values.iter().cloned());
        }
        Ok(())
    }

    /// In the pattern block both ends become nodes. A labeled relation that
    /// introduces its dependent also constrains that node's deprel.
    fn relation(&mut self, clause: &RelationClause, polarity: Polarity) {
        if polarity == Polarity::Positive {
            self.var(&clause.head);
            let introduced = self.pattern.var_id(&clause.dep).is_none();
            let dep = self.var(&clause.dep);
            if introduced && !clause.labels.is_empty() {
                let node = &mut self.pattern.nodes[dep];
                let target = if clause.negated {
                    &mut node.must_not
                } else {
                    &mut node.must
                };
                target.insert(FeatureKey::Deprel, clause.labels.clone());
                self.sealed[dep].insert(FeatureKey::Deprel);
            }
        }
        self.relations.push((clause.clone(), polarity));
    }

    fn order(&mut self, clause: &OrderClause, polarity: Polarity) {
        let (earlier, later) = clause.normalized();
        let earlier = self.var(earlier);
        let later = self.var(later);
        self.pattern.orders.push(OrderConstraint {
            earlier,
            later,
            strict: clause.op.is_strict(),
            negated: polarity == Polarity::Negative,
        });
    }

    fn endpoint(&self, name: &str) -> Endpoint {
        match self.pattern.var_id(name) {
            Some(var) => Endpoint::Bound(var),
            None => Endpoint::Unbound(name.to_string()),
        }
    }

    fn finish(mut self) -> Result<Pattern, PatternError> {
        for (clause, polarity) in std::mem::take(&mut self.relations) {
            let negated = polarity.negates(clause.negated);
            let head = self.endpoint(&clause.head);
            let dep = self.endpoint(&clause.dep);

            let unbound = |node: &str| PatternError::UnboundNode {
                head: clause.head.clone(),
                dep: clause.dep.clone(),
                node: node.to_string(),
            };
            match (&head, &dep) {
                (Endpoint::Bound(_), Endpoint::Bound(_)) => {}
                (Endpoint::Unbound(name), _) | (_, Endpoint::Unbound(name)) if !negated => {
                    return Err(unbound(name));
                }
                (Endpoint::Unbound(name), Endpoint::Unbound(_)) => return Err(unbound(name)),
                (Endpoint::Bound(_), Endpoint::Unbound(_)) | (Endpoint::Unbound(_), Endpoint::Bound(_))
                    if clause.labels.is_empty() =>
                {
                    return Err(PatternError::InvalidNegatedRelation {
                        head: clause.head.clone(),
                        dep: clause.dep.clone(),
                    });
                }
                _ => {}
            }

            self.pattern.relations.push(RelationConstraint {
                name: clause.name.clone(),
                head,
                dep,
                labels: clause.labels.clone(),
                negated,
            });
        }

        log::debug!(
            "compiled pattern: {} nodes, {} relations, {} orders",
            self.pattern.nodes.len(),
            self.pattern.relations.len(),
            self.pattern.orders.len()
        );
        Ok(self.pattern)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::OrderOp;

    fn token(upos: &str, feats: &[(&str, &str)]) -> Token {
        let mut token = Token::new(1, "x", "x", upos, 0, "root");
        for (k, v) in feats {
            token.feats.insert(*k, *v);
        }
        token
    }

    fn values(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_node_conditions() {
        let request = Request::new(vec![Clause::node(
            "N",
            vec![
                Condition::eq("upos", &["NOUN", "PROPN"]),
                Condition::ne("Number", &["Sing"]),
                Condition::present("Case"),
                Condition::absent("Gender"),
            ],
        )]);
        let pattern = Pattern::from_request(&request).unwrap();
        let node = &pattern.nodes[0];

        assert_eq!(node.must.get(&FeatureKey::Upos), Some(&values(&["NOUN", "PROPN"])));
        assert_eq!(node.must.get(&FeatureKey::parse("Case")), Some(&Vec::new()));
        assert_eq!(node.must_not.get(&FeatureKey::parse("Number")), Some(&values(&["Sing"])));
        assert_eq!(node.must_not.get(&FeatureKey::parse("Gender")), Some(&Vec::new()));

        assert!(node.matches(&token("NOUN", &[("Case", "Nom"), ("Number", "Plur")])));
        assert!(node.matches(&token("PROPN", &[("Case", "Nom"), ("Number", "Plur")])));
        // Number<>Sing needs some Number to compare against
        assert!(!node.matches(&token("PROPN", &[("Case", "Nom")])));
        assert!(!node.matches(&token("VERB", &[("Case", "Nom")])));
        assert!(!node.matches(&token("NOUN", &[("Case", "Nom"), ("Number", "Sing")])));
        assert!(!node.matches(&token("NOUN", &[])));
        assert!(!node.matches(&token("NOUN", &[("Case", "Nom"), ("Gender", "Fem")])));
    }

    #[test]
    fn test_feature_keys() {
        assert_eq!(FeatureKey::parse("deprels"), FeatureKey::Deprel);
        assert_eq!(FeatureKey::parse("deprel"), FeatureKey::Deprel);
        assert_eq!(FeatureKey::parse("Tense"), FeatureKey::Feature("Tense".to_string()));

        let t = token("VERB", &[("Tense", "Past")]);
        assert_eq!(FeatureKey::Upos.lookup(&t), Some("VERB"));
        assert_eq!(FeatureKey::Deprel.lookup(&t), Some("root"));
        assert_eq!(FeatureKey::parse("tense").lookup(&t), Some("Past"));
        assert_eq!(FeatureKey::parse("Mood").lookup(&t), None);
    }

    #[test]
    fn test_without_block_flips_node_conditions() {
        let request = Request::new(vec![Clause::node("V", vec![Condition::eq("upos", &["VERB"])])])
            .without(vec![Clause::node("V", vec![Condition::eq("Mood", &["Imp"])])]);
        let pattern = Pattern::from_request(&request).unwrap();

        assert_eq!(pattern.n_vars(), 1);
        let node = &pattern.nodes[0];
        assert_eq!(node.must_not.get(&FeatureKey::parse("Mood")), Some(&values(&["Imp"])));
        assert!(node.matches(&token("VERB", &[("Mood", "Ind")])));
        assert!(!node.matches(&token("VERB", &[("Mood", "Imp")])));
        assert!(!node.matches(&token("VERB", &[])));
    }

    #[test]
    fn test_inconsistent_node() {
        let request = Request::new(vec![
            Clause::node("N", vec![Condition::eq("upos", &["NOUN"])]),
            Clause::node("N", vec![Condition::eq("upos", &["VERB"])]),
        ]);
        assert_eq!(
            Pattern::from_request(&request),
            Err(PatternError::InconsistentNode {
                node: "N".to_string(),
                feature: "upos".to_string()
            })
        );

        // different features on separate clauses are fine
        let request = Request::new(vec![
            Clause::node("N", vec![Condition::eq("upos", &["NOUN"])]),
            Clause::node("N", vec![Condition::eq("Number", &["Sing"])]),
        ]);
        assert!(Pattern::from_request(&request).is_ok());
    }

    #[test]
    fn test_relation_endpoints() {
        // forward reference, and a node introduced by the relation itself
        let request = Request::new(vec![
            Clause::relation("V", "N", &["obj"]),
            Clause::node("N", vec![Condition::eq("upos", &["NOUN"])]),
        ])
        .without(vec![Clause::relation("V", "S", &["nsubj"])]);
        let pattern = Pattern::from_request(&request).unwrap();

        assert_eq!(pattern.var_names, vec!["V", "N"]);
        assert!(pattern.nodes[0].is_any());
        assert_eq!(pattern.relations[0].head, Endpoint::Bound(0));
        assert_eq!(pattern.relations[0].dep, Endpoint::Bound(1));
        assert!(!pattern.relations[0].negated);
        assert_eq!(pattern.relations[1].dep, Endpoint::Unbound("S".to_string()));
        assert!(pattern.relations[1].negated);
        assert_eq!(pattern.relations[1].dep.var(), None);
    }

    #[test]
    fn test_caret_negates_relation() {
        let mut request = Request::new(vec![Clause::relation("V", "N", &["nsubj"])]);
        if let Clause::Relation(r) = &mut request.pattern[0] {
            r.negated = true;
        }
        let pattern = Pattern::from_request(&request).unwrap();

        assert!(pattern.relations[0].negated);
        assert!(pattern.relations[0].accepts_label("nsubj"));
        assert!(!pattern.relations[0].accepts_label("obj"));
    }

    #[test]
    fn test_invalid_negated_relation() {
        let request = Request::new(vec![Clause::node("V", vec![])]).without(vec![Clause::relation("V", "X", &[])]);
        assert_eq!(
            Pattern::from_request(&request),
            Err(PatternError::InvalidNegatedRelation {
                head: "V".to_string(),
                dep: "X".to_string()
            })
        );
    }

    #[test]
    fn test_invalid_negated_relation_from_unbound_head() {
        let request = Request::new(vec![Clause::node("N", vec![])]).without(vec![Clause::relation("X", "N", &[])]);
        assert_eq!(
            Pattern::from_request(&request),
            Err(PatternError::InvalidNegatedRelation {
                head: "X".to_string(),
                dep: "N".to_string()
            })
        );
    }

    #[test]
    fn test_relation_constrains_introduced_dependent() {
        let mut request = Request::new(vec![
            Clause::node("V", vec![Condition::eq("upos", &["VERB"])]),
            Clause::relation("V", "O", &["obj", "iobj"]),
            Clause::relation("V", "N", &["nsubj"]),
            Clause::node("S", vec![]),
            Clause::relation("V", "S", &["nsubj"]),
        ]);
        if let Clause::Relation(r) = &mut request.pattern[2] {
            r.negated = true;
        }
        let pattern = Pattern::from_request(&request).unwrap();

        assert_eq!(pattern.var_names, vec!["V", "O", "N", "S"]);
        assert!(pattern.nodes[0].must.get(&FeatureKey::Deprel).is_none());
        assert_eq!(pattern.nodes[1].must.get(&FeatureKey::Deprel), Some(&values(&["obj", "iobj"])));
        assert_eq!(pattern.nodes[2].must_not.get(&FeatureKey::Deprel), Some(&values(&["nsubj"])));
        // S was declared before the relation
        assert!(pattern.nodes[3].is_any());

        let mut obj = token("NOUN", &[]);
        obj.deprel = "obj".to_string();
        let mut subj = token("NOUN", &[]);
        subj.deprel = "nsubj".to_string();
        assert!(pattern.nodes[1].matches(&obj));
        assert!(!pattern.nodes[1].matches(&subj));
        assert!(pattern.nodes[2].matches(&obj));
        assert!(!pattern.nodes[2].matches(&subj));

        // the introduced deprel can't be restated on the node
        let request = Request::new(vec![
            Clause::relation("V", "O", &["obj"]),
            Clause::node("O", vec![Condition::eq("deprel", &["obj"])]),
        ]);
        assert!(matches!(
            Pattern::from_request(&request),
            Err(PatternError::InconsistentNode { .. })
        ));
    }

    #[test]
    fn test_unbound_nodes() {
        let request = Request::new(vec![Clause::node("V", vec![])]).without(vec![Clause::relation("X", "Y", &["obj"])]);
        assert!(matches!(
            Pattern::from_request(&request),
            Err(PatternError::UnboundNode { node, .. }) if node == "X"
        ));

        // an unbound head is allowed: "no incoming obj"
        let request = Request::new(vec![Clause::node("N", vec![])]).without(vec![Clause::relation("X", "N", &["obj"])]);
        let pattern = Pattern::from_request(&request).unwrap();
        assert_eq!(pattern.relations[0].head, Endpoint::Unbound("X".to_string()));
    }

    #[test]
    fn test_orders() {
        let request = Request::new(vec![
            Clause::order("A", OrderOp::Before, "B"),
            Clause::order("A", OrderOp::ImmediatelyAfter, "C"),
        ])
        .without(vec![Clause::order("B", OrderOp::ImmediatelyBefore, "C")]);
        let pattern = Pattern::from_request(&request).unwrap();

        assert_eq!(pattern.var_names, vec!["A", "B", "C"]);
        assert_eq!(
            pattern.orders,
            vec![
                OrderConstraint {
                    earlier: 0,
                    later: 1,
                    strict: false,
                    negated: false
                },
                OrderConstraint {
                    earlier: 2,
                    later: 0,
                    strict: true,
                    negated: false
                },
                OrderConstraint {
                    earlier: 1,
                    later: 2,
                    strict: true,
                    negated: true
                },
            ]
        );
        assert!(pattern.orders[0].holds(1, 5));
        assert!(!pattern.orders[0].holds(5, 5));
        assert!(pattern.orders[1].holds(4, 5));
        assert!(!pattern.orders[1].holds(3, 5));
    }

    #[test]
    fn test_empty_request() {
        let pattern = Pattern::from_request(&Request::default()).unwrap();
        assert!(pattern.is_empty());
    }
}
