//! Abstract syntax of a Grew-match request
//!
//! This is what [`crate::query::parse_request`] produces and what
//! [`crate::pattern::Pattern::from_request`] consumes. It can also be built
//! by hand when queries come from somewhere other than text.

/// A `pattern { ... }` block followed by any number of `without { ... }` blocks
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Request {
    pub pattern: Vec<Clause>,
    pub withouts: Vec<Vec<Clause>>,
}

impl Request {
    pub fn new(pattern: Vec<Clause>) -> Self {
        Self {
            pattern,
            withouts: Vec::new(),
        }
    }

    /// Add a `without` block
    pub fn without(mut self, clauses: Vec<Clause>) -> Self {
        self.withouts.push(clauses);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Clause {
    Node(NodeClause),
    Relation(RelationClause),
    Order(OrderClause),
}

impl Clause {
    pub fn node(name: &str, conditions: Vec<Condition>) -> Self {
        Clause::Node(NodeClause {
            name: name.to_string(),
            conditions,
        })
    }

    /// `head -[labels]-> dep`; an empty label list is a bare `->`
    pub fn relation(head: &str, dep: &str, labels: &[&str]) -> Self {
        Clause::Relation(RelationClause {
            name: None,
            head: head.to_string(),
            dep: dep.to_string(),
            labels: labels.iter().map(|l| l.to_string()).collect(),
            negated: false,
        })
    }

    pub fn order(left: &str, op: OrderOp, right: &str) -> Self {
        Clause::Order(OrderClause {
            left: left.to_string(),
            right: right.to_string(),
            op,
        })
    }
}

/// `N [cond, cond, ...]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeClause {
    pub name: String,
    pub conditions: Vec<Condition>,
}

/// One condition inside a node's brackets
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Condition {
    /// `Number` (or `!Number` when negated)
    Present { feature: String, negated: bool },
    /// `upos=NOUN|PROPN` (or `upos<>NOUN|PROPN` when negated)
    Values {
        feature: String,
        values: Vec<String>,
        negated: bool,
    },
}

impl Condition {
    pub fn eq(feature: &str, values: &[&str]) -> Self {
        Condition::Values {
            feature: feature.to_string(),
            values: values.iter().map(|v| v.to_string()).collect(),
            negated: false,
        }
    }

    pub fn ne(feature: &str, values: &[&str]) -> Self {
        Condition::Values {
            feature: feature.to_string(),
            values: values.iter().map(|v| v.to_string()).collect(),
            negated: true,
        }
    }

    pub fn present(feature: &str) -> Self {
        Condition::Present {
            feature: feature.to_string(),
            negated: false,
        }
    }

    pub fn absent(feature: &str) -> Self {
        Condition::Present {
            feature: feature.to_string(),
            negated: true,
        }
    }

    pub fn feature(&self) -> &str {
        match self {
            Condition::Present { feature, .. } | Condition::Values { feature, .. } => feature,
        }
    }
}

/// `e: head -[^labels]-> dep`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationClause {
    pub name: Option<String>,
    pub head: String,
    pub dep: String,
    /// Empty means any label
    pub labels: Vec<String>,
    /// Written with `^` before the labels
    pub negated: bool,
}

/// `left op right`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderClause {
    pub left: String,
    pub right: String,
    pub op: OrderOp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderOp {
    /// `<<`
    Before,
    /// `<`
    ImmediatelyBefore,
    /// `>>`
    After,
    /// `>`
    ImmediatelyAfter,
}

impl OrderOp {
    pub fn from_symbol(symbol: &str) -> Option<Self> {
        match symbol {
            "<<" => Some(OrderOp::Before),
            "<" => Some(OrderOp::ImmediatelyBefore),
            ">>" => Some(OrderOp::After),
            ">" => Some(OrderOp::ImmediatelyAfter),
            _ => None,
        }
    }

    pub fn is_strict(self) -> bool {
        matches!(self, OrderOp::ImmediatelyBefore | OrderOp::ImmediatelyAfter)
    }
}

impl OrderClause {
    /// Endpoints as (earlier, later)
    pub fn normalized(&self) -> (&str, &str) {
        match self.op {
            OrderOp::Before | OrderOp::ImmediatelyBefore => (&self.left, &self.right),
            OrderOp::After | OrderOp::ImmediatelyAfter => (&self.right, &self.left),
        }
    }
}
