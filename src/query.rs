//! Query language parser
//!
//! Parses Grew-match request strings into the [`crate::ast`] tree using a
//! pest grammar, and compiles them into a [`Pattern`].

use pest::Parser;
use pest::iterators::{Pair, Pairs};
use pest_derive::Parser;
use thiserror::Error;

use crate::ast::{Clause, Condition, NodeClause, OrderClause, OrderOp, RelationClause, Request};
use crate::pattern::{Pattern, PatternError};

#[derive(Parser)]
#[grammar = "grew.pest"]
struct GrewParser;

/// Error type for query parsing failures
#[derive(Debug, Error)]
pub enum QueryError {
    #[error("Query error: {0}")]
    ParseError(#[from] pest::error::Error<Rule>),

    #[error("Query error: malformed {0}")]
    Malformed(&'static str),

    #[error("Query error: {0}")]
    Pattern(#[from] PatternError),
}

/// Parse a request string into its syntax tree
pub fn parse_request(input: &str) -> Result<Request, QueryError> {
    let mut pairs = GrewParser::parse(Rule::request, input)?;
    let request_pair = next(&mut pairs, "request")?;

    let mut request = Request::default();
    for block in request_pair.into_inner() {
        match block.as_rule() {
            Rule::pattern_block => {
                let list = next(&mut block.into_inner(), "pattern block")?;
                request.pattern = parse_clause_list(list)?;
            }
            Rule::without_block => {
                let list = next(&mut block.into_inner(), "without block")?;
                request.withouts.push(parse_clause_list(list)?);
            }
            _ => {} // EOI
        }
    }
    Ok(request)
}

/// Parse a request string and compile it into a [`Pattern`]
pub fn compile_query(input: &str) -> Result<Pattern, QueryError> {
    let request = parse_request(input)?;
    Ok(Pattern::from_request(&request)?)
}

fn next<'a>(pairs: &mut Pairs<'a, Rule>, what: &'static str) -> Result<Pair<'a, Rule>, QueryError> {
    pairs.next().ok_or(QueryError::Malformed(what))
}

fn parse_clause_list(pair: Pair<Rule>) -> Result<Vec<Clause>, QueryError> {
    pair.into_inner()
        .filter(|p| p.as_rule() == Rule::clause)
        .map(parse_clause)
        .collect()
}

fn parse_clause(pair: Pair<Rule>) -> Result<Clause, QueryError> {
    let inner = next(&mut pair.into_inner(), "clause")?;
    match inner.as_rule() {
        Rule::node => Ok(Clause::Node(parse_node(inner)?)),
        Rule::relation => Ok(Clause::Relation(parse_relation(inner)?)),
        Rule::order => Ok(Clause::Order(parse_order(inner)?)),
        _ => Err(QueryError::Malformed("clause")),
    }
}

/// Parse a node clause: Name [cond, cond]
fn parse_node(pair: Pair<Rule>) -> Result<NodeClause, QueryError> {
    let mut inner = pair.into_inner();
    let name = next(&mut inner, "node name")?.as_str().to_string();
    let conditions = next(&mut inner, "condition list")?
        .into_inner()
        .map(parse_condition)
        .collect::<Result<Vec<_>, _>>()?;

    Ok(NodeClause { name, conditions })
}

fn parse_condition(pair: Pair<Rule>) -> Result<Condition, QueryError> {
    let inner = next(&mut pair.into_inner(), "condition")?;
    match inner.as_rule() {
        Rule::present | Rule::absent => {
            let negated = inner.as_rule() == Rule::absent;
            let feature = next(&mut inner.into_inner(), "feature name")?.as_str().to_string();
            Ok(Condition::Present { feature, negated })
        }
        Rule::value_condition => {
            let mut parts = inner.into_inner();
            let feature = next(&mut parts, "feature name")?.as_str().to_string();
            let negated = next(&mut parts, "comparison")?.as_str() == "<>";
            let values = next(&mut parts, "value list")?
                .into_inner()
                .map(parse_value)
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Condition::Values {
                feature,
                values,
                negated,
            })
        }
        _ => Err(QueryError::Malformed("condition")),
    }
}

/// Bare value or quoted string, with `\"` and `\\` unescaped
fn parse_value(pair: Pair<Rule>) -> Result<String, QueryError> {
    let inner = next(&mut pair.into_inner(), "value")?;
    match inner.as_rule() {
        Rule::quoted => {
            let text = next(&mut inner.into_inner(), "quoted value")?.as_str();
            let mut out = String::with_capacity(text.len());
            let mut chars = text.chars();
            while let Some(c) = chars.next() {
                match c {
                    '\\' => out.extend(chars.next()),
                    _ => out.push(c),
                }
            }
            Ok(out)
        }
        _ => Ok(inner.as_str().to_string()),
    }
}

/// Parse a relation: [name:] Head -[^labels]-> Dep, or Head -> Dep
fn parse_relation(pair: Pair<Rule>) -> Result<RelationClause, QueryError> {
    let mut inner = pair.into_inner().peekable();

    let name = match inner.peek().map(|p| p.as_rule()) {
        Some(Rule::relation_name) => inner.next().map(|p| p.as_str().to_string()),
        _ => None,
    };
    let head = inner
        .next()
        .ok_or(QueryError::Malformed("relation head"))?
        .as_str()
        .to_string();
    let arrow = inner.next().ok_or(QueryError::Malformed("relation arrow"))?;
    let dep = inner
        .next()
        .ok_or(QueryError::Malformed("relation dependent"))?
        .as_str()
        .to_string();

    let mut labels = Vec::new();
    let mut negated = false;
    let kind = next(&mut arrow.into_inner(), "arrow")?;
    if kind.as_rule() == Rule::labeled_arrow {
        for part in kind.into_inner() {
            match part.as_rule() {
                Rule::negation => negated = true,
                Rule::label_list => labels.extend(part.into_inner().map(|l| l.as_str().to_string())),
                _ => {}
            }
        }
    }

    Ok(RelationClause {
        name,
        head,
        dep,
        labels,
        negated,
    })
}

/// Parse an order constraint: A << B, A < B, A >> B, A > B
fn parse_order(pair: Pair<Rule>) -> Result<OrderClause, QueryError> {
    let mut inner = pair.into_inner();
    let left = next(&mut inner, "order operand")?.as_str().to_string();
    let op = OrderOp::from_symbol(next(&mut inner, "order operator")?.as_str())
        .ok_or(QueryError::Malformed("order operator"))?;
    let right = next(&mut inner, "order operand")?.as_str().to_string();

    Ok(OrderClause { left, right, op })
}
