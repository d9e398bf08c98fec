//! Treematch: dependency trees and Grew-style pattern matching
//!
//! Reads CoNLL-U sentences, builds and validates their dependency trees,
//! and finds every binding of a graph pattern (nodes with feature
//! conditions, labeled relations, linear order, `without` blocks) to the
//! tokens of a sentence.
//!
//! ```
//! use treematch::{compile_query, parse_sentence, search};
//!
//! let mut sentence = parse_sentence(
//!     "1\tdogs\tdog\tNOUN\t_\t_\t2\tnsubj\t_\t_\n\
//!      2\tbark\tbark\tVERB\t_\t_\t0\troot\t_\t_\n",
//! )
//! .unwrap();
//! sentence.build_tree().unwrap();
//!
//! let pattern = compile_query("pattern { V [upos=VERB]; N [upos=NOUN]; V -[nsubj]-> N }").unwrap();
//! let matches = search(&sentence, &pattern);
//! assert_eq!(matches.len(), 1);
//! assert_eq!(sentence.node(matches[0].get("N").unwrap()).form, "dogs");
//! ```

pub mod ast; // Syntax tree of Grew requests
pub mod build; // Tree construction and validation
pub mod conllu; // CoNLL-U file parsing and writing
pub mod iterators; // Corpus-level iteration
pub mod pattern; // Compiled patterns
pub mod query; // Query language parser
pub mod searcher; // Pattern matching
pub mod tree; // Sentence data structures with full CoNLL-U support

// Re-exports for convenience
pub use ast::Request;
pub use build::TreeError;
pub use conllu::{CoNLLUReader, ParseError, parse_sentence};
pub use iterators::{MatchSet, Treebank};
pub use pattern::{FeatureKey, Pattern, PatternError};
pub use query::{QueryError, compile_query, parse_request};
pub use searcher::{Match, search, search_query};
pub use tree::{EnhancedDep, Features, NodeId, Sentence, Token, TokenId, TokenKind};
