//! Sentence data structures with full CoNLL-U support
//!
//! A [`Sentence`] owns its regular tokens in an arena (`Vec<Token>`), plus
//! side maps for multiword ranges and empty nodes. Head/dependent links are
//! stored as indices into the arena and are only meaningful after
//! [`Sentence::build_tree`] has succeeded.

use indexmap::IndexMap;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

/// Reserved "empty column" value
pub const EMPTY: &str = "_";

/// Index of a regular token in the sentence arena
pub type NodeId = usize;

/// Identity of a token as written in the ID column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TokenId {
    /// Regular word: `3`
    Single(usize),
    /// Multiword range: `3-4`
    Range(usize, usize),
    /// Empty node: `3.1`
    Decimal(usize, usize),
}

impl TokenId {
    /// The part before `-` or `.`
    pub fn main(&self) -> usize {
        match *self {
            TokenId::Single(id) | TokenId::Range(id, _) | TokenId::Decimal(id, _) => id,
        }
    }

    /// The part after `-` or `.`, if any
    pub fn subid(&self) -> Option<usize> {
        match *self {
            TokenId::Single(_) => None,
            TokenId::Range(_, sub) | TokenId::Decimal(_, sub) => Some(sub),
        }
    }

    pub fn kind(&self) -> TokenKind {
        match self {
            TokenId::Single(_) => TokenKind::Regular,
            TokenId::Range(..) => TokenKind::MultiwordRange,
            TokenId::Decimal(..) => TokenKind::Empty,
        }
    }

    fn with_main(self, main: usize) -> Self {
        match self {
            TokenId::Single(_) => TokenId::Single(main),
            TokenId::Range(_, end) => TokenId::Range(main, end),
            TokenId::Decimal(_, sub) => TokenId::Decimal(main, sub),
        }
    }
}

impl fmt::Display for TokenId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenId::Single(id) => write!(f, "{}", id),
            TokenId::Range(start, end) => write!(f, "{}-{}", start, end),
            TokenId::Decimal(id, sub) => write!(f, "{}.{}", id, sub),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Regular,
    MultiwordRange,
    Empty,
}

/// Compare feature names the way UD orders them: case-insensitively
fn cmp_ignore_case(a: &str, b: &str) -> Ordering {
    a.chars()
        .flat_map(char::to_lowercase)
        .cmp(b.chars().flat_map(char::to_lowercase))
}

/// Morphological features (FEATS column)
///
/// Keys are compared case-insensitively and kept sorted, so iteration and
/// serialization follow UD's alphabetical order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Features(Vec<(String, String)>);

impl Features {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    fn find(&self, key: &str) -> Result<usize, usize> {
        self.0.binary_search_by(|(k, _)| cmp_ignore_case(k, key))
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.find(key).ok().map(|i| self.0[i].1.as_str())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.find(key).is_ok()
    }

    /// Insert or replace a feature, returning the previous value
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) -> Option<String> {
        let key = key.into();
        let value = value.into();
        match self.find(&key) {
            Ok(i) => Some(std::mem::replace(&mut self.0[i].1, value)),
            Err(i) => {
                self.0.insert(i, (key, value));
                None
            }
        }
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.find(key).ok().map(|i| self.0.remove(i).1)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for Features {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return f.write_str(EMPTY);
        }
        for (i, (k, v)) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("|")?;
            }
            write!(f, "{}={}", k, v)?;
        }
        Ok(())
    }
}

/// Value of a MISC entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MiscValue {
    Number(u64),
    Text(String),
    /// Bare key without `=`
    Flag,
}

impl fmt::Display for MiscValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MiscValue::Number(n) => write!(f, "{}", n),
            MiscValue::Text(s) => f.write_str(s),
            MiscValue::Flag => Ok(()),
        }
    }
}

/// MISC column, in insertion order
pub type Misc = IndexMap<String, MiscValue>;

/// Reference to any token that can carry an enhanced dependency
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenRef {
    /// Regular token (arena index)
    Word(NodeId),
    /// Empty node: anchor id and index in that anchor's list
    Empty { anchor: usize, index: usize },
}

/// One edge of the enhanced graph (DEPS column)
///
/// Equality and hashing ignore the resolved `headword`.
#[derive(Debug, Clone)]
pub struct EnhancedDep {
    pub head: usize,
    pub head_subid: Option<usize>,
    pub deprel: String,
    /// Filled by the tree builder; stays `None` for the root and for
    /// references to tokens that do not exist
    pub headword: Option<TokenRef>,
}

impl EnhancedDep {
    pub fn new(head: usize, head_subid: Option<usize>, deprel: &str) -> Self {
        Self {
            head,
            head_subid,
            deprel: deprel.to_string(),
            headword: None,
        }
    }

    pub fn head_id(&self) -> TokenId {
        match self.head_subid {
            Some(sub) => TokenId::Decimal(self.head, sub),
            None => TokenId::Single(self.head),
        }
    }
}

impl PartialEq for EnhancedDep {
    fn eq(&self, other: &Self) -> bool {
        self.head == other.head && self.head_subid == other.head_subid && self.deprel == other.deprel
    }
}

impl Eq for EnhancedDep {}

impl std::hash::Hash for EnhancedDep {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.head.hash(state);
        self.head_subid.hash(state);
        self.deprel.hash(state);
    }
}

impl fmt::Display for EnhancedDep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.head_id(), self.deprel)
    }
}

/// A token: regular word, multiword range or empty node
#[derive(Debug, Clone)]
pub struct Token {
    pub id: TokenId,
    pub form: String,
    pub lemma: String,
    pub upos: String,
    pub xpos: String,
    pub feats: Features,
    /// `Some(0)` marks the sentence root, `None` an unspecified head
    pub head: Option<usize>,
    pub deprel: String,
    pub deps: Vec<EnhancedDep>,
    pub misc: Misc,
    /// CoNLL-U Plus columns after MISC, verbatim
    pub extra: Vec<String>,

    // Derived by the tree builder
    pub position: usize,
    pub head_token: Option<NodeId>,
    pub dependents: Vec<NodeId>,
    pub dependents_by_id: BTreeMap<usize, NodeId>,
}

impl Token {
    /// Create a regular token attached to `head` (0 for the root)
    pub fn new(id: usize, form: &str, lemma: &str, upos: &str, head: usize, deprel: &str) -> Self {
        Self {
            id: TokenId::Single(id),
            form: form.to_string(),
            lemma: lemma.to_string(),
            upos: upos.to_string(),
            xpos: EMPTY.to_string(),
            feats: Features::new(),
            head: Some(head),
            deprel: deprel.to_string(),
            deps: Vec::new(),
            misc: Misc::new(),
            extra: Vec::new(),
            position: 0,
            head_token: None,
            dependents: Vec::new(),
            dependents_by_id: BTreeMap::new(),
        }
    }

    /// Create a multiword range token spanning `start..=end`
    pub fn multiword(start: usize, end: usize, form: &str) -> Self {
        let mut token = Self::blank(TokenId::Range(start, end));
        token.form = form.to_string();
        token
    }

    /// Create an empty node `anchor.sub`
    pub fn empty(anchor: usize, sub: usize, form: &str, lemma: &str) -> Self {
        let mut token = Self::blank(TokenId::Decimal(anchor, sub));
        token.form = form.to_string();
        token.lemma = lemma.to_string();
        token
    }

    /// A token with every column set to `_` and no head
    pub fn blank(id: TokenId) -> Self {
        let mut token = Self::new(0, EMPTY, EMPTY, EMPTY, 0, EMPTY);
        token.id = id;
        token.head = None;
        token
    }

    pub fn kind(&self) -> TokenKind {
        self.id.kind()
    }

    /// Main numeric id (the part before `-` or `.`)
    pub fn id(&self) -> usize {
        self.id.main()
    }

    pub fn is_root(&self) -> bool {
        self.head == Some(0)
    }

    /// Whether the feature is present, and if `value` is given, has that value
    pub fn has_feature(&self, name: &str, value: Option<&str>) -> bool {
        match (self.feats.get(name), value) {
            (Some(_), None) => true,
            (Some(v), Some(want)) => v == want,
            (None, _) => false,
        }
    }

    /// Add an enhanced dependency unless an equal one is already present
    pub fn add_enhanced_dep(&mut self, dep: EnhancedDep) -> bool {
        if self.deps.contains(&dep) {
            return false;
        }
        self.deps.push(dep);
        true
    }

    /// Remove the enhanced dependency on the given head, if any
    pub fn remove_enhanced_dep(&mut self, head: TokenId) -> bool {
        let before = self.deps.len();
        self.deps.retain(|d| d.head_id() != head);
        self.deps.len() != before
    }

    /// Whitespace following this token in the running text
    pub fn spaces_after(&self) -> String {
        match self.misc.get("SpacesAfter") {
            Some(MiscValue::Text(s)) => s.replace("\\s", " ").replace("\\t", "\t").replace("\\n", "\n"),
            _ => match self.misc.get("SpaceAfter") {
                Some(MiscValue::Text(s)) if s == "No" => String::new(),
                _ => " ".to_string(),
            },
        }
    }

    pub(crate) fn clear_derived(&mut self) {
        self.position = 0;
        self.head_token = None;
        self.dependents.clear();
        self.dependents_by_id.clear();
        for dep in &mut self.deps {
            dep.headword = None;
        }
    }
}

/// One annotated sentence
///
/// Regular tokens live in `tokens` (id `n` at index `n - 1` once the sentence
/// is normalised); multiword ranges are keyed by their start id and empty
/// nodes by the id of the word they follow (0 = sentence-initial).
#[derive(Debug, Clone, Default)]
pub struct Sentence {
    pub(crate) tokens: Vec<Token>,
    pub(crate) empty_tokens: BTreeMap<usize, Vec<Token>>,
    pub(crate) multiword_tokens: BTreeMap<usize, Token>,

    pub comments: Vec<String>,
    pub sent_id: Option<String>,
    pub newdoc: Option<String>,
    pub newpar: Option<String>,
    pub text: Option<String>,

    pub(crate) root: Option<NodeId>,
    pub(crate) roots: Vec<NodeId>,
    pub(crate) max_head_distance: usize,
    pub(crate) built: bool,
}

impl Sentence {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a sentence from tokens of any kind, routing each to its map
    pub fn from_tokens(tokens: impl IntoIterator<Item = Token>) -> Self {
        let mut sentence = Self::new();
        for token in tokens {
            sentence.push(token);
        }
        sentence
    }

    /// Append a token; derived tree state is invalidated
    pub fn push(&mut self, token: Token) {
        self.built = false;
        match token.id {
            TokenId::Single(_) => self.tokens.push(token),
            TokenId::Range(start, _) => {
                self.multiword_tokens.insert(start, token);
            }
            TokenId::Decimal(anchor, _) => self.empty_tokens.entry(anchor).or_default().push(token),
        }
    }

    /// Number of regular tokens
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }

    pub fn empty_tokens(&self) -> &BTreeMap<usize, Vec<Token>> {
        &self.empty_tokens
    }

    pub fn multiword_tokens(&self) -> &BTreeMap<usize, Token> {
        &self.multiword_tokens
    }

    pub fn empty_token_count(&self) -> usize {
        self.empty_tokens.values().map(Vec::len).sum()
    }

    /// Whether derived tree fields are current
    pub fn is_built(&self) -> bool {
        self.built
    }

    /// Arena index of the regular token with the given id
    pub fn node_id(&self, id: usize) -> Option<NodeId> {
        match self.tokens.get(id.wrapping_sub(1)) {
            Some(t) if t.id() == id => Some(id - 1),
            _ => self.tokens.iter().position(|t| t.id() == id),
        }
    }

    /// Regular token by its id
    pub fn token(&self, id: usize) -> Option<&Token> {
        self.node_id(id).map(|n| &self.tokens[n])
    }

    /// Mutable regular token by its id; derived tree state is invalidated
    pub fn token_mut(&mut self, id: usize) -> Option<&mut Token> {
        let n = self.node_id(id)?;
        self.built = false;
        Some(&mut self.tokens[n])
    }

    /// Regular token by arena index
    pub fn node(&self, node: NodeId) -> &Token {
        &self.tokens[node]
    }

    pub fn resolve(&self, token_ref: TokenRef) -> Option<&Token> {
        match token_ref {
            TokenRef::Word(n) => self.tokens.get(n),
            TokenRef::Empty { anchor, index } => self.empty_tokens.get(&anchor)?.get(index),
        }
    }

    /// Designated root: the first token with head 0
    pub fn root(&self) -> Option<&Token> {
        self.root.map(|n| &self.tokens[n])
    }

    /// Every token with head 0, in id order
    pub fn roots(&self) -> impl Iterator<Item = &Token> {
        self.roots.iter().map(|&n| &self.tokens[n])
    }

    /// Largest `|id - head|` over attached tokens
    pub fn max_head_distance(&self) -> usize {
        self.max_head_distance
    }

    pub fn head_of(&self, node: NodeId) -> Option<&Token> {
        self.tokens[node].head_token.map(|h| &self.tokens[h])
    }

    pub fn dependents(&self, node: NodeId) -> impl Iterator<Item = &Token> {
        self.tokens[node].dependents.iter().map(|&d| &self.tokens[d])
    }

    pub fn dependents_with_label<'a>(
        &'a self,
        node: NodeId,
        deprel: &'a str,
    ) -> impl Iterator<Item = &'a Token> + 'a {
        self.dependents(node).filter(move |t| t.deprel == deprel)
    }

    /// Whether `dep` is a direct or indirect dependent of `head`
    pub fn commands(&self, head: NodeId, dep: NodeId) -> bool {
        self.ancestors(dep).contains(&head)
    }

    /// Heads above `node`, nearest first; stops at the root or on a repeat
    pub fn ancestors(&self, node: NodeId) -> Vec<NodeId> {
        let mut chain = Vec::new();
        let mut current = self.tokens[node].head_token;
        while let Some(h) = current {
            if h == node || chain.contains(&h) || chain.len() > self.tokens.len() {
                break;
            }
            chain.push(h);
            current = self.tokens[h].head_token;
        }
        chain
    }

    /// Number of edges between `node` and a root, `None` if unattached
    pub fn depth(&self, node: NodeId) -> Option<usize> {
        let ancestors = self.ancestors(node);
        let top = ancestors.last().copied().unwrap_or(node);
        self.tokens[top].is_root().then_some(ancestors.len())
    }

    /// `node` followed by all its dependents, depth first
    pub fn subtree(&self, node: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![node];
        while let Some(n) = stack.pop() {
            if out.contains(&n) {
                continue;
            }
            out.push(n);
            stack.extend(self.tokens[n].dependents.iter().rev());
        }
        out
    }

    /// Renumber regular tokens densely from `first`
    ///
    /// Heads, enhanced heads, multiword ranges and empty-node anchors are
    /// remapped. References to ids that do not exist are left untouched.
    pub fn normalise(&mut self, first: usize) {
        let mapping: BTreeMap<usize, usize> = self
            .tokens
            .iter()
            .enumerate()
            .map(|(i, t)| (t.id(), first + i))
            .collect();
        let remap = |id: usize| if id == 0 { 0 } else { mapping.get(&id).copied().unwrap_or(id) };

        for token in &mut self.tokens {
            token.id = TokenId::Single(remap(token.id()));
            if let Some(h) = token.head {
                token.head = Some(remap(h));
            }
            for dep in &mut token.deps {
                dep.head = remap(dep.head);
            }
        }

        let multiwords = std::mem::take(&mut self.multiword_tokens);
        for (_, mut token) in multiwords {
            if let TokenId::Range(start, end) = token.id {
                token.id = TokenId::Range(remap(start), remap(end));
            }
            self.multiword_tokens.insert(token.id(), token);
        }

        let empties = std::mem::take(&mut self.empty_tokens);
        for (anchor, mut list) in empties {
            let anchor = remap(anchor);
            for token in &mut list {
                token.id = token.id.with_main(anchor);
                for dep in &mut token.deps {
                    dep.head = remap(dep.head);
                }
            }
            self.empty_tokens.entry(anchor).or_default().extend(list);
        }

        self.built = false;
    }

    /// Surface text, using multiword forms and MISC spacing
    pub fn surface_text(&self) -> String {
        let mut out = String::new();
        let mut covered_until = 0;
        for token in &self.tokens {
            let id = token.id();
            if let Some(mwt) = self.multiword_tokens.get(&id) {
                out.push_str(&mwt.form);
                out.push_str(&mwt.spaces_after());
                covered_until = mwt.id.subid().unwrap_or(id);
            } else if id > covered_until {
                out.push_str(&token.form);
                out.push_str(&token.spaces_after());
            }
        }
        out.truncate(out.trim_end().len());
        out
    }
}
