//! CoNLL-U file parsing and writing
//!
//! Parses CoNLL-U (and CoNLL-U Plus) text into [`Sentence`] values and
//! writes them back through `Display`. Multiword tokens, empty nodes,
//! enhanced dependencies and sentence metadata are all kept.
//!
//! CoNLL-U format: https://universaldependencies.org/format.html

use crate::tree::{EMPTY, EnhancedDep, Features, Misc, MiscValue, Sentence, Token, TokenId};
use atoi::FromRadix10Checked;
use memchr::memchr_iter;
use std::fmt;
use std::fs::File;
use std::io::{self, BufRead, BufReader, Cursor, Lines};
use std::path::Path;
use thiserror::Error;

/// Error during CoNLL-U parsing
#[derive(Debug, Error)]
#[error("Parse error at line {line_num}: {message}")]
pub struct ParseError {
    pub line_num: usize,
    pub message: String,
}

impl ParseError {
    fn new(line_num: usize, message: impl Into<String>) -> Self {
        Self {
            line_num,
            message: message.into(),
        }
    }
}

/// CoNLL-U reader that iterates over sentences
///
/// A malformed sentence yields an `Err` and reading resumes at the next
/// sentence.
pub struct CoNLLUReader<R: BufRead> {
    lines: Lines<R>,
    line_num: usize,
    done: bool,
}

impl<R: BufRead> CoNLLUReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            lines: reader.lines(),
            line_num: 0,
            done: false,
        }
    }
}

impl CoNLLUReader<Box<dyn BufRead>> {
    /// Create a reader from a file path
    ///
    /// With the `gzip` feature, `*.gz` files are decompressed on the fly.
    pub fn from_file(path: &Path) -> io::Result<Self> {
        let file = File::open(path)?;

        #[cfg(feature = "gzip")]
        if path.extension().is_some_and(|ext| ext == "gz") {
            let decoder = flate2::read::MultiGzDecoder::new(file);
            return Ok(Self::new(Box::new(BufReader::new(decoder))));
        }

        Ok(Self::new(Box::new(BufReader::new(file))))
    }
}

impl CoNLLUReader<Cursor<String>> {
    /// Create a reader from a string
    pub fn from_str(text: &str) -> Self {
        Self::new(Cursor::new(text.to_string()))
    }
}

/// Parse a single sentence from CoNLL-U text
pub fn parse_sentence(text: &str) -> Result<Sentence, ParseError> {
    CoNLLUReader::from_str(text)
        .next()
        .unwrap_or_else(|| Err(ParseError::new(0, "no sentence found")))
}

impl<R: BufRead> Iterator for CoNLLUReader<R> {
    type Item = Result<Sentence, ParseError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let mut sentence = Sentence::new();
        let mut has_content = false;
        let mut error = None;

        // Read lines until we hit a blank line (sentence boundary) or EOF
        loop {
            let line = match self.lines.next() {
                None => {
                    self.done = true;
                    break;
                }
                Some(Err(e)) => {
                    self.done = true;
                    return Some(Err(ParseError::new(self.line_num + 1, format!("IO error: {}", e))));
                }
                Some(Ok(line)) => line,
            };
            self.line_num += 1;

            let line = line.trim_end_matches(['\r', '\n']);
            if line.trim().is_empty() {
                if has_content {
                    break;
                }
                continue;
            }
            has_content = true;

            // keep consuming the sentence after an error so the next call
            // starts at the following one
            if error.is_some() {
                continue;
            }
            if let Some(comment) = line.strip_prefix('#') {
                parse_comment(comment, &mut sentence);
            } else {
                match parse_line(line, self.line_num) {
                    Ok(token) => sentence.push(token),
                    Err(e) => error = Some(e),
                }
            }
        }

        if !has_content {
            return None;
        }
        Some(match error {
            Some(e) => Err(e),
            None => Ok(sentence),
        })
    }
}

/// Parse a comment line (without the leading #)
fn parse_comment(comment: &str, sentence: &mut Sentence) {
    let comment = comment.trim();
    let (key, value) = match comment.split_once('=') {
        Some((key, value)) => (key.trim(), Some(value.trim())),
        None => (comment, None),
    };

    match (key, value) {
        ("sent_id", Some(value)) => sentence.sent_id = Some(value.to_string()),
        ("text", Some(value)) => sentence.text = Some(value.to_string()),
        ("newdoc", _) | ("newdoc id", _) => sentence.newdoc = Some(value.unwrap_or("").to_string()),
        ("newpar", _) | ("newpar id", _) => sentence.newpar = Some(value.unwrap_or("").to_string()),
        _ => sentence.comments.push(comment.to_string()),
    }
}

/// Split a line into tab-separated columns
fn split_columns(line: &str) -> Vec<&str> {
    let mut columns = Vec::with_capacity(10);
    let mut start = 0;
    for tab in memchr_iter(b'\t', line.as_bytes()) {
        columns.push(&line[start..tab]);
        start = tab + 1;
    }
    columns.push(&line[start..]);
    columns
}

/// Parse a single CoNLL-U token line
fn parse_line(line: &str, line_num: usize) -> Result<Token, ParseError> {
    let fields = split_columns(line);
    if fields.len() < 10 {
        return Err(ParseError::new(
            line_num,
            format!("Expected at least 10 fields, found {}", fields.len()),
        ));
    }
    let err = |message: String| ParseError::new(line_num, message);

    let id = parse_id(fields[0]).ok_or_else(|| err(format!("Invalid ID: {}", fields[0])))?;
    let mut token = Token::blank(id);
    token.form = fields[1].to_string();
    token.lemma = fields[2].to_string();
    token.upos = fields[3].to_string();
    token.xpos = fields[4].to_string();
    token.feats = parse_features(fields[5]).ok_or_else(|| err(format!("Invalid FEATS: {}", fields[5])))?;
    token.head = match fields[6] {
        EMPTY => None,
        s => Some(parse_number(s).ok_or_else(|| err(format!("Invalid HEAD: {}", s)))?),
    };
    token.deprel = fields[7].to_string();
    for dep in parse_deps(fields[8]).ok_or_else(|| err(format!("Invalid DEPS: {}", fields[8])))? {
        token.add_enhanced_dep(dep);
    }
    token.misc = parse_misc(fields[9]);
    token.extra = fields[10..].iter().map(|s| s.to_string()).collect();

    if let (TokenId::Single(n), Some(head)) = (id, token.head) {
        if head == n {
            return Err(err(format!("Token {} is its own head", n)));
        }
    }
    Ok(token)
}

/// Parse an unsigned decimal number, rejecting empty input and trailing bytes
fn parse_number(s: &str) -> Option<usize> {
    let (n, used) = usize::from_radix_10_checked(s.as_bytes());
    if used == 0 || used != s.len() {
        return None;
    }
    n
}

/// Parse ID field (can be integer, range, or decimal)
fn parse_id(s: &str) -> Option<TokenId> {
    if let Some((start, end)) = s.split_once('-') {
        Some(TokenId::Range(parse_number(start)?, parse_number(end)?))
    } else if let Some((main, sub)) = s.split_once('.') {
        Some(TokenId::Decimal(parse_number(main)?, parse_number(sub)?))
    } else {
        let id = parse_number(s)?;
        (id > 0).then_some(TokenId::Single(id))
    }
}

/// Parse FEATS field (key=value|key=value)
fn parse_features(s: &str) -> Option<Features> {
    let mut feats = Features::new();
    if s == EMPTY {
        return Some(feats);
    }
    for pair in s.split('|') {
        let (key, value) = pair.split_once('=')?;
        if key.is_empty() {
            return None;
        }
        feats.insert(key, value);
    }
    Some(feats)
}

/// Parse DEPS field (head:deprel|head.sub:deprel)
fn parse_deps(s: &str) -> Option<Vec<EnhancedDep>> {
    if s == EMPTY {
        return Some(Vec::new());
    }
    s.split('|')
        .map(|pair| {
            let (head, deprel) = pair.split_once(':')?;
            match head.split_once('.') {
                Some((main, sub)) => Some(EnhancedDep::new(parse_number(main)?, Some(parse_number(sub)?), deprel)),
                None => Some(EnhancedDep::new(parse_number(head)?, None, deprel)),
            }
        })
        .collect()
}

/// Parse MISC field (key=value|key|key=value)
fn parse_misc(s: &str) -> Misc {
    let mut misc = Misc::new();
    if s == EMPTY {
        return misc;
    }
    for pair in s.split('|') {
        let (key, value) = match pair.split_once('=') {
            // only canonical numbers, so writing gives back the same text
            Some((key, value)) => match value.parse::<u64>() {
                Ok(n) if n.to_string() == value => (key, MiscValue::Number(n)),
                _ => (key, MiscValue::Text(value.to_string())),
            },
            None => (pair, MiscValue::Flag),
        };
        misc.insert(key.to_string(), value);
    }
    misc
}

fn write_column(f: &mut fmt::Formatter<'_>, items: impl Iterator<Item = String>) -> fmt::Result {
    let mut empty = true;
    for (i, item) in items.enumerate() {
        if i > 0 {
            f.write_str("|")?;
        }
        f.write_str(&item)?;
        empty = false;
    }
    if empty {
        f.write_str(EMPTY)?;
    }
    Ok(())
}

impl fmt::Display for Token {
    /// One CoNLL-U line, without the trailing newline
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}\t{}\t{}\t{}\t{}\t{}\t",
            self.id, self.form, self.lemma, self.upos, self.xpos, self.feats
        )?;
        match self.head {
            Some(head) => write!(f, "{}", head)?,
            None => f.write_str(EMPTY)?,
        }
        write!(f, "\t{}\t", self.deprel)?;

        let mut deps: Vec<&EnhancedDep> = self.deps.iter().collect();
        deps.sort_by_key(|d| (d.head, d.head_subid));
        write_column(f, deps.iter().map(|d| d.to_string()))?;
        f.write_str("\t")?;

        write_column(
            f,
            self.misc.iter().map(|(key, value)| match value {
                MiscValue::Flag => key.clone(),
                _ => format!("{}={}", key, value),
            }),
        )?;

        for column in &self.extra {
            write!(f, "\t{}", column)?;
        }
        Ok(())
    }
}

impl fmt::Display for Sentence {
    /// The sentence as a CoNLL-U block, terminated by a blank line
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (key, value) in [("newdoc", &self.newdoc), ("newpar", &self.newpar)] {
            match value.as_deref() {
                Some("") => writeln!(f, "# {}", key)?,
                Some(id) => writeln!(f, "# {} id = {}", key, id)?,
                None => {}
            }
        }
        if let Some(sent_id) = &self.sent_id {
            writeln!(f, "# sent_id = {}", sent_id)?;
        }
        if let Some(text) = &self.text {
            writeln!(f, "# text = {}", text)?;
        }
        for comment in &self.comments {
            writeln!(f, "# {}", comment)?;
        }

        for empty in self.empty_tokens.get(&0).into_iter().flatten() {
            writeln!(f, "{}", empty)?;
        }
        for token in &self.tokens {
            if let Some(mwt) = self.multiword_tokens.get(&token.id()) {
                writeln!(f, "{}", mwt)?;
            }
            writeln!(f, "{}", token)?;
            for empty in self.empty_tokens.get(&token.id()).into_iter().flatten() {
                writeln!(f, "{}", empty)?;
            }
        }
        writeln!(f)
    }
}
