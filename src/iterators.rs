//! Iterators for sentences and matches
//!
//! Provides convenient collection interfaces for:
//! - Iterating over built sentences from a string, file, or glob pattern
//! - Searching patterns across those sentences
//!
//! Sentences that fail to parse or do not form a valid tree are logged with
//! `log::warn!` and skipped; they never stop the rest of the corpus.

use crate::conllu::{CoNLLUReader, ParseError};
use crate::pattern::Pattern;
use crate::searcher::{Match, search};
use crate::tree::Sentence;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Source of sentences for a collection
#[derive(Debug, Clone)]
enum SentenceSource {
    /// In-memory CoNLL-U text
    String(Arc<str>),
    /// Single file path
    File(PathBuf),
    /// Multiple file paths (from glob or explicit paths)
    Files(Vec<PathBuf>),
}

/// Collection of sentences from a string, file, or glob pattern
///
/// Every sentence yielded has a built tree.
///
/// # Examples
///
/// ```no_run
/// use treematch::Treebank;
///
/// let treebank = Treebank::from_file("data.conllu");
/// for sentence in &treebank {
///     println!("{} tokens, root {:?}", sentence.len(), sentence.root().map(|t| &t.form));
/// }
/// ```
#[derive(Debug, Clone)]
pub struct Treebank {
    source: SentenceSource,
}

impl Treebank {
    /// Create from an in-memory CoNLL-U string
    pub fn from_string(text: &str) -> Self {
        Self {
            source: SentenceSource::String(Arc::from(text)),
        }
    }

    /// Create from a single file path
    pub fn from_file(path: impl AsRef<Path>) -> Self {
        Self {
            source: SentenceSource::File(path.as_ref().to_path_buf()),
        }
    }

    /// Create from a glob pattern
    ///
    /// Files are processed in sorted order for deterministic results.
    pub fn from_glob(pattern: &str) -> Result<Self, glob::PatternError> {
        let mut file_paths: Vec<PathBuf> = glob::glob(pattern)?.filter_map(Result::ok).collect();
        file_paths.sort();
        Ok(Self::from_paths(file_paths))
    }

    /// Create from explicit file paths
    pub fn from_paths(file_paths: Vec<PathBuf>) -> Self {
        Self {
            source: SentenceSource::Files(file_paths),
        }
    }

    pub fn iter(&self) -> Box<dyn Iterator<Item = Arc<Sentence>>> {
        self.clone().into_iter()
    }
}

impl IntoIterator for Treebank {
    type Item = Arc<Sentence>;
    type IntoIter = Box<dyn Iterator<Item = Self::Item>>;

    fn into_iter(self) -> Self::IntoIter {
        match self.source {
            SentenceSource::String(text) => {
                let reader = CoNLLUReader::from_str(&text);
                Box::new(built_sentences(reader, "<string>".to_string()))
            }
            SentenceSource::File(path) => open_file_sentences(path),
            SentenceSource::Files(paths) => Box::new(paths.into_iter().flat_map(open_file_sentences)),
        }
    }
}

impl IntoIterator for &Treebank {
    type Item = Arc<Sentence>;
    type IntoIter = Box<dyn Iterator<Item = Arc<Sentence>>>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Collection of matches from a Treebank and pattern
///
/// Applies a pattern to every sentence and yields all matches found,
/// paired with the sentence they were found in.
///
/// # Examples
///
/// ```no_run
/// use treematch::{MatchSet, Treebank, compile_query};
///
/// let pattern = compile_query("pattern { V [upos=VERB]; N [upos=NOUN]; V -[obj]-> N }").unwrap();
/// let treebank = Treebank::from_glob("data/*.conllu").unwrap();
/// for (sentence, m) in MatchSet::new(&treebank, &pattern) {
///     let verb = sentence.node(m.get("V").unwrap());
///     println!("{}: {}", sentence.sent_id.as_deref().unwrap_or("?"), verb.form);
/// }
/// ```
#[derive(Debug, Clone)]
pub struct MatchSet {
    treebank: Treebank,
    pattern: Arc<Pattern>,
}

impl MatchSet {
    /// Create from a Treebank and pattern
    pub fn new(treebank: &Treebank, pattern: &Pattern) -> Self {
        Self {
            treebank: treebank.clone(),
            pattern: Arc::new(pattern.clone()),
        }
    }

    pub fn iter(&self) -> Box<dyn Iterator<Item = (Arc<Sentence>, Match)>> {
        self.clone().into_iter()
    }
}

impl IntoIterator for MatchSet {
    type Item = (Arc<Sentence>, Match);
    type IntoIter = Box<dyn Iterator<Item = Self::Item>>;

    fn into_iter(self) -> Self::IntoIter {
        let pattern = self.pattern;
        let iter = self.treebank.into_iter().flat_map(move |sentence| {
            let matches = search(&sentence, &pattern);
            matches.into_iter().map(move |m| (sentence.clone(), m))
        });
        Box::new(iter)
    }
}

/// Parse and build every sentence, logging and dropping the broken ones
fn built_sentences(
    reader: impl Iterator<Item = Result<Sentence, ParseError>>,
    origin: String,
) -> impl Iterator<Item = Arc<Sentence>> {
    reader.filter_map(move |result| {
        let mut sentence = match result {
            Ok(sentence) => sentence,
            Err(e) => {
                log::warn!("{}: {}", origin, e);
                return None;
            }
        };
        match sentence.build_tree() {
            Ok(()) => Some(Arc::new(sentence)),
            Err(e) => {
                log::warn!(
                    "{}: skipping sentence {}: {}",
                    origin,
                    sentence.sent_id.as_deref().unwrap_or("<unnamed>"),
                    e
                );
                None
            }
        }
    })
}

/// Helper: Open a file and return an iterator over its built sentences
///
/// Logs file open errors and returns an empty iterator on error.
fn open_file_sentences(path: PathBuf) -> Box<dyn Iterator<Item = Arc<Sentence>>> {
    match CoNLLUReader::from_file(&path) {
        Ok(reader) => Box::new(built_sentences(reader, path.display().to_string())),
        Err(e) => {
            log::warn!("Failed to open {:?}: {}", path, e);
            Box::new(std::iter::empty())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::compile_query;
    use indoc::indoc;

    const TWO_SENTENCES: &str = indoc! {"
        # text = The dog runs.
        1\tThe\tthe\tDET\tDT\t_\t2\tdet\t_\t_
        2\tdog\tdog\tNOUN\tNN\t_\t3\tnsubj\t_\t_
        3\truns\trun\tVERB\tVBZ\t_\t0\troot\t_\t_

        # text = Cats sleep.
        1\tCats\tcat\tNOUN\tNNS\t_\t2\tnsubj\t_\t_
        2\tsleep\tsleep\tVERB\tVBP\t_\t0\troot\t_\t_

    "};

    const THREE_VERBS: &str = indoc! {"
        1\thelped\thelp\tVERB\tVBD\t_\t0\troot\t_\t_
        2\tus\twe\tPRON\tPRP\t_\t1\tobj\t_\t_

        1\tran\trun\tVERB\tVBD\t_\t0\troot\t_\t_
        2\tquickly\tquickly\tADV\tRB\t_\t1\tadvmod\t_\t_

        1\tsleeps\tsleep\tVERB\tVBZ\t_\t0\troot\t_\t_

    "};

    #[test]
    fn test_treebank_from_string() {
        let sentences: Vec<_> = Treebank::from_string(TWO_SENTENCES).into_iter().collect();

        assert_eq!(sentences.len(), 2);
        assert_eq!(sentences[0].len(), 3);
        assert_eq!(sentences[1].len(), 2);
        assert!(sentences.iter().all(|s| s.is_built()));
        assert_eq!(sentences[1].root().unwrap().form, "sleep");
    }

    #[test]
    fn test_treebank_skips_broken_sentences() {
        let conllu = indoc! {"
            # sent_id = cycle
            1\ta\ta\tX\t_\t_\t2\tdep\t_\t_
            2\tb\tb\tX\t_\t_\t1\tdep\t_\t_

            # sent_id = range
            1\ta\ta\tX\t_\t_\t5\tdep\t_\t_

            # sent_id = syntax
            1\ta\ta\tX

            # sent_id = ok
            1\ta\ta\tX\t_\t_\t0\troot\t_\t_
        "};

        let sentences: Vec<_> = Treebank::from_string(conllu).iter().collect();
        assert_eq!(sentences.len(), 1);
        assert_eq!(sentences[0].sent_id.as_deref(), Some("ok"));
    }

    #[test]
    fn test_match_set_from_string() {
        let pattern = compile_query("pattern { V [upos=VERB] }").unwrap();
        let treebank = Treebank::from_string(THREE_VERBS);
        let matches: Vec<_> = MatchSet::new(&treebank, &pattern).into_iter().collect();

        assert_eq!(matches.len(), 3);
    }

    #[test]
    fn test_match_set_multiple_matches_per_sentence() {
        let conllu = "1\tsaw\tsee\tVERB\tVBD\t_\t0\troot\t_\t_\n\
                      2\tJohn\tJohn\tPROPN\tNNP\t_\t1\tobj\t_\t_\n\
                      3\trunning\trun\tVERB\tVBG\t_\t1\txcomp\t_\t_\n";

        let pattern = compile_query("pattern { V [upos=VERB] }").unwrap();
        let treebank = Treebank::from_string(conllu);
        let matches: Vec<_> = MatchSet::new(&treebank, &pattern).iter().collect();

        assert_eq!(matches.len(), 2);
        assert!(Arc::ptr_eq(&matches[0].0, &matches[1].0));
    }

    #[test]
    fn test_match_set_with_relation() {
        let conllu = "1\thelped\thelp\tVERB\tVBD\t_\t0\troot\t_\t_\n\
                      2\tus\twe\tPRON\tPRP\t_\t1\tobj\t_\t_\n\
                      3\tto\tto\tPART\tTO\t_\t4\tmark\t_\t_\n\
                      4\twin\twin\tVERB\tVB\t_\t1\txcomp\t_\t_\n";

        let pattern = compile_query("pattern { V1 [lemma=help]; V2 [lemma=win]; V1 -> V2 }").unwrap();
        let treebank = Treebank::from_string(conllu);
        let matches: Vec<_> = MatchSet::new(&treebank, &pattern).into_iter().collect();

        assert_eq!(matches.len(), 1);
        let (sentence, m) = &matches[0];
        assert_eq!(m.token_ids(sentence).collect::<Vec<_>>(), vec![("V1", 1), ("V2", 4)]);
    }

    #[test]
    fn test_match_set_without() {
        let pattern = compile_query("pattern { V [upos=VERB] } without { V -[obj]-> O }").unwrap();
        let treebank = Treebank::from_string(THREE_VERBS);
        let lemmas: Vec<_> = MatchSet::new(&treebank, &pattern)
            .into_iter()
            .map(|(s, m)| s.node(m.bindings[0]).lemma.clone())
            .collect();

        assert_eq!(lemmas, vec!["run", "sleep"]);
    }

    mod multi_file {
        use super::*;
        use std::fs;
        use std::io::Write;
        use tempfile::{TempDir, tempdir};

        /// Helper to create test files with given content
        fn create_test_files(contents: &[(&str, &str)]) -> (TempDir, Vec<PathBuf>) {
            let dir = tempdir().unwrap();
            let mut paths = Vec::new();

            for (filename, content) in contents {
                let path = dir.path().join(filename);
                let mut file = fs::File::create(&path).unwrap();
                write!(file, "{}", content).unwrap();
                paths.push(path);
            }

            (dir, paths)
        }

        #[test]
        fn test_treebank_from_paths() {
            let (_dir, paths) = create_test_files(&[
                (
                    "file1.conllu",
                    "1\tThe\tthe\tDET\tDT\t_\t2\tdet\t_\t_\n2\tdog\tdog\tNOUN\tNN\t_\t0\troot\t_\t_\n",
                ),
                (
                    "file2.conllu",
                    "1\tCats\tcat\tNOUN\tNNS\t_\t2\tnsubj\t_\t_\n2\tsleep\tsleep\tVERB\tVBP\t_\t0\troot\t_\t_\n",
                ),
            ]);

            let results: Vec<_> = Treebank::from_paths(paths).into_iter().collect();

            assert_eq!(results.len(), 2);
            assert_eq!(results[0].len(), 2);
            assert_eq!(results[1].len(), 2);
        }

        #[test]
        fn test_treebank_from_glob() {
            let (dir, _paths) = create_test_files(&[
                ("test1.conllu", TWO_SENTENCES),
                ("test2.conllu", THREE_VERBS),
                ("other.txt", "ignored"),
            ]);

            let pattern = format!("{}/*.conllu", dir.path().display());
            let treebank = Treebank::from_glob(&pattern).unwrap();

            assert_eq!(treebank.iter().count(), 5);

            let query = compile_query("pattern { N [upos=NOUN] }").unwrap();
            assert_eq!(MatchSet::new(&treebank, &query).iter().count(), 2);
        }

        #[test]
        fn test_missing_file_is_empty() {
            let dir = tempdir().unwrap();
            let treebank = Treebank::from_file(dir.path().join("missing.conllu"));

            assert_eq!(treebank.iter().count(), 0);
        }
    }
}
