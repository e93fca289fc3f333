use crate::config::StemmerLanguage;
use lazy_static::lazy_static;
use regex::Regex;
use rust_stemmers::Stemmer;
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

lazy_static! {
    static ref RE: Regex = Regex::new(r"(?u)[\p{L}\p{N}]+(?:['’_][\p{L}\p{N}]+)*").expect("valid regex");
    static ref DEFAULT: Analyzer = Analyzer::default();
}

/// Text analysis shared by indexing and query parsing: diacritics are folded
/// away, text is lowercased, and tokens are runs of letters and digits.
#[derive(Default)]
pub struct Analyzer {
    stemmer: Option<Stemmer>,
}

impl std::fmt::Debug for Analyzer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Analyzer")
            .field("stemming", &self.stemmer.is_some())
            .finish()
    }
}

impl Analyzer {
    pub fn new(stemmer: Option<StemmerLanguage>) -> Self {
        Self { stemmer: stemmer.map(|lang| Stemmer::create(lang.algorithm())) }
    }

    /// Tokenize text into (term, position).
    pub fn tokenize(&self, text: &str) -> Vec<(String, usize)> {
        let folded = fold(text);
        RE.find_iter(&folded)
            .enumerate()
            .map(|(pos, mat)| (self.stem(mat.as_str()), pos))
            .collect()
    }

    /// Fold and lowercase a single query token without splitting or stemming it.
    pub fn normalize(&self, token: &str) -> String {
        fold(token)
    }

    fn stem(&self, token: &str) -> String {
        match &self.stemmer {
            Some(stemmer) => stemmer.stem(token).into_owned(),
            None => token.to_string(),
        }
    }
}

fn fold(text: &str) -> String {
    text.nfkd().filter(|c| !is_combining_mark(*c)).collect::<String>().to_lowercase()
}

/// Tokenize with the default analyzer (no stemming).
pub fn tokenize(text: &str) -> Vec<(String, usize)> {
    DEFAULT.tokenize(text)
}
