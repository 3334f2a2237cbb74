use std::collections::{BTreeSet, HashSet};
use std::fmt;

use strsim::normalized_levenshtein;

/// How two titles are compared.
///
/// The edit-distance based methods lowercase both titles and treat every
/// non-alphanumeric character as whitespace before comparing; `Jaccard` only
/// case-folds and splits on whitespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SimilarityMethod {
    /// Sort the words of each title, then compare the rejoined strings.
    #[default]
    TokenSort,
    /// Compare the shared words against each title's leftover words.
    TokenSet,
    /// Best match of the shorter title against same-length slices of the longer
    /// that start on a word.
    Partial,
    /// Word overlap: shared words over all words.
    Jaccard,
    /// Highest of `TokenSort`, `TokenSet` and `Jaccard`.
    Combined,
}

impl SimilarityMethod {
    pub const ALL: [SimilarityMethod; 5] = [
        SimilarityMethod::TokenSort,
        SimilarityMethod::TokenSet,
        SimilarityMethod::Partial,
        SimilarityMethod::Jaccard,
        SimilarityMethod::Combined,
    ];

    /// Look up a method by its configuration name.
    ///
    /// Accepts `token_sort`, `token_set`, `partial`, `jaccard` and `combined`,
    /// case-insensitively and with `-` in place of `_`.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "token_sort" => Some(Self::TokenSort),
            "token_set" => Some(Self::TokenSet),
            "partial" => Some(Self::Partial),
            "jaccard" => Some(Self::Jaccard),
            "combined" => Some(Self::Combined),
            _ => None,
        }
    }

    /// Like [`from_name`](Self::from_name), falling back to `TokenSort`.
    pub fn from_name_or_default(name: &str) -> Self {
        Self::from_name(name).unwrap_or_default()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TokenSort => "token_sort",
            Self::TokenSet => "token_set",
            Self::Partial => "partial",
            Self::Jaccard => "jaccard",
            Self::Combined => "combined",
        }
    }
}

impl fmt::Display for SimilarityMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Scores how close two titles are, from 0 (unrelated) to 100 (identical).
///
/// Returns 0 when either title has nothing left to compare after
/// normalization, so two empty titles never look alike.
pub fn score(a: &str, b: &str, method: SimilarityMethod) -> u8 {
    match method {
        SimilarityMethod::TokenSort => token_sort(a, b),
        SimilarityMethod::TokenSet => token_set(a, b),
        SimilarityMethod::Partial => partial(a, b),
        SimilarityMethod::Jaccard => jaccard(a, b),
        SimilarityMethod::Combined => token_sort(a, b).max(token_set(a, b)).max(jaccard(a, b)),
    }
}

pub fn token_sort(a: &str, b: &str) -> u8 {
    ratio(&sorted_tokens(&normalize(a)), &sorted_tokens(&normalize(b)))
}

pub fn token_set(a: &str, b: &str) -> u8 {
    let a = normalize(a);
    let b = normalize(b);
    if a.is_empty() || b.is_empty() {
        return 0;
    }

    let words_a: BTreeSet<&str> = a.split_whitespace().collect();
    let words_b: BTreeSet<&str> = b.split_whitespace().collect();

    let shared = join(words_a.intersection(&words_b));
    let only_a = join(words_a.difference(&words_b));
    let only_b = join(words_b.difference(&words_a));

    let with_a = format!("{shared} {only_a}").trim().to_string();
    let with_b = format!("{shared} {only_b}").trim().to_string();

    ratio(&shared, &with_a)
        .max(ratio(&shared, &with_b))
        .max(ratio(&with_a, &with_b))
}

pub fn partial(a: &str, b: &str) -> u8 {
    let a = normalize(a);
    let b = normalize(b);
    if a.is_empty() || b.is_empty() {
        return 0;
    }

    let (short, long) = if a.chars().count() <= b.chars().count() {
        (a, b)
    } else {
        (b, a)
    };

    let long: Vec<char> = long.chars().collect();
    let width = short.chars().count();
    if width == long.len() {
        return ratio(&short, &long.iter().collect::<String>());
    }

    // Slide only over word starts, plus the window flush with the end
    let last = long.len() - width;
    let starts = (0..=last)
        .filter(|&i| long[i] != ' ' && (i == 0 || long[i - 1] == ' '))
        .chain(std::iter::once(last));

    let mut best = 0;
    for start in starts {
        let candidate: String = long[start..start + width].iter().collect();
        best = best.max(ratio(&short, &candidate));
        if best == 100 {
            break;
        }
    }
    best
}

pub fn jaccard(a: &str, b: &str) -> u8 {
    let a = a.to_lowercase();
    let b = b.to_lowercase();
    let words_a: HashSet<&str> = a.split_whitespace().collect();
    let words_b: HashSet<&str> = b.split_whitespace().collect();
    if words_a.is_empty() || words_b.is_empty() {
        return 0;
    }

    let shared = words_a.intersection(&words_b).count();
    let total = words_a.union(&words_b).count();
    to_percent(shared as f64 / total as f64)
}

/// Edit-distance similarity of two already normalized strings.
fn ratio(a: &str, b: &str) -> u8 {
    if a.is_empty() || b.is_empty() {
        return 0;
    }
    to_percent(normalized_levenshtein(a, b))
}

fn to_percent(fraction: f64) -> u8 {
    (fraction * 100.0).round().clamp(0.0, 100.0) as u8
}

/// Normalized titles are cut to this many characters before comparing.
const MAX_COMPARE_CHARS: usize = 256;

/// Lowercase and turn punctuation into word breaks, collapsing whitespace.
fn normalize(s: &str) -> String {
    let spaced: String = s
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect::<String>()
        .to_lowercase();
    let joined = spaced.split_whitespace().collect::<Vec<_>>().join(" ");
    if joined.chars().count() <= MAX_COMPARE_CHARS {
        return joined;
    }
    let cut: String = joined.chars().take(MAX_COMPARE_CHARS).collect();
    cut.trim_end().to_string()
}

fn sorted_tokens(s: &str) -> String {
    let mut tokens: Vec<&str> = s.split_whitespace().collect();
    tokens.sort_unstable();
    tokens.join(" ")
}

fn join<'a, 'b: 'a>(words: impl Iterator<Item = &'a &'b str>) -> String {
    words.copied().collect::<Vec<_>>().join(" ")
}
