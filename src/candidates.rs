//! Candidate sources
//!
//! Random kinds never run dry; pattern constraints are enforced by rejection
//! sampling before a value is yielded. The `list` kind wraps a finite list and
//! is the only source that can exhaust.

use crate::error::{Result, ScoutError};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;

const LETTERS: &[u8] = b"abcdefghijklmnopqrstuvwxyz";
const DIGITS: &[u8] = b"0123456789";
const CHARS: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

const COOL_BASES: &[&str] = &[
    "ace", "pro", "god", "max", "top", "ice", "fire", "dark", "cold", "hot", "lit", "dope",
    "sick", "goat", "king", "boss", "lord", "duke", "hero", "zero", "neo", "rex", "lex", "jax",
    "zap", "zip", "zed", "zen", "vex", "fox", "wolf", "bear", "lion", "hawk", "owl", "bat", "cat",
    "dog", "rat", "sky", "sun", "moon", "star", "rain", "wind", "snow", "fog", "mist",
];

/// Tag of the bounded list source
pub const LIST_KIND: &str = "list";

/// Random candidate pattern
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CandidateKind {
    /// 4 letters
    FourLetters,
    /// 4 letters or digits
    FourChars,
    FiveLetters,
    FiveChars,
    /// 5 characters from a set of readable patterns
    FiveMeaningful,
    /// 4 characters with at least one letter and one digit
    Mixed,
    /// 4 characters alternating letter and digit
    CleanMixed,
}

impl CandidateKind {
    pub fn all() -> &'static [CandidateKind] {
        &[
            CandidateKind::FourLetters,
            CandidateKind::FourChars,
            CandidateKind::FiveLetters,
            CandidateKind::FiveChars,
            CandidateKind::FiveMeaningful,
            CandidateKind::Mixed,
            CandidateKind::CleanMixed,
        ]
    }

    pub fn tag(&self) -> &'static str {
        match self {
            CandidateKind::FourLetters => "4l",
            CandidateKind::FourChars => "4c",
            CandidateKind::FiveLetters => "5l",
            CandidateKind::FiveChars => "5c",
            CandidateKind::FiveMeaningful => "5l_meaningful",
            CandidateKind::Mixed => "mixed",
            CandidateKind::CleanMixed => "clean_mixed",
        }
    }

    /// Unbounded generator for this kind
    pub fn generator(self) -> RandomCandidates {
        RandomCandidates::new(self)
    }
}

impl fmt::Display for CandidateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.tag())
    }
}

impl FromStr for CandidateKind {
    type Err = ScoutError;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim().to_lowercase();
        CandidateKind::all()
            .iter()
            .copied()
            .find(|kind| kind.tag() == wanted)
            .ok_or_else(|| ScoutError::UnknownCandidateKind(s.to_string()))
    }
}

/// Infinite iterator of random candidates of one kind
pub struct RandomCandidates {
    kind: CandidateKind,
    rng: StdRng,
}

impl RandomCandidates {
    pub fn new(kind: CandidateKind) -> Self {
        Self::with_rng(kind, StdRng::from_entropy())
    }

    pub fn with_rng(kind: CandidateKind, rng: StdRng) -> Self {
        Self { kind, rng }
    }

    fn pick(&mut self, alphabet: &[u8]) -> char {
        alphabet[self.rng.gen_range(0..alphabet.len())] as char
    }

    fn pick_n(&mut self, alphabet: &[u8], n: usize) -> String {
        (0..n).map(|_| self.pick(alphabet)).collect()
    }

    fn meaningful(&mut self) -> String {
        let candidate = match self.rng.gen_range(0..10) {
            0 => format!("{}{}{}", self.pick(LETTERS), self.pick_n(LETTERS, 3), self.pick(DIGITS)),
            1 => format!("{}{}", self.pick_n(LETTERS, 4), self.pick(DIGITS)),
            2 => format!("{}{}", self.pick(DIGITS), self.pick_n(LETTERS, 4)),
            3 => format!("{}{}", self.pick_n(LETTERS, 3), self.pick_n(DIGITS, 2)),
            4 => format!("{}{}", self.pick_n(DIGITS, 2), self.pick_n(LETTERS, 3)),
            5 => {
                let base = COOL_BASES.choose(&mut self.rng).copied().unwrap_or("ace");
                format!("{}{}", &base[..3], self.pick_n(CHARS, 2))
            }
            6 => format!(
                "{}{}{}{}{}",
                self.pick(LETTERS),
                self.pick(DIGITS),
                self.pick(LETTERS),
                self.pick(DIGITS),
                self.pick(LETTERS)
            ),
            7 => self.pick_n(LETTERS, 5),
            8 => format!("{}{}", self.pick(b"xzkvqj"), self.pick_n(CHARS, 4)),
            _ => format!("{}{}", self.pick_n(CHARS, 3), self.pick(b"xz019y")),
        };
        self.fit_to(candidate, 5)
    }

    fn fit_to(&mut self, mut candidate: String, len: usize) -> String {
        if candidate.len() > len {
            candidate.truncate(len);
        } else if candidate.len() < len {
            let padding = self.pick_n(CHARS, len - candidate.len());
            candidate.push_str(&padding);
        }
        candidate
    }

    fn mixed(&mut self, len: usize) -> String {
        loop {
            let candidate = self.pick_n(CHARS, len);
            let has_letter = candidate.chars().any(|c| c.is_ascii_lowercase());
            let has_digit = candidate.chars().any(|c| c.is_ascii_digit());
            if has_letter && has_digit {
                return candidate;
            }
        }
    }

    fn clean_mixed(&mut self, len: usize) -> String {
        let mut use_letter = self.rng.gen_bool(0.5);
        (0..len)
            .map(|_| {
                let c = if use_letter {
                    self.pick(LETTERS)
                } else {
                    self.pick(DIGITS)
                };
                use_letter = !use_letter;
                c
            })
            .collect()
    }
}

impl Iterator for RandomCandidates {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        let candidate = match self.kind {
            CandidateKind::FourLetters => self.pick_n(LETTERS, 4),
            CandidateKind::FourChars => self.pick_n(CHARS, 4),
            CandidateKind::FiveLetters => self.pick_n(LETTERS, 5),
            CandidateKind::FiveChars => self.pick_n(CHARS, 5),
            CandidateKind::FiveMeaningful => self.meaningful(),
            CandidateKind::Mixed => self.mixed(4),
            CandidateKind::CleanMixed => self.clean_mixed(4),
        };
        Some(candidate)
    }
}

/// A named, pull-based supply of candidates
pub struct CandidateSource {
    kind: String,
    candidates: Box<dyn Iterator<Item = String> + Send>,
}

impl CandidateSource {
    pub fn new<I>(kind: impl Into<String>, candidates: I) -> Self
    where
        I: Iterator<Item = String> + Send + 'static,
    {
        Self {
            kind: kind.into(),
            candidates: Box::new(candidates),
        }
    }

    /// Unbounded random source of the given kind
    pub fn random(kind: CandidateKind) -> Self {
        Self::new(kind.tag(), kind.generator())
    }

    /// Finite source over a fixed list
    pub fn from_list(values: Vec<String>) -> Self {
        Self::new(LIST_KIND, values.into_iter())
    }

    /// Finite source over a newline-delimited wordlist.
    ///
    /// Blank lines and `#` comments are skipped.
    pub fn from_wordlist_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())?;
        let words: Vec<String> = content
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .map(str::to_string)
            .collect();

        tracing::info!(path = ?path.as_ref(), words = words.len(), "Loaded wordlist");
        Ok(Self::from_list(words))
    }

    /// Build sources from kind tags such as `4l,5c`
    pub fn from_tags<S: AsRef<str>>(tags: &[S]) -> Result<Vec<Self>> {
        tags.iter()
            .map(|tag| tag.as_ref().parse::<CandidateKind>().map(Self::random))
            .collect()
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// Next candidate; `None` means this source is exhausted for good
    pub fn next_candidate(&mut self) -> Option<String> {
        self.candidates.next()
    }
}

impl fmt::Debug for CandidateSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CandidateSource")
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(kind: CandidateKind, n: usize) -> Vec<String> {
        let rng = StdRng::seed_from_u64(7);
        RandomCandidates::with_rng(kind, rng).take(n).collect()
    }

    #[test]
    fn test_kind_tags_round_trip() {
        for kind in CandidateKind::all() {
            assert_eq!(kind.tag().parse::<CandidateKind>().unwrap(), *kind);
        }
        assert_eq!("4L".parse::<CandidateKind>().unwrap(), CandidateKind::FourLetters);
        assert!(matches!(
            "6x".parse::<CandidateKind>(),
            Err(ScoutError::UnknownCandidateKind(_))
        ));
    }

    #[test]
    fn test_letter_kinds() {
        for candidate in sample(CandidateKind::FourLetters, 200) {
            assert_eq!(candidate.len(), 4);
            assert!(candidate.chars().all(|c| c.is_ascii_lowercase()));
        }
        for candidate in sample(CandidateKind::FiveLetters, 200) {
            assert_eq!(candidate.len(), 5);
            assert!(candidate.chars().all(|c| c.is_ascii_lowercase()));
        }
    }

    #[test]
    fn test_char_kinds() {
        for candidate in sample(CandidateKind::FourChars, 200) {
            assert_eq!(candidate.len(), 4);
            assert!(candidate.bytes().all(|b| CHARS.contains(&b)));
        }
        for candidate in sample(CandidateKind::FiveChars, 200) {
            assert_eq!(candidate.len(), 5);
        }
    }

    #[test]
    fn test_meaningful_is_always_five() {
        for candidate in sample(CandidateKind::FiveMeaningful, 500) {
            assert_eq!(candidate.len(), 5, "{}", candidate);
            assert!(candidate.bytes().all(|b| CHARS.contains(&b)));
        }
    }

    #[test]
    fn test_mixed_has_letter_and_digit() {
        for candidate in sample(CandidateKind::Mixed, 500) {
            assert_eq!(candidate.len(), 4);
            assert!(candidate.chars().any(|c| c.is_ascii_lowercase()));
            assert!(candidate.chars().any(|c| c.is_ascii_digit()));
        }
    }

    #[test]
    fn test_clean_mixed_alternates() {
        for candidate in sample(CandidateKind::CleanMixed, 500) {
            let classes: Vec<bool> = candidate.chars().map(|c| c.is_ascii_digit()).collect();
            assert_eq!(classes.len(), 4);
            assert!(classes.windows(2).all(|w| w[0] != w[1]), "{}", candidate);
        }
    }

    #[test]
    fn test_list_source_exhausts() {
        let mut source = CandidateSource::from_list(vec!["abcd".to_string(), "efgh".to_string()]);
        assert_eq!(source.kind(), LIST_KIND);
        assert_eq!(source.next_candidate().as_deref(), Some("abcd"));
        assert_eq!(source.next_candidate().as_deref(), Some("efgh"));
        assert_eq!(source.next_candidate(), None);
    }

    #[test]
    fn test_from_tags() {
        let sources = CandidateSource::from_tags(&["4l", "clean_mixed"]).unwrap();
        let kinds: Vec<&str> = sources.iter().map(CandidateSource::kind).collect();
        assert_eq!(kinds, vec!["4l", "clean_mixed"]);
        assert!(CandidateSource::from_tags(&["nope"]).is_err());
    }
}
