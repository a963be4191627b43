use crate::Position;
use lazy_static::lazy_static;
use regex::Regex;
use std::collections::HashSet;
use unicode_normalization::UnicodeNormalization;

lazy_static! {
    // Every CJK ideograph is a token on its own; other tokens are runs of letters, digits and '_'.
    static ref RE: Regex = Regex::new(r"(?u)\p{Han}|[\p{L}\p{N}_&&\P{Han}]+").expect("valid regex");
    static ref STOPWORDS: HashSet<&'static str> = {
        let words: &[&str] = &[
            "the", "of", "to", "and", "a", "in", "is", "it",
            "是", "的", "它", "他", "她", "也",
        ];
        words.iter().copied().collect()
    };
}

pub fn is_stopword(token: &str) -> bool { STOPWORDS.contains(token) }

/// Normalize a single word the same way indexed terms are normalized.
pub fn normalize_term(word: &str) -> String {
    word.nfkc().collect::<String>().to_lowercase()
}

/// Lazily tokenize text into (term, position), skipping stop words.
///
/// Positions count every token, stop words included, so a stop word leaves a gap.
pub fn tokenize(text: &str) -> impl Iterator<Item = (String, Position)> + '_ {
    RE.find_iter(text)
        .enumerate()
        .filter_map(|(pos, mat)| {
            let token = normalize_term(mat.as_str());
            if is_stopword(&token) { None } else { Some((token, pos as Position)) }
        })
}

/// Terms only, for anchor text where positions are irrelevant.
pub fn terms(text: &str) -> impl Iterator<Item = String> + '_ {
    tokenize(text).map(|(term, _)| term)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn basic_tokenize() {
        let t: Vec<_> = tokenize("Cats are GREAT!").collect();
        assert_eq!(t, vec![("cats".to_string(), 0), ("are".to_string(), 1), ("great".to_string(), 2)]);
    }

    #[test]
    fn stopwords_leave_position_gaps() {
        let t: Vec<_> = tokenize("the cat in the hat").collect();
        assert_eq!(t, vec![("cat".to_string(), 1), ("hat".to_string(), 4)]);
    }
}
