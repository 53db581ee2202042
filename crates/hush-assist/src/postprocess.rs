//! Answer clean-up applied before delivery.

/// Characters stripped from the end of an answer.
const TRAILING_PUNCTUATION: &[char] = &['.', ',', '!', '?', ';', ':'];

/// Keep the first `max_words` whitespace tokens and strip trailing
/// punctuation.
pub fn enforce_word_limit(answer: &str, max_words: usize) -> String {
    let words: Vec<&str> = answer.split_whitespace().take(max_words).collect();
    words
        .join(" ")
        .trim_end_matches(TRAILING_PUNCTUATION)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_long_answer_is_cut_to_limit() {
        let answer = "one two three four five six seven eight nine ten \
                      eleven twelve thirteen fourteen fifteen sixteen seventeen eighteen.";
        let cleaned = enforce_word_limit(answer, 15);
        assert_eq!(cleaned.split_whitespace().count(), 15);
        assert!(cleaned.ends_with("fifteen"));
    }

    #[test]
    fn test_trailing_punctuation_stripped() {
        assert_eq!(enforce_word_limit("Paris.", 15), "Paris");
        assert_eq!(enforce_word_limit("Really?!", 15), "Really");
        assert_eq!(enforce_word_limit("at noon;:,", 15), "at noon");
    }

    #[test]
    fn test_punctuation_after_cut_is_stripped() {
        assert_eq!(enforce_word_limit("yes, tomorrow, probably not", 2), "yes, tomorrow");
    }

    #[test]
    fn test_inner_punctuation_kept() {
        assert_eq!(enforce_word_limit("3.14 roughly", 15), "3.14 roughly");
    }

    #[test]
    fn test_whitespace_is_normalised() {
        assert_eq!(enforce_word_limit("  room \n four ", 15), "room four");
    }

    #[test]
    fn test_empty_answer() {
        assert_eq!(enforce_word_limit("", 15), "");
        assert_eq!(enforce_word_limit("...", 15), "");
    }
}
