//! Cheap keyword check on the user's own words, before any model call.

/// Intent words that reject a question outright.
pub const DISALLOWED_INTENT_WORDS: &[&str] = &[
    "drop", "delete", "truncate", "insert", "update", "alter", "create",
];

/// First disallowed intent word found in `query`, regardless of case. A word
/// matches when it starts with an intent word, so `Deleting` and `updates`
/// count but `undo` or `recreate` do not.
pub fn disallowed_intent(query: &str) -> Option<&'static str> {
    query
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .find_map(|word| {
            DISALLOWED_INTENT_WORDS.iter().copied().find(|k| {
                word.get(..k.len())
                    .is_some_and(|stem| stem.eq_ignore_ascii_case(k))
            })
        })
}

pub fn contains_disallowed_intent(query: &str) -> bool {
    disallowed_intent(query).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_destructive_intent_is_caught() {
        assert_eq!(disallowed_intent("Delete all records for Germany"), Some("delete"));
        assert_eq!(disallowed_intent("please DROP the table"), Some("drop"));
        assert_eq!(disallowed_intent("update: values in 2023?"), Some("update"));
    }

    #[test]
    fn test_inflections_are_caught() {
        assert_eq!(disallowed_intent("Deleting all records for Germany"), Some("delete"));
        assert_eq!(disallowed_intent("truncated list of updates"), Some("truncate"));
        assert_eq!(disallowed_intent("show UPDATED values"), Some("update"));
        assert_eq!(disallowed_intent("batteries created_at after 2020"), Some("create"));
        assert_eq!(disallowed_intent("Which dropdown series sold best?"), Some("drop"));
        assert_eq!(disallowed_intent("inserts per country"), Some("insert"));
    }

    #[test]
    fn test_word_must_start_with_intent() {
        assert!(!contains_disallowed_intent("recreate the chart for hot climates"));
        assert!(!contains_disallowed_intent("undeleted series by release year"));
        assert!(!contains_disallowed_intent("Größte Werte für Österreich"));
    }

    #[test]
    fn test_plain_questions_pass() {
        assert!(!contains_disallowed_intent("Show me the top 5 batteries by value"));
        assert!(!contains_disallowed_intent(""));
    }
}
