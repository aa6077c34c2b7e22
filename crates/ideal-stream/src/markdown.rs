//! Markdown balance checks used to decide when streamed text can be shown.

/// Sentence endings a cut may follow. The trailing space or newline stays
/// on the right-hand side of the cut.
const SENTENCE_TERMINATORS: [&str; 4] = [". ", ".\n", "!\n", "?\n"];

const FENCE: &str = "```";
const CLOSING_FENCE: &str = "```\n";

/// Returns true when every paired marker in `text` is balanced: code fences,
/// inline backticks and `**` bold markers must each occur an even number of
/// times. Headings, links and lists have no pairing and are not checked.
///
/// A fence also contributes three single backticks, so an odd number of
/// fences is caught by both counts.
pub fn is_safe(text: &str) -> bool {
    text.matches(FENCE).count() % 2 == 0
        && text.matches('`').count() % 2 == 0
        && text.matches("**").count() % 2 == 0
}

/// Finds the latest byte offset at which `text` can be split without cutting
/// through a sentence or an open code block.
///
/// The rightmost sentence terminator wins. Only when there is none, and the
/// text contains a fence, the end of the rightmost closed fence is used.
pub fn find_cut(text: &str) -> Option<usize> {
    let sentence_end = SENTENCE_TERMINATORS
        .iter()
        .filter_map(|terminator| text.rfind(terminator))
        .max();

    if let Some(pos) = sentence_end.filter(|&pos| pos > 0) {
        // Terminators start with one ASCII punctuation byte
        return Some(pos + 1);
    }

    find_fence_cut(text)
}

/// The byte offset just past the rightmost closing fence line (```` ```\n ````)
/// that has an opening fence somewhere before it.
pub fn find_fence_cut(text: &str) -> Option<usize> {
    let close = text.rfind(CLOSING_FENCE)?;
    let open = text.find(FENCE)?;
    (close > 0 && open < close).then_some(close + CLOSING_FENCE.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_text_is_safe() {
        assert!(is_safe(""));
        assert!(is_safe("Hello world."));
        assert!(is_safe("# Heading\n- item [link](http://x)"));
    }

    #[test]
    fn test_unbalanced_markers_are_unsafe() {
        assert!(!is_safe("```python\nprint(1)"));
        assert!(!is_safe("use `foo"));
        assert!(!is_safe("this is **bold"));
    }

    #[test]
    fn test_balanced_markers_are_safe() {
        assert!(is_safe("```python\nprint(1)\n```\n"));
        assert!(is_safe("use `foo` here"));
        assert!(is_safe("this is **bold** text"));
        assert!(is_safe("**a** and **b** with `x` and `y`"));
    }

    #[test]
    fn test_each_family_checked_independently() {
        // Four backticks: an even backtick count, but one fence
        assert!(!is_safe("````"));
        // Fences balanced but a stray inline backtick
        assert!(!is_safe("```\ncode\n``` and `"));
        // Four asterisks are two bold markers
        assert!(is_safe("****"));
        assert!(!is_safe("***"));
    }

    #[test]
    fn test_find_cut_sentence() {
        assert_eq!(find_cut("Hello. World"), Some(6));
        assert_eq!(find_cut("One.\nTwo. Three"), Some(9));
        assert_eq!(find_cut("Really?\nYes!\nok"), Some(12));
    }

    #[test]
    fn test_find_cut_ignores_unterminated_punctuation() {
        assert_eq!(find_cut("Hello world."), None);
        assert_eq!(find_cut("What? Nothing"), None);
        assert_eq!(find_cut("v1.2 release"), None);
    }

    #[test]
    fn test_find_cut_at_start_is_not_a_candidate() {
        assert_eq!(find_cut(". leading"), None);
    }

    #[test]
    fn test_find_cut_closed_fence() {
        let text = "```rust\nfn main() {}\n```\nmore";
        assert_eq!(find_cut(text), Some(text.find("more").unwrap()));
    }

    #[test]
    fn test_find_cut_open_fence_only() {
        assert_eq!(find_cut("```rust\nfn main() {}"), None);
    }

    #[test]
    fn test_find_fence_cut() {
        let text = "```\ncode\n```\nUse `a. b";
        assert_eq!(find_fence_cut(text), Some(text.find("Use").unwrap()));
        assert_eq!(find_fence_cut("```\nopen only"), None);
        assert_eq!(find_fence_cut("no fences. here"), None);
    }

    #[test]
    fn test_find_cut_prefers_sentence_over_fence() {
        let text = "```\ncode\n```\nDone. next";
        assert_eq!(find_cut(text), Some(text.find(" next").unwrap()));
    }

    #[test]
    fn test_find_cut_is_char_boundary() {
        let text = "Grüße. Straße";
        let cut = find_cut(text).unwrap();
        assert!(text.is_char_boundary(cut));
        assert_eq!(&text[..cut], "Grüße.");
    }
}
