//! Refusal-phrase detection, shared by the Instruction Builder (§4.6, which
//! fails fast on a refusal from the instruction model) and the Item
//! Workflow's done-marker wait loop (§4.9 step 9, which converts a
//! refusal-laden summary into failure).

/// Fixed set of known refusal phrases, matched case-folded and after quote
/// normalization. Not exhaustive by design — §4.6 calls this "the
/// documented variants", so the set is small and reviewed, not generated.
const REFUSAL_PHRASES: &[&str] = &[
    "i'm sorry",
    "i am sorry",
    "i cannot help",
    "i can't help",
    "can't assist",
    "cannot assist",
    "i'm unable to help",
    "i am unable to help",
    "as an ai language model",
];

/// Normalize quotes and case so phrase matching is robust to curly quotes
/// and capitalization.
fn normalize(s: &str) -> String {
    s.to_lowercase()
        .replace(['\u{2018}', '\u{2019}'], "'")
        .replace(['\u{201C}', '\u{201D}'], "\"")
}

/// Whether `text` contains any known refusal phrase, after case-folding and
/// quote normalization.
pub fn contains_refusal_phrase(text: &str) -> bool {
    let normalized = normalize(text);
    REFUSAL_PHRASES.iter().any(|phrase| normalized.contains(phrase))
}

/// Heuristic for "looks like a raw model event record" rather than prose —
/// e.g. the instruction model leaking its own streaming JSON instead of
/// returning plain instructions. A cheap structural check, not a parser:
/// flags text that looks like a JSON object/array whose keys resemble
/// event-stream fields.
pub fn looks_like_reasoning_dump(text: &str) -> bool {
    let trimmed = text.trim();
    if !(trimmed.starts_with('{') || trimmed.starts_with('[')) {
        return false;
    }
    const EVENT_MARKERS: &[&str] = &[
        "\"type\":\"message_start\"",
        "\"type\": \"message_start\"",
        "\"event\":\"",
        "\"event\": \"",
        "\"delta\":{",
        "\"delta\": {",
    ];
    EVENT_MARKERS.iter().any(|m| trimmed.contains(m))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_plain_refusal() {
        assert!(contains_refusal_phrase(
            "I'm sorry, but I can't help with that."
        ));
    }

    #[test]
    fn detects_curly_quote_variant() {
        assert!(contains_refusal_phrase("I\u{2019}m sorry, I cannot help."));
    }

    #[test]
    fn accepts_ordinary_summary() {
        assert!(!contains_refusal_phrase(
            "Added dark mode toggle to settings page."
        ));
    }

    #[test]
    fn detects_reasoning_dump_shape() {
        assert!(looks_like_reasoning_dump(
            r#"{"type":"message_start","message":{}}"#
        ));
        assert!(!looks_like_reasoning_dump("Added dark mode toggle."));
    }
}
