//! Recovery of an executable program from free-form generator output.
//!
//! Generator output mixes prose, markdown fences, and code, and may be
//! truncated mid-stream. Extraction tries a fixed ordered list of strategies
//! (first match wins) and degrades to returning the input unchanged: an
//! unextractable blob surfaces as an evaluation failure, never a crash.
//!
//! `extract` is pure and idempotent on clean code: applying it to text that is
//! already a bare program returns that program unchanged.

use std::sync::LazyLock;

use regex::Regex;

use crate::core::types::Language;

/// Extract a single program from `raw` for the given target language.
///
/// Strategy order:
/// 1. Properly closed fenced block tagged with the target language.
/// 2. Unclosed tagged fence: everything after the opening fence up to the
///    first closing fence or prose boundary.
/// 3. Line-scanning state machine anchored on a known start-of-program line.
/// 4. Fence-free text that already contains the expected top-level construct.
/// 5. Fallback: the raw text unchanged.
pub fn extract(raw: &str, language: Language) -> String {
    if let Some(block) = closed_fenced_block(raw, language) {
        return block;
    }
    if let Some(block) = unclosed_fenced_block(raw, language) {
        return block;
    }
    if let Some(block) = anchored_scan(raw, language) {
        return block;
    }
    let trimmed = raw.trim();
    if !raw.contains("```") && language.has_top_level_construct(trimmed) {
        return trimmed.to_string();
    }
    raw.to_string()
}

/// First fenced block tagged with the target language and properly closed.
fn closed_fenced_block(raw: &str, language: Language) -> Option<String> {
    let lines: Vec<&str> = raw.lines().collect();
    let open = lines
        .iter()
        .position(|line| opens_tagged_fence(line, language))?;
    let close = lines[open + 1..]
        .iter()
        .position(|line| is_closing_fence(line))?;
    let interior = lines[open + 1..open + 1 + close].join("\n");
    Some(interior.trim().to_string())
}

/// Opening tagged fence with no closing fence: take everything up to the
/// first prose boundary instead.
fn unclosed_fenced_block(raw: &str, language: Language) -> Option<String> {
    let lines: Vec<&str> = raw.lines().collect();
    let open = lines
        .iter()
        .position(|line| opens_tagged_fence(line, language))?;
    let mut collected = Vec::new();
    for line in &lines[open + 1..] {
        if is_closing_fence(line) || is_prose_boundary(line) {
            break;
        }
        collected.push(*line);
    }
    let text = collected.join("\n").trim().to_string();
    (!text.is_empty()).then_some(text)
}

/// States of the anchored line scanner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScanState {
    SearchingForStart,
    Capturing,
    Stopped,
}

/// Scan line-by-line for a start-of-program anchor, then capture until a
/// prose boundary or fence marker. Accepts the result only if it still
/// contains the expected top-level construct.
fn anchored_scan(raw: &str, language: Language) -> Option<String> {
    let mut state = ScanState::SearchingForStart;
    let mut captured: Vec<&str> = Vec::new();

    for line in raw.lines() {
        state = match state {
            ScanState::SearchingForStart => {
                if is_anchor_line(line, language) {
                    captured.push(line);
                    ScanState::Capturing
                } else {
                    ScanState::SearchingForStart
                }
            }
            ScanState::Capturing => {
                if is_prose_boundary(line) || is_fence_marker(line) {
                    ScanState::Stopped
                } else {
                    captured.push(line);
                    ScanState::Capturing
                }
            }
            ScanState::Stopped => ScanState::Stopped,
        };
        if state == ScanState::Stopped {
            break;
        }
    }

    let text = captured.join("\n").trim().to_string();
    (!text.is_empty() && language.has_top_level_construct(&text)).then_some(text)
}

fn is_anchor_line(line: &str, language: Language) -> bool {
    language
        .anchor_prefixes()
        .iter()
        .any(|prefix| line.starts_with(prefix))
}

fn opens_tagged_fence(line: &str, language: Language) -> bool {
    let trimmed = line.trim();
    let Some(info) = trimmed.strip_prefix("```") else {
        return false;
    };
    let tag = info.trim().to_ascii_lowercase();
    language.fence_tags().contains(&tag.as_str())
}

fn is_closing_fence(line: &str) -> bool {
    line.trim() == "```"
}

fn is_fence_marker(line: &str) -> bool {
    line.trim_start().starts_with("```")
}

static NUMBERED_LIST: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d+[.)]\s").expect("numbered list pattern is valid"));

const PROSE_PREFIXES: &[&str] = &[
    "explanation",
    "note:",
    "this works",
    "this solution",
    "this approach",
    "the idea",
    "here's how",
    "here is how",
    "how it works",
    "time complexity",
    "space complexity",
    "complexity:",
];

/// Lines that mark the end of code and the resumption of prose.
fn is_prose_boundary(line: &str) -> bool {
    let trimmed = line.trim();
    if trimmed.starts_with('#') && !trimmed.starts_with("#include") && !trimmed.starts_with("#!") {
        // Markdown heading. Python comments are indistinguishable in theory,
        // but comments carry a space after '#' far less often than '# Heading'
        // does; err on the side of stopping only for '## ' and deeper or
        // title-cased '# X' lines.
        if trimmed.starts_with("##") {
            return true;
        }
        let rest = trimmed.trim_start_matches('#').trim_start();
        if rest
            .chars()
            .next()
            .is_some_and(|first| first.is_ascii_uppercase())
            && rest.split_whitespace().count() <= 6
        {
            return true;
        }
    }
    if NUMBERED_LIST.is_match(trimmed) {
        return true;
    }
    let lower = trimmed.to_ascii_lowercase();
    PROSE_PREFIXES
        .iter()
        .any(|prefix| lower.starts_with(prefix))
}

#[cfg(test)]
mod tests {
    use super::*;

    const CLEAN_PYTHON: &str = "class Solution:\n    def f(self):\n        return 1";

    #[test]
    fn closed_fence_wins_and_drops_trailing_prose() {
        let raw = "Here is the solution:\n```python\nclass Solution:\n    def f(self): return 1\n```\nThis works because...";
        let extracted = extract(raw, Language::Python);
        assert_eq!(extracted, "class Solution:\n    def f(self): return 1");
    }

    #[test]
    fn fence_tag_must_match_target_language() {
        let raw = "```javascript\nfunction f() { return 1; }\n```";
        // No python-tagged fence; anchor scan finds nothing python-shaped
        // before the fence, so the raw text comes back unchanged.
        let extracted = extract(raw, Language::Python);
        assert_eq!(extracted, raw);
    }

    #[test]
    fn unclosed_fence_stops_at_prose_boundary() {
        let raw = "```python\nclass Solution:\n    def f(self):\n        return 2\nExplanation: we return two.";
        let extracted = extract(raw, Language::Python);
        assert_eq!(extracted, "class Solution:\n    def f(self):\n        return 2");
    }

    #[test]
    fn unclosed_fence_takes_rest_when_no_boundary() {
        let raw = "```python\nclass Solution:\n    def f(self):\n        return 3";
        let extracted = extract(raw, Language::Python);
        assert_eq!(extracted, "class Solution:\n    def f(self):\n        return 3");
    }

    #[test]
    fn anchored_scan_recovers_code_from_bare_fences() {
        let raw = "Sure thing.\n```\nimport math\n\ndef solve(x):\n    return math.sqrt(x)\n```\nLet me know.";
        let extracted = extract(raw, Language::Python);
        assert_eq!(extracted, "import math\n\ndef solve(x):\n    return math.sqrt(x)");
    }

    #[test]
    fn anchored_scan_stops_at_numbered_list() {
        let raw = "def solve():\n    return 1\n1. First we define solve\n2. Then we return";
        let extracted = extract(raw, Language::Python);
        assert_eq!(extracted, "def solve():\n    return 1");
    }

    #[test]
    fn anchored_scan_rejects_prose_without_construct() {
        let raw = "import duties are high this year, let's discuss";
        // Anchor matches but no def/class survives, so fall through. The raw
        // text has no fences and no construct either: returned unchanged.
        let extracted = extract(raw, Language::Python);
        assert_eq!(extracted, raw);
    }

    #[test]
    fn fence_free_clean_code_is_returned_trimmed() {
        let raw = format!("\n\n{CLEAN_PYTHON}\n");
        let extracted = extract(&raw, Language::Python);
        assert_eq!(extracted, CLEAN_PYTHON);
    }

    #[test]
    fn extract_is_idempotent_on_clean_code() {
        let once = extract(CLEAN_PYTHON, Language::Python);
        let twice = extract(&once, Language::Python);
        assert_eq!(once, twice);
        assert_eq!(once, CLEAN_PYTHON);
    }

    #[test]
    fn extract_is_idempotent_after_fence_extraction() {
        let raw = "Intro\n```python\nclass Solution:\n    def f(self):\n        return 1\n```\nOutro";
        let once = extract(raw, Language::Python);
        let twice = extract(&once, Language::Python);
        assert_eq!(once, twice);
    }

    #[test]
    fn unextractable_text_falls_through_unchanged() {
        let raw = "I could not produce a solution, sorry.";
        assert_eq!(extract(raw, Language::Python), raw);
    }

    #[test]
    fn javascript_anchor_scan_works() {
        let raw = "The solution:\n\nfunction twoSum(nums, target) {\n  return [0, 1];\n}\n\nExplanation: brute force.";
        let extracted = extract(raw, Language::JavaScript);
        assert_eq!(extracted, "function twoSum(nums, target) {\n  return [0, 1];\n}");
    }

    #[test]
    fn cpp_include_is_not_a_heading() {
        let raw = "#include <vector>\nint main() { return 0; }";
        let extracted = extract(raw, Language::Cpp);
        assert_eq!(extracted, raw);
    }
}
