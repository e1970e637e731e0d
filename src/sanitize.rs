//! Markup sanitizer: strip incidental formatting from raw model output.
//!
//! Well-directed models still occasionally wrap their answer in a fenced
//! code block, tag it with a language name, or pad it with prose. This
//! module extracts the first fenced block when one exists and otherwise
//! returns the trimmed text unchanged.
//!
//! Every function here is pure and total: malformed fences never fail.
//! A missing closing delimiter means everything after the opening delimiter
//! is the block content.

const FENCE: &str = "```";

/// Clean one raw model response into bare markup.
///
/// * Fence present → content of the first fenced block, with an optional
///   language tag after the opening delimiter removed; text outside the
///   block is discarded.
/// * No fence → input trimmed of leading/trailing whitespace.
pub fn sanitize_markup(raw: &str) -> String {
    let Some(open) = raw.find(FENCE) else {
        return raw.trim().to_string();
    };
    let after = &raw[open + FENCE.len()..];
    let block = match after.find(FENCE) {
        Some(close) => &after[..close],
        None => after, // unterminated fence: rest of the text is the block
    };
    strip_language_tag(block).trim().to_string()
}

/// Drop a bare language tag sitting between the opening delimiter and the
/// first newline (e.g. "latex", "typst", "tex").
fn strip_language_tag(block: &str) -> &str {
    if let Some(nl) = block.find('\n') {
        let first = block[..nl].trim();
        let looks_like_tag = !first.is_empty()
            && first
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if looks_like_tag {
            return &block[nl + 1..];
        }
    }
    block
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fenced_with_tag() {
        let raw = "```latex\n\\frac{a}{b}\n```";
        assert_eq!(sanitize_markup(raw), "\\frac{a}{b}");
    }

    #[test]
    fn fenced_without_tag() {
        let raw = "```\nE = mc^2\n```";
        assert_eq!(sanitize_markup(raw), "E = mc^2");
    }

    #[test]
    fn surrounding_prose_is_discarded() {
        let raw = "Here is the code:\n```typst\n#heading[Hi]\n```\nHope that helps!";
        assert_eq!(sanitize_markup(raw), "#heading[Hi]");
    }

    #[test]
    fn unterminated_fence_takes_the_rest() {
        let raw = "```latex\n\\alpha + \\beta";
        assert_eq!(sanitize_markup(raw), "\\alpha + \\beta");
    }

    #[test]
    fn no_fence_is_trimmed_only() {
        let raw = "  \\documentclass{article}\n\\begin{document}x\\end{document}  \n";
        assert_eq!(
            sanitize_markup(raw),
            "\\documentclass{article}\n\\begin{document}x\\end{document}"
        );
    }

    #[test]
    fn first_line_that_is_not_a_tag_is_kept() {
        // "\section{A}" is content, not a language tag.
        let raw = "```\\section{A}\nmore\n```";
        assert_eq!(sanitize_markup(raw), "\\section{A}\nmore");
    }

    #[test]
    fn only_first_block_is_extracted() {
        let raw = "```latex\nA\n```\nignored\n```latex\nB\n```";
        assert_eq!(sanitize_markup(raw), "A");
    }

    #[test]
    fn empty_input_stays_empty() {
        assert_eq!(sanitize_markup(""), "");
        assert_eq!(sanitize_markup("``` \n```"), "");
    }
}
