//! System directives for the recognition service.
//!
//! Centralising every directive here keeps the wire modules thin and makes
//! prompt regressions testable without a live service. The recognition
//! client uses these only when the caller does not override them.

use crate::config::DocFormat;

/// System directive for image → LaTeX transcription.
pub const LATEX_SYSTEM_DIRECTIVE: &str = "You are a LaTeX converter. You must respond with ONLY the \
LaTeX code needed to reproduce the image. No explanations, no markdown formatting, no additional text.";

/// System directive for image → Typst transcription.
pub const TYPST_SYSTEM_DIRECTIVE: &str = "You are a Typst converter. You must respond with ONLY the \
Typst code needed to reproduce the image. No explanations, no markdown formatting, no additional text.";

/// System directive for the single-shot fix-up rewrite.
pub const FIX_SYSTEM_DIRECTIVE: &str = "You are a typesetting assistant. You must respond with ONLY \
corrected code. No explanations, no markdown formatting, no additional text.";

/// Pick the transcription system directive for a format.
pub fn system_directive(format: DocFormat) -> &'static str {
    match format {
        DocFormat::Latex => LATEX_SYSTEM_DIRECTIVE,
        DocFormat::Typst => TYPST_SYSTEM_DIRECTIVE,
    }
}

/// User-turn text accompanying the image attachment.
pub fn transcribe_request(format: DocFormat, context: Option<&str>) -> String {
    let base = match format {
        DocFormat::Latex => {
            "Convert this image to LaTeX code. Return ONLY the LaTeX code with no additional text or formatting."
        }
        DocFormat::Typst => {
            "Convert this image to Typst code. Return ONLY the Typst code with no additional text or formatting."
        }
    };
    match context {
        Some(ctx) if !ctx.trim().is_empty() => {
            format!("{base}\n\nAdditional context shared by the submitter:\n{}", ctx.trim())
        }
        _ => base.to_string(),
    }
}

/// User-turn text for the fix-up rewrite of one broken document.
pub fn fix_request(format: DocFormat, source: &str) -> String {
    format!(
        "The following {format} code fails to render. Fix this code to render correctly. \
Return ONLY the corrected {format} code with no additional text or formatting:\n\n{source}"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn directive_matches_format() {
        assert!(system_directive(DocFormat::Latex).contains("LaTeX"));
        assert!(system_directive(DocFormat::Typst).contains("Typst"));
    }

    #[test]
    fn context_is_folded_into_the_request() {
        let req = transcribe_request(DocFormat::Latex, Some("lecture notes, page 3"));
        assert!(req.contains("lecture notes, page 3"));
        let bare = transcribe_request(DocFormat::Latex, Some("   "));
        assert!(!bare.contains("Additional context"));
    }

    #[test]
    fn fix_request_embeds_the_source() {
        let req = fix_request(DocFormat::Typst, "#broken(");
        assert!(req.contains("#broken("));
        assert!(req.contains("typst"));
    }
}
