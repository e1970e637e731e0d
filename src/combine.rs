//! Document combiner: merge per-page fragments into one structurally valid
//! document.
//!
//! Markup is opaque text here except for a small set of structural markers
//! (document class, begin/end-document, import statements) located with
//! tolerant regex scanning — never grammar parsing. When markers are absent
//! the explicit fallback applies: the whole fragment is body content.
//!
//! Invariant: serializing a [`CombinedDocument`] yields exactly one wrapper
//! (one document-class/page-setup declaration, one begin/end-document pair)
//! no matter how many fragments arrived already wrapped.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::config::DocFormat;

/// Canonical Typst import block, regenerated exactly once per document.
const TYPST_IMPORT_BLOCK: &str = "#import \"@preview/physica:0.9.3\": *";

/// Canonical Typst page setup, regenerated exactly once per document.
const TYPST_PAGE_SETUP: &str = "#set page(paper: \"a4\", margin: 2.5cm)\n#set text(size: 11pt)";

/// A merged document: deduplicated preamble declarations plus ordered body
/// fragments. Serialize with [`CombinedDocument::serialize`].
#[derive(Debug, Clone)]
pub struct CombinedDocument {
    pub format: DocFormat,
    /// Distinct preamble declarations, uniqueness by exact text.
    pub preamble: Vec<String>,
    /// Body content in fragment order.
    pub body: Vec<String>,
    /// Whether any fragment declared its own document class (suppresses the
    /// default-import fallback).
    saw_documentclass: bool,
}

static RE_DOC_REGION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)\\begin\{document\}(.*?)\\end\{document\}").unwrap());

static RE_USEPACKAGE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^[ \t]*\\usepackage(?:\[[^\]]*\])?\{[^}]*\}").unwrap());

static RE_DOCUMENTCLASS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^[ \t]*\\documentclass(?:\[[^\]]*\])?\{[^}]*\}[ \t]*\n?").unwrap());

static RE_TYPST_PREAMBLE_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?m)^[ \t]*#(?:import\b|set[ \t]+(?:page|text)\b|show\b)[^\n]*\n?"#).unwrap()
});

static RE_TYPST_BARE_SPACING: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"#(v|h)\(\s*(\d+(?:\.\d+)?)\s*\)").unwrap());

/// Merge sanitized fragments into one [`CombinedDocument`].
pub fn combine(fragments: &[&str], format: DocFormat) -> CombinedDocument {
    match format {
        DocFormat::Latex => combine_latex(fragments),
        DocFormat::Typst => combine_typst(fragments),
    }
}

/// Merge and serialize in one step.
pub fn combine_to_source(fragments: &[&str], format: DocFormat) -> String {
    combine(fragments, format).serialize()
}

/// Caller-facing combination entry: structural merge, or — with the fix
/// flag and a single fragment — forward the fragment verbatim to the
/// compilation backend's correction path instead of merging.
pub async fn combine_or_fix(
    backend: &std::sync::Arc<dyn crate::recognition::RecognitionBackend>,
    fragments: &[&str],
    format: DocFormat,
    fix: bool,
) -> Result<String, crate::error::Snap2TexError> {
    if fix {
        if fragments.len() != 1 {
            return Err(crate::error::Snap2TexError::InvalidConfig(format!(
                "Fix mode takes exactly one fragment, got {}",
                fragments.len()
            )));
        }
        return crate::compile::request_fix(backend, fragments[0], format).await;
    }
    Ok(combine_to_source(fragments, format))
}

fn combine_latex(fragments: &[&str]) -> CombinedDocument {
    let mut doc = CombinedDocument {
        format: DocFormat::Latex,
        preamble: Vec::new(),
        body: Vec::new(),
        saw_documentclass: false,
    };

    for fragment in fragments {
        if RE_DOCUMENTCLASS.is_match(fragment) {
            doc.saw_documentclass = true;
        }

        if let Some(caps) = RE_DOC_REGION.captures(fragment) {
            let inner = caps.get(1).map(|m| m.as_str()).unwrap_or("").trim();
            if !inner.is_empty() {
                doc.body.push(inner.to_string());
            }
            // The remainder (everything outside the document region) only
            // contributes import statements; its own wrapper is dropped.
            let region = caps.get(0).map(|m| m.range()).unwrap_or(0..0);
            let remainder = format!("{}{}", &fragment[..region.start], &fragment[region.end..]);
            for import in RE_USEPACKAGE.find_iter(&remainder) {
                let stmt = import.as_str().trim().to_string();
                if !doc.preamble.contains(&stmt) {
                    doc.preamble.push(stmt);
                }
            }
        } else {
            // No wrapper markers: the whole fragment is body content and
            // contributes no preamble. Stray document-class lines are
            // dropped so the one-wrapper invariant holds.
            let body = RE_DOCUMENTCLASS.replace_all(fragment, "");
            let body = body.trim();
            if !body.is_empty() {
                doc.body.push(body.to_string());
            }
        }
    }

    doc
}

fn combine_typst(fragments: &[&str]) -> CombinedDocument {
    let mut doc = CombinedDocument {
        format: DocFormat::Typst,
        preamble: vec![TYPST_IMPORT_BLOCK.to_string(), TYPST_PAGE_SETUP.to_string()],
        body: Vec::new(),
        saw_documentclass: false,
    };

    for fragment in fragments {
        // Import/page-setup/show lines are regenerated once up front.
        let cleaned = RE_TYPST_PREAMBLE_LINE.replace_all(fragment, "");
        let cleaned = normalize_typst_spacing(&cleaned);
        let cleaned = cleaned.trim();
        if !cleaned.is_empty() {
            doc.body.push(cleaned.to_string());
        }
    }

    doc
}

/// Append an implicit `pt` unit to bare numeric `#v(..)` / `#h(..)`
/// arguments. Compensates for a known weakness of the upstream recognition
/// output, nothing more.
fn normalize_typst_spacing(text: &str) -> String {
    RE_TYPST_BARE_SPACING
        .replace_all(text, "#${1}(${2}pt)")
        .to_string()
}

impl CombinedDocument {
    /// Serialize into a single source string the matching compiler accepts.
    pub fn serialize(&self) -> String {
        match self.format {
            DocFormat::Latex => self.serialize_latex(),
            DocFormat::Typst => self.serialize_typst(),
        }
    }

    fn serialize_latex(&self) -> String {
        let mut out = String::from("\\documentclass{article}\n");
        if self.preamble.is_empty() {
            if !self.saw_documentclass {
                out.push_str("\\usepackage{amsmath}\n\\usepackage{amssymb}\n");
            }
        } else {
            for stmt in &self.preamble {
                out.push_str(stmt);
                out.push('\n');
            }
        }
        out.push_str("\\begin{document}\n");
        out.push_str(&self.body.join("\n\n"));
        out.push_str("\n\\end{document}\n");
        out
    }

    fn serialize_typst(&self) -> String {
        let mut out = self.preamble.join("\n");
        out.push_str("\n\n");
        out.push_str(&self.body.join("\n\n"));
        out.push('\n');
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrapped_fragment_combines_idempotently() {
        let frag = "\\usepackage{amsmath}\n\\begin{document}\nA\n\\end{document}";
        let src = combine_to_source(&[frag], DocFormat::Latex);
        assert_eq!(src.matches("\\documentclass").count(), 1);
        assert_eq!(src.matches("\\begin{document}").count(), 1);
        assert_eq!(src.matches("\\end{document}").count(), 1);
        assert!(src.contains("\nA\n"));
    }

    #[test]
    fn duplicate_imports_are_deduplicated() {
        let a = "\\usepackage{amsmath}\n\\begin{document}\nA\n\\end{document}";
        let b = "\\usepackage{amsmath}\n\\begin{document}\nB\n\\end{document}";
        let src = combine_to_source(&[a, b], DocFormat::Latex);
        assert_eq!(src.matches("\\usepackage{amsmath}").count(), 1);
        let a_pos = src.find("\nA").unwrap();
        let b_pos = src.find("\nB").unwrap();
        assert!(a_pos < b_pos, "body must stay in fragment order");
    }

    #[test]
    fn distinct_imports_are_all_kept() {
        let a = "\\usepackage{amsmath}\n\\begin{document}\nA\n\\end{document}";
        let b = "\\usepackage{graphicx}\n\\begin{document}\nB\n\\end{document}";
        let src = combine_to_source(&[a, b], DocFormat::Latex);
        assert!(src.contains("\\usepackage{amsmath}"));
        assert!(src.contains("\\usepackage{graphicx}"));
    }

    #[test]
    fn bare_fragment_becomes_body_with_default_imports() {
        let src = combine_to_source(&["E = mc^2"], DocFormat::Latex);
        assert!(src.contains("\\usepackage{amsmath}"));
        assert!(src.contains("\\usepackage{amssymb}"));
        assert!(src.contains("E = mc^2"));
        assert_eq!(src.matches("\\begin{document}").count(), 1);
    }

    #[test]
    fn fragment_declared_class_suppresses_defaults() {
        let frag = "\\documentclass{report}\n\\begin{document}\nX\n\\end{document}";
        let src = combine_to_source(&[frag], DocFormat::Latex);
        assert!(!src.contains("amsmath"));
        assert_eq!(src.matches("\\documentclass").count(), 1);
        assert!(src.starts_with("\\documentclass{article}"));
    }

    #[test]
    fn stray_documentclass_in_bare_fragment_is_dropped() {
        let frag = "\\documentclass{article}\nJust text";
        let src = combine_to_source(&[frag], DocFormat::Latex);
        assert_eq!(src.matches("\\documentclass").count(), 1);
        assert!(src.contains("Just text"));
    }

    #[test]
    fn optioned_imports_dedup_by_exact_text() {
        let a = "\\usepackage[utf8]{inputenc}\n\\begin{document}\nA\n\\end{document}";
        let b = "\\usepackage[latin1]{inputenc}\n\\begin{document}\nB\n\\end{document}";
        let src = combine_to_source(&[a, b], DocFormat::Latex);
        // Different option text means different statements.
        assert!(src.contains("\\usepackage[utf8]{inputenc}"));
        assert!(src.contains("\\usepackage[latin1]{inputenc}"));
    }

    #[test]
    fn typst_preamble_lines_are_regenerated_once() {
        let a = "#set page(margin: 1cm)\n#import \"@preview/physica:0.9.3\": *\n= Page one";
        let b = "#set text(size: 9pt)\n#show heading: set text(blue)\n= Page two";
        let src = combine_to_source(&[a, b], DocFormat::Typst);
        assert_eq!(src.matches("#set page").count(), 1);
        assert_eq!(src.matches("#import").count(), 1);
        assert!(!src.contains("#show heading"));
        assert!(src.contains("= Page one"));
        assert!(src.contains("= Page two"));
    }

    #[test]
    fn typst_bare_spacing_gets_a_unit() {
        assert_eq!(normalize_typst_spacing("#v(12)"), "#v(12pt)");
        assert_eq!(normalize_typst_spacing("#h( 3.5 )"), "#h(3.5pt)");
        // Already-united arguments are untouched.
        assert_eq!(normalize_typst_spacing("#v(1em)"), "#v(1em)");
        assert_eq!(normalize_typst_spacing("#v(2cm)"), "#v(2cm)");
    }

    #[test]
    fn typst_body_order_is_preserved() {
        let src = combine_to_source(&["first", "second"], DocFormat::Typst);
        let f = src.find("first").unwrap();
        let s = src.find("second").unwrap();
        assert!(f < s);
        assert!(src.starts_with(TYPST_IMPORT_BLOCK));
    }

    #[test]
    fn empty_fragments_do_not_add_blank_bodies() {
        let src = combine_to_source(&["", "A", "   "], DocFormat::Latex);
        assert!(src.contains("\\begin{document}\nA\n\\end{document}"));
    }
}
