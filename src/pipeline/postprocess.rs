//! Post-processing: deterministic cleanup of LLM-generated LaTeX.
//!
//! The prompt already asks for a bare LaTeX body, but models still wrap
//! output in fences, repeat the preamble, or leave OCR artefacts behind.
//! Each rule below is a pure `&str → String` pass; the order matters only
//! where noted.
//!
//! Rules (applied in order):
//! 1. Strip outer code fences (```` ```latex ```` / ```` ```tex ```` / bare)
//! 2. Normalise line endings (CRLF → LF)
//! 3. Trim trailing whitespace per line
//! 4. Drop preamble and `document` wrapper lines the model added anyway
//! 5. Remove OCR checkbox markers (`:selected:`, `:unselected:`)
//! 6. Strip `.png` from `\includegraphics` arguments
//! 7. Strip invisible Unicode (zero-width spaces, BOM, soft hyphens)
//! 8. Collapse 3+ consecutive blank lines down to 2
//! 9. Ensure the body ends with exactly one newline

use once_cell::sync::Lazy;
use regex::Regex;

/// Apply all cleanup rules to the raw model output.
pub fn clean_latex(input: &str) -> String {
    let s = strip_code_fences(input);
    let s = normalise_line_endings(&s);
    let s = trim_trailing_whitespace(&s);
    let s = drop_document_wrapper(&s);
    let s = remove_selection_markers(&s);
    let s = strip_png_extensions(&s);
    let s = remove_invisible_chars(&s);
    let s = collapse_blank_lines(&s);
    ensure_final_newline(&s)
}

// ── Rule 1: Strip outer code fences ──────────────────────────────────────────

static RE_OPEN_FENCE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^```[A-Za-z]*[ \t]*\r?\n?").unwrap());
static RE_CLOSE_FENCE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\r?\n?```\s*$").unwrap());

fn strip_code_fences(input: &str) -> String {
    let s = input.trim();
    if !s.starts_with("```") {
        return s.to_string();
    }
    let s = RE_OPEN_FENCE.replace(s, "");
    RE_CLOSE_FENCE.replace(&s, "").trim().to_string()
}

// ── Rule 2: Normalise line endings ───────────────────────────────────────────

fn normalise_line_endings(input: &str) -> String {
    input.replace("\r\n", "\n").replace('\r', "\n")
}

// ── Rule 3: Trim trailing whitespace per line ────────────────────────────────

fn trim_trailing_whitespace(input: &str) -> String {
    input
        .lines()
        .map(|line| line.trim_end())
        .collect::<Vec<_>>()
        .join("\n")
}

// ── Rule 4: Drop a repeated preamble ────────────────────────────────────────

static RE_WRAPPER_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*\\(documentclass|usepackage)(\[[^\]]*\])?\{[^}]*\}\s*$|^\s*\\(begin|end)\{document\}\s*$")
        .unwrap()
});

fn drop_document_wrapper(input: &str) -> String {
    input
        .lines()
        .filter(|line| !RE_WRAPPER_LINE.is_match(line))
        .collect::<Vec<_>>()
        .join("\n")
}

// ── Rule 5: OCR selection markers ────────────────────────────────────────────

static RE_SELECTION: Lazy<Regex> = Lazy::new(|| Regex::new(r"[ \t]?:(un)?selected:").unwrap());

fn remove_selection_markers(input: &str) -> String {
    RE_SELECTION.replace_all(input, "").to_string()
}

// ── Rule 6: `.png` in \includegraphics ───────────────────────────────────────

static RE_INCLUDE_PNG: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(\\includegraphics(?:\[[^\]]*\])?\{[^}]*?)\.png\}").unwrap()
});

fn strip_png_extensions(input: &str) -> String {
    RE_INCLUDE_PNG.replace_all(input, "$1}").to_string()
}

// ── Rule 7: Remove invisible Unicode characters ─────────────────────────────

fn remove_invisible_chars(input: &str) -> String {
    input.replace(
        [
            '\u{200B}', '\u{FEFF}', '\u{00AD}', '\u{200C}', '\u{200D}', '\u{2060}',
        ],
        "",
    )
}

// ── Rule 8: Collapse excessive blank lines ───────────────────────────────────

static RE_BLANK_LINES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{4,}").unwrap());

fn collapse_blank_lines(input: &str) -> String {
    RE_BLANK_LINES.replace_all(input, "\n\n\n").to_string()
}

// ── Rule 9: Single final newline ─────────────────────────────────────────────

fn ensure_final_newline(input: &str) -> String {
    let trimmed = input.trim_end();
    if trimmed.is_empty() {
        String::from("\n")
    } else {
        format!("{}\n", trimmed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_latex_fence() {
        assert_eq!(
            strip_code_fences("```latex\n\\section*{A}\n```"),
            "\\section*{A}"
        );
    }

    #[test]
    fn strips_bare_fence() {
        assert_eq!(strip_code_fences("```\nx\n```\n"), "x");
    }

    #[test]
    fn unfenced_passthrough() {
        assert_eq!(strip_code_fences("\\item a"), "\\item a");
    }

    #[test]
    fn inner_fences_survive() {
        let input = "\\begin{verbatim}\n```\n\\end{verbatim}";
        assert_eq!(strip_code_fences(input), input);
    }

    #[test]
    fn drops_repeated_preamble() {
        let input = "\\documentclass{article}\n\\usepackage[utf8]{inputenc}\n\\begin{document}\nBody\n\\end{document}";
        assert_eq!(drop_document_wrapper(input), "Body");
    }

    #[test]
    fn keeps_other_environments() {
        let input = "\\begin{enumerate}\n\\item x\n\\end{enumerate}";
        assert_eq!(drop_document_wrapper(input), input);
    }

    #[test]
    fn removes_selection_markers() {
        assert_eq!(
            remove_selection_markers("(a) 2 N :selected: (b) 4 N :unselected:"),
            "(a) 2 N (b) 4 N"
        );
    }

    #[test]
    fn strips_png_in_includegraphics() {
        let input = "\\includegraphics[width=0.8\\textwidth]{figures/figure_1_0.png}";
        assert_eq!(
            strip_png_extensions(input),
            "\\includegraphics[width=0.8\\textwidth]{figures/figure_1_0}"
        );
        assert_eq!(
            strip_png_extensions("\\includegraphics{a.png} and file.png"),
            "\\includegraphics{a} and file.png"
        );
    }

    #[test]
    fn removes_invisible() {
        assert_eq!(remove_invisible_chars("a\u{200B}b\u{FEFF}c"), "abc");
    }

    #[test]
    fn collapses_blank_lines() {
        assert_eq!(collapse_blank_lines("a\n\n\n\n\n\nb"), "a\n\n\nb");
    }

    #[test]
    fn final_newline() {
        assert_eq!(ensure_final_newline("x\n\n"), "x\n");
        assert_eq!(ensure_final_newline(""), "\n");
    }

    #[test]
    fn full_pipeline() {
        let raw = "```latex\r\n\\documentclass{article}\r\n\\begin{document}\r\n\\section*{Section A}   \r\n\
                   \\item Charge :selected:\r\n\r\n\r\n\r\n\r\n\
                   \\includegraphics{figures/figure_2_0.png}\r\n\\end{document}\r\n```";
        let out = clean_latex(raw);
        assert_eq!(
            out,
            "\\section*{Section A}\n\\item Charge\n\n\n\\includegraphics{figures/figure_2_0}\n"
        );
    }
}
