//! Prompts and document template for LaTeX generation.
//!
//! All prompt text lives here so it can be inspected in unit tests and
//! overridden via [`crate::config::PipelineConfig::system_prompt`] without
//! touching retry logic in [`crate::pipeline::llm`].

/// Preamble every generated body is wrapped in. The packages cover what the
/// system prompt asks the model to use (physics notation, `[H]` floats,
/// labelled enumerations).
pub const LATEX_PREAMBLE: &str = "\\documentclass{article}\n\
\\usepackage{amsmath, amssymb, physics, graphicx, float, enumitem}\n";

/// Default system prompt for turning an exam paper's ordered text into a
/// LaTeX body.
pub const DEFAULT_SYSTEM_PROMPT: &str = r#"You typeset scanned exam papers in LaTeX. The user message is the OCR text of one paper in reading order, paragraphs separated by blank lines, with figures marked inline as [FIGURE: <path>].

Produce the LaTeX BODY only. Do not emit \documentclass, \usepackage, \begin{document} or \end{document}; the caller wraps your output in a preamble that loads amsmath, amssymb, physics, graphicx, float and enumitem.

1. STRUCTURE
   - Section headings such as "SECTION - A" become \section*{Section A}.
   - Numbered questions become items of an enumerate environment. Sub-parts like (i), (ii) nest as \begin{enumerate}[label=(roman*)]; answer options like (a), (b) nest as \begin{enumerate}[label=(alph*)].
   - Bulleted instructions become itemize lists. Headings such as "General Instructions:" use \textbf{...}.
   - Header lines that pair two fields ("Class: XII   Date: ...") use \hfill between them.

2. MATHEMATICS
   - Inline math in $...$, display math in $$...$$.
   - Vectors \vec{v}, unit vectors \hat{n}, matrices \mathbf{M}, dot and cross products with \cdot and \times.
   - Units in text mode inside math, e.g. $5\,\mu\text{C}$.

3. OCR REPAIR
   - Fix obvious OCR misspellings; leave a word alone when unsure.
   - Escape LaTeX specials in text (\&, \%, \#, \_).
   - Drop OCR checkbox artefacts such as ":selected:" and ":unselected:".

4. FIGURES
   - Replace every [FIGURE: <path>] marker, at exactly its position, with:
     \begin{figure}[H]
     \centering
     \includegraphics[width=0.8\textwidth]{<path without .png>}
     \caption{<short caption inferred from the surrounding question>}
     \label{fig:fig<N>}
     \end{figure}
   - Number labels fig:fig1, fig:fig2, ... in order of appearance.
   - A marker with an empty path has no image: omit it.
   - Never skip or reorder figures.

5. OUTPUT
   - Only the LaTeX body. No code fences, no commentary."#;

/// User message carrying the ordered text.
pub fn latex_user_message(text: &str) -> String {
    format!("Convert this exam paper to a LaTeX body.\n\n{text}")
}

/// Wrap a generated body in the standard preamble and `document` environment.
pub fn wrap_document(body: &str) -> String {
    format!(
        "{LATEX_PREAMBLE}\n\\begin{{document}}\n\n{}\n\n\\end{{document}}\n",
        body.trim()
    )
}
