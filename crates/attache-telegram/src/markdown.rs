//! Markdown sanitizer for the chat transport.
//!
//! Generated text arrives in generic markdown; the transport's dialect only
//! renders single-character emphasis markers and chokes on pipe tables. The
//! transform is pure and total: fenced code blocks pass through byte-for-byte.

use std::sync::LazyLock;

use regex::Regex;

static FENCE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```.*?```").expect("valid regex"));
static BOLD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\*\*(.+?)\*\*").expect("valid regex"));
static UNDERLINE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"__(.+?)__").expect("valid regex"));
static STRIKE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"~~(.+?)~~").expect("valid regex"));

/// Rewrite markdown into the transport-safe dialect.
///
/// 1. Fenced code blocks are swapped for positional placeholders so nothing
///    inside them is touched (first closing fence wins).
/// 2. Contiguous runs of pipe-table rows are wrapped in their own fence so
///    they render monospaced.
/// 3. `**x**` becomes `*x*`, `__x__` becomes `_x_`, `~~x~~` loses its
///    markers. Each rule runs once, left to right, within single lines.
/// 4. The protected blocks are restored verbatim.
pub fn sanitize(text: &str) -> String {
    let (mut out, blocks) = protect_fences(text);

    out = promote_tables(&out);
    out = BOLD_RE.replace_all(&out, "*$1*").into_owned();
    out = UNDERLINE_RE.replace_all(&out, "_$1_").into_owned();
    out = STRIKE_RE.replace_all(&out, "$1").into_owned();

    for (i, block) in blocks.iter().enumerate() {
        out = out.replace(&placeholder(i), block);
    }
    out
}

fn placeholder(i: usize) -> String {
    format!("\u{0}FENCE{i}\u{0}")
}

fn protect_fences(input: &str) -> (String, Vec<String>) {
    let mut blocks = Vec::new();
    let out = FENCE_RE.replace_all(input, |caps: &regex::Captures| {
        let idx = blocks.len();
        blocks.push(caps[0].to_string());
        placeholder(idx)
    });
    (out.into_owned(), blocks)
}

fn is_table_row(line: &str) -> bool {
    let trimmed = line.trim_end();
    trimmed.len() >= 2 && trimmed.starts_with('|') && trimmed.ends_with('|')
}

fn promote_tables(input: &str) -> String {
    let lines: Vec<&str> = input.split('\n').collect();
    let mut out: Vec<&str> = Vec::with_capacity(lines.len());
    let mut i = 0usize;
    while i < lines.len() {
        if is_table_row(lines[i]) {
            out.push("```");
            while i < lines.len() && is_table_row(lines[i]) {
                out.push(lines[i]);
                i += 1;
            }
            out.push("```");
        } else {
            out.push(lines[i]);
            i += 1;
        }
    }
    out.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inline_styles() {
        assert_eq!(sanitize("**a** __b__ ~~c~~"), "*a* _b_ c");
    }

    #[test]
    fn test_code_block_contents_untouched() {
        let md = "before\n```rust\nlet x = \"**not bold**\";\n```\nafter **b**";
        let out = sanitize(md);
        assert!(out.contains("let x = \"**not bold**\";"));
        assert!(out.ends_with("after *b*"));
    }

    #[test]
    fn test_first_closing_fence_wins() {
        let md = "```a```";
        assert_eq!(sanitize(md), "```a```");

        let md = "```one``` mid ```two```";
        let out = sanitize(md);
        assert!(out.contains("```one```"));
        assert!(out.contains("```two```"));
        assert!(out.contains(" mid "));
    }

    #[test]
    fn test_table_wrapped_in_fence() {
        let md = "| a | b |\n| 1 | 2 |\nprose **x**";
        assert_eq!(sanitize(md), "```\n| a | b |\n| 1 | 2 |\n```\nprose *x*");
    }

    #[test]
    fn test_table_after_prose_keeps_leading_newline() {
        let md = "intro\n| a |  \n| b |";
        assert_eq!(sanitize(md), "intro\n```\n| a |  \n| b |\n```");
    }

    #[test]
    fn test_table_inside_code_block_untouched() {
        let md = "```\n| a | b |\n| 1 | 2 |\n```";
        assert_eq!(sanitize(md), md);
    }

    #[test]
    fn test_idempotent_on_sanitized_output() {
        let once = sanitize("plain text with *emphasis* and _underscore_");
        assert_eq!(sanitize(&once), once);
    }

    #[test]
    fn test_unclosed_fence_left_alone() {
        let md = "```rust\nunfinished **bold**";
        // No closing fence: nothing is protected, inline rules still apply.
        assert_eq!(sanitize(md), "```rust\nunfinished *bold*");
    }

    #[test]
    fn test_strike_does_not_cross_lines() {
        let md = "~~a\nb~~";
        assert_eq!(sanitize(md), md);
    }
}
