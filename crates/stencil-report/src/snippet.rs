//! Line-anchored source snippets.

/// Extract a source snippet around a 1-based failing line.
///
/// The failing line is prefixed with a `>>` marker; when a 1-based column is
/// given, a caret line follows it. `radius` lines of context are shown on
/// each side.
///
/// ```text
///    2 | const a = 1
/// >> 3 | broken(
///      |       ^
///    4 | const b = 2
/// ```
pub fn source_snippet(source: &str, line: usize, column: Option<usize>, radius: usize) -> String {
    let lines: Vec<&str> = source.lines().collect();
    if line == 0 || line > lines.len() {
        return String::new();
    }

    let first = line.saturating_sub(radius).max(1);
    let last = (line + radius).min(lines.len());
    let gutter = last.to_string().len();

    let mut out = String::new();
    for n in first..=last {
        let text = lines[n - 1];
        if n == line {
            out.push_str(&format!(">> {:>gutter$} | {}\n", n, text));
            if let Some(col) = column {
                let col = col.max(1);
                out.push_str(&format!(
                    "   {:>gutter$} | {}^\n",
                    "",
                    " ".repeat(col - 1)
                ));
            }
        } else {
            out.push_str(&format!("   {:>gutter$} | {}\n", n, text));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn doc() -> String {
        (1..=12).map(|n| format!("line {}\n", n)).collect()
    }

    #[test]
    fn marks_failing_line() {
        let snippet = source_snippet(&doc(), 6, None, 2);
        assert_eq!(
            snippet,
            "   4 | line 4\n   5 | line 5\n>> 6 | line 6\n   7 | line 7\n   8 | line 8\n"
        );
    }

    #[test]
    fn caret_is_column_aligned() {
        let snippet = source_snippet("abcdef\n", 1, Some(3), 5);
        assert_eq!(snippet, ">> 1 | abcdef\n   1 |   ^\n");
    }

    #[test]
    fn clamps_at_document_edges() {
        let snippet = source_snippet(&doc(), 1, None, 5);
        assert!(snippet.starts_with(">> 1 | line 1\n"));
        assert!(snippet.ends_with("   6 | line 6\n"));
    }

    #[test]
    fn out_of_range_line_yields_nothing() {
        assert_eq!(source_snippet("one line\n", 99, None, 5), "");
        assert_eq!(source_snippet("one line\n", 0, None, 5), "");
    }
}
