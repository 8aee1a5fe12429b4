use owo_colors::OwoColorize;

use super::ParseError;
use super::source_map::SourceText;

/// Renders a parse error as `error[CODE]: message` followed by the offending
/// line and a caret under the token. `styled` adds ANSI colors.
pub fn render_source_error(source: &str, name: &str, err: &ParseError, styled: bool) -> String {
    let header = format!("error[{}]", err.code());
    let header = if styled {
        header.bright_red().bold().to_string()
    } else {
        header
    };

    match render_snippet(&SourceText::new(name, source), err, styled) {
        Some(snippet) => format!("{header}: {}", snippet.trim_end()),
        None => format!("{header}: {} (offset {})", err.message, err.offset),
    }
}

fn render_snippet(source: &SourceText<'_>, err: &ParseError, styled: bool) -> Option<String> {
    let (line, col) = source.line_col(err.offset.min(source.text.len()))?;
    let line_text = source.line_text(line)?;
    let width = err.token.chars().count().max(1);
    let pointer = format!("{}{}", " ".repeat(col.saturating_sub(1)), "^".repeat(width));
    let pointer = if styled {
        pointer.bright_red().to_string()
    } else {
        pointer
    };
    Some(format!(
        "{}\n --> {}:{line}:{col}\n  |\n{line:>3} | {line_text}\n  | {pointer}",
        err.message, source.name
    ))
}

/// One-line runtime failure, e.g. for the CLI.
#[cfg(feature = "runtime")]
pub fn render_vm_error(err: &crate::vm::VmError, styled: bool) -> String {
    let label = if styled {
        "runtime error".bright_red().bold().to_string()
    } else {
        "runtime error".to_string()
    };
    format!("{label}: {err}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::ParseErrorKind;

    #[test]
    fn caret_points_at_the_token() {
        let source = "(int x) =>\n  (x + 1]";
        let offset = source.find(']').expect("bracket");
        let err = ParseError::new(ParseErrorKind::UnmatchedScope, "unexpected ']'", "]", offset);
        let rendered = render_source_error(source, "rule", &err, false);
        assert!(rendered.starts_with("error[E_UNMATCHED_SCOPE]: unexpected ']'"));
        assert!(rendered.contains(" --> rule:2:9"));
        assert!(rendered.contains("  2 |   (x + 1]"));
        assert!(rendered.ends_with("  |         ^"));
    }

    #[test]
    fn end_of_input_errors_still_render() {
        let source = "(int x) => x +";
        let err = ParseError::new(
            ParseErrorKind::WrongSymbol,
            "expected an expression, found end of input",
            "",
            source.len(),
        );
        let rendered = render_source_error(source, "rule", &err, false);
        assert!(rendered.contains(" --> rule:1:15"));
    }
}
