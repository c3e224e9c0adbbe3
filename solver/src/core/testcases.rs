//! Parsing of textual test-case input tuples.
//!
//! Test inputs are stored as a textual tuple of arguments, e.g.
//! `([2,7,11,15], 9)` or `("abc", ['a', 'b'])`. Splitting on every comma is
//! incorrect: commas inside bracketed sequences and quoted strings must not
//! split fields. The splitter below tracks nesting depth and quote state.

use anyhow::{Result, anyhow};

use crate::core::types::Problem;

/// One rendered per-test invocation: argument literals in problem order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub args: Vec<String>,
}

impl Invocation {
    /// Render the call expression for the harness, e.g. `two_sum([2,7], 9)`.
    pub fn call_expr(&self, entry_point: &str) -> String {
        format!("{}({})", entry_point, self.args.join(", "))
    }
}

/// Split a top-level comma-separated tuple into its fields.
///
/// Strips one pair of outer parentheses when present. Bracketed sequences
/// (`[]`, `{}`, `()`) and single/double-quoted strings (with backslash
/// escapes) are treated as atomic.
pub fn split_top_level(input: &str) -> Vec<String> {
    let inner = strip_outer_parens(input.trim());
    if inner.trim().is_empty() {
        return Vec::new();
    }

    let mut fields = Vec::new();
    let mut current = String::new();
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut escaped = false;

    for ch in inner.chars() {
        if let Some(open) = quote {
            current.push(ch);
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == open {
                quote = None;
            }
            continue;
        }
        match ch {
            '"' | '\'' => {
                quote = Some(ch);
                current.push(ch);
            }
            '[' | '{' | '(' => {
                depth += 1;
                current.push(ch);
            }
            ']' | '}' | ')' => {
                depth = depth.saturating_sub(1);
                current.push(ch);
            }
            ',' if depth == 0 => {
                fields.push(current.trim().to_string());
                current.clear();
            }
            _ => current.push(ch),
        }
    }
    fields.push(current.trim().to_string());
    fields
}

fn strip_outer_parens(input: &str) -> &str {
    let Some(stripped) = input.strip_prefix('(').and_then(|s| s.strip_suffix(')')) else {
        return input;
    };
    // Only strip when the outer pair actually encloses the whole tuple,
    // not e.g. `(1), (2)`.
    let mut depth = 0i64;
    for (index, ch) in stripped.char_indices() {
        match ch {
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth < 0 && index < stripped.len() - 1 {
                    return input;
                }
            }
            _ => {}
        }
    }
    if depth < 0 { input } else { stripped }
}

/// Parse one test-case input into an invocation using the problem's
/// parameter-name mapping. The field count must match the parameter count.
pub fn parse_invocation(problem: &Problem, input: &str) -> Result<Invocation> {
    let args = split_top_level(input);
    if !problem.param_names.is_empty() && args.len() != problem.param_names.len() {
        return Err(anyhow!(
            "test input '{}' has {} fields but problem '{}' declares {} parameters",
            input,
            args.len(),
            problem.id,
            problem.param_names.len()
        ));
    }
    Ok(Invocation { args })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::Problem;

    fn problem(param_names: &[&str]) -> Problem {
        Problem {
            id: "two-sum".to_string(),
            title: "Two Sum".to_string(),
            difficulty: "easy".to_string(),
            description: "find indices".to_string(),
            starter_code: String::new(),
            entry_point: "two_sum".to_string(),
            param_names: param_names.iter().map(|s| s.to_string()).collect(),
            test_cases: Vec::new(),
        }
    }

    #[test]
    fn splits_simple_tuple() {
        assert_eq!(split_top_level("(1, 2, 3)"), vec!["1", "2", "3"]);
    }

    #[test]
    fn bracketed_sequences_are_atomic() {
        assert_eq!(
            split_top_level("([2,7,11,15], 9)"),
            vec!["[2,7,11,15]", "9"]
        );
        assert_eq!(
            split_top_level("({1: [2, 3]}, (4, 5))"),
            vec!["{1: [2, 3]}", "(4, 5)"]
        );
    }

    #[test]
    fn quoted_strings_are_atomic() {
        assert_eq!(
            split_top_level(r#"("a, b", 'c, d')"#),
            vec![r#""a, b""#, "'c, d'"]
        );
        assert_eq!(
            split_top_level(r#"("quote \" and, comma", 1)"#),
            vec![r#""quote \" and, comma""#, "1"]
        );
    }

    #[test]
    fn nested_brackets_keep_depth() {
        assert_eq!(
            split_top_level("[[1, 2], [3, 4]], [5]"),
            vec!["[[1, 2], [3, 4]]", "[5]"]
        );
    }

    #[test]
    fn outer_parens_stripped_only_when_enclosing() {
        assert_eq!(split_top_level("(1), (2)"), vec!["(1)", "(2)"]);
        assert_eq!(split_top_level("(1, (2))"), vec!["1", "(2)"]);
    }

    #[test]
    fn empty_input_yields_no_fields() {
        assert_eq!(split_top_level(""), Vec::<String>::new());
        assert_eq!(split_top_level("()"), Vec::<String>::new());
    }

    #[test]
    fn invocation_renders_call_expression() {
        let p = problem(&["nums", "target"]);
        let invocation = parse_invocation(&p, "([2,7,11,15], 9)").expect("parse");
        assert_eq!(invocation.call_expr("two_sum"), "two_sum([2,7,11,15], 9)");
    }

    #[test]
    fn arity_mismatch_is_an_error() {
        let p = problem(&["nums", "target"]);
        let err = parse_invocation(&p, "(1, 2, 3)").expect_err("arity");
        assert!(err.to_string().contains("3 fields"));
    }
}
