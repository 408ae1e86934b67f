//! Command-line splitting for remote `run` requests.
//!
//! Remote clients send a single command string. It is split into an argument
//! vector here and passed verbatim to process creation, never through a
//! shell, so shell metacharacters carry no meaning.

/// Split a command line into arguments.
///
/// Whitespace outside a double-quoted span separates arguments; a `"`
/// toggles quoting and is dropped from the argument. There are no escape
/// sequences. An unterminated quote is treated as if closed at end of input.
pub fn split_command_line(input: &str) -> Vec<String> {
    let mut args = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;

    for ch in input.chars() {
        match ch {
            '"' => in_quotes = !in_quotes,
            c if c.is_whitespace() && !in_quotes => {
                if !current.is_empty() {
                    args.push(std::mem::take(&mut current));
                }
            }
            c => current.push(c),
        }
    }
    if !current.is_empty() {
        args.push(current);
    }
    args
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_on_whitespace() {
        assert_eq!(split_command_line("echo hi"), vec!["echo", "hi"]);
    }

    #[test]
    fn quoted_span_keeps_spaces() {
        assert_eq!(
            split_command_line(r#"probe "a b" c"#),
            vec!["probe", "a b", "c"]
        );
    }

    #[test]
    fn quotes_are_dropped_mid_token() {
        assert_eq!(split_command_line(r#"a"b c"d"#), vec!["ab cd"]);
    }

    #[test]
    fn unterminated_quote_is_lenient() {
        assert_eq!(split_command_line(r#"echo "a b"#), vec!["echo", "a b"]);
    }

    #[test]
    fn collapses_repeated_whitespace() {
        assert_eq!(split_command_line("ls   -l\t/tmp"), vec!["ls", "-l", "/tmp"]);
    }

    #[test]
    fn empty_input_yields_no_arguments() {
        assert!(split_command_line("").is_empty());
        assert!(split_command_line("   ").is_empty());
    }

    #[test]
    fn empty_quotes_yield_no_argument() {
        assert_eq!(split_command_line(r#"echo """#), vec!["echo"]);
    }

    #[test]
    fn metacharacters_are_plain_arguments() {
        assert_eq!(
            split_command_line("ls | grep foo && pwd"),
            vec!["ls", "|", "grep", "foo", "&&", "pwd"]
        );
    }
}
