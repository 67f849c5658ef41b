//! Detection of `${ ... }` placeholders in scalar strings.

const OPEN: &str = "${";
const CLOSE: char = '}';
const SPREAD: &str = "...";

/// Return the raw expression text when `value` is a placeholder.
///
/// The whole scalar must be a single placeholder once trailing whitespace is
/// trimmed; placeholders embedded in a larger string are not recognized.
///
/// ```
/// use plate_core::placeholder_expression;
///
/// assert_eq!(placeholder_expression("${ name }"), Some(" name "));
/// assert_eq!(placeholder_expression("${name}\n"), Some("name"));
/// assert_eq!(placeholder_expression("hello ${name}"), None);
/// ```
pub fn placeholder_expression(value: &str) -> Option<&str> {
	value.trim_end().strip_prefix(OPEN)?.strip_suffix(CLOSE)
}

/// Split a spread marker (`...`, optionally preceded by whitespace) off an
/// expression, returning the remainder when present.
pub fn spread_target(expression: &str) -> Option<&str> {
	expression.trim_start().strip_prefix(SPREAD)
}
