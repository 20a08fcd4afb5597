use std::borrow::Cow;
use std::fmt;

fn escape_single_quotes(input: &str) -> Cow<'_, str> {
    if input.contains('\'') {
        Cow::Owned(input.replace('\'', "\\'"))
    } else {
        Cow::Borrowed(input)
    }
}

/// Quotes a user-facing name the way diagnostics print identifiers.
pub fn quoted(name: &str) -> String {
    format!("'{}'", escape_single_quotes(name))
}

/// Renders `file:line:column: level: message`, dropping whichever location
/// parts are unknown.
pub fn format_location(
    file: Option<&str>,
    position: Option<(usize, usize)>,
    level: &str,
    message: impl fmt::Display,
) -> String {
    match (file, position) {
        (Some(file), Some((line, column))) => {
            format!("{file}:{line}:{column}: {level}: {message}")
        }
        (Some(file), None) => format!("{file}: {level}: {message}"),
        (None, Some((line, column))) => format!("{line}:{column}: {level}: {message}"),
        (None, None) => format!("{level}: {message}"),
    }
}

/// Joins already-described items with `", "`.
pub fn join_described<I, S>(items: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    items
        .into_iter()
        .map(|item| item.as_ref().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

pub fn plural(count: usize, singular: &str, plural: &str) -> String {
    if count == 1 {
        format!("{count} {singular}")
    } else {
        format!("{count} {plural}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_all_location_shapes() {
        assert_eq!(
            format_location(Some("foo.py"), Some((3, 4)), "error", "bad"),
            "foo.py:3:4: error: bad"
        );
        assert_eq!(
            format_location(Some("foo.py"), None, "warning", "odd"),
            "foo.py: warning: odd"
        );
        assert_eq!(format_location(None, None, "error", "bad"), "error: bad");
    }

    #[test]
    fn quotes_escape_embedded_quotes() {
        assert_eq!(quoted("it's"), "'it\\'s'");
        assert_eq!(quoted("x"), "'x'");
    }

    #[test]
    fn pluralises_counts() {
        assert_eq!(plural(1, "argument", "arguments"), "1 argument");
        assert_eq!(plural(2, "argument", "arguments"), "2 arguments");
    }
}
