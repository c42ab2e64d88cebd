//! Query string parsing and pattern matching.
//!
//! Query parameters are multi-valued: `foo=1&foo=2` keeps both values in
//! order. A pattern matches an observed query string when both carry the
//! same set of keys and every observed value is accepted by the pattern.

use std::collections::HashMap;

/// Value that accepts any observed values for its key.
pub const WILDCARD: &str = "*";

/// Parsed query parameters, in order of appearance per key.
pub type QueryParams = HashMap<String, Vec<String>>;

/// Parse a query string into key/values pairs.
///
/// A leading `?` is ignored, as are empty `&`-separated segments. A segment
/// without `=` is a key with an empty value.
pub fn parse(query: &str) -> QueryParams {
    let mut params: QueryParams = HashMap::new();
    let query = query.strip_prefix('?').unwrap_or(query);

    for part in query.split('&') {
        if part.is_empty() {
            continue;
        }
        let (key, value) = part.split_once('=').unwrap_or((part, ""));
        params
            .entry(decode(key))
            .or_default()
            .push(decode(value));
    }

    params
}

/// Check an observed query string against a pattern query string.
pub fn is_match(pattern: &str, query: &str) -> bool {
    let expected = parse(pattern);
    let observed = parse(query);

    if expected.len() != observed.len() {
        return false;
    }

    expected.iter().all(|(key, accepted)| {
        let Some(values) = observed.get(key) else {
            return false;
        };
        if accepted.len() == 1 && accepted[0] == WILDCARD {
            return true;
        }
        values.iter().all(|v| accepted.contains(v))
    })
}

/// Percent-decoding with `+` as space. Malformed escapes are kept verbatim.
fn decode(s: &str) -> String {
    let s = s.replace('+', " ");
    String::from_utf8_lossy(&urlencoding::decode_binary(s.as_bytes())).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_query_string() {
        let params = parse("?hello=world&foo=bar");
        assert_eq!(params["hello"], vec!["world"]);
        assert_eq!(params["foo"], vec!["bar"]);

        let params = parse("name=John%20Doe&city=New+York");
        assert_eq!(params["name"], vec!["John Doe"]);
        assert_eq!(params["city"], vec!["New York"]);

        let params = parse("sum=1%2B1&name=caf%C3%A9");
        assert_eq!(params["sum"], vec!["1+1"]);
        assert_eq!(params["name"], vec!["café"]);
    }

    #[test]
    fn test_parse_empty() {
        assert!(parse("").is_empty());
        assert!(parse("?").is_empty());
        assert!(parse("&&").is_empty());
    }

    #[test]
    fn test_parse_repeated_keys() {
        let params = parse("&foo=1&&foo=2&bar&");
        assert_eq!(params["foo"], vec!["1", "2"]);
        assert_eq!(params["bar"], vec![""]);
        assert_eq!(params.len(), 2);
    }

    #[test]
    fn test_parse_splits_on_first_equals() {
        let params = parse("expr=a=b");
        assert_eq!(params["expr"], vec!["a=b"]);
    }

    #[test]
    fn test_malformed_escape_kept() {
        let params = parse("p=100%&q=%zz&r=%4");
        assert_eq!(params["p"], vec!["100%"]);
        assert_eq!(params["q"], vec!["%zz"]);
        assert_eq!(params["r"], vec!["%4"]);
    }

    #[test]
    fn test_wildcard_value() {
        assert!(is_match("hello=world&foo=*", "hello=world&foo=bar"));
        assert!(is_match("hello=world&foo=*", "hello=world&foo=1&foo=1"));
    }

    #[test]
    fn test_key_count_mismatch() {
        assert!(!is_match("hello=world&foo=*", "hello=world"));
        assert!(!is_match("hello=world", "hello=world&foo=bar"));
    }

    #[test]
    fn test_missing_key() {
        assert!(!is_match("hello=world&foo=bar", "hello=world&bar=foo"));
    }

    #[test]
    fn test_value_mismatch() {
        assert!(!is_match("hello=world&foo=bar", "hello=world&foo=foo"));
    }

    #[test]
    fn test_repeated_values_any_order() {
        assert!(is_match("foo=1&foo=2", "foo=2&foo=1"));
        assert!(is_match("foo=1&foo=2", "foo=1&foo=1"));
        assert!(!is_match("foo=1&foo=2", "foo=1&foo=3"));
    }

    #[test]
    fn test_empty_pattern_matches_empty_query() {
        assert!(is_match("", ""));
        assert!(is_match("?", ""));
        assert!(!is_match("", "a=1"));
    }
}
