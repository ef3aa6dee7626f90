/// Segment-based matcher for URL-pattern policy bindings.
///
/// Supported tokens, one per `/`-separated segment:
/// - a literal segment — matches itself exactly
/// - `*` — matches exactly one segment
/// - `{name}` — matches exactly one segment and captures it as `name`
/// - `**` — matches any number of trailing segments (only valid as the last
///   segment of a pattern)
///
/// Unlike the host-wildcard matching this is modeled on, captures are a hard
/// requirement here (policy bindings report which `{var}` values matched),
/// which is why this is hand-rolled instead of reaching for `globset`.
pub fn match_pattern<'a>(pattern: &'a str, path: &'a str) -> Option<Vec<(&'a str, &'a str)>> {
    let pattern_segments: Vec<&str> = split_path(pattern);
    let path_segments: Vec<&str> = split_path(path);

    let mut captures = Vec::new();
    match_segments(&pattern_segments, &path_segments, &mut captures)
        .then_some(())?;
    Some(captures)
}

fn split_path(path: &str) -> Vec<&str> {
    path.trim_matches('/').split('/').filter(|s| !s.is_empty()).collect()
}

fn match_segments<'a>(
    pattern: &[&'a str],
    path: &[&'a str],
    captures: &mut Vec<(&'a str, &'a str)>,
) -> bool {
    match pattern.split_first() {
        None => path.is_empty(),
        Some((&"**", _)) => true,
        Some((&seg, rest_pattern)) => {
            let Some((&path_seg, rest_path)) = path.split_first() else {
                return false;
            };

            if let Some(name) = seg.strip_prefix('{').and_then(|s| s.strip_suffix('}')) {
                captures.push((name, path_seg));
            } else if seg != "*" && seg != path_seg {
                return false;
            }

            match_segments(rest_pattern, rest_path, captures)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literal_match() {
        assert!(match_pattern("/api/v1/users", "/api/v1/users").is_some());
        assert!(match_pattern("/api/v1/users", "/api/v1/orders").is_none());
    }

    #[test]
    fn single_wildcard_matches_one_segment() {
        assert!(match_pattern("/api/*/users", "/api/v1/users").is_some());
        assert!(match_pattern("/api/*/users", "/api/v1/v2/users").is_none());
    }

    #[test]
    fn capture_extracts_value() {
        let captures = match_pattern("/users/{id}/orders", "/users/42/orders").unwrap();
        assert_eq!(captures, vec![("id", "42")]);
    }

    #[test]
    fn double_wildcard_matches_remainder() {
        assert!(match_pattern("/api/**", "/api/v1/users/42").is_some());
        assert!(match_pattern("/api/**", "/api").is_some());
    }

}
