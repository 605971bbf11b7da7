//! Helpers for asserting on a text exposition in tests.
//!
//! Enabled for this crate's own tests and, through the `test-utils` feature,
//! for downstream integration tests.

/// Value of the series `name` whose label set is exactly `labels`.
///
/// Label order does not matter. Returns `None` when no such series exists.
pub fn sample_value(body: &str, name: &str, labels: &[(&str, &str)]) -> Option<f64> {
    body.lines()
        .filter(|line| !line.starts_with('#'))
        .find_map(|line| {
            let (series, value) = line.rsplit_once(' ')?;
            let (series_name, series_labels) = match series.split_once('{') {
                Some((n, rest)) => (n, parse_labels(rest.strip_suffix('}')?)?),
                None => (series, Vec::new()),
            };

            if series_name != name || series_labels.len() != labels.len() {
                return None;
            }
            let matches = labels
                .iter()
                .all(|(k, v)| series_labels.iter().any(|(sk, sv)| sk == k && sv == v));
            if !matches {
                return None;
            }
            value.parse().ok()
        })
}

/// `# TYPE` declared for the family `name`, if present.
pub fn family_type<'a>(body: &'a str, name: &str) -> Option<&'a str> {
    body.lines().find_map(|line| {
        let rest = line.strip_prefix("# TYPE ")?;
        let (family, kind) = rest.split_once(' ')?;
        (family == name).then_some(kind)
    })
}

/// Parse `a="x",b="y"` into pairs, honouring `\"`, `\\` and `\n` escapes.
fn parse_labels(raw: &str) -> Option<Vec<(String, String)>> {
    let mut labels = Vec::new();
    let mut chars = raw.chars().peekable();

    while chars.peek().is_some() {
        let key: String = chars.by_ref().take_while(|c| *c != '=').collect();
        if chars.next()? != '"' {
            return None;
        }

        let mut value = String::new();
        loop {
            match chars.next()? {
                '\\' => match chars.next()? {
                    'n' => value.push('\n'),
                    other => value.push(other),
                },
                '"' => break,
                c => value.push(c),
            }
        }
        labels.push((key.trim().to_string(), value));

        if chars.peek() == Some(&',') {
            chars.next();
        }
    }

    Some(labels)
}
