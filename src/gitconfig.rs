//! The Git configuration text format used by profile files.
//!
//! Profiles are written in the same `[section]` / `key = value` syntax as
//! `~/.gitconfig`, so they can be reviewed and edited by hand. This module
//! holds the ordered [`Settings`] map and converts it to and from that text.

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Ordered mapping of fully-qualified keys (`user.name`, `remote.origin.url`)
/// to string values. Insertion order is kept for display and round trips.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Settings {
    entries: Vec<(String, String)>,
}

impl Settings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a value. A replaced key keeps its original position.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Settings {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut settings = Settings::new();
        for (k, v) in iter {
            settings.insert(k, v);
        }
        settings
    }
}

impl Serialize for Settings {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (k, v) in &self.entries {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Settings {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct SettingsVisitor;

        impl<'de> Visitor<'de> for SettingsVisitor {
            type Value = Settings;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map of configuration keys to string values")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Settings, A::Error> {
                let mut settings = Settings::new();
                while let Some((k, v)) = access.next_entry::<String, String>()? {
                    settings.insert(k, v);
                }
                Ok(settings)
            }
        }

        deserializer.deserialize_map(SettingsVisitor)
    }
}

/// A parse failure with the 1-based line it occurred on
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    pub line: usize,
    pub reason: String,
}

impl ParseError {
    fn new(line: usize, reason: impl Into<String>) -> Self {
        Self {
            line,
            reason: reason.into(),
        }
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}: {}", self.line, self.reason)
    }
}

/// Split and normalize a fully-qualified key.
///
/// Section and variable names are case-insensitive in Git and are lowercased;
/// the subsection (middle part) is kept verbatim.
pub fn normalize_key(key: &str) -> Result<String, String> {
    let (section, rest) = key
        .split_once('.')
        .ok_or_else(|| format!("key '{}' has no section (expected section.name)", key))?;
    let (subsection, name) = match rest.rsplit_once('.') {
        Some((sub, name)) => (Some(sub), name),
        None => (None, rest),
    };

    validate_section_name(section).map_err(|r| format!("key '{}': {}", key, r))?;
    validate_variable_name(name).map_err(|r| format!("key '{}': {}", key, r))?;

    let mut normalized = section.to_ascii_lowercase();
    if let Some(sub) = subsection {
        if sub.contains('\n') {
            return Err(format!("key '{}': subsection contains a newline", key));
        }
        normalized.push('.');
        normalized.push_str(sub);
    }
    normalized.push('.');
    normalized.push_str(&name.to_ascii_lowercase());
    Ok(normalized)
}

fn validate_section_name(section: &str) -> Result<(), String> {
    if section.is_empty() {
        return Err("empty section name".to_string());
    }
    if !section
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-')
    {
        return Err(format!("invalid section name '{}'", section));
    }
    Ok(())
}

fn validate_variable_name(name: &str) -> Result<(), String> {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() => {}
        _ => return Err(format!("invalid variable name '{}'", name)),
    }
    if !chars.all(|c| c.is_ascii_alphanumeric() || c == '-') {
        return Err(format!("invalid variable name '{}'", name));
    }
    Ok(())
}

/// Parse configuration text into ordered settings.
pub fn parse(text: &str) -> Result<Settings, ParseError> {
    let mut settings = Settings::new();
    let mut section: Option<String> = None;
    let lines: Vec<&str> = text.lines().collect();
    let mut idx = 0;

    while idx < lines.len() {
        let line_no = idx + 1;
        let line = lines[idx].trim();
        idx += 1;

        if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
            continue;
        }

        if line.starts_with('[') {
            let (header, rest) = parse_section_header(line, line_no)?;
            section = Some(header);
            // `[user] name = x` is legal Git syntax
            let rest = rest.trim();
            if rest.is_empty() || rest.starts_with('#') || rest.starts_with(';') {
                continue;
            }
            let current = section.as_deref().unwrap_or_default();
            let (name, value) = parse_assignment(rest, &lines, &mut idx, line_no)?;
            settings.insert(format!("{}.{}", current, name), value);
            continue;
        }

        let Some(current) = section.as_deref() else {
            return Err(ParseError::new(line_no, "key outside of any [section]"));
        };
        let (name, value) = parse_assignment(line, &lines, &mut idx, line_no)?;
        settings.insert(format!("{}.{}", current, name), value);
    }

    Ok(settings)
}

/// Returns the normalized `section` or `section.subsection` and whatever
/// follows the closing bracket.
fn parse_section_header(line: &str, line_no: usize) -> Result<(String, &str), ParseError> {
    let chars: Vec<char> = line.chars().collect();
    let mut name = String::new();
    let mut pos = 1;

    while pos < chars.len() && chars[pos] != ']' && chars[pos] != '"' && !chars[pos].is_whitespace()
    {
        name.push(chars[pos]);
        pos += 1;
    }

    // Legacy `[section.subsection]` form; Git lowercases the subsection here
    let (section, mut subsection) = match name.split_once('.') {
        Some((s, sub)) => (s.to_string(), Some(sub.to_ascii_lowercase())),
        None => (name.clone(), None),
    };
    validate_section_name(&section).map_err(|r| ParseError::new(line_no, r))?;

    while pos < chars.len() && chars[pos].is_whitespace() {
        pos += 1;
    }

    if pos < chars.len() && chars[pos] == '"' {
        if subsection.is_some() {
            return Err(ParseError::new(line_no, "malformed section header"));
        }
        pos += 1;
        let mut sub = String::new();
        loop {
            match chars.get(pos) {
                None => {
                    return Err(ParseError::new(line_no, "unterminated subsection name"));
                }
                Some('"') => {
                    pos += 1;
                    break;
                }
                Some('\\') => {
                    match chars.get(pos + 1) {
                        Some(c) => sub.push(*c),
                        None => {
                            return Err(ParseError::new(line_no, "unterminated subsection name"));
                        }
                    }
                    pos += 2;
                }
                Some(c) => {
                    sub.push(*c);
                    pos += 1;
                }
            }
        }
        subsection = Some(sub);
    }

    if chars.get(pos) != Some(&']') {
        return Err(ParseError::new(
            line_no,
            "unterminated section header (missing ']')",
        ));
    }
    pos += 1;

    let mut header = section.to_ascii_lowercase();
    if let Some(sub) = subsection {
        header.push('.');
        header.push_str(&sub);
    }

    let consumed: usize = chars[..pos].iter().map(|c| c.len_utf8()).sum();
    Ok((header, &line[consumed..]))
}

/// Parse `name = value` (or a bare `name`), following `\` continuations.
fn parse_assignment(
    line: &str,
    lines: &[&str],
    idx: &mut usize,
    line_no: usize,
) -> Result<(String, String), ParseError> {
    let (name, raw_value) = match line.split_once('=') {
        Some((n, v)) => (n.trim(), Some(v)),
        None => (line.trim(), None),
    };
    validate_variable_name(name).map_err(|r| ParseError::new(line_no, r))?;
    let name = name.to_ascii_lowercase();

    let Some(raw_value) = raw_value else {
        return Ok((name, "true".to_string()));
    };

    let mut value = String::new();
    let mut pending_ws = String::new();
    let mut in_quotes = false;
    let mut current: Vec<char> = raw_value.chars().collect();
    let mut current_line = line_no;
    let mut pos = 0;
    let mut started = false;

    loop {
        let Some(&c) = current.get(pos) else {
            if in_quotes {
                return Err(ParseError::new(current_line, "unterminated quoted value"));
            }
            break;
        };
        pos += 1;

        match c {
            '\\' => {
                let Some(&next) = current.get(pos) else {
                    // Line continuation
                    let Some(next_line) = lines.get(*idx) else {
                        return Err(ParseError::new(
                            current_line,
                            "line continuation at end of file",
                        ));
                    };
                    *idx += 1;
                    current_line += 1;
                    current = next_line.chars().collect();
                    pos = 0;
                    continue;
                };
                pos += 1;
                let escaped = match next {
                    'n' => '\n',
                    't' => '\t',
                    'b' => '\u{8}',
                    '"' => '"',
                    '\\' => '\\',
                    other => {
                        return Err(ParseError::new(
                            current_line,
                            format!("invalid escape sequence '\\{}'", other),
                        ));
                    }
                };
                value.push_str(&pending_ws);
                pending_ws.clear();
                value.push(escaped);
                started = true;
            }
            '"' => {
                value.push_str(&pending_ws);
                pending_ws.clear();
                in_quotes = !in_quotes;
                started = true;
            }
            '#' | ';' if !in_quotes => break,
            c if c.is_whitespace() && !in_quotes => {
                if started {
                    pending_ws.push(c);
                }
            }
            c => {
                value.push_str(&pending_ws);
                pending_ws.clear();
                value.push(c);
                started = true;
            }
        }
    }

    Ok((name, value))
}

/// Render settings as configuration text.
///
/// A new header is emitted whenever the section changes between consecutive
/// keys, so parsing the output yields the same keys in the same order.
pub fn render(settings: &Settings) -> String {
    let mut out = String::new();
    let mut current: Option<&str> = None;

    for (key, value) in settings.iter() {
        let Some((section, name)) = key.rsplit_once('.') else {
            continue;
        };
        if current != Some(section) {
            out.push_str(&render_header(section));
            out.push('\n');
            current = Some(section);
        }
        out.push('\t');
        out.push_str(name);
        out.push_str(" = ");
        out.push_str(&render_value(value));
        out.push('\n');
    }

    out
}

fn render_header(section: &str) -> String {
    match section.split_once('.') {
        Some((name, sub)) => {
            let escaped = sub.replace('\\', "\\\\").replace('"', "\\\"");
            format!("[{} \"{}\"]", name, escaped)
        }
        None => format!("[{}]", section),
    }
}

fn render_value(value: &str) -> String {
    let needs_quotes = value != value.trim()
        || value.contains(['#', ';'])
        || value.is_empty();

    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => escaped.push_str("\\\\"),
            '"' => escaped.push_str("\\\""),
            '\n' => escaped.push_str("\\n"),
            '\t' => escaped.push_str("\\t"),
            '\u{8}' => escaped.push_str("\\b"),
            c => escaped.push(c),
        }
    }

    if needs_quotes {
        format!("\"{}\"", escaped)
    } else {
        escaped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_basic_profile() {
        let text = "[user]\n\tname = Ann\n\temail = ann@x.com\n[core]\n\teditor = nano\n";
        let settings = parse(text).unwrap();

        let keys: Vec<&str> = settings.keys().collect();
        assert_eq!(keys, vec!["user.name", "user.email", "core.editor"]);
        assert_eq!(settings.get("user.name"), Some("Ann"));
        assert_eq!(settings.get("core.editor"), Some("nano"));
    }

    #[test]
    fn test_parse_subsections_comments_and_case() {
        let text = r#"
# leading comment
[User]
    Name = Ann W   ; trailing comment
[url "git@github.com:"]
    insteadOf = https://github.com/
[commit]
    gpgsign
"#;
        let settings = parse(text).unwrap();
        assert_eq!(settings.get("user.name"), Some("Ann W"));
        assert_eq!(
            settings.get("url.git@github.com:.insteadof"),
            Some("https://github.com/")
        );
        assert_eq!(settings.get("commit.gpgsign"), Some("true"));
    }

    #[test]
    fn test_legacy_subsection_is_lowercased() {
        let settings = parse("[Branch.Main]\n\tremote = origin\n[branch \"Dev\"]\n\tremote = fork\n").unwrap();
        assert_eq!(settings.get("branch.main.remote"), Some("origin"));
        assert_eq!(settings.get("branch.Dev.remote"), Some("fork"));
        assert_eq!(settings.len(), 2);
    }

    #[test]
    fn test_parse_quoted_values_and_escapes() {
        let text = "[alias]\n\tlg = \"log --oneline # not a comment\"\n\tpad = \"  x  \"\n\tq = say \\\"hi\\\"\n";
        let settings = parse(text).unwrap();
        assert_eq!(settings.get("alias.lg"), Some("log --oneline # not a comment"));
        assert_eq!(settings.get("alias.pad"), Some("  x  "));
        assert_eq!(settings.get("alias.q"), Some("say \"hi\""));
    }

    #[test]
    fn test_parse_line_continuation() {
        let text = "[alias]\n\tlong = one \\\ntwo\n";
        let settings = parse(text).unwrap();
        assert_eq!(settings.get("alias.long"), Some("one two"));
    }

    #[test]
    fn test_parse_errors_report_line() {
        let err = parse("[user\n\tname = x\n").unwrap_err();
        assert_eq!(err.line, 1);
        assert!(err.reason.contains("unterminated section header"));

        let err = parse("name = orphan\n").unwrap_err();
        assert_eq!(err.line, 1);
        assert!(err.reason.contains("outside"));

        let err = parse("[user]\n\tname = \"open\n").unwrap_err();
        assert_eq!(err.line, 2);

        let err = parse("[user]\n\t1bad = x\n").unwrap_err();
        assert_eq!(err.line, 2);

        let err = parse("[remote \"origin]\n").unwrap_err();
        assert!(err.reason.contains("subsection"));
    }

    #[test]
    fn test_render_preserves_interleaved_order() {
        let settings: Settings = [
            ("user.name", "Ann"),
            ("core.editor", "vim"),
            ("user.email", "ann@x.com"),
            ("remote.my origin.url", "git@host:repo.git"),
        ]
        .into_iter()
        .collect();

        let text = render(&settings);
        let parsed = parse(&text).unwrap();
        assert_eq!(parsed, settings);
        assert!(text.contains("[remote \"my origin\"]"));
    }

    #[test]
    fn test_render_quotes_special_values() {
        let settings: Settings = [
            ("alias.c", "commit # quick"),
            ("user.name", " spaced "),
            ("core.pager", "less \"-R\""),
        ]
        .into_iter()
        .collect();

        let text = render(&settings);
        assert!(text.contains("c = \"commit # quick\""));
        assert_eq!(parse(&text).unwrap(), settings);
    }

    #[test]
    fn test_insert_replaces_in_place() {
        let mut settings = Settings::new();
        settings.insert("user.name", "a");
        settings.insert("user.email", "b");
        settings.insert("user.name", "c");

        let pairs: Vec<(&str, &str)> = settings.iter().collect();
        assert_eq!(pairs, vec![("user.name", "c"), ("user.email", "b")]);
    }

    #[test]
    fn test_normalize_key() {
        assert_eq!(normalize_key("User.Name").unwrap(), "user.name");
        assert_eq!(
            normalize_key("Remote.Origin.URL").unwrap(),
            "remote.Origin.url"
        );
        assert!(normalize_key("nosection").is_err());
        assert!(normalize_key("user.").is_err());
        assert!(normalize_key("bad section.key").is_err());
    }

    #[test]
    fn test_settings_json_keeps_order() {
        let settings: Settings = [("z.last", "1"), ("a.first", "2")].into_iter().collect();
        let json = serde_json::to_string(&settings).unwrap();
        assert_eq!(json, r#"{"z.last":"1","a.first":"2"}"#);

        let back: Settings = serde_json::from_str(&json).unwrap();
        assert_eq!(back, settings);
    }
}
