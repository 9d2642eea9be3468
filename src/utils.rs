use std::env;
use std::time::Duration;

use regex::Regex;

/// Helper function to get environment variable with a default value
pub fn get_env_or_default(key: &str, default_value: &str) -> String {
    env::var(key).unwrap_or_else(|_| default_value.to_string())
}

/// Splits a comma separated environment value, dropping empty entries.
pub fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Parses durations such as `90s`, `15m`, `1h` or a bare number of seconds.
pub fn parse_duration(value: &str) -> Option<Duration> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }

    let (digits, unit) = match value.find(|c: char| !c.is_ascii_digit()) {
        Some(idx) => value.split_at(idx),
        None => (value, "s"),
    };
    let amount: u64 = digits.parse().ok()?;

    let seconds = match unit {
        "ms" => return Some(Duration::from_millis(amount)),
        "s" => amount,
        "m" => amount * 60,
        "h" => amount * 60 * 60,
        _ => return None,
    };
    Some(Duration::from_secs(seconds))
}

/// Shell-style glob match. `*` and `?` never cross a `/`, `[...]` and
/// `[^...]` are character classes and `\` escapes the next character.
/// A malformed pattern never matches.
pub fn glob_match(pattern: &str, value: &str) -> bool {
    match glob_to_regex(pattern) {
        Some(re) => re.is_match(value),
        None => false,
    }
}

fn glob_to_regex(pattern: &str) -> Option<Regex> {
    let mut out = String::with_capacity(pattern.len() * 2 + 2);
    out.push('^');

    let mut chars = pattern.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '*' => out.push_str("[^/]*"),
            '?' => out.push_str("[^/]"),
            '\\' => {
                let escaped = chars.next()?;
                out.push_str(&regex::escape(&escaped.to_string()));
            }
            '[' => {
                out.push('[');
                if matches!(chars.peek(), Some('^') | Some('!')) {
                    chars.next();
                    out.push('^');
                }
                let mut empty = true;
                loop {
                    match chars.next()? {
                        ']' if !empty => break,
                        '\\' => {
                            let escaped = chars.next()?;
                            out.push('\\');
                            out.push(escaped);
                        }
                        '-' => out.push('-'),
                        ch @ ('[' | ']' | '^' | '&' | '~') => {
                            out.push('\\');
                            out.push(ch);
                        }
                        ch => out.push(ch),
                    }
                    empty = false;
                }
                out.push(']');
            }
            other => out.push_str(&regex::escape(&other.to_string())),
        }
    }

    out.push('$');
    Regex::new(&out).ok()
}

/// Lexically joins and cleans unix-style container paths.
pub fn join_path(base: &str, path: &str) -> String {
    if path.starts_with('/') {
        return clean_path(path);
    }
    clean_path(&format!("{}/{}", base, path))
}

/// Resolves `.`, `..` and duplicate separators of a unix-style path.
pub fn clean_path(path: &str) -> String {
    let rooted = path.starts_with('/');
    let mut parts: Vec<&str> = Vec::new();
    for part in path.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                if parts.last().map_or(false, |p| *p != "..") {
                    parts.pop();
                } else if !rooted {
                    parts.push("..");
                }
            }
            other => parts.push(other),
        }
    }

    let joined = parts.join("/");
    match (rooted, joined.is_empty()) {
        (true, _) => format!("/{}", joined),
        (false, true) => ".".to_string(),
        (false, false) => joined,
    }
}
