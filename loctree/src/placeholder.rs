//! Placeholder extraction and checks.
//!
//! Two token styles occur in game text:
//! - printf-style: `%s`, `%d`, `%1$s`, `%05d` (`%%` is a literal percent)
//! - format items and grammar symbols: `{0}`, `{PAWN_labelShort}` (`{{` and
//!   `}}` are literal braces)

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PlaceholderKind {
    Printf,
    Brace,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PlaceholderToken {
    pub kind: PlaceholderKind,
    /// Positional index for `%1$s`, or the numeric item of `{1}`.
    pub index: Option<usize>,
    /// Conversion letter for printf tokens, the inner name for brace tokens.
    pub name: String,
}

impl PlaceholderToken {
    pub fn to_signature(&self) -> String {
        match (self.kind, self.index) {
            (PlaceholderKind::Printf, Some(i)) => format!("%{i}${}", self.name),
            (PlaceholderKind::Printf, None) => format!("%{}", self.name),
            (PlaceholderKind::Brace, _) => format!("{{{}}}", self.name),
        }
    }
}

const CONVERSIONS: &[u8] = b"sdifuxXeEgGc";

/// Parses a printf token starting at the `%` at `i`. Returns the token and
/// the index just past it.
fn printf_at(bytes: &[u8], i: usize) -> Option<(PlaceholderToken, usize)> {
    let mut j = i + 1;

    // Optional positional index: digits followed by '$'
    let mut index = None;
    let start_digits = j;
    while j < bytes.len() && bytes[j].is_ascii_digit() {
        j += 1;
    }
    if j > start_digits && j < bytes.len() && bytes[j] == b'$' {
        index = std::str::from_utf8(&bytes[start_digits..j])
            .ok()
            .and_then(|s| s.parse::<usize>().ok());
        j += 1;
    } else {
        j = start_digits;
    }

    // Flags and width, then an optional precision.
    while j < bytes.len() && (bytes[j].is_ascii_digit() || matches!(bytes[j], b'-' | b'+' | b'#')) {
        j += 1;
    }
    if j < bytes.len() && bytes[j] == b'.' {
        j += 1;
        while j < bytes.len() && bytes[j].is_ascii_digit() {
            j += 1;
        }
    }
    // Length modifiers (l/ll)
    while j < bytes.len() && bytes[j] == b'l' {
        j += 1;
    }

    let ch = *bytes.get(j)?;
    if !CONVERSIONS.contains(&ch) {
        return None;
    }
    let name = match ch {
        b'i' => "d".to_string(),
        c => (c as char).to_ascii_lowercase().to_string(),
    };
    Some((
        PlaceholderToken {
            kind: PlaceholderKind::Printf,
            index,
            name,
        },
        j + 1,
    ))
}

fn brace_at(input: &str, i: usize) -> Option<(PlaceholderToken, usize)> {
    let rest = &input[i + 1..];
    let end = rest.find(['}', '{'])?;
    if rest.as_bytes()[end] != b'}' || end == 0 {
        return None;
    }
    let inner = &rest[..end];
    // `{0:N1}` and `{0,5}` carry format details after the item.
    let name = inner.split([':', ',']).next().unwrap_or(inner).trim();
    Some((
        PlaceholderToken {
            kind: PlaceholderKind::Brace,
            index: name.parse().ok(),
            name: name.to_string(),
        },
        i + 1 + end + 1,
    ))
}

/// Placeholder tokens of `input` in occurrence order.
pub fn extract_placeholders(input: &str) -> Vec<PlaceholderToken> {
    let bytes = input.as_bytes();
    let mut out = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'%' if bytes.get(i + 1) == Some(&b'%') => i += 2,
            b'{' if bytes.get(i + 1) == Some(&b'{') => i += 2,
            b'%' => match printf_at(bytes, i) {
                Some((token, next)) => {
                    out.push(token);
                    i = next;
                }
                None => i += 1,
            },
            b'{' => match brace_at(input, i) {
                Some((token, next)) => {
                    out.push(token);
                    i = next;
                }
                None => i += 1,
            },
            _ => i += 1,
        }
    }
    out
}

/// Sorted token signatures, for comparing two texts regardless of order.
pub fn signature(input: &str) -> Vec<String> {
    let mut sig: Vec<String> = extract_placeholders(input)
        .iter()
        .map(PlaceholderToken::to_signature)
        .collect();
    sig.sort();
    sig
}

/// True when a `%` starts something that looks like a token but is not one,
/// e.g. `%q` or `%1$`. A `%` before whitespace, punctuation or the end of
/// the text is a literal percent sign.
pub fn is_bad_percent(text: &str) -> bool {
    let bytes = text.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] != b'%' {
            i += 1;
            continue;
        }
        if bytes.get(i + 1) == Some(&b'%') {
            i += 2;
            continue;
        }
        if let Some((_, next)) = printf_at(bytes, i) {
            i = next;
            continue;
        }
        if bytes.get(i + 1).is_some_and(|b| b.is_ascii_alphanumeric() || *b == b'$') {
            return true;
        }
        i += 1;
    }
    false
}

/// True when `{` and `}` do not pair up. Doubled braces are literals.
pub fn has_unbalanced_braces(text: &str) -> bool {
    let bytes = text.as_bytes();
    let mut depth = 0usize;
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'{' if bytes.get(i + 1) == Some(&b'{') => i += 1,
            b'}' if bytes.get(i + 1) == Some(&b'}') && depth == 0 => i += 1,
            b'{' => {
                if depth > 0 {
                    return true;
                }
                depth += 1;
            }
            b'}' => {
                if depth == 0 {
                    return true;
                }
                depth -= 1;
            }
            _ => {}
        }
        i += 1;
    }
    depth != 0
}

/// Problems with the placeholders of a single text.
pub fn check(text: &str) -> Vec<&'static str> {
    let mut problems = Vec::new();
    if is_bad_percent(text) {
        problems.push("malformed % placeholder");
    }
    if has_unbalanced_braces(text) {
        problems.push("unbalanced braces");
    }
    problems
}
