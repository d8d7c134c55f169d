use crate::error::SqlConduitError;
use crate::values::SqlValue;

enum State {
    Normal,
    SingleQuoted,
    DoubleQuoted,
    LineComment,
    BlockComment(u32),
    DollarQuoted(String),
}

/// Rewrite `@name` placeholders to positional `$n` placeholders.
///
/// Placeholders inside single/double-quoted literals, line and block
/// comments, and dollar-quoted blocks are left untouched. Ordinals are
/// assigned by first appearance; repeated references to the same name share
/// one ordinal. Returns the rewritten SQL plus, for each ordinal, the index
/// of the matching entry in `params`.
///
/// A placeholder with no attached parameter is a `Parameter` error;
/// attached parameters the SQL never references are ignored.
pub(super) fn resolve_named_placeholders(
    sql: &str,
    params: &[(String, SqlValue)],
) -> Result<(String, Vec<usize>), SqlConduitError> {
    let bytes = sql.as_bytes();
    let mut out: Option<String> = None;
    let mut copied = 0;
    let mut order: Vec<usize> = Vec::new();
    let mut state = State::Normal;
    let mut idx = 0;

    while idx < bytes.len() {
        let b = bytes[idx];
        match state {
            State::Normal => match b {
                b'\'' => state = State::SingleQuoted,
                b'"' => state = State::DoubleQuoted,
                b'-' if bytes.get(idx + 1) == Some(&b'-') => {
                    state = State::LineComment;
                    idx += 1;
                }
                b'/' if bytes.get(idx + 1) == Some(&b'*') => {
                    state = State::BlockComment(1);
                    idx += 1;
                }
                b'$' => {
                    if let Some((tag, close)) = try_start_dollar_quote(bytes, idx) {
                        state = State::DollarQuoted(tag);
                        idx = close;
                    }
                }
                b'@' => {
                    if let Some((end, name)) = scan_identifier(bytes, idx + 1) {
                        let pos = params
                            .iter()
                            .position(|(n, _)| n == name)
                            .ok_or_else(|| {
                                SqlConduitError::Parameter(format!(
                                    "no parameter named \"{name}\" attached to this command"
                                ))
                            })?;
                        let ordinal = match order.iter().position(|&p| p == pos) {
                            Some(i) => i + 1,
                            None => {
                                order.push(pos);
                                order.len()
                            }
                        };
                        let buf = out.get_or_insert_with(String::new);
                        buf.push_str(&sql[copied..idx]);
                        buf.push('$');
                        buf.push_str(&ordinal.to_string());
                        copied = end;
                        idx = end;
                        continue;
                    }
                }
                _ => {}
            },
            State::SingleQuoted => {
                if b == b'\'' {
                    if bytes.get(idx + 1) == Some(&b'\'') {
                        idx += 1; // skip escaped quote
                    } else {
                        state = State::Normal;
                    }
                }
            }
            State::DoubleQuoted => {
                if b == b'"' {
                    if bytes.get(idx + 1) == Some(&b'"') {
                        idx += 1; // skip escaped quote
                    } else {
                        state = State::Normal;
                    }
                }
            }
            State::LineComment => {
                if b == b'\n' {
                    state = State::Normal;
                }
            }
            State::BlockComment(depth) => {
                if b == b'/' && bytes.get(idx + 1) == Some(&b'*') {
                    state = State::BlockComment(depth + 1);
                    idx += 1;
                } else if b == b'*' && bytes.get(idx + 1) == Some(&b'/') {
                    state = if depth == 1 {
                        State::Normal
                    } else {
                        State::BlockComment(depth - 1)
                    };
                    idx += 1;
                }
            }
            State::DollarQuoted(ref tag) => {
                if b == b'$' && matches_tag(bytes, idx, tag) {
                    let tag_len = tag.len();
                    state = State::Normal;
                    idx += tag_len + 1;
                }
            }
        }
        idx += 1;
    }

    let rewritten = match out {
        Some(mut buf) => {
            buf.push_str(&sql[copied..]);
            buf
        }
        None => sql.to_owned(),
    };
    Ok((rewritten, order))
}

/// Scan an identifier starting at `start`; returns the end offset and the
/// identifier text, or `None` if `start` is not an identifier start.
fn scan_identifier(bytes: &[u8], start: usize) -> Option<(usize, &str)> {
    let first = *bytes.get(start)?;
    if !(first.is_ascii_alphabetic() || first == b'_') {
        return None;
    }
    let mut idx = start + 1;
    while idx < bytes.len() && (bytes[idx].is_ascii_alphanumeric() || bytes[idx] == b'_') {
        idx += 1;
    }
    std::str::from_utf8(&bytes[start..idx])
        .ok()
        .map(|name| (idx, name))
}

/// Detect `$tag$` at `start`; returns the tag and the offset of the closing
/// `$` of the opening delimiter.
fn try_start_dollar_quote(bytes: &[u8], start: usize) -> Option<(String, usize)> {
    let mut idx = start + 1;
    while idx < bytes.len() && bytes[idx] != b'$' {
        let b = bytes[idx];
        if !(b.is_ascii_alphanumeric() || b == b'_') {
            return None;
        }
        idx += 1;
    }
    if idx < bytes.len() && bytes[idx] == b'$' {
        let tag = String::from_utf8(bytes[start + 1..idx].to_vec()).ok()?;
        Some((tag, idx))
    } else {
        None
    }
}

fn matches_tag(bytes: &[u8], idx: usize, tag: &str) -> bool {
    let end = idx + 1 + tag.len();
    bytes.get(idx + 1..end).is_some_and(|s| s == tag.as_bytes()) && bytes.get(end) == Some(&b'$')
}
