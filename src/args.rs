//! Splitting of a command line into arguments, with the quoting rules of `redis-cli`.

use itertools::Itertools;

use crate::{Error, Result};

/// Splits `line` into arguments.
///
/// Arguments are separated by whitespace. Double quoted arguments understand the `\n`, `\r`,
/// `\t`, `\b`, `\a`, `\\`, `\"` and `\xHH` escapes, single quoted ones only `\'`. A closing quote
/// must be followed by whitespace or the end of the line.
pub fn split_args(line: &str) -> Result<Vec<String>> {
    let bytes = line.as_bytes();
    let mut args = Vec::new();
    let mut i = 0;

    loop {
        while i < bytes.len() && bytes[i].is_ascii_whitespace() {
            i += 1;
        }
        if i == bytes.len() {
            return Ok(args);
        }

        let mut current: Vec<u8> = Vec::new();
        let mut in_double = false;
        let mut in_single = false;

        loop {
            if in_double {
                let Some(&c) = bytes.get(i) else {
                    return Err(unbalanced(line));
                };
                if c == b'\\' && i + 3 < bytes.len() && bytes[i + 1] == b'x' {
                    if let Some(byte) = hex_pair(bytes[i + 2], bytes[i + 3]) {
                        current.push(byte);
                        i += 4;
                        continue;
                    }
                }
                if c == b'\\' && i + 1 < bytes.len() {
                    let escaped = match bytes[i + 1] {
                        b'n' => b'\n',
                        b'r' => b'\r',
                        b't' => b'\t',
                        b'b' => 0x08,
                        b'a' => 0x07,
                        other => other,
                    };
                    current.push(escaped);
                    i += 2;
                } else if c == b'"' {
                    // Closing quote must be followed by a space or nothing at all.
                    if bytes.get(i + 1).is_some_and(|b| !b.is_ascii_whitespace()) {
                        return Err(unbalanced(line));
                    }
                    i += 1;
                    break;
                } else {
                    current.push(c);
                    i += 1;
                }
            } else if in_single {
                let Some(&c) = bytes.get(i) else {
                    return Err(unbalanced(line));
                };
                if c == b'\\' && bytes.get(i + 1) == Some(&b'\'') {
                    current.push(b'\'');
                    i += 2;
                } else if c == b'\'' {
                    if bytes.get(i + 1).is_some_and(|b| !b.is_ascii_whitespace()) {
                        return Err(unbalanced(line));
                    }
                    i += 1;
                    break;
                } else {
                    current.push(c);
                    i += 1;
                }
            } else {
                match bytes.get(i) {
                    None => break,
                    Some(c) if c.is_ascii_whitespace() => break,
                    Some(b'"') => {
                        in_double = true;
                        i += 1;
                    }
                    Some(b'\'') => {
                        in_single = true;
                        i += 1;
                    }
                    Some(&c) => {
                        current.push(c);
                        i += 1;
                    }
                }
            }
        }

        args.push(String::from_utf8_lossy(&current).into_owned());
    }
}

/// Quotes `arg` so that [`split_args`] returns it unchanged.
pub fn quote_arg(arg: &str) -> String {
    let needs_quotes = arg.is_empty()
        || arg
            .bytes()
            .any(|b| b.is_ascii_whitespace() || b == b'"' || b == b'\'' || b == b'\\' || !is_print(b));
    if !needs_quotes {
        return arg.to_string();
    }

    let mut quoted = String::with_capacity(arg.len() + 2);
    quoted.push('"');
    for c in arg.chars() {
        match c {
            '\\' => quoted.push_str("\\\\"),
            '"' => quoted.push_str("\\\""),
            '\n' => quoted.push_str("\\n"),
            '\r' => quoted.push_str("\\r"),
            '\t' => quoted.push_str("\\t"),
            '\u{07}' => quoted.push_str("\\a"),
            '\u{08}' => quoted.push_str("\\b"),
            c if c.is_ascii_control() => quoted.push_str(&format!("\\x{:02x}", c as u8)),
            c => quoted.push(c),
        }
    }
    quoted.push('"');
    quoted
}

/// Quotes a binary argument. Bytes that are not valid UTF-8 are written as `\xHH` escapes.
pub fn quote_bytes(arg: &[u8]) -> String {
    if let Ok(arg) = std::str::from_utf8(arg) {
        return quote_arg(arg);
    }

    let mut quoted = String::with_capacity(arg.len() * 2 + 2);
    quoted.push('"');
    for &b in arg {
        match b {
            b'\\' => quoted.push_str("\\\\"),
            b'"' => quoted.push_str("\\\""),
            b if (0x20..0x7f).contains(&b) => quoted.push(b as char),
            b => quoted.push_str(&format!("\\x{b:02x}")),
        }
    }
    quoted.push('"');
    quoted
}

/// Joins arguments back into a single line.
pub fn join_args<I, S>(args: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<[u8]>,
{
    args.into_iter().map(|a| quote_bytes(a.as_ref())).join(" ")
}

fn is_print(b: u8) -> bool {
    !b.is_ascii() || (0x20..0x7f).contains(&b)
}

fn hex_pair(high: u8, low: u8) -> Option<u8> {
    let high = (high as char).to_digit(16)?;
    let low = (low as char).to_digit(16)?;
    Some((high * 16 + low) as u8)
}

fn unbalanced(line: &str) -> Error {
    Error::Argument(format!("unbalanced quotes in {line:?}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_words() {
        let args = split_args("  SET  key   value ").unwrap();
        assert_eq!(args, vec!["SET", "key", "value"]);
    }

    #[test]
    fn empty_line() {
        assert!(split_args("   ").unwrap().is_empty());
    }

    #[test]
    fn double_quotes_with_escapes() {
        let args = split_args(r#"SET "my key" "a\nb\x41\"""#).unwrap();
        assert_eq!(args, vec!["SET", "my key", "a\nbA\""]);
    }

    #[test]
    fn single_quotes() {
        let args = split_args(r"SET 'it\'s' 'x y'").unwrap();
        assert_eq!(args, vec!["SET", "it's", "x y"]);
    }

    #[test]
    fn empty_quoted_argument() {
        let args = split_args(r#"SET key """#).unwrap();
        assert_eq!(args, vec!["SET", "key", ""]);
    }

    #[test]
    fn unterminated_quote_is_an_error() {
        let err = split_args(r#"SET "key value"#).unwrap_err();
        assert!(matches!(err, Error::Argument(_)));
    }

    #[test]
    fn closing_quote_must_end_the_argument() {
        let err = split_args(r#"SET "key"value"#).unwrap_err();
        assert!(matches!(err, Error::Argument(_)));
    }

    #[test]
    fn join_quotes_what_needs_quoting() {
        let line = join_args(["SET", "my key", "", "plain"]);
        assert_eq!(line, r#"SET "my key" "" plain"#);
        assert_eq!(
            split_args(&line).unwrap(),
            vec!["SET", "my key", "", "plain"]
        );
    }

    #[test]
    fn invalid_utf8_is_escaped() {
        let line = join_args([&b"TYPE"[..], &b"k\xff\"x"[..]]);
        assert_eq!(line, r#"TYPE "k\xff\"x""#);
    }
}
