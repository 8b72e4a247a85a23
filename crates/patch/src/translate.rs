//! Rewrites Solidity-flavoured guard conditions into the low-level guard language.
//!
//! Substitution is token-based and single-pass: each identifier in the input is looked up
//! once, so `owner_count` is left alone and a replacement is never rescanned.

/// Identifier rewrites, in the order they are documented to users.
pub const SUBSTITUTIONS: [(&str, &str); 3] = [
    ("owner", "0"),
    ("msg.sender", "caller()"),
    ("msg.value", "callvalue()"),
];

/// Translates `expression`, replacing whole identifiers from [`SUBSTITUTIONS`].
pub fn translate(expression: &str) -> String {
    let mut out = String::with_capacity(expression.len() + 16);
    let mut rest = expression;

    while let Some(first) = rest.chars().next() {
        let token_len = if is_ident_start(first) {
            identifier_len(rest)
        } else if first.is_ascii_digit() {
            rest.find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
                .unwrap_or(rest.len())
        } else {
            first.len_utf8()
        };

        let (token, tail) = rest.split_at(token_len);
        match SUBSTITUTIONS.iter().find(|(from, _)| *from == token) {
            Some((_, to)) => out.push_str(to),
            None => out.push_str(token),
        }
        rest = tail;
    }

    if out != expression {
        tracing::debug!("Translated guard `{}` -> `{}`", expression, out);
    }
    out
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_' || c == '$'
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '$'
}

/// Length of the dotted identifier at the start of `input` (`msg.sender`, `a.b.c`).
fn identifier_len(input: &str) -> usize {
    let bytes = input.as_bytes();
    let mut end = 0;
    loop {
        while end < bytes.len() && is_ident_char(bytes[end] as char) {
            end += 1;
        }
        let continues = end + 1 < bytes.len()
            && bytes[end] == b'.'
            && is_ident_start(bytes[end + 1] as char);
        if !continues {
            return end;
        }
        end += 1;
    }
}
