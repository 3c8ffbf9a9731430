//! Turns caller-supplied source text into a buildable guest package.
//!
//! A body without an entry point is wrapped into a harness that reads one JSON
//! input, calls the body as `user_main(input: serde_json::Value) -> i64` and
//! commits the returned integer. Every source is screened against a denylist
//! first. The denylist reduces risk; isolation comes from the zkVM itself.

use crate::{
    error::{Error, Result},
    utils::sha256_hex,
};

/// A source containing this is treated as a complete guest program.
pub const GUEST_ENTRY_MARKER: &str = "fn main(";

const PACKAGE_PREFIX: &str = "guest-dyn-";

/// Matched against the comment-free source with all whitespace removed.
const DENIED_PATHS: &[(&str, &str)] = &[
    ("File::", "filesystem access"),
    ("TcpStream", "networking"),
    ("TcpListener", "networking"),
    ("UdpSocket", "networking"),
    ("Command::", "process spawning"),
    ("tokio", "async runtime"),
    ("extern\"C\"", "foreign function interface"),
    ("#[link", "foreign function interface"),
    ("#[no_mangle", "foreign function interface"),
    ("include_bytes!", "compile-time file inclusion"),
    ("include_str!", "compile-time file inclusion"),
    ("asm!", "inline assembly"),
];

/// Modules denied below any of `ROOT_CRATES`, however the path is spelled.
const DENIED_MODULES: &[(&str, &str)] = &[
    ("fs", "filesystem access"),
    ("net", "networking"),
    ("thread", "threading"),
    ("process", "process spawning"),
    ("env", "environment access"),
    ("os", "platform-specific system access"),
];

const ROOT_CRATES: &[&str] = &["std", "core", "alloc"];

/// `env::` alone is how complete guests reach `risc0_zkvm::guest::env`.
const BARE_ALLOWED: &[&str] = &["env"];

const DENIED_WORDS: &[(&str, &str)] = &[("unsafe", "raw unsafe code")];

const HARNESS_HEAD: &str = r#"#![no_main]

use risc0_zkvm::guest::env;

risc0_zkvm::guest::entry!(main);

fn user_main(input: serde_json::Value) -> i64 {
"#;

const HARNESS_TAIL: &str = r#"
}

fn main() {
    let raw: String = env::read();
    let input: serde_json::Value = serde_json::from_str(&raw).unwrap_or(serde_json::Value::Null);
    let result: i64 = user_main(input);
    env::commit(&result);
}
"#;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SynthesizedGuest {
    /// SHA-256 of the original source text. The registry key.
    pub source_hash: String,
    pub package_name: String,
    /// Contents of the package's `src/main.rs`.
    pub main_rs: String,
    pub wrapped: bool,
}

impl SynthesizedGuest {
    /// The package's `Cargo.toml`.
    pub fn cargo_toml(&self) -> String {
        format!(
            r#"[package]
name = "{}"
version = "0.1.0"
edition = "2021"

[dependencies]
risc0-zkvm = {{ version = "1", default-features = false, features = ["std"] }}
serde_json = "1.0"
"#,
            self.package_name
        )
    }
}

pub fn source_hash(source: &str) -> String {
    sha256_hex(source.as_bytes())
}

pub fn package_name(source_hash: &str) -> String {
    let short = source_hash.get(..12).unwrap_or(source_hash);
    format!("{PACKAGE_PREFIX}{short}")
}

/// Rejects sources that use a denied construct.
pub fn screen(source: &str) -> Result<()> {
    screen_tokens(&lex(source)?)
}

#[tracing::instrument(skip_all, name = "synthesize", fields(profiling_3))]
pub fn synthesize(source: &str) -> Result<SynthesizedGuest> {
    let tokens = lex(source)?;
    screen_tokens(&tokens)?;
    let source_hash = source_hash(source);
    let wrapped = !source.contains(GUEST_ENTRY_MARKER);
    let main_rs = if wrapped {
        check_balanced(&tokens)?;
        [HARNESS_HEAD, source, HARNESS_TAIL].concat()
    } else {
        source.to_string()
    };
    tracing::debug!(%source_hash, wrapped, "synthesized guest");
    Ok(SynthesizedGuest {
        package_name: package_name(&source_hash),
        source_hash,
        main_rs,
        wrapped,
    })
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum Token {
    Ident(String),
    Punct(char),
    /// String or char literal, delimiters included.
    Literal(String),
}

impl Token {
    fn is_ident(&self, name: &str) -> bool {
        matches!(self, Token::Ident(ident) if ident == name)
    }

    fn is_punct(&self, punct: char) -> bool {
        *self == Token::Punct(punct)
    }

    fn text(&self) -> String {
        match self {
            Token::Ident(text) | Token::Literal(text) => text.clone(),
            Token::Punct(c) => c.to_string(),
        }
    }
}

fn rejected(reason: &str, found: &str) -> Error {
    Error::UnsafeSourceRejected(format!("{reason} is not allowed (found `{found}`)"))
}

/// Splits source into tokens the way rustc sees them: comments (nested block
/// comments included) are dropped and literals are opaque.
fn lex(source: &str) -> Result<Vec<Token>> {
    let unterminated =
        |what: &str| Error::UnsafeSourceRejected(format!("unterminated {what} in source"));
    let chars: Vec<char> = source.chars().collect();
    let is_ident = |c: char| c.is_alphanumeric() || c == '_';
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        let next = chars.get(i + 1).copied();
        match c {
            c if c.is_whitespace() => i += 1,
            '/' if next == Some('/') => {
                while i < chars.len() && chars[i] != '\n' {
                    i += 1;
                }
            }
            '/' if next == Some('*') => {
                let mut depth = 0usize;
                loop {
                    match (chars.get(i), chars.get(i + 1)) {
                        (None, _) => return Err(unterminated("block comment")),
                        (Some('/'), Some('*')) => {
                            depth += 1;
                            i += 2;
                        }
                        (Some('*'), Some('/')) => {
                            depth -= 1;
                            i += 2;
                            if depth == 0 {
                                break;
                            }
                        }
                        _ => i += 1,
                    }
                }
            }
            '"' => {
                let start = i;
                i += 1;
                loop {
                    match chars.get(i) {
                        None => return Err(unterminated("string literal")),
                        Some('\\') => i += 2,
                        Some('"') => break,
                        Some(_) => i += 1,
                    }
                }
                i += 1;
                tokens.push(Token::Literal(chars[start..i].iter().collect()));
            }
            '\'' if next == Some('\\') => {
                let start = i;
                i += 3;
                while chars.get(i).is_some_and(|c| *c != '\'') {
                    i += 1;
                }
                if i >= chars.len() {
                    return Err(unterminated("char literal"));
                }
                i += 1;
                tokens.push(Token::Literal(chars[start..i].iter().collect()));
            }
            '\'' if chars.get(i + 2) == Some(&'\'') => {
                tokens.push(Token::Literal(chars[i..i + 3].iter().collect()));
                i += 3;
            }
            c if is_ident(c) => {
                let start = i;
                while chars.get(i).copied().is_some_and(is_ident) {
                    i += 1;
                }
                let ident: String = chars[start..i].iter().collect();
                if matches!(ident.as_str(), "r" | "br" | "cr") {
                    let mut j = i;
                    while chars.get(j) == Some(&'#') {
                        j += 1;
                    }
                    let hashes = j - i;
                    if chars.get(j) == Some(&'"') {
                        // raw string: ends at `"` followed by the same number of `#`
                        j += 1;
                        loop {
                            if j >= chars.len() {
                                return Err(unterminated("raw string literal"));
                            }
                            if chars[j] == '"'
                                && chars[j + 1..].iter().take_while(|c| **c == '#').count()
                                    >= hashes
                            {
                                j += 1 + hashes;
                                break;
                            }
                            j += 1;
                        }
                        tokens.push(Token::Literal(chars[start..j].iter().collect()));
                        i = j;
                        continue;
                    }
                    if ident == "r" && hashes == 1 && chars.get(j).copied().is_some_and(is_ident) {
                        // raw identifier, the name itself lexes next
                        i = j;
                        continue;
                    }
                }
                tokens.push(Token::Ident(ident));
            }
            c => {
                tokens.push(Token::Punct(c));
                i += 1;
            }
        }
    }
    Ok(tokens)
}

fn is_path_sep(tokens: &[Token], at: usize) -> bool {
    tokens.get(at).is_some_and(|t| t.is_punct(':'))
        && tokens.get(at + 1).is_some_and(|t| t.is_punct(':'))
}

fn denied_module(token: &Token) -> Option<(&'static str, &'static str)> {
    DENIED_MODULES
        .iter()
        .find(|(module, _)| token.is_ident(module))
        .copied()
}

fn screen_tokens(tokens: &[Token]) -> Result<()> {
    for (at, token) in tokens.iter().enumerate() {
        if let Some((word, reason)) = DENIED_WORDS.iter().find(|(word, _)| token.is_ident(word)) {
            return Err(rejected(reason, word));
        }
        let Token::Ident(ident) = token else {
            continue;
        };

        if ROOT_CRATES.contains(&ident.as_str()) {
            if tokens.get(at + 1).is_some_and(|t| t.is_ident("as")) {
                return Err(rejected("aliasing a standard crate", &format!("{ident} as")));
            }
            if !is_path_sep(tokens, at + 1) {
                continue;
            }
            match tokens.get(at + 3) {
                Some(next) if next.is_punct('{') => {
                    // `std::{...}` group, at any nesting depth
                    let mut depth = 0usize;
                    for inner in &tokens[at + 3..] {
                        if inner.is_punct('{') {
                            depth += 1;
                        } else if inner.is_punct('}') {
                            depth -= 1;
                            if depth == 0 {
                                break;
                            }
                        } else if inner.is_ident("self") {
                            let found = format!("{ident}::{{self}}");
                            return Err(rejected("aliasing a standard crate", &found));
                        } else if let Some((module, reason)) = denied_module(inner) {
                            return Err(rejected(reason, &format!("{ident}::{{{module}}}")));
                        }
                    }
                }
                Some(next) => {
                    if let Some((module, reason)) = denied_module(next) {
                        return Err(rejected(reason, &format!("{ident}::{module}")));
                    }
                }
                None => {}
            }
            continue;
        }

        // a bare `fs::` after `use std::fs` or a glob import
        let qualified = at >= 1 && tokens[at - 1].is_punct(':');
        if !qualified && is_path_sep(tokens, at + 1) && !BARE_ALLOWED.contains(&ident.as_str()) {
            if let Some((module, reason)) = denied_module(token) {
                return Err(rejected(reason, &format!("{module}::")));
            }
        }
    }

    let compact: String = tokens.iter().map(Token::text).collect();
    if let Some((pattern, reason)) = DENIED_PATHS
        .iter()
        .find(|(pattern, _)| compact.contains(pattern))
    {
        return Err(rejected(reason, pattern));
    }
    Ok(())
}

/// A wrapped body must not close the harness function early.
fn check_balanced(tokens: &[Token]) -> Result<()> {
    let mut depth = 0i64;
    for token in tokens {
        if token.is_punct('{') {
            depth += 1;
        } else if token.is_punct('}') {
            depth -= 1;
            if depth < 0 {
                return Err(Error::UnsafeSourceRejected(
                    "unbalanced `}` in function body".to_string(),
                ));
            }
        }
    }
    if depth != 0 {
        return Err(Error::UnsafeSourceRejected(
            "unbalanced `{` in function body".to_string(),
        ));
    }
    Ok(())
}
