// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Extraction of the pinned packages from a Bazel `WORKSPACE` file.
//!
//! Only top-level calls of the form
//!
//! ```text
//! rpm(
//!     name = "bash-0__5.2.26-3.fc40.x86_64",
//!     sha256 = "...",
//!     urls = ["https://...", "https://..."],
//! )
//! ```
//!
//! are of interest; this is not a Starlark interpreter, everything else is
//! tokenized and skipped.

use crate::verify::PackageDescriptor;
use anyhow::{anyhow, bail, Result};
use camino::Utf8Path;
use fn_error_context::context;
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Tok {
    Ident(String),
    Str(String),
    Punct(char),
}

#[derive(Debug)]
struct Token {
    tok: Tok,
    line: usize,
}

struct Lexer<'a> {
    chars: std::iter::Peekable<std::str::Chars<'a>>,
    line: usize,
}

impl<'a> Lexer<'a> {
    fn new(src: &'a str) -> Self {
        Self {
            chars: src.chars().peekable(),
            line: 1,
        }
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.chars.next();
        if c == Some('\n') {
            self.line += 1;
        }
        c
    }

    fn eat(&mut self, c: char) -> bool {
        if self.chars.peek() == Some(&c) {
            self.bump();
            true
        } else {
            false
        }
    }

    fn string(&mut self, quote: char, raw: bool) -> Result<String> {
        let start = self.line;
        let mut triple = false;
        if self.eat(quote) {
            if !self.eat(quote) {
                // ""
                return Ok(String::new());
            }
            triple = true;
        }
        let mut s = String::new();
        loop {
            let c = self
                .bump()
                .ok_or_else(|| anyhow!("line {start}: unterminated string"))?;
            match c {
                c if c == quote => {
                    if !triple {
                        return Ok(s);
                    }
                    if self.eat(quote) {
                        if self.eat(quote) {
                            return Ok(s);
                        }
                        s.push(quote);
                    }
                    s.push(quote);
                }
                '\n' if !triple => bail!("line {start}: unterminated string"),
                '\\' => {
                    let e = self
                        .bump()
                        .ok_or_else(|| anyhow!("line {start}: unterminated string"))?;
                    if raw {
                        s.push('\\');
                        s.push(e);
                        continue;
                    }
                    match e {
                        'n' => s.push('\n'),
                        't' => s.push('\t'),
                        'r' => s.push('\r'),
                        '\n' => {}
                        '\\' | '\'' | '"' => s.push(e),
                        e => {
                            s.push('\\');
                            s.push(e);
                        }
                    }
                }
                c => s.push(c),
            }
        }
    }

    fn tokenize(mut self) -> Result<Vec<Token>> {
        let mut out = Vec::new();
        while let Some(&c) = self.chars.peek() {
            let line = self.line;
            let tok = match c {
                '#' => {
                    while !matches!(self.chars.peek(), None | Some('\n')) {
                        self.bump();
                    }
                    continue;
                }
                c if c.is_whitespace() => {
                    self.bump();
                    continue;
                }
                '"' | '\'' => {
                    self.bump();
                    Tok::Str(self.string(c, false)?)
                }
                c if c.is_alphanumeric() || c == '_' => {
                    let mut ident = String::new();
                    while let Some(&c) = self.chars.peek() {
                        if !(c.is_alphanumeric() || c == '_') {
                            break;
                        }
                        ident.push(c);
                        self.bump();
                    }
                    // String prefixes
                    let raw = ident.eq_ignore_ascii_case("r");
                    match self.chars.peek() {
                        Some(&q @ ('"' | '\'')) if raw || ident.eq_ignore_ascii_case("b") => {
                            self.bump();
                            Tok::Str(self.string(q, raw)?)
                        }
                        _ => Tok::Ident(ident),
                    }
                }
                c => {
                    self.bump();
                    Tok::Punct(c)
                }
            };
            out.push(Token { tok, line });
        }
        Ok(out)
    }
}

/// The value of a keyword argument, as far as we care.
#[derive(Debug, PartialEq, Eq)]
enum Value {
    Str(String),
    List(Vec<String>),
    Other,
}

struct Parser {
    toks: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Tok> {
        self.toks.get(self.pos).map(|t| &t.tok)
    }

    fn peek_at(&self, n: usize) -> Option<&Tok> {
        self.toks.get(self.pos + n).map(|t| &t.tok)
    }

    fn is_punct(&self, n: usize, c: char) -> bool {
        self.peek_at(n) == Some(&Tok::Punct(c))
    }

    fn line(&self) -> usize {
        self.toks
            .get(self.pos)
            .or_else(|| self.toks.last())
            .map_or(1, |t| t.line)
    }

    /// Skip one argument expression, stopping before the `,` or `)` that ends it.
    fn skip_expr(&mut self) -> Result<()> {
        let mut depth = 0usize;
        while let Some(tok) = self.peek() {
            match tok {
                Tok::Punct('(' | '[' | '{') => depth += 1,
                Tok::Punct(')' | ']' | '}') if depth == 0 => return Ok(()),
                Tok::Punct(')' | ']' | '}') => depth -= 1,
                Tok::Punct(',') if depth == 0 => return Ok(()),
                _ => {}
            }
            self.pos += 1;
        }
        bail!("line {}: unexpected end of file", self.line())
    }

    fn ends_arg(&self, n: usize) -> bool {
        self.is_punct(n, ',') || self.is_punct(n, ')')
    }

    /// A string literal or a list of string literals; anything else is skipped.
    fn value(&mut self) -> Result<Value> {
        if let Some(Tok::Str(s)) = self.peek() {
            if self.ends_arg(1) {
                let s = s.clone();
                self.pos += 1;
                return Ok(Value::Str(s));
            }
        }
        if self.is_punct(0, '[') {
            let mut items = Vec::new();
            let mut n = 1;
            loop {
                match self.peek_at(n) {
                    Some(Tok::Str(s)) => {
                        items.push(s.clone());
                        n += 1;
                        if self.is_punct(n, ',') {
                            n += 1;
                        } else if !self.is_punct(n, ']') {
                            break;
                        }
                    }
                    Some(Tok::Punct(']')) => {
                        if self.ends_arg(n + 1) {
                            self.pos += n + 1;
                            return Ok(Value::List(items));
                        }
                        break;
                    }
                    _ => break,
                }
            }
        }
        self.skip_expr()?;
        Ok(Value::Other)
    }

    /// Parse the arguments of a call; the opening parenthesis has been consumed.
    fn kwargs(&mut self) -> Result<BTreeMap<String, Value>> {
        let mut kwargs = BTreeMap::new();
        loop {
            match self.peek() {
                None => bail!("line {}: unexpected end of file", self.line()),
                Some(Tok::Punct(')')) => {
                    self.pos += 1;
                    return Ok(kwargs);
                }
                Some(Tok::Punct(',')) => self.pos += 1,
                Some(Tok::Ident(k)) if self.is_punct(1, '=') && !self.is_punct(2, '=') => {
                    let k = k.clone();
                    self.pos += 2;
                    let v = self.value()?;
                    kwargs.insert(k, v);
                }
                Some(_) => self.skip_expr()?,
            }
        }
    }

    fn rpm_rule(&mut self, line: usize) -> Result<PackageDescriptor> {
        let mut kwargs = self.kwargs()?;
        let mut string = |k: &str| match kwargs.remove(k) {
            Some(Value::Str(s)) => Ok(s),
            Some(_) => Err(anyhow!("line {line}: rpm() attribute {k} must be a string")),
            None => Err(anyhow!("line {line}: rpm() rule is missing {k}")),
        };
        let name = string("name")?;
        let sha256 = string("sha256")?;
        let urls = match kwargs.remove("urls") {
            Some(Value::List(urls)) => urls,
            Some(_) => bail!("line {line}: urls of rpm {name} must be a list of strings"),
            None => bail!("line {line}: rpm {name} is missing urls"),
        };
        PackageDescriptor::new(name, urls, sha256).map_err(|e| anyhow!("line {line}: {e}"))
    }

    fn rpm_rules(&mut self) -> Result<Vec<PackageDescriptor>> {
        let mut rules = Vec::new();
        let mut depth = 0usize;
        let mut prev_dot = false;
        while let Some(tok) = self.peek() {
            let line = self.line();
            match tok {
                Tok::Ident(i) if i == "rpm" && depth == 0 && !prev_dot && self.is_punct(1, '(') => {
                    self.pos += 2;
                    rules.push(self.rpm_rule(line)?);
                    prev_dot = false;
                    continue;
                }
                Tok::Punct('(' | '[' | '{') => depth += 1,
                Tok::Punct(')' | ']' | '}') => depth = depth.saturating_sub(1),
                _ => {}
            }
            prev_dot = self.is_punct(0, '.');
            self.pos += 1;
        }
        Ok(rules)
    }
}

/// Extract the packages pinned by the `rpm()` rules of a WORKSPACE file, in order.
pub fn parse_workspace(src: &str) -> Result<Vec<PackageDescriptor>> {
    let toks = Lexer::new(src).tokenize()?;
    Parser { toks, pos: 0 }.rpm_rules()
}

#[context("Parsing workspace {}", path)]
pub fn load_workspace(path: &Utf8Path) -> Result<Vec<PackageDescriptor>> {
    let buf = std::fs::read_to_string(path)?;
    parse_workspace(&buf)
}

#[cfg(test)]
mod test {
    use super::*;
    use indoc::indoc;
    use std::io::Write;

    static WORKSPACE: &str = indoc! {r#"
        workspace(name = "example")

        load("@bazeldnf//:deps.bzl", "bazeldnf_dependencies", "rpm")

        bazeldnf_dependencies()

        # rpm(name = "commented-out", sha256 = "00", urls = ["x"])
        rpm(
            name = "bash-0__5.2.26-3.fc40.x86_64",
            sha256 = "6bd5bb7a1e7a2e3e0c23f1a0fe6a2e1b4f0a4d5c4ba8d1e6f7c7a5c1c1d2e3f4",
            urls = [
                "https://example.com/a/bash-5.2.26-3.fc40.x86_64.rpm",
                'https://example.com/b/bash-5.2.26-3.fc40.x86_64.rpm',
            ],
        )

        http_archive(
            name = "not_an_rpm",
            urls = ["https://example.com/archive.tar.gz"],
            strip_prefix = "x-" + VERSION,
        )

        repo.rpm(name = "method", sha256 = "00", urls = ["x"])

        rpm(name = "glibc", urls = ["https://example.com/glibc.rpm"], sha256 = "ab", integrity = None, deps = [":a", ":b"], n = 3)
    "#};

    #[test]
    fn test_parse() -> Result<()> {
        let pkgs = parse_workspace(WORKSPACE)?;
        assert_eq!(pkgs.len(), 2);
        assert_eq!(pkgs[0].name(), "bash-0__5.2.26-3.fc40.x86_64");
        assert_eq!(
            pkgs[0].sha256(),
            "6bd5bb7a1e7a2e3e0c23f1a0fe6a2e1b4f0a4d5c4ba8d1e6f7c7a5c1c1d2e3f4"
        );
        similar_asserts::assert_eq!(
            pkgs[0].urls(),
            &[
                "https://example.com/a/bash-5.2.26-3.fc40.x86_64.rpm".to_string(),
                "https://example.com/b/bash-5.2.26-3.fc40.x86_64.rpm".to_string(),
            ]
        );
        assert_eq!(pkgs[1].name(), "glibc");
        assert_eq!(pkgs[1].sha256(), "ab");
        assert_eq!(pkgs[1].urls(), &["https://example.com/glibc.rpm".to_string()]);
        Ok(())
    }

    #[test]
    fn test_strings() -> Result<()> {
        let src = indoc! {r#"
            rpm(name = """tri"ple""", sha256 = 'a\'b', urls = [r"c:\d", "e\"f\n"])
        "#};
        let pkgs = parse_workspace(src)?;
        assert_eq!(pkgs[0].name(), "tri\"ple");
        assert_eq!(pkgs[0].sha256(), "a'b");
        assert_eq!(pkgs[0].urls(), &["c:\\d".to_string(), "e\"f\n".to_string()]);
        Ok(())
    }

    #[test]
    fn test_nested_calls_ignored() -> Result<()> {
        let src = indoc! {r#"
            wrapper(
                rpm(name = "inner", sha256 = "00", urls = ["x"]),
            )
        "#};
        assert!(parse_workspace(src)?.is_empty());
        assert!(parse_workspace("")?.is_empty());
        Ok(())
    }

    #[test]
    fn test_errors() {
        let missing_sha = indoc! {r#"
            # header

            rpm(
                name = "foo",
                urls = ["x"],
            )
        "#};
        let e = parse_workspace(missing_sha).unwrap_err();
        assert_eq!(e.to_string(), "line 3: rpm() rule is missing sha256");

        let no_urls = r#"rpm(name = "foo", sha256 = "00", urls = [])"#;
        let e = parse_workspace(no_urls).unwrap_err();
        assert_eq!(e.to_string(), "line 1: invalid package foo: no candidate URLs");

        let computed = r#"rpm(name = "foo", sha256 = "00", urls = MIRRORS)"#;
        assert!(parse_workspace(computed).is_err());

        let unterminated = "rpm(name = \"foo\n)";
        let e = parse_workspace(unterminated).unwrap_err();
        assert_eq!(e.to_string(), "line 1: unterminated string");

        assert!(parse_workspace("rpm(name = \"foo\"").is_err());
    }

    #[test]
    fn test_load_file() -> Result<()> {
        let mut tmpf = tempfile::NamedTempFile::new()?;
        tmpf.write_all(WORKSPACE.as_bytes())?;
        let path = Utf8Path::from_path(tmpf.path()).unwrap();
        assert_eq!(load_workspace(path)?.len(), 2);
        let e = load_workspace(Utf8Path::new("/nonexistent/WORKSPACE")).unwrap_err();
        assert!(format!("{:#}", e).starts_with("Parsing workspace /nonexistent/WORKSPACE"));
        Ok(())
    }
}
