use crate::error::{RepoError, RepoResult};

#[derive(Clone, Debug, PartialEq)]
pub enum TKind {
    /// Identifier or keyword; may carry a `sel.` qualifier and a trailing `.*`
    Ident(String),
    /// Single-quoted text. `''` and `\'` are unescaped, every other backslash sequence is kept.
    Str(String),
    /// Double-quoted text, accepted as a CONTAINS argument
    DStr(String),
    Num(String),
    /// `$name`
    Param(String),
    Question,
    LParen, RParen, Comma, Star, Semicolon,
    Eq, Ne, Lt, Gt, Le, Ge,
}

#[derive(Clone, Debug)]
pub struct Tok { pub kind: TKind, pub pos: usize }

fn is_ident_start(c: char) -> bool { c.is_alphabetic() || c == '_' }

fn is_ident_part(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == ':' || c == '-' || c == '.'
}

/// One-line snippet of `src` with a caret under `pos`.
pub fn caret_snippet(src: &str, pos: usize) -> String {
    let pos = pos.min(src.len());
    let prefix = &src[..pos];
    let line_start = prefix.rfind('\n').map(|i| i + 1).unwrap_or(0);
    let line_end = src[pos..].find('\n').map(|i| pos + i).unwrap_or(src.len());
    let line = &src[line_start..line_end];
    let col = prefix[line_start..].chars().count();
    format!("{}\n{}^", line, " ".repeat(col))
}

pub fn syntax_error(src: &str, pos: usize, msg: &str) -> RepoError {
    RepoError::query(format!("Syntax error at position {}: {}\n{}", pos, msg, caret_snippet(src, pos)), Some(pos))
}

pub fn lex(src: &str) -> RepoResult<Vec<Tok>> {
    let chars: Vec<(usize, char)> = src.char_indices().collect();
    let mut toks: Vec<Tok> = Vec::new();
    let mut i = 0usize;
    let at = |i: usize| chars.get(i).map(|(_, c)| *c);
    let pos_of = |i: usize| chars.get(i).map(|(p, _)| *p).unwrap_or(src.len());

    while i < chars.len() {
        let (pos, c) = chars[i];
        if c.is_whitespace() { i += 1; continue; }

        // comments
        if c == '-' && at(i + 1) == Some('-') {
            while i < chars.len() && chars[i].1 != '\n' { i += 1; }
            continue;
        }
        if c == '/' && at(i + 1) == Some('*') {
            i += 2;
            loop {
                match at(i) {
                    None => return Err(syntax_error(src, pos, "unterminated block comment")),
                    Some('*') if at(i + 1) == Some('/') => { i += 2; break; }
                    Some(_) => i += 1,
                }
            }
            continue;
        }

        if c == '\'' {
            i += 1;
            let mut s = String::new();
            loop {
                match at(i) {
                    None => return Err(syntax_error(src, pos, "unterminated string literal")),
                    Some('\'') if at(i + 1) == Some('\'') => { s.push('\''); i += 2; }
                    Some('\'') => { i += 1; break; }
                    Some('\\') if at(i + 1) == Some('\'') => { s.push('\''); i += 2; }
                    Some('\\') if at(i + 1).is_some() => {
                        s.push('\\');
                        if let Some(n) = at(i + 1) { s.push(n); }
                        i += 2;
                    }
                    Some(ch) => { s.push(ch); i += 1; }
                }
            }
            toks.push(Tok { kind: TKind::Str(s), pos });
            continue;
        }

        if c == '"' {
            i += 1;
            let mut s = String::new();
            loop {
                match at(i) {
                    None => return Err(syntax_error(src, pos, "unterminated double-quoted text")),
                    Some('"') if at(i + 1) == Some('"') => { s.push('"'); i += 2; }
                    Some('"') => { i += 1; break; }
                    Some('\\') if at(i + 1) == Some('"') => { s.push('"'); i += 2; }
                    Some(ch) => { s.push(ch); i += 1; }
                }
            }
            toks.push(Tok { kind: TKind::DStr(s), pos });
            continue;
        }

        let prev_is_value = matches!(toks.last().map(|t| &t.kind), Some(TKind::Ident(_) | TKind::Num(_) | TKind::RParen | TKind::Str(_)));
        let signed = (c == '-' || c == '+') && !prev_is_value && at(i + 1).map(|n| n.is_ascii_digit()).unwrap_or(false);
        if c.is_ascii_digit() || signed || (c == '.' && at(i + 1).map(|n| n.is_ascii_digit()).unwrap_or(false)) {
            let start = i;
            i += 1;
            while let Some(ch) = at(i) {
                let exp_sign = (ch == '-' || ch == '+') && matches!(at(i - 1), Some('e') | Some('E'));
                if ch.is_ascii_digit() || ch == '.' || ch == 'e' || ch == 'E' || exp_sign { i += 1; } else { break; }
            }
            toks.push(Tok { kind: TKind::Num(src[pos..pos_of(i)].to_string()), pos: pos_of(start) });
            continue;
        }

        if is_ident_start(c) {
            let start = i;
            i += 1;
            while let Some(ch) = at(i) {
                if is_ident_part(ch) { i += 1; }
                else if ch == '*' && at(i - 1) == Some('.') { i += 1; break; }
                else { break; }
            }
            toks.push(Tok { kind: TKind::Ident(src[pos..pos_of(i)].to_string()), pos: pos_of(start) });
            continue;
        }

        if c == '$' {
            let start = i;
            i += 1;
            while let Some(ch) = at(i) { if ch.is_alphanumeric() || ch == '_' { i += 1; } else { break; } }
            let name = &src[pos + 1..pos_of(i)];
            if name.is_empty() { return Err(syntax_error(src, pos, "expected a bind variable name after '$'")); }
            toks.push(Tok { kind: TKind::Param(name.to_string()), pos: pos_of(start) });
            continue;
        }

        let (kind, width) = match (c, at(i + 1)) {
            ('<', Some('>')) => (TKind::Ne, 2),
            ('!', Some('=')) => (TKind::Ne, 2),
            ('<', Some('=')) => (TKind::Le, 2),
            ('>', Some('=')) => (TKind::Ge, 2),
            ('<', _) => (TKind::Lt, 1),
            ('>', _) => (TKind::Gt, 1),
            ('=', _) => (TKind::Eq, 1),
            ('(', _) => (TKind::LParen, 1),
            (')', _) => (TKind::RParen, 1),
            (',', _) => (TKind::Comma, 1),
            ('*', _) => (TKind::Star, 1),
            (';', _) => (TKind::Semicolon, 1),
            ('?', _) => (TKind::Question, 1),
            _ => return Err(syntax_error(src, pos, &format!("unexpected character '{}'", c))),
        };
        toks.push(Tok { kind, pos });
        i += width;
    }
    Ok(toks)
}

/// Token cursor shared by the SELECT and WHERE parsers.
pub struct Cursor<'a> {
    pub src: &'a str,
    toks: Vec<Tok>,
    idx: usize,
    positional: usize,
}

impl<'a> Cursor<'a> {
    pub fn new(src: &'a str) -> RepoResult<Self> {
        Ok(Self { src, toks: lex(src)?, idx: 0, positional: 0 })
    }

    pub fn peek(&self) -> Option<&Tok> { self.toks.get(self.idx) }
    pub fn peek_at(&self, ahead: usize) -> Option<&Tok> { self.toks.get(self.idx + ahead) }
    pub fn peek_kind(&self) -> Option<&TKind> { self.peek().map(|t| &t.kind) }
    pub fn at_end(&self) -> bool { self.idx >= self.toks.len() }

    /// Position of the current token, or the end of the statement.
    pub fn pos(&self) -> usize { self.peek().map(|t| t.pos).unwrap_or(self.src.len()) }

    pub fn next(&mut self) -> Option<Tok> {
        let t = self.toks.get(self.idx).cloned();
        if t.is_some() { self.idx += 1; }
        t
    }

    pub fn is_kw(&self, kw: &str) -> bool { self.is_kw_at(0, kw) }

    pub fn is_kw_at(&self, ahead: usize, kw: &str) -> bool {
        matches!(self.peek_at(ahead).map(|t| &t.kind), Some(TKind::Ident(s)) if s.eq_ignore_ascii_case(kw))
    }

    pub fn eat_kw(&mut self, kw: &str) -> bool {
        if self.is_kw(kw) { self.idx += 1; true } else { false }
    }

    pub fn expect_kw(&mut self, kw: &str) -> RepoResult<()> {
        if self.eat_kw(kw) { Ok(()) } else { Err(self.err(&format!("expected {}", kw))) }
    }

    pub fn eat(&mut self, kind: &TKind) -> bool {
        if self.peek_kind() == Some(kind) { self.idx += 1; true } else { false }
    }

    pub fn expect(&mut self, kind: &TKind, what: &str) -> RepoResult<()> {
        if self.eat(kind) { Ok(()) } else { Err(self.err(&format!("expected {}", what))) }
    }

    pub fn err(&self, msg: &str) -> RepoError {
        let found = match self.peek_kind() {
            None => "end of statement".to_string(),
            Some(TKind::Ident(s)) | Some(TKind::Num(s)) => format!("'{}'", s),
            Some(TKind::Str(s)) => format!("'{}'", s),
            Some(k) => format!("{:?}", k),
        };
        syntax_error(self.src, self.pos(), &format!("{}, found {}", msg, found))
    }

    /// Name for the next positional `?` parameter.
    pub fn next_positional(&mut self) -> String {
        self.positional += 1;
        self.positional.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(s: &str) -> Vec<TKind> { lex(s).unwrap().into_iter().map(|t| t.kind).collect() }

    #[test]
    fn string_escapes() {
        assert_eq!(kinds(r"'it''s' 'a\'b' 'ad\%min%' 'c:\\x'"), vec![
            TKind::Str("it's".into()),
            TKind::Str("a'b".into()),
            TKind::Str(r"ad\%min%".into()),
            TKind::Str(r"c:\\x".into()),
        ]);
    }

    #[test]
    fn identifiers_and_operators() {
        assert_eq!(kinds("d.cmis:name<>-3.5 AND x>=? d.* $who"), vec![
            TKind::Ident("d.cmis:name".into()), TKind::Ne, TKind::Num("-3.5".into()),
            TKind::Ident("AND".into()), TKind::Ident("x".into()), TKind::Ge, TKind::Question,
            TKind::Ident("d.*".into()), TKind::Param("who".into()),
        ]);
        assert_eq!(kinds("nasa:booster-mass > 5"), vec![TKind::Ident("nasa:booster-mass".into()), TKind::Gt, TKind::Num("5".into())]);
    }

    #[test]
    fn comments_are_skipped() {
        assert_eq!(kinds("SELECT -- trailing\n * /* block */ FROM t"), vec![
            TKind::Ident("SELECT".into()), TKind::Star, TKind::Ident("FROM".into()), TKind::Ident("t".into()),
        ]);
    }

    #[test]
    fn errors_carry_position_and_caret() {
        let err = lex("SELECT * FROM t WHERE a = 'open").unwrap_err();
        assert_eq!(err.position(), Some(26));
        assert!(err.message().contains("unterminated string literal"));
        assert!(err.message().ends_with(&format!("{}^", " ".repeat(26))));
        assert_eq!(lex("SELECT #").unwrap_err().position(), Some(7));
    }
}
