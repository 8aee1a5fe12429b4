use super::dialect::{Dialect, LiteralReader, is_ident_continue, is_ident_start};
use super::{ParseError, ParseErrorKind, ParseResult};

#[derive(Clone, Debug, PartialEq)]
pub enum Literal<'a> {
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    String(String),
    Char(char),
    /// Raw template between the quotes; `offset` is where it starts.
    Interpolated {
        template: &'a str,
        offset: usize,
    },
}

#[derive(Clone, Debug, PartialEq)]
pub enum TokenKind<'a> {
    Name,
    Symbol,
    Literal(Literal<'a>),
    End,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Token<'a> {
    pub text: &'a str,
    pub kind: TokenKind<'a>,
    /// Byte offset into the top-level source.
    pub offset: usize,
}

impl Token<'_> {
    /// True for a name or symbol spelled exactly `text`.
    pub fn is(&self, text: &str) -> bool {
        matches!(self.kind, TokenKind::Name | TokenKind::Symbol) && self.text == text
    }

    pub fn is_end(&self) -> bool {
        matches!(self.kind, TokenKind::End)
    }

    pub fn is_name(&self) -> bool {
        matches!(self.kind, TokenKind::Name)
    }
}

/// Saved lexer position for bounded lookahead.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Cursor(usize);

/// Pull-based tokenizer over one source slice.
pub struct TokenStream<'a> {
    source: &'a str,
    base: usize,
    pos: usize,
    dialect: &'a Dialect,
    lookahead: Option<(usize, Token<'a>, usize)>,
}

impl<'a> TokenStream<'a> {
    pub fn new(source: &'a str, dialect: &'a Dialect) -> Self {
        Self {
            source,
            base: 0,
            pos: 0,
            dialect,
            lookahead: None,
        }
    }

    /// Lexes an embedded slice whose first byte sits at `base` in the
    /// top-level source.
    pub fn sub_stream(&self, text: &'a str, base: usize) -> Self {
        Self {
            source: text,
            base,
            pos: 0,
            dialect: self.dialect,
            lookahead: None,
        }
    }

    pub fn save(&self) -> Cursor {
        Cursor(self.pos)
    }

    pub fn restore(&mut self, cursor: Cursor) {
        self.pos = cursor.0;
    }

    pub fn peek_token(&mut self) -> ParseResult<Token<'a>> {
        if let Some((at, token, _)) = &self.lookahead
            && *at == self.pos
        {
            return Ok(token.clone());
        }
        let (token, end) = self.scan(self.pos)?;
        self.lookahead = Some((self.pos, token.clone(), end));
        Ok(token)
    }

    pub fn next_token(&mut self) -> ParseResult<Token<'a>> {
        if let Some((at, token, end)) = self.lookahead.take()
            && at == self.pos
        {
            self.pos = end;
            return Ok(token);
        }
        let (token, end) = self.scan(self.pos)?;
        self.pos = end;
        Ok(token)
    }

    fn error(&self, message: impl Into<String>, text: &str, at: usize) -> ParseError {
        ParseError::new(ParseErrorKind::Lexical, message, text, self.base + at)
    }

    fn scan(&self, from: usize) -> ParseResult<(Token<'a>, usize)> {
        let at = self.skip_trivia(from)?;
        let rest = &self.source[at..];
        if rest.is_empty() {
            return Ok((
                Token {
                    text: "",
                    kind: TokenKind::End,
                    offset: self.base + at,
                },
                at,
            ));
        }

        for reader in self.dialect.literal_readers() {
            if let Some((literal, end)) = self.read_literal(*reader, at)? {
                return Ok((self.token(at, end, TokenKind::Literal(literal)), end));
            }
        }
        if let Some((literal, end)) = self.read_number(at)? {
            return Ok((self.token(at, end, TokenKind::Literal(literal)), end));
        }
        if let Some(symbol) = self.dialect.match_symbol(rest) {
            let end = at + symbol.len();
            return Ok((self.token(at, end, TokenKind::Symbol), end));
        }
        let mut chars = rest.char_indices();
        match chars.next() {
            Some((_, first)) if is_ident_start(first) => {
                let len = chars
                    .find(|(_, ch)| !is_ident_continue(*ch))
                    .map(|(index, _)| index)
                    .unwrap_or(rest.len());
                Ok((self.token(at, at + len, TokenKind::Name), at + len))
            }
            Some((_, other)) => {
                let text = &rest[..other.len_utf8()];
                Err(self.error(
                    format!("unrecognized character '{other}'"),
                    text,
                    at,
                ))
            }
            None => unreachable!("empty input handled above"),
        }
    }

    fn token(&self, at: usize, end: usize, kind: TokenKind<'a>) -> Token<'a> {
        Token {
            text: &self.source[at..end],
            kind,
            offset: self.base + at,
        }
    }

    fn skip_trivia(&self, mut at: usize) -> ParseResult<usize> {
        loop {
            let rest = &self.source[at..];
            let trimmed = rest.trim_start();
            at += rest.len() - trimmed.len();
            if let Some(marker) = self.dialect.line_comment()
                && trimmed.starts_with(marker)
            {
                at += trimmed.find('\n').unwrap_or(trimmed.len());
                continue;
            }
            if let Some((open, close)) = self.dialect.block_comment()
                && trimmed.starts_with(open)
            {
                let body = &trimmed[open.len()..];
                let Some(end) = body.find(close) else {
                    return Err(self.error("unterminated block comment", open, at));
                };
                at += open.len() + end + close.len();
                continue;
            }
            return Ok(at);
        }
    }

    fn read_literal(
        &self,
        reader: LiteralReader,
        at: usize,
    ) -> ParseResult<Option<(Literal<'a>, usize)>> {
        let rest = &self.source[at..];
        match reader {
            LiteralReader::RawString { delimiter } => {
                let Some(body) = rest.strip_prefix(delimiter) else {
                    return Ok(None);
                };
                let Some(len) = body.find(delimiter) else {
                    return Err(self.error("unterminated raw string literal", delimiter, at));
                };
                let start = at + delimiter.len();
                let text = self.source[start..start + len].to_string();
                Ok(Some((Literal::String(text), start + len + delimiter.len())))
            }
            LiteralReader::VerbatimString { prefix } => {
                let Some(body) = rest.strip_prefix(prefix) else {
                    return Ok(None);
                };
                let mut text = String::new();
                let mut chars = body.char_indices().peekable();
                while let Some((index, ch)) = chars.next() {
                    if ch == '"' {
                        if chars.peek().is_some_and(|(_, next)| *next == '"') {
                            chars.next();
                            text.push('"');
                            continue;
                        }
                        return Ok(Some((Literal::String(text), at + prefix.len() + index + 1)));
                    }
                    text.push(ch);
                }
                Err(self.error("unterminated verbatim string literal", prefix, at))
            }
            LiteralReader::QuotedString { quote } => {
                let Some(body) = rest.strip_prefix(quote) else {
                    return Ok(None);
                };
                let start = at + quote.len_utf8();
                let mut text = String::new();
                let mut index = 0;
                while let Some(ch) = body[index..].chars().next() {
                    match ch {
                        '\\' => {
                            let (escaped, used) = self.escape(body, index, start)?;
                            text.push(escaped);
                            index += used;
                        }
                        '\n' => {
                            return Err(self.error("newline in string literal", &rest[..1], at));
                        }
                        ch if ch == quote => {
                            return Ok(Some((Literal::String(text), start + index + 1)));
                        }
                        ch => {
                            text.push(ch);
                            index += ch.len_utf8();
                        }
                    }
                }
                Err(self.error("unterminated string literal", &rest[..1], at))
            }
            LiteralReader::CharLiteral { quote } => {
                let Some(body) = rest.strip_prefix(quote) else {
                    return Ok(None);
                };
                let start = at + quote.len_utf8();
                let (ch, used) = match body.chars().next() {
                    Some('\\') => self.escape(body, 0, start)?,
                    Some(ch) if ch != quote && ch != '\n' => (ch, ch.len_utf8()),
                    _ => return Err(self.error("invalid character literal", &rest[..1], at)),
                };
                if !body[used..].starts_with(quote) {
                    return Err(self.error("unterminated character literal", &rest[..1], at));
                }
                Ok(Some((Literal::Char(ch), start + used + quote.len_utf8())))
            }
            LiteralReader::InterpolatedString { prefix } => {
                let Some(body) = rest.strip_prefix(prefix) else {
                    return Ok(None);
                };
                let start = at + prefix.len();
                match find_template_end(body) {
                    Some(len) => Ok(Some((
                        Literal::Interpolated {
                            template: &self.source[start..start + len],
                            offset: self.base + start,
                        },
                        start + len + 1,
                    ))),
                    None => Err(self.error("unterminated interpolated string", prefix, at)),
                }
            }
        }
    }

    /// Decodes the escape at `body[index..]` (starting with `\`); returns the
    /// character and the number of bytes consumed.
    fn escape(&self, body: &str, index: usize, body_start: usize) -> ParseResult<(char, usize)> {
        decode_escape(&body[index..]).ok_or_else(|| {
            let len = body[index..]
                .char_indices()
                .nth(2)
                .map(|(at, _)| at)
                .unwrap_or(body.len() - index);
            self.error(
                "invalid escape sequence",
                &body[index..index + len],
                body_start + index,
            )
        })
    }

    fn read_number(&self, at: usize) -> ParseResult<Option<(Literal<'a>, usize)>> {
        let rest = &self.source[at..];
        for (prefix, radix) in self.dialect.radix_prefixes() {
            let matches_prefix = rest
                .get(..prefix.len())
                .is_some_and(|head| head.eq_ignore_ascii_case(prefix));
            if !matches_prefix {
                continue;
            }
            let digits = &rest[prefix.len()..];
            if !digits.chars().next().is_some_and(|ch| ch.is_digit(*radix)) {
                continue;
            }
            let len = digits
                .find(|ch: char| !(ch.is_digit(*radix) || ch == '_'))
                .unwrap_or(digits.len());
            let cleaned: String = digits[..len].chars().filter(|ch| *ch != '_').collect();
            let mut end = at + prefix.len() + len;
            let text = &self.source[at..end];
            let value = u64::from_str_radix(&cleaned, *radix)
                .map_err(|_| self.error("integer literal is too large", text, at))?;
            let long_suffix = self.source[end..].starts_with(['L', 'l']);
            if long_suffix {
                end += 1;
            }
            self.reject_trailing_ident(at, end)?;
            let literal = if !long_suffix && value <= i32::MAX as u64 {
                Literal::Int(value as i32)
            } else {
                Literal::Long(value as i64)
            };
            return Ok(Some((literal, end)));
        }

        if !rest.starts_with(|ch: char| ch.is_ascii_digit()) {
            return Ok(None);
        }
        let bytes = rest.as_bytes();
        let digits_while = |mut index: usize| {
            while index < bytes.len() && (bytes[index].is_ascii_digit() || bytes[index] == b'_') {
                index += 1;
            }
            index
        };
        let mut len = digits_while(0);
        let mut fractional = false;
        if bytes.get(len) == Some(&b'.') && bytes.get(len + 1).is_some_and(u8::is_ascii_digit) {
            fractional = true;
            len = digits_while(len + 1);
        }
        if matches!(bytes.get(len), Some(b'e' | b'E')) {
            let sign = usize::from(matches!(bytes.get(len + 1), Some(b'+' | b'-')));
            if bytes.get(len + 1 + sign).is_some_and(u8::is_ascii_digit) {
                fractional = true;
                len = digits_while(len + 1 + sign);
            }
        }
        let cleaned: String = rest[..len].chars().filter(|ch| *ch != '_').collect();
        let suffix = bytes.get(len).map(|byte| byte.to_ascii_lowercase());
        let end = at + len + usize::from(matches!(suffix, Some(b'l' | b'f' | b'd' | b'm')));
        let text = &self.source[at..end];
        self.reject_trailing_ident(at, end)?;
        let invalid = || self.error("invalid numeric literal", text, at);
        let literal = match suffix {
            Some(b'f') => Literal::Float(cleaned.parse().map_err(|_| invalid())?),
            Some(b'd' | b'm') => Literal::Double(cleaned.parse().map_err(|_| invalid())?),
            Some(b'l') if fractional => return Err(invalid()),
            Some(b'l') => Literal::Long(
                cleaned
                    .parse()
                    .map_err(|_| self.error("integer literal is too large", text, at))?,
            ),
            _ if fractional => Literal::Double(cleaned.parse().map_err(|_| invalid())?),
            _ => match cleaned.parse::<i64>() {
                Ok(value) => match i32::try_from(value) {
                    Ok(small) => Literal::Int(small),
                    Err(_) => Literal::Long(value),
                },
                Err(_) => return Err(self.error("integer literal is too large", text, at)),
            },
        };
        Ok(Some((literal, end)))
    }

    fn reject_trailing_ident(&self, at: usize, end: usize) -> ParseResult<()> {
        match self.source[end..].chars().next() {
            Some(ch) if is_ident_continue(ch) => {
                let stop = self.source[end..]
                    .find(|ch: char| !is_ident_continue(ch))
                    .map(|len| end + len)
                    .unwrap_or(self.source.len());
                Err(self.error("invalid numeric literal", &self.source[at..stop], at))
            }
            _ => Ok(()),
        }
    }
}

/// Decodes one escape sequence at the start of `text` (which begins with `\`).
pub(crate) fn decode_escape(text: &str) -> Option<(char, usize)> {
    let mut chars = text.chars();
    if chars.next() != Some('\\') {
        return None;
    }
    let kind = chars.next()?;
    let simple = match kind {
        'n' => Some('\n'),
        'r' => Some('\r'),
        't' => Some('\t'),
        '0' => Some('\0'),
        'a' => Some('\u{7}'),
        'b' => Some('\u{8}'),
        'f' => Some('\u{c}'),
        'v' => Some('\u{b}'),
        '\\' | '"' | '\'' => Some(kind),
        _ => None,
    };
    if let Some(ch) = simple {
        return Some((ch, 2));
    }
    let after = &text[2..];
    let (digits, used) = match kind {
        'u' if after.starts_with('{') => {
            let close = after.find('}')?;
            (&after[1..close], close + 1)
        }
        'u' => (after.get(..4)?, 4),
        'x' => {
            let len = after
                .char_indices()
                .take(4)
                .take_while(|(_, ch)| ch.is_ascii_hexdigit())
                .count();
            (&after[..len], len)
        }
        _ => return None,
    };
    if digits.is_empty() || !digits.chars().all(|ch| ch.is_ascii_hexdigit()) {
        return None;
    }
    let code = u32::from_str_radix(digits, 16).ok()?;
    Some((char::from_u32(code)?, 2 + used))
}

/// Length of an interpolated template body up to (not including) its closing
/// quote, skipping quotes inside `{...}` holes.
fn find_template_end(body: &str) -> Option<usize> {
    let bytes = body.as_bytes();
    let mut depth = 0usize;
    let mut index = 0;
    while index < bytes.len() {
        match (depth, bytes[index]) {
            (0, b'\\') => index += 2,
            (0, b'{') if bytes.get(index + 1) == Some(&b'{') => index += 2,
            (0, b'"') => return Some(index),
            (_, b'{') => {
                depth += 1;
                index += 1;
            }
            (1.., b'}') => {
                depth -= 1;
                index += 1;
            }
            (1.., quote @ (b'"' | b'\'')) => {
                index += 1;
                while index < bytes.len() && bytes[index] != quote {
                    index += if bytes[index] == b'\\' { 2 } else { 1 };
                }
                index += 1;
            }
            _ => index += 1,
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::SourceFlavor;
    use crate::compiler::frontends::dialect_for;

    fn lex(source: &str, flavor: SourceFlavor) -> Vec<Token<'_>> {
        let dialect = dialect_for(flavor);
        let mut stream = TokenStream::new(source, dialect);
        let mut tokens = Vec::new();
        loop {
            let token = stream.next_token().expect("source should lex");
            if token.is_end() {
                return tokens;
            }
            tokens.push(token);
        }
    }

    fn kinds(source: &str) -> Vec<TokenKind<'_>> {
        lex(source, SourceFlavor::CSharp)
            .into_iter()
            .map(|token| token.kind)
            .collect()
    }

    fn lex_error(source: &str) -> ParseError {
        let dialect = dialect_for(SourceFlavor::CSharp);
        let mut stream = TokenStream::new(source, dialect);
        loop {
            match stream.next_token() {
                Ok(token) if token.is_end() => panic!("expected a lexical error"),
                Ok(_) => {}
                Err(err) => return err,
            }
        }
    }

    #[test]
    fn numeric_literals_pick_the_narrowest_type() {
        assert_eq!(
            kinds("42 3000000000 7L 1.5 2f 3d 1e3 1_000 0x1F 0b101"),
            vec![
                TokenKind::Literal(Literal::Int(42)),
                TokenKind::Literal(Literal::Long(3_000_000_000)),
                TokenKind::Literal(Literal::Long(7)),
                TokenKind::Literal(Literal::Double(1.5)),
                TokenKind::Literal(Literal::Float(2.0)),
                TokenKind::Literal(Literal::Double(3.0)),
                TokenKind::Literal(Literal::Double(1000.0)),
                TokenKind::Literal(Literal::Int(1000)),
                TokenKind::Literal(Literal::Int(31)),
                TokenKind::Literal(Literal::Int(5)),
            ]
        );
    }

    #[test]
    fn member_access_on_integer_is_not_a_fraction() {
        let tokens = lex("1.ToString()", SourceFlavor::CSharp);
        assert_eq!(tokens[0].kind, TokenKind::Literal(Literal::Int(1)));
        assert!(tokens[1].is("."));
        assert!(tokens[2].is("ToString"));
    }

    #[test]
    fn string_forms_are_tried_in_priority_order() {
        assert_eq!(
            kinds(r#""""raw "quoted" text""" $"a{b}c" @"C:\dir ""x""" "tab\t" 'q' '\n'"#),
            vec![
                TokenKind::Literal(Literal::String(r#"raw "quoted" text"#.to_string())),
                TokenKind::Literal(Literal::Interpolated {
                    template: "a{b}c",
                    offset: 26,
                }),
                TokenKind::Literal(Literal::String(r#"C:\dir "x""#.to_string())),
                TokenKind::Literal(Literal::String("tab\t".to_string())),
                TokenKind::Literal(Literal::Char('q')),
                TokenKind::Literal(Literal::Char('\n')),
            ]
        );
    }

    #[test]
    fn interpolation_holes_may_contain_strings() {
        let tokens = lex(r#"$"x{(a ? "}" : "b")}y" + 1"#, SourceFlavor::CSharp);
        assert_eq!(
            tokens[0].kind,
            TokenKind::Literal(Literal::Interpolated {
                template: r#"x{(a ? "}" : "b")}y"#,
                offset: 2,
            })
        );
        assert!(tokens[1].is("+"));
    }

    #[test]
    fn comments_and_offsets() {
        let tokens = lex("a /* skip */ >= // tail\n b", SourceFlavor::CSharp);
        let summary: Vec<(&str, usize)> = tokens.iter().map(|token| (token.text, token.offset)).collect();
        assert_eq!(summary, vec![("a", 0), (">=", 13), ("b", 25)]);
    }

    #[test]
    fn unterminated_literals_report_their_start() {
        let err = lex_error("x + \"open");
        assert_eq!(err.kind, ParseErrorKind::Lexical);
        assert_eq!(err.offset, 4);

        let err = lex_error("a /* never closed");
        assert_eq!(err.kind, ParseErrorKind::Lexical);
        assert_eq!(err.offset, 2);

        let err = lex_error("1 + #");
        assert_eq!(err.token, "#");
        assert_eq!(err.offset, 4);
    }

    #[test]
    fn formula_dialect_reads_hex_prefix_before_symbols() {
        let tokens = lex("&H1F & 'text'", SourceFlavor::Formula);
        assert_eq!(tokens[0].kind, TokenKind::Literal(Literal::Int(31)));
        assert!(tokens[1].is("&"));
        assert_eq!(
            tokens[2].kind,
            TokenKind::Literal(Literal::String("text".to_string()))
        );
    }

    #[test]
    fn save_and_restore_relex_deterministically() {
        let dialect = dialect_for(SourceFlavor::CSharp);
        let mut stream = TokenStream::new("int x = 1;", dialect);
        let cursor = stream.save();
        let first = stream.next_token().expect("token");
        stream.next_token().expect("token");
        stream.restore(cursor);
        assert_eq!(stream.next_token().expect("token"), first);
    }

    #[test]
    fn escapes_decode_unicode_forms() {
        assert_eq!(decode_escape(r"\u0041"), Some(('A', 6)));
        assert_eq!(decode_escape(r"\u{1F600}"), Some(('\u{1F600}', 9)));
        assert_eq!(decode_escape(r"\x41"), Some(('A', 4)));
        assert_eq!(decode_escape(r"\q"), None);
    }
}
