//! Template source lexer.
//!
//! Turns raw template text into a flat [`Markup`] token sequence. Output and
//! tag markup have their inner expression text lexed eagerly into
//! [`ExprToken`]s, so the parser never sees raw expression strings. The
//! individual expression token parsers are nom combinators; the markup level
//! is a hand-rolled scanner that tracks byte offsets.

use nom::{
    IResult,
    branch::alt,
    bytes::complete::{escaped_transform, is_not, tag, take_while, take_while1},
    character::complete::{char, digit1, one_of},
    combinator::{opt, recognize, value},
    sequence::tuple,
};

use super::markup::{ExprToken, ExprTokenKind, Markup, Span, Whitespace};
use crate::error::TemplateError;

/// Tokenize template source into markup tokens, ending with [`Markup::Eoi`].
pub fn tokenize(source: &str) -> Result<Vec<Markup>, TemplateError> {
    let mut lexer = Lexer { source, offset: 0 };
    lexer.run()
}

struct Lexer<'a> {
    source: &'a str,
    offset: usize,
}

impl<'a> Lexer<'a> {
    fn run(&mut self) -> Result<Vec<Markup>, TemplateError> {
        let mut tokens = Vec::new();

        while self.offset < self.source.len() {
            let rest = self.rest();
            if rest.starts_with("{#") {
                tokens.push(self.lex_comment()?);
            } else if rest.starts_with("{{") {
                tokens.push(self.lex_output()?);
            } else if rest.starts_with("{%") {
                tokens.push(self.lex_tag()?);
            } else {
                tokens.push(self.lex_content());
            }
        }

        tokens.push(Markup::Eoi);
        Ok(tokens)
    }

    fn rest(&self) -> &'a str {
        &self.source[self.offset..]
    }

    fn here(&self) -> Span {
        Span::new(self.offset, self.offset)
    }

    fn skip_whitespace(&mut self) {
        let trimmed = self.rest().trim_start_matches([' ', '\t', '\r', '\n']);
        self.offset = self.source.len() - trimmed.len();
    }

    /// Consume a whitespace-control marker, if one is next.
    fn take_marker(&mut self) -> Whitespace {
        match self.rest().chars().next() {
            Some(c @ ('+' | '-' | '~')) => {
                self.offset += 1;
                Whitespace::from_marker(Some(c))
            }
            _ => Whitespace::Default,
        }
    }

    /// Consume `close`, optionally preceded by a whitespace-control marker.
    fn take_closing(&mut self, close: &str) -> Option<Whitespace> {
        let rest = self.rest();
        if rest.starts_with(close) {
            self.offset += close.len();
            return Some(Whitespace::Default);
        }
        let first = rest.chars().next()?;
        if matches!(first, '+' | '-' | '~') && rest[1..].starts_with(close) {
            self.offset += 1 + close.len();
            return Some(Whitespace::from_marker(Some(first)));
        }
        None
    }

    fn lex_content(&mut self) -> Markup {
        let rest = self.rest();
        let end = ["{{", "{%", "{#"]
            .iter()
            .filter_map(|delim| rest.find(delim))
            .min()
            .unwrap_or(rest.len());
        let span = Span::new(self.offset, self.offset + end);
        self.offset += end;
        Markup::Content {
            span,
            text: rest[..end].to_string(),
        }
    }

    fn lex_comment(&mut self) -> Result<Markup, TemplateError> {
        let start = self.offset;
        self.offset += 2; // {#
        let wc_left = self.take_marker();

        let rest = self.rest();
        let close = rest.find("#}").ok_or_else(|| {
            TemplateError::syntax("comment never closed", Span::new(start, start + 2))
        })?;

        let mut text = &rest[..close];
        let mut wc_right = Whitespace::Default;
        if let Some(marker) = text.chars().last() {
            if matches!(marker, '+' | '-' | '~') {
                wc_right = Whitespace::from_marker(Some(marker));
                text = &text[..text.len() - 1];
            }
        }

        self.offset += close + 2;
        Ok(Markup::Comment {
            span: Span::new(start, self.offset),
            wc: (wc_left, wc_right),
            text: text.to_string(),
        })
    }

    fn lex_output(&mut self) -> Result<Markup, TemplateError> {
        let start = self.offset;
        self.offset += 2; // {{
        let wc_left = self.take_marker();
        let (expression, wc_right) = self.lex_expression("}}")?;
        Ok(Markup::Output {
            span: Span::new(start, self.offset),
            wc: (wc_left, wc_right),
            expression,
        })
    }

    fn lex_tag(&mut self) -> Result<Markup, TemplateError> {
        let start = self.offset;
        self.offset += 2; // {%
        let wc_left = self.take_marker();
        self.skip_whitespace();

        if self.rest().starts_with('#') {
            // Inline comment tag: {% # ... %}
            self.offset += 1;
            return self.lex_inline_comment(start, wc_left);
        }

        let name = self.take_word();
        if name.is_empty() {
            return Err(TemplateError::syntax("missing tag name", self.here()));
        }

        match name.as_str() {
            "raw" => self.lex_raw(start, wc_left),
            "liquid" => self.lex_lines(start, wc_left),
            _ => {
                let (expression, wc_right) = self.lex_expression("%}")?;
                Ok(Markup::Tag {
                    span: Span::new(start, self.offset),
                    wc: (wc_left, wc_right),
                    name,
                    expression,
                })
            }
        }
    }

    fn lex_inline_comment(
        &mut self,
        start: usize,
        wc_left: Whitespace,
    ) -> Result<Markup, TemplateError> {
        let rest = self.rest();
        let close = rest.find("%}").ok_or_else(|| {
            TemplateError::syntax("comment never closed", Span::new(start, start + 2))
        })?;
        let mut text = &rest[..close];
        let mut wc_right = Whitespace::Default;
        if let Some(marker) = text.chars().last() {
            if matches!(marker, '+' | '-' | '~') {
                wc_right = Whitespace::from_marker(Some(marker));
                text = &text[..text.len() - 1];
            }
        }
        self.offset += close + 2;
        Ok(Markup::Comment {
            span: Span::new(start, self.offset),
            wc: (wc_left, wc_right),
            text: text.to_string(),
        })
    }

    fn take_word(&mut self) -> String {
        let rest = self.rest();
        let word: String = rest
            .chars()
            .take_while(|c| c.is_ascii_alphanumeric() || *c == '_')
            .collect();
        self.offset += word.len();
        word
    }

    fn lex_expression(
        &mut self,
        close: &str,
    ) -> Result<(Vec<ExprToken>, Whitespace), TemplateError> {
        let mut tokens = Vec::new();
        loop {
            self.skip_whitespace();
            if self.rest().is_empty() {
                return Err(TemplateError::syntax(
                    format!("unexpected end of template, expected '{close}'"),
                    self.here(),
                ));
            }
            if let Some(wc) = self.take_closing(close) {
                return Ok((tokens, wc));
            }

            let start = self.offset;
            let rest = self.rest();
            match expr_token(rest) {
                Ok((after, kind)) => {
                    self.offset += rest.len() - after.len();
                    tokens.push(ExprToken {
                        kind,
                        span: Span::new(start, self.offset),
                    });
                }
                Err(_) => {
                    let found = rest.chars().next().unwrap_or_default();
                    return Err(TemplateError::syntax(
                        format!("unexpected character '{found}'"),
                        Span::new(start, start + found.len_utf8()),
                    ));
                }
            }
        }
    }

    fn lex_raw(&mut self, start: usize, open_left: Whitespace) -> Result<Markup, TemplateError> {
        self.skip_whitespace();
        let open_right = self
            .take_closing("%}")
            .ok_or_else(|| TemplateError::syntax("malformed raw tag, expected '%}'", self.here()))?;

        let text_start = self.offset;
        let mut search = self.offset;
        loop {
            let from = &self.source[search..];
            let found = search
                + from.find("{%").ok_or_else(|| {
                    TemplateError::syntax("raw tag never closed", Span::new(start, start + 2))
                })?;
            if let Some((len, close_left, close_right)) = match_end_raw(&self.source[found..]) {
                let text = self.source[text_start..found].to_string();
                self.offset = found + len;
                return Ok(Markup::Raw {
                    span: Span::new(start, self.offset),
                    wc: (open_left, open_right, close_left, close_right),
                    text,
                });
            }
            search = found + 2;
        }
    }

    fn lex_lines(&mut self, start: usize, wc_left: Whitespace) -> Result<Markup, TemplateError> {
        let rest = self.rest();
        let close = rest.find("%}").ok_or_else(|| {
            TemplateError::syntax("liquid tag never closed", Span::new(start, start + 2))
        })?;

        let mut inner_end = close;
        let mut wc_right = Whitespace::Default;
        if close > 0 {
            let marker = rest.as_bytes()[close - 1] as char;
            if matches!(marker, '+' | '-' | '~') {
                wc_right = Whitespace::from_marker(Some(marker));
                inner_end = close - 1;
            }
        }

        let inner_offset = self.offset;
        let inner = &rest[..inner_end];
        let mut statements = Vec::new();
        let mut line_offset = inner_offset;

        for line in inner.split_inclusive('\n') {
            let stripped = line.trim();
            if !stripped.is_empty() && !stripped.starts_with('#') {
                let indent = line.len() - line.trim_start().len();
                let stmt_offset = line_offset + indent;
                statements.push(lex_line_statement(stripped, stmt_offset)?);
            }
            line_offset += line.len();
        }

        self.offset += close + 2;
        Ok(Markup::Lines {
            span: Span::new(start, self.offset),
            wc: (wc_left, wc_right),
            statements,
        })
    }
}

/// Lex one statement of a `{% liquid %}` tag into tag markup.
fn lex_line_statement(line: &str, offset: usize) -> Result<Markup, TemplateError> {
    let name: String = line
        .chars()
        .take_while(|c| c.is_ascii_alphanumeric() || *c == '_')
        .collect();
    if name.is_empty() {
        return Err(TemplateError::syntax(
            "missing tag name in line statement",
            Span::new(offset, offset + 1),
        ));
    }

    let expression = lex_expr_str(&line[name.len()..], offset + name.len())?;
    Ok(Markup::Tag {
        span: Span::new(offset, offset + line.len()),
        wc: (Whitespace::Default, Whitespace::Default),
        name,
        expression,
    })
}

/// Lex a bare expression string, outside of any markup delimiters.
pub(crate) fn lex_expr_str(text: &str, base: usize) -> Result<Vec<ExprToken>, TemplateError> {
    let mut tokens = Vec::new();
    let mut offset = 0;

    loop {
        let trimmed = text[offset..].trim_start_matches([' ', '\t', '\r', '\n']);
        offset = text.len() - trimmed.len();
        if trimmed.is_empty() {
            return Ok(tokens);
        }
        match expr_token(trimmed) {
            Ok((after, kind)) => {
                let consumed = trimmed.len() - after.len();
                tokens.push(ExprToken {
                    kind,
                    span: Span::new(base + offset, base + offset + consumed),
                });
                offset += consumed;
            }
            Err(_) => {
                let found = trimmed.chars().next().unwrap_or_default();
                return Err(TemplateError::syntax(
                    format!("unexpected character '{found}'"),
                    Span::new(base + offset, base + offset + found.len_utf8()),
                ));
            }
        }
    }
}

/// Match a `{% endraw %}` tag at the start of `s`, returning its byte length
/// and whitespace-control flags.
fn match_end_raw(s: &str) -> Option<(usize, Whitespace, Whitespace)> {
    let mut pos = 2; // {%
    let mut close_left = Whitespace::Default;
    if let Some(c @ ('+' | '-' | '~')) = s[pos..].chars().next() {
        close_left = Whitespace::from_marker(Some(c));
        pos += 1;
    }
    let trimmed = s[pos..].trim_start_matches([' ', '\t', '\r', '\n']);
    pos = s.len() - trimmed.len();
    if !s[pos..].starts_with("endraw") {
        return None;
    }
    pos += "endraw".len();
    let trimmed = s[pos..].trim_start_matches([' ', '\t', '\r', '\n']);
    pos = s.len() - trimmed.len();
    let mut close_right = Whitespace::Default;
    if let Some(c @ ('+' | '-' | '~')) = s[pos..].chars().next() {
        close_right = Whitespace::from_marker(Some(c));
        pos += 1;
    }
    if !s[pos..].starts_with("%}") {
        return None;
    }
    Some((pos + 2, close_left, close_right))
}

fn expr_token(input: &str) -> IResult<&str, ExprTokenKind> {
    alt((string_literal, number, symbol, word))(input)
}

fn string_literal(input: &str) -> IResult<&str, ExprTokenKind> {
    alt((quoted('\''), quoted('"')))(input)
}

fn quoted(quote: char) -> impl Fn(&str) -> IResult<&str, ExprTokenKind> {
    move |input: &str| {
        let not_these: &str = if quote == '\'' { "\\'" } else { "\\\"" };
        let (input, _) = char(quote)(input)?;
        let (input, body) = opt(escaped_transform(
            is_not(not_these),
            '\\',
            alt((
                value('\\', char('\\')),
                value('\'', char('\'')),
                value('"', char('"')),
                value('\n', char('n')),
                value('\t', char('t')),
            )),
        ))(input)?;
        let (input, _) = char(quote)(input)?;
        Ok((input, ExprTokenKind::StringLiteral(body.unwrap_or_default())))
    }
}

fn number(input: &str) -> IResult<&str, ExprTokenKind> {
    let (rest, text) = recognize(tuple((
        opt(char('-')),
        digit1,
        opt(tuple((char('.'), digit1))),
        opt(tuple((one_of("eE"), opt(one_of("+-")), digit1))),
    )))(input)?;

    let is_float = text.contains('.')
        || text
            .find(['e', 'E'])
            .is_some_and(|at| text[at + 1..].starts_with('-'));

    let kind = if is_float {
        match text.parse::<f64>() {
            Ok(f) => ExprTokenKind::FloatLiteral(f),
            Err(_) => {
                return Err(nom::Err::Error(nom::error::Error::new(
                    input,
                    nom::error::ErrorKind::Float,
                )));
            }
        }
    } else {
        match text.parse::<f64>() {
            Ok(f) => ExprTokenKind::IntegerLiteral(f as i64),
            Err(_) => {
                return Err(nom::Err::Error(nom::error::Error::new(
                    input,
                    nom::error::ErrorKind::Digit,
                )));
            }
        }
    };
    Ok((rest, kind))
}

fn symbol(input: &str) -> IResult<&str, ExprTokenKind> {
    alt((
        alt((
            value(ExprTokenKind::Eq, tag("==")),
            value(ExprTokenKind::Ne, tag("!=")),
            value(ExprTokenKind::Ne, tag("<>")),
            value(ExprTokenKind::Ge, tag(">=")),
            value(ExprTokenKind::Le, tag("<=")),
            value(ExprTokenKind::AmpAmp, tag("&&")),
            value(ExprTokenKind::DoublePipe, tag("||")),
            value(ExprTokenKind::DotDot, tag("..")),
        )),
        alt((
            value(ExprTokenKind::Gt, tag(">")),
            value(ExprTokenKind::Lt, tag("<")),
            value(ExprTokenKind::Colon, tag(":")),
            value(ExprTokenKind::Pipe, tag("|")),
            value(ExprTokenKind::Comma, tag(",")),
            value(ExprTokenKind::LeftParen, tag("(")),
            value(ExprTokenKind::RightParen, tag(")")),
            value(ExprTokenKind::Assign, tag("=")),
            value(ExprTokenKind::Dot, tag(".")),
            value(ExprTokenKind::LeftBracket, tag("[")),
            value(ExprTokenKind::RightBracket, tag("]")),
            value(ExprTokenKind::Star, tag("*")),
            value(ExprTokenKind::Question, tag("?")),
            value(ExprTokenKind::At, tag("@")),
            value(ExprTokenKind::Root, tag("$")),
            value(ExprTokenKind::Bang, tag("!")),
        )),
    ))(input)
}

fn word(input: &str) -> IResult<&str, ExprTokenKind> {
    let (rest, id) = recognize(tuple((
        take_while1(|c: char| c.is_alphabetic() || c == '_'),
        take_while(|c: char| c.is_alphanumeric() || c == '_'),
    )))(input)?;

    let kind = match id {
        "true" => ExprTokenKind::True_,
        "false" => ExprTokenKind::False_,
        "null" | "nil" => ExprTokenKind::Null,
        "and" => ExprTokenKind::And,
        "or" => ExprTokenKind::Or,
        "not" => ExprTokenKind::Not,
        "in" => ExprTokenKind::In,
        "contains" => ExprTokenKind::Contains,
        "if" => ExprTokenKind::If,
        "else" => ExprTokenKind::Else,
        "with" => ExprTokenKind::With,
        "as" => ExprTokenKind::As,
        "for" => ExprTokenKind::For,
        _ => ExprTokenKind::Word(id.to_string()),
    };
    Ok((rest, kind))
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn kinds(tokens: &[ExprToken]) -> Vec<ExprTokenKind> {
        tokens.iter().map(|t| t.kind.clone()).collect()
    }

    #[test]
    fn test_content_only() {
        let tokens = tokenize("Hello, World!").unwrap();
        assert_eq!(tokens.len(), 2);
        assert_eq!(
            tokens[0],
            Markup::Content {
                span: Span::new(0, 13),
                text: "Hello, World!".to_string()
            }
        );
        assert_eq!(tokens[1], Markup::Eoi);
    }

    #[test]
    fn test_output_with_path() {
        let tokens = tokenize("{{ a.b[0] }}").unwrap();
        match &tokens[0] {
            Markup::Output { expression, wc, .. } => {
                assert_eq!(*wc, (Whitespace::Default, Whitespace::Default));
                assert_eq!(
                    kinds(expression),
                    vec![
                        ExprTokenKind::Word("a".to_string()),
                        ExprTokenKind::Dot,
                        ExprTokenKind::Word("b".to_string()),
                        ExprTokenKind::LeftBracket,
                        ExprTokenKind::IntegerLiteral(0),
                        ExprTokenKind::RightBracket,
                    ]
                );
            }
            other => panic!("expected output markup, found {other:?}"),
        }
    }

    #[test]
    fn test_whitespace_control_markers() {
        let tokens = tokenize("a {{- x +}} b {%~ assign y = 1 -%} c").unwrap();
        match &tokens[1] {
            Markup::Output { wc, .. } => {
                assert_eq!(*wc, (Whitespace::Strip, Whitespace::Preserve));
            }
            other => panic!("expected output markup, found {other:?}"),
        }
        match &tokens[3] {
            Markup::Tag { wc, name, .. } => {
                assert_eq!(name, "assign");
                assert_eq!(*wc, (Whitespace::StripNewlines, Whitespace::Strip));
            }
            other => panic!("expected tag markup, found {other:?}"),
        }
    }

    #[test]
    fn test_string_literals_and_escapes() {
        let tokens = tokenize(r#"{{ 'a\'b' | append: "c\nd" }}"#).unwrap();
        match &tokens[0] {
            Markup::Output { expression, .. } => {
                assert_eq!(
                    kinds(expression),
                    vec![
                        ExprTokenKind::StringLiteral("a'b".to_string()),
                        ExprTokenKind::Pipe,
                        ExprTokenKind::Word("append".to_string()),
                        ExprTokenKind::Colon,
                        ExprTokenKind::StringLiteral("c\nd".to_string()),
                    ]
                );
            }
            other => panic!("expected output markup, found {other:?}"),
        }
    }

    #[test]
    fn test_closing_delimiter_inside_string() {
        let tokens = tokenize("{{ 'not }} done' }}").unwrap();
        match &tokens[0] {
            Markup::Output { expression, .. } => {
                assert_eq!(
                    kinds(expression),
                    vec![ExprTokenKind::StringLiteral("not }} done".to_string())]
                );
            }
            other => panic!("expected output markup, found {other:?}"),
        }
    }

    #[test]
    fn test_numbers() {
        let tokens = tokenize("{{ -1 }}{{ 2.5 }}{{ 1e2 }}{{ 1e-2 }}{{ -0 }}").unwrap();
        let literals: Vec<ExprTokenKind> = tokens
            .iter()
            .flat_map(|t| t.expression().iter().map(|e| e.kind.clone()))
            .collect();
        assert_eq!(
            literals,
            vec![
                ExprTokenKind::IntegerLiteral(-1),
                ExprTokenKind::FloatLiteral(2.5),
                ExprTokenKind::IntegerLiteral(100),
                ExprTokenKind::FloatLiteral(0.01),
                ExprTokenKind::IntegerLiteral(0),
            ]
        );
    }

    #[test]
    fn test_range_tokens() {
        let tokens = tokenize("{{ (1..3) }}").unwrap();
        match &tokens[0] {
            Markup::Output { expression, .. } => {
                assert_eq!(
                    kinds(expression),
                    vec![
                        ExprTokenKind::LeftParen,
                        ExprTokenKind::IntegerLiteral(1),
                        ExprTokenKind::DotDot,
                        ExprTokenKind::IntegerLiteral(3),
                        ExprTokenKind::RightParen,
                    ]
                );
            }
            other => panic!("expected output markup, found {other:?}"),
        }
    }

    #[test]
    fn test_comment() {
        let tokens = tokenize("{# note -#}x").unwrap();
        assert_eq!(
            tokens[0],
            Markup::Comment {
                span: Span::new(0, 12),
                wc: (Whitespace::Default, Whitespace::Strip),
                text: " note ".to_string(),
            }
        );
    }

    #[test]
    fn test_raw_block() {
        let tokens = tokenize("{% raw %}{{ not lexed }}{% endraw %}").unwrap();
        match &tokens[0] {
            Markup::Raw { text, .. } => assert_eq!(text, "{{ not lexed }}"),
            other => panic!("expected raw markup, found {other:?}"),
        }
        assert_eq!(tokens.len(), 2);
    }

    #[test]
    fn test_liquid_line_statements() {
        let tokens = tokenize("{% liquid\nassign x = 1\necho x\n%}").unwrap();
        match &tokens[0] {
            Markup::Lines { statements, .. } => {
                assert_eq!(statements.len(), 2);
                assert_eq!(statements[0].name(), Some("assign"));
                assert_eq!(statements[1].name(), Some("echo"));
            }
            other => panic!("expected lines markup, found {other:?}"),
        }
    }

    #[test]
    fn test_spans_are_byte_offsets() {
        let source = "ab{{ cd }}";
        let tokens = tokenize(source).unwrap();
        assert_eq!(tokens[0].span(), Span::new(0, 2));
        assert_eq!(tokens[1].span(), Span::new(2, 10));
        match &tokens[1] {
            Markup::Output { expression, .. } => {
                assert_eq!(expression[0].span, Span::new(5, 7));
            }
            other => panic!("expected output markup, found {other:?}"),
        }
    }

    #[test]
    fn test_unclosed_output_is_an_error() {
        let err = tokenize("{{ a").unwrap_err();
        assert!(matches!(err, TemplateError::Syntax { .. }));
    }
}
