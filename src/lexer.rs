use crate::error::{Error, Result};

/// Raw `{{ }}` / `{% %}` token with its whitespace-control markers removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Delimited<'s> {
    /// The full token text, delimiters included.
    pub source: &'s str,
    /// Text between the delimiters and trim markers.
    pub markup: &'s str,
    pub line_number: u32,
    /// `{{-` / `{%-`: strip trailing whitespace of the preceding text.
    pub trim_left: bool,
    /// `-}}` / `-%}`: strip leading whitespace of the following text.
    pub trim_right: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Token<'s> {
    Text { text: &'s str, line_number: u32 },
    Output(Delimited<'s>),
    Tag(Delimited<'s>),
    /// End of input, returned forever once reached.
    Eof,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DelimiterKind {
    Output,
    Tag,
}

/// An opening delimiter that never found its closing counterpart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Unterminated<'s> {
    pub kind: DelimiterKind,
    pub source: &'s str,
    pub line_number: u32,
}

/// Splits template source into text, output and tag tokens.
///
/// Tokens are produced lazily and consumed once; the only way to restart
/// is to build a new tokenizer.
#[derive(Clone)]
pub struct Tokenizer<'s> {
    input: &'s str,
    cursor: usize,
    line_number: u32,
    for_liquid_tag: bool,
    unterminated: Option<Unterminated<'s>>,
}

impl<'s> Tokenizer<'s> {
    pub fn new(input: &'s str) -> Self {
        Self {
            input,
            cursor: 0,
            line_number: 1,
            for_liquid_tag: false,
            unterminated: None,
        }
    }

    /// Markup-only mode: every non-blank line of `markup` is a tag.
    pub fn for_liquid_tag(markup: &'s str, line_number: u32) -> Self {
        Self {
            for_liquid_tag: true,
            line_number,
            ..Self::new(markup)
        }
    }

    pub fn is_for_liquid_tag(&self) -> bool {
        self.for_liquid_tag
    }

    /// Line of the next token to be produced.
    pub fn line_number(&self) -> u32 {
        self.line_number
    }

    /// The delimiter that stopped tokenization, if any.
    pub fn unterminated(&self) -> Option<Unterminated<'s>> {
        self.unterminated
    }

    fn remaining(&self) -> &'s str {
        &self.input[self.cursor..]
    }

    fn advance(&mut self, n: usize) -> &'s str {
        let consumed = &self.input[self.cursor..self.cursor + n];
        self.cursor += n;
        self.line_number += count_lines(consumed);
        consumed
    }

    pub fn next_token(&mut self) -> Token<'s> {
        if self.unterminated.is_some() || self.remaining().is_empty() {
            return Token::Eof;
        }
        if self.for_liquid_tag {
            return self.next_liquid_line();
        }

        let rest = self.remaining();
        let line_number = self.line_number;
        let next_open = rest.find("{{").into_iter().chain(rest.find("{%")).min();

        match next_open {
            Some(0) => {
                let (kind, close) = if rest.starts_with("{{") {
                    (DelimiterKind::Output, "}}")
                } else {
                    (DelimiterKind::Tag, "%}")
                };
                let Some(end) = rest[2..].find(close) else {
                    self.unterminated = Some(Unterminated {
                        kind,
                        source: rest,
                        line_number,
                    });
                    return Token::Eof;
                };
                let source = self.advance(end + 4);
                let delimited = split_delimited(source, line_number);
                match kind {
                    DelimiterKind::Output => Token::Output(delimited),
                    DelimiterKind::Tag => Token::Tag(delimited),
                }
            }
            Some(idx) => Token::Text {
                text: self.advance(idx),
                line_number,
            },
            None => Token::Text {
                text: self.advance(rest.len()),
                line_number,
            },
        }
    }

    fn next_liquid_line(&mut self) -> Token<'s> {
        loop {
            let rest = self.remaining();
            if rest.is_empty() {
                return Token::Eof;
            }
            let line_number = self.line_number;
            let len = rest.find('\n').map_or(rest.len(), |i| i + 1);
            let line = self.advance(len).trim();
            if !line.is_empty() {
                return Token::Tag(Delimited {
                    source: line,
                    markup: line,
                    line_number,
                    trim_left: false,
                    trim_right: false,
                });
            }
        }
    }
}

fn count_lines(text: &str) -> u32 {
    u32::try_from(text.bytes().filter(|b| *b == b'\n').count()).unwrap_or(u32::MAX)
}

fn split_delimited(source: &str, line_number: u32) -> Delimited<'_> {
    let mut markup = &source[2..source.len() - 2];
    let trim_left = markup.starts_with('-');
    if trim_left {
        markup = &markup[1..];
    }
    let trim_right = markup.ends_with('-');
    if trim_right {
        markup = &markup[..markup.len() - 1];
    }
    Delimited {
        source,
        markup,
        line_number,
        trim_left,
        trim_right,
    }
}

/// Split tag markup into its name and the remaining arguments.
///
/// The name is either `#` (inline comment) or a run of word characters.
pub fn split_tag_markup(markup: &str) -> Option<(&str, &str)> {
    let markup = markup.trim_start();
    if let Some(rest) = markup.strip_prefix('#') {
        return Some(("#", rest.trim()));
    }
    let end = markup
        .find(|c: char| !(c.is_alphanumeric() || c == '_'))
        .unwrap_or(markup.len());
    if end == 0 {
        return None;
    }
    Some((&markup[..end], markup[end..].trim()))
}

/// Markup-level tokens used by the expression parser.
#[derive(Debug, Clone, PartialEq)]
pub enum MarkupToken {
    Comparison(String),
    Str(String),
    Int(i64),
    Float(f64),
    Id(String),
    DotDot,
    Dot,
    Pipe,
    Colon,
    Comma,
    OpenSquare,
    CloseSquare,
    OpenRound,
    CloseRound,
    Question,
    Dash,
    EndOfString,
}

impl MarkupToken {
    /// Short name used in "Expected X but found Y" messages.
    pub fn kind_name(&self) -> &'static str {
        match self {
            MarkupToken::Comparison(_) => "comparison",
            MarkupToken::Str(_) => "string",
            MarkupToken::Int(_) | MarkupToken::Float(_) => "number",
            MarkupToken::Id(_) => "id",
            MarkupToken::DotDot => "dotdot",
            MarkupToken::Dot => "dot",
            MarkupToken::Pipe => "pipe",
            MarkupToken::Colon => "colon",
            MarkupToken::Comma => "comma",
            MarkupToken::OpenSquare => "open_square",
            MarkupToken::CloseSquare => "close_square",
            MarkupToken::OpenRound => "open_round",
            MarkupToken::CloseRound => "close_round",
            MarkupToken::Question => "question",
            MarkupToken::Dash => "dash",
            MarkupToken::EndOfString => "end_of_string",
        }
    }
}

/// Tokenize tag or output markup.
///
/// In `lax` mode unknown characters (and unterminated strings) are
/// skipped instead of raising a syntax error.
pub fn lex_markup(input: &str, lax: bool) -> Result<Vec<MarkupToken>> {
    let mut tokens = Vec::new();
    let bytes = input.as_bytes();
    let mut i = 0;

    while i < bytes.len() {
        let c = bytes[i];
        if c.is_ascii_whitespace() {
            i += 1;
            continue;
        }
        let rest = &input[i..];

        // Comparisons
        if let Some(op) = ["==", "!=", "<>", "<=", ">="].iter().find(|op| rest.starts_with(**op)) {
            tokens.push(MarkupToken::Comparison((*op).to_string()));
            i += 2;
            continue;
        }
        if c == b'<' || c == b'>' {
            tokens.push(MarkupToken::Comparison((c as char).to_string()));
            i += 1;
            continue;
        }

        // Strings (no escapes)
        if c == b'\'' || c == b'"' {
            match rest[1..].find(c as char) {
                Some(end) => {
                    tokens.push(MarkupToken::Str(rest[1..=end].to_string()));
                    i += end + 2;
                }
                None if lax => i += 1,
                None => return Err(Error::syntax(format!("Unexpected character {}", c as char))),
            }
            continue;
        }

        // Numbers, including a leading minus
        let digits_at = if c == b'-' { i + 1 } else { i };
        if bytes.get(digits_at).is_some_and(u8::is_ascii_digit) {
            let mut end = digits_at;
            while end < bytes.len() && bytes[end].is_ascii_digit() {
                end += 1;
            }
            let is_float = bytes.get(end) == Some(&b'.') && bytes.get(end + 1).is_some_and(u8::is_ascii_digit);
            if is_float {
                end += 1;
                while end < bytes.len() && bytes[end].is_ascii_digit() {
                    end += 1;
                }
                let text = &input[i..end];
                tokens.push(MarkupToken::Float(text.parse().unwrap_or(0.0)));
            } else {
                let text = &input[i..end];
                match text.parse() {
                    Ok(n) => tokens.push(MarkupToken::Int(n)),
                    Err(_) => tokens.push(MarkupToken::Float(text.parse().unwrap_or(0.0))),
                }
            }
            i = end;
            continue;
        }

        // Identifiers: [A-Za-z_][\w-]*\??
        if c.is_ascii_alphabetic() || c == b'_' {
            let mut end = i + 1;
            while end < bytes.len() && (bytes[end].is_ascii_alphanumeric() || bytes[end] == b'_' || bytes[end] == b'-') {
                end += 1;
            }
            if bytes.get(end) == Some(&b'?') {
                end += 1;
            }
            let ident = &input[i..end];
            let followed_by_space = bytes.get(end).map_or(true, u8::is_ascii_whitespace);
            if ident == "contains" && followed_by_space {
                tokens.push(MarkupToken::Comparison(ident.to_string()));
            } else {
                tokens.push(MarkupToken::Id(ident.to_string()));
            }
            i = end;
            continue;
        }

        if rest.starts_with("..") {
            tokens.push(MarkupToken::DotDot);
            i += 2;
            continue;
        }

        let special = match c {
            b'|' => Some(MarkupToken::Pipe),
            b'.' => Some(MarkupToken::Dot),
            b':' => Some(MarkupToken::Colon),
            b',' => Some(MarkupToken::Comma),
            b'[' => Some(MarkupToken::OpenSquare),
            b']' => Some(MarkupToken::CloseSquare),
            b'(' => Some(MarkupToken::OpenRound),
            b')' => Some(MarkupToken::CloseRound),
            b'?' => Some(MarkupToken::Question),
            b'-' => Some(MarkupToken::Dash),
            _ => None,
        };
        match special {
            Some(token) => {
                tokens.push(token);
                i += 1;
            }
            None if lax => {
                i += rest.chars().next().map_or(1, char::len_utf8);
            }
            None => {
                let ch = rest.chars().next().unwrap_or_default();
                return Err(Error::syntax(format!("Unexpected character {ch}")));
            }
        }
    }

    tokens.push(MarkupToken::EndOfString);
    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn collect(source: &str) -> Vec<Token<'_>> {
        let mut tokenizer = Tokenizer::new(source);
        let mut out = Vec::new();
        loop {
            match tokenizer.next_token() {
                Token::Eof => break,
                token => out.push(token),
            }
        }
        out
    }

    #[test]
    fn splits_text_output_and_tags() {
        let tokens = collect("a {{ b }} c {% if d %}e");
        assert_eq!(tokens.len(), 5);
        assert!(matches!(tokens[0], Token::Text { text: "a ", .. }));
        assert!(matches!(tokens[1], Token::Output(Delimited { markup: " b ", .. })));
        assert!(matches!(tokens[3], Token::Tag(Delimited { markup: " if d ", .. })));
    }

    #[test]
    fn records_trim_markers() {
        let tokens = collect("{{- x -}}{%- y %}{{ z -}}");
        let flags: Vec<(bool, bool)> = tokens
            .iter()
            .map(|t| match t {
                Token::Output(d) | Token::Tag(d) => (d.trim_left, d.trim_right),
                _ => (false, false),
            })
            .collect();
        assert_eq!(flags, vec![(true, true), (true, false), (false, true)]);
    }

    #[test]
    fn tracks_line_numbers() {
        let tokens = collect("one\ntwo {{ x }}\n\n{% y %}");
        let lines: Vec<u32> = tokens
            .iter()
            .map(|t| match t {
                Token::Text { line_number, .. } => *line_number,
                Token::Output(d) | Token::Tag(d) => d.line_number,
                Token::Eof => 0,
            })
            .collect();
        assert_eq!(lines, vec![1, 2, 2, 4]);
    }

    #[test]
    fn unterminated_delimiter_stops_tokenizing() {
        let mut tokenizer = Tokenizer::new("hi {% if x");
        assert!(matches!(tokenizer.next_token(), Token::Text { text: "hi ", .. }));
        assert_eq!(tokenizer.next_token(), Token::Eof);
        assert_eq!(tokenizer.next_token(), Token::Eof);
        let unterminated = tokenizer.unterminated().unwrap();
        assert_eq!(unterminated.kind, DelimiterKind::Tag);
        assert_eq!(unterminated.source, "{% if x");
    }

    #[test]
    fn liquid_tag_mode_yields_lines() {
        let mut tokenizer = Tokenizer::for_liquid_tag("assign x = 1\n\n  echo x\n", 3);
        let first = tokenizer.next_token();
        let second = tokenizer.next_token();
        assert!(matches!(first, Token::Tag(Delimited { markup: "assign x = 1", line_number: 3, .. })));
        assert!(matches!(second, Token::Tag(Delimited { markup: "echo x", line_number: 5, .. })));
        assert_eq!(tokenizer.next_token(), Token::Eof);
    }

    #[test]
    fn lexes_markup() {
        let tokens = lex_markup("a.b[0] | f: -1.5, 'x' contains (1..3)", false).unwrap();
        assert_eq!(
            tokens,
            vec![
                MarkupToken::Id("a".into()),
                MarkupToken::Dot,
                MarkupToken::Id("b".into()),
                MarkupToken::OpenSquare,
                MarkupToken::Int(0),
                MarkupToken::CloseSquare,
                MarkupToken::Pipe,
                MarkupToken::Id("f".into()),
                MarkupToken::Colon,
                MarkupToken::Float(-1.5),
                MarkupToken::Comma,
                MarkupToken::Str("x".into()),
                MarkupToken::Comparison("contains".into()),
                MarkupToken::OpenRound,
                MarkupToken::Int(1),
                MarkupToken::DotDot,
                MarkupToken::Int(3),
                MarkupToken::CloseRound,
                MarkupToken::EndOfString,
            ]
        );
    }

    #[test]
    fn unknown_characters_depend_on_mode() {
        assert!(lex_markup("a @ b", false).is_err());
        let tokens = lex_markup("a @ b", true).unwrap();
        assert_eq!(tokens.len(), 3);
    }

    #[test]
    fn splits_tag_names() {
        assert_eq!(split_tag_markup("  for x in y "), Some(("for", "x in y")));
        assert_eq!(split_tag_markup("# note"), Some(("#", "note")));
        assert_eq!(split_tag_markup("  "), None);
    }
}
