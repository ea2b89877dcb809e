use thiserror::Error;

use crate::token::{Span, Token, TokenKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LexerState {
    LineBegin,
    TokenStart,
}

enum StepOutcome<'a> {
    Emit(Token<'a>),
    Continue,
}

#[derive(Debug, Error, PartialEq)]
pub enum LexError {
    #[error("Unexpected character '{character}' at position {position}")]
    UnexpectedCharacter { character: char, position: usize },
    #[error("Bad indentation: dedent to {indent_level} spaces at position {position} matches no enclosing block")]
    BadIndentation {
        indent_level: usize,
        position: usize,
    },
    #[error("Tabs are not supported for indentation at position {position}")]
    TabIndentation { position: usize },
    #[error("Invalid integer literal '{literal}' at position {position}")]
    InvalidIntegerLiteral { literal: String, position: usize },
    #[error("Invalid float literal '{literal}' at position {position}")]
    InvalidFloatLiteral { literal: String, position: usize },
    #[error("Unterminated string literal at position {position}")]
    UnterminatedString { position: usize },
    #[error("Invalid escape sequence at position {position}")]
    InvalidEscape { position: usize },
    #[error("Lexer invariant violated: {message}")]
    InvariantViolation { message: &'static str },
}

pub type LexResult<T> = Result<T, LexError>;

pub struct Lexer<'a> {
    input: &'a str,
    pos: usize,
    line: usize,
    line_start: usize,
    indent_stack: Vec<usize>,
    pending_tokens: Vec<Token<'a>>,
    state: LexerState,
    // Depth of open ( [ {; newlines inside brackets are joined.
    bracket_depth: usize,
    line_has_content: bool,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str) -> Self {
        Self {
            input,
            pos: 0,
            line: 1,
            line_start: 0,
            indent_stack: vec![0],
            pending_tokens: Vec::new(),
            state: LexerState::LineBegin,
            bracket_depth: 0,
            line_has_content: false,
        }
    }

    pub fn next_token(&mut self) -> LexResult<Token<'a>> {
        loop {
            if let Some(token) = self.pending_tokens.pop() {
                return Ok(token);
            }

            match self.step_state()? {
                StepOutcome::Emit(token) => return Ok(token),
                StepOutcome::Continue => continue,
            }
        }
    }

    fn step_state(&mut self) -> LexResult<StepOutcome<'a>> {
        match self.state {
            LexerState::LineBegin => self.step_line_begin(),
            LexerState::TokenStart => {
                self.skip_spaces();

                if self.peek_char() == Some('#') {
                    self.consume_while(|c| c != '\n');
                }

                if self.peek_char().is_none() {
                    return self.handle_eof();
                }

                Ok(StepOutcome::Emit(self.read_token_from_current_position()?))
            }
        }
    }

    fn step_line_begin(&mut self) -> LexResult<StepOutcome<'a>> {
        let indent_level = self.count_indentation()?;

        match self.peek_char() {
            // Blank lines and comment-only lines never reach the parser.
            Some('\n') => {
                self.consume_char();
                return Ok(StepOutcome::Continue);
            }
            Some('#') => {
                self.consume_while(|c| c != '\n');
                if self.peek_char() == Some('\n') {
                    self.consume_char();
                }
                return Ok(StepOutcome::Continue);
            }
            None => {
                self.state = LexerState::TokenStart;
                return Ok(StepOutcome::Continue);
            }
            _ => {}
        }

        let current_indent = self.current_indent()?;
        let span = self.point_span();

        if indent_level > current_indent {
            self.indent_stack.push(indent_level);
            self.state = LexerState::TokenStart;
            return Ok(StepOutcome::Emit(Token::new(TokenKind::Indent, span)));
        }

        if indent_level < current_indent {
            while let Some(&top) = self.indent_stack.last() {
                if top > indent_level {
                    self.indent_stack.pop();
                    self.pending_tokens.push(Token::new(TokenKind::Dedent, span));
                } else {
                    break;
                }
            }
            if self.current_indent()? != indent_level {
                return Err(LexError::BadIndentation {
                    indent_level,
                    position: self.pos,
                });
            }
            self.state = LexerState::TokenStart;
            return Ok(StepOutcome::Continue);
        }

        self.state = LexerState::TokenStart;
        Ok(StepOutcome::Continue)
    }

    fn handle_eof(&mut self) -> LexResult<StepOutcome<'a>> {
        // A final line without a trailing '\n' still terminates its statement.
        if self.line_has_content {
            self.line_has_content = false;
            return Ok(StepOutcome::Emit(Token::new(
                TokenKind::Newline,
                self.point_span(),
            )));
        }

        self.flush_eof_dedents();
        if !self.pending_tokens.is_empty() {
            return Ok(StepOutcome::Continue);
        }

        Ok(StepOutcome::Emit(Token::new(
            TokenKind::Eof,
            self.point_span(),
        )))
    }

    fn count_indentation(&mut self) -> LexResult<usize> {
        let indentation = self.consume_while(|c| c == ' ');
        if self.peek_char() == Some('\t') {
            return Err(LexError::TabIndentation { position: self.pos });
        }
        Ok(indentation)
    }

    fn skip_spaces(&mut self) {
        self.consume_while(|c| c == ' ');
    }

    fn read_token_from_current_position(&mut self) -> LexResult<Token<'a>> {
        let start = self.pos;
        let line = self.line;
        let column = self.pos - self.line_start + 1;
        let ch = self.peek_char().ok_or(LexError::InvariantViolation {
            message: "read_token_from_current_position called at EOF",
        })?;

        if ch == '\n' {
            self.consume_char();
            if self.bracket_depth > 0 {
                // Implicit line joining inside ( [ {.
                return self.read_joined_line_token();
            }
            self.state = LexerState::LineBegin;
            self.line_has_content = false;
            return Ok(Token::new(
                TokenKind::Newline,
                Span::new(start, start + 1, line, column),
            ));
        }

        self.line_has_content = true;

        if let Some(kind) = self.try_read_operator(ch) {
            let end = self.pos;
            return Ok(Token::new(kind, Span::new(start, end, line, column)));
        }

        match ch {
            '"' | '\'' => self.read_string(ch, start, line, column),
            c if c.is_alphabetic() || c == '_' => Ok(self.read_identifier(start, line, column)),
            c if c.is_ascii_digit() => self.read_number(start, line, column),
            _ => Err(LexError::UnexpectedCharacter {
                character: ch,
                position: start,
            }),
        }
    }

    fn read_joined_line_token(&mut self) -> LexResult<Token<'a>> {
        loop {
            self.skip_spaces();
            match self.peek_char() {
                Some('\n') => {
                    self.consume_char();
                }
                Some('#') => {
                    self.consume_while(|c| c != '\n');
                }
                Some(_) => return self.read_token_from_current_position(),
                None => {
                    return Err(LexError::InvariantViolation {
                        message: "unbalanced brackets at end of file",
                    });
                }
            }
        }
    }

    /// Maximal-munch operator and delimiter recognition.
    fn try_read_operator(&mut self, ch: char) -> Option<TokenKind<'a>> {
        let kind = match ch {
            '=' => {
                self.consume_char();
                if self.peek_char() == Some('=') {
                    self.consume_char();
                    TokenKind::EqualEqual
                } else {
                    TokenKind::Equal
                }
            }
            '+' => {
                self.consume_char();
                if self.peek_char() == Some('=') {
                    self.consume_char();
                    TokenKind::PlusEqual
                } else {
                    TokenKind::Plus
                }
            }
            '-' => {
                self.consume_char();
                match self.peek_char() {
                    Some('=') => {
                        self.consume_char();
                        TokenKind::MinusEqual
                    }
                    Some('>') => {
                        self.consume_char();
                        TokenKind::Arrow
                    }
                    _ => TokenKind::Minus,
                }
            }
            '*' => {
                self.consume_char();
                match self.peek_char() {
                    Some('*') => {
                        self.consume_char();
                        TokenKind::DoubleStar
                    }
                    Some('=') => {
                        self.consume_char();
                        TokenKind::StarEqual
                    }
                    _ => TokenKind::Star,
                }
            }
            '/' => {
                self.consume_char();
                if self.peek_char() == Some('/') {
                    self.consume_char();
                    if self.peek_char() == Some('=') {
                        self.consume_char();
                        TokenKind::DoubleSlashEqual
                    } else {
                        TokenKind::DoubleSlash
                    }
                } else {
                    TokenKind::Slash
                }
            }
            '%' => {
                self.consume_char();
                if self.peek_char() == Some('=') {
                    self.consume_char();
                    TokenKind::PercentEqual
                } else {
                    TokenKind::Percent
                }
            }
            '<' => {
                self.consume_char();
                match self.peek_char() {
                    Some('=') => {
                        self.consume_char();
                        TokenKind::LessEqual
                    }
                    Some('<') => {
                        self.consume_char();
                        TokenKind::LeftShift
                    }
                    _ => TokenKind::Less,
                }
            }
            '>' => {
                self.consume_char();
                match self.peek_char() {
                    Some('=') => {
                        self.consume_char();
                        TokenKind::GreaterEqual
                    }
                    Some('>') => {
                        self.consume_char();
                        TokenKind::RightShift
                    }
                    _ => TokenKind::Greater,
                }
            }
            '!' => {
                if self.peek_ahead(1) == Some('=') {
                    self.consume_char();
                    self.consume_char();
                    TokenKind::NotEqual
                } else {
                    return None;
                }
            }
            '&' => {
                self.consume_char();
                TokenKind::Ampersand
            }
            '^' => {
                self.consume_char();
                TokenKind::Caret
            }
            '|' => {
                self.consume_char();
                TokenKind::Pipe
            }
            '~' => {
                self.consume_char();
                TokenKind::Tilde
            }
            ':' => {
                self.consume_char();
                TokenKind::Colon
            }
            ',' => {
                self.consume_char();
                TokenKind::Comma
            }
            '.' => {
                self.consume_char();
                TokenKind::Dot
            }
            '(' => {
                self.consume_char();
                self.bracket_depth += 1;
                TokenKind::LParen
            }
            ')' => {
                self.consume_char();
                self.bracket_depth = self.bracket_depth.saturating_sub(1);
                TokenKind::RParen
            }
            '[' => {
                self.consume_char();
                self.bracket_depth += 1;
                TokenKind::LBracket
            }
            ']' => {
                self.consume_char();
                self.bracket_depth = self.bracket_depth.saturating_sub(1);
                TokenKind::RBracket
            }
            '{' => {
                self.consume_char();
                self.bracket_depth += 1;
                TokenKind::LBrace
            }
            '}' => {
                self.consume_char();
                self.bracket_depth = self.bracket_depth.saturating_sub(1);
                TokenKind::RBrace
            }
            _ => return None,
        };
        Some(kind)
    }

    fn read_identifier(&mut self, start: usize, line: usize, column: usize) -> Token<'a> {
        self.consume_while(|c| c.is_alphanumeric() || c == '_');
        let end = self.pos;

        let ident = &self.input[start..end];
        let kind = match ident {
            "def" => TokenKind::Def,
            "class" => TokenKind::Class,
            "if" => TokenKind::If,
            "elif" => TokenKind::Elif,
            "else" => TokenKind::Else,
            "for" => TokenKind::For,
            "while" => TokenKind::While,
            "return" => TokenKind::Return,
            "import" => TokenKind::Import,
            "from" => TokenKind::From,
            "as" => TokenKind::As,
            "async" => TokenKind::Async,
            "pass" => TokenKind::Pass,
            "True" => TokenKind::True,
            "False" => TokenKind::False,
            "None" => TokenKind::None,
            "and" => TokenKind::And,
            "or" => TokenKind::Or,
            "not" => TokenKind::Not,
            "in" => TokenKind::In,
            "is" => TokenKind::Is,
            _ => TokenKind::Identifier(ident),
        };
        Token::new(kind, Span::new(start, end, line, column))
    }

    fn read_number(&mut self, start: usize, line: usize, column: usize) -> LexResult<Token<'a>> {
        if self.peek_char() == Some('0') {
            match self.peek_ahead(1) {
                Some('x') | Some('X') => return self.read_radix_integer(start, line, column, 16),
                Some('o') | Some('O') => return self.read_radix_integer(start, line, column, 8),
                Some('b') | Some('B') => return self.read_radix_integer(start, line, column, 2),
                _ => {}
            }
        }

        self.consume_while(|c| c.is_ascii_digit());

        let is_float = self.peek_char() == Some('.')
            && self.peek_ahead(1).is_some_and(|c| c.is_ascii_digit());
        if is_float {
            self.consume_char();
            self.consume_while(|c| c.is_ascii_digit());
            let end = self.pos;
            let literal = &self.input[start..end];
            let value = literal
                .parse::<f64>()
                .map_err(|_| LexError::InvalidFloatLiteral {
                    literal: literal.to_string(),
                    position: start,
                })?;
            return Ok(Token::new(
                TokenKind::Float(value),
                Span::new(start, end, line, column),
            ));
        }

        let end = self.pos;
        let literal = &self.input[start..end];
        let value = literal
            .parse::<i64>()
            .map_err(|_| LexError::InvalidIntegerLiteral {
                literal: literal.to_string(),
                position: start,
            })?;
        Ok(Token::new(
            TokenKind::Integer(value),
            Span::new(start, end, line, column),
        ))
    }

    fn read_radix_integer(
        &mut self,
        start: usize,
        line: usize,
        column: usize,
        radix: u32,
    ) -> LexResult<Token<'a>> {
        self.consume_char(); // 0
        self.consume_char(); // x / o / b
        let digits_start = self.pos;
        self.consume_while(|c| c.is_ascii_alphanumeric());
        let end = self.pos;
        let digits = &self.input[digits_start..end];
        let value =
            i64::from_str_radix(digits, radix).map_err(|_| LexError::InvalidIntegerLiteral {
                literal: self.input[start..end].to_string(),
                position: start,
            })?;
        Ok(Token::new(
            TokenKind::Integer(value),
            Span::new(start, end, line, column),
        ))
    }

    fn read_string(
        &mut self,
        quote: char,
        start: usize,
        line: usize,
        column: usize,
    ) -> LexResult<Token<'a>> {
        self.consume_char(); // opening quote

        // Triple-quoted strings are accepted but carry no special semantics.
        let triple = self.peek_char() == Some(quote) && self.peek_ahead(1) == Some(quote);
        if triple {
            self.consume_char();
            self.consume_char();
        }

        let mut value = String::new();
        loop {
            let Some(ch) = self.peek_char() else {
                return Err(LexError::UnterminatedString { position: start });
            };

            if ch == quote {
                if triple {
                    if self.peek_ahead(1) == Some(quote) && self.peek_ahead(2) == Some(quote) {
                        self.consume_char();
                        self.consume_char();
                        self.consume_char();
                        break;
                    }
                    self.consume_char();
                    value.push(ch);
                    continue;
                }
                self.consume_char();
                break;
            }

            if ch == '\n' && !triple {
                return Err(LexError::UnterminatedString { position: start });
            }

            if ch == '\\' {
                self.consume_char();
                value.push(self.read_escape()?);
                continue;
            }

            self.consume_char();
            value.push(ch);
        }

        let end = self.pos;
        Ok(Token::new(
            TokenKind::String(value),
            Span::new(start, end, line, column),
        ))
    }

    fn read_escape(&mut self) -> LexResult<char> {
        let position = self.pos;
        let Some(ch) = self.consume_char() else {
            return Err(LexError::UnterminatedString { position });
        };
        let resolved = match ch {
            'n' => '\n',
            't' => '\t',
            'r' => '\r',
            '\\' => '\\',
            '"' => '"',
            '\'' => '\'',
            '0' => '\0',
            'x' => {
                let hi = self.consume_char().ok_or(LexError::InvalidEscape { position })?;
                let lo = self.consume_char().ok_or(LexError::InvalidEscape { position })?;
                let hi = hi.to_digit(16).ok_or(LexError::InvalidEscape { position })?;
                let lo = lo.to_digit(16).ok_or(LexError::InvalidEscape { position })?;
                char::from_u32(hi * 16 + lo).ok_or(LexError::InvalidEscape { position })?
            }
            other => return Ok(other),
        };
        Ok(resolved)
    }

    fn consume_while<P>(&mut self, keep_predicate: P) -> usize
    where
        P: Fn(char) -> bool,
    {
        let start = self.pos;
        while let Some(c) = self.peek_char() {
            if !keep_predicate(c) {
                break;
            }
            self.consume_char();
        }
        self.pos - start
    }

    fn char_at(&self, index: usize) -> Option<char> {
        if index >= self.input.len() {
            None
        } else {
            self.input[index..].chars().next()
        }
    }

    fn peek_char(&self) -> Option<char> {
        self.char_at(self.pos)
    }

    fn peek_ahead(&self, offset: usize) -> Option<char> {
        let mut chars = self.input.get(self.pos..)?.chars();
        chars.nth(offset)
    }

    fn consume_char(&mut self) -> Option<char> {
        let c = self.peek_char()?;
        self.pos += c.len_utf8();
        if c == '\n' {
            self.line += 1;
            self.line_start = self.pos;
        }
        Some(c)
    }

    fn point_span(&self) -> Span {
        Span::new(self.pos, self.pos, self.line, self.pos - self.line_start + 1)
    }

    fn current_indent(&self) -> LexResult<usize> {
        self.indent_stack
            .last()
            .copied()
            .ok_or(LexError::InvariantViolation {
                message: "indent stack is empty",
            })
    }

    fn flush_eof_dedents(&mut self) {
        while self.indent_stack.len() > 1 {
            self.indent_stack.pop();
            self.pending_tokens
                .push(Token::new(TokenKind::Dedent, self.point_span()));
        }
    }
}

impl<'a> Iterator for Lexer<'a> {
    type Item = LexResult<Token<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.next_token() {
            Ok(token) => Some(Ok(token)),
            Err(e) => Some(Err(e)),
        }
    }
}

pub fn tokenize(input: &str) -> LexResult<Vec<Token<'_>>> {
    let mut lexer = Lexer::new(input);
    let mut tokens = Vec::new();
    loop {
        let token = lexer.next_token()?;
        let is_eof = matches!(token.kind, TokenKind::Eof);
        tokens.push(token);
        if is_eof {
            break;
        }
    }
    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;

    fn kinds(input: &str) -> Vec<TokenKind<'_>> {
        tokenize(input)
            .expect("tokenize should succeed")
            .into_iter()
            .map(|token| token.kind)
            .collect()
    }

    #[test]
    fn test_simple_program() {
        let input = indoc! {"
            def fn():
                n = 4 + 4
                print(n)
            fn()
        "};
        let expected = vec![
            TokenKind::Def,
            TokenKind::Identifier("fn"),
            TokenKind::LParen,
            TokenKind::RParen,
            TokenKind::Colon,
            TokenKind::Newline,
            TokenKind::Indent,
            TokenKind::Identifier("n"),
            TokenKind::Equal,
            TokenKind::Integer(4),
            TokenKind::Plus,
            TokenKind::Integer(4),
            TokenKind::Newline,
            TokenKind::Identifier("print"),
            TokenKind::LParen,
            TokenKind::Identifier("n"),
            TokenKind::RParen,
            TokenKind::Newline,
            TokenKind::Dedent,
            TokenKind::Identifier("fn"),
            TokenKind::LParen,
            TokenKind::RParen,
            TokenKind::Newline,
            TokenKind::Eof,
        ];
        assert_eq!(kinds(input), expected);
    }

    #[test]
    fn maximal_munch_operators() {
        let input = "a <= b >= c == d != e // f ** g << h >> i -> j += k\n";
        let expected = vec![
            TokenKind::Identifier("a"),
            TokenKind::LessEqual,
            TokenKind::Identifier("b"),
            TokenKind::GreaterEqual,
            TokenKind::Identifier("c"),
            TokenKind::EqualEqual,
            TokenKind::Identifier("d"),
            TokenKind::NotEqual,
            TokenKind::Identifier("e"),
            TokenKind::DoubleSlash,
            TokenKind::Identifier("f"),
            TokenKind::DoubleStar,
            TokenKind::Identifier("g"),
            TokenKind::LeftShift,
            TokenKind::Identifier("h"),
            TokenKind::RightShift,
            TokenKind::Identifier("i"),
            TokenKind::Arrow,
            TokenKind::Identifier("j"),
            TokenKind::PlusEqual,
            TokenKind::Identifier("k"),
            TokenKind::Newline,
            TokenKind::Eof,
        ];
        assert_eq!(kinds(input), expected);
    }

    #[test]
    fn radix_and_float_literals() {
        let input = "a = 0xff\nb = 0o17\nc = 0b101\nd = 3.25\n";
        let actual = kinds(input);
        assert!(actual.contains(&TokenKind::Integer(255)));
        assert!(actual.contains(&TokenKind::Integer(15)));
        assert!(actual.contains(&TokenKind::Integer(5)));
        assert!(actual.contains(&TokenKind::Float(3.25)));
    }

    #[test]
    fn string_escapes_and_quotes() {
        let input = "a = \"x\\n\\ty\"\nb = 'z'\nc = \"\\x41\"\n";
        let actual = kinds(input);
        assert!(actual.contains(&TokenKind::String("x\n\ty".to_string())));
        assert!(actual.contains(&TokenKind::String("z".to_string())));
        assert!(actual.contains(&TokenKind::String("A".to_string())));
    }

    #[test]
    fn triple_quoted_string_is_ordinary() {
        let input = "s = \"\"\"two\nlines\"\"\"\n";
        let actual = kinds(input);
        assert!(actual.contains(&TokenKind::String("two\nlines".to_string())));
    }

    #[test]
    fn comments_and_blank_lines_are_swallowed() {
        let input = indoc! {"
            # leading comment
            x = 1  # trailing comment

            # comment-only line
            y = 2
        "};
        let expected = vec![
            TokenKind::Identifier("x"),
            TokenKind::Equal,
            TokenKind::Integer(1),
            TokenKind::Newline,
            TokenKind::Identifier("y"),
            TokenKind::Equal,
            TokenKind::Integer(2),
            TokenKind::Newline,
            TokenKind::Eof,
        ];
        assert_eq!(kinds(input), expected);
    }

    #[test]
    fn newlines_inside_brackets_are_joined() {
        let input = indoc! {"
            xs = [1,
                  2]
        "};
        let expected = vec![
            TokenKind::Identifier("xs"),
            TokenKind::Equal,
            TokenKind::LBracket,
            TokenKind::Integer(1),
            TokenKind::Comma,
            TokenKind::Integer(2),
            TokenKind::RBracket,
            TokenKind::Newline,
            TokenKind::Eof,
        ];
        assert_eq!(kinds(input), expected);
    }

    #[test]
    fn errors_on_invalid_character() {
        let err = tokenize("x = 1 @ 2\n").expect_err("expected lexing failure");
        assert!(err.to_string().contains("Unexpected character '@'"));
    }

    #[test]
    fn errors_on_integer_overflow() {
        let err =
            tokenize("n = 99999999999999999999999999\n").expect_err("expected overflow failure");
        assert!(err.to_string().contains("Invalid integer literal"));
    }

    #[test]
    fn errors_on_tab_indentation() {
        let err = tokenize("\tx = 1\n").expect_err("expected tab indentation failure");
        assert_eq!(err, LexError::TabIndentation { position: 0 });
    }

    #[test]
    fn errors_on_inconsistent_dedent() {
        let input = indoc! {"
            if True:
                x = 1
              y = 2
        "};
        let err = tokenize(input).expect_err("expected inconsistent dedent failure");
        assert_eq!(
            err,
            LexError::BadIndentation {
                indent_level: 2,
                position: 21
            }
        );
    }

    #[test]
    fn emits_dedent_before_eof() {
        let input = "if True:\n    x = 1";
        let expected = vec![
            TokenKind::If,
            TokenKind::True,
            TokenKind::Colon,
            TokenKind::Newline,
            TokenKind::Indent,
            TokenKind::Identifier("x"),
            TokenKind::Equal,
            TokenKind::Integer(1),
            TokenKind::Newline,
            TokenKind::Dedent,
            TokenKind::Eof,
        ];
        assert_eq!(kinds(input), expected);
    }

    #[test]
    fn errors_on_unterminated_string() {
        let err = tokenize("x = \"abc\n").expect_err("expected unterminated string failure");
        assert_eq!(err, LexError::UnterminatedString { position: 4 });
    }

    #[test]
    fn tracks_line_and_column() {
        let tokens = tokenize("x = 1\ny = 2\n").expect("tokenize should succeed");
        let y = tokens
            .iter()
            .find(|token| token.kind == TokenKind::Identifier("y"))
            .expect("y token present");
        assert_eq!(y.span.line, 2);
        assert_eq!(y.span.column, 1);
    }

    #[test]
    fn keywords_are_recognised() {
        let input = "async def f():\n    pass\n";
        let actual = kinds(input);
        assert_eq!(actual[0], TokenKind::Async);
        assert_eq!(actual[1], TokenKind::Def);
        assert!(actual.contains(&TokenKind::Pass));
    }
}
