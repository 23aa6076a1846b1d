use std::fmt;

use miette::Result;

use crate::error;
use crate::lexer::cursor::Cursor;
use crate::symbol::{Register, Span, SrcOffset};

mod cursor;

#[derive(Clone, Copy, PartialEq, Debug)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum DirKind {
    Org,
    Equ,
    Db,
    Ds,
}

#[derive(Clone, Copy, PartialEq, Debug)]
pub enum TokenKind {
    /// Mnemonic, label, or symbol reference; text is recovered via the span.
    Ident,
    Reg(Register),
    Dir(DirKind),
    /// Numeric literal, already parsed. Range checks happen where the value
    /// is used, since 8-bit contexts differ (addresses, immediates, offsets).
    Lit(i64),
    /// String literal including its quotes; unescaped by the parser.
    Str,
    Hash,
    LBracket,
    RBracket,
    Plus,
    Minus,
    Comma,
    Colon,
    Eol,
    Eof,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let desc = match self {
            TokenKind::Ident => "identifier",
            TokenKind::Reg(_) => "register",
            TokenKind::Dir(_) => "directive",
            TokenKind::Lit(_) => "numeric literal",
            TokenKind::Str => "string literal",
            TokenKind::Hash => "`#`",
            TokenKind::LBracket => "`[`",
            TokenKind::RBracket => "`]`",
            TokenKind::Plus => "`+`",
            TokenKind::Minus => "`-`",
            TokenKind::Comma => "`,`",
            TokenKind::Colon => "`:`",
            TokenKind::Eol => "end of line",
            TokenKind::Eof => "end of file",
        };
        f.write_str(desc)
    }
}

/// Tokenize the entire source. Comments and inline whitespace are dropped;
/// line structure is kept as `Eol` tokens since the language is line-oriented.
pub fn tokenize(src: &'static str) -> Result<Vec<Token>> {
    let mut cur = Cursor::new(src);
    let mut toks = Vec::new();
    loop {
        let tok = advance_token(&mut cur, src)?;
        let eof = tok.kind == TokenKind::Eof;
        toks.push(tok);
        if eof {
            break;
        }
    }
    Ok(toks)
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_ident_continue(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

fn advance_token(cur: &mut Cursor, src: &'static str) -> Result<Token> {
    loop {
        // Inline whitespace and comments never reach the parser.
        cur.take_while(|c| c == ' ' || c == '\t' || c == '\r');
        if cur.first() == ';' {
            cur.take_while(|c| c != '\n');
            continue;
        }
        break;
    }

    let start = cur.abs_pos();

    if cur.is_eof() {
        return Ok(Token {
            kind: TokenKind::Eof,
            span: Span::new(SrcOffset(start), 0),
        });
    }

    let single = |cur: &mut Cursor, kind| {
        cur.bump();
        Ok(Token {
            kind,
            span: Span::new(SrcOffset(start), 1),
        })
    };

    match cur.first() {
        '\n' => single(cur, TokenKind::Eol),
        '#' => single(cur, TokenKind::Hash),
        '[' => single(cur, TokenKind::LBracket),
        ']' => single(cur, TokenKind::RBracket),
        '+' => single(cur, TokenKind::Plus),
        '-' => single(cur, TokenKind::Minus),
        ',' => single(cur, TokenKind::Comma),
        ':' => single(cur, TokenKind::Colon),
        '"' | '\'' => string_lit(cur, src, start),
        c if c.is_ascii_digit() => number_lit(cur, src, start),
        c if is_ident_start(c) => Ok(ident(cur, start)),
        '.' => directive(cur, src, start),
        _ => {
            cur.bump();
            let span = Span::new(SrcOffset(start), cur.abs_pos() - start);
            Err(error::lex_unknown(span, src))
        }
    }
}

fn string_lit(cur: &mut Cursor, src: &'static str, start: usize) -> Result<Token> {
    let quote = cur.first();
    cur.bump();
    loop {
        if cur.is_eof() || cur.first() == '\n' {
            let span = Span::new(SrcOffset(start), cur.abs_pos() - start);
            return Err(error::lex_unclosed_str(span, src));
        }
        match cur.first() {
            '\\' => {
                // Keep the escape pair raw; the parser validates it.
                cur.bump();
                cur.bump();
            }
            c if c == quote => {
                cur.bump();
                let span = Span::new(SrcOffset(start), cur.abs_pos() - start);
                return Ok(Token {
                    kind: TokenKind::Str,
                    span,
                });
            }
            _ => {
                cur.bump();
            }
        }
    }
}

fn number_lit(cur: &mut Cursor, src: &'static str, start: usize) -> Result<Token> {
    cur.take_while(is_ident_continue);
    let span = Span::new(SrcOffset(start), cur.abs_pos() - start);
    let text = cur.get_range(span.as_range());

    let parsed = if let Some(hex) = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        i64::from_str_radix(hex, 16)
    } else if let Some(bin) = text.strip_prefix("0b").or_else(|| text.strip_prefix("0B")) {
        i64::from_str_radix(bin, 2)
    } else {
        text.parse::<i64>()
    };

    match parsed {
        Ok(val) => Ok(Token {
            kind: TokenKind::Lit(val),
            span,
        }),
        Err(e) => Err(error::lex_invalid_lit(span, src, e)),
    }
}

fn ident(cur: &mut Cursor, start: usize) -> Token {
    cur.take_while(is_ident_continue);
    let span = Span::new(SrcOffset(start), cur.abs_pos() - start);
    let text = cur.get_range(span.as_range());

    // Register names are reserved in any case combination.
    let kind = match text.parse::<Register>() {
        Ok(reg) => TokenKind::Reg(reg),
        Err(()) => TokenKind::Ident,
    };
    Token { kind, span }
}

fn directive(cur: &mut Cursor, src: &'static str, start: usize) -> Result<Token> {
    cur.bump();
    cur.take_while(is_ident_continue);
    let span = Span::new(SrcOffset(start), cur.abs_pos() - start);
    let name = &cur.get_range(span.as_range())[1..];

    let kind = if name.eq_ignore_ascii_case("ORG") {
        DirKind::Org
    } else if name.eq_ignore_ascii_case("EQU") {
        DirKind::Equ
    } else if name.eq_ignore_ascii_case("DB") {
        DirKind::Db
    } else if name.eq_ignore_ascii_case("DS") {
        DirKind::Ds
    } else {
        return Err(error::lex_invalid_dir(span, src));
    };
    Ok(Token {
        kind: TokenKind::Dir(kind),
        span,
    })
}

#[cfg(test)]
mod test {
    use super::*;

    fn kinds(src: &'static str) -> Vec<TokenKind> {
        tokenize(src).unwrap().into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn lex_instruction_line() {
        assert_eq!(
            kinds("LD A, #37"),
            vec![
                TokenKind::Ident,
                TokenKind::Reg(Register::A),
                TokenKind::Comma,
                TokenKind::Hash,
                TokenKind::Lit(37),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn lex_indexed_operand() {
        assert_eq!(
            kinds("[r0+0x10]"),
            vec![
                TokenKind::LBracket,
                TokenKind::Reg(Register::R0),
                TokenKind::Plus,
                TokenKind::Lit(0x10),
                TokenKind::RBracket,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn lex_radix_literals() {
        assert_eq!(
            kinds("255 0xFF 0b1010"),
            vec![
                TokenKind::Lit(255),
                TokenKind::Lit(255),
                TokenKind::Lit(10),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn lex_label_and_comment() {
        assert_eq!(
            kinds("loop: DEC R0 ; spin\n"),
            vec![
                TokenKind::Ident,
                TokenKind::Colon,
                TokenKind::Ident,
                TokenKind::Reg(Register::R0),
                TokenKind::Eol,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn lex_directive_case_insensitive() {
        assert_eq!(
            kinds(".org 0x10\n.Db 1"),
            vec![
                TokenKind::Dir(DirKind::Org),
                TokenKind::Lit(0x10),
                TokenKind::Eol,
                TokenKind::Dir(DirKind::Db),
                TokenKind::Lit(1),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn lex_string_keeps_quotes() {
        let toks = tokenize(r#".DS "hi\n""#).unwrap();
        assert_eq!(toks[1].kind, TokenKind::Str);
        assert_eq!(toks[1].span.as_range(), 4..10);
    }

    #[test]
    fn lex_invalid_directive() {
        assert!(tokenize(".WORD 5").is_err());
    }

    #[test]
    fn lex_unclosed_string() {
        assert!(tokenize(".DS \"oops").is_err());
        assert!(tokenize(".DS \"oops\nHLT").is_err());
    }

    #[test]
    fn lex_bad_literal() {
        assert!(tokenize("0xZZ").is_err());
        assert!(tokenize("12abc").is_err());
    }

    #[test]
    fn lex_unknown_char() {
        assert!(tokenize("LD A, @5").is_err());
    }
}
