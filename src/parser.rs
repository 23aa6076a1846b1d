use miette::Result;

use crate::ast::{DbItem, Expr, ExprKind, LabelDef, Line, Operand, Program, Stmt};
use crate::error;
use crate::isa::{AluOp, Cond};
use crate::lexer::{tokenize, DirKind, Token, TokenKind};
use crate::symbol::{Register, Span};

/// How a bare expression operand (no `#`, no brackets) is classified.
/// LD and the ALU ops read it as an immediate, ST as a direct address.
#[derive(Clone, Copy)]
enum BareAs {
    Imm,
    Direct,
}

/// Transforms the token stream into a [`Program`].
pub struct AsmParser {
    /// Reference to the source file
    src: &'static str,
    toks: Vec<Token>,
    pos: usize,
    /// Tracker for current line
    line: u32,
    /// Span of the most recently consumed token
    last_span: Span,
}

impl AsmParser {
    pub fn new(src: &'static str) -> Result<Self> {
        let toks = tokenize(src)?;
        Ok(AsmParser {
            src,
            toks,
            pos: 0,
            line: 1,
            last_span: Span::dummy(),
        })
    }

    fn get_span(&self, span: Span) -> &str {
        &self.src[span.as_range()]
    }

    fn peek(&self) -> Token {
        self.toks[self.pos]
    }

    fn peek2(&self) -> Token {
        self.toks[(self.pos + 1).min(self.toks.len() - 1)]
    }

    fn bump(&mut self) -> Token {
        let tok = self.toks[self.pos];
        if tok.kind != TokenKind::Eof {
            self.pos += 1;
        }
        self.last_span = tok.span;
        tok
    }

    /// Parse the whole source into per-line statements.
    pub fn parse(mut self) -> Result<Program> {
        let mut prog = Program::default();
        loop {
            match self.peek().kind {
                TokenKind::Eof => break,
                TokenKind::Eol => {
                    self.bump();
                    self.line += 1;
                    continue;
                }
                _ => {}
            }

            let line_no = self.line;
            let start = self.peek().span;
            let label = self.optional_label();

            let stmt = match self.peek().kind {
                TokenKind::Eol | TokenKind::Eof => None,
                TokenKind::Dir(dir) => Some(self.parse_dir(dir)?),
                TokenKind::Ident => Some(self.parse_instr()?),
                _ => {
                    let found = self.peek();
                    return Err(error::parse_unexpected(
                        self.src,
                        "an instruction, directive, or label",
                        &found,
                    ));
                }
            };

            prog.lines.push(Line {
                label,
                stmt,
                span: start.join(self.last_span),
                line_no,
            });

            // Nothing else may share the line.
            match self.peek().kind {
                TokenKind::Eol => {
                    self.bump();
                    self.line += 1;
                }
                TokenKind::Eof => {}
                _ => {
                    let found = self.peek();
                    return Err(error::parse_unexpected(self.src, "end of line", &found));
                }
            }
        }
        Ok(prog)
    }

    /// Consume a `label:` prefix or leave the stream untouched.
    fn optional_label(&mut self) -> Option<LabelDef> {
        if self.peek().kind == TokenKind::Ident && self.peek2().kind == TokenKind::Colon {
            let tok = self.bump();
            self.bump();
            Some(LabelDef {
                name: self.get_span(tok.span).to_string(),
                span: tok.span,
            })
        } else {
            None
        }
    }

    fn parse_instr(&mut self) -> Result<Stmt> {
        let tok = self.bump();
        let mnemonic = self.get_span(tok.span).to_ascii_uppercase();
        match mnemonic.as_str() {
            "LD" => {
                let dest = self.expect_reg()?;
                self.expect(TokenKind::Comma, "`,`")?;
                let src = self.parse_operand(BareAs::Imm)?;
                Ok(Stmt::Ld { dest, src })
            }
            "ST" => {
                let src = self.expect_reg()?;
                self.expect(TokenKind::Comma, "`,`")?;
                let dst = self.parse_operand(BareAs::Direct)?;
                Ok(Stmt::St { src, dst })
            }
            "ADD" => self.parse_alu(AluOp::Add),
            "SUB" => self.parse_alu(AluOp::Sub),
            "AND" => self.parse_alu(AluOp::And),
            "OR" => self.parse_alu(AluOp::Or),
            "XOR" => self.parse_alu(AluOp::Xor),
            "CMP" => self.parse_alu(AluOp::Cmp),
            "JMP" => Ok(Stmt::Jmp {
                target: self.parse_expr()?,
            }),
            "BZ" => self.parse_branch(Cond::Z),
            "BNZ" => self.parse_branch(Cond::Nz),
            "BC" => self.parse_branch(Cond::C),
            "BNC" => self.parse_branch(Cond::Nc),
            "CALL" => Ok(Stmt::Call {
                target: self.parse_expr()?,
            }),
            "RET" => Ok(Stmt::Ret),
            "PUSH" => Ok(Stmt::Push {
                reg: self.expect_reg()?,
            }),
            "POP" => Ok(Stmt::Pop {
                reg: self.expect_reg()?,
            }),
            "INC" => Ok(Stmt::Inc {
                reg: self.expect_reg()?,
            }),
            "DEC" => Ok(Stmt::Dec {
                reg: self.expect_reg()?,
            }),
            "NOP" => Ok(Stmt::Nop),
            "HLT" => Ok(Stmt::Hlt),
            _ => Err(error::parse_unknown_mnemonic(tok.span, self.src)),
        }
    }

    fn parse_alu(&mut self, op: AluOp) -> Result<Stmt> {
        let src = self.parse_operand(BareAs::Imm)?;
        Ok(Stmt::Alu { op, src })
    }

    fn parse_branch(&mut self, cond: Cond) -> Result<Stmt> {
        let target = self.parse_expr()?;
        Ok(Stmt::Branch { cond, target })
    }

    fn parse_dir(&mut self, dir: DirKind) -> Result<Stmt> {
        self.bump();
        match dir {
            DirKind::Org => Ok(Stmt::Org {
                addr: self.parse_expr()?,
            }),
            DirKind::Equ => {
                let name_tok = self.expect(TokenKind::Ident, "identifier")?;
                self.expect(TokenKind::Comma, "`,`")?;
                let value = self.parse_expr()?;
                Ok(Stmt::Equ {
                    name: self.get_span(name_tok.span).to_string(),
                    name_span: name_tok.span,
                    value,
                })
            }
            DirKind::Db => {
                let mut items = vec![self.parse_db_item()?];
                while self.peek().kind == TokenKind::Comma {
                    self.bump();
                    items.push(self.parse_db_item()?);
                }
                Ok(Stmt::Db { items })
            }
            DirKind::Ds => {
                let tok = self.expect(TokenKind::Str, "string literal")?;
                Ok(Stmt::Ds {
                    bytes: self.decode_string(tok)?,
                })
            }
        }
    }

    fn parse_db_item(&mut self) -> Result<DbItem> {
        if self.peek().kind == TokenKind::Str {
            let tok = self.bump();
            Ok(DbItem::Str(self.decode_string(tok)?))
        } else {
            Ok(DbItem::Byte(self.parse_expr()?))
        }
    }

    /// Single expression: optionally negated literal, or a symbol reference.
    fn parse_expr(&mut self) -> Result<Expr> {
        let neg = if self.peek().kind == TokenKind::Minus {
            Some(self.bump().span)
        } else {
            None
        };
        let tok = self.bump();
        match tok.kind {
            TokenKind::Lit(val) => {
                let span = neg.map_or(tok.span, |s| s.join(tok.span));
                Ok(Expr::lit(if neg.is_some() { -val } else { val }, span))
            }
            TokenKind::Ident if neg.is_none() => Ok(Expr {
                kind: ExprKind::Sym(self.get_span(tok.span).to_string()),
                span: tok.span,
            }),
            TokenKind::Eof => Err(error::parse_eof(self.src)),
            _ => Err(error::parse_unexpected(
                self.src,
                "a numeric literal or symbol",
                &tok,
            )),
        }
    }

    /// Operand of a mode-bearing instruction, classified by its lead token.
    fn parse_operand(&mut self, bare: BareAs) -> Result<Operand> {
        match self.peek().kind {
            TokenKind::Hash => {
                self.bump();
                Ok(Operand::Imm(self.parse_expr()?))
            }
            TokenKind::Reg(reg) => {
                self.bump();
                Ok(Operand::Reg(reg))
            }
            TokenKind::LBracket => {
                self.bump();
                if let TokenKind::Reg(base) = self.peek().kind {
                    let reg_tok = self.bump();
                    if base == Register::A {
                        return Err(error::parse_bad_index_reg(reg_tok.span, self.src));
                    }
                    let offset = match self.peek().kind {
                        TokenKind::RBracket => Expr::lit(0, reg_tok.span),
                        TokenKind::Plus => {
                            self.bump();
                            self.parse_expr()?
                        }
                        // parse_expr folds the sign into the literal
                        TokenKind::Minus => self.parse_expr()?,
                        _ => {
                            let found = self.peek();
                            return Err(error::parse_unexpected(
                                self.src,
                                "`+`, `-`, or `]`",
                                &found,
                            ));
                        }
                    };
                    self.expect(TokenKind::RBracket, "`]`")?;
                    Ok(Operand::Indexed { base, offset })
                } else {
                    let addr = self.parse_expr()?;
                    self.expect(TokenKind::RBracket, "`]`")?;
                    Ok(Operand::Direct(addr))
                }
            }
            _ => {
                let expr = self.parse_expr()?;
                Ok(match bare {
                    BareAs::Imm => Operand::Imm(expr),
                    BareAs::Direct => Operand::Direct(expr),
                })
            }
        }
    }

    fn decode_string(&self, tok: Token) -> Result<Vec<u8>> {
        let raw = self.get_span(tok.span);
        let inner = &raw[1..raw.len() - 1];
        let mut bytes = Vec::new();
        let mut chars = inner.chars();
        while let Some(c) = chars.next() {
            if c == '\\' {
                match chars.next() {
                    Some('n') => bytes.push(0x0A),
                    Some('t') => bytes.push(0x09),
                    Some('r') => bytes.push(0x0D),
                    Some('0') => bytes.push(0x00),
                    Some('\\') => bytes.push(0x5C),
                    Some(other) => {
                        return Err(error::parse_bad_escape(tok.span, self.src, other))
                    }
                    // The lexer always consumes escapes in pairs.
                    None => return Err(error::parse_bad_escape(tok.span, self.src, '\\')),
                }
            } else if !c.is_ascii() {
                return Err(error::parse_non_ascii(tok.span, self.src, c));
            } else {
                bytes.push(c as u8);
            }
        }
        Ok(bytes)
    }

    fn expect(&mut self, expected: TokenKind, what: &str) -> Result<Token> {
        let tok = self.peek();
        if tok.kind == expected {
            Ok(self.bump())
        } else if tok.kind == TokenKind::Eof {
            Err(error::parse_eof(self.src))
        } else {
            Err(error::parse_unexpected(self.src, what, &tok))
        }
    }

    fn expect_reg(&mut self) -> Result<Register> {
        match self.peek().kind {
            TokenKind::Reg(reg) => {
                self.bump();
                Ok(reg)
            }
            TokenKind::Eof => Err(error::parse_eof(self.src)),
            _ => {
                let found = self.peek();
                Err(error::parse_unexpected(self.src, "register", &found))
            }
        }
    }
}
