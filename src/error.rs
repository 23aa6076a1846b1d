use std::num::ParseIntError;

use miette::{miette, LabeledSpan, Report, Severity};

use crate::lexer::Token;
use crate::symbol::Span;

// Lexer errors

pub fn lex_unknown(span: Span, src: &'static str) -> Report {
    miette!(
        severity = Severity::Error,
        code = "lex::unknown",
        help = "operands start with #, [, a register, a number, or a symbol.",
        labels = vec![LabeledSpan::at(span, "unknown token")],
        "Encountered an unknown token",
    )
    .with_source_code(src)
}

pub fn lex_invalid_dir(span: Span, src: &'static str) -> Report {
    miette!(
        severity = Severity::Error,
        code = "lex::dir",
        help = "available directives are .ORG, .EQU, .DB and .DS.",
        labels = vec![LabeledSpan::at(span, "incorrect directive")],
        "Encountered an invalid directive.",
    )
    .with_source_code(src)
}

pub fn lex_invalid_lit(span: Span, src: &'static str, e: ParseIntError) -> Report {
    miette!(
        severity = Severity::Error,
        code = "lex::literal",
        help = "literals are decimal, 0x... hex, or 0b... binary.",
        labels = vec![LabeledSpan::at(span, "incorrect literal")],
        "Encountered an invalid literal: {e}",
    )
    .with_source_code(src)
}

pub fn lex_unclosed_str(span: Span, src: &'static str) -> Report {
    miette!(
        severity = Severity::Error,
        code = "lex::str_lit",
        help = "string literals must close on the same line.",
        labels = vec![LabeledSpan::at(span, "incorrect literal")],
        "Encountered an unterminated string literal.",
    )
    .with_source_code(src)
}

// Parser errors

pub fn parse_unexpected(src: &'static str, expected: &str, found: &Token) -> Report {
    miette!(
        severity = Severity::Error,
        code = "parse::unexpected_token",
        help = "check the operands for this instruction.",
        labels = vec![LabeledSpan::at(found.span, "unexpected token")],
        "Expected {expected}, found {}",
        found.kind
    )
    .with_source_code(src)
}

pub fn parse_eof(src: &'static str) -> Report {
    miette!(
        severity = Severity::Error,
        code = "parse::unexpected_eof",
        help = "you may be missing operands in your last statement.",
        labels = vec![LabeledSpan::at_offset(src.len().saturating_sub(1), "unexpected end")],
        "Unexpected end of file",
    )
    .with_source_code(src)
}

pub fn parse_unknown_mnemonic(span: Span, src: &'static str) -> Report {
    miette!(
        severity = Severity::Error,
        code = "parse::mnemonic",
        help = "check the instruction list in the documentation.",
        labels = vec![LabeledSpan::at(span, "not a known instruction")],
        "Unknown instruction mnemonic",
    )
    .with_source_code(src)
}

pub fn parse_bad_escape(span: Span, src: &'static str, ch: char) -> Report {
    miette!(
        severity = Severity::Error,
        code = "parse::escape",
        help = r"supported escapes are \n \t \r \0 and \\.",
        labels = vec![LabeledSpan::at(span, "in this string")],
        "Unknown escape sequence '\\{ch}'",
    )
    .with_source_code(src)
}

pub fn parse_non_ascii(span: Span, src: &'static str, ch: char) -> Report {
    miette!(
        severity = Severity::Error,
        code = "parse::ascii",
        help = "string data is limited to the ASCII range.",
        labels = vec![LabeledSpan::at(span, "in this string")],
        "Non-ASCII character '{ch}' (0x{:02X})",
        ch as u32
    )
    .with_source_code(src)
}

pub fn parse_bad_index_reg(span: Span, src: &'static str) -> Report {
    miette!(
        severity = Severity::Error,
        code = "parse::index_reg",
        help = "indexed addressing is [R0+off] or [R1+off]; A cannot index.",
        labels = vec![LabeledSpan::at(span, "invalid index register")],
        "Only R0 and R1 can be used as index registers",
    )
    .with_source_code(src)
}

// Assembler errors

pub fn asm_value_range(span: Span, src: &'static str, val: i64, lo: i64, hi: i64) -> Report {
    miette!(
        severity = Severity::Error,
        code = "asm::range",
        help = format!("values from {lo} to {hi} are allowed here."),
        labels = vec![LabeledSpan::at(span, "out-of-range value")],
        "Value {val} does not fit in 8 bits",
    )
    .with_source_code(src)
}

pub fn asm_duplicate_symbol(span: Span, src: &'static str, name: &str) -> Report {
    miette!(
        severity = Severity::Error,
        code = "asm::duplicate_symbol",
        help = "labels and .EQU names share one namespace and may only be defined once.",
        labels = vec![LabeledSpan::at(span, "redefinition")],
        "Duplicate symbol '{name}'",
    )
    .with_source_code(src)
}

pub fn asm_undefined_symbol(span: Span, src: &'static str, name: &str) -> Report {
    miette!(
        severity = Severity::Error,
        code = "asm::undefined_symbol",
        help = "define it as a label or with .EQU before use.",
        labels = vec![LabeledSpan::at(span, "not defined anywhere")],
        "Undefined symbol '{name}'",
    )
    .with_source_code(src)
}

pub fn asm_illegal_mode(span: Span, src: &'static str, msg: String) -> Report {
    miette!(
        severity = Severity::Error,
        code = "asm::mode",
        help = "check the addressing modes listed for this instruction.",
        labels = vec![LabeledSpan::at(span, "illegal combination")],
        "{msg}",
    )
    .with_source_code(src)
}

pub fn asm_branch_range(span: Span, src: &'static str, disp: i32) -> Report {
    miette!(
        severity = Severity::Error,
        code = "asm::branch_range",
        help = "branch targets must be within -128..+127 of the next instruction; use JMP for longer hops.",
        labels = vec![LabeledSpan::at(span, "target too far")],
        "Branch displacement {disp} out of range (-128..+127)",
    )
    .with_source_code(src)
}

pub fn asm_addr_overflow(span: Span, src: &'static str, addr: u32) -> Report {
    miette!(
        severity = Severity::Error,
        code = "asm::overflow",
        help = "the address space ends at 0xFF.",
        labels = vec![LabeledSpan::at(span, "emitted past end of memory")],
        "Address 0x{addr:02X} exceeds memory",
    )
    .with_source_code(src)
}
