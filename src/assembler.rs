//! Two-pass assembler driver. Pass 1 sizes every statement and fills the
//! symbol table; pass 2 encodes against the resolved symbols and produces
//! the memory image plus the listing.

use miette::Result;

use crate::ast::{DbItem, Expr, ExprKind, Operand, Program, Stmt};
use crate::error;
use crate::isa::{self, mm, AluOp};
use crate::object::Image;
use crate::parser::AsmParser;
use crate::symbol::{Register, Span, SymbolTable};

/// Everything one assembly run produces.
pub struct AsmOutput {
    pub image: Image,
    pub listing: Listing,
    pub symbols: SymbolTable,
}

/// Assemble a source file into an image and listing.
pub fn assemble(src: &'static str) -> Result<AsmOutput> {
    let program = AsmParser::new(src)?.parse()?;
    Assembler::new(src).run(&program)
}

struct Assembler {
    src: &'static str,
    symbols: SymbolTable,
}

impl Assembler {
    fn new(src: &'static str) -> Self {
        Assembler {
            src,
            symbols: SymbolTable::new(),
        }
    }

    fn run(mut self, program: &Program) -> Result<AsmOutput> {
        self.pass1(program)?;
        let (image, listing) = self.pass2(program)?;
        Ok(AsmOutput {
            image,
            listing,
            symbols: self.symbols,
        })
    }

    /// Walk the program computing sizes and recording symbols. Labels bind
    /// to the location counter before their statement emits anything.
    fn pass1(&mut self, program: &Program) -> Result<()> {
        let mut lc: u32 = 0;
        for line in &program.lines {
            if let Some(label) = &line.label {
                if lc > 0xFF {
                    return Err(error::asm_addr_overflow(label.span, self.src, lc));
                }
                if !self.symbols.define(&label.name, lc as u8) {
                    return Err(error::asm_duplicate_symbol(label.span, self.src, &label.name));
                }
            }
            match &line.stmt {
                None => {}
                Some(Stmt::Org { addr }) => lc = u32::from(self.eval_addr(addr)?),
                Some(Stmt::Equ {
                    name,
                    name_span,
                    value,
                }) => {
                    let val = self.eval_byte(value)?;
                    if !self.symbols.define(name, val) {
                        return Err(error::asm_duplicate_symbol(*name_span, self.src, name));
                    }
                }
                Some(stmt) => lc += size_of(stmt),
            }
        }
        Ok(())
    }

    /// Walk the program again, encoding every statement into the image.
    fn pass2(&mut self, program: &Program) -> Result<(Image, Listing)> {
        let mut lc: u32 = 0;
        let mut image = Image::new();
        let mut listing = Listing::new(self.src);

        for line in &program.lines {
            match &line.stmt {
                None => listing.record(line.line_no, None, Vec::new()),
                Some(Stmt::Org { addr }) => {
                    lc = u32::from(self.eval_addr(addr)?);
                    listing.record(line.line_no, Some(lc as u8), Vec::new());
                }
                Some(Stmt::Equ { .. }) => listing.record(line.line_no, None, Vec::new()),
                Some(stmt) => {
                    let bytes = self.encode(stmt, lc, line.span)?;
                    for (i, b) in bytes.iter().enumerate() {
                        let addr = lc + i as u32;
                        if addr > 0xFF {
                            return Err(error::asm_addr_overflow(line.span, self.src, addr));
                        }
                        image.set(addr as u8, *b);
                    }
                    listing.record(line.line_no, Some(lc as u8), bytes.clone());
                    lc += bytes.len() as u32;
                }
            }
        }
        Ok((image, listing))
    }

    /// Return binary representation of a statement
    fn encode(&self, stmt: &Stmt, lc: u32, span: Span) -> Result<Vec<u8>> {
        match stmt {
            Stmt::Db { items } => {
                let mut out = Vec::new();
                for item in items {
                    match item {
                        DbItem::Byte(e) => out.push(self.eval_byte(e)?),
                        DbItem::Str(s) => out.extend_from_slice(s),
                    }
                }
                Ok(out)
            }
            Stmt::Ds { bytes } => {
                let mut out = bytes.clone();
                out.push(0x00);
                Ok(out)
            }
            Stmt::Ld { dest, src } => self.encode_ld_st(false, *dest, src, span),
            Stmt::St { src, dst } => self.encode_ld_st(true, *src, dst, span),
            Stmt::Alu { op, src } => self.encode_alu(*op, src, span),
            Stmt::Jmp { target } => Ok(vec![isa::JMP, self.eval_addr(target)?]),
            Stmt::Call { target } => Ok(vec![isa::CALL, self.eval_addr(target)?]),
            Stmt::Branch { cond, target } => {
                // Displacement is measured from the PC after the branch.
                let target = i32::from(self.eval_addr(target)?);
                let disp = target - (lc as i32 + 2);
                if !(-128..=127).contains(&disp) {
                    return Err(error::asm_branch_range(span, self.src, disp));
                }
                Ok(vec![cond.opcode(), (disp & 0xFF) as u8])
            }
            Stmt::Ret => Ok(vec![isa::RET]),
            Stmt::Push { reg } => Ok(vec![isa::PUSH_BASE | isa::reg_code(*reg)]),
            Stmt::Pop { reg } => Ok(vec![isa::POP_BASE | isa::reg_code(*reg)]),
            Stmt::Inc { reg } => Ok(vec![isa::INC_BASE | isa::reg_code(*reg)]),
            Stmt::Dec { reg } => Ok(vec![isa::DEC_BASE | isa::reg_code(*reg)]),
            Stmt::Nop => Ok(vec![isa::NOP]),
            Stmt::Hlt => Ok(vec![isa::HLT]),
            Stmt::Org { .. } | Stmt::Equ { .. } => unreachable!("directives emit no code"),
        }
    }

    fn encode_ld_st(
        &self,
        is_store: bool,
        primary: Register,
        operand: &Operand,
        span: Span,
    ) -> Result<Vec<u8>> {
        let iiiii = if is_store {
            isa::st_code(primary)
        } else {
            isa::ld_code(primary)
        };
        match operand {
            Operand::Imm(e) => {
                if is_store {
                    return Err(error::asm_illegal_mode(
                        span,
                        self.src,
                        "ST does not support immediate addressing".to_string(),
                    ));
                }
                Ok(vec![iiiii << 3 | mm::IMM, self.eval_byte(e)?])
            }
            Operand::Reg(other) => {
                let Some(r_bit) = isa::reg_mode_bit(primary, *other) else {
                    let kind = if is_store { "ST" } else { "LD" };
                    return Err(error::asm_illegal_mode(
                        span,
                        self.src,
                        format!("Cannot use {other} with {kind} {primary} in register mode"),
                    ));
                };
                Ok(vec![iiiii << 3 | r_bit << 2 | mm::REG])
            }
            Operand::Direct(e) => Ok(vec![iiiii << 3 | mm::DIRECT, self.eval_byte(e)?]),
            Operand::Indexed { base, offset } => {
                let r_bit = u8::from(*base == Register::R1);
                Ok(vec![
                    iiiii << 3 | r_bit << 2 | mm::INDEXED,
                    self.eval_offset(offset)?,
                ])
            }
        }
    }

    fn encode_alu(&self, op: AluOp, operand: &Operand, span: Span) -> Result<Vec<u8>> {
        let iiiii = op.code();
        match operand {
            Operand::Imm(e) => Ok(vec![iiiii << 3 | mm::IMM, self.eval_byte(e)?]),
            Operand::Reg(reg) => {
                // A is the implicit accumulator; it cannot also be the source.
                let r_bit = match reg {
                    Register::R0 => 0,
                    Register::R1 => 1,
                    Register::A => {
                        return Err(error::asm_illegal_mode(
                            span,
                            self.src,
                            format!("{op} only accepts R0 or R1 in register mode, not A"),
                        ))
                    }
                };
                Ok(vec![iiiii << 3 | r_bit << 2 | mm::REG])
            }
            Operand::Direct(e) => Ok(vec![iiiii << 3 | mm::DIRECT, self.eval_byte(e)?]),
            Operand::Indexed { base, offset } => {
                let r_bit = u8::from(*base == Register::R1);
                Ok(vec![
                    iiiii << 3 | r_bit << 2 | mm::INDEXED,
                    self.eval_offset(offset)?,
                ])
            }
        }
    }

    fn resolve(&self, expr: &Expr) -> Result<i64> {
        match &expr.kind {
            ExprKind::Lit(v) => Ok(*v),
            ExprKind::Sym(name) => self
                .symbols
                .get(name)
                .map(i64::from)
                .ok_or_else(|| error::asm_undefined_symbol(expr.span, self.src, name)),
        }
    }

    /// Byte value; negative literals are accepted down to -128 and encoded
    /// two's complement.
    fn eval_byte(&self, expr: &Expr) -> Result<u8> {
        let v = self.resolve(expr)?;
        if !(-128..=255).contains(&v) {
            return Err(error::asm_value_range(expr.span, self.src, v, -128, 255));
        }
        Ok((v & 0xFF) as u8)
    }

    fn eval_addr(&self, expr: &Expr) -> Result<u8> {
        let v = self.resolve(expr)?;
        if !(0..=255).contains(&v) {
            return Err(error::asm_value_range(expr.span, self.src, v, 0, 255));
        }
        Ok(v as u8)
    }

    fn eval_offset(&self, expr: &Expr) -> Result<u8> {
        let v = self.resolve(expr)?;
        if !(-128..=127).contains(&v) {
            return Err(error::asm_value_range(expr.span, self.src, v, -128, 127));
        }
        Ok((v & 0xFF) as u8)
    }
}

fn size_of(stmt: &Stmt) -> u32 {
    match stmt {
        Stmt::Org { .. } | Stmt::Equ { .. } => 0,
        Stmt::Db { items } => items
            .iter()
            .map(|item| match item {
                DbItem::Byte(_) => 1,
                DbItem::Str(s) => s.len() as u32,
            })
            .sum(),
        Stmt::Ds { bytes } => bytes.len() as u32 + 1,
        Stmt::Ld { src: op, .. } | Stmt::St { dst: op, .. } | Stmt::Alu { src: op, .. } => {
            if matches!(op, Operand::Reg(_)) {
                1
            } else {
                2
            }
        }
        Stmt::Jmp { .. } | Stmt::Branch { .. } | Stmt::Call { .. } => 2,
        Stmt::Ret
        | Stmt::Push { .. }
        | Stmt::Pop { .. }
        | Stmt::Inc { .. }
        | Stmt::Dec { .. }
        | Stmt::Nop
        | Stmt::Hlt => 1,
    }
}

/// Per-line record of what the assembler emitted, paired back with the
/// source text when rendered. Purely advisory; execution never reads it.
pub struct Listing {
    src: &'static str,
    entries: Vec<(u32, Option<u8>, Vec<u8>)>,
}

impl Listing {
    fn new(src: &'static str) -> Self {
        Listing {
            src,
            entries: Vec::new(),
        }
    }

    fn record(&mut self, line_no: u32, addr: Option<u8>, bytes: Vec<u8>) {
        self.entries.push((line_no, addr, bytes));
    }

    /// Render the `.lst` text: address column, emitted bytes, source line.
    pub fn render(&self) -> String {
        let mut out = String::new();
        let mut entries = self.entries.iter().peekable();
        for (idx, raw) in self.src.lines().enumerate() {
            let line_no = idx as u32 + 1;
            let entry = if entries.peek().is_some_and(|e| e.0 == line_no) {
                entries.next()
            } else {
                None
            };
            match entry {
                Some((_, Some(addr), bytes)) if !bytes.is_empty() => {
                    let hex = bytes
                        .iter()
                        .map(|b| format!("{b:02X}"))
                        .collect::<Vec<_>>()
                        .join(" ");
                    out.push_str(&format!("{addr:04X}  {hex:<12}  {raw}\n"));
                }
                Some((_, Some(addr), _)) => {
                    out.push_str(&format!("{addr:04X}                {raw}\n"));
                }
                _ => {
                    out.push_str(&format!("                    {raw}\n"));
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::object;

    fn bytes(src: &'static str) -> Vec<u8> {
        object::write_bin(&assemble(src).unwrap().image)
    }

    #[test]
    fn assemble_immediate_add() {
        assert_eq!(bytes("LD A,#37\nADD #28\nHLT\n"), vec![0x00, 0x25, 0x30, 0x1C, 0xA8]);
    }

    #[test]
    fn assemble_is_deterministic() {
        let src = "start: LD A,#1\nloop: ADD #1\nBNZ loop\nHLT\n";
        assert_eq!(bytes(src), bytes(src));
    }

    #[test]
    fn encode_every_legal_mode() {
        // One golden byte sequence per legal (mnemonic, addressing mode) pair.
        let cases: &[(&'static str, &[u8])] = &[
            ("LD A,#0x12", &[0x00, 0x12]),
            ("LD R0,#1", &[0x08, 0x01]),
            ("LD R1,#1", &[0x10, 0x01]),
            ("LD A,R0", &[0x01]),
            ("LD A,R1", &[0x05]),
            ("LD R0,A", &[0x09]),
            ("LD R0,R1", &[0x0D]),
            ("LD R1,A", &[0x11]),
            ("LD R1,R0", &[0x15]),
            ("LD A,[0x40]", &[0x02, 0x40]),
            ("LD A,[R0]", &[0x03, 0x00]),
            ("LD A,[R1]", &[0x07, 0x00]),
            ("LD A,[R0+5]", &[0x03, 0x05]),
            ("LD A,[R1-1]", &[0x07, 0xFF]),
            ("ST A,[0x40]", &[0x1A, 0x40]),
            ("ST A,R0", &[0x19]),
            ("ST A,R1", &[0x1D]),
            ("ST R0,[R1]", &[0x27, 0x00]),
            ("ST R1,[0x10]", &[0x2A, 0x10]),
            ("ADD #1", &[0x30, 0x01]),
            ("ADD R0", &[0x31]),
            ("ADD R1", &[0x35]),
            ("ADD [0x40]", &[0x32, 0x40]),
            ("ADD [R0+2]", &[0x33, 0x02]),
            ("SUB #1", &[0x38, 0x01]),
            ("AND R1", &[0x45]),
            ("OR #0x0F", &[0x48, 0x0F]),
            ("XOR [0x20]", &[0x52, 0x20]),
            ("CMP #1", &[0x58, 0x01]),
            ("JMP 0x10", &[0x60, 0x10]),
            ("CALL 0x20", &[0x70, 0x20]),
            ("RET", &[0x78]),
            ("PUSH A", &[0x80]),
            ("PUSH R0", &[0x81]),
            ("PUSH R1", &[0x82]),
            ("POP A", &[0x88]),
            ("POP R0", &[0x89]),
            ("POP R1", &[0x8A]),
            ("INC A", &[0x90]),
            ("INC R0", &[0x91]),
            ("INC R1", &[0x92]),
            ("DEC A", &[0x98]),
            ("DEC R0", &[0x99]),
            ("DEC R1", &[0x9A]),
            ("NOP", &[0xA0]),
            ("HLT", &[0xA8]),
        ];
        for (src, expected) in cases {
            assert_eq!(&bytes(src), expected, "for {src:?}");
        }
    }

    #[test]
    fn encode_rejects_illegal_modes() {
        assert!(assemble("ST A,#5").is_err());
        assert!(assemble("ADD A").is_err());
        assert!(assemble("LD A,A").is_err());
        assert!(assemble("LD R0,R0").is_err());
        assert!(assemble("ST R1,R1").is_err());
    }

    #[test]
    fn branch_forward_and_backward() {
        assert_eq!(bytes("BZ 0x10"), vec![0x68, 0x0E]);
        assert_eq!(bytes("target: NOP\nBNZ target"), vec![0xA0, 0x69, 0xFD]);
    }

    #[test]
    fn branch_displacement_law() {
        // target == (address_of_branch + 2 + signed(d)) mod 256
        let img = assemble("NOP\nNOP\nBZ spot\nNOP\nNOP\nspot: HLT").unwrap().image;
        let d = img.get(3).unwrap() as i8;
        assert_eq!(6i32, 2 + 2 + i32::from(d));
    }

    #[test]
    fn branch_out_of_range() {
        assert!(assemble("BZ far\n.ORG 200\nfar: HLT").is_err());
    }

    #[test]
    fn forward_references_resolve() {
        assert_eq!(
            bytes("JMP end\nNOP\nend: HLT"),
            vec![0x60, 0x03, 0xA0, 0xA8]
        );
    }

    #[test]
    fn equ_symbols_in_operands() {
        assert_eq!(bytes(".EQU ten, 10\nLD A,#ten"), vec![0x00, 0x0A]);
    }

    #[test]
    fn duplicate_symbols_rejected() {
        assert!(assemble("x: NOP\nx: NOP").is_err());
        assert!(assemble("x: NOP\n.EQU x, 5").is_err());
    }

    #[test]
    fn undefined_symbol_rejected() {
        assert!(assemble("JMP nowhere").is_err());
    }

    #[test]
    fn org_moves_location_counter() {
        let out = assemble(".ORG 0x10\ndata: .DB 1, 2, \"AB\"\n.DS \"ok\"").unwrap();
        assert_eq!(out.symbols.get("data"), Some(0x10));
        let pairs: Vec<(u8, u8)> = out.image.iter().collect();
        assert_eq!(
            pairs,
            vec![
                (0x10, 1),
                (0x11, 2),
                (0x12, b'A'),
                (0x13, b'B'),
                (0x14, b'o'),
                (0x15, b'k'),
                (0x16, 0x00),
            ]
        );
    }

    #[test]
    fn label_only_line_binds_next_address() {
        let out = assemble("NOP\nhere:\nHLT").unwrap();
        assert_eq!(out.symbols.get("here"), Some(1));
    }

    #[test]
    fn db_negative_masking() {
        assert_eq!(bytes(".DB -1, -128"), vec![0xFF, 0x80]);
        assert!(assemble(".DB -129").is_err());
        assert!(assemble(".DB 256").is_err());
    }

    #[test]
    fn emission_past_memory_end_rejected() {
        assert!(assemble(".ORG 0xFF\nLD A,#1").is_err());
        // A single byte at 0xFF is still fine.
        assert_eq!(
            assemble(".ORG 0xFF\nNOP").unwrap().image.iter().collect::<Vec<_>>(),
            vec![(0xFF, 0xA0)]
        );
    }

    #[test]
    fn listing_layout() {
        let out = assemble("LD A,#37 ; load\n.EQU x, 1\n.ORG 0x10\nHLT\n").unwrap();
        let lst = out.listing.render();
        let lines: Vec<&str> = lst.lines().collect();
        assert_eq!(lines[0], "0000  00 25         LD A,#37 ; load");
        assert_eq!(lines[1], "                    .EQU x, 1");
        assert_eq!(lines[2], "0010                .ORG 0x10");
        assert_eq!(lines[3], "0010  A8            HLT");
    }
}
