use std::ops::Range;
use std::str::FromStr;

use fxhash::FxHashMap;
use miette::SourceSpan;

/// Represents the CPU registers.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug)]
pub enum Register {
    /// Implicit accumulator for all ALU operations.
    A,
    R0,
    R1,
}

impl FromStr for Register {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("A") {
            Ok(Register::A)
        } else if s.eq_ignore_ascii_case("R0") {
            Ok(Register::R0)
        } else if s.eq_ignore_ascii_case("R1") {
            Ok(Register::R1)
        } else {
            Err(())
        }
    }
}

impl std::fmt::Display for Register {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Register::A => "A",
            Register::R0 => "R0",
            Register::R1 => "R1",
        })
    }
}

/// Symbol table shared by both assembler passes. Labels and `.EQU`
/// definitions live in one namespace; identifiers are case-sensitive.
#[derive(Default, Debug)]
pub struct SymbolTable {
    table: FxHashMap<String, u8>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Define a symbol. Returns false if the name was already taken.
    pub fn define(&mut self, name: &str, val: u8) -> bool {
        self.table.insert(name.to_string(), val).is_none()
    }

    pub fn get(&self, name: &str) -> Option<u8> {
        self.table.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}

/// Location within the source str
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Span {
    offs: SrcOffset,
    len: usize,
}

impl Span {
    pub fn new(offs: SrcOffset, len: usize) -> Self {
        Span { offs, len }
    }

    /// Non-source span
    pub fn dummy() -> Self {
        Span {
            offs: SrcOffset(0),
            len: 0,
        }
    }

    /// Smallest span covering both `self` and `other`.
    pub fn join(&self, other: Span) -> Span {
        let start = self.offs().min(other.offs());
        let end = self.end().max(other.end());
        Span {
            offs: SrcOffset(start),
            len: end - start,
        }
    }

    /// Returns a range that can be used to index the source
    pub fn as_range(&self) -> Range<usize> {
        self.offs()..self.end()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn offs(&self) -> usize {
        self.offs.0
    }

    pub fn end(&self) -> usize {
        self.offs.0 + self.len
    }
}

// Used for miette conversion
impl From<Span> for SourceSpan {
    fn from(value: Span) -> Self {
        SourceSpan::new(value.offs().into(), value.len())
    }
}

impl From<Range<usize>> for Span {
    fn from(value: Range<usize>) -> Self {
        Span {
            offs: SrcOffset(value.start),
            len: value.end - value.start,
        }
    }
}

impl From<Span> for Range<usize> {
    fn from(value: Span) -> Self {
        value.as_range()
    }
}

/// Used to refer to offsets from the start of a source file.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug)]
pub struct SrcOffset(pub usize);

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn register_from_str() {
        assert_eq!("a".parse(), Ok(Register::A));
        assert_eq!("r0".parse(), Ok(Register::R0));
        assert_eq!("R1".parse(), Ok(Register::R1));
        assert_eq!("r2".parse::<Register>(), Err(()));
    }

    #[test]
    fn symbols_reject_duplicates() {
        let mut syms = SymbolTable::new();
        assert!(syms.define("start", 0x10));
        assert!(!syms.define("start", 0x20));
        assert_eq!(syms.get("start"), Some(0x10));
        assert_eq!(syms.get("missing"), None);
    }

    #[test]
    fn span_join() {
        let a = Span::new(SrcOffset(4), 2);
        let b = Span::new(SrcOffset(10), 5);
        assert_eq!(a.join(b).as_range(), 4..15);
    }
}
