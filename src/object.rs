//! Object file formats: raw binary, Intel HEX, and Motorola S-record.
//! Writers and loaders round-trip the exact address → byte mapping
//! (raw binary excepted, since it must pad holes with zeroes).

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

/// Data bytes per HEX/S-record data record.
const RECORD_LEN: usize = 16;

/// Payload of the S0 header record.
const SREC_HEADER: &[u8] = b"EDU-CPU";

/// Sparse address → byte map. Iteration is in ascending address order, so
/// object emission is deterministic even when `.ORG` reorders writes.
#[derive(Clone, Default, PartialEq, Eq, Debug)]
pub struct Image {
    bytes: BTreeMap<u8, u8>,
}

impl Image {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, addr: u8, val: u8) {
        self.bytes.insert(addr, val);
    }

    pub fn get(&self, addr: u8) -> Option<u8> {
        self.bytes.get(&addr).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (u8, u8)> + '_ {
        self.bytes.iter().map(|(a, v)| (*a, *v))
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Format {
    Bin,
    Hex,
    Srec,
}

impl Format {
    /// File extension wins; otherwise the first non-whitespace byte decides
    /// (`:` for Intel HEX, `S` for S-records, anything else is raw binary).
    pub fn detect(path: &Path, data: &[u8]) -> Format {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("hex") => return Format::Hex,
            Some(ext) if ext.eq_ignore_ascii_case("srec") => return Format::Srec,
            Some(ext) if ext.eq_ignore_ascii_case("bin") => return Format::Bin,
            _ => {}
        }
        match data.iter().find(|b| !b.is_ascii_whitespace()) {
            Some(b':') => Format::Hex,
            Some(b'S') => Format::Srec,
            _ => Format::Bin,
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Format::Bin => "binary",
            Format::Hex => "Intel HEX",
            Format::Srec => "SREC",
        })
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum ObjectError {
    Syntax {
        format: Format,
        line: usize,
        reason: &'static str,
    },
    Checksum {
        format: Format,
        line: usize,
        expected: u8,
        found: u8,
    },
}

impl std::error::Error for ObjectError {}

impl fmt::Display for ObjectError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Syntax {
                format,
                line,
                reason,
            } => {
                write!(f, "{format} line {line}: {reason}")
            }
            Self::Checksum {
                format,
                line,
                expected,
                found,
            } => {
                write!(
                    f,
                    "{format} line {line}: checksum mismatch (expected {expected:02X}, got {found:02X})"
                )
            }
        }
    }
}

/// Load a file in whatever format it turns out to be.
pub fn load(path: &Path, data: &[u8]) -> Result<Image, ObjectError> {
    match Format::detect(path, data) {
        Format::Bin => Ok(load_bin(data)),
        Format::Hex => load_hex(as_text(data, Format::Hex)?),
        Format::Srec => load_srec(as_text(data, Format::Srec)?),
    }
}

fn as_text(data: &[u8], format: Format) -> Result<&str, ObjectError> {
    std::str::from_utf8(data).map_err(|_| ObjectError::Syntax {
        format,
        line: 1,
        reason: "file is not ASCII text",
    })
}

// --- Writers ---

/// Raw binary: bytes 0..=highest written address, holes padded with 0x00.
pub fn write_bin(image: &Image) -> Vec<u8> {
    let Some((max, _)) = image.iter().last() else {
        return Vec::new();
    };
    let mut buf = vec![0u8; max as usize + 1];
    for (addr, val) in image.iter() {
        buf[addr as usize] = val;
    }
    buf
}

/// Split the image into contiguous runs of at most [`RECORD_LEN`] bytes.
fn contiguous_runs(image: &Image) -> Vec<(u8, Vec<u8>)> {
    let mut runs: Vec<(u8, Vec<u8>)> = Vec::new();
    for (addr, val) in image.iter() {
        match runs.last_mut() {
            Some((base, data))
                if *base as usize + data.len() == addr as usize && data.len() < RECORD_LEN =>
            {
                data.push(val)
            }
            _ => runs.push((addr, vec![val])),
        }
    }
    runs
}

/// Intel HEX: type-00 data records, a type-01 EOF record, two's-complement
/// checksums.
pub fn write_hex(image: &Image) -> String {
    let mut out = String::new();
    for (base, data) in contiguous_runs(image) {
        let mut record = vec![data.len() as u8, 0x00, base, 0x00];
        record.extend_from_slice(&data);
        let sum = record.iter().fold(0u8, |acc, b| acc.wrapping_add(*b));
        out.push(':');
        for b in &record {
            out.push_str(&format!("{b:02X}"));
        }
        out.push_str(&format!("{:02X}\n", sum.wrapping_neg()));
    }
    out.push_str(":00000001FF\n");
    out
}

/// Motorola S-record: S0 header, S1 data (16-bit addresses), S9 terminator,
/// one's-complement checksums.
pub fn write_srec(image: &Image) -> String {
    let mut out = String::new();
    push_srec_record(&mut out, '0', 0x0000, SREC_HEADER);
    for (base, data) in contiguous_runs(image) {
        push_srec_record(&mut out, '1', u16::from(base), &data);
    }
    push_srec_record(&mut out, '9', 0x0000, &[]);
    out
}

fn push_srec_record(out: &mut String, kind: char, addr: u16, data: &[u8]) {
    let mut rec = vec![data.len() as u8 + 3, (addr >> 8) as u8, addr as u8];
    rec.extend_from_slice(data);
    let sum = rec.iter().fold(0u8, |acc, b| acc.wrapping_add(*b));
    out.push('S');
    out.push(kind);
    for b in &rec {
        out.push_str(&format!("{b:02X}"));
    }
    out.push_str(&format!("{:02X}\n", !sum));
}

// --- Loaders ---

/// Raw binary: byte at offset i lands at address i. Only meaningful as a
/// standalone image, which the CLI enforces.
pub fn load_bin(data: &[u8]) -> Image {
    let mut image = Image::new();
    for (i, b) in data.iter().take(256).enumerate() {
        image.set(i as u8, *b);
    }
    image
}

pub fn load_hex(text: &str) -> Result<Image, ObjectError> {
    const F: Format = Format::Hex;
    let mut image = Image::new();
    for (idx, line) in text.lines().enumerate() {
        let line_no = idx + 1;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let Some(body) = line.strip_prefix(':') else {
            return Err(ObjectError::Syntax {
                format: F,
                line: line_no,
                reason: "missing start code ':'",
            });
        };
        let raw = parse_hex_bytes(body, F, line_no)?;
        if raw.len() < 5 {
            return Err(ObjectError::Syntax {
                format: F,
                line: line_no,
                reason: "record too short",
            });
        }
        let byte_count = raw[0] as usize;
        let addr = u16::from(raw[1]) << 8 | u16::from(raw[2]);
        let rec_type = raw[3];
        let data = &raw[4..raw.len() - 1];
        let found = raw[raw.len() - 1];
        let sum = raw[..raw.len() - 1]
            .iter()
            .fold(0u8, |acc, b| acc.wrapping_add(*b));
        let expected = sum.wrapping_neg();
        if expected != found {
            return Err(ObjectError::Checksum {
                format: F,
                line: line_no,
                expected,
                found,
            });
        }
        if data.len() != byte_count {
            return Err(ObjectError::Syntax {
                format: F,
                line: line_no,
                reason: "byte count mismatch",
            });
        }
        match rec_type {
            0x01 => break,
            0x00 => {
                for (i, b) in data.iter().enumerate() {
                    let a = addr as usize + i;
                    if a < 256 {
                        image.set(a as u8, *b);
                    }
                }
            }
            _ => {}
        }
    }
    Ok(image)
}

pub fn load_srec(text: &str) -> Result<Image, ObjectError> {
    const F: Format = Format::Srec;
    let mut image = Image::new();
    for (idx, line) in text.lines().enumerate() {
        let line_no = idx + 1;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let Some(body) = line.strip_prefix('S') else {
            return Err(ObjectError::Syntax {
                format: F,
                line: line_no,
                reason: "missing 'S' prefix",
            });
        };
        if body.is_empty() {
            return Err(ObjectError::Syntax {
                format: F,
                line: line_no,
                reason: "record too short",
            });
        }
        let rec_type = body.as_bytes()[0];
        let raw = parse_hex_bytes(&body[1..], F, line_no)?;
        if raw.is_empty() {
            return Err(ObjectError::Syntax {
                format: F,
                line: line_no,
                reason: "record too short",
            });
        }
        let byte_count = raw[0] as usize;
        if raw.len() != byte_count + 1 {
            return Err(ObjectError::Syntax {
                format: F,
                line: line_no,
                reason: "byte count mismatch",
            });
        }
        let found = raw[raw.len() - 1];
        let sum = raw[..raw.len() - 1]
            .iter()
            .fold(0u8, |acc, b| acc.wrapping_add(*b));
        let expected = !sum;
        if expected != found {
            return Err(ObjectError::Checksum {
                format: F,
                line: line_no,
                expected,
                found,
            });
        }
        match rec_type {
            b'1' => {
                if raw.len() < 4 {
                    return Err(ObjectError::Syntax {
                        format: F,
                        line: line_no,
                        reason: "record too short",
                    });
                }
                let addr = u16::from(raw[1]) << 8 | u16::from(raw[2]);
                for (i, b) in raw[3..raw.len() - 1].iter().enumerate() {
                    let a = addr as usize + i;
                    if a < 256 {
                        image.set(a as u8, *b);
                    }
                }
            }
            b'9' => break,
            // S0 header and any record type we do not model.
            _ => {}
        }
    }
    Ok(image)
}

fn parse_hex_bytes(s: &str, format: Format, line: usize) -> Result<Vec<u8>, ObjectError> {
    if s.len() % 2 != 0 {
        return Err(ObjectError::Syntax {
            format,
            line,
            reason: "odd number of hex digits",
        });
    }
    (0..s.len())
        .step_by(2)
        .map(|i| {
            s.get(i..i + 2)
                .and_then(|pair| u8::from_str_radix(pair, 16).ok())
                .ok_or(ObjectError::Syntax {
                    format,
                    line,
                    reason: "invalid hex data",
                })
        })
        .collect()
}

// --- Multi-file composition ---

/// Report address conflicts between files, grouped by the owning file set.
/// Returns formatted `Overlap between ...` messages, empty when clean.
pub fn check_overlaps(files: &[(String, Image)]) -> Vec<String> {
    let mut owners: BTreeMap<u8, Vec<&str>> = BTreeMap::new();
    for (name, image) in files {
        for (addr, _) in image.iter() {
            owners.entry(addr).or_default().push(name.as_str());
        }
    }

    let mut groups: BTreeMap<Vec<&str>, Vec<u8>> = BTreeMap::new();
    for (addr, names) in &owners {
        if names.len() > 1 {
            let mut key = names.clone();
            key.sort_unstable();
            groups.entry(key).or_default().push(*addr);
        }
    }

    let mut errors = Vec::new();
    for (names, addrs) in groups {
        let list = names.join(" and ");
        let addr_str = if addrs.len() <= 8 {
            addrs
                .iter()
                .map(|a| format!("0x{a:02X}"))
                .collect::<Vec<_>>()
                .join(", ")
        } else {
            let shown = addrs[..8]
                .iter()
                .map(|a| format!("0x{a:02X}"))
                .collect::<Vec<_>>()
                .join(", ");
            format!("{shown}, ... ({} addresses total)", addrs.len())
        };
        errors.push(format!("Overlap between {list} at {addr_str}"));
    }
    errors
}
