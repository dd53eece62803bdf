// nrbf-remoting - MS-NRBF serialization and a .NET Remoting TCP channel.
// Copyright (C) 2026  nrbf-remoting contributors
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.

//! Wire primitives shared by the record and frame codecs.
//!
//! Everything is little-endian. Strings use the NRBF 7-bit variable-length
//! header; chars are a single Unicode scalar in UTF-8; `DateTime` packs a
//! 2-bit kind into the top bits of a 62-bit tick count.

use crate::error::{Error, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};
use std::sync::OnceLock;

pub fn read_u8<R: Read>(reader: &mut R) -> Result<u8> {
    let mut buf = [0u8; 1];
    reader.read_exact(&mut buf)?;
    Ok(buf[0])
}

pub fn read_i8<R: Read>(reader: &mut R) -> Result<i8> {
    Ok(read_u8(reader)? as i8)
}

pub fn read_u16<R: Read>(reader: &mut R) -> Result<u16> {
    let mut buf = [0u8; 2];
    reader.read_exact(&mut buf)?;
    Ok(u16::from_le_bytes(buf))
}

pub fn read_i16<R: Read>(reader: &mut R) -> Result<i16> {
    let mut buf = [0u8; 2];
    reader.read_exact(&mut buf)?;
    Ok(i16::from_le_bytes(buf))
}

pub fn read_u32<R: Read>(reader: &mut R) -> Result<u32> {
    let mut buf = [0u8; 4];
    reader.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

pub fn read_i32<R: Read>(reader: &mut R) -> Result<i32> {
    let mut buf = [0u8; 4];
    reader.read_exact(&mut buf)?;
    Ok(i32::from_le_bytes(buf))
}

pub fn read_u64<R: Read>(reader: &mut R) -> Result<u64> {
    let mut buf = [0u8; 8];
    reader.read_exact(&mut buf)?;
    Ok(u64::from_le_bytes(buf))
}

pub fn read_i64<R: Read>(reader: &mut R) -> Result<i64> {
    let mut buf = [0u8; 8];
    reader.read_exact(&mut buf)?;
    Ok(i64::from_le_bytes(buf))
}

pub fn read_f32<R: Read>(reader: &mut R) -> Result<f32> {
    let mut buf = [0u8; 4];
    reader.read_exact(&mut buf)?;
    Ok(f32::from_le_bytes(buf))
}

pub fn read_f64<R: Read>(reader: &mut R) -> Result<f64> {
    let mut buf = [0u8; 8];
    reader.read_exact(&mut buf)?;
    Ok(f64::from_le_bytes(buf))
}

pub fn write_u8<W: Write>(writer: &mut W, val: u8) -> Result<()> {
    writer.write_all(&[val])?;
    Ok(())
}

pub fn write_i8<W: Write>(writer: &mut W, val: i8) -> Result<()> {
    write_u8(writer, val as u8)
}

pub fn write_u16<W: Write>(writer: &mut W, val: u16) -> Result<()> {
    writer.write_all(&val.to_le_bytes())?;
    Ok(())
}

pub fn write_i16<W: Write>(writer: &mut W, val: i16) -> Result<()> {
    writer.write_all(&val.to_le_bytes())?;
    Ok(())
}

pub fn write_u32<W: Write>(writer: &mut W, val: u32) -> Result<()> {
    writer.write_all(&val.to_le_bytes())?;
    Ok(())
}

pub fn write_i32<W: Write>(writer: &mut W, val: i32) -> Result<()> {
    writer.write_all(&val.to_le_bytes())?;
    Ok(())
}

pub fn write_u64<W: Write>(writer: &mut W, val: u64) -> Result<()> {
    writer.write_all(&val.to_le_bytes())?;
    Ok(())
}

pub fn write_i64<W: Write>(writer: &mut W, val: i64) -> Result<()> {
    writer.write_all(&val.to_le_bytes())?;
    Ok(())
}

pub fn write_f32<W: Write>(writer: &mut W, val: f32) -> Result<()> {
    writer.write_all(&val.to_le_bytes())?;
    Ok(())
}

pub fn write_f64<W: Write>(writer: &mut W, val: f64) -> Result<()> {
    writer.write_all(&val.to_le_bytes())?;
    Ok(())
}

/// Reads the 7-bit variable-length string header. At most 5 bytes; the
/// decoded length must fit in a non-negative i32.
pub fn read_variable_length<R: Read>(reader: &mut R) -> Result<i32> {
    let mut value: u64 = 0;
    let mut shift = 0u32;
    loop {
        let b = read_u8(reader)?;
        value |= u64::from(b & 0x7F) << shift;
        if (b & 0x80) == 0 {
            break;
        }
        shift += 7;
        if shift >= 35 {
            return Err(Error::Decode("variable-length header exceeds 5 bytes".into()));
        }
    }
    if value > i32::MAX as u64 {
        return Err(Error::InvalidStringLength(value as i32));
    }
    Ok(value as i32)
}

pub fn write_variable_length<W: Write>(writer: &mut W, value: i32) -> Result<()> {
    if value < 0 {
        return Err(Error::InvalidStringLength(value));
    }
    let mut rest = value as u32;
    loop {
        let mut b = (rest & 0x7F) as u8;
        rest >>= 7;
        if rest != 0 {
            b |= 0x80;
        }
        write_u8(writer, b)?;
        if rest == 0 {
            return Ok(());
        }
    }
}

/// Reads an NRBF length-prefixed UTF-8 string.
pub fn read_length_prefixed_string<R: Read>(reader: &mut R) -> Result<String> {
    let length = read_variable_length(reader)?;
    if length == 0 {
        return Ok(String::new());
    }
    let mut buf = vec![0u8; length as usize];
    reader.read_exact(&mut buf)?;
    Ok(String::from_utf8(buf)?)
}

pub fn write_length_prefixed_string<W: Write>(writer: &mut W, s: &str) -> Result<()> {
    let bytes = s.as_bytes();
    if bytes.len() > i32::MAX as usize {
        return Err(Error::InvalidStringLength(i32::MAX));
    }
    write_variable_length(writer, bytes.len() as i32)?;
    writer.write_all(bytes)?;
    Ok(())
}

/// Reads exactly one Unicode scalar encoded as 1-4 UTF-8 bytes.
pub fn read_char<R: Read>(reader: &mut R) -> Result<char> {
    let first = read_u8(reader)?;
    let width = match first {
        0x00..=0x7F => 1,
        0xC0..=0xDF => 2,
        0xE0..=0xEF => 3,
        0xF0..=0xF7 => 4,
        _ => return Err(Error::Decode(format!("invalid UTF-8 char lead byte {first:#04x}"))),
    };
    let mut buf = vec![first];
    for _ in 1..width {
        buf.push(read_u8(reader)?);
    }
    let s = String::from_utf8(buf)?;
    let mut chars = s.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) => Ok(c),
        _ => Err(Error::Decode("char payload is not a single scalar".into())),
    }
}

pub fn write_char<W: Write>(writer: &mut W, c: char) -> Result<()> {
    let mut buf = [0u8; 4];
    writer.write_all(c.encode_utf8(&mut buf).as_bytes())?;
    Ok(())
}

/// A .NET `DateTime`: ticks of 100 ns since 0001-01-01, plus a kind.
///
/// On the wire the kind occupies the top two bits of the 64-bit value;
/// kind 3 is not a legal encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateTime {
    pub ticks: u64,
    pub kind: DateTimeKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DateTimeKind {
    Unspecified = 0,
    Utc = 1,
    Local = 2,
}

impl DateTime {
    pub fn new(ticks: u64, kind: DateTimeKind) -> Self {
        Self { ticks, kind }
    }

    fn pack(self) -> u64 {
        ((self.kind as u64) << 62) | (self.ticks & TICK_MASK)
    }

    fn unpack(raw: u64) -> Result<Self> {
        let kind = match raw >> 62 {
            0 => DateTimeKind::Unspecified,
            1 => DateTimeKind::Utc,
            2 => DateTimeKind::Local,
            k => return Err(Error::Decode(format!("invalid DateTime kind {k}"))),
        };
        Ok(Self { ticks: raw & TICK_MASK, kind })
    }
}

const TICK_MASK: u64 = (1 << 62) - 1;

pub fn read_datetime<R: Read>(reader: &mut R) -> Result<DateTime> {
    DateTime::unpack(read_u64(reader)?)
}

pub fn write_datetime<W: Write>(writer: &mut W, dt: DateTime) -> Result<()> {
    write_u64(writer, dt.pack())
}

fn decimal_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^-?(?:\d+\.\d+|\d+)$").unwrap())
}

/// Checks the decimal wire grammar: optional sign, plain digits with an
/// optional fractional part, no exponent, at most 29 significant digits.
pub fn validate_decimal(s: &str) -> Result<()> {
    if !decimal_pattern().is_match(s) {
        return Err(Error::Decode(format!("malformed decimal {s:?}")));
    }
    let digits: String = s.chars().filter(|c| c.is_ascii_digit()).collect();
    let significant = digits.trim_start_matches('0').len().max(1);
    if significant > 29 {
        return Err(Error::Decode(format!("decimal {s:?} exceeds 29 significant digits")));
    }
    Ok(())
}

/// Reads a decimal, a length-prefixed numeric string on the wire.
pub fn read_decimal<R: Read>(reader: &mut R) -> Result<String> {
    let s = read_length_prefixed_string(reader)?;
    validate_decimal(&s)?;
    Ok(s)
}

pub fn write_decimal<W: Write>(writer: &mut W, s: &str) -> Result<()> {
    validate_decimal(s)?;
    write_length_prefixed_string(writer, s)
}
