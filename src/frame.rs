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

//! The MS-NRTP message frame: fixed preamble, typed header tokens, and
//! the NRBF payload, either length-prefixed or chunked.

use crate::error::{Error, Result};
use crate::primitives::{
    read_i32, read_u16, read_u8, write_i32, write_u16, write_u8,
};
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};

/// ".NET" on the wire, little-endian.
pub const PROTOCOL_ID: i32 = 0x54454E2E;

/// The NRBF content type .NET remoting sends.
pub const BINARY_CONTENT_TYPE: &str = "application/octet-stream";

const MAJOR_VERSION: u8 = 1;
const MINOR_VERSION: u8 = 0;

const TOKEN_END: u8 = 0;
const TOKEN_CUSTOM: u8 = 1;
const TOKEN_STATUS_CODE: u8 = 2;
const TOKEN_STATUS_PHRASE: u8 = 3;
const TOKEN_REQUEST_URI: u8 = 4;
const TOKEN_CLOSE_CONNECTION: u8 = 5;
const TOKEN_CONTENT_TYPE: u8 = 6;

const FORMAT_VOID: u8 = 0;
const FORMAT_COUNTED_STRING: u8 = 1;
const FORMAT_BYTE: u8 = 2;

const STRING_UTF16: u8 = 0;
const STRING_UTF8: u8 = 1;

const CHUNK_TRAILER: [u8; 2] = [0x0D, 0x0A];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operation {
    Request = 0,
    OneWayRequest = 1,
    Reply = 2,
}

impl TryFrom<u16> for Operation {
    type Error = Error;

    fn try_from(value: u16) -> Result<Self> {
        match value {
            0 => Ok(Operation::Request),
            1 => Ok(Operation::OneWayRequest),
            2 => Ok(Operation::Reply),
            other => Err(Error::Frame(format!("unknown operation {other}"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StatusCode {
    Success = 0,
    Error = 1,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FrameHeader {
    Custom { name: String, value: String },
    StatusCode(StatusCode),
    StatusPhrase(String),
    RequestUri(String),
    CloseConnection,
    ContentType(String),
}

/// One NRTP envelope on TCP.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    pub operation: Operation,
    pub headers: Vec<FrameHeader>,
    pub content: Vec<u8>,
}

impl Frame {
    pub fn request(operation: Operation, uri: &str, content: Vec<u8>) -> Self {
        Self {
            operation,
            headers: vec![
                FrameHeader::RequestUri(uri.to_owned()),
                FrameHeader::ContentType(BINARY_CONTENT_TYPE.to_owned()),
            ],
            content,
        }
    }

    pub fn reply(content: Vec<u8>) -> Self {
        Self {
            operation: Operation::Reply,
            headers: vec![FrameHeader::ContentType(BINARY_CONTENT_TYPE.to_owned())],
            content,
        }
    }

    /// An error reply that also asks the peer to drop the connection.
    pub fn error_reply(phrase: &str) -> Self {
        Self {
            operation: Operation::Reply,
            headers: vec![
                FrameHeader::StatusCode(StatusCode::Error),
                FrameHeader::StatusPhrase(phrase.to_owned()),
                FrameHeader::CloseConnection,
            ],
            content: Vec::new(),
        }
    }

    pub fn request_uri(&self) -> Option<&str> {
        self.headers.iter().find_map(|h| match h {
            FrameHeader::RequestUri(uri) => Some(uri.as_str()),
            _ => None,
        })
    }

    pub fn content_type(&self) -> Option<&str> {
        self.headers.iter().find_map(|h| match h {
            FrameHeader::ContentType(ct) => Some(ct.as_str()),
            _ => None,
        })
    }

    pub fn status_code(&self) -> Option<StatusCode> {
        self.headers.iter().find_map(|h| match h {
            FrameHeader::StatusCode(code) => Some(*code),
            _ => None,
        })
    }

    pub fn status_phrase(&self) -> Option<&str> {
        self.headers.iter().find_map(|h| match h {
            FrameHeader::StatusPhrase(phrase) => Some(phrase.as_str()),
            _ => None,
        })
    }

    pub fn close_requested(&self) -> bool {
        self.headers.iter().any(|h| matches!(h, FrameHeader::CloseConnection))
    }

    /// Writes the frame with length-prefixed content.
    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        if self.content.len() > i32::MAX as usize {
            return Err(Error::Frame(format!("content of {} bytes too large", self.content.len())));
        }
        self.write_preamble(writer, 0)?;
        write_i32(writer, self.content.len() as i32)?;
        self.write_headers(writer)?;
        writer.write_all(&self.content)?;
        Ok(())
    }

    /// Writes the frame with chunked content. Secondary path; the client
    /// and server emit length-prefixed frames.
    pub fn write_chunked_to<W: Write>(&self, writer: &mut W, chunk_size: usize) -> Result<()> {
        if chunk_size == 0 {
            return Err(Error::Frame("chunk size must be positive".into()));
        }
        self.write_preamble(writer, 1)?;
        self.write_headers(writer)?;
        for chunk in self.content.chunks(chunk_size) {
            write_i32(writer, chunk.len() as i32)?;
            writer.write_all(chunk)?;
            writer.write_all(&CHUNK_TRAILER)?;
        }
        write_i32(writer, 0)?;
        writer.write_all(&CHUNK_TRAILER)?;
        Ok(())
    }

    fn write_preamble<W: Write>(&self, writer: &mut W, distribution: u16) -> Result<()> {
        write_i32(writer, PROTOCOL_ID)?;
        write_u8(writer, MAJOR_VERSION)?;
        write_u8(writer, MINOR_VERSION)?;
        write_u16(writer, self.operation as u16)?;
        write_u16(writer, distribution)?;
        Ok(())
    }

    fn write_headers<W: Write>(&self, writer: &mut W) -> Result<()> {
        for header in &self.headers {
            match header {
                FrameHeader::Custom { name, value } => {
                    write_u8(writer, TOKEN_CUSTOM)?;
                    write_u8(writer, FORMAT_COUNTED_STRING)?;
                    write_counted_string(writer, name)?;
                    write_counted_string(writer, value)?;
                }
                FrameHeader::StatusCode(code) => {
                    write_u8(writer, TOKEN_STATUS_CODE)?;
                    write_u8(writer, FORMAT_BYTE)?;
                    write_u8(writer, *code as u8)?;
                }
                FrameHeader::StatusPhrase(phrase) => {
                    write_u8(writer, TOKEN_STATUS_PHRASE)?;
                    write_u8(writer, FORMAT_COUNTED_STRING)?;
                    write_counted_string(writer, phrase)?;
                }
                FrameHeader::RequestUri(uri) => {
                    write_u8(writer, TOKEN_REQUEST_URI)?;
                    write_u8(writer, FORMAT_COUNTED_STRING)?;
                    write_counted_string(writer, uri)?;
                }
                FrameHeader::CloseConnection => {
                    write_u8(writer, TOKEN_CLOSE_CONNECTION)?;
                    write_u8(writer, FORMAT_VOID)?;
                }
                FrameHeader::ContentType(ct) => {
                    write_u8(writer, TOKEN_CONTENT_TYPE)?;
                    write_u8(writer, FORMAT_COUNTED_STRING)?;
                    write_counted_string(writer, ct)?;
                }
            }
        }
        write_u8(writer, TOKEN_END)
    }

    /// Reads one frame. Truncation surfaces as an IO error so a buffering
    /// transport can retry with more data.
    pub fn read_from<R: Read>(reader: &mut R) -> Result<Frame> {
        let protocol = read_i32(reader)?;
        if protocol != PROTOCOL_ID {
            return Err(Error::Frame(format!("bad protocol id {protocol:#010x}")));
        }
        let major = read_u8(reader)?;
        let minor = read_u8(reader)?;
        if (major, minor) != (MAJOR_VERSION, MINOR_VERSION) {
            return Err(Error::Frame(format!("unsupported frame version {major}.{minor}")));
        }
        let operation = Operation::try_from(read_u16(reader)?)?;
        let distribution = read_u16(reader)?;
        let content_length = match distribution {
            0 => {
                let len = read_i32(reader)?;
                if len < 0 {
                    return Err(Error::Frame(format!("negative content length {len}")));
                }
                Some(len as usize)
            }
            1 => None,
            other => return Err(Error::Frame(format!("unknown content distribution {other}"))),
        };

        let headers = read_headers(reader)?;

        let content = match content_length {
            Some(len) => {
                let mut content = vec![0u8; len];
                reader.read_exact(&mut content)?;
                content
            }
            None => read_chunked_content(reader)?,
        };

        Ok(Frame { operation, headers, content })
    }
}

fn read_headers<R: Read>(reader: &mut R) -> Result<Vec<FrameHeader>> {
    let mut headers = Vec::new();
    loop {
        let token = read_u8(reader)?;
        if token == TOKEN_END {
            return Ok(headers);
        }
        let format = read_u8(reader)?;
        let header = match token {
            TOKEN_CUSTOM => {
                expect_format(token, format, FORMAT_COUNTED_STRING)?;
                FrameHeader::Custom {
                    name: read_counted_string(reader)?,
                    value: read_counted_string(reader)?,
                }
            }
            TOKEN_STATUS_CODE => {
                expect_format(token, format, FORMAT_BYTE)?;
                match read_u8(reader)? {
                    0 => FrameHeader::StatusCode(StatusCode::Success),
                    1 => FrameHeader::StatusCode(StatusCode::Error),
                    other => return Err(Error::Frame(format!("unknown status code {other}"))),
                }
            }
            TOKEN_STATUS_PHRASE => {
                expect_format(token, format, FORMAT_COUNTED_STRING)?;
                FrameHeader::StatusPhrase(read_counted_string(reader)?)
            }
            TOKEN_REQUEST_URI => {
                expect_format(token, format, FORMAT_COUNTED_STRING)?;
                FrameHeader::RequestUri(read_counted_string(reader)?)
            }
            TOKEN_CLOSE_CONNECTION => {
                expect_format(token, format, FORMAT_VOID)?;
                FrameHeader::CloseConnection
            }
            TOKEN_CONTENT_TYPE => {
                expect_format(token, format, FORMAT_COUNTED_STRING)?;
                FrameHeader::ContentType(read_counted_string(reader)?)
            }
            other => return Err(Error::Frame(format!("unknown header token {other}"))),
        };
        headers.push(header);
    }
}

fn expect_format(token: u8, actual: u8, expected: u8) -> Result<()> {
    if actual != expected {
        return Err(Error::Frame(format!(
            "header token {token} carries data format {actual}, expected {expected}"
        )));
    }
    Ok(())
}

fn read_chunked_content<R: Read>(reader: &mut R) -> Result<Vec<u8>> {
    let mut content = Vec::new();
    loop {
        let size = read_i32(reader)?;
        if size < 0 {
            return Err(Error::Frame(format!("negative chunk size {size}")));
        }
        if size > 0 {
            let start = content.len();
            content.resize(start + size as usize, 0);
            reader.read_exact(&mut content[start..])?;
        }
        let mut trailer = [0u8; 2];
        reader.read_exact(&mut trailer)?;
        if trailer != CHUNK_TRAILER {
            return Err(Error::Frame(format!("bad chunk trailer {trailer:02x?}")));
        }
        if size == 0 {
            return Ok(content);
        }
    }
}

fn write_counted_string<W: Write>(writer: &mut W, s: &str) -> Result<()> {
    let bytes = s.as_bytes();
    if bytes.len() > i32::MAX as usize {
        return Err(Error::Frame("counted string too long".into()));
    }
    write_u8(writer, STRING_UTF8)?;
    write_i32(writer, bytes.len() as i32)?;
    writer.write_all(bytes)?;
    Ok(())
}

fn read_counted_string<R: Read>(reader: &mut R) -> Result<String> {
    let encoding = read_u8(reader)?;
    let length = read_i32(reader)?;
    if length < 0 {
        return Err(Error::Frame(format!("negative counted string length {length}")));
    }
    if length == 0 {
        return Ok(String::new());
    }
    let mut bytes = vec![0u8; length as usize];
    reader.read_exact(&mut bytes)?;
    match encoding {
        STRING_UTF8 => Ok(String::from_utf8(bytes)?),
        STRING_UTF16 => {
            if bytes.len() % 2 != 0 {
                return Err(Error::Frame("odd UTF-16 byte count".into()));
            }
            let units: Vec<u16> = bytes
                .chunks_exact(2)
                .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
                .collect();
            String::from_utf16(&units).map_err(|_| Error::Frame("invalid UTF-16".into()))
        }
        other => Err(Error::Frame(format!("unknown string encoding {other}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn roundtrip(frame: &Frame) -> Frame {
        let mut buf = Vec::new();
        frame.write_to(&mut buf).unwrap();
        Frame::read_from(&mut Cursor::new(buf)).unwrap()
    }

    #[test]
    fn request_frame_roundtrip() {
        let frame = Frame::request(Operation::Request, "/S", vec![1, 2, 3]);
        let back = roundtrip(&frame);
        assert_eq!(back, frame);
        assert_eq!(back.request_uri(), Some("/S"));
        assert_eq!(back.content_type(), Some(BINARY_CONTENT_TYPE));
    }

    #[test]
    fn error_reply_carries_status_and_close() {
        let back = roundtrip(&Frame::error_reply("no such service"));
        assert_eq!(back.status_code(), Some(StatusCode::Error));
        assert_eq!(back.status_phrase(), Some("no such service"));
        assert!(back.close_requested());
    }

    #[test]
    fn custom_header_roundtrip() {
        let mut frame = Frame::reply(vec![]);
        frame.headers.push(FrameHeader::Custom { name: "X-Trace".into(), value: "abc".into() });
        assert_eq!(roundtrip(&frame), frame);
    }

    #[test]
    fn chunked_content_reassembles() {
        let frame = Frame::request(Operation::Request, "/S", (0u8..200).collect());
        let mut buf = Vec::new();
        frame.write_chunked_to(&mut buf, 64).unwrap();
        let back = Frame::read_from(&mut Cursor::new(buf)).unwrap();
        assert_eq!(back.content, frame.content);
        assert_eq!(back.headers, frame.headers);
    }

    #[test]
    fn empty_chunked_content() {
        let frame = Frame::reply(vec![]);
        let mut buf = Vec::new();
        frame.write_chunked_to(&mut buf, 64).unwrap();
        let back = Frame::read_from(&mut Cursor::new(buf)).unwrap();
        assert!(back.content.is_empty());
    }

    #[test]
    fn bad_protocol_id_rejected() {
        let mut buf = Vec::new();
        Frame::reply(vec![]).write_to(&mut buf).unwrap();
        buf[0] ^= 0xFF;
        assert!(matches!(Frame::read_from(&mut Cursor::new(buf)), Err(Error::Frame(_))));
    }

    #[test]
    fn bad_chunk_trailer_rejected() {
        let frame = Frame::reply(vec![1, 2, 3]);
        let mut buf = Vec::new();
        frame.write_chunked_to(&mut buf, 64).unwrap();
        let len = buf.len();
        buf[len - 1] = 0;
        assert!(matches!(Frame::read_from(&mut Cursor::new(buf)), Err(Error::Frame(_))));
    }

    #[test]
    fn utf16_counted_string_accepted() {
        let mut buf = Vec::new();
        buf.push(STRING_UTF16);
        buf.extend(4i32.to_le_bytes());
        buf.extend([b'h', 0, b'i', 0]);
        assert_eq!(read_counted_string(&mut Cursor::new(buf)).unwrap(), "hi");
    }

    #[test]
    fn negative_counted_string_rejected() {
        let mut buf = Vec::new();
        buf.push(STRING_UTF8);
        buf.extend((-1i32).to_le_bytes());
        assert!(read_counted_string(&mut Cursor::new(buf)).is_err());
    }

    #[test]
    fn truncated_frame_is_io_error() {
        let mut buf = Vec::new();
        Frame::request(Operation::Request, "/S", vec![1, 2, 3]).write_to(&mut buf).unwrap();
        buf.truncate(buf.len() - 2);
        let err = Frame::read_from(&mut Cursor::new(buf)).unwrap_err();
        assert!(err.is_truncated());
    }
}
