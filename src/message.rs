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

//! The top-level message grammar: header, libraries, exactly one method
//! call or return, the optional call array, trailing referenceables and
//! the end marker. Also the convenience constructors and extractors used
//! by the transport.

use crate::context::Emission;
use crate::decoder::Decoder;
use crate::encoder::Encoder;
use crate::error::{Error, Result};
use crate::records::{
    BinaryLibrary, BinaryMethodCall, BinaryMethodReturn, MessageFlags, PrimitiveValue, RecordType,
    SerializationHeader,
};
use crate::value::RemotingValue;
use log::debug;
use serde::{Deserialize, Serialize};
use std::io::{Cursor, Read, Write};

/// The assembly qualifiers .NET remoting expects on a bare type name.
pub const ASSEMBLY_QUALIFIERS: &str = ", Version=1.0.0.0, Culture=neutral, PublicKeyToken=null";

/// Appends the default assembly qualifiers when the caller supplied a bare
/// type name. Names that already carry qualifiers pass through untouched;
/// the codec itself never rewrites type names.
pub fn with_assembly_qualifiers(type_name: &str) -> String {
    if type_name.contains(',') {
        type_name.to_owned()
    } else {
        format!("{type_name}{ASSEMBLY_QUALIFIERS}")
    }
}

/// Exactly one of a method call or a method return.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MessageContent {
    Call(BinaryMethodCall),
    Return(BinaryMethodReturn),
}

impl MessageContent {
    pub fn flags(&self) -> MessageFlags {
        match self {
            MessageContent::Call(call) => call.flags,
            MessageContent::Return(ret) => ret.flags,
        }
    }

    pub fn is_return(&self) -> bool {
        matches!(self, MessageContent::Return(_))
    }

    pub fn as_call(&self) -> Option<&BinaryMethodCall> {
        match self {
            MessageContent::Call(call) => Some(call),
            MessageContent::Return(_) => None,
        }
    }

    pub fn as_return(&self) -> Option<&BinaryMethodReturn> {
        match self {
            MessageContent::Return(ret) => Some(ret),
            MessageContent::Call(_) => None,
        }
    }
}

/// A complete NRBF message as carried in one NRTP frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemotingMessage {
    pub header: SerializationHeader,
    pub libraries: Vec<BinaryLibrary>,
    pub content: MessageContent,
    /// Non-empty exactly when an in-array flag is set on the content,
    /// except for exception replies: their call array carries the
    /// exception, surfaced as `BinaryMethodReturn::exception` instead.
    pub call_array: Vec<RemotingValue>,
    pub referenced_records: Vec<RemotingValue>,
}

impl RemotingMessage {
    pub fn new(content: MessageContent) -> Self {
        Self {
            header: SerializationHeader::for_call_array(None),
            libraries: Vec::new(),
            content,
            call_array: Vec::new(),
            referenced_records: Vec::new(),
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        Encoder::new(&mut buf).write_message(self)?;
        Ok(buf)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Decoder::new(Cursor::new(bytes)).read_message()
    }
}

/// Builds a method-call message: `NoContext` plus either `NoArgs` or
/// inline value-with-code arguments.
pub fn make_method_call(
    method_name: &str,
    type_name: &str,
    args: Vec<PrimitiveValue>,
) -> RemotingMessage {
    let (flags, args) = if args.is_empty() {
        (MessageFlags::NO_ARGS | MessageFlags::NO_CONTEXT, None)
    } else {
        (MessageFlags::ARGS_INLINE | MessageFlags::NO_CONTEXT, Some(args))
    };
    RemotingMessage::new(MessageContent::Call(BinaryMethodCall {
        flags,
        method_name: method_name.to_owned(),
        type_name: type_name.to_owned(),
        call_context: None,
        args,
    }))
}

/// Builds a method-return message with an inline return value, or a void
/// return when there is none.
pub fn make_method_return(return_value: Option<PrimitiveValue>) -> RemotingMessage {
    let base = MessageFlags::NO_ARGS | MessageFlags::NO_CONTEXT;
    let flags = if return_value.is_some() {
        base | MessageFlags::RETURN_VALUE_INLINE
    } else {
        base | MessageFlags::RETURN_VALUE_VOID
    };
    RemotingMessage::new(MessageContent::Return(BinaryMethodReturn {
        flags,
        return_value,
        call_context: None,
        args: None,
        exception: None,
    }))
}

/// Builds an exception reply: no args, no context, no return value, the
/// exception riding in the call array.
pub fn make_exception_return(exception: PrimitiveValue) -> RemotingMessage {
    RemotingMessage::new(MessageContent::Return(BinaryMethodReturn {
        flags: MessageFlags::NO_ARGS
            | MessageFlags::NO_CONTEXT
            | MessageFlags::NO_RETURN_VALUE
            | MessageFlags::EXCEPTION_IN_ARRAY,
        return_value: None,
        call_context: None,
        args: None,
        exception: Some(exception),
    }))
}

/// Best-effort peek at a call payload: `(method name, type name)`, empty
/// on any parse failure. Whether a request is one-way is a property of the
/// NRTP frame operation, not of these bytes.
pub fn extract_method_call_info(payload: &[u8]) -> (String, String) {
    match RemotingMessage::from_bytes(payload) {
        Ok(message) => match message.content {
            MessageContent::Call(call) => (call.method_name, call.type_name),
            MessageContent::Return(_) => Default::default(),
        },
        Err(err) => {
            debug!("could not extract call info: {err}");
            Default::default()
        }
    }
}

/// Best-effort exception of a reply payload; `None` when the reply is not
/// an exception or does not parse.
pub fn extract_exception(payload: &[u8]) -> Option<PrimitiveValue> {
    match RemotingMessage::from_bytes(payload) {
        Ok(message) => match message.content {
            MessageContent::Return(ret) => ret.exception,
            MessageContent::Call(_) => None,
        },
        Err(err) => {
            debug!("could not extract exception: {err}");
            None
        }
    }
}

/// Best-effort inline return value of a reply payload; a null primitive
/// when absent or unparsable.
pub fn extract_return_value(payload: &[u8]) -> PrimitiveValue {
    match RemotingMessage::from_bytes(payload) {
        Ok(message) => match message.content {
            MessageContent::Return(ret) => ret.return_value.unwrap_or(PrimitiveValue::Null),
            MessageContent::Call(_) => PrimitiveValue::Null,
        },
        Err(err) => {
            debug!("could not extract return value: {err}");
            PrimitiveValue::Null
        }
    }
}

impl<R: Read> Decoder<R> {
    /// Reads one complete message, enforcing the grammar: header first,
    /// referenceables and libraries, one method record (with its call
    /// array when the flags demand one), trailing referenceables, end
    /// marker, and no dangling references.
    pub fn read_message(&mut self) -> Result<RemotingMessage> {
        let header = self.read_serialization_header()?;
        let mut libraries = Vec::new();
        let mut referenced_records = Vec::new();

        let mut content = loop {
            match self.peek_record_type()? {
                RecordType::BinaryLibrary => libraries.push(self.read_binary_library()?),
                RecordType::BinaryMethodCall => {
                    break MessageContent::Call(self.read_method_call()?);
                }
                RecordType::BinaryMethodReturn => {
                    break MessageContent::Return(self.read_method_return()?);
                }
                RecordType::MessageEnd => {
                    return Err(Error::Decode("message ends without a method record".into()));
                }
                rt if rt.is_referenceable() => referenced_records.push(self.read_value()?),
                other => {
                    return Err(Error::Decode(format!(
                        "unexpected {other:?} before the method record"
                    )));
                }
            }
        };

        let call_array = if content.flags().needs_call_array() {
            let (array_id, mut elements) = self.read_call_array()?;
            if header.root_id != array_id {
                return Err(Error::Invariant(format!(
                    "root id {} does not match call array id {array_id}",
                    header.root_id
                )));
            }
            if header.header_id != -1 {
                return Err(Error::Invariant(format!(
                    "header id {} must be -1 when a call array is present",
                    header.header_id
                )));
            }
            // An exception reply's call array is the exception itself;
            // surface it on the return record rather than as opaque args.
            match &mut content {
                MessageContent::Return(ret)
                    if ret.flags.contains(MessageFlags::EXCEPTION_IN_ARRAY) =>
                {
                    if elements.len() != 1 {
                        return Err(Error::Invariant(format!(
                            "exception call array holds {} elements, expected 1",
                            elements.len()
                        )));
                    }
                    match elements.pop() {
                        Some(RemotingValue::Primitive(exception)) => {
                            ret.exception = Some(exception);
                        }
                        other => {
                            return Err(Error::Decode(format!(
                                "exception call array element must be primitive, got {other:?}"
                            )));
                        }
                    }
                    Vec::new()
                }
                _ => elements,
            }
        } else {
            if header.root_id != 0 || header.header_id != 0 {
                return Err(Error::Invariant(format!(
                    "root id {} / header id {} must be 0 without a call array",
                    header.root_id, header.header_id
                )));
            }
            Vec::new()
        };

        loop {
            let record_type = match self.peek_record_type() {
                Ok(rt) => rt,
                Err(err) if err.is_truncated() => {
                    return Err(Error::Decode("stream ends without MessageEnd".into()));
                }
                Err(err) => return Err(err),
            };
            match record_type {
                RecordType::MessageEnd => {
                    self.expect_record(RecordType::MessageEnd)?;
                    break;
                }
                RecordType::BinaryLibrary => libraries.push(self.read_binary_library()?),
                RecordType::BinaryMethodCall | RecordType::BinaryMethodReturn => {
                    return Err(Error::Invariant(
                        "a message carries exactly one method record".into(),
                    ));
                }
                rt if rt.is_referenceable() => referenced_records.push(self.read_value()?),
                other => {
                    return Err(Error::Decode(format!(
                        "unexpected {other:?} after the method record"
                    )));
                }
            }
        }

        self.ctx.check_references()?;
        Ok(RemotingMessage { header, libraries, content, call_array, referenced_records })
    }
}

impl<W: Write> Encoder<W> {
    /// Writes one complete message, the mirror of `read_message`. The
    /// header's root and header ids are derived from call-array presence.
    pub fn write_message(&mut self, message: &RemotingMessage) -> Result<()> {
        let flags = message.content.flags();
        flags.validate(message.content.is_return())?;
        let exception = message
            .content
            .as_return()
            .and_then(|ret| ret.exception.as_ref());
        if exception.is_some() && !message.call_array.is_empty() {
            return Err(Error::Invariant(
                "an exception reply carries nothing else in its call array".into(),
            ));
        }
        if flags.needs_call_array() != (!message.call_array.is_empty() || exception.is_some()) {
            return Err(Error::Invariant(
                "call array presence must match the message flags".into(),
            ));
        }

        let call_array_id = if message.call_array.is_empty() && exception.is_none() {
            None
        } else {
            // Reserve the array's id up front; the header carries it.
            match self.ctx.emit_object(message.header.root_id.max(0))? {
                Emission::Fresh(id) => Some(id),
                Emission::Back(id) => {
                    return Err(Error::Invariant(format!("call array id {id} already emitted")));
                }
            }
        };

        self.write_serialization_header(&SerializationHeader::for_call_array(call_array_id))?;
        for library in &message.libraries {
            self.write_binary_library(library)?;
        }
        match &message.content {
            MessageContent::Call(call) => self.write_method_call(call)?,
            MessageContent::Return(ret) => self.write_method_return(ret)?,
        }
        if let Some(id) = call_array_id {
            match exception {
                Some(exception) => {
                    let element = RemotingValue::Primitive(exception.clone());
                    self.write_call_array(id, std::slice::from_ref(&element))?;
                }
                None => self.write_call_array(id, &message.call_array)?,
            }
        }
        for record in &message.referenced_records {
            self.write_value(record)?;
        }
        self.write_message_end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::{ArrayInfo, ArrayRecord, ObjectString};
    use crate::value::ArrayValue;

    #[test]
    fn call_helper_picks_args_flags() {
        let empty = make_method_call("Ping", "Svc", vec![]);
        assert_eq!(empty.content.flags(), MessageFlags::NO_ARGS | MessageFlags::NO_CONTEXT);

        let with_args = make_method_call("Add", "Svc", vec![PrimitiveValue::Int32(3)]);
        assert_eq!(
            with_args.content.flags(),
            MessageFlags::ARGS_INLINE | MessageFlags::NO_CONTEXT
        );
    }

    #[test]
    fn return_helper_picks_void_or_inline() {
        assert!(make_method_return(None)
            .content
            .flags()
            .contains(MessageFlags::RETURN_VALUE_VOID));
        assert!(make_method_return(Some(PrimitiveValue::Int32(8)))
            .content
            .flags()
            .contains(MessageFlags::RETURN_VALUE_INLINE));
    }

    #[test]
    fn message_roundtrip_no_args() {
        let message = make_method_call("Ping", "MyServer", vec![]);
        let bytes = message.to_bytes().unwrap();
        let back = RemotingMessage::from_bytes(&bytes).unwrap();
        assert_eq!(back.content, message.content);
        assert_eq!(back.header, SerializationHeader::for_call_array(None));
    }

    #[test]
    fn call_array_flag_without_array_rejected() {
        let mut message = make_method_call("Foo", "Bar", vec![]);
        if let MessageContent::Call(call) = &mut message.content {
            call.flags = MessageFlags::ARGS_IN_ARRAY | MessageFlags::NO_CONTEXT;
        }
        assert!(message.to_bytes().is_err());
    }

    #[test]
    fn empty_call_array_rejected_on_decode() {
        // Hand-build: header root 1 / header -1, call with ArgsInArray,
        // then an empty ArraySingleObject.
        let mut bytes = vec![0];
        bytes.extend(1i32.to_le_bytes());
        bytes.extend((-1i32).to_le_bytes());
        bytes.extend(1i32.to_le_bytes());
        bytes.extend(0i32.to_le_bytes());
        bytes.push(21);
        bytes.extend(0x18u32.to_le_bytes());
        bytes.extend([18, 3, b'F', b'o', b'o', 18, 3, b'B', b'a', b'r']);
        bytes.push(16);
        bytes.extend(1i32.to_le_bytes());
        bytes.extend(0i32.to_le_bytes());
        bytes.push(11);
        assert!(matches!(RemotingMessage::from_bytes(&bytes), Err(Error::Invariant(_))));
    }

    #[test]
    fn two_method_records_rejected() {
        let message = make_method_call("Ping", "S", vec![]);
        let mut bytes = message.to_bytes().unwrap();
        // Splice a second method call before the end marker.
        let end = bytes.pop().unwrap();
        bytes.push(21);
        bytes.extend(0x11u32.to_le_bytes());
        bytes.extend([18, 1, b'M', 18, 1, b'T']);
        bytes.push(end);
        assert!(matches!(RemotingMessage::from_bytes(&bytes), Err(Error::Invariant(_))));
    }

    #[test]
    fn dangling_reference_rejected_at_message_end() {
        let mut message = make_method_call("Ping", "S", vec![]);
        message.referenced_records.push(RemotingValue::Array(ArrayValue {
            record: ArrayRecord::SingleObject { array_info: ArrayInfo { object_id: 5, length: 1 } },
            elements: vec![RemotingValue::Reference(99)],
        }));
        let bytes = message.to_bytes().unwrap();
        assert!(matches!(RemotingMessage::from_bytes(&bytes), Err(Error::Invariant(_))));
    }

    #[test]
    fn exception_reply_roundtrips_as_exception() {
        let message = make_exception_return(PrimitiveValue::String("boom".into()));
        let bytes = message.to_bytes().unwrap();
        let back = RemotingMessage::from_bytes(&bytes).unwrap();

        let ret = back.content.as_return().unwrap();
        assert_eq!(ret.exception, Some(PrimitiveValue::String("boom".into())));
        assert!(back.call_array.is_empty());
        assert_eq!((back.header.root_id, back.header.header_id), (1, -1));
        assert_eq!(back.to_bytes().unwrap(), bytes);
    }

    #[test]
    fn exception_flag_without_exception_rejected() {
        let message = RemotingMessage::new(MessageContent::Return(BinaryMethodReturn {
            flags: MessageFlags::NO_ARGS
                | MessageFlags::NO_CONTEXT
                | MessageFlags::NO_RETURN_VALUE
                | MessageFlags::EXCEPTION_IN_ARRAY,
            return_value: None,
            call_context: None,
            args: None,
            exception: None,
        }));
        assert!(message.to_bytes().is_err());
    }

    #[test]
    fn extract_exception_distinguishes_replies() {
        let exception = make_exception_return(PrimitiveValue::String("no such method".into()));
        assert_eq!(
            extract_exception(&exception.to_bytes().unwrap()),
            Some(PrimitiveValue::String("no such method".into()))
        );

        let normal = make_method_return(Some(PrimitiveValue::Int32(8)));
        assert_eq!(extract_exception(&normal.to_bytes().unwrap()), None);
        assert_eq!(extract_exception(&[0xFF]), None);
    }

    #[test]
    fn extractors_swallow_errors() {
        assert_eq!(extract_method_call_info(&[1, 2, 3]), (String::new(), String::new()));
        assert_eq!(extract_return_value(&[0xFF]), PrimitiveValue::Null);
    }

    #[test]
    fn extractors_read_valid_payloads() {
        let call = make_method_call("Add", "Math", vec![PrimitiveValue::Int32(1)]);
        let bytes = call.to_bytes().unwrap();
        assert_eq!(extract_method_call_info(&bytes), ("Add".into(), "Math".into()));

        let ret = make_method_return(Some(PrimitiveValue::Int32(8)));
        assert_eq!(extract_return_value(&ret.to_bytes().unwrap()), PrimitiveValue::Int32(8));
    }

    #[test]
    fn assembly_qualifiers_only_added_to_bare_names() {
        assert_eq!(
            with_assembly_qualifiers("My.Type"),
            format!("My.Type{ASSEMBLY_QUALIFIERS}")
        );
        let qualified = "My.Type, MyAssembly";
        assert_eq!(with_assembly_qualifiers(qualified), qualified);
    }

    #[test]
    fn libraries_roundtrip_before_method_record() {
        let mut message = make_method_call("Ping", "S", vec![]);
        message.libraries.push(BinaryLibrary {
            library_id: 1,
            library_name: "Lib, Version=1.0.0.0".into(),
        });
        message.referenced_records.push(RemotingValue::String(ObjectString {
            object_id: 4,
            value: "shared".into(),
        }));
        let bytes = message.to_bytes().unwrap();
        let back = RemotingMessage::from_bytes(&bytes).unwrap();
        assert_eq!(back.libraries, message.libraries);
        assert_eq!(back.referenced_records, message.referenced_records);
    }
}
