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

use crate::context::{ClassMetadata, DeserializationContext};
use crate::error::{Error, Result};
use crate::primitives::*;
use crate::records::*;
use crate::value::{ArrayValue, ClassValue, RemotingValue};
use log::trace;
use std::io::Read;

/// A decoder for MS-NRBF binary streams.
///
/// One decoder instance reads one message; the deserialization context it
/// builds up stays available afterwards for reference resolution.
pub struct Decoder<R: Read> {
    reader: R,
    peeked: Option<u8>,
    pub(crate) ctx: DeserializationContext,
}

impl<R: Read> Decoder<R> {
    /// Creates a new decoder from a reader.
    pub fn new(reader: R) -> Self {
        Self { reader, peeked: None, ctx: DeserializationContext::new() }
    }

    /// The reference state accumulated so far. After a full message decode
    /// this resolves ids to their objects.
    pub fn context(&self) -> &DeserializationContext {
        &self.ctx
    }

    pub fn into_context(self) -> DeserializationContext {
        self.ctx
    }

    fn next_byte(&mut self) -> Result<u8> {
        match self.peeked.take() {
            Some(b) => Ok(b),
            None => read_u8(&mut self.reader),
        }
    }

    /// Looks at the next record tag without consuming it.
    pub(crate) fn peek_record_type(&mut self) -> Result<RecordType> {
        let b = match self.peeked {
            Some(b) => b,
            None => {
                let b = read_u8(&mut self.reader)?;
                self.peeked = Some(b);
                b
            }
        };
        RecordType::try_from(b)
    }

    /// Consumes the next record tag, checking it matches `expected`.
    pub(crate) fn expect_record(&mut self, expected: RecordType) -> Result<()> {
        let b = self.next_byte()?;
        let actual = RecordType::try_from(b)?;
        if actual != expected {
            return Err(Error::Decode(format!("expected {expected:?} record, found {actual:?}")));
        }
        Ok(())
    }

    /// Reads the stream header, including its tag. The version must be 1.0.
    pub(crate) fn read_serialization_header(&mut self) -> Result<SerializationHeader> {
        self.expect_record(RecordType::SerializedStreamHeader)?;
        let header = SerializationHeader {
            root_id: read_i32(&mut self.reader)?,
            header_id: read_i32(&mut self.reader)?,
            major_version: read_i32(&mut self.reader)?,
            minor_version: read_i32(&mut self.reader)?,
        };
        if header.major_version != 1 || header.minor_version != 0 {
            return Err(Error::Decode(format!(
                "unsupported stream version {}.{}",
                header.major_version, header.minor_version
            )));
        }
        Ok(header)
    }

    /// Reads a BinaryLibrary record, including its tag, and registers it.
    pub(crate) fn read_binary_library(&mut self) -> Result<BinaryLibrary> {
        self.expect_record(RecordType::BinaryLibrary)?;
        let library = BinaryLibrary {
            library_id: read_i32(&mut self.reader)?,
            library_name: read_length_prefixed_string(&mut self.reader)?,
        };
        self.ctx.register_library(library.library_id, &library.library_name)?;
        trace!("library {} = {}", library.library_id, library.library_name);
        Ok(library)
    }

    /// Reads the next record as a value. The caller is expected to have
    /// peeked; null-run records are only legal inside arrays and are
    /// rejected here.
    pub fn read_value(&mut self) -> Result<RemotingValue> {
        let record_type = RecordType::try_from(self.next_byte()?)?;
        trace!("record {record_type:?}");
        match record_type {
            RecordType::ClassWithId => self.read_class_with_id(),
            RecordType::SystemClassWithMembers => self.read_class(record_type),
            RecordType::ClassWithMembers => self.read_class(record_type),
            RecordType::SystemClassWithMembersAndTypes => self.read_class(record_type),
            RecordType::ClassWithMembersAndTypes => self.read_class(record_type),
            RecordType::BinaryObjectString => {
                let object_id = read_i32(&mut self.reader)?;
                let value = read_length_prefixed_string(&mut self.reader)?;
                let string = ObjectString { object_id, value };
                let value = RemotingValue::String(string);
                self.ctx.register_object(object_id, value.clone())?;
                Ok(value)
            }
            RecordType::BinaryArray => self.read_binary_array(),
            RecordType::ArraySinglePrimitive => self.read_array_single_primitive(),
            RecordType::ArraySingleObject => self.read_array_single_object(),
            RecordType::ArraySingleString => self.read_array_single_string(),
            RecordType::MemberPrimitiveTyped => {
                let pt = PrimitiveType::try_from(read_u8(&mut self.reader)?)?;
                Ok(RemotingValue::Primitive(self.read_primitive(pt)?))
            }
            RecordType::MemberReference => {
                let id_ref = read_i32(&mut self.reader)?;
                if id_ref <= 0 {
                    return Err(Error::Invariant(format!("member reference id {id_ref} must be positive")));
                }
                self.ctx.note_reference(id_ref);
                Ok(RemotingValue::Reference(id_ref))
            }
            RecordType::ObjectNull => Ok(RemotingValue::Null),
            RecordType::ObjectNullMultiple | RecordType::ObjectNullMultiple256 => Err(
                Error::Decode(format!("{record_type:?} is only legal inside an array")),
            ),
            other => Err(Error::Decode(format!("unexpected {other:?} record at value position"))),
        }
    }

    /// Reads one primitive of the given kind, without a type tag.
    pub(crate) fn read_primitive(&mut self, pt: PrimitiveType) -> Result<PrimitiveValue> {
        let r = &mut self.reader;
        Ok(match pt {
            PrimitiveType::Boolean => PrimitiveValue::Boolean(read_u8(r)? != 0),
            PrimitiveType::Byte => PrimitiveValue::Byte(read_u8(r)?),
            PrimitiveType::Char => PrimitiveValue::Char(read_char(r)?),
            PrimitiveType::Decimal => PrimitiveValue::Decimal(read_decimal(r)?),
            PrimitiveType::Double => PrimitiveValue::Double(read_f64(r)?),
            PrimitiveType::Int16 => PrimitiveValue::Int16(read_i16(r)?),
            PrimitiveType::Int32 => PrimitiveValue::Int32(read_i32(r)?),
            PrimitiveType::Int64 => PrimitiveValue::Int64(read_i64(r)?),
            PrimitiveType::SByte => PrimitiveValue::SByte(read_i8(r)?),
            PrimitiveType::Single => PrimitiveValue::Single(read_f32(r)?),
            PrimitiveType::TimeSpan => PrimitiveValue::TimeSpan(read_i64(r)?),
            PrimitiveType::DateTime => PrimitiveValue::DateTime(read_datetime(r)?),
            PrimitiveType::UInt16 => PrimitiveValue::UInt16(read_u16(r)?),
            PrimitiveType::UInt32 => PrimitiveValue::UInt32(read_u32(r)?),
            PrimitiveType::UInt64 => PrimitiveValue::UInt64(read_u64(r)?),
            PrimitiveType::String => {
                PrimitiveValue::String(read_length_prefixed_string(r)?)
            }
            PrimitiveType::Null => PrimitiveValue::Null,
        })
    }

    fn read_class_info(&mut self) -> Result<ClassInfo> {
        let object_id = read_i32(&mut self.reader)?;
        if object_id <= 0 {
            return Err(Error::Invariant(format!("class object id {object_id} must be positive")));
        }
        let name = read_length_prefixed_string(&mut self.reader)?;
        let member_count = read_i32(&mut self.reader)?;
        if member_count < 0 {
            return Err(Error::Invariant(format!("negative member count {member_count}")));
        }
        let mut member_names = Vec::with_capacity(member_count.min(1024) as usize);
        for _ in 0..member_count {
            member_names.push(read_length_prefixed_string(&mut self.reader)?);
        }
        Ok(ClassInfo { object_id, name, member_count, member_names })
    }

    fn read_member_type_info(&mut self, count: i32) -> Result<MemberTypeInfo> {
        let mut binary_types = Vec::with_capacity(count.min(1024) as usize);
        for _ in 0..count {
            binary_types.push(BinaryType::try_from(read_u8(&mut self.reader)?)?);
        }
        let mut additional_infos = Vec::with_capacity(binary_types.len());
        for bt in &binary_types {
            additional_infos.push(self.read_additional_info(*bt)?);
        }
        Ok(MemberTypeInfo { binary_types, additional_infos })
    }

    fn read_additional_info(&mut self, bt: BinaryType) -> Result<AdditionalTypeInfo> {
        Ok(match bt {
            BinaryType::Primitive | BinaryType::PrimitiveArray => {
                let pt = PrimitiveType::try_from(read_u8(&mut self.reader)?)?;
                if matches!(pt, PrimitiveType::Null | PrimitiveType::String) {
                    return Err(Error::Invariant(format!(
                        "{pt:?} is not a legal additional info for {bt:?}"
                    )));
                }
                AdditionalTypeInfo::Primitive(pt)
            }
            BinaryType::SystemClass => {
                AdditionalTypeInfo::SystemClass(read_length_prefixed_string(&mut self.reader)?)
            }
            BinaryType::Class => AdditionalTypeInfo::Class(ClassTypeInfo {
                type_name: read_length_prefixed_string(&mut self.reader)?,
                library_id: read_i32(&mut self.reader)?,
            }),
            _ => AdditionalTypeInfo::None,
        })
    }

    fn read_class(&mut self, record_type: RecordType) -> Result<RemotingValue> {
        let class_info = self.read_class_info()?;
        let member_type_info = match record_type {
            RecordType::SystemClassWithMembersAndTypes | RecordType::ClassWithMembersAndTypes => {
                Some(self.read_member_type_info(class_info.member_count)?)
            }
            _ => None,
        };
        let library_id = match record_type {
            RecordType::ClassWithMembers | RecordType::ClassWithMembersAndTypes => {
                let id = read_i32(&mut self.reader)?;
                if self.ctx.library_name(id).is_none() {
                    return Err(Error::Invariant(format!("class refers to unknown library {id}")));
                }
                Some(id)
            }
            _ => None,
        };

        let object_id = class_info.object_id;
        self.ctx.register_metadata(
            object_id,
            ClassMetadata {
                class_info: class_info.clone(),
                member_type_info: member_type_info.clone(),
                library_id,
            },
        );

        let members = self.read_members(&class_info, member_type_info.as_ref())?;
        let record = match record_type {
            RecordType::SystemClassWithMembers => ClassRecord::SystemWithMembers { class_info },
            RecordType::ClassWithMembers => ClassRecord::WithMembers {
                class_info,
                library_id: library_id.unwrap(),
            },
            RecordType::SystemClassWithMembersAndTypes => ClassRecord::SystemWithMembersAndTypes {
                class_info,
                member_type_info: member_type_info.unwrap(),
            },
            RecordType::ClassWithMembersAndTypes => ClassRecord::WithMembersAndTypes {
                class_info,
                member_type_info: member_type_info.unwrap(),
                library_id: library_id.unwrap(),
            },
            _ => unreachable!("read_class called with {record_type:?}"),
        };
        let value = RemotingValue::Class(ClassValue { record, members });
        self.ctx.register_object(object_id, value.clone())?;
        Ok(value)
    }

    fn read_class_with_id(&mut self) -> Result<RemotingValue> {
        let object_id = read_i32(&mut self.reader)?;
        if object_id <= 0 {
            return Err(Error::Invariant(format!("class object id {object_id} must be positive")));
        }
        let metadata_id = read_i32(&mut self.reader)?;
        let meta = self
            .ctx
            .metadata(metadata_id)
            .cloned()
            .ok_or_else(|| Error::Invariant(format!("metadata id {metadata_id} not found")))?;
        let members = self.read_members(&meta.class_info, meta.member_type_info.as_ref())?;
        let value = RemotingValue::Class(ClassValue {
            record: ClassRecord::WithId { object_id, metadata_id },
            members,
        });
        self.ctx.register_object(object_id, value.clone())?;
        Ok(value)
    }

    fn read_members(
        &mut self,
        class_info: &ClassInfo,
        member_type_info: Option<&MemberTypeInfo>,
    ) -> Result<Vec<RemotingValue>> {
        let count = class_info.member_count as usize;
        let mut members = Vec::with_capacity(count.min(1024));
        for i in 0..count {
            let member = match member_type_info {
                Some(mti) => {
                    let bt = mti.binary_types[i];
                    let info = &mti.additional_infos[i];
                    self.read_typed_member(bt, info)?
                }
                None => self.read_value()?,
            };
            members.push(member);
        }
        Ok(members)
    }

    /// Reads a member whose static type comes from the class's type table.
    /// Primitives are untyped on the wire; everything else is a record.
    fn read_typed_member(
        &mut self,
        bt: BinaryType,
        info: &AdditionalTypeInfo,
    ) -> Result<RemotingValue> {
        match (bt, info) {
            (BinaryType::Primitive, AdditionalTypeInfo::Primitive(pt)) => {
                Ok(RemotingValue::Primitive(self.read_primitive(*pt)?))
            }
            (BinaryType::Primitive, _) => {
                Err(Error::Decode("primitive member without a primitive kind".into()))
            }
            _ => self.read_value(),
        }
    }

    fn read_array_single_primitive(&mut self) -> Result<RemotingValue> {
        let array_info = self.read_array_info()?;
        let pt = PrimitiveType::try_from(read_u8(&mut self.reader)?)?;
        if matches!(pt, PrimitiveType::Null | PrimitiveType::String) {
            return Err(Error::Invariant(format!(
                "{pt:?} is not a legal primitive array element type"
            )));
        }
        let mut elements = Vec::with_capacity(array_info.length.min(4096) as usize);
        for _ in 0..array_info.length {
            elements.push(RemotingValue::Primitive(self.read_primitive(pt)?));
        }
        let value = RemotingValue::Array(ArrayValue {
            record: ArrayRecord::SinglePrimitive { array_info, primitive_type: pt },
            elements,
        });
        self.ctx.register_object(array_info.object_id, value.clone())?;
        Ok(value)
    }

    fn read_array_single_object(&mut self) -> Result<RemotingValue> {
        let array_info = self.read_array_info()?;
        let elements = self.read_elements(array_info.length)?;
        let value = RemotingValue::Array(ArrayValue {
            record: ArrayRecord::SingleObject { array_info },
            elements,
        });
        self.ctx.register_object(array_info.object_id, value.clone())?;
        Ok(value)
    }

    fn read_array_single_string(&mut self) -> Result<RemotingValue> {
        let array_info = self.read_array_info()?;
        let elements = self.read_elements(array_info.length)?;
        let value = RemotingValue::Array(ArrayValue {
            record: ArrayRecord::SingleString { array_info },
            elements,
        });
        self.ctx.register_object(array_info.object_id, value.clone())?;
        Ok(value)
    }

    fn read_array_info(&mut self) -> Result<ArrayInfo> {
        let object_id = read_i32(&mut self.reader)?;
        if object_id <= 0 {
            return Err(Error::Invariant(format!("array object id {object_id} must be positive")));
        }
        let length = read_i32(&mut self.reader)?;
        if length < 0 {
            return Err(Error::Invariant(format!("negative array length {length}")));
        }
        Ok(ArrayInfo { object_id, length })
    }

    fn read_binary_array(&mut self) -> Result<RemotingValue> {
        let object_id = read_i32(&mut self.reader)?;
        if object_id <= 0 {
            return Err(Error::Invariant(format!("array object id {object_id} must be positive")));
        }
        let array_type = BinaryArrayType::try_from(read_u8(&mut self.reader)?)?;
        let rank = read_i32(&mut self.reader)?;
        if rank < 1 {
            return Err(Error::Invariant(format!("array rank {rank} must be at least 1")));
        }
        let mut lengths = Vec::with_capacity(rank.min(64) as usize);
        for _ in 0..rank {
            let len = read_i32(&mut self.reader)?;
            if len < 0 {
                return Err(Error::Invariant(format!("negative array length {len}")));
            }
            lengths.push(len);
        }
        let lower_bounds = if array_type.has_lower_bounds() {
            let mut bounds = Vec::with_capacity(rank.min(64) as usize);
            for _ in 0..rank {
                bounds.push(read_i32(&mut self.reader)?);
            }
            Some(bounds)
        } else {
            None
        };
        let item_type = BinaryType::try_from(read_u8(&mut self.reader)?)?;
        let additional_info = self.read_additional_info(item_type)?;

        let record = BinaryArrayRecord {
            object_id,
            array_type,
            rank,
            lengths,
            lower_bounds,
            item_type,
            additional_info,
        };
        let total = record.flat_length();
        if total > i32::MAX as i64 {
            return Err(Error::Invariant(format!("array element count {total} overflows")));
        }

        let elements = match (item_type, &record.additional_info) {
            (BinaryType::Primitive, AdditionalTypeInfo::Primitive(pt)) => {
                let pt = *pt;
                let mut elements = Vec::with_capacity((total as usize).min(4096));
                for _ in 0..total {
                    elements.push(RemotingValue::Primitive(self.read_primitive(pt)?));
                }
                elements
            }
            _ => self.read_elements(total as i32)?,
        };
        let value = RemotingValue::Array(ArrayValue {
            record: ArrayRecord::Binary(record),
            elements,
        });
        self.ctx.register_object(object_id, value.clone())?;
        Ok(value)
    }

    /// Reads `count` array slots, expanding null-run records. A run longer
    /// than the remaining capacity is clipped.
    pub(crate) fn read_elements(&mut self, count: i32) -> Result<Vec<RemotingValue>> {
        let count = count as usize;
        let mut elements = Vec::with_capacity(count.min(4096));
        while elements.len() < count {
            let remaining = count - elements.len();
            match self.peek_record_type()? {
                RecordType::ObjectNullMultiple256 => {
                    self.next_byte()?;
                    let run = read_u8(&mut self.reader)? as usize;
                    if run == 0 {
                        return Err(Error::Invariant("null run of length 0".into()));
                    }
                    for _ in 0..run.min(remaining) {
                        elements.push(RemotingValue::Null);
                    }
                }
                RecordType::ObjectNullMultiple => {
                    self.next_byte()?;
                    let run = read_i32(&mut self.reader)?;
                    if run <= 0 {
                        return Err(Error::Invariant(format!("null run of length {run}")));
                    }
                    for _ in 0..(run as usize).min(remaining) {
                        elements.push(RemotingValue::Null);
                    }
                }
                _ => elements.push(self.read_value()?),
            }
        }
        Ok(elements)
    }

    /// Reads a BinaryMethodCall record, including its tag.
    pub(crate) fn read_method_call(&mut self) -> Result<BinaryMethodCall> {
        self.expect_record(RecordType::BinaryMethodCall)?;
        let flags = MessageFlags::from_raw(read_u32(&mut self.reader)?)?;
        flags.validate(false)?;
        let method_name = self.read_string_with_code()?;
        let type_name = self.read_string_with_code()?;
        let call_context = if flags.contains(MessageFlags::CONTEXT_INLINE) {
            Some(self.read_string_with_code()?)
        } else {
            None
        };
        let args = if flags.contains(MessageFlags::ARGS_INLINE) {
            Some(self.read_value_with_code_array()?)
        } else {
            None
        };
        Ok(BinaryMethodCall { flags, method_name, type_name, call_context, args })
    }

    /// Reads a BinaryMethodReturn record, including its tag.
    pub(crate) fn read_method_return(&mut self) -> Result<BinaryMethodReturn> {
        self.expect_record(RecordType::BinaryMethodReturn)?;
        let flags = MessageFlags::from_raw(read_u32(&mut self.reader)?)?;
        flags.validate(true)?;
        let return_value = if flags.contains(MessageFlags::RETURN_VALUE_INLINE) {
            Some(self.read_value_with_code()?)
        } else {
            None
        };
        let call_context = if flags.contains(MessageFlags::CONTEXT_INLINE) {
            Some(self.read_string_with_code()?)
        } else {
            None
        };
        let args = if flags.contains(MessageFlags::ARGS_INLINE) {
            Some(self.read_value_with_code_array()?)
        } else {
            None
        };
        // An EXCEPTION_IN_ARRAY exception travels in the call array, which
        // follows this record; the grammar driver fills the field in.
        Ok(BinaryMethodReturn { flags, return_value, call_context, args, exception: None })
    }

    /// Reads the call array that follows a method record when an in-array
    /// flag is set. Elements travel in value-with-code form; an empty call
    /// array is rejected. Returns the array's object id and elements.
    pub(crate) fn read_call_array(&mut self) -> Result<(i32, Vec<RemotingValue>)> {
        self.expect_record(RecordType::ArraySingleObject)?;
        let array_info = self.read_array_info()?;
        if array_info.length == 0 {
            return Err(Error::Invariant("call array must not be empty".into()));
        }
        let mut elements = Vec::with_capacity(array_info.length.min(1024) as usize);
        for _ in 0..array_info.length {
            elements.push(RemotingValue::Primitive(self.read_value_with_code()?));
        }
        let value = RemotingValue::Array(ArrayValue {
            record: ArrayRecord::SingleObject { array_info },
            elements: elements.clone(),
        });
        self.ctx.register_object(array_info.object_id, value)?;
        Ok((array_info.object_id, elements))
    }

    /// A value-with-code: one primitive type byte followed by the value.
    fn read_value_with_code(&mut self) -> Result<PrimitiveValue> {
        let pt = PrimitiveType::try_from(read_u8(&mut self.reader)?)?;
        self.read_primitive(pt)
    }

    /// A string-with-code must carry the String primitive type.
    fn read_string_with_code(&mut self) -> Result<String> {
        let pt = PrimitiveType::try_from(read_u8(&mut self.reader)?)?;
        if pt != PrimitiveType::String {
            return Err(Error::Decode(format!("expected a string value, found {pt:?}")));
        }
        read_length_prefixed_string(&mut self.reader)
    }

    fn read_value_with_code_array(&mut self) -> Result<Vec<PrimitiveValue>> {
        let length = read_i32(&mut self.reader)?;
        if length < 0 {
            return Err(Error::Invariant(format!("negative argument count {length}")));
        }
        let mut values = Vec::with_capacity(length.min(1024) as usize);
        for _ in 0..length {
            values.push(self.read_value_with_code()?);
        }
        Ok(values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn decoder(bytes: &[u8]) -> Decoder<Cursor<Vec<u8>>> {
        Decoder::new(Cursor::new(bytes.to_vec()))
    }

    #[test]
    fn illegal_tag_is_hard_error() {
        let mut dec = decoder(&[42]);
        assert!(matches!(dec.read_value(), Err(Error::InvalidRecordType(42))));
    }

    #[test]
    fn object_string_registers_its_id() {
        // BinaryObjectString, id 4, "hi"
        let mut dec = decoder(&[6, 4, 0, 0, 0, 2, b'h', b'i']);
        let value = dec.read_value().unwrap();
        assert_eq!(
            value,
            RemotingValue::String(ObjectString { object_id: 4, value: "hi".into() })
        );
        assert!(dec.context().contains(4));
    }

    #[test]
    fn duplicate_object_id_rejected() {
        let mut bytes = vec![6, 4, 0, 0, 0, 1, b'a'];
        bytes.extend([6, 4, 0, 0, 0, 1, b'b']);
        let mut dec = decoder(&bytes);
        dec.read_value().unwrap();
        assert!(matches!(dec.read_value(), Err(Error::Invariant(_))));
    }

    #[test]
    fn class_with_id_requires_prior_metadata() {
        // ClassWithId, object 2, metadata 9 (never emitted)
        let mut dec = decoder(&[1, 2, 0, 0, 0, 9, 0, 0, 0]);
        assert!(matches!(dec.read_value(), Err(Error::Invariant(_))));
    }

    #[test]
    fn null_runs_expand_and_clip() {
        // ArraySingleObject, id 1, length 3, then a 256-form run of 5.
        let mut dec = decoder(&[16, 1, 0, 0, 0, 3, 0, 0, 0, 13, 5]);
        let value = dec.read_value().unwrap();
        let RemotingValue::Array(array) = value else { panic!("expected array") };
        assert_eq!(array.elements.len(), 3);
        assert!(array.elements.iter().all(|e| e.is_null()));
    }

    #[test]
    fn zero_length_null_run_rejected() {
        let mut dec = decoder(&[16, 1, 0, 0, 0, 2, 0, 0, 0, 13, 0]);
        assert!(matches!(dec.read_value(), Err(Error::Invariant(_))));
    }

    #[test]
    fn primitive_array_elements_are_untyped() {
        // ArraySinglePrimitive, id 1, length 2, Int32: 7, 9
        let mut dec = decoder(&[15, 1, 0, 0, 0, 2, 0, 0, 0, 8, 7, 0, 0, 0, 9, 0, 0, 0]);
        let RemotingValue::Array(array) = dec.read_value().unwrap() else { panic!() };
        assert_eq!(
            array.elements,
            vec![
                RemotingValue::Primitive(PrimitiveValue::Int32(7)),
                RemotingValue::Primitive(PrimitiveValue::Int32(9)),
            ]
        );
    }

    #[test]
    fn primitive_array_of_strings_rejected() {
        let mut dec = decoder(&[15, 1, 0, 0, 0, 0, 0, 0, 0, 18]);
        assert!(matches!(dec.read_value(), Err(Error::Invariant(_))));
    }

    #[test]
    fn class_member_refers_to_unknown_library() {
        // ClassWithMembers: id 1, name "C", 0 members, library 3 (unknown)
        let mut dec = decoder(&[3, 1, 0, 0, 0, 1, b'C', 0, 0, 0, 0, 3, 0, 0, 0]);
        assert!(matches!(dec.read_value(), Err(Error::Invariant(_))));
    }

    #[test]
    fn version_mismatch_rejected() {
        let mut bytes = vec![0];
        bytes.extend(0i32.to_le_bytes());
        bytes.extend(0i32.to_le_bytes());
        bytes.extend(2i32.to_le_bytes());
        bytes.extend(0i32.to_le_bytes());
        let mut dec = decoder(&bytes);
        assert!(dec.read_serialization_header().is_err());
    }
}
