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

use crate::context::{Emission, SerializationContext};
use crate::error::{Error, Result};
use crate::primitives::*;
use crate::records::*;
use crate::value::{derive_member_type_info, ArrayValue, ClassValue, RemotingValue};
use std::io::Write;

/// An encoder for MS-NRBF binary streams.
///
/// One encoder instance writes one message; its serialization context
/// assigns object ids and collapses repeated emissions of the same id
/// into member references.
pub struct Encoder<W: Write> {
    writer: W,
    pub(crate) ctx: SerializationContext,
}

impl<W: Write> Encoder<W> {
    /// Creates a new encoder from a writer.
    pub fn new(writer: W) -> Self {
        Self { writer, ctx: SerializationContext::new() }
    }

    pub fn context(&self) -> &SerializationContext {
        &self.ctx
    }

    pub(crate) fn write_serialization_header(&mut self, header: &SerializationHeader) -> Result<()> {
        if header.major_version != 1 || header.minor_version != 0 {
            return Err(Error::Invariant(format!(
                "unsupported stream version {}.{}",
                header.major_version, header.minor_version
            )));
        }
        write_u8(&mut self.writer, RecordType::SerializedStreamHeader as u8)?;
        write_i32(&mut self.writer, header.root_id)?;
        write_i32(&mut self.writer, header.header_id)?;
        write_i32(&mut self.writer, header.major_version)?;
        write_i32(&mut self.writer, header.minor_version)?;
        Ok(())
    }

    pub(crate) fn write_binary_library(&mut self, library: &BinaryLibrary) -> Result<()> {
        self.ctx.register_library(library.library_id, &library.library_name)?;
        write_u8(&mut self.writer, RecordType::BinaryLibrary as u8)?;
        write_i32(&mut self.writer, library.library_id)?;
        write_length_prefixed_string(&mut self.writer, &library.library_name)?;
        Ok(())
    }

    pub(crate) fn write_message_end(&mut self) -> Result<()> {
        write_u8(&mut self.writer, RecordType::MessageEnd as u8)
    }

    /// Writes one value at an untyped position: primitives get a
    /// MemberPrimitiveTyped wrapper, strings a BinaryObjectString record,
    /// already-emitted ids a member reference.
    pub fn write_value(&mut self, value: &RemotingValue) -> Result<()> {
        match value {
            RemotingValue::Null | RemotingValue::Primitive(PrimitiveValue::Null) => {
                write_u8(&mut self.writer, RecordType::ObjectNull as u8)
            }
            RemotingValue::Primitive(p) => {
                write_u8(&mut self.writer, RecordType::MemberPrimitiveTyped as u8)?;
                write_u8(&mut self.writer, p.kind() as u8)?;
                self.write_primitive(p)
            }
            RemotingValue::String(s) => match self.ctx.emit_object(s.object_id)? {
                Emission::Back(id) => self.write_member_reference(id),
                Emission::Fresh(id) => {
                    write_u8(&mut self.writer, RecordType::BinaryObjectString as u8)?;
                    write_i32(&mut self.writer, id)?;
                    write_length_prefixed_string(&mut self.writer, &s.value)
                }
            },
            RemotingValue::Reference(id) => {
                if *id <= 0 {
                    return Err(Error::Invariant(format!("member reference id {id} must be positive")));
                }
                self.write_member_reference(*id)
            }
            RemotingValue::Class(class) => self.write_class(class),
            RemotingValue::Array(array) => self.write_array(array),
        }
    }

    fn write_member_reference(&mut self, id: i32) -> Result<()> {
        write_u8(&mut self.writer, RecordType::MemberReference as u8)?;
        write_i32(&mut self.writer, id)
    }

    /// Writes one primitive, without a type tag.
    pub(crate) fn write_primitive(&mut self, value: &PrimitiveValue) -> Result<()> {
        let w = &mut self.writer;
        match value {
            PrimitiveValue::Boolean(v) => write_u8(w, u8::from(*v)),
            PrimitiveValue::Byte(v) => write_u8(w, *v),
            PrimitiveValue::Char(v) => write_char(w, *v),
            PrimitiveValue::Decimal(v) => write_decimal(w, v),
            PrimitiveValue::Double(v) => write_f64(w, *v),
            PrimitiveValue::Int16(v) => write_i16(w, *v),
            PrimitiveValue::Int32(v) => write_i32(w, *v),
            PrimitiveValue::Int64(v) => write_i64(w, *v),
            PrimitiveValue::SByte(v) => write_i8(w, *v),
            PrimitiveValue::Single(v) => write_f32(w, *v),
            PrimitiveValue::TimeSpan(v) => write_i64(w, *v),
            PrimitiveValue::DateTime(v) => write_datetime(w, *v),
            PrimitiveValue::UInt16(v) => write_u16(w, *v),
            PrimitiveValue::UInt32(v) => write_u32(w, *v),
            PrimitiveValue::UInt64(v) => write_u64(w, *v),
            PrimitiveValue::String(v) => write_length_prefixed_string(w, v),
            // A bare null is carried by the surrounding record form.
            PrimitiveValue::Null => Ok(()),
        }
    }

    fn write_class_info(&mut self, info: &ClassInfo, object_id: i32) -> Result<()> {
        if info.member_count as usize != info.member_names.len() {
            return Err(Error::Invariant(format!(
                "class {} declares {} members but names {}",
                info.name,
                info.member_count,
                info.member_names.len()
            )));
        }
        write_i32(&mut self.writer, object_id)?;
        write_length_prefixed_string(&mut self.writer, &info.name)?;
        write_i32(&mut self.writer, info.member_count)?;
        for name in &info.member_names {
            write_length_prefixed_string(&mut self.writer, name)?;
        }
        Ok(())
    }

    fn write_member_type_info(&mut self, info: &MemberTypeInfo) -> Result<()> {
        for bt in &info.binary_types {
            write_u8(&mut self.writer, *bt as u8)?;
        }
        for (bt, extra) in info.binary_types.iter().zip(&info.additional_infos) {
            match extra {
                AdditionalTypeInfo::Primitive(pt) => {
                    if matches!(pt, PrimitiveType::Null | PrimitiveType::String) {
                        return Err(Error::Invariant(format!(
                            "{pt:?} is not a legal additional info for {bt:?}"
                        )));
                    }
                    write_u8(&mut self.writer, *pt as u8)?;
                }
                AdditionalTypeInfo::SystemClass(name) => {
                    write_length_prefixed_string(&mut self.writer, name)?;
                }
                AdditionalTypeInfo::Class(info) => {
                    write_length_prefixed_string(&mut self.writer, &info.type_name)?;
                    write_i32(&mut self.writer, info.library_id)?;
                }
                AdditionalTypeInfo::None => {}
            }
        }
        Ok(())
    }

    fn write_class(&mut self, class: &ClassValue) -> Result<()> {
        let id = match self.ctx.emit_object(class.record.object_id())? {
            Emission::Back(id) => return self.write_member_reference(id),
            Emission::Fresh(id) => id,
        };

        match &class.record {
            ClassRecord::WithId { metadata_id, .. } => {
                let table = self
                    .ctx
                    .emitted_metadata(*metadata_id)
                    .cloned()
                    .ok_or_else(|| {
                        Error::Invariant(format!("metadata id {metadata_id} was not emitted"))
                    })?;
                write_u8(&mut self.writer, RecordType::ClassWithId as u8)?;
                write_i32(&mut self.writer, id)?;
                write_i32(&mut self.writer, *metadata_id)?;
                self.write_members(&class.members, table.as_ref())
            }
            ClassRecord::SystemWithMembers { class_info } => {
                self.check_member_count(class_info, &class.members)?;
                self.ctx.register_emitted_metadata(id, None);
                write_u8(&mut self.writer, RecordType::SystemClassWithMembers as u8)?;
                self.write_class_info(class_info, id)?;
                self.write_members(&class.members, None)
            }
            ClassRecord::WithMembers { class_info, library_id } => {
                self.check_member_count(class_info, &class.members)?;
                self.ctx.register_emitted_metadata(id, None);
                write_u8(&mut self.writer, RecordType::ClassWithMembers as u8)?;
                self.write_class_info(class_info, id)?;
                write_i32(&mut self.writer, *library_id)?;
                self.write_members(&class.members, None)
            }
            ClassRecord::SystemWithMembersAndTypes { class_info, member_type_info } => {
                self.check_member_count(class_info, &class.members)?;
                let table = self.effective_table(member_type_info, &class.members)?;
                self.ctx.register_emitted_metadata(id, Some(table.clone()));
                write_u8(&mut self.writer, RecordType::SystemClassWithMembersAndTypes as u8)?;
                self.write_class_info(class_info, id)?;
                self.write_member_type_info(&table)?;
                self.write_members(&class.members, Some(&table))
            }
            ClassRecord::WithMembersAndTypes { class_info, member_type_info, library_id } => {
                self.check_member_count(class_info, &class.members)?;
                let table = self.effective_table(member_type_info, &class.members)?;
                self.ctx.register_emitted_metadata(id, Some(table.clone()));
                write_u8(&mut self.writer, RecordType::ClassWithMembersAndTypes as u8)?;
                self.write_class_info(class_info, id)?;
                self.write_member_type_info(&table)?;
                write_i32(&mut self.writer, *library_id)?;
                self.write_members(&class.members, Some(&table))
            }
        }
    }

    fn check_member_count(&self, info: &ClassInfo, members: &[RemotingValue]) -> Result<()> {
        if info.member_count as usize != members.len() {
            return Err(Error::Invariant(format!(
                "class {} declares {} members, got {}",
                info.name,
                info.member_count,
                members.len()
            )));
        }
        Ok(())
    }

    /// A with-types class constructed without a table gets one derived
    /// from its member values.
    fn effective_table(
        &self,
        supplied: &MemberTypeInfo,
        members: &[RemotingValue],
    ) -> Result<MemberTypeInfo> {
        if supplied.binary_types.is_empty() && !members.is_empty() {
            return derive_member_type_info(members);
        }
        if supplied.binary_types.len() != members.len()
            || supplied.additional_infos.len() != members.len()
        {
            return Err(Error::Invariant(format!(
                "member type table length {} does not match member count {}",
                supplied.binary_types.len(),
                members.len()
            )));
        }
        Ok(supplied.clone())
    }

    fn write_members(
        &mut self,
        members: &[RemotingValue],
        table: Option<&MemberTypeInfo>,
    ) -> Result<()> {
        match table {
            None => {
                for member in members {
                    self.write_value(member)?;
                }
                Ok(())
            }
            Some(table) => {
                if table.binary_types.len() != members.len() {
                    return Err(Error::Invariant(format!(
                        "member type table length {} does not match member count {}",
                        table.binary_types.len(),
                        members.len()
                    )));
                }
                for (member, (bt, info)) in members
                    .iter()
                    .zip(table.binary_types.iter().zip(&table.additional_infos))
                {
                    self.write_typed_member(member, *bt, info)?;
                }
                Ok(())
            }
        }
    }

    /// Mirrors the typed-member read: primitives go untyped, everything
    /// else is a record.
    fn write_typed_member(
        &mut self,
        member: &RemotingValue,
        bt: BinaryType,
        info: &AdditionalTypeInfo,
    ) -> Result<()> {
        match (bt, info) {
            (BinaryType::Primitive, AdditionalTypeInfo::Primitive(pt)) => match member {
                RemotingValue::Primitive(p) if p.kind() == *pt => self.write_primitive(p),
                other => Err(Error::Invariant(format!(
                    "member declared {pt:?} holds {other:?}"
                ))),
            },
            (BinaryType::Primitive, _) => {
                Err(Error::Invariant("primitive member without a primitive kind".into()))
            }
            _ => self.write_value(member),
        }
    }

    fn write_array(&mut self, array: &ArrayValue) -> Result<()> {
        let id = match self.ctx.emit_object(array.record.object_id())? {
            Emission::Back(id) => return self.write_member_reference(id),
            Emission::Fresh(id) => id,
        };
        if array.record.flat_length() != array.elements.len() as i64 {
            return Err(Error::Invariant(format!(
                "array declares {} elements, got {}",
                array.record.flat_length(),
                array.elements.len()
            )));
        }

        match &array.record {
            ArrayRecord::SinglePrimitive { array_info, primitive_type } => {
                if matches!(primitive_type, PrimitiveType::Null | PrimitiveType::String) {
                    return Err(Error::Invariant(format!(
                        "{primitive_type:?} is not a legal primitive array element type"
                    )));
                }
                write_u8(&mut self.writer, RecordType::ArraySinglePrimitive as u8)?;
                write_i32(&mut self.writer, id)?;
                write_i32(&mut self.writer, array_info.length)?;
                write_u8(&mut self.writer, *primitive_type as u8)?;
                for element in &array.elements {
                    match element {
                        RemotingValue::Primitive(p) if p.kind() == *primitive_type => {
                            self.write_primitive(p)?;
                        }
                        other => {
                            return Err(Error::Invariant(format!(
                                "array of {primitive_type:?} holds {other:?}"
                            )));
                        }
                    }
                }
                Ok(())
            }
            ArrayRecord::SingleObject { array_info } => {
                write_u8(&mut self.writer, RecordType::ArraySingleObject as u8)?;
                write_i32(&mut self.writer, id)?;
                write_i32(&mut self.writer, array_info.length)?;
                self.write_elements(&array.elements)
            }
            ArrayRecord::SingleString { array_info } => {
                write_u8(&mut self.writer, RecordType::ArraySingleString as u8)?;
                write_i32(&mut self.writer, id)?;
                write_i32(&mut self.writer, array_info.length)?;
                self.write_elements(&array.elements)
            }
            ArrayRecord::Binary(rec) => {
                if rec.rank < 1 {
                    return Err(Error::Invariant(format!("array rank {} must be at least 1", rec.rank)));
                }
                if rec.lengths.len() != rec.rank as usize {
                    return Err(Error::Invariant(format!(
                        "rank {} array carries {} lengths",
                        rec.rank,
                        rec.lengths.len()
                    )));
                }
                if let Some(bounds) = &rec.lower_bounds {
                    if !rec.array_type.has_lower_bounds() {
                        return Err(Error::Invariant(format!(
                            "{:?} array must not carry lower bounds",
                            rec.array_type
                        )));
                    }
                    if bounds.len() != rec.rank as usize {
                        return Err(Error::Invariant(format!(
                            "rank {} array carries {} lower bounds",
                            rec.rank,
                            bounds.len()
                        )));
                    }
                } else if rec.array_type.has_lower_bounds() {
                    return Err(Error::Invariant(format!(
                        "{:?} array requires lower bounds",
                        rec.array_type
                    )));
                }
                write_u8(&mut self.writer, RecordType::BinaryArray as u8)?;
                write_i32(&mut self.writer, id)?;
                write_u8(&mut self.writer, rec.array_type as u8)?;
                write_i32(&mut self.writer, rec.rank)?;
                for len in &rec.lengths {
                    write_i32(&mut self.writer, *len)?;
                }
                if let Some(bounds) = &rec.lower_bounds {
                    for bound in bounds {
                        write_i32(&mut self.writer, *bound)?;
                    }
                }
                write_u8(&mut self.writer, rec.item_type as u8)?;
                match &rec.additional_info {
                    AdditionalTypeInfo::Primitive(pt) => {
                        if matches!(pt, PrimitiveType::Null | PrimitiveType::String) {
                            return Err(Error::Invariant(format!(
                                "{pt:?} is not a legal additional info for {:?}",
                                rec.item_type
                            )));
                        }
                        write_u8(&mut self.writer, *pt as u8)?;
                    }
                    AdditionalTypeInfo::SystemClass(name) => {
                        write_length_prefixed_string(&mut self.writer, name)?;
                    }
                    AdditionalTypeInfo::Class(info) => {
                        write_length_prefixed_string(&mut self.writer, &info.type_name)?;
                        write_i32(&mut self.writer, info.library_id)?;
                    }
                    AdditionalTypeInfo::None => {}
                }
                match (rec.item_type, &rec.additional_info) {
                    (BinaryType::Primitive, AdditionalTypeInfo::Primitive(pt)) => {
                        let pt = *pt;
                        for element in &array.elements {
                            match element {
                                RemotingValue::Primitive(p) if p.kind() == pt => {
                                    self.write_primitive(p)?;
                                }
                                other => {
                                    return Err(Error::Invariant(format!(
                                        "array of {pt:?} holds {other:?}"
                                    )));
                                }
                            }
                        }
                        Ok(())
                    }
                    (BinaryType::Primitive, _) => {
                        Err(Error::Invariant("primitive array without a primitive kind".into()))
                    }
                    _ => self.write_elements(&array.elements),
                }
            }
        }
    }

    /// Writes array slots, collapsing consecutive nulls: a single null
    /// stays ObjectNull, runs of 2-255 use the 256 form, longer runs the
    /// 32-bit form.
    pub(crate) fn write_elements(&mut self, elements: &[RemotingValue]) -> Result<()> {
        let mut i = 0;
        while i < elements.len() {
            if !elements[i].is_null() {
                self.write_value(&elements[i])?;
                i += 1;
                continue;
            }
            let mut run = 1;
            while i + run < elements.len() && elements[i + run].is_null() {
                run += 1;
            }
            match run {
                1 => write_u8(&mut self.writer, RecordType::ObjectNull as u8)?,
                2..=255 => {
                    write_u8(&mut self.writer, RecordType::ObjectNullMultiple256 as u8)?;
                    write_u8(&mut self.writer, run as u8)?;
                }
                _ => {
                    write_u8(&mut self.writer, RecordType::ObjectNullMultiple as u8)?;
                    write_i32(&mut self.writer, run as i32)?;
                }
            }
            i += run;
        }
        Ok(())
    }

    /// Writes a BinaryMethodCall record. Inline flags must agree with the
    /// optional fields.
    pub(crate) fn write_method_call(&mut self, call: &BinaryMethodCall) -> Result<()> {
        call.flags.validate(false)?;
        check_inline(call.flags, MessageFlags::CONTEXT_INLINE, call.call_context.is_some(), "call context")?;
        check_inline(call.flags, MessageFlags::ARGS_INLINE, call.args.is_some(), "inline args")?;
        write_u8(&mut self.writer, RecordType::BinaryMethodCall as u8)?;
        write_u32(&mut self.writer, call.flags.bits())?;
        self.write_string_with_code(&call.method_name)?;
        self.write_string_with_code(&call.type_name)?;
        if let Some(context) = &call.call_context {
            self.write_string_with_code(context)?;
        }
        if let Some(args) = &call.args {
            self.write_value_with_code_array(args)?;
        }
        Ok(())
    }

    /// Writes a BinaryMethodReturn record.
    pub(crate) fn write_method_return(&mut self, ret: &BinaryMethodReturn) -> Result<()> {
        ret.flags.validate(true)?;
        check_inline(ret.flags, MessageFlags::RETURN_VALUE_INLINE, ret.return_value.is_some(), "return value")?;
        check_inline(ret.flags, MessageFlags::CONTEXT_INLINE, ret.call_context.is_some(), "call context")?;
        check_inline(ret.flags, MessageFlags::ARGS_INLINE, ret.args.is_some(), "inline args")?;
        // The exception itself is not part of this record; it rides in the
        // call array the grammar writer emits next.
        check_inline(ret.flags, MessageFlags::EXCEPTION_IN_ARRAY, ret.exception.is_some(), "exception")?;
        write_u8(&mut self.writer, RecordType::BinaryMethodReturn as u8)?;
        write_u32(&mut self.writer, ret.flags.bits())?;
        if let Some(value) = &ret.return_value {
            self.write_value_with_code(value)?;
        }
        if let Some(context) = &ret.call_context {
            self.write_string_with_code(context)?;
        }
        if let Some(args) = &ret.args {
            self.write_value_with_code_array(args)?;
        }
        Ok(())
    }

    /// Writes the call array that follows a method record. Elements travel
    /// in value-with-code form, so only primitive (and string) values are
    /// representable here. The id must already be reserved through the
    /// context, since the stream header carries it as the root id.
    pub(crate) fn write_call_array(&mut self, id: i32, elements: &[RemotingValue]) -> Result<()> {
        if elements.is_empty() {
            return Err(Error::Invariant("call array must not be empty".into()));
        }
        write_u8(&mut self.writer, RecordType::ArraySingleObject as u8)?;
        write_i32(&mut self.writer, id)?;
        write_i32(&mut self.writer, elements.len() as i32)?;
        for element in elements {
            match element {
                RemotingValue::Primitive(p) => self.write_value_with_code(p)?,
                RemotingValue::Null => self.write_value_with_code(&PrimitiveValue::Null)?,
                RemotingValue::String(s) => {
                    self.write_value_with_code(&PrimitiveValue::String(s.value.clone()))?;
                }
                other => {
                    return Err(Error::Invariant(format!(
                        "call array elements must be primitive, got {other:?}"
                    )));
                }
            }
        }
        Ok(())
    }

    fn write_string_with_code(&mut self, s: &str) -> Result<()> {
        write_u8(&mut self.writer, PrimitiveType::String as u8)?;
        write_length_prefixed_string(&mut self.writer, s)
    }

    fn write_value_with_code(&mut self, value: &PrimitiveValue) -> Result<()> {
        write_u8(&mut self.writer, value.kind() as u8)?;
        self.write_primitive(value)
    }

    fn write_value_with_code_array(&mut self, values: &[PrimitiveValue]) -> Result<()> {
        write_i32(&mut self.writer, values.len() as i32)?;
        for value in values {
            self.write_value_with_code(value)?;
        }
        Ok(())
    }
}

fn check_inline(flags: MessageFlags, flag: MessageFlags, present: bool, what: &str) -> Result<()> {
    if flags.contains(flag) != present {
        return Err(Error::Invariant(format!(
            "{what} presence does not match flags {:#010x}",
            flags.bits()
        )));
    }
    Ok(())
}
