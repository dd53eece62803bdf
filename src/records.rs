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

use crate::error::{Error, Result};
use crate::primitives::DateTime;
use bitflags::bitflags;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecordType {
    SerializedStreamHeader = 0,
    ClassWithId = 1,
    SystemClassWithMembers = 2,
    ClassWithMembers = 3,
    SystemClassWithMembersAndTypes = 4,
    ClassWithMembersAndTypes = 5,
    BinaryObjectString = 6,
    BinaryArray = 7,
    MemberPrimitiveTyped = 8,
    MemberReference = 9,
    ObjectNull = 10,
    MessageEnd = 11,
    BinaryLibrary = 12,
    ObjectNullMultiple256 = 13,
    ObjectNullMultiple = 14,
    ArraySinglePrimitive = 15,
    ArraySingleObject = 16,
    ArraySingleString = 17,
    BinaryMethodCall = 21,
    BinaryMethodReturn = 22,
}

impl TryFrom<u8> for RecordType {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(RecordType::SerializedStreamHeader),
            1 => Ok(RecordType::ClassWithId),
            2 => Ok(RecordType::SystemClassWithMembers),
            3 => Ok(RecordType::ClassWithMembers),
            4 => Ok(RecordType::SystemClassWithMembersAndTypes),
            5 => Ok(RecordType::ClassWithMembersAndTypes),
            6 => Ok(RecordType::BinaryObjectString),
            7 => Ok(RecordType::BinaryArray),
            8 => Ok(RecordType::MemberPrimitiveTyped),
            9 => Ok(RecordType::MemberReference),
            10 => Ok(RecordType::ObjectNull),
            11 => Ok(RecordType::MessageEnd),
            12 => Ok(RecordType::BinaryLibrary),
            13 => Ok(RecordType::ObjectNullMultiple256),
            14 => Ok(RecordType::ObjectNullMultiple),
            15 => Ok(RecordType::ArraySinglePrimitive),
            16 => Ok(RecordType::ArraySingleObject),
            17 => Ok(RecordType::ArraySingleString),
            21 => Ok(RecordType::BinaryMethodCall),
            22 => Ok(RecordType::BinaryMethodReturn),
            _ => Err(Error::InvalidRecordType(value)),
        }
    }
}

impl RecordType {
    /// Records that carry an object id and may be the target of a
    /// `MemberReference` later in the stream.
    pub fn is_referenceable(self) -> bool {
        matches!(
            self,
            RecordType::ClassWithId
                | RecordType::SystemClassWithMembers
                | RecordType::ClassWithMembers
                | RecordType::SystemClassWithMembersAndTypes
                | RecordType::ClassWithMembersAndTypes
                | RecordType::BinaryObjectString
                | RecordType::BinaryArray
                | RecordType::ArraySinglePrimitive
                | RecordType::ArraySingleObject
                | RecordType::ArraySingleString
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinaryType {
    Primitive = 0,
    String = 1,
    Object = 2,
    SystemClass = 3,
    Class = 4,
    ObjectArray = 5,
    StringArray = 6,
    PrimitiveArray = 7,
}

impl TryFrom<u8> for BinaryType {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(BinaryType::Primitive),
            1 => Ok(BinaryType::String),
            2 => Ok(BinaryType::Object),
            3 => Ok(BinaryType::SystemClass),
            4 => Ok(BinaryType::Class),
            5 => Ok(BinaryType::ObjectArray),
            6 => Ok(BinaryType::StringArray),
            7 => Ok(BinaryType::PrimitiveArray),
            _ => Err(Error::InvalidBinaryType(value)),
        }
    }
}

/// Value 4 is the reserved "Unused" slot and value 0 does not exist;
/// both decode to an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PrimitiveType {
    Boolean = 1,
    Byte = 2,
    Char = 3,
    Decimal = 5,
    Double = 6,
    Int16 = 7,
    Int32 = 8,
    Int64 = 9,
    SByte = 10,
    Single = 11,
    TimeSpan = 12,
    DateTime = 13,
    UInt16 = 14,
    UInt32 = 15,
    UInt64 = 16,
    Null = 17,
    String = 18,
}

impl TryFrom<u8> for PrimitiveType {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            1 => Ok(PrimitiveType::Boolean),
            2 => Ok(PrimitiveType::Byte),
            3 => Ok(PrimitiveType::Char),
            5 => Ok(PrimitiveType::Decimal),
            6 => Ok(PrimitiveType::Double),
            7 => Ok(PrimitiveType::Int16),
            8 => Ok(PrimitiveType::Int32),
            9 => Ok(PrimitiveType::Int64),
            10 => Ok(PrimitiveType::SByte),
            11 => Ok(PrimitiveType::Single),
            12 => Ok(PrimitiveType::TimeSpan),
            13 => Ok(PrimitiveType::DateTime),
            14 => Ok(PrimitiveType::UInt16),
            15 => Ok(PrimitiveType::UInt32),
            16 => Ok(PrimitiveType::UInt64),
            17 => Ok(PrimitiveType::Null),
            18 => Ok(PrimitiveType::String),
            _ => Err(Error::InvalidPrimitiveType(value)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinaryArrayType {
    Single = 0,
    Jagged = 1,
    Rectangular = 2,
    SingleOffset = 3,
    JaggedOffset = 4,
    RectangularOffset = 5,
}

impl TryFrom<u8> for BinaryArrayType {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(BinaryArrayType::Single),
            1 => Ok(BinaryArrayType::Jagged),
            2 => Ok(BinaryArrayType::Rectangular),
            3 => Ok(BinaryArrayType::SingleOffset),
            4 => Ok(BinaryArrayType::JaggedOffset),
            5 => Ok(BinaryArrayType::RectangularOffset),
            _ => Err(Error::InvalidBinaryArrayType(value)),
        }
    }
}

impl BinaryArrayType {
    pub fn has_lower_bounds(self) -> bool {
        matches!(
            self,
            BinaryArrayType::SingleOffset
                | BinaryArrayType::JaggedOffset
                | BinaryArrayType::RectangularOffset
        )
    }
}

/// A primitive value as it appears on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PrimitiveValue {
    Boolean(bool),
    Byte(u8),
    Char(char),
    Decimal(String),
    Double(f64),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    SByte(i8),
    Single(f32),
    TimeSpan(i64),
    DateTime(DateTime),
    UInt16(u16),
    UInt32(u32),
    UInt64(u64),
    String(String),
    Null,
}

impl PrimitiveValue {
    pub fn kind(&self) -> PrimitiveType {
        match self {
            PrimitiveValue::Boolean(_) => PrimitiveType::Boolean,
            PrimitiveValue::Byte(_) => PrimitiveType::Byte,
            PrimitiveValue::Char(_) => PrimitiveType::Char,
            PrimitiveValue::Decimal(_) => PrimitiveType::Decimal,
            PrimitiveValue::Double(_) => PrimitiveType::Double,
            PrimitiveValue::Int16(_) => PrimitiveType::Int16,
            PrimitiveValue::Int32(_) => PrimitiveType::Int32,
            PrimitiveValue::Int64(_) => PrimitiveType::Int64,
            PrimitiveValue::SByte(_) => PrimitiveType::SByte,
            PrimitiveValue::Single(_) => PrimitiveType::Single,
            PrimitiveValue::TimeSpan(_) => PrimitiveType::TimeSpan,
            PrimitiveValue::DateTime(_) => PrimitiveType::DateTime,
            PrimitiveValue::UInt16(_) => PrimitiveType::UInt16,
            PrimitiveValue::UInt32(_) => PrimitiveType::UInt32,
            PrimitiveValue::UInt64(_) => PrimitiveType::UInt64,
            PrimitiveValue::String(_) => PrimitiveType::String,
            PrimitiveValue::Null => PrimitiveType::Null,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SerializationHeader {
    pub root_id: i32,
    pub header_id: i32,
    pub major_version: i32,
    pub minor_version: i32,
}

impl SerializationHeader {
    /// Header for a message whose call array (when present) got `root_id`.
    pub fn for_call_array(root_id: Option<i32>) -> Self {
        Self {
            root_id: root_id.unwrap_or(0),
            header_id: if root_id.is_some() { -1 } else { 0 },
            major_version: 1,
            minor_version: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BinaryLibrary {
    pub library_id: i32,
    pub library_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassInfo {
    /// 0 means "not yet assigned"; the encoder allocates one on emission.
    pub object_id: i32,
    pub name: String,
    pub member_count: i32,
    pub member_names: Vec<String>,
}

impl ClassInfo {
    pub fn new(name: impl Into<String>, member_names: Vec<String>) -> Self {
        Self {
            object_id: 0,
            name: name.into(),
            member_count: member_names.len() as i32,
            member_names,
        }
    }
}

/// A boxed string instance (BinaryObjectString on the wire).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectString {
    /// 0 means "not yet assigned"; the encoder allocates one on emission.
    pub object_id: i32,
    pub value: String,
}

impl ObjectString {
    pub fn new(value: impl Into<String>) -> Self {
        Self { object_id: 0, value: value.into() }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassTypeInfo {
    pub type_name: String,
    pub library_id: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AdditionalTypeInfo {
    Primitive(PrimitiveType),
    SystemClass(String),
    Class(ClassTypeInfo),
    None,
}

/// Per-member type table. Indices align with `ClassInfo::member_names`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MemberTypeInfo {
    pub binary_types: Vec<BinaryType>,
    pub additional_infos: Vec<AdditionalTypeInfo>,
}

/// The five class record forms. `WithId` is a compact back-reference to
/// metadata emitted earlier in the same stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ClassRecord {
    WithId {
        object_id: i32,
        metadata_id: i32,
    },
    SystemWithMembers {
        class_info: ClassInfo,
    },
    WithMembers {
        class_info: ClassInfo,
        library_id: i32,
    },
    SystemWithMembersAndTypes {
        class_info: ClassInfo,
        member_type_info: MemberTypeInfo,
    },
    WithMembersAndTypes {
        class_info: ClassInfo,
        member_type_info: MemberTypeInfo,
        library_id: i32,
    },
}

impl ClassRecord {
    pub fn object_id(&self) -> i32 {
        match self {
            ClassRecord::WithId { object_id, .. } => *object_id,
            ClassRecord::SystemWithMembers { class_info }
            | ClassRecord::WithMembers { class_info, .. }
            | ClassRecord::SystemWithMembersAndTypes { class_info, .. }
            | ClassRecord::WithMembersAndTypes { class_info, .. } => class_info.object_id,
        }
    }

    pub fn set_object_id(&mut self, id: i32) {
        match self {
            ClassRecord::WithId { object_id, .. } => *object_id = id,
            ClassRecord::SystemWithMembers { class_info }
            | ClassRecord::WithMembers { class_info, .. }
            | ClassRecord::SystemWithMembersAndTypes { class_info, .. }
            | ClassRecord::WithMembersAndTypes { class_info, .. } => class_info.object_id = id,
        }
    }

    pub fn class_info(&self) -> Option<&ClassInfo> {
        match self {
            ClassRecord::WithId { .. } => None,
            ClassRecord::SystemWithMembers { class_info }
            | ClassRecord::WithMembers { class_info, .. }
            | ClassRecord::SystemWithMembersAndTypes { class_info, .. }
            | ClassRecord::WithMembersAndTypes { class_info, .. } => Some(class_info),
        }
    }

    pub fn member_type_info(&self) -> Option<&MemberTypeInfo> {
        match self {
            ClassRecord::SystemWithMembersAndTypes { member_type_info, .. }
            | ClassRecord::WithMembersAndTypes { member_type_info, .. } => Some(member_type_info),
            _ => None,
        }
    }

    pub fn library_id(&self) -> Option<i32> {
        match self {
            ClassRecord::WithMembers { library_id, .. }
            | ClassRecord::WithMembersAndTypes { library_id, .. } => Some(*library_id),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArrayInfo {
    /// 0 means "not yet assigned"; the encoder allocates one on emission.
    pub object_id: i32,
    pub length: i32,
}

impl ArrayInfo {
    pub fn new(length: i32) -> Self {
        Self { object_id: 0, length }
    }
}

/// General (rank/offset) array header.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BinaryArrayRecord {
    pub object_id: i32,
    pub array_type: BinaryArrayType,
    pub rank: i32,
    pub lengths: Vec<i32>,
    pub lower_bounds: Option<Vec<i32>>,
    pub item_type: BinaryType,
    pub additional_info: AdditionalTypeInfo,
}

impl BinaryArrayRecord {
    /// Total element count across all dimensions. Saturates instead of
    /// overflowing; the codec rejects anything past i32::MAX anyway.
    pub fn flat_length(&self) -> i64 {
        self.lengths.iter().fold(1i64, |acc, &l| acc.saturating_mul(l as i64))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ArrayRecord {
    SingleObject {
        array_info: ArrayInfo,
    },
    SinglePrimitive {
        array_info: ArrayInfo,
        primitive_type: PrimitiveType,
    },
    SingleString {
        array_info: ArrayInfo,
    },
    Binary(BinaryArrayRecord),
}

impl ArrayRecord {
    pub fn object_id(&self) -> i32 {
        match self {
            ArrayRecord::SingleObject { array_info }
            | ArrayRecord::SinglePrimitive { array_info, .. }
            | ArrayRecord::SingleString { array_info } => array_info.object_id,
            ArrayRecord::Binary(rec) => rec.object_id,
        }
    }

    pub fn set_object_id(&mut self, id: i32) {
        match self {
            ArrayRecord::SingleObject { array_info }
            | ArrayRecord::SinglePrimitive { array_info, .. }
            | ArrayRecord::SingleString { array_info } => array_info.object_id = id,
            ArrayRecord::Binary(rec) => rec.object_id = id,
        }
    }

    pub fn flat_length(&self) -> i64 {
        match self {
            ArrayRecord::SingleObject { array_info }
            | ArrayRecord::SinglePrimitive { array_info, .. }
            | ArrayRecord::SingleString { array_info } => array_info.length as i64,
            ArrayRecord::Binary(rec) => rec.flat_length(),
        }
    }
}

bitflags! {
    /// The 32-bit MessageFlags bitmap carried by method call and return
    /// records. The upper half and bit 14 are reserved.
    pub struct MessageFlags: u32 {
        const NO_ARGS = 0x0000_0001;
        const ARGS_INLINE = 0x0000_0002;
        const ARGS_IS_ARRAY = 0x0000_0004;
        const ARGS_IN_ARRAY = 0x0000_0008;
        const NO_CONTEXT = 0x0000_0010;
        const CONTEXT_INLINE = 0x0000_0020;
        const CONTEXT_IN_ARRAY = 0x0000_0040;
        const METHOD_SIGNATURE_IN_ARRAY = 0x0000_0080;
        const PROPERTIES_IN_ARRAY = 0x0000_0100;
        const NO_RETURN_VALUE = 0x0000_0200;
        const RETURN_VALUE_VOID = 0x0000_0400;
        const RETURN_VALUE_INLINE = 0x0000_0800;
        const RETURN_VALUE_IN_ARRAY = 0x0000_1000;
        const EXCEPTION_IN_ARRAY = 0x0000_2000;
        const GENERIC_METHOD = 0x0000_8000;
    }
}

const ARGS_GROUP: MessageFlags = MessageFlags::from_bits_truncate(
    MessageFlags::NO_ARGS.bits()
        | MessageFlags::ARGS_INLINE.bits()
        | MessageFlags::ARGS_IS_ARRAY.bits()
        | MessageFlags::ARGS_IN_ARRAY.bits(),
);
const CONTEXT_GROUP: MessageFlags = MessageFlags::from_bits_truncate(
    MessageFlags::NO_CONTEXT.bits()
        | MessageFlags::CONTEXT_INLINE.bits()
        | MessageFlags::CONTEXT_IN_ARRAY.bits(),
);
const RETURN_GROUP: MessageFlags = MessageFlags::from_bits_truncate(
    MessageFlags::NO_RETURN_VALUE.bits()
        | MessageFlags::RETURN_VALUE_VOID.bits()
        | MessageFlags::RETURN_VALUE_INLINE.bits()
        | MessageFlags::RETURN_VALUE_IN_ARRAY.bits(),
);
const IN_ARRAY_GROUP: MessageFlags = MessageFlags::from_bits_truncate(
    MessageFlags::ARGS_IN_ARRAY.bits()
        | MessageFlags::CONTEXT_IN_ARRAY.bits()
        | MessageFlags::METHOD_SIGNATURE_IN_ARRAY.bits()
        | MessageFlags::PROPERTIES_IN_ARRAY.bits()
        | MessageFlags::RETURN_VALUE_IN_ARRAY.bits()
        | MessageFlags::EXCEPTION_IN_ARRAY.bits(),
);
// The disjointness rules name Args*/Return* — the flags that say args or a
// return value ARE present somewhere. NoArgs/NoReturnValue state absence
// and combine freely with ExceptionInArray (the canonical exception reply
// is NoArgs | NoContext | NoReturnValue | ExceptionInArray).
const ARGS_PRESENT: MessageFlags = MessageFlags::from_bits_truncate(
    MessageFlags::ARGS_INLINE.bits()
        | MessageFlags::ARGS_IS_ARRAY.bits()
        | MessageFlags::ARGS_IN_ARRAY.bits(),
);
const RETURN_PRESENT: MessageFlags = MessageFlags::from_bits_truncate(
    MessageFlags::RETURN_VALUE_VOID.bits()
        | MessageFlags::RETURN_VALUE_INLINE.bits()
        | MessageFlags::RETURN_VALUE_IN_ARRAY.bits(),
);

impl MessageFlags {
    pub fn from_raw(raw: u32) -> Result<Self> {
        MessageFlags::from_bits(raw).ok_or(Error::InvalidFlags(raw))
    }

    /// Enforces the exclusivity rules on both read and write.
    pub fn validate(self, is_return: bool) -> Result<()> {
        let exclusive = [ARGS_GROUP, CONTEXT_GROUP, RETURN_GROUP];
        for group in exclusive {
            if (self & group).bits().count_ones() > 1 {
                return Err(Error::InvalidFlags(self.bits()));
            }
        }
        if self.contains(MessageFlags::EXCEPTION_IN_ARRAY)
            && (self.intersects(ARGS_PRESENT) || self.intersects(RETURN_PRESENT))
        {
            return Err(Error::InvalidFlags(self.bits()));
        }
        if self.contains(MessageFlags::METHOD_SIGNATURE_IN_ARRAY) && self.intersects(RETURN_PRESENT)
        {
            return Err(Error::InvalidFlags(self.bits()));
        }
        if self.contains(MessageFlags::METHOD_SIGNATURE_IN_ARRAY)
            && self.contains(MessageFlags::EXCEPTION_IN_ARRAY)
        {
            return Err(Error::InvalidFlags(self.bits()));
        }
        if is_return
            && self.intersects(MessageFlags::METHOD_SIGNATURE_IN_ARRAY | MessageFlags::GENERIC_METHOD)
        {
            return Err(Error::InvalidFlags(self.bits()));
        }
        Ok(())
    }

    /// True when a single ArraySingleObject record (the call array) must
    /// follow the method record.
    pub fn needs_call_array(self) -> bool {
        self.intersects(IN_ARRAY_GROUP)
    }
}

impl Serialize for MessageFlags {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_u32(self.bits())
    }
}

impl<'de> Deserialize<'de> for MessageFlags {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let bits = u32::deserialize(deserializer)?;
        MessageFlags::from_bits(bits)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid message flags {bits:#010x}")))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BinaryMethodCall {
    pub flags: MessageFlags,
    pub method_name: String,
    pub type_name: String,
    /// Present iff `CONTEXT_INLINE` is set.
    pub call_context: Option<String>,
    /// Present iff `ARGS_INLINE` is set.
    pub args: Option<Vec<PrimitiveValue>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BinaryMethodReturn {
    pub flags: MessageFlags,
    /// Present iff `RETURN_VALUE_INLINE` is set.
    pub return_value: Option<PrimitiveValue>,
    /// Present iff `CONTEXT_INLINE` is set.
    pub call_context: Option<String>,
    /// Present iff `ARGS_INLINE` is set.
    pub args: Option<Vec<PrimitiveValue>>,
    /// Present iff `EXCEPTION_IN_ARRAY` is set. On the wire the exception
    /// travels as the sole element of the call array, not in this record.
    pub exception: Option<PrimitiveValue>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_type_rejects_gaps() {
        for bad in [18u8, 19, 20, 23, 0xFF] {
            assert!(RecordType::try_from(bad).is_err());
        }
        assert_eq!(RecordType::try_from(21).unwrap(), RecordType::BinaryMethodCall);
    }

    #[test]
    fn primitive_type_rejects_unused_slot() {
        assert!(PrimitiveType::try_from(4).is_err());
        assert!(PrimitiveType::try_from(0).is_err());
    }

    #[test]
    fn flags_exclusivity() {
        let ok = MessageFlags::NO_ARGS | MessageFlags::NO_CONTEXT;
        ok.validate(false).unwrap();

        let two_args = MessageFlags::NO_ARGS | MessageFlags::ARGS_INLINE;
        assert!(two_args.validate(false).is_err());

        let two_returns = MessageFlags::RETURN_VALUE_VOID | MessageFlags::RETURN_VALUE_INLINE;
        assert!(two_returns.validate(true).is_err());
    }

    #[test]
    fn exception_excludes_present_args_and_return() {
        // The canonical exception reply: absence flags combine freely.
        (MessageFlags::NO_ARGS
            | MessageFlags::NO_CONTEXT
            | MessageFlags::NO_RETURN_VALUE
            | MessageFlags::EXCEPTION_IN_ARRAY)
            .validate(true)
            .unwrap();

        let bad = MessageFlags::EXCEPTION_IN_ARRAY | MessageFlags::ARGS_INLINE;
        assert!(bad.validate(true).is_err());
        let bad = MessageFlags::EXCEPTION_IN_ARRAY | MessageFlags::RETURN_VALUE_VOID;
        assert!(bad.validate(true).is_err());
        let bad = MessageFlags::EXCEPTION_IN_ARRAY | MessageFlags::RETURN_VALUE_INLINE;
        assert!(bad.validate(true).is_err());
    }

    #[test]
    fn signature_and_generic_disallowed_on_return() {
        let sig = MessageFlags::METHOD_SIGNATURE_IN_ARRAY | MessageFlags::NO_ARGS;
        sig.validate(false).unwrap();
        assert!(sig.validate(true).is_err());
        let generic = MessageFlags::GENERIC_METHOD | MessageFlags::NO_ARGS | MessageFlags::NO_CONTEXT;
        generic.validate(false).unwrap();
        assert!(generic.validate(true).is_err());
    }

    #[test]
    fn reserved_bits_rejected() {
        assert!(MessageFlags::from_raw(0x0000_4000).is_err());
        assert!(MessageFlags::from_raw(0x0001_0000).is_err());
        assert_eq!(MessageFlags::from_raw(0x11).unwrap(), MessageFlags::NO_ARGS | MessageFlags::NO_CONTEXT);
    }

    #[test]
    fn call_array_trigger() {
        assert!((MessageFlags::ARGS_IN_ARRAY | MessageFlags::NO_CONTEXT).needs_call_array());
        assert!(!(MessageFlags::NO_ARGS | MessageFlags::NO_CONTEXT).needs_call_array());
    }

    #[test]
    fn header_ids_follow_call_array_presence() {
        let with = SerializationHeader::for_call_array(Some(1));
        assert_eq!((with.root_id, with.header_id), (1, -1));
        let without = SerializationHeader::for_call_array(None);
        assert_eq!((without.root_id, without.header_id), (0, 0));
    }
}
