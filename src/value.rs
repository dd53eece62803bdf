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

//! The recursive value model exchanged between the codec and callers.
//!
//! A value graph is acyclic; cycles are expressed with `Reference` nodes
//! that callers resolve against the deserialization context.

use crate::error::{Error, Result};
use crate::records::{
    AdditionalTypeInfo, ArrayInfo, ArrayRecord, BinaryType, ClassInfo, ClassRecord, ClassTypeInfo,
    MemberTypeInfo, ObjectString, PrimitiveType, PrimitiveValue,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RemotingValue {
    Primitive(PrimitiveValue),
    /// A boxed string instance (a BinaryObjectString record on the wire).
    String(ObjectString),
    Null,
    /// Forward or back reference to an object by id.
    Reference(i32),
    Class(ClassValue),
    Array(ArrayValue),
}

/// A class instance together with the record form it will be emitted as.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassValue {
    pub record: ClassRecord,
    pub members: Vec<RemotingValue>,
}

/// An array together with the record form it will be emitted as.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArrayValue {
    pub record: ArrayRecord,
    pub elements: Vec<RemotingValue>,
}

impl RemotingValue {
    pub fn is_null(&self) -> bool {
        matches!(self, RemotingValue::Null | RemotingValue::Primitive(PrimitiveValue::Null))
    }

    pub fn as_primitive(&self) -> Option<&PrimitiveValue> {
        match self {
            RemotingValue::Primitive(p) => Some(p),
            _ => None,
        }
    }
}

impl From<PrimitiveValue> for RemotingValue {
    fn from(p: PrimitiveValue) -> Self {
        RemotingValue::Primitive(p)
    }
}

impl From<bool> for RemotingValue {
    fn from(v: bool) -> Self {
        RemotingValue::Primitive(PrimitiveValue::Boolean(v))
    }
}

impl From<i32> for RemotingValue {
    fn from(v: i32) -> Self {
        RemotingValue::Primitive(PrimitiveValue::Int32(v))
    }
}

impl From<i64> for RemotingValue {
    fn from(v: i64) -> Self {
        RemotingValue::Primitive(PrimitiveValue::Int64(v))
    }
}

impl From<f64> for RemotingValue {
    fn from(v: f64) -> Self {
        RemotingValue::Primitive(PrimitiveValue::Double(v))
    }
}

impl From<&str> for RemotingValue {
    fn from(v: &str) -> Self {
        RemotingValue::String(ObjectString::new(v))
    }
}

impl ClassValue {
    /// Builds a class instance, checking that the member count matches the
    /// record's metadata where the record carries any.
    pub fn new(record: ClassRecord, members: Vec<RemotingValue>) -> Result<Self> {
        if let Some(info) = record.class_info() {
            if info.member_count as usize != members.len() {
                return Err(Error::Invariant(format!(
                    "class {} declares {} members, got {}",
                    info.name,
                    info.member_count,
                    members.len()
                )));
            }
        }
        Ok(Self { record, members })
    }

    /// Builds a `ClassWithMembersAndTypes` (or the system form when
    /// `library_id` is `None`) with the type table derived from the member
    /// values.
    pub fn with_types(
        name: impl Into<String>,
        library_id: Option<i32>,
        members: Vec<(String, RemotingValue)>,
    ) -> Result<Self> {
        let (names, values): (Vec<_>, Vec<_>) = members.into_iter().unzip();
        let class_info = ClassInfo::new(name, names);
        let member_type_info = derive_member_type_info(&values)?;
        let record = match library_id {
            Some(library_id) => ClassRecord::WithMembersAndTypes {
                class_info,
                member_type_info,
                library_id,
            },
            None => ClassRecord::SystemWithMembersAndTypes { class_info, member_type_info },
        };
        Ok(Self { record, members: values })
    }
}

impl ArrayValue {
    pub fn single_object(elements: Vec<RemotingValue>) -> Self {
        Self {
            record: ArrayRecord::SingleObject {
                array_info: ArrayInfo::new(elements.len() as i32),
            },
            elements,
        }
    }

    pub fn single_string(elements: Vec<RemotingValue>) -> Self {
        Self {
            record: ArrayRecord::SingleString {
                array_info: ArrayInfo::new(elements.len() as i32),
            },
            elements,
        }
    }

    /// An `ArraySinglePrimitive`; every element must be a primitive of
    /// `primitive_type`.
    pub fn single_primitive(
        primitive_type: PrimitiveType,
        elements: Vec<PrimitiveValue>,
    ) -> Result<Self> {
        if matches!(primitive_type, PrimitiveType::Null | PrimitiveType::String) {
            return Err(Error::Invariant(format!(
                "{primitive_type:?} is not a legal primitive array element type"
            )));
        }
        if let Some(bad) = elements.iter().find(|e| e.kind() != primitive_type) {
            return Err(Error::Invariant(format!(
                "array of {primitive_type:?} holds a {:?}",
                bad.kind()
            )));
        }
        Ok(Self {
            record: ArrayRecord::SinglePrimitive {
                array_info: ArrayInfo::new(elements.len() as i32),
                primitive_type,
            },
            elements: elements.into_iter().map(RemotingValue::Primitive).collect(),
        })
    }
}

/// Derives the per-member type table from member value kinds, for class
/// values constructed without one.
pub fn derive_member_type_info(members: &[RemotingValue]) -> Result<MemberTypeInfo> {
    let mut binary_types = Vec::with_capacity(members.len());
    let mut additional_infos = Vec::with_capacity(members.len());
    for member in members {
        let (bt, info) = derive_one(member)?;
        binary_types.push(bt);
        additional_infos.push(info);
    }
    Ok(MemberTypeInfo { binary_types, additional_infos })
}

fn derive_one(member: &RemotingValue) -> Result<(BinaryType, AdditionalTypeInfo)> {
    match member {
        RemotingValue::Primitive(PrimitiveValue::Null) | RemotingValue::Null => {
            Ok((BinaryType::Object, AdditionalTypeInfo::None))
        }
        RemotingValue::Primitive(PrimitiveValue::String(_)) | RemotingValue::String(_) => {
            Ok((BinaryType::String, AdditionalTypeInfo::None))
        }
        RemotingValue::Primitive(p) => {
            Ok((BinaryType::Primitive, AdditionalTypeInfo::Primitive(p.kind())))
        }
        RemotingValue::Reference(_) => Ok((BinaryType::Object, AdditionalTypeInfo::None)),
        RemotingValue::Class(class) => match &class.record {
            ClassRecord::WithId { metadata_id, .. } => Err(Error::Invariant(format!(
                "cannot derive member type info from a with-id class (metadata id {metadata_id}); \
                 supply the type table explicitly"
            ))),
            ClassRecord::SystemWithMembers { class_info }
            | ClassRecord::SystemWithMembersAndTypes { class_info, .. } => Ok((
                BinaryType::SystemClass,
                AdditionalTypeInfo::SystemClass(class_info.name.clone()),
            )),
            ClassRecord::WithMembers { class_info, library_id }
            | ClassRecord::WithMembersAndTypes { class_info, library_id, .. } => Ok((
                BinaryType::Class,
                AdditionalTypeInfo::Class(ClassTypeInfo {
                    type_name: class_info.name.clone(),
                    library_id: *library_id,
                }),
            )),
        },
        RemotingValue::Array(array) => match &array.record {
            ArrayRecord::SinglePrimitive { primitive_type, .. } => Ok((
                BinaryType::PrimitiveArray,
                AdditionalTypeInfo::Primitive(*primitive_type),
            )),
            ArrayRecord::SingleString { .. } => {
                Ok((BinaryType::StringArray, AdditionalTypeInfo::None))
            }
            ArrayRecord::SingleObject { .. } => {
                Ok((BinaryType::ObjectArray, AdditionalTypeInfo::None))
            }
            ArrayRecord::Binary(rec) => match rec.item_type {
                BinaryType::Primitive => Ok((
                    BinaryType::PrimitiveArray,
                    match &rec.additional_info {
                        AdditionalTypeInfo::Primitive(pt) => AdditionalTypeInfo::Primitive(*pt),
                        other => other.clone(),
                    },
                )),
                BinaryType::String => Ok((BinaryType::StringArray, AdditionalTypeInfo::None)),
                _ => Ok((BinaryType::ObjectArray, AdditionalTypeInfo::None)),
            },
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derive_from_mixed_members() {
        let members = vec![
            RemotingValue::from(42),
            RemotingValue::from("hello"),
            RemotingValue::Null,
            RemotingValue::Reference(3),
        ];
        let mti = derive_member_type_info(&members).unwrap();
        assert_eq!(
            mti.binary_types,
            vec![BinaryType::Primitive, BinaryType::String, BinaryType::Object, BinaryType::Object]
        );
        assert_eq!(mti.additional_infos[0], AdditionalTypeInfo::Primitive(PrimitiveType::Int32));
        assert_eq!(mti.additional_infos[1], AdditionalTypeInfo::None);
    }

    #[test]
    fn derive_from_nested_class_member() {
        let inner = ClassValue::with_types(
            "Point",
            Some(2),
            vec![("x".into(), 1.into()), ("y".into(), 2.into())],
        )
        .unwrap();
        let mti = derive_member_type_info(&[RemotingValue::Class(inner)]).unwrap();
        assert_eq!(mti.binary_types, vec![BinaryType::Class]);
        assert_eq!(
            mti.additional_infos[0],
            AdditionalTypeInfo::Class(ClassTypeInfo { type_name: "Point".into(), library_id: 2 })
        );
    }

    #[test]
    fn derive_rejects_with_id_member() {
        let with_id = ClassValue {
            record: ClassRecord::WithId { object_id: 5, metadata_id: 2 },
            members: vec![],
        };
        assert!(derive_member_type_info(&[RemotingValue::Class(with_id)]).is_err());
    }

    #[test]
    fn primitive_array_builder_rejects_string_kind() {
        assert!(ArrayValue::single_primitive(PrimitiveType::String, vec![]).is_err());
        assert!(ArrayValue::single_primitive(PrimitiveType::Null, vec![]).is_err());
    }

    #[test]
    fn primitive_array_builder_rejects_mixed_elements() {
        let err = ArrayValue::single_primitive(
            PrimitiveType::Int32,
            vec![PrimitiveValue::Int32(1), PrimitiveValue::Byte(2)],
        );
        assert!(err.is_err());
    }

    #[test]
    fn class_member_count_checked() {
        let record = ClassRecord::SystemWithMembers {
            class_info: ClassInfo::new("Sys", vec!["a".into()]),
        };
        assert!(ClassValue::new(record, vec![]).is_err());
    }
}
