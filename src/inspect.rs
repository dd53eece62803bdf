use crate::message::{MessageContent, RemotingMessage};
use crate::records::{ArrayRecord, ClassRecord, PrimitiveValue};
use crate::value::RemotingValue;
use serde_json::{json, Map, Value};

/// Renders a decoded message as a JSON tree for diagnostics. This is a
/// one-way view; it is not a serialization format.
pub fn message_to_json(message: &RemotingMessage) -> Value {
    let content = match &message.content {
        MessageContent::Call(call) => json!({
            "$record": "BinaryMethodCall",
            "flags": call.flags,
            "method_name": call.method_name,
            "type_name": call.type_name,
            "call_context": call.call_context,
            "args": call.args.as_ref().map(|args| {
                args.iter().map(primitive_to_json).collect::<Vec<_>>()
            }),
        }),
        MessageContent::Return(ret) => json!({
            "$record": "BinaryMethodReturn",
            "flags": ret.flags,
            "return_value": ret.return_value.as_ref().map(primitive_to_json),
            "call_context": ret.call_context,
            "args": ret.args.as_ref().map(|args| {
                args.iter().map(primitive_to_json).collect::<Vec<_>>()
            }),
            "exception": ret.exception.as_ref().map(primitive_to_json),
        }),
    };
    json!({
        "header": {
            "root_id": message.header.root_id,
            "header_id": message.header.header_id,
        },
        "libraries": message.libraries.iter().map(|lib| json!({
            "$id": lib.library_id,
            "name": lib.library_name,
        })).collect::<Vec<_>>(),
        "content": content,
        "call_array": message.call_array.iter().map(value_to_json).collect::<Vec<_>>(),
        "referenced_records": message.referenced_records.iter().map(value_to_json).collect::<Vec<_>>(),
    })
}

/// Renders a flat run of decoded records — referenceables or call-array
/// elements — as a JSON array, without the message envelope.
pub fn records_to_json(records: &[RemotingValue]) -> Value {
    Value::Array(records.iter().map(value_to_json).collect())
}

pub fn value_to_json(value: &RemotingValue) -> Value {
    match value {
        RemotingValue::Primitive(p) => primitive_to_json(p),
        RemotingValue::String(s) => json!({ "$id": s.object_id, "$string": s.value }),
        RemotingValue::Null => Value::Null,
        RemotingValue::Reference(id) => json!({ "$ref": id }),
        RemotingValue::Class(class) => {
            let mut map = Map::new();
            match &class.record {
                ClassRecord::WithId { object_id, metadata_id } => {
                    map.insert("$id".into(), json!(object_id));
                    map.insert("$metadata".into(), json!(metadata_id));
                    let values: Vec<_> = class.members.iter().map(value_to_json).collect();
                    map.insert("$values".into(), Value::Array(values));
                }
                _ => {
                    let info = class.record.class_info().expect("non-with-id class has info");
                    map.insert("$type".into(), json!(info.name));
                    map.insert("$id".into(), json!(info.object_id));
                    if let Some(library_id) = class.record.library_id() {
                        map.insert("$library".into(), json!(library_id));
                    }
                    for (name, member) in info.member_names.iter().zip(&class.members) {
                        map.insert(name.clone(), value_to_json(member));
                    }
                }
            }
            Value::Object(map)
        }
        RemotingValue::Array(array) => {
            let elements: Vec<_> = array.elements.iter().map(value_to_json).collect();
            match &array.record {
                ArrayRecord::Binary(rec) => json!({
                    "$id": rec.object_id,
                    "$rank": rec.rank,
                    "$lengths": rec.lengths,
                    "$lower_bounds": rec.lower_bounds,
                    "$values": elements,
                }),
                other => json!({ "$id": other.object_id(), "$values": elements }),
            }
        }
    }
}

fn primitive_to_json(value: &PrimitiveValue) -> Value {
    match value {
        PrimitiveValue::Boolean(v) => json!(v),
        PrimitiveValue::Byte(v) => json!(v),
        PrimitiveValue::Char(v) => json!(v.to_string()),
        PrimitiveValue::Decimal(v) => json!(v),
        PrimitiveValue::Double(v) => json!(v),
        PrimitiveValue::Int16(v) => json!(v),
        PrimitiveValue::Int32(v) => json!(v),
        PrimitiveValue::Int64(v) => json!(v),
        PrimitiveValue::SByte(v) => json!(v),
        PrimitiveValue::Single(v) => json!(v),
        PrimitiveValue::TimeSpan(v) => json!({ "$timespan": v }),
        PrimitiveValue::DateTime(v) => json!({ "$ticks": v.ticks, "$kind": v.kind as u8 }),
        PrimitiveValue::UInt16(v) => json!(v),
        PrimitiveValue::UInt32(v) => json!(v),
        PrimitiveValue::UInt64(v) => json!(v),
        PrimitiveValue::String(v) => json!(v),
        PrimitiveValue::Null => Value::Null,
    }
}
