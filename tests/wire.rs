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

//! Wire-level fixtures: known-good byte sequences for calls, returns and
//! frames, plus boundary behaviors of the record grammar.

use nrbf_remoting::frame::{Frame, Operation, StatusCode};
use nrbf_remoting::message::{
    extract_exception, make_exception_return, make_method_call, make_method_return, MessageContent,
    RemotingMessage,
};
use nrbf_remoting::primitives::{DateTime, DateTimeKind};
use nrbf_remoting::records::{
    AdditionalTypeInfo, ArrayInfo, ArrayRecord, BinaryArrayRecord, BinaryArrayType,
    BinaryMethodCall, BinaryType, MessageFlags, ObjectString, PrimitiveType, PrimitiveValue,
};
use nrbf_remoting::value::{ArrayValue, ClassValue};
use nrbf_remoting::RemotingValue;
use std::io::Cursor;

fn stream_header(root_id: i32, header_id: i32) -> Vec<u8> {
    let mut bytes = vec![0u8];
    bytes.extend(root_id.to_le_bytes());
    bytes.extend(header_id.to_le_bytes());
    bytes.extend(1i32.to_le_bytes());
    bytes.extend(0i32.to_le_bytes());
    bytes
}

fn string_with_code(s: &str) -> Vec<u8> {
    let mut bytes = vec![PrimitiveType::String as u8, s.len() as u8];
    bytes.extend(s.as_bytes());
    bytes
}

#[test]
fn ping_with_no_args_is_39_bytes() {
    let mut expected = stream_header(0, 0);
    expected.push(21);
    expected.extend(0x11u32.to_le_bytes());
    expected.extend(string_with_code("Ping"));
    expected.extend(string_with_code("MyServer"));
    expected.push(11);
    assert_eq!(expected.len(), 39);

    let bytes = make_method_call("Ping", "MyServer", vec![]).to_bytes().unwrap();
    assert_eq!(bytes, expected);
}

#[test]
fn add_with_inline_ints() {
    let mut expected = stream_header(0, 0);
    expected.push(21);
    expected.extend(0x12u32.to_le_bytes());
    expected.extend(string_with_code("Add"));
    expected.extend(string_with_code("MathService"));
    expected.extend(2i32.to_le_bytes());
    expected.push(PrimitiveType::Int32 as u8);
    expected.extend(3i32.to_le_bytes());
    expected.push(PrimitiveType::Int32 as u8);
    expected.extend(5i32.to_le_bytes());
    expected.push(11);

    let bytes = make_method_call(
        "Add",
        "MathService",
        vec![PrimitiveValue::Int32(3), PrimitiveValue::Int32(5)],
    )
    .to_bytes()
    .unwrap();
    assert_eq!(bytes, expected);
}

#[test]
fn return_int_inline() {
    let mut expected = stream_header(0, 0);
    expected.push(22);
    expected.extend(0x0811u32.to_le_bytes());
    expected.push(PrimitiveType::Int32 as u8);
    expected.extend(8i32.to_le_bytes());
    expected.push(11);

    let bytes = make_method_return(Some(PrimitiveValue::Int32(8))).to_bytes().unwrap();
    assert_eq!(bytes, expected);
}

#[test]
fn void_return() {
    let mut expected = stream_header(0, 0);
    expected.push(22);
    expected.extend(0x0411u32.to_le_bytes());
    expected.push(11);

    let bytes = make_method_return(None).to_bytes().unwrap();
    assert_eq!(bytes, expected);
}

#[test]
fn call_with_args_in_array() {
    let mut expected = stream_header(1, -1);
    expected.push(21);
    expected.extend(0x18u32.to_le_bytes());
    expected.extend(string_with_code("Foo"));
    expected.extend(string_with_code("Bar"));
    expected.push(16);
    expected.extend(1i32.to_le_bytes());
    expected.extend(1i32.to_le_bytes());
    expected.push(PrimitiveType::Int32 as u8);
    expected.extend(10i32.to_le_bytes());
    expected.push(11);

    let mut message = RemotingMessage::new(MessageContent::Call(BinaryMethodCall {
        flags: MessageFlags::ARGS_IN_ARRAY | MessageFlags::NO_CONTEXT,
        method_name: "Foo".into(),
        type_name: "Bar".into(),
        call_context: None,
        args: None,
    }));
    message.call_array = vec![RemotingValue::Primitive(PrimitiveValue::Int32(10))];
    let bytes = message.to_bytes().unwrap();
    assert_eq!(bytes, expected);

    let decoded = RemotingMessage::from_bytes(&bytes).unwrap();
    assert_eq!(decoded.header.root_id, 1);
    assert_eq!(decoded.header.header_id, -1);
    assert_eq!(decoded.call_array, vec![RemotingValue::Primitive(PrimitiveValue::Int32(10))]);

    // Byte round-trip.
    assert_eq!(decoded.to_bytes().unwrap(), bytes);
}

#[test]
fn exception_reply_bytes() {
    // NoArgs | NoContext | NoReturnValue | ExceptionInArray; the exception
    // is the sole call array element, in value-with-code form.
    let mut expected = stream_header(1, -1);
    expected.push(22);
    expected.extend(0x2211u32.to_le_bytes());
    expected.push(16);
    expected.extend(1i32.to_le_bytes());
    expected.extend(1i32.to_le_bytes());
    expected.extend(string_with_code("boom"));
    expected.push(11);

    let message = make_exception_return(PrimitiveValue::String("boom".into()));
    let bytes = message.to_bytes().unwrap();
    assert_eq!(bytes, expected);

    let decoded = RemotingMessage::from_bytes(&bytes).unwrap();
    let ret = decoded.content.as_return().unwrap();
    assert_eq!(ret.exception, Some(PrimitiveValue::String("boom".into())));
    assert!(decoded.call_array.is_empty());
    assert_eq!(decoded.to_bytes().unwrap(), bytes);
    assert_eq!(extract_exception(&bytes), Some(PrimitiveValue::String("boom".into())));
}

#[test]
fn nrtp_request_frame_roundtrip() {
    let payload = make_method_call("Ping", "MyServer", vec![]).to_bytes().unwrap();
    let frame = Frame::request(Operation::Request, "/S", payload.clone());

    let mut bytes = Vec::new();
    frame.write_to(&mut bytes).unwrap();
    let back = Frame::read_from(&mut Cursor::new(bytes)).unwrap();

    assert_eq!(back.operation, Operation::Request);
    assert_eq!(back.request_uri(), Some("/S"));
    assert_eq!(back.content_type(), Some("application/octet-stream"));
    assert_eq!(back.content, payload);
    assert_eq!(back.status_code(), None::<StatusCode>);
}

fn roundtrip(message: &RemotingMessage) -> RemotingMessage {
    let bytes = message.to_bytes().unwrap();
    RemotingMessage::from_bytes(&bytes).unwrap()
}

#[test]
fn message_with_long_string_member() {
    // 130 characters forces a two-byte length header inside the record.
    let long = "y".repeat(130);
    let mut message = make_method_call("Store", "Strings", vec![]);
    message.referenced_records.push(RemotingValue::String(ObjectString {
        object_id: 1,
        value: long.clone(),
    }));
    let back = roundtrip(&message);
    let RemotingValue::String(s) = &back.referenced_records[0] else { panic!("expected string") };
    assert_eq!(s.value, long);
}

#[test]
fn null_runs_of_256_and_257() {
    for count in [255usize, 256, 257] {
        let mut message = make_method_call("Nulls", "Svc", vec![]);
        message
            .referenced_records
            .push(RemotingValue::Array(ArrayValue::single_object(vec![RemotingValue::Null; count])));
        let bytes = message.to_bytes().unwrap();

        // 255 nulls fit the one-byte form; longer runs take the 32-bit form.
        let tag = if count <= 255 { 13u8 } else { 14u8 };
        assert!(bytes.windows(1).any(|w| w[0] == tag), "count {count}");

        let back = RemotingMessage::from_bytes(&bytes).unwrap();
        let RemotingValue::Array(array) = &back.referenced_records[0] else { panic!() };
        assert_eq!(array.elements.len(), count);
        assert!(array.elements.iter().all(|e| e.is_null()));
        assert_eq!(back.to_bytes().unwrap(), bytes);
    }
}

#[test]
fn rank_two_offset_binary_array() {
    let record = BinaryArrayRecord {
        object_id: 3,
        array_type: BinaryArrayType::RectangularOffset,
        rank: 2,
        lengths: vec![2, 2],
        lower_bounds: Some(vec![1, 1]),
        item_type: BinaryType::Primitive,
        additional_info: AdditionalTypeInfo::Primitive(PrimitiveType::Int32),
    };
    let elements: Vec<RemotingValue> = (0..4).map(RemotingValue::from).collect();
    let mut message = make_method_call("Grid", "Svc", vec![]);
    message.referenced_records.push(RemotingValue::Array(ArrayValue {
        record: ArrayRecord::Binary(record.clone()),
        elements: elements.clone(),
    }));

    let back = roundtrip(&message);
    let RemotingValue::Array(array) = &back.referenced_records[0] else { panic!() };
    let ArrayRecord::Binary(decoded) = &array.record else { panic!("expected binary array") };
    assert_eq!(decoded, &record);
    assert_eq!(array.elements, elements);
}

#[test]
fn class_graph_roundtrip() {
    let inner = ClassValue::with_types(
        "Lib.Point",
        Some(1),
        vec![
            ("x".into(), RemotingValue::from(3)),
            ("y".into(), RemotingValue::from(4)),
        ],
    )
    .unwrap();
    let outer = ClassValue::with_types(
        "Lib.Shape",
        Some(1),
        vec![
            ("name".into(), RemotingValue::from("triangle")),
            ("origin".into(), RemotingValue::Class(inner)),
            ("tag".into(), RemotingValue::Null),
            (
                "created".into(),
                RemotingValue::Primitive(PrimitiveValue::DateTime(DateTime::new(
                    630_822_816_000_000_000,
                    DateTimeKind::Utc,
                ))),
            ),
            (
                "weight".into(),
                RemotingValue::Primitive(PrimitiveValue::Decimal("12.5".into())),
            ),
        ],
    )
    .unwrap();

    let mut message = make_method_call("Draw", "Shapes", vec![]);
    message.libraries.push(nrbf_remoting::records::BinaryLibrary {
        library_id: 1,
        library_name: "Lib, Version=1.0.0.0".into(),
    });
    message.referenced_records.push(RemotingValue::Class(outer));

    let back = roundtrip(&message);
    let RemotingValue::Class(class) = &back.referenced_records[0] else { panic!() };
    assert_eq!(class.record.class_info().unwrap().name, "Lib.Shape");
    assert_eq!(class.members.len(), 5);
    let RemotingValue::Class(origin) = &class.members[1] else { panic!("expected class member") };
    assert_eq!(origin.members[0], RemotingValue::from(3));
    assert_eq!(
        class.members[4],
        RemotingValue::Primitive(PrimitiveValue::Decimal("12.5".into()))
    );
}

#[test]
fn primitive_array_roundtrip() {
    let array = ArrayValue::single_primitive(
        PrimitiveType::Double,
        vec![
            PrimitiveValue::Double(1.5),
            PrimitiveValue::Double(f64::INFINITY),
            PrimitiveValue::Double(-0.0),
        ],
    )
    .unwrap();
    let mut message = make_method_call("Stats", "Svc", vec![]);
    message.referenced_records.push(RemotingValue::Array(array));

    let back = roundtrip(&message);
    let RemotingValue::Array(array) = &back.referenced_records[0] else { panic!() };
    assert_eq!(array.elements[1], RemotingValue::Primitive(PrimitiveValue::Double(f64::INFINITY)));
}

#[test]
fn nan_roundtrips_bitwise() {
    let array =
        ArrayValue::single_primitive(PrimitiveType::Double, vec![PrimitiveValue::Double(f64::NAN)])
            .unwrap();
    let mut message = make_method_call("Nan", "Svc", vec![]);
    message.referenced_records.push(RemotingValue::Array(array));
    let bytes = message.to_bytes().unwrap();
    let back = RemotingMessage::from_bytes(&bytes).unwrap();
    let RemotingValue::Array(array) = &back.referenced_records[0] else { panic!() };
    let RemotingValue::Primitive(PrimitiveValue::Double(v)) = array.elements[0] else { panic!() };
    assert!(v.is_nan());
    assert_eq!(back.to_bytes().unwrap(), bytes);
}

#[test]
fn class_with_id_reuses_metadata() {
    let first = ClassValue::with_types(
        "Lib.Point",
        Some(1),
        vec![("x".into(), 1.into()), ("y".into(), 2.into())],
    )
    .unwrap();
    // Force a known object id so the back-reference is predictable.
    let mut first = first;
    first.record.set_object_id(2);
    let second = ClassValue {
        record: nrbf_remoting::records::ClassRecord::WithId { object_id: 3, metadata_id: 2 },
        members: vec![5.into(), 6.into()],
    };

    let mut message = make_method_call("Pair", "Svc", vec![]);
    message.libraries.push(nrbf_remoting::records::BinaryLibrary {
        library_id: 1,
        library_name: "Lib".into(),
    });
    message.referenced_records.push(RemotingValue::Class(first));
    message.referenced_records.push(RemotingValue::Class(second));

    let bytes = message.to_bytes().unwrap();
    let back = RemotingMessage::from_bytes(&bytes).unwrap();
    let RemotingValue::Class(decoded) = &back.referenced_records[1] else { panic!() };
    assert_eq!(decoded.members, vec![5.into(), 6.into()]);
    assert_eq!(back.to_bytes().unwrap(), bytes);
}

#[test]
fn shared_string_becomes_back_reference() {
    let shared = RemotingValue::String(ObjectString { object_id: 9, value: "twice".into() });
    let mut message = make_method_call("Share", "Svc", vec![]);
    message.referenced_records.push(RemotingValue::Array(ArrayValue {
        record: ArrayRecord::SingleString { array_info: ArrayInfo { object_id: 8, length: 2 } },
        elements: vec![shared.clone(), shared],
    }));

    let back = roundtrip(&message);
    let RemotingValue::Array(array) = &back.referenced_records[0] else { panic!() };
    assert_eq!(array.elements[1], RemotingValue::Reference(9));
}

#[test]
fn char_and_timespan_members() {
    let class = ClassValue::with_types(
        "Sys.Sample",
        None,
        vec![
            ("letter".into(), RemotingValue::Primitive(PrimitiveValue::Char('漢'))),
            ("elapsed".into(), RemotingValue::Primitive(PrimitiveValue::TimeSpan(-600_000_000))),
        ],
    )
    .unwrap();
    let mut message = make_method_call("Sample", "Svc", vec![]);
    message.referenced_records.push(RemotingValue::Class(class));

    let back = roundtrip(&message);
    let RemotingValue::Class(class) = &back.referenced_records[0] else { panic!() };
    assert_eq!(class.members[0], RemotingValue::Primitive(PrimitiveValue::Char('漢')));
    assert_eq!(class.members[1], RemotingValue::Primitive(PrimitiveValue::TimeSpan(-600_000_000)));
}
