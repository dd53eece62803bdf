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

//! MS-NRBF serialization and a .NET Remoting TCP channel (MS-NRTP).
//!
//! The codec is synchronous and works over in-memory byte streams; the
//! [`client`] and [`server`] modules put it on TCP.

pub mod client;
pub mod context;
pub mod decoder;
pub mod encoder;
pub mod error;
pub mod frame;
pub mod inspect;
pub mod message;
pub mod primitives;
pub mod records;
pub mod server;
pub mod value;

pub use client::TcpClient;
pub use context::{DeserializationContext, SerializationContext};
pub use decoder::Decoder;
pub use encoder::Encoder;
pub use error::Error;
pub use frame::{Frame, Operation};
pub use message::{
    extract_exception, extract_method_call_info, extract_return_value, make_exception_return,
    make_method_call, make_method_return, MessageContent, RemotingMessage,
};
pub use records::{MessageFlags, PrimitiveValue};
pub use server::{MethodHandler, TcpServer};
pub use value::RemotingValue;

/// Convenience function to read one complete message from a reader.
///
/// Returns the message together with the deserialization context, which
/// resolves member references into their objects.
pub fn parse<R: std::io::Read>(
    reader: R,
) -> error::Result<(RemotingMessage, DeserializationContext)> {
    let mut decoder = Decoder::new(reader);
    let message = decoder.read_message()?;
    Ok((message, decoder.into_context()))
}
