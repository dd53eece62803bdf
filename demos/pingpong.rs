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

//! An in-process server and client: the client calls `Ping` and `Add` on
//! a service at `/Demo` and prints the replies.

use nrbf_remoting::message::{extract_return_value, make_method_call, make_method_return};
use nrbf_remoting::records::PrimitiveValue;
use nrbf_remoting::{RemotingMessage, TcpClient, TcpServer};
use tokio::net::TcpListener;

fn demo_handler(
    _uri: &str,
    method_name: &str,
    _type_name: &str,
    payload: &[u8],
) -> Result<Vec<u8>, String> {
    let reply = match method_name {
        "Ping" => make_method_return(Some(PrimitiveValue::String("pong".into()))),
        "Add" => {
            let message = RemotingMessage::from_bytes(payload).map_err(|e| e.to_string())?;
            let args = message
                .content
                .as_call()
                .and_then(|call| call.args.clone())
                .unwrap_or_default();
            let sum: i32 = args
                .iter()
                .filter_map(|arg| match arg {
                    PrimitiveValue::Int32(v) => Some(*v),
                    _ => None,
                })
                .sum();
            make_method_return(Some(PrimitiveValue::Int32(sum)))
        }
        other => return Err(format!("unknown method {other:?}")),
    };
    reply.to_bytes().map_err(|e| e.to_string())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let mut server = TcpServer::new();
    server.register("/Demo", demo_handler);
    tokio::spawn(async move {
        let _ = server.serve(listener).await;
    });

    let mut client = TcpClient::new(&format!("tcp://{addr}/Demo"))?;
    client.connect().await?;

    let ping = make_method_call("Ping", "DemoService", vec![]).to_bytes()?;
    let reply = client.invoke("Ping", "DemoService", false, ping).await?;
    println!("Ping -> {:?}", extract_return_value(&reply));

    let add = make_method_call(
        "Add",
        "DemoService",
        vec![PrimitiveValue::Int32(3), PrimitiveValue::Int32(5)],
    )
    .to_bytes()?;
    let reply = client.invoke("Add", "DemoService", false, add).await?;
    println!("Add(3, 5) -> {:?}", extract_return_value(&reply));

    client.close().await;
    Ok(())
}
