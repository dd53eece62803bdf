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

//! The server side of the TCP channel: accept connections, parse frames,
//! dispatch by request-URI path, frame the handler's reply.

use crate::client::{read_frame, uri_path};
use crate::error::{Error, Result};
use crate::frame::{Frame, Operation};
use crate::message::extract_method_call_info;
use log::{debug, info, warn};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;

/// A registered service endpoint. The method and type names are a
/// best-effort parse of the payload and advisory only; the payload bytes
/// are authoritative.
pub trait MethodHandler: Send + Sync + 'static {
    fn handle(
        &self,
        request_uri: &str,
        method_name: &str,
        type_name: &str,
        payload: &[u8],
    ) -> std::result::Result<Vec<u8>, String>;
}

impl<F> MethodHandler for F
where
    F: Fn(&str, &str, &str, &[u8]) -> std::result::Result<Vec<u8>, String>
        + Send
        + Sync
        + 'static,
{
    fn handle(
        &self,
        request_uri: &str,
        method_name: &str,
        type_name: &str,
        payload: &[u8],
    ) -> std::result::Result<Vec<u8>, String> {
        self(request_uri, method_name, type_name, payload)
    }
}

/// A remoting server hosting one handler per URI path.
pub struct TcpServer {
    handlers: HashMap<String, Arc<dyn MethodHandler>>,
    write_timeout: Duration,
}

impl TcpServer {
    pub fn new() -> Self {
        Self { handlers: HashMap::new(), write_timeout: crate::client::DEFAULT_TIMEOUT }
    }

    /// Registers a handler under a path such as `/MyService`.
    pub fn register(&mut self, path: &str, handler: impl MethodHandler) -> &mut Self {
        self.handlers.insert(path.to_owned(), Arc::new(handler));
        self
    }

    /// Binds the address and serves until the task is dropped.
    pub async fn listen(self, addr: &str) -> Result<()> {
        let listener = TcpListener::bind(addr).await?;
        self.serve(listener).await
    }

    /// Serves connections accepted from an existing listener. Each
    /// connection runs as its own task; requests on one connection are
    /// handled sequentially.
    pub async fn serve(self, listener: TcpListener) -> Result<()> {
        info!("remoting server listening on {}", listener.local_addr()?);
        let handlers = Arc::new(self.handlers);
        let write_timeout = self.write_timeout;
        loop {
            let (stream, peer) = listener.accept().await?;
            debug!("connection from {peer}");
            let handlers = Arc::clone(&handlers);
            tokio::spawn(async move {
                if let Err(err) = handle_connection(handlers, stream, write_timeout).await {
                    warn!("connection from {peer} ended with error: {err}");
                }
            });
        }
    }
}

async fn handle_connection(
    handlers: Arc<HashMap<String, Arc<dyn MethodHandler>>>,
    mut stream: TcpStream,
    write_timeout: Duration,
) -> Result<()> {
    let mut buf = Vec::new();
    loop {
        let frame = match read_frame(&mut stream, &mut buf, None).await? {
            Some(frame) => frame,
            None => return Ok(()),
        };
        let one_way = frame.operation == Operation::OneWayRequest;
        if frame.operation == Operation::Reply {
            return Err(Error::Frame("unexpected reply frame on server".into()));
        }
        let request_uri = frame.request_uri().unwrap_or("").to_owned();
        let path = uri_path(&request_uri).to_owned();
        let client_close = frame.close_requested();

        let Some(handler) = handlers.get(&path) else {
            warn!("no handler registered for {path:?}");
            if !one_way {
                send_frame(&mut stream, &Frame::error_reply(&format!("no service at {path}")), write_timeout)
                    .await?;
            }
            return Ok(());
        };

        let (method_name, type_name) = extract_method_call_info(&frame.content);
        debug!("dispatching {type_name}.{method_name} ({} bytes) to {path}", frame.content.len());
        match handler.handle(&request_uri, &method_name, &type_name, &frame.content) {
            Ok(payload) => {
                if !one_way {
                    send_frame(&mut stream, &Frame::reply(payload), write_timeout).await?;
                }
            }
            Err(message) => {
                warn!("handler for {path} failed: {message}");
                if !one_way {
                    send_frame(&mut stream, &Frame::error_reply(&message), write_timeout).await?;
                }
                // The error reply asks for close; drop the connection.
                return Ok(());
            }
        }
        if client_close {
            return Ok(());
        }
    }
}

async fn send_frame(stream: &mut TcpStream, frame: &Frame, limit: Duration) -> Result<()> {
    let mut bytes = Vec::new();
    frame.write_to(&mut bytes)?;
    timeout(limit, stream.write_all(&bytes)).await.map_err(|_| Error::Timeout(limit))??;
    Ok(())
}
