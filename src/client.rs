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

//! The client side of the TCP channel: connect to a `tcp://` endpoint,
//! frame a request, read the framed reply.

use crate::error::{Error, Result};
use crate::frame::{Frame, Operation, StatusCode};
use log::{debug, warn};
use std::io::Cursor;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(20);

/// A parsed `tcp://host:port/path` endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemotingUri {
    pub host: String,
    pub port: u16,
    pub path: String,
}

impl RemotingUri {
    pub fn parse(uri: &str) -> Result<Self> {
        let rest = uri
            .strip_prefix("tcp://")
            .ok_or_else(|| Error::InvalidUri(format!("{uri}: only tcp:// is supported")))?;
        let (authority, path) = match rest.find('/') {
            Some(slash) => (&rest[..slash], &rest[slash..]),
            None => return Err(Error::InvalidUri(format!("{uri}: missing path"))),
        };
        let (host, port) = authority
            .rsplit_once(':')
            .ok_or_else(|| Error::InvalidUri(format!("{uri}: missing port")))?;
        if host.is_empty() {
            return Err(Error::InvalidUri(format!("{uri}: missing host")));
        }
        let port: u16 = port
            .parse()
            .map_err(|_| Error::InvalidUri(format!("{uri}: bad port {port:?}")))?;
        Ok(Self { host: host.to_owned(), port, path: path.to_owned() })
    }
}

/// Strips the scheme and authority off a request URI, leaving the path the
/// server dispatches on. Bare paths pass through.
pub(crate) fn uri_path(uri: &str) -> &str {
    match uri.strip_prefix("tcp://") {
        Some(rest) => rest.find('/').map(|slash| &rest[slash..]).unwrap_or("/"),
        None => uri,
    }
}

/// Reads one frame off the socket, buffering until the sync codec stops
/// reporting truncation. `buf` persists across calls so bytes past the
/// frame boundary are kept for the next frame. `Ok(None)` means the peer
/// closed the connection cleanly between frames.
pub(crate) async fn read_frame(
    stream: &mut TcpStream,
    buf: &mut Vec<u8>,
    limit: Option<Duration>,
) -> Result<Option<Frame>> {
    let mut chunk = [0u8; 4096];
    loop {
        if !buf.is_empty() {
            let mut cursor = Cursor::new(buf.as_slice());
            match Frame::read_from(&mut cursor) {
                Ok(frame) => {
                    let consumed = cursor.position() as usize;
                    buf.drain(..consumed);
                    return Ok(Some(frame));
                }
                Err(err) if err.is_truncated() => {}
                Err(err) => return Err(err),
            }
        }
        let read = stream.read(&mut chunk);
        let n = match limit {
            Some(limit) => timeout(limit, read).await.map_err(|_| Error::Timeout(limit))??,
            None => read.await?,
        };
        if n == 0 {
            if buf.is_empty() {
                return Ok(None);
            }
            return Err(Error::Frame("connection closed mid-frame".into()));
        }
        buf.extend_from_slice(&chunk[..n]);
    }
}

/// A client connection to one remoting endpoint.
pub struct TcpClient {
    uri: RemotingUri,
    stream: Option<TcpStream>,
    timeout: Duration,
}

impl TcpClient {
    /// Parses the endpoint URI; does not connect yet.
    pub fn new(uri: &str) -> Result<Self> {
        Ok(Self { uri: RemotingUri::parse(uri)?, stream: None, timeout: DEFAULT_TIMEOUT })
    }

    pub fn with_timeout(uri: &str, timeout: Duration) -> Result<Self> {
        Ok(Self { uri: RemotingUri::parse(uri)?, stream: None, timeout })
    }

    pub fn uri(&self) -> &RemotingUri {
        &self.uri
    }

    pub fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    pub async fn connect(&mut self) -> Result<()> {
        let addr = (self.uri.host.as_str(), self.uri.port);
        let stream = timeout(self.timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| Error::Timeout(self.timeout))??;
        debug!("connected to {}:{}", self.uri.host, self.uri.port);
        self.stream = Some(stream);
        Ok(())
    }

    /// Frames and sends one request payload. Unless `one_way`, waits for
    /// the reply frame and returns its content. The method and type names
    /// are informational; the payload already carries them.
    pub async fn invoke(
        &mut self,
        method_name: &str,
        type_name: &str,
        one_way: bool,
        payload: Vec<u8>,
    ) -> Result<Vec<u8>> {
        let limit = self.timeout;
        let path = self.uri.path.clone();
        let stream = self.stream.as_mut().ok_or(Error::NotConnected)?;

        let operation = if one_way { Operation::OneWayRequest } else { Operation::Request };
        debug!("invoke {type_name}.{method_name} ({operation:?}) on {path}");
        let frame = Frame::request(operation, &path, payload);
        let mut bytes = Vec::new();
        frame.write_to(&mut bytes)?;
        timeout(limit, stream.write_all(&bytes)).await.map_err(|_| Error::Timeout(limit))??;

        if one_way {
            return Ok(Vec::new());
        }

        let mut buf = Vec::new();
        let reply = match read_frame(stream, &mut buf, Some(limit)).await? {
            Some(reply) => reply,
            None => {
                self.stream = None;
                return Err(Error::Frame("connection closed before the reply".into()));
            }
        };
        if reply.operation != Operation::Reply {
            return Err(Error::Frame(format!("expected a reply, got {:?}", reply.operation)));
        }
        let close = reply.close_requested();
        let result = match reply.status_code() {
            Some(StatusCode::Error) => {
                let phrase = reply.status_phrase().unwrap_or("remote error").to_owned();
                warn!("{type_name}.{method_name} failed remotely: {phrase}");
                Err(Error::Handler(phrase))
            }
            _ => Ok(reply.content),
        };
        if close {
            self.close().await;
        }
        result
    }

    /// Tears the connection down. Safe to call when already closed.
    pub async fn close(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            let _ = stream.shutdown().await;
            debug!("connection to {}:{} closed", self.uri.host, self.uri.port);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_well_formed_uri() {
        let uri = RemotingUri::parse("tcp://127.0.0.1:9090/MyService").unwrap();
        assert_eq!(uri.host, "127.0.0.1");
        assert_eq!(uri.port, 9090);
        assert_eq!(uri.path, "/MyService");
    }

    #[test]
    fn rejects_malformed_uris() {
        for bad in [
            "http://host:1/p",
            "tcp://host/p",
            "tcp://host:port/p",
            "tcp://:1/p",
            "tcp://host:1",
        ] {
            assert!(matches!(RemotingUri::parse(bad), Err(Error::InvalidUri(_))), "{bad}");
        }
    }

    #[test]
    fn path_extraction() {
        assert_eq!(uri_path("tcp://h:1/Svc"), "/Svc");
        assert_eq!(uri_path("/Svc"), "/Svc");
        assert_eq!(uri_path("tcp://h:1"), "/");
    }

    #[tokio::test]
    async fn invoke_without_connect_fails() {
        let mut client = TcpClient::new("tcp://127.0.0.1:1/S").unwrap();
        let err = client.invoke("M", "T", false, vec![]).await.unwrap_err();
        assert!(matches!(err, Error::NotConnected));
    }
}
