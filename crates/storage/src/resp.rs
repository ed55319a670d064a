//! RESP client for the remote key-value store
//!
//! Speaks just enough of the protocol for the transaction pipeline:
//! `MULTI`, `SADD`, `SREM`, `EXEC`, `DISCARD`, plus `PING`, `AUTH` and
//! `SELECT` for connection management.
//!
//! ## Wire format
//!
//! ```text
//! request:  *<argc>\r\n  ($<len>\r\n<bytes>\r\n){argc}
//! replies:  +status  -error  :integer  $<len> bulk  *<n> array
//! ```
//!
//! Inside `MULTI` every command is answered with `+QUEUED` and only runs on
//! `EXEC`, which answers with one array entry per queued command.

use kvindex_core::{RemoteConnection, RemoteError};
use r2d2::ManageConnection;
use serde::{Deserialize, Serialize};
use std::io::{BufRead, BufReader, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;
use tracing::debug;

/// Largest bulk string accepted in a reply, matching the server's own limit
pub const MAX_BULK_LEN: i64 = 512 * 1024 * 1024;

/// Array entries reserved up front; longer arrays grow as they are read
const ARRAY_PREALLOC: usize = 1024;

/// Deepest array nesting accepted in a reply
const MAX_REPLY_DEPTH: usize = 16;

/// Where the remote store lives
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointConfig {
    /// Host name or address
    pub host: String,
    /// TCP port
    pub port: u16,
    /// Logical database selected after connecting
    pub database: u32,
    /// Password sent with AUTH, if set
    pub password: Option<String>,
    /// TCP connect timeout
    pub connect_timeout_ms: u64,
    /// Read/write timeout on an established connection (0 = none)
    pub io_timeout_ms: u64,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 6379,
            database: 0,
            password: None,
            connect_timeout_ms: 1000,
            io_timeout_ms: 5000,
        }
    }
}

/// One decoded reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// `+OK`, `+QUEUED`, ...
    Status(String),
    /// `-ERR ...`
    Error(String),
    /// `:n`
    Integer(i64),
    /// `$n` (None for the null bulk string)
    Bulk(Option<Vec<u8>>),
    /// `*n` (None for the null array)
    Array(Option<Vec<Reply>>),
}

impl Reply {
    fn expect_status(self, expected: &str) -> Result<(), RemoteError> {
        match self {
            Reply::Status(s) if s == expected => Ok(()),
            Reply::Error(msg) => Err(RemoteError::Server(msg)),
            other => Err(RemoteError::Protocol(format!(
                "expected +{}, got {:?}",
                expected, other
            ))),
        }
    }
}

/// Encode one command as a RESP array of bulk strings
pub fn encode_command<W: Write>(out: &mut W, args: &[&[u8]]) -> std::io::Result<()> {
    write!(out, "*{}\r\n", args.len())?;
    for arg in args {
        write!(out, "${}\r\n", arg.len())?;
        out.write_all(arg)?;
        out.write_all(b"\r\n")?;
    }
    Ok(())
}

fn read_line<R: BufRead>(input: &mut R) -> Result<String, RemoteError> {
    let mut line = Vec::new();
    let n = input.read_until(b'\n', &mut line)?;
    if n == 0 {
        return Err(RemoteError::Io(std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            "connection closed by server",
        )));
    }
    if !line.ends_with(b"\r\n") {
        return Err(RemoteError::Protocol("reply line not CRLF-terminated".to_string()));
    }
    line.truncate(line.len() - 2);
    String::from_utf8(line).map_err(|e| RemoteError::Protocol(e.to_string()))
}

fn parse_len(s: &str) -> Result<i64, RemoteError> {
    s.parse::<i64>()
        .map_err(|_| RemoteError::Protocol(format!("invalid length: {:?}", s)))
}

/// Decode one reply
///
/// Lengths come from the server and are checked before anything is
/// allocated: a bulk string over [`MAX_BULK_LEN`] or arrays nested too
/// deeply are [`RemoteError::Protocol`].
pub fn read_reply<R: BufRead>(input: &mut R) -> Result<Reply, RemoteError> {
    read_reply_at(input, 0)
}

fn read_reply_at<R: BufRead>(input: &mut R, depth: usize) -> Result<Reply, RemoteError> {
    let line = read_line(input)?;
    let (tag, rest) = line.split_at(line.chars().next().map_or(0, char::len_utf8));
    match tag {
        "+" => Ok(Reply::Status(rest.to_string())),
        "-" => Ok(Reply::Error(rest.to_string())),
        ":" => Ok(Reply::Integer(parse_len(rest)?)),
        "$" => {
            let len = parse_len(rest)?;
            if len < 0 {
                return Ok(Reply::Bulk(None));
            }
            if len > MAX_BULK_LEN {
                return Err(RemoteError::Protocol(format!(
                    "bulk string of {} bytes exceeds {}",
                    len, MAX_BULK_LEN
                )));
            }
            let mut data = vec![0u8; len as usize + 2];
            input.read_exact(&mut data)?;
            if !data.ends_with(b"\r\n") {
                return Err(RemoteError::Protocol("bulk string not CRLF-terminated".to_string()));
            }
            data.truncate(len as usize);
            Ok(Reply::Bulk(Some(data)))
        }
        "*" => {
            let len = parse_len(rest)?;
            if len < 0 {
                return Ok(Reply::Array(None));
            }
            if depth >= MAX_REPLY_DEPTH {
                return Err(RemoteError::Protocol("reply arrays nested too deeply".to_string()));
            }
            let mut items = Vec::with_capacity((len as u64).min(ARRAY_PREALLOC as u64) as usize);
            for _ in 0..len {
                items.push(read_reply_at(input, depth + 1)?);
            }
            Ok(Reply::Array(Some(items)))
        }
        _ => Err(RemoteError::Protocol(format!("unknown reply type: {:?}", line))),
    }
}

/// RESP connection over TCP
#[derive(Debug)]
pub struct RespConnection {
    stream: BufReader<TcpStream>,
    in_batch: bool,
    broken: bool,
}

impl RespConnection {
    /// Connect, authenticate and select the configured database
    pub fn connect(config: &EndpointConfig) -> Result<Self, RemoteError> {
        let timeout = Duration::from_millis(config.connect_timeout_ms.max(1));
        let mut last_err = None;
        let mut stream = None;
        for addr in (config.host.as_str(), config.port).to_socket_addrs()? {
            match TcpStream::connect_timeout(&addr, timeout) {
                Ok(s) => {
                    stream = Some(s);
                    break;
                }
                Err(e) => last_err = Some(e),
            }
        }
        let stream = match (stream, last_err) {
            (Some(s), _) => s,
            (None, Some(e)) => return Err(RemoteError::Io(e)),
            (None, None) => {
                return Err(RemoteError::Refused(format!(
                    "{}:{} resolved to no addresses",
                    config.host, config.port
                )))
            }
        };
        stream.set_nodelay(true)?;
        if config.io_timeout_ms > 0 {
            let io_timeout = Some(Duration::from_millis(config.io_timeout_ms));
            stream.set_read_timeout(io_timeout)?;
            stream.set_write_timeout(io_timeout)?;
        }

        let mut conn = Self {
            stream: BufReader::new(stream),
            in_batch: false,
            broken: false,
        };
        if let Some(password) = &config.password {
            conn.call(&[b"AUTH", password.as_bytes()])?.expect_status("OK")?;
        }
        if config.database != 0 {
            let db = config.database.to_string();
            conn.call(&[b"SELECT", db.as_bytes()])?.expect_status("OK")?;
        }
        debug!(host = %config.host, port = config.port, "remote connection established");
        Ok(conn)
    }

    /// Round-trip a PING
    pub fn ping(&mut self) -> Result<(), RemoteError> {
        self.call(&[b"PING"])?.expect_status("PONG")
    }

    fn call(&mut self, args: &[&[u8]]) -> Result<Reply, RemoteError> {
        let mut request = Vec::with_capacity(64);
        encode_command(&mut request, args)?;
        let result = self.exchange(&request);
        if let Err(RemoteError::Io(_) | RemoteError::Protocol(_)) = &result {
            // Stream position is unknown after a partial exchange
            self.broken = true;
        }
        result
    }

    fn exchange(&mut self, request: &[u8]) -> Result<Reply, RemoteError> {
        let stream = self.stream.get_mut();
        stream.write_all(request)?;
        stream.flush()?;
        read_reply(&mut self.stream)
    }

    fn stage(&mut self, args: &[&[u8]]) -> Result<(), RemoteError> {
        if !self.in_batch {
            return Err(RemoteError::BatchState("command staged without MULTI".to_string()));
        }
        self.call(args)?.expect_status("QUEUED")
    }
}

impl RemoteConnection for RespConnection {
    fn multi(&mut self) -> Result<(), RemoteError> {
        if self.in_batch {
            return Err(RemoteError::BatchState("MULTI calls can not be nested".to_string()));
        }
        self.call(&[b"MULTI"])?.expect_status("OK")?;
        self.in_batch = true;
        Ok(())
    }

    fn sadd(&mut self, key: &str, member: &str) -> Result<(), RemoteError> {
        self.stage(&[b"SADD", key.as_bytes(), member.as_bytes()])
    }

    fn srem(&mut self, key: &str, member: &str) -> Result<(), RemoteError> {
        self.stage(&[b"SREM", key.as_bytes(), member.as_bytes()])
    }

    fn exec(&mut self) -> Result<(), RemoteError> {
        if !self.in_batch {
            return Err(RemoteError::BatchState("EXEC without MULTI".to_string()));
        }
        let reply = self.call(&[b"EXEC"]);
        self.in_batch = false;
        match reply? {
            Reply::Array(None) => Err(RemoteError::Aborted),
            Reply::Array(Some(results)) => match results.into_iter().find_map(|r| match r {
                Reply::Error(msg) => Some(msg),
                _ => None,
            }) {
                Some(msg) => Err(RemoteError::Server(msg)),
                None => Ok(()),
            },
            Reply::Error(msg) => Err(RemoteError::Server(msg)),
            other => Err(RemoteError::Protocol(format!("unexpected EXEC reply: {:?}", other))),
        }
    }

    fn discard(&mut self) -> Result<(), RemoteError> {
        if !self.in_batch {
            return Err(RemoteError::BatchState("DISCARD without MULTI".to_string()));
        }
        let reply = self.call(&[b"DISCARD"]);
        self.in_batch = false;
        reply?.expect_status("OK")
    }

    fn in_batch(&self) -> bool {
        self.in_batch
    }

    fn is_broken(&self) -> bool {
        self.broken
    }
}

/// r2d2 manager for [`RespConnection`]s
#[derive(Debug, Clone)]
pub struct RespConnectionManager {
    config: EndpointConfig,
}

impl RespConnectionManager {
    /// Manager connecting to `config`
    pub fn new(config: EndpointConfig) -> Self {
        Self { config }
    }

    /// Endpoint this manager connects to
    pub fn config(&self) -> &EndpointConfig {
        &self.config
    }
}

impl ManageConnection for RespConnectionManager {
    type Connection = RespConnection;
    type Error = RemoteError;

    fn connect(&self) -> Result<RespConnection, RemoteError> {
        RespConnection::connect(&self.config)
    }

    fn is_valid(&self, conn: &mut RespConnection) -> Result<(), RemoteError> {
        conn.ping()
    }

    fn has_broken(&self, conn: &mut RespConnection) -> bool {
        conn.in_batch() || conn.is_broken()
    }
}
