//! Wire framing for the cache protocol.
//!
//! Commands go out as arrays of bulk strings (`*N`, then `$len`/payload per
//! element); replies come back as one of five frame types tagged by their
//! first byte:
//!
//! ```text
//! +OK\r\n              simple string
//! -ERR message\r\n     error
//! :42\r\n              integer
//! $5\r\nhello\r\n      bulk string ($-1 = nil)
//! *2\r\n...\r\n        array of frames (*-1 = nil)
//! ```

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt};

use crate::cache::{CacheError, CacheResult};

/// One decoded reply frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Simple string (`+`).
    Simple(String),
    /// Server-reported error (`-`).
    Error(String),
    /// Integer (`:`).
    Integer(i64),
    /// Bulk string (`$`); `None` is the nil bulk.
    Bulk(Option<Vec<u8>>),
    /// Array (`*`); `None` is the nil array.
    Array(Option<Vec<Reply>>),
}

impl Reply {
    /// Bulk or simple payload as UTF-8 text, if this frame carries one.
    pub fn as_text(&self) -> Option<String> {
        match self {
            Reply::Simple(s) => Some(s.clone()),
            Reply::Bulk(Some(b)) => String::from_utf8(b.clone()).ok(),
            _ => None,
        }
    }

    /// True for the nil bulk/array frames.
    pub fn is_nil(&self) -> bool {
        matches!(self, Reply::Bulk(None) | Reply::Array(None))
    }
}

/// Encode one command as an array of bulk strings.
pub fn encode_command(command: &str, args: &[&str]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(32 + args.iter().map(|a| a.len() + 16).sum::<usize>());
    buf.extend_from_slice(format!("*{}\r\n", args.len() + 1).as_bytes());
    encode_bulk(&mut buf, command.as_bytes());
    for arg in args {
        encode_bulk(&mut buf, arg.as_bytes());
    }
    buf
}

fn encode_bulk(buf: &mut Vec<u8>, payload: &[u8]) {
    buf.extend_from_slice(format!("${}\r\n", payload.len()).as_bytes());
    buf.extend_from_slice(payload);
    buf.extend_from_slice(b"\r\n");
}

/// Read one reply frame, recursing into arrays.
pub async fn read_reply<R>(reader: &mut R) -> CacheResult<Reply>
where
    R: AsyncBufRead + Unpin + Send,
{
    let line = read_line(reader).await?;
    let (tag, rest) = match line.split_at_checked(1) {
        Some(parts) => parts,
        None => return Err(CacheError::Protocol("empty reply line".into())),
    };

    match tag {
        "+" => Ok(Reply::Simple(rest.to_string())),
        "-" => Ok(Reply::Error(rest.to_string())),
        ":" => rest
            .parse::<i64>()
            .map(Reply::Integer)
            .map_err(|_| CacheError::Protocol(format!("bad integer reply: {}", rest))),
        "$" => {
            let len = parse_len(rest)?;
            match len {
                None => Ok(Reply::Bulk(None)),
                Some(len) => {
                    let mut payload = vec![0u8; len + 2];
                    reader.read_exact(&mut payload).await?;
                    if &payload[len..] != b"\r\n" {
                        return Err(CacheError::Protocol("bulk reply missing CRLF".into()));
                    }
                    payload.truncate(len);
                    Ok(Reply::Bulk(Some(payload)))
                }
            }
        }
        "*" => {
            let len = parse_len(rest)?;
            match len {
                None => Ok(Reply::Array(None)),
                Some(len) => {
                    let mut items = Vec::with_capacity(len);
                    for _ in 0..len {
                        items.push(Box::pin(read_reply(reader)).await?);
                    }
                    Ok(Reply::Array(Some(items)))
                }
            }
        }
        other => Err(CacheError::Protocol(format!("unknown reply tag: {}", other))),
    }
}

/// Bulk/array length header; -1 is the nil marker.
fn parse_len(raw: &str) -> CacheResult<Option<usize>> {
    let n = raw
        .parse::<i64>()
        .map_err(|_| CacheError::Protocol(format!("bad length header: {}", raw)))?;
    if n < -1 {
        return Err(CacheError::Protocol(format!("bad length header: {}", raw)));
    }
    Ok(if n == -1 { None } else { Some(n as usize) })
}

async fn read_line<R>(reader: &mut R) -> CacheResult<String>
where
    R: AsyncBufRead + Unpin,
{
    let mut line = String::new();
    let n = reader.read_line(&mut line).await?;
    if n == 0 {
        return Err(CacheError::Protocol("connection closed mid-reply".into()));
    }
    if !line.ends_with("\r\n") {
        return Err(CacheError::Protocol("reply line missing CRLF".into()));
    }
    line.truncate(line.len() - 2);
    Ok(line)
}
