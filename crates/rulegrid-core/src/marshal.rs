// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Context marshaling for queue persistence and remote transfer.
//!
//! Layout (all integers big-endian):
//! - 4 bytes: magic `RGCX`
//! - 1 byte: format version
//! - ambient: zone, user, client host (u16-length strings), status (i32)
//! - u32 binding count, then per binding: name (u16-length), tag (u8),
//!   payload (u32-length bytes, or for records a u32 pair count followed by
//!   u16-length keys and u32-length values)
//! - u32 argument count, then u32-length argument strings

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::context::{
    BUFFER_TAG, ExecContext, RECORD_TAG, Record, STRING_TAG, SessionInfo, Value,
};
use crate::error::{DispatchError, Result};

/// Leading bytes of every packed context.
pub const MAGIC: &[u8; 4] = b"RGCX";

/// Current format version.
pub const FORMAT_VERSION: u8 = 1;

/// Default maximum packed size (64 MB).
pub const DEFAULT_MAX_PACKED_SIZE: usize = 64 * 1024 * 1024;

/// Packs and unpacks execution contexts.
#[derive(Debug, Clone, Copy)]
pub struct Marshaler {
    max_packed_size: usize,
}

impl Default for Marshaler {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_PACKED_SIZE)
    }
}

impl Marshaler {
    /// Create a marshaler with a packed-size limit.
    pub fn new(max_packed_size: usize) -> Self {
        Self { max_packed_size }
    }

    /// Serialize a context and call arguments.
    pub fn pack(&self, context: &ExecContext, call_args: &[String]) -> Result<Bytes> {
        let mut buf = BytesMut::with_capacity(256);
        buf.put_slice(MAGIC);
        buf.put_u8(FORMAT_VERSION);

        put_short_str(&mut buf, "zone", &context.zone)?;
        put_short_str(&mut buf, "user", &context.session.user_name)?;
        put_short_str(&mut buf, "client host", &context.session.client_host)?;
        buf.put_i32(context.status);

        buf.put_u32(count_u32("bindings", context.len())?);
        for (name, value) in context.iter() {
            put_short_str(&mut buf, "binding name", name)?;
            buf.put_u8(value.tag());
            match value {
                Value::Str(s) => put_long_bytes(&mut buf, name, s.as_bytes())?,
                Value::Buf(b) => put_long_bytes(&mut buf, name, b)?,
                Value::Record(record) => {
                    buf.put_u32(count_u32(name, record.len())?);
                    for (key, val) in record.iter() {
                        put_short_str(&mut buf, name, key)?;
                        put_long_bytes(&mut buf, name, val.as_bytes())?;
                    }
                }
            }
            self.check_size(buf.len())?;
        }

        buf.put_u32(count_u32("arguments", call_args.len())?);
        for arg in call_args {
            put_long_bytes(&mut buf, "argument", arg.as_bytes())?;
        }
        self.check_size(buf.len())?;

        Ok(buf.freeze())
    }

    /// Reconstruct a context and its call arguments.
    pub fn unpack(&self, packed: &[u8]) -> Result<(ExecContext, Vec<String>)> {
        self.check_size(packed.len())?;
        let mut buf = packed;

        if buf.remaining() < MAGIC.len() + 1 || &buf[..MAGIC.len()] != MAGIC {
            return Err(DispatchError::marshal("not a packed context"));
        }
        buf.advance(MAGIC.len());
        let version = buf.get_u8();
        if version != FORMAT_VERSION {
            return Err(DispatchError::marshal(format!(
                "unsupported format version {version}"
            )));
        }

        let zone = get_short_str(&mut buf)?;
        let user_name = get_short_str(&mut buf)?;
        let client_host = get_short_str(&mut buf)?;
        need(&buf, 4)?;
        let status = buf.get_i32();

        let mut context = ExecContext::new(
            SessionInfo {
                user_name,
                client_host,
            },
            zone,
        );
        context.status = status;

        need(&buf, 4)?;
        let count = buf.get_u32();
        for _ in 0..count {
            let name = get_short_str(&mut buf)?;
            need(&buf, 1)?;
            let value = match buf.get_u8() {
                STRING_TAG => Value::Str(get_long_str(&mut buf)?),
                BUFFER_TAG => Value::Buf(get_long_bytes(&mut buf)?.to_vec()),
                RECORD_TAG => {
                    need(&buf, 4)?;
                    let pairs = buf.get_u32();
                    let mut record = Record::new();
                    for _ in 0..pairs {
                        let key = get_short_str(&mut buf)?;
                        let val = get_long_str(&mut buf)?;
                        record.push(key, val);
                    }
                    Value::Record(record)
                }
                tag => return Err(DispatchError::UnsupportedShape { name, tag }),
            };
            if context.set(name.clone(), value).is_some() {
                return Err(DispatchError::marshal(format!(
                    "binding '{name}' appears twice"
                )));
            }
        }

        need(&buf, 4)?;
        let arg_count = buf.get_u32();
        let mut args = Vec::new();
        for _ in 0..arg_count {
            args.push(get_long_str(&mut buf)?);
        }

        if buf.has_remaining() {
            return Err(DispatchError::marshal(format!(
                "{} trailing bytes after packed context",
                buf.remaining()
            )));
        }

        Ok((context, args))
    }

    fn check_size(&self, len: usize) -> Result<()> {
        if len > self.max_packed_size {
            return Err(DispatchError::marshal(format!(
                "packed context too large: {len} bytes (max: {})",
                self.max_packed_size
            )));
        }
        Ok(())
    }
}

fn count_u32(what: &str, n: usize) -> Result<u32> {
    u32::try_from(n).map_err(|_| DispatchError::marshal(format!("too many {what}: {n}")))
}

fn put_short_str(buf: &mut BytesMut, what: &str, s: &str) -> Result<()> {
    let len = u16::try_from(s.len())
        .map_err(|_| DispatchError::marshal(format!("{what} is longer than 65535 bytes")))?;
    buf.put_u16(len);
    buf.put_slice(s.as_bytes());
    Ok(())
}

fn put_long_bytes(buf: &mut BytesMut, what: &str, b: &[u8]) -> Result<()> {
    let len = u32::try_from(b.len())
        .map_err(|_| DispatchError::marshal(format!("value of '{what}' is too large")))?;
    buf.put_u32(len);
    buf.put_slice(b);
    Ok(())
}

fn need(buf: &&[u8], n: usize) -> Result<()> {
    if buf.remaining() < n {
        return Err(DispatchError::marshal("packed context is truncated"));
    }
    Ok(())
}

fn take<'a>(buf: &mut &'a [u8], n: usize) -> Result<&'a [u8]> {
    need(buf, n)?;
    let slice: &'a [u8] = *buf;
    let (head, tail) = slice.split_at(n);
    *buf = tail;
    Ok(head)
}

fn utf8(bytes: &[u8]) -> Result<String> {
    String::from_utf8(bytes.to_vec())
        .map_err(|_| DispatchError::marshal("text field is not valid UTF-8"))
}

fn get_short_str(buf: &mut &[u8]) -> Result<String> {
    need(buf, 2)?;
    let len = usize::from(buf.get_u16());
    utf8(take(buf, len)?)
}

fn get_long_bytes<'a>(buf: &mut &'a [u8]) -> Result<&'a [u8]> {
    need(buf, 4)?;
    let len = buf.get_u32() as usize;
    take(buf, len)
}

fn get_long_str(buf: &mut &[u8]) -> Result<String> {
    utf8(get_long_bytes(buf)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ExecContext {
        let mut ctx = ExecContext::new(
            SessionInfo {
                user_name: "alice".to_string(),
                client_host: "192.168.1.20".to_string(),
            },
            "archiveZone",
        );
        ctx.status = -3;
        ctx.set("*path", "/archiveZone/home/alice/data.csv");
        ctx.set("*blob", vec![0u8, 255, 10, 13, 0]);
        ctx.set("*empty", "");
        ctx.set(
            "*meta",
            Record::from_iter([("owner", "alice"), ("owner", "bob"), ("size", "42")]),
        );
        ctx
    }

    #[test]
    fn test_pack_unpack_restores_every_binding() {
        let m = Marshaler::default();
        let ctx = sample();
        let packed = m.pack(&ctx, &[]).unwrap();
        let (restored, args) = m.unpack(&packed).unwrap();

        assert!(restored.same_bindings(&ctx));
        assert_eq!(restored, ctx);
        assert!(args.is_empty());
    }

    #[test]
    fn test_call_args_survive() {
        let m = Marshaler::default();
        let args = vec!["first".to_string(), String::new(), "ünïcode".to_string()];
        let packed = m.pack(&sample(), &args).unwrap();
        let (_, restored) = m.unpack(&packed).unwrap();
        assert_eq!(restored, args);
    }

    #[test]
    fn test_packed_bytes_start_with_magic() {
        let packed = Marshaler::default()
            .pack(&ExecContext::default(), &[])
            .unwrap();
        assert_eq!(&packed[..4], MAGIC);
        assert_eq!(packed[4], FORMAT_VERSION);
    }

    #[test]
    fn test_unknown_tag_is_unsupported_shape() {
        let m = Marshaler::default();
        let mut ctx = ExecContext::default();
        ctx.set("x", "y");
        let mut packed = m.pack(&ctx, &[]).unwrap().to_vec();

        // magic + version + 3 empty strings + status + count + name
        let tag_offset = 4 + 1 + 6 + 4 + 4 + 2 + 1;
        assert_eq!(packed[tag_offset], STRING_TAG);
        packed[tag_offset] = 9;

        let err = m.unpack(&packed).unwrap_err();
        assert_eq!(
            err,
            DispatchError::UnsupportedShape {
                name: "x".to_string(),
                tag: 9
            }
        );
    }

    #[test]
    fn test_rejects_damaged_input() {
        let m = Marshaler::default();
        let packed = m.pack(&sample(), &["a".to_string()]).unwrap();

        assert!(m.unpack(b"nope").is_err());
        assert!(m.unpack(&packed[..packed.len() - 1]).is_err());

        let mut trailing = packed.to_vec();
        trailing.push(0);
        assert_eq!(m.unpack(&trailing).unwrap_err().error_code(), "MARSHAL_ERROR");

        let mut bad_version = packed.to_vec();
        bad_version[4] = 99;
        assert!(m.unpack(&bad_version).is_err());
    }

    #[test]
    fn test_size_limit() {
        let m = Marshaler::new(64);
        let mut ctx = ExecContext::default();
        ctx.set("*big", vec![7u8; 128]);
        assert_eq!(m.pack(&ctx, &[]).unwrap_err().error_code(), "MARSHAL_ERROR");
    }
}
