//! Pluggable wire encoding for the PacketEncodingLayer.
//!
//! The layer itself depends only on the [`Encoder`] trait; this module
//! ships two implementations:
//!
//! - [`TlvEncoder`] — the default binary NDN-style TLV encoding.
//! - [`TextEncoder`] — the line-oriented `TYPE:NAME[:PAYLOAD]` form
//!   fixed at the wire-format level, handy for manual testing.

use crate::error::{Error, NackReason};
use crate::name::Name;
use crate::packet::{Content, Interest, Nack, Packet};
use crate::tlv::{self, TlvElement};
use bytes::{Buf, Bytes, BytesMut};

/// Contract a pluggable wire codec must satisfy.
pub trait Encoder: Send + Sync {
    fn encode(&self, packet: &Packet) -> Result<Bytes, Error>;
    fn decode(&self, wire_data: &[u8]) -> Result<Packet, Error>;
}

/// Binary NDN-style TLV encoding: one outer TLV (INTEREST/DATA/NACK)
/// wrapping a NAME TLV and, for Content/Nack, further fields.
#[derive(Debug, Default, Clone, Copy)]
pub struct TlvEncoder;

impl Encoder for TlvEncoder {
    fn encode(&self, packet: &Packet) -> Result<Bytes, Error> {
        let mut inner = BytesMut::new();
        let outer_type = match packet {
            Packet::Interest(Interest { name }) => {
                name.to_tlv().encode(&mut inner);
                tlv::TLV_INTEREST
            }
            Packet::Content(Content { name, payload }) => {
                name.to_tlv().encode(&mut inner);
                TlvElement::new(tlv::TLV_CONTENT, payload.clone()).encode(&mut inner);
                tlv::TLV_DATA
            }
            Packet::Nack(Nack {
                name,
                reason,
                originating_interest,
            }) => {
                name.to_tlv().encode(&mut inner);
                TlvElement::new(tlv::TLV_NACK_REASON, vec![*reason as u8]).encode(&mut inner);
                if let Some(orig) = originating_interest {
                    orig.name.to_tlv().encode(&mut inner);
                }
                tlv::TLV_NACK
            }
        };

        let mut outer = BytesMut::new();
        TlvElement::new(outer_type, inner.freeze()).encode(&mut outer);
        Ok(outer.freeze())
    }

    fn decode(&self, wire_data: &[u8]) -> Result<Packet, Error> {
        let mut buf = Bytes::copy_from_slice(wire_data);
        let outer = TlvElement::decode(&mut buf)?;
        let mut inner = outer.value.clone();

        match outer.tlv_type {
            tlv::TLV_INTEREST => {
                let name_tlv = TlvElement::decode(&mut inner)?;
                let name = Name::from_tlv(&name_tlv)?;
                Ok(Interest::new(name).into())
            }
            tlv::TLV_DATA => {
                let name_tlv = TlvElement::decode(&mut inner)?;
                let name = Name::from_tlv(&name_tlv)?;
                let content_tlv = TlvElement::decode(&mut inner)?;
                if content_tlv.tlv_type != tlv::TLV_CONTENT {
                    return Err(Error::Decode(format!(
                        "expected content TLV type {}, got {}",
                        tlv::TLV_CONTENT,
                        content_tlv.tlv_type
                    )));
                }
                Ok(Content::new(name, content_tlv.value).into())
            }
            tlv::TLV_NACK => {
                let name_tlv = TlvElement::decode(&mut inner)?;
                let name = Name::from_tlv(&name_tlv)?;
                let reason_tlv = TlvElement::decode(&mut inner)?;
                if reason_tlv.tlv_type != tlv::TLV_NACK_REASON || reason_tlv.value.is_empty() {
                    return Err(Error::Decode("malformed Nack reason TLV".into()));
                }
                let reason = decode_reason(reason_tlv.value[0])?;
                let originating_interest = if inner.has_remaining() {
                    let orig_tlv = TlvElement::decode(&mut inner)?;
                    Some(Interest::new(Name::from_tlv(&orig_tlv)?))
                } else {
                    None
                };
                Ok(Nack {
                    name,
                    reason,
                    originating_interest,
                }
                .into())
            }
            other => Err(Error::Decode(format!("unknown outer TLV type {}", other))),
        }
    }
}

fn decode_reason(byte: u8) -> Result<NackReason, Error> {
    match byte {
        0 => Ok(NackReason::NoContent),
        1 => Ok(NackReason::CompNotRunning),
        2 => Ok(NackReason::NotSet),
        3 => Ok(NackReason::NoRoute),
        other => Err(Error::Decode(format!("unknown Nack reason byte {}", other))),
    }
}

/// Line-oriented text encoding: `TYPE:NAME[:PAYLOAD]`, TYPE in {I, D,
/// N}. Content/Nack payload bytes are hex-encoded so arbitrary binary
/// content survives a single newline-terminated text line.
#[derive(Debug, Default, Clone, Copy)]
pub struct TextEncoder;

impl Encoder for TextEncoder {
    fn encode(&self, packet: &Packet) -> Result<Bytes, Error> {
        let line = match packet {
            Packet::Interest(Interest { name }) => format!("I:{}", name),
            Packet::Content(Content { name, payload }) => {
                format!("D:{}:{}", name, hex_encode(payload))
            }
            Packet::Nack(Nack { name, reason, .. }) => {
                format!("N:{}:{}", name, *reason as u8)
            }
        };
        Ok(Bytes::from(format!("{}\n", line)))
    }

    fn decode(&self, wire_data: &[u8]) -> Result<Packet, Error> {
        let text = std::str::from_utf8(wire_data)
            .map_err(|e| Error::Decode(format!("not valid utf-8: {}", e)))?
            .trim_end_matches(['\n', '\r']);

        let mut parts = text.splitn(3, ':');
        let ty = parts
            .next()
            .ok_or_else(|| Error::Decode("empty line".into()))?;
        let name_str = parts
            .next()
            .ok_or_else(|| Error::Decode("missing name field".into()))?;
        let name = Name::from_string(name_str);

        match ty {
            "I" => Ok(Interest::new(name).into()),
            "D" => {
                let payload_hex = parts.next().unwrap_or("");
                let payload = hex_decode(payload_hex)?;
                Ok(Content::new(name, payload).into())
            }
            "N" => {
                let reason_str = parts
                    .next()
                    .ok_or_else(|| Error::Decode("missing Nack reason field".into()))?;
                let reason_byte: u8 = reason_str
                    .parse()
                    .map_err(|_| Error::Decode(format!("invalid Nack reason {}", reason_str)))?;
                Ok(Nack::new(name, decode_reason(reason_byte)?).into())
            }
            other => Err(Error::Decode(format!("unknown packet type tag {:?}", other))),
        }
    }
}

fn hex_encode(bytes: &[u8]) -> String {
    use std::fmt::Write;
    let mut s = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        let _ = write!(s, "{:02x}", b);
    }
    s
}

fn hex_decode(s: &str) -> Result<Vec<u8>, Error> {
    if s.len() % 2 != 0 {
        return Err(Error::Decode("odd-length hex payload".into()));
    }
    (0..s.len())
        .step_by(2)
        .map(|i| {
            u8::from_str_radix(&s[i..i + 2], 16)
                .map_err(|_| Error::Decode(format!("invalid hex byte at offset {}", i)))
        })
        .collect()
}
