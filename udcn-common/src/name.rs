//! NDN-style names: ordered sequences of opaque byte components.
//!
//! A distinguished trailing component (`NFN`) marks a name as a
//! function-evaluation request; a component placed immediately before
//! it (`KEEPALIVE`) marks a keep-alive variant of that request. Both
//! markers are recognized strictly by position, never by scanning the
//! whole name for a matching component — see the "Keep-alive name
//! manipulation" note.

use crate::error::Error;
use crate::tlv::{self, TlvElement};
use bytes::{Buf, Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Trailing component that marks a name as an NFN expression.
pub const NFN_MARKER: &[u8] = b"NFN";
/// Component inserted immediately before `NFN` to mark a keep-alive.
pub const KEEPALIVE_MARKER: &[u8] = b"KEEPALIVE";

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NameComponent(pub Bytes);

impl NameComponent {
    pub fn new(bytes: impl Into<Bytes>) -> Self {
        Self(bytes.into())
    }

    pub fn as_bytes(&self) -> &Bytes {
        &self.0
    }

    pub fn to_tlv(&self) -> TlvElement {
        TlvElement::new(tlv::TLV_COMPONENT, self.0.clone())
    }

    pub fn from_tlv(element: &TlvElement) -> Result<Self, Error> {
        if element.tlv_type != tlv::TLV_COMPONENT {
            return Err(Error::NdnPacket(format!(
                "expected name component TLV type {}, got {}",
                tlv::TLV_COMPONENT,
                element.tlv_type
            )));
        }
        Ok(Self(element.value.clone()))
    }
}

impl fmt::Display for NameComponent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let printable = self.0.iter().all(|&b| b.is_ascii_graphic() || b == b' ');
        if printable {
            write!(f, "{}", String::from_utf8_lossy(&self.0))
        } else {
            write!(f, "0x")?;
            for &b in &self.0 {
                write!(f, "{:02x}", b)?;
            }
            Ok(())
        }
    }
}

impl<T: Into<Bytes>> From<T> for NameComponent {
    fn from(value: T) -> Self {
        Self::new(value)
    }
}

/// An ordered sequence of opaque byte components. Equality is
/// componentwise.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub struct Name {
    components: Vec<NameComponent>,
}

impl Name {
    pub fn new() -> Self {
        Self {
            components: Vec::new(),
        }
    }

    pub fn from_components(components: Vec<NameComponent>) -> Self {
        Self { components }
    }

    /// Parses a slash-delimited URI such as `/lib/f(/data)/NFN`. Empty
    /// components (leading/trailing/doubled slashes) are dropped.
    pub fn from_string(s: &str) -> Self {
        let components = s
            .split('/')
            .filter(|comp| !comp.is_empty())
            .map(|comp| NameComponent::new(comp.as_bytes().to_vec()))
            .collect();
        Self { components }
    }

    pub fn push(&mut self, component: impl Into<NameComponent>) -> &mut Self {
        self.components.push(component.into());
        self
    }

    pub fn with_pushed(mut self, component: impl Into<NameComponent>) -> Self {
        self.components.push(component.into());
        self
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    pub fn components(&self) -> &[NameComponent] {
        &self.components
    }

    pub fn get(&self, index: usize) -> Option<&NameComponent> {
        self.components.get(index)
    }

    pub fn last(&self) -> Option<&NameComponent> {
        self.components.last()
    }

    /// The component immediately before the last, if any.
    pub fn second_to_last(&self) -> Option<&NameComponent> {
        if self.components.len() < 2 {
            None
        } else {
            self.components.get(self.components.len() - 2)
        }
    }

    pub fn prefix(&self, len: usize) -> Self {
        Self {
            components: self.components.iter().take(len).cloned().collect(),
        }
    }

    /// True if `self` is a (not-necessarily-proper) prefix of `other`.
    pub fn is_prefix_of(&self, other: &Self) -> bool {
        if self.components.len() > other.components.len() {
            return false;
        }
        self.components
            .iter()
            .zip(other.components.iter())
            .all(|(a, b)| a == b)
    }

    /// True if the name's last component is the `NFN` marker.
    pub fn is_nfn(&self) -> bool {
        self.last().map(|c| c.as_bytes().as_ref() == NFN_MARKER).unwrap_or(false)
    }

    /// True if the name's second-to-last component is `KEEPALIVE` and
    /// the last is `NFN`.
    pub fn is_keep_alive(&self) -> bool {
        self.is_nfn()
            && self
                .second_to_last()
                .map(|c| c.as_bytes().as_ref() == KEEPALIVE_MARKER)
                .unwrap_or(false)
    }

    /// Inserts `KEEPALIVE` immediately before the trailing `NFN`
    /// component. Returns the name unchanged if it does not end in
    /// `NFN`. Operates strictly on the final position, never by
    /// scanning for a component equal to `"NFN"` elsewhere in the name.
    pub fn add_keep_alive(&self) -> Self {
        if !self.is_nfn() {
            return self.clone();
        }
        let mut components = self.components.clone();
        let nfn = components.pop().expect("checked is_nfn above");
        components.push(NameComponent::new(KEEPALIVE_MARKER.to_vec()));
        components.push(nfn);
        Self { components }
    }

    /// Inverse of [`Name::add_keep_alive`]. Returns the name unchanged
    /// if it is not already a keep-alive name.
    pub fn remove_keep_alive(&self) -> Self {
        if !self.is_keep_alive() {
            return self.clone();
        }
        let mut components = self.components.clone();
        let nfn = components.pop().expect("checked is_keep_alive above");
        components.pop(); // KEEPALIVE
        components.push(nfn);
        Self { components }
    }

    pub fn to_tlv(&self) -> TlvElement {
        let mut buf = BytesMut::new();
        for component in &self.components {
            component.to_tlv().encode(&mut buf);
        }
        TlvElement::new(tlv::TLV_NAME, buf.freeze())
    }

    pub fn from_tlv(element: &TlvElement) -> Result<Self, Error> {
        if element.tlv_type != tlv::TLV_NAME {
            return Err(Error::NdnPacket(format!(
                "expected name TLV type {}, got {}",
                tlv::TLV_NAME,
                element.tlv_type
            )));
        }

        let mut components = Vec::new();
        let mut buf = element.value.clone();
        while buf.has_remaining() {
            let e = TlvElement::decode(&mut buf)?;
            components.push(NameComponent::from_tlv(&e)?);
        }
        Ok(Self { components })
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.components.is_empty() {
            return write!(f, "/");
        }
        for component in &self.components {
            write!(f, "/{}", component)?;
        }
        Ok(())
    }
}
