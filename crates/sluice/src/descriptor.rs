//! # Method Descriptors
//!
//! Static, build-time descriptions of service methods, and the wire-stable
//! [`MethodSignature`] derived from them.
//!
//! ## Invariants
//!
//! - A signature is the name followed by every parameter type name, each one
//!   written as a 7-bit varint length and its UTF-8 bytes. Two methods share a
//!   signature only if both the name and the parameter type sequence match.
//! - Signatures are compared by exact byte equality. Nothing is hashed.

use std::borrow::Borrow;
use std::fmt;

/// The declared shape of a method's successful result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReturnShape {
    /// Fire-and-forget: the result is awaited and discarded.
    Unit,
    /// A value of the named type.
    Value(&'static str),
}

/// A single service method, as emitted by `#[sluice::service]`.
#[derive(Debug, PartialEq, Eq)]
pub struct MethodDescriptor {
    pub service: &'static str,
    pub name: &'static str,
    /// Position of the method in its service's descriptor table.
    pub index: usize,
    /// Parameter type names, as written in the service definition.
    pub params: &'static [&'static str],
    pub returns: ReturnShape,
    /// True for plain `fn` methods, false for `async fn`.
    pub blocking: bool,
}

impl MethodDescriptor {
    pub fn signature(&self) -> MethodSignature {
        MethodSignature::of(self)
    }
}

impl fmt::Display for MethodDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}({})", self.service, self.name, self.params.join(", "))
    }
}

/// Wire-stable identifier of a method overload.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MethodSignature(Vec<u8>);

impl MethodSignature {
    pub fn of(method: &MethodDescriptor) -> Self {
        let mut buf = Vec::with_capacity(
            method.name.len() + method.params.iter().map(|p| p.len() + 1).sum::<usize>() + 1,
        );
        write_str(&mut buf, method.name);
        for param in method.params {
            write_str(&mut buf, param);
        }
        Self(buf)
    }

    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }
}

impl Borrow<[u8]> for MethodSignature {
    fn borrow(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for MethodSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

fn write_str(buf: &mut Vec<u8>, s: &str) {
    write_varint(buf, s.len() as u64);
    buf.extend_from_slice(s.as_bytes());
}

fn write_varint(buf: &mut Vec<u8>, mut value: u64) {
    while value >= 0x80 {
        buf.push((value as u8) | 0x80);
        value >>= 7;
    }
    buf.push(value as u8);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn method(name: &'static str, params: &'static [&'static str]) -> MethodDescriptor {
        MethodDescriptor {
            service: "Test",
            name,
            index: 0,
            params,
            returns: ReturnShape::Unit,
            blocking: false,
        }
    }

    #[test]
    fn same_shape_same_signature() {
        let a = method("add", &["i32", "i32"]);
        let b = method("add", &["i32", "i32"]);
        assert_eq!(a.signature(), b.signature());
    }

    #[test]
    fn split_points_do_not_collide() {
        // plain concatenation would render both as "abc"
        let a = method("ab", &["c"]);
        let b = method("a", &["bc"]);
        let c = method("abc", &[]);
        assert_ne!(a.signature(), b.signature());
        assert_ne!(a.signature(), c.signature());
        assert_ne!(b.signature(), c.signature());
    }

    #[test]
    fn parameter_types_matter() {
        let a = method("put", &["String", "i64"]);
        let b = method("put", &["i64", "String"]);
        let c = method("put", &["String"]);
        assert_ne!(a.signature(), b.signature());
        assert_ne!(a.signature(), c.signature());
    }

    #[test]
    fn long_names_use_multibyte_lengths() {
        let name: &'static str = Box::leak("x".repeat(200).into_boxed_str());
        let sig = method(name, &[]).signature();
        assert_eq!(&sig.as_bytes()[..2], &[0xc8, 0x01]);
        assert_eq!(sig.as_bytes().len(), 202);
    }

    #[test]
    fn display_is_readable() {
        let m = method("add", &["i32", "i32"]);
        assert_eq!(m.to_string(), "Test.add(i32, i32)");
        assert_eq!(method("a", &[]).signature().to_string(), "0161");
    }
}
