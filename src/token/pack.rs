//! Little-endian packing used by the access-token layout.
//!
//! Byte strings are prefixed with a `u16` length; privilege maps are a `u16` count followed by
//! `(u16 privilege, u32 expiry)` pairs in ascending privilege order.

// self
use crate::{_prelude::*, token::SigningError};

#[derive(Debug, Default)]
pub(crate) struct Packer(Vec<u8>);
impl Packer {
	pub(crate) fn put_u16(&mut self, value: u16) -> &mut Self {
		self.0.extend_from_slice(&value.to_le_bytes());

		self
	}

	pub(crate) fn put_u32(&mut self, value: u32) -> &mut Self {
		self.0.extend_from_slice(&value.to_le_bytes());

		self
	}

	pub(crate) fn put_bytes(&mut self, bytes: &[u8]) -> Result<&mut Self, SigningError> {
		let len = u16::try_from(bytes.len())
			.map_err(|_| SigningError::Malformed { reason: "field exceeds 65535 bytes" })?;

		self.put_u16(len);
		self.0.extend_from_slice(bytes);

		Ok(self)
	}

	pub(crate) fn put_privileges(
		&mut self,
		privileges: &BTreeMap<u16, u32>,
	) -> Result<&mut Self, SigningError> {
		let count = u16::try_from(privileges.len())
			.map_err(|_| SigningError::Malformed { reason: "too many privileges" })?;

		self.put_u16(count);

		for (privilege, expiry) in privileges {
			self.put_u16(*privilege).put_u32(*expiry);
		}

		Ok(self)
	}

	pub(crate) fn into_bytes(self) -> Vec<u8> {
		self.0
	}
}

#[derive(Debug)]
pub(crate) struct Unpacker<'a> {
	buf: &'a [u8],
}
impl<'a> Unpacker<'a> {
	pub(crate) fn new(buf: &'a [u8]) -> Self {
		Self { buf }
	}

	fn take(&mut self, len: usize) -> Result<&'a [u8], SigningError> {
		if self.buf.len() < len {
			return Err(SigningError::Malformed { reason: "unexpected end of token" });
		}

		let (head, tail) = self.buf.split_at(len);

		self.buf = tail;

		Ok(head)
	}

	pub(crate) fn get_u16(&mut self) -> Result<u16, SigningError> {
		let bytes = self.take(2)?;

		Ok(u16::from_le_bytes([bytes[0], bytes[1]]))
	}

	pub(crate) fn get_u32(&mut self) -> Result<u32, SigningError> {
		let bytes = self.take(4)?;

		Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
	}

	pub(crate) fn get_bytes(&mut self) -> Result<&'a [u8], SigningError> {
		let len = self.get_u16()?;

		self.take(len as usize)
	}

	pub(crate) fn get_privileges(&mut self) -> Result<BTreeMap<u16, u32>, SigningError> {
		let count = self.get_u16()?;
		let mut privileges = BTreeMap::new();

		for _ in 0..count {
			let privilege = self.get_u16()?;
			let expiry = self.get_u32()?;

			privileges.insert(privilege, expiry);
		}

		Ok(privileges)
	}

	pub(crate) fn finish(self) -> Result<(), SigningError> {
		if self.buf.is_empty() {
			Ok(())
		} else {
			Err(SigningError::Malformed { reason: "trailing bytes after token content" })
		}
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn layout_is_little_endian_with_length_prefixes() {
		let mut packer = Packer::default();

		packer.put_u32(0x0102_0304);
		packer.put_bytes(b"ab").expect("Short byte strings should pack.");

		assert_eq!(packer.into_bytes(), vec![0x04, 0x03, 0x02, 0x01, 0x02, 0x00, b'a', b'b']);
	}

	#[test]
	fn privileges_pack_in_key_order() {
		let privileges = BTreeMap::from([(3_u16, 30_u32), (1, 10)]);
		let mut packer = Packer::default();

		packer.put_privileges(&privileges).expect("Small privilege maps should pack.");

		let bytes = packer.into_bytes();

		assert_eq!(&bytes[..4], &[0x02, 0x00, 0x01, 0x00]);

		let mut unpacker = Unpacker::new(&bytes);

		assert_eq!(unpacker.get_privileges().expect("Packed map should unpack."), privileges);
		unpacker.finish().expect("Nothing should trail the map.");
	}

	#[test]
	fn truncated_input_is_rejected() {
		let mut unpacker = Unpacker::new(&[0x05, 0x00, b'a']);

		assert!(matches!(unpacker.get_bytes(), Err(SigningError::Malformed { .. })));
	}
}
