//! In-memory address book (spec §6, grounded on `AddressBook.{h,cpp}`):
//! resolves a hostname to a destination for `NAMING LOOKUP` (SAM) and
//! `HostLookup` (I2CP). Three layers, checked in order: an explicit
//! `local.csv`-style override map, the subscription-fed `addresses.csv`
//! map, and `<b32>.b32.i2p`/raw-base64 parsing. Fetching subscription
//! files over HTTP is an external collaborator — only the parsed-map side
//! is in scope here.

use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::identity::IdentHash;

pub const B32_SUFFIX: &str = ".b32.i2p";
/// Names longer than a plain 52-character b32 ident-hash encode a blinded
/// public key instead (spec §6, `AddressBook.h`'s `B33_ADDRESS_THRESHOLD`).
pub const B33_ADDRESS_THRESHOLD: usize = 52;

/// What a name resolved to, mirroring the reference's `eAddressIndentHash`
/// / `eAddressBlindedPublicKey` split. Blinded addresses still need the
/// identity's crypto layer to actually decrypt a lease set (see
/// `leaseset::destination`); this type only carries the parsed key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Address {
	IdentHash(IdentHash),
	BlindedPublicKey(Vec<u8>),
}

/// A source of subscription (`addresses.csv`) updates. The actual HTTP
/// fetch/parse-and-merge loop is external; this crate only needs the
/// resulting name/destination pairs.
pub trait SubscriptionFetch {
	fn fetch(&self) -> Result<Vec<(String, String)>>;
}

#[derive(Default)]
pub struct AddressBook {
	/// `local.csv`: always wins over the subscription map.
	local: HashMap<String, Address>,
	/// `addresses.csv`, merged from subscriptions.
	subscribed: HashMap<String, Address>,
}

fn parse_destination_token(token: &str) -> Result<Address> {
	if let Some(b32) = token.strip_suffix(B32_SUFFIX) {
		if b32.len() > B33_ADDRESS_THRESHOLD {
			// Longer than a plain ident-hash b32 encodes a blinded key
			// instead; hand the raw decoded bytes to the caller's crypto layer.
			let bytes = crate::codec::base32_decode(b32)?;
			return Ok(Address::BlindedPublicKey(bytes));
		}
		return Ok(Address::IdentHash(IdentHash::from_base32(b32)?));
	}
	// Otherwise treat it as a full base64 destination.
	let bytes = crate::codec::base64_decode(token)?;
	let identity = crate::identity::Identity::from_buffer(&bytes)?;
	Ok(Address::IdentHash(IdentHash::of(&identity.to_buffer())))
}

impl AddressBook {
	pub fn new() -> AddressBook {
		AddressBook::default()
	}

	/// Parses a `name,destination` CSV line into the override map (the
	/// `local.csv` layer).
	pub fn add_local(&mut self, name: &str, destination_token: &str) -> Result<()> {
		let address = parse_destination_token(destination_token)?;
		self.local.insert(name.to_string(), address);
		Ok(())
	}

	pub fn remove_local(&mut self, name: &str) {
		self.local.remove(name);
	}

	/// Merges a batch of `(name, destination)` pairs fetched from a
	/// subscription source into the subscribed layer. Malformed entries are
	/// skipped rather than aborting the whole batch.
	pub fn merge_subscribed(&mut self, entries: Vec<(String, String)>) {
		for (name, token) in entries {
			if let Ok(address) = parse_destination_token(&token) {
				self.subscribed.insert(name, address);
			}
		}
	}

	pub fn refresh_from(&mut self, source: &dyn SubscriptionFetch) -> Result<()> {
		let entries = source.fetch()?;
		self.merge_subscribed(entries);
		Ok(())
	}

	/// Resolves `name`: `local.csv` override, then the subscribed map, then
	/// direct `<b32>.b32.i2p`/base64 parsing of the name itself.
	pub fn get_address(&self, name: &str) -> Result<Address> {
		if let Some(addr) = self.local.get(name) {
			return Ok(addr.clone());
		}
		if let Some(addr) = self.subscribed.get(name) {
			return Ok(addr.clone());
		}
		parse_destination_token(name).map_err(|_| Error::NotFound(name.to_string()))
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::identity::PrivateKeys;

	#[test]
	fn local_override_wins_over_subscribed() {
		let mut book = AddressBook::new();
		let hash_a = IdentHash::of(b"a");
		let hash_b = IdentHash::of(b"b");
		book.merge_subscribed(vec![("site.i2p".to_string(), format!("{}{}", hash_a.to_base32(), B32_SUFFIX))]);
		book.add_local("site.i2p", &format!("{}{}", hash_b.to_base32(), B32_SUFFIX)).unwrap();
		assert_eq!(book.get_address("site.i2p").unwrap(), Address::IdentHash(hash_b));
	}

	#[test]
	fn subscribed_map_resolves_when_no_override() {
		let mut book = AddressBook::new();
		let hash = IdentHash::of(b"c");
		book.merge_subscribed(vec![("other.i2p".to_string(), format!("{}{}", hash.to_base32(), B32_SUFFIX))]);
		assert_eq!(book.get_address("other.i2p").unwrap(), Address::IdentHash(hash));
	}

	#[test]
	fn direct_b32_name_resolves_without_any_map_entry() {
		let book = AddressBook::new();
		let hash = IdentHash::of(b"direct");
		let name = format!("{}{}", hash.to_base32(), B32_SUFFIX);
		assert_eq!(book.get_address(&name).unwrap(), Address::IdentHash(hash));
	}

	#[test]
	fn direct_base64_destination_resolves_to_its_ident_hash() {
		let book = AddressBook::new();
		let keys = PrivateKeys::generate_ed25519();
		let b64 = crate::codec::base64_encode(&keys.identity.to_buffer());
		assert_eq!(book.get_address(&b64).unwrap(), Address::IdentHash(*keys.identity.hash()));
	}

	#[test]
	fn unknown_name_is_not_found() {
		let book = AddressBook::new();
		assert!(book.get_address("nope.i2p").is_err());
	}

	#[test]
	fn remove_local_falls_back_to_subscribed() {
		let mut book = AddressBook::new();
		let hash = IdentHash::of(b"fallback");
		book.merge_subscribed(vec![("x.i2p".to_string(), format!("{}{}", hash.to_base32(), B32_SUFFIX))]);
		book.add_local("x.i2p", &format!("{}{}", IdentHash::of(b"other").to_base32(), B32_SUFFIX)).unwrap();
		book.remove_local("x.i2p");
		assert_eq!(book.get_address("x.i2p").unwrap(), Address::IdentHash(hash));
	}
}
