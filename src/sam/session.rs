//! SAM session bookkeeping (spec §4.4.1): version negotiation, session
//! styles, and the `MASTER` sub-session registry. Deterministic state only
//! — the owning server wires this to actual sockets and destinations.

use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::sam::parser::parse_version;

pub const MIN_SUPPORTED: (u32, u32) = (3, 0);
pub const MAX_SUPPORTED: (u32, u32) = (3, 3);

/// Negotiates the highest version in `[min, max] ∩ [3.0, 3.3]` from the
/// `MIN=`/`MAX=` tokens of a `HELLO VERSION` line. Absent tokens default to
/// `3.0`; an empty intersection yields `None` (caller replies NOVERSION).
pub fn negotiate_version(min_token: Option<&str>, max_token: Option<&str>) -> Result<Option<(u32, u32)>> {
	let min = match min_token {
		Some(t) => parse_version(t).ok_or_else(|| Error::Protocol(format!("bad MIN version {t}")))?,
		None => MIN_SUPPORTED,
	};
	let max = match max_token {
		Some(t) => parse_version(t).ok_or_else(|| Error::Protocol(format!("bad MAX version {t}")))?,
		None => MIN_SUPPORTED,
	};

	let lower = min.max(MIN_SUPPORTED);
	let upper = max.min(MAX_SUPPORTED);
	if lower > upper {
		Ok(None)
	} else {
		Ok(Some(upper))
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStyle {
	Stream,
	Datagram,
	Datagram1,
	Datagram2,
	Datagram3,
	Raw,
	Master,
}

impl SessionStyle {
	pub fn parse(s: &str) -> Result<SessionStyle> {
		match s {
			"STREAM" => Ok(SessionStyle::Stream),
			"DATAGRAM" => Ok(SessionStyle::Datagram),
			"DATAGRAM1" => Ok(SessionStyle::Datagram1),
			"DATAGRAM2" => Ok(SessionStyle::Datagram2),
			"DATAGRAM3" => Ok(SessionStyle::Datagram3),
			"RAW" => Ok(SessionStyle::Raw),
			"MASTER" => Ok(SessionStyle::Master),
			other => Err(Error::Protocol(format!("unknown SESSION STYLE {other}"))),
		}
	}
}

/// `ID=` values must not contain any of `<>"'/` (spec §4.4.1).
pub fn validate_session_id(id: &str) -> Result<()> {
	if id.is_empty() || id.chars().any(|c| "<>\"'/".contains(c)) {
		return Err(Error::Protocol(format!("invalid SESSION ID {id:?}")));
	}
	Ok(())
}

pub struct SamSession {
	pub id: String,
	pub style: SessionStyle,
	pub negotiated_version: (u32, u32),
	/// Only populated for a `MASTER` session: attached sub-session IDs.
	pub sub_sessions: HashMap<String, SessionStyle>,
}

impl SamSession {
	pub fn new(id: String, style: SessionStyle, negotiated_version: (u32, u32)) -> SamSession {
		SamSession {
			id,
			style,
			negotiated_version,
			sub_sessions: HashMap::new(),
		}
	}

	/// `SESSION ADD`: only valid on a `MASTER` session, and requires SAM
	/// >= 3.3 per the MASTER style's own requirement.
	pub fn add_sub_session(&mut self, sub_id: String, style: SessionStyle) -> Result<()> {
		if self.style != SessionStyle::Master {
			return Err(Error::Protocol("SESSION ADD requires a MASTER session".into()));
		}
		validate_session_id(&sub_id)?;
		self.sub_sessions.insert(sub_id, style);
		Ok(())
	}

	pub fn remove_sub_session(&mut self, sub_id: &str) -> Result<()> {
		if self.sub_sessions.remove(sub_id).is_none() {
			return Err(Error::NotFound(format!("no sub-session {sub_id}")));
		}
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn negotiates_highest_common_version() {
		assert_eq!(negotiate_version(Some("3.0"), Some("3.3")).unwrap(), Some((3, 3)));
		assert_eq!(negotiate_version(Some("2.0"), Some("2.5")).unwrap(), None);
		assert_eq!(negotiate_version(None, None).unwrap(), Some((3, 0)));
	}

	#[test]
	fn master_requires_33_for_sub_session_style_but_add_checked_by_caller() {
		let mut master = SamSession::new("m".into(), SessionStyle::Master, (3, 3));
		master.add_sub_session("sub1".into(), SessionStyle::Stream).unwrap();
		assert!(master.sub_sessions.contains_key("sub1"));
	}

	#[test]
	fn add_sub_session_rejected_on_non_master() {
		let mut s = SamSession::new("s".into(), SessionStyle::Stream, (3, 3));
		assert!(s.add_sub_session("x".into(), SessionStyle::Stream).is_err());
	}

	#[test]
	fn session_id_rejects_forbidden_characters() {
		assert!(validate_session_id("good-id").is_ok());
		assert!(validate_session_id("bad<id>").is_err());
		assert!(validate_session_id("").is_err());
	}
}
