//! BOB line tokenizer (spec §4.4.2): every command is a bare word optionally
//! followed by one argument token (itself possibly a `k=v` pair for
//! `option`). Replies are always exactly one line, `OK ...` or
//! `ERROR ...`.

use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BobCommand {
	pub verb: String,
	pub arg: Option<String>,
}

/// Splits one BOB line into its verb and (at most one) trailing argument.
/// `\r` is tolerated and stripped, matching the other line protocols here.
pub fn parse_line(line: &str) -> Result<BobCommand> {
	let line = line.trim_end_matches('\r').trim();
	if line.is_empty() {
		return Err(Error::Protocol("empty BOB command line".into()));
	}
	let mut parts = line.splitn(2, char::is_whitespace);
	let verb = parts.next().unwrap().to_lowercase();
	let arg = parts.next().map(|s| s.trim_start().to_string()).filter(|s| !s.is_empty());
	Ok(BobCommand { verb, arg })
}

pub fn ok(message: &str) -> String {
	if message.is_empty() {
		"OK\n".to_string()
	} else {
		format!("OK {message}\n")
	}
}

pub fn error(message: &str) -> String {
	format!("ERROR {message}\n")
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn parses_bare_verb() {
		let cmd = parse_line("list\r\n").unwrap();
		assert_eq!(cmd.verb, "list");
		assert_eq!(cmd.arg, None);
	}

	#[test]
	fn parses_verb_with_argument() {
		let cmd = parse_line("setnick mytunnel").unwrap();
		assert_eq!(cmd.verb, "setnick");
		assert_eq!(cmd.arg.as_deref(), Some("mytunnel"));
	}

	#[test]
	fn parses_option_key_value_argument_verbatim() {
		let cmd = parse_line("option inbound.length=2").unwrap();
		assert_eq!(cmd.verb, "option");
		assert_eq!(cmd.arg.as_deref(), Some("inbound.length=2"));
	}

	#[test]
	fn verb_is_case_insensitive() {
		let cmd = parse_line("SETNICK foo").unwrap();
		assert_eq!(cmd.verb, "setnick");
	}

	#[test]
	fn reply_formatting() {
		assert_eq!(ok(""), "OK\n");
		assert_eq!(ok("Listening"), "OK Listening\n");
		assert_eq!(error("tunnel nickname not set"), "ERROR tunnel nickname not set\n");
	}
}
