//! SAM line-protocol tokenizer (spec §4.4.1): splits one command line into
//! its dotted-word command (`SESSION CREATE`, `STREAM CONNECT`, …) and a
//! `KEY=VALUE` parameter map, honouring double-quoted values. Rewritten
//! against nom 7's function-combinator style; the teacher's client-side
//! parser used the now-removed `named!`/`do_parse!` macros, which don't
//! exist in this version of nom.

use std::collections::HashMap;

use nom::branch::alt;
use nom::bytes::complete::{is_not, tag, take_till1};
use nom::character::complete::{alphanumeric1, char, space1};
use nom::combinator::map;
use nom::multi::separated_list0;
use nom::sequence::{delimited, separated_pair};
use nom::IResult;

use crate::error::{Error, Result};

fn quoted_value(input: &str) -> IResult<&str, &str> {
	delimited(char('"'), is_not("\""), char('"'))(input)
}

fn is_bare_value_char(c: char) -> bool {
	!c.is_whitespace()
}

fn bare_value(input: &str) -> IResult<&str, &str> {
	take_till1(|c: char| !is_bare_value_char(c))(input)
}

fn key_value(input: &str) -> IResult<&str, (&str, &str)> {
	separated_pair(alphanumeric1, char('='), alt((quoted_value, bare_value)))(input)
}

fn key_values(input: &str) -> IResult<&str, Vec<(&str, &str)>> {
	separated_list0(space1, key_value)(input)
}

/// A parsed SAM command line: the leading bare words (`["SESSION",
/// "CREATE"]`) and the trailing `KEY=VALUE` parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SamCommand {
	pub words: Vec<String>,
	pub params: HashMap<String, String>,
}

impl SamCommand {
	pub fn get(&self, key: &str) -> Option<&str> {
		self.params.get(key).map(|s| s.as_str())
	}

	pub fn is(&self, a: &str, b: &str) -> bool {
		self.words.len() >= 2 && self.words[0].eq_ignore_ascii_case(a) && self.words[1].eq_ignore_ascii_case(b)
	}
}

/// Parses one line (CRLF/LF already stripped by the caller's line reader).
pub fn parse_line(line: &str) -> Result<SamCommand> {
	let line = line.trim_end_matches('\r');
	let mut words = Vec::new();
	let mut rest = line;
	loop {
		rest = rest.trim_start_matches(' ');
		if rest.is_empty() {
			break;
		}
		// Stop consuming bare words once we hit the first `KEY=VALUE` token.
		if let Ok((_, (_, _))) = key_value(rest) {
			break;
		}
		match map(take_till1(|c: char| c.is_whitespace()), |w: &str| w.to_string())(rest) {
			Ok((remaining, word)) => {
				words.push(word);
				rest = remaining;
			}
			Err(_) => break,
		}
	}

	let (_, pairs) = key_values(rest).map_err(|e| Error::Protocol(format!("malformed SAM parameters: {e}")))?;
	let params = pairs.into_iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();

	if words.is_empty() {
		return Err(Error::Protocol("empty SAM command line".into()));
	}

	Ok(SamCommand { words, params })
}

/// `MIN=`/`MAX=` version tokens are `M.N` with numeric parts (leading
/// zeros ignored).
pub fn parse_version(token: &str) -> Option<(u32, u32)> {
	let (major, minor) = token.split_once('.')?;
	Some((major.parse().ok()?, minor.parse().ok()?))
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn parses_words_and_params() {
		let cmd = parse_line("SESSION CREATE STYLE=STREAM ID=foo DESTINATION=TRANSIENT\n").unwrap();
		assert_eq!(cmd.words, vec!["SESSION", "CREATE"]);
		assert_eq!(cmd.get("STYLE"), Some("STREAM"));
		assert_eq!(cmd.get("ID"), Some("foo"));
		assert!(cmd.is("SESSION", "CREATE"));
	}

	#[test]
	fn quoted_value_with_spaces() {
		let cmd = parse_line("STREAM STATUS RESULT=I2P_ERROR MESSAGE=\"Can't reach peer\"").unwrap();
		assert_eq!(cmd.get("MESSAGE"), Some("Can't reach peer"));
	}

	#[test]
	fn crlf_tolerated() {
		let cmd = parse_line("PING hello\r").unwrap();
		assert_eq!(cmd.words, vec!["PING", "hello"]);
	}

	#[test]
	fn version_token_parsing() {
		assert_eq!(parse_version("3.1"), Some((3, 1)));
		assert_eq!(parse_version("03.00"), Some((3, 0)));
		assert_eq!(parse_version("bogus"), None);
	}

	#[test]
	fn empty_line_is_rejected() {
		assert!(parse_line("").is_err());
	}
}
