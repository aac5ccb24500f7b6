//! Route path patterns.
//!
//! Supported syntax, segment by segment:
//!
//! - literal segments, matched verbatim;
//! - `:name`, one non-empty segment captured as `name`;
//! - `:name?`, an optional segment;
//! - a trailing `*`, the (possibly empty) rest of the path captured as `wild`.
//!
//! Matching is anchored at both ends and tolerates one trailing slash.

use std::collections::BTreeMap;

use regex::Regex;

use super::RouterError;

/// Name of the parameter a trailing `*` is captured as.
pub const WILDCARD_PARAM: &str = "wild";

/// A compiled path pattern.
#[derive(Debug, Clone)]
pub struct PathPattern {
	source: String,
	regex: Regex,
	keys: Vec<String>,
}

impl PathPattern {
	pub fn compile(pattern: &str) -> Result<Self, RouterError> {
		let mut expression = String::from("^");
		let mut keys = Vec::new();

		for segment in pattern.split('/').filter(|segment| !segment.is_empty()) {
			if segment == "*" {
				expression.push_str("(?:/(.*))?");
				keys.push(WILDCARD_PARAM.to_string());
			} else if let Some(name) = segment.strip_prefix(':') {
				let (name, optional) = match name.strip_suffix('?') {
					Some(name) => (name, true),
					None => (name, false),
				};
				if name.is_empty() {
					return Err(RouterError::InvalidPattern {
						pattern: pattern.to_string(),
						message: "parameter without a name".to_string(),
					});
				}
				expression.push_str(if optional { "(?:/([^/]+))?" } else { "/([^/]+)" });
				keys.push(name.to_string());
			} else {
				expression.push('/');
				expression.push_str(&regex::escape(segment));
			}
		}
		expression.push_str("/?$");

		let regex = Regex::new(&expression).map_err(|error| RouterError::InvalidPattern {
			pattern: pattern.to_string(),
			message: error.to_string(),
		})?;
		Ok(Self {
			source: pattern.to_string(),
			regex,
			keys,
		})
	}

	/// The pattern as written.
	pub fn source(&self) -> &str {
		&self.source
	}

	/// Parameter names in pattern order.
	pub fn keys(&self) -> &[String] {
		&self.keys
	}

	/// Prefix handed to nested routers: the pattern without its wildcard.
	pub fn prefix(&self) -> &str {
		let trimmed = self.source.strip_suffix('*').unwrap_or(&self.source);
		trimmed.strip_suffix('/').unwrap_or(trimmed)
	}

	/// Matches `path`, returning its decoded parameters.
	pub fn matches(&self, path: &str) -> Option<BTreeMap<String, String>> {
		let captures = self.regex.captures(path)?;
		let params = self
			.keys
			.iter()
			.enumerate()
			.filter_map(|(index, key)| {
				let raw = captures.get(index + 1)?.as_str();
				let value = urlencoding::decode(raw)
					.map(|decoded| decoded.into_owned())
					.unwrap_or_else(|_| raw.to_string());
				Some((key.clone(), value))
			})
			.collect();
		Some(params)
	}
}
