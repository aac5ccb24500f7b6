//! Hydration markers and the matcher that recovers live regions from them.
//!
//! The server wraps every content interpolation as
//! `<!--TOKEN-->...<!--TOKEN-->`, where `TOKEN` is unique per slot within
//! its render pass. In the browser, [`MarkerMatcher::find`] walks the
//! server-rendered subtree and returns, in document order of the opening
//! markers, the nodes each slot owns, so components can adopt them instead
//! of re-creating them.

use std::cell::Cell;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

use crate::dom::Node;

/// Prefix shared by every marker token.
pub const MARKER_PREFIX: &str = "\u{1}:";

/// Pattern a comment must match to be treated as a marker.
pub const MARKER_PATTERN: &str = r"^\x{1}:[0-9a-zA-Z]+$";

static DEFAULT_PATTERN: Lazy<Regex> =
	Lazy::new(|| Regex::new(MARKER_PATTERN).expect("marker pattern is a valid regex"));

/// Errors that can occur during hydration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum HydrationError {
	/// An opening marker has no closing partner among its following siblings.
	#[error("hydration marker {token:?} is never closed")]
	UnclosedMarker { token: String },
	/// The container does not hold a root marker pair.
	#[error("container has no root marker pair to adopt")]
	MissingRootMarkers,
	/// A component's region holds a different number of marker pairs than
	/// its template has content slots.
	#[error("{component} expects {expected} marked regions, found {found}")]
	SlotMismatch {
		component: &'static str,
		expected: usize,
		found: usize,
	},
	#[error("invalid marker pattern: {0}")]
	InvalidPattern(String),
}

/// Generates marker tokens for one render pass.
#[derive(Debug, Default)]
pub struct MarkerTokens {
	seq: Cell<u64>,
}

impl MarkerTokens {
	pub fn new() -> Self {
		Self::default()
	}

	/// Returns a fresh token. The hash of `seed` keeps tokens opaque, the
	/// trailing sequence number keeps them unique.
	pub fn next(&self, seed: &str) -> String {
		let seq = self.seq.get();
		self.seq.set(seq + 1);
		let mut hasher = DefaultHasher::new();
		seed.hash(&mut hasher);
		seq.hash(&mut hasher);
		format!("{MARKER_PREFIX}{:016x}{seq}", hasher.finish())
	}
}

/// Wraps `html` in a marker pair carrying `token`.
pub fn wrap_markers(token: &str, html: &str) -> String {
	format!("<!--{token}-->{html}<!--{token}-->")
}

/// Nodes owned by one interpolation slot.
#[derive(Debug, Clone, Default)]
pub struct Slot {
	nodes: Vec<Node>,
	nested: Vec<Slot>,
}

impl Slot {
	/// Nodes strictly between the marker pair, inner markers included.
	pub fn nodes(&self) -> &[Node] {
		&self.nodes
	}

	/// Slots found inside this one.
	pub fn nested(&self) -> &[Slot] {
		&self.nested
	}

	pub fn into_nodes(self) -> Vec<Node> {
		self.nodes
	}

	pub fn is_empty(&self) -> bool {
		self.nodes.is_empty()
	}

	pub fn to_html(&self) -> String {
		self.nodes.iter().map(Node::to_html).collect()
	}
}

/// Recovers slots from marker comments.
#[derive(Debug, Clone)]
pub struct MarkerMatcher {
	pattern: Regex,
}

impl Default for MarkerMatcher {
	fn default() -> Self {
		Self {
			pattern: DEFAULT_PATTERN.clone(),
		}
	}
}

impl MarkerMatcher {
	/// Creates a matcher for a custom token pattern.
	pub fn new(pattern: &str) -> Result<Self, HydrationError> {
		let pattern =
			Regex::new(pattern).map_err(|error| HydrationError::InvalidPattern(error.to_string()))?;
		Ok(Self { pattern })
	}

	/// Returns the token when `node` is a marker comment.
	pub fn token(&self, node: &Node) -> Option<String> {
		node.comment_data()
			.filter(|data| self.pattern.is_match(data))
	}

	/// Finds the slots below `root`.
	pub fn find(&self, root: &Node) -> Result<Vec<Slot>, HydrationError> {
		self.find_in(&root.children())
	}

	/// Finds the slots in a sequence of sibling nodes and their descendants.
	pub fn find_in(&self, nodes: &[Node]) -> Result<Vec<Slot>, HydrationError> {
		let mut slots = Vec::new();
		self.walk(nodes, &mut slots)?;
		Ok(slots)
	}

	fn walk(&self, nodes: &[Node], slots: &mut Vec<Slot>) -> Result<(), HydrationError> {
		let mut index = 0;
		while index < nodes.len() {
			let node = &nodes[index];
			if let Some(token) = self.token(node) {
				let close = nodes[index + 1..]
					.iter()
					.position(|sibling| sibling.comment_data().as_deref() == Some(token.as_str()))
					.map(|offset| index + 1 + offset)
					.ok_or(HydrationError::UnclosedMarker { token })?;
				let owned = nodes[index + 1..close].to_vec();
				let nested = self.find_in(&owned)?;
				slots.push(Slot {
					nodes: owned,
					nested,
				});
				index = close;
			} else if node.is_element() {
				self.walk(&node.children(), slots)?;
			}
			index += 1;
		}
		Ok(())
	}
}
