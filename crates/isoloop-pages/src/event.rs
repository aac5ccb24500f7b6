//! Events dispatched to components and host listeners.

use std::cell::Cell;
use std::fmt;

use serde_json::Value;

use crate::dom::Node;

/// The kind of an [`Event`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EventKind {
	Init,
	Submit,
	Click,
	PopState,
	/// Cross-tree navigation request, see [`crate::context::Redirect`].
	Redirect,
	Custom(String),
}

impl EventKind {
	pub fn as_str(&self) -> &str {
		match self {
			Self::Init => "init",
			Self::Submit => "submit",
			Self::Click => "click",
			Self::PopState => "popstate",
			Self::Redirect => "redirect",
			Self::Custom(name) => name,
		}
	}
}

impl From<&str> for EventKind {
	fn from(name: &str) -> Self {
		match name {
			"init" => Self::Init,
			"submit" => Self::Submit,
			"click" => Self::Click,
			"popstate" => Self::PopState,
			"redirect" => Self::Redirect,
			other => Self::Custom(other.to_string()),
		}
	}
}

impl fmt::Display for EventKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// Modifier keys held during a pointer event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Modifiers {
	pub alt: bool,
	pub ctrl: bool,
	pub meta: bool,
	pub shift: bool,
}

impl Modifiers {
	pub fn any(&self) -> bool {
		self.alt || self.ctrl || self.meta || self.shift
	}
}

/// An event flowing through the runtime.
#[derive(Debug)]
pub struct Event {
	kind: EventKind,
	target: Option<Node>,
	current_target: Option<Node>,
	modifiers: Modifiers,
	button: u16,
	detail: Value,
	default_prevented: Cell<bool>,
	propagation_stopped: Cell<bool>,
}

impl Event {
	pub fn new(kind: impl Into<EventKind>) -> Self {
		Self {
			kind: kind.into(),
			target: None,
			current_target: None,
			modifiers: Modifiers::default(),
			button: 0,
			detail: Value::Null,
			default_prevented: Cell::new(false),
			propagation_stopped: Cell::new(false),
		}
	}

	pub fn init() -> Self {
		Self::new(EventKind::Init)
	}

	/// A submission, optionally of a specific form element.
	pub fn submit(form: Option<Node>) -> Self {
		let mut event = Self::new(EventKind::Submit);
		event.current_target = form.clone();
		event.target = form;
		event
	}

	pub fn click(target: Node) -> Self {
		Self::new(EventKind::Click).with_target(target)
	}

	pub fn with_target(mut self, target: Node) -> Self {
		self.current_target = Some(target.clone());
		self.target = Some(target);
		self
	}

	pub fn with_modifiers(mut self, modifiers: Modifiers) -> Self {
		self.modifiers = modifiers;
		self
	}

	pub fn with_button(mut self, button: u16) -> Self {
		self.button = button;
		self
	}

	pub fn with_detail(mut self, detail: Value) -> Self {
		self.detail = detail;
		self
	}

	pub fn kind(&self) -> &EventKind {
		&self.kind
	}

	pub fn target(&self) -> Option<&Node> {
		self.target.as_ref()
	}

	pub fn current_target(&self) -> Option<&Node> {
		self.current_target.as_ref()
	}

	pub fn modifiers(&self) -> Modifiers {
		self.modifiers
	}

	pub fn button(&self) -> u16 {
		self.button
	}

	pub fn detail(&self) -> &Value {
		&self.detail
	}

	pub fn prevent_default(&self) {
		self.default_prevented.set(true);
	}

	pub fn is_default_prevented(&self) -> bool {
		self.default_prevented.get()
	}

	pub fn stop_propagation(&self) {
		self.propagation_stopped.set(true);
	}

	pub fn is_propagation_stopped(&self) -> bool {
		self.propagation_stopped.get()
	}
}
