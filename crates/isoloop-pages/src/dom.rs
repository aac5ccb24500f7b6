//! Lightweight document tree.
//!
//! Components render into [`Node`] trees in the browser flavor and adopt
//! server-produced regions during hydration. The tree is reference counted:
//! cloning a [`Node`] yields another handle to the same live node, so identity
//! can be compared with [`Node::ptr_eq`].
//!
//! Markup is parsed with `scraper` (html5ever) and converted into this
//! tree, which keeps the hydration matcher and the DOM engine independent of
//! any particular host.

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

/// Elements that never carry children or a closing tag.
const VOID_ELEMENTS: &[&str] = &[
	"area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "track",
	"wbr",
];

/// Elements whose text children are emitted verbatim.
const RAW_TEXT_ELEMENTS: &[&str] = &["script", "style"];

enum NodeKind {
	Fragment,
	Element {
		tag: String,
		attributes: RefCell<Vec<(String, String)>>,
	},
	Text(RefCell<String>),
	Comment(RefCell<String>),
}

struct NodeData {
	kind: NodeKind,
	parent: RefCell<Weak<NodeData>>,
	children: RefCell<Vec<Node>>,
}

/// A handle to a live node in a document tree.
#[derive(Clone)]
pub struct Node(Rc<NodeData>);

impl Node {
	fn with_kind(kind: NodeKind) -> Self {
		Self(Rc::new(NodeData {
			kind,
			parent: RefCell::new(Weak::new()),
			children: RefCell::new(Vec::new()),
		}))
	}

	/// Creates a detached fragment that groups top-level nodes.
	pub fn fragment() -> Self {
		Self::with_kind(NodeKind::Fragment)
	}

	/// Creates a detached element.
	pub fn element(tag: impl Into<String>) -> Self {
		Self::with_kind(NodeKind::Element {
			tag: tag.into().to_ascii_lowercase(),
			attributes: RefCell::new(Vec::new()),
		})
	}

	/// Creates a detached text node.
	pub fn text(data: impl Into<String>) -> Self {
		Self::with_kind(NodeKind::Text(RefCell::new(data.into())))
	}

	/// Creates a detached comment node.
	pub fn comment(data: impl Into<String>) -> Self {
		Self::with_kind(NodeKind::Comment(RefCell::new(data.into())))
	}

	/// Parses an HTML fragment into a new [`Node::fragment`].
	///
	/// Doctypes and processing instructions are dropped; everything else
	/// (elements, text and comments) is preserved in document order.
	pub fn parse_fragment(html: &str) -> Self {
		let parsed = scraper::Html::parse_fragment(html);
		let fragment = Self::fragment();
		convert_children(parsed.root_element(), &fragment);
		fragment
	}

	/// Returns `true` if both handles point at the same node.
	pub fn ptr_eq(&self, other: &Node) -> bool {
		Rc::ptr_eq(&self.0, &other.0)
	}

	pub fn is_element(&self) -> bool {
		matches!(self.0.kind, NodeKind::Element { .. })
	}

	pub fn is_text(&self) -> bool {
		matches!(self.0.kind, NodeKind::Text(_))
	}

	pub fn is_comment(&self) -> bool {
		matches!(self.0.kind, NodeKind::Comment(_))
	}

	/// Returns the lowercase tag name of an element.
	pub fn tag_name(&self) -> Option<&str> {
		match &self.0.kind {
			NodeKind::Element { tag, .. } => Some(tag),
			_ => None,
		}
	}

	/// Returns `true` if this node is an element with the given tag.
	pub fn has_tag(&self, tag: &str) -> bool {
		self.tag_name()
			.is_some_and(|name| name.eq_ignore_ascii_case(tag))
	}

	/// Returns the data of a comment node.
	pub fn comment_data(&self) -> Option<String> {
		match &self.0.kind {
			NodeKind::Comment(data) => Some(data.borrow().clone()),
			_ => None,
		}
	}

	/// Returns the value of an attribute on an element.
	pub fn attribute(&self, name: &str) -> Option<String> {
		match &self.0.kind {
			NodeKind::Element { attributes, .. } => attributes
				.borrow()
				.iter()
				.find(|(key, _)| key.eq_ignore_ascii_case(name))
				.map(|(_, value)| value.clone()),
			_ => None,
		}
	}

	/// Returns all attributes of an element in source order.
	pub fn attributes(&self) -> Vec<(String, String)> {
		match &self.0.kind {
			NodeKind::Element { attributes, .. } => attributes.borrow().clone(),
			_ => Vec::new(),
		}
	}

	/// Sets an attribute on an element. No-op for other node kinds.
	pub fn set_attribute(&self, name: &str, value: impl Into<String>) {
		if let NodeKind::Element { attributes, .. } = &self.0.kind {
			let value = value.into();
			let mut attributes = attributes.borrow_mut();
			match attributes
				.iter_mut()
				.find(|(key, _)| key.eq_ignore_ascii_case(name))
			{
				Some(entry) => entry.1 = value,
				None => attributes.push((name.to_ascii_lowercase(), value)),
			}
		}
	}

	pub fn remove_attribute(&self, name: &str) {
		if let NodeKind::Element { attributes, .. } = &self.0.kind {
			attributes
				.borrow_mut()
				.retain(|(key, _)| !key.eq_ignore_ascii_case(name));
		}
	}

	/// Replaces the data of a text or comment node.
	pub fn set_text(&self, data: impl Into<String>) {
		match &self.0.kind {
			NodeKind::Text(text) | NodeKind::Comment(text) => *text.borrow_mut() = data.into(),
			_ => {}
		}
	}

	/// Concatenated text of this node and all of its descendants.
	pub fn text_content(&self) -> String {
		match &self.0.kind {
			NodeKind::Text(text) => text.borrow().clone(),
			NodeKind::Comment(_) => String::new(),
			_ => self
				.children()
				.iter()
				.map(Node::text_content)
				.collect(),
		}
	}

	/// Snapshot of the direct children.
	pub fn children(&self) -> Vec<Node> {
		self.0.children.borrow().clone()
	}

	pub fn parent(&self) -> Option<Node> {
		self.0.parent.borrow().upgrade().map(Node)
	}

	pub fn next_sibling(&self) -> Option<Node> {
		let parent = self.parent()?;
		let siblings = parent.0.children.borrow();
		let position = siblings.iter().position(|node| node.ptr_eq(self))?;
		siblings.get(position + 1).cloned()
	}

	/// All descendants in document order, excluding `self`.
	pub fn descendants(&self) -> Vec<Node> {
		let mut out = Vec::new();
		for child in self.children() {
			out.push(child.clone());
			out.extend(child.descendants());
		}
		out
	}

	/// Appends `child`, detaching it from any previous parent first.
	pub fn append_child(&self, child: &Node) {
		child.remove();
		*child.0.parent.borrow_mut() = Rc::downgrade(&self.0);
		self.0.children.borrow_mut().push(child.clone());
	}

	/// Inserts `child` before `reference`, or appends it when `reference`
	/// is not a child of this node.
	pub fn insert_before(&self, child: &Node, reference: &Node) {
		if child.ptr_eq(reference) {
			return;
		}
		child.remove();
		let mut children = self.0.children.borrow_mut();
		let position = children
			.iter()
			.position(|existing| existing.ptr_eq(reference))
			.unwrap_or(children.len());
		*child.0.parent.borrow_mut() = Rc::downgrade(&self.0);
		children.insert(position, child.clone());
	}

	/// Detaches this node from its parent.
	pub fn remove(&self) {
		let parent = self.0.parent.replace(Weak::new()).upgrade();
		if let Some(parent) = parent {
			parent
				.children
				.borrow_mut()
				.retain(|existing| !Rc::ptr_eq(&existing.0, &self.0));
		}
	}

	/// Replaces every child with `nodes`.
	pub fn replace_children(&self, nodes: Vec<Node>) {
		let previous = self.0.children.take();
		for child in previous {
			*child.0.parent.borrow_mut() = Weak::new();
		}
		for node in &nodes {
			self.append_child(node);
		}
	}

	/// Returns `true` when both nodes could be patched into each other:
	/// elements with the same tag, or two nodes of the same character kind.
	pub fn same_shape(&self, other: &Node) -> bool {
		match (&self.0.kind, &other.0.kind) {
			(NodeKind::Element { tag: a, .. }, NodeKind::Element { tag: b, .. }) => a == b,
			(NodeKind::Text(_), NodeKind::Text(_)) => true,
			(NodeKind::Comment(_), NodeKind::Comment(_)) => true,
			(NodeKind::Fragment, NodeKind::Fragment) => true,
			_ => false,
		}
	}

	/// Patches this node in place so it matches `source`, keeping its identity.
	///
	/// Attributes and children are taken over from `source`; callers check
	/// [`Node::same_shape`] first.
	pub fn morph_from(&self, source: &Node) {
		match (&self.0.kind, &source.0.kind) {
			(
				NodeKind::Element { attributes, .. },
				NodeKind::Element {
					attributes: incoming,
					..
				},
			) => {
				*attributes.borrow_mut() = incoming.borrow().clone();
				self.replace_children(source.children());
			}
			(NodeKind::Text(data), NodeKind::Text(incoming))
			| (NodeKind::Comment(data), NodeKind::Comment(incoming)) => {
				*data.borrow_mut() = incoming.borrow().clone();
			}
			(NodeKind::Fragment, NodeKind::Fragment) => self.replace_children(source.children()),
			_ => {}
		}
	}

	/// Serializes this node (and its subtree) to HTML.
	pub fn to_html(&self) -> String {
		let mut out = String::new();
		self.write_html(&mut out, false);
		out
	}

	/// Serializes only the children of this node.
	pub fn inner_html(&self) -> String {
		let raw = RAW_TEXT_ELEMENTS
			.iter()
			.any(|tag| self.has_tag(tag));
		let mut out = String::new();
		for child in self.children() {
			child.write_html(&mut out, raw);
		}
		out
	}

	fn write_html(&self, out: &mut String, raw_text: bool) {
		match &self.0.kind {
			NodeKind::Fragment => out.push_str(&self.inner_html()),
			NodeKind::Text(text) if raw_text => out.push_str(&text.borrow()),
			NodeKind::Text(text) => out.push_str(&escape_text(&text.borrow())),
			NodeKind::Comment(data) => {
				out.push_str("<!--");
				out.push_str(&data.borrow());
				out.push_str("-->");
			}
			NodeKind::Element { tag, attributes } => {
				out.push('<');
				out.push_str(tag);
				for (name, value) in attributes.borrow().iter() {
					out.push(' ');
					out.push_str(name);
					out.push_str("=\"");
					out.push_str(&escape_attr(value));
					out.push('"');
				}
				out.push('>');
				if VOID_ELEMENTS.contains(&tag.as_str()) {
					return;
				}
				out.push_str(&self.inner_html());
				out.push_str("</");
				out.push_str(tag);
				out.push('>');
			}
		}
	}
}

impl fmt::Debug for Node {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_tuple("Node").field(&self.to_html()).finish()
	}
}

fn convert_children(element: scraper::ElementRef<'_>, into: &Node) {
	for child in element.children() {
		let node = match child.value() {
			scraper::Node::Element(_) => match scraper::ElementRef::wrap(child) {
				Some(child) => convert_element(child),
				None => continue,
			},
			scraper::Node::Text(text) => Node::text(&**text),
			scraper::Node::Comment(comment) => Node::comment(&**comment),
			_ => continue,
		};
		into.append_child(&node);
	}
}

fn convert_element(element: scraper::ElementRef<'_>) -> Node {
	let converted = Node::element(element.value().name());
	for (name, value) in element.value().attrs() {
		converted.set_attribute(name, value);
	}
	convert_children(element, &converted);
	converted
}

/// Escapes text content.
pub fn escape_text(s: &str) -> String {
	s.replace('&', "&amp;")
		.replace('<', "&lt;")
		.replace('>', "&gt;")
}

/// Escapes a string for use in an HTML attribute value.
pub fn escape_attr(s: &str) -> String {
	s.replace('&', "&amp;")
		.replace('"', "&quot;")
		.replace('<', "&lt;")
		.replace('>', "&gt;")
}
