//! Templates, interpolation values and the engines that render them.
//!
//! A [`Template`] is a static list of string parts; `n` parts carry `n - 1`
//! interpolations. Components hand a template and its values to a [`Wire`]
//! obtained once from the context's [`TemplateEngine`], and reuse that wire
//! for every later render so only the values change.
//!
//! Two engines are provided:
//!
//! - [`MarkupEngine`] renders to an HTML string and wraps every content
//!   interpolation in a hydration marker pair (server flavor).
//! - [`DomEngine`] renders to live [`Node`]s, adopts an existing region on
//!   its first render and patches its nodes in place afterwards (browser
//!   flavor).

use std::cell::Cell;
use std::fmt;
use std::rc::Rc;

use futures::future::LocalBoxFuture;
use thiserror::Error;

use crate::dom::{Node, escape_attr, escape_text};
use crate::error::Result;
use crate::hydration::{MarkerTokens, wrap_markers};

/// Comment prefix used by [`DomEngine`] to mark where live nodes are spliced in.
const PLACEHOLDER_PREFIX: &str = "\u{2}";

/// Errors reported by template engines.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum TemplateError {
	/// Markup was passed where only an attribute value is allowed, or an
	/// interpolation sits inside a tag without being a whole attribute value.
	#[error("interpolation {index} is not a whole attribute value")]
	InterpolationInAttribute { index: usize },

	/// A lifecycle placeholder reached the engine outside of its protocol phase.
	#[error("interpolation {index} is an unresolved {kind} value")]
	UnresolvedInterpolation { index: usize, kind: &'static str },

	/// The number of values does not match the template.
	#[error("template expects {expected} interpolations, got {found}")]
	Arity { expected: usize, found: usize },

	/// The rendered markup did not keep its interpolation points.
	#[error("template markup could not be parsed: {0}")]
	Parse(String),

	/// Adopted nodes do not have the structure the template renders.
	#[error("adopted nodes do not match the template: {0}")]
	AdoptionMismatch(String),
}

/// Where an interpolation sits inside its template.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotKind {
	/// A whole attribute value, `attr="${v}"` or `attr=${v}`.
	Attribute { quoted: bool },
	/// Element content. Content slots own a hydration region.
	Content,
	/// Anywhere else inside a tag, which no engine can render.
	InsideTag,
}

/// A static template.
///
/// Templates are declared as statics so their address identifies them:
///
/// ```
/// use isoloop_pages::template::Template;
///
/// static GREETING: Template = Template::new(&["<p>Hello ", "!</p>"]);
/// assert_eq!(GREETING.slots(), 1);
/// ```
#[derive(Debug)]
pub struct Template {
	parts: &'static [&'static str],
}

impl Template {
	pub const fn new(parts: &'static [&'static str]) -> Self {
		Self { parts }
	}

	pub fn parts(&self) -> &'static [&'static str] {
		self.parts
	}

	/// Number of interpolations.
	pub fn slots(&self) -> usize {
		self.parts.len().saturating_sub(1)
	}

	/// Classifies interpolation `index` by the static text in front of it.
	pub fn slot_kind(&self, index: usize) -> SlotKind {
		let Some(part) = self.parts.get(index) else {
			return SlotKind::Content;
		};
		if part.ends_with("=\"") {
			return SlotKind::Attribute { quoted: true };
		}
		if part.ends_with('=') {
			return SlotKind::Attribute { quoted: false };
		}
		let prefix: String = self.parts[..=index].concat();
		match (prefix.rfind('<'), prefix.rfind('>')) {
			(Some(open), Some(close)) if open > close => SlotKind::InsideTag,
			(Some(_), None) => SlotKind::InsideTag,
			_ => SlotKind::Content,
		}
	}

	/// Number of content interpolations, each owning one hydration region.
	pub fn content_slots(&self) -> usize {
		(0..self.slots())
			.filter(|&index| self.slot_kind(index) == SlotKind::Content)
			.count()
	}

	/// Address of the template, stable for the life of the program.
	pub fn id(&'static self) -> usize {
		self as *const Template as usize
	}
}

/// A resolved rendering.
#[derive(Debug, Clone, Default)]
pub enum View {
	#[default]
	Empty,
	/// Plain text, escaped on output.
	Text(String),
	/// Trusted markup.
	Html(String),
	/// Live nodes.
	Nodes(Vec<Node>),
	List(Vec<View>),
}

impl View {
	pub fn is_empty(&self) -> bool {
		match self {
			Self::Empty => true,
			Self::Text(text) | Self::Html(text) => text.is_empty(),
			Self::Nodes(nodes) => nodes.is_empty(),
			Self::List(views) => views.iter().all(View::is_empty),
		}
	}

	/// `true` when the view holds live nodes owned elsewhere.
	fn is_live(&self) -> bool {
		match self {
			Self::Nodes(_) => true,
			Self::List(views) => views.iter().any(View::is_live),
			_ => false,
		}
	}

	pub fn to_html(&self) -> String {
		match self {
			Self::Empty => String::new(),
			Self::Text(text) => escape_text(text),
			Self::Html(html) => html.clone(),
			Self::Nodes(nodes) => nodes.iter().map(Node::to_html).collect(),
			Self::List(views) => views.iter().map(View::to_html).collect(),
		}
	}

	/// Materializes the view as nodes. Markup is parsed, live nodes are returned as is.
	pub fn into_nodes(self) -> Vec<Node> {
		match self {
			Self::Empty => Vec::new(),
			Self::Text(text) => vec![Node::text(text)],
			Self::Html(html) => Node::parse_fragment(&html).children(),
			Self::Nodes(nodes) => nodes,
			Self::List(views) => views.into_iter().flat_map(View::into_nodes).collect(),
		}
	}
}

impl From<String> for View {
	fn from(text: String) -> Self {
		Self::Text(text)
	}
}

impl From<&str> for View {
	fn from(text: &str) -> Self {
		Self::Text(text.to_string())
	}
}

/// A pending subtree initialization, produced during the initialization barrier.
pub type PendingInit = LocalBoxFuture<'static, Result<()>>;

/// Deferred adoption of a server-rendered region.
///
/// Produced while the context is adopting; once the hydration matcher has
/// located the region for its slot, the thunk binds the component to those
/// nodes and renders it exactly once.
pub struct AdoptionThunk(Box<dyn FnOnce(Vec<Node>) -> Result<View>>);

impl AdoptionThunk {
	pub fn new(adopt: impl FnOnce(Vec<Node>) -> Result<View> + 'static) -> Self {
		Self(Box::new(adopt))
	}

	pub fn adopt(self, region: Vec<Node>) -> Result<View> {
		(self.0)(region)
	}
}

/// A value interpolated into a template.
#[derive(Default)]
pub enum Interpolation {
	#[default]
	Empty,
	Text(String),
	View(View),
	Pending(PendingInit),
	Adopt(AdoptionThunk),
}

impl Interpolation {
	pub fn text(value: impl ToString) -> Self {
		Self::Text(value.to_string())
	}

	/// Trusted markup.
	pub fn html(markup: impl Into<String>) -> Self {
		Self::View(View::Html(markup.into()))
	}

	pub fn kind(&self) -> &'static str {
		match self {
			Self::Empty => "empty",
			Self::Text(_) => "text",
			Self::View(_) => "view",
			Self::Pending(_) => "pending initialization",
			Self::Adopt(_) => "adoption",
		}
	}

	/// Returns the view for resolved interpolations.
	pub fn into_view(self) -> Option<View> {
		match self {
			Self::Empty => Some(View::Empty),
			Self::Text(text) => Some(View::Text(text)),
			Self::View(view) => Some(view),
			Self::Pending(_) | Self::Adopt(_) => None,
		}
	}
}

impl fmt::Debug for Interpolation {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Text(text) => f.debug_tuple("Text").field(text).finish(),
			Self::View(view) => f.debug_tuple("View").field(view).finish(),
			other => f.write_str(other.kind()),
		}
	}
}

impl From<&str> for Interpolation {
	fn from(text: &str) -> Self {
		Self::Text(text.to_string())
	}
}

impl From<String> for Interpolation {
	fn from(text: String) -> Self {
		Self::Text(text)
	}
}

impl From<View> for Interpolation {
	fn from(view: View) -> Self {
		Self::View(view)
	}
}

/// Output of a component render.
pub enum Rendered {
	View(View),
	/// Rendered while the tree is initializing: the children still to initialize.
	Pending(Vec<PendingInit>),
}

impl Rendered {
	pub fn is_pending(&self) -> bool {
		matches!(self, Self::Pending(_))
	}

	pub fn into_view(self) -> View {
		match self {
			Self::View(view) => view,
			Self::Pending(_) => View::Empty,
		}
	}
}

impl fmt::Debug for Rendered {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::View(view) => f.debug_tuple("View").field(view).finish(),
			Self::Pending(pending) => write!(f, "Pending({})", pending.len()),
		}
	}
}

/// Produces render bindings.
pub trait TemplateEngine {
	/// Creates a binding, optionally over an existing region to adopt.
	fn wire(&self, region: Option<Vec<Node>>) -> Box<dyn Wire>;
}

/// A reusable render binding owned by one component.
pub trait Wire {
	fn render(
		&mut self,
		template: &'static Template,
		values: Vec<Interpolation>,
	) -> std::result::Result<View, TemplateError>;
}

/// Walks `template`, writing static parts and attribute values itself and
/// handing each content interpolation to `content`.
fn assemble(
	template: &Template,
	values: Vec<Interpolation>,
	mut content: impl FnMut(View, &mut String),
) -> std::result::Result<String, TemplateError> {
	let expected = template.slots();
	if values.len() != expected {
		return Err(TemplateError::Arity {
			expected,
			found: values.len(),
		});
	}

	let mut out = String::new();
	let mut values = values.into_iter();
	for (index, part) in template.parts().iter().enumerate() {
		out.push_str(part);
		let Some(value) = values.next() else {
			break;
		};
		match template.slot_kind(index) {
			SlotKind::Attribute { quoted } => {
				let text = match value {
					Interpolation::Empty | Interpolation::View(View::Empty) => String::new(),
					Interpolation::Text(text) | Interpolation::View(View::Text(text)) => text,
					Interpolation::View(_) => {
						return Err(TemplateError::InterpolationInAttribute { index });
					}
					other => {
						return Err(TemplateError::UnresolvedInterpolation {
							index,
							kind: other.kind(),
						});
					}
				};
				if quoted {
					out.push_str(&escape_attr(&text));
				} else {
					out.push('"');
					out.push_str(&escape_attr(&text));
					out.push('"');
				}
			}
			SlotKind::InsideTag => return Err(TemplateError::InterpolationInAttribute { index }),
			SlotKind::Content => {
				let kind = value.kind();
				let view = value
					.into_view()
					.ok_or(TemplateError::UnresolvedInterpolation { index, kind })?;
				content(view, &mut out);
			}
		}
	}
	Ok(out)
}

/// String engine for the server flavor.
#[derive(Debug, Clone, Default)]
pub struct MarkupEngine {
	tokens: Rc<MarkerTokens>,
}

impl MarkupEngine {
	pub fn new() -> Self {
		Self::default()
	}

	/// Wraps `html` in a fresh marker pair.
	pub fn wrap(&self, seed: &str, html: &str) -> String {
		wrap_markers(&self.tokens.next(seed), html)
	}
}

impl TemplateEngine for MarkupEngine {
	fn wire(&self, _region: Option<Vec<Node>>) -> Box<dyn Wire> {
		Box::new(MarkupWire {
			tokens: self.tokens.clone(),
		})
	}
}

struct MarkupWire {
	tokens: Rc<MarkerTokens>,
}

impl Wire for MarkupWire {
	fn render(
		&mut self,
		template: &'static Template,
		values: Vec<Interpolation>,
	) -> std::result::Result<View, TemplateError> {
		let tokens = &self.tokens;
		let mut slot = 0usize;
		let html = assemble(template, values, |view, out| {
			let token = tokens.next(&format!("{}:{}", template.id(), slot));
			slot += 1;
			out.push_str(&wrap_markers(&token, &view.to_html()));
		})?;
		Ok(View::Html(html))
	}
}

/// Node engine for the browser flavor.
#[derive(Debug, Clone, Default)]
pub struct DomEngine {
	patches: Rc<Cell<usize>>,
}

impl DomEngine {
	pub fn new() -> Self {
		Self::default()
	}

	/// Number of render passes performed by every wire of this engine.
	pub fn patch_count(&self) -> usize {
		self.patches.get()
	}
}

impl TemplateEngine for DomEngine {
	fn wire(&self, region: Option<Vec<Node>>) -> Box<dyn Wire> {
		Box::new(DomWire {
			patches: self.patches.clone(),
			adopt: region,
			nodes: Vec::new(),
		})
	}
}

struct DomWire {
	patches: Rc<Cell<usize>>,
	adopt: Option<Vec<Node>>,
	nodes: Vec<Node>,
}

impl Wire for DomWire {
	fn render(
		&mut self,
		template: &'static Template,
		values: Vec<Interpolation>,
	) -> std::result::Result<View, TemplateError> {
		self.patches.set(self.patches.get() + 1);

		if let Some(region) = self.adopt.take() {
			self.nodes = adopt(&region, template, values)?;
			return Ok(View::Nodes(self.nodes.clone()));
		}

		let mut live: Vec<Vec<Node>> = Vec::new();
		let markup = assemble(template, values, |view, out| {
			out.push_str(&format!("<!--{PLACEHOLDER_PREFIX}{}-->", live.len()));
			live.push(view.into_nodes());
		})?;
		let fragment = Node::parse_fragment(&markup);
		splice(&fragment, live)?;

		let fresh = fragment.children();
		self.nodes = if self.nodes.is_empty() {
			fresh
		} else {
			patch(&self.nodes, fresh)
		};
		Ok(View::Nodes(self.nodes.clone()))
	}
}

/// Replaces every placeholder comment in `fragment` with its live nodes.
fn splice(fragment: &Node, live: Vec<Vec<Node>>) -> std::result::Result<(), TemplateError> {
	let placeholders: Vec<(usize, Node)> = fragment
		.descendants()
		.into_iter()
		.filter_map(|node| {
			let data = node.comment_data()?;
			let index = data.strip_prefix(PLACEHOLDER_PREFIX)?.parse().ok()?;
			Some((index, node))
		})
		.collect();
	if placeholders.len() != live.len() {
		return Err(TemplateError::Parse(format!(
			"expected {} content slots, found {}",
			live.len(),
			placeholders.len()
		)));
	}

	let mut live: Vec<Option<Vec<Node>>> = live.into_iter().map(Some).collect();
	for (index, placeholder) in placeholders {
		let Some(parent) = placeholder.parent() else {
			continue;
		};
		let nodes = live
			.get_mut(index)
			.and_then(Option::take)
			.unwrap_or_default();
		for node in &nodes {
			parent.insert_before(node, &placeholder);
		}
		placeholder.remove();
	}
	Ok(())
}

fn opening_placeholder(node: &Node) -> Option<usize> {
	node.comment_data()?
		.strip_prefix(PLACEHOLDER_PREFIX)?
		.parse()
		.ok()
}

fn closing_placeholder(index: usize) -> String {
	format!("{PLACEHOLDER_PREFIX}/{index}")
}

fn find_comment(nodes: &[Node], from: usize, data: &str) -> Option<usize> {
	nodes
		.get(from..)?
		.iter()
		.position(|node| node.comment_data().as_deref() == Some(data))
		.map(|offset| from + offset)
}

/// Renders `values` over an adopted `region` without replacing its nodes.
///
/// Content slots are rendered between placeholder pairs standing in for the
/// server's marker pairs, then the region is reconciled against that
/// rendering. Slots holding live nodes belong to already adopted children
/// and are left as they are.
fn adopt(
	region: &[Node],
	template: &Template,
	values: Vec<Interpolation>,
) -> std::result::Result<Vec<Node>, TemplateError> {
	let mut live = Vec::new();
	let markup = assemble(template, values, |view, out| {
		let index = live.len();
		out.push_str(&format!("<!--{PLACEHOLDER_PREFIX}{index}-->"));
		if !view.is_live() {
			out.push_str(&view.to_html());
		}
		out.push_str(&format!("<!--{}-->", closing_placeholder(index)));
		live.push(view.is_live());
	})?;
	let fresh = Node::parse_fragment(&markup).children();
	reconcile(region, &fresh, &live)
}

/// Brings the adopted siblings `current` in line with `fresh`, keeping node
/// identity, and returns the resulting sibling list.
fn reconcile(
	current: &[Node],
	fresh: &[Node],
	live: &[bool],
) -> std::result::Result<Vec<Node>, TemplateError> {
	let mut out = Vec::with_capacity(current.len());
	let (mut at, mut next) = (0, 0);
	while next < fresh.len() {
		if let Some(slot) = opening_placeholder(&fresh[next]) {
			let fresh_close = find_comment(fresh, next + 1, &closing_placeholder(slot))
				.ok_or_else(|| TemplateError::Parse(format!("content slot {slot} is not closed")))?;
			let open = current
				.get(at)
				.filter(|node| node.is_comment())
				.ok_or_else(|| {
					TemplateError::AdoptionMismatch(format!("no marker for content slot {slot}"))
				})?;
			let token = open.comment_data().unwrap_or_default();
			let close = find_comment(current, at + 1, &token).ok_or_else(|| {
				TemplateError::AdoptionMismatch(format!("marker of content slot {slot} is not closed"))
			})?;

			out.push(open.clone());
			let owned = &current[at + 1..close];
			if live.get(slot).copied().unwrap_or(false) {
				out.extend_from_slice(owned);
			} else {
				out.extend(replace_range(owned, &fresh[next + 1..fresh_close], &current[close])?);
			}
			out.push(current[close].clone());
			at = close + 1;
			next = fresh_close + 1;
			continue;
		}

		let expected = &fresh[next];
		let node = current
			.get(at)
			.filter(|node| node.same_shape(expected))
			.ok_or_else(|| {
				TemplateError::AdoptionMismatch(format!("expected {}", expected.to_html()))
			})?;
		reconcile_node(node, expected, live)?;
		out.push(node.clone());
		at += 1;
		next += 1;
	}
	if at != current.len() {
		return Err(TemplateError::AdoptionMismatch(format!(
			"{} unexpected trailing nodes",
			current.len() - at
		)));
	}
	Ok(out)
}

fn reconcile_node(node: &Node, fresh: &Node, live: &[bool]) -> std::result::Result<(), TemplateError> {
	if node.is_element() {
		for (name, _) in node.attributes() {
			if fresh.attribute(&name).is_none() {
				node.remove_attribute(&name);
			}
		}
		for (name, value) in fresh.attributes() {
			if node.attribute(&name).as_deref() != Some(value.as_str()) {
				node.set_attribute(&name, value);
			}
		}
		reconcile(&node.children(), &fresh.children(), live)?;
	} else if node.is_text() {
		let text = fresh.text_content();
		if node.text_content() != text {
			node.set_text(text);
		}
	}
	Ok(())
}

/// Replaces the nodes a content slot owns, in place when the shapes line up.
fn replace_range(
	owned: &[Node],
	fresh: &[Node],
	closing: &Node,
) -> std::result::Result<Vec<Node>, TemplateError> {
	let aligned = owned.len() == fresh.len()
		&& owned
			.iter()
			.zip(fresh)
			.all(|(node, next)| node.same_shape(next));
	if aligned {
		for (node, next) in owned.iter().zip(fresh) {
			reconcile_node(node, next, &[])?;
		}
		return Ok(owned.to_vec());
	}

	if let Some(parent) = closing.parent() {
		for node in fresh {
			parent.insert_before(node, closing);
		}
	}
	for node in owned {
		node.remove();
	}
	Ok(fresh.to_vec())
}

/// Patches `current` to match `fresh`, keeping node identity when the shapes line up.
fn patch(current: &[Node], fresh: Vec<Node>) -> Vec<Node> {
	let aligned = current.len() == fresh.len()
		&& current
			.iter()
			.zip(&fresh)
			.all(|(live, next)| live.same_shape(next));
	if aligned {
		for (live, next) in current.iter().zip(&fresh) {
			live.morph_from(next);
		}
		return current.to_vec();
	}

	if let Some(anchor) = current.first()
		&& let Some(parent) = anchor.parent()
	{
		for node in &fresh {
			parent.insert_before(node, anchor);
		}
		for node in current {
			node.remove();
		}
	}
	fresh
}
