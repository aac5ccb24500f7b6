//! Browser flavor of the render context.
//!
//! [`BrowserHost`] abstracts the page the runtime runs in: address bar and
//! history, title, scrolling, cookies and document-level listeners.
//! [`BrowserEnvironment`] implements the context contract on top of a host,
//! and [`mount`] boots a root component into a container, either adopting
//! the server-rendered markup already there or rendering it fresh.
//!
//! [`MemoryHost`] is a headless host that keeps everything in memory.

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use http::{Method, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::component::{Component, Handle, Props};
use crate::context::{
	CookieOptions, Environment, FormData, Location, Redirect, RenderContext, State, Storage,
};
use crate::dom::Node;
use crate::error::{PagesError, Result};
use crate::event::{Event, EventKind};
use crate::hydration::HydrationError;
use crate::template::{DomEngine, View};

/// Identifies an installed listener.
pub type ListenerId = u64;

/// A document-level listener.
pub type Listener = Rc<dyn Fn(&Event)>;

/// State stored with each history entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryState {
	pub page_title: String,
}

/// The page hosting the runtime.
pub trait BrowserHost {
	/// Current path and query.
	fn url(&self) -> String;
	fn user_agent(&self) -> Option<String>;
	fn push_state(&self, state: &HistoryState, url: &str);
	fn replace_state(&self, state: &HistoryState, url: &str);
	fn title(&self) -> String;
	fn set_title(&self, title: &str);
	fn scroll_to_top(&self);
	/// Full page load of `url`.
	fn assign(&self, url: &str);
	fn cookie(&self, key: &str) -> Option<String>;
	fn set_cookie(&self, key: &str, value: &str, options: &CookieOptions);
	fn remove_cookie(&self, key: &str);
	/// State serialized by the server into the page.
	fn initial_state(&self) -> Option<State>;
	fn add_listener(&self, kind: EventKind, listener: Listener) -> ListenerId;
	fn remove_listener(&self, id: ListenerId);
	fn dispatch(&self, event: &Event);
}

struct HostStorage {
	host: Rc<dyn BrowserHost>,
}

impl Storage for HostStorage {
	fn get(&self, key: &str) -> Option<String> {
		self.host.cookie(key)
	}

	fn set(&self, key: &str, value: &str, options: &CookieOptions) {
		self.host.set_cookie(key, value, options);
	}

	fn unset(&self, key: &str) {
		self.host.remove_cookie(key);
	}
}

/// Render context environment over a [`BrowserHost`].
pub struct BrowserEnvironment {
	host: Rc<dyn BrowserHost>,
	storage: HostStorage,
}

impl BrowserEnvironment {
	pub fn new(host: Rc<dyn BrowserHost>) -> Self {
		Self {
			storage: HostStorage { host: host.clone() },
			host,
		}
	}

	/// Builds a render context seeded with the state the server left in the page.
	pub fn context(host: Rc<dyn BrowserHost>, engine: Rc<DomEngine>) -> RenderContext {
		let state = host.initial_state().unwrap_or_default();
		RenderContext::new(Rc::new(Self::new(host)), engine).with_state(state)
	}
}

impl fmt::Debug for BrowserEnvironment {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("BrowserEnvironment")
			.field("url", &self.host.url())
			.finish_non_exhaustive()
	}
}

impl Environment for BrowserEnvironment {
	fn location(&self) -> Location {
		let user_agent = self
			.host
			.user_agent()
			.unwrap_or_else(|| "Unknown".to_string());
		Location::new(Method::GET, &self.host.url(), user_agent)
	}

	fn set_status(&self, status: StatusCode) {
		trace!(%status, "status ignored in the browser");
	}

	fn storage(&self) -> &dyn Storage {
		&self.storage
	}

	fn form(&self, source: Option<&Node>) -> FormData {
		source.map(read_form).unwrap_or_default()
	}

	fn redirect(&self, redirect: &Redirect) {
		if redirect.is_relative() {
			self.host
				.dispatch(&Event::new(EventKind::Redirect).with_detail(redirect.to_detail()));
		} else {
			self.host.assign(&redirect.url);
		}
	}

	fn is_browser(&self) -> bool {
		true
	}

	fn browser_host(&self) -> Option<Rc<dyn BrowserHost>> {
		Some(self.host.clone())
	}
}

/// Collects the named, enabled fields of `form`.
pub fn read_form(form: &Node) -> FormData {
	let mut data = FormData::new();
	for field in form.descendants() {
		let (Some(tag), Some(name)) = (field.tag_name(), field.attribute("name")) else {
			continue;
		};
		if field.attribute("disabled").is_some() {
			continue;
		}
		match tag {
			"input" => {
				let kind = field
					.attribute("type")
					.unwrap_or_default()
					.to_ascii_lowercase();
				let checkable = matches!(kind.as_str(), "checkbox" | "radio");
				if checkable && field.attribute("checked").is_none() {
					continue;
				}
				if matches!(kind.as_str(), "submit" | "button" | "reset" | "image" | "file") {
					continue;
				}
				let fallback = if checkable { "on" } else { "" };
				let value = field
					.attribute("value")
					.unwrap_or_else(|| fallback.to_string());
				data.insert(name, value);
			}
			"textarea" => {
				data.insert(name, field.text_content());
			}
			"select" => {
				let options: Vec<Node> = field
					.descendants()
					.into_iter()
					.filter(|node| node.has_tag("option"))
					.collect();
				let selected = options
					.iter()
					.find(|option| option.attribute("selected").is_some())
					.or_else(|| options.first());
				if let Some(option) = selected {
					let value = option
						.attribute("value")
						.unwrap_or_else(|| option.text_content());
					data.insert(name, value);
				}
			}
			_ => {}
		}
	}
	data
}

/// Boots the root component `C` into `container`.
///
/// The initialization barrier runs over the whole tree first. With `adopt`,
/// the root is bound to the container's children between the root marker
/// pair and renders once over them; otherwise the tree is rendered fresh
/// into the container.
///
/// Navigations and fire-and-forget `oninit`s queued by events only run
/// when the host drives [`RenderContext::settle`] after dispatching them.
pub async fn mount<C: Component>(
	cx: &RenderContext,
	container: &Node,
	adopt: bool,
) -> Result<Handle<C>> {
	let root = cx.run_initialization::<C>(Props::new()).await?;

	if adopt {
		let children = container.children();
		let region = match children.as_slice() {
			[open, inner @ .., close]
				if cx.matcher().token(open).is_some()
					&& open.comment_data() == close.comment_data() =>
			{
				inner.to_vec()
			}
			_ => return Err(HydrationError::MissingRootMarkers.into()),
		};
		debug!(component = C::name(), nodes = region.len(), "adopting server markup");
		root.bind_node(region);
		cx.set_adopting(true);
		let outcome = root.render();
		cx.set_adopting(false);
		outcome.map_err(PagesError::into_malformed)?;
	} else {
		let view = cx
			.render()
			.unwrap_or(Ok(View::Empty))
			.map_err(PagesError::into_malformed)?;
		container.replace_children(view.into_nodes());
	}
	Ok(root)
}

/// A headless [`BrowserHost`].
pub struct MemoryHost {
	history: RefCell<Vec<(String, HistoryState)>>,
	index: Cell<usize>,
	title: RefCell<String>,
	user_agent: Option<String>,
	scrolls: Cell<usize>,
	assigned: RefCell<Vec<String>>,
	submitted: RefCell<Vec<String>>,
	cookies: RefCell<BTreeMap<String, String>>,
	initial_state: Option<State>,
	listeners: RefCell<Vec<(ListenerId, EventKind, Listener)>>,
	next_listener: Cell<ListenerId>,
}

impl MemoryHost {
	pub fn new(url: &str) -> Self {
		Self {
			history: RefCell::new(vec![(url.to_string(), HistoryState::default())]),
			index: Cell::new(0),
			title: RefCell::new(String::new()),
			user_agent: None,
			scrolls: Cell::new(0),
			assigned: RefCell::new(Vec::new()),
			submitted: RefCell::new(Vec::new()),
			cookies: RefCell::new(BTreeMap::new()),
			initial_state: None,
			listeners: RefCell::new(Vec::new()),
			next_listener: Cell::new(1),
		}
	}

	pub fn with_initial_state(mut self, state: State) -> Self {
		self.initial_state = Some(state);
		self
	}

	pub fn with_title(self, title: &str) -> Self {
		*self.title.borrow_mut() = title.to_string();
		self
	}

	pub fn with_user_agent(mut self, user_agent: &str) -> Self {
		self.user_agent = Some(user_agent.to_string());
		self
	}

	/// URLs of every history entry, oldest first.
	pub fn history(&self) -> Vec<String> {
		self.history
			.borrow()
			.iter()
			.map(|(url, _)| url.clone())
			.collect()
	}

	pub fn history_state(&self) -> HistoryState {
		self.history.borrow()[self.index.get()].1.clone()
	}

	pub fn scroll_count(&self) -> usize {
		self.scrolls.get()
	}

	/// Full page loads, including clicks the runtime let through.
	pub fn assigned(&self) -> Vec<String> {
		self.assigned.borrow().clone()
	}

	/// Actions of forms submitted natively.
	pub fn submitted(&self) -> Vec<String> {
		self.submitted.borrow().clone()
	}

	pub fn listener_count(&self) -> usize {
		self.listeners.borrow().len()
	}

	/// Clicks `target`. Returns whether a listener took the click over.
	pub fn click(&self, target: &Node) -> bool {
		self.click_with(Event::click(target.clone()))
	}

	pub fn click_with(&self, event: Event) -> bool {
		self.dispatch(&event);
		if event.is_default_prevented() {
			return true;
		}
		let href = event
			.target()
			.and_then(closest_anchor)
			.and_then(|anchor| anchor.attribute("href"));
		if let Some(href) = href {
			self.assign(&href);
		}
		false
	}

	/// Submits `form`. Returns whether a listener took the submission over.
	pub fn submit(&self, form: &Node) -> bool {
		let event = Event::submit(Some(form.clone()));
		self.dispatch(&event);
		if event.is_default_prevented() {
			return true;
		}
		let action = form.attribute("action").unwrap_or_else(|| self.url());
		self.submitted.borrow_mut().push(action);
		false
	}

	/// Goes one entry back in history and fires `popstate`.
	pub fn back(&self) {
		let index = self.index.get();
		if index == 0 {
			return;
		}
		self.index.set(index - 1);
		let state = self.history_state();
		let detail = serde_json::to_value(&state).unwrap_or_default();
		self.dispatch(&Event::new(EventKind::PopState).with_detail(detail));
	}
}

impl fmt::Debug for MemoryHost {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("MemoryHost")
			.field("url", &self.url())
			.field("history", &self.history())
			.field("title", &self.title.borrow())
			.finish_non_exhaustive()
	}
}

impl BrowserHost for MemoryHost {
	fn url(&self) -> String {
		self.history.borrow()[self.index.get()].0.clone()
	}

	fn user_agent(&self) -> Option<String> {
		self.user_agent.clone()
	}

	fn push_state(&self, state: &HistoryState, url: &str) {
		let mut history = self.history.borrow_mut();
		history.truncate(self.index.get() + 1);
		history.push((url.to_string(), state.clone()));
		self.index.set(history.len() - 1);
	}

	fn replace_state(&self, state: &HistoryState, url: &str) {
		self.history.borrow_mut()[self.index.get()] = (url.to_string(), state.clone());
	}

	fn title(&self) -> String {
		self.title.borrow().clone()
	}

	fn set_title(&self, title: &str) {
		*self.title.borrow_mut() = title.to_string();
	}

	fn scroll_to_top(&self) {
		self.scrolls.set(self.scrolls.get() + 1);
	}

	fn assign(&self, url: &str) {
		self.assigned.borrow_mut().push(url.to_string());
	}

	fn cookie(&self, key: &str) -> Option<String> {
		self.cookies.borrow().get(key).cloned()
	}

	fn set_cookie(&self, key: &str, value: &str, _options: &CookieOptions) {
		self.cookies
			.borrow_mut()
			.insert(key.to_string(), value.to_string());
	}

	fn remove_cookie(&self, key: &str) {
		self.cookies.borrow_mut().remove(key);
	}

	fn initial_state(&self) -> Option<State> {
		self.initial_state.clone()
	}

	fn add_listener(&self, kind: EventKind, listener: Listener) -> ListenerId {
		let id = self.next_listener.get();
		self.next_listener.set(id + 1);
		self.listeners.borrow_mut().push((id, kind, listener));
		id
	}

	fn remove_listener(&self, id: ListenerId) {
		self.listeners
			.borrow_mut()
			.retain(|(existing, _, _)| *existing != id);
	}

	fn dispatch(&self, event: &Event) {
		let listeners: Vec<Listener> = self
			.listeners
			.borrow()
			.iter()
			.filter(|(_, kind, _)| kind == event.kind())
			.map(|(_, _, listener)| listener.clone())
			.collect();
		for listener in listeners {
			listener(event);
		}
	}
}

/// The anchor `node` sits in, if any.
pub fn closest_anchor(node: &Node) -> Option<Node> {
	let mut current = Some(node.clone());
	while let Some(candidate) = current {
		if candidate.has_tag("a") {
			return Some(candidate);
		}
		current = candidate.parent();
	}
	None
}
