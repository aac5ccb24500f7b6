//! The render context shared by every component of a page.
//!
//! A [`RenderContext`] is created once per request on the server and once per
//! page load in the browser. It owns the shared [`State`] every component
//! reads and writes, the component [`Registry`], the protocol phase flags and
//! the root component. Environment specifics (location, storage, form
//! parsing, redirects) are reached through the [`Environment`] trait, which
//! the server and browser flavors implement.
//!
//! The context is reference counted and holds strong references to the
//! component tree; call [`RenderContext::teardown`] when the page or request
//! is done with it.

use std::cell::{Cell, Ref, RefCell};
use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::rc::Rc;

use futures::future::{self, LocalBoxFuture};
use futures::FutureExt;
use http::{Method, StatusCode};
use serde_json::{Map, Value, json};
use tracing::{Instrument, debug, debug_span, warn};

use crate::browser::BrowserHost;
use crate::component::{AnyComponent, Component, Handle, Mount, Parent, Props, initialize_subtree};
use crate::dom::Node;
use crate::error::{PagesError, Result};
use crate::hydration::MarkerMatcher;
use crate::registry::Registry;
use crate::template::{TemplateEngine, View};

/// The shared state mapping.
pub type State = Map<String, Value>;

/// Parsed form fields.
pub type FormData = BTreeMap<String, String>;

/// Snapshot of the current request or page location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
	pub method: Method,
	pub path: String,
	pub query: BTreeMap<String, String>,
	/// Path and query as requested.
	pub url: String,
	pub user_agent: String,
}

impl Location {
	/// Builds a location from a path with an optional query string.
	pub fn new(method: Method, url: &str, user_agent: impl Into<String>) -> Self {
		let (path, query) = url.split_once('?').unwrap_or((url, ""));
		let query = serde_urlencoded::from_str::<Vec<(String, String)>>(query)
			.unwrap_or_default()
			.into_iter()
			.collect();
		Self {
			method,
			path: if path.is_empty() { "/".to_string() } else { path.to_string() },
			query,
			url: url.to_string(),
			user_agent: user_agent.into(),
		}
	}

	pub fn is_submission(&self) -> bool {
		self.method == Method::POST
	}
}

/// Options applied when persisting a storage value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CookieOptions {
	/// Lifetime in seconds.
	pub max_age: Option<i64>,
	pub path: Option<String>,
	pub http_only: bool,
	pub secure: bool,
}

/// Key/value storage that survives the page or request.
pub trait Storage {
	fn get(&self, key: &str) -> Option<String>;
	fn set(&self, key: &str, value: &str, options: &CookieOptions);
	fn unset(&self, key: &str);
}

/// A redirect request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Redirect {
	pub status: StatusCode,
	pub url: String,
}

impl Redirect {
	pub fn new(status: StatusCode, url: impl Into<String>) -> Self {
		Self {
			status,
			url: url.into(),
		}
	}

	pub fn temporary(url: impl Into<String>) -> Self {
		Self::new(StatusCode::FOUND, url)
	}

	pub fn permanent(url: impl Into<String>) -> Self {
		Self::new(StatusCode::MOVED_PERMANENTLY, url)
	}

	/// `301` and `308` replace history entries instead of pushing new ones.
	pub fn is_permanent(&self) -> bool {
		matches!(
			self.status,
			StatusCode::MOVED_PERMANENTLY | StatusCode::PERMANENT_REDIRECT
		)
	}

	/// Same-document URL that the client-side router can take over.
	pub fn is_relative(&self) -> bool {
		self.url.starts_with('/') && !self.url.starts_with("//")
	}

	pub fn to_detail(&self) -> Value {
		json!({ "url": self.url, "status": self.status.as_u16() })
	}

	pub fn from_detail(detail: &Value) -> Option<Self> {
		let url = detail.get("url")?.as_str()?;
		let status = detail
			.get("status")
			.and_then(Value::as_u64)
			.and_then(|code| u16::try_from(code).ok())
			.and_then(|code| StatusCode::from_u16(code).ok())
			.unwrap_or(StatusCode::FOUND);
		Some(Self::new(status, url))
	}
}

/// What a render context needs from its host.
pub trait Environment {
	fn location(&self) -> Location;

	/// Sets the status of the response being produced.
	fn set_status(&self, status: StatusCode);

	fn storage(&self) -> &dyn Storage;

	/// Parses form fields, from `source` when given.
	fn form(&self, source: Option<&Node>) -> FormData;

	fn redirect(&self, redirect: &Redirect);

	fn is_browser(&self) -> bool {
		false
	}

	/// Browser capabilities, when running in a browser.
	fn browser_host(&self) -> Option<Rc<dyn BrowserHost>> {
		None
	}
}

struct ContextInner {
	env: Rc<dyn Environment>,
	engine: Rc<dyn TemplateEngine>,
	matcher: MarkerMatcher,
	state: RefCell<State>,
	initializing: Cell<bool>,
	adopting: Cell<bool>,
	rendering: Cell<bool>,
	redirected: Cell<bool>,
	closed: Cell<bool>,
	root: RefCell<Option<Rc<dyn AnyComponent>>>,
	registry: Registry,
	router_prefix: RefCell<Option<String>>,
	tasks: RefCell<Vec<LocalBoxFuture<'static, ()>>>,
}

/// Shared, per-page render context. Cloning yields another handle to the same context.
#[derive(Clone)]
pub struct RenderContext(Rc<ContextInner>);

impl RenderContext {
	pub fn new(env: Rc<dyn Environment>, engine: Rc<dyn TemplateEngine>) -> Self {
		Self(Rc::new(ContextInner {
			env,
			engine,
			matcher: MarkerMatcher::default(),
			state: RefCell::new(State::new()),
			initializing: Cell::new(false),
			adopting: Cell::new(false),
			rendering: Cell::new(false),
			redirected: Cell::new(false),
			closed: Cell::new(false),
			root: RefCell::new(None),
			registry: Registry::default(),
			router_prefix: RefCell::new(None),
			tasks: RefCell::new(Vec::new()),
		}))
	}

	/// Seeds the shared state.
	pub fn with_state(self, state: State) -> Self {
		*self.0.state.borrow_mut() = state;
		self
	}

	pub fn env(&self) -> &Rc<dyn Environment> {
		&self.0.env
	}

	pub(crate) fn engine(&self) -> &dyn TemplateEngine {
		self.0.engine.as_ref()
	}

	pub(crate) fn matcher(&self) -> &MarkerMatcher {
		&self.0.matcher
	}

	pub(crate) fn registry(&self) -> &Registry {
		&self.0.registry
	}

	pub fn location(&self) -> Location {
		self.0.env.location()
	}

	pub fn set_status(&self, status: StatusCode) {
		debug!(%status, "status set");
		self.0.env.set_status(status);
	}

	pub fn storage(&self) -> &dyn Storage {
		self.0.env.storage()
	}

	pub fn form(&self, source: Option<&Node>) -> FormData {
		self.0.env.form(source)
	}

	pub fn is_browser(&self) -> bool {
		self.0.env.is_browser()
	}

	/// The shared state.
	pub fn state(&self) -> Ref<'_, State> {
		self.0.state.borrow()
	}

	/// Merges `patch` into the shared state, key by key.
	pub(crate) fn merge_state(&self, patch: State) {
		let mut state = self.0.state.borrow_mut();
		for (key, value) in patch {
			state.insert(key, value);
		}
	}

	pub fn is_initializing(&self) -> bool {
		self.0.initializing.get()
	}

	pub fn is_adopting(&self) -> bool {
		self.0.adopting.get()
	}

	pub(crate) fn set_adopting(&self, adopting: bool) {
		self.0.adopting.set(adopting);
	}

	pub fn is_rendering(&self) -> bool {
		self.0.rendering.get()
	}

	/// `false` once the context has been torn down.
	pub fn is_live(&self) -> bool {
		!self.0.closed.get()
	}

	/// The root component, when it is a `C`.
	pub fn root<C: Component>(&self) -> Option<Handle<C>> {
		let root = self.0.root.borrow().clone()?;
		root.as_any().downcast_ref::<Handle<C>>().cloned()
	}

	/// Records `component` as the root unless one is already set.
	pub(crate) fn adopt_root(&self, component: Rc<dyn AnyComponent>) {
		let mut root = self.0.root.borrow_mut();
		if root.is_none() {
			debug!(component = component.name(), "root component set");
			*root = Some(component);
		}
	}

	pub(crate) fn router_prefix(&self) -> Option<String> {
		self.0.router_prefix.borrow().clone()
	}

	pub(crate) fn set_router_prefix(&self, prefix: Option<String>) {
		*self.0.router_prefix.borrow_mut() = prefix;
	}

	/// Renders the whole tree from the root.
	///
	/// Returns `None` when there is no root yet, or when a render is already in
	/// progress; the nested request is dropped.
	pub fn render(&self) -> Option<Result<View>> {
		if self.0.rendering.get() {
			warn!("render requested while a render is in progress; ignored");
			return None;
		}
		let root = self.0.root.borrow().clone()?;
		self.0.rendering.set(true);
		let _guard = scopeguard::guard((), |()| self.0.rendering.set(false));
		Some(root.render_view())
	}

	/// Issues a redirect. Only the first redirect of a request or navigation
	/// is honored; returns whether this one was.
	pub fn redirect(&self, redirect: Redirect) -> bool {
		if self.0.redirected.replace(true) {
			warn!(url = %redirect.url, "redirect already issued; ignoring");
			return false;
		}
		debug!(url = %redirect.url, status = %redirect.status, "redirect");
		self.0.env.redirect(&redirect);
		true
	}

	pub fn is_redirected(&self) -> bool {
		self.0.redirected.get()
	}

	/// Re-arms the redirect latch for a new navigation.
	pub fn reset_redirect(&self) {
		self.0.redirected.set(false);
	}

	/// Queues a background task, such as a fire-and-forget `oninit`.
	///
	/// Nothing polls the queue on its own: the host must drive
	/// [`RenderContext::settle`] after dispatching events.
	pub fn spawn(&self, task: impl Future<Output = ()> + 'static) {
		self.0.tasks.borrow_mut().push(task.boxed_local());
	}

	/// Number of queued tasks not yet picked up by [`RenderContext::settle`].
	pub fn pending_tasks(&self) -> usize {
		self.0.tasks.borrow().len()
	}

	/// Drives queued tasks, including tasks they queue, until none are left.
	pub async fn settle(&self) {
		loop {
			let tasks: Vec<_> = self.0.tasks.borrow_mut().drain(..).collect();
			if tasks.is_empty() {
				break;
			}
			future::join_all(tasks).await;
		}
	}

	/// Runs the initialization barrier for a root `C` and renders the tree.
	///
	/// Every `oninit`, and `onsubmit` for submissions, across the whole tree
	/// settles before the single render. Template failures come back as
	/// [`PagesError::MalformedTemplate`].
	pub async fn initialize<C: Component>(&self) -> Result<View> {
		self.run_initialization::<C>(Props::new()).await?;
		self.render()
			.unwrap_or(Ok(View::Empty))
			.map_err(PagesError::into_malformed)
	}

	/// Runs the initialization barrier for a root `C` without rendering it.
	pub async fn run_initialization<C: Component>(&self, props: Props) -> Result<Handle<C>> {
		let span = debug_span!("initialize", component = C::name());
		async {
			self.0.initializing.set(true);
			let outcome = async {
				let root = C::resolve(&Parent::detached(self), props, None)?;
				initialize_subtree(root.clone()).await?;
				Ok::<_, PagesError>(root)
			}
			.await;
			self.0.initializing.set(false);
			outcome.map_err(PagesError::into_malformed)
		}
		.instrument(span)
		.await
	}

	/// Drops the component tree. The context rejects new components afterwards.
	pub fn teardown(&self) {
		self.0.closed.set(true);
		self.0.registry.clear();
		self.0.root.borrow_mut().take();
		self.0.tasks.borrow_mut().clear();
		debug!("render context torn down");
	}
}

impl fmt::Debug for RenderContext {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("RenderContext")
			.field("state", &self.0.state.borrow())
			.field("initializing", &self.0.initializing.get())
			.field("adopting", &self.0.adopting.get())
			.field("rendering", &self.0.rendering.get())
			.finish_non_exhaustive()
	}
}
