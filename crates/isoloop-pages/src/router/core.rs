//! Router component, route table and navigation.

use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::rc::Rc;

use futures::FutureExt;
use futures::future::{self, LocalBoxFuture};
use http::StatusCode;
use serde_json::Value;
use tracing::{Instrument, debug, debug_span, trace, warn};

use super::RouterError;
use super::interception;
use super::pattern::PathPattern;
use crate::browser::{BrowserHost, HistoryState, ListenerId};
use crate::component::{Component, Content, Handle, HookFuture, Prop, Props};
use crate::context::State;
use crate::error::Result;
use crate::registry::SlotKey;
use crate::template::{Interpolation, Rendered, Template, View};

/// Prop holding the [`RouterProps`] of a router.
pub const ROUTER_CONFIG: &str = "router";

static ROUTER_TEMPLATE: Template = Template::new(&["<div class=\"isoloop-router\">", "</div>"]);

/// The route a path resolved to.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RouteMatch {
	/// Full pattern, including the parent prefix. Empty when nothing matched.
	pub pattern: String,
	pub path: String,
	pub url: String,
	pub params: BTreeMap<String, String>,
}

/// Result of invoking a [`Loader`].
pub enum Loading {
	Ready(Option<Content>),
	Deferred(LocalBoxFuture<'static, Result<Option<Content>>>),
}

/// Produces the content for a route.
#[derive(Clone)]
pub struct Loader(Rc<dyn Fn(&RouteMatch) -> Loading>);

impl Loader {
	/// Always the same content.
	pub fn content(content: Content) -> Self {
		Self(Rc::new(move |_: &RouteMatch| Loading::Ready(Some(content.clone()))))
	}

	pub fn component<C: Component>() -> Self {
		Self::content(Content::of::<C>())
	}

	/// No content.
	pub fn empty() -> Self {
		Self(Rc::new(|_: &RouteMatch| Loading::Ready(None)))
	}

	pub fn sync(load: impl Fn(&RouteMatch) -> Option<Content> + 'static) -> Self {
		Self(Rc::new(move |matched: &RouteMatch| Loading::Ready(load(matched))))
	}

	pub fn deferred<F, Fut>(load: F) -> Self
	where
		F: Fn(&RouteMatch) -> Fut + 'static,
		Fut: Future<Output = Result<Option<Content>>> + 'static,
	{
		Self(Rc::new(move |matched: &RouteMatch| {
			Loading::Deferred(load(matched).boxed_local())
		}))
	}

	pub fn load(&self, matched: &RouteMatch) -> Loading {
		(self.0)(matched)
	}
}

impl From<Content> for Loader {
	fn from(content: Content) -> Self {
		Self::content(content)
	}
}

impl fmt::Debug for Loader {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str("Loader")
	}
}

/// A navigation as seen by the before/after hooks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Navigation {
	pub from: String,
	pub to: String,
}

/// How [`Router::navigate_to`] updates history.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NavigateOptions {
	/// Replace the current entry instead of pushing a new one.
	pub replace: bool,
}

impl NavigateOptions {
	pub fn replace() -> Self {
		Self { replace: true }
	}
}

type TitleFn = Rc<dyn Fn(&State) -> String>;
type NavigationHook = Rc<dyn Fn(&Navigation)>;

/// Router configuration, passed to the router under [`ROUTER_CONFIG`].
#[derive(Clone)]
pub struct RouterProps {
	routes: Vec<(String, Loader)>,
	not_found: Option<Loader>,
	loading: Option<Content>,
	page_title: Option<TitleFn>,
	intercept: bool,
	before_navigate: Option<NavigationHook>,
	after_navigate: Option<NavigationHook>,
}

impl Default for RouterProps {
	fn default() -> Self {
		Self {
			routes: Vec::new(),
			not_found: None,
			loading: None,
			page_title: None,
			intercept: true,
			before_navigate: None,
			after_navigate: None,
		}
	}
}

impl RouterProps {
	pub fn new() -> Self {
		Self::default()
	}

	/// Appends a route. Routes are tried in the order they are added.
	pub fn route(mut self, pattern: impl Into<String>, loader: impl Into<Loader>) -> Self {
		self.routes.push((pattern.into(), loader.into()));
		self
	}

	/// Content for paths no route matches.
	pub fn not_found(mut self, loader: impl Into<Loader>) -> Self {
		self.not_found = Some(loader.into());
		self
	}

	/// Content shown while a route loads.
	pub fn loading(mut self, content: Content) -> Self {
		self.loading = Some(content);
		self
	}

	/// Derives the page title from the shared state.
	pub fn page_title(mut self, title: impl Fn(&State) -> String + 'static) -> Self {
		self.page_title = Some(Rc::new(title));
		self
	}

	/// Whether link clicks and `GET` forms are taken over. On by default.
	pub fn intercept(mut self, intercept: bool) -> Self {
		self.intercept = intercept;
		self
	}

	pub fn before_navigate(mut self, hook: impl Fn(&Navigation) + 'static) -> Self {
		self.before_navigate = Some(Rc::new(hook));
		self
	}

	pub fn after_navigate(mut self, hook: impl Fn(&Navigation) + 'static) -> Self {
		self.after_navigate = Some(Rc::new(hook));
		self
	}

	pub fn into_props(self) -> Props {
		Props::new().with(ROUTER_CONFIG, Prop::shared(self))
	}

	pub(super) fn intercepts(&self) -> bool {
		self.intercept
	}
}

impl From<RouterProps> for Props {
	fn from(config: RouterProps) -> Self {
		config.into_props()
	}
}

impl fmt::Debug for RouterProps {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("RouterProps")
			.field(
				"routes",
				&self.routes.iter().map(|(pattern, _)| pattern).collect::<Vec<_>>(),
			)
			.field("intercept", &self.intercept)
			.finish_non_exhaustive()
	}
}

struct CompiledRoute {
	pattern: PathPattern,
	loader: Loader,
}

/// The router component.
#[derive(Default)]
pub struct Router {
	table: Option<Rc<Vec<CompiledRoute>>>,
	parent_prefix: Option<String>,
	/// Prefix of the matched route, handed down to nested routers.
	matched_prefix: Option<String>,
	/// Slot name of the content currently rendered.
	shown: Option<String>,
	pub(super) listeners: Vec<ListenerId>,
	generation: u64,
}

impl Component for Router {
	fn name() -> &'static str {
		"Router"
	}

	fn create(_props: &Props) -> Self {
		Self::default()
	}

	fn oninit(this: &Handle<Self>) -> Option<HookFuture> {
		let prefix = this.context().router_prefix();
		this.with_mut(|router| router.parent_prefix = prefix);
		let load = Self::load(this);
		Some(async move { load.await.map(|()| None) }.boxed_local())
	}

	fn render(this: &Handle<Self>) -> Result<Rendered> {
		let mut props = this.props().clone();
		props.remove(ROUTER_CONFIG);
		let loaded = props.remove("loaded");
		let path = this.location().path;
		let parent = this.as_parent();
		let cx = this.context();
		cx.set_router_prefix(this.with(|router| router.matched_prefix.clone()));

		let (content, shown) = match loaded {
			Some(Prop::Content(content)) => {
				let slot = format!("{path}-loadable-loaded");
				let view = content.for_parent(&parent, props, Some(SlotKey::name(slot.clone())))?;
				(view, Some(slot))
			}
			_ => match Self::config(this).loading.clone() {
				Some(loading) => {
					let slot = format!("{path}-loadable-loading");
					let view = loading.for_parent(&parent, props, Some(SlotKey::name(slot.clone())))?;
					(view, Some(slot))
				}
				None => (Interpolation::Empty, None),
			},
		};

		let previous = this.with_mut(|router| std::mem::replace(&mut router.shown, shown.clone()));
		if let Some(previous) = previous.filter(|previous| Some(previous) != shown.as_ref()) {
			trace!(slot = %previous, "releasing content no longer shown");
			cx.registry().release_slot(this.id(), &previous);
		}
		this.html(&ROUTER_TEMPLATE, vec![content])
	}

	fn onconnected(this: &Handle<Self>) {
		interception::connect(this);
	}

	fn ondisconnected(this: &Handle<Self>) {
		interception::disconnect(this);
	}
}

impl Router {
	pub(super) fn config(this: &Handle<Self>) -> Rc<RouterProps> {
		this.props()
			.shared::<RouterProps>(ROUTER_CONFIG)
			.unwrap_or_default()
	}

	/// Compiles the route table once, under the parent router's prefix.
	fn table(this: &Handle<Self>, config: &RouterProps) -> Result<Rc<Vec<CompiledRoute>>> {
		if let Some(table) = this.with(|router| router.table.clone()) {
			return Ok(table);
		}
		let prefix = this
			.with(|router| router.parent_prefix.clone())
			.unwrap_or_default();
		let table = config
			.routes
			.iter()
			.map(|(pattern, loader)| {
				Ok(CompiledRoute {
					pattern: PathPattern::compile(&format!("{prefix}{pattern}"))?,
					loader: loader.clone(),
				})
			})
			.collect::<std::result::Result<Vec<_>, RouterError>>()?;
		let table = Rc::new(table);
		this.with_mut(|router| router.table = Some(table.clone()));
		Ok(table)
	}

	/// Matches the current path. Records the match in the router's props
	/// (`url`, `path`, `params`) and the prefix nested routers compile their
	/// routes under; an unmatched path sets a 404 status and resolves to the
	/// not-found loader.
	pub fn match_route(this: &Handle<Self>) -> Result<(Loader, RouteMatch)> {
		let config = Self::config(this);
		let table = Self::table(this, &config)?;
		let location = this.location();

		for route in table.iter() {
			let Some(params) = route.pattern.matches(&location.path) else {
				continue;
			};
			debug!(pattern = route.pattern.source(), path = %location.path, "route matched");
			let prefix = route.pattern.prefix().to_string();
			this.with_mut(|router| router.matched_prefix = Some(prefix));
			let values = params
				.iter()
				.map(|(key, value)| (key.clone(), Value::String(value.clone())))
				.collect();
			this.set_props(
				&Props::new()
					.with("url", location.url.clone())
					.with("path", location.path.clone())
					.with("params", Value::Object(values)),
			);
			return Ok((
				route.loader.clone(),
				RouteMatch {
					pattern: route.pattern.source().to_string(),
					path: location.path,
					url: location.url,
					params,
				},
			));
		}

		debug!(path = %location.path, "no route matched");
		this.with_mut(|router| router.matched_prefix = None);
		this.context().set_status(StatusCode::NOT_FOUND);
		let loader = config.not_found.clone().unwrap_or_else(Loader::empty);
		Ok((
			loader,
			RouteMatch {
				path: location.path,
				url: location.url,
				..RouteMatch::default()
			},
		))
	}

	fn fetch(this: &Handle<Self>) -> Result<LocalBoxFuture<'static, Result<Option<Content>>>> {
		let (loader, matched) = Self::match_route(this)?;
		Ok(match loader.load(&matched) {
			Loading::Ready(content) => future::ready(Ok(content)).boxed_local(),
			Loading::Deferred(pending) => pending,
		})
	}

	/// Matches the current path and stores the loaded content as `loaded`.
	pub fn load(this: &Handle<Self>) -> LocalBoxFuture<'static, Result<()>> {
		let pending = match Self::fetch(this) {
			Ok(pending) => pending,
			Err(error) => return future::ready(Err(error)).boxed_local(),
		};
		let this = this.clone();
		async move {
			let content = pending.await?;
			Self::set_loaded(&this, content);
			Ok(())
		}
		.boxed_local()
	}

	/// Loads the current path again and re-renders the tree, unless a newer
	/// navigation started meanwhile.
	pub fn reload(this: &Handle<Self>) -> LocalBoxFuture<'static, Result<()>> {
		let generation = Self::next_generation(this);
		let pending = match Self::fetch(this) {
			Ok(pending) => pending,
			Err(error) => return future::ready(Err(error)).boxed_local(),
		};
		let this = this.clone();
		async move {
			let content = pending.await?;
			if !Self::is_current(&this, generation) {
				warn!("reload superseded by a newer navigation; result discarded");
				return Ok(());
			}
			Self::set_loaded(&this, content);
			this.context().render().unwrap_or(Ok(View::Empty))?;
			Ok(())
		}
		.boxed_local()
	}

	/// Navigates to `url`.
	///
	/// Shows the loading state at once, updates history and title, then
	/// loads the new route. Once loaded it scrolls to the top when the path
	/// changed, records the final title in history and re-renders the whole
	/// tree. A navigation started meanwhile supersedes this one, whose
	/// result is then discarded.
	pub fn navigate_to(
		this: &Handle<Self>,
		url: &str,
		options: NavigateOptions,
	) -> LocalBoxFuture<'static, Result<()>> {
		let span = debug_span!("navigate", to = url);
		match span.in_scope(|| Self::begin_navigation(this, url, options)) {
			Ok(pending) => pending.instrument(span).boxed_local(),
			Err(error) => future::ready(Err(error)).boxed_local(),
		}
	}

	fn begin_navigation(
		this: &Handle<Self>,
		url: &str,
		options: NavigateOptions,
	) -> Result<LocalBoxFuture<'static, Result<()>>> {
		let cx = this.context().clone();
		let host = cx
			.env()
			.browser_host()
			.ok_or(RouterError::NoBrowserHost)?;
		let config = Self::config(this);
		let previous = cx.location().path;
		let navigation = Navigation {
			from: previous.clone(),
			to: url.to_string(),
		};

		if let Some(before) = &config.before_navigate {
			before(&navigation);
		}
		cx.reset_redirect();

		Self::set_loaded(this, None);
		this.render()?;

		let title = Self::page_title(this, &config, host.as_ref());
		let state = HistoryState {
			page_title: title.clone(),
		};
		if options.replace {
			host.replace_state(&state, url);
		} else {
			host.push_state(&state, url);
		}
		host.set_title(&title);

		let generation = Self::next_generation(this);
		let pending = Self::fetch(this)?;
		let this = this.clone();
		let url = url.to_string();

		Ok(async move {
			let content = pending.await?;
			if !Self::is_current(&this, generation) {
				warn!(url = %url, "navigation superseded; result discarded");
				return Ok(());
			}
			Self::set_loaded(&this, content);
			if cx.location().path != previous {
				host.scroll_to_top();
			}
			if let Some(after) = &config.after_navigate {
				after(&navigation);
			}
			let title = Self::page_title(&this, &config, host.as_ref());
			host.set_title(&title);
			host.replace_state(&HistoryState { page_title: title }, &url);
			cx.render().unwrap_or(Ok(View::Empty))?;
			Ok(())
		}
		.boxed_local())
	}

	pub(super) fn page_title(this: &Handle<Self>, config: &RouterProps, host: &dyn BrowserHost) -> String {
		match &config.page_title {
			Some(title) => title(&this.state()),
			None => host.title(),
		}
	}

	fn set_loaded(this: &Handle<Self>, content: Option<Content>) {
		match content {
			Some(content) => this.set_props(&Props::new().with("loaded", content)),
			None => this.unset_prop("loaded"),
		};
	}

	fn next_generation(this: &Handle<Self>) -> u64 {
		this.with_mut(|router| {
			router.generation += 1;
			router.generation
		})
	}

	fn is_current(this: &Handle<Self>, generation: u64) -> bool {
		this.with(|router| router.generation) == generation
	}
}
