//! Components and their lifecycle.
//!
//! A component type implements [`Component`]; the runtime wraps each
//! instance in a [`Handle`] that carries its props, its render binding and
//! its link to the shared [`RenderContext`]. Parents place children with
//! [`Mount::for_parent`], which follows one of three protocol phases:
//!
//! 1. **Tree initialization** (the context is initializing): the child's
//!    `oninit`, and `onsubmit` for matching submissions, are awaited before it
//!    renders, and its own children are discovered by that render. The
//!    returned [`Interpolation::Pending`] is joined by the parent, so the
//!    whole tree settles before anything is emitted.
//! 2. **Adoption** (the context is adopting): the child is bound lazily to
//!    the server-rendered region the hydration matcher finds for its slot.
//! 3. **Steady state**: props are applied and the child renders at once.
//!
//! Lifecycle hooks are optional trait methods returning `Option<HookFuture>`;
//! a `None` means the component does not handle that hook.
//!
//! ```
//! use isoloop_pages::prelude::*;
//!
//! static COUNTER: Template = Template::new(&["<p>", "</p>"]);
//!
//! struct Counter;
//!
//! impl Component for Counter {
//! 	fn name() -> &'static str {
//! 		"Counter"
//! 	}
//!
//! 	fn create(_props: &Props) -> Self {
//! 		Counter
//! 	}
//!
//! 	fn render(this: &Handle<Self>) -> Result<Rendered> {
//! 		let count = this.state().get("count").cloned().unwrap_or_default();
//! 		this.html(&COUNTER, vec![Interpolation::text(count)])
//! 	}
//! }
//! ```

use std::any::Any;
use std::cell::{Cell, Ref, RefCell};
use std::collections::BTreeMap;
use std::fmt;
use std::rc::{Rc, Weak};

use futures::FutureExt;
use futures::future::{self, LocalBoxFuture};
use serde_json::Value;
use tracing::{Instrument, debug, debug_span, warn};

use crate::context::{FormData, Location, RenderContext, State, Storage};
use crate::dom::Node;
use crate::error::{PagesError, Result};
use crate::event::{Event, EventKind};
use crate::hydration::HydrationError;
use crate::registry::{ComponentId, SlotKey};
use crate::template::{AdoptionThunk, Interpolation, Rendered, SlotKind, Template, View};

/// Future returned by lifecycle hooks. A resolved state is merged into the shared state.
pub type HookFuture = LocalBoxFuture<'static, Result<Option<State>>>;

/// A component type.
pub trait Component: Sized + 'static {
	/// Name used for default slot keys, submission actions and diagnostics.
	fn name() -> &'static str;

	/// Builds the instance from its initial props.
	fn create(props: &Props) -> Self;

	/// State seeded into the shared state at construction, without rendering.
	fn default_state(_props: &Props) -> Option<State> {
		None
	}

	fn render(this: &Handle<Self>) -> Result<Rendered>;

	/// Asynchronous initialization.
	fn oninit(_this: &Handle<Self>) -> Option<HookFuture> {
		None
	}

	/// Handles a form submission addressed to this component.
	fn onsubmit(_this: &Handle<Self>, _event: &Event, _form: FormData) -> Option<HookFuture> {
		None
	}

	/// Handles any other event.
	fn onevent(_this: &Handle<Self>, _event: &Event) -> Option<HookFuture> {
		None
	}

	/// Called in steady state before rendering with the previous and new props.
	fn onrender(_this: &Handle<Self>, _previous: &Props, _next: &Props) {}

	/// Called once after the first live render in the browser.
	fn onconnected(_this: &Handle<Self>) {}

	/// Called when the component's registry entry is torn down after connecting.
	fn ondisconnected(_this: &Handle<Self>) {}
}

/// A single prop value.
#[derive(Clone)]
pub enum Prop {
	Value(Value),
	/// Component content to place in a slot.
	Content(Content),
	/// Any shared value, such as configuration or callbacks.
	Shared(Rc<dyn Any>),
}

impl Prop {
	pub fn shared<T: Any>(value: T) -> Self {
		Self::Shared(Rc::new(value))
	}
}

impl fmt::Debug for Prop {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Value(value) => write!(f, "{value}"),
			Self::Content(content) => write!(f, "<{}>", content.name()),
			Self::Shared(_) => f.write_str("<shared>"),
		}
	}
}

impl From<Value> for Prop {
	fn from(value: Value) -> Self {
		Self::Value(value)
	}
}

impl From<&str> for Prop {
	fn from(value: &str) -> Self {
		Self::Value(Value::String(value.to_string()))
	}
}

impl From<String> for Prop {
	fn from(value: String) -> Self {
		Self::Value(Value::String(value))
	}
}

impl From<bool> for Prop {
	fn from(value: bool) -> Self {
		Self::Value(Value::Bool(value))
	}
}

impl From<i64> for Prop {
	fn from(value: i64) -> Self {
		Self::Value(Value::from(value))
	}
}

impl From<Content> for Prop {
	fn from(content: Content) -> Self {
		Self::Content(content)
	}
}

/// Component props.
#[derive(Clone, Default)]
pub struct Props(BTreeMap<String, Prop>);

impl Props {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn with(mut self, key: impl Into<String>, value: impl Into<Prop>) -> Self {
		self.insert(key, value);
		self
	}

	pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Prop>) {
		self.0.insert(key.into(), value.into());
	}

	pub fn remove(&mut self, key: &str) -> Option<Prop> {
		self.0.remove(key)
	}

	pub fn get(&self, key: &str) -> Option<&Prop> {
		self.0.get(key)
	}

	pub fn contains(&self, key: &str) -> bool {
		self.0.contains_key(key)
	}

	pub fn value(&self, key: &str) -> Option<&Value> {
		match self.0.get(key)? {
			Prop::Value(value) => Some(value),
			_ => None,
		}
	}

	pub fn str(&self, key: &str) -> Option<&str> {
		self.value(key)?.as_str()
	}

	pub fn content(&self, key: &str) -> Option<&Content> {
		match self.0.get(key)? {
			Prop::Content(content) => Some(content),
			_ => None,
		}
	}

	pub fn shared<T: Any>(&self, key: &str) -> Option<Rc<T>> {
		match self.0.get(key)? {
			Prop::Shared(value) => value.clone().downcast::<T>().ok(),
			_ => None,
		}
	}

	/// Shallow merge, key by key.
	pub fn merge(&mut self, other: &Props) {
		for (key, value) in &other.0 {
			self.0.insert(key.clone(), value.clone());
		}
	}

	pub fn keys(&self) -> impl Iterator<Item = &str> {
		self.0.keys().map(String::as_str)
	}

	pub fn len(&self) -> usize {
		self.0.len()
	}

	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}
}

impl fmt::Debug for Props {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_map().entries(self.0.iter()).finish()
	}
}

type MountFn = dyn Fn(&Parent, Props, Option<SlotKey>) -> Result<Interpolation>;

/// A component type, erased, ready to be placed in a slot.
#[derive(Clone)]
pub struct Content {
	name: &'static str,
	mount: Rc<MountFn>,
}

impl Content {
	pub fn of<C: Component>() -> Self {
		Self {
			name: C::name(),
			mount: Rc::new(|parent: &Parent, props: Props, key: Option<SlotKey>| {
				C::for_parent(parent, props, key)
			}),
		}
	}

	pub fn name(&self) -> &'static str {
		self.name
	}

	/// Same as [`Mount::for_parent`] for the erased component type.
	pub fn for_parent(&self, parent: &Parent, props: Props, key: Option<SlotKey>) -> Result<Interpolation> {
		(self.mount)(parent, props, key)
	}
}

impl fmt::Debug for Content {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_tuple("Content").field(&self.name).finish()
	}
}

/// The owner a child is placed under.
#[derive(Clone, Debug)]
pub struct Parent {
	id: ComponentId,
	cx: RenderContext,
}

impl Parent {
	/// The parent of root components.
	pub fn detached(cx: &RenderContext) -> Self {
		Self {
			id: ComponentId::DETACHED,
			cx: cx.clone(),
		}
	}

	pub fn id(&self) -> ComponentId {
		self.id
	}

	pub fn context(&self) -> &RenderContext {
		&self.cx
	}
}

/// A state update passed to [`Handle::set_state`].
pub enum StateUpdate {
	Patch(State),
	/// Computes the patch from the current shared state.
	With(Box<dyn FnOnce(&State) -> Option<State>>),
	Keep,
}

impl StateUpdate {
	pub fn with(update: impl FnOnce(&State) -> Option<State> + 'static) -> Self {
		Self::With(Box::new(update))
	}
}

impl From<State> for StateUpdate {
	fn from(state: State) -> Self {
		Self::Patch(state)
	}
}

impl From<Option<State>> for StateUpdate {
	fn from(state: Option<State>) -> Self {
		state.map_or(Self::Keep, Self::Patch)
	}
}

struct Instance<C> {
	id: ComponentId,
	cx: RenderContext,
	props: RefCell<Props>,
	component: RefCell<C>,
	node: RefCell<Option<Vec<Node>>>,
	wire: RefCell<Option<Box<dyn crate::template::Wire>>>,
	initializing: Cell<bool>,
	connected: Cell<bool>,
}

/// Shared handle to a component instance.
pub struct Handle<C: Component>(Rc<Instance<C>>);

impl<C: Component> Clone for Handle<C> {
	fn clone(&self) -> Self {
		Self(self.0.clone())
	}
}

impl<C: Component> fmt::Debug for Handle<C> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Handle")
			.field("component", &C::name())
			.field("id", &self.0.id)
			.field("props", &self.0.props.borrow())
			.finish_non_exhaustive()
	}
}

impl<C: Component> Handle<C> {
	/// Constructs an instance: copies props, seeds default state and, outside
	/// the initialization barrier, starts `oninit` in the background.
	pub(crate) fn new(props: Props, cx: &RenderContext) -> Result<Self> {
		if !cx.is_live() {
			return Err(PagesError::InvalidContext);
		}
		let component = C::create(&props);
		let handle = Self(Rc::new(Instance {
			id: ComponentId::next(),
			cx: cx.clone(),
			props: RefCell::new(props),
			component: RefCell::new(component),
			node: RefCell::new(None),
			wire: RefCell::new(None),
			initializing: Cell::new(false),
			connected: Cell::new(false),
		}));

		let seeded = C::default_state(&handle.props());
		if let Some(state) = seeded {
			handle.apply_state(StateUpdate::Patch(state), false);
		}

		if !cx.is_initializing()
			&& let Some(hook) = C::oninit(&handle)
		{
			handle.0.initializing.set(true);
			let this = handle.clone();
			let span = debug_span!("oninit", component = C::name());
			cx.spawn(
				async move {
					let outcome = hook.await;
					this.0.initializing.set(false);
					match outcome {
						Ok(state) => this.apply_state(state.into(), true),
						Err(error) => warn!(%error, "oninit failed"),
					}
				}
				.instrument(span),
			);
		}
		Ok(handle)
	}

	pub fn id(&self) -> ComponentId {
		self.0.id
	}

	pub fn context(&self) -> &RenderContext {
		&self.0.cx
	}

	/// This component as the parent of its children.
	pub fn as_parent(&self) -> Parent {
		Parent {
			id: self.0.id,
			cx: self.0.cx.clone(),
		}
	}

	pub fn ptr_eq(&self, other: &Handle<C>) -> bool {
		Rc::ptr_eq(&self.0, &other.0)
	}

	pub fn downgrade(&self) -> WeakHandle<C> {
		WeakHandle(Rc::downgrade(&self.0))
	}

	pub fn props(&self) -> Ref<'_, Props> {
		self.0.props.borrow()
	}

	/// Shallow-merges `props` into this component's props without rendering.
	pub fn set_props(&self, props: &Props) -> &Self {
		self.0.props.borrow_mut().merge(props);
		self
	}

	/// Removes a prop without rendering.
	pub fn unset_prop(&self, key: &str) -> &Self {
		self.0.props.borrow_mut().remove(key);
		self
	}

	pub fn with<R>(&self, f: impl FnOnce(&C) -> R) -> R {
		f(&self.0.component.borrow())
	}

	pub fn with_mut<R>(&self, f: impl FnOnce(&mut C) -> R) -> R {
		f(&mut self.0.component.borrow_mut())
	}

	/// The shared state.
	pub fn state(&self) -> Ref<'_, State> {
		self.0.cx.state()
	}

	pub fn location(&self) -> Location {
		self.0.cx.location()
	}

	pub fn storage(&self) -> &dyn Storage {
		self.0.cx.storage()
	}

	/// `true` while this instance's own `oninit` is pending.
	pub fn is_initializing(&self) -> bool {
		self.0.initializing.get()
	}

	pub fn is_connected(&self) -> bool {
		self.0.connected.get()
	}

	/// The adopted region, if any.
	pub fn node(&self) -> Option<Vec<Node>> {
		self.0.node.borrow().clone()
	}

	pub(crate) fn bind_node(&self, nodes: Vec<Node>) {
		*self.0.node.borrow_mut() = Some(nodes);
	}

	/// Submission target addressing this component, for form `action`s.
	pub fn action(&self) -> String {
		format!("?action={}", C::name())
	}

	/// Merges into the shared state and re-renders from the root, unless this
	/// component or the tree is still initializing.
	pub fn set_state(&self, update: impl Into<StateUpdate>) -> &Self {
		self.apply_state(update.into(), true);
		self
	}

	/// Merges into the shared state without rendering.
	pub fn set_state_silent(&self, update: impl Into<StateUpdate>) -> &Self {
		self.apply_state(update.into(), false);
		self
	}

	fn apply_state(&self, update: StateUpdate, render: bool) {
		let _span = debug_span!("setState", component = C::name()).entered();
		let cx = &self.0.cx;
		let patch = match update {
			StateUpdate::Patch(state) => Some(state),
			StateUpdate::With(update) => {
				let current = cx.state().clone();
				update(&current)
			}
			StateUpdate::Keep => None,
		};
		if let Some(patch) = patch {
			debug!(?patch, "state merged");
			cx.merge_state(patch);
		}
		if render && !self.0.initializing.get() && !cx.is_initializing() {
			if let Some(Err(error)) = cx.render() {
				warn!(%error, "render after state change failed");
			}
		}
	}

	/// Dispatches `event` to the matching hook and merges its resulting state.
	///
	/// Events without a handler resolve successfully.
	pub fn handle_event(&self, event: &Event) -> LocalBoxFuture<'static, Result<()>> {
		let span = debug_span!("event", component = C::name(), kind = %event.kind());
		let hook = span.in_scope(|| match event.kind() {
			EventKind::Init => C::oninit(self),
			EventKind::Submit => {
				let form = self.0.cx.form(event.current_target());
				debug!(?form, "form parsed");
				C::onsubmit(self, event, form)
			}
			_ => C::onevent(self, event),
		});
		let Some(hook) = hook else {
			return future::ready(Ok(())).boxed_local();
		};
		event.stop_propagation();
		let this = self.clone();
		async move {
			if let Some(state) = hook.await? {
				this.set_state(state);
			}
			Ok(())
		}
		.instrument(span)
		.boxed_local()
	}

	/// Renders this component through its own render function.
	pub fn render(&self) -> Result<Rendered> {
		let rendered = C::render(self)?;
		if !rendered.is_pending() && self.0.cx.is_browser() && !self.0.connected.replace(true) {
			C::onconnected(self);
		}
		Ok(rendered)
	}

	/// Renders `template` through this component's binding.
	///
	/// While the tree initializes, nothing is rendered; the pending child
	/// initializations among `values` are returned instead. While adopting,
	/// adoption thunks are bound to the regions the hydration matcher finds
	/// in this component's node.
	pub fn html(&self, template: &'static Template, values: Vec<Interpolation>) -> Result<Rendered> {
		let cx = &self.0.cx;
		if cx.is_initializing() {
			let pending = values
				.into_iter()
				.filter_map(|value| match value {
					Interpolation::Pending(pending) => Some(pending),
					_ => None,
				})
				.collect();
			return Ok(Rendered::Pending(pending));
		}

		let node = self.node();
		let values = match &node {
			Some(region) if cx.is_adopting() => self.bind_slots(template, region, values)?,
			_ => values,
		};

		let mut wire = self
			.0
			.wire
			.try_borrow_mut()
			.map_err(|_| PagesError::RenderInProgress {
				component: C::name(),
			})?;
		let wire = wire.get_or_insert_with(|| cx.engine().wire(node));
		let view = wire.render(template, values)?;
		Ok(Rendered::View(view))
	}

	fn bind_slots(
		&self,
		template: &'static Template,
		region: &[Node],
		values: Vec<Interpolation>,
	) -> Result<Vec<Interpolation>> {
		let slots = self.0.cx.matcher().find_in(region)?;
		let expected = template.content_slots();
		if slots.len() != expected {
			return Err(HydrationError::SlotMismatch {
				component: C::name(),
				expected,
				found: slots.len(),
			}
			.into());
		}
		let mut slots = slots.into_iter();
		values
			.into_iter()
			.enumerate()
			.map(|(index, value)| {
				if template.slot_kind(index) != SlotKind::Content {
					return Ok(value);
				}
				let Some(slot) = slots.next() else {
					return Ok(value);
				};
				match value {
					Interpolation::Adopt(thunk) => Ok(Interpolation::View(thunk.adopt(slot.into_nodes())?)),
					other => Ok(other),
				}
			})
			.collect()
	}

	/// Binds this component to `region` and renders it once over those nodes.
	pub(crate) fn adopt(&self, region: Vec<Node>) -> Result<View> {
		self.bind_node(region);
		Ok(self.render()?.into_view())
	}

	fn disconnect(&self) {
		if self.0.connected.replace(false) {
			C::ondisconnected(self);
		}
	}
}

/// Weak counterpart of [`Handle`], for callbacks that must not keep a component alive.
pub struct WeakHandle<C: Component>(Weak<Instance<C>>);

impl<C: Component> WeakHandle<C> {
	pub fn upgrade(&self) -> Option<Handle<C>> {
		self.0.upgrade().map(Handle)
	}
}

impl<C: Component> Clone for WeakHandle<C> {
	fn clone(&self) -> Self {
		Self(self.0.clone())
	}
}

/// Type-erased access to a component instance.
pub(crate) trait AnyComponent {
	fn id(&self) -> ComponentId;
	fn name(&self) -> &'static str;
	fn render_view(&self) -> Result<View>;
	fn disconnect(&self);
	fn as_any(&self) -> &dyn Any;
}

impl<C: Component> AnyComponent for Handle<C> {
	fn id(&self) -> ComponentId {
		self.0.id
	}

	fn name(&self) -> &'static str {
		C::name()
	}

	fn render_view(&self) -> Result<View> {
		Ok(self.render()?.into_view())
	}

	fn disconnect(&self) {
		Handle::disconnect(self);
	}

	fn as_any(&self) -> &dyn Any {
		self
	}
}

/// Placement of components under a parent.
pub trait Mount: Component {
	/// Resolves the child for `(parent, key)` through the registry without
	/// applying props or rendering.
	fn resolve(parent: &Parent, props: Props, key: Option<SlotKey>) -> Result<Handle<Self>> {
		let cx = parent.context();
		let handle = cx
			.registry()
			.get_or_create::<Self>(parent.id(), key, || Handle::new(props, cx))?;
		cx.adopt_root(Rc::new(handle.clone()));
		Ok(handle)
	}

	/// Places the child for `(parent, key)` according to the protocol phase.
	fn for_parent(parent: &Parent, props: Props, key: Option<SlotKey>) -> Result<Interpolation> {
		let handle = Self::resolve(parent, props.clone(), key)?;
		let cx = parent.context();

		if cx.is_initializing() {
			return Ok(Interpolation::Pending(initialize_subtree(handle).boxed_local()));
		}

		if cx.is_adopting() {
			handle.set_props(&props);
			return Ok(Interpolation::Adopt(AdoptionThunk::new(move |region| {
				handle.adopt(region)
			})));
		}

		let previous = handle.props().clone();
		handle.set_props(&props);
		let next = handle.props().clone();
		Self::onrender(&handle, &previous, &next);
		Ok(Interpolation::View(handle.render()?.into_view()))
	}
}

impl<C: Component> Mount for C {}

/// Runs `oninit`, then `onsubmit` for submissions addressed to `C`, then
/// renders and waits for every child discovered by that render.
pub(crate) async fn initialize_subtree<C: Component>(handle: Handle<C>) -> Result<()> {
	handle.handle_event(&Event::init()).await?;

	let location = handle.location();
	if location.is_submission() {
		let addressed = location
			.query
			.get("action")
			.is_none_or(|action| action == C::name());
		if addressed {
			handle.handle_event(&Event::submit(None)).await?;
		}
	}

	if let Rendered::Pending(children) = handle.render()? {
		future::try_join_all(children).await?;
	}
	Ok(())
}
