//! Per-parent cache of child components.
//!
//! A parent asks for a child by `(component type, slot key)`; the registry
//! hands back the instance created for that slot the first time, so state
//! and nodes survive re-renders. Keys are either names (defaulting to
//! `"<Name>-default"`) or the identity of a shared value. Identity keys are
//! held weakly: once every other owner of the key value is gone the entry
//! is pruned on the next lookup.
//!
//! Entries live until their slot or their parent is released
//! ([`Registry::release_slot`], [`Registry::release`]) or the whole context
//! is torn down.

use std::any::{Any, TypeId};
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::trace;

use crate::component::{AnyComponent, Component, Handle};
use crate::error::Result;

/// Counter for component ids. Zero is reserved for the detached parent.
static NEXT_COMPONENT_ID: AtomicU64 = AtomicU64::new(1);

/// Identifies one component instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ComponentId(u64);

impl ComponentId {
	/// Parent id of root components.
	pub const DETACHED: ComponentId = ComponentId(0);

	pub(crate) fn next() -> Self {
		Self(NEXT_COMPONENT_ID.fetch_add(1, Ordering::Relaxed))
	}
}

impl fmt::Display for ComponentId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "c{}", self.0)
	}
}

/// Distinguishes sibling instances of the same component type.
#[derive(Clone)]
pub enum SlotKey {
	Name(String),
	Identity(IdentityKey),
}

/// A key tied to the identity of a shared value.
#[derive(Clone)]
pub struct IdentityKey {
	address: usize,
	anchor: Weak<dyn Any>,
}

impl SlotKey {
	pub fn name(name: impl Into<String>) -> Self {
		Self::Name(name.into())
	}

	/// Keys by the identity of `value` without keeping it alive.
	pub fn identity<T: Any>(value: &Rc<T>) -> Self {
		let anchor: Weak<dyn Any> = Rc::downgrade(value) as Weak<dyn Any>;
		Self::Identity(IdentityKey {
			address: Rc::as_ptr(value) as *const () as usize,
			anchor,
		})
	}

	pub(crate) fn default_for(component: &str) -> Self {
		Self::Name(format!("{component}-default"))
	}
}

impl fmt::Debug for SlotKey {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Name(name) => f.debug_tuple("Name").field(name).finish(),
			Self::Identity(key) => write!(f, "Identity({:#x})", key.address),
		}
	}
}

impl From<&str> for SlotKey {
	fn from(name: &str) -> Self {
		Self::Name(name.to_string())
	}
}

impl From<String> for SlotKey {
	fn from(name: String) -> Self {
		Self::Name(name)
	}
}

struct IdentityEntry {
	anchor: Weak<dyn Any>,
	component: Rc<dyn AnyComponent>,
}

#[derive(Default)]
struct Entry {
	by_identity: HashMap<(TypeId, usize), IdentityEntry>,
	by_name: HashMap<(TypeId, String), Rc<dyn AnyComponent>>,
}

impl Entry {
	fn lookup(&self, type_id: TypeId, key: &SlotKey) -> Option<Rc<dyn AnyComponent>> {
		match key {
			SlotKey::Name(name) => self.by_name.get(&(type_id, name.clone())).cloned(),
			SlotKey::Identity(key) => self
				.by_identity
				.get(&(type_id, key.address))
				.filter(|entry| entry.anchor.strong_count() > 0)
				.map(|entry| entry.component.clone()),
		}
	}

	fn insert(&mut self, type_id: TypeId, key: SlotKey, component: Rc<dyn AnyComponent>) {
		match key {
			SlotKey::Name(name) => {
				self.by_name.insert((type_id, name), component);
			}
			SlotKey::Identity(key) => {
				self.by_identity.insert(
					(type_id, key.address),
					IdentityEntry {
						anchor: key.anchor,
						component,
					},
				);
			}
		}
	}

	/// Removes identity entries whose key value is gone.
	fn prune(&mut self) -> Vec<Rc<dyn AnyComponent>> {
		let dead: Vec<(TypeId, usize)> = self
			.by_identity
			.iter()
			.filter(|(_, entry)| entry.anchor.strong_count() == 0)
			.map(|(key, _)| *key)
			.collect();
		dead.into_iter()
			.filter_map(|key| self.by_identity.remove(&key))
			.map(|entry| entry.component)
			.collect()
	}

	fn drain(&mut self) -> Vec<Rc<dyn AnyComponent>> {
		let mut out: Vec<_> = self.by_name.drain().map(|(_, component)| component).collect();
		out.extend(self.by_identity.drain().map(|(_, entry)| entry.component));
		out
	}
}

/// Child component cache keyed by parent.
#[derive(Default)]
pub struct Registry {
	entries: RefCell<HashMap<ComponentId, Entry>>,
}

impl Registry {
	/// Returns the cached `C` for `(parent, key)`, creating it on a miss.
	///
	/// A hit returns the instance untouched; props are applied by the caller.
	pub(crate) fn get_or_create<C: Component>(
		&self,
		parent: ComponentId,
		key: Option<SlotKey>,
		create: impl FnOnce() -> Result<Handle<C>>,
	) -> Result<Handle<C>> {
		let type_id = TypeId::of::<C>();
		let key = key.unwrap_or_else(|| SlotKey::default_for(C::name()));

		let (cached, pruned) = {
			let mut entries = self.entries.borrow_mut();
			let entry = entries.entry(parent).or_default();
			let pruned = entry.prune();
			(entry.lookup(type_id, &key), pruned)
		};
		for component in pruned {
			self.discard(component);
		}
		if let Some(handle) = cached.and_then(|component| {
			component
				.as_any()
				.downcast_ref::<Handle<C>>()
				.cloned()
		}) {
			return Ok(handle);
		}

		let handle = create()?;
		trace!(component = C::name(), %parent, ?key, "registry miss");
		self.entries
			.borrow_mut()
			.entry(parent)
			.or_default()
			.insert(type_id, key, Rc::new(handle.clone()));
		Ok(handle)
	}

	/// Tears down the entry of `parent` and, recursively, of its children.
	pub fn release(&self, parent: ComponentId) {
		let removed = self.entries.borrow_mut().remove(&parent);
		if let Some(mut entry) = removed {
			for component in entry.drain() {
				self.discard(component);
			}
		}
	}

	/// Tears down the children `parent` holds under the slot name `name`,
	/// whatever their type.
	pub fn release_slot(&self, parent: ComponentId, name: &str) {
		let removed: Vec<Rc<dyn AnyComponent>> = {
			let mut entries = self.entries.borrow_mut();
			let Some(entry) = entries.get_mut(&parent) else {
				return;
			};
			let keys: Vec<(TypeId, String)> = entry
				.by_name
				.keys()
				.filter(|(_, slot)| slot == name)
				.cloned()
				.collect();
			keys.iter()
				.filter_map(|key| entry.by_name.remove(key))
				.collect()
		};
		for component in removed {
			self.discard(component);
		}
	}

	/// Tears down every entry.
	pub fn clear(&self) {
		let ids: Vec<ComponentId> = self.entries.borrow().keys().copied().collect();
		for id in ids {
			self.release(id);
		}
	}

	/// Number of children cached for `parent`.
	pub fn child_count(&self, parent: ComponentId) -> usize {
		self.entries
			.borrow()
			.get(&parent)
			.map_or(0, |entry| entry.by_name.len() + entry.by_identity.len())
	}

	pub fn contains_parent(&self, parent: ComponentId) -> bool {
		self.entries.borrow().contains_key(&parent)
	}

	fn discard(&self, component: Rc<dyn AnyComponent>) {
		component.disconnect();
		self.release(component.id());
	}
}

impl fmt::Debug for Registry {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Registry")
			.field("parents", &self.entries.borrow().len())
			.finish()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::component::Props;
	use crate::context::RenderContext;
	use crate::template::{MarkupEngine, Rendered, View};
	use crate::testing::StaticEnvironment;
	use http::Method;
	use rstest::{fixture, rstest};

	struct Leaf;

	impl Component for Leaf {
		fn name() -> &'static str {
			"Leaf"
		}

		fn create(_props: &Props) -> Self {
			Leaf
		}

		fn render(_this: &Handle<Self>) -> Result<Rendered> {
			Ok(Rendered::View(View::Empty))
		}
	}

	#[fixture]
	fn cx() -> RenderContext {
		RenderContext::new(
			Rc::new(StaticEnvironment::new(Method::GET, "/")),
			Rc::new(MarkupEngine::new()),
		)
	}

	fn leaf(cx: &RenderContext, parent: ComponentId, key: Option<SlotKey>) -> Handle<Leaf> {
		cx.registry()
			.get_or_create::<Leaf>(parent, key, || Handle::new(Props::new(), cx))
			.unwrap()
	}

	#[rstest]
	fn test_same_slot_returns_cached_instance(cx: RenderContext) {
		let parent = ComponentId::next();

		let first = leaf(&cx, parent, None);
		let again = leaf(&cx, parent, Some(SlotKey::name("Leaf-default")));
		let other = leaf(&cx, parent, Some(SlotKey::name("second")));

		assert!(first.ptr_eq(&again));
		assert!(!first.ptr_eq(&other));
		assert_eq!(cx.registry().child_count(parent), 2);
	}

	#[rstest]
	fn test_identity_entry_pruned_when_key_dropped(cx: RenderContext) {
		let parent = ComponentId::next();
		let item = Rc::new("item".to_string());

		let first = leaf(&cx, parent, Some(SlotKey::identity(&item)));
		let again = leaf(&cx, parent, Some(SlotKey::identity(&item)));
		assert!(first.ptr_eq(&again));

		drop(item);
		leaf(&cx, parent, Some(SlotKey::name("other")));

		assert_eq!(cx.registry().child_count(parent), 1);
	}

	#[rstest]
	fn test_release_is_recursive(cx: RenderContext) {
		let parent = ComponentId::next();
		let child = leaf(&cx, parent, None);
		leaf(&cx, child.id(), None);
		assert!(cx.registry().contains_parent(child.id()));

		cx.registry().release(parent);

		assert!(!cx.registry().contains_parent(parent));
		assert!(!cx.registry().contains_parent(child.id()));
	}

	#[rstest]
	fn test_release_slot_drops_only_that_slot(cx: RenderContext) {
		let parent = ComponentId::next();
		let shown = leaf(&cx, parent, Some(SlotKey::name("/a-loadable-loaded")));
		leaf(&cx, shown.id(), None);
		let kept = leaf(&cx, parent, Some(SlotKey::name("/b-loadable-loaded")));

		cx.registry().release_slot(parent, "/a-loadable-loaded");

		assert_eq!(cx.registry().child_count(parent), 1);
		assert!(!cx.registry().contains_parent(shown.id()));
		let again = leaf(&cx, parent, Some(SlotKey::name("/b-loadable-loaded")));
		assert!(kept.ptr_eq(&again));
	}
}
