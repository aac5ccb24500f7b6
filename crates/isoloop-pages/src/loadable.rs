//! Content loaded asynchronously during initialization.

use std::fmt;
use std::future::Future;
use std::rc::Rc;

use futures::FutureExt;
use futures::future::LocalBoxFuture;
use tracing::{debug, warn};

use crate::component::{Component, Content, Handle, HookFuture, Prop, Props};
use crate::error::{PagesError, Result};
use crate::registry::SlotKey;
use crate::template::{Interpolation, Rendered, Template};

/// Prop holding the [`LoadableProps`] of a loadable.
pub const LOADABLE_CONFIG: &str = "loadable";

static LOADABLE_TEMPLATE: Template = Template::new(&["<div class=\"isoloop-loadable\">", "</div>"]);

type LoaderFn = Rc<dyn Fn() -> LocalBoxFuture<'static, Result<Option<Content>>>>;

/// What a [`Loadable`] loads and shows meanwhile.
#[derive(Clone, Default)]
pub struct LoadableProps {
	loader: Option<LoaderFn>,
	loading: Option<Content>,
}

impl LoadableProps {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn loader<F, Fut>(mut self, loader: F) -> Self
	where
		F: Fn() -> Fut + 'static,
		Fut: Future<Output = Result<Option<Content>>> + 'static,
	{
		self.loader = Some(Rc::new(move || loader().boxed_local()));
		self
	}

	pub fn loading(mut self, content: Content) -> Self {
		self.loading = Some(content);
		self
	}

	pub fn into_props(self) -> Props {
		Props::new().with(LOADABLE_CONFIG, Prop::shared(self))
	}
}

impl From<LoadableProps> for Props {
	fn from(config: LoadableProps) -> Self {
		config.into_props()
	}
}

impl fmt::Debug for LoadableProps {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("LoadableProps")
			.field("loader", &self.loader.is_some())
			.field("loading", &self.loading)
			.finish()
	}
}

/// Renders the `loading` content until its loader resolves, then the loaded content.
#[derive(Debug, Default)]
pub struct Loadable;

impl Loadable {
	fn config(this: &Handle<Self>) -> Rc<LoadableProps> {
		this.props()
			.shared::<LoadableProps>(LOADABLE_CONFIG)
			.unwrap_or_default()
	}
}

impl Component for Loadable {
	fn name() -> &'static str {
		"Loadable"
	}

	fn create(_props: &Props) -> Self {
		Self
	}

	fn oninit(this: &Handle<Self>) -> Option<HookFuture> {
		let Some(loader) = Self::config(this).loader.clone() else {
			let error = PagesError::MissingLoader {
				component: Self::name(),
			};
			warn!(%error, "nothing to load");
			return None;
		};
		let this = this.clone();
		Some(
			async move {
				if let Some(content) = loader().await? {
					debug!(content = content.name(), "content loaded");
					this.set_props(&Props::new().with("loaded", content));
				}
				Ok(None)
			}
			.boxed_local(),
		)
	}

	fn render(this: &Handle<Self>) -> Result<Rendered> {
		let mut props = this.props().clone();
		props.remove(LOADABLE_CONFIG);
		let loaded = props.remove("loaded");
		let parent = this.as_parent();

		let content = match loaded {
			Some(Prop::Content(content)) => {
				content.for_parent(&parent, props, Some(SlotKey::name("loadable-loaded")))?
			}
			_ => match Self::config(this).loading.clone() {
				Some(loading) => {
					loading.for_parent(&parent, props, Some(SlotKey::name("loadable-loading")))?
				}
				None => Interpolation::Empty,
			},
		};
		this.html(&LOADABLE_TEMPLATE, vec![content])
	}
}
