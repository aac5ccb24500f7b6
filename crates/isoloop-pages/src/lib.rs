//! Isoloop Pages - isomorphic component runtime
//!
//! Components render identically on the server, where the tree is turned into
//! markup for a request, and in the browser, where server markup is adopted in
//! place instead of being rendered again.
//!
//! ## Architecture
//!
//! - [`component`]: component trait, handles, props and the placement protocol
//! - [`context`]: the per-page render context and the environment contract
//! - [`registry`]: component identity across render passes
//! - [`template`]: static templates and the markup and DOM engines
//! - [`hydration`]: marker pairs and the matcher that recovers slot regions
//! - [`dom`]: the node tree used in the browser and by hydration
//! - [`browser`]: the browser flavor of the context and [`browser::mount`]
//! - [`router`]: client-side routing built as an ordinary component
//! - [`loadable`]: content loaded during initialization
//! - [`testing`]: in-memory environments for tests
//!
//! ## Example
//!
//! ```ignore
//! use isoloop_pages::prelude::*;
//!
//! let cx = RenderContext::new(env, Rc::new(MarkupEngine::new()));
//! let view = cx.initialize::<App>().await?;
//! ```

// Core modules
pub mod component;
pub mod context;
pub mod dom;
pub mod error;
pub mod event;
pub mod registry;

// Rendering and hydration
pub mod hydration;
pub mod template;

// Browser flavor
pub mod browser;

// Built-in components
pub mod loadable;
pub mod router;

pub mod prelude;
pub mod testing;

pub use browser::{BrowserEnvironment, BrowserHost, HistoryState, MemoryHost, mount, read_form};
pub use component::{
	Component, Content, Handle, HookFuture, Mount, Parent, Prop, Props, StateUpdate, WeakHandle,
};
pub use context::{
	CookieOptions, Environment, FormData, Location, Redirect, RenderContext, State, Storage,
};
pub use dom::Node;
pub use error::{MALFORMED_TEMPLATE_MESSAGE, PagesError, Result};
pub use event::{Event, EventKind, Modifiers};
pub use hydration::{HydrationError, MarkerMatcher, MarkerTokens, Slot};
pub use loadable::{Loadable, LoadableProps};
pub use registry::{ComponentId, SlotKey};
pub use router::{Loader, NavigateOptions, RouteMatch, Router, RouterError, RouterProps};
pub use template::{
	DomEngine, Interpolation, MarkupEngine, Rendered, Template, TemplateEngine, TemplateError, View,
};
