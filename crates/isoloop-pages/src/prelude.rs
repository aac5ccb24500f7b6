//! Commonly used items.
//!
//! ```
//! use isoloop_pages::prelude::*;
//! ```

pub use crate::component::{
	Component, Content, Handle, HookFuture, Mount, Parent, Prop, Props, StateUpdate,
};
pub use crate::context::{FormData, Location, Redirect, RenderContext, State};
pub use crate::error::{PagesError, Result};
pub use crate::event::{Event, EventKind};
pub use crate::loadable::{Loadable, LoadableProps};
pub use crate::registry::SlotKey;
pub use crate::router::{Loader, NavigateOptions, Router, RouterProps};
pub use crate::template::{DomEngine, Interpolation, MarkupEngine, Rendered, Template, View};
