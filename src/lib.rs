//! # Isoloop
//!
//! Isomorphic component runtime: components render to HTML on the server,
//! and the browser adopts that markup in place before a client-side router
//! takes over navigation.
//!
//! ## Crates
//!
//! - [`pages`]: the environment-neutral core (components, render context,
//!   hydration, router) plus the browser flavor.
//! - [`server`]: renders a root component for an `http::Request`
//!   (feature `server`, enabled by default).
//!
//! ## Quick Example
//!
//! ```rust,ignore
//! use isoloop::prelude::*;
//!
//! static PAGE: Template = Template::new(&["<main>", "</main>"]);
//!
//! struct App;
//!
//! impl Component for App {
//!     fn name() -> &'static str {
//!         "App"
//!     }
//!
//!     fn create(_props: &Props) -> Self {
//!         App
//!     }
//!
//!     fn render(this: &Handle<Self>) -> Result<Rendered> {
//!         let routes = RouterProps::new().route("/", Content::of::<Home>());
//!         let router = Router::for_parent(&this.as_parent(), routes.into_props(), None)?;
//!         this.html(&PAGE, vec![router])
//!     }
//! }
//!
//! // On the server
//! let response = render_page::<App, _>(&settings, &PageOptions::new(), &request).await?;
//! ```

pub mod pages;
#[cfg(feature = "server")]
pub mod server;

pub mod prelude {
	pub use isoloop_pages::prelude::*;

	#[cfg(feature = "server")]
	pub use isoloop_server::{PageOptions, ServerError, ServerSettings, render_page};
}
