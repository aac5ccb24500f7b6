//! Server-side page rendering for isoloop components.
//!
//! [`render_page`] turns an [`http::Request`] into a complete response: it
//! builds a [`ServerEnvironment`] from the request, runs the initialization
//! barrier over the whole component tree, and answers with either the
//! rendered document, the redirect a component issued, or a `303 See Other`
//! for form submissions.
//!
//! ```ignore
//! use isoloop_server::{PageOptions, ServerSettings, render_page};
//!
//! let settings = ServerSettings::from_path("isoloop.toml")?;
//! let response = render_page::<App>(&settings, &PageOptions::new(), &request).await?;
//! ```

pub mod environment;
pub mod error;
pub mod page;
pub mod settings;

pub use environment::{CookieStorage, ServerEnvironment};
pub use error::{Result, ServerError};
pub use page::{PageOptions, render_page};
pub use settings::{ServerSettings, SettingsError};
