//! Client-side router.
//!
//! [`Router`] is an ordinary component: it matches the current path against
//! its route table (first match wins, in declaration order), loads the
//! matched content, and renders it. In the browser it also keeps history and
//! the document title in step with navigation and takes over same-document
//! link clicks, `GET` form submissions and redirect signals.
//!
//! Routers nest: a router created inside matched content compiles its table
//! under the pattern its parent matched.

mod core;
mod interception;
pub mod pattern;

use thiserror::Error;

pub use self::core::{
	Loader, Loading, NavigateOptions, Navigation, ROUTER_CONFIG, RouteMatch, Router, RouterProps,
};
pub use self::interception::intercepted_href;
pub use self::pattern::PathPattern;

/// Errors that can occur during routing.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum RouterError {
	#[error("invalid route pattern {pattern:?}: {message}")]
	InvalidPattern { pattern: String, message: String },
	/// Navigation was requested outside a browser.
	#[error("navigation requires a browser host")]
	NoBrowserHost,
	#[error("form fields could not be encoded: {0}")]
	FormEncoding(String),
}
