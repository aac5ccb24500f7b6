//! Error types for the component runtime.

use std::fmt;

use thiserror::Error;

use crate::hydration::HydrationError;
use crate::router::RouterError;
use crate::template::TemplateError;

/// Prefix of the message reported for templates that cannot be rendered.
pub const MALFORMED_TEMPLATE_MESSAGE: &str = "Malformed template (usually a result of malformed HTML or interpolations inside attribute values, such as class=\"foo ${bar}\" which should be class=${`foo ${bar}`})";

/// Errors raised by the component runtime.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum PagesError {
	/// A component was constructed without a live render context.
	#[error("components must be created with a live render context")]
	InvalidContext,

	/// The template engine rejected a template while initializing a page.
	#[error("{message}")]
	MalformedTemplate {
		message: String,
		#[source]
		source: TemplateError,
	},

	#[error(transparent)]
	Template(#[from] TemplateError),

	#[error(transparent)]
	Hydration(#[from] HydrationError),

	#[error(transparent)]
	Router(#[from] RouterError),

	/// A loadable component was rendered without its `loader` prop.
	#[error("{component} requires a `loader` prop returning the content to load")]
	MissingLoader { component: &'static str },

	/// A component tried to render itself while already rendering.
	#[error("{component} is already rendering")]
	RenderInProgress { component: &'static str },

	/// A lifecycle hook failed.
	#[error("{component}: {message}")]
	Hook {
		component: &'static str,
		message: String,
	},
}

impl PagesError {
	/// Builds a hook failure for `component`.
	pub fn hook(component: &'static str, message: impl fmt::Display) -> Self {
		Self::Hook {
			component,
			message: message.to_string(),
		}
	}

	/// Rewrites template failures into [`PagesError::MalformedTemplate`].
	pub(crate) fn into_malformed(self) -> Self {
		match self {
			Self::Template(source) => Self::MalformedTemplate {
				message: format!("{MALFORMED_TEMPLATE_MESSAGE} ({source})"),
				source,
			},
			other => other,
		}
	}
}

/// Result alias used throughout the crate.
pub type Result<T, E = PagesError> = std::result::Result<T, E>;
