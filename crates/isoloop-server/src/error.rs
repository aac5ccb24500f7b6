//! Errors raised while answering a page request.

use http::header::InvalidHeaderValue;
use isoloop_pages::PagesError;
use thiserror::Error;

use crate::settings::SettingsError;

pub type Result<T> = std::result::Result<T, ServerError>;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ServerError {
	#[error(transparent)]
	Pages(#[from] PagesError),

	/// The request body is not a valid urlencoded form.
	#[error("invalid form body: {0}")]
	Form(#[from] serde_urlencoded::de::Error),

	#[error("failed to build response: {0}")]
	Http(#[from] http::Error),

	#[error("invalid header value: {0}")]
	Header(#[from] InvalidHeaderValue),

	#[error("failed to serialize page state: {0}")]
	Json(#[from] serde_json::Error),

	#[error(transparent)]
	Settings(#[from] SettingsError),
}
