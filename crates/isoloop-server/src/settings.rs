//! Server settings, usually read from a TOML file.
//!
//! Every field has a default, so an empty file is a valid configuration:
//!
//! ```toml
//! container_id = "app"
//! javascript = true
//! public_path = "/static/"
//! bundle = "main.js"
//! state_global = "__app_state"
//!
//! [initial_state]
//! theme = "dark"
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use isoloop_pages::State;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SettingsError {
	#[error("failed to read settings from {path}: {source}")]
	Io {
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},

	#[error("failed to parse settings: {0}")]
	Parse(#[from] toml::de::Error),

	#[error("state_global {0:?} is not a JavaScript identifier")]
	InvalidStateGlobal(String),
}

/// How pages are wrapped into documents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
	/// `id` of the element the application is rendered into.
	pub container_id: String,
	/// Embed the page state and the bundle script.
	pub javascript: bool,
	/// URL prefix the bundle is served under.
	pub public_path: String,
	/// File name of the browser bundle, relative to `public_path`.
	pub bundle: Option<String>,
	/// Global the page state is assigned to.
	pub state_global: String,
	/// Shared state every request starts from.
	pub initial_state: State,
}

impl Default for ServerSettings {
	fn default() -> Self {
		Self {
			container_id: "isoloop_application".to_string(),
			javascript: true,
			public_path: "/isoloop/".to_string(),
			bundle: None,
			state_global: "__isoloop_state".to_string(),
			initial_state: State::new(),
		}
	}
}

impl ServerSettings {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn from_toml_str(source: &str) -> Result<Self, SettingsError> {
		let settings: Self = toml::from_str(source)?;
		settings.validate()?;
		Ok(settings)
	}

	pub fn from_path(path: impl AsRef<Path>) -> Result<Self, SettingsError> {
		let path = path.as_ref();
		let source = fs::read_to_string(path).map_err(|source| SettingsError::Io {
			path: path.to_path_buf(),
			source,
		})?;
		Self::from_toml_str(&source)
	}

	pub fn with_container_id(mut self, id: impl Into<String>) -> Self {
		self.container_id = id.into();
		self
	}

	pub fn with_javascript(mut self, enabled: bool) -> Self {
		self.javascript = enabled;
		self
	}

	pub fn with_bundle(mut self, bundle: impl Into<String>) -> Self {
		self.bundle = Some(bundle.into());
		self
	}

	pub fn with_initial_state(mut self, state: State) -> Self {
		self.initial_state = state;
		self
	}

	/// Checks the fields that end up in generated script.
	pub fn validate(&self) -> Result<(), SettingsError> {
		if !is_identifier(&self.state_global) {
			return Err(SettingsError::InvalidStateGlobal(self.state_global.clone()));
		}
		Ok(())
	}

	/// URL of the browser bundle, when one is configured.
	pub fn bundle_url(&self) -> Option<String> {
		self.bundle
			.as_ref()
			.map(|bundle| format!("{}{}", self.public_path, bundle))
	}
}

/// ASCII JavaScript identifier: a letter, `_` or `$`, then also digits.
fn is_identifier(name: &str) -> bool {
	let mut chars = name.chars();
	chars
		.next()
		.is_some_and(|first| first.is_ascii_alphabetic() || first == '_' || first == '$')
		&& chars.all(|rest| rest.is_ascii_alphanumeric() || rest == '_' || rest == '$')
}
