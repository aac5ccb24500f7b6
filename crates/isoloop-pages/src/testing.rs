//! In-memory collaborators for exercising components without a server or browser.

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;

use http::{Method, StatusCode};

use crate::context::{CookieOptions, Environment, FormData, Location, Redirect, Storage};
use crate::dom::Node;

/// Storage backed by a map.
#[derive(Debug, Default)]
pub struct MemoryStorage {
	values: RefCell<BTreeMap<String, String>>,
}

impl MemoryStorage {
	pub fn new() -> Self {
		Self::default()
	}
}

impl Storage for MemoryStorage {
	fn get(&self, key: &str) -> Option<String> {
		self.values.borrow().get(key).cloned()
	}

	fn set(&self, key: &str, value: &str, _options: &CookieOptions) {
		self.values
			.borrow_mut()
			.insert(key.to_string(), value.to_string());
	}

	fn unset(&self, key: &str) {
		self.values.borrow_mut().remove(key);
	}
}

/// A server-like environment with a fixed location and form body.
#[derive(Debug)]
pub struct StaticEnvironment {
	location: Location,
	form: FormData,
	status: Cell<StatusCode>,
	redirects: RefCell<Vec<Redirect>>,
	storage: MemoryStorage,
}

impl StaticEnvironment {
	pub fn new(method: Method, url: &str) -> Self {
		Self {
			location: Location::new(method, url, "isoloop-test"),
			form: FormData::new(),
			status: Cell::new(StatusCode::OK),
			redirects: RefCell::new(Vec::new()),
			storage: MemoryStorage::new(),
		}
	}

	pub fn with_form(mut self, form: FormData) -> Self {
		self.form = form;
		self
	}

	pub fn status(&self) -> StatusCode {
		self.status.get()
	}

	/// Every redirect that reached the environment.
	pub fn redirects(&self) -> Vec<Redirect> {
		self.redirects.borrow().clone()
	}
}

impl Environment for StaticEnvironment {
	fn location(&self) -> Location {
		self.location.clone()
	}

	fn set_status(&self, status: StatusCode) {
		self.status.set(status);
	}

	fn storage(&self) -> &dyn Storage {
		&self.storage
	}

	fn form(&self, _source: Option<&Node>) -> FormData {
		self.form.clone()
	}

	fn redirect(&self, redirect: &Redirect) {
		self.redirects.borrow_mut().push(redirect.clone());
	}
}
