//! The server flavor of the render context environment.

use std::cell::{Cell, RefCell};
use std::fmt;

use cookie::{Cookie, CookieJar};
use http::header::{COOKIE, USER_AGENT};
use http::{Method, Request, StatusCode};
use isoloop_pages::{CookieOptions, Environment, FormData, Location, Node, Redirect, Storage};
use tracing::{debug, warn};

use crate::error::Result;

/// Storage over the request cookies. Writes become `Set-Cookie` headers.
#[derive(Default)]
pub struct CookieStorage {
	jar: RefCell<CookieJar>,
}

impl CookieStorage {
	pub fn new() -> Self {
		Self::default()
	}

	/// Reads the cookies of every `Cookie` header value. Malformed pairs are skipped.
	pub fn from_headers<'a>(headers: impl IntoIterator<Item = &'a str>) -> Self {
		let mut jar = CookieJar::new();
		for header in headers {
			for cookie in Cookie::split_parse(header.to_string()) {
				match cookie {
					Ok(cookie) => jar.add_original(cookie),
					Err(error) => warn!(%error, "skipping malformed cookie"),
				}
			}
		}
		Self {
			jar: RefCell::new(jar),
		}
	}

	/// `Set-Cookie` values for every cookie written or removed.
	pub fn set_cookie_headers(&self) -> Vec<String> {
		self.jar
			.borrow()
			.delta()
			.map(|cookie| cookie.to_string())
			.collect()
	}
}

impl Storage for CookieStorage {
	fn get(&self, key: &str) -> Option<String> {
		self.jar
			.borrow()
			.get(key)
			.map(|cookie| cookie.value().to_string())
	}

	fn set(&self, key: &str, value: &str, options: &CookieOptions) {
		let mut cookie = Cookie::build((key.to_string(), value.to_string()))
			.path(options.path.clone().unwrap_or_else(|| "/".to_string()))
			.http_only(options.http_only)
			.secure(options.secure);
		if let Some(seconds) = options.max_age {
			cookie = cookie.max_age(cookie::time::Duration::seconds(seconds));
		}
		self.jar.borrow_mut().add(cookie);
	}

	fn unset(&self, key: &str) {
		self.jar
			.borrow_mut()
			.remove(Cookie::build(key.to_string()).path("/"));
	}
}

impl fmt::Debug for CookieStorage {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let names: Vec<String> = self
			.jar
			.borrow()
			.iter()
			.map(|cookie| cookie.name().to_string())
			.collect();
		f.debug_struct("CookieStorage").field("cookies", &names).finish()
	}
}

/// Environment of a single HTTP request.
///
/// Collects what the response needs: the status, the first redirect and the
/// cookies written during rendering.
#[derive(Debug)]
pub struct ServerEnvironment {
	location: Location,
	form: FormData,
	status: Cell<StatusCode>,
	redirect: RefCell<Option<Redirect>>,
	storage: CookieStorage,
}

impl ServerEnvironment {
	/// Builds the environment for `request`. A `POST` body is parsed as an
	/// urlencoded form.
	pub fn from_request<B: AsRef<[u8]>>(request: &Request<B>) -> Result<Self> {
		let url = request
			.uri()
			.path_and_query()
			.map_or("/", |path_and_query| path_and_query.as_str());
		let user_agent = request
			.headers()
			.get(USER_AGENT)
			.and_then(|value| value.to_str().ok())
			.unwrap_or("Unknown");
		let location = Location::new(request.method().clone(), url, user_agent);

		let form = if request.method() == Method::POST {
			serde_urlencoded::from_bytes::<Vec<(String, String)>>(request.body().as_ref())?
				.into_iter()
				.collect()
		} else {
			FormData::new()
		};

		let cookies = request
			.headers()
			.get_all(COOKIE)
			.iter()
			.filter_map(|value| value.to_str().ok());
		debug!(method = %location.method, url = %location.url, "request environment");

		Ok(Self {
			location,
			form,
			status: Cell::new(StatusCode::OK),
			redirect: RefCell::new(None),
			storage: CookieStorage::from_headers(cookies),
		})
	}

	pub fn status(&self) -> StatusCode {
		self.status.get()
	}

	/// The first redirect issued while rendering.
	pub fn redirected(&self) -> Option<Redirect> {
		self.redirect.borrow().clone()
	}

	pub fn set_cookie_headers(&self) -> Vec<String> {
		self.storage.set_cookie_headers()
	}
}

impl Environment for ServerEnvironment {
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
		self.redirect
			.borrow_mut()
			.get_or_insert_with(|| redirect.clone());
	}
}
