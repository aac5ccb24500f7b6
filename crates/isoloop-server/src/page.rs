//! Rendering a root component into an HTTP response.

use std::fmt;
use std::rc::Rc;

use http::header::{CONTENT_TYPE, LOCATION, SET_COOKIE};
use http::{HeaderValue, Request, Response, StatusCode};
use isoloop_pages::dom::escape_attr;
use isoloop_pages::{Component, Environment, MarkupEngine, RenderContext, State};
use tracing::{Instrument, debug, debug_span};

use crate::environment::ServerEnvironment;
use crate::error::Result;
use crate::settings::ServerSettings;

/// Seed of the marker pair around the root component's markup.
const ROOT_MARKER_SEED: &str = "root";

type HeadRenderer = Rc<dyn Fn(&State) -> String>;

/// Per-application options that are not plain settings.
#[derive(Clone)]
pub struct PageOptions {
	/// Language attribute for the `html` element.
	pub lang: String,
	head: Option<HeadRenderer>,
}

impl Default for PageOptions {
	fn default() -> Self {
		Self {
			lang: "en".to_string(),
			head: None,
		}
	}
}

impl PageOptions {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn lang(mut self, lang: impl Into<String>) -> Self {
		self.lang = lang.into();
		self
	}

	/// Markup placed in `<head>`, computed from the final page state.
	pub fn head(mut self, head: impl Fn(&State) -> String + 'static) -> Self {
		self.head = Some(Rc::new(head));
		self
	}
}

impl fmt::Debug for PageOptions {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("PageOptions")
			.field("lang", &self.lang)
			.field("head", &self.head.is_some())
			.finish()
	}
}

/// Renders the root component `C` for `request`.
///
/// The initialization barrier runs over the whole tree first, so every
/// `oninit` and, for `POST` requests, `onsubmit` has settled before any
/// markup exists. The response is then one of:
///
/// - the first redirect a component issued;
/// - `303 See Other` back to the request path for a `POST` (post/redirect/get);
/// - the page document, with the status components set (`200` by default).
///
/// Cookies written through storage are attached to every response.
pub async fn render_page<C, B>(
	settings: &ServerSettings,
	options: &PageOptions,
	request: &Request<B>,
) -> Result<Response<String>>
where
	C: Component,
	B: AsRef<[u8]>,
{
	let span = debug_span!(
		"render_page",
		component = C::name(),
		method = %request.method(),
		uri = %request.uri()
	);
	async {
		let env = Rc::new(ServerEnvironment::from_request(request)?);
		let engine = Rc::new(MarkupEngine::new());
		let cx = RenderContext::new(env.clone(), engine.clone())
			.with_state(settings.initial_state.clone());

		let outcome = respond::<C>(&cx, &env, &engine, settings, options).await;
		cx.teardown();
		outcome
	}
	.instrument(span)
	.await
}

async fn respond<C: Component>(
	cx: &RenderContext,
	env: &ServerEnvironment,
	engine: &MarkupEngine,
	settings: &ServerSettings,
	options: &PageOptions,
) -> Result<Response<String>> {
	let view = cx.initialize::<C>().await?;
	let location = env.location();

	let mut response = if let Some(redirect) = env.redirected() {
		debug!(status = %redirect.status, url = %redirect.url, "answering with redirect");
		Response::builder()
			.status(redirect.status)
			.header(LOCATION, HeaderValue::from_str(&redirect.url)?)
			.body(String::new())?
	} else if location.is_submission() {
		debug!(path = %location.path, "submission handled; redirecting back");
		Response::builder()
			.status(StatusCode::SEE_OTHER)
			.header(LOCATION, HeaderValue::from_str(&location.path)?)
			.body(String::new())?
	} else {
		let markup = engine.wrap(ROOT_MARKER_SEED, &view.to_html());
		let document = document(settings, options, &cx.state(), &markup)?;
		Response::builder()
			.status(env.status())
			.header(CONTENT_TYPE, "text/html; charset=utf-8")
			.body(document)?
	};

	for cookie in env.set_cookie_headers() {
		response
			.headers_mut()
			.append(SET_COOKIE, HeaderValue::from_str(&cookie)?);
	}
	Ok(response)
}

fn document(
	settings: &ServerSettings,
	options: &PageOptions,
	state: &State,
	markup: &str,
) -> Result<String> {
	settings.validate()?;
	let mut html = String::with_capacity(markup.len() + 512);

	html.push_str("<!DOCTYPE html>\n");
	html.push_str(&format!("<html lang=\"{}\">\n", escape_attr(&options.lang)));

	html.push_str("<head>\n");
	html.push_str("<meta charset=\"UTF-8\">\n");
	if let Some(head) = &options.head {
		html.push_str(&head(state));
		html.push('\n');
	}
	if settings.javascript {
		html.push_str(&state_script(&settings.state_global, state)?);
		if let Some(url) = settings.bundle_url() {
			html.push_str(&format!(
				"<script defer src=\"{}\"></script>\n",
				escape_attr(&url)
			));
		}
	}
	html.push_str("</head>\n");

	html.push_str("<body>\n");
	html.push_str(&format!("<div id=\"{}\">", escape_attr(&settings.container_id)));
	html.push_str(markup);
	html.push_str("</div>\n");
	html.push_str("</body>\n</html>\n");

	Ok(html)
}

/// Script assigning the page state to `window.<global>`.
fn state_script(global: &str, state: &State) -> Result<String> {
	let json = escape_json_for_script(&serde_json::to_string(state)?);
	Ok(format!("<script>window.{global} = {json};</script>\n"))
}

/// Escapes `</` so the JSON cannot close the surrounding script element.
fn escape_json_for_script(json: &str) -> String {
	json.replace("</", "<\\/")
}
