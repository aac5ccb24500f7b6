//! Document-level listeners a connected router installs.
//!
//! Listeners hold the router weakly and skip events another router already
//! claimed, so the innermost of nested routers wins.

use std::rc::Rc;

use serde_json::Value;
use tracing::{debug, warn};

use super::RouterError;
use super::core::{NavigateOptions, Router};
use crate::browser::{BrowserHost, HistoryState, Listener, closest_anchor};
use crate::component::{Handle, WeakHandle};
use crate::context::{Location, Redirect};
use crate::event::{Event, EventKind};

/// The same-document target of a click, when the router should take it over.
///
/// Plain primary-button clicks on anchors whose `href` is a local absolute
/// path qualify; links with a `target` or `download`, and links to the
/// current location, are left to the browser.
pub fn intercepted_href(event: &Event, location: &Location) -> Option<String> {
	if event.is_default_prevented() || event.modifiers().any() || event.button() != 0 {
		return None;
	}
	let anchor = closest_anchor(event.target()?)?;
	let opens_elsewhere = anchor
		.attribute("target")
		.is_some_and(|target| !target.eq_ignore_ascii_case("_self"));
	if opens_elsewhere || anchor.attribute("download").is_some() {
		return None;
	}
	let href = anchor.attribute("href")?;
	if !href.starts_with('/') || href.starts_with("//") {
		return None;
	}
	if href == location.path || href == location.url {
		return None;
	}
	Some(href)
}

pub(super) fn connect(this: &Handle<Router>) {
	let Some(host) = this.context().env().browser_host() else {
		return;
	};
	let config = Router::config(this);
	let title = Router::page_title(this, &config, host.as_ref());
	host.replace_state(&HistoryState { page_title: title }, &this.location().url);

	let mut listeners = vec![
		host.add_listener(EventKind::PopState, on_popstate(this.downgrade())),
		host.add_listener(EventKind::Redirect, on_redirect(this.downgrade())),
	];
	if config.intercepts() {
		listeners.push(host.add_listener(EventKind::Click, on_click(this.downgrade())));
		listeners.push(host.add_listener(EventKind::Submit, on_submit(this.downgrade())));
	}
	debug!(count = listeners.len(), "router listeners installed");
	this.with_mut(|router| router.listeners = listeners);
}

pub(super) fn disconnect(this: &Handle<Router>) {
	let listeners = this.with_mut(|router| std::mem::take(&mut router.listeners));
	if let Some(host) = this.context().env().browser_host() {
		for id in listeners {
			host.remove_listener(id);
		}
	}
}

fn spawn_navigation(router: Handle<Router>, url: String, options: NavigateOptions) {
	let cx = router.context().clone();
	cx.spawn(async move {
		if let Err(error) = Router::navigate_to(&router, &url, options).await {
			warn!(%error, url = %url, "navigation failed");
		}
	});
}

fn on_click(router: WeakHandle<Router>) -> Listener {
	Rc::new(move |event: &Event| {
		let Some(router) = router.upgrade() else {
			return;
		};
		let Some(href) = intercepted_href(event, &router.location()) else {
			return;
		};
		event.prevent_default();
		debug!(href = %href, "link click intercepted");
		spawn_navigation(router, href, NavigateOptions::default());
	})
}

fn on_submit(router: WeakHandle<Router>) -> Listener {
	Rc::new(move |event: &Event| {
		let Some(router) = router.upgrade() else {
			return;
		};
		if event.is_default_prevented() {
			return;
		}
		let Some(form) = event.target().filter(|node| node.has_tag("form")) else {
			return;
		};
		let method = form.attribute("method").unwrap_or_default();
		if !method.is_empty() && !method.eq_ignore_ascii_case("get") {
			return;
		}

		let location = router.location();
		let action = form
			.attribute("action")
			.filter(|action| !action.is_empty())
			.unwrap_or(location.path);
		let action = action.split('?').next().unwrap_or_default().to_string();
		if !action.starts_with('/') || action.starts_with("//") {
			return;
		}

		let fields = router.context().form(Some(form));
		let query = match serde_urlencoded::to_string(&fields) {
			Ok(query) => query,
			Err(error) => {
				warn!(error = %RouterError::FormEncoding(error.to_string()), "form left to the browser");
				return;
			}
		};
		event.prevent_default();
		let url = if query.is_empty() {
			action
		} else {
			format!("{action}?{query}")
		};
		debug!(url = %url, "form submission intercepted");
		spawn_navigation(router, url, NavigateOptions::default());
	})
}

fn on_popstate(router: WeakHandle<Router>) -> Listener {
	Rc::new(move |event: &Event| {
		let Some(router) = router.upgrade() else {
			return;
		};
		if let Err(error) = router.render() {
			warn!(%error, "render on popstate failed");
		}
		let title = event.detail().get("page_title").and_then(Value::as_str);
		if let (Some(title), Some(host)) = (title, router.context().env().browser_host()) {
			restore_title(host.as_ref(), title);
		}
		let reload = Router::reload(&router);
		router.context().spawn(async move {
			if let Err(error) = reload.await {
				warn!(%error, "reload on popstate failed");
			}
		});
	})
}

fn restore_title(host: &dyn BrowserHost, title: &str) {
	if !title.is_empty() {
		host.set_title(title);
	}
}

fn on_redirect(router: WeakHandle<Router>) -> Listener {
	Rc::new(move |event: &Event| {
		let Some(router) = router.upgrade() else {
			return;
		};
		if event.is_default_prevented() {
			return;
		}
		let Some(redirect) = Redirect::from_detail(event.detail()) else {
			return;
		};
		event.prevent_default();
		let options = NavigateOptions {
			replace: redirect.is_permanent(),
		};
		spawn_navigation(router, redirect.url, options);
	})
}
