//! Server markup adopted in place by the browser flavor.

use std::rc::Rc;

use futures::FutureExt;
use futures::future;
use http::Method;
use isoloop_pages::browser::{BrowserEnvironment, MemoryHost, mount};
use isoloop_pages::dom::Node;
use isoloop_pages::hydration::HydrationError;
use isoloop_pages::prelude::*;
use isoloop_pages::testing::StaticEnvironment;
use rstest::rstest;
use serde_json::{Value, json};

static SHELL: Template = Template::new(&["<main><h1>", "</h1>", "</main>"]);
static COUNTER: Template = Template::new(&["<p class=\"count\" data-count=\"", "\">", "</p>"]);

struct Shell;

impl Component for Shell {
	fn name() -> &'static str {
		"Shell"
	}

	fn create(_props: &Props) -> Self {
		Shell
	}

	fn render(this: &Handle<Self>) -> Result<Rendered> {
		let counter = Counter::for_parent(&this.as_parent(), Props::new(), None)?;
		this.html(&SHELL, vec!["Hello".into(), counter])
	}
}

struct Counter;

impl Component for Counter {
	fn name() -> &'static str {
		"Counter"
	}

	fn create(_props: &Props) -> Self {
		Counter
	}

	fn oninit(this: &Handle<Self>) -> Option<HookFuture> {
		let current = this.state().get("count").and_then(Value::as_i64).unwrap_or(0);
		let mut patch = State::new();
		patch.insert("count".to_string(), json!(current + 1));
		Some(future::ready(Ok(Some(patch))).boxed_local())
	}

	fn render(this: &Handle<Self>) -> Result<Rendered> {
		let count = this.state().get("count").cloned().unwrap_or(json!(0));
		this.html(
			&COUNTER,
			vec![Interpolation::text(&count), Interpolation::text(count)],
		)
	}
}

async fn server_markup() -> (String, State) {
	let engine = Rc::new(MarkupEngine::new());
	let cx = RenderContext::new(
		Rc::new(StaticEnvironment::new(Method::GET, "/")),
		engine.clone(),
	);
	let view = cx.initialize::<Shell>().await.unwrap();
	let html = engine.wrap("root", &view.to_html());
	let state = cx.state().clone();
	cx.teardown();
	(html, state)
}

fn browser(state: State) -> (Rc<MemoryHost>, Rc<DomEngine>, RenderContext) {
	let host = Rc::new(MemoryHost::new("/").with_initial_state(state));
	let engine = Rc::new(DomEngine::new());
	let cx = BrowserEnvironment::context(host.clone(), engine.clone());
	(host, engine, cx)
}

#[tokio::test]
async fn test_adoption_keeps_server_nodes() {
	let (html, state) = server_markup().await;
	assert_eq!(state.get("count"), Some(&json!(1)));
	let (_host, engine, cx) = browser(state);
	let container = Node::element("div");
	container.replace_children(Node::parse_fragment(&html).children());
	let before = container.descendants();

	mount::<Shell>(&cx, &container, true).await.unwrap();
	let after = container.descendants();

	assert_eq!(before.len(), after.len());
	assert!(before.iter().zip(&after).all(|(a, b)| a.ptr_eq(b)));
	assert_eq!(engine.patch_count(), 2);
}

#[tokio::test]
async fn test_adoption_renders_browser_state_over_server_nodes() {
	let (html, state) = server_markup().await;
	let (_host, _engine, cx) = browser(state);
	let container = Node::element("div");
	container.replace_children(Node::parse_fragment(&html).children());
	let count = container
		.descendants()
		.into_iter()
		.find(|node| node.has_tag("p"))
		.unwrap();
	assert_eq!(count.text_content(), "1");

	mount::<Shell>(&cx, &container, true).await.unwrap();

	assert_eq!(cx.state().get("count"), Some(&json!(2)));
	let after = container
		.descendants()
		.into_iter()
		.find(|node| node.has_tag("p"))
		.unwrap();
	assert!(after.ptr_eq(&count));
	assert_eq!(count.text_content(), "2");
	assert_eq!(count.attribute("data-count").as_deref(), Some("2"));
}

#[tokio::test]
async fn test_adopted_tree_updates_in_place() {
	let (html, state) = server_markup().await;
	let (_host, _engine, cx) = browser(state);
	let container = Node::element("div");
	container.replace_children(Node::parse_fragment(&html).children());
	let main = container
		.descendants()
		.into_iter()
		.find(|node| node.has_tag("main"))
		.unwrap();

	let shell = mount::<Shell>(&cx, &container, true).await.unwrap();
	let counter = Counter::resolve(&shell.as_parent(), Props::new(), None).unwrap();
	let mut patch = State::new();
	patch.insert("count".to_string(), json!(41));
	counter.set_state(patch);

	let main_after = container
		.descendants()
		.into_iter()
		.find(|node| node.has_tag("main"))
		.unwrap();
	assert!(main.ptr_eq(&main_after));
	assert!(main_after.to_html().contains("<p class=\"count\" data-count=\"41\">41</p>"));
}

#[tokio::test]
async fn test_fresh_mount_renders_into_container() {
	let (_host, _engine, cx) = browser(State::new());
	let container = Node::element("div");

	mount::<Shell>(&cx, &container, false).await.unwrap();

	assert_eq!(
		container.inner_html(),
		"<main><h1>Hello</h1><p class=\"count\" data-count=\"1\">1</p></main>"
	);
}

#[rstest]
#[case("")]
#[case("<main></main>")]
#[tokio::test]
async fn test_adoption_requires_root_markers(#[case] markup: &str) {
	let (_host, _engine, cx) = browser(State::new());
	let container = Node::element("div");
	container.replace_children(Node::parse_fragment(markup).children());

	let error = mount::<Shell>(&cx, &container, true).await.unwrap_err();

	assert!(matches!(
		error,
		PagesError::Hydration(HydrationError::MissingRootMarkers)
	));
}

#[tokio::test]
async fn test_adoption_rejects_missing_slot_regions() {
	let (_host, _engine, cx) = browser(State::new());
	let container = Node::element("div");
	let markup = concat!(
		"<!--\u{1}:root1--><main><h1><!--\u{1}:title1-->Hello<!--\u{1}:title1--></h1></main>",
		"<!--\u{1}:root1-->"
	);
	container.replace_children(Node::parse_fragment(markup).children());

	let error = mount::<Shell>(&cx, &container, true).await.unwrap_err();

	assert!(matches!(
		error,
		PagesError::Hydration(HydrationError::SlotMismatch {
			component: "Shell",
			expected: 2,
			found: 1,
		})
	));
}
