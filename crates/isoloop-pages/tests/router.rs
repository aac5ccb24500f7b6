//! Route matching on the server flavor and navigation in a headless browser.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use http::{Method, StatusCode};
use isoloop_pages::browser::{BrowserEnvironment, BrowserHost, MemoryHost, mount};
use isoloop_pages::dom::Node;
use isoloop_pages::event::Modifiers;
use isoloop_pages::prelude::*;
use isoloop_pages::router::{RouteMatch, RouterError};
use isoloop_pages::testing::StaticEnvironment;
use rstest::rstest;
use serde_json::Value;

static PAGE: Template = Template::new(&["<p class=\"page\">", "</p>"]);
static HOME: Template = Template::new(&[concat!(
	"<div class=\"home\">",
	"<a href=\"/users/7\"><span>profile</span></a>",
	"<a href=\"https://example.com/\">external</a>",
	"<form action=\"/search\"><input name=\"q\" value=\"abc\"></form>",
	"<form method=\"post\" action=\"/login\"><input name=\"user\" value=\"x\"></form>",
	"</div>"
)]);
static SHELL: Template = Template::new(&["<section>", "</section>"]);

fn param(this: &Handle<impl Component>, key: &str) -> String {
	this.props()
		.value("params")
		.and_then(|params| params.get(key))
		.and_then(Value::as_str)
		.unwrap_or_default()
		.to_string()
}

struct Home;

impl Component for Home {
	fn name() -> &'static str {
		"Home"
	}

	fn create(_props: &Props) -> Self {
		Home
	}

	fn render(this: &Handle<Self>) -> Result<Rendered> {
		this.html(&HOME, vec![])
	}
}

struct UserPage;

impl Component for UserPage {
	fn name() -> &'static str {
		"UserPage"
	}

	fn create(_props: &Props) -> Self {
		UserPage
	}

	fn render(this: &Handle<Self>) -> Result<Rendered> {
		let id = param(this, "id");
		this.html(&PAGE, vec![Interpolation::text(format!("user {id}"))])
	}
}

struct NewUserPage;

impl Component for NewUserPage {
	fn name() -> &'static str {
		"NewUserPage"
	}

	fn create(_props: &Props) -> Self {
		NewUserPage
	}

	fn render(this: &Handle<Self>) -> Result<Rendered> {
		this.html(&PAGE, vec!["new user form".into()])
	}
}

struct Missing;

impl Component for Missing {
	fn name() -> &'static str {
		"Missing"
	}

	fn create(_props: &Props) -> Self {
		Missing
	}

	fn render(this: &Handle<Self>) -> Result<Rendered> {
		this.html(&PAGE, vec!["not found".into()])
	}
}

struct SlowPage;

impl Component for SlowPage {
	fn name() -> &'static str {
		"SlowPage"
	}

	fn create(_props: &Props) -> Self {
		SlowPage
	}

	fn render(this: &Handle<Self>) -> Result<Rendered> {
		this.html(&PAGE, vec!["slow".into()])
	}
}

fn routes() -> RouterProps {
	RouterProps::new()
		.route("/", Content::of::<Home>())
		.route("/users/:id", Content::of::<UserPage>())
		.route("/users/new", Content::of::<NewUserPage>())
		.route(
			"/slow",
			Loader::deferred(|_matched: &RouteMatch| async {
				tokio::time::sleep(Duration::from_millis(20)).await;
				Ok(Some(Content::of::<SlowPage>()))
			}),
		)
		.not_found(Content::of::<Missing>())
}

async fn render_on_server(url: &str) -> (String, Rc<StaticEnvironment>) {
	let env = Rc::new(StaticEnvironment::new(Method::GET, url));
	let cx = RenderContext::new(env.clone(), Rc::new(MarkupEngine::new()));
	cx.run_initialization::<Router>(routes().into_props())
		.await
		.unwrap();
	let html = cx.render().unwrap().unwrap().to_html();
	cx.teardown();
	(html, env)
}

#[rstest]
#[case("/users/42", "user 42")]
#[case("/users/new", "user new")]
#[case("/users/42/", "user 42")]
#[case("/", "profile")]
#[tokio::test]
async fn test_first_matching_route_wins(#[case] url: &str, #[case] expected: &str) {
	let (html, env) = render_on_server(url).await;

	assert!(html.starts_with("<div class=\"isoloop-router\">"));
	assert!(html.contains(expected), "{html}");
	assert_eq!(env.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_unmatched_path_renders_not_found() {
	let (html, env) = render_on_server("/nowhere").await;

	assert!(html.contains("not found"));
	assert_eq!(env.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_deferred_route_is_awaited_before_render() {
	let (html, _) = render_on_server("/slow").await;

	assert!(html.contains("slow"));
}

struct App;

impl Component for App {
	fn name() -> &'static str {
		"App"
	}

	fn create(_props: &Props) -> Self {
		App
	}

	fn render(this: &Handle<Self>) -> Result<Rendered> {
		let router = Router::for_parent(&this.as_parent(), routes().into_props(), None)?;
		this.html(&SHELL, vec![router])
	}
}

struct Browser {
	host: Rc<MemoryHost>,
	cx: RenderContext,
	container: Node,
	app: Handle<App>,
}

impl Browser {
	async fn open(url: &str) -> Self {
		let host = Rc::new(MemoryHost::new(url).with_title("Isoloop"));
		let cx = BrowserEnvironment::context(host.clone(), Rc::new(DomEngine::new()));
		let container = Node::element("div");
		let app = mount::<App>(&cx, &container, false).await.unwrap();
		Self {
			host,
			cx,
			container,
			app,
		}
	}

	fn router(&self) -> Handle<Router> {
		Router::resolve(&self.app.as_parent(), Props::new(), None).unwrap()
	}

	fn find(&self, predicate: impl Fn(&Node) -> bool) -> Node {
		self.container
			.descendants()
			.into_iter()
			.find(|node| predicate(node))
			.unwrap()
	}

	fn html(&self) -> String {
		self.container.inner_html()
	}
}

#[tokio::test]
async fn test_link_click_navigates_without_page_load() {
	let browser = Browser::open("/").await;
	let label = browser.find(|node| node.has_tag("span"));

	let intercepted = browser.host.click(&label);
	browser.cx.settle().await;

	assert!(intercepted);
	assert_eq!(browser.host.history(), vec!["/", "/users/7"]);
	assert!(browser.host.assigned().is_empty());
	assert_eq!(browser.host.scroll_count(), 1);
	assert!(browser.html().contains("user 7"));
	assert_eq!(browser.host.title(), "Isoloop");
}

#[tokio::test]
async fn test_modified_click_is_left_to_the_browser() {
	let browser = Browser::open("/").await;
	let label = browser.find(|node| node.has_tag("span"));
	let modifiers = Modifiers {
		ctrl: true,
		..Modifiers::default()
	};

	let intercepted = browser
		.host
		.click_with(Event::click(label).with_modifiers(modifiers));
	browser.cx.settle().await;

	assert!(!intercepted);
	assert_eq!(browser.host.assigned(), vec!["/users/7"]);
	assert_eq!(browser.host.history(), vec!["/"]);
}

#[tokio::test]
async fn test_external_link_is_left_to_the_browser() {
	let browser = Browser::open("/").await;
	let external = browser.find(|node| node.attribute("href").as_deref() == Some("https://example.com/"));

	let intercepted = browser.host.click(&external);
	browser.cx.settle().await;

	assert!(!intercepted);
	assert_eq!(browser.host.assigned(), vec!["https://example.com/"]);
	assert_eq!(browser.host.history(), vec!["/"]);
}

#[tokio::test]
async fn test_get_form_becomes_navigation() {
	let browser = Browser::open("/").await;
	let form = browser.find(|node| node.attribute("action").as_deref() == Some("/search"));

	let intercepted = browser.host.submit(&form);
	browser.cx.settle().await;

	assert!(intercepted);
	assert_eq!(browser.host.history().last().map(String::as_str), Some("/search?q=abc"));
	assert!(browser.html().contains("not found"));
}

#[tokio::test]
async fn test_post_form_is_not_intercepted() {
	let browser = Browser::open("/").await;
	let form = browser.find(|node| node.attribute("action").as_deref() == Some("/login"));

	let intercepted = browser.host.submit(&form);
	browser.cx.settle().await;

	assert!(!intercepted);
	assert_eq!(browser.host.submitted(), vec!["/login"]);
	assert_eq!(browser.host.history(), vec!["/"]);
}

#[tokio::test]
async fn test_back_restores_previous_route() {
	let browser = Browser::open("/").await;
	Router::navigate_to(&browser.router(), "/users/3", NavigateOptions::default())
		.await
		.unwrap();
	assert!(browser.html().contains("user 3"));

	browser.host.back();
	browser.cx.settle().await;

	assert_eq!(browser.host.url(), "/");
	assert!(browser.html().contains("profile"));
}

#[rstest]
#[case(Redirect::temporary("/users/9"), vec!["/", "/users/9"])]
#[case(Redirect::permanent("/users/9"), vec!["/users/9"])]
#[tokio::test]
async fn test_redirect_signal_navigates(#[case] redirect: Redirect, #[case] history: Vec<&str>) {
	let browser = Browser::open("/").await;

	assert!(browser.cx.redirect(redirect));
	assert!(!browser.cx.redirect(Redirect::temporary("/users/10")));
	browser.cx.settle().await;

	assert_eq!(browser.host.history(), history);
	assert!(browser.html().contains("user 9"));
	assert!(!browser.cx.is_redirected());
}

#[tokio::test]
async fn test_superseded_navigation_is_discarded() {
	let browser = Browser::open("/").await;
	let router = browser.router();

	let slow = Router::navigate_to(&router, "/slow", NavigateOptions::default());
	let fast = Router::navigate_to(&router, "/users/1", NavigateOptions::default());
	let (slow, fast) = futures::join!(slow, fast);

	assert!(slow.is_ok() && fast.is_ok());
	assert_eq!(browser.host.url(), "/users/1");
	assert!(browser.html().contains("user 1"));
	assert!(!browser.html().contains("slow"));
}

#[tokio::test]
async fn test_navigation_hooks_and_page_title() {
	let seen = Rc::new(RefCell::new(Vec::new()));
	let host = Rc::new(MemoryHost::new("/"));
	let cx = BrowserEnvironment::context(host.clone(), Rc::new(DomEngine::new()));
	let (before, after) = (seen.clone(), seen.clone());
	let config = routes()
		.page_title(|state| format!("{} pages", state.len()))
		.before_navigate(move |navigation| before.borrow_mut().push(format!("before {}", navigation.to)))
		.after_navigate(move |navigation| after.borrow_mut().push(format!("after {}", navigation.from)));
	let router = cx.run_initialization::<Router>(config.into_props()).await.unwrap();
	cx.render().unwrap().unwrap();

	Router::navigate_to(&router, "/users/5", NavigateOptions::replace())
		.await
		.unwrap();

	assert_eq!(*seen.borrow(), ["before /users/5", "after /"]);
	assert_eq!(host.history(), vec!["/users/5"]);
	assert_eq!(host.title(), "0 pages");
	assert_eq!(host.history_state().page_title, "0 pages");
}

#[tokio::test]
async fn test_listeners_removed_on_teardown() {
	let browser = Browser::open("/").await;
	assert_eq!(browser.host.listener_count(), 4);

	browser.cx.teardown();

	assert_eq!(browser.host.listener_count(), 0);
}

#[tokio::test]
async fn test_server_flavor_cannot_navigate() {
	let env = Rc::new(StaticEnvironment::new(Method::GET, "/"));
	let cx = RenderContext::new(env, Rc::new(MarkupEngine::new()));
	let router = cx.run_initialization::<Router>(routes().into_props()).await.unwrap();

	let error = Router::navigate_to(&router, "/users/1", NavigateOptions::default())
		.await
		.unwrap_err();

	assert!(matches!(error, PagesError::Router(RouterError::NoBrowserHost)));
}

static LEAF: Template = Template::new(&["<p class=\"leaf\">", "</p><a href=\"/users/2\">next</a>"]);

struct Section;

impl Component for Section {
	fn name() -> &'static str {
		"Section"
	}

	fn create(_props: &Props) -> Self {
		Section
	}

	fn render(this: &Handle<Self>) -> Result<Rendered> {
		let inner = RouterProps::new()
			.route("/:id", Content::of::<Leaf>())
			.not_found(Content::of::<Missing>());
		let router = Router::for_parent(&this.as_parent(), inner.into_props(), None)?;
		this.html(&SHELL, vec![router])
	}
}

struct Leaf;

impl Component for Leaf {
	fn name() -> &'static str {
		"Leaf"
	}

	fn create(_props: &Props) -> Self {
		Leaf
	}

	fn render(this: &Handle<Self>) -> Result<Rendered> {
		let id = param(this, "id");
		this.html(&LEAF, vec![Interpolation::text(format!("leaf {id}"))])
	}
}

fn nested_routes() -> RouterProps {
	RouterProps::new()
		.route("/users/*", Content::of::<Section>())
		.not_found(Content::of::<Missing>())
}

struct NestedApp;

impl Component for NestedApp {
	fn name() -> &'static str {
		"NestedApp"
	}

	fn create(_props: &Props) -> Self {
		NestedApp
	}

	fn render(this: &Handle<Self>) -> Result<Rendered> {
		let router = Router::for_parent(&this.as_parent(), nested_routes().into_props(), None)?;
		this.html(&SHELL, vec![router])
	}
}

#[tokio::test]
async fn test_nested_router_matches_under_parent_prefix() {
	let env = Rc::new(StaticEnvironment::new(Method::GET, "/users/42"));
	let cx = RenderContext::new(env.clone(), Rc::new(MarkupEngine::new()));
	cx.run_initialization::<Router>(nested_routes().into_props())
		.await
		.unwrap();

	let html = cx.render().unwrap().unwrap().to_html();

	assert!(html.contains("leaf 42"), "{html}");
	assert!(!html.contains("not found"));
	assert_eq!(env.status(), StatusCode::OK);
	cx.teardown();
}

#[tokio::test]
async fn test_nested_router_navigates_between_children() {
	let host = Rc::new(MemoryHost::new("/users/1"));
	let cx = BrowserEnvironment::context(host.clone(), Rc::new(DomEngine::new()));
	let container = Node::element("div");
	mount::<NestedApp>(&cx, &container, false).await.unwrap();
	assert!(container.inner_html().contains("leaf 1"));
	assert_eq!(host.listener_count(), 8);

	let next = container
		.descendants()
		.into_iter()
		.find(|node| node.attribute("href").as_deref() == Some("/users/2"))
		.unwrap();
	assert!(host.click(&next));
	cx.settle().await;

	let html = container.inner_html();
	assert!(html.contains("leaf 2"), "{html}");
	assert!(!html.contains("leaf 1"));
	assert!(!html.contains("not found"));
	assert_eq!(host.history(), vec!["/users/1", "/users/2"]);
	assert_eq!(host.listener_count(), 8);
}
