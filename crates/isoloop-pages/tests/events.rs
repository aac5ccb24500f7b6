//! Event dispatch and steady-state hooks on the browser flavor.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use futures::FutureExt;
use futures::future;
use isoloop_pages::browser::{BrowserEnvironment, MemoryHost, mount};
use isoloop_pages::dom::Node;
use isoloop_pages::prelude::*;
use rstest::rstest;
use serde_json::{Value, json};

type PropChange = (Option<Value>, Option<Value>);

thread_local! {
	static FRAME_RENDERS: Cell<usize> = const { Cell::new(0) };
	static STEPS: RefCell<Vec<PropChange>> = const { RefCell::new(Vec::new()) };
}

static FRAME: Template = Template::new(&["<div class=\"frame\">", "", "</div>"]);
static TALLY: Template = Template::new(&["<p class=\"tally\">", "</p>"]);
static TICKER: Template = Template::new(&["<p class=\"ticker\">", "</p>"]);

fn state(value: Value) -> State {
	value.as_object().cloned().unwrap_or_default()
}

fn count(cx: &RenderContext, key: &str) -> i64 {
	cx.state().get(key).and_then(Value::as_i64).unwrap_or(0)
}

struct Tally;

impl Component for Tally {
	fn name() -> &'static str {
		"Tally"
	}

	fn create(_props: &Props) -> Self {
		Tally
	}

	fn default_state(_props: &Props) -> Option<State> {
		Some(state(json!({ "clicks": 0 })))
	}

	fn onevent(this: &Handle<Self>, event: &Event) -> Option<HookFuture> {
		if *event.kind() != EventKind::Click {
			return None;
		}
		let clicks = count(this.context(), "clicks") + 1;
		Some(future::ready(Ok(Some(state(json!({ "clicks": clicks }))))).boxed_local())
	}

	fn onrender(_this: &Handle<Self>, previous: &Props, next: &Props) {
		let change = (previous.value("step").cloned(), next.value("step").cloned());
		STEPS.with(|steps| steps.borrow_mut().push(change));
	}

	fn render(this: &Handle<Self>) -> Result<Rendered> {
		let clicks = count(this.context(), "clicks");
		this.html(&TALLY, vec![Interpolation::text(clicks)])
	}
}

struct Ticker;

impl Component for Ticker {
	fn name() -> &'static str {
		"Ticker"
	}

	fn create(_props: &Props) -> Self {
		Ticker
	}

	fn oninit(this: &Handle<Self>) -> Option<HookFuture> {
		let ticks = count(this.context(), "ticks") + 1;
		Some(future::ready(Ok(Some(state(json!({ "ticks": ticks }))))).boxed_local())
	}

	fn render(this: &Handle<Self>) -> Result<Rendered> {
		let ticks = count(this.context(), "ticks");
		this.html(&TICKER, vec![Interpolation::text(format!("ticks {ticks}"))])
	}
}

struct Frame;

impl Component for Frame {
	fn name() -> &'static str {
		"Frame"
	}

	fn create(_props: &Props) -> Self {
		Frame
	}

	fn render(this: &Handle<Self>) -> Result<Rendered> {
		if !this.context().is_initializing() {
			FRAME_RENDERS.with(|renders| renders.set(renders.get() + 1));
		}
		let parent = this.as_parent();
		let step = this.state().get("step").cloned().unwrap_or(json!(0));
		let tally = Tally::for_parent(&parent, Props::new().with("step", step), None)?;
		let ticking = this.state().get("ticker").and_then(Value::as_bool).unwrap_or(false);
		let ticker = if ticking {
			Ticker::for_parent(&parent, Props::new(), None)?
		} else {
			Interpolation::Empty
		};
		this.html(&FRAME, vec![tally, ticker])
	}
}

fn frame_renders() -> usize {
	FRAME_RENDERS.with(Cell::get)
}

struct Page {
	cx: RenderContext,
	engine: Rc<DomEngine>,
	container: Node,
	frame: Handle<Frame>,
}

impl Page {
	async fn open() -> Self {
		let host = Rc::new(MemoryHost::new("/"));
		let engine = Rc::new(DomEngine::new());
		let cx = BrowserEnvironment::context(host, engine.clone());
		let container = Node::element("div");
		let frame = mount::<Frame>(&cx, &container, false).await.unwrap();
		Self {
			cx,
			engine,
			container,
			frame,
		}
	}

	fn tally(&self) -> Handle<Tally> {
		Tally::resolve(&self.frame.as_parent(), Props::new(), None).unwrap()
	}

	fn find(&self, class: &str) -> Option<Node> {
		self.container
			.descendants()
			.into_iter()
			.find(|node| node.attribute("class").as_deref() == Some(class))
	}
}

#[tokio::test]
async fn test_handled_event_merges_state_and_renders_root() {
	let page = Page::open().await;
	let target = page.find("tally").unwrap();
	let before = frame_renders();

	let event = Event::click(target.clone());
	page.tally().handle_event(&event).await.unwrap();

	assert_eq!(count(&page.cx, "clicks"), 1);
	assert_eq!(frame_renders(), before + 1);
	assert!(event.is_propagation_stopped());
	assert_eq!(target.text_content(), "1");
}

#[rstest]
#[case("keydown")]
#[case("scroll")]
#[tokio::test]
async fn test_unhandled_event_resolves_without_render(#[case] kind: &str) {
	let page = Page::open().await;
	let before = frame_renders();
	let patches = page.engine.patch_count();

	let event = Event::new(kind);
	page.tally().handle_event(&event).await.unwrap();

	assert_eq!(frame_renders(), before);
	assert_eq!(page.engine.patch_count(), patches);
	assert!(!event.is_propagation_stopped());
	assert_eq!(count(&page.cx, "clicks"), 0);
}

#[tokio::test]
async fn test_default_state_is_seeded_without_render() {
	let host = Rc::new(MemoryHost::new("/"));
	let engine = Rc::new(DomEngine::new());
	let cx = BrowserEnvironment::context(host, engine.clone());

	Tally::resolve(&Parent::detached(&cx), Props::new(), None).unwrap();

	assert_eq!(cx.state().get("clicks"), Some(&json!(0)));
	assert_eq!(engine.patch_count(), 0);
	assert_eq!(cx.pending_tasks(), 0);
}

#[tokio::test]
async fn test_onrender_receives_previous_and_next_props() {
	let page = Page::open().await;
	STEPS.with(|steps| steps.borrow_mut().clear());

	page.frame.set_state(state(json!({ "step": 1 })));

	let seen = STEPS.with(|steps| steps.borrow().clone());
	assert_eq!(seen, vec![(Some(json!(0)), Some(json!(1)))]);
}

#[tokio::test]
async fn test_steady_state_oninit_merges_then_renders_once() {
	let page = Page::open().await;
	page.frame.set_state(state(json!({ "ticker": true })));
	assert_eq!(page.cx.pending_tasks(), 1);
	assert_eq!(page.find("ticker").unwrap().text_content(), "ticks 0");
	let before = frame_renders();

	page.cx.settle().await;

	assert_eq!(count(&page.cx, "ticks"), 1);
	assert_eq!(frame_renders(), before + 1);
	assert_eq!(page.find("ticker").unwrap().text_content(), "ticks 1");
}
