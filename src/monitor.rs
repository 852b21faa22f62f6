//! Page-change monitor.
//!
//! Follows client-side navigation (history hooks plus back/forward) and
//! streamed content (debounced subtree mutations on `<body>`), and offers
//! the two bounded waits the orchestrator uses to survive asynchronous
//! rendering.
//!
//! Background tasks are spawned with `tokio::task::spawn_local`, so
//! `start_monitoring` must run inside a `LocalSet`.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use std::time::Duration;

use dom_query::{Document, NodeId, Selection};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout, Instant};
use url::Url;

use crate::dom;
use crate::error::Result;
use crate::options::{Options, StabilityConfig};
use crate::page::{HandleId, MutationRecord, Page};
use crate::selector::{self, container};

/// Called with the new URL after a navigation.
pub type NavigateCallback = Rc<dyn Fn(Url) -> Result<()>>;

/// Called with the most relevant added node of a significant batch.
pub type ContentChangeCallback = Rc<dyn Fn(NodeId) -> Result<()>>;

/// Headings plus markdown-like blocks a subtree needs to be significant.
const MIN_SIGNIFICANT_BLOCKS: usize = 2;

struct Running {
    history_hook: HandleId,
    popstate_listener: HandleId,
    body_observer: HandleId,
    tasks: Vec<JoinHandle<()>>,
}

/// Watches one page for navigation and content changes.
pub struct PageMonitor {
    page: Rc<Page>,
    settle_delay: Duration,
    debounce: Duration,
    last_url: Rc<RefCell<Url>>,
    running: RefCell<Option<Running>>,
}

impl fmt::Debug for PageMonitor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PageMonitor")
            .field("last_url", &self.last_url.borrow().as_str())
            .field("monitoring", &self.is_monitoring())
            .finish_non_exhaustive()
    }
}

impl PageMonitor {
    /// Monitor for `page` with timings from `options`.
    #[must_use]
    pub fn new(page: Rc<Page>, options: &Options) -> Self {
        let last_url = Rc::new(RefCell::new(page.url()));
        Self {
            page,
            settle_delay: options.navigation_settle_delay,
            debounce: options.mutation_debounce,
            last_url,
            running: RefCell::new(None),
        }
    }

    /// Start watching. Restarts cleanly if already running.
    pub fn start_monitoring(
        &self,
        on_navigate: NavigateCallback,
        on_content_change: ContentChangeCallback,
    ) {
        self.stop_monitoring();
        *self.last_url.borrow_mut() = self.page.url();

        let (nav_tx, nav_rx) = mpsc::unbounded_channel::<()>();
        let hook_tx = nav_tx.clone();
        let history_hook = self.page.install_history_hook(Rc::new(move |_, _| {
            let _ = hook_tx.send(());
        }));
        let popstate_listener = self.page.add_popstate_listener(Rc::new(move |_| {
            let _ = nav_tx.send(());
        }));

        let observer = self.page.observe(self.page.body());
        let body_observer = observer.id();

        let nav_task = tokio::task::spawn_local(navigation_loop(
            Rc::clone(&self.page),
            Rc::clone(&self.last_url),
            nav_rx,
            self.settle_delay,
            on_navigate,
        ));
        let content_task = tokio::task::spawn_local(content_loop(
            Rc::clone(&self.page),
            observer,
            self.debounce,
            on_content_change,
        ));

        *self.running.borrow_mut() = Some(Running {
            history_hook,
            popstate_listener,
            body_observer,
            tasks: vec![nav_task, content_task],
        });
        log::debug!("monitoring {}", self.page.url());
    }

    /// Stop watching: hooks and listener removed, observer disconnected,
    /// tasks aborted. Safe to call at any time, any number of times.
    pub fn stop_monitoring(&self) {
        let Some(running) = self.running.borrow_mut().take() else {
            return;
        };
        self.page.uninstall_history_hook(running.history_hook);
        self.page.remove_popstate_listener(running.popstate_listener);
        self.page.disconnect_observer(running.body_observer);
        for task in running.tasks {
            task.abort();
        }
        log::debug!("monitoring stopped");
    }

    /// Whether the monitor is running.
    #[must_use]
    pub fn is_monitoring(&self) -> bool {
        self.running.borrow().is_some()
    }

    /// Last URL a navigation check observed.
    #[must_use]
    pub fn last_url(&self) -> Url {
        self.last_url.borrow().clone()
    }

    /// Resolve `true` once `selector` matches inside `container`, or
    /// `false` after `limit`. The temporary observer is disconnected on
    /// every path.
    pub async fn wait_for_element(&self, container: NodeId, selector: &str, limit: Duration) -> bool {
        let doc = self.page.document();
        if dom::node(doc, container).is_none() {
            return false;
        }
        if has_match(doc, container, selector) {
            return true;
        }

        let mut observer = self.page.observe(container);
        let found = timeout(limit, async {
            while observer.recv().await.is_some() {
                if has_match(doc, container, selector) {
                    return true;
                }
            }
            false
        })
        .await
        .unwrap_or(false);
        observer.disconnect();

        if !found {
            log::debug!("gave up waiting for {selector:?} after {limit:?}");
        }
        found
    }

    /// Poll the heading count of `container` until it holds still for
    /// `required_stable_checks` consecutive polls. Returns `false` when
    /// `max_wait` runs out first; callers proceed either way.
    pub async fn wait_for_stable_headings(&self, container: NodeId, config: StabilityConfig) -> bool {
        let started = Instant::now();
        let mut last = self.heading_count(container);
        let mut stable = 0;

        while stable < config.required_stable_checks {
            if started.elapsed() + config.interval > config.max_wait {
                log::debug!("heading count still changing after {:?}", config.max_wait);
                return false;
            }
            sleep(config.interval).await;
            let count = self.heading_count(container);
            if count == last {
                stable += 1;
            } else {
                last = count;
                stable = 0;
            }
        }
        true
    }

    fn heading_count(&self, container: NodeId) -> usize {
        dom::node(self.page.document(), container)
            .map_or(0, |n| dom::count_headings(&Selection::from(n)))
    }
}

impl Drop for PageMonitor {
    fn drop(&mut self) {
        self.stop_monitoring();
    }
}

fn has_match(doc: &Document, container: NodeId, selector: &str) -> bool {
    dom::node(doc, container).is_some_and(|n| dom::try_query(&Selection::from(n), selector).is_some())
}

async fn navigation_loop(
    page: Rc<Page>,
    last_url: Rc<RefCell<Url>>,
    mut rx: mpsc::UnboundedReceiver<()>,
    settle_delay: Duration,
    on_navigate: NavigateCallback,
) {
    while rx.recv().await.is_some() {
        sleep(settle_delay).await;
        while rx.try_recv().is_ok() {}

        let current = page.url();
        if *last_url.borrow() == current {
            continue;
        }
        *last_url.borrow_mut() = current.clone();
        log::info!("navigation to {current}");
        if let Err(err) = on_navigate(current) {
            log::warn!("navigation handler failed: {err}");
        }
    }
}

async fn content_loop(
    page: Rc<Page>,
    mut observer: crate::page::MutationObserver,
    debounce: Duration,
    on_content_change: ContentChangeCallback,
) {
    while let Some(first) = observer.recv().await {
        let mut batch = vec![first];
        while let Ok(Some(record)) = timeout(debounce, observer.recv()).await {
            batch.push(record);
        }

        let Some(node) = significant_node(page.document(), &batch) else {
            continue;
        };
        log::debug!("significant content change in a batch of {} records", batch.len());
        if let Err(err) = on_content_change(node) {
            log::warn!("content change handler failed: {err}");
        }
    }
}

/// The most relevant added node of a batch, if the batch is significant.
///
/// An added element counts when it is a heading, carries a content
/// container class, or holds at least two headings or markdown-like
/// blocks. Control nodes never count. Among significant nodes the one
/// holding the most headings wins; ties go to the first.
#[must_use]
pub fn significant_node(doc: &Document, batch: &[MutationRecord]) -> Option<NodeId> {
    let mut best: Option<(NodeId, usize)> = None;

    for id in batch.iter().flat_map(|r| r.added.iter()) {
        let Some(node) = dom::node(doc, *id) else {
            continue;
        };
        if !node.is_element() || !dom::is_attached(doc, &node) || inside_control(&node) {
            continue;
        }
        let sel = Selection::from(node);
        let is_heading = dom::heading_level(&node).is_some();
        let headings = dom::count_headings(&sel) + usize::from(is_heading);
        let blocks = dom::count_headings(&sel) + selector::query_all(&sel, container::is_markdown_block).len();

        let significant = is_heading
            || selector::matches_self_or_descendant(&sel, container::is_content_container)
            || blocks >= MIN_SIGNIFICANT_BLOCKS;
        if significant && best.is_none_or(|(_, most)| headings > most) {
            best = Some((*id, headings));
        }
    }

    best.map(|(id, _)| id)
}

fn inside_control(node: &dom_query::NodeRef) -> bool {
    let mut current = Some(*node);
    while let Some(n) = current {
        if dom::is_control(&n) {
            return true;
        }
        current = n.parent();
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::page::InsertPosition;
    use std::cell::Cell;
    use tokio::task::LocalSet;

    const URL: &str = "https://example.com/owner/repo";

    fn page(html: &str) -> Rc<Page> {
        Rc::new(Page::new(html, URL).unwrap())
    }

    fn record(target: NodeId, added: Vec<NodeId>) -> MutationRecord {
        MutationRecord {
            target,
            added,
            removed: Vec::new(),
        }
    }

    #[test]
    fn test_significance_rules() {
        let p = page(
            r#"<div id="root">
                <p id="plain">text</p>
                <h2 id="h">Heading</h2>
                <div id="prose" class="prose">x</div>
                <div id="blocks"><pre>a</pre><table></table></div>
                <div id="one"><pre>a</pre></div>
                <button id="ctl" class="hsc-collect-btn">+</button>
            </div>"#,
        );
        let doc = p.document();
        let id = |sel: &str| doc.select(sel).nodes()[0].id;
        let root = id("#root");

        assert_eq!(significant_node(doc, &[record(root, vec![id("#plain")])]), None);
        assert_eq!(significant_node(doc, &[record(root, vec![id("#one")])]), None);
        assert_eq!(significant_node(doc, &[record(root, vec![id("#ctl")])]), None);
        assert_eq!(significant_node(doc, &[record(root, vec![id("#h")])]), Some(id("#h")));
        assert_eq!(significant_node(doc, &[record(root, vec![id("#prose")])]), Some(id("#prose")));
        assert_eq!(significant_node(doc, &[record(root, vec![id("#blocks")])]), Some(id("#blocks")));
    }

    #[test]
    fn test_most_headings_wins() {
        let p = page(r#"<div id="a"><h2>1</h2></div><div id="b"><h2>1</h2><h3>2</h3></div>"#);
        let doc = p.document();
        let a = doc.select("#a").nodes()[0].id;
        let b = doc.select("#b").nodes()[0].id;

        let batch = [record(p.body(), vec![a]), record(p.body(), vec![b])];
        assert_eq!(significant_node(doc, &batch), Some(b));
    }

    #[tokio::test(start_paused = true)]
    async fn test_navigation_fires_once_per_url_change() {
        LocalSet::new()
            .run_until(async {
                let p = page("<main></main>");
                let monitor = PageMonitor::new(Rc::clone(&p), &Options::default());
                let urls = Rc::new(RefCell::new(Vec::new()));
                let sink = Rc::clone(&urls);
                monitor.start_monitoring(
                    Rc::new(move |url: Url| {
                        sink.borrow_mut().push(url.path().to_string());
                        Ok(())
                    }),
                    Rc::new(|_| Ok(())),
                );

                p.replace_state(URL).unwrap();
                sleep(Duration::from_millis(500)).await;
                assert!(urls.borrow().is_empty());

                p.push_state("/owner/repo/2-setup").unwrap();
                p.push_state("/owner/repo/2-setup").unwrap();
                sleep(Duration::from_millis(500)).await;
                assert_eq!(*urls.borrow(), vec!["/owner/repo/2-setup"]);

                p.back();
                p.back();
                sleep(Duration::from_millis(500)).await;
                assert_eq!(*urls.borrow(), vec!["/owner/repo/2-setup", "/owner/repo"]);

                monitor.stop_monitoring();
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_content_change_is_debounced() {
        LocalSet::new()
            .run_until(async {
                let p = page(r#"<main id="m"></main>"#);
                let main = p.document().select("#m").nodes()[0].id;
                let monitor = PageMonitor::new(Rc::clone(&p), &Options::default());
                let hits = Rc::new(Cell::new(0));
                let sink = Rc::clone(&hits);
                monitor.start_monitoring(
                    Rc::new(|_| Ok(())),
                    Rc::new(move |_| {
                        sink.set(sink.get() + 1);
                        Ok(())
                    }),
                );
                tokio::task::yield_now().await;

                for i in 0..5 {
                    p.insert_adjacent_html(main, InsertPosition::BeforeEnd, &format!("<h2>Part {i}</h2>"));
                    sleep(Duration::from_millis(50)).await;
                }
                sleep(Duration::from_millis(400)).await;
                assert_eq!(hits.get(), 1);

                p.insert_adjacent_html(main, InsertPosition::BeforeEnd, "<p>just text</p>");
                sleep(Duration::from_millis(400)).await;
                assert_eq!(hits.get(), 1);
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_failing_callbacks_do_not_stop_monitoring() {
        LocalSet::new()
            .run_until(async {
                let p = page(r#"<main id="m"></main>"#);
                let main = p.document().select("#m").nodes()[0].id;
                let monitor = PageMonitor::new(Rc::clone(&p), &Options::default());
                let navigations = Rc::new(Cell::new(0));
                let changes = Rc::new(Cell::new(0));
                let nav_sink = Rc::clone(&navigations);
                let change_sink = Rc::clone(&changes);
                monitor.start_monitoring(
                    Rc::new(move |_: Url| -> Result<()> {
                        nav_sink.set(nav_sink.get() + 1);
                        Err(Error::Callback("navigation handler broke".to_string()))
                    }),
                    Rc::new(move |_: NodeId| -> Result<()> {
                        change_sink.set(change_sink.get() + 1);
                        Err(Error::Repository("storage offline".to_string()))
                    }),
                );
                tokio::task::yield_now().await;

                p.push_state("/owner/repo/2-setup").unwrap();
                sleep(Duration::from_millis(300)).await;
                p.push_state("/owner/repo/3-usage").unwrap();
                sleep(Duration::from_millis(300)).await;
                assert_eq!(navigations.get(), 2);

                p.insert_adjacent_html(main, InsertPosition::BeforeEnd, "<h2>First</h2>");
                sleep(Duration::from_millis(400)).await;
                p.insert_adjacent_html(main, InsertPosition::BeforeEnd, "<h2>Second</h2>");
                sleep(Duration::from_millis(400)).await;
                assert_eq!(changes.get(), 2);

                assert!(monitor.is_monitoring());
                monitor.stop_monitoring();
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_removes_everything() {
        LocalSet::new()
            .run_until(async {
                let p = page("<main></main>");
                let monitor = PageMonitor::new(Rc::clone(&p), &Options::default());
                monitor.stop_monitoring();

                monitor.start_monitoring(Rc::new(|_| Ok(())), Rc::new(|_| Ok(())));
                monitor.start_monitoring(Rc::new(|_| Ok(())), Rc::new(|_| Ok(())));
                assert!(monitor.is_monitoring());
                assert_eq!(p.history_hook_count(), 1);
                assert_eq!(p.popstate_listener_count(), 1);
                assert_eq!(p.observer_count(), 1);

                monitor.stop_monitoring();
                monitor.stop_monitoring();
                assert!(!monitor.is_monitoring());
                assert_eq!(p.history_hook_count(), 0);
                assert_eq!(p.popstate_listener_count(), 0);
                assert_eq!(p.observer_count(), 0);
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_element_times_out_without_leaking() {
        let p = page(r#"<main id="m"><p>loading</p></main>"#);
        let main = p.document().select("#m").nodes()[0].id;
        let monitor = PageMonitor::new(Rc::clone(&p), &Options::default());

        let started = Instant::now();
        let found = monitor.wait_for_element(main, "h1, h2", Duration::from_secs(2)).await;
        assert!(!found);
        assert!(started.elapsed() >= Duration::from_secs(2));
        assert!(started.elapsed() < Duration::from_millis(2100));
        assert_eq!(p.observer_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_element_resolves_on_insert() {
        LocalSet::new()
            .run_until(async {
                let p = page(r#"<main id="m"></main>"#);
                let main = p.document().select("#m").nodes()[0].id;
                let monitor = PageMonitor::new(Rc::clone(&p), &Options::default());

                let writer = Rc::clone(&p);
                tokio::task::spawn_local(async move {
                    sleep(Duration::from_millis(300)).await;
                    writer.insert_adjacent_html(main, InsertPosition::BeforeEnd, "<h2>Ready</h2>");
                });

                let started = Instant::now();
                assert!(monitor.wait_for_element(main, "h2", Duration::from_secs(10)).await);
                assert!(started.elapsed() < Duration::from_secs(1));
                assert_eq!(p.observer_count(), 0);

                assert!(monitor.wait_for_element(main, "h2", Duration::from_secs(10)).await);
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_stable_headings() {
        let p = page(r#"<main id="m"><h2>A</h2></main>"#);
        let main = p.document().select("#m").nodes()[0].id;
        let monitor = PageMonitor::new(Rc::clone(&p), &Options::default());

        let started = Instant::now();
        assert!(monitor.wait_for_stable_headings(main, StabilityConfig::default()).await);
        assert!(started.elapsed() >= Duration::from_millis(600));
        assert!(started.elapsed() < Duration::from_millis(700));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unstable_headings_give_up_at_max_wait() {
        LocalSet::new()
            .run_until(async {
                let p = page(r#"<main id="m"></main>"#);
                let main = p.document().select("#m").nodes()[0].id;
                let monitor = PageMonitor::new(Rc::clone(&p), &Options::default());

                let writer = Rc::clone(&p);
                let streamer = tokio::task::spawn_local(async move {
                    for i in 0.. {
                        writer.insert_adjacent_html(main, InsertPosition::BeforeEnd, &format!("<h3>{i}</h3>"));
                        sleep(Duration::from_millis(150)).await;
                    }
                });

                let config = StabilityConfig::default();
                let started = Instant::now();
                assert!(!monitor.wait_for_stable_headings(main, config).await);
                assert!(started.elapsed() <= config.max_wait);
                streamer.abort();
            })
            .await;
    }
}
