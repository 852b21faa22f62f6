use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use heading_harvest::dom::NodeId;
use heading_harvest::overlay::{ClickCallback, ClickOutcome, LocalBoxFuture};
use heading_harvest::page::InsertPosition;
use heading_harvest::{
    ControlState, HeadingSection, InMemorySectionRepository, LifecycleState, Options, Orchestrator, OverlayManager, Page,
    PageMonitor, PassOutcome, SectionRepository,
};
use tokio::task::LocalSet;
use tokio::time::sleep;

const URL: &str = "https://deepwiki.com/owner/repo/1-overview";

const OVERVIEW: &str = r#"<html><head><title>Overview</title></head><body>
    <nav><h2>Menu</h2><a href="/owner/repo/2-setup">Setup</a></nav>
    <main>
      <h1>Overview</h1><p>What the repository does.</p>
      <h2>Architecture</h2><p>How the pieces fit together.</p>
      <h2>Contents</h2><ul><li>Architecture</li></ul>
    </main>
</body></html>"#;

const SETUP_CONTENT: &str = r#"
      <h1>Setup</h1><p>Getting a working checkout.</p>
      <h2>Requirements</h2><p>A recent toolchain.</p>
      <h3>Optional tools</h3><p>Linters and formatters.</p>
      <h2>Building</h2><pre><code>make</code></pre>"#;

fn main_id(page: &Page) -> NodeId {
    page.document().select("main").nodes()[0].id
}

#[tokio::test(start_paused = true)]
async fn spa_navigation_refreshes_controls() {
    LocalSet::new()
        .run_until(async {
            let page = Rc::new(Page::new(OVERVIEW, URL).unwrap());
            let repo = Rc::new(InMemorySectionRepository::new());
            let orch = Orchestrator::new(Rc::clone(&page), repo.clone(), Options::default());

            let outcome = orch.start().await;
            assert_eq!(outcome, PassOutcome::Completed { sections: 2, mounted: 2 });
            assert!(orch.monitor().is_monitoring());

            // Client-side navigation: URL changes, then the new page streams in.
            page.push_state("/owner/repo/2-setup").unwrap();
            page.set_inner_html(main_id(&page), SETUP_CONTENT);
            sleep(Duration::from_secs(3)).await;

            assert_eq!(orch.state(), LifecycleState::Ready);
            let titles: Vec<String> = orch.sections().iter().map(|s| s.title_text().to_string()).collect();
            assert_eq!(titles, vec!["Setup", "Requirements", "Optional tools", "Building"]);
            assert_eq!(orch.overlay().dom_button_count(), 4);
            assert!(orch
                .sections()
                .iter()
                .all(|s| s.source_url() == "https://deepwiki.com/owner/repo/2-setup"));

            orch.stop();
            assert!(!orch.monitor().is_monitoring());
            assert_eq!(orch.overlay().dom_button_count(), 0);
            assert_eq!(page.history_hook_count(), 0);
            assert_eq!(page.popstate_listener_count(), 0);
            assert_eq!(page.observer_count(), 0);
        })
        .await;
}

#[tokio::test(start_paused = true)]
async fn streamed_headings_are_picked_up() {
    LocalSet::new()
        .run_until(async {
            let page = Rc::new(Page::new("<html><body><main><p>Loading...</p></main></body></html>", URL).unwrap());
            let repo = Rc::new(InMemorySectionRepository::new());
            let orch = Orchestrator::new(Rc::clone(&page), repo, Options::default());

            let started = {
                let orch = Rc::clone(&orch);
                tokio::task::spawn_local(async move { orch.start().await })
            };
            sleep(Duration::from_millis(500)).await;

            let main = main_id(&page);
            page.set_inner_html(main, "<h1>Overview</h1><p>What the repository does.</p>");
            sleep(Duration::from_millis(100)).await;
            page.insert_adjacent_html(
                main,
                InsertPosition::BeforeEnd,
                "<h2>Usage</h2><p>Run the binary with a config file.</p>",
            );

            let outcome = started.await.unwrap();
            assert!(matches!(outcome, PassOutcome::Completed { .. }));
            sleep(Duration::from_secs(2)).await;

            assert_eq!(orch.sections().len(), 2);
            assert_eq!(orch.overlay().dom_button_count(), 2);
            orch.stop();
        })
        .await;
}

#[tokio::test(start_paused = true)]
async fn click_feedback_reverts_to_default() {
    let page = Rc::new(Page::new(OVERVIEW, URL).unwrap());
    let repo = Rc::new(InMemorySectionRepository::new());
    let orch = Orchestrator::new(Rc::clone(&page), repo.clone(), Options::default());
    orch.initialize().await;

    let overlay = orch.overlay();
    let id = overlay.button_ids()[0].clone();
    assert_eq!(overlay.click(&id).await.unwrap(), ClickOutcome::Collected);
    assert_eq!(overlay.button_state(&id), Some(ControlState::Default));

    let stored = repo.get_all_sections().await.unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].title_text(), "Overview");
}

#[test]
fn overlay_insert_is_idempotent() {
    let page = Rc::new(Page::new(OVERVIEW, URL).unwrap());
    let extraction = heading_harvest::extract_sections(OVERVIEW, URL).unwrap();
    let overlay = OverlayManager::new(Rc::clone(&page), &Options::default());
    let on_click: ClickCallback =
        Rc::new(|_: HeadingSection| -> LocalBoxFuture<heading_harvest::Result<()>> { Box::pin(async { Ok(()) }) });

    for _ in 0..3 {
        let report = overlay.insert_buttons(main_id(&page), &extraction.sections, Rc::clone(&on_click));
        assert_eq!(report.mounted, 2);
    }
    assert_eq!(overlay.dom_button_count(), 2);
    assert_eq!(overlay.remove_all_buttons(), 2);
    assert_eq!(overlay.dom_button_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn monitor_reports_each_url_once() {
    LocalSet::new()
        .run_until(async {
            let page = Rc::new(Page::new(OVERVIEW, URL).unwrap());
            let monitor = PageMonitor::new(Rc::clone(&page), &Options::default());
            let seen = Rc::new(RefCell::new(Vec::new()));
            let sink = Rc::clone(&seen);
            monitor.start_monitoring(
                Rc::new(move |url: url::Url| -> heading_harvest::Result<()> {
                    sink.borrow_mut().push(url.path().to_string());
                    Ok(())
                }),
                Rc::new(|_: NodeId| -> heading_harvest::Result<()> { Ok(()) }),
            );

            page.push_state("/owner/repo/2-setup").unwrap();
            page.replace_state("/owner/repo/2-setup").unwrap();
            sleep(Duration::from_millis(300)).await;
            assert!(page.back());
            sleep(Duration::from_millis(300)).await;

            assert_eq!(*seen.borrow(), vec!["/owner/repo/2-setup", "/owner/repo/1-overview"]);
            monitor.stop_monitoring();
        })
        .await;
}

#[tokio::test(start_paused = true)]
async fn bounded_wait_gives_up() {
    let page = Rc::new(Page::new("<main><p>empty</p></main>", URL).unwrap());
    let monitor = PageMonitor::new(Rc::clone(&page), &Options::default());

    let found = monitor
        .wait_for_element(page.body(), "h1, h2", Duration::from_secs(2))
        .await;
    assert!(!found);
    assert_eq!(page.observer_count(), 0);
}
