//! Page orchestrator.
//!
//! Drives the extraction pipeline for one page:
//!
//! ```text
//! scope check -> locate -> wait for a heading -> wait for stable headings
//!             -> re-locate -> extract -> validate -> overlay refresh
//! ```
//!
//! A pass is re-entrancy guarded: a call made while a pass is in flight is
//! dropped. Navigation and significant content changes mark the
//! orchestrator pending and wake a trigger task that debounces, waits for
//! any in-flight pass, and then runs a single pass for everything that
//! piled up.

use std::cell::{Cell, RefCell};
use std::collections::HashSet;
use std::fmt;
use std::rc::{Rc, Weak};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};

use crate::dom;
use crate::error::{Error, ErrorCode, Result};
use crate::extractor::HeadingExtractor;
use crate::locator::ContainerLocator;
use crate::monitor::PageMonitor;
use crate::options::Options;
use crate::overlay::{ClickCallback, OverlayManager};
use crate::page::Page;
use crate::patterns::HEADING_SELECTOR;
use crate::repository::SectionRepository;
use crate::section::HeadingSection;
use crate::url_utils::PageScope;
use crate::validator::SectionValidator;

/// Where the orchestrator is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleState {
    /// No usable sections mounted.
    #[default]
    Idle,
    /// A pass is in flight.
    Initializing,
    /// Sections extracted and controls mounted.
    Ready,
}

/// How a pass ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PassOutcome {
    /// Another pass was already in flight.
    Skipped,
    /// The page is outside the configured scope.
    OutOfScope,
    /// No heading appeared within the wait.
    NoHeadings,
    /// Pass finished.
    Completed {
        /// Sections kept after validation.
        sections: usize,
        /// Controls mounted.
        mounted: usize,
    },
    /// The pass hit an error; the page was left as it was.
    Failed(Error),
}

/// What happened to one collected section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CollectStatus {
    /// Written to the repository.
    Added,
    /// An equivalent section was already stored; nothing written.
    Duplicate,
}

/// Summary of a bulk collection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectReport {
    /// Sections written.
    pub added: usize,
    /// Sections already stored.
    pub duplicates: usize,
    /// Titles that failed to store.
    pub failed: Vec<String>,
}

/// Snapshot for the host UI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageInfo {
    /// Current location.
    pub url: String,
    /// Document title.
    pub title: String,
    /// Location hostname.
    pub hostname: String,
    /// Whether the page is in scope.
    pub in_scope: bool,
    /// Lifecycle state.
    pub state: LifecycleState,
    /// Sections from the last pass.
    pub section_count: usize,
    /// Mounted controls.
    pub button_count: usize,
    /// Sections collected on this page since the last navigation.
    pub collected_count: usize,
}

/// Runs extraction passes for one page and keeps the overlay in sync.
pub struct Orchestrator {
    page: Rc<Page>,
    options: Options,
    scope: PageScope,
    locator: ContainerLocator,
    extractor: HeadingExtractor,
    validator: SectionValidator,
    overlay: Rc<OverlayManager>,
    monitor: PageMonitor,
    repository: Rc<dyn SectionRepository>,
    state: Cell<LifecycleState>,
    sections: RefCell<Vec<HeadingSection>>,
    collected: RefCell<HashSet<String>>,
    pending: Cell<bool>,
    passes: Cell<u64>,
    trigger: RefCell<Option<mpsc::UnboundedSender<()>>>,
    trigger_task: RefCell<Option<JoinHandle<()>>>,
}

impl fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Orchestrator")
            .field("state", &self.state.get())
            .field("sections", &self.sections.borrow().len())
            .field("passes", &self.passes.get())
            .finish_non_exhaustive()
    }
}

impl Orchestrator {
    /// Wire every component for `page`, handing collected sections to
    /// `repository`.
    #[must_use]
    pub fn new(page: Rc<Page>, repository: Rc<dyn SectionRepository>, options: Options) -> Rc<Self> {
        Rc::new(Self {
            scope: PageScope::new(&options.allowed_hosts),
            locator: ContainerLocator::new(&options),
            extractor: HeadingExtractor::new(&options),
            validator: SectionValidator::new(&options),
            overlay: Rc::new(OverlayManager::new(Rc::clone(&page), &options)),
            monitor: PageMonitor::new(Rc::clone(&page), &options),
            page,
            options,
            repository,
            state: Cell::new(LifecycleState::Idle),
            sections: RefCell::new(Vec::new()),
            collected: RefCell::new(HashSet::new()),
            pending: Cell::new(false),
            passes: Cell::new(0),
            trigger: RefCell::new(None),
            trigger_task: RefCell::new(None),
        })
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> LifecycleState {
        self.state.get()
    }

    /// Sections from the last completed pass.
    #[must_use]
    pub fn sections(&self) -> Vec<HeadingSection> {
        self.sections.borrow().clone()
    }

    /// The overlay this orchestrator refreshes.
    #[must_use]
    pub fn overlay(&self) -> Rc<OverlayManager> {
        Rc::clone(&self.overlay)
    }

    /// The page monitor.
    #[must_use]
    pub fn monitor(&self) -> &PageMonitor {
        &self.monitor
    }

    /// Number of passes that ran to an outcome other than `Skipped`.
    #[must_use]
    pub fn pass_count(&self) -> u64 {
        self.passes.get()
    }

    /// Run one extraction pass now.
    pub async fn initialize(self: &Rc<Self>) -> PassOutcome {
        if self.state.get() == LifecycleState::Initializing {
            log::debug!("pass already in flight, skipping");
            return PassOutcome::Skipped;
        }
        let previous = self.state.replace(LifecycleState::Initializing);
        self.passes.set(self.passes.get() + 1);

        let outcome = self.run_pass().await;
        let next = match &outcome {
            PassOutcome::Completed { .. } => LifecycleState::Ready,
            PassOutcome::Failed(err) => {
                log::warn!("extraction pass failed: {err}");
                if previous == LifecycleState::Ready {
                    LifecycleState::Ready
                } else {
                    LifecycleState::Idle
                }
            }
            PassOutcome::Skipped | PassOutcome::OutOfScope | PassOutcome::NoHeadings => LifecycleState::Idle,
        };
        self.state.set(next);
        log::debug!("pass finished: {outcome:?}, state {next:?}");
        outcome
    }

    async fn run_pass(self: &Rc<Self>) -> PassOutcome {
        let url = self.page.url();
        if !self.scope.contains(&url) {
            log::info!("{url} is out of scope");
            self.clear_page_state();
            return PassOutcome::OutOfScope;
        }

        let doc = self.page.document();
        let container = self.locator.find(doc);
        if !self
            .monitor
            .wait_for_element(container, HEADING_SELECTOR, self.options.heading_wait_timeout)
            .await
        {
            log::info!("no heading appeared on {url}");
            self.clear_page_state();
            return PassOutcome::NoHeadings;
        }
        self.monitor
            .wait_for_stable_headings(container, self.options.stability)
            .await;

        let container = self.locator.find(doc);
        let extraction = match self.extractor.extract(doc, container, url.as_str()) {
            Ok(extraction) => extraction,
            Err(err) => return PassOutcome::Failed(err),
        };
        for warning in &extraction.warnings {
            log::debug!("extraction: {warning}");
        }

        let filtered = self.validator.filter(extraction.sections);
        for warning in &filtered.warnings {
            log::debug!("validation: {warning}");
        }

        let report = self
            .overlay
            .insert_buttons(container, &filtered.sections, self.click_callback());
        let sections = filtered.sections.len();
        *self.sections.borrow_mut() = filtered.sections;
        log::info!("{sections} sections on {url}, {} controls mounted", report.mounted);

        PassOutcome::Completed {
            sections,
            mounted: report.mounted,
        }
    }

    fn clear_page_state(&self) {
        self.overlay.remove_all_buttons();
        self.sections.borrow_mut().clear();
    }

    fn click_callback(self: &Rc<Self>) -> ClickCallback {
        let weak = Rc::downgrade(self);
        Rc::new(move |section| {
            let weak = weak.clone();
            Box::pin(async move {
                let this = weak
                    .upgrade()
                    .ok_or_else(|| Error::Callback("page orchestrator is gone".to_string()))?;
                this.collect_section(section).await.map(|_| ())
            })
        })
    }

    /// Run the initial pass and start following the page.
    ///
    /// Must be called inside a `LocalSet`.
    pub async fn start(self: &Rc<Self>) -> PassOutcome {
        self.stop_trigger();
        let (tx, rx) = mpsc::unbounded_channel();
        *self.trigger.borrow_mut() = Some(tx);
        *self.trigger_task.borrow_mut() = Some(tokio::task::spawn_local(trigger_loop(
            Rc::downgrade(self),
            rx,
            self.options.mutation_debounce,
        )));

        let on_navigate = {
            let weak = Rc::downgrade(self);
            Rc::new(move |url: url::Url| -> Result<()> {
                let this = weak
                    .upgrade()
                    .ok_or_else(|| Error::Callback("page orchestrator is gone".to_string()))?;
                this.collected.borrow_mut().clear();
                log::debug!("navigated to {url}, scheduling a pass");
                this.schedule();
                Ok(())
            })
        };
        let on_content_change = {
            let weak = Rc::downgrade(self);
            Rc::new(move |_node: dom::NodeId| -> Result<()> {
                let this = weak
                    .upgrade()
                    .ok_or_else(|| Error::Callback("page orchestrator is gone".to_string()))?;
                this.schedule();
                Ok(())
            })
        };
        self.monitor.start_monitoring(on_navigate, on_content_change);

        self.initialize().await
    }

    /// Ask for a pass. Requests are coalesced by the trigger task.
    pub fn schedule(&self) {
        self.pending.set(true);
        if let Some(tx) = self.trigger.borrow().as_ref() {
            let _ = tx.send(());
        }
    }

    /// Stop following the page and remove every control.
    pub fn stop(&self) {
        self.monitor.stop_monitoring();
        self.stop_trigger();
        self.pending.set(false);
        self.clear_page_state();
        if self.state.get() != LifecycleState::Initializing {
            self.state.set(LifecycleState::Idle);
        }
        log::debug!("orchestrator stopped");
    }

    fn stop_trigger(&self) {
        self.trigger.borrow_mut().take();
        if let Some(task) = self.trigger_task.borrow_mut().take() {
            task.abort();
        }
    }

    /// Hand one section to the repository unless an equivalent one is
    /// already stored.
    pub async fn collect_section(&self, section: HeadingSection) -> Result<CollectStatus> {
        let content_id = section.content_id();
        let status = if let Some(existing) = self
            .repository
            .find_duplicate_section(&section.duplicate_key())
            .await?
        {
            log::debug!("{content_id} already stored as {}", existing.section_id());
            CollectStatus::Duplicate
        } else {
            self.repository.add_section(section).await?;
            log::info!("collected {content_id}");
            CollectStatus::Added
        };
        self.collected.borrow_mut().insert(content_id);
        Ok(status)
    }

    /// Collect every section of the last pass. Stops at the first quota
    /// error; other failures are listed in the report.
    pub async fn collect_all(&self) -> Result<CollectReport> {
        let sections = self.sections();
        let mut report = CollectReport::default();
        for section in sections {
            let title = section.title_text().to_string();
            match self.collect_section(section).await {
                Ok(CollectStatus::Added) => report.added += 1,
                Ok(CollectStatus::Duplicate) => report.duplicates += 1,
                Err(err) if err.code() == ErrorCode::QuotaExceeded => return Err(err),
                Err(err) => {
                    log::warn!("could not collect {title:?}: {err}");
                    report.failed.push(title);
                }
            }
        }
        Ok(report)
    }

    /// Extract and collect the heading matched by `selector`.
    pub async fn collect_by_selector(&self, selector: &str) -> Result<HeadingSection> {
        let section = self.section_for_selector(selector)?;
        self.collect_section(section.clone()).await?;
        Ok(section)
    }

    fn section_for_selector(&self, selector: &str) -> Result<HeadingSection> {
        let doc = self.page.document();
        let heading = dom::try_query(&doc.select("html"), selector)
            .filter(|node| dom::heading_level(node).is_some())
            .ok_or_else(|| Error::Validation(format!("{selector:?} does not match a heading")))?;
        let url = self.page.url();

        let container = self.locator.find(doc);
        let container = if dom::is_ancestor_or_self(container, &heading) {
            container
        } else {
            heading.parent().map_or(container, |p| p.id)
        };
        let section = self
            .extractor
            .extract_heading(doc, container, heading.id, url.as_str())?;

        if let Some(reason) = self.validator.check_title(section.title_text()) {
            return Err(Error::Validation(format!(
                "{:?} cannot be collected: {reason:?}",
                section.title_text()
            )));
        }
        Ok(section)
    }

    /// Whether a section with this content id was collected since the last
    /// navigation.
    #[must_use]
    pub fn is_collected(&self, content_id: &str) -> bool {
        self.collected.borrow().contains(content_id)
    }

    /// Toggle the highlight on headings that carry a control.
    pub fn highlight_collectable(&self, enabled: bool) -> usize {
        self.overlay.highlight_collectable(enabled)
    }

    /// Snapshot of the page for the host UI.
    #[must_use]
    pub fn page_info(&self) -> PageInfo {
        let url = self.page.url();
        PageInfo {
            hostname: url.host_str().unwrap_or_default().to_string(),
            in_scope: self.scope.contains(&url),
            url: url.to_string(),
            title: self.page.title(),
            state: self.state.get(),
            section_count: self.sections.borrow().len(),
            button_count: self.overlay.button_count(),
            collected_count: self.collected.borrow().len(),
        }
    }
}

impl Drop for Orchestrator {
    fn drop(&mut self) {
        self.stop_trigger();
    }
}

async fn trigger_loop(orchestrator: Weak<Orchestrator>, mut rx: mpsc::UnboundedReceiver<()>, debounce: Duration) {
    while rx.recv().await.is_some() {
        loop {
            while let Ok(Some(())) = timeout(debounce, rx.recv()).await {}
            let busy = orchestrator
                .upgrade()
                .is_some_and(|o| o.state() == LifecycleState::Initializing);
            if !busy {
                break;
            }
            sleep(debounce).await;
        }

        let Some(this) = orchestrator.upgrade() else {
            return;
        };
        if !this.pending.replace(false) {
            continue;
        }
        let outcome = this.initialize().await;
        log::debug!("triggered pass: {outcome:?}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::overlay::ClickOutcome;
    use crate::repository::InMemorySectionRepository;
    use tokio::task::LocalSet;

    const URL: &str = "https://example.com/owner/repo";
    const HTML: &str = r#"<html><head><title>Repo Wiki</title></head><body>
        <nav><h2>Menu</h2></nav>
        <main>
          <h1>Overview</h1><p>What this project does and why.</p>
          <h2>Install</h2><p>cargo add the crate</p>
          <h2>Table of Contents</h2><ul><li>x</li></ul>
          <h2>Usage</h2><p>call the function</p>
        </main></body></html>"#;

    fn setup(html: &str, options: Options) -> (Rc<Page>, Rc<InMemorySectionRepository>, Rc<Orchestrator>) {
        let page = Rc::new(Page::new(html, URL).unwrap());
        let repo = Rc::new(InMemorySectionRepository::new());
        let orchestrator = Orchestrator::new(Rc::clone(&page), repo.clone(), options);
        (page, repo, orchestrator)
    }

    #[tokio::test(start_paused = true)]
    async fn test_initialize_mounts_controls() {
        let (_page, _repo, orch) = setup(HTML, Options::default());

        let outcome = orch.initialize().await;
        assert_eq!(outcome, PassOutcome::Completed { sections: 3, mounted: 3 });
        assert_eq!(orch.state(), LifecycleState::Ready);

        let titles: Vec<String> = orch.sections().iter().map(|s| s.title_text().to_string()).collect();
        assert_eq!(titles, vec!["Overview", "Install", "Usage"]);
        assert_eq!(orch.overlay().dom_button_count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_repeated_passes_converge() {
        let (_page, _repo, orch) = setup(HTML, Options::default());
        orch.initialize().await;
        orch.initialize().await;
        orch.initialize().await;
        assert_eq!(orch.overlay().dom_button_count(), 3);
        assert_eq!(orch.sections().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_out_of_scope_page() {
        let options = Options {
            allowed_hosts: vec!["deepwiki.com".to_string()],
            ..Options::default()
        };
        let (_page, _repo, orch) = setup(HTML, options);
        assert_eq!(orch.initialize().await, PassOutcome::OutOfScope);
        assert_eq!(orch.state(), LifecycleState::Idle);
        assert!(!orch.page_info().in_scope);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_heading_times_out_to_idle() {
        let (_page, _repo, orch) = setup("<main><p>loading</p></main>", Options::default());
        let started = tokio::time::Instant::now();
        assert_eq!(orch.initialize().await, PassOutcome::NoHeadings);
        assert!(started.elapsed() >= Duration::from_secs(10));
        assert_eq!(orch.state(), LifecycleState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_initialize_is_skipped() {
        LocalSet::new()
            .run_until(async {
                let (_page, _repo, orch) = setup(HTML, Options::default());
                let first = {
                    let orch = Rc::clone(&orch);
                    tokio::task::spawn_local(async move { orch.initialize().await })
                };
                tokio::task::yield_now().await;
                assert_eq!(orch.state(), LifecycleState::Initializing);
                assert_eq!(orch.initialize().await, PassOutcome::Skipped);

                let outcome = first.await.unwrap();
                assert!(matches!(outcome, PassOutcome::Completed { .. }));
                assert_eq!(orch.overlay().dom_button_count(), 3);
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_click_collects_once() {
        let (_page, repo, orch) = setup(HTML, Options::default());
        orch.initialize().await;
        let overlay = orch.overlay();
        let id = overlay.button_ids()[1].clone();

        overlay.click(&id).await.unwrap();
        overlay.click(&id).await.unwrap();
        assert_eq!(repo.len(), 1);
        assert_eq!(orch.page_info().collected_count, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_collect_all_and_by_selector() {
        let (_page, repo, orch) = setup(HTML, Options::default());
        orch.initialize().await;

        let section = orch.collect_by_selector("main h2:nth-of-type(3)").await.unwrap();
        assert_eq!(section.title_text(), "Usage");

        let report = orch.collect_all().await.unwrap();
        assert_eq!(report.added, 2);
        assert_eq!(report.duplicates, 1);
        assert_eq!(repo.len(), 3);

        let err = orch.collect_by_selector("main p").await.unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        let err = orch.collect_by_selector("main h2:nth-of-type(2)").await.unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_distinct_non_ascii_titles_are_both_stored() {
        let html = r#"<main>
            <h2>概要</h2><p>このリポジトリの説明です。</p>
            <h2>使い方</h2><p>コマンドを実行します。</p>
            <h2>C++</h2><p>native bindings</p>
            <h2>C#</h2><p>managed bindings</p>
        </main>"#;
        let (_page, repo, orch) = setup(html, Options::default());
        orch.initialize().await;
        let overlay = orch.overlay();
        assert_eq!(overlay.button_count(), 4);

        for id in overlay.button_ids() {
            assert_eq!(overlay.click(&id).await.unwrap(), ClickOutcome::Collected);
        }
        assert_eq!(repo.len(), 4);
        assert_eq!(orch.page_info().collected_count, 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_same_title_in_two_repositories_is_stored_twice() {
        let html = "<main><h2>Overview</h2><p>About this repository.</p><h2>Usage</h2><p>Run it.</p></main>";
        let repo = Rc::new(InMemorySectionRepository::new());
        let mut statuses = Vec::new();
        for url in ["https://deepwiki.com/alice/tool", "https://deepwiki.com/bob/lib"] {
            let page = Rc::new(Page::new(html, url).unwrap());
            let orch = Orchestrator::new(page, repo.clone(), Options::default());
            orch.initialize().await;
            let overview = orch.sections()[0].clone();
            statuses.push(orch.collect_section(overview).await.unwrap());
        }
        assert_eq!(statuses, vec![CollectStatus::Added, CollectStatus::Added]);
        assert_eq!(repo.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_controls_stay_inside_the_content_container() {
        let html = r#"<html><body>
            <header><h2>Installation</h2></header>
            <main>
              <h1>Guide</h1><p>Everything needed to get going.</p>
              <h2>Installation</h2><p>cargo add the crate</p>
              <h2>Usage</h2><p>call the function</p>
            </main></body></html>"#;
        let (page, _repo, orch) = setup(html, Options::default());
        let outcome = orch.initialize().await;
        assert_eq!(outcome, PassOutcome::Completed { sections: 3, mounted: 3 });

        let doc = page.document();
        assert!(doc.select("header .hsc-collect-btn").is_empty());
        assert!(doc.select("header [data-hsc-processed]").is_empty());
        assert_eq!(doc.select("main .hsc-collect-btn").length(), 3);
        assert_eq!(doc.select("main h2[data-hsc-processed]").length(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_page_info() {
        let (_page, _repo, orch) = setup(HTML, Options::default());
        orch.initialize().await;
        let info = orch.page_info();
        assert_eq!(info.title, "Repo Wiki");
        assert_eq!(info.hostname, "example.com");
        assert_eq!(info.section_count, 3);
        assert_eq!(info.button_count, 3);

        let json = serde_json::to_value(&info).unwrap();
        assert_eq!(json["state"], "ready");
        assert_eq!(json["sectionCount"], 3);
    }
}
