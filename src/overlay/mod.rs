//! Control overlay manager.
//!
//! Mounts one collect control per extracted section on the live heading it
//! came from and renders click feedback. Every refresh starts from a clean
//! slate: all tracked controls, stray control elements and processed
//! markers are removed before anything is inserted, so repeated passes
//! never stack controls.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::time::Duration;

use dom_query::{NodeId, Selection};

use crate::dom;
use crate::error::{Error, Result};
use crate::options::Options;
use crate::page::Page;
use crate::patterns::{
    BUTTON_ID_ATTR, CONTROL_CLASS, CONTROL_SELECTOR, HIGHLIGHT_CLASS, PROCESSED_ATTR, STATE_ATTR,
};
use crate::section::HeadingSection;
use crate::selector::utils::has_class;

pub mod control;
pub mod insertion;
pub mod matching;

pub use control::{button_id, ControlState, MountedControl};
use matching::{find_heading, MatchContext};

/// Boxed non-`Send` future.
pub type LocalBoxFuture<T> = Pin<Box<dyn Future<Output = T>>>;

/// Invoked with a control's section when the control is clicked.
pub type ClickCallback = Rc<dyn Fn(HeadingSection) -> LocalBoxFuture<Result<()>>>;

/// Summary of one refresh.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InsertReport {
    /// Controls mounted.
    pub mounted: usize,
    /// Titles of sections no heading matched.
    pub unmatched: Vec<String>,
    /// Titles of sections whose heading matched but no control could be inserted.
    pub failed: Vec<String>,
}

/// How a click ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClickOutcome {
    /// The callback succeeded.
    Collected,
    /// The callback failed.
    Failed(Error),
    /// The control was already handing off; the click was ignored.
    Busy,
}

/// Keeps the set of mounted controls in sync with the current sections.
pub struct OverlayManager {
    page: Rc<Page>,
    controls: RefCell<Vec<MountedControl>>,
    on_click: RefCell<Option<ClickCallback>>,
    next_mount: Cell<u64>,
    success_feedback: Duration,
    error_feedback: Duration,
}

impl fmt::Debug for OverlayManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OverlayManager")
            .field("controls", &self.controls.borrow().len())
            .field("success_feedback", &self.success_feedback)
            .field("error_feedback", &self.error_feedback)
            .finish_non_exhaustive()
    }
}

impl OverlayManager {
    /// Manager for `page` with feedback timings from `options`.
    #[must_use]
    pub fn new(page: Rc<Page>, options: &Options) -> Self {
        Self {
            page,
            controls: RefCell::new(Vec::new()),
            on_click: RefCell::new(None),
            next_mount: Cell::new(0),
            success_feedback: options.success_feedback,
            error_feedback: options.error_feedback,
        }
    }

    /// Replace every mounted control with one per section.
    ///
    /// Headings are matched only inside `container`, the element the
    /// sections were extracted from; `<body>` stands in when it is gone.
    /// Sections whose heading cannot be found, or whose control cannot be
    /// inserted, are logged and listed in the report.
    pub fn insert_buttons(
        &self,
        container: NodeId,
        sections: &[HeadingSection],
        on_click: ClickCallback,
    ) -> InsertReport {
        self.remove_all_buttons();
        *self.on_click.borrow_mut() = Some(on_click);

        let mut report = InsertReport::default();
        let mut per_level = [0usize; 7];

        for (index, section) in sections.iter().enumerate() {
            let level = section.level();
            let ordinal = per_level[usize::from(level.get())];
            per_level[usize::from(level.get())] += 1;

            let title = section.title_text();
            let Some(heading) = self.match_heading(container, section, ordinal) else {
                log::debug!("no heading matches section {title:?}");
                report.unmatched.push(title.to_string());
                continue;
            };

            let id = button_id(index, title);
            let Some((root, strategy)) = insertion::mount(&self.page, heading, &id, title) else {
                log::warn!("could not mount control for {title:?}");
                report.failed.push(title.to_string());
                continue;
            };
            log::debug!("mounted {id} via {strategy}");

            if let Some(node) = dom::node(self.page.document(), heading) {
                dom::set_attribute(&Selection::from(node), PROCESSED_ATTR, "true");
            }
            let button = self.button_in(root).unwrap_or(root);
            let mount = self.next_mount.get();
            self.next_mount.set(mount + 1);

            self.controls.borrow_mut().push(MountedControl {
                button_id: id,
                heading,
                root,
                button,
                state: ControlState::Default,
                section: section.clone(),
                mount,
            });
            report.mounted += 1;
        }

        log::debug!(
            "overlay refresh: {} mounted, {} unmatched, {} failed",
            report.mounted,
            report.unmatched.len(),
            report.failed.len()
        );
        report
    }

    fn match_heading(&self, container: NodeId, section: &HeadingSection, ordinal: usize) -> Option<NodeId> {
        let doc = self.page.document();
        let scope = dom::node(doc, container)
            .filter(|node| dom::is_attached(doc, node))
            .or_else(|| dom::node(doc, self.page.body()))?;
        let candidates = dom::try_query_all(&Selection::from(scope), &section.level().selector());
        let ctx = MatchContext {
            section,
            candidates: &candidates,
            ordinal,
        };
        find_heading(&ctx).map(|(id, strategy)| {
            log::debug!("{:?} matched by {strategy}", section.title_text());
            id
        })
    }

    fn button_in(&self, root: NodeId) -> Option<NodeId> {
        let node = dom::node(self.page.document(), root)?;
        let sel = Selection::from(node);
        if has_class(&sel, CONTROL_CLASS) {
            return Some(root);
        }
        dom::try_query(&sel, &format!(".{CONTROL_CLASS}")).map(|n| n.id)
    }

    /// Remove every control and processed marker. Returns the number of
    /// control elements removed.
    pub fn remove_all_buttons(&self) -> usize {
        let doc = self.page.document();
        let mut removed = 0;

        let tracked: Vec<MountedControl> = self.controls.borrow_mut().drain(..).collect();
        for control in tracked {
            if dom::node(doc, control.root).is_some_and(|n| dom::is_attached(doc, &n))
                && self.page.remove_node(control.root)
            {
                removed += 1;
            }
        }

        let strays: Vec<NodeId> = dom::try_query_all(&doc.select("html"), CONTROL_SELECTOR)
            .iter()
            .map(|n| n.id)
            .collect();
        for id in strays {
            if dom::node(doc, id).is_some_and(|n| dom::is_attached(doc, &n)) && self.page.remove_node(id) {
                removed += 1;
            }
        }

        let marked = doc.select(&format!("[{PROCESSED_ATTR}]"));
        dom::remove_attribute(&marked, PROCESSED_ATTR);
        marked.remove_class(HIGHLIGHT_CLASS);

        removed
    }

    /// Simulate a user trigger on a control.
    ///
    /// Moves the control to `Adding`, awaits the click callback, shows
    /// `Success` or `Error` for the configured feedback time, then reverts
    /// to `Default`. A revert only lands if the same mount is still there
    /// and still shows the state this click set.
    pub async fn click(&self, button_id: &str) -> Result<ClickOutcome> {
        let (section, mount, callback) = {
            let controls = self.controls.borrow();
            let control = controls
                .iter()
                .find(|c| c.button_id == button_id)
                .ok_or_else(|| Error::UnknownControl(button_id.to_string()))?;
            if control.state == ControlState::Adding {
                return Ok(ClickOutcome::Busy);
            }
            let callback = self
                .on_click
                .borrow()
                .clone()
                .ok_or_else(|| Error::Callback("no click handler installed".to_string()))?;
            (control.section.clone(), control.mount, callback)
        };

        self.set_mount_state(mount, ControlState::Adding);
        let result = callback(section).await;

        let (outcome, state, delay) = match result {
            Ok(()) => (ClickOutcome::Collected, ControlState::Success, self.success_feedback),
            Err(err) => {
                log::warn!("collecting {button_id} failed: {err}");
                (ClickOutcome::Failed(err), ControlState::Error, self.error_feedback)
            }
        };

        if self.set_mount_state(mount, state) {
            tokio::time::sleep(delay).await;
            if self.mount_state(mount) == Some(state) {
                self.set_mount_state(mount, ControlState::Default);
            }
        }
        Ok(outcome)
    }

    fn mount_state(&self, mount: u64) -> Option<ControlState> {
        self.controls
            .borrow()
            .iter()
            .find(|c| c.mount == mount)
            .map(|c| c.state)
    }

    fn set_mount_state(&self, mount: u64, state: ControlState) -> bool {
        let mut controls = self.controls.borrow_mut();
        let Some(control) = controls.iter_mut().find(|c| c.mount == mount) else {
            return false;
        };
        control.state = state;
        self.render_state(control.button, state);
        true
    }

    fn render_state(&self, button: NodeId, state: ControlState) {
        if let Some(node) = dom::node(self.page.document(), button) {
            let sel = Selection::from(node);
            dom::set_attribute(&sel, STATE_ATTR, state.as_str());
            dom::set_attribute(&sel, "title", state.label());
        }
    }

    /// Force a control into `state`. Returns false for an unknown id.
    pub fn update_button_state(&self, button_id: &str, state: ControlState) -> bool {
        let mount = self
            .controls
            .borrow()
            .iter()
            .find(|c| c.button_id == button_id)
            .map(|c| c.mount);
        mount.is_some_and(|m| self.set_mount_state(m, state))
    }

    /// Number of mounted controls.
    #[must_use]
    pub fn button_count(&self) -> usize {
        self.controls.borrow().len()
    }

    /// State of the control with `button_id`.
    #[must_use]
    pub fn button_state(&self, button_id: &str) -> Option<ControlState> {
        self.controls
            .borrow()
            .iter()
            .find(|c| c.button_id == button_id)
            .map(|c| c.state)
    }

    /// Ids of the mounted controls, mount order.
    #[must_use]
    pub fn button_ids(&self) -> Vec<String> {
        self.controls.borrow().iter().map(|c| c.button_id.clone()).collect()
    }

    /// Section behind the control with `button_id`.
    #[must_use]
    pub fn section_for(&self, button_id: &str) -> Option<HeadingSection> {
        self.controls
            .borrow()
            .iter()
            .find(|c| c.button_id == button_id)
            .map(|c| c.section.clone())
    }

    /// Button id of the control mounted on `heading`.
    #[must_use]
    pub fn button_for_heading(&self, heading: NodeId) -> Option<String> {
        self.controls
            .borrow()
            .iter()
            .find(|c| c.heading == heading)
            .map(|c| c.button_id.clone())
    }

    /// Toggle the highlight class on every heading carrying a control.
    /// Returns the number of headings touched.
    pub fn highlight_collectable(&self, enabled: bool) -> usize {
        let marked = self.page.document().select(&format!("[{PROCESSED_ATTR}]"));
        if enabled {
            marked.add_class(HIGHLIGHT_CLASS);
        } else {
            marked.remove_class(HIGHLIGHT_CLASS);
        }
        marked.length()
    }

    /// Control elements present in the document, tracked or not.
    #[must_use]
    pub fn dom_button_count(&self) -> usize {
        self.page
            .document()
            .select(&format!("[{BUTTON_ID_ATTR}]"))
            .length()
    }
}
