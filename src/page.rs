//! Host page model.
//!
//! `Page` stands in for the live browser document: it owns the parsed DOM,
//! the current location and session history, and delivers child-list
//! mutations to registered observers. History entry points can be hooked
//! (and unhooked), and back/forward moves fire `popstate` listeners, which
//! is everything the page monitor needs to follow a single-page
//! application.
//!
//! Everything here is single-threaded (`Rc`/`RefCell`); mutation records
//! travel over tokio unbounded channels so observers can await them.

use std::cell::{Cell, RefCell};
use std::collections::HashSet;
use std::fmt;
use std::rc::{Rc, Weak};

use dom_query::{Document, NodeId, Selection};
use tokio::sync::mpsc;
use url::Url;

use crate::dom;
use crate::error::{Error, Result};
use crate::url_utils;

/// One child-list change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutationRecord {
    /// Node whose children changed.
    pub target: NodeId,
    /// Nodes inserted under `target`.
    pub added: Vec<NodeId>,
    /// Nodes removed from `target`.
    pub removed: Vec<NodeId>,
}

/// Where `insert_adjacent_html` places new markup, as in the DOM API.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertPosition {
    /// Before the target, as a sibling.
    BeforeBegin,
    /// Inside the target, before its first child.
    AfterBegin,
    /// Inside the target, after its last child.
    BeforeEnd,
    /// After the target, as a sibling.
    AfterEnd,
}

/// The two history entry points used for client-side routing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryMethod {
    /// `history.pushState`
    PushState,
    /// `history.replaceState`
    ReplaceState,
}

/// Handle of an installed hook or listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandleId(u64);

/// Callback run after every history entry point call.
pub type HistoryHook = Rc<dyn Fn(HistoryMethod, &Url)>;

/// Callback run on back/forward navigation.
pub type PopStateListener = Rc<dyn Fn(&Url)>;

struct ObserverSlot {
    id: HandleId,
    target: NodeId,
    tx: mpsc::UnboundedSender<MutationRecord>,
}

#[derive(Debug)]
struct History {
    entries: Vec<Url>,
    index: usize,
}

/// The live page the engine runs against.
pub struct Page {
    document: Document,
    location: RefCell<Url>,
    history: RefCell<History>,
    observers: RefCell<Vec<ObserverSlot>>,
    history_hooks: RefCell<Vec<(HandleId, HistoryHook)>>,
    popstate_listeners: RefCell<Vec<(HandleId, PopStateListener)>>,
    next_handle: Cell<u64>,
}

impl fmt::Debug for Page {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Page")
            .field("location", &self.location.borrow().as_str())
            .field("observers", &self.observers.borrow().len())
            .field("history_hooks", &self.history_hooks.borrow().len())
            .finish_non_exhaustive()
    }
}

impl Page {
    /// Load `html` as the document at `url`.
    pub fn new(html: &str, url: &str) -> Result<Self> {
        let location =
            url_utils::parse_url(url).ok_or_else(|| Error::InvalidUrl(url.to_string()))?;
        Ok(Self {
            document: dom::parse(html),
            location: RefCell::new(location.clone()),
            history: RefCell::new(History {
                entries: vec![location],
                index: 0,
            }),
            observers: RefCell::new(Vec::new()),
            history_hooks: RefCell::new(Vec::new()),
            popstate_listeners: RefCell::new(Vec::new()),
            next_handle: Cell::new(0),
        })
    }

    /// The live document.
    #[must_use]
    pub fn document(&self) -> &Document {
        &self.document
    }

    /// Current location.
    #[must_use]
    pub fn url(&self) -> Url {
        self.location.borrow().clone()
    }

    /// Text of the `<title>` element.
    #[must_use]
    pub fn title(&self) -> String {
        crate::selector::utils::normalize_whitespace(&self.document.select("title").text())
    }

    /// Body element id, or the document root when there is no body.
    #[must_use]
    pub fn body(&self) -> NodeId {
        self.document
            .select("body")
            .nodes()
            .first()
            .map_or_else(|| self.document.root().id, |n| n.id)
    }

    fn next_handle(&self) -> HandleId {
        let id = self.next_handle.get();
        self.next_handle.set(id + 1);
        HandleId(id)
    }

    // === History ===

    /// `history.pushState`: new entry, forward entries dropped, hooks run.
    pub fn push_state(&self, url: &str) -> Result<()> {
        let resolved = self.resolve(url)?;
        {
            let mut history = self.history.borrow_mut();
            let keep = history.index + 1;
            history.entries.truncate(keep);
            history.entries.push(resolved.clone());
            history.index = keep;
        }
        *self.location.borrow_mut() = resolved.clone();
        self.run_history_hooks(HistoryMethod::PushState, &resolved);
        Ok(())
    }

    /// `history.replaceState`: current entry rewritten, hooks run.
    pub fn replace_state(&self, url: &str) -> Result<()> {
        let resolved = self.resolve(url)?;
        {
            let mut history = self.history.borrow_mut();
            let index = history.index;
            history.entries[index] = resolved.clone();
        }
        *self.location.borrow_mut() = resolved.clone();
        self.run_history_hooks(HistoryMethod::ReplaceState, &resolved);
        Ok(())
    }

    /// Browser back button. Returns false at the start of history.
    pub fn back(&self) -> bool {
        self.traverse(-1)
    }

    /// Browser forward button. Returns false at the end of history.
    pub fn forward(&self) -> bool {
        self.traverse(1)
    }

    fn traverse(&self, delta: isize) -> bool {
        let target = {
            let mut history = self.history.borrow_mut();
            let Some(index) = history.index.checked_add_signed(delta) else {
                return false;
            };
            if index >= history.entries.len() {
                return false;
            }
            history.index = index;
            history.entries[index].clone()
        };
        *self.location.borrow_mut() = target.clone();

        let listeners: Vec<PopStateListener> = self
            .popstate_listeners
            .borrow()
            .iter()
            .map(|(_, l)| Rc::clone(l))
            .collect();
        for listener in listeners {
            listener(&target);
        }
        true
    }

    fn resolve(&self, url: &str) -> Result<Url> {
        Ok(self.location.borrow().join(url)?)
    }

    fn run_history_hooks(&self, method: HistoryMethod, url: &Url) {
        let hooks: Vec<HistoryHook> = self
            .history_hooks
            .borrow()
            .iter()
            .map(|(_, h)| Rc::clone(h))
            .collect();
        for hook in hooks {
            hook(method, url);
        }
    }

    /// Wrap both history entry points with `hook`.
    pub fn install_history_hook(&self, hook: HistoryHook) -> HandleId {
        let id = self.next_handle();
        self.history_hooks.borrow_mut().push((id, hook));
        id
    }

    /// Restore the entry points as they were before `id` was installed.
    pub fn uninstall_history_hook(&self, id: HandleId) -> bool {
        let mut hooks = self.history_hooks.borrow_mut();
        let before = hooks.len();
        hooks.retain(|(hid, _)| *hid != id);
        hooks.len() != before
    }

    /// Number of installed history hooks.
    #[must_use]
    pub fn history_hook_count(&self) -> usize {
        self.history_hooks.borrow().len()
    }

    /// Listen for back/forward navigation.
    pub fn add_popstate_listener(&self, listener: PopStateListener) -> HandleId {
        let id = self.next_handle();
        self.popstate_listeners.borrow_mut().push((id, listener));
        id
    }

    /// Remove a back/forward listener.
    pub fn remove_popstate_listener(&self, id: HandleId) -> bool {
        let mut listeners = self.popstate_listeners.borrow_mut();
        let before = listeners.len();
        listeners.retain(|(lid, _)| *lid != id);
        listeners.len() != before
    }

    /// Number of back/forward listeners.
    #[must_use]
    pub fn popstate_listener_count(&self) -> usize {
        self.popstate_listeners.borrow().len()
    }

    // === Mutation observers ===

    /// Observe child-list changes on `target` and its whole subtree.
    pub fn observe(self: &Rc<Self>, target: NodeId) -> MutationObserver {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = self.next_handle();
        self.observers.borrow_mut().push(ObserverSlot { id, target, tx });
        MutationObserver {
            id,
            page: Rc::downgrade(self),
            rx,
            connected: true,
        }
    }

    /// Disconnect the observer registered under `id`. Its receiver drains
    /// whatever was already delivered and then ends.
    pub fn disconnect_observer(&self, id: HandleId) -> bool {
        let mut observers = self.observers.borrow_mut();
        let before = observers.len();
        observers.retain(|slot| slot.id != id);
        observers.len() != before
    }

    /// Number of connected observers.
    #[must_use]
    pub fn observer_count(&self) -> usize {
        self.observers.borrow().len()
    }

    fn notify(&self, record: &MutationRecord) {
        let Some(target) = dom::node(&self.document, record.target) else {
            return;
        };
        self.observers.borrow_mut().retain(|slot| {
            if !dom::is_ancestor_or_self(slot.target, &target) {
                return true;
            }
            slot.tx.send(record.clone()).is_ok()
        });
    }

    // === DOM mutations ===

    /// `insertAdjacentHTML`: parse `html` and insert it relative to
    /// `target`. Returns the ids of the inserted top-level nodes; empty when
    /// the target is missing or has no parent for sibling positions.
    pub fn insert_adjacent_html(
        &self,
        target: NodeId,
        position: InsertPosition,
        html: &str,
    ) -> Vec<NodeId> {
        let Some(node) = dom::node(&self.document, target) else {
            return Vec::new();
        };
        let container = match position {
            InsertPosition::AfterBegin | InsertPosition::BeforeEnd => node,
            InsertPosition::BeforeBegin | InsertPosition::AfterEnd => match node.parent() {
                Some(parent) => parent,
                None => return Vec::new(),
            },
        };
        let before = child_ids(&container);

        let sel = Selection::from(node);
        match position {
            InsertPosition::BeforeBegin => sel.before_html(html),
            InsertPosition::AfterBegin => sel.prepend_html(html),
            InsertPosition::BeforeEnd => sel.append_html(html),
            InsertPosition::AfterEnd => sel.after_html(html),
        }

        let added: Vec<NodeId> = child_ids(&container)
            .into_iter()
            .filter(|id| !before.contains(id))
            .collect();
        if !added.is_empty() {
            self.notify(&MutationRecord {
                target: container.id,
                added: added.clone(),
                removed: Vec::new(),
            });
        }
        added
    }

    /// Replace the children of `target` with `html`.
    pub fn set_inner_html(&self, target: NodeId, html: &str) -> bool {
        let Some(node) = dom::node(&self.document, target) else {
            return false;
        };
        let removed: Vec<NodeId> = node.children().into_iter().map(|c| c.id).collect();
        Selection::from(node).set_html(html);
        let added: Vec<NodeId> = node.children().into_iter().map(|c| c.id).collect();
        self.notify(&MutationRecord {
            target,
            added,
            removed,
        });
        true
    }

    /// Detach `target` from its parent.
    pub fn remove_node(&self, target: NodeId) -> bool {
        let Some(node) = dom::node(&self.document, target) else {
            return false;
        };
        let Some(parent) = node.parent() else {
            return false;
        };
        Selection::from(node).remove();
        self.notify(&MutationRecord {
            target: parent.id,
            added: Vec::new(),
            removed: vec![target],
        });
        true
    }

    /// Append `html` to the first element matching `selector`.
    pub fn append_html(&self, selector: &str, html: &str) -> bool {
        let target = dom::try_query(&self.document.select("html"), selector).map(|n| n.id);
        target.is_some_and(|id| {
            !self
                .insert_adjacent_html(id, InsertPosition::BeforeEnd, html)
                .is_empty()
        })
    }
}

fn child_ids(node: &dom_query::NodeRef) -> HashSet<NodeId> {
    node.children().into_iter().map(|c| c.id).collect()
}

/// Receiving end of [`Page::observe`]. Disconnects on drop.
pub struct MutationObserver {
    id: HandleId,
    page: Weak<Page>,
    rx: mpsc::UnboundedReceiver<MutationRecord>,
    connected: bool,
}

impl MutationObserver {
    /// Next mutation record; `None` once disconnected and drained.
    pub async fn recv(&mut self) -> Option<MutationRecord> {
        if !self.connected {
            return None;
        }
        self.rx.recv().await
    }

    /// Stop receiving records. Idempotent.
    pub fn disconnect(&mut self) {
        if !self.connected {
            return;
        }
        self.connected = false;
        if let Some(page) = self.page.upgrade() {
            page.disconnect_observer(self.id);
        }
        self.rx.close();
    }

    /// Registration handle, usable with [`Page::disconnect_observer`].
    #[must_use]
    pub fn id(&self) -> HandleId {
        self.id
    }

    /// Whether the observer still receives records.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.connected
    }
}

impl Drop for MutationObserver {
    fn drop(&mut self) {
        self.disconnect();
    }
}

impl fmt::Debug for MutationObserver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MutationObserver")
            .field("id", &self.id)
            .field("connected", &self.connected)
            .finish_non_exhaustive()
    }
}
