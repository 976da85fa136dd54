//! Screen Module
//!
//! Per-screen state: the window registry, viewport grid, desktops, work
//! area, window groups and the window private table.
//!
//! The registry is a doubly linked list threaded through the clients by
//! window id. The head is the topmost window; `next` points down the stack
//! and `prev` up. Its order is the stacking order.

use std::collections::HashMap;
use std::rc::{Rc, Weak};

use tracing::{debug, info};

use crate::config::WorkspaceConfig;
use crate::core::privates::grow_all;
use crate::core::{ObjectBase, ObjectKind, ObjectRef, PrivateIndexTable, PrivateKey, ScreenId, WindowRef, Xid};
use crate::error::PrivateError;
use crate::shared::{Geometry, Strut};
use crate::wm::WindowManager;
use crate::wm::client::{Client, WindowAttributes, WindowGroup};
use crate::wm::hooks::ScreenHooks;

/// Per-screen window manager state
pub struct Screen {
    pub object: ObjectBase,

    pub id: ScreenId,

    /// Root window
    pub root: Xid,

    pub width: i32,
    pub height: i32,

    windows: HashMap<Xid, Client>,

    /// Window ids in the order they were added
    creation_order: Vec<Xid>,

    /// Topmost window
    head: Option<Xid>,

    /// Bottommost window
    tail: Option<Xid>,

    window_privates: PrivateIndexTable,

    /// Current viewport column and row
    pub x: i32,
    pub y: i32,

    /// Viewport grid size
    pub hsize: i32,
    pub vsize: i32,

    pub desktop_count: u32,
    pub current_desktop: u32,

    /// Screen minus struts
    pub work_area: Geometry,

    groups: Vec<Weak<WindowGroup>>,

    map_num: u32,

    /// Last published client lists (map order, stacking order)
    client_lists: (Vec<Xid>, Vec<Xid>),

    pub hooks: ScreenHooks,
}

impl Screen {
    pub fn new(
        id: ScreenId,
        root: Xid,
        width: i32,
        height: i32,
        privates_len: usize,
        workspace: &WorkspaceConfig,
    ) -> Self {
        info!(
            "Initializing screen {}: {}x{} viewports, {} desktops",
            id, workspace.hsize, workspace.vsize, workspace.desktops
        );
        Self {
            object: ObjectBase::init(ObjectKind::Screen, Some(ObjectRef::Display), privates_len),
            id,
            root,
            width,
            height,
            windows: HashMap::new(),
            creation_order: Vec::new(),
            head: None,
            tail: None,
            window_privates: PrivateIndexTable::new(ObjectKind::Window),
            x: 0,
            y: 0,
            hsize: workspace.hsize.max(1),
            vsize: workspace.vsize.max(1),
            desktop_count: workspace.desktops.max(1),
            current_desktop: 0,
            work_area: Geometry::new(0, 0, width, height),
            groups: Vec::new(),
            map_num: 1,
            client_lists: (Vec::new(), Vec::new()),
            hooks: ScreenHooks::new(),
        }
    }

    pub fn window(&self, id: Xid) -> Option<&Client> {
        self.windows.get(&id)
    }

    pub fn window_mut(&mut self, id: Xid) -> Option<&mut Client> {
        self.windows.get_mut(&id)
    }

    pub fn window_count(&self) -> usize {
        self.windows.len()
    }

    pub fn creation_order(&self) -> &[Xid] {
        &self.creation_order
    }

    pub fn top(&self) -> Option<Xid> {
        self.head
    }

    pub fn bottom(&self) -> Option<Xid> {
        self.tail
    }

    /// Walk the stack from the top
    pub fn top_down(&self) -> TopDown<'_> {
        TopDown {
            screen: self,
            cursor: self.head,
        }
    }

    /// Walk the stack from the bottom
    pub fn bottom_up(&self) -> BottomUp<'_> {
        BottomUp {
            screen: self,
            cursor: self.tail,
        }
    }

    /// Window ids, topmost first
    pub fn stacking_order(&self) -> Vec<Xid> {
        self.top_down().map(|c| c.id).collect()
    }

    /// Window ids, bottommost first
    pub fn bottom_to_top(&self) -> Vec<Xid> {
        self.bottom_up().map(|c| c.id).collect()
    }

    pub fn is_linked(&self, id: Xid) -> bool {
        self.head == Some(id) || self.windows.get(&id).is_some_and(|c| c.prev.is_some())
    }

    fn set_next(&mut self, id: Xid, next: Option<Xid>) {
        if let Some(c) = self.windows.get_mut(&id) {
            c.next = next;
        }
    }

    fn set_prev(&mut self, id: Xid, prev: Option<Xid>) {
        if let Some(c) = self.windows.get_mut(&id) {
            c.prev = prev;
        }
    }

    /// Take `id` out of the stack; false if it was not in it
    pub fn unhook(&mut self, id: Xid) -> bool {
        if !self.is_linked(id) {
            return false;
        }
        let Some(c) = self.windows.get_mut(&id) else {
            return false;
        };
        let (prev, next) = (c.prev.take(), c.next.take());

        match prev {
            Some(p) => self.set_next(p, next),
            None => self.head = next,
        }
        match next {
            Some(n) => self.set_prev(n, prev),
            None => self.tail = prev,
        }
        true
    }

    /// Put `id` directly above `above`, or on top when `above` is `None`
    ///
    /// Returns false, leaving the stack untouched, if either window is
    /// unknown or `above` is not in the stack.
    pub fn insert_above(&mut self, id: Xid, above: Option<Xid>) -> bool {
        if !self.windows.contains_key(&id) {
            return false;
        }
        if let Some(sibling) = above {
            if sibling == id || !self.is_linked(sibling) {
                return false;
            }
        }
        self.unhook(id);

        match above {
            None => {
                let old_head = self.head;
                self.set_next(id, old_head);
                match old_head {
                    Some(h) => self.set_prev(h, Some(id)),
                    None => self.tail = Some(id),
                }
                self.head = Some(id);
            }
            Some(sibling) => {
                let sibling_prev = self.windows.get(&sibling).and_then(|c| c.prev);
                self.set_prev(id, sibling_prev);
                self.set_next(id, Some(sibling));
                self.set_prev(sibling, Some(id));
                match sibling_prev {
                    Some(p) => self.set_next(p, Some(id)),
                    None => self.head = Some(id),
                }
            }
        }
        true
    }

    /// Put `id` at the bottom of the stack
    pub fn insert_at_bottom(&mut self, id: Xid) -> bool {
        if !self.windows.contains_key(&id) {
            return false;
        }
        self.unhook(id);

        let old_tail = self.tail;
        self.set_prev(id, old_tail);
        match old_tail {
            Some(t) => self.set_next(t, Some(id)),
            None => self.head = Some(id),
        }
        self.tail = Some(id);
        true
    }

    /// Register a client and put it on top of the stack
    pub(crate) fn add_client(&mut self, client: Client) {
        let id = client.id;
        self.windows.insert(id, client);
        self.creation_order.push(id);
        self.insert_above(id, None);
    }

    pub(crate) fn remove_client(&mut self, id: Xid) -> Option<Client> {
        self.unhook(id);
        self.creation_order.retain(|&w| w != id);
        let client = self.windows.remove(&id);
        self.groups.retain(|g| g.strong_count() > 0);
        client
    }

    /// Next map order number
    pub(crate) fn next_map_num(&mut self) -> u32 {
        let n = self.map_num;
        self.map_num += 1;
        n
    }

    /// Shared group for `leader`, created on first use
    pub fn group_for(&mut self, leader: Xid) -> Rc<WindowGroup> {
        self.groups.retain(|g| g.strong_count() > 0);
        if let Some(group) = self
            .groups
            .iter()
            .filter_map(Weak::upgrade)
            .find(|g| g.leader == leader)
        {
            return group;
        }
        let group = Rc::new(WindowGroup { leader });
        self.groups.push(Rc::downgrade(&group));
        group
    }

    /// Number of groups some window still belongs to
    pub fn live_groups(&self) -> usize {
        self.groups.iter().filter(|g| g.strong_count() > 0).count()
    }

    /// Screen minus the struts of mapped windows
    pub fn compute_work_area(&self) -> Geometry {
        let mut reserved = Strut::default();
        for c in self.windows.values() {
            if c.destroyed || !c.is_mapped() {
                continue;
            }
            if let Some(s) = c.strut {
                reserved.left = reserved.left.max(s.left);
                reserved.right = reserved.right.max(s.right);
                reserved.top = reserved.top.max(s.top);
                reserved.bottom = reserved.bottom.max(s.bottom);
            }
        }

        let area = Geometry::new(
            reserved.left,
            reserved.top,
            self.width - reserved.left - reserved.right,
            self.height - reserved.top - reserved.bottom,
        );
        if area.width < 1 || area.height < 1 {
            debug!("Struts leave no room on screen {}, ignoring them", self.id);
            return Geometry::new(0, 0, self.width, self.height);
        }
        area
    }

    pub(crate) fn allocate_window_private<T: 'static>(&mut self) -> Result<PrivateKey<T>, PrivateError> {
        let windows = &mut self.windows;
        let index = self.window_privates.allocate(|len| {
            grow_all(
                ObjectKind::Window,
                windows.values_mut().map(|c| c.object.privates_mut()),
                len,
            )
        })?;
        Ok(PrivateKey::new(ObjectKind::Window, index))
    }

    pub(crate) fn free_window_private<T>(&mut self, key: PrivateKey<T>) {
        if self.window_privates.free(key.index()) {
            for c in self.windows.values_mut() {
                c.object.privates_mut().clear_index(key.index());
            }
            debug!("Freed window private {} on screen {}", key.index(), self.id);
        }
    }

    pub fn window_private_count(&self) -> usize {
        self.window_privates.len()
    }

    pub(crate) fn set_window_private_limit(&mut self, limit: usize) {
        self.window_privates.set_limit(limit);
    }
}

/// Stack iterator, topmost first
pub struct TopDown<'a> {
    screen: &'a Screen,
    cursor: Option<Xid>,
}

impl<'a> Iterator for TopDown<'a> {
    type Item = &'a Client;

    fn next(&mut self) -> Option<&'a Client> {
        let client = self.screen.windows.get(&self.cursor?)?;
        self.cursor = client.next;
        Some(client)
    }
}

/// Stack iterator, bottommost first
pub struct BottomUp<'a> {
    screen: &'a Screen,
    cursor: Option<Xid>,
}

impl<'a> Iterator for BottomUp<'a> {
    type Item = &'a Client;

    fn next(&mut self) -> Option<&'a Client> {
        let client = self.screen.windows.get(&self.cursor?)?;
        self.cursor = client.prev;
        Some(client)
    }
}

impl WindowManager {
    /// Start tracking a window from a creation event or the start-up scan
    ///
    /// New windows go on top of the stack. Windows that are already
    /// viewable are treated as mapped and, unless override-redirect,
    /// managed.
    pub fn add_window(&mut self, screen: ScreenId, id: Xid, attrs: WindowAttributes) -> Option<WindowRef> {
        if self.find_window(id).is_some() {
            debug!("Window 0x{:x} is already known", id);
            return None;
        }
        let s = self.display.screen_mut(screen)?;

        let mut client = Client::new(id, screen, s.window_private_count(), attrs);
        if attrs.viewable {
            client.map_num = s.next_map_num();
            client.placed = true;
            client.managed = !attrs.override_redirect;
        }
        client.window_type = client.effective_type();
        s.add_client(client);

        let w = WindowRef::new(screen, id);
        debug!("Added window 0x{:x} on screen {}", id, screen);

        self.attach_object(w.into());
        self.window_add_notify(w);
        self.recalc_window_actions(w);
        if attrs.viewable {
            self.update_client_list(screen);
        }
        Some(w)
    }

    /// Mark a window destroyed; it is dropped once nothing holds it
    pub fn destroy_window(&mut self, w: WindowRef) {
        let Some(client) = self.window_mut(w) else {
            return;
        };
        if client.destroyed {
            return;
        }
        client.destroyed = true;
        client.managed = false;
        client.map_num = 0;
        client.viewable = false;
        client.sync.wait = None;
        let had_strut = client.strut.is_some();
        debug!("Window 0x{:x} destroyed", w.id);

        if self.display.next_active_window == Some(w.id) {
            self.display.next_active_window = None;
        }
        let was_active = self.display.active_window == Some(w.id);
        if was_active {
            self.display.active_window = None;
        }

        if had_strut {
            self.update_work_area(w.screen);
        }
        self.update_client_list(w.screen);
        if was_active {
            self.focus_default_window(w.screen);
        }
    }

    /// Keep a destroyed window around until `release_destroy`
    pub fn hold_destroy(&mut self, w: WindowRef) {
        if let Some(c) = self.window_mut(w) {
            c.destroy_refs += 1;
        }
    }

    pub fn release_destroy(&mut self, w: WindowRef) {
        if let Some(c) = self.window_mut(w) {
            c.destroy_refs = c.destroy_refs.saturating_sub(1);
        }
    }

    /// Drop destroyed windows nobody holds any more
    pub fn flush_pending_destroys(&mut self) {
        let doomed: Vec<WindowRef> = self
            .display
            .screens
            .iter()
            .flat_map(|s| {
                s.creation_order
                    .iter()
                    .filter_map(|id| s.window(*id))
                    .filter(|c| c.destroyed && c.destroy_refs == 0)
                    .map(|c| c.window_ref())
            })
            .collect();

        for w in doomed {
            self.detach_object(w.into());
            if let Some(mut client) = self.screen_mut(w.screen).and_then(|s| s.remove_client(w.id)) {
                client.object.fini();
                debug!("Removed window 0x{:x}", w.id);
            }
        }
    }

    /// Publish `_NET_CLIENT_LIST` and `_NET_CLIENT_LIST_STACKING` if they changed
    pub fn update_client_list(&mut self, screen: ScreenId) {
        let Some(s) = self.display.screen_mut(screen) else {
            return;
        };
        let listed = |c: &Client| c.managed && c.is_mapped() && !c.destroyed;

        let mut by_map: Vec<&Client> = s.windows.values().filter(|c| listed(c)).collect();
        by_map.sort_by_key(|c| c.map_num);
        let mapped: Vec<Xid> = by_map.iter().map(|c| c.id).collect();
        let stacking: Vec<Xid> = s.bottom_up().filter(|c| listed(c)).map(|c| c.id).collect();

        if s.client_lists.0 == mapped && s.client_lists.1 == stacking {
            return;
        }
        let root = s.root;
        s.client_lists = (mapped.clone(), stacking.clone());
        self.request("Set client list", |srv| srv.set_client_list(root, &mapped, &stacking));
    }

    /// Recompute the work area; publishes desktop hints when it changed
    pub fn update_work_area(&mut self, screen: ScreenId) {
        let Some(s) = self.display.screen_mut(screen) else {
            return;
        };
        let area = s.compute_work_area();
        if area == s.work_area {
            return;
        }
        debug!(
            "Work area on screen {}: {}x{}+{}+{}",
            screen, area.width, area.height, area.x, area.y
        );
        s.work_area = area;
        self.publish_desktop_hints(screen);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wm::testing::{Request, manage, mapped_window, test_wm};

    fn bare_screen() -> Screen {
        Screen::new(0, 1, 800, 600, 0, &WorkspaceConfig::default())
    }

    fn add(screen: &mut Screen, id: Xid) {
        screen.add_client(Client::new(id, 0, 0, WindowAttributes::default()));
    }

    #[test]
    fn test_new_windows_go_on_top() {
        let mut s = bare_screen();
        add(&mut s, 1);
        add(&mut s, 2);
        add(&mut s, 3);
        assert_eq!(s.stacking_order(), vec![3, 2, 1]);
        assert_eq!(s.bottom_to_top(), vec![1, 2, 3]);
        assert_eq!(s.creation_order(), &[1, 2, 3]);
        assert_eq!(s.window(2).unwrap().below(), Some(1));
        assert_eq!(s.window(2).unwrap().above(), Some(3));
    }

    #[test]
    fn test_insert_above_and_bottom() {
        let mut s = bare_screen();
        for id in 1..=4 {
            add(&mut s, id);
        }
        // 4 3 2 1
        assert!(s.insert_above(1, Some(3)));
        assert_eq!(s.stacking_order(), vec![4, 1, 3, 2]);

        assert!(s.insert_at_bottom(4));
        assert_eq!(s.stacking_order(), vec![1, 3, 2, 4]);
        assert_eq!(s.top(), Some(1));
        assert_eq!(s.bottom(), Some(4));

        assert!(s.insert_above(4, None));
        assert_eq!(s.stacking_order(), vec![4, 1, 3, 2]);

        assert!(!s.insert_above(2, Some(2)));
        assert!(!s.insert_above(2, Some(99)));
        assert_eq!(s.stacking_order(), vec![4, 1, 3, 2]);
    }

    #[test]
    fn test_unhook_keeps_list_consistent() {
        let mut s = bare_screen();
        for id in 1..=3 {
            add(&mut s, id);
        }
        assert!(s.unhook(2));
        assert!(!s.unhook(2));
        assert_eq!(s.stacking_order(), vec![3, 1]);
        assert_eq!(s.bottom_to_top(), vec![1, 3]);

        assert!(s.unhook(3));
        assert!(s.unhook(1));
        assert_eq!(s.top(), None);
        assert_eq!(s.bottom(), None);

        assert!(s.insert_at_bottom(2));
        assert_eq!(s.stacking_order(), vec![2]);
    }

    #[test]
    fn test_groups_live_while_held() {
        let mut s = bare_screen();
        let a = s.group_for(10);
        let b = s.group_for(10);
        assert!(Rc::ptr_eq(&a, &b));
        assert_eq!(s.live_groups(), 1);

        drop(a);
        drop(b);
        assert_eq!(s.live_groups(), 0);
        let c = s.group_for(10);
        assert_eq!(c.leader, 10);
    }

    #[test]
    fn test_work_area_from_struts() {
        let (mut wm, _log) = test_wm();
        let dock = mapped_window(&mut wm, 0x100);
        wm.window_mut(dock).unwrap().strut = Some(Strut {
            top: 30,
            ..Strut::default()
        });
        wm.update_work_area(0);
        assert_eq!(wm.screen(0).unwrap().work_area, Geometry::new(0, 30, 1024, 738));

        wm.window_mut(dock).unwrap().strut = Some(Strut {
            left: 2000,
            ..Strut::default()
        });
        wm.update_work_area(0);
        assert_eq!(wm.screen(0).unwrap().work_area, Geometry::new(0, 0, 1024, 768));
    }

    #[test]
    fn test_deferred_destroy() {
        let (mut wm, _log) = test_wm();
        let a = mapped_window(&mut wm, 0x100);
        wm.hold_destroy(a);
        wm.destroy_window(a);
        wm.flush_pending_destroys();
        assert!(wm.window(a).is_some_and(|c| c.destroyed));

        wm.release_destroy(a);
        wm.flush_pending_destroys();
        assert!(wm.window(a).is_none());
        assert!(wm.screen(0).unwrap().stacking_order().is_empty());
    }

    #[test]
    fn test_client_list_published_on_change_only() {
        let (mut wm, log) = test_wm();
        let a = mapped_window(&mut wm, 0x100);
        let b = mapped_window(&mut wm, 0x200);
        manage(&mut wm, 0x300);

        log.clear();
        wm.update_client_list(0);
        assert!(log.take().is_empty());

        wm.destroy_window(a);
        let requests = log.take();
        assert!(requests.contains(&Request::ClientList(1, vec![b.id], vec![b.id])));
    }
}
