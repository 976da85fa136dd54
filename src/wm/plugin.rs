//! Plugin Module
//!
//! Plugins extend the core by wrapping hooks and keeping their own state
//! in private slots. The core only knows them through this trait and
//! drives their lifetime: `init` once, then `init_object` for every live
//! object, parents first. Unloading runs the same steps backwards.

use std::rc::Rc;

use anyhow::Result;
use tracing::{debug, info, warn};

use crate::core::ObjectRef;
use crate::error::PluginError;
use crate::wm::WindowManager;

pub trait Plugin {
    /// Unique name, used for unload and reorder requests
    fn name(&self) -> &str;

    /// Allocate private keys and wrap process-level hooks
    fn init(&self, _wm: &mut WindowManager) -> Result<()> {
        Ok(())
    }

    /// Undo `init`
    fn fini(&self, _wm: &mut WindowManager) {}

    /// Set up per-object state; called for every object alive at load time
    /// and for every object added later
    fn init_object(&self, _wm: &mut WindowManager, _object: ObjectRef) -> Result<()> {
        Ok(())
    }

    fn fini_object(&self, _wm: &mut WindowManager, _object: ObjectRef) {}
}

impl WindowManager {
    /// Names of the loaded plugins in load order
    pub fn plugin_names(&self) -> Vec<&str> {
        self.plugins.iter().map(|p| p.name()).collect()
    }

    pub fn is_plugin_loaded(&self, name: &str) -> bool {
        self.plugins.iter().any(|p| p.name() == name)
    }

    /// Initialize `plugin` against every live object and append it to the
    /// plugin stack
    ///
    /// On failure everything the plugin set up so far is torn down again
    /// and the plugin is not loaded.
    pub fn load_plugin(&mut self, plugin: Rc<dyn Plugin>) -> Result<(), PluginError> {
        let name = plugin.name().to_string();
        if self.is_plugin_loaded(&name) {
            return Err(PluginError::AlreadyLoaded(name));
        }

        plugin.init(self).map_err(|source| PluginError::InitFailed {
            name: name.clone(),
            source,
        })?;

        let objects = self.object_tree();
        for (done, &object) in objects.iter().enumerate() {
            if let Err(source) = plugin.init_object(self, object) {
                warn!("Plugin {} failed on {} {}, rolling back", name, object.kind(), self.object_name(object));
                let object_name = self.object_name(object);
                for &initialized in objects[..done].iter().rev() {
                    plugin.fini_object(self, initialized);
                }
                plugin.fini(self);
                return Err(PluginError::InitObjectFailed {
                    name,
                    object: object_name,
                    source,
                });
            }
        }

        info!("Loaded plugin {}", name);
        self.plugins.push(plugin);
        Ok(())
    }

    /// Tear `name` down against every live object and drop it
    pub fn unload_plugin(&mut self, name: &str) -> Result<Rc<dyn Plugin>, PluginError> {
        let index = self
            .plugins
            .iter()
            .position(|p| p.name() == name)
            .ok_or_else(|| PluginError::NotLoaded(name.to_string()))?;
        let plugin = self.plugins.remove(index);

        for object in self.object_tree().into_iter().rev() {
            plugin.fini_object(self, object);
        }
        plugin.fini(self);

        info!("Unloaded plugin {}", name);
        Ok(plugin)
    }

    /// Put the loaded plugins in the order of `names`
    ///
    /// Plugins after the first position that differs are unloaded (last
    /// first) and loaded again in the new order, so each plugin's wrappers
    /// end up above those of the plugins before it.
    pub fn reorder_plugins(&mut self, names: &[&str]) -> Result<(), PluginError> {
        let mut requested: Vec<&str> = names.to_vec();
        let mut loaded = self.plugin_names();
        requested.sort_unstable();
        loaded.sort_unstable();
        if requested != loaded {
            return Err(PluginError::BadOrder);
        }

        let Some(first) = self
            .plugins
            .iter()
            .zip(names)
            .position(|(p, &n)| p.name() != n)
        else {
            return Ok(());
        };
        debug!("Reordering plugins from position {}", first);

        let mut unloaded = Vec::new();
        while self.plugins.len() > first {
            let Some(name) = self.plugins.last().map(|p| p.name().to_string()) else {
                break;
            };
            unloaded.push(self.unload_plugin(&name)?);
        }

        for &name in &names[first..] {
            let Some(index) = unloaded.iter().position(|p| p.name() == name) else {
                continue;
            };
            let plugin = unloaded.swap_remove(index);
            self.load_plugin(plugin)?;
        }
        Ok(())
    }

    /// Unload every plugin, last loaded first
    pub fn unload_all_plugins(&mut self) {
        while let Some(name) = self.plugins.last().map(|p| p.name().to_string()) {
            if let Err(e) = self.unload_plugin(&name) {
                warn!("Failed to unload plugin {}: {}", name, e);
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{ObjectKind, PrivateKey, WindowRef, WrapToken};
    use crate::wm::testing::{mapped_window, test_wm};
    use anyhow::bail;
    use std::cell::{Cell, RefCell};

    /// Counts paints per window and records its lifecycle calls
    struct Counter {
        name: &'static str,
        log: Rc<RefCell<Vec<String>>>,
        key: Cell<Option<PrivateKey<u32>>>,
        token: Cell<Option<WrapToken>>,
        fail_on: Option<ObjectKind>,
    }

    impl Counter {
        fn new(name: &'static str, log: &Rc<RefCell<Vec<String>>>) -> Rc<Self> {
            Rc::new(Self {
                name,
                log: log.clone(),
                key: Cell::new(None),
                token: Cell::new(None),
                fail_on: None,
            })
        }

        fn failing(name: &'static str, log: &Rc<RefCell<Vec<String>>>, kind: ObjectKind) -> Rc<Self> {
            Rc::new(Self {
                name,
                log: log.clone(),
                key: Cell::new(None),
                token: Cell::new(None),
                fail_on: Some(kind),
            })
        }
    }

    impl Plugin for Counter {
        fn name(&self) -> &str {
            self.name
        }

        fn init(&self, _wm: &mut WindowManager) -> Result<()> {
            self.log.borrow_mut().push(format!("{} init", self.name));
            Ok(())
        }

        fn fini(&self, _wm: &mut WindowManager) {
            self.log.borrow_mut().push(format!("{} fini", self.name));
        }

        fn init_object(&self, wm: &mut WindowManager, object: ObjectRef) -> Result<()> {
            self.log
                .borrow_mut()
                .push(format!("{} +{}", self.name, wm.object_name(object)));
            if self.fail_on == Some(object.kind()) {
                bail!("refusing {}", object.kind());
            }
            match object {
                ObjectRef::Screen(screen) => {
                    let key = wm.allocate_window_private::<u32>(screen)?;
                    self.key.set(Some(key));
                    let name = self.name;
                    let token = wm.screen_mut(screen).unwrap().hooks.paint_window.wrap(name, move |wm, w, next| {
                        if let Some(count) = wm.private_mut(w.into(), key) {
                            *count += 1;
                        }
                        next.call(wm, w)
                    });
                    self.token.set(Some(token));
                }
                ObjectRef::Window(w) => {
                    if let Some(key) = self.key.get() {
                        wm.set_private(w.into(), key, 0)?;
                    }
                }
                _ => {}
            }
            Ok(())
        }

        fn fini_object(&self, wm: &mut WindowManager, object: ObjectRef) {
            self.log
                .borrow_mut()
                .push(format!("{} -{}", self.name, wm.object_name(object)));
            if let ObjectRef::Screen(screen) = object {
                if let Some(token) = self.token.take() {
                    wm.screen_mut(screen).unwrap().hooks.paint_window.unwrap(token);
                }
                if let Some(key) = self.key.take() {
                    wm.free_window_private(screen, key);
                }
            }
        }
    }

    fn paints(wm: &WindowManager, plugin: &Counter, w: WindowRef) -> Option<u32> {
        plugin.key.get().and_then(|key| wm.private(w.into(), key).copied())
    }

    #[test]
    fn test_load_walks_live_objects_parents_first() {
        let (mut wm, _log) = test_wm();
        let a = mapped_window(&mut wm, 0x100);
        let log = Rc::new(RefCell::new(Vec::new()));
        let counter = Counter::new("count", &log);

        wm.load_plugin(counter.clone()).unwrap();
        assert_eq!(
            *log.borrow(),
            vec!["count init", "count +core", "count +:9", "count +0", "count +256"]
        );

        wm.paint_window(a);
        wm.paint_window(a);
        assert_eq!(paints(&wm, &counter, a), Some(2));

        // Windows added later get their slot initialized too
        let b = mapped_window(&mut wm, 0x200);
        assert_eq!(paints(&wm, &counter, b), Some(0));
        assert!(matches!(wm.load_plugin(counter.clone()), Err(PluginError::AlreadyLoaded(_))));
    }

    #[test]
    fn test_unload_restores_hooks_and_frees_slots() {
        let (mut wm, _log) = test_wm();
        let a = mapped_window(&mut wm, 0x100);
        let log = Rc::new(RefCell::new(Vec::new()));
        let counter = Counter::new("count", &log);
        wm.load_plugin(counter.clone()).unwrap();
        assert!(wm.screen(0).unwrap().hooks.paint_window.is_wrapped());

        log.borrow_mut().clear();
        wm.unload_plugin("count").unwrap();
        assert_eq!(
            *log.borrow(),
            vec!["count -256", "count -0", "count -:9", "count -core", "count fini"]
        );
        assert!(!wm.screen(0).unwrap().hooks.paint_window.is_wrapped());
        assert!(counter.key.get().is_none());
        assert!(wm.paint_window(a));

        // The freed slot is handed out again
        wm.load_plugin(counter.clone()).unwrap();
        assert_eq!(counter.key.get().map(|k| k.index()), Some(0));
        wm.unload_plugin("count").unwrap();
        assert!(matches!(wm.unload_plugin("count"), Err(PluginError::NotLoaded(_))));
    }

    #[test]
    fn test_failed_object_init_rolls_back() {
        let (mut wm, _log) = test_wm();
        mapped_window(&mut wm, 0x100);
        let log = Rc::new(RefCell::new(Vec::new()));

        let result = wm.load_plugin(Counter::failing("broken", &log, ObjectKind::Window));
        assert!(matches!(result, Err(PluginError::InitObjectFailed { .. })));
        assert!(wm.plugin_names().is_empty());
        assert!(!wm.screen(0).unwrap().hooks.paint_window.is_wrapped());
        assert_eq!(log.borrow().last().map(String::as_str), Some("broken fini"));

        let working = Counter::new("count", &log);
        wm.load_plugin(working.clone()).unwrap();
        assert_eq!(working.key.get().map(|k| k.index()), Some(0));
    }

    #[test]
    fn test_exhausted_privates_fail_the_load() {
        let (mut wm, _log) = test_wm();
        wm.set_private_limit(ObjectKind::Window, 0);
        let log = Rc::new(RefCell::new(Vec::new()));

        let result = wm.load_plugin(Counter::new("count", &log));
        assert!(matches!(result, Err(PluginError::InitObjectFailed { .. })));
        assert!(!wm.is_plugin_loaded("count"));
    }

    #[test]
    fn test_reorder_reloads_from_first_difference() {
        let (mut wm, _log) = test_wm();
        let log = Rc::new(RefCell::new(Vec::new()));
        for name in ["a", "b", "c"] {
            wm.load_plugin(Counter::new(name, &log)).unwrap();
        }
        assert_eq!(wm.screen(0).unwrap().hooks.paint_window.owners(), vec!["c", "b", "a"]);

        log.borrow_mut().clear();
        wm.reorder_plugins(&["a", "c", "b"]).unwrap();
        assert_eq!(wm.plugin_names(), vec!["a", "c", "b"]);
        assert_eq!(wm.screen(0).unwrap().hooks.paint_window.owners(), vec!["b", "c", "a"]);
        assert!(log.borrow().iter().all(|entry| !entry.starts_with("a ")));

        assert!(matches!(wm.reorder_plugins(&["a", "b"]), Err(PluginError::BadOrder)));
        assert!(matches!(wm.reorder_plugins(&["a", "b", "b"]), Err(PluginError::BadOrder)));

        wm.unload_all_plugins();
        assert!(wm.plugin_names().is_empty());
        assert!(!wm.screen(0).unwrap().hooks.paint_window.is_wrapped());
    }
}
