use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::error::Result;
use crate::feed::FilterState;

const PREFS_FILE: &str = "preferences.json";

fn default_true() -> bool {
    true
}

/// Client-local state that outlives a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Preferences {
    #[serde(default)]
    pub saved_tags: Vec<String>,
    #[serde(default = "default_true")]
    pub prism_expanded: bool,
    /// Filter choices keyed by view name.
    #[serde(default)]
    pub filters: BTreeMap<String, FilterState>,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            saved_tags: Vec::new(),
            prism_expanded: true,
            filters: BTreeMap::new(),
        }
    }
}

/// Preferences loaded once at startup and written back on every change.
/// Subscribers see each new value through a `watch` channel.
///
/// The demo-extracted flag is session scoped and never written to disk.
pub struct PreferenceStore {
    path: PathBuf,
    current: watch::Sender<Preferences>,
    demo_extracted: bool,
}

impl PreferenceStore {
    pub fn load(dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(PREFS_FILE);

        let prefs = match std::fs::read_to_string(&path) {
            Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
                tracing::warn!("Discarding unreadable preferences at {:?}: {}", path, e);
                Preferences::default()
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Preferences::default(),
            Err(e) => return Err(e.into()),
        };

        let (current, _) = watch::channel(prefs);
        Ok(Self {
            path,
            current,
            demo_extracted: false,
        })
    }

    pub fn get(&self) -> Preferences {
        self.current.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Preferences> {
        self.current.subscribe()
    }

    /// Apply `change`, persist, then notify subscribers.
    pub fn update(&self, change: impl FnOnce(&mut Preferences)) -> Result<()> {
        let mut next = self.get();
        change(&mut next);
        if next == *self.current.borrow() {
            return Ok(());
        }
        self.flush(&next)?;
        self.current.send_replace(next);
        Ok(())
    }

    fn flush(&self, prefs: &Preferences) -> Result<()> {
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_vec_pretty(prefs)?)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    pub fn is_saved(&self, tag: &str) -> bool {
        self.current.borrow().saved_tags.iter().any(|t| t == tag)
    }

    pub fn save_tag(&self, tag: &str) -> Result<()> {
        self.update(|p| {
            if !p.saved_tags.iter().any(|t| t == tag) {
                p.saved_tags.push(tag.to_string());
            }
        })
    }

    pub fn unsave_tag(&self, tag: &str) -> Result<()> {
        self.update(|p| p.saved_tags.retain(|t| t != tag))
    }

    /// Returns whether the tag is saved afterwards.
    pub fn toggle_saved_tag(&self, tag: &str) -> Result<bool> {
        if self.is_saved(tag) {
            self.unsave_tag(tag)?;
            Ok(false)
        } else {
            self.save_tag(tag)?;
            Ok(true)
        }
    }

    pub fn clear_saved_tags(&self) -> Result<()> {
        self.update(|p| p.saved_tags.clear())
    }

    pub fn set_prism_expanded(&self, expanded: bool) -> Result<()> {
        self.update(|p| p.prism_expanded = expanded)
    }

    pub fn filters_for(&self, view: &str) -> Option<FilterState> {
        self.current.borrow().filters.get(view).cloned()
    }

    pub fn set_filters(&self, view: &str, filters: &FilterState) -> Result<()> {
        self.update(|p| {
            p.filters.insert(view.to_string(), filters.clone());
        })
    }

    pub fn demo_extracted(&self) -> bool {
        self.demo_extracted
    }

    pub fn set_demo_extracted(&mut self, extracted: bool) {
        self.demo_extracted = extracted;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::engine::StatusFilter;
    use tempfile::TempDir;
    use tokio_test::assert_ok;

    #[test]
    fn missing_file_loads_defaults() {
        let dir = TempDir::new().unwrap();
        let store = PreferenceStore::load(dir.path()).unwrap();
        assert!(store.get().saved_tags.is_empty());
        assert!(store.get().prism_expanded);
    }

    #[test]
    fn mutations_survive_a_reload() {
        let dir = TempDir::new().unwrap();
        {
            let store = PreferenceStore::load(dir.path()).unwrap();
            assert_ok!(store.save_tag("rust"));
            assert_ok!(store.save_tag("ai"));
            assert_ok!(store.save_tag("rust"));
            assert_ok!(store.set_prism_expanded(false));
            let filters = FilterState {
                status: StatusFilter::Upcoming,
                ..Default::default()
            };
            assert_ok!(store.set_filters("home", &filters));
        }

        let store = PreferenceStore::load(dir.path()).unwrap();
        assert_eq!(store.get().saved_tags, vec!["rust", "ai"]);
        assert!(!store.get().prism_expanded);
        assert_eq!(
            store.filters_for("home").map(|f| f.status),
            Some(StatusFilter::Upcoming)
        );
        assert!(store.filters_for("events").is_none());
    }

    #[test]
    fn toggle_saves_then_unsaves() {
        let dir = TempDir::new().unwrap();
        let store = PreferenceStore::load(dir.path()).unwrap();
        assert!(assert_ok!(store.toggle_saved_tag("ml")));
        assert!(store.is_saved("ml"));
        assert!(!store.toggle_saved_tag("ml").unwrap());
        assert!(store.get().saved_tags.is_empty());

        store.save_tag("a").unwrap();
        store.clear_saved_tags().unwrap();
        assert!(store.get().saved_tags.is_empty());
    }

    #[test]
    fn subscribers_see_changes() {
        let dir = TempDir::new().unwrap();
        let store = PreferenceStore::load(dir.path()).unwrap();
        let mut rx = store.subscribe();
        assert!(!rx.has_changed().unwrap());

        store.save_tag("rust").unwrap();
        assert!(rx.has_changed().unwrap());
        assert_eq!(rx.borrow_and_update().saved_tags, vec!["rust"]);

        // No-op updates do not notify
        store.save_tag("rust").unwrap();
        assert!(!rx.has_changed().unwrap());
    }

    #[test]
    fn corrupt_file_falls_back_to_defaults() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join(PREFS_FILE), "{ not json").unwrap();
        let store = PreferenceStore::load(dir.path()).unwrap();
        assert!(store.get().saved_tags.is_empty());
    }

    #[test]
    fn demo_flag_is_not_persisted() {
        let dir = TempDir::new().unwrap();
        {
            let mut store = PreferenceStore::load(dir.path()).unwrap();
            store.set_demo_extracted(true);
            store.save_tag("x").unwrap();
            assert!(store.demo_extracted());
        }
        let store = PreferenceStore::load(dir.path()).unwrap();
        assert!(!store.demo_extracted());
    }
}
