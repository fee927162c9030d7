use std::collections::BTreeMap;

use crate::error::StoreError;
use crate::types::{ObjectKind, ScreenObject};

/// Name → screen object. Names are unique, case-sensitive and non-empty.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ObjectStore {
    objects: BTreeMap<String, ScreenObject>,
}

impl ObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a new object. A rejected add leaves the store untouched.
    pub fn add(&mut self, name: &str, object: ScreenObject) -> Result<(), StoreError> {
        if name.is_empty() {
            return Err(StoreError::EmptyName);
        }
        if self.objects.contains_key(name) {
            return Err(StoreError::DuplicateName(name.to_string()));
        }
        self.objects.insert(name.to_string(), object);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&ScreenObject> {
        self.objects.get(name)
    }

    pub(crate) fn get_mut(&mut self, name: &str) -> Option<&mut ScreenObject> {
        self.objects.get_mut(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.objects.contains_key(name)
    }

    /// Remove an object. Steps that still name it are left dangling.
    pub fn remove(&mut self, name: &str) -> Option<ScreenObject> {
        self.objects.remove(name)
    }

    /// Names in lexicographic order, optionally restricted to one kind.
    pub fn list_names(&self, kind: Option<ObjectKind>) -> Vec<&str> {
        self.objects
            .iter()
            .filter(|(_, obj)| kind.map_or(true, |k| obj.kind() == k))
            .map(|(name, _)| name.as_str())
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ScreenObject)> {
        self.objects.iter().map(|(n, o)| (n.as_str(), o))
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Rgb;

    #[test]
    fn rejects_empty_and_duplicate_names() {
        let mut store = ObjectStore::new();
        store.add("ok", ScreenObject::region(0, 0, 10, 10)).unwrap();

        assert_eq!(store.add("", ScreenObject::region(1, 1, 1, 1)), Err(StoreError::EmptyName));
        assert_eq!(
            store.add("ok", ScreenObject::pixel(1, 1, Rgb(1, 2, 3))),
            Err(StoreError::DuplicateName("ok".into()))
        );
        // rejected adds leave the original entry intact
        assert_eq!(store.len(), 1);
        assert_eq!(store.get("ok"), Some(&ScreenObject::region(0, 0, 10, 10)));
    }

    #[test]
    fn names_are_case_sensitive() {
        let mut store = ObjectStore::new();
        store.add("Button", ScreenObject::region(0, 0, 1, 1)).unwrap();
        store.add("button", ScreenObject::region(0, 0, 1, 1)).unwrap();
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn list_names_sorted_and_filtered() {
        let mut store = ObjectStore::new();
        store.add("zeta", ScreenObject::pixel(0, 0, Rgb(0, 0, 0))).unwrap();
        store.add("alpha", ScreenObject::region(0, 0, 1, 1)).unwrap();
        store.add("mid", ScreenObject::image("/tmp/x.png")).unwrap();
        store.add("beta", ScreenObject::pixel(1, 1, Rgb(9, 9, 9))).unwrap();

        assert_eq!(store.list_names(None), vec!["alpha", "beta", "mid", "zeta"]);
        assert_eq!(store.list_names(Some(ObjectKind::Pixel)), vec!["beta", "zeta"]);
        assert_eq!(store.list_names(Some(ObjectKind::Image)), vec!["mid"]);
    }

    #[test]
    fn remove_returns_object() {
        let mut store = ObjectStore::new();
        store.add("a", ScreenObject::region(0, 0, 1, 1)).unwrap();
        assert!(store.remove("a").is_some());
        assert!(store.remove("a").is_none());
        assert!(store.is_empty());
    }
}
