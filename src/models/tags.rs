use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::models::settings_store::{load_json, save_json, KeyValueStore};

pub const FILTER_KEY: &str = "filter";
pub const TAGS_KEY: &str = "tags";
pub const TAG_ASSIGNMENTS_KEY: &str = "tagAssignments";

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Tag {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hotkey: Option<String>,
}

impl Tag {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            color: None,
            hotkey: None,
        }
    }
}

/// The value handed to every feed factory. Two filters are the same filter
/// when they hold the same tags in the same order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Filter {
    #[serde(default)]
    pub tags: Vec<Tag>,
}

impl Filter {
    pub fn with_tags(tags: Vec<Tag>) -> Self {
        Self { tags }
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    /// Tag names joined with ",".
    pub fn as_string(&self) -> String {
        self.tags
            .iter()
            .map(|t| t.name.as_str())
            .collect::<Vec<_>>()
            .join(",")
    }

    /// True when every tag of the filter is among `item_tags`.
    pub fn matches(&self, item_tags: &[String]) -> bool {
        self.tags
            .iter()
            .all(|t| item_tags.iter().any(|name| *name == t.name))
    }

    pub fn load(store: &dyn KeyValueStore) -> Self {
        load_json(store, FILTER_KEY)
    }

    pub fn save(&self, store: &dyn KeyValueStore) -> Result<()> {
        save_json(store, FILTER_KEY, self)
    }
}

/// Known tags and which item ids carry them. Every mutation persists.
pub struct TagStore {
    store: Rc<dyn KeyValueStore>,
    tags: RefCell<Vec<Tag>>,
    assignments: RefCell<HashMap<String, Vec<String>>>,
}

impl TagStore {
    pub fn load(store: Rc<dyn KeyValueStore>) -> Self {
        let tags: Vec<Tag> = load_json(store.as_ref(), TAGS_KEY);
        let assignments: HashMap<String, Vec<String>> =
            load_json(store.as_ref(), TAG_ASSIGNMENTS_KEY);
        debug!(tags = tags.len(), assigned = assignments.len(), "Loaded tags");
        Self {
            store,
            tags: RefCell::new(tags),
            assignments: RefCell::new(assignments),
        }
    }

    pub fn tags(&self) -> Vec<Tag> {
        self.tags.borrow().clone()
    }

    pub fn add_tag(&self, tag: Tag) -> Result<()> {
        {
            let mut tags = self.tags.borrow_mut();
            if tags.iter().any(|t| t.name == tag.name) {
                bail!("Tag {:?} already exists", tag.name);
            }
            tags.push(tag);
        }
        self.save_tags()
    }

    /// Removes the tag and strips it from every item.
    pub fn remove_tag(&self, name: &str) -> Result<()> {
        self.tags.borrow_mut().retain(|t| t.name != name);
        for names in self.assignments.borrow_mut().values_mut() {
            names.retain(|n| n != name);
        }
        self.assignments.borrow_mut().retain(|_, names| !names.is_empty());
        self.save_tags()?;
        self.save_assignments()
    }

    /// Toggles `tag` on item `id`. Returns whether the item carries it afterwards.
    pub fn assign_tag(&self, id: &str, tag: &str) -> Result<bool> {
        if !self.tags.borrow().iter().any(|t| t.name == tag) {
            bail!("Unknown tag {tag:?}");
        }
        let carried = {
            let mut assignments = self.assignments.borrow_mut();
            let names = assignments.entry(id.to_string()).or_default();
            if let Some(pos) = names.iter().position(|n| n == tag) {
                names.remove(pos);
                if names.is_empty() {
                    assignments.remove(id);
                }
                false
            } else {
                names.push(tag.to_string());
                true
            }
        };
        self.save_assignments()?;
        Ok(carried)
    }

    pub fn tags_for_id(&self, id: &str) -> Vec<String> {
        self.assignments
            .borrow()
            .get(id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn tag_for_hotkey(&self, key: &str) -> Option<Tag> {
        self.tags
            .borrow()
            .iter()
            .find(|t| t.hotkey.as_deref() == Some(key))
            .cloned()
    }

    fn save_tags(&self) -> Result<()> {
        save_json(self.store.as_ref(), TAGS_KEY, &*self.tags.borrow())
    }

    fn save_assignments(&self) -> Result<()> {
        save_json(
            self.store.as_ref(),
            TAG_ASSIGNMENTS_KEY,
            &*self.assignments.borrow(),
        )
    }
}
