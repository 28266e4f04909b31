//! Application-level string pool.
//!
//! Interned strings are handed out as cheap [`StrRef`] handles so configuration
//! values can be carried around without cloning. The pool is shared and
//! thread-safe; `dismiss` empties it.

use dashmap::DashMap;
use parking_lot::RwLock;
use std::sync::Arc;

/// Reference to a pooled string.
pub type StrRef = u32;

/// Sentinel for "no string".
pub const NULL_STRREF: StrRef = u32::MAX;

#[derive(Clone, Default)]
pub struct StringPool {
    lookup: Arc<DashMap<String, StrRef>>,
    table: Arc<RwLock<Vec<String>>>,
}

impl StringPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a string to the pool, returning its reference. Duplicate strings
    /// share a single entry. Returns [`NULL_STRREF`] when the table cannot
    /// grow — callers must check.
    pub fn intern(&self, value: &str) -> StrRef {
        if value.is_empty() {
            return NULL_STRREF;
        }
        if let Some(existing) = self.lookup.get(value) {
            return *existing;
        }
        let mut table = self.table.write();
        // Re-check under the table lock: a racing intern may have won.
        if let Some(existing) = self.lookup.get(value) {
            return *existing;
        }
        if table.try_reserve(1).is_err() {
            return NULL_STRREF;
        }
        let reference = table.len() as StrRef;
        table.push(value.to_string());
        self.lookup.insert(value.to_string(), reference);
        reference
    }

    /// Add a string sourced from an XML attribute, reinstating the escaped
    /// special characters before pooling.
    pub fn intern_xml(&self, value: &str) -> StrRef {
        let unescaped = unescape_xml(value);
        self.intern(&unescaped)
    }

    pub fn get(&self, reference: StrRef) -> Option<String> {
        if reference == NULL_STRREF {
            return None;
        }
        self.table.read().get(reference as usize).cloned()
    }

    pub fn len(&self) -> usize {
        self.table.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.read().is_empty()
    }

    /// Empty the pool. Outstanding references become dangling and resolve to
    /// `None`.
    pub fn dismiss(&self) {
        self.lookup.clear();
        self.table.write().clear();
    }
}

/// Reinstate XML entity escapes to their literal characters.
pub fn unescape_xml(input: &str) -> String {
    input
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}
