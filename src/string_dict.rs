//! Interned names for identifiers and property keys.
//!
//! Every identifier in an expression tree built through [`crate::ast::AstBuilder`]
//! shares one `Rc<str>` per distinct name, so name comparisons during alias
//! analysis are usually a pointer check.

use rustc_hash::FxHashMap;

use crate::value::{CheapClone, JsString};

/// A dictionary for deduplicating JsString instances.
pub struct StringDict {
    /// Map from string content to shared JsString instance.
    strings: FxHashMap<Box<str>, JsString>,
}

impl StringDict {
    /// Create an empty dictionary.
    pub fn new() -> Self {
        Self {
            strings: FxHashMap::default(),
        }
    }

    /// Create a dictionary pre-populated with the names the runtime itself uses.
    pub fn with_common_strings() -> Self {
        let mut dict = Self::new();
        for s in COMMON_STRINGS {
            dict.get_or_insert(s);
        }
        dict
    }

    /// Get an existing string or insert a new one.
    pub fn get_or_insert(&mut self, s: &str) -> JsString {
        if let Some(existing) = self.strings.get(s) {
            return existing.cheap_clone();
        }
        let js_str = JsString::from(s);
        self.strings.insert(s.into(), js_str.cheap_clone());
        js_str
    }

    /// Get an existing string without inserting.
    pub fn get(&self, s: &str) -> Option<JsString> {
        self.strings.get(s).map(|s| s.cheap_clone())
    }

    pub fn len(&self) -> usize {
        self.strings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strings.is_empty()
    }
}

impl Default for StringDict {
    fn default() -> Self {
        Self::new()
    }
}

const COMMON_STRINGS: &[&str] = &["length", "undefined", "prototype", "name"];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interning_shares_allocation() {
        let mut dict = StringDict::new();
        let a = dict.get_or_insert("swap");
        let b = dict.get_or_insert("swap");
        assert!(a.ptr_eq(&b));
        assert_eq!(dict.len(), 1);
    }

    #[test]
    fn test_common_strings_present() {
        let dict = StringDict::with_common_strings();
        assert!(dict.get("length").is_some());
        assert!(dict.get("missing").is_none());
    }
}
