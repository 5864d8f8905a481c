use std::{cell::RefCell, collections::HashMap, fmt::Display};

use serde::{Deserialize, Serialize};

use super::{CompilerDisplay, CompilerDisplayError, SourceMap};

#[derive(Debug)]
pub enum StringTableError {
    NotFound,
}

impl Display for StringTableError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StringTableError::NotFound => f.write_str("StringId Not Found"),
        }
    }
}

/**
Stores a table of all distinct strings read from source code files.
The IR structures in the compiler use [`StringId`]s which map back to the
distinct string in the string table.

Adding a string which is already in the table returns the ID that was
already assigned to that string; otherwise the string is added to the
table and assigned a new unique ID.
 */
#[derive(Debug)]
pub struct StringTable {
    /// Strings in insertion order. A [`StringId`] is an index into this list.
    strings: RefCell<Vec<String>>,

    /// Table mapping raw strings to their [`StringId`]s. Used for converting
    /// strings read from source code into their [`StringId`].
    table: RefCell<HashMap<String, StringId>>,
}

impl Default for StringTable {
    fn default() -> Self {
        Self::new()
    }
}

impl StringTable {
    pub fn new() -> StringTable {
        StringTable {
            strings: RefCell::new(Vec::new()),
            table: RefCell::new(HashMap::new()),
        }
    }

    /// Inserts a string into the table and returns the assigned ID for that
    /// string value.  If the string is already in the table, then this will
    /// simply return the already assigned ID for that string.
    pub fn insert(&self, s: String) -> StringId {
        let mut table = self.table.borrow_mut();
        if let Some(id) = table.get(&s) {
            return *id;
        }
        let mut strings = self.strings.borrow_mut();
        let id = StringId(strings.len() as u32);
        strings.push(s.clone());
        table.insert(s, id);
        id
    }

    /// Search the string table for the given string and, if found, return the
    /// associated [`StringId`]. If not found, then return [`None`](Option::None).
    pub fn find(&self, s: &str) -> Option<StringId> {
        let table = self.table.borrow();
        table.get(s).copied()
    }

    /// Given an ID, if it is assigned to a string, then return the associated
    /// string, otherwise, return an error.
    pub fn get(&self, id: StringId) -> Result<String, StringTableError> {
        let strings = self.strings.borrow();
        strings
            .get(id.0 as usize)
            .cloned()
            .ok_or(StringTableError::NotFound)
    }

    /// Returns every string in the table, ordered by [`StringId`].  Used when
    /// persisting a resolved type graph so that the IDs in the graph can be
    /// mapped back to strings after reloading.
    pub fn dump(&self) -> Vec<String> {
        self.strings.borrow().clone()
    }

    /// Rebuilds a table from the output of [`StringTable::dump`].
    pub fn restore(strings: Vec<String>) -> StringTable {
        let table = strings
            .iter()
            .enumerate()
            .map(|(i, s)| (s.clone(), StringId(i as u32)))
            .collect();
        StringTable {
            strings: RefCell::new(strings),
            table: RefCell::new(table),
        }
    }
}

#[derive(Clone, Copy, PartialEq, Debug, Default, Hash, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StringId(u32);

impl StringId {
    /// Create a new String ID and initialize it to 0
    pub fn new() -> StringId {
        Self::default()
    }
}

impl CompilerDisplay for StringId {
    fn fmt(&self, _: &SourceMap, st: &StringTable) -> Result<String, CompilerDisplayError> {
        st.get(*self).map_err(|e| e.into())
    }
}

impl std::fmt::Display for StringId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_fmt(format_args!("{}", self.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_returns_same_id_for_same_string() {
        let st = StringTable::new();
        let a = st.insert("hello".into());
        let b = st.insert("world".into());
        let c = st.insert("hello".into());
        assert_eq!(a, c);
        assert_ne!(a, b);
    }

    #[test]
    fn get_returns_inserted_string() {
        let st = StringTable::new();
        let id = st.insert("thread".into());
        assert_eq!(st.get(id).unwrap(), "thread");
    }

    #[test]
    fn dump_restore_round_trip() {
        let st = StringTable::new();
        let a = st.insert("alpha".into());
        let b = st.insert("beta".into());

        let st2 = StringTable::restore(st.dump());
        assert_eq!(st2.get(a).unwrap(), "alpha");
        assert_eq!(st2.get(b).unwrap(), "beta");
        assert_eq!(st2.find("beta"), Some(b));
    }
}
