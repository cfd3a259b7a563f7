//! Property storage for managed objects

use crate::heap::GcPtr;
use crate::object::Object;
use crate::value::Value;
use std::collections::HashMap;
use std::rc::Rc;

/// Attribute flags of a property
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PropertyAttributes {
    /// Assignments fail with a TypeError
    pub read_only: bool,
    /// Hidden from property iteration
    pub dont_enumerate: bool,
    /// Deletion fails
    pub dont_delete: bool,
}

impl PropertyAttributes {
    /// Writable, enumerable, deletable
    pub const NONE: PropertyAttributes = PropertyAttributes {
        read_only: false,
        dont_enumerate: false,
        dont_delete: false,
    };

    /// Attributes used for methods installed on prototypes
    pub const HIDDEN: PropertyAttributes = PropertyAttributes {
        read_only: false,
        dont_enumerate: true,
        dont_delete: false,
    };

    /// Read-only, hidden, permanent
    pub const PERMANENT: PropertyAttributes = PropertyAttributes {
        read_only: true,
        dont_enumerate: true,
        dont_delete: true,
    };

    pub fn read_only(mut self) -> Self {
        self.read_only = true;
        self
    }

    pub fn dont_enumerate(mut self) -> Self {
        self.dont_enumerate = true;
        self
    }

    pub fn dont_delete(mut self) -> Self {
        self.dont_delete = true;
        self
    }
}

/// Storage of one own property
#[derive(Debug, Clone, Copy)]
pub(crate) enum PropertyValue {
    Data(Value),
    Accessor {
        getter: Option<GcPtr>,
        setter: Option<GcPtr>,
    },
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct PropertySlot {
    pub value: PropertyValue,
    pub attributes: PropertyAttributes,
}

/// Insertion-ordered own properties
#[derive(Debug, Default)]
pub(crate) struct PropertyMap {
    entries: Vec<(Rc<str>, PropertySlot)>,
    index: HashMap<Rc<str>, usize>,
}

impl PropertyMap {
    pub fn get(&self, name: &str) -> Option<&PropertySlot> {
        self.index.get(name).map(|&i| &self.entries[i].1)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut PropertySlot> {
        match self.index.get(name) {
            Some(&i) => Some(&mut self.entries[i].1),
            None => None,
        }
    }

    /// Insert or replace, keeping the original position of an existing key
    pub fn insert(&mut self, name: &str, slot: PropertySlot) {
        if let Some(&i) = self.index.get(name) {
            self.entries[i].1 = slot;
            return;
        }
        let key: Rc<str> = Rc::from(name);
        self.index.insert(key.clone(), self.entries.len());
        self.entries.push((key, slot));
    }

    pub fn remove(&mut self, name: &str) -> Option<PropertySlot> {
        let i = self.index.remove(name)?;
        let (_, slot) = self.entries.remove(i);
        for (_, pos) in self.index.iter_mut() {
            if *pos > i {
                *pos -= 1;
            }
        }
        Some(slot)
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Rc<str>, &PropertySlot)> {
        self.entries.iter().map(|(k, v)| (k, v))
    }

    /// Every handle stored in a property, for the mark phase
    pub fn referenced(&self, out: &mut Vec<Value>) {
        for (_, slot) in &self.entries {
            match slot.value {
                PropertyValue::Data(v) => out.push(v),
                PropertyValue::Accessor { getter, setter } => {
                    out.extend(getter.map(|p| Value::Object(Object::from_ptr(p))));
                    out.extend(setter.map(|p| Value::Object(Object::from_ptr(p))));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn data(n: i32) -> PropertySlot {
        PropertySlot {
            value: PropertyValue::Data(Value::Int(n)),
            attributes: PropertyAttributes::NONE,
        }
    }

    fn names(map: &PropertyMap) -> Vec<String> {
        map.iter().map(|(k, _)| k.to_string()).collect()
    }

    #[test]
    fn test_insertion_order_survives_replace() {
        let mut map = PropertyMap::default();
        map.insert("b", data(1));
        map.insert("a", data(2));
        map.insert("b", data(3));
        assert_eq!(names(&map), vec!["b", "a"]);
        assert!(matches!(
            map.get("b").unwrap().value,
            PropertyValue::Data(Value::Int(3))
        ));
    }

    #[test]
    fn test_remove_reindexes() {
        let mut map = PropertyMap::default();
        map.insert("x", data(1));
        map.insert("y", data(2));
        map.insert("z", data(3));
        assert!(map.remove("x").is_some());
        assert!(map.remove("x").is_none());
        assert_eq!(names(&map), vec!["y", "z"]);
        assert!(matches!(
            map.get("z").unwrap().value,
            PropertyValue::Data(Value::Int(3))
        ));
        assert_eq!(map.len(), 2);
    }

    #[test]
    fn test_attribute_builders() {
        let attrs = PropertyAttributes::NONE.read_only().dont_delete();
        assert!(attrs.read_only && attrs.dont_delete && !attrs.dont_enumerate);
    }
}
