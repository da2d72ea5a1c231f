//! Object structures: the mapping from property name to storage slot
//!
//! An [`ObjectStructure`] assigns each own property a stable slot index (its
//! insertion position) and the [`StructureDescriptor`] describing that slot. The
//! same structure type backs runtime objects and the compiler's local variable
//! table, which is how the compiler answers "is this a plain writable slot".

use indexmap::IndexMap;
use once_cell::sync::Lazy;
use rustc_hash::{FxBuildHasher, FxHashMap};

use crate::object::ARRAY_LENGTH_ACCESSOR;
use crate::property::{PropertyName, StructureDescriptor};

/// Ordered name -> descriptor map; the position of an entry is its slot index
#[derive(Debug, Clone, Default)]
pub struct ObjectStructure {
    properties: IndexMap<PropertyName, StructureDescriptor, FxBuildHasher>,
}

impl ObjectStructure {
    pub fn new() -> Self {
        Self::default()
    }

    /// Structure pre-populated with a built-in layout
    pub fn for_layout(layout: ObjectLayout) -> Self {
        let mut structure = Self::new();
        for entry in builtin_layout(layout) {
            structure.add(PropertyName::from(entry.name), entry.descriptor);
        }
        structure
    }

    /// Slot index of `name`
    pub fn find(&self, name: &PropertyName) -> Option<usize> {
        self.properties.get_index_of(name)
    }

    /// Slot index and descriptor of `name`
    pub fn lookup(&self, name: &PropertyName) -> Option<(usize, &StructureDescriptor)> {
        self.properties
            .get_full(name)
            .map(|(slot, _, descriptor)| (slot, descriptor))
    }

    /// Name and descriptor stored at `slot`
    pub fn read(&self, slot: usize) -> Option<(&PropertyName, &StructureDescriptor)> {
        self.properties.get_index(slot)
    }

    /// Append a property and return its slot. An existing name keeps its slot and
    /// takes the new descriptor.
    pub fn add(&mut self, name: PropertyName, descriptor: StructureDescriptor) -> usize {
        self.properties.insert_full(name, descriptor).0
    }

    pub fn replace_descriptor(&mut self, slot: usize, descriptor: StructureDescriptor) -> bool {
        match self.properties.get_index_mut(slot) {
            Some((_, existing)) => {
                *existing = descriptor;
                true
            }
            None => false,
        }
    }

    /// Remove the property at `slot`. Later slots shift down by one.
    pub fn remove(&mut self, slot: usize) -> Option<(PropertyName, StructureDescriptor)> {
        self.properties.shift_remove_index(slot)
    }

    pub fn len(&self) -> usize {
        self.properties.len()
    }

    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&PropertyName, &StructureDescriptor)> {
        self.properties.iter()
    }
}

/// Built-in object shapes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectLayout {
    Plain,
    Array,
    NativeFunction,
}

/// Initial content of a layout slot
#[derive(Debug, Clone, Copy)]
pub enum InitialValue {
    Undefined,
    Number(f64),
}

#[derive(Debug, Clone, Copy)]
pub struct LayoutEntry {
    pub name: &'static str,
    pub descriptor: StructureDescriptor,
    pub initial: InitialValue,
}

static BUILTIN_LAYOUTS: Lazy<FxHashMap<ObjectLayout, Vec<LayoutEntry>>> = Lazy::new(|| {
    let mut layouts = FxHashMap::default();
    layouts.insert(ObjectLayout::Plain, Vec::new());
    layouts.insert(
        ObjectLayout::Array,
        vec![LayoutEntry {
            name: "length",
            descriptor: StructureDescriptor::native_accessor(
                &ARRAY_LENGTH_ACCESSOR,
                true,
                false,
                false,
            ),
            initial: InitialValue::Undefined,
        }],
    );
    layouts.insert(
        ObjectLayout::NativeFunction,
        vec![LayoutEntry {
            name: "length",
            descriptor: StructureDescriptor::plain_data(false, false, true),
            initial: InitialValue::Number(0.0),
        }],
    );
    layouts
});

/// Property entries every object of `layout` starts with
pub fn builtin_layout(layout: ObjectLayout) -> &'static [LayoutEntry] {
    BUILTIN_LAYOUTS
        .get(&layout)
        .map(|entries| entries.as_slice())
        .unwrap_or(&[])
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_slots_follow_insertion_order() {
        let mut s = ObjectStructure::new();
        let a = s.add(PropertyName::from("a"), StructureDescriptor::all_present());
        let b = s.add(PropertyName::from("b"), StructureDescriptor::all_present());
        assert_eq!((a, b), (0, 1));
        assert_eq!(s.find(&PropertyName::from("b")), Some(1));

        // Re-adding keeps the slot
        let again = s.add(
            PropertyName::from("a"),
            StructureDescriptor::plain_data(false, true, true),
        );
        assert_eq!(again, 0);
        assert!(!s.read(0).unwrap().1.is_writable());
    }

    #[test]
    fn test_remove_shifts_slots() {
        let mut s = ObjectStructure::new();
        s.add(PropertyName::from("a"), StructureDescriptor::all_present());
        s.add(PropertyName::from("b"), StructureDescriptor::all_present());
        s.remove(0);
        assert_eq!(s.find(&PropertyName::from("b")), Some(0));
        assert_eq!(s.len(), 1);
    }

    #[test]
    fn test_array_layout_has_native_length() {
        let s = ObjectStructure::for_layout(ObjectLayout::Array);
        let (_, desc) = s.lookup(&PropertyName::from("length")).unwrap();
        assert!(desc.is_data_property());
        assert!(!desc.is_plain_data_property());
        assert!(desc.native_accessor_data().is_some());
        assert!(!desc.is_enumerable());
    }

    #[test]
    fn test_layout_table_is_shared() {
        let first = builtin_layout(ObjectLayout::Array).as_ptr();
        let second = builtin_layout(ObjectLayout::Array).as_ptr();
        assert_eq!(first, second);
    }
}
