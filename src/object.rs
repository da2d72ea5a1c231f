//! Runtime objects
//!
//! A [`JsObject`] is an [`ObjectStructure`] plus a parallel vector of slot values.
//! Own-property operations live here; prototype-chain walks and accessor calls need
//! the heap and are performed by the interpreter.

use std::fmt;
use std::rc::Rc;

use crate::error::JsError;
use crate::interpreter::Interpreter;
use crate::property::{
    DescriptorValue, NativeAccessor, PropertyDescriptor, PropertyName, SlotKind,
    StructureDescriptor,
};
use crate::structure::{InitialValue, ObjectLayout, ObjectStructure, builtin_layout};
use crate::value::{CheapClone, JsString, JsValue, ObjectId};

/// Host function callable from bytecode: `(interpreter, this, arguments)`
pub type NativeFn = Rc<dyn Fn(&mut Interpreter, &JsValue, &[JsValue]) -> Result<JsValue, JsError>>;

#[derive(Clone)]
pub struct NativeFunction {
    pub name: JsString,
    pub func: NativeFn,
}

impl fmt::Debug for NativeFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[Function: {}]", self.name)
    }
}

/// Exotic behaviour attached to an object
#[derive(Debug, Clone)]
pub enum ObjectKind {
    Ordinary,
    Array { length: u32 },
    NativeFunction(NativeFunction),
}

/// Content of a storage slot
#[derive(Debug, Clone)]
enum SlotValue {
    Value(JsValue),
    Accessor {
        getter: Option<JsValue>,
        setter: Option<JsValue>,
    },
}

/// Result of an own-property lookup
#[derive(Debug, Clone)]
pub enum PropertyLookup {
    Data {
        value: JsValue,
        descriptor: StructureDescriptor,
    },
    Accessor {
        getter: Option<JsValue>,
        setter: Option<JsValue>,
        descriptor: StructureDescriptor,
    },
}

impl PropertyLookup {
    pub fn descriptor(&self) -> &StructureDescriptor {
        match self {
            PropertyLookup::Data { descriptor, .. } | PropertyLookup::Accessor { descriptor, .. } => {
                descriptor
            }
        }
    }
}

/// Outcome of an own-property write
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOutcome {
    Written,
    /// Non-writable data property, rejected native setter or missing setter
    Rejected,
    /// Accessor property: the caller must invoke this setter
    CallSetter(JsValue),
    /// No own property with that name
    NotFound,
}

#[derive(Debug, Clone)]
pub struct JsObject {
    structure: ObjectStructure,
    values: Vec<SlotValue>,
    prototype: Option<ObjectId>,
    extensible: bool,
    pub kind: ObjectKind,
}

impl JsObject {
    pub fn new(layout: ObjectLayout, kind: ObjectKind, prototype: Option<ObjectId>) -> Self {
        let values = builtin_layout(layout)
            .iter()
            .map(|entry| match entry.initial {
                InitialValue::Undefined => SlotValue::Value(JsValue::Undefined),
                InitialValue::Number(n) => SlotValue::Value(JsValue::Number(n)),
            })
            .collect();
        Self {
            structure: ObjectStructure::for_layout(layout),
            values,
            prototype,
            extensible: true,
            kind,
        }
    }

    pub fn ordinary(prototype: Option<ObjectId>) -> Self {
        Self::new(ObjectLayout::Plain, ObjectKind::Ordinary, prototype)
    }

    pub fn array(prototype: Option<ObjectId>) -> Self {
        Self::new(ObjectLayout::Array, ObjectKind::Array { length: 0 }, prototype)
    }

    pub fn native_function(function: NativeFunction, arity: u32) -> Self {
        let mut obj = Self::new(
            ObjectLayout::NativeFunction,
            ObjectKind::NativeFunction(function),
            None,
        );
        if let Some(slot) = obj.structure.find(&PropertyName::from("length"))
            && let Some(value) = obj.values.get_mut(slot)
        {
            *value = SlotValue::Value(JsValue::Number(arity as f64));
        }
        obj
    }

    pub fn structure(&self) -> &ObjectStructure {
        &self.structure
    }

    pub fn prototype(&self) -> Option<ObjectId> {
        self.prototype
    }

    pub fn set_prototype(&mut self, prototype: Option<ObjectId>) {
        self.prototype = prototype;
    }

    pub fn is_extensible(&self) -> bool {
        self.extensible
    }

    pub fn prevent_extensions(&mut self) {
        self.extensible = false;
    }

    pub fn is_callable(&self) -> bool {
        matches!(self.kind, ObjectKind::NativeFunction(_))
    }

    pub fn array_length(&self) -> Option<u32> {
        match self.kind {
            ObjectKind::Array { length } => Some(length),
            _ => None,
        }
    }

    pub fn has_own_property(&self, name: &PropertyName) -> bool {
        self.structure.find(name).is_some()
    }

    pub fn get_own_property(&self, name: &PropertyName) -> Option<PropertyLookup> {
        let slot = self.structure.find(name)?;
        self.get_own_property_at(slot)
    }

    fn get_own_property_at(&self, slot: usize) -> Option<PropertyLookup> {
        let (_, descriptor) = self.structure.read(slot)?;
        let descriptor = *descriptor;
        match (descriptor.kind(), self.values.get(slot)?) {
            (SlotKind::PlainData, SlotValue::Value(value)) => Some(PropertyLookup::Data {
                value: value.cheap_clone(),
                descriptor,
            }),
            (SlotKind::NativeAccessor(accessor), _) => Some(PropertyLookup::Data {
                value: (accessor.getter)(self),
                descriptor,
            }),
            (_, SlotValue::Accessor { getter, setter }) => Some(PropertyLookup::Accessor {
                getter: getter.clone(),
                setter: setter.clone(),
                descriptor,
            }),
            (_, SlotValue::Value(value)) => Some(PropertyLookup::Data {
                value: value.cheap_clone(),
                descriptor,
            }),
        }
    }

    /// Write an existing own property
    pub fn set_own_property(&mut self, name: &PropertyName, value: JsValue) -> WriteOutcome {
        match self.structure.find(name) {
            Some(slot) => self.set_own_property_at(slot, value),
            None => WriteOutcome::NotFound,
        }
    }

    fn set_own_property_at(&mut self, slot: usize, value: JsValue) -> WriteOutcome {
        let Some((_, descriptor)) = self.structure.read(slot) else {
            return WriteOutcome::NotFound;
        };
        let descriptor = *descriptor;
        match descriptor.kind() {
            SlotKind::Accessor => match self.values.get(slot) {
                Some(SlotValue::Accessor {
                    setter: Some(setter),
                    ..
                }) => WriteOutcome::CallSetter(setter.cheap_clone()),
                _ => WriteOutcome::Rejected,
            },
            _ if !descriptor.is_writable() => WriteOutcome::Rejected,
            SlotKind::PlainData => match self.values.get_mut(slot) {
                Some(existing) => {
                    *existing = SlotValue::Value(value);
                    WriteOutcome::Written
                }
                None => WriteOutcome::NotFound,
            },
            SlotKind::NativeAccessor(accessor) => {
                if (accessor.setter)(self, &value) {
                    WriteOutcome::Written
                } else {
                    WriteOutcome::Rejected
                }
            }
        }
    }

    /// Add a new writable, enumerable, configurable data property or overwrite an
    /// existing one through the ordinary define path
    pub fn create_data_property(&mut self, name: PropertyName, value: JsValue) -> bool {
        match PropertyDescriptor::data(value, crate::property::PresentAttributes::ALL) {
            Ok(desc) => self.define_own_property(name, &desc),
            Err(_) => false,
        }
    }

    /// Define or redefine an own property. Returns false when the definition is not
    /// permitted by the current attributes.
    pub fn define_own_property(&mut self, name: PropertyName, desc: &PropertyDescriptor) -> bool {
        match self.structure.lookup(&name).map(|(s, d)| (s, *d)) {
            None => {
                if !self.extensible {
                    return false;
                }
                if let PropertyName::Index(index) = name
                    && !self.grow_array_for_index(index)
                {
                    return false;
                }
                let slot_value = match desc.value() {
                    DescriptorValue::Data(value) => SlotValue::Value(value.cheap_clone()),
                    DescriptorValue::Accessor { getter, setter } => SlotValue::Accessor {
                        getter: getter.clone(),
                        setter: setter.clone(),
                    },
                };
                self.structure.add(name, desc.to_structure_descriptor());
                self.values.push(slot_value);
                true
            }
            Some((slot, current)) => self.redefine(slot, current, desc),
        }
    }

    fn redefine(
        &mut self,
        slot: usize,
        current: StructureDescriptor,
        desc: &PropertyDescriptor,
    ) -> bool {
        if !current.is_configurable() {
            if desc.is_configurable() {
                return false;
            }
            if desc.is_enumerable_present() && desc.is_enumerable() != current.is_enumerable() {
                return false;
            }
            if desc.is_data_property() != current.is_data_property() {
                return false;
            }
            if current.is_data_property() && !current.is_writable() {
                if desc.is_writable() {
                    return false;
                }
                let same_value = match (self.get_own_property_at(slot), desc.data_value()) {
                    (Some(PropertyLookup::Data { value, .. }), Some(new)) => value.strict_equals(new),
                    _ => false,
                };
                if !same_value {
                    return false;
                }
            }
        }

        let enumerable = if desc.is_enumerable_present() {
            desc.is_enumerable()
        } else {
            current.is_enumerable()
        };
        let configurable = if desc.is_configurable_present() {
            desc.is_configurable()
        } else {
            current.is_configurable()
        };

        match desc.value() {
            DescriptorValue::Data(value) => {
                let writable = if desc.is_writable_present() {
                    desc.is_writable()
                } else {
                    current.is_data_property() && current.is_writable()
                };
                if let Some(accessor) = current.native_accessor_data() {
                    // Native slots keep their host functions; only the value and
                    // writability change.
                    if !(accessor.setter)(self, value) {
                        return false;
                    }
                    let updated = StructureDescriptor::native_accessor(
                        accessor,
                        writable,
                        enumerable,
                        configurable,
                    );
                    return self.structure.replace_descriptor(slot, updated);
                }
                let updated = StructureDescriptor::plain_data(writable, enumerable, configurable);
                if let Some(existing) = self.values.get_mut(slot) {
                    *existing = SlotValue::Value(value.cheap_clone());
                }
                self.structure.replace_descriptor(slot, updated)
            }
            DescriptorValue::Accessor { getter, setter } => {
                let updated = StructureDescriptor::accessor(enumerable, configurable);
                if let Some(existing) = self.values.get_mut(slot) {
                    *existing = SlotValue::Accessor {
                        getter: getter.clone(),
                        setter: setter.clone(),
                    };
                }
                self.structure.replace_descriptor(slot, updated)
            }
        }
    }

    /// Make an existing data property read-only
    pub fn freeze_property(&mut self, name: &PropertyName) -> bool {
        let Some((slot, descriptor)) = self.structure.lookup(name).map(|(s, d)| (s, *d)) else {
            return false;
        };
        self.structure
            .replace_descriptor(slot, descriptor.with_writable(false))
    }

    pub fn delete_own_property(&mut self, name: &PropertyName) -> bool {
        let Some((slot, descriptor)) = self.structure.lookup(name).map(|(s, d)| (s, *d)) else {
            return true;
        };
        if !descriptor.is_configurable() {
            return false;
        }
        self.structure.remove(slot);
        if slot < self.values.len() {
            self.values.remove(slot);
        }
        true
    }

    /// Own keys: integer indices ascending, then names in insertion order
    pub fn own_keys(&self) -> Vec<PropertyName> {
        let mut indices: Vec<u32> = Vec::new();
        let mut names: Vec<PropertyName> = Vec::new();
        for (name, _) in self.structure.iter() {
            match name {
                PropertyName::Index(i) => indices.push(*i),
                PropertyName::Name(_) => names.push(name.clone()),
            }
        }
        indices.sort_unstable();
        indices
            .into_iter()
            .map(PropertyName::Index)
            .chain(names)
            .collect()
    }

    /// Own enumerable keys in [`Self::own_keys`] order
    pub fn own_enumerable_keys(&self) -> Vec<PropertyName> {
        self.own_keys()
            .into_iter()
            .filter(|name| {
                self.structure
                    .lookup(name)
                    .is_some_and(|(_, descriptor)| descriptor.is_enumerable())
            })
            .collect()
    }

    fn grow_array_for_index(&mut self, index: u32) -> bool {
        if let ObjectKind::Array { length } = &mut self.kind
            && index >= *length
        {
            let length_writable = self
                .structure
                .lookup(&PropertyName::from("length"))
                .is_some_and(|(_, d)| d.is_writable());
            if !length_writable {
                return false;
            }
            *length = index + 1;
        }
        true
    }

    fn truncate_array(&mut self, new_length: u32) -> bool {
        let doomed: Vec<PropertyName> = self
            .structure
            .iter()
            .filter_map(|(name, _)| match name {
                PropertyName::Index(i) if *i >= new_length => Some(name.clone()),
                _ => None,
            })
            .collect();
        for name in doomed {
            if !self.delete_own_property(&name) {
                return false;
            }
        }
        if let ObjectKind::Array { length } = &mut self.kind {
            *length = new_length;
        }
        true
    }
}

fn array_length_get(obj: &JsObject) -> JsValue {
    JsValue::Number(obj.array_length().unwrap_or(0) as f64)
}

fn array_length_set(obj: &mut JsObject, value: &JsValue) -> bool {
    let JsValue::Number(n) = value else {
        return false;
    };
    if n.fract() != 0.0 || *n < 0.0 || *n > u32::MAX as f64 {
        return false;
    }
    let new_length = *n as u32;
    match obj.array_length() {
        Some(current) if new_length < current => obj.truncate_array(new_length),
        Some(_) => {
            if let ObjectKind::Array { length } = &mut obj.kind {
                *length = new_length;
            }
            true
        }
        None => false,
    }
}

/// `length` of array objects
pub static ARRAY_LENGTH_ACCESSOR: NativeAccessor = NativeAccessor {
    name: "length",
    getter: array_length_get,
    setter: array_length_set,
};

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::property::PresentAttributes;

    fn data_value(obj: &JsObject, name: &str) -> Option<JsValue> {
        match obj.get_own_property(&PropertyName::from(name))? {
            PropertyLookup::Data { value, .. } => Some(value),
            PropertyLookup::Accessor { .. } => None,
        }
    }

    #[test]
    fn test_plain_data_read_write() {
        let mut obj = JsObject::ordinary(None);
        assert!(obj.create_data_property(PropertyName::from("x"), JsValue::Number(1.0)));
        assert_eq!(
            obj.set_own_property(&PropertyName::from("x"), JsValue::Number(2.0)),
            WriteOutcome::Written
        );
        assert_eq!(data_value(&obj, "x"), Some(JsValue::Number(2.0)));
    }

    #[test]
    fn test_rejected_vs_not_found() {
        let mut obj = JsObject::ordinary(None);
        let desc = PropertyDescriptor::data(
            JsValue::Number(1.0),
            PresentAttributes::NON_WRITABLE | PresentAttributes::ENUMERABLE,
        )
        .unwrap();
        assert!(obj.define_own_property(PropertyName::from("ro"), &desc));
        assert_eq!(
            obj.set_own_property(&PropertyName::from("ro"), JsValue::Number(5.0)),
            WriteOutcome::Rejected
        );
        assert_eq!(
            obj.set_own_property(&PropertyName::from("nope"), JsValue::Number(5.0)),
            WriteOutcome::NotFound
        );
        assert_eq!(data_value(&obj, "ro"), Some(JsValue::Number(1.0)));
    }

    #[test]
    fn test_array_length_native_accessor() {
        let mut arr = JsObject::array(None);
        assert!(arr.create_data_property(PropertyName::Index(0), JsValue::from("a")));
        assert!(arr.create_data_property(PropertyName::Index(4), JsValue::from("e")));
        assert_eq!(data_value(&arr, "length"), Some(JsValue::Number(5.0)));

        assert_eq!(
            arr.set_own_property(&PropertyName::from("length"), JsValue::Number(1.0)),
            WriteOutcome::Written
        );
        assert!(!arr.has_own_property(&PropertyName::Index(4)));
        assert!(arr.has_own_property(&PropertyName::Index(0)));

        assert_eq!(
            arr.set_own_property(&PropertyName::from("length"), JsValue::Number(1.5)),
            WriteOutcome::Rejected
        );
    }

    #[test]
    fn test_non_configurable_cannot_be_deleted_or_loosened() {
        let mut obj = JsObject::ordinary(None);
        let desc =
            PropertyDescriptor::data(JsValue::Null, PresentAttributes::NON_CONFIGURABLE).unwrap();
        assert!(obj.define_own_property(PropertyName::from("k"), &desc));
        assert!(!obj.delete_own_property(&PropertyName::from("k")));

        let loosen = PropertyDescriptor::data(JsValue::Null, PresentAttributes::CONFIGURABLE).unwrap();
        assert!(!obj.define_own_property(PropertyName::from("k"), &loosen));
    }

    #[test]
    fn test_accessor_without_setter_rejects() {
        let mut obj = JsObject::ordinary(None);
        let desc = PropertyDescriptor::accessor(None, None, PresentAttributes::CONFIGURABLE).unwrap();
        assert!(obj.define_own_property(PropertyName::from("acc"), &desc));
        assert_eq!(
            obj.set_own_property(&PropertyName::from("acc"), JsValue::Null),
            WriteOutcome::Rejected
        );
    }

    #[test]
    fn test_own_keys_order() {
        let mut obj = JsObject::ordinary(None);
        obj.create_data_property(PropertyName::from("b"), JsValue::Null);
        obj.create_data_property(PropertyName::Index(2), JsValue::Null);
        obj.create_data_property(PropertyName::from("a"), JsValue::Null);
        obj.create_data_property(PropertyName::Index(0), JsValue::Null);
        assert_eq!(
            obj.own_keys(),
            vec![
                PropertyName::Index(0),
                PropertyName::Index(2),
                PropertyName::from("b"),
                PropertyName::from("a"),
            ]
        );
    }

    #[test]
    fn test_non_extensible_rejects_new_properties() {
        let mut obj = JsObject::ordinary(None);
        obj.prevent_extensions();
        assert!(!obj.create_data_property(PropertyName::from("x"), JsValue::Null));
    }
}
