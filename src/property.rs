//! Property names and descriptors
//!
//! A [`PropertyDescriptor`] is the request form used when defining a property: every
//! attribute may be present or absent. A [`StructureDescriptor`] is the resolved form
//! stored next to a storage slot, where every attribute has a definite value.

use bitflags::bitflags;

use crate::error::JsError;
use crate::object::JsObject;
use crate::value::{CheapClone, JsString, JsValue, number_to_js_string};

/// Key of an own property: integer index or string name
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PropertyName {
    Index(u32),
    Name(JsString),
}

impl PropertyName {
    /// Convert a runtime key value (ToPropertyKey for primitives).
    ///
    /// Integral numbers and canonical numeric strings in array-index range take the
    /// integer path; everything else is keyed by its string form.
    pub fn from_value(value: &JsValue) -> Self {
        match value {
            JsValue::Number(n) => {
                if let Some(index) = as_array_index(*n) {
                    return PropertyName::Index(index);
                }
                PropertyName::Name(number_to_js_string(*n))
            }
            JsValue::String(s) => PropertyName::from(s.cheap_clone()),
            other => PropertyName::Name(other.to_js_string()),
        }
    }

    pub fn is_index(&self) -> bool {
        matches!(self, PropertyName::Index(_))
    }

    /// Canonical string form, materialized only on request
    pub fn to_js_string(&self) -> JsString {
        match self {
            PropertyName::Index(i) => JsString::from(i.to_string()),
            PropertyName::Name(s) => s.cheap_clone(),
        }
    }

    pub fn to_value(&self) -> JsValue {
        match self {
            PropertyName::Index(i) => JsValue::Number(*i as f64),
            PropertyName::Name(s) => JsValue::String(s.cheap_clone()),
        }
    }
}

impl From<JsString> for PropertyName {
    fn from(s: JsString) -> Self {
        match parse_canonical_index(s.as_str()) {
            Some(index) => PropertyName::Index(index),
            None => PropertyName::Name(s),
        }
    }
}

impl From<&str> for PropertyName {
    fn from(s: &str) -> Self {
        PropertyName::from(JsString::from(s))
    }
}

impl From<u32> for PropertyName {
    fn from(index: u32) -> Self {
        PropertyName::Index(index)
    }
}

fn as_array_index(n: f64) -> Option<u32> {
    if n.fract() == 0.0 && n >= 0.0 && n < u32::MAX as f64 && !(n == 0.0 && n.is_sign_negative())
    {
        Some(n as u32)
    } else {
        None
    }
}

fn parse_canonical_index(s: &str) -> Option<u32> {
    if s.is_empty() || (s.len() > 1 && s.starts_with('0')) {
        return None;
    }
    if !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse::<u32>().ok().filter(|i| *i != u32::MAX)
}

bitflags! {
    /// Which attributes a descriptor carries, and with which polarity
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct PresentAttributes: u8 {
        const WRITABLE = 1 << 1;
        const ENUMERABLE = 1 << 2;
        const CONFIGURABLE = 1 << 3;
        const NON_WRITABLE = 1 << 4;
        const NON_ENUMERABLE = 1 << 5;
        const NON_CONFIGURABLE = 1 << 6;
        const ALL = Self::WRITABLE.bits() | Self::ENUMERABLE.bits() | Self::CONFIGURABLE.bits();
    }
}

/// Value part of a descriptor
#[derive(Debug, Clone)]
pub enum DescriptorValue {
    Data(JsValue),
    Accessor {
        getter: Option<JsValue>,
        setter: Option<JsValue>,
    },
}

/// A property definition request
///
/// Construction validates the attribute set, so a value of this type is always
/// internally consistent.
#[derive(Debug, Clone)]
pub struct PropertyDescriptor {
    value: DescriptorValue,
    attributes: PresentAttributes,
}

impl PropertyDescriptor {
    /// Plain data property
    pub fn data(value: JsValue, attributes: PresentAttributes) -> Result<Self, JsError> {
        Self::new(DescriptorValue::Data(value), attributes)
    }

    /// Accessor property; attributes must not mention writability
    pub fn accessor(
        getter: Option<JsValue>,
        setter: Option<JsValue>,
        attributes: PresentAttributes,
    ) -> Result<Self, JsError> {
        Self::new(DescriptorValue::Accessor { getter, setter }, attributes)
    }

    pub fn new(value: DescriptorValue, attributes: PresentAttributes) -> Result<Self, JsError> {
        check_attributes(matches!(value, DescriptorValue::Data(_)), attributes)?;
        Ok(Self { value, attributes })
    }

    pub fn value(&self) -> &DescriptorValue {
        &self.value
    }

    pub fn attributes(&self) -> PresentAttributes {
        self.attributes
    }

    pub fn is_data_property(&self) -> bool {
        matches!(self.value, DescriptorValue::Data(_))
    }

    pub fn data_value(&self) -> Option<&JsValue> {
        match &self.value {
            DescriptorValue::Data(v) => Some(v),
            DescriptorValue::Accessor { .. } => None,
        }
    }

    pub fn is_writable_present(&self) -> bool {
        self.attributes
            .intersects(PresentAttributes::WRITABLE | PresentAttributes::NON_WRITABLE)
    }

    pub fn is_enumerable_present(&self) -> bool {
        self.attributes
            .intersects(PresentAttributes::ENUMERABLE | PresentAttributes::NON_ENUMERABLE)
    }

    pub fn is_configurable_present(&self) -> bool {
        self.attributes
            .intersects(PresentAttributes::CONFIGURABLE | PresentAttributes::NON_CONFIGURABLE)
    }

    pub fn is_writable(&self) -> bool {
        self.attributes.contains(PresentAttributes::WRITABLE)
    }

    pub fn is_enumerable(&self) -> bool {
        self.attributes.contains(PresentAttributes::ENUMERABLE)
    }

    pub fn is_configurable(&self) -> bool {
        self.attributes.contains(PresentAttributes::CONFIGURABLE)
    }

    pub fn is_data_writable_enumerable_configurable(&self) -> bool {
        self.is_data_property() && self.is_writable() && self.is_enumerable() && self.is_configurable()
    }

    pub fn set_writable(&mut self, writable: bool) -> Result<(), JsError> {
        let next = with_polarity(
            self.attributes,
            PresentAttributes::WRITABLE,
            PresentAttributes::NON_WRITABLE,
            writable,
        );
        check_attributes(self.is_data_property(), next)?;
        self.attributes = next;
        Ok(())
    }

    pub fn set_enumerable(&mut self, enumerable: bool) {
        self.attributes = with_polarity(
            self.attributes,
            PresentAttributes::ENUMERABLE,
            PresentAttributes::NON_ENUMERABLE,
            enumerable,
        );
    }

    pub fn set_configurable(&mut self, configurable: bool) {
        self.attributes = with_polarity(
            self.attributes,
            PresentAttributes::CONFIGURABLE,
            PresentAttributes::NON_CONFIGURABLE,
            configurable,
        );
    }

    /// Resolve into the stored form; absent attributes default to false
    pub fn to_structure_descriptor(&self) -> StructureDescriptor {
        match self.value {
            DescriptorValue::Data(_) => StructureDescriptor::plain_data(
                self.is_writable(),
                self.is_enumerable(),
                self.is_configurable(),
            ),
            DescriptorValue::Accessor { .. } => {
                StructureDescriptor::accessor(self.is_enumerable(), self.is_configurable())
            }
        }
    }
}

fn with_polarity(
    attributes: PresentAttributes,
    positive: PresentAttributes,
    negative: PresentAttributes,
    value: bool,
) -> PresentAttributes {
    let cleared = attributes - positive - negative;
    if value {
        cleared | positive
    } else {
        cleared | negative
    }
}

fn check_attributes(is_data: bool, attributes: PresentAttributes) -> Result<(), JsError> {
    let pairs = [
        (PresentAttributes::WRITABLE, PresentAttributes::NON_WRITABLE, "writable"),
        (PresentAttributes::ENUMERABLE, PresentAttributes::NON_ENUMERABLE, "enumerable"),
        (
            PresentAttributes::CONFIGURABLE,
            PresentAttributes::NON_CONFIGURABLE,
            "configurable",
        ),
    ];
    for (positive, negative, name) in pairs {
        if attributes.contains(positive | negative) {
            return Err(JsError::invalid_descriptor(format!(
                "both {} and non-{} are present",
                name, name
            )));
        }
    }
    if !is_data
        && attributes.intersects(PresentAttributes::WRITABLE | PresentAttributes::NON_WRITABLE)
    {
        return Err(JsError::invalid_descriptor(
            "accessor descriptor cannot carry a writable attribute",
        ));
    }
    Ok(())
}

/// Host functions backing a native accessor data property
#[derive(Debug)]
pub struct NativeAccessor {
    pub name: &'static str,
    pub getter: fn(&JsObject) -> JsValue,
    /// Returns false when the write is rejected
    pub setter: fn(&mut JsObject, &JsValue) -> bool,
}

/// How a slot's value is produced
#[derive(Debug, Clone, Copy)]
pub enum SlotKind {
    /// The slot holds the value
    PlainData,
    /// Data property whose reads and writes go through host functions
    NativeAccessor(&'static NativeAccessor),
    /// The slot holds a getter/setter pair
    Accessor,
}

/// Attributes stored alongside a storage slot
#[derive(Debug, Clone, Copy)]
pub struct StructureDescriptor {
    writable: bool,
    enumerable: bool,
    configurable: bool,
    kind: SlotKind,
}

impl StructureDescriptor {
    pub const fn plain_data(writable: bool, enumerable: bool, configurable: bool) -> Self {
        Self {
            writable,
            enumerable,
            configurable,
            kind: SlotKind::PlainData,
        }
    }

    /// Writable, enumerable, configurable plain data
    pub const fn all_present() -> Self {
        Self::plain_data(true, true, true)
    }

    pub const fn native_accessor(
        accessor: &'static NativeAccessor,
        writable: bool,
        enumerable: bool,
        configurable: bool,
    ) -> Self {
        Self {
            writable,
            enumerable,
            configurable,
            kind: SlotKind::NativeAccessor(accessor),
        }
    }

    pub const fn accessor(enumerable: bool, configurable: bool) -> Self {
        Self {
            writable: false,
            enumerable,
            configurable,
            kind: SlotKind::Accessor,
        }
    }

    pub fn kind(&self) -> SlotKind {
        self.kind
    }

    pub fn is_data_property(&self) -> bool {
        !matches!(self.kind, SlotKind::Accessor)
    }

    pub fn is_plain_data_property(&self) -> bool {
        matches!(self.kind, SlotKind::PlainData)
    }

    pub fn native_accessor_data(&self) -> Option<&'static NativeAccessor> {
        match self.kind {
            SlotKind::NativeAccessor(accessor) => Some(accessor),
            _ => None,
        }
    }

    pub fn is_writable(&self) -> bool {
        self.writable
    }

    pub fn is_enumerable(&self) -> bool {
        self.enumerable
    }

    pub fn is_configurable(&self) -> bool {
        self.configurable
    }

    pub fn is_data_writable_enumerable_configurable(&self) -> bool {
        self.is_plain_data_property() && self.writable && self.enumerable && self.configurable
    }

    pub(crate) fn with_writable(mut self, writable: bool) -> Self {
        if self.is_data_property() {
            self.writable = writable;
        }
        self
    }
}
