//! Interpreter for executing compiled bytecode
//!
//! Objects live in a heap addressed by [`ObjectId`]. Script-level `let`/`const`
//! bindings live in a table beside the global object; `var` bindings and implicit
//! globals are properties of the global object. Host functions are native
//! function objects registered through [`Interpreter::register_native`].

mod vm;

pub use vm::Vm;

use rustc_hash::FxHashMap;
use tracing::{debug, trace};

use crate::ast::Program;
use crate::compiler::{BytecodeChunk, Compiler};
use crate::config::CompilerConfig;
use crate::error::JsError;
use crate::object::{JsObject, NativeFunction, ObjectKind, PropertyLookup, WriteOutcome};
use crate::property::{PresentAttributes, PropertyDescriptor, PropertyName};
use crate::string_dict::StringDict;
use crate::value::{CheapClone, JsString, JsValue, ObjectId};

/// A script-level `let` or `const` binding
#[derive(Debug, Clone)]
struct LexicalBinding {
    value: JsValue,
    mutable: bool,
}

pub struct Interpreter {
    heap: Vec<JsObject>,

    global: ObjectId,

    object_prototype: ObjectId,

    array_prototype: ObjectId,

    /// Global lexical environment
    lexical: FxHashMap<JsString, LexicalBinding>,

    /// String dictionary for interning property names
    strings: StringDict,
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new()
    }
}

impl Interpreter {
    /// Create a new interpreter with an empty global object
    pub fn new() -> Self {
        let object_prototype = ObjectId(0);
        let heap = vec![
            JsObject::ordinary(None),
            JsObject::ordinary(Some(object_prototype)),
            JsObject::ordinary(Some(object_prototype)),
        ];
        let mut interp = Self {
            heap,
            global: ObjectId(2),
            object_prototype,
            array_prototype: ObjectId(1),
            lexical: FxHashMap::default(),
            strings: StringDict::with_common_strings(),
        };
        interp.install_global_constants();
        interp
    }

    fn install_global_constants(&mut self) {
        let frozen = PresentAttributes::NON_WRITABLE
            | PresentAttributes::NON_ENUMERABLE
            | PresentAttributes::NON_CONFIGURABLE;
        let constants = [
            ("undefined", JsValue::Undefined),
            ("NaN", JsValue::Number(f64::NAN)),
            ("Infinity", JsValue::Number(f64::INFINITY)),
        ];
        for (name, value) in constants {
            let name = PropertyName::Name(self.intern(name));
            if let Ok(desc) = PropertyDescriptor::data(value, frozen)
                && let Some(global) = self.heap.get_mut(self.global.0 as usize)
            {
                global.define_own_property(name, &desc);
            }
        }
    }

    /// Intern a string using the string dictionary
    pub fn intern(&mut self, s: &str) -> JsString {
        self.strings.get_or_insert(s)
    }

    /// Compile `program` with `config` and run it
    pub fn eval(&mut self, program: &Program, config: &CompilerConfig) -> Result<JsValue, JsError> {
        let chunk = Compiler::compile_program(program, config)?;
        self.execute(&chunk)
    }

    /// Run a compiled unit to completion
    pub fn execute(&mut self, chunk: &BytecodeChunk) -> Result<JsValue, JsError> {
        debug!(
            instructions = chunk.code.len(),
            registers = chunk.register_count,
            locals = chunk.local_count,
            "executing unit"
        );
        let mut vm = Vm::new(chunk);
        vm.run(self)
    }

    // ═══════════════════════════════════════════════════════════════════════════════
    // Heap
    // ═══════════════════════════════════════════════════════════════════════════════

    pub fn alloc(&mut self, object: JsObject) -> Result<ObjectId, JsError> {
        let id = u32::try_from(self.heap.len())
            .map_err(|_| JsError::internal_error("object heap exhausted"))?;
        self.heap.push(object);
        Ok(ObjectId(id))
    }

    pub fn object(&self, id: ObjectId) -> Result<&JsObject, JsError> {
        self.heap
            .get(id.0 as usize)
            .ok_or_else(|| JsError::internal_error(format!("dangling object id {}", id.0)))
    }

    pub fn object_mut(&mut self, id: ObjectId) -> Result<&mut JsObject, JsError> {
        self.heap
            .get_mut(id.0 as usize)
            .ok_or_else(|| JsError::internal_error(format!("dangling object id {}", id.0)))
    }

    pub fn global_object(&self) -> ObjectId {
        self.global
    }

    pub fn create_object(&mut self) -> Result<ObjectId, JsError> {
        self.alloc(JsObject::ordinary(Some(self.object_prototype)))
    }

    /// Create an array from a list of values
    pub fn create_array(&mut self, elements: Vec<JsValue>) -> Result<ObjectId, JsError> {
        let id = self.alloc(JsObject::array(Some(self.array_prototype)))?;
        let array = self.object_mut(id)?;
        for (index, value) in elements.into_iter().enumerate() {
            let index = u32::try_from(index)
                .map_err(|_| JsError::internal_error("array too long"))?;
            array.create_data_property(PropertyName::Index(index), value);
        }
        Ok(id)
    }

    /// Create a native function object
    pub fn create_native_function(
        &mut self,
        name: &str,
        arity: u32,
        func: impl Fn(&mut Interpreter, &JsValue, &[JsValue]) -> Result<JsValue, JsError> + 'static,
    ) -> Result<ObjectId, JsError> {
        let function = NativeFunction {
            name: self.intern(name),
            func: std::rc::Rc::new(func),
        };
        let mut object = JsObject::native_function(function, arity);
        object.set_prototype(Some(self.object_prototype));
        self.alloc(object)
    }

    /// Register a native function as a global (writable, configurable, not enumerable)
    pub fn register_native(
        &mut self,
        name: &str,
        arity: u32,
        func: impl Fn(&mut Interpreter, &JsValue, &[JsValue]) -> Result<JsValue, JsError> + 'static,
    ) -> Result<ObjectId, JsError> {
        let id = self.create_native_function(name, arity, func)?;
        let desc = PropertyDescriptor::data(
            JsValue::Object(id),
            PresentAttributes::WRITABLE
                | PresentAttributes::NON_ENUMERABLE
                | PresentAttributes::CONFIGURABLE,
        )?;
        let key = PropertyName::Name(self.intern(name));
        self.define_property(self.global, key, &desc)?;
        Ok(id)
    }

    /// Define an own property. Returns false when the current attributes forbid it.
    pub fn define_property(
        &mut self,
        id: ObjectId,
        name: PropertyName,
        desc: &PropertyDescriptor,
    ) -> Result<bool, JsError> {
        Ok(self.object_mut(id)?.define_own_property(name, desc))
    }

    // ═══════════════════════════════════════════════════════════════════════════════
    // Property access
    // ═══════════════════════════════════════════════════════════════════════════════

    pub fn has_property(&self, id: ObjectId, name: &PropertyName) -> Result<bool, JsError> {
        let mut current = Some(id);
        while let Some(obj_id) = current {
            let obj = self.object(obj_id)?;
            if obj.has_own_property(name) {
                return Ok(true);
            }
            current = obj.prototype();
        }
        Ok(false)
    }

    /// `base[name]` for any base value
    pub fn get_property(&mut self, base: &JsValue, name: &PropertyName) -> Result<JsValue, JsError> {
        match base {
            JsValue::Undefined | JsValue::Null => Err(JsError::type_error(format!(
                "Cannot read properties of {} (reading '{}')",
                base.to_js_string(),
                name.to_js_string()
            ))),
            JsValue::Object(id) => self.get_object_property(*id, name, base),
            JsValue::String(s) => Ok(string_property(s, name)),
            JsValue::Boolean(_) | JsValue::Number(_) => Ok(JsValue::Undefined),
        }
    }

    fn get_object_property(
        &mut self,
        id: ObjectId,
        name: &PropertyName,
        receiver: &JsValue,
    ) -> Result<JsValue, JsError> {
        let mut current = Some(id);
        while let Some(obj_id) = current {
            let obj = self.object(obj_id)?;
            match obj.get_own_property(name) {
                Some(PropertyLookup::Data { value, .. }) => return Ok(value),
                Some(PropertyLookup::Accessor { getter, .. }) => {
                    return match getter {
                        Some(getter) => self.call(&getter, receiver, &[]),
                        None => Ok(JsValue::Undefined),
                    };
                }
                None => current = obj.prototype(),
            }
        }
        Ok(JsValue::Undefined)
    }

    /// Ordinary [[Set]] with the object as receiver. Returns false when the write
    /// was rejected.
    pub fn set_property(
        &mut self,
        id: ObjectId,
        name: &PropertyName,
        value: JsValue,
    ) -> Result<bool, JsError> {
        let receiver = JsValue::Object(id);
        match self.object_mut(id)?.set_own_property(name, value.cheap_clone()) {
            WriteOutcome::Written => return Ok(true),
            WriteOutcome::Rejected => return Ok(false),
            WriteOutcome::CallSetter(setter) => {
                self.call(&setter, &receiver, &[value])?;
                return Ok(true);
            }
            WriteOutcome::NotFound => {}
        }

        // Inherited setters and read-only properties govern the write too
        let mut current = self.object(id)?.prototype();
        while let Some(proto) = current {
            let obj = self.object(proto)?;
            match obj.get_own_property(name) {
                Some(PropertyLookup::Accessor {
                    setter: Some(setter),
                    ..
                }) => {
                    self.call(&setter, &receiver, &[value])?;
                    return Ok(true);
                }
                Some(PropertyLookup::Accessor { setter: None, .. }) => return Ok(false),
                Some(PropertyLookup::Data { descriptor, .. }) => {
                    if !descriptor.is_writable() {
                        return Ok(false);
                    }
                    break;
                }
                None => current = obj.prototype(),
            }
        }

        trace!(key = %name.to_js_string(), "creating property on write");
        Ok(self.object_mut(id)?.create_data_property(name.clone(), value))
    }

    /// `base[name] = value` for any base value
    pub fn set_value_property(
        &mut self,
        base: &JsValue,
        name: &PropertyName,
        value: JsValue,
        strict: bool,
    ) -> Result<(), JsError> {
        match base {
            JsValue::Undefined | JsValue::Null => Err(JsError::type_error(format!(
                "Cannot set properties of {} (setting '{}')",
                base.to_js_string(),
                name.to_js_string()
            ))),
            JsValue::Object(id) => {
                if !self.set_property(*id, name, value)? && strict {
                    return Err(JsError::type_error(format!(
                        "Cannot assign to read only property '{}' of object",
                        name.to_js_string()
                    )));
                }
                Ok(())
            }
            JsValue::Boolean(_) | JsValue::Number(_) | JsValue::String(_) => {
                if strict {
                    return Err(JsError::type_error(format!(
                        "Cannot create property '{}' on {} '{}'",
                        name.to_js_string(),
                        typeof_value(self, base),
                        base.to_js_string()
                    )));
                }
                Ok(())
            }
        }
    }

    /// Elements `0..length` of an array, or the characters of a string
    pub fn array_elements(&mut self, value: &JsValue) -> Result<Vec<JsValue>, JsError> {
        match value {
            JsValue::String(s) => Ok(s
                .as_str()
                .chars()
                .map(|c| JsValue::String(JsString::from(c.to_string())))
                .collect()),
            JsValue::Object(id) => {
                let Some(length) = self.object(*id)?.array_length() else {
                    return Err(JsError::type_error("object is not iterable"));
                };
                (0..length)
                    .map(|i| self.get_property(value, &PropertyName::Index(i)))
                    .collect()
            }
            other => Err(JsError::type_error(format!(
                "{} is not iterable",
                other.to_js_string()
            ))),
        }
    }

    /// Call a function value
    pub fn call(
        &mut self,
        callee: &JsValue,
        this: &JsValue,
        args: &[JsValue],
    ) -> Result<JsValue, JsError> {
        let JsValue::Object(id) = callee else {
            return Err(JsError::type_error(format!(
                "{} is not a function",
                callee.to_js_string()
            )));
        };
        let func = match &self.object(*id)?.kind {
            ObjectKind::NativeFunction(f) => f.func.cheap_clone(),
            _ => return Err(JsError::type_error("object is not a function")),
        };
        (*func)(self, this, args)
    }

    // ═══════════════════════════════════════════════════════════════════════════════
    // Global bindings
    // ═══════════════════════════════════════════════════════════════════════════════

    /// Current value of a global binding
    pub fn get_global(&mut self, name: &str) -> Result<JsValue, JsError> {
        let name = self.intern(name);
        self.get_var(&name)
    }

    pub(crate) fn get_var(&mut self, name: &JsString) -> Result<JsValue, JsError> {
        if let Some(binding) = self.lexical.get(name) {
            return Ok(binding.value.cheap_clone());
        }
        let key = PropertyName::from(name.cheap_clone());
        if self.has_property(self.global, &key)? {
            let global = JsValue::Object(self.global);
            return self.get_object_property(self.global, &key, &global);
        }
        Err(JsError::reference_error(name.as_str()))
    }

    pub(crate) fn typeof_var(&mut self, name: &JsString) -> Result<JsValue, JsError> {
        let key = PropertyName::from(name.cheap_clone());
        if !self.lexical.contains_key(name) && !self.has_property(self.global, &key)? {
            return Ok(JsValue::from("undefined"));
        }
        let value = self.get_var(name)?;
        Ok(JsValue::from(typeof_value(self, &value)))
    }

    /// Assignment to a name that is not a local slot
    pub(crate) fn set_var(
        &mut self,
        name: &JsString,
        value: JsValue,
        strict: bool,
    ) -> Result<(), JsError> {
        if let Some(binding) = self.lexical.get_mut(name) {
            if !binding.mutable {
                return Err(JsError::type_error("Assignment to constant variable."));
            }
            binding.value = value;
            return Ok(());
        }

        let key = PropertyName::from(name.cheap_clone());
        if self.has_property(self.global, &key)? {
            if !self.set_property(self.global, &key, value)? && strict {
                return Err(JsError::type_error(format!(
                    "Cannot assign to read only property '{}' of object",
                    name
                )));
            }
            return Ok(());
        }
        if strict {
            return Err(JsError::reference_error(name.as_str()));
        }
        trace!(name = %name, "implicit global");
        self.object_mut(self.global)?.create_data_property(key, value);
        Ok(())
    }

    pub(crate) fn declare_var(&mut self, name: &JsString) -> Result<(), JsError> {
        let key = PropertyName::from(name.cheap_clone());
        if self.lexical.contains_key(name) || self.object(self.global)?.has_own_property(&key) {
            return Ok(());
        }
        self.object_mut(self.global)?
            .create_data_property(key, JsValue::Undefined);
        Ok(())
    }

    pub(crate) fn init_lexical(&mut self, name: &JsString, value: JsValue, mutable: bool) {
        self.lexical
            .insert(name.cheap_clone(), LexicalBinding { value, mutable });
    }
}

/// `typeof value`
pub fn typeof_value(interp: &Interpreter, value: &JsValue) -> &'static str {
    match value {
        JsValue::Undefined => "undefined",
        JsValue::Null => "object",
        JsValue::Boolean(_) => "boolean",
        JsValue::Number(_) => "number",
        JsValue::String(_) => "string",
        JsValue::Object(id) => match interp.object(*id) {
            Ok(obj) if obj.is_callable() => "function",
            _ => "object",
        },
    }
}

fn string_property(s: &JsString, name: &PropertyName) -> JsValue {
    match name {
        PropertyName::Index(i) => s
            .as_str()
            .chars()
            .nth(*i as usize)
            .map(|c| JsValue::String(JsString::from(c.to_string())))
            .unwrap_or(JsValue::Undefined),
        PropertyName::Name(n) if n.as_str() == "length" => {
            JsValue::Number(s.as_str().chars().count() as f64)
        }
        PropertyName::Name(_) => JsValue::Undefined,
    }
}
