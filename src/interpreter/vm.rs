//! Bytecode Virtual Machine
//!
//! Executes one compiled unit. The register file holds the scratch registers
//! followed by the local slots; constant registers are read straight from the
//! chunk's constant pool and can never be written.

use tracing::trace;

use crate::compiler::{
    BytecodeChunk, Constant, ConstantIndex, Op, REGULAR_REGISTER_LIMIT, Register,
    is_constant_register, is_local_register, is_scratch_register,
};
use crate::error::JsError;
use crate::property::PropertyName;
use crate::value::{CheapClone, JsString, JsValue};

use super::{Interpreter, typeof_value};

/// Result of executing one instruction
enum OpResult {
    Continue,
    Complete(JsValue),
}

pub struct Vm<'a> {
    /// Current instruction pointer
    ip: usize,
    chunk: &'a BytecodeChunk,
    /// Scratch registers, then local slots
    registers: Vec<JsValue>,
}

impl<'a> Vm<'a> {
    pub fn new(chunk: &'a BytecodeChunk) -> Self {
        let size = chunk.register_count as usize + chunk.local_count as usize;
        Self {
            ip: 0,
            chunk,
            registers: vec![JsValue::Undefined; size],
        }
    }

    /// Run until Return, Halt or the end of the code
    pub fn run(&mut self, interp: &mut Interpreter) -> Result<JsValue, JsError> {
        loop {
            let Some(op) = self.chunk.get(self.ip).cloned() else {
                return Ok(JsValue::Undefined);
            };
            self.ip += 1;
            trace!(ip = self.ip - 1, ?op, "execute");

            match self.execute_op(interp, op)? {
                OpResult::Continue => {}
                OpResult::Complete(value) => return Ok(value),
            }
        }
    }

    /// Value of a local slot by name, for inspection after a run
    pub fn local(&self, name: &str) -> Option<JsValue> {
        let r = self.chunk.local_register(name)?;
        let index = self.register_index(r).ok()?;
        self.registers.get(index).cloned()
    }

    fn register_index(&self, r: Register) -> Result<usize, JsError> {
        let index = if is_scratch_register(r) {
            r as usize
        } else if is_local_register(r) {
            self.chunk.register_count as usize + (r - REGULAR_REGISTER_LIMIT) as usize
        } else {
            return Err(JsError::internal_error(format!(
                "register {} is not writable",
                r
            )));
        };
        if index >= self.registers.len() {
            return Err(JsError::internal_error(format!(
                "register {} outside the register file",
                r
            )));
        }
        Ok(index)
    }

    fn get_reg(&self, r: Register) -> Result<JsValue, JsError> {
        if is_constant_register(r) {
            let constant = self.chunk.constant_for_register(r).ok_or_else(|| {
                JsError::internal_error(format!("constant register {} has no constant", r))
            })?;
            return constant_value(constant);
        }
        let index = self.register_index(r)?;
        self.registers
            .get(index)
            .cloned()
            .ok_or_else(|| JsError::internal_error(format!("register {} unreadable", r)))
    }

    fn set_reg(&mut self, r: Register, value: JsValue) -> Result<(), JsError> {
        let index = self.register_index(r)?;
        if let Some(slot) = self.registers.get_mut(index) {
            *slot = value;
        }
        Ok(())
    }

    fn get_string(&self, idx: ConstantIndex) -> Result<JsString, JsError> {
        match self.chunk.get_constant(idx) {
            Some(Constant::String(s)) => Ok(s.cheap_clone()),
            other => Err(JsError::internal_error(format!(
                "expected string constant at {}, found {:?}",
                idx, other
            ))),
        }
    }

    fn range(&self, start: Register, count: u16) -> Result<Vec<JsValue>, JsError> {
        (0..count)
            .map(|i| {
                let r = start.checked_add(i).ok_or_else(|| {
                    JsError::internal_error("register range overflows")
                })?;
                self.get_reg(r)
            })
            .collect()
    }

    fn jump(&mut self, target: u32) {
        self.ip = target as usize;
    }

    fn execute_op(&mut self, interp: &mut Interpreter, op: Op) -> Result<OpResult, JsError> {
        match op {
            // ═══════════════════════════════════════════════════════════════════════════
            // Constants & Register Operations
            // ═══════════════════════════════════════════════════════════════════════════
            Op::LoadConst { dst, idx } => {
                let constant = self
                    .chunk
                    .get_constant(idx)
                    .ok_or_else(|| JsError::internal_error(format!("no constant {}", idx)))?;
                let value = constant_value(constant)?;
                self.set_reg(dst, value)?;
            }
            Op::LoadUndefined { dst } => self.set_reg(dst, JsValue::Undefined)?,
            Op::LoadNull { dst } => self.set_reg(dst, JsValue::Null)?,
            Op::LoadBool { dst, value } => self.set_reg(dst, JsValue::Boolean(value))?,
            Op::LoadInt { dst, value } => self.set_reg(dst, JsValue::Number(value as f64))?,
            Op::Move { dst, src } => {
                let value = self.get_reg(src)?;
                self.set_reg(dst, value)?;
            }

            // ═══════════════════════════════════════════════════════════════════════════
            // Binary Operations
            // ═══════════════════════════════════════════════════════════════════════════
            Op::Add { dst, left, right } => {
                let (a, b) = (self.get_reg(left)?, self.get_reg(right)?);
                self.set_reg(dst, add_values(&a, &b))?;
            }
            Op::Sub { dst, left, right } => self.arithmetic(dst, left, right, |a, b| a - b)?,
            Op::Mul { dst, left, right } => self.arithmetic(dst, left, right, |a, b| a * b)?,
            Op::Div { dst, left, right } => self.arithmetic(dst, left, right, |a, b| a / b)?,
            Op::Mod { dst, left, right } => self.arithmetic(dst, left, right, |a, b| a % b)?,
            Op::Eq { dst, left, right } => {
                let (a, b) = (self.get_reg(left)?, self.get_reg(right)?);
                self.set_reg(dst, JsValue::Boolean(a.loose_equals(&b)))?;
            }
            Op::NotEq { dst, left, right } => {
                let (a, b) = (self.get_reg(left)?, self.get_reg(right)?);
                self.set_reg(dst, JsValue::Boolean(!a.loose_equals(&b)))?;
            }
            Op::StrictEq { dst, left, right } => {
                let (a, b) = (self.get_reg(left)?, self.get_reg(right)?);
                self.set_reg(dst, JsValue::Boolean(a.strict_equals(&b)))?;
            }
            Op::StrictNotEq { dst, left, right } => {
                let (a, b) = (self.get_reg(left)?, self.get_reg(right)?);
                self.set_reg(dst, JsValue::Boolean(!a.strict_equals(&b)))?;
            }
            Op::Lt { dst, left, right } => self.compare(dst, left, right, |o| o.is_lt())?,
            Op::LtEq { dst, left, right } => self.compare(dst, left, right, |o| o.is_le())?,
            Op::Gt { dst, left, right } => self.compare(dst, left, right, |o| o.is_gt())?,
            Op::GtEq { dst, left, right } => self.compare(dst, left, right, |o| o.is_ge())?,

            // ═══════════════════════════════════════════════════════════════════════════
            // Unary Operations
            // ═══════════════════════════════════════════════════════════════════════════
            Op::Neg { dst, src } => {
                let n = self.get_reg(src)?.to_number();
                self.set_reg(dst, JsValue::Number(-n))?;
            }
            Op::ToNumber { dst, src } => {
                let n = self.get_reg(src)?.to_number();
                self.set_reg(dst, JsValue::Number(n))?;
            }
            Op::Not { dst, src } => {
                let b = self.get_reg(src)?.to_boolean();
                self.set_reg(dst, JsValue::Boolean(!b))?;
            }
            Op::Typeof { dst, src } => {
                let value = self.get_reg(src)?;
                self.set_reg(dst, JsValue::from(typeof_value(interp, &value)))?;
            }
            Op::TypeofVar { dst, name } => {
                let name = self.get_string(name)?;
                let value = interp.typeof_var(&name)?;
                self.set_reg(dst, value)?;
            }
            Op::Inc { dst, src } => {
                let n = self.get_reg(src)?.to_number();
                self.set_reg(dst, JsValue::Number(n + 1.0))?;
            }
            Op::Dec { dst, src } => {
                let n = self.get_reg(src)?.to_number();
                self.set_reg(dst, JsValue::Number(n - 1.0))?;
            }

            // ═══════════════════════════════════════════════════════════════════════════
            // Control Flow
            // ═══════════════════════════════════════════════════════════════════════════
            Op::Jump { target } => self.jump(target),
            Op::JumpIfTrue { cond, target } => {
                if self.get_reg(cond)?.to_boolean() {
                    self.jump(target);
                }
            }
            Op::JumpIfFalse { cond, target } => {
                if !self.get_reg(cond)?.to_boolean() {
                    self.jump(target);
                }
            }
            Op::JumpIfNullish { cond, target } => {
                if self.get_reg(cond)?.is_null_or_undefined() {
                    self.jump(target);
                }
            }
            Op::JumpIfNotNullish { cond, target } => {
                if !self.get_reg(cond)?.is_null_or_undefined() {
                    self.jump(target);
                }
            }

            // ═══════════════════════════════════════════════════════════════════════════
            // Variables
            // ═══════════════════════════════════════════════════════════════════════════
            Op::GetVar { dst, name } => {
                let name = self.get_string(name)?;
                let value = interp.get_var(&name)?;
                self.set_reg(dst, value)?;
            }
            Op::SetVar { name, src, strict } => {
                let name = self.get_string(name)?;
                let value = self.get_reg(src)?;
                interp.set_var(&name, value, strict)?;
            }
            Op::DeclareVar { name } => {
                let name = self.get_string(name)?;
                interp.declare_var(&name)?;
            }
            Op::InitLexical { name, src, mutable } => {
                let name = self.get_string(name)?;
                let value = self.get_reg(src)?;
                interp.init_lexical(&name, value, mutable);
            }
            Op::ThrowReferenceError { name } => {
                let name = self.get_string(name)?;
                return Err(JsError::reference_error_with_message(
                    name.as_str(),
                    format!("Cannot access '{}' before initialization", name),
                ));
            }
            Op::ThrowConstAssignment { .. } => {
                return Err(JsError::type_error("Assignment to constant variable."));
            }

            // ═══════════════════════════════════════════════════════════════════════════
            // Objects & Properties
            // ═══════════════════════════════════════════════════════════════════════════
            Op::CreateObject { dst } => {
                let id = interp.create_object()?;
                self.set_reg(dst, JsValue::Object(id))?;
            }
            Op::CreateArray { dst, start, count } => {
                let elements = self.range(start, count)?;
                let id = interp.create_array(elements)?;
                self.set_reg(dst, JsValue::Object(id))?;
            }
            Op::GetProperty { dst, obj, key } => {
                let base = self.get_reg(obj)?;
                let key = PropertyName::from_value(&self.get_reg(key)?);
                let value = interp.get_property(&base, &key)?;
                self.set_reg(dst, value)?;
            }
            Op::GetPropertyConst { dst, obj, key } => {
                let base = self.get_reg(obj)?;
                let key = PropertyName::from(self.get_string(key)?);
                let value = interp.get_property(&base, &key)?;
                self.set_reg(dst, value)?;
            }
            Op::GetIndex { dst, obj, index } => {
                let base = self.get_reg(obj)?;
                let value = interp.get_property(&base, &PropertyName::Index(index))?;
                self.set_reg(dst, value)?;
            }
            Op::SetProperty {
                obj,
                key,
                value,
                strict,
            } => {
                let base = self.get_reg(obj)?;
                let key = PropertyName::from_value(&self.get_reg(key)?);
                let value = self.get_reg(value)?;
                interp.set_value_property(&base, &key, value, strict)?;
            }
            Op::SetPropertyConst {
                obj,
                key,
                value,
                strict,
            } => {
                let base = self.get_reg(obj)?;
                let key = PropertyName::from(self.get_string(key)?);
                let value = self.get_reg(value)?;
                interp.set_value_property(&base, &key, value, strict)?;
            }
            Op::DefineProperty { obj, key, value } => {
                let key = PropertyName::from_value(&self.get_reg(key)?);
                let value = self.get_reg(value)?;
                self.define_in_literal(interp, obj, key, value)?;
            }
            Op::DefinePropertyConst { obj, key, value } => {
                let key = PropertyName::from(self.get_string(key)?);
                let value = self.get_reg(value)?;
                self.define_in_literal(interp, obj, key, value)?;
            }
            Op::RequireObjectCoercible { src } => {
                let value = self.get_reg(src)?;
                if value.is_null_or_undefined() {
                    let shown = value.to_js_string();
                    return Err(JsError::type_error(format!(
                        "Cannot destructure '{}' as it is {}.",
                        shown, shown
                    )));
                }
            }
            Op::ArrayRest { dst, src, start } => {
                let source = self.get_reg(src)?;
                let rest: Vec<JsValue> = interp
                    .array_elements(&source)?
                    .into_iter()
                    .skip(start as usize)
                    .collect();
                let id = interp.create_array(rest)?;
                self.set_reg(dst, JsValue::Object(id))?;
            }
            Op::CopyObjectExcluding {
                dst,
                src,
                excluded,
                keys_start,
                keys_count,
            } => {
                let mut skip: Vec<PropertyName> = match self.chunk.get_constant(excluded) {
                    Some(Constant::ExcludedKeys(keys)) => keys
                        .iter()
                        .map(|k| PropertyName::from(k.cheap_clone()))
                        .collect(),
                    other => {
                        return Err(JsError::internal_error(format!(
                            "expected excluded keys at {}, found {:?}",
                            excluded, other
                        )));
                    }
                };
                for key in self.range(keys_start, keys_count)? {
                    skip.push(PropertyName::from_value(&key));
                }

                let source = self.get_reg(src)?;
                let target = interp.create_object()?;
                if let JsValue::Object(source_id) = source {
                    let keys = interp.object(source_id)?.own_enumerable_keys();
                    for key in keys {
                        if skip.contains(&key) {
                            continue;
                        }
                        let value = interp.get_property(&source, &key)?;
                        interp.object_mut(target)?.create_data_property(key, value);
                    }
                }
                self.set_reg(dst, JsValue::Object(target))?;
            }

            // ═══════════════════════════════════════════════════════════════════════════
            // Calls & Completion
            // ═══════════════════════════════════════════════════════════════════════════
            Op::Call {
                dst,
                callee,
                args_start,
                argc,
            } => {
                let callee = self.get_reg(callee)?;
                let args = self.range(args_start, argc)?;
                let result = interp.call(&callee, &JsValue::Undefined, &args)?;
                self.set_reg(dst, result)?;
            }
            Op::Return { src } => return Ok(OpResult::Complete(self.get_reg(src)?)),
            Op::Halt => return Ok(OpResult::Complete(JsValue::Undefined)),
        }
        Ok(OpResult::Continue)
    }

    fn arithmetic(
        &mut self,
        dst: Register,
        left: Register,
        right: Register,
        f: impl Fn(f64, f64) -> f64,
    ) -> Result<(), JsError> {
        let a = self.get_reg(left)?.to_number();
        let b = self.get_reg(right)?.to_number();
        self.set_reg(dst, JsValue::Number(f(a, b)))
    }

    /// Relational comparison; NaN compares false against everything
    fn compare(
        &mut self,
        dst: Register,
        left: Register,
        right: Register,
        f: impl Fn(std::cmp::Ordering) -> bool,
    ) -> Result<(), JsError> {
        let (a, b) = (self.get_reg(left)?, self.get_reg(right)?);
        let ordering = match (&a, &b) {
            (JsValue::String(x), JsValue::String(y)) => Some(x.as_str().cmp(y.as_str())),
            _ => a.to_number().partial_cmp(&b.to_number()),
        };
        self.set_reg(dst, JsValue::Boolean(ordering.is_some_and(f)))
    }

    /// Object literal properties are defined, never assigned
    fn define_in_literal(
        &mut self,
        interp: &mut Interpreter,
        obj: Register,
        key: PropertyName,
        value: JsValue,
    ) -> Result<(), JsError> {
        let JsValue::Object(id) = self.get_reg(obj)? else {
            return Err(JsError::internal_error("object literal target is not an object"));
        };
        if !interp.object_mut(id)?.create_data_property(key.clone(), value) {
            return Err(JsError::type_error(format!(
                "Cannot define property '{}'",
                key.to_js_string()
            )));
        }
        Ok(())
    }
}

fn constant_value(constant: &Constant) -> Result<JsValue, JsError> {
    match constant {
        Constant::Undefined => Ok(JsValue::Undefined),
        Constant::Null => Ok(JsValue::Null),
        Constant::Boolean(b) => Ok(JsValue::Boolean(*b)),
        Constant::Number(n) => Ok(JsValue::Number(*n)),
        Constant::String(s) => Ok(JsValue::String(s.cheap_clone())),
        Constant::ExcludedKeys(_) => Err(JsError::internal_error(
            "Cannot load excluded keys as value",
        )),
    }
}

/// `+`: string concatenation when either side is a string or object, else numeric
fn add_values(a: &JsValue, b: &JsValue) -> JsValue {
    let stringy = |v: &JsValue| matches!(v, JsValue::String(_) | JsValue::Object(_));
    if stringy(a) || stringy(b) {
        let joined = format!("{}{}", a.to_js_string(), b.to_js_string());
        return JsValue::String(JsString::from(joined));
    }
    JsValue::Number(a.to_number() + b.to_number())
}
