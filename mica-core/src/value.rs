// mica-core - Value types for Mica
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! Core value type for Mica.
//!
//! `MicaVal` is the central enum representing all Mica values. Reference
//! types (objects, arrays, functions, closures, classes) live in
//! reference-counted cells; dropping the last holder destroys the cell.
//! Reference cycles (closures capturing their environment, objects
//! pointing at each other) are not reclaimed - deep-freezing is the one
//! operation that guarantees an acyclic subgraph.

use std::cell::{Cell, RefCell};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;

use crate::bytecode::Routine;
use crate::error::{Error, Result};
use crate::native::NativeFn;

// ============================================================================
// Mutability
// ============================================================================

/// Mutability state of an object or array.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mutability {
    /// Fields and elements may be written.
    Mutable,
    /// No writes allowed, but reachable values may still be mutable.
    Frozen,
    /// No writes allowed and everything reachable is also deep-frozen.
    DeepFrozen,
}

// ============================================================================
// Cells
// ============================================================================

/// A named slot in an object or class: a value plus its const flag.
#[derive(Clone)]
pub struct Field {
    pub value: MicaVal,
    pub is_const: bool,
}

impl Field {
    pub fn new(value: MicaVal, is_const: bool) -> Self {
        Self { value, is_const }
    }
}

/// Ordered field map used by objects and class member tables.
pub type FieldMap = IndexMap<Rc<str>, Field>;

/// Largest array length the engine will allocate.
pub const MAX_ARRAY_LEN: usize = 1 << 27;

/// Heap cell backing an `Object` value.
pub struct ObjectCell {
    fields: RefCell<FieldMap>,
    class: RefCell<Option<Rc<ClassData>>>,
    /// Outer environment link, used only for environment objects (module
    /// globals, class constructor environments). Consulted on field-read
    /// misses before the class chain.
    outer: RefCell<Option<MicaVal>>,
    mutability: Cell<Mutability>,
}

impl ObjectCell {
    fn new(class: Option<Rc<ClassData>>) -> Self {
        Self {
            fields: RefCell::new(FieldMap::new()),
            class: RefCell::new(class),
            outer: RefCell::new(None),
            mutability: Cell::new(Mutability::Mutable),
        }
    }

    /// The object's class, if any.
    pub fn class(&self) -> Option<Rc<ClassData>> {
        self.class.borrow().clone()
    }

    /// Replace the object's class (used by `@setObjClass`).
    pub fn set_class(&self, class: Rc<ClassData>) {
        *self.class.borrow_mut() = Some(class);
    }

    /// The outer environment link, if any.
    pub fn outer(&self) -> Option<MicaVal> {
        self.outer.borrow().clone()
    }

    /// Set the outer environment link.
    pub fn set_outer(&self, outer: MicaVal) {
        *self.outer.borrow_mut() = Some(outer);
    }

    /// Current mutability.
    pub fn mutability(&self) -> Mutability {
        self.mutability.get()
    }

    /// Field names in insertion order.
    pub fn keys(&self) -> Vec<Rc<str>> {
        self.fields.borrow().keys().cloned().collect()
    }

    /// Read an own field, without walking outer or class chains.
    pub fn own_field(&self, name: &str) -> Option<MicaVal> {
        self.fields.borrow().get(name).map(|f| f.value.clone())
    }

    /// Whether an own field exists.
    pub fn has_own_field(&self, name: &str) -> bool {
        self.fields.borrow().contains_key(name)
    }
}

/// Heap cell backing an `Array` value.
pub struct ArrayCell {
    items: RefCell<Vec<MicaVal>>,
    mutability: Cell<Mutability>,
}

impl ArrayCell {
    fn new(items: Vec<MicaVal>) -> Self {
        Self {
            items: RefCell::new(items),
            mutability: Cell::new(Mutability::Mutable),
        }
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        self.items.borrow().len()
    }

    /// Whether the array is empty.
    pub fn is_empty(&self) -> bool {
        self.items.borrow().is_empty()
    }

    /// Current mutability.
    pub fn mutability(&self) -> Mutability {
        self.mutability.get()
    }

    /// Element at `index`, or `Null` when out of range.
    pub fn get(&self, index: usize) -> MicaVal {
        self.items
            .borrow()
            .get(index)
            .cloned()
            .unwrap_or(MicaVal::Null)
    }

    /// Snapshot of the elements.
    pub fn to_vec(&self) -> Vec<MicaVal> {
        self.items.borrow().clone()
    }

    fn check_mutable(&self) -> Result<()> {
        if self.mutability.get() != Mutability::Mutable {
            return Err(Error::runtime("Trying to write to a frozen array"));
        }
        Ok(())
    }

    /// Write an element, extending with nulls past the end.
    pub fn set(&self, index: usize, value: MicaVal) -> Result<()> {
        self.check_mutable()?;
        if index >= MAX_ARRAY_LEN {
            return Err(Error::runtime(format!("Invalid array index: {}", index)));
        }
        let mut items = self.items.borrow_mut();
        if index >= items.len() {
            items.resize(index + 1, MicaVal::Null);
        }
        items[index] = value;
        Ok(())
    }

    /// Append an element, returning the new length.
    pub fn push(&self, value: MicaVal) -> Result<usize> {
        self.check_mutable()?;
        let mut items = self.items.borrow_mut();
        items.push(value);
        Ok(items.len())
    }

    /// Remove and return the last element (`Null` when empty).
    pub fn pop(&self) -> Result<MicaVal> {
        self.check_mutable()?;
        Ok(self.items.borrow_mut().pop().unwrap_or(MicaVal::Null))
    }

    /// Truncate or extend to `len` (writing a shorter `length` truncates).
    pub fn set_len(&self, len: usize) -> Result<()> {
        self.check_mutable()?;
        if len > MAX_ARRAY_LEN {
            return Err(Error::runtime(format!("Invalid array length: {}", len)));
        }
        let mut items = self.items.borrow_mut();
        if len <= items.len() {
            items.truncate(len);
        } else {
            items.resize(len, MicaVal::Null);
        }
        Ok(())
    }
}

/// Function body: a compiled routine or a native function pointer.
#[derive(Clone)]
pub enum FnCode {
    Routine(Rc<Routine>),
    Native(NativeFn),
}

/// Data backing a `Function` value. Immutable after build.
pub struct FunctionData {
    pub name: String,
    pub params: Vec<Rc<str>>,
    pub code: FnCode,
}

impl FunctionData {
    /// Whether this function is implemented natively.
    pub fn is_native(&self) -> bool {
        matches!(self.code, FnCode::Native(_))
    }
}

/// Data backing a `Closure` value: a function plus its captured
/// environment, delivered as an implicit extra argument on call.
pub struct ClosureData {
    pub function: Rc<FunctionData>,
    pub env: MicaVal,
}

/// Data backing a `Class` value. Immutable after build, except for the
/// bound environment which `@setClassEnv` installs once.
pub struct ClassData {
    pub name: String,
    pub parent: Option<Rc<ClassData>>,
    pub members: FieldMap,
    pub constructor: Rc<FunctionData>,
    env: RefCell<MicaVal>,
}

impl ClassData {
    /// Create a class. The bound environment starts as `Null`.
    pub fn new(
        name: impl Into<String>,
        parent: Option<Rc<ClassData>>,
        members: FieldMap,
        constructor: Rc<FunctionData>,
    ) -> Self {
        Self {
            name: name.into(),
            parent,
            members,
            constructor,
            env: RefCell::new(MicaVal::Null),
        }
    }

    /// The bound environment passed to the constructor on instantiation.
    pub fn env(&self) -> MicaVal {
        self.env.borrow().clone()
    }

    /// Install the bound environment (`@setClassEnv`).
    pub fn set_env(&self, env: MicaVal) {
        *self.env.borrow_mut() = env;
    }

    /// Look up a member, walking the parent chain.
    pub fn find_member(&self, name: &str) -> Option<MicaVal> {
        if let Some(field) = self.members.get(name) {
            return Some(field.value.clone());
        }
        match &self.parent {
            Some(parent) => parent.find_member(name),
            None => None,
        }
    }

    /// Constructor parameter names (used for parameter inheritance).
    pub fn params(&self) -> &[Rc<str>] {
        &self.constructor.params
    }
}

// ============================================================================
// MicaVal
// ============================================================================

/// A Mica value.
#[derive(Clone)]
pub enum MicaVal {
    Null,
    Number(f64),
    Bool(bool),
    String(Rc<str>),
    Object(Rc<ObjectCell>),
    Array(Rc<ArrayCell>),
    Function(Rc<FunctionData>),
    Closure(Rc<ClosureData>),
    Class(Rc<ClassData>),
}

impl MicaVal {
    // ------------------------------------------------------------------
    // Constructors
    // ------------------------------------------------------------------

    /// New number value.
    pub fn number(v: f64) -> Self {
        MicaVal::Number(v)
    }

    /// New string value.
    pub fn string(s: impl AsRef<str>) -> Self {
        MicaVal::String(Rc::from(s.as_ref()))
    }

    /// New empty object with no class.
    pub fn object() -> Self {
        MicaVal::Object(Rc::new(ObjectCell::new(None)))
    }

    /// New empty object with the given class.
    pub fn object_of(class: Rc<ClassData>) -> Self {
        MicaVal::Object(Rc::new(ObjectCell::new(Some(class))))
    }

    /// New array holding `items`.
    pub fn array(items: Vec<MicaVal>) -> Self {
        MicaVal::Array(Rc::new(ArrayCell::new(items)))
    }

    /// New user function backed by a routine.
    pub fn function(name: impl Into<String>, params: Vec<Rc<str>>, code: Rc<Routine>) -> Self {
        MicaVal::Function(Rc::new(FunctionData {
            name: name.into(),
            params,
            code: FnCode::Routine(code),
        }))
    }

    /// New native function.
    pub fn native(name: impl Into<String>, params: Vec<Rc<str>>, f: NativeFn) -> Self {
        MicaVal::Function(Rc::new(FunctionData {
            name: name.into(),
            params,
            code: FnCode::Native(f),
        }))
    }

    /// New closure binding `env` to `function`.
    pub fn closure(function: Rc<FunctionData>, env: MicaVal) -> Self {
        MicaVal::Closure(Rc::new(ClosureData { function, env }))
    }

    // ------------------------------------------------------------------
    // Type queries
    // ------------------------------------------------------------------

    /// Variant ordinal used for cross-type comparison.
    fn ordinal(&self) -> u8 {
        match self {
            MicaVal::Null => 0,
            MicaVal::Number(_) => 1,
            MicaVal::Bool(_) => 2,
            MicaVal::String(_) => 3,
            MicaVal::Object(_) => 4,
            MicaVal::Array(_) => 5,
            MicaVal::Function(_) => 6,
            MicaVal::Closure(_) => 7,
            MicaVal::Class(_) => 8,
        }
    }

    /// Type name as seen by scripts.
    pub fn type_of(&self) -> &'static str {
        match self {
            MicaVal::Null => "null",
            MicaVal::Number(_) => "Number",
            MicaVal::Bool(_) => "Boolean",
            MicaVal::String(_) => "String",
            MicaVal::Object(_) => "Object",
            MicaVal::Array(_) => "Array",
            MicaVal::Function(_) => "Function",
            MicaVal::Closure(_) => "Closure",
            MicaVal::Class(_) => "Class",
        }
    }

    /// Whether this is `Null`.
    pub fn is_null(&self) -> bool {
        matches!(self, MicaVal::Null)
    }

    /// Whether this is a primitive (null, number, bool, string).
    pub fn is_primitive(&self) -> bool {
        self.ordinal() <= 3
    }

    // ------------------------------------------------------------------
    // Conversions
    // ------------------------------------------------------------------

    /// Truthiness.
    pub fn to_bool(&self) -> bool {
        match self {
            MicaVal::Null => false,
            MicaVal::Number(v) => *v != 0.0,
            MicaVal::Bool(b) => *b,
            MicaVal::String(s) => !s.is_empty(),
            _ => true,
        }
    }

    /// Numeric value.
    pub fn to_double(&self) -> f64 {
        match self {
            MicaVal::Null => 0.0,
            MicaVal::Number(v) => *v,
            MicaVal::Bool(b) => {
                if *b {
                    1.0
                } else {
                    0.0
                }
            }
            MicaVal::String(s) => string_to_number(s),
            _ => 0.0,
        }
    }

    /// 32-bit integer value (NaN becomes 0, out-of-range saturates).
    pub fn to_int32(&self) -> i32 {
        let v = self.to_double();
        if v.is_nan() {
            0
        } else {
            v as i32
        }
    }

    /// Whether the numeric value is a whole finite number.
    pub fn is_integer(&self) -> bool {
        let v = self.to_double();
        v.is_finite() && v.floor() == v
    }

    /// String representation (script-visible).
    pub fn to_display_string(&self) -> String {
        match self {
            MicaVal::Null => "null".to_string(),
            MicaVal::Number(v) => number_to_string(*v),
            MicaVal::Bool(b) => b.to_string(),
            MicaVal::String(s) => s.to_string(),
            MicaVal::Object(_) => "[object Object]".to_string(),
            MicaVal::Array(a) => {
                let items = a.to_vec();
                let parts: Vec<String> = items.iter().map(|v| v.to_display_string()).collect();
                parts.join(",")
            }
            MicaVal::Function(f) => {
                let params: Vec<&str> = f.params.iter().map(|p| p.as_ref()).collect();
                format!("function {} ({})", f.name, params.join(","))
            }
            MicaVal::Closure(c) => {
                let params: Vec<&str> = c.function.params.iter().map(|p| p.as_ref()).collect();
                format!("function {} ({})", c.function.name, params.join(","))
            }
            MicaVal::Class(c) => format!("class {}", c.name),
        }
    }

    // ------------------------------------------------------------------
    // Field access
    // ------------------------------------------------------------------

    /// Read a field by name.
    ///
    /// Objects consult own fields, then the outer environment chain, then
    /// the class member chain. Arrays and strings answer `length` directly
    /// and everything else through their global classes. Missing names
    /// read as `Null`.
    pub fn read_field(&self, name: &str) -> Result<MicaVal> {
        match self {
            MicaVal::Object(cell) => {
                if let Some(value) = cell.own_field(name) {
                    return Ok(value);
                }
                if let Some(outer) = cell.outer() {
                    let value = outer.read_field(name)?;
                    if !value.is_null() {
                        return Ok(value);
                    }
                }
                if let Some(class) = cell.class() {
                    if let Some(value) = class.find_member(name) {
                        return Ok(value);
                    }
                }
                Ok(MicaVal::Null)
            }
            MicaVal::Array(cell) => {
                if name == "length" {
                    return Ok(MicaVal::Number(cell.len() as f64));
                }
                Ok(crate::builtins::classes::array_class()
                    .find_member(name)
                    .unwrap_or(MicaVal::Null))
            }
            MicaVal::String(s) => {
                if name == "length" {
                    return Ok(MicaVal::Number(s.chars().count() as f64));
                }
                Ok(crate::builtins::classes::string_class()
                    .find_member(name)
                    .unwrap_or(MicaVal::Null))
            }
            MicaVal::Class(c) => Ok(c.find_member(name).unwrap_or(MicaVal::Null)),
            _ => Ok(MicaVal::Null),
        }
    }

    /// Write a field. With `is_const` set this creates a new constant and
    /// fails if the name already exists; otherwise it overwrites, failing
    /// on existing constants.
    pub fn write_field(&self, name: &str, value: MicaVal, is_const: bool) -> Result<MicaVal> {
        match self {
            MicaVal::Object(cell) => {
                if cell.mutability() != Mutability::Mutable {
                    return Err(Error::runtime("Trying to write to a frozen object"));
                }
                let mut fields = cell.fields.borrow_mut();
                if let Some(existing) = fields.get(name) {
                    if existing.is_const || is_const {
                        return Err(Error::runtime(format!(
                            "Trying to write to constant '{}'",
                            name
                        )));
                    }
                }
                fields.insert(Rc::from(name), Field::new(value.clone(), is_const));
                Ok(value)
            }
            MicaVal::Array(cell) => {
                if name == "length" {
                    let len = value.to_double();
                    if !value.is_integer() || len < 0.0 {
                        return Err(Error::runtime("Invalid array length"));
                    }
                    cell.set_len(len as usize)?;
                    return Ok(value);
                }
                Err(Error::runtime(format!(
                    "Cannot write field '{}' of an Array",
                    name
                )))
            }
            other => Err(Error::runtime(format!(
                "Cannot write field '{}' of a {}",
                name,
                other.type_of()
            ))),
        }
    }

    /// Indexed read: numeric keys index arrays (and strings), anything
    /// else is a field read by the stringified key.
    pub fn get_at(&self, key: &MicaVal) -> Result<MicaVal> {
        match self {
            MicaVal::Array(cell) => {
                if key.is_integer() {
                    let idx = key.to_double();
                    if idx < 0.0 {
                        return Ok(MicaVal::Null);
                    }
                    return Ok(cell.get(idx as usize));
                }
                self.read_field(&key_to_string(key)?)
            }
            MicaVal::String(s) => {
                if key.is_integer() {
                    let idx = key.to_double();
                    if idx < 0.0 {
                        return Ok(MicaVal::Null);
                    }
                    return Ok(match s.chars().nth(idx as usize) {
                        Some(c) => MicaVal::string(c.to_string()),
                        None => MicaVal::Null,
                    });
                }
                self.read_field(&key_to_string(key)?)
            }
            _ => self.read_field(&key_to_string(key)?),
        }
    }

    /// Indexed write, the counterpart of [`MicaVal::get_at`]. Array writes
    /// past the end extend the array with nulls.
    pub fn set_at(&self, key: &MicaVal, value: MicaVal) -> Result<MicaVal> {
        match self {
            MicaVal::Array(cell) => {
                if key.is_integer() {
                    let idx = key.to_double();
                    if idx < 0.0 {
                        return Err(Error::runtime(format!(
                            "Invalid array index: {}",
                            key.to_display_string()
                        )));
                    }
                    cell.set(idx as usize, value.clone())?;
                    return Ok(value);
                }
                self.write_field(&key_to_string(key)?, value, false)
            }
            _ => self.write_field(&key_to_string(key)?, value, false),
        }
    }

    // ------------------------------------------------------------------
    // Equality and ordering
    // ------------------------------------------------------------------

    /// Strict equality: same variant, payload equality for primitives,
    /// identity for reference types.
    pub fn strict_equals(&self, other: &MicaVal) -> bool {
        match (self, other) {
            (MicaVal::Null, MicaVal::Null) => true,
            (MicaVal::Number(a), MicaVal::Number(b)) => a == b,
            (MicaVal::Bool(a), MicaVal::Bool(b)) => a == b,
            (MicaVal::String(a), MicaVal::String(b)) => a == b,
            (MicaVal::Object(a), MicaVal::Object(b)) => Rc::ptr_eq(a, b),
            (MicaVal::Array(a), MicaVal::Array(b)) => Rc::ptr_eq(a, b),
            (MicaVal::Function(a), MicaVal::Function(b)) => Rc::ptr_eq(a, b),
            (MicaVal::Closure(a), MicaVal::Closure(b)) => Rc::ptr_eq(a, b),
            (MicaVal::Class(a), MicaVal::Class(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// Loose equality: primitives coerce through their numeric value,
    /// `null` equals only `null`, reference types compare by identity.
    pub fn loose_equals(&self, other: &MicaVal) -> bool {
        if self.ordinal() == other.ordinal() {
            return self.strict_equals(other);
        }
        if self.is_null() || other.is_null() {
            return false;
        }
        if self.is_primitive() && other.is_primitive() {
            let a = self.to_double();
            let b = other.to_double();
            return a == b;
        }
        false
    }

    /// Total ordering: variant ordinal first, then payload; reference
    /// types order by cell address.
    pub fn compare(&self, other: &MicaVal) -> Ordering {
        let ord = self.ordinal().cmp(&other.ordinal());
        if ord != Ordering::Equal {
            return ord;
        }
        match (self, other) {
            (MicaVal::Null, MicaVal::Null) => Ordering::Equal,
            (MicaVal::Number(a), MicaVal::Number(b)) => {
                a.partial_cmp(b).unwrap_or(Ordering::Equal)
            }
            (MicaVal::Bool(a), MicaVal::Bool(b)) => a.cmp(b),
            (MicaVal::String(a), MicaVal::String(b)) => a.as_ref().cmp(b.as_ref()),
            _ => self.cell_addr().cmp(&other.cell_addr()),
        }
    }

    fn cell_addr(&self) -> usize {
        match self {
            MicaVal::Object(rc) => Rc::as_ptr(rc) as usize,
            MicaVal::Array(rc) => Rc::as_ptr(rc) as usize,
            MicaVal::Function(rc) => Rc::as_ptr(rc) as usize,
            MicaVal::Closure(rc) => Rc::as_ptr(rc) as usize,
            MicaVal::Class(rc) => Rc::as_ptr(rc) as usize,
            _ => 0,
        }
    }

    /// Current mutability (primitives and callables count as deep-frozen).
    pub fn mutability(&self) -> Mutability {
        match self {
            MicaVal::Object(cell) => cell.mutability(),
            MicaVal::Array(cell) => cell.mutability(),
            _ => Mutability::DeepFrozen,
        }
    }
}

impl fmt::Display for MicaVal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_display_string())
    }
}

// Shallow debug formatting: reference types print a summary rather than
// recursing, since the heap may contain cycles.
impl fmt::Debug for MicaVal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MicaVal::Null => write!(f, "Null"),
            MicaVal::Number(v) => write!(f, "Number({})", v),
            MicaVal::Bool(b) => write!(f, "Bool({})", b),
            MicaVal::String(s) => write!(f, "String({:?})", s),
            MicaVal::Object(cell) => write!(f, "Object({} fields)", cell.fields.borrow().len()),
            MicaVal::Array(cell) => write!(f, "Array({} items)", cell.len()),
            MicaVal::Function(fun) => write!(f, "Function({})", fun.name),
            MicaVal::Closure(c) => write!(f, "Closure({})", c.function.name),
            MicaVal::Class(c) => write!(f, "Class({})", c.name),
        }
    }
}

// ============================================================================
// Freezing
// ============================================================================

/// Shallow-freeze an object or array in place. Other values pass through.
pub fn freeze(value: &MicaVal) -> MicaVal {
    match value {
        MicaVal::Object(cell) => {
            if cell.mutability.get() == Mutability::Mutable {
                cell.mutability.set(Mutability::Frozen);
            }
        }
        MicaVal::Array(cell) => {
            if cell.mutability.get() == Mutability::Mutable {
                cell.mutability.set(Mutability::Frozen);
            }
        }
        _ => {}
    }
    value.clone()
}

/// Produce a deep-frozen copy of the value.
///
/// Objects and arrays that are not already deep-frozen are cloned, their
/// contents deep-frozen recursively, and the clones marked `DeepFrozen`.
/// The memo map keeps shared sub-objects shared and terminates on cycles;
/// the result is guaranteed acyclic because a clone is registered before
/// its contents are visited.
pub fn deep_freeze(value: &MicaVal) -> Result<MicaVal> {
    let mut transformed: HashMap<usize, MicaVal> = HashMap::new();
    deep_freeze_inner(value, &mut transformed)
}

fn deep_freeze_inner(value: &MicaVal, transformed: &mut HashMap<usize, MicaVal>) -> Result<MicaVal> {
    match value {
        MicaVal::Object(cell) => {
            if cell.mutability() == Mutability::DeepFrozen {
                return Ok(value.clone());
            }
            let key = Rc::as_ptr(cell) as usize;
            if let Some(copy) = transformed.get(&key) {
                return Ok(copy.clone());
            }
            let new_cell = Rc::new(ObjectCell::new(cell.class()));
            let copy = MicaVal::Object(Rc::clone(&new_cell));
            transformed.insert(key, copy.clone());

            if let Some(outer) = cell.outer() {
                new_cell.set_outer(deep_freeze_inner(&outer, transformed)?);
            }
            {
                let source = cell.fields.borrow();
                let mut dest = new_cell.fields.borrow_mut();
                for (name, field) in source.iter() {
                    let frozen = deep_freeze_inner(&field.value, transformed)?;
                    dest.insert(Rc::clone(name), Field::new(frozen, field.is_const));
                }
            }
            new_cell.mutability.set(Mutability::DeepFrozen);
            Ok(copy)
        }
        MicaVal::Array(cell) => {
            if cell.mutability() == Mutability::DeepFrozen {
                return Ok(value.clone());
            }
            let key = Rc::as_ptr(cell) as usize;
            if let Some(copy) = transformed.get(&key) {
                return Ok(copy.clone());
            }
            let new_cell = Rc::new(ArrayCell::new(Vec::new()));
            let copy = MicaVal::Array(Rc::clone(&new_cell));
            transformed.insert(key, copy.clone());

            let items = cell.to_vec();
            {
                let mut dest = new_cell.items.borrow_mut();
                for item in &items {
                    dest.push(deep_freeze_inner(item, transformed)?);
                }
            }
            new_cell.mutability.set(Mutability::DeepFrozen);
            Ok(copy)
        }
        // Primitives and callables are immutable already.
        other => Ok(other.clone()),
    }
}

// ============================================================================
// Number formatting and parsing
// ============================================================================

/// Shortest round-trip decimal representation of a number.
pub fn number_to_string(v: f64) -> String {
    if v.is_nan() {
        return "NaN".to_string();
    }
    if v.is_infinite() {
        return if v > 0.0 { "Infinity" } else { "-Infinity" }.to_string();
    }
    if v == 0.0 {
        return "0".to_string();
    }
    format!("{}", v)
}

/// Parse a leading optional-sign decimal from a string, `NaN` on failure.
///
/// Mirrors `strtod` prefix parsing: leading whitespace is skipped, the
/// longest valid numeric prefix is used, and anything that yields no
/// digits at all is `NaN`. Octal is a lexer-level notion only and is not
/// recognised here.
pub fn string_to_number(s: &str) -> f64 {
    let t = s.trim_start();
    let bytes = t.as_bytes();
    let mut i = 0;

    if i < bytes.len() && (bytes[i] == b'+' || bytes[i] == b'-') {
        i += 1;
    }
    let int_start = i;
    while i < bytes.len() && bytes[i].is_ascii_digit() {
        i += 1;
    }
    let int_len = i - int_start;
    let mut frac_len = 0;
    if i < bytes.len() && bytes[i] == b'.' {
        i += 1;
        let frac_start = i;
        while i < bytes.len() && bytes[i].is_ascii_digit() {
            i += 1;
        }
        frac_len = i - frac_start;
    }
    if int_len == 0 && frac_len == 0 {
        return f64::NAN;
    }
    // Optional exponent; only consumed when complete.
    if i < bytes.len() && (bytes[i] == b'e' || bytes[i] == b'E') {
        let mut j = i + 1;
        if j < bytes.len() && (bytes[j] == b'+' || bytes[j] == b'-') {
            j += 1;
        }
        let exp_start = j;
        while j < bytes.len() && bytes[j].is_ascii_digit() {
            j += 1;
        }
        if j > exp_start {
            i = j;
        }
    }
    t[..i].parse::<f64>().unwrap_or(f64::NAN)
}

/// Stringify a primitive key for field access; reference keys are invalid.
pub fn key_to_string(key: &MicaVal) -> Result<String> {
    if !key.is_primitive() {
        return Err(Error::runtime(format!(
            "Invalid array index: {}",
            key.to_display_string()
        )));
    }
    Ok(match key {
        MicaVal::Number(v) => number_to_string(*v),
        other => other.to_display_string(),
    })
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_number_to_string() {
        assert_eq!(number_to_string(7.0), "7");
        assert_eq!(number_to_string(0.5), "0.5");
        assert_eq!(number_to_string(-3.25), "-3.25");
        assert_eq!(number_to_string(0.0), "0");
        assert_eq!(number_to_string(-0.0), "0");
        assert_eq!(number_to_string(f64::NAN), "NaN");
        assert_eq!(number_to_string(f64::INFINITY), "Infinity");
        assert_eq!(number_to_string(f64::NEG_INFINITY), "-Infinity");
    }

    #[test]
    fn test_string_to_number() {
        assert_eq!(string_to_number("42"), 42.0);
        assert_eq!(string_to_number("  -3.5"), -3.5);
        assert_eq!(string_to_number("1e3"), 1000.0);
        assert_eq!(string_to_number("2.5e-1"), 0.25);
        assert_eq!(string_to_number(".5"), 0.5);
        assert_eq!(string_to_number("12abc"), 12.0);
        assert!(string_to_number("abc").is_nan());
        assert!(string_to_number("").is_nan());
        assert!(string_to_number("+").is_nan());
        // No octal at runtime: leading zeros read as decimal.
        assert_eq!(string_to_number("010"), 10.0);
    }

    #[test]
    fn test_truthiness() {
        assert!(!MicaVal::Null.to_bool());
        assert!(!MicaVal::Number(0.0).to_bool());
        assert!(MicaVal::Number(2.0).to_bool());
        assert!(!MicaVal::string("").to_bool());
        assert!(MicaVal::string("x").to_bool());
        assert!(MicaVal::object().to_bool());
    }

    #[test]
    fn test_object_fields() {
        let obj = MicaVal::object();
        assert!(obj.read_field("missing").unwrap().is_null());

        obj.write_field("a", MicaVal::Number(1.0), false).unwrap();
        assert_eq!(obj.read_field("a").unwrap().to_double(), 1.0);

        obj.write_field("a", MicaVal::Number(2.0), false).unwrap();
        assert_eq!(obj.read_field("a").unwrap().to_double(), 2.0);
    }

    #[test]
    fn test_const_fields() {
        let obj = MicaVal::object();
        obj.write_field("k", MicaVal::Number(1.0), true).unwrap();

        let err = obj
            .write_field("k", MicaVal::Number(2.0), false)
            .unwrap_err();
        assert!(err.to_string().contains("Trying to write to constant"));

        // Creating a constant over an existing name also fails.
        obj.write_field("v", MicaVal::Number(1.0), false).unwrap();
        let err = obj.write_field("v", MicaVal::Number(2.0), true).unwrap_err();
        assert!(err.to_string().contains("Trying to write to constant"));
    }

    #[test]
    fn test_array_length_semantics() {
        let arr = MicaVal::array(vec![MicaVal::Number(1.0), MicaVal::Number(2.0)]);
        assert_eq!(arr.read_field("length").unwrap().to_double(), 2.0);

        // Write past the end extends with nulls.
        arr.set_at(&MicaVal::Number(4.0), MicaVal::Number(9.0)).unwrap();
        assert_eq!(arr.read_field("length").unwrap().to_double(), 5.0);
        assert!(arr.get_at(&MicaVal::Number(3.0)).unwrap().is_null());

        // Writing a shorter length truncates.
        arr.write_field("length", MicaVal::Number(1.0), false).unwrap();
        assert_eq!(arr.read_field("length").unwrap().to_double(), 1.0);
        assert!(arr.get_at(&MicaVal::Number(1.0)).unwrap().is_null());
    }

    #[test]
    fn test_indexed_access() {
        let arr = MicaVal::array(vec![MicaVal::string("a")]);
        assert_eq!(
            arr.get_at(&MicaVal::Number(0.0)).unwrap().to_display_string(),
            "a"
        );
        assert!(arr.get_at(&MicaVal::Number(5.0)).unwrap().is_null());

        let obj = MicaVal::object();
        obj.write_field("1", MicaVal::Bool(true), false).unwrap();
        assert!(obj.get_at(&MicaVal::Number(1.0)).unwrap().to_bool());

        // Reference keys are invalid.
        assert!(obj.get_at(&MicaVal::object()).is_err());
    }

    #[test]
    fn test_equality_and_compare() {
        assert!(MicaVal::Number(1.0).strict_equals(&MicaVal::Number(1.0)));
        assert!(!MicaVal::Number(1.0).strict_equals(&MicaVal::string("1")));
        assert!(MicaVal::Number(1.0).loose_equals(&MicaVal::string("1")));
        assert!(!MicaVal::Null.loose_equals(&MicaVal::Number(0.0)));

        let a = MicaVal::object();
        let b = MicaVal::object();
        assert!(a.strict_equals(&a.clone()));
        assert!(!a.strict_equals(&b));

        // Cross-variant ordering follows the variant ordinal.
        assert_eq!(
            MicaVal::Null.compare(&MicaVal::Number(0.0)),
            Ordering::Less
        );
        assert_eq!(
            MicaVal::string("a").compare(&MicaVal::string("b")),
            Ordering::Less
        );
    }

    #[test]
    fn test_deep_freeze() {
        let inner = MicaVal::object();
        inner.write_field("x", MicaVal::Number(1.0), false).unwrap();
        let outer = MicaVal::object();
        outer.write_field("inner", inner.clone(), false).unwrap();

        let frozen = deep_freeze(&outer).unwrap();
        assert_eq!(frozen.mutability(), Mutability::DeepFrozen);
        let frozen_inner = frozen.read_field("inner").unwrap();
        assert_eq!(frozen_inner.mutability(), Mutability::DeepFrozen);
        assert!(frozen_inner
            .write_field("x", MicaVal::Number(2.0), false)
            .is_err());

        // The original graph is untouched.
        assert_eq!(outer.mutability(), Mutability::Mutable);
        inner.write_field("x", MicaVal::Number(3.0), false).unwrap();
        assert_eq!(frozen_inner.read_field("x").unwrap().to_double(), 1.0);
    }

    #[test]
    fn test_deep_freeze_cycle() {
        let a = MicaVal::object();
        let b = MicaVal::object();
        a.write_field("b", b.clone(), false).unwrap();
        b.write_field("a", a.clone(), false).unwrap();

        // Must terminate; the copies stay shared.
        let frozen = deep_freeze(&a).unwrap();
        let fb = frozen.read_field("b").unwrap();
        let fa = fb.read_field("a").unwrap();
        assert!(fa.strict_equals(&frozen));
    }

    #[test]
    fn test_shallow_freeze() {
        let obj = MicaVal::object();
        freeze(&obj);
        assert_eq!(obj.mutability(), Mutability::Frozen);
        assert!(obj.write_field("x", MicaVal::Null, false).is_err());
    }
}
