// mica-core - Core classes
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! The global `Object`, `Array` and `String` classes.
//!
//! These are per-thread singletons: the value model resolves field access
//! on arrays and strings through them, and codegen uses `Object` as the
//! default parent of classes without an `extends` clause. Their
//! constructors are native.

use std::rc::Rc;

use crate::error::Result;
use crate::native::NativeContext;
use crate::value::{ClassData, FieldMap, MicaVal};

use super::{arrays, strings};

struct CoreClasses {
    object: Rc<ClassData>,
    array: Rc<ClassData>,
    string: Rc<ClassData>,
}

thread_local! {
    static CORE_CLASSES: CoreClasses = build();
}

fn build() -> CoreClasses {
    let object = Rc::new(ClassData::new(
        "Object",
        None,
        FieldMap::new(),
        native_ctor("Object", &[], object_ctor),
    ));
    let array = Rc::new(ClassData::new(
        "Array",
        Some(Rc::clone(&object)),
        arrays::members(),
        native_ctor("Array", &["size"], array_ctor),
    ));
    let string = Rc::new(ClassData::new(
        "String",
        Some(Rc::clone(&object)),
        strings::members(),
        native_ctor("String", &["value"], string_ctor),
    ));
    CoreClasses {
        object,
        array,
        string,
    }
}

fn native_ctor(
    name: &str,
    params: &[&str],
    f: crate::native::NativeFn,
) -> Rc<crate::value::FunctionData> {
    let params: Vec<Rc<str>> = params.iter().map(|p| Rc::from(*p)).collect();
    match MicaVal::native(name, params, f) {
        MicaVal::Function(data) => data,
        _ => unreachable!(),
    }
}

/// The root class of every object.
pub fn object_class() -> Rc<ClassData> {
    CORE_CLASSES.with(|c| Rc::clone(&c.object))
}

/// The class answering field access on arrays.
pub fn array_class() -> Rc<ClassData> {
    CORE_CLASSES.with(|c| Rc::clone(&c.array))
}

/// The class answering field access on strings.
pub fn string_class() -> Rc<ClassData> {
    CORE_CLASSES.with(|c| Rc::clone(&c.string))
}

/// Register the core classes on `globals`.
pub fn register(globals: &MicaVal) -> Result<()> {
    globals.write_field("Object", MicaVal::Class(object_class()), true)?;
    globals.write_field("Array", MicaVal::Class(array_class()), true)?;
    globals.write_field("String", MicaVal::Class(string_class()), true)?;
    Ok(())
}

fn object_ctor(_ctx: &mut dyn NativeContext) -> Result<MicaVal> {
    Ok(MicaVal::object_of(object_class()))
}

fn array_ctor(ctx: &mut dyn NativeContext) -> Result<MicaVal> {
    if ctx.num_params() == 0 {
        return Ok(MicaVal::array(Vec::new()));
    }
    let size = ctx.get_param(0);
    let n = if size.is_integer() && size.to_double() >= 0.0 {
        size.to_double() as usize
    } else {
        0
    };
    Ok(MicaVal::array(vec![MicaVal::Null; n]))
}

fn string_ctor(ctx: &mut dyn NativeContext) -> Result<MicaVal> {
    if ctx.num_params() == 0 {
        return Ok(MicaVal::string(""));
    }
    Ok(MicaVal::string(ctx.get_param(0).to_display_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_singletons_are_shared() {
        assert!(Rc::ptr_eq(&object_class(), &object_class()));
        assert!(Rc::ptr_eq(
            array_class().parent.as_ref().unwrap(),
            &object_class()
        ));
    }

    #[test]
    fn test_member_lookup_walks_parents() {
        // Array has push; Object does not.
        assert!(array_class().find_member("push").is_some());
        assert!(object_class().find_member("push").is_none());
    }

    #[test]
    fn test_value_field_access_through_classes() {
        let arr = MicaVal::array(vec![]);
        assert_eq!(arr.read_field("push").unwrap().type_of(), "Function");

        let s = MicaVal::string("hello");
        assert_eq!(s.read_field("length").unwrap().to_double(), 5.0);
        assert_eq!(s.read_field("charAt").unwrap().type_of(), "Function");
    }
}
