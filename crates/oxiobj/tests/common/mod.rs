// Common test utilities for integration tests
//
// This module provides the runtime fixture, a counting element free
// callback, and a small user-defined class built through the public factory.

#![allow(dead_code)]

use oxiobj::runtime::object::object_destroy;
use oxiobj::runtime::{ClassStruct, InitFn, Instance, MetaClass, Object, ObjectClass, Ref, Runtime};
use oxiobj::{Error, Result};
use std::any::Any;
use std::cell::{Cell, RefCell};
use std::ptr::{self, NonNull};

/// Creates an initialized runtime
pub fn init_runtime() -> Runtime {
    let mut runtime = Runtime::new();
    runtime.init().expect("Failed to initialize runtime");
    runtime
}

thread_local! {
    static FREED: Cell<usize> = const { Cell::new(0) };
}

/// Element free callback that counts its calls on this thread
pub fn counting_free(value: Box<dyn Any>) {
    FREED.with(|freed| freed.set(freed.get() + 1));
    drop(value);
}

/// Number of `counting_free` calls on this thread so far
pub fn freed_count() -> usize {
    FREED.with(Cell::get)
}

pub type SetReprFn = fn(&CustomRepr, &str);

/// Instance whose representation is set by the caller
#[repr(C)]
pub struct CustomRepr {
    obj: Object,
    repr: RefCell<String>,
}

/// Class of `CustomRepr`: overrides `represent` and adds `set_repr`
#[repr(C)]
pub struct CustomReprClass {
    base: ObjectClass,
    pub custom_init: Option<InitFn<CustomRepr>>,
    pub set_repr: Option<SetReprFn>,
}

unsafe impl Instance for CustomRepr {
    type Parent = Object;
    type Class = CustomReprClass;
    type Config = ();
}

unsafe impl Instance for CustomReprClass {
    type Parent = ObjectClass;
    type Class = MetaClass;
    type Config = ();
}

unsafe impl ClassStruct for CustomReprClass {
    type Super = ObjectClass;
    type Inst = CustomRepr;

    fn derive(&self, header: Object) -> Self {
        CustomReprClass {
            base: self.base.derive(header),
            custom_init: self.custom_init,
            set_repr: self.set_repr,
        }
    }

    fn inherit(parent: &ObjectClass, header: Object) -> Self {
        CustomReprClass {
            base: parent.derive(header),
            custom_init: None,
            set_repr: None,
        }
    }

    fn initializer(&self) -> Option<InitFn<CustomRepr>> {
        self.custom_init
    }
}

impl CustomRepr {
    pub fn set_repr(&self, repr: &str) -> Result<()> {
        let set_repr = self.class_struct().set_repr.ok_or(Error::NotImplemented)?;
        set_repr(self, repr);
        Ok(())
    }
}

pub fn custom_init(class: &CustomReprClass, header: Object, _config: ()) -> Result<CustomRepr> {
    let base = class.class_base();
    let init = base.initialize.ok_or(Error::NotImplemented)?;
    Ok(CustomRepr {
        obj: init(base, header, ())?,
        repr: RefCell::new(String::new()),
    })
}

pub fn custom_repr(obj: &Object) -> Result<String> {
    // SAFETY: only instances of `CustomReprClass` use this slot.
    let custom = unsafe { &*(obj as *const Object).cast::<CustomRepr>() };
    Ok(format!("Custom Wrapper message = {}", custom.repr.borrow()))
}

pub fn set_repr(obj: &CustomRepr, repr: &str) {
    *obj.repr.borrow_mut() = repr.to_owned();
}

/// # Safety
///
/// Only called as the `destroy` slot of `CustomReprClass`.
pub unsafe fn custom_destroy(obj: NonNull<Object>) {
    let this = obj.cast::<CustomRepr>().as_ptr();
    unsafe {
        ptr::drop_in_place(&raw mut (*this).repr);
        object_destroy(obj);
    }
}

/// Slot overrides of `CustomReprClass`
pub fn post_init_class(class: &mut CustomReprClass) -> Result<()> {
    let base = class.class_base_mut();
    base.set_name("TestCustomRepr");
    base.represent = custom_repr;
    base.destroy = custom_destroy;

    class.custom_init = Some(custom_init);
    class.set_repr = Some(set_repr);
    Ok(())
}

/// Builds `CustomReprClass` as a direct subclass of `Object`
pub fn create_custom_repr_class(runtime: &Runtime) -> Result<Ref<CustomReprClass>> {
    let mut class = None;
    MetaClass::new_class(
        runtime.meta_class()?,
        &mut class,
        "CustomRepr",
        runtime.object_class()?,
        post_init_class,
    )?;
    class.ok_or(Error::Internal)
}
