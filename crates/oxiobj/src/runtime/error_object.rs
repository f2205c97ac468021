//! The `Error` class and its `IndexError` subclass.
//!
//! An error instance carries a message. `Error` adds `msg`/`set_msg` slots
//! and overrides `represent`, `copy` and `compare`; `IndexError` extends the
//! instance with the offending index and builds its message from it.

use crate::error::{Error, Result};
use crate::runtime::class::{ClassStruct, InitFn, ObjectClass};
use crate::runtime::meta::MetaClass;
use crate::runtime::object::{Instance, Object, Ref, new_instance, object_destroy};
use std::cell::RefCell;
use std::cmp::Ordering;
use std::fmt;
use std::ptr::{self, NonNull};

/// Message used when an error is created without one.
pub const DEFAULT_ERROR_MSG: &str = "No error";

/// Reads an error's message.
pub type MsgFn = fn(&ErrorObject) -> String;

/// Replaces an error's message.
pub type SetMsgFn = fn(&ErrorObject, &str);

/// Descriptor of the `Error` class and its descendants.
#[repr(C)]
pub struct ErrorClass {
    base: ObjectClass,
    /// Initializes the error level of an instance.
    pub error_init: Option<InitFn<ErrorObject>>,
    /// Returns the message.
    pub msg: Option<MsgFn>,
    /// Replaces the message.
    pub set_msg: Option<SetMsgFn>,
}

/// An instance of `Error`.
#[repr(C)]
pub struct ErrorObject {
    obj: Object,
    msg: RefCell<String>,
}

/// Construction arguments of an `Error` instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorConfig {
    /// The initial message.
    pub msg: String,
}

impl ErrorConfig {
    /// An error configuration with `msg` as its message.
    pub fn new(msg: impl Into<String>) -> Self {
        ErrorConfig { msg: msg.into() }
    }
}

impl Default for ErrorConfig {
    fn default() -> Self {
        ErrorConfig::new(DEFAULT_ERROR_MSG)
    }
}

// SAFETY: `ErrorObject` is `#[repr(C)]` and starts with `Object`.
unsafe impl Instance for ErrorObject {
    type Parent = Object;
    type Class = ErrorClass;
    type Config = ErrorConfig;
}

// SAFETY: `ErrorClass` is an instance of the meta-class.
unsafe impl Instance for ErrorClass {
    type Parent = ObjectClass;
    type Class = MetaClass;
    type Config = ();
}

// SAFETY: `ErrorClass` is `#[repr(C)]` and starts with `ObjectClass`; the
// appended slots are function pointers.
unsafe impl ClassStruct for ErrorClass {
    type Super = ObjectClass;
    type Inst = ErrorObject;

    fn derive(&self, header: Object) -> Self {
        ErrorClass {
            base: self.base.derive(header),
            error_init: self.error_init,
            msg: self.msg,
            set_msg: self.set_msg,
        }
    }

    fn inherit(parent: &ObjectClass, header: Object) -> Self {
        ErrorClass {
            base: parent.derive(header),
            error_init: None,
            msg: None,
            set_msg: None,
        }
    }

    fn initializer(&self) -> Option<InitFn<ErrorObject>> {
        self.error_init
    }
}

impl ErrorObject {
    /// Returns the message through the `msg` slot.
    ///
    /// # Errors
    ///
    /// [`Error::NotImplemented`] when the class has no `msg` slot.
    pub fn msg(&self) -> Result<String> {
        let msg = self.class_struct().msg.ok_or(Error::NotImplemented)?;
        Ok(msg(self))
    }

    /// Replaces the message through the `set_msg` slot.
    ///
    /// # Errors
    ///
    /// [`Error::NotImplemented`] when the class has no `set_msg` slot.
    pub fn set_msg(&self, msg: &str) -> Result<()> {
        let set_msg = self.class_struct().set_msg.ok_or(Error::NotImplemented)?;
        set_msg(self, msg);
        Ok(())
    }
}

impl fmt::Debug for ErrorObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ErrorObject")
            .field("class", &self.obj.class().name())
            .field("msg", &self.msg.borrow())
            .finish()
    }
}

fn error_init(class: &ErrorClass, header: Object, config: ErrorConfig) -> Result<ErrorObject> {
    let init = class.base.initialize.ok_or(Error::NotImplemented)?;
    let obj = init(&class.base, header, ())?;
    Ok(ErrorObject {
        obj,
        msg: RefCell::new(config.msg),
    })
}

fn error_msg(error: &ErrorObject) -> String {
    error.msg.borrow().clone()
}

fn error_set_msg(error: &ErrorObject, msg: &str) {
    *error.msg.borrow_mut() = msg.to_owned();
}

unsafe fn error_destroy(obj: NonNull<Object>) {
    let this = obj.cast::<ErrorObject>().as_ptr();
    // SAFETY: the count reached zero; the message is dropped once, then the
    // header level finishes the chain.
    unsafe {
        ptr::drop_in_place(&raw mut (*this).msg);
        object_destroy(obj);
    }
}

fn error_represent(obj: &Object) -> Result<String> {
    // SAFETY: only instances of `Error` and its descendants use this slot.
    let error = unsafe { obj.cast_unchecked::<ErrorObject>() };
    Ok(format!("{}: {}", obj.class().name(), error.msg()?))
}

fn error_copy(obj: &Object) -> Result<Ref<Object>> {
    // SAFETY: only instances of `Error` and its descendants use this slot.
    let error = unsafe { obj.cast_unchecked::<ErrorObject>() };
    let copy = new_instance(error.class_struct(), ErrorConfig::new(error.msg()?))?;
    Ok(copy.into_object())
}

fn error_compare(a: &Object, b: &Object) -> Result<Ordering> {
    if !ptr::eq(a.class(), b.class()) {
        return Err(Error::Incomparable);
    }
    // SAFETY: both share a class that uses this slot.
    let (a, b) = unsafe {
        (
            a.cast_unchecked::<ErrorObject>(),
            b.cast_unchecked::<ErrorObject>(),
        )
    };
    Ok(a.msg()?.cmp(&b.msg()?))
}

/// Slot overrides of the `Error` class.
pub(crate) fn error_class_init(class: &mut ErrorClass) -> Result<()> {
    let base = class.class_base_mut();
    base.destroy = error_destroy;
    base.represent = error_represent;
    base.copy = Some(error_copy);
    base.compare = Some(error_compare);

    class.error_init = Some(error_init);
    class.msg = Some(error_msg);
    class.set_msg = Some(error_set_msg);
    Ok(())
}

/// Descriptor of the `IndexError` class.
#[repr(C)]
pub struct IndexErrorClass {
    base: ErrorClass,
    /// Initializes the index level of an instance.
    pub index_error_init: Option<InitFn<IndexError>>,
}

/// An error reporting an out-of-range index.
#[repr(C)]
pub struct IndexError {
    base: ErrorObject,
    index: usize,
}

// SAFETY: `IndexError` is `#[repr(C)]` and starts with `ErrorObject`.
unsafe impl Instance for IndexError {
    type Parent = ErrorObject;
    type Class = IndexErrorClass;
    type Config = usize;
}

// SAFETY: `IndexErrorClass` is an instance of the meta-class.
unsafe impl Instance for IndexErrorClass {
    type Parent = ErrorClass;
    type Class = MetaClass;
    type Config = ();
}

// SAFETY: `IndexErrorClass` is `#[repr(C)]` and starts with `ErrorClass`.
unsafe impl ClassStruct for IndexErrorClass {
    type Super = ErrorClass;
    type Inst = IndexError;

    fn derive(&self, header: Object) -> Self {
        IndexErrorClass {
            base: self.base.derive(header),
            index_error_init: self.index_error_init,
        }
    }

    fn inherit(parent: &ErrorClass, header: Object) -> Self {
        IndexErrorClass {
            base: parent.derive(header),
            index_error_init: None,
        }
    }

    fn initializer(&self) -> Option<InitFn<IndexError>> {
        self.index_error_init
    }
}

impl IndexErrorClass {
    /// Returns the `Error` part of the descriptor.
    #[must_use]
    pub fn error_class(&self) -> &ErrorClass {
        &self.base
    }
}

impl IndexError {
    /// Returns the offending index.
    #[must_use]
    pub fn index(&self) -> usize {
        self.index
    }

    /// Returns the error part of the instance.
    #[must_use]
    pub fn as_error(&self) -> &ErrorObject {
        &self.base
    }
}

impl fmt::Debug for IndexError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IndexError")
            .field("index", &self.index)
            .field("msg", &self.base.msg.borrow())
            .finish()
    }
}

fn index_error_msg(index: usize) -> String {
    format!("index {index} is out of range")
}

fn index_error_init(class: &IndexErrorClass, header: Object, index: usize) -> Result<IndexError> {
    let init = class.base.error_init.ok_or(Error::NotImplemented)?;
    let base = init(&class.base, header, ErrorConfig::new(index_error_msg(index)))?;
    Ok(IndexError { base, index })
}

fn index_error_copy(obj: &Object) -> Result<Ref<Object>> {
    // SAFETY: only instances of `IndexError` and its descendants use this slot.
    let error = unsafe { obj.cast_unchecked::<IndexError>() };
    let copy = new_instance(error.class_struct(), error.index)?;
    copy.base.set_msg(&error.base.msg()?)?;
    Ok(copy.into_object())
}

/// Slot overrides of the `IndexError` class.
pub(crate) fn index_error_class_init(class: &mut IndexErrorClass) -> Result<()> {
    class.class_base_mut().copy = Some(index_error_copy);
    class.index_error_init = Some(index_error_init);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::Runtime;

    fn runtime() -> Runtime {
        let mut runtime = Runtime::new();
        runtime.init().unwrap();
        runtime
    }

    #[test]
    fn test_default_message() {
        let runtime = runtime();
        let error = runtime.new_error().unwrap();

        assert_eq!(error.msg().unwrap(), DEFAULT_ERROR_MSG);
        assert_eq!(error.as_object().represent().unwrap(), "Error: No error");
    }

    #[test]
    fn test_set_message() {
        let runtime = runtime();
        let error = runtime.new_error().unwrap();

        error.set_msg("disk full").unwrap();
        assert_eq!(error.msg().unwrap(), "disk full");
    }

    #[test]
    fn test_copy_is_independent() {
        let runtime = runtime();
        let error = runtime.new_error_msg("original").unwrap();

        let copy = error
            .as_object()
            .copy()
            .unwrap()
            .downcast(runtime.error_class().unwrap())
            .unwrap();
        assert!(!Ref::ptr_eq(&error, &copy));
        assert_eq!(copy.msg().unwrap(), "original");

        copy.set_msg("changed").unwrap();
        assert_eq!(error.msg().unwrap(), "original");
    }

    #[test]
    fn test_compare_by_message() {
        let runtime = runtime();
        let a = runtime.new_error_msg("alpha").unwrap();
        let b = runtime.new_error_msg("beta").unwrap();

        assert_eq!(a.as_object().compare(b.as_object()), Ok(Ordering::Less));
        assert_eq!(b.as_object().compare(a.as_object()), Ok(Ordering::Greater));
        assert_eq!(a.as_object().compare(a.as_object()), Ok(Ordering::Equal));
    }

    #[test]
    fn test_compare_across_classes() {
        let runtime = runtime();
        let error = runtime.new_error_msg("index 3 is out of range").unwrap();
        let index_error = runtime.new_index_error(3).unwrap();

        assert_eq!(
            error.as_object().compare(index_error.as_object()),
            Err(Error::Incomparable)
        );
    }

    #[test]
    fn test_index_error_message() {
        let runtime = runtime();
        let error = runtime.new_index_error(42).unwrap();

        assert_eq!(error.index(), 42);
        assert_eq!(error.as_error().msg().unwrap(), "index 42 is out of range");
        assert_eq!(
            error.as_object().represent().unwrap(),
            "IndexError: index 42 is out of range"
        );
    }

    #[test]
    fn test_index_error_copy_keeps_index() {
        let runtime = runtime();
        let error = runtime.new_index_error(7).unwrap();
        error.as_error().set_msg("custom").unwrap();

        let copy = error
            .as_object()
            .copy()
            .unwrap()
            .downcast(runtime.index_error_class().unwrap())
            .unwrap();
        assert_eq!(copy.index(), 7);
        assert_eq!(copy.as_error().msg().unwrap(), "custom");
    }

    #[test]
    fn test_index_error_inherits_error_slots() {
        let runtime = runtime();
        let error = runtime.error_class().unwrap();
        let index_error = runtime.index_error_class().unwrap();

        let inherited = index_error.error_class();
        assert!(inherited.msg.is_some());
        assert!(std::ptr::fn_addr_eq(
            inherited.class_base().represent,
            error.class_base().represent
        ));
        assert!(!std::ptr::fn_addr_eq(
            inherited.class_base().copy.unwrap(),
            error.class_base().copy.unwrap()
        ));
    }

    #[test]
    fn test_upcast_index_error() {
        let runtime = runtime();
        let error: Ref<ErrorObject> = runtime.new_index_error(1).unwrap().into_parent();

        assert_eq!(error.msg().unwrap(), "index 1 is out of range");
        assert!(error.header().is_instance_of(runtime.error_class().unwrap().class_base()));
    }

    #[test]
    fn test_missing_msg_slot() {
        let mut runtime = runtime();
        let meta = runtime.meta_class().unwrap().clone();
        let object = runtime.object_class().unwrap().clone();

        let mut bare: Option<Ref<ErrorClass>> = None;
        MetaClass::new_class(&meta, &mut bare, "BareError", &object, |class: &mut ErrorClass| {
            class.error_init = Some(error_init);
            class.class_base_mut().destroy = error_destroy;
            Ok(())
        })
        .unwrap();
        let bare = bare.unwrap();

        let error = bare.new_instance(ErrorConfig::default()).unwrap();
        assert_eq!(error.msg(), Err(Error::NotImplemented));
        assert_eq!(error.set_msg("x"), Err(Error::NotImplemented));

        drop(error);
        drop(bare);
        runtime.deinit();
    }
}
