//! `oxiobj` runtime module.
//!
//! This module provides the object model and the registry of built-in
//! classes:
//!
//! - [`object`]: instance header, counted handles, construction and
//!   destruction protocol
//! - [`class`]: class descriptors and their slot tables
//! - [`meta`]: the meta-class and the class factory
//! - [`error_object`]: the `Error` and `IndexError` classes
//! - [`array`]: the `DynamicArray` class
//! - [`tracker`]: per-thread ledger of live instances
//!
//! # Runtime Registry
//!
//! [`Runtime`] owns the built-in class singletons. It is built empty,
//! filled by [`Runtime::init`] and emptied by [`Runtime::deinit`] (or on
//! drop). Consumers borrow the runtime to reach the classes instead of going
//! through process-wide globals.
//!
//! # Example
//!
//! ```rust
//! use oxiobj::runtime::Runtime;
//!
//! let mut runtime = Runtime::new();
//! runtime.init().unwrap();
//!
//! let error = runtime.new_error_msg("disk full").unwrap();
//! assert_eq!(error.as_object().represent().unwrap(), "Error: disk full");
//!
//! runtime.deinit();
//! assert!(runtime.new_object().is_err());
//! runtime.init().unwrap();
//! ```

pub mod array;
pub mod class;
pub mod error_object;
pub mod meta;
pub mod object;
pub mod tracker;

pub use array::{ArrayConfig, DynamicArray, DynamicArrayClass, ElementType};
pub use class::{ClassStruct, InitFn, ObjectClass};
pub use error_object::{ErrorClass, ErrorConfig, ErrorObject, IndexError, IndexErrorClass};
pub use meta::MetaClass;
pub use object::{Instance, Object, Ref, new_instance};

use crate::config::RuntimeConfig;
use crate::error::{Error, Result};
use oxiobj_log::{debug, warn};

/// Registry of the built-in classes.
///
/// # Initialization Order
///
/// `init` builds the meta-class and `Object` first, then `DynamicArray`,
/// `Error` and `IndexError`. `deinit` releases them in the reverse order,
/// the meta-class last.
#[derive(Default)]
pub struct Runtime {
    meta: Option<Ref<MetaClass>>,
    object: Option<Ref<ObjectClass>>,
    dynamic_array: Option<Ref<DynamicArrayClass>>,
    error: Option<Ref<ErrorClass>>,
    index_error: Option<Ref<IndexErrorClass>>,
}

impl Runtime {
    /// Creates an empty, uninitialized runtime.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies `config` and creates an empty, uninitialized runtime.
    #[must_use]
    pub fn with_config(config: &RuntimeConfig) -> Self {
        config.apply();
        Self::new()
    }

    /// Builds every built-in class that is not built yet.
    ///
    /// Stops at the first failure without undoing the steps that succeeded;
    /// calling `init` again resumes from the failed step.
    ///
    /// # Errors
    ///
    /// The first error reported by the meta-class bootstrap or a class
    /// factory call.
    pub fn init(&mut self) -> Result<()> {
        let result = self.init_classes();
        if let Err(err) = &result {
            warn!("runtime initialization stopped: {}", err);
        }
        result
    }

    fn init_classes(&mut self) -> Result<()> {
        if self.meta.is_none() {
            let (meta, object) = meta::bootstrap()?;
            self.meta = Some(meta);
            self.object = Some(object);
        }
        let meta = self.meta_class()?.clone();
        let object = self.object_class()?.clone();

        if self.dynamic_array.is_none() {
            MetaClass::new_class(
                &meta,
                &mut self.dynamic_array,
                "DynamicArray",
                &object,
                array::dynamic_array_class_init,
            )?;
        }
        if self.error.is_none() {
            MetaClass::new_class(
                &meta,
                &mut self.error,
                "Error",
                &object,
                error_object::error_class_init,
            )?;
        }
        if self.index_error.is_none() {
            let error = self.error_class()?.clone();
            MetaClass::new_class(
                &meta,
                &mut self.index_error,
                "IndexError",
                &error,
                error_object::index_error_class_init,
            )?;
        }

        debug!("runtime initialized");
        Ok(())
    }

    /// Releases every built-in class, the meta-class last.
    ///
    /// Safe to call on a runtime that is not (or only partly) initialized.
    /// Classes stay alive while instances of them or outside handles exist.
    pub fn deinit(&mut self) {
        if self.meta.is_none() {
            return;
        }

        drop(self.index_error.take());
        drop(self.error.take());
        drop(self.dynamic_array.take());

        match (self.meta.take(), self.object.take()) {
            (Some(meta), Some(object)) => meta::teardown(meta, object),
            (meta, object) => {
                drop(object);
                drop(meta);
            }
        }
        debug!("runtime deinitialized");
    }

    /// Whether every built-in class is built.
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.meta.is_some()
            && self.object.is_some()
            && self.dynamic_array.is_some()
            && self.error.is_some()
            && self.index_error.is_some()
    }

    /// # Errors
    ///
    /// [`Error::NotInitialized`] before `init`.
    pub fn meta_class(&self) -> Result<&Ref<MetaClass>> {
        self.meta.as_ref().ok_or(Error::NotInitialized)
    }

    /// # Errors
    ///
    /// [`Error::NotInitialized`] before `init`.
    pub fn object_class(&self) -> Result<&Ref<ObjectClass>> {
        self.object.as_ref().ok_or(Error::NotInitialized)
    }

    /// # Errors
    ///
    /// [`Error::NotInitialized`] before `init`.
    pub fn dynamic_array_class(&self) -> Result<&Ref<DynamicArrayClass>> {
        self.dynamic_array.as_ref().ok_or(Error::NotInitialized)
    }

    /// # Errors
    ///
    /// [`Error::NotInitialized`] before `init`.
    pub fn error_class(&self) -> Result<&Ref<ErrorClass>> {
        self.error.as_ref().ok_or(Error::NotInitialized)
    }

    /// # Errors
    ///
    /// [`Error::NotInitialized`] before `init`.
    pub fn index_error_class(&self) -> Result<&Ref<IndexErrorClass>> {
        self.index_error.as_ref().ok_or(Error::NotInitialized)
    }

    /// Creates a bare `Object` instance.
    ///
    /// # Errors
    ///
    /// [`Error::NotInitialized`] before `init`, or allocation failure.
    pub fn new_object(&self) -> Result<Ref<Object>> {
        self.object_class()?.new_instance(())
    }

    /// Creates an error carrying the default message.
    ///
    /// # Errors
    ///
    /// [`Error::NotInitialized`] before `init`, or allocation failure.
    pub fn new_error(&self) -> Result<Ref<ErrorObject>> {
        self.error_class()?.new_instance(ErrorConfig::default())
    }

    /// Creates an error carrying `msg`.
    ///
    /// # Errors
    ///
    /// [`Error::NotInitialized`] before `init`, or allocation failure.
    pub fn new_error_msg(&self, msg: &str) -> Result<Ref<ErrorObject>> {
        self.error_class()?.new_instance(ErrorConfig::new(msg))
    }

    /// Creates an index error for `index`.
    ///
    /// # Errors
    ///
    /// [`Error::NotInitialized`] before `init`, or allocation failure.
    pub fn new_index_error(&self, index: usize) -> Result<Ref<IndexError>> {
        self.index_error_class()?.new_instance(index)
    }

    /// Creates an empty array of `element` values.
    ///
    /// Out-of-range accesses report through the `IndexError` class.
    ///
    /// # Errors
    ///
    /// [`Error::NotInitialized`] before `init`, or allocation failure.
    pub fn new_dynamic_array(&self, element: ElementType) -> Result<Ref<DynamicArray>> {
        let class = self.dynamic_array_class()?;
        let config = ArrayConfig::new(element).with_index_error(self.index_error_class()?.clone());
        class.new_instance(config)
    }

    /// Creates an empty array with room for `capacity` elements.
    ///
    /// # Errors
    ///
    /// As [`Runtime::new_dynamic_array`]; a failing reservation releases the
    /// array before the error is returned.
    pub fn new_dynamic_array_with_capacity(
        &self,
        element: ElementType,
        capacity: usize,
    ) -> Result<Ref<DynamicArray>> {
        let array = self.new_dynamic_array(element)?;
        array.reserve(capacity)?;
        Ok(array)
    }

    /// Number of live instances on this thread, classes included.
    #[must_use]
    pub fn live_objects(&self) -> usize {
        tracker::live_objects()
    }
}

impl Drop for Runtime {
    fn drop(&mut self) {
        self.deinit();
    }
}
