//! `oxiobj`: a single-inheritance object model for Rust
//!
//! `oxiobj` lets code define classes at runtime and drive instances through
//! a uniform protocol. It provides:
//!
//! - **Classes as Slot Tables** built by copying a parent's slots and
//!   overriding a chosen few
//! - **A Meta-Class** that is its own class and builds every other class
//! - **Reference Counting** through counted `Ref` handles
//! - **Chained Construction and Destruction** with one typed configuration
//!   value per class level
//! - **Built-in Classes** for errors, index errors and a growable array
//!
//! # Architecture
//!
//! - **Registry Layer**: [`runtime::Runtime`] owns the built-in classes
//! - **Class Layer**: the meta-class factory and slot tables
//! - **Instance Layer**: headers, handles and the lifecycle protocol
//!
//! # Example
//!
//! ```rust
//! use oxiobj::runtime::{ElementType, Runtime};
//!
//! let mut runtime = Runtime::new();
//! runtime.init().unwrap();
//!
//! let array = runtime.new_dynamic_array(ElementType::of::<u32>()).unwrap();
//! array.insert(0, &[1u32, 2, 3]).unwrap();
//! assert_eq!(array.to_vec::<u32>().unwrap(), [1, 2, 3]);
//!
//! let mut error = None;
//! assert!(array.get::<u32>(3, &mut error).is_err());
//! assert_eq!(error.unwrap().msg().unwrap(), "index 3 is out of range");
//! ```

pub mod config;
pub mod error;
pub mod runtime;

// Re-export commonly used types
pub use config::RuntimeConfig;
pub use error::{Error, Result};
pub use runtime::{
    ClassStruct, DynamicArray, ElementType, ErrorObject, IndexError, Instance, MetaClass, Object,
    ObjectClass, Ref, Runtime,
};
