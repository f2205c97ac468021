//! Class descriptors and the slot table every instance dispatches through.
//!
//! A class is itself an instance (of the meta-class), so a descriptor starts
//! with an [`Object`] header followed by the [`ObjectClass`] fields: name,
//! instance layout, parent link and the root slots. Subclass descriptors are
//! `#[repr(C)]` structs that embed their parent descriptor first and append
//! their own slots.
//!
//! # Architecture
//!
//! ```text
//! ObjectClass          ErrorClass               IndexErrorClass
//! +-------------+      +------------------+     +--------------------+
//! | Object      |      | ObjectClass      |     | ErrorClass         |
//! | name        |      |   ...root slots  |     |   ...              |
//! | layout      |      | error_init       |     | index_error_init   |
//! | parent      |      | msg / set_msg    |     +--------------------+
//! | root slots  |      +------------------+
//! +-------------+
//! ```
//!
//! Slots are copied from the parent when a class is created, then
//! selectively overwritten. There is no lookup chain at call time: a call
//! reads one function pointer out of the instance's own class.
//!
//! # Safety
//!
//! [`ClassStruct`] is unsafe to implement. The layout contract (parent
//! descriptor first, `#[repr(C)]`) is what makes the pointer casts in
//! [`ClassStruct::class_base`] and [`Instance::class_struct`] sound.

use crate::error::Result;
use crate::runtime::meta::MetaClass;
use crate::runtime::object::{self, Block, Instance, Object, Ref};
use std::alloc::Layout;
use std::any::TypeId;
use std::cmp::Ordering;
use std::fmt;
use std::ptr::{self, NonNull};

/// Allocates a zeroed block for an instance plus `extra` trailing bytes.
pub type ConstructFn = fn(class: &ObjectClass, extra: usize) -> Result<Block>;

/// Builds the fields of one level of the instance type `T`.
///
/// Receives the stamped header and the level's configuration. Implementations
/// call their parent's initializer for the inner part first.
pub type InitFn<T> =
    fn(&<T as Instance>::Class, Object, <T as Instance>::Config) -> Result<T>;

/// Tears an instance down once its count reaches zero.
pub type DestroyFn = unsafe fn(NonNull<Object>);

/// Produces an independent instance with the same content.
pub type CopyFn = fn(&Object) -> Result<Ref<Object>>;

/// Produces the textual representation of an instance.
pub type ReprFn = fn(&Object) -> Result<String>;

/// Orders two instances.
pub type CompareFn = fn(&Object, &Object) -> Result<Ordering>;

/// The root class descriptor.
#[repr(C)]
pub struct ObjectClass {
    pub(crate) obj: Object,
    pub(crate) name: &'static str,
    pub(crate) instance_layout: Layout,
    pub(crate) instance_type: TypeId,
    pub(crate) parent: Option<Ref<ObjectClass>>,

    /// Allocates instance storage.
    pub construct: ConstructFn,
    /// Initializes the header level; `None` for classes that cannot be
    /// instantiated through the typed path.
    pub initialize: Option<InitFn<Object>>,
    /// Releases instance resources.
    pub destroy: DestroyFn,
    /// Copies an instance; `None` means "not copyable".
    pub copy: Option<CopyFn>,
    /// Describes an instance.
    pub represent: ReprFn,
    /// Orders two instances; `None` means "not comparable".
    pub compare: Option<CompareFn>,
}

impl ObjectClass {
    /// Returns the class's own header.
    #[must_use]
    pub fn as_object(&self) -> &Object {
        &self.obj
    }

    /// Returns the class name.
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Renames the class.
    pub fn set_name(&mut self, name: &'static str) {
        self.name = name;
    }

    /// Returns the layout of one instance of this class.
    #[must_use]
    pub fn instance_layout(&self) -> Layout {
        self.instance_layout
    }

    /// Returns the size of one instance of this class.
    #[must_use]
    pub fn instance_size(&self) -> usize {
        self.instance_layout.size()
    }

    /// Whether this class builds instances of exactly `T`.
    #[must_use]
    pub fn builds<T: Instance>(&self) -> bool {
        self.instance_type == TypeId::of::<T>()
    }

    /// Returns the parent class, `None` for the root class.
    #[must_use]
    pub fn parent(&self) -> Option<&ObjectClass> {
        self.parent.as_deref()
    }

    /// Walks from this class up to the root.
    pub fn ancestors(&self) -> impl Iterator<Item = &ObjectClass> {
        std::iter::successors(Some(self), |class| class.parent())
    }

    /// Whether `self` is `other` or descends from it.
    #[must_use]
    pub fn is_subclass_of(&self, other: &ObjectClass) -> bool {
        self.ancestors().any(|class| ptr::eq(class, other))
    }
}

impl fmt::Debug for ObjectClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectClass")
            .field("name", &self.name)
            .field("instance_size", &self.instance_size())
            .field("parent", &self.parent().map(ObjectClass::name))
            .finish_non_exhaustive()
    }
}

/// A class descriptor type.
///
/// # Safety
///
/// Implementors must be `#[repr(C)]` with `Self::Super` as their first field
/// ([`ObjectClass`] is its own super). Slots appended past the parent prefix
/// must be plain data that needs no drop.
pub unsafe trait ClassStruct: Instance {
    /// The parent descriptor type.
    type Super: ClassStruct;
    /// The instance type this descriptor builds.
    type Inst: Instance<Class = Self>;

    /// Copies this descriptor, slots included, under a new header.
    ///
    /// The parent link is left empty; the factory fills it in.
    fn derive(&self, header: Object) -> Self;

    /// Builds a descriptor from a parent of the super type: the parent's
    /// slots are copied and the slots this level adds start out empty.
    fn inherit(parent: &Self::Super, header: Object) -> Self;

    /// Returns the initializer for this level of the instance type.
    fn initializer(&self) -> Option<InitFn<Self::Inst>>;

    /// Returns the root part of the descriptor.
    fn class_base(&self) -> &ObjectClass {
        // SAFETY: every descriptor starts with an `ObjectClass`.
        unsafe { &*(self as *const Self).cast::<ObjectClass>() }
    }

    /// Returns the root part of the descriptor for slot overrides.
    fn class_base_mut(&mut self) -> &mut ObjectClass {
        // SAFETY: every descriptor starts with an `ObjectClass`.
        unsafe { &mut *(self as *mut Self).cast::<ObjectClass>() }
    }
}

// SAFETY: class descriptors are instances of the meta-class, which is laid
// out as `MetaClass { base: ObjectClass }`.
unsafe impl Instance for ObjectClass {
    type Parent = Object;
    type Class = MetaClass;
    type Config = ();
}

// SAFETY: `ObjectClass` is the root of the descriptor hierarchy.
unsafe impl ClassStruct for ObjectClass {
    type Super = ObjectClass;
    type Inst = Object;

    fn derive(&self, header: Object) -> Self {
        ObjectClass {
            obj: header,
            name: self.name,
            instance_layout: self.instance_layout,
            instance_type: self.instance_type,
            parent: None,
            construct: self.construct,
            initialize: self.initialize,
            destroy: self.destroy,
            copy: self.copy,
            represent: self.represent,
            compare: self.compare,
        }
    }

    fn inherit(parent: &ObjectClass, header: Object) -> Self {
        parent.derive(header)
    }

    fn initializer(&self) -> Option<InitFn<Object>> {
        self.initialize
    }
}

impl<K: ClassStruct> Ref<K> {
    /// Creates an instance of this class.
    ///
    /// # Errors
    ///
    /// See [`object::new_instance`].
    pub fn new_instance(&self, config: <K::Inst as Instance>::Config) -> Result<Ref<K::Inst>> {
        object::new_instance(&**self, config)
    }

    /// Converts the handle into a handle on the root descriptor.
    #[must_use]
    pub fn into_base(self) -> Ref<ObjectClass> {
        let ptr = NonNull::from(self.class_base());
        std::mem::forget(self);
        // SAFETY: the descriptor starts with `ObjectClass`; the count moves over.
        unsafe { Ref::from_raw(ptr) }
    }
}
