//! Object header, counted handles and the root lifecycle.
//!
//! Every instance is one heap block whose first bytes are an [`Object`]
//! header: the class the instance belongs to and its reference count.
//! Instance types extend the header by embedding their parent type as the
//! first field of a `#[repr(C)]` struct, so a pointer to any instance is also
//! a valid pointer to its header.
//!
//! # Lifecycle
//!
//! - [`new_instance`] asks the class's `construct` slot for a zeroed block,
//!   stamps the header (refcount 1), runs the typed init chain and writes the
//!   result into the block.
//! - [`Ref`] is the counted handle. `Clone` retains, `Drop` releases; the
//!   last release dispatches the class's `destroy` slot.
//! - Destroy overrides drop the fields their own level declares and then
//!   call their parent's destroy. [`object_destroy`] ends every chain: it
//!   frees the block and gives back the count the instance held on its class.
//!
//! # Thread Safety
//!
//! Refcounts are plain `Cell`s. `Ref` is neither `Send` nor `Sync`; instances
//! and classes belong to the thread that built them.

use crate::error::{Error, Result};
use crate::runtime::class::{ClassStruct, ObjectClass};
use crate::runtime::tracker;
use oxiobj_log::{debug, trace};
use std::alloc::{self, Layout};
use std::cell::Cell;
use std::cmp::Ordering;
use std::fmt;
use std::marker::PhantomData;
use std::mem;
use std::ops::Deref;
use std::ptr::{self, NonNull};

/// The header every instance starts with.
///
/// The header owns one count on its class, released when the instance is
/// destroyed. The meta-class is the single exception: it is its own class.
#[repr(C)]
pub struct Object {
    class: NonNull<ObjectClass>,
    refcount: Cell<u32>,
    layout: Layout,
}

impl Object {
    /// Stamps a fresh header for an instance of `class`.
    pub(crate) fn stamp(class: &ObjectClass, layout: Layout) -> Object {
        class.as_object().retain();
        Object {
            class: NonNull::from(class),
            refcount: Cell::new(1),
            layout,
        }
    }

    /// Stamps the header of the meta-class, which is an instance of itself.
    pub(crate) fn stamp_self(this: NonNull<ObjectClass>, layout: Layout) -> Object {
        Object {
            class: this,
            refcount: Cell::new(1),
            layout,
        }
    }

    /// Returns the class this instance dispatches through.
    #[must_use]
    pub fn class(&self) -> &ObjectClass {
        // SAFETY: the header holds a count on its class, so the class
        // outlives the instance.
        unsafe { self.class.as_ref() }
    }

    /// Returns the current reference count.
    #[must_use]
    pub fn refcount(&self) -> u32 {
        self.refcount.get()
    }

    /// Returns the number of bytes the instance's block occupies.
    #[must_use]
    pub fn block_size(&self) -> usize {
        self.layout.size()
    }

    /// Whether this object's class is `class` or one of its descendants.
    #[must_use]
    pub fn is_instance_of(&self, class: &ObjectClass) -> bool {
        self.class().is_subclass_of(class)
    }

    /// Produces the textual representation through the `represent` slot.
    ///
    /// # Errors
    ///
    /// Whatever the class's `represent` implementation reports.
    pub fn represent(&self) -> Result<String> {
        (self.class().represent)(self)
    }

    /// Produces an independent copy through the `copy` slot.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotCopyable`] when the class has no `copy` slot.
    pub fn copy(&self) -> Result<Ref<Object>> {
        let copy = self.class().copy.ok_or(Error::NotCopyable)?;
        copy(self)
    }

    /// Orders `self` against `other` through the `compare` slot of `self`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Incomparable`] when the class has no `compare` slot or
    /// the slot rejects the pair.
    pub fn compare(&self, other: &Object) -> Result<Ordering> {
        let compare = self.class().compare.ok_or(Error::Incomparable)?;
        compare(self, other)
    }

    pub(crate) fn retain(&self) {
        let count = self.refcount.get();
        if count == u32::MAX {
            panic!("Reference count overflow in Object::retain");
        }
        self.refcount.set(count + 1);
    }

    /// Reinterprets the header as the instance type `T`.
    ///
    /// # Safety
    ///
    /// The object must have been built as a `T` (or a type extending `T`).
    pub(crate) unsafe fn cast_unchecked<T: Instance>(&self) -> &T {
        // SAFETY: guaranteed by the caller; `T` starts with this header.
        unsafe { &*(self as *const Object).cast::<T>() }
    }
}

impl Drop for Object {
    fn drop(&mut self) {
        // SAFETY: the header owns one count on its class.
        unsafe { release(self.class.cast::<Object>()) }
    }
}

impl fmt::Debug for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Object")
            .field("class", &self.class().name())
            .field("refcount", &self.refcount())
            .finish()
    }
}

/// Drops one counted reference; the last one runs the destroy chain.
///
/// # Safety
///
/// The caller must own one count on `obj`.
pub(crate) unsafe fn release(obj: NonNull<Object>) {
    // SAFETY: the caller's count keeps the block alive.
    let header = unsafe { obj.as_ref() };
    let count = header.refcount.get();
    debug_assert!(count > 0, "released an object with no live references");
    if count > 1 {
        header.refcount.set(count - 1);
        return;
    }

    header.refcount.set(0);
    let destroy = header.class().destroy;
    // SAFETY: the count just reached zero; nobody else can reach the block.
    unsafe { destroy(obj) }
}

/// A zeroed, uninitialized instance block handed out by a `construct` slot.
pub struct Block {
    ptr: NonNull<u8>,
    layout: Layout,
    class: NonNull<ObjectClass>,
}

impl Block {
    /// Returns the layout the block was allocated with.
    #[must_use]
    pub fn layout(&self) -> Layout {
        self.layout
    }

    /// Whether the block is large and aligned enough to hold a `T`.
    #[must_use]
    pub fn fits<T>(&self) -> bool {
        let needed = Layout::new::<T>();
        needed.size() <= self.layout.size() && needed.align() <= self.layout.align()
    }

    /// Moves `value` into the block and hands out the first counted reference.
    ///
    /// # Safety
    ///
    /// The block must [fit](Block::fits) `T`, and `value`'s header must have
    /// been stamped with this block's layout.
    pub(crate) unsafe fn write<T: Instance>(self, value: T) -> Ref<T> {
        debug_assert!(Layout::new::<T>().size() <= self.layout.size());
        debug_assert!(Layout::new::<T>().align() <= self.layout.align());

        let ptr = self.ptr.cast::<T>();
        // SAFETY: the block is large and aligned enough for `T` and unused.
        unsafe {
            ptr.as_ptr().write(value);
            Ref::from_raw(ptr)
        }
    }

    /// Frees a block whose initialization failed.
    pub(crate) fn abandon(self) {
        tracker::untrack(self.class);
        // SAFETY: allocated in `object_construct` with this layout, never written.
        unsafe { alloc::dealloc(self.ptr.as_ptr(), self.layout) }
    }
}

/// Marker for types laid out as runtime instances.
///
/// # Safety
///
/// Implementors must be `#[repr(C)]` with `Self::Parent` as their first field
/// (transitively starting with [`Object`]), and must only be built from classes
/// whose descriptor starts with `Self::Class`.
pub unsafe trait Instance: Sized + 'static {
    /// The instance type this one extends; [`Object`] is its own parent.
    type Parent: Instance;
    /// The class descriptor type of classes that build this instance type.
    type Class: ClassStruct;
    /// Construction arguments for this level of the init chain.
    type Config;

    /// Returns the header of this instance.
    fn header(&self) -> &Object {
        // SAFETY: every instance begins with its header.
        unsafe { &*(self as *const Self).cast::<Object>() }
    }

    /// Returns this instance's class as its statically known descriptor type.
    fn class_struct(&self) -> &Self::Class {
        // SAFETY: the instance was built from a class starting with
        // `Self::Class`, which the header keeps alive.
        unsafe { self.header().class.cast::<Self::Class>().as_ref() }
    }
}

// SAFETY: the header is trivially its own prefix.
unsafe impl Instance for Object {
    type Parent = Object;
    type Class = ObjectClass;
    type Config = ();
}

/// Counted handle to an instance.
///
/// # Example
///
/// ```rust
/// use oxiobj::runtime::Runtime;
///
/// let mut runtime = Runtime::new();
/// runtime.init().unwrap();
///
/// let first = runtime.new_object().unwrap();
/// let second = first.clone();
/// assert_eq!(first.refcount(), 2);
///
/// second.decref();
/// assert_eq!(first.refcount(), 1);
/// ```
pub struct Ref<T: Instance> {
    ptr: NonNull<T>,
    _marker: PhantomData<T>,
}

impl<T: Instance> Ref<T> {
    /// Wraps a pointer that carries one count.
    ///
    /// # Safety
    ///
    /// `ptr` must point to a live, fully written instance and the caller must
    /// hand its count over to the new handle.
    pub(crate) unsafe fn from_raw(ptr: NonNull<T>) -> Self {
        Ref {
            ptr,
            _marker: PhantomData,
        }
    }

    /// Returns the instance's header.
    #[must_use]
    pub fn as_object(&self) -> &Object {
        // SAFETY: the handle keeps the block alive; it starts with the header.
        unsafe { self.ptr.cast::<Object>().as_ref() }
    }

    /// Returns the current reference count.
    #[must_use]
    pub fn refcount(&self) -> u32 {
        self.as_object().refcount()
    }

    /// Releases this reference; the last release destroys the instance.
    pub fn decref(self) {
        drop(self);
    }

    /// Raw address of the instance, for identity checks.
    #[must_use]
    pub fn as_ptr(&self) -> *const T {
        self.ptr.as_ptr()
    }

    /// Whether two handles refer to the same instance.
    #[must_use]
    pub fn ptr_eq(this: &Self, other: &Self) -> bool {
        this.ptr == other.ptr
    }

    /// Converts the handle into a handle on the parent instance type.
    #[must_use]
    pub fn into_parent(self) -> Ref<T::Parent> {
        let ptr = self.ptr.cast::<T::Parent>();
        mem::forget(self);
        // SAFETY: `T` starts with `T::Parent`; the count moves over.
        unsafe { Ref::from_raw(ptr) }
    }

    /// Converts the handle into a handle on the bare header.
    #[must_use]
    pub fn into_object(self) -> Ref<Object> {
        let ptr = self.ptr.cast::<Object>();
        mem::forget(self);
        // SAFETY: every instance starts with its header; the count moves over.
        unsafe { Ref::from_raw(ptr) }
    }

    /// Pointer for in-place mutation of runtime-owned fields.
    pub(crate) fn as_mut_ptr(&self) -> *mut T {
        self.ptr.as_ptr()
    }
}

impl Ref<Object> {
    /// Recovers the concrete handle when the object is an instance of `class`.
    ///
    /// # Errors
    ///
    /// Hands the original handle back when the object's class does not
    /// descend from `class`.
    pub fn downcast<K: ClassStruct>(
        self,
        class: &Ref<K>,
    ) -> std::result::Result<Ref<K::Inst>, Ref<Object>> {
        if !self.is_instance_of(class.class_base()) {
            return Err(self);
        }
        let ptr = self.ptr.cast::<K::Inst>();
        mem::forget(self);
        // SAFETY: descendants of `class` build instances extending `K::Inst`.
        Ok(unsafe { Ref::from_raw(ptr) })
    }
}

impl<T: Instance> Deref for Ref<T> {
    type Target = T;

    fn deref(&self) -> &T {
        // SAFETY: the handle's count keeps the instance alive.
        unsafe { self.ptr.as_ref() }
    }
}

impl<T: Instance> Clone for Ref<T> {
    fn clone(&self) -> Self {
        self.as_object().retain();
        Ref {
            ptr: self.ptr,
            _marker: PhantomData,
        }
    }
}

impl<T: Instance> Drop for Ref<T> {
    fn drop(&mut self) {
        // SAFETY: the handle owns exactly one count.
        unsafe { release(self.ptr.cast::<Object>()) }
    }
}

impl<T: Instance> PartialEq for Ref<T> {
    fn eq(&self, other: &Self) -> bool {
        Ref::ptr_eq(self, other)
    }
}

impl<T: Instance> Eq for Ref<T> {}

impl<T: Instance> fmt::Debug for Ref<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ref")
            .field("class", &self.as_object().class().name())
            .field("refcount", &self.refcount())
            .finish()
    }
}

/// Creates an instance of `class` from a typed configuration.
///
/// # Errors
///
/// - [`Error::NotImplemented`] when the class has no initializer for its level.
/// - [`Error::InvalidArgument`] when the class does not build `K::Inst`, or
///   its `construct` slot hands out a block too small or too loosely aligned
///   for one.
/// - Whatever `construct` or the init chain reports. The block is freed
///   before returning and no handle is produced.
pub fn new_instance<K: ClassStruct>(
    class: &K,
    config: <K::Inst as Instance>::Config,
) -> Result<Ref<K::Inst>> {
    let init = class.initializer().ok_or(Error::NotImplemented)?;
    let base = class.class_base();
    if !base.builds::<K::Inst>() || base.instance_layout() != Layout::new::<K::Inst>() {
        return Err(Error::InvalidArgument);
    }

    let block = (base.construct)(base, 0)?;
    if !block.fits::<K::Inst>() {
        debug!(
            "construct slot of {} returned {} bytes, instances need {}",
            base.name(),
            block.layout().size(),
            base.instance_size()
        );
        block.abandon();
        return Err(Error::InvalidArgument);
    }
    let header = Object::stamp(base, block.layout());
    match init(class, header, config) {
        // SAFETY: the header inside `value` was stamped with this block's layout.
        Ok(value) => Ok(unsafe { block.write(value) }),
        Err(err) => {
            block.abandon();
            Err(err)
        }
    }
}

/// Root `construct` slot: a zeroed block of `instance_size + extra` bytes.
///
/// # Errors
///
/// [`Error::InvalidArgument`] for layouts that cannot hold a header or
/// overflow, [`Error::OutOfMemory`] when the allocator fails.
pub fn object_construct(class: &ObjectClass, extra: usize) -> Result<Block> {
    let base = class.instance_layout();
    let size = base.size().checked_add(extra).ok_or(Error::InvalidArgument)?;
    if size < mem::size_of::<Object>() {
        return Err(Error::InvalidArgument);
    }
    let layout = Layout::from_size_align(size, base.align()).map_err(|_| Error::InvalidArgument)?;

    // SAFETY: the layout is at least as large as a header, so never zero-sized.
    let ptr = NonNull::new(unsafe { alloc::alloc_zeroed(layout) }).ok_or(Error::OutOfMemory)?;
    let class = NonNull::from(class);
    tracker::track(class);
    Ok(Block { ptr, layout, class })
}

/// Root `initialize` slot: the header is all there is to set up.
///
/// # Errors
///
/// Never fails; the signature matches the init chain.
pub fn object_init(_class: &ObjectClass, header: Object, _config: ()) -> Result<Object> {
    Ok(header)
}

/// Root `destroy` slot: frees the block and releases the class.
///
/// Overrides call this last, after dropping the fields of their own level.
///
/// # Safety
///
/// `obj`'s refcount must have reached zero and every field beyond the header
/// must already be dropped.
pub unsafe fn object_destroy(obj: NonNull<Object>) {
    let raw = obj.as_ptr();
    // SAFETY: only the header is left; it is moved out before the block goes.
    let header = unsafe { ptr::read(raw) };
    let self_classed = header.class.cast::<Object>() == obj;

    trace!("destroying instance of {}", header.class().name());
    tracker::untrack(header.class);
    // SAFETY: the block was allocated with the layout recorded in its header.
    unsafe { alloc::dealloc(raw.cast::<u8>(), header.layout) };

    if self_classed {
        // The meta-class holds no count on itself.
        mem::forget(header);
    }
}

/// Root `represent` slot.
///
/// # Errors
///
/// Never fails; the signature matches the `represent` slot.
pub fn object_represent(obj: &Object) -> Result<String> {
    Ok(format!("Instance of {} at {:p}", obj.class().name(), obj))
}
