//! The meta-class: the class of every class.
//!
//! The meta-class is an instance of itself. Its parent is the root `Object`
//! class, whose own class is the meta-class, so the two reference each
//! other. [`bootstrap`] builds that pair and [`teardown`] breaks the cycle
//! before releasing it.
//!
//! New classes come from [`MetaClass::new_class`]: the meta-class's
//! `construct` slot allocates the descriptor, the parent's slots are copied
//! in, and a caller-supplied override hook rewrites the slots the new class
//! changes. [`MetaClass::new_subclass`] does the same for a parent with the
//! same descriptor type, copying the slots that type adds as well.
//!
//! Every class records the exact instance type it builds. A parent handle
//! whose type was erased with `into_base` is only accepted where that type
//! matches.

use crate::error::{Error, Result};
use crate::runtime::class::{ClassStruct, InitFn, ObjectClass};
use crate::runtime::object::{
    Instance, Object, Ref, object_construct, object_destroy, object_init, object_represent,
};
use crate::runtime::tracker;
use oxiobj_log::{debug, trace};
use std::alloc::{self, Layout};
use std::any::TypeId;
use std::mem;
use std::ptr::{self, NonNull};

/// Descriptor of the meta-class.
#[repr(C)]
pub struct MetaClass {
    base: ObjectClass,
}

// SAFETY: the meta-class is an instance of itself.
unsafe impl Instance for MetaClass {
    type Parent = ObjectClass;
    type Class = MetaClass;
    type Config = ();
}

// SAFETY: `MetaClass` is `#[repr(C)]` and starts with `ObjectClass`.
unsafe impl ClassStruct for MetaClass {
    type Super = ObjectClass;
    type Inst = ObjectClass;

    fn derive(&self, header: Object) -> Self {
        MetaClass {
            base: self.base.derive(header),
        }
    }

    fn inherit(parent: &ObjectClass, header: Object) -> Self {
        MetaClass {
            base: parent.derive(header),
        }
    }

    fn initializer(&self) -> Option<InitFn<ObjectClass>> {
        // Classes are built by `new_class`, never by `new_instance`.
        None
    }
}

impl MetaClass {
    /// Creates a class named `name` deriving from `parent`.
    ///
    /// The descriptor inherits every slot of `parent`; slots `K` adds beyond
    /// `K::Super` start out empty. `override_slots` then gets to rewrite
    /// them. On success the class is stored in `out`.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidArgument`] if `out` already holds a class, if
    ///   `parent` does not build exactly the instance type of `K::Super`, or
    ///   if `K`'s descriptor or instance type is smaller than its parent's or
    ///   needs more alignment than the meta-class provides.
    /// - [`Error::OutOfMemory`] if the descriptor cannot be allocated.
    /// - Whatever `override_slots` reports; the partially built class is
    ///   released and `out` stays empty.
    ///
    /// # Example
    ///
    /// ```rust
    /// use oxiobj::runtime::{MetaClass, ObjectClass, Runtime};
    ///
    /// let mut runtime = Runtime::new();
    /// runtime.init().unwrap();
    ///
    /// let meta = runtime.meta_class().unwrap();
    /// let object = runtime.object_class().unwrap();
    ///
    /// let mut widget: Option<oxiobj::runtime::Ref<ObjectClass>> = None;
    /// MetaClass::new_class(meta, &mut widget, "Widget", object, |_| Ok(())).unwrap();
    ///
    /// let widget = widget.unwrap();
    /// assert_eq!(widget.name(), "Widget");
    /// assert_eq!(widget.parent().map(ObjectClass::name), Some("Object"));
    /// ```
    pub fn new_class<K, F>(
        meta: &Ref<MetaClass>,
        out: &mut Option<Ref<K>>,
        name: &'static str,
        parent: &Ref<K::Super>,
        override_slots: F,
    ) -> Result<()>
    where
        K: ClassStruct,
        F: FnOnce(&mut K) -> Result<()>,
    {
        Self::create(
            meta,
            out,
            name,
            parent.clone().into_base(),
            TypeId::of::<<K::Super as ClassStruct>::Inst>(),
            |header| K::inherit(&**parent, header),
            override_slots,
        )
    }

    /// Creates a class named `name` with the same descriptor type as
    /// `parent`, copying every slot of `parent` including the ones `K` adds.
    ///
    /// # Errors
    ///
    /// As [`MetaClass::new_class`]; `parent` must build exactly `K::Inst`.
    pub fn new_subclass<K, F>(
        meta: &Ref<MetaClass>,
        out: &mut Option<Ref<K>>,
        name: &'static str,
        parent: &Ref<K>,
        override_slots: F,
    ) -> Result<()>
    where
        K: ClassStruct,
        F: FnOnce(&mut K) -> Result<()>,
    {
        Self::create(
            meta,
            out,
            name,
            parent.clone().into_base(),
            TypeId::of::<K::Inst>(),
            |header| parent.derive(header),
            override_slots,
        )
    }

    fn create<K, B, F>(
        meta: &Ref<MetaClass>,
        out: &mut Option<Ref<K>>,
        name: &'static str,
        parent: Ref<ObjectClass>,
        parent_builds: TypeId,
        build: B,
        override_slots: F,
    ) -> Result<()>
    where
        K: ClassStruct,
        B: FnOnce(Object) -> K,
        F: FnOnce(&mut K) -> Result<()>,
    {
        if out.is_some() {
            return Err(Error::InvalidArgument);
        }
        let parent_name = parent.name();
        if parent.instance_type != parent_builds {
            debug!("class {}: parent {} builds another instance type", name, parent_name);
            return Err(Error::InvalidArgument);
        }

        let meta_base = &meta.base;
        let meta_layout = meta_base.instance_layout();
        let descriptor = Layout::new::<K>();
        let instance = Layout::new::<K::Inst>();
        if descriptor.size() < meta_layout.size()
            || descriptor.size() < mem::size_of::<K::Super>()
            || descriptor.align() > meta_layout.align()
            || instance.size() < parent.instance_size()
        {
            return Err(Error::InvalidArgument);
        }

        let extra = descriptor.size() - meta_layout.size();
        let block = (meta_base.construct)(meta_base, extra)?;
        if !block.fits::<K>() {
            block.abandon();
            return Err(Error::InvalidArgument);
        }
        let header = Object::stamp(meta_base, block.layout());

        let mut class = build(header);
        {
            let base = class.class_base_mut();
            base.name = name;
            base.instance_layout = instance;
            base.instance_type = TypeId::of::<K::Inst>();
            base.parent = Some(parent);
        }

        if let Err(err) = override_slots(&mut class) {
            debug!("slot overrides for class {} failed: {}", name, err);
            drop(class);
            block.abandon();
            return Err(err);
        }

        debug!(
            "created class {} (parent {}, instance size {})",
            name,
            parent_name,
            instance.size()
        );
        // SAFETY: the block fits `K` and `class`'s header was stamped with
        // its layout.
        *out = Some(unsafe { block.write(class) });
        Ok(())
    }
}

/// `destroy` slot of classes: releases the parent link, then the block.
///
/// # Safety
///
/// See [`object_destroy`]; `obj` must be a class descriptor.
unsafe fn class_destroy(obj: NonNull<Object>) {
    let class = obj.cast::<ObjectClass>().as_ptr();
    // SAFETY: `obj` is an instance of the meta-class and starts with an
    // `ObjectClass`. Appended slots need no drop.
    unsafe {
        trace!("destroying class {}", (*class).name);
        ptr::drop_in_place(&raw mut (*class).parent);
        object_destroy(obj);
    }
}

/// `represent` slot of classes.
fn class_represent(obj: &Object) -> Result<String> {
    // SAFETY: only instances of the meta-class use this slot.
    let class = unsafe { obj.cast_unchecked::<ObjectClass>() };
    Ok(format!("<class {}>", class.name()))
}

/// Builds the meta-class and the root `Object` class.
///
/// # Errors
///
/// Returns [`Error::OutOfMemory`] when either descriptor cannot be allocated.
pub(crate) fn bootstrap() -> Result<(Ref<MetaClass>, Ref<ObjectClass>)> {
    let layout = Layout::new::<MetaClass>();
    // SAFETY: `MetaClass` is not zero-sized.
    let raw = unsafe { alloc::alloc_zeroed(layout) };
    let ptr = NonNull::new(raw).ok_or(Error::OutOfMemory)?.cast::<MetaClass>();
    let this = ptr.cast::<ObjectClass>();
    tracker::track(this);

    let meta = MetaClass {
        base: ObjectClass {
            obj: Object::stamp_self(this, layout),
            name: "MetaClass",
            instance_layout: Layout::new::<ObjectClass>(),
            instance_type: TypeId::of::<ObjectClass>(),
            parent: None,
            construct: object_construct,
            initialize: None,
            destroy: class_destroy,
            copy: None,
            represent: class_represent,
            compare: None,
        },
    };
    // SAFETY: fresh allocation sized and aligned for `MetaClass`.
    let meta = unsafe {
        ptr.as_ptr().write(meta);
        Ref::from_raw(ptr)
    };

    let block = (meta.base.construct)(&meta.base, 0)?;
    let object = ObjectClass {
        obj: Object::stamp(&meta.base, block.layout()),
        name: "Object",
        instance_layout: Layout::new::<Object>(),
        instance_type: TypeId::of::<Object>(),
        parent: None,
        construct: object_construct,
        initialize: Some(object_init),
        destroy: object_destroy,
        copy: None,
        represent: object_represent,
        compare: None,
    };
    // SAFETY: the header was stamped with this block's layout.
    let object = unsafe { block.write(object) };

    // SAFETY: nothing borrows the meta-class's parent field yet.
    unsafe { (*meta.as_mut_ptr()).base.parent = Some(object.clone()) };

    debug!("bootstrapped MetaClass and Object");
    Ok((meta, object))
}

/// Breaks the meta-class/`Object` cycle and releases both.
pub(crate) fn teardown(meta: Ref<MetaClass>, object: Ref<ObjectClass>) {
    // SAFETY: no borrow of the meta-class's parent field outlives this call.
    let parent = unsafe { (*meta.as_mut_ptr()).base.parent.take() };
    drop(parent);
    drop(object);
    drop(meta);
    debug!("released MetaClass and Object");
}
