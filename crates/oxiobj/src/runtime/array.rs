//! The `DynamicArray` class: a growable array of owned, type-erased elements.
//!
//! Elements are stored as `Box<dyn Any>` and described by an [`ElementType`]:
//! how to copy one, optionally how to build one from a seed, and optionally
//! how to free one. The array owns every element it holds. Values handed in by
//! reference are copied; values handed in by value are moved in.
//!
//! Capacity is tracked explicitly. Appending to a full array grows it from 0
//! to 1 and then doubles; `reserve` and `insert` grow it to the exact amount
//! asked for.
//!
//! Every operation is a slot on [`DynamicArrayClass`], so a subclass can
//! override any of them. The typed methods on [`DynamicArray`] check the
//! element type and dispatch.
//!
//! # Example
//!
//! ```rust
//! use oxiobj::runtime::{ElementType, Runtime};
//!
//! let mut runtime = Runtime::new();
//! runtime.init().unwrap();
//!
//! let array = runtime.new_dynamic_array(ElementType::of::<i32>()).unwrap();
//! for i in 0..10 {
//!     array.add(&i).unwrap();
//! }
//! assert_eq!(array.size(), 10);
//! assert_eq!(array.capacity(), 16);
//!
//! let mut error = None;
//! assert!(array.get::<i32>(10, &mut error).is_err());
//! assert!(error.unwrap().msg().unwrap().contains("10"));
//! ```

use crate::error::{Error, Result};
use crate::runtime::class::{ClassStruct, InitFn, ObjectClass};
use crate::runtime::error_object::{ErrorObject, IndexErrorClass};
use crate::runtime::meta::MetaClass;
use crate::runtime::object::{Instance, Object, Ref, new_instance, object_destroy};
use oxiobj_log::debug;
use std::any::{Any, TypeId};
use std::cell::{RefCell, RefMut};
use std::fmt;
use std::mem;
use std::ptr::{self, NonNull};

/// Copies an element.
pub type CopyElementFn = fn(&dyn Any) -> Result<Box<dyn Any>>;

/// Builds a new element from a seed value.
pub type InitElementFn = fn(&dyn Any) -> Result<Box<dyn Any>>;

/// Releases an element the array no longer holds.
pub type FreeElementFn = fn(Box<dyn Any>);

/// Describes the elements an array holds.
///
/// The copy callback may run while the array is being read. Modifying the
/// same array from a callback fails with [`Error::Runtime`].
#[derive(Clone, Copy)]
pub struct ElementType {
    type_id: TypeId,
    type_name: &'static str,
    copy: CopyElementFn,
    init: Option<InitElementFn>,
    free: Option<FreeElementFn>,
}

impl ElementType {
    /// Elements of type `E`, copied with `Clone` and freed by dropping.
    #[must_use]
    pub fn of<E: Clone + 'static>() -> Self {
        ElementType {
            type_id: TypeId::of::<E>(),
            type_name: std::any::type_name::<E>(),
            copy: clone_element::<E>,
            init: None,
            free: None,
        }
    }

    /// Replaces the copy callback.
    #[must_use]
    pub fn with_copy(mut self, copy: CopyElementFn) -> Self {
        self.copy = copy;
        self
    }

    /// Sets the callback `grow` uses to build new elements from the seed.
    #[must_use]
    pub fn with_init(mut self, init: InitElementFn) -> Self {
        self.init = Some(init);
        self
    }

    /// Sets the callback run on every element the array releases.
    #[must_use]
    pub fn with_free(mut self, free: FreeElementFn) -> Self {
        self.free = Some(free);
        self
    }

    /// Returns the element type's name.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Whether the elements are of type `E`.
    #[must_use]
    pub fn is<E: 'static>(&self) -> bool {
        self.type_id == TypeId::of::<E>()
    }

    fn check<E: 'static>(&self) -> Result<()> {
        if self.is::<E>() {
            Ok(())
        } else {
            Err(Error::InvalidArgument)
        }
    }

    fn admit(&self, value: Box<dyn Any>) -> Result<Box<dyn Any>> {
        if (*value).type_id() == self.type_id {
            Ok(value)
        } else {
            Err(Error::InvalidArgument)
        }
    }

    fn copy(&self, value: &dyn Any) -> Result<Box<dyn Any>> {
        self.admit((self.copy)(value)?)
    }

    fn seed(&self, seed: &dyn Any) -> Result<Box<dyn Any>> {
        match self.init {
            Some(init) => self.admit(init(seed)?),
            None => self.copy(seed),
        }
    }

    fn release(&self, value: Box<dyn Any>) {
        match self.free {
            Some(free) => free(value),
            None => drop(value),
        }
    }
}

impl fmt::Debug for ElementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ElementType")
            .field("type_name", &self.type_name)
            .field("init", &self.init.is_some())
            .field("free", &self.free.is_some())
            .finish()
    }
}

fn clone_element<E: Clone + 'static>(value: &dyn Any) -> Result<Box<dyn Any>> {
    let value = value.downcast_ref::<E>().ok_or(Error::InvalidArgument)?;
    Ok(Box::new(value.clone()))
}

/// Stores an owned element at a position.
pub type ArraySetFn = fn(&DynamicArray, usize, Box<dyn Any>) -> Result<()>;
/// Copies the element at a position out.
pub type ArrayGetFn = fn(&DynamicArray, usize) -> Result<Box<dyn Any>>;
/// Appends a copy of an element.
pub type ArrayAddFn = fn(&DynamicArray, &dyn Any) -> Result<()>;
/// Moves the last element out.
pub type ArrayPopFn = fn(&DynamicArray) -> Result<Box<dyn Any>>;
/// Changes the size, seeding new elements from a value.
pub type ArrayResizeFn = fn(&DynamicArray, usize, &dyn Any) -> Result<()>;
/// Adjusts storage to a target count.
pub type ArrayCountFn = fn(&DynamicArray, usize) -> Result<()>;
/// Drops spare capacity.
pub type ArrayShrinkToFitFn = fn(&DynamicArray) -> Result<()>;
/// Inserts copies of elements at a position.
pub type ArrayInsertFn = fn(&DynamicArray, usize, &[&dyn Any]) -> Result<()>;

/// Descriptor of the `DynamicArray` class.
#[repr(C)]
pub struct DynamicArrayClass {
    base: ObjectClass,
    pub array_init: Option<InitFn<DynamicArray>>,
    pub set: Option<ArraySetFn>,
    pub get: Option<ArrayGetFn>,
    pub add: Option<ArrayAddFn>,
    pub pop_back: Option<ArrayPopFn>,
    pub resize: Option<ArrayResizeFn>,
    pub reserve: Option<ArrayCountFn>,
    pub shrink_to_fit: Option<ArrayShrinkToFitFn>,
    pub shrink: Option<ArrayCountFn>,
    pub grow: Option<ArrayResizeFn>,
    pub insert: Option<ArrayInsertFn>,
}

#[derive(Default)]
struct ArrayState {
    elements: Vec<Box<dyn Any>>,
    capacity: usize,
}

/// An instance of `DynamicArray`.
#[repr(C)]
pub struct DynamicArray {
    obj: Object,
    element: ElementType,
    state: RefCell<ArrayState>,
    index_error: Option<Ref<IndexErrorClass>>,
}

/// Construction arguments of a `DynamicArray`.
pub struct ArrayConfig {
    /// The element descriptor.
    pub element: ElementType,
    /// Class used to report out-of-range positions; without it only the
    /// status code is returned.
    pub index_error: Option<Ref<IndexErrorClass>>,
}

impl ArrayConfig {
    #[must_use]
    pub fn new(element: ElementType) -> Self {
        ArrayConfig {
            element,
            index_error: None,
        }
    }

    #[must_use]
    pub fn with_index_error(mut self, class: Ref<IndexErrorClass>) -> Self {
        self.index_error = Some(class);
        self
    }
}

// SAFETY: `DynamicArray` is `#[repr(C)]` and starts with `Object`.
unsafe impl Instance for DynamicArray {
    type Parent = Object;
    type Class = DynamicArrayClass;
    type Config = ArrayConfig;
}

// SAFETY: `DynamicArrayClass` is an instance of the meta-class.
unsafe impl Instance for DynamicArrayClass {
    type Parent = ObjectClass;
    type Class = MetaClass;
    type Config = ();
}

// SAFETY: `DynamicArrayClass` is `#[repr(C)]` and starts with `ObjectClass`;
// the appended slots are function pointers.
unsafe impl ClassStruct for DynamicArrayClass {
    type Super = ObjectClass;
    type Inst = DynamicArray;

    fn derive(&self, header: Object) -> Self {
        DynamicArrayClass {
            base: self.base.derive(header),
            array_init: self.array_init,
            set: self.set,
            get: self.get,
            add: self.add,
            pop_back: self.pop_back,
            resize: self.resize,
            reserve: self.reserve,
            shrink_to_fit: self.shrink_to_fit,
            shrink: self.shrink,
            grow: self.grow,
            insert: self.insert,
        }
    }

    fn inherit(parent: &ObjectClass, header: Object) -> Self {
        DynamicArrayClass {
            base: parent.derive(header),
            array_init: None,
            set: None,
            get: None,
            add: None,
            pop_back: None,
            resize: None,
            reserve: None,
            shrink_to_fit: None,
            shrink: None,
            grow: None,
            insert: None,
        }
    }

    fn initializer(&self) -> Option<InitFn<DynamicArray>> {
        self.array_init
    }
}

fn slot<F>(slot: Option<F>) -> Result<F> {
    slot.ok_or(Error::NotImplemented)
}

impl DynamicArray {
    /// Number of elements held.
    #[must_use]
    pub fn size(&self) -> usize {
        self.state.borrow().elements.len()
    }

    /// Number of elements the array can hold before it has to grow.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.state.borrow().capacity
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// Returns the element descriptor.
    #[must_use]
    pub fn element_type(&self) -> ElementType {
        self.element
    }

    /// Appends a copy of `element`.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidArgument`] for the wrong element type,
    /// [`Error::OutOfMemory`] when growing fails, or whatever the copy
    /// callback reports.
    pub fn add<E: 'static>(&self, element: &E) -> Result<()> {
        self.element.check::<E>()?;
        let add = slot(self.class_struct().add)?;
        add(self, element)
    }

    /// Returns a copy of the element at `index`.
    ///
    /// `error` must be empty; it receives an `IndexError` when `index` is out
    /// of range.
    ///
    /// # Errors
    ///
    /// [`Error::IndexOutOfRange`] when `index >= size()`,
    /// [`Error::InvalidArgument`] for the wrong element type or a filled
    /// `error`.
    pub fn get<E: 'static>(&self, index: usize, error: &mut Option<Ref<ErrorObject>>) -> Result<E> {
        self.element.check::<E>()?;
        if error.is_some() {
            return Err(Error::InvalidArgument);
        }
        let get = slot(self.class_struct().get)?;
        match get(self, index) {
            Ok(value) => unbox(value),
            Err(err) => Err(self.raise(err, error)),
        }
    }

    /// Stores `element` at `index`, releasing the previous occupant.
    ///
    /// # Errors
    ///
    /// As for [`DynamicArray::get`].
    pub fn set<E: 'static>(
        &self,
        index: usize,
        element: E,
        error: &mut Option<Ref<ErrorObject>>,
    ) -> Result<()> {
        self.element.check::<E>()?;
        if error.is_some() {
            return Err(Error::InvalidArgument);
        }
        let set = slot(self.class_struct().set)?;
        set(self, index, Box::new(element)).map_err(|err| self.raise(err, error))
    }

    /// Moves the last element out.
    ///
    /// # Errors
    ///
    /// [`Error::IndexOutOfRange`] with `index: 0, size: 0` when the array is
    /// empty.
    pub fn pop_back<E: 'static>(&self) -> Result<E> {
        self.element.check::<E>()?;
        let pop_back = slot(self.class_struct().pop_back)?;
        unbox(pop_back(self)?)
    }

    /// Changes the size to `size`, building new elements from `seed`.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidArgument`] for the wrong element type, or whatever
    /// growing or seeding reports.
    pub fn resize<E: 'static>(&self, size: usize, seed: &E) -> Result<()> {
        self.element.check::<E>()?;
        let resize = slot(self.class_struct().resize)?;
        resize(self, size, seed)
    }

    /// Grows capacity to exactly `capacity` if it is currently smaller.
    ///
    /// # Errors
    ///
    /// [`Error::OutOfMemory`] when the storage cannot grow.
    pub fn reserve(&self, capacity: usize) -> Result<()> {
        let reserve = slot(self.class_struct().reserve)?;
        reserve(self, capacity)
    }

    /// Drops spare capacity.
    ///
    /// # Errors
    ///
    /// [`Error::NotImplemented`] when the class has no such slot.
    pub fn shrink_to_fit(&self) -> Result<()> {
        let shrink_to_fit = slot(self.class_struct().shrink_to_fit)?;
        shrink_to_fit(self)
    }

    /// Inserts copies of `elements` before position `pos`.
    ///
    /// # Errors
    ///
    /// [`Error::IndexOutOfRange`] when `pos > size()`, or whatever growing
    /// or copying reports.
    pub fn insert<E: 'static>(&self, pos: usize, elements: &[E]) -> Result<()> {
        self.element.check::<E>()?;
        let insert = slot(self.class_struct().insert)?;
        let elements: Vec<&dyn Any> = elements.iter().map(|e| e as &dyn Any).collect();
        insert(self, pos, &elements)
    }

    /// Copies every element out.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidArgument`] for the wrong element type.
    pub fn to_vec<E: 'static>(&self) -> Result<Vec<E>> {
        self.element.check::<E>()?;
        let get = slot(self.class_struct().get)?;
        (0..self.size()).map(|i| unbox(get(self, i)?)).collect()
    }

    fn state_mut(&self) -> Result<RefMut<'_, ArrayState>> {
        self.state.try_borrow_mut().map_err(|_| {
            debug!(
                "{} modified from inside one of its element callbacks",
                self.header().class().name()
            );
            Error::Runtime
        })
    }

    /// Fills `error` with an `IndexError` for out-of-range failures.
    fn raise(&self, err: Error, error: &mut Option<Ref<ErrorObject>>) -> Error {
        if let Error::IndexOutOfRange { index, .. } = err {
            if let Some(class) = &self.index_error {
                if let Ok(value) = class.new_instance(index) {
                    *error = Some(value.into_parent());
                }
            }
        }
        err
    }
}

impl fmt::Debug for DynamicArray {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DynamicArray")
            .field("element", &self.element)
            .field("size", &self.size())
            .field("capacity", &self.capacity())
            .finish()
    }
}

fn unbox<E: 'static>(value: Box<dyn Any>) -> Result<E> {
    value
        .downcast::<E>()
        .map(|value| *value)
        .map_err(|_| Error::InvalidArgument)
}

fn array_init(class: &DynamicArrayClass, header: Object, config: ArrayConfig) -> Result<DynamicArray> {
    let init = slot(class.base.initialize)?;
    let obj = init(&class.base, header, ())?;
    Ok(DynamicArray {
        obj,
        element: config.element,
        state: RefCell::new(ArrayState::default()),
        index_error: config.index_error,
    })
}

fn out_of_range(index: usize, size: usize) -> Error {
    Error::IndexOutOfRange { index, size }
}

fn array_set(array: &DynamicArray, index: usize, element: Box<dyn Any>) -> Result<()> {
    let element = array.element.admit(element)?;
    let previous = {
        let mut state = array.state_mut()?;
        let size = state.elements.len();
        let occupant = state
            .elements
            .get_mut(index)
            .ok_or_else(|| out_of_range(index, size))?;
        mem::replace(occupant, element)
    };
    array.element.release(previous);
    Ok(())
}

fn array_get(array: &DynamicArray, index: usize) -> Result<Box<dyn Any>> {
    let state = array.state.borrow();
    let element = state
        .elements
        .get(index)
        .ok_or_else(|| out_of_range(index, state.elements.len()))?;
    array.element.copy(&**element)
}

fn array_add(array: &DynamicArray, element: &dyn Any) -> Result<()> {
    let (size, capacity) = {
        let state = array.state.borrow();
        (state.elements.len(), state.capacity)
    };
    if size == capacity {
        let capacity = if capacity == 0 {
            1
        } else {
            capacity.checked_mul(2).ok_or(Error::OutOfMemory)?
        };
        let reserve = slot(array.class_struct().reserve)?;
        reserve(array, capacity)?;
    }

    let copy = array.element.copy(element)?;
    array.state_mut()?.elements.push(copy);
    Ok(())
}

fn array_pop_back(array: &DynamicArray) -> Result<Box<dyn Any>> {
    // Empty: position 0, where the element would have been, is past the end.
    array.state_mut()?.elements.pop().ok_or_else(|| out_of_range(0, 0))
}

fn array_resize(array: &DynamicArray, size: usize, seed: &dyn Any) -> Result<()> {
    let current = array.size();
    if size < current {
        let shrink = slot(array.class_struct().shrink)?;
        shrink(array, size)
    } else if size > current {
        let grow = slot(array.class_struct().grow)?;
        grow(array, size, seed)
    } else {
        Ok(())
    }
}

fn array_reserve(array: &DynamicArray, capacity: usize) -> Result<()> {
    let mut state = array.state_mut()?;
    if capacity <= state.capacity {
        return Ok(());
    }
    let additional = capacity - state.elements.len();
    state
        .elements
        .try_reserve_exact(additional)
        .map_err(|_| Error::OutOfMemory)?;
    state.capacity = capacity;
    Ok(())
}

fn array_shrink_to_fit(array: &DynamicArray) -> Result<()> {
    let mut state = array.state_mut()?;
    state.elements.shrink_to_fit();
    state.capacity = state.elements.len();
    Ok(())
}

fn array_shrink(array: &DynamicArray, size: usize) -> Result<()> {
    let removed: Vec<Box<dyn Any>> = {
        let mut state = array.state_mut()?;
        if size >= state.elements.len() {
            return Ok(());
        }
        state.elements.drain(size..).collect()
    };
    for element in removed {
        array.element.release(element);
    }
    Ok(())
}

fn array_grow(array: &DynamicArray, size: usize, seed: &dyn Any) -> Result<()> {
    let reserve = slot(array.class_struct().reserve)?;
    reserve(array, size)?;
    for _ in array.size()..size {
        let element = array.element.seed(seed)?;
        array.state_mut()?.elements.push(element);
    }
    Ok(())
}

fn array_insert(array: &DynamicArray, pos: usize, elements: &[&dyn Any]) -> Result<()> {
    let size = array.size();
    if pos > size {
        return Err(out_of_range(pos, size));
    }
    let total = size.checked_add(elements.len()).ok_or(Error::OutOfMemory)?;
    let reserve = slot(array.class_struct().reserve)?;
    reserve(array, total)?;

    let copies = elements
        .iter()
        .map(|element| array.element.copy(*element))
        .collect::<Result<Vec<_>>>()?;
    array.state_mut()?.elements.splice(pos..pos, copies).for_each(drop);
    Ok(())
}

unsafe fn array_destroy(obj: NonNull<Object>) {
    let this = obj.cast::<DynamicArray>().as_ptr();
    // SAFETY: the count reached zero; each field of this level is dropped
    // once, then the header level finishes the chain.
    unsafe {
        let elements = mem::take(&mut (*this).state.get_mut().elements);
        for element in elements {
            (*this).element.release(element);
        }
        ptr::drop_in_place(&raw mut (*this).state);
        ptr::drop_in_place(&raw mut (*this).index_error);
        object_destroy(obj);
    }
}

fn array_represent(obj: &Object) -> Result<String> {
    // SAFETY: only instances of `DynamicArray` and its descendants use this slot.
    let array = unsafe { obj.cast_unchecked::<DynamicArray>() };
    Ok(format!(
        "{}(size={}, capacity={}) of {}",
        obj.class().name(),
        array.size(),
        array.capacity(),
        array.element.type_name()
    ))
}

fn array_copy(obj: &Object) -> Result<Ref<Object>> {
    // SAFETY: only instances of `DynamicArray` and its descendants use this slot.
    let array = unsafe { obj.cast_unchecked::<DynamicArray>() };
    let config = ArrayConfig {
        element: array.element,
        index_error: array.index_error.clone(),
    };
    let copy = new_instance(array.class_struct(), config)?;
    copy.reserve(array.capacity())?;

    let add = slot(copy.class_struct().add)?;
    for element in &array.state.borrow().elements {
        add(&*copy, &**element)?;
    }
    Ok(copy.into_object())
}

/// Slot overrides of the `DynamicArray` class.
pub(crate) fn dynamic_array_class_init(class: &mut DynamicArrayClass) -> Result<()> {
    let base = class.class_base_mut();
    base.destroy = array_destroy;
    base.represent = array_represent;
    base.copy = Some(array_copy);

    class.array_init = Some(array_init);
    class.set = Some(array_set);
    class.get = Some(array_get);
    class.add = Some(array_add);
    class.pop_back = Some(array_pop_back);
    class.resize = Some(array_resize);
    class.reserve = Some(array_reserve);
    class.shrink_to_fit = Some(array_shrink_to_fit);
    class.shrink = Some(array_shrink);
    class.grow = Some(array_grow);
    class.insert = Some(array_insert);
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
    fn test_add_grows_by_doubling() {
        let runtime = runtime();
        let array = runtime.new_dynamic_array(ElementType::of::<u32>()).unwrap();
        assert_eq!(array.capacity(), 0);

        let mut seen = Vec::new();
        for i in 0..10u32 {
            array.add(&i).unwrap();
            seen.push(array.capacity());
        }
        assert_eq!(seen, [1, 2, 4, 4, 8, 8, 8, 8, 16, 16]);
        assert_eq!(array.to_vec::<u32>().unwrap(), (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn test_reserve_is_exact() {
        let runtime = runtime();
        let array = runtime.new_dynamic_array(ElementType::of::<u32>()).unwrap();

        array.reserve(10).unwrap();
        assert_eq!(array.capacity(), 10);
        array.reserve(3).unwrap();
        assert_eq!(array.capacity(), 10);
    }

    #[test]
    fn test_get_out_of_range_fills_error() {
        let runtime = runtime();
        let array = runtime.new_dynamic_array(ElementType::of::<u32>()).unwrap();

        let mut error = None;
        let result = array.get::<u32>(0, &mut error);
        assert_eq!(result, Err(Error::IndexOutOfRange { index: 0, size: 0 }));

        let error = error.unwrap();
        assert!(error.msg().unwrap().contains('0'));
        assert!(error.header().is_instance_of(runtime.index_error_class().unwrap().class_base()));
    }

    #[test]
    fn test_get_requires_empty_error() {
        let runtime = runtime();
        let array = runtime.new_dynamic_array(ElementType::of::<u32>()).unwrap();
        array.add(&1u32).unwrap();

        let mut error = Some(runtime.new_error().unwrap());
        assert_eq!(array.get::<u32>(0, &mut error), Err(Error::InvalidArgument));
    }

    #[test]
    fn test_wrong_element_type() {
        let runtime = runtime();
        let array = runtime.new_dynamic_array(ElementType::of::<u32>()).unwrap();

        assert_eq!(array.add(&1i64), Err(Error::InvalidArgument));
        assert_eq!(array.pop_back::<String>(), Err(Error::InvalidArgument));
    }

    #[test]
    fn test_set_replaces() {
        let runtime = runtime();
        let array = runtime.new_dynamic_array(ElementType::of::<String>()).unwrap();
        array.add(&"a".to_owned()).unwrap();

        let mut error = None;
        array.set(0, "b".to_owned(), &mut error).unwrap();
        assert_eq!(array.get::<String>(0, &mut error).unwrap(), "b");
        assert!(error.is_none());

        assert!(array.set(1, "c".to_owned(), &mut error).is_err());
        assert_eq!(error.unwrap().msg().unwrap(), "index 1 is out of range");
    }

    #[test]
    fn test_pop_back() {
        let runtime = runtime();
        let array = runtime.new_dynamic_array(ElementType::of::<u8>()).unwrap();
        array.add(&1u8).unwrap();
        array.add(&2u8).unwrap();

        assert_eq!(array.pop_back::<u8>(), Ok(2));
        assert_eq!(array.pop_back::<u8>(), Ok(1));
        assert_eq!(
            array.pop_back::<u8>(),
            Err(Error::IndexOutOfRange { index: 0, size: 0 })
        );
        assert_eq!(array.capacity(), 2);
    }

    #[test]
    fn test_resize_both_ways() {
        let runtime = runtime();
        let array = runtime.new_dynamic_array(ElementType::of::<i32>()).unwrap();

        array.resize(4, &7i32).unwrap();
        assert_eq!(array.to_vec::<i32>().unwrap(), [7, 7, 7, 7]);
        assert_eq!(array.capacity(), 4);

        array.resize(1, &0i32).unwrap();
        assert_eq!(array.to_vec::<i32>().unwrap(), [7]);
        assert_eq!(array.capacity(), 4);
    }

    #[test]
    fn test_grow_uses_init_callback() {
        fn doubled(seed: &dyn Any) -> Result<Box<dyn Any>> {
            let seed = seed.downcast_ref::<i32>().ok_or(Error::InvalidArgument)?;
            Ok(Box::new(seed * 2))
        }

        let runtime = runtime();
        let element = ElementType::of::<i32>().with_init(doubled);
        let array = runtime.new_dynamic_array(element).unwrap();

        array.resize(2, &21i32).unwrap();
        assert_eq!(array.to_vec::<i32>().unwrap(), [42, 42]);
    }

    #[test]
    fn test_insert_past_end() {
        let runtime = runtime();
        let array = runtime.new_dynamic_array(ElementType::of::<i32>()).unwrap();
        array.add(&1i32).unwrap();

        assert_eq!(
            array.insert(2, &[5i32]),
            Err(Error::IndexOutOfRange { index: 2, size: 1 })
        );
        array.insert(1, &[5i32, 6]).unwrap();
        assert_eq!(array.to_vec::<i32>().unwrap(), [1, 5, 6]);
        assert_eq!(array.capacity(), 3);
    }

    #[test]
    fn test_copy_is_deep() {
        let runtime = runtime();
        let array = runtime.new_dynamic_array(ElementType::of::<String>()).unwrap();
        array.add(&"x".to_owned()).unwrap();
        array.reserve(8).unwrap();

        let copy = array
            .as_object()
            .copy()
            .unwrap()
            .downcast(runtime.dynamic_array_class().unwrap())
            .unwrap();
        assert_eq!(copy.capacity(), 8);

        let mut error = None;
        copy.set(0, "y".to_owned(), &mut error).unwrap();
        assert_eq!(array.to_vec::<String>().unwrap(), ["x"]);
        assert_eq!(copy.to_vec::<String>().unwrap(), ["y"]);
    }

    thread_local! {
        static REENTER: RefCell<Option<Ref<DynamicArray>>> = const { RefCell::new(None) };
        static REENTRY_RESULT: RefCell<Option<Result<()>>> = const { RefCell::new(None) };
    }

    fn reentrant_copy(value: &dyn Any) -> Result<Box<dyn Any>> {
        if let Some(array) = REENTER.with(|target| target.borrow_mut().take()) {
            let result = array.add(&9i32);
            REENTRY_RESULT.with(|slot| *slot.borrow_mut() = Some(result));
        }
        clone_element::<i32>(value)
    }

    #[test]
    fn test_callback_cannot_modify_array_during_get() {
        let runtime = runtime();
        let element = ElementType::of::<i32>().with_copy(reentrant_copy);
        let array = runtime.new_dynamic_array(element).unwrap();
        array.add(&1).unwrap();

        REENTER.with(|target| *target.borrow_mut() = Some(array.clone()));
        let mut error = None;
        assert_eq!(array.get::<i32>(0, &mut error), Ok(1));

        let result = REENTRY_RESULT.with(|slot| slot.borrow_mut().take());
        assert_eq!(result, Some(Err(Error::Runtime)));
        assert_eq!(array.to_vec::<i32>().unwrap(), [1]);
        assert_eq!(array.refcount(), 1);
    }

    #[test]
    fn test_represent() {
        let runtime = runtime();
        let array = runtime.new_dynamic_array(ElementType::of::<u16>()).unwrap();
        array.add(&3u16).unwrap();

        assert_eq!(
            array.as_object().represent().unwrap(),
            "DynamicArray(size=1, capacity=1) of u16"
        );
    }
}
