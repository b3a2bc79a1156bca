//! Archetype storage for the ECS.
//!
//! An [`Archetype`] stores all entities that share the exact same
//! [`CompositeType`]. Within each archetype, components are laid out in a
//! Structure-of-Arrays (SoA) pattern: one [`Column`] per component type, in
//! column-index order, plus a parallel `Vec<EntityId>` that maps row index to
//! entity. The length of that vector is the archetype's row count.
//!
//! # Safety
//!
//! This module contains `unsafe` code in [`Column`] because component data is
//! stored as type-erased byte buffers. Every column carries the
//! [`ComponentType`] it was created for, and values only enter a column
//! through typed pushes or through another column of the same component, so
//! the drop function and layout used on the bytes always match.
// Note: unsafe_code is allowed on this module via #[allow(unsafe_code)] in lib.rs

use std::alloc::{self, Layout};
use std::any::TypeId;
use std::fmt;
use std::mem::ManuallyDrop;
use std::ptr;

use serde::{Deserialize, Serialize};

use crate::bundle::ComponentBundle;
use crate::component::{Component, ComponentId, ComponentType};
use crate::composite::CompositeType;
use crate::entity::EntityId;

// ---------------------------------------------------------------------------
// ArchetypeId
// ---------------------------------------------------------------------------

/// Identifies an archetype within the world. Allocated monotonically; an
/// archetype that is deleted and later recreated receives a fresh id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ArchetypeId(pub(crate) u32);

impl ArchetypeId {
    /// Raw numeric value.
    #[inline]
    pub fn index(self) -> u32 {
        self.0
    }
}

impl fmt::Display for ArchetypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "a{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Column -- type-erased component storage
// ---------------------------------------------------------------------------

/// A type-erased, densely packed array of component values of a single type.
///
/// Internally this is a manually managed byte buffer whose layout matches the
/// stored component type, so `byte_len() == len() * size`.
pub struct Column {
    /// Pointer to the heap allocation (null when nothing is allocated).
    data: *mut u8,
    /// Number of live elements.
    len: usize,
    /// Number of elements that fit in the current allocation.
    capacity: usize,
    /// The component type stored here.
    desc: ComponentType,
}

// Column only stores raw bytes of `Component` types, which are Send + Sync.
unsafe impl Send for Column {}
unsafe impl Sync for Column {}

impl Column {
    /// Create a new, empty column. Storage is allocated on first push.
    pub fn new(desc: ComponentType) -> Self {
        Self {
            data: ptr::null_mut(),
            len: 0,
            capacity: 0,
            desc,
        }
    }

    /// The component stored in this column.
    #[inline]
    pub fn component(&self) -> ComponentId {
        self.desc.id
    }

    /// Descriptor of the stored component type.
    #[inline]
    pub fn descriptor(&self) -> &ComponentType {
        &self.desc
    }

    /// Number of stored elements.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the column is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Bytes occupied by live elements.
    #[inline]
    pub fn byte_len(&self) -> usize {
        self.len * self.desc.size
    }

    // -- internal helpers ---------------------------------------------------

    fn layout_for_capacity(&self, cap: usize) -> Option<Layout> {
        if self.desc.size == 0 || cap == 0 {
            return None;
        }
        let size = self.desc.size.checked_mul(cap)?;
        Layout::from_size_align(size, self.desc.align).ok()
    }

    fn grow_if_needed(&mut self) {
        if self.len < self.capacity {
            return;
        }
        let new_cap = if self.capacity == 0 {
            4
        } else {
            self.capacity * 2
        };
        if self.desc.size == 0 {
            // ZST: no actual allocation needed.
            self.capacity = new_cap;
            return;
        }
        let new_layout = self
            .layout_for_capacity(new_cap)
            .expect("column layout overflow");
        unsafe {
            let new_data = if self.capacity == 0 {
                alloc::alloc(new_layout)
            } else {
                let old_layout = self
                    .layout_for_capacity(self.capacity)
                    .expect("old layout must be valid");
                alloc::realloc(self.data, old_layout, new_layout.size())
            };
            if new_data.is_null() {
                alloc::handle_alloc_error(new_layout);
            }
            self.data = new_data;
        }
        self.capacity = new_cap;
    }

    /// Start of the element array. For zero-sized types, or before the first
    /// allocation, this is a dangling pointer with the right alignment.
    #[inline]
    pub(crate) fn base_ptr(&self) -> *mut u8 {
        if self.data.is_null() {
            return ptr::without_provenance_mut(self.desc.align);
        }
        self.data
    }

    /// Panics unless `other` stores the same Rust type under the same id.
    fn assert_same_type(&self, other: &Column) {
        assert!(
            self.desc.id == other.desc.id && self.desc.type_id == other.desc.type_id,
            "column type mismatch: {} {} vs {} {}",
            self.desc.id,
            self.desc.name,
            other.desc.id,
            other.desc.name
        );
    }

    #[inline]
    fn ptr_at(&self, index: usize) -> *mut u8 {
        debug_assert!(index < self.len);
        if self.desc.size == 0 {
            return self.base_ptr();
        }
        unsafe { self.data.add(index * self.desc.size) }
    }

    /// Move the element at `last` into the hole at `index`. The hole must
    /// already have been vacated (dropped or moved out).
    unsafe fn fill_hole_from_last(&mut self, index: usize) {
        let last = self.len - 1;
        if index != last && self.desc.size > 0 {
            ptr::copy_nonoverlapping(self.ptr_at(last), self.ptr_at(index), self.desc.size);
        }
        self.len -= 1;
    }

    // -- element access -----------------------------------------------------

    /// Push a value onto the end of the column.
    ///
    /// # Safety
    ///
    /// `value_ptr` must point to a valid, initialised instance of the
    /// column's component type. Ownership is *moved* into the column (the
    /// caller must not drop the source).
    pub(crate) unsafe fn push_raw(&mut self, value_ptr: *const u8) {
        self.grow_if_needed();
        self.len += 1;
        if self.desc.size > 0 {
            ptr::copy_nonoverlapping(value_ptr, self.ptr_at(self.len - 1), self.desc.size);
        }
    }

    /// Push a typed value onto the end of the column.
    ///
    /// # Panics
    ///
    /// Panics if `T` is not the column's component type.
    pub(crate) fn push<T: Component>(&mut self, value: T) {
        assert_eq!(
            self.desc.type_id,
            TypeId::of::<T>(),
            "pushed a {} into a column of {}",
            std::any::type_name::<T>(),
            self.desc.name
        );
        let value = ManuallyDrop::new(value);
        unsafe { self.push_raw(&*value as *const T as *const u8) }
    }

    /// Typed reference to the element at `index`.
    pub fn get<T: Component>(&self, index: usize) -> Option<&T> {
        if index >= self.len || self.desc.type_id != TypeId::of::<T>() {
            return None;
        }
        Some(unsafe { &*(self.ptr_at(index) as *const T) })
    }

    /// Typed mutable reference to the element at `index`.
    pub fn get_mut<T: Component>(&mut self, index: usize) -> Option<&mut T> {
        if index >= self.len || self.desc.type_id != TypeId::of::<T>() {
            return None;
        }
        Some(unsafe { &mut *(self.ptr_at(index) as *mut T) })
    }

    /// Swap-remove the element at `index`, dropping it. The last element is
    /// moved into its place.
    pub(crate) fn swap_remove(&mut self, index: usize) {
        assert!(index < self.len, "row {index} out of bounds ({})", self.len);
        unsafe {
            self.desc.vtable.drop_value(self.ptr_at(index));
            self.fill_hole_from_last(index);
        }
    }

    /// Swap-remove the element at `index` *without* dropping it, appending it
    /// to `dst` instead. The last element is moved into the gap.
    pub(crate) fn swap_remove_into(&mut self, index: usize, dst: &mut Column) {
        assert!(index < self.len, "row {index} out of bounds ({})", self.len);
        self.assert_same_type(dst);
        unsafe {
            dst.push_raw(self.ptr_at(index));
            self.fill_hole_from_last(index);
        }
    }

    /// Move every element of `src` onto the end of this column, leaving
    /// `src` empty.
    pub(crate) fn append(&mut self, src: &mut Column) {
        self.assert_same_type(src);
        for i in 0..src.len {
            unsafe { self.push_raw(src.ptr_at(i)) };
        }
        // Ownership moved; src must not drop them.
        src.len = 0;
    }

    /// Replace the element at `index` with the single element of `src`,
    /// dropping the old value.
    pub(crate) fn overwrite_from(&mut self, index: usize, src: &mut Column) {
        assert!(index < self.len, "row {index} out of bounds ({})", self.len);
        self.assert_same_type(src);
        assert_eq!(src.len, 1, "overwrite source must hold exactly one value");
        unsafe {
            let dst = self.ptr_at(index);
            self.desc.vtable.drop_value(dst);
            if self.desc.size > 0 {
                ptr::copy_nonoverlapping(src.ptr_at(0), dst, self.desc.size);
            }
        }
        src.len = 0;
    }
}

impl Drop for Column {
    fn drop(&mut self) {
        if self.desc.vtable.needs_drop {
            for i in 0..self.len {
                unsafe { self.desc.vtable.drop_value(self.ptr_at(i)) };
            }
        }
        if let Some(layout) = self.layout_for_capacity(self.capacity) {
            unsafe { alloc::dealloc(self.data, layout) };
        }
    }
}

impl fmt::Debug for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Column")
            .field("component", &self.desc.id)
            .field("name", &self.desc.name)
            .field("len", &self.len)
            .field("capacity", &self.capacity)
            .field("item_size", &self.desc.size)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Archetype
// ---------------------------------------------------------------------------

/// An archetype stores all entities that share the exact same set of
/// component types. Components are laid out SoA-style: one [`Column`] per
/// type, plus a parallel entity ID vector.
///
/// `columns[i]` stores the component at column index `i` of the archetype's
/// composite type, which is ascending by [`ComponentId`].
#[derive(Debug)]
pub struct Archetype {
    /// Unique identifier of this archetype.
    id: ArchetypeId,
    /// Schema shared by every row.
    ty: CompositeType,
    /// One column per component type, in column-index order.
    columns: Vec<Column>,
    /// Row -> entity. Its length is the row count.
    entities: Vec<EntityId>,
}

impl Archetype {
    /// Create a new, empty archetype with one empty column per component.
    pub fn new(id: ArchetypeId, ty: CompositeType) -> Self {
        let columns = ty.descriptors().map(|desc| Column::new(*desc)).collect();
        Self {
            id,
            ty,
            columns,
            entities: Vec::new(),
        }
    }

    /// The archetype's unique ID.
    #[inline]
    pub fn id(&self) -> ArchetypeId {
        self.id
    }

    /// The composite type that defines this archetype.
    #[inline]
    pub fn composite_type(&self) -> &CompositeType {
        &self.ty
    }

    /// Whether this archetype contains the given component type.
    #[inline]
    pub fn has_component(&self, component: ComponentId) -> bool {
        self.ty.contains(component)
    }

    /// Number of rows (entities) stored in this archetype.
    #[inline]
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// Whether this archetype holds no rows.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// The entity IDs stored in this archetype, indexed by row.
    #[inline]
    pub fn entities(&self) -> &[EntityId] {
        &self.entities
    }

    /// All columns in column-index order.
    #[inline]
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// The column at `index`.
    #[inline]
    pub fn column(&self, index: usize) -> Option<&Column> {
        self.columns.get(index)
    }

    /// Start of the raw bytes of column `index`. For zero-sized components
    /// or an unallocated column this is an aligned dangling pointer.
    pub fn column_base(&self, index: usize) -> Option<*const u8> {
        self.columns.get(index).map(|c| c.base_ptr() as *const u8)
    }

    /// The column holding `component`.
    pub fn column_for(&self, component: ComponentId) -> Option<&Column> {
        self.ty.column_of(component).map(|i| &self.columns[i])
    }

    pub(crate) fn column_for_mut(&mut self, component: ComponentId) -> Option<&mut Column> {
        self.ty.column_of(component).map(|i| &mut self.columns[i])
    }

    /// Append one row. `row` must hold exactly one value for every component
    /// of this archetype; the values are moved into the columns.
    ///
    /// Returns the new row index.
    ///
    /// # Panics
    ///
    /// Panics if the bundle's component set differs from the archetype's
    /// composite type. Nothing is written in that case.
    pub fn append_row(&mut self, entity: EntityId, mut row: ComponentBundle) -> usize {
        assert!(
            row.descriptors()
                .map(|d| (d.id, d.type_id))
                .eq(self.ty.descriptors().map(|d| (d.id, d.type_id))),
            "component set {:?} does not match archetype {} schema {:?}",
            row.descriptors().map(|d| d.name).collect::<Vec<_>>(),
            self.id,
            self.ty.descriptors().map(|d| d.name).collect::<Vec<_>>()
        );
        for (column, src) in self.columns.iter_mut().zip(row.columns_mut()) {
            column.append(src);
        }
        let new_row = self.entities.len();
        self.entities.push(entity);
        new_row
    }

    /// Substitute every column buffer and the row -> entity vector
    /// wholesale. Previous contents are dropped.
    ///
    /// # Panics
    ///
    /// Panics unless `columns` matches the composite type column by column
    /// and every column holds exactly `entities.len()` rows.
    pub fn replace_columns(&mut self, columns: Vec<Column>, entities: Vec<EntityId>) {
        assert_eq!(
            columns.len(),
            self.columns.len(),
            "replacement column count does not match archetype {}",
            self.id
        );
        for (index, column) in columns.iter().enumerate() {
            let expected = self.columns[index].descriptor();
            assert!(
                column.component() == expected.id && column.descriptor().type_id == expected.type_id,
                "replacement column {index} holds the wrong component"
            );
            assert_eq!(
                column.len(),
                entities.len(),
                "replacement column {index} row count does not match entity count"
            );
        }
        self.columns = columns;
        self.entities = entities;
    }

    /// Remove the entity at `row`, using swap-remove to keep storage dense.
    /// All of its component values are dropped.
    ///
    /// Returns the entity that was moved into `row` (the previous last
    /// entity) if any swap occurred, or `None` if the removed row was last.
    pub fn remove_row(&mut self, row: usize) -> Option<EntityId> {
        assert!(row < self.entities.len(), "row {row} out of bounds ({})", self.len());
        let last = self.entities.len() - 1;
        self.entities.swap_remove(row);
        for column in &mut self.columns {
            column.swap_remove(row);
        }
        (row < last).then(|| self.entities[row])
    }

    /// Excise the entity at `row` with swap-remove. Values of components for
    /// which `keep` returns true are moved into the returned bundle; the
    /// others are dropped.
    ///
    /// Also returns the entity that was moved into `row`, if any.
    pub fn extract_row(
        &mut self,
        row: usize,
        keep: impl Fn(ComponentId) -> bool,
    ) -> (ComponentBundle, Option<EntityId>) {
        assert!(row < self.entities.len(), "row {row} out of bounds ({})", self.len());
        let last = self.entities.len() - 1;
        self.entities.swap_remove(row);

        let mut kept = ComponentBundle::new();
        for column in &mut self.columns {
            if keep(column.component()) {
                let mut fresh = Column::new(*column.descriptor());
                column.swap_remove_into(row, &mut fresh);
                kept.insert_column(fresh);
            } else {
                column.swap_remove(row);
            }
        }

        let displaced = (row < last).then(|| self.entities[row]);
        (kept, displaced)
    }

    /// Replace the values at `row` with those in `values`, dropping the old
    /// ones. Components of `values` that are not part of this archetype are
    /// left in the bundle.
    pub(crate) fn overwrite_row(&mut self, row: usize, values: &mut ComponentBundle) {
        for src in values.columns_mut() {
            if let Some(column) = self.column_for_mut(src.component()) {
                column.overwrite_from(row, src);
            }
        }
        values.retain_non_empty();
    }

    /// Get a reference to a component value.
    ///
    /// Returns `None` if the component is not part of this archetype, `row`
    /// is out of range, or `T` is not the component's type.
    pub fn get<T: Component>(&self, row: usize, component: ComponentId) -> Option<&T> {
        self.column_for(component)?.get(row)
    }

    /// Get a mutable reference to a component value.
    pub fn get_mut<T: Component>(&mut self, row: usize, component: ComponentId) -> Option<&mut T> {
        self.column_for_mut(component)?.get_mut(row)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
