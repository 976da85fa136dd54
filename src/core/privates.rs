//! Private Slot Allocator
//!
//! Hands out stable indices into the per-object private arrays. There is
//! one index table per object kind, owned by the parent kind. Growing a
//! table runs a reallocation step supplied by the owner which has to
//! resize every live object of that kind; if it fails, the table rolls
//! back and the allocation fails as a whole.

use std::any::Any;
use std::fmt;
use std::marker::PhantomData;

use tracing::debug;

use crate::core::object::ObjectKind;
use crate::error::PrivateError;

/// Index table for one object kind
#[derive(Debug)]
pub struct PrivateIndexTable {
    kind: ObjectKind,
    /// `in_use[i]` is true while index `i` is handed out
    in_use: Vec<bool>,
    /// Hard upper bound on the table size
    limit: usize,
}

impl PrivateIndexTable {
    pub fn new(kind: ObjectKind) -> Self {
        Self::with_limit(kind, usize::MAX)
    }

    /// Table that refuses to grow past `limit` indices
    pub fn with_limit(kind: ObjectKind, limit: usize) -> Self {
        Self {
            kind,
            in_use: Vec::new(),
            limit,
        }
    }

    pub fn kind(&self) -> ObjectKind {
        self.kind
    }

    /// High-water mark: every live object has at least this many slots
    pub fn len(&self) -> usize {
        self.in_use.len()
    }

    pub fn is_empty(&self) -> bool {
        self.in_use.is_empty()
    }

    pub fn set_limit(&mut self, limit: usize) {
        self.limit = limit;
    }

    pub fn is_allocated(&self, index: usize) -> bool {
        self.in_use.get(index).copied().unwrap_or(false)
    }

    /// Allocate the lowest free index
    ///
    /// When no index is free the table grows by one and `realloc` is called
    /// with the new length. If `realloc` fails the table is left as it was.
    pub fn allocate<F>(&mut self, realloc: F) -> Result<usize, PrivateError>
    where
        F: FnOnce(usize) -> Result<(), PrivateError>,
    {
        if let Some(index) = self.in_use.iter().position(|used| !used) {
            self.in_use[index] = true;
            debug!("Reusing {} private index {}", self.kind, index);
            return Ok(index);
        }

        let index = self.in_use.len();
        if index >= self.limit {
            return Err(PrivateError::Exhausted { kind: self.kind });
        }

        self.in_use.push(true);
        if let Err(e) = realloc(self.in_use.len()) {
            self.in_use.pop();
            debug!("Growing {} privates to {} failed, rolled back", self.kind, index + 1);
            return Err(e);
        }

        debug!("Allocated {} private index {}", self.kind, index);
        Ok(index)
    }

    /// Mark `index` reusable. Object storage is never shrunk.
    pub fn free(&mut self, index: usize) -> bool {
        match self.in_use.get_mut(index) {
            Some(used) if *used => {
                *used = false;
                debug!("Freed {} private index {}", self.kind, index);
                true
            }
            _ => false,
        }
    }
}

/// Typed handle to a private slot
pub struct PrivateKey<T> {
    kind: ObjectKind,
    index: usize,
    _marker: PhantomData<fn() -> T>,
}

impl<T> PrivateKey<T> {
    pub(crate) fn new(kind: ObjectKind, index: usize) -> Self {
        Self {
            kind,
            index,
            _marker: PhantomData,
        }
    }

    pub fn kind(&self) -> ObjectKind {
        self.kind
    }

    pub fn index(&self) -> usize {
        self.index
    }
}

impl<T> Clone for PrivateKey<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for PrivateKey<T> {}

impl<T> fmt::Debug for PrivateKey<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PrivateKey({} #{})", self.kind, self.index)
    }
}

impl<T> PartialEq for PrivateKey<T> {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind && self.index == other.index
    }
}

/// Per-object private slot array
#[derive(Default)]
pub struct Privates {
    slots: Vec<Option<Box<dyn Any>>>,
}

impl fmt::Debug for Privates {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let used = self.slots.iter().filter(|s| s.is_some()).count();
        write!(f, "Privates({} slots, {} used)", self.slots.len(), used)
    }
}

impl Privates {
    pub fn with_len(len: usize) -> Self {
        let mut slots = Vec::with_capacity(len);
        slots.resize_with(len, || None);
        Self { slots }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Value in the slot, `None` if never written or of another type
    pub fn get<T: 'static>(&self, key: PrivateKey<T>) -> Option<&T> {
        self.slots.get(key.index)?.as_ref()?.downcast_ref()
    }

    pub fn get_mut<T: 'static>(&mut self, key: PrivateKey<T>) -> Option<&mut T> {
        self.slots.get_mut(key.index)?.as_mut()?.downcast_mut()
    }

    pub fn set<T: 'static>(&mut self, key: PrivateKey<T>, value: T) -> Result<(), PrivateError> {
        let len = self.slots.len();
        let slot = self
            .slots
            .get_mut(key.index)
            .ok_or(PrivateError::OutOfRange { index: key.index, len })?;
        *slot = Some(Box::new(value));
        Ok(())
    }

    pub fn take<T: 'static>(&mut self, key: PrivateKey<T>) -> Option<T> {
        let slot = self.slots.get_mut(key.index)?;
        match slot.take()?.downcast::<T>() {
            Ok(value) => Some(*value),
            Err(other) => {
                // Wrong type, leave it where it was
                *slot = Some(other);
                None
            }
        }
    }

    /// Empty one slot, used when its index is freed
    pub fn clear_index(&mut self, index: usize) {
        if let Some(slot) = self.slots.get_mut(index) {
            *slot = None;
        }
    }

    pub fn clear(&mut self) {
        self.slots.iter_mut().for_each(|s| *s = None);
    }

    fn reserve_to(&mut self, len: usize) -> Result<(), std::collections::TryReserveError> {
        let additional = len.saturating_sub(self.slots.len());
        self.slots.try_reserve(additional)
    }

    fn grow_to(&mut self, len: usize) {
        if self.slots.len() < len {
            self.slots.resize_with(len, || None);
        }
    }
}

/// Resize every object in `objects` to `len` slots, or none of them
///
/// Memory is reserved on all objects first; the resize itself cannot fail.
pub fn grow_all<'a, I>(kind: ObjectKind, objects: I, len: usize) -> Result<(), PrivateError>
where
    I: IntoIterator<Item = &'a mut Privates>,
{
    let mut objects: Vec<&mut Privates> = objects.into_iter().collect();
    for privates in objects.iter_mut() {
        privates
            .reserve_to(len)
            .map_err(|_| PrivateError::Exhausted { kind })?;
    }
    for privates in objects.iter_mut() {
        privates.grow_to(len);
    }
    Ok(())
}
