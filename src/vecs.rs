use std::{
    alloc,
    alloc::Layout,
    cmp::Ordering,
    mem,
    ops::{Deref, DerefMut},
    ptr,
    ptr::NonNull,
};

/// Marker for a failed node array allocation, mapped to [`crate::Error::AllocationFailed`].
pub(crate) struct AllocFailed;

/// Basic vec, does not have own capacity or length, just a pointer to memory.
/// Kind-of cribbed from <https://doc.rust-lang.org/nomicon/vec/vec-final.html>.
struct BasicVec<T> {
    p: NonNull<T>,
}

unsafe impl<T: Send> Send for BasicVec<T> {}
unsafe impl<T: Sync> Sync for BasicVec<T> {}

impl<T> Default for BasicVec<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> BasicVec<T> {
    /// Construct new `BasicVec`.
    pub fn new() -> Self {
        Self {
            p: NonNull::dangling(),
        }
    }

    /// Get mutable raw pointer to specified element.
    /// # Safety
    /// index must be < set capacity.
    #[inline]
    pub unsafe fn ix(&self, index: usize) -> *mut T {
        self.p.as_ptr().add(index)
    }

    /// Allocate memory for `cap` elements. Fails rather than aborting, so the
    /// caller can surface an allocation error without touching any node.
    /// # Safety
    ///
    /// No capacity may have been set yet.
    pub unsafe fn try_alloc(&mut self, cap: usize) -> Result<(), AllocFailed> {
        if mem::size_of::<T>() == 0 || cap == 0 {
            return Ok(());
        }
        let layout = Layout::array::<T>(cap).map_err(|_| AllocFailed)?;
        let new_ptr = alloc::alloc(layout);
        self.p = NonNull::new(new_ptr.cast::<T>()).ok_or(AllocFailed)?;
        Ok(())
    }

    /// Free memory.
    /// # Safety
    ///
    /// The capacity must be the capacity allocated.
    pub unsafe fn free(&mut self, cap: usize) {
        let elem_size = mem::size_of::<T>();

        if cap != 0 && elem_size != 0 && self.p != NonNull::dangling() {
            alloc::dealloc(
                self.p.as_ptr().cast::<u8>(),
                Layout::array::<T>(cap).unwrap(),
            );
            self.p = NonNull::dangling();
        }
    }

    /// Set value.
    /// # Safety
    ///
    /// ix must be < capacity, and the element must be unset.
    #[inline]
    pub unsafe fn set(&mut self, ix: usize, elem: T) {
        ptr::write(self.ix(ix), elem);
    }

    /// Get value.
    /// # Safety
    ///
    /// ix must be < capacity, and the element must have been set.
    #[inline]
    pub unsafe fn get(&mut self, ix: usize) -> T {
        ptr::read(self.ix(ix))
    }

    /// Get whole as slice.
    /// # Safety
    ///
    /// len must be <= capacity and 0..len elements must have been set.
    #[inline]
    pub unsafe fn slice(&self, len: usize) -> &[T] {
        std::slice::from_raw_parts(self.p.as_ptr(), len)
    }

    /// Get whole as mut slice.
    /// # Safety
    ///
    /// len must be <= capacity and 0..len elements must have been set.
    #[inline]
    pub unsafe fn slice_mut(&mut self, len: usize) -> &mut [T] {
        std::slice::from_raw_parts_mut(self.p.as_ptr(), len)
    }

    /// Move elements.
    /// # Safety
    ///
    /// The set status of the elements changes in the obvious way. from, to and len must be in range.
    pub unsafe fn move_self(&mut self, from: usize, to: usize, len: usize) {
        ptr::copy(self.ix(from), self.ix(to), len);
    }

    /// Move elements from another `BasicVec`.
    /// # Safety
    ///
    /// The set status of the elements changes in the obvious way. from, to and len must be in range.
    pub unsafe fn move_from(&mut self, from: usize, src: &mut Self, to: usize, len: usize) {
        ptr::copy_nonoverlapping(src.ix(from), self.ix(to), len);
    }
}

/// In debug mode or feature unsafe-optim not enabled, same as assert! otherwise does nothing.
#[cfg(any(debug_assertions, not(feature = "unsafe-optim")))]
macro_rules! safe_assert {
    ( $cond: expr ) => {
        assert!($cond)
    };
}

/// In debug mode or feature unsafe-optim not enabled, same as assert! otherwise does nothing.
#[cfg(all(not(debug_assertions), feature = "unsafe-optim"))]
macro_rules! safe_assert {
    ( $cond: expr ) => {};
}

/// Key or child array of a node. Capacity is not stored here: all arrays of
/// one size class share the capacity held in the tree's layout descriptor.
/// There is no `Drop` impl for the same reason; the tree frees each array
/// exactly once, passing the class capacity back in.
pub(crate) struct NodeVec<T> {
    len: usize,
    v: BasicVec<T>,
}

impl<T> Default for NodeVec<T> {
    fn default() -> Self {
        let v = BasicVec::new();
        Self { len: 0, v }
    }
}

impl<T> NodeVec<T> {
    /// Allocate an array of the given capacity, or report allocation failure
    /// leaving nothing to clean up.
    pub fn try_new(cap: usize) -> Result<Self, AllocFailed> {
        let mut v = BasicVec::new();
        unsafe {
            v.try_alloc(cap)?;
        }
        Ok(Self { len: 0, v })
    }

    /// Drop all elements and release the memory.
    pub fn free(&mut self, cap: usize) {
        let mut len = self.len;
        self.len = 0;
        while len > 0 {
            len -= 1;
            unsafe {
                self.v.get(len);
            }
        }
        unsafe {
            self.v.free(cap);
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// # Safety
    ///
    /// Capacity must be greater than len.
    #[inline]
    pub unsafe fn push(&mut self, value: T) {
        unsafe {
            self.v.set(self.len, value);
        }
        self.len += 1;
    }

    #[inline]
    pub fn pop(&mut self) -> Option<T> {
        if self.len == 0 {
            None
        } else {
            self.len -= 1;
            unsafe { Some(self.v.get(self.len)) }
        }
    }

    /// # Safety
    ///
    /// Capacity must be greater than len.
    pub unsafe fn insert(&mut self, at: usize, value: T) {
        unsafe {
            if at < self.len {
                self.v.move_self(at, at + 1, self.len - at);
            }
            self.v.set(at, value);
            self.len += 1;
        }
    }

    pub fn remove(&mut self, at: usize) -> T {
        safe_assert!(at < self.len);
        unsafe {
            let result = self.v.get(at);
            self.v.move_self(at + 1, at, self.len - at - 1);
            self.len -= 1;
            result
        }
    }

    /// Move the elements from `at` onward into `dst`, which must be empty.
    /// Used by node splits; `dst` is allocated by the caller beforehand so a
    /// failed allocation never leaves a half-split node.
    /// # Safety
    ///
    /// `dst` capacity must be at least `len - at`.
    pub unsafe fn split_into(&mut self, at: usize, dst: &mut Self) {
        safe_assert!(at < self.len && dst.len == 0);
        let len = self.len - at;
        unsafe {
            dst.v.move_from(at, &mut self.v, 0, len);
        }
        dst.len = len;
        self.len -= len;
    }

    /// Move all elements of `src` onto the end of `self`, leaving `src` empty.
    /// Used by node merges; no allocation takes place.
    /// # Safety
    ///
    /// Capacity must be at least `len + src.len`.
    pub unsafe fn append_from(&mut self, src: &mut Self) {
        unsafe {
            self.v.move_from(0, &mut src.v, self.len, src.len);
        }
        self.len += src.len;
        src.len = 0;
    }

    /// Get reference to ith element.
    #[inline]
    pub fn ix(&self, ix: usize) -> &T {
        safe_assert!(ix < self.len);
        unsafe { &*self.v.ix(ix) }
    }

    /// Get mutable reference to ith element.
    #[inline]
    pub fn ixm(&mut self, ix: usize) -> &mut T {
        safe_assert!(ix < self.len);
        unsafe { &mut *self.v.ix(ix) }
    }

    /// Same as `binary_search_by`, but for some obscure reason this seems to be faster.
    pub fn search<F>(&self, mut f: F) -> Result<usize, usize>
    where
        F: FnMut(&T) -> Ordering,
    {
        let (mut i, mut j) = (0, self.len);
        while i < j {
            let m = (i + j) / 2;
            match f(self.ix(m)) {
                Ordering::Equal => {
                    return Ok(m);
                }
                Ordering::Less => i = m + 1,
                Ordering::Greater => j = m,
            }
        }
        Err(i)
    }
}

/* Deref is required as the supertrait of DerefMut, which sibling rotations
use for split_at_mut. */
impl<T> Deref for NodeVec<T> {
    type Target = [T];
    #[inline]
    fn deref(&self) -> &[T] {
        let len: usize = NodeVec::len(self);
        unsafe { self.v.slice(len) }
    }
}

impl<T> DerefMut for NodeVec<T> {
    #[inline]
    fn deref_mut(&mut self) -> &mut [T] {
        let len: usize = NodeVec::len(self);
        unsafe { self.v.slice_mut(len) }
    }
}
