//! Stack-discipline scratch memory
//!
//! A [`ScratchArena`] owns one allocation per contraction call. Plan levels
//! carve chunk buffers off the front of a [`Scratch`] frame and hand the
//! remainder to the level below; the borrow checker guarantees a level's
//! buffers are released before its caller touches the frame again.

use tendist_core::{Element, Result, TendistError};

/// Owned scratch allocation
#[derive(Debug)]
pub struct ScratchArena<T> {
    buf: Vec<T>,
}

impl<T: Element> ScratchArena<T> {
    /// Arena of `capacity` zeroed elements.
    ///
    /// # Errors
    ///
    /// `AllocationFailure` if the allocator refuses the request.
    pub fn try_new(capacity: usize) -> Result<Self> {
        let mut buf = Vec::new();
        buf.try_reserve_exact(capacity)
            .map_err(|_| TendistError::AllocationFailure {
                requested: capacity,
                available: 0,
            })?;
        buf.resize(capacity, T::zero());
        Ok(Self { buf })
    }

    /// Elements available to frames
    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    /// Check that the arena can serve `required` elements
    pub fn reserve_check(&self, required: usize) -> Result<()> {
        if required > self.buf.len() {
            return Err(TendistError::AllocationFailure {
                requested: required,
                available: self.buf.len(),
            });
        }
        Ok(())
    }

    /// Frame spanning the whole arena
    pub fn frame(&mut self) -> Scratch<'_, T> {
        Scratch {
            free: self.buf.as_mut_slice(),
        }
    }
}

/// Unused tail of a scratch arena
#[derive(Debug)]
pub struct Scratch<'a, T> {
    free: &'a mut [T],
}

impl<'a, T: Element> Scratch<'a, T> {
    /// Elements still available
    pub fn available(&self) -> usize {
        self.free.len()
    }

    /// Split off a zeroed buffer of `len` elements
    pub fn take(self, len: usize) -> Result<(&'a mut [T], Scratch<'a, T>)> {
        if len > self.free.len() {
            return Err(TendistError::AllocationFailure {
                requested: len,
                available: self.free.len(),
            });
        }
        let Scratch { free } = self;
        let (head, tail) = free.split_at_mut(len);
        head.fill(T::zero());
        Ok((head, Scratch { free: tail }))
    }

    /// Shorter-lived frame over the same memory
    pub fn reborrow(&mut self) -> Scratch<'_, T> {
        Scratch {
            free: &mut *self.free,
        }
    }
}
