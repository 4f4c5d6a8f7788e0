//! Off-heap memory used by the transfer engine.
//!
//! [`DirectBuffer`] is caller-owned native memory with a position/limit
//! cursor; transfers hand `base + position` straight to the native library.
//! [`ScratchBuffer`] is the short-lived copy area used for array regions.

use std::ptr::NonNull;

use crate::error::{Result, UdtError};

/// Fixed-capacity native byte buffer with a `position ≤ limit ≤ capacity` cursor.
///
/// The cursor setters do not validate; every transfer checks the range
/// before touching native code and reports `InvalidRange` instead.
pub struct DirectBuffer {
	ptr: NonNull<u8>,
	capacity: usize,
	position: usize,
	limit: usize,
}

// The buffer exclusively owns its allocation.
unsafe impl Send for DirectBuffer {}
unsafe impl Sync for DirectBuffer {}

impl DirectBuffer {
	/// Allocates `capacity` zeroed bytes. Position is 0 and limit is `capacity`.
	pub fn allocate(capacity: usize) -> Result<Self> {
		// calloc(0) may return NULL; always ask for at least one byte.
		let raw = unsafe { libc::calloc(capacity.max(1), 1) } as *mut u8;
		let ptr = NonNull::new(raw).ok_or(UdtError::Allocation {
			socket_id: 0,
			context: "DirectBuffer::allocate",
			size: capacity,
		})?;
		Ok(Self { ptr, capacity, position: 0, limit: capacity })
	}

	#[inline]
	pub fn capacity(&self) -> usize {
		self.capacity
	}

	#[inline]
	pub fn position(&self) -> usize {
		self.position
	}

	#[inline]
	pub fn limit(&self) -> usize {
		self.limit
	}

	/// Bytes between position and limit; 0 when the cursor is inverted.
	#[inline]
	pub fn remaining(&self) -> usize {
		self.limit.saturating_sub(self.position)
	}

	pub fn set_position(&mut self, position: usize) -> &mut Self {
		self.position = position;
		self
	}

	pub fn set_limit(&mut self, limit: usize) -> &mut Self {
		self.limit = limit;
		self
	}

	/// Position 0, limit capacity.
	pub fn clear(&mut self) -> &mut Self {
		self.position = 0;
		self.limit = self.capacity;
		self
	}

	/// Limit to the current position, position to 0.
	pub fn flip(&mut self) -> &mut Self {
		self.limit = self.position;
		self.position = 0;
		self
	}

	/// Copies as much of `data` as fits before the limit and advances the position.
	/// A limit past the capacity is clamped.
	pub fn put(&mut self, data: &[u8]) -> usize {
		let count = data
			.len()
			.min(self.remaining())
			.min(self.capacity.saturating_sub(self.position));
		let start = self.position;
		self.as_mut_slice()[start..start + count].copy_from_slice(&data[..count]);
		self.position += count;
		count
	}

	/// Bytes between position and limit.
	pub fn remaining_slice(&self) -> &[u8] {
		match self.position <= self.limit && self.limit <= self.capacity {
			true => &self.as_slice()[self.position..self.limit],
			false => &[],
		}
	}

	/// The whole allocation, ignoring the cursor.
	pub fn as_slice(&self) -> &[u8] {
		unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.capacity) }
	}

	pub fn as_mut_slice(&mut self) -> &mut [u8] {
		unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.capacity) }
	}

	#[inline]
	pub fn as_ptr(&self) -> *const u8 {
		self.ptr.as_ptr()
	}

	#[inline]
	pub fn as_mut_ptr(&mut self) -> *mut u8 {
		self.ptr.as_ptr()
	}

	pub(crate) fn advance(&mut self, count: usize) {
		self.position += count;
	}
}

impl Drop for DirectBuffer {
	fn drop(&mut self) {
		unsafe { libc::free(self.ptr.as_ptr() as *mut libc::c_void) };
	}
}

impl std::fmt::Debug for DirectBuffer {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("DirectBuffer")
			.field("position", &self.position)
			.field("limit", &self.limit)
			.field("capacity", &self.capacity)
			.finish()
	}
}

/// `malloc`ed copy area, freed when dropped.
pub(crate) struct ScratchBuffer {
	ptr: NonNull<u8>,
	len: usize,
}

impl ScratchBuffer {
	/// Allocates `len` uninitialized bytes, or `None` if the allocator refuses.
	pub(crate) fn allocate(len: usize) -> Option<Self> {
		let raw = unsafe { libc::malloc(len.max(1)) } as *mut u8;
		NonNull::new(raw).map(|ptr| Self { ptr, len })
	}

	/// Allocates a copy of `data`.
	pub(crate) fn copy_of(data: &[u8]) -> Option<Self> {
		let scratch = Self::allocate(data.len())?;
		unsafe { std::ptr::copy_nonoverlapping(data.as_ptr(), scratch.ptr.as_ptr(), data.len()) };
		Some(scratch)
	}

	#[inline]
	pub(crate) fn len(&self) -> usize {
		self.len
	}

	#[inline]
	pub(crate) fn as_ptr(&self) -> *const u8 {
		self.ptr.as_ptr()
	}

	#[inline]
	pub(crate) fn as_mut_ptr(&mut self) -> *mut u8 {
		self.ptr.as_ptr()
	}

	/// Copies the first `count` bytes out to `dest`.
	pub(crate) fn copy_to(&self, dest: &mut [u8], count: usize) {
		let count = count.min(self.len).min(dest.len());
		unsafe { std::ptr::copy_nonoverlapping(self.ptr.as_ptr(), dest.as_mut_ptr(), count) };
	}
}

impl Drop for ScratchBuffer {
	fn drop(&mut self) {
		unsafe { libc::free(self.ptr.as_ptr() as *mut libc::c_void) };
	}
}
