//! Readiness multiplexing over UDT sockets.
//!
//! A poll group is created in the native library and identified by an
//! integer. [`EpollUdt::wait`] copies the native ready sets into the
//! fixed-capacity regions of a [`Readiness`], which the caller allocates
//! once and reuses across waits.

use std::collections::HashSet;
use std::ops::{BitOr, BitOrAssign};
use std::sync::Arc;
use std::time::Duration;

use libc::c_int;

use crate::error::{ErrorCode, Result, UdtError};
use crate::library::Library;
use crate::native::{SocketId, Transport, UDT_EPOLL_ERR, UDT_EPOLL_IN, UDT_EPOLL_OUT, UDT_ERROR};
use crate::socket::AsSocketId;

const CREATE: &str = "epollCreate:epoll_create";
const RELEASE: &str = "epollRelease:epoll_release";
const ADD: &str = "epollAdd:epoll_add_usock";
const REMOVE: &str = "epollRemove:epoll_remove_usock";
const UPDATE: &str = "epollUpdate:epoll_update_usock";
const VERIFY: &str = "epollVerify:epoll_verify_usock";
const WAIT: &str = "epollWait:epoll_wait";

/// Default capacity of each [`Readiness`] region.
pub const DEFAULT_CAPACITY: usize = 1024;

// ============================================================================
// Interest
// ============================================================================

/// Event mask registered for a socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Interest(c_int);

impl Interest {
	pub const NONE: Interest = Interest(0);
	pub const READ: Interest = Interest(UDT_EPOLL_IN);
	pub const WRITE: Interest = Interest(UDT_EPOLL_OUT);
	pub const ERROR: Interest = Interest(UDT_EPOLL_ERR);
	pub const ALL: Interest = Interest(UDT_EPOLL_IN | UDT_EPOLL_OUT | UDT_EPOLL_ERR);

	#[inline]
	pub const fn from_bits(bits: c_int) -> Self {
		Interest(bits)
	}

	#[inline]
	pub const fn bits(self) -> c_int {
		self.0
	}

	#[inline]
	pub const fn contains(self, other: Interest) -> bool {
		self.0 & other.0 == other.0
	}

	pub fn is_readable(self) -> bool {
		self.contains(Interest::READ)
	}

	pub fn is_writable(self) -> bool {
		self.contains(Interest::WRITE)
	}
}

impl BitOr for Interest {
	type Output = Interest;

	fn bitor(self, rhs: Interest) -> Interest {
		Interest(self.0 | rhs.0)
	}
}

impl BitOrAssign for Interest {
	fn bitor_assign(&mut self, rhs: Interest) {
		self.0 |= rhs.0;
	}
}

// ============================================================================
// Readiness
// ============================================================================

/// Output regions of a wait.
///
/// Capacities are fixed at construction. Only the first `read_count`
/// (resp. `write_count`) entries of each region are meaningful after a
/// wait; the rest are left as they were.
#[derive(Debug, Clone)]
pub struct Readiness {
	read: Box<[SocketId]>,
	write: Box<[SocketId]>,
	read_count: usize,
	write_count: usize,
	except_count: usize,
}

impl Default for Readiness {
	fn default() -> Self {
		Self::with_capacity(DEFAULT_CAPACITY)
	}
}

impl Readiness {
	pub fn new() -> Self {
		Self::default()
	}

	/// Both regions hold `capacity` socket ids.
	pub fn with_capacity(capacity: usize) -> Self {
		Self::with_capacities(capacity, capacity)
	}

	pub fn with_capacities(read: usize, write: usize) -> Self {
		Self {
			read: vec![0; read].into_boxed_slice(),
			write: vec![0; write].into_boxed_slice(),
			read_count: 0,
			write_count: 0,
			except_count: 0,
		}
	}

	/// Sockets ready to read, or broken.
	pub fn read(&self) -> &[SocketId] {
		&self.read[..self.read_count]
	}

	/// Sockets ready to write, or broken.
	pub fn write(&self) -> &[SocketId] {
		&self.write[..self.write_count]
	}

	#[inline]
	pub fn read_count(&self) -> usize {
		self.read_count
	}

	#[inline]
	pub fn write_count(&self) -> usize {
		self.write_count
	}

	/// Always 0: broken sockets are reported in both the read and write sets.
	#[inline]
	pub fn except_count(&self) -> usize {
		self.except_count
	}

	#[inline]
	pub fn read_capacity(&self) -> usize {
		self.read.len()
	}

	#[inline]
	pub fn write_capacity(&self) -> usize {
		self.write.len()
	}

	fn clear_counts(&mut self) {
		self.read_count = 0;
		self.write_count = 0;
		self.except_count = 0;
	}

	/// Copies both sets in, or clears every count and fails if either does not fit.
	fn fill(&mut self, read: &HashSet<SocketId>, write: &HashSet<SocketId>) -> Result<()> {
		self.clear_counts();
		if read.len() > self.read.len() {
			return Err(UdtError::CapacityExceeded {
				which: "read",
				needed: read.len(),
				capacity: self.read.len(),
			});
		}
		if write.len() > self.write.len() {
			return Err(UdtError::CapacityExceeded {
				which: "write",
				needed: write.len(),
				capacity: self.write.len(),
			});
		}
		for (slot, id) in self.read.iter_mut().zip(read) {
			*slot = *id;
		}
		for (slot, id) in self.write.iter_mut().zip(write) {
			*slot = *id;
		}
		self.read_count = read.len();
		self.write_count = write.len();
		self.except_count = 0;
		Ok(())
	}
}

/// Outcome of [`EpollUdt::wait`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
	/// Total number of entries in the read and write sets.
	Ready(usize),
	/// Nothing became ready before the timeout; all counts are 0.
	Timeout,
}

// ============================================================================
// Poll Group
// ============================================================================

/// A native poll group.
///
/// Released by [`EpollUdt::release`], or on drop.
pub struct EpollUdt {
	library: Arc<Library>,
	id: c_int,
	released: bool,
}

impl EpollUdt {
	pub fn create(library: &Arc<Library>) -> Result<Self> {
		let id = library.transport().epoll_create();
		if id < 0 {
			return Err(UdtError::last(library.transport(), 0, CREATE));
		}
		tracing::debug!(epoll = id, "poll group created");
		Ok(Self {
			library: library.clone(),
			id,
			released: false,
		})
	}

	#[inline]
	pub fn id(&self) -> c_int {
		self.id
	}

	#[inline]
	fn transport(&self) -> &dyn Transport {
		self.library.transport()
	}

	fn check(&self, rv: c_int, socket_id: SocketId, context: &'static str) -> Result<c_int> {
		match rv {
			UDT_ERROR => Err(UdtError::last(self.transport(), socket_id, context)),
			rv => Ok(rv),
		}
	}

	pub fn add(&self, socket: &impl AsSocketId, interest: Interest) -> Result<()> {
		let socket = socket.socket_id();
		let rv = self.transport().epoll_add_usock(self.id, socket, &interest.bits());
		self.check(rv, socket, ADD)?;
		tracing::trace!(epoll = self.id, socket, ?interest, "socket registered");
		Ok(())
	}

	/// Removes a socket. Removing a socket that is not registered succeeds.
	pub fn remove(&self, socket: &impl AsSocketId) -> Result<()> {
		let socket = socket.socket_id();
		let rv = self.transport().epoll_remove_usock(self.id, socket);
		self.check(rv, socket, REMOVE)?;
		tracing::trace!(epoll = self.id, socket, "socket unregistered");
		Ok(())
	}

	/// Replaces a registered socket's interest, returning the previous one.
	pub fn update(&self, socket: &impl AsSocketId, interest: Interest) -> Result<Interest> {
		let previous = self.verify(socket)?;
		let socket = socket.socket_id();
		let rv = self.transport().epoll_update_usock(self.id, socket, &interest.bits());
		self.check(rv, socket, UPDATE)?;
		Ok(previous)
	}

	/// Interest currently registered for a socket; fails if it is not registered.
	pub fn verify(&self, socket: &impl AsSocketId) -> Result<Interest> {
		let socket = socket.socket_id();
		let mut events = 0;
		let rv = self.transport().epoll_verify_usock(self.id, socket, &mut events);
		self.check(rv, socket, VERIFY)?;
		Ok(Interest::from_bits(events))
	}

	/// Waits for readiness and copies the ready sets into `out`.
	///
	/// `None` waits indefinitely; `Some(Duration::ZERO)` polls.
	pub fn wait(&self, out: &mut Readiness, timeout: Option<Duration>) -> Result<WaitOutcome> {
		let timeout_ms = match timeout {
			Some(timeout) => timeout.as_millis().min(i64::MAX as u128) as i64,
			None => -1,
		};
		let mut read = HashSet::new();
		let mut write = HashSet::new();
		let rv = self.transport().epoll_wait(self.id, &mut read, &mut write, timeout_ms);
		self.settle(rv, &read, &write, out)
	}

	/// Decodes a native wait result. Any `rv <= 0` is read through the last
	/// error: `ETIMEOUT` is a timeout, everything else fails.
	fn settle(
		&self,
		rv: c_int,
		read: &HashSet<SocketId>,
		write: &HashSet<SocketId>,
		out: &mut Readiness,
	) -> Result<WaitOutcome> {
		if rv <= 0 {
			out.clear_counts();
			let err = UdtError::last(self.transport(), 0, WAIT);
			if err.error_code() == ErrorCode::Timeout {
				tracing::trace!(epoll = self.id, "wait timed out");
				return Ok(WaitOutcome::Timeout);
			}
			return Err(err);
		}
		out.fill(read, write)?;
		tracing::trace!(
			epoll = self.id,
			read = out.read_count,
			write = out.write_count,
			"wait returned"
		);
		Ok(WaitOutcome::Ready(out.read_count + out.write_count))
	}

	/// Releases the native poll group.
	pub fn release(mut self) -> Result<()> {
		self.released = true;
		self.release_native()
	}

	fn release_native(&self) -> Result<()> {
		let rv = self.transport().epoll_release(self.id);
		self.check(rv, 0, RELEASE)?;
		tracing::debug!(epoll = self.id, "poll group released");
		Ok(())
	}
}

impl std::fmt::Debug for EpollUdt {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("EpollUdt").field("id", &self.id).finish()
	}
}

impl Drop for EpollUdt {
	fn drop(&mut self) {
		if self.released {
			return;
		}
		if let Err(err) = self.release_native() {
			tracing::warn!(epoll = self.id, error = %err, "release on drop failed");
		}
	}
}
