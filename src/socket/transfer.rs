//! Payload transfer between Rust buffers and the native library.
//!
//! Three strategies, identical from the caller's point of view:
//! - `Array` — the whole slice is lent to the native call
//! - `Region` — `[position, limit)` of a slice goes through a `malloc`ed
//!   scratch copy; received bytes are copied back only on success
//! - `Direct` — the native call works on `DirectBuffer` memory at
//!   `base + position`, and the position advances by the bytes moved
//!
//! Every range is validated before any native call.

use libc::c_int;

use crate::buffer::{DirectBuffer, ScratchBuffer};
use crate::error::{ErrorCode, Result, UdtError};
use crate::native::{SocketId, Transport};

use super::{SocketUdt, TypeUdt};

const RECEIVE: &str = "recv/recvmsg";
const SEND: &str = "send/sendmsg";

/// Outcome of a transfer that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transfer {
	/// Bytes moved; always > 0.
	Done(usize),
	/// A blocking call ran out of time.
	Timeout,
	/// A non-blocking call could not make progress.
	WouldBlock,
}

impl Transfer {
	/// Bytes moved, 0 for `Timeout` and `WouldBlock`.
	#[inline]
	pub fn bytes(self) -> usize {
		match self {
			Transfer::Done(count) => count,
			_ => 0,
		}
	}
}

/// Destination of a receive.
#[derive(Debug)]
pub enum RecvBuffer<'a> {
	Array(&'a mut [u8]),
	Region { array: &'a mut [u8], position: usize, limit: usize },
	Direct(&'a mut DirectBuffer),
}

impl<'a> RecvBuffer<'a> {
	pub fn region(array: &'a mut [u8], position: usize, limit: usize) -> Self {
		RecvBuffer::Region { array, position, limit }
	}
}

impl<'a> From<&'a mut [u8]> for RecvBuffer<'a> {
	fn from(array: &'a mut [u8]) -> Self {
		RecvBuffer::Array(array)
	}
}

impl<'a, const N: usize> From<&'a mut [u8; N]> for RecvBuffer<'a> {
	fn from(array: &'a mut [u8; N]) -> Self {
		RecvBuffer::Array(array)
	}
}

impl<'a> From<&'a mut Vec<u8>> for RecvBuffer<'a> {
	fn from(array: &'a mut Vec<u8>) -> Self {
		RecvBuffer::Array(array.as_mut_slice())
	}
}

impl<'a> From<&'a mut DirectBuffer> for RecvBuffer<'a> {
	fn from(buffer: &'a mut DirectBuffer) -> Self {
		RecvBuffer::Direct(buffer)
	}
}

/// Source of a send.
#[derive(Debug)]
pub enum SendBuffer<'a> {
	Array(&'a [u8]),
	Region { array: &'a [u8], position: usize, limit: usize },
	Direct(&'a mut DirectBuffer),
}

impl<'a> SendBuffer<'a> {
	pub fn region(array: &'a [u8], position: usize, limit: usize) -> Self {
		SendBuffer::Region { array, position, limit }
	}
}

impl<'a> From<&'a [u8]> for SendBuffer<'a> {
	fn from(array: &'a [u8]) -> Self {
		SendBuffer::Array(array)
	}
}

impl<'a, const N: usize> From<&'a [u8; N]> for SendBuffer<'a> {
	fn from(array: &'a [u8; N]) -> Self {
		SendBuffer::Array(array)
	}
}

impl<'a> From<&'a Vec<u8>> for SendBuffer<'a> {
	fn from(array: &'a Vec<u8>) -> Self {
		SendBuffer::Array(array.as_slice())
	}
}

impl<'a> From<&'a mut DirectBuffer> for SendBuffer<'a> {
	fn from(buffer: &'a mut DirectBuffer) -> Self {
		SendBuffer::Direct(buffer)
	}
}

/// Checks `position ≤ capacity`, `limit ≤ capacity` and `position ≤ limit`, in that order.
pub fn validate_range(socket_id: SocketId, position: usize, limit: usize, capacity: usize) -> Result<()> {
	let reason = if position > capacity {
		"position is out of range"
	} else if limit > capacity {
		"limit is out of range"
	} else if position > limit {
		"position > limit"
	} else {
		return Ok(());
	};
	Err(UdtError::InvalidRange { socket_id, reason, position, limit, capacity })
}

fn socket_kind(socket_id: SocketId, code: c_int, context: &'static str) -> Result<TypeUdt> {
	TypeUdt::from_code(code).ok_or(UdtError::UnknownSocketKind { socket_id, context, kind: code })
}

/// Native lengths are `int`; larger buffers are offered in part.
#[inline]
fn native_len(len: usize) -> c_int {
	len.min(c_int::MAX as usize) as c_int
}

/// Decodes a native transfer return value.
///
/// `would_block` is the one error code that means "no progress" here.
fn decode(
	transport: &dyn Transport,
	socket_id: SocketId,
	rv: c_int,
	would_block: ErrorCode,
	context: &'static str,
) -> Result<Transfer> {
	match rv {
		count if count > 0 => Ok(Transfer::Done(count as usize)),
		0 => Ok(Transfer::Timeout),
		_ => {
			let info = transport.getlasterror();
			match ErrorCode::from_code(info.code) == would_block {
				true => Ok(Transfer::WouldBlock),
				false => Err(UdtError::from_info(socket_id, context, info)),
			}
		}
	}
}

unsafe fn recv_raw(transport: &dyn Transport, id: SocketId, kind: TypeUdt, buf: *mut u8, len: usize) -> c_int {
	unsafe {
		match kind {
			TypeUdt::Stream => transport.recv(id, buf, native_len(len), 0),
			TypeUdt::Datagram => transport.recvmsg(id, buf, native_len(len)),
		}
	}
}

unsafe fn send_raw(
	transport: &dyn Transport,
	id: SocketId,
	kind: TypeUdt,
	ttl: c_int,
	ordered: bool,
	buf: *const u8,
	len: usize,
) -> c_int {
	unsafe {
		match kind {
			TypeUdt::Stream => transport.send(id, buf, native_len(len), 0),
			TypeUdt::Datagram => transport.sendmsg(id, buf, native_len(len), ttl, ordered),
		}
	}
}

/// Receives into `buffer` on socket `id` of raw kind `kind`.
pub fn receive(transport: &dyn Transport, id: SocketId, kind: c_int, buffer: RecvBuffer<'_>) -> Result<Transfer> {
	let outcome = match buffer {
		RecvBuffer::Array(array) => {
			let kind = socket_kind(id, kind, RECEIVE)?;
			let rv = unsafe { recv_raw(transport, id, kind, array.as_mut_ptr(), array.len()) };
			decode(transport, id, rv, ErrorCode::AsyncRecv, RECEIVE)?
		}
		RecvBuffer::Region { array, position, limit } => {
			validate_range(id, position, limit, array.len())?;
			let mut scratch = ScratchBuffer::allocate(limit - position).ok_or(UdtError::Allocation {
				socket_id: id,
				context: RECEIVE,
				size: limit - position,
			})?;
			let kind = socket_kind(id, kind, RECEIVE)?;
			let rv = unsafe { recv_raw(transport, id, kind, scratch.as_mut_ptr(), scratch.len()) };
			let outcome = decode(transport, id, rv, ErrorCode::AsyncRecv, RECEIVE)?;
			if let Transfer::Done(count) = outcome {
				scratch.copy_to(&mut array[position..limit], count);
			}
			outcome
		}
		RecvBuffer::Direct(buffer) => {
			let (position, limit) = (buffer.position(), buffer.limit());
			validate_range(id, position, limit, buffer.capacity())?;
			let kind = socket_kind(id, kind, RECEIVE)?;
			let rv = unsafe { recv_raw(transport, id, kind, buffer.as_mut_ptr().add(position), limit - position) };
			let outcome = decode(transport, id, rv, ErrorCode::AsyncRecv, RECEIVE)?;
			buffer.advance(outcome.bytes());
			outcome
		}
	};
	tracing::trace!(socket = id, ?outcome, "receive");
	Ok(outcome)
}

/// Sends `buffer` on socket `id` of raw kind `kind`.
///
/// `ttl` (milliseconds, -1 infinite) and `ordered` apply to datagram sockets only.
pub fn send(
	transport: &dyn Transport,
	id: SocketId,
	kind: c_int,
	ttl: c_int,
	ordered: bool,
	buffer: SendBuffer<'_>,
) -> Result<Transfer> {
	let outcome = match buffer {
		SendBuffer::Array(array) => {
			let kind = socket_kind(id, kind, SEND)?;
			let rv = unsafe { send_raw(transport, id, kind, ttl, ordered, array.as_ptr(), array.len()) };
			decode(transport, id, rv, ErrorCode::AsyncSend, SEND)?
		}
		SendBuffer::Region { array, position, limit } => {
			validate_range(id, position, limit, array.len())?;
			let scratch = ScratchBuffer::copy_of(&array[position..limit]).ok_or(UdtError::Allocation {
				socket_id: id,
				context: SEND,
				size: limit - position,
			})?;
			let kind = socket_kind(id, kind, SEND)?;
			let rv = unsafe { send_raw(transport, id, kind, ttl, ordered, scratch.as_ptr(), scratch.len()) };
			decode(transport, id, rv, ErrorCode::AsyncSend, SEND)?
		}
		SendBuffer::Direct(buffer) => {
			let (position, limit) = (buffer.position(), buffer.limit());
			validate_range(id, position, limit, buffer.capacity())?;
			let kind = socket_kind(id, kind, SEND)?;
			let rv = unsafe { send_raw(transport, id, kind, ttl, ordered, buffer.as_ptr().add(position), limit - position) };
			let outcome = decode(transport, id, rv, ErrorCode::AsyncSend, SEND)?;
			buffer.advance(outcome.bytes());
			outcome
		}
	};
	tracing::trace!(socket = id, ?outcome, "send");
	Ok(outcome)
}

impl SocketUdt {
	/// Receives into `buffer`; `recv` on stream sockets, `recvmsg` on datagram sockets.
	pub fn receive<'a>(&self, buffer: impl Into<RecvBuffer<'a>>) -> Result<Transfer> {
		receive(self.transport(), self.id, self.kind.code(), buffer.into())
	}

	/// Sends `buffer`, using the socket's [`MessageConfig`](super::MessageConfig) on datagram sockets.
	pub fn send<'a>(&self, buffer: impl Into<SendBuffer<'a>>) -> Result<Transfer> {
		let message = self.message;
		send(self.transport(), self.id, self.kind.code(), message.ttl_ms, message.ordered, buffer.into())
	}

	/// Sends one message with explicit time-to-live (milliseconds, -1 infinite) and ordering.
	pub fn send_message<'a>(&self, buffer: impl Into<SendBuffer<'a>>, ttl_ms: i32, ordered: bool) -> Result<Transfer> {
		send(self.transport(), self.id, self.kind.code(), ttl_ms, ordered, buffer.into())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use proptest::prelude::*;

	#[test]
	fn range_messages_follow_check_order() {
		let reason = |p, l, c| match validate_range(1, p, l, c) {
			Err(UdtError::InvalidRange { reason, .. }) => reason,
			other => panic!("unexpected {other:?}"),
		};
		assert_eq!(reason(9, 12, 8), "position is out of range");
		assert_eq!(reason(2, 9, 8), "limit is out of range");
		assert_eq!(reason(5, 4, 8), "position > limit");
	}

	#[test]
	fn empty_and_full_ranges_are_valid() {
		assert!(validate_range(1, 0, 0, 0).is_ok());
		assert!(validate_range(1, 8, 8, 8).is_ok());
		assert!(validate_range(1, 0, 8, 8).is_ok());
	}

	#[test]
	fn transfer_bytes() {
		assert_eq!(Transfer::Done(12).bytes(), 12);
		assert_eq!(Transfer::Timeout.bytes(), 0);
		assert_eq!(Transfer::WouldBlock.bytes(), 0);
	}

	proptest! {
		#[test]
		fn ordered_ranges_are_accepted(capacity in 0usize..4096, a in 0usize..4096, b in 0usize..4096) {
			let position = a.min(capacity);
			let limit = b.min(capacity).max(position);
			prop_assert!(validate_range(7, position, limit, capacity).is_ok());
		}

		#[test]
		fn disordered_ranges_are_rejected(capacity in 0usize..4096, position in 0usize..8192, limit in 0usize..8192) {
			prop_assume!(position > capacity || limit > capacity || position > limit);
			let is_range_error = matches!(
				validate_range(7, position, limit, capacity),
				Err(UdtError::InvalidRange { socket_id: 7, .. })
			);
			prop_assert!(is_range_error);
		}
	}
}
