//! The fixed C-style interface of the native transport library.
//!
//! Every primitive returns the native error sentinel (`UDT_ERROR` or
//! `INVALID_SOCK`) on failure; the cause is then read with
//! [`Transport::getlasterror`], which is per calling thread.
//!
//! Two backends implement [`Transport`]:
//! - [`Loopback`] — in-process engine, always available
//! - `ffi::NativeUdt` — binding to the UDT C shim (feature `native`)

use std::collections::HashSet;

use libc::{c_int, c_void};

pub mod loopback;
#[cfg(feature = "native")]
pub mod ffi;

pub use self::loopback::Loopback;

/// Opaque native socket identifier.
pub type SocketId = i32;

/// Generic failure return of the native primitives.
pub const UDT_ERROR: c_int = -1;

/// Failure return of `socket()` and `accept()`.
pub const INVALID_SOCK: SocketId = -1;

/// Native option codes (`UDT::SOCKOPT`).
pub mod sockopt {
	use libc::c_int;

	pub const UDT_MSS: c_int = 0;
	pub const UDT_SNDSYN: c_int = 1;
	pub const UDT_RCVSYN: c_int = 2;
	pub const UDT_CC: c_int = 3;
	pub const UDT_FC: c_int = 4;
	pub const UDT_SNDBUF: c_int = 5;
	pub const UDT_RCVBUF: c_int = 6;
	pub const UDT_LINGER: c_int = 7;
	pub const UDP_SNDBUF: c_int = 8;
	pub const UDP_RCVBUF: c_int = 9;
	pub const UDT_MAXMSG: c_int = 10;
	pub const UDT_MSGTTL: c_int = 11;
	pub const UDT_RENDEZVOUS: c_int = 12;
	pub const UDT_SNDTIMEO: c_int = 13;
	pub const UDT_RCVTIMEO: c_int = 14;
	pub const UDT_REUSEADDR: c_int = 15;
	pub const UDT_MAXBW: c_int = 16;
	pub const UDT_STATE: c_int = 17;
	pub const UDT_EVENT: c_int = 18;
	pub const UDT_SNDDATA: c_int = 19;
	pub const UDT_RCVDATA: c_int = 20;
}

/// Native socket states (`UDTSTATUS`), as returned by `getsockstate`.
pub mod sockstate {
	use libc::c_int;

	pub const INIT: c_int = 1;
	pub const OPENED: c_int = 2;
	pub const LISTENING: c_int = 3;
	pub const CONNECTING: c_int = 4;
	pub const CONNECTED: c_int = 5;
	pub const BROKEN: c_int = 6;
	pub const CLOSING: c_int = 7;
	pub const CLOSED: c_int = 8;
	pub const NONEXIST: c_int = 9;
}

/// Native epoll event bits.
pub const UDT_EPOLL_IN: c_int = 0x1;
pub const UDT_EPOLL_OUT: c_int = 0x4;
pub const UDT_EPOLL_ERR: c_int = 0x8;

/// Last error of the calling thread, as reported by the native library.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ErrorInfo {
	pub code: c_int,
	pub message: Option<String>,
}

impl ErrorInfo {
	pub fn new(code: c_int, message: impl Into<String>) -> Self {
		Self { code, message: Some(message.into()) }
	}
}

/// Native performance counters (`UDT::TRACEINFO`).
///
/// Field order and widths match the native struct; the native `perfmon`
/// fills it in a single call.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TraceInfo {
	// global measurements
	pub ms_time_stamp: i64,
	pub pkt_sent_total: i64,
	pub pkt_recv_total: i64,
	pub pkt_snd_loss_total: c_int,
	pub pkt_rcv_loss_total: c_int,
	pub pkt_retrans_total: c_int,
	pub pkt_sent_ack_total: c_int,
	pub pkt_recv_ack_total: c_int,
	pub pkt_sent_nak_total: c_int,
	pub pkt_recv_nak_total: c_int,
	pub us_snd_duration_total: i64,

	// local measurements
	pub pkt_sent: i64,
	pub pkt_recv: i64,
	pub pkt_snd_loss: c_int,
	pub pkt_rcv_loss: c_int,
	pub pkt_retrans: c_int,
	pub pkt_sent_ack: c_int,
	pub pkt_recv_ack: c_int,
	pub pkt_sent_nak: c_int,
	pub pkt_recv_nak: c_int,
	pub mbps_send_rate: f64,
	pub mbps_recv_rate: f64,
	pub us_snd_duration: i64,

	// instant measurements
	pub us_pkt_snd_period: f64,
	pub pkt_flow_window: c_int,
	pub pkt_congestion_window: c_int,
	pub pkt_flight_size: c_int,
	pub ms_rtt: f64,
	pub mbps_bandwidth: f64,
	pub byte_avail_snd_buf: c_int,
	pub byte_avail_rcv_buf: c_int,
}

/// The native transport library's C API.
///
/// Implementations must be safe to call concurrently on distinct socket
/// identifiers. Primitives taking raw pointers are `unsafe`: the caller
/// guarantees the pointer is valid for the stated length for the duration
/// of the call.
pub trait Transport: Send + Sync {
	fn startup(&self) -> c_int;
	fn cleanup(&self) -> c_int;

	fn socket(&self, af: c_int, kind: c_int, protocol: c_int) -> SocketId;

	/// # Safety
	/// `name` must point to `namelen` readable bytes of a `sockaddr`.
	unsafe fn bind(&self, id: SocketId, name: *const libc::sockaddr, namelen: c_int) -> c_int;

	fn listen(&self, id: SocketId, backlog: c_int) -> c_int;

	/// # Safety
	/// `addr` must point to `*addrlen` writable bytes.
	unsafe fn accept(&self, id: SocketId, addr: *mut libc::sockaddr, addrlen: *mut c_int) -> SocketId;

	/// # Safety
	/// `name` must point to `namelen` readable bytes of a `sockaddr`.
	unsafe fn connect(&self, id: SocketId, name: *const libc::sockaddr, namelen: c_int) -> c_int;

	fn close(&self, id: SocketId) -> c_int;

	/// # Safety
	/// `buf` must point to `len` readable bytes.
	unsafe fn send(&self, id: SocketId, buf: *const u8, len: c_int, flags: c_int) -> c_int;

	/// # Safety
	/// `buf` must point to `len` writable bytes.
	unsafe fn recv(&self, id: SocketId, buf: *mut u8, len: c_int, flags: c_int) -> c_int;

	/// # Safety
	/// `buf` must point to `len` readable bytes.
	unsafe fn sendmsg(&self, id: SocketId, buf: *const u8, len: c_int, ttl: c_int, in_order: bool) -> c_int;

	/// # Safety
	/// `buf` must point to `len` writable bytes.
	unsafe fn recvmsg(&self, id: SocketId, buf: *mut u8, len: c_int) -> c_int;

	/// # Safety
	/// `optval` must point to `*optlen` writable bytes.
	unsafe fn getsockopt(&self, id: SocketId, level: c_int, optname: c_int, optval: *mut c_void, optlen: *mut c_int) -> c_int;

	/// # Safety
	/// `optval` must point to `optlen` readable bytes, except for `UDT_CC`
	/// where it is the factory handle itself.
	unsafe fn setsockopt(&self, id: SocketId, level: c_int, optname: c_int, optval: *const c_void, optlen: c_int) -> c_int;

	/// # Safety
	/// `name` must point to `*namelen` writable bytes.
	unsafe fn getsockname(&self, id: SocketId, name: *mut libc::sockaddr, namelen: *mut c_int) -> c_int;

	/// # Safety
	/// `name` must point to `*namelen` writable bytes.
	unsafe fn getpeername(&self, id: SocketId, name: *mut libc::sockaddr, namelen: *mut c_int) -> c_int;

	fn getsockstate(&self, id: SocketId) -> c_int;

	fn perfmon(&self, id: SocketId, perf: &mut TraceInfo, clear: bool) -> c_int;

	fn epoll_create(&self) -> c_int;
	fn epoll_release(&self, eid: c_int) -> c_int;
	fn epoll_add_usock(&self, eid: c_int, id: SocketId, events: &c_int) -> c_int;
	fn epoll_remove_usock(&self, eid: c_int, id: SocketId) -> c_int;
	fn epoll_update_usock(&self, eid: c_int, id: SocketId, events: &c_int) -> c_int;
	fn epoll_verify_usock(&self, eid: c_int, id: SocketId, events: &mut c_int) -> c_int;

	/// Fills the ready sets. Returns the number of ready sockets, or
	/// `UDT_ERROR` with `ETIMEOUT` when nothing became ready in time.
	/// A negative timeout waits indefinitely.
	fn epoll_wait(
		&self,
		eid: c_int,
		read: &mut HashSet<SocketId>,
		write: &mut HashSet<SocketId>,
		timeout_ms: i64,
	) -> c_int;

	fn getlasterror(&self) -> ErrorInfo;
	fn clearlasterror(&self);
}

/// Per-set capacity to retry an id-array wait with, or `None` when every
/// ready id fit.
///
/// `rv` is the total the native wait reported. The set lengths come back
/// either clamped to `capacity` or as the full set sizes; both shapes of
/// truncation are detected.
#[cfg_attr(not(feature = "native"), allow(dead_code))]
pub(crate) fn wait_regrow(rv: c_int, read_len: c_int, write_len: c_int, capacity: usize) -> Option<usize> {
	if rv <= 0 {
		return None;
	}
	let read_len = read_len.max(0) as usize;
	let write_len = write_len.max(0) as usize;
	let total = rv as usize;
	if read_len <= capacity && write_len <= capacity && total <= read_len + write_len {
		return None;
	}
	let needed = total.max(read_len).max(write_len).max(capacity.saturating_mul(2));
	Some(needed.min(c_int::MAX as usize)).filter(|needed| *needed > capacity)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn complete_wait_needs_no_regrow() {
		assert_eq!(wait_regrow(3, 2, 1, 4), None);
		assert_eq!(wait_regrow(8, 4, 4, 4), None);
		assert_eq!(wait_regrow(0, 0, 0, 4), None);
		assert_eq!(wait_regrow(UDT_ERROR, 4, 4, 4), None);
	}

	#[test]
	fn clamped_lengths_below_total_regrow() {
		assert_eq!(wait_regrow(1500, 1024, 0, 1024), Some(2048));
		assert_eq!(wait_regrow(5000, 1024, 1024, 1024), Some(5000));
	}

	#[test]
	fn lengths_past_capacity_regrow() {
		assert_eq!(wait_regrow(1500, 1500, 0, 1024), Some(2048));
		assert_eq!(wait_regrow(3000, 0, 3000, 1024), Some(3000));
	}
}
