//! Binding to the UDT C shim (`libudt` built with its C interface).
//!
//! The shim exports the C++ `UDT::` namespace as flat `udt_*` symbols.
//! Readiness sets come back through caller-provided id arrays
//! (`epoll_wait2`), starting at [`WAIT_CAPACITY`] ids per set and grown
//! whenever the native side reports more.

use std::collections::HashSet;
use std::ffi::CStr;

use libc::{c_char, c_int, c_void};

use super::{ErrorInfo, SocketId, TraceInfo, Transport};

/// Initial per-set id capacity handed to the native wait. A wait that
/// reports more ready ids is repeated with larger arrays.
pub const WAIT_CAPACITY: usize = 1024;

#[link(name = "udt")]
unsafe extern "C" {
	fn udt_startup() -> c_int;
	fn udt_cleanup() -> c_int;
	fn udt_socket(af: c_int, kind: c_int, protocol: c_int) -> SocketId;
	fn udt_bind(u: SocketId, name: *const libc::sockaddr, namelen: c_int) -> c_int;
	fn udt_listen(u: SocketId, backlog: c_int) -> c_int;
	fn udt_accept(u: SocketId, addr: *mut libc::sockaddr, addrlen: *mut c_int) -> SocketId;
	fn udt_connect(u: SocketId, name: *const libc::sockaddr, namelen: c_int) -> c_int;
	fn udt_close(u: SocketId) -> c_int;
	fn udt_getpeername(u: SocketId, name: *mut libc::sockaddr, namelen: *mut c_int) -> c_int;
	fn udt_getsockname(u: SocketId, name: *mut libc::sockaddr, namelen: *mut c_int) -> c_int;
	fn udt_getsockopt(u: SocketId, level: c_int, optname: c_int, optval: *mut c_void, optlen: *mut c_int) -> c_int;
	fn udt_setsockopt(u: SocketId, level: c_int, optname: c_int, optval: *const c_void, optlen: c_int) -> c_int;
	fn udt_send(u: SocketId, buf: *const c_char, len: c_int, flags: c_int) -> c_int;
	fn udt_recv(u: SocketId, buf: *mut c_char, len: c_int, flags: c_int) -> c_int;
	fn udt_sendmsg(u: SocketId, buf: *const c_char, len: c_int, ttl: c_int, inorder: c_int) -> c_int;
	fn udt_recvmsg(u: SocketId, buf: *mut c_char, len: c_int) -> c_int;
	fn udt_perfmon(u: SocketId, perf: *mut TraceInfo, clear: c_int) -> c_int;
	fn udt_getsockstate(u: SocketId) -> c_int;

	fn udt_epoll_create() -> c_int;
	fn udt_epoll_add_usock(eid: c_int, u: SocketId, events: *const c_int) -> c_int;
	fn udt_epoll_remove_usock(eid: c_int, u: SocketId) -> c_int;
	fn udt_epoll_update_usock(eid: c_int, u: SocketId, events: *const c_int) -> c_int;
	fn udt_epoll_verify_usock(eid: c_int, u: SocketId, events: *mut c_int) -> c_int;
	fn udt_epoll_wait2(
		eid: c_int,
		readfds: *mut SocketId,
		rnum: *mut c_int,
		writefds: *mut SocketId,
		wnum: *mut c_int,
		ms_timeout: i64,
		lrfds: *mut c_int,
		lrnum: *mut c_int,
		lwfds: *mut c_int,
		lwnum: *mut c_int,
	) -> c_int;
	fn udt_epoll_release(eid: c_int) -> c_int;

	fn udt_getlasterror_code() -> c_int;
	fn udt_getlasterror_desc() -> *const c_char;
	fn udt_clearlasterror();
}

/// The native UDT library.
#[derive(Debug, Default, Clone, Copy)]
pub struct NativeUdt;

impl NativeUdt {
	pub fn new() -> Self {
		Self
	}
}

impl Transport for NativeUdt {
	fn startup(&self) -> c_int {
		unsafe { udt_startup() }
	}

	fn cleanup(&self) -> c_int {
		unsafe { udt_cleanup() }
	}

	fn socket(&self, af: c_int, kind: c_int, protocol: c_int) -> SocketId {
		unsafe { udt_socket(af, kind, protocol) }
	}

	unsafe fn bind(&self, id: SocketId, name: *const libc::sockaddr, namelen: c_int) -> c_int {
		unsafe { udt_bind(id, name, namelen) }
	}

	fn listen(&self, id: SocketId, backlog: c_int) -> c_int {
		unsafe { udt_listen(id, backlog) }
	}

	unsafe fn accept(&self, id: SocketId, addr: *mut libc::sockaddr, addrlen: *mut c_int) -> SocketId {
		unsafe { udt_accept(id, addr, addrlen) }
	}

	unsafe fn connect(&self, id: SocketId, name: *const libc::sockaddr, namelen: c_int) -> c_int {
		unsafe { udt_connect(id, name, namelen) }
	}

	fn close(&self, id: SocketId) -> c_int {
		unsafe { udt_close(id) }
	}

	unsafe fn send(&self, id: SocketId, buf: *const u8, len: c_int, flags: c_int) -> c_int {
		unsafe { udt_send(id, buf as *const c_char, len, flags) }
	}

	unsafe fn recv(&self, id: SocketId, buf: *mut u8, len: c_int, flags: c_int) -> c_int {
		unsafe { udt_recv(id, buf as *mut c_char, len, flags) }
	}

	unsafe fn sendmsg(&self, id: SocketId, buf: *const u8, len: c_int, ttl: c_int, in_order: bool) -> c_int {
		unsafe { udt_sendmsg(id, buf as *const c_char, len, ttl, in_order as c_int) }
	}

	unsafe fn recvmsg(&self, id: SocketId, buf: *mut u8, len: c_int) -> c_int {
		unsafe { udt_recvmsg(id, buf as *mut c_char, len) }
	}

	unsafe fn getsockopt(&self, id: SocketId, level: c_int, optname: c_int, optval: *mut c_void, optlen: *mut c_int) -> c_int {
		unsafe { udt_getsockopt(id, level, optname, optval, optlen) }
	}

	unsafe fn setsockopt(&self, id: SocketId, level: c_int, optname: c_int, optval: *const c_void, optlen: c_int) -> c_int {
		unsafe { udt_setsockopt(id, level, optname, optval, optlen) }
	}

	unsafe fn getsockname(&self, id: SocketId, name: *mut libc::sockaddr, namelen: *mut c_int) -> c_int {
		unsafe { udt_getsockname(id, name, namelen) }
	}

	unsafe fn getpeername(&self, id: SocketId, name: *mut libc::sockaddr, namelen: *mut c_int) -> c_int {
		unsafe { udt_getpeername(id, name, namelen) }
	}

	fn getsockstate(&self, id: SocketId) -> c_int {
		unsafe { udt_getsockstate(id) }
	}

	fn perfmon(&self, id: SocketId, perf: &mut TraceInfo, clear: bool) -> c_int {
		unsafe { udt_perfmon(id, perf, clear as c_int) }
	}

	fn epoll_create(&self) -> c_int {
		unsafe { udt_epoll_create() }
	}

	fn epoll_release(&self, eid: c_int) -> c_int {
		unsafe { udt_epoll_release(eid) }
	}

	fn epoll_add_usock(&self, eid: c_int, id: SocketId, events: &c_int) -> c_int {
		unsafe { udt_epoll_add_usock(eid, id, events) }
	}

	fn epoll_remove_usock(&self, eid: c_int, id: SocketId) -> c_int {
		unsafe { udt_epoll_remove_usock(eid, id) }
	}

	fn epoll_update_usock(&self, eid: c_int, id: SocketId, events: &c_int) -> c_int {
		unsafe { udt_epoll_update_usock(eid, id, events) }
	}

	fn epoll_verify_usock(&self, eid: c_int, id: SocketId, events: &mut c_int) -> c_int {
		unsafe { udt_epoll_verify_usock(eid, id, events) }
	}

	fn epoll_wait(
		&self,
		eid: c_int,
		read: &mut HashSet<SocketId>,
		write: &mut HashSet<SocketId>,
		mut timeout_ms: i64,
	) -> c_int {
		let mut capacity = WAIT_CAPACITY;
		loop {
			let mut read_ids = vec![0 as SocketId; capacity];
			let mut write_ids = vec![0 as SocketId; capacity];
			let mut read_len = capacity as c_int;
			let mut write_len = capacity as c_int;
			let rv = unsafe {
				udt_epoll_wait2(
					eid,
					read_ids.as_mut_ptr(),
					&mut read_len,
					write_ids.as_mut_ptr(),
					&mut write_len,
					timeout_ms,
					std::ptr::null_mut(),
					std::ptr::null_mut(),
					std::ptr::null_mut(),
					std::ptr::null_mut(),
				)
			};
			read.clear();
			write.clear();
			if rv < 0 {
				return rv;
			}
			if let Some(needed) = super::wait_regrow(rv, read_len, write_len, capacity) {
				tracing::trace!(eid, rv, capacity, needed, "ready ids truncated, waiting again");
				capacity = needed;
				// poll for the full sets
				timeout_ms = 0;
				continue;
			}
			let filled = |len: c_int| (len.max(0) as usize).min(capacity);
			read.extend(&read_ids[..filled(read_len)]);
			write.extend(&write_ids[..filled(write_len)]);
			return rv;
		}
	}

	fn getlasterror(&self) -> ErrorInfo {
		let code = unsafe { udt_getlasterror_code() };
		let desc = unsafe { udt_getlasterror_desc() };
		let message = if desc.is_null() {
			None
		} else {
			Some(unsafe { CStr::from_ptr(desc) }.to_string_lossy().into_owned())
		};
		ErrorInfo { code, message }
	}

	fn clearlasterror(&self) {
		unsafe { udt_clearlasterror() }
	}
}
