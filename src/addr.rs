//! IPv4 address marshaling between `std::net::SocketAddrV4` and `sockaddr_in`.
//!
//! Only AF_INET crosses the boundary; other families are rejected on decode.

use std::net::{Ipv4Addr, SocketAddrV4};

use libc::c_int;

/// Address types that can be lent to a native call as a raw sockaddr.
pub(crate) trait ToSockAddr {
	/// Calls the provided closure with a pointer to the raw sockaddr and its size.
	fn with_raw<F, R>(&self, f: F) -> R
	where
		F: FnOnce(*const libc::sockaddr, c_int) -> R;
}

/// Address types that can be read back from a raw sockaddr.
pub(crate) trait FromSockAddr: Sized {
	/// # Safety
	/// `addr` must point to `len` readable bytes.
	unsafe fn from_sockaddr(addr: *const libc::sockaddr, len: c_int) -> Option<Self>;
}

/// Size of the native IPv4 address struct.
pub(crate) const SOCKADDR_IN_LEN: c_int = std::mem::size_of::<libc::sockaddr_in>() as c_int;

/// Converts to the raw sockaddr_in for native calls.
pub(crate) fn to_raw(addr: &SocketAddrV4) -> libc::sockaddr_in {
	let mut raw: libc::sockaddr_in = unsafe { std::mem::zeroed() };
	raw.sin_family = libc::AF_INET as libc::sa_family_t;
	raw.sin_port = addr.port().to_be();
	raw.sin_addr = libc::in_addr {
		s_addr: u32::from_be_bytes(addr.ip().octets()).to_be(),
	};
	raw
}

pub(crate) fn from_raw(raw: &libc::sockaddr_in) -> SocketAddrV4 {
	SocketAddrV4::new(
		Ipv4Addr::from(raw.sin_addr.s_addr.to_ne_bytes()),
		u16::from_be(raw.sin_port),
	)
}

impl ToSockAddr for SocketAddrV4 {
	fn with_raw<F, R>(&self, f: F) -> R
	where
		F: FnOnce(*const libc::sockaddr, c_int) -> R,
	{
		let raw = to_raw(self);
		f(&raw as *const _ as *const libc::sockaddr, SOCKADDR_IN_LEN)
	}
}

impl FromSockAddr for SocketAddrV4 {
	unsafe fn from_sockaddr(addr: *const libc::sockaddr, len: c_int) -> Option<Self> {
		if addr.is_null() || len < SOCKADDR_IN_LEN {
			return None;
		}
		let raw = unsafe { std::ptr::read_unaligned(addr as *const libc::sockaddr_in) };
		if raw.sin_family as c_int != libc::AF_INET {
			return None;
		}
		Some(from_raw(&raw))
	}
}

/// Writes `addr` into a caller-provided sockaddr buffer.
///
/// Returns false if the buffer is too small.
///
/// # Safety
/// `out` must point to `*len` writable bytes and `len` must be valid.
pub(crate) unsafe fn write_sockaddr(addr: &SocketAddrV4, out: *mut libc::sockaddr, len: *mut c_int) -> bool {
	if out.is_null() || len.is_null() || unsafe { *len } < SOCKADDR_IN_LEN {
		return false;
	}
	unsafe {
		std::ptr::write_unaligned(out as *mut libc::sockaddr_in, to_raw(addr));
		*len = SOCKADDR_IN_LEN;
	}
	true
}

/// Storage large enough for any address a native call may return.
pub(crate) fn storage() -> (libc::sockaddr_storage, c_int) {
	let storage: libc::sockaddr_storage = unsafe { std::mem::zeroed() };
	(storage, std::mem::size_of::<libc::sockaddr_storage>() as c_int)
}
