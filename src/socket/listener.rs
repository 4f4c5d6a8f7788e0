use std::net::SocketAddrV4;

use crate::addr::{self, FromSockAddr};
use crate::error::{ErrorCode, Result, UdtError};
use crate::native::{SocketId, INVALID_SOCK};

use super::SocketUdt;

const ACCEPT: &str = "accept:accept";

/// Outcome of [`SocketUdt::accept_nonblocking`].
#[derive(Debug)]
pub enum AcceptResult {
	/// A connection was accepted, with the client's address when the
	/// native library reported an IPv4 one.
	Connection(SocketUdt, Option<SocketAddrV4>),
	/// No pending connection.
	WouldBlock,
}

impl SocketUdt {
	/// Accepts a pending connection.
	///
	/// Blocks while the socket is in blocking mode. On a non-blocking
	/// socket with nothing pending this fails with `EASYNCRCV`; use
	/// [`SocketUdt::accept_nonblocking`] to get `WouldBlock` instead.
	///
	/// The accepted socket has the listener's kind.
	pub fn accept(&self) -> Result<SocketUdt> {
		let (id, _) = self.accept_raw()?;
		Ok(self.accepted(id))
	}

	/// Accepts a connection, returning the client's address.
	pub fn accept_with_addr(&self) -> Result<(SocketUdt, SocketAddrV4)> {
		let (id, addr) = self.accept_raw()?;
		let socket = self.accepted(id);
		let addr = addr.ok_or(UdtError::InvalidAddress {
			socket_id: id,
			reason: "invalid client address",
		})?;
		Ok((socket, addr))
	}

	/// Accepts a connection if one is pending, reporting `WouldBlock` otherwise.
	///
	/// Meant for sockets put in non-blocking mode with
	/// [`SocketUdt::set_blocking`]; on a blocking socket it behaves like
	/// [`SocketUdt::accept`].
	pub fn accept_nonblocking(&self) -> Result<AcceptResult> {
		match self.accept_raw() {
			Ok((id, addr)) => Ok(AcceptResult::Connection(self.accepted(id), addr)),
			Err(err) if err.error_code() == ErrorCode::AsyncRecv => Ok(AcceptResult::WouldBlock),
			Err(err) => Err(err),
		}
	}

	fn accept_raw(&self) -> Result<(SocketId, Option<SocketAddrV4>)> {
		let (mut storage, mut len) = addr::storage();
		let name = &mut storage as *mut _ as *mut libc::sockaddr;
		let id = unsafe { self.transport().accept(self.id, name, &mut len) };
		if id == INVALID_SOCK {
			return Err(UdtError::last(self.transport(), self.id, ACCEPT));
		}
		let peer = unsafe { SocketAddrV4::from_sockaddr(name, len) };
		tracing::debug!(listener = self.id, socket = id, peer = ?peer, "connection accepted");
		Ok((id, peer))
	}

	fn accepted(&self, id: SocketId) -> SocketUdt {
		SocketUdt::from_id(self.library.clone(), id, self.kind)
	}
}
