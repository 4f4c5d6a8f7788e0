mod builder;
mod listener;
pub mod options;
pub mod transfer;

use std::net::SocketAddrV4;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use libc::c_int;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::addr::{self, FromSockAddr, ToSockAddr};
use crate::ccc::FactoryAdapter;
use crate::error::{Result, UdtError};
use crate::library::Library;
use crate::native::{sockstate, SocketId, Transport, INVALID_SOCK, UDT_ERROR};

pub use self::builder::{BufferConfig, MessageConfig, SocketBuilder, TimeoutConfig};
pub use self::listener::AcceptResult;
pub use self::options::{Linger, OptionType, OptionUdt, OptionValue, SocketOption};
pub use self::transfer::{RecvBuffer, SendBuffer, Transfer};

const SOCKET: &str = "socket:socket";
const BIND: &str = "bind:bind";
const LISTEN: &str = "listen:listen";
const CONNECT: &str = "connect:connect";
const CLOSE: &str = "close:close";

/// Socket kind, fixed for the lifetime of a socket.
///
/// - `Stream` — reliable byte stream, `send`/`recv`
/// - `Datagram` — reliable messages with boundaries, `sendmsg`/`recvmsg`,
///   time-to-live and ordering apply
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum TypeUdt {
	#[default]
	Stream,
	Datagram,
}

impl TypeUdt {
	/// The native `SOCK_STREAM`/`SOCK_DGRAM` value.
	#[inline]
	pub fn code(self) -> c_int {
		match self {
			TypeUdt::Stream => libc::SOCK_STREAM,
			TypeUdt::Datagram => libc::SOCK_DGRAM,
		}
	}

	pub fn from_code(code: c_int) -> Option<Self> {
		match code {
			libc::SOCK_STREAM => Some(TypeUdt::Stream),
			libc::SOCK_DGRAM => Some(TypeUdt::Datagram),
			_ => None,
		}
	}
}

/// Native socket state as reported by `getsockstate`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusUdt {
	Init,
	Opened,
	Listening,
	Connecting,
	Connected,
	Broken,
	Closing,
	Closed,
	NonExistent,
	Unknown(c_int),
}

impl StatusUdt {
	pub fn from_code(code: c_int) -> Self {
		match code {
			sockstate::INIT => StatusUdt::Init,
			sockstate::OPENED => StatusUdt::Opened,
			sockstate::LISTENING => StatusUdt::Listening,
			sockstate::CONNECTING => StatusUdt::Connecting,
			sockstate::CONNECTED => StatusUdt::Connected,
			sockstate::BROKEN => StatusUdt::Broken,
			sockstate::CLOSING => StatusUdt::Closing,
			sockstate::CLOSED => StatusUdt::Closed,
			sockstate::NONEXIST => StatusUdt::NonExistent,
			other => StatusUdt::Unknown(other),
		}
	}
}

/// Anything that names a native socket.
pub trait AsSocketId {
	fn socket_id(&self) -> SocketId;
}

impl AsSocketId for SocketId {
	#[inline]
	fn socket_id(&self) -> SocketId {
		*self
	}
}

impl AsSocketId for SocketUdt {
	#[inline]
	fn socket_id(&self) -> SocketId {
		self.id
	}
}

/// A native UDT socket.
///
/// Owns its identifier exclusively; the socket is closed when dropped
/// unless [`SocketUdt::close`] already ran. Operations delegate straight
/// to the native library and, on failure, leave the socket in whatever
/// state the native side reports.
pub struct SocketUdt {
	library: Arc<Library>,
	id: SocketId,
	kind: TypeUdt,
	message: MessageConfig,
	/// Keeps the congestion-control adapter alive while native code may call into it.
	congestion: Mutex<Option<Arc<FactoryAdapter>>>,
	closed: AtomicBool,
}

impl SocketUdt {
	/// Creates a new IPv4 socket of the given kind.
	pub fn new(library: &Arc<Library>, kind: TypeUdt) -> Result<Self> {
		let transport = library.transport();
		let id = transport.socket(libc::AF_INET, kind.code(), 0);
		if id == INVALID_SOCK {
			return Err(UdtError::last(transport, 0, SOCKET));
		}
		tracing::debug!(socket = id, ?kind, "socket created");
		Ok(Self::from_id(library.clone(), id, kind))
	}

	/// Wraps an identifier the native library just handed out.
	pub(crate) fn from_id(library: Arc<Library>, id: SocketId, kind: TypeUdt) -> Self {
		Self {
			library,
			id,
			kind,
			message: MessageConfig::default(),
			congestion: Mutex::new(None),
			closed: AtomicBool::new(false),
		}
	}

	#[inline]
	pub fn id(&self) -> SocketId {
		self.id
	}

	#[inline]
	pub fn kind(&self) -> TypeUdt {
		self.kind
	}

	#[inline]
	pub fn library(&self) -> &Arc<Library> {
		&self.library
	}

	#[inline]
	pub(crate) fn transport(&self) -> &dyn Transport {
		self.library.transport()
	}

	/// Maps a native return value to a result, reading the last error on failure.
	pub(crate) fn check(&self, rv: c_int, context: &'static str) -> Result<c_int> {
		match rv {
			UDT_ERROR => Err(UdtError::last(self.transport(), self.id, context)),
			rv => Ok(rv),
		}
	}

	pub fn bind(&self, addr: SocketAddrV4) -> Result<()> {
		let rv = addr.with_raw(|name, len| unsafe { self.transport().bind(self.id, name, len) });
		self.check(rv, BIND)?;
		tracing::debug!(socket = self.id, %addr, "socket bound");
		Ok(())
	}

	/// Starts accepting connections; `backlog` caps pending connections.
	pub fn listen(&self, backlog: i32) -> Result<()> {
		let rv = self.transport().listen(self.id, backlog);
		self.check(rv, LISTEN)?;
		tracing::debug!(socket = self.id, backlog, "socket listening");
		Ok(())
	}

	/// Connects to a listening peer. Blocks until the handshake completes
	/// unless the socket is non-blocking.
	pub fn connect(&self, addr: SocketAddrV4) -> Result<()> {
		let rv = addr.with_raw(|name, len| unsafe { self.transport().connect(self.id, name, len) });
		self.check(rv, CONNECT)?;
		tracing::debug!(socket = self.id, %addr, "socket connected");
		Ok(())
	}

	/// Closes the socket.
	///
	/// A second close is passed to the native library like the first and
	/// reports whatever error it returns.
	pub fn close(&self) -> Result<()> {
		let rv = self.transport().close(self.id);
		self.closed.store(true, Ordering::Release);
		self.check(rv, CLOSE)?;
		if let Some(adapter) = self.congestion.lock().take() {
			tracing::trace!(socket = self.id, live = adapter.live_controls(), "congestion adapter released");
		}
		tracing::debug!(socket = self.id, "socket closed");
		Ok(())
	}

	/// Local address, or `None` if the native library cannot report one.
	pub fn local_addr(&self) -> Result<Option<SocketAddrV4>> {
		self.query_addr(|transport, name, len| unsafe { transport.getsockname(self.id, name, len) })
	}

	/// Peer address, or `None` if the native library cannot report one.
	pub fn peer_addr(&self) -> Result<Option<SocketAddrV4>> {
		self.query_addr(|transport, name, len| unsafe { transport.getpeername(self.id, name, len) })
	}

	fn query_addr(
		&self,
		query: impl FnOnce(&dyn Transport, *mut libc::sockaddr, *mut c_int) -> c_int,
	) -> Result<Option<SocketAddrV4>> {
		let (mut storage, mut len) = addr::storage();
		let name = &mut storage as *mut _ as *mut libc::sockaddr;
		if query(self.transport(), name, &mut len) == UDT_ERROR {
			return Ok(None);
		}
		unsafe { SocketAddrV4::from_sockaddr(name, len) }
			.map(Some)
			.ok_or(UdtError::InvalidAddress {
				socket_id: self.id,
				reason: "native address is not IPv4",
			})
	}

	pub fn status(&self) -> StatusUdt {
		StatusUdt::from_code(self.transport().getsockstate(self.id))
	}

	/// Sets `UDT_SNDSYN` and `UDT_RCVSYN` together.
	pub fn set_blocking(&self, blocking: bool) -> Result<()> {
		self.set(OptionUdt::SEND_SYNC, blocking)?;
		self.set(OptionUdt::RECEIVE_SYNC, blocking)
	}

	/// Whether receive calls block.
	pub fn is_blocking(&self) -> Result<bool> {
		Ok(self.get(OptionUdt::RECEIVE_SYNC)?.unwrap_or(true))
	}

	/// Time-to-live and ordering applied by [`SocketUdt::send`] on datagram sockets.
	#[inline]
	pub fn message_config(&self) -> MessageConfig {
		self.message
	}

	pub fn set_message_config(&mut self, config: MessageConfig) {
		self.message = config;
	}
}

impl std::fmt::Debug for SocketUdt {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("SocketUdt")
			.field("id", &self.id)
			.field("kind", &self.kind)
			.field("closed", &self.closed.load(Ordering::Acquire))
			.finish()
	}
}

impl Drop for SocketUdt {
	fn drop(&mut self) {
		if self.closed.load(Ordering::Acquire) {
			return;
		}
		if let Err(err) = self.close() {
			tracing::warn!(socket = self.id, error = %err, "close on drop failed");
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn kind_codes_are_the_platform_constants() {
		assert_eq!(TypeUdt::Stream.code(), libc::SOCK_STREAM);
		assert_eq!(TypeUdt::Datagram.code(), libc::SOCK_DGRAM);
		for kind in [TypeUdt::Stream, TypeUdt::Datagram] {
			assert_eq!(TypeUdt::from_code(kind.code()), Some(kind));
		}
		assert_eq!(TypeUdt::from_code(7), None);
	}
}
