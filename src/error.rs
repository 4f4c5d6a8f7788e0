use crate::native::{ErrorInfo, SocketId, Transport};

/// Placeholder used when the native library reports no message.
pub const NO_MESSAGE: &str = "<NONE>";

/// Native error codes, plus the negative codes the wrapper itself raises.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum ErrorCode {
	Success = 0,

	ConnSetup = 1000,
	NoServer = 1001,
	ConnRejected = 1002,
	SockFail = 1003,
	SecFail = 1004,

	ConnFail = 2000,
	ConnLost = 2001,
	NoConn = 2002,

	Resource = 3000,
	Thread = 3001,
	NoBuf = 3002,

	File = 4000,
	InvalidReadOffset = 4001,
	ReadPerm = 4002,
	InvalidWriteOffset = 4003,
	WritePerm = 4004,

	InvalidOp = 5000,
	BoundSock = 5001,
	ConnSock = 5002,
	InvalidParam = 5003,
	InvalidSock = 5004,
	UnboundSock = 5005,
	NoListen = 5006,
	RendezvousNoServer = 5007,
	RendezvousUnbound = 5008,
	StreamIllegal = 5009,
	DgramIllegal = 5010,
	DupListen = 5011,
	LargeMsg = 5012,
	InvalidPollId = 5013,

	AsyncFail = 6000,
	AsyncSend = 6001,
	AsyncRecv = 6002,
	Timeout = 6003,

	PeerError = 7000,

	Unknown = -1,
	WrapperUnimplemented = -2,
	WrapperMessage = -3,
	UserDefined = -4,
}

impl ErrorCode {
	/// Decodes a raw code. Codes outside the table map to `Unknown`.
	pub fn from_code(code: i32) -> Self {
		use ErrorCode::*;
		match code {
			0 => Success,
			1000 => ConnSetup,
			1001 => NoServer,
			1002 => ConnRejected,
			1003 => SockFail,
			1004 => SecFail,
			2000 => ConnFail,
			2001 => ConnLost,
			2002 => NoConn,
			3000 => Resource,
			3001 => Thread,
			3002 => NoBuf,
			4000 => File,
			4001 => InvalidReadOffset,
			4002 => ReadPerm,
			4003 => InvalidWriteOffset,
			4004 => WritePerm,
			5000 => InvalidOp,
			5001 => BoundSock,
			5002 => ConnSock,
			5003 => InvalidParam,
			5004 => InvalidSock,
			5005 => UnboundSock,
			5006 => NoListen,
			5007 => RendezvousNoServer,
			5008 => RendezvousUnbound,
			5009 => StreamIllegal,
			5010 => DgramIllegal,
			5011 => DupListen,
			5012 => LargeMsg,
			5013 => InvalidPollId,
			6000 => AsyncFail,
			6001 => AsyncSend,
			6002 => AsyncRecv,
			6003 => Timeout,
			7000 => PeerError,
			-2 => WrapperUnimplemented,
			-3 => WrapperMessage,
			-4 => UserDefined,
			_ => Unknown,
		}
	}

	#[inline]
	pub fn code(self) -> i32 {
		self as i32
	}

	/// Human-readable description of the code.
	pub fn description(self) -> &'static str {
		use ErrorCode::*;
		match self {
			Success => "success operation",
			ConnSetup => "connection setup failure",
			NoServer => "server does not exist",
			ConnRejected => "connection request was rejected by server",
			SockFail => "could not create/configure UDP socket",
			SecFail => "connection request was aborted due to security reasons",
			ConnFail => "connection failure",
			ConnLost => "connection was broken",
			NoConn => "connection does not exist",
			Resource => "system resource failure",
			Thread => "could not create new thread",
			NoBuf => "no memory space",
			File => "file access error",
			InvalidReadOffset => "invalid read offset",
			ReadPerm => "no read permission",
			InvalidWriteOffset => "invalid write offset",
			WritePerm => "no write permission",
			InvalidOp => "operation not supported",
			BoundSock => "cannot execute the operation on a bound socket",
			ConnSock => "cannot execute the operation on a connected socket",
			InvalidParam => "bad parameters",
			InvalidSock => "invalid UDT socket",
			UnboundSock => "cannot listen on unbound socket",
			NoListen => "(accept) socket is not in listening state",
			RendezvousNoServer => "rendezvous connection process does not allow listen and accept call",
			RendezvousUnbound => "rendezvous connection setup is enabled but bind has not been called",
			StreamIllegal => "operation not supported in SOCK_STREAM mode",
			DgramIllegal => "operation not supported in SOCK_DGRAM mode",
			DupListen => "another socket is already listening on the same UDP port",
			LargeMsg => "message is too large to be hold in the sending buffer",
			InvalidPollId => "epoll ID is invalid",
			AsyncFail => "non-blocking call failure",
			AsyncSend => "no buffer available for sending",
			AsyncRecv => "no data available for read",
			Timeout => "timeout before operation completes",
			PeerError => "error has happened at the peer side",
			Unknown => "unknown error code",
			WrapperUnimplemented => "this feature is not yet implemented",
			WrapperMessage => "wrapper generated error",
			UserDefined => "user defined message",
		}
	}
}

/// Errors raised at the boundary.
///
/// `socket_id` is 0 when the failure is not tied to one socket.
#[derive(Debug, thiserror::Error)]
pub enum UdtError {
	#[error("{context} failed on socket {socket_id}: {message} ({})", describe(*.code))]
	Native {
		socket_id: SocketId,
		code: i32,
		message: String,
		context: &'static str,
	},

	#[error("{reason} (socket {socket_id}: position={position}, limit={limit}, capacity={capacity})")]
	InvalidRange {
		socket_id: SocketId,
		reason: &'static str,
		position: usize,
		limit: usize,
		capacity: usize,
	},

	#[error("unsupported option class in OptionUDT: {type_name} (socket {socket_id})")]
	UnsupportedOptionType { socket_id: SocketId, type_name: &'static str },

	#[error("option {option} expects a {expected} value (socket {socket_id})")]
	OptionValueMismatch {
		socket_id: SocketId,
		option: i32,
		expected: &'static str,
	},

	#[error("{context}: unexpected socket kind {kind} (socket {socket_id})")]
	UnknownSocketKind {
		socket_id: SocketId,
		context: &'static str,
		kind: i32,
	},

	#[error("{context}: can not allocate {size} bytes (socket {socket_id})")]
	Allocation {
		socket_id: SocketId,
		context: &'static str,
		size: usize,
	},

	#[error("{which}Size {needed} > {which} buffer capacity {capacity}")]
	CapacityExceeded {
		which: &'static str,
		needed: usize,
		capacity: usize,
	},

	#[error("invalid address: {reason} (socket {socket_id})")]
	InvalidAddress { socket_id: SocketId, reason: &'static str },

	#[error("library is not initialized")]
	NotInitialized,
}

pub type Result<T> = std::result::Result<T, UdtError>;

fn describe(code: i32) -> String {
	match ErrorCode::from_code(code) {
		ErrorCode::Unknown if code != -1 => format!("code {}", code),
		known => format!("{}: {}", code, known.description()),
	}
}

impl UdtError {
	/// Builds the error for a failed native call from the thread's last error.
	pub fn from_info(socket_id: SocketId, context: &'static str, info: ErrorInfo) -> Self {
		UdtError::Native {
			socket_id,
			code: info.code,
			message: info.message.unwrap_or_else(|| NO_MESSAGE.to_string()),
			context,
		}
	}

	/// Reads the last native error and translates it.
	pub fn last(transport: &dyn Transport, socket_id: SocketId, context: &'static str) -> Self {
		Self::from_info(socket_id, context, transport.getlasterror())
	}

	/// Numeric code. Errors raised by the wrapper carry `WrapperMessage`.
	pub fn code(&self) -> i32 {
		match self {
			UdtError::Native { code, .. } => *code,
			_ => ErrorCode::WrapperMessage.code(),
		}
	}

	#[inline]
	pub fn error_code(&self) -> ErrorCode {
		ErrorCode::from_code(self.code())
	}

	pub fn socket_id(&self) -> SocketId {
		match self {
			UdtError::Native { socket_id, .. }
			| UdtError::InvalidRange { socket_id, .. }
			| UdtError::UnsupportedOptionType { socket_id, .. }
			| UdtError::OptionValueMismatch { socket_id, .. }
			| UdtError::UnknownSocketKind { socket_id, .. }
			| UdtError::Allocation { socket_id, .. }
			| UdtError::InvalidAddress { socket_id, .. } => *socket_id,
			UdtError::CapacityExceeded { .. } | UdtError::NotInitialized => 0,
		}
	}
}

/// Maps a native code to std::io::ErrorKind.
fn code_to_kind(code: ErrorCode) -> std::io::ErrorKind {
	use std::io::ErrorKind;
	match code {
		ErrorCode::NoServer | ErrorCode::ConnRejected => ErrorKind::ConnectionRefused,
		ErrorCode::ConnLost => ErrorKind::ConnectionReset,
		ErrorCode::NoConn => ErrorKind::NotConnected,
		ErrorCode::AsyncSend | ErrorCode::AsyncRecv => ErrorKind::WouldBlock,
		ErrorCode::Timeout => ErrorKind::TimedOut,
		ErrorCode::InvalidParam | ErrorCode::InvalidSock | ErrorCode::InvalidPollId => ErrorKind::InvalidInput,
		ErrorCode::DupListen => ErrorKind::AddrInUse,
		ErrorCode::InvalidOp | ErrorCode::StreamIllegal | ErrorCode::DgramIllegal => ErrorKind::Unsupported,
		ErrorCode::NoBuf | ErrorCode::Resource => ErrorKind::OutOfMemory,
		_ => ErrorKind::Other,
	}
}

impl From<UdtError> for std::io::Error {
	fn from(err: UdtError) -> Self {
		let kind = match &err {
			UdtError::Native { code, .. } => code_to_kind(ErrorCode::from_code(*code)),
			UdtError::InvalidRange { .. }
			| UdtError::UnsupportedOptionType { .. }
			| UdtError::OptionValueMismatch { .. }
			| UdtError::UnknownSocketKind { .. }
			| UdtError::InvalidAddress { .. }
			| UdtError::CapacityExceeded { .. } => std::io::ErrorKind::InvalidInput,
			UdtError::Allocation { .. } => std::io::ErrorKind::OutOfMemory,
			UdtError::NotInitialized => std::io::ErrorKind::Other,
		};
		std::io::Error::new(kind, err)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn native_error_keeps_code_socket_and_context() {
		let err = UdtError::from_info(7, "bind:bind", ErrorInfo::new(5001, "bound"));
		assert_eq!(err.code(), 5001);
		assert_eq!(err.socket_id(), 7);
		assert_eq!(err.error_code(), ErrorCode::BoundSock);
		let text = err.to_string();
		assert!(text.contains("bind:bind"), "{text}");
		assert!(text.contains("bound"), "{text}");
	}

	#[test]
	fn missing_message_uses_placeholder() {
		let err = UdtError::from_info(0, "epoll", ErrorInfo { code: 5013, message: None });
		match err {
			UdtError::Native { message, .. } => assert_eq!(message, NO_MESSAGE),
			other => panic!("unexpected {other:?}"),
		}
	}

	#[test]
	fn wrapper_errors_report_wrapper_code() {
		let err = UdtError::InvalidRange {
			socket_id: 3,
			reason: "position > limit",
			position: 5,
			limit: 4,
			capacity: 8,
		};
		assert_eq!(err.error_code(), ErrorCode::WrapperMessage);
		assert_eq!(err.socket_id(), 3);
	}

	#[test]
	fn unknown_codes_decode_to_unknown() {
		assert_eq!(ErrorCode::from_code(4242), ErrorCode::Unknown);
		assert_eq!(ErrorCode::from_code(6002), ErrorCode::AsyncRecv);
	}

	#[test]
	fn io_error_kind_follows_code() {
		let err: std::io::Error = UdtError::from_info(1, "recv/recvmsg", ErrorInfo::new(2001, "lost")).into();
		assert_eq!(err.kind(), std::io::ErrorKind::ConnectionReset);
	}
}
