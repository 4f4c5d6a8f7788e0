use std::net::SocketAddrV4;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::ccc::CongestionFactory;
use crate::error::Result;
use crate::library::Library;
use super::{Linger, OptionUdt, SocketUdt, TypeUdt};

// ============================================================================
// Shared Configuration Structs
// ============================================================================

/// Buffer size configuration, in bytes. `None` keeps the native default.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BufferConfig {
	pub send: Option<i32>,
	pub recv: Option<i32>,
	pub udp_send: Option<i32>,
	pub udp_recv: Option<i32>,
}

impl BufferConfig {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn send(mut self, size: i32) -> Self {
		self.send = Some(size);
		self
	}

	pub fn recv(mut self, size: i32) -> Self {
		self.recv = Some(size);
		self
	}

	/// Sets both UDT protocol buffers.
	pub fn both(mut self, size: i32) -> Self {
		self.send = Some(size);
		self.recv = Some(size);
		self
	}

	/// Sets both underlying UDP socket buffers.
	pub fn udp(mut self, size: i32) -> Self {
		self.udp_send = Some(size);
		self.udp_recv = Some(size);
		self
	}

	fn apply(&self, socket: &SocketUdt) -> Result<()> {
		if let Some(size) = self.send {
			socket.set(OptionUdt::SEND_BUFFER, size)?;
		}
		if let Some(size) = self.recv {
			socket.set(OptionUdt::RECEIVE_BUFFER, size)?;
		}
		if let Some(size) = self.udp_send {
			socket.set(OptionUdt::UDP_SEND_BUFFER, size)?;
		}
		if let Some(size) = self.udp_recv {
			socket.set(OptionUdt::UDP_RECEIVE_BUFFER, size)?;
		}
		Ok(())
	}
}

/// Blocking-call timeouts. `None` waits indefinitely.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
	pub send: Option<Duration>,
	pub recv: Option<Duration>,
}

impl TimeoutConfig {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn send(mut self, timeout: Duration) -> Self {
		self.send = Some(timeout);
		self
	}

	pub fn recv(mut self, timeout: Duration) -> Self {
		self.recv = Some(timeout);
		self
	}

	fn apply(&self, socket: &SocketUdt) -> Result<()> {
		socket.set(OptionUdt::SEND_TIMEOUT, to_millis(self.send))?;
		socket.set(OptionUdt::RECEIVE_TIMEOUT, to_millis(self.recv))
	}
}

/// Native millisecond timeout, -1 for infinite.
pub(crate) fn to_millis(timeout: Option<Duration>) -> i32 {
	match timeout {
		Some(timeout) => timeout.as_millis().min(i32::MAX as u128) as i32,
		None => -1,
	}
}

/// Per-message delivery parameters of datagram sockets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MessageConfig {
	/// Milliseconds a message may wait before it is dropped; -1 never drops.
	pub ttl_ms: i32,
	/// Deliver messages in send order.
	pub ordered: bool,
}

impl Default for MessageConfig {
	fn default() -> Self {
		Self {
			ttl_ms: -1,
			ordered: true,
		}
	}
}

impl MessageConfig {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn ttl(mut self, ttl: Option<Duration>) -> Self {
		self.ttl_ms = to_millis(ttl);
		self
	}

	pub fn ordered(mut self, ordered: bool) -> Self {
		self.ordered = ordered;
		self
	}
}

// ============================================================================
// Socket Builder
// ============================================================================

/// Builder applying options before bind, listen or connect.
///
/// # Example
/// ```ignore
/// use udtlane::{BufferConfig, Library, Loopback, SocketBuilder, TimeoutConfig};
///
/// let library = Library::init(Arc::new(Loopback::new()))?;
/// let server = SocketBuilder::stream()
///     .buffers(BufferConfig::new().both(4 << 20))
///     .timeouts(TimeoutConfig::new().recv(Duration::from_secs(5)))
///     .listen(&library, SocketAddrV4::new(Ipv4Addr::LOCALHOST, 9000), 64)?;
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SocketBuilder {
	pub kind: TypeUdt,
	pub mss: i32,
	pub blocking: bool,
	pub linger: Linger,
	pub reuse_addr: Option<bool>,
	pub rendezvous: Option<bool>,
	pub flight_window: Option<i32>,
	/// Bytes per second, -1 for no cap.
	pub max_bandwidth: Option<i64>,
	pub buffers: BufferConfig,
	pub timeouts: TimeoutConfig,
	pub message: MessageConfig,
	#[serde(skip)]
	pub congestion: Option<Arc<dyn CongestionFactory>>,
}

impl Default for SocketBuilder {
	fn default() -> Self {
		Self::new(TypeUdt::Stream)
	}
}

impl SocketBuilder {
	pub fn new(kind: TypeUdt) -> Self {
		Self {
			kind,
			mss: 1500,
			blocking: true,
			linger: Linger::new(180),
			reuse_addr: None,
			rendezvous: None,
			flight_window: None,
			max_bandwidth: None,
			buffers: BufferConfig::default(),
			timeouts: TimeoutConfig::default(),
			message: MessageConfig::default(),
			congestion: None,
		}
	}

	pub fn stream() -> Self {
		Self::new(TypeUdt::Stream)
	}

	pub fn datagram() -> Self {
		Self::new(TypeUdt::Datagram)
	}

	pub fn mss(mut self, mss: i32) -> Self {
		self.mss = mss;
		self
	}

	pub fn blocking(mut self, blocking: bool) -> Self {
		self.blocking = blocking;
		self
	}

	pub fn linger(mut self, linger: Linger) -> Self {
		self.linger = linger;
		self
	}

	pub fn reuse_addr(mut self, enable: bool) -> Self {
		self.reuse_addr = Some(enable);
		self
	}

	pub fn rendezvous(mut self, enable: bool) -> Self {
		self.rendezvous = Some(enable);
		self
	}

	pub fn flight_window(mut self, packets: i32) -> Self {
		self.flight_window = Some(packets);
		self
	}

	pub fn max_bandwidth(mut self, bytes_per_sec: i64) -> Self {
		self.max_bandwidth = Some(bytes_per_sec);
		self
	}

	pub fn buffers(mut self, config: BufferConfig) -> Self {
		self.buffers = config;
		self
	}

	pub fn timeouts(mut self, config: TimeoutConfig) -> Self {
		self.timeouts = config;
		self
	}

	pub fn message(mut self, config: MessageConfig) -> Self {
		self.message = config;
		self
	}

	pub fn congestion(mut self, factory: Arc<dyn CongestionFactory>) -> Self {
		self.congestion = Some(factory);
		self
	}

	/// Creates the socket and applies every configured option.
	pub fn build(&self, library: &Arc<Library>) -> Result<SocketUdt> {
		let mut socket = SocketUdt::new(library, self.kind)?;
		socket.set(OptionUdt::MSS, self.mss)?;
		socket.set_blocking(self.blocking)?;
		socket.set(OptionUdt::LINGER, self.linger)?;
		if let Some(enable) = self.reuse_addr {
			socket.set(OptionUdt::REUSE_ADDRESS, enable)?;
		}
		if let Some(enable) = self.rendezvous {
			socket.set(OptionUdt::RENDEZVOUS, enable)?;
		}
		if let Some(packets) = self.flight_window {
			socket.set(OptionUdt::FLIGHT_WINDOW, packets)?;
		}
		if let Some(bandwidth) = self.max_bandwidth {
			socket.set(OptionUdt::MAX_BANDWIDTH, bandwidth)?;
		}
		self.buffers.apply(&socket)?;
		self.timeouts.apply(&socket)?;
		if let Some(factory) = &self.congestion {
			socket.set(OptionUdt::CONGESTION, factory.clone())?;
		}
		socket.set_message_config(self.message);
		Ok(socket)
	}

	pub fn bind(&self, library: &Arc<Library>, addr: SocketAddrV4) -> Result<SocketUdt> {
		let socket = self.build(library)?;
		socket.bind(addr)?;
		Ok(socket)
	}

	pub fn listen(&self, library: &Arc<Library>, addr: SocketAddrV4, backlog: i32) -> Result<SocketUdt> {
		let socket = self.bind(library, addr)?;
		socket.listen(backlog)?;
		Ok(socket)
	}

	pub fn connect(&self, library: &Arc<Library>, addr: SocketAddrV4) -> Result<SocketUdt> {
		let socket = self.build(library)?;
		socket.connect(addr)?;
		Ok(socket)
	}
}
