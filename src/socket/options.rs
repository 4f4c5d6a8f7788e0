//! Socket option marshaling.
//!
//! Every option value crosses the boundary through one fixed-size native
//! union, [`OptionSlot`]. The caller names the value's kind with a
//! [`TypeTag`]; the slot's bytes are never used to guess it.

use std::any::Any;
use std::marker::PhantomData;
use std::sync::Arc;

use libc::{c_int, c_void};
use serde::{Deserialize, Serialize};

use crate::ccc::{CongestionFactory, FactoryAdapter};
use crate::error::{Result, UdtError};
use crate::native::sockopt::*;
use crate::registry::{OptionKind, TypeTag};

use super::SocketUdt;

const GET_OPTION: &str = "getOption:getsockopt";
const SET_OPTION: &str = "setOption:setsockopt";

/// How long `close` waits for unsent data, in seconds. Zero means off.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Linger(i32);

impl Linger {
	pub const OFF: Linger = Linger(0);

	/// Any value `≤ 0` is sent to the native library as "off".
	pub const fn new(seconds: i32) -> Self {
		Linger(seconds)
	}

	#[inline]
	pub fn seconds(self) -> i32 {
		self.0
	}

	#[inline]
	pub fn is_on(self) -> bool {
		self.0 > 0
	}

	pub(crate) fn to_native(self) -> libc::linger {
		match self.0 {
			seconds if seconds > 0 => libc::linger { l_onoff: 1, l_linger: seconds },
			_ => libc::linger { l_onoff: 0, l_linger: 0 },
		}
	}

	pub(crate) fn from_native(raw: libc::linger) -> Self {
		match raw.l_onoff {
			0 => Linger::OFF,
			_ => Linger(raw.l_linger),
		}
	}
}

/// A decoded option value.
#[derive(Debug, Clone)]
pub enum OptionValue {
	Bool(bool),
	Int(i32),
	Long(i64),
	Linger(Linger),
	Factory(Arc<dyn CongestionFactory>),
}

impl PartialEq for OptionValue {
	fn eq(&self, other: &Self) -> bool {
		use OptionValue::*;
		match (self, other) {
			(Bool(a), Bool(b)) => a == b,
			(Int(a), Int(b)) => a == b,
			(Long(a), Long(b)) => a == b,
			(Linger(a), Linger(b)) => a == b,
			(Factory(a), Factory(b)) => Arc::ptr_eq(a, b),
			_ => false,
		}
	}
}

impl OptionValue {
	pub fn kind(&self) -> OptionKind {
		match self {
			OptionValue::Bool(_) => OptionKind::Bool,
			OptionValue::Int(_) => OptionKind::Int,
			OptionValue::Long(_) => OptionKind::Long,
			OptionValue::Linger(_) => OptionKind::Linger,
			OptionValue::Factory(_) => OptionKind::Factory,
		}
	}

	/// Unboxes `value` as `kind`, or `None` if its concrete type differs.
	fn from_any(kind: OptionKind, value: &dyn Any) -> Option<Self> {
		match kind {
			OptionKind::Bool => value.downcast_ref::<bool>().copied().map(OptionValue::Bool),
			OptionKind::Int => value.downcast_ref::<i32>().copied().map(OptionValue::Int),
			OptionKind::Long => value.downcast_ref::<i64>().copied().map(OptionValue::Long),
			OptionKind::Linger => value.downcast_ref::<Linger>().copied().map(OptionValue::Linger),
			OptionKind::Factory => value
				.downcast_ref::<Arc<dyn CongestionFactory>>()
				.cloned()
				.map(OptionValue::Factory),
		}
	}
}

/// Native option value union.
#[repr(C)]
#[derive(Clone, Copy)]
union OptionSlot {
	factory: *mut c_void,
	linger: libc::linger,
	long: i64,
	int: c_int,
	flag: u8,
}

impl OptionSlot {
	fn zeroed() -> Self {
		// All-zero is a valid bit pattern for every variant.
		unsafe { std::mem::zeroed() }
	}
}

/// Byte size the native call expects for a value of `kind`.
fn native_size(kind: OptionKind) -> c_int {
	let size = match kind {
		OptionKind::Bool => std::mem::size_of::<bool>(),
		OptionKind::Int => std::mem::size_of::<c_int>(),
		OptionKind::Long => std::mem::size_of::<i64>(),
		OptionKind::Linger => std::mem::size_of::<libc::linger>(),
		OptionKind::Factory => std::mem::size_of::<*mut c_void>(),
	};
	size as c_int
}

/// Rust types usable with [`SocketOption`].
pub trait OptionType: Any + Sized {
	fn from_value(value: OptionValue) -> Option<Self>;
}

impl OptionType for bool {
	fn from_value(value: OptionValue) -> Option<Self> {
		match value {
			OptionValue::Bool(v) => Some(v),
			_ => None,
		}
	}
}

impl OptionType for i32 {
	fn from_value(value: OptionValue) -> Option<Self> {
		match value {
			OptionValue::Int(v) => Some(v),
			_ => None,
		}
	}
}

impl OptionType for i64 {
	fn from_value(value: OptionValue) -> Option<Self> {
		match value {
			OptionValue::Long(v) => Some(v),
			_ => None,
		}
	}
}

impl OptionType for Linger {
	fn from_value(value: OptionValue) -> Option<Self> {
		match value {
			OptionValue::Linger(v) => Some(v),
			_ => None,
		}
	}
}

impl OptionType for Arc<dyn CongestionFactory> {
	fn from_value(value: OptionValue) -> Option<Self> {
		match value {
			OptionValue::Factory(v) => Some(v),
			_ => None,
		}
	}
}

/// A native option code paired with the Rust type of its value.
pub struct SocketOption<T> {
	code: c_int,
	name: &'static str,
	_marker: PhantomData<fn() -> T>,
}

impl<T> SocketOption<T> {
	pub const fn new(code: c_int, name: &'static str) -> Self {
		Self { code, name, _marker: PhantomData }
	}

	#[inline]
	pub fn code(&self) -> c_int {
		self.code
	}

	#[inline]
	pub fn name(&self) -> &'static str {
		self.name
	}
}

impl<T> Clone for SocketOption<T> {
	fn clone(&self) -> Self {
		*self
	}
}

impl<T> Copy for SocketOption<T> {}

impl<T> std::fmt::Debug for SocketOption<T> {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{}({})", self.name, self.code)
	}
}

/// The UDT option catalog.
pub struct OptionUdt;

impl OptionUdt {
	/// Maximum packet size, in bytes.
	pub const MSS: SocketOption<i32> = SocketOption::new(UDT_MSS, "UDT_MSS");
	/// Whether sends block.
	pub const SEND_SYNC: SocketOption<bool> = SocketOption::new(UDT_SNDSYN, "UDT_SNDSYN");
	/// Whether receives (and accept) block.
	pub const RECEIVE_SYNC: SocketOption<bool> = SocketOption::new(UDT_RCVSYN, "UDT_RCVSYN");
	/// Congestion-control algorithm. Reads back `None` for the native built-in.
	pub const CONGESTION: SocketOption<Arc<dyn CongestionFactory>> = SocketOption::new(UDT_CC, "UDT_CC");
	/// Maximum window size, in packets.
	pub const FLIGHT_WINDOW: SocketOption<i32> = SocketOption::new(UDT_FC, "UDT_FC");
	pub const SEND_BUFFER: SocketOption<i32> = SocketOption::new(UDT_SNDBUF, "UDT_SNDBUF");
	pub const RECEIVE_BUFFER: SocketOption<i32> = SocketOption::new(UDT_RCVBUF, "UDT_RCVBUF");
	pub const LINGER: SocketOption<Linger> = SocketOption::new(UDT_LINGER, "UDT_LINGER");
	pub const UDP_SEND_BUFFER: SocketOption<i32> = SocketOption::new(UDP_SNDBUF, "UDP_SNDBUF");
	pub const UDP_RECEIVE_BUFFER: SocketOption<i32> = SocketOption::new(UDP_RCVBUF, "UDP_RCVBUF");
	pub const MAX_MESSAGE: SocketOption<i32> = SocketOption::new(UDT_MAXMSG, "UDT_MAXMSG");
	/// Message time-to-live in milliseconds, -1 for infinite.
	pub const MESSAGE_TTL: SocketOption<i32> = SocketOption::new(UDT_MSGTTL, "UDT_MSGTTL");
	pub const RENDEZVOUS: SocketOption<bool> = SocketOption::new(UDT_RENDEZVOUS, "UDT_RENDEZVOUS");
	/// Send timeout in milliseconds, -1 for infinite.
	pub const SEND_TIMEOUT: SocketOption<i32> = SocketOption::new(UDT_SNDTIMEO, "UDT_SNDTIMEO");
	/// Receive timeout in milliseconds, -1 for infinite.
	pub const RECEIVE_TIMEOUT: SocketOption<i32> = SocketOption::new(UDT_RCVTIMEO, "UDT_RCVTIMEO");
	pub const REUSE_ADDRESS: SocketOption<bool> = SocketOption::new(UDT_REUSEADDR, "UDT_REUSEADDR");
	/// Bandwidth cap in bytes per second, -1 for none.
	pub const MAX_BANDWIDTH: SocketOption<i64> = SocketOption::new(UDT_MAXBW, "UDT_MAXBW");
	pub const STATE: SocketOption<i32> = SocketOption::new(UDT_STATE, "UDT_STATE");
	pub const EVENT: SocketOption<i32> = SocketOption::new(UDT_EVENT, "UDT_EVENT");
	pub const SEND_DATA: SocketOption<i32> = SocketOption::new(UDT_SNDDATA, "UDT_SNDDATA");
	pub const RECEIVE_DATA: SocketOption<i32> = SocketOption::new(UDT_RCVDATA, "UDT_RCVDATA");
}

impl SocketUdt {
	/// Reads option `option`, decoding the native value as `tag`.
	///
	/// `Ok(None)` is returned only for the congestion-control kind, when
	/// the socket runs a control this socket did not install.
	pub fn get_option(&self, option: c_int, tag: TypeTag) -> Result<Option<OptionValue>> {
		let registry = self.library.registry();
		let kind = registry.kind_of(tag).ok_or(UdtError::UnsupportedOptionType {
			socket_id: self.id,
			type_name: tag.name(),
		})?;

		let mut slot = OptionSlot::zeroed();
		let mut len = std::mem::size_of::<OptionSlot>() as c_int;
		let rv = unsafe {
			self.transport()
				.getsockopt(self.id, 0, option, &mut slot as *mut OptionSlot as *mut c_void, &mut len)
		};
		self.check(rv, GET_OPTION)?;

		let value = unsafe {
			match kind {
				OptionKind::Bool => Some(OptionValue::Bool(slot.flag != 0)),
				OptionKind::Int => Some(OptionValue::Int(slot.int)),
				OptionKind::Long => Some(OptionValue::Long(slot.long)),
				OptionKind::Linger => Some(OptionValue::Linger(Linger::from_native(slot.linger))),
				OptionKind::Factory => self.installed_factory(slot.factory),
			}
		};
		tracing::trace!(socket = self.id, option = registry.option_name(option), ?value, "option read");
		Ok(value)
	}

	/// Writes option `option`. `value` must be of the type `tag` names.
	pub fn set_option(&self, option: c_int, tag: TypeTag, value: &dyn Any) -> Result<()> {
		let kind = self.library.registry().kind_of(tag).ok_or(UdtError::UnsupportedOptionType {
			socket_id: self.id,
			type_name: tag.name(),
		})?;
		let value = OptionValue::from_any(kind, value).ok_or(UdtError::OptionValueMismatch {
			socket_id: self.id,
			option,
			expected: kind.name(),
		})?;
		self.apply_option(option, value)
	}

	/// Typed read through [`OptionUdt`].
	pub fn get<T: OptionType>(&self, option: SocketOption<T>) -> Result<Option<T>> {
		Ok(self.get_option(option.code, TypeTag::of::<T>())?.and_then(T::from_value))
	}

	/// Typed write through [`OptionUdt`].
	pub fn set<T: OptionType>(&self, option: SocketOption<T>, value: T) -> Result<()> {
		self.set_option(option.code, TypeTag::of::<T>(), &value)
	}

	fn apply_option(&self, option: c_int, value: OptionValue) -> Result<()> {
		let name = self.library.registry().option_name(option);
		tracing::trace!(socket = self.id, option = name, ?value, "option write");

		let mut slot = OptionSlot::zeroed();
		match &value {
			OptionValue::Bool(flag) => slot.flag = *flag as u8,
			OptionValue::Int(int) => slot.int = *int,
			OptionValue::Long(long) => slot.long = *long,
			OptionValue::Linger(linger) => slot.linger = linger.to_native(),
			OptionValue::Factory(factory) => return self.install_factory(option, factory.clone()),
		}
		let rv = unsafe {
			self.transport().setsockopt(
				self.id,
				0,
				option,
				&slot as *const OptionSlot as *const c_void,
				native_size(value.kind()),
			)
		};
		self.check(rv, SET_OPTION)?;
		Ok(())
	}

	/// Hands a factory adapter to the native library.
	///
	/// The adapter itself, not a slot holding it, is the option value. On
	/// success it replaces the previous adapter in the socket's congestion
	/// slot and lives there until the socket is closed.
	fn install_factory(&self, option: c_int, factory: Arc<dyn CongestionFactory>) -> Result<()> {
		let adapter = FactoryAdapter::new(factory);
		let rv = unsafe {
			self.transport()
				.setsockopt(self.id, 0, option, adapter.handle(), native_size(OptionKind::Factory))
		};
		self.check(rv, SET_OPTION)?;
		tracing::debug!(socket = self.id, factory = adapter.factory().name(), "congestion control installed");
		// The previous adapter, if any, is dropped outside the lock.
		let _previous = self.congestion.lock().replace(adapter);
		Ok(())
	}

	/// Resolves a native control handle to the factory this socket installed.
	fn installed_factory(&self, control: *mut c_void) -> Option<OptionValue> {
		let slot = self.congestion.lock();
		let adapter = slot.as_ref().filter(|adapter| adapter.owns(control))?;
		Some(OptionValue::Factory(adapter.factory().clone()))
	}
}
