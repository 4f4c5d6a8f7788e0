pub mod socket;
pub mod native;
pub mod registry;
pub mod ccc;
pub mod epoll;
pub mod monitor;
mod addr;
mod buffer;
mod error;
mod library;

pub use self::error::{ErrorCode, Result, UdtError, NO_MESSAGE};
pub use self::library::Library;
pub use self::buffer::DirectBuffer;
pub use self::registry::{OptionDescriptor, OptionKind, Registry, TypeTag};
pub use self::ccc::{CongestionControl, CongestionFactory, CongestionWindow};
pub use self::native::{ErrorInfo, Loopback, SocketId, TraceInfo, Transport};
pub use self::epoll::{EpollUdt, Interest, Readiness, WaitOutcome};
pub use self::monitor::MonitorUdt;
pub use self::socket::{AcceptResult, AsSocketId, StatusUdt, SocketUdt, TypeUdt,
					   BufferConfig, MessageConfig, SocketBuilder, TimeoutConfig,
					   Linger, OptionType, OptionUdt, OptionValue, SocketOption,
					   RecvBuffer, SendBuffer, Transfer};
