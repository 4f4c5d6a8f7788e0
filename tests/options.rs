use std::net::{Ipv4Addr, SocketAddrV4};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use udtlane::{
	CongestionControl, CongestionFactory, CongestionWindow, ErrorCode, Library, Linger, Loopback, OptionUdt,
	OptionValue, SocketUdt, TypeTag, TypeUdt, UdtError,
};

fn setup() -> (Arc<Loopback>, Arc<Library>) {
	let loopback = Arc::new(Loopback::new());
	let library = Library::init(loopback.clone()).unwrap();
	(loopback, library)
}

#[test]
fn bool_int_long_round_trip() {
	let (_, library) = setup();
	let socket = SocketUdt::new(&library, TypeUdt::Stream).unwrap();

	socket.set(OptionUdt::RENDEZVOUS, true).unwrap();
	assert_eq!(socket.get(OptionUdt::RENDEZVOUS).unwrap(), Some(true));
	socket.set(OptionUdt::RENDEZVOUS, false).unwrap();
	assert_eq!(socket.get(OptionUdt::RENDEZVOUS).unwrap(), Some(false));

	socket.set(OptionUdt::RECEIVE_BUFFER, 1 << 22).unwrap();
	assert_eq!(socket.get(OptionUdt::RECEIVE_BUFFER).unwrap(), Some(1 << 22));

	socket.set(OptionUdt::MAX_BANDWIDTH, 10_000_000_000i64).unwrap();
	assert_eq!(socket.get(OptionUdt::MAX_BANDWIDTH).unwrap(), Some(10_000_000_000));
}

#[test]
fn linger_round_trip_normalizes_off() {
	let (_, library) = setup();
	let socket = SocketUdt::new(&library, TypeUdt::Stream).unwrap();
	assert_eq!(socket.get(OptionUdt::LINGER).unwrap(), Some(Linger::new(180)));

	socket.set(OptionUdt::LINGER, Linger::new(30)).unwrap();
	assert_eq!(socket.get(OptionUdt::LINGER).unwrap(), Some(Linger::new(30)));

	for seconds in [0, -1, i32::MIN] {
		socket.set(OptionUdt::LINGER, Linger::new(seconds)).unwrap();
		let linger = socket.get(OptionUdt::LINGER).unwrap().unwrap();
		assert_eq!(linger, Linger::OFF);
		assert!(!linger.is_on());
	}
}

#[test]
fn dynamic_access_by_tag() {
	let (_, library) = setup();
	let socket = SocketUdt::new(&library, TypeUdt::Stream).unwrap();
	socket.set_option(0, TypeTag::of::<i32>(), &1200i32).unwrap();
	assert_eq!(socket.get_option(0, TypeTag::of::<i32>()).unwrap(), Some(OptionValue::Int(1200)));
}

#[test]
fn unsupported_tag_makes_no_native_call() {
	let (loopback, library) = setup();
	let socket = SocketUdt::new(&library, TypeUdt::Stream).unwrap();
	let before = loopback.native_calls();

	let err = socket.get_option(0, TypeTag::of::<String>()).unwrap_err();
	assert!(matches!(err, UdtError::UnsupportedOptionType { .. }));
	assert!(err.to_string().contains("String"));

	let err = socket.set_option(0, TypeTag::of::<u16>(), &7u16).unwrap_err();
	assert!(matches!(err, UdtError::UnsupportedOptionType { .. }));
	assert_eq!(err.code(), ErrorCode::WrapperMessage.code());

	assert_eq!(loopback.native_calls(), before);
}

#[test]
fn mismatched_value_makes_no_native_call() {
	let (loopback, library) = setup();
	let socket = SocketUdt::new(&library, TypeUdt::Stream).unwrap();
	let before = loopback.native_calls();

	let err = socket.set_option(0, TypeTag::of::<i32>(), &true).unwrap_err();
	assert!(matches!(err, UdtError::OptionValueMismatch { option: 0, .. }));
	assert_eq!(loopback.native_calls(), before);
}

#[test]
fn read_only_option_is_rejected_natively() {
	let (_, library) = setup();
	let socket = SocketUdt::new(&library, TypeUdt::Stream).unwrap();
	let err = socket.set(OptionUdt::STATE, 1).unwrap_err();
	assert_eq!(err.error_code(), ErrorCode::InvalidOp);
	assert!(matches!(err, UdtError::Native { context: "setOption:setsockopt", .. }));
}

#[test]
fn closed_socket_reports_get_context() {
	let (_, library) = setup();
	let socket = SocketUdt::new(&library, TypeUdt::Stream).unwrap();
	socket.close().unwrap();
	let err = socket.get(OptionUdt::MSS).unwrap_err();
	assert_eq!(err.error_code(), ErrorCode::InvalidSock);
	assert!(matches!(err, UdtError::Native { context: "getOption:getsockopt", .. }));
}

#[test]
fn state_option_tracks_lifecycle() {
	let (_, library) = setup();
	let socket = SocketUdt::new(&library, TypeUdt::Stream).unwrap();
	socket.bind(SocketAddrV4::new(Ipv4Addr::LOCALHOST, 0)).unwrap();
	assert_eq!(socket.get(OptionUdt::STATE).unwrap(), Some(2));
}

// ============================================================================
// Congestion control
// ============================================================================

struct Fixed {
	inits: Arc<AtomicUsize>,
}

impl CongestionControl for Fixed {
	fn init(&mut self, window: &mut CongestionWindow) {
		self.inits.fetch_add(1, Ordering::SeqCst);
		window.window_size = 64.0;
	}
}

struct FixedFactory {
	inits: Arc<AtomicUsize>,
}

impl CongestionFactory for FixedFactory {
	fn create(&self) -> Box<dyn CongestionControl> {
		Box::new(Fixed { inits: self.inits.clone() })
	}

	fn name(&self) -> &str {
		"fixed"
	}
}

#[test]
fn congestion_factory_round_trip() {
	let (_, library) = setup();
	let socket = SocketUdt::new(&library, TypeUdt::Stream).unwrap();
	let inits = Arc::new(AtomicUsize::new(0));
	let factory: Arc<dyn CongestionFactory> = Arc::new(FixedFactory { inits: inits.clone() });

	socket.set(OptionUdt::CONGESTION, factory.clone()).unwrap();
	assert_eq!(inits.load(Ordering::SeqCst), 1);

	let installed = socket.get(OptionUdt::CONGESTION).unwrap().unwrap();
	assert!(Arc::ptr_eq(&installed, &factory));
	assert_eq!(installed.name(), "fixed");

	let monitor = socket.monitor(false).unwrap();
	assert_eq!(monitor.pkt_congestion_window, 64);
}

#[test]
fn builtin_control_reads_back_as_none() {
	let (_, library) = setup();
	let socket = SocketUdt::new(&library, TypeUdt::Stream).unwrap();
	assert!(socket.get(OptionUdt::CONGESTION).unwrap().is_none());
}

#[test]
fn replacing_factory_keeps_latest() {
	let (_, library) = setup();
	let socket = SocketUdt::new(&library, TypeUdt::Stream).unwrap();
	let first: Arc<dyn CongestionFactory> = Arc::new(FixedFactory { inits: Arc::new(AtomicUsize::new(0)) });
	let second: Arc<dyn CongestionFactory> = Arc::new(FixedFactory { inits: Arc::new(AtomicUsize::new(0)) });

	socket.set(OptionUdt::CONGESTION, first.clone()).unwrap();
	socket.set(OptionUdt::CONGESTION, second.clone()).unwrap();

	let installed = socket.get(OptionUdt::CONGESTION).unwrap().unwrap();
	assert!(Arc::ptr_eq(&installed, &second));
	assert!(!Arc::ptr_eq(&installed, &first));

	socket.close().unwrap();
	assert_eq!(Arc::strong_count(&second), 1);
}
