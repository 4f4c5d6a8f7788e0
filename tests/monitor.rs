use std::net::{Ipv4Addr, SocketAddrV4};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use udtlane::{ErrorCode, Library, Loopback, MonitorUdt, SocketUdt, TypeUdt, UdtError};

fn setup() -> Arc<Library> {
	Library::init(Arc::new(Loopback::new())).unwrap()
}

fn connected(library: &Arc<Library>) -> (SocketUdt, SocketUdt, SocketUdt) {
	let server = SocketUdt::new(library, TypeUdt::Stream).unwrap();
	server.bind(SocketAddrV4::new(Ipv4Addr::LOCALHOST, 0)).unwrap();
	server.listen(4).unwrap();
	let addr = server.local_addr().unwrap().unwrap();
	let client = SocketUdt::new(library, TypeUdt::Stream).unwrap();
	client.connect(addr).unwrap();
	let accepted = server.accept().unwrap();
	(client, accepted, server)
}

#[test]
fn idle_syncs_agree_except_timestamp() {
	let library = setup();
	let socket = SocketUdt::new(&library, TypeUdt::Stream).unwrap();

	let mut first = MonitorUdt::new();
	socket.update_monitor(&mut first, false).unwrap();
	thread::sleep(Duration::from_millis(5));
	let mut second = MonitorUdt::new();
	socket.update_monitor(&mut second, false).unwrap();

	assert!(first.same_counters(&second));
	assert!(second.ms_time_stamp >= first.ms_time_stamp);
}

#[test]
fn traffic_shows_in_both_ends() {
	let library = setup();
	let (client, accepted, _server) = connected(&library);
	client.send(&[1u8; 4000]).unwrap();

	let sent = client.monitor(false).unwrap();
	assert!(sent.pkt_sent_total > 0);
	assert_eq!(sent.pkt_sent, sent.pkt_sent_total);

	let received = accepted.monitor(false).unwrap();
	assert_eq!(received.pkt_recv_total, sent.pkt_sent_total);
	assert!(received.byte_avail_rcv_buf >= 0);
}

#[test]
fn reset_clears_local_counters_only() {
	let library = setup();
	let (client, _accepted, _server) = connected(&library);
	client.send(&[1u8; 2000]).unwrap();

	let before = client.monitor(true).unwrap();
	assert!(before.pkt_sent > 0);

	let after = client.monitor(false).unwrap();
	assert_eq!(after.pkt_sent, 0);
	assert_eq!(after.pkt_sent_total, before.pkt_sent_total);
}

#[test]
fn update_overwrites_previous_values() {
	let library = setup();
	let socket = SocketUdt::new(&library, TypeUdt::Stream).unwrap();
	let mut monitor = MonitorUdt { pkt_recv_nak: 77, ms_rtt: -1.0, ..MonitorUdt::default() };
	socket.update_monitor(&mut monitor, false).unwrap();
	assert_eq!(monitor.pkt_recv_nak, 0);
	assert!(monitor.ms_rtt >= 0.0);
	assert_eq!(monitor.pkt_flow_window, 25600);
}

#[test]
fn closed_socket_fails_with_context() {
	let library = setup();
	let socket = SocketUdt::new(&library, TypeUdt::Stream).unwrap();
	socket.close().unwrap();
	let err = socket.monitor(false).unwrap_err();
	assert_eq!(err.error_code(), ErrorCode::InvalidSock);
	assert!(matches!(err, UdtError::Native { context: "monitor:perfmon", .. }));
}
