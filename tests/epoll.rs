use std::net::{Ipv4Addr, SocketAddrV4};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use udtlane::{
	EpollUdt, ErrorCode, Interest, Library, Loopback, Readiness, SocketUdt, TypeUdt, UdtError, WaitOutcome,
};

fn setup() -> (Arc<Loopback>, Arc<Library>) {
	let loopback = Arc::new(Loopback::new());
	let library = Library::init(loopback.clone()).unwrap();
	(loopback, library)
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
fn empty_group_poll_times_out() {
	let (_, library) = setup();
	let epoll = EpollUdt::create(&library).unwrap();
	let mut out = Readiness::with_capacity(8);

	assert_eq!(epoll.wait(&mut out, Some(Duration::ZERO)).unwrap(), WaitOutcome::Timeout);
	assert_eq!(out.read_count(), 0);
	assert_eq!(out.write_count(), 0);
	assert_eq!(out.except_count(), 0);
	epoll.release().unwrap();
}

#[test]
fn removed_socket_fails_verify() {
	let (_, library) = setup();
	let socket = SocketUdt::new(&library, TypeUdt::Stream).unwrap();
	let epoll = EpollUdt::create(&library).unwrap();

	epoll.add(&socket, Interest::READ | Interest::ERROR).unwrap();
	assert_eq!(epoll.verify(&socket).unwrap(), Interest::READ | Interest::ERROR);
	epoll.remove(&socket).unwrap();

	let err = epoll.verify(&socket).unwrap_err();
	assert_eq!(err.error_code(), ErrorCode::InvalidSock);
	assert!(matches!(err, UdtError::Native { context: "epollVerify:epoll_verify_usock", .. }));
	assert_eq!(err.socket_id(), socket.id());

	epoll.remove(&socket).unwrap();
}

#[test]
fn update_returns_previous_interest() {
	let (_, library) = setup();
	let socket = SocketUdt::new(&library, TypeUdt::Stream).unwrap();
	let epoll = EpollUdt::create(&library).unwrap();

	epoll.add(&socket, Interest::READ).unwrap();
	assert_eq!(epoll.update(&socket, Interest::WRITE).unwrap(), Interest::READ);
	assert_eq!(epoll.verify(&socket).unwrap(), Interest::WRITE);

	let stranger = SocketUdt::new(&library, TypeUdt::Stream).unwrap();
	assert!(epoll.update(&stranger, Interest::ALL).is_err());
}

#[test]
fn add_unknown_socket_fails() {
	let (_, library) = setup();
	let epoll = EpollUdt::create(&library).unwrap();
	let err = epoll.add(&4242, Interest::READ).unwrap_err();
	assert_eq!(err.error_code(), ErrorCode::InvalidSock);
	assert_eq!(err.socket_id(), 4242);
}

#[test]
fn readable_socket_is_only_in_read_set() {
	let (_, library) = setup();
	let (client, accepted, _server) = connected(&library);
	let epoll = EpollUdt::create(&library).unwrap();
	epoll.add(&accepted, Interest::READ).unwrap();

	client.send(b"ping").unwrap();
	let mut out = Readiness::new();
	assert_eq!(epoll.wait(&mut out, Some(Duration::from_millis(100))).unwrap(), WaitOutcome::Ready(1));
	assert_eq!(out.read(), &[accepted.id()]);
	assert!(out.write().is_empty());
	assert_eq!(out.except_count(), 0);
}

#[test]
fn writable_and_readable_socket_fills_both_sets() {
	let (_, library) = setup();
	let (client, accepted, _server) = connected(&library);
	let epoll = EpollUdt::create(&library).unwrap();
	epoll.add(&accepted, Interest::READ | Interest::WRITE).unwrap();
	client.send(b"ping").unwrap();

	let mut out = Readiness::new();
	assert_eq!(epoll.wait(&mut out, Some(Duration::ZERO)).unwrap(), WaitOutcome::Ready(2));
	assert_eq!(out.read(), &[accepted.id()]);
	assert_eq!(out.write(), &[accepted.id()]);
}

#[test]
fn broken_socket_reported_in_both_sets() {
	let (_, library) = setup();
	let (client, accepted, _server) = connected(&library);
	let epoll = EpollUdt::create(&library).unwrap();
	epoll.add(&accepted, Interest::ERROR).unwrap();
	client.close().unwrap();

	let mut out = Readiness::new();
	assert_eq!(epoll.wait(&mut out, Some(Duration::ZERO)).unwrap(), WaitOutcome::Ready(2));
	assert_eq!(out.read(), &[accepted.id()]);
	assert_eq!(out.write(), &[accepted.id()]);
	assert_eq!(out.except_count(), 0);
}

#[test]
fn ready_set_larger_than_region_fails() {
	let (_, library) = setup();
	let (client_a, accepted_a, _server_a) = connected(&library);
	let (client_b, accepted_b, _server_b) = connected(&library);
	let epoll = EpollUdt::create(&library).unwrap();
	epoll.add(&accepted_a, Interest::READ).unwrap();
	epoll.add(&accepted_b, Interest::READ).unwrap();
	client_a.send(b"a").unwrap();
	client_b.send(b"b").unwrap();

	let mut out = Readiness::with_capacity(1);
	let err = epoll.wait(&mut out, Some(Duration::ZERO)).unwrap_err();
	assert!(matches!(err, UdtError::CapacityExceeded { which: "read", needed: 2, capacity: 1 }));
}

#[test]
fn failed_wait_leaves_no_stale_readiness() {
	let (_, library) = setup();
	let (client_a, accepted_a, _server_a) = connected(&library);
	let (client_b, accepted_b, _server_b) = connected(&library);
	let epoll = EpollUdt::create(&library).unwrap();
	epoll.add(&accepted_a, Interest::READ).unwrap();
	epoll.add(&accepted_b, Interest::READ).unwrap();

	let mut out = Readiness::with_capacity(1);
	client_a.send(b"a").unwrap();
	assert_eq!(epoll.wait(&mut out, Some(Duration::ZERO)).unwrap(), WaitOutcome::Ready(1));
	assert_eq!(out.read(), &[accepted_a.id()]);

	client_b.send(b"b").unwrap();
	assert!(epoll.wait(&mut out, Some(Duration::ZERO)).is_err());
	assert_eq!(out.read_count(), 0);
	assert_eq!(out.write_count(), 0);
	assert!(out.read().is_empty());
}

#[test]
fn blocking_wait_wakes_on_data() {
	let (_, library) = setup();
	let (client, accepted, _server) = connected(&library);
	let epoll = EpollUdt::create(&library).unwrap();
	epoll.add(&accepted, Interest::READ).unwrap();

	let writer = thread::spawn(move || {
		thread::sleep(Duration::from_millis(20));
		client.send(b"late").unwrap();
		client
	});
	let mut out = Readiness::new();
	assert_eq!(epoll.wait(&mut out, None).unwrap(), WaitOutcome::Ready(1));
	assert_eq!(out.read(), &[accepted.id()]);
	drop(writer.join().unwrap());
}

#[test]
fn released_group_is_gone() {
	let (loopback, library) = setup();
	let epoll = EpollUdt::create(&library).unwrap();
	let id = epoll.id();
	epoll.release().unwrap();

	let before = loopback.native_calls();
	let mut events = 0;
	assert_eq!(library.transport().epoll_verify_usock(id, 1000, &mut events), -1);
	assert_eq!(library.last_error().code, ErrorCode::InvalidPollId.code());
	assert_eq!(loopback.native_calls(), before + 2);
}

#[test]
fn dropped_group_is_released() {
	let (_, library) = setup();
	let id = {
		let epoll = EpollUdt::create(&library).unwrap();
		epoll.id()
	};
	assert_eq!(library.transport().epoll_release(id), -1);
	assert_eq!(library.last_error().code, ErrorCode::InvalidPollId.code());
}
