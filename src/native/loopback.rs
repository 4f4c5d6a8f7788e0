//! In-process implementation of [`Transport`].
//!
//! All sockets live in one table behind a mutex. Blocking calls park on a
//! condition variable and honor the socket's `UDT_SNDTIMEO`/`UDT_RCVTIMEO`.
//! Payload moves straight into the peer's inbox; there is no wire format,
//! no loss and no retransmission.

use std::collections::{HashMap, HashSet, VecDeque};
use std::net::{Ipv4Addr, SocketAddrV4};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread::{self, ThreadId};
use std::time::{Duration, Instant};

use libc::{c_int, c_void};
use parking_lot::{Condvar, Mutex, MutexGuard};

use crate::addr::{self, FromSockAddr};
use crate::ccc::{CongestionWindow, NativeControl, NativeFactory};
use crate::error::ErrorCode;

use super::sockopt::*;
use super::sockstate::*;
use super::{ErrorInfo, SocketId, TraceInfo, Transport, UDT_EPOLL_ERR, UDT_EPOLL_IN, UDT_EPOLL_OUT, UDT_ERROR};

const FIRST_SOCKET: SocketId = 1000;
const FIRST_EPHEMERAL: u16 = 40000;
/// IP + UDP header bytes carved out of every packet.
const HEADER_BYTES: c_int = 28;
const RTT_MS: f64 = 100.0;
/// Closed ids remembered for `getsockstate`; older ones report `NONEXIST`.
const CLOSED_HISTORY: usize = 4096;
const BANDWIDTH_MBPS: f64 = 1000.0;

/// Stands in for the native library's built-in congestion control.
static BUILTIN_CONTROL: u8 = 0;

#[derive(Clone, Copy)]
struct Options {
	mss: c_int,
	snd_syn: bool,
	rcv_syn: bool,
	fc: c_int,
	snd_buf: c_int,
	rcv_buf: c_int,
	linger: libc::linger,
	udp_snd_buf: c_int,
	udp_rcv_buf: c_int,
	max_msg: c_int,
	msg_ttl: c_int,
	rendezvous: bool,
	snd_timeo: c_int,
	rcv_timeo: c_int,
	reuse_addr: bool,
	max_bw: i64,
}

impl Default for Options {
	fn default() -> Self {
		Self {
			mss: 1500,
			snd_syn: true,
			rcv_syn: true,
			fc: 25600,
			snd_buf: 8192 * (1500 - HEADER_BYTES),
			rcv_buf: 8192 * (1500 - HEADER_BYTES),
			linger: libc::linger { l_onoff: 1, l_linger: 180 },
			udp_snd_buf: 65536,
			udp_rcv_buf: 8192 * 1500,
			max_msg: 1 << 20,
			msg_ttl: -1,
			rendezvous: false,
			snd_timeo: -1,
			rcv_timeo: -1,
			reuse_addr: true,
			max_bw: -1,
		}
	}
}

#[derive(Clone, Copy, Default)]
struct Counters {
	pkt_sent: i64,
	pkt_recv: i64,
	sent_ack: c_int,
	recv_ack: c_int,
	bytes_sent: i64,
	bytes_recv: i64,
}

struct Stats {
	created: Instant,
	since: Instant,
	total: Counters,
	local: Counters,
}

impl Stats {
	fn new() -> Self {
		let now = Instant::now();
		Self { created: now, since: now, total: Counters::default(), local: Counters::default() }
	}

	fn sent(&mut self, packets: i64, bytes: usize, acked: bool) {
		for counters in [&mut self.total, &mut self.local] {
			counters.pkt_sent += packets;
			counters.bytes_sent += bytes as i64;
			counters.recv_ack += acked as c_int;
		}
	}

	fn received(&mut self, packets: i64, bytes: usize) {
		for counters in [&mut self.total, &mut self.local] {
			counters.pkt_recv += packets;
			counters.bytes_recv += bytes as i64;
			counters.sent_ack += 1;
		}
	}

	fn clear(&mut self) {
		self.local = Counters::default();
		self.since = Instant::now();
	}
}

struct Entry {
	kind: c_int,
	status: c_int,
	local: Option<SocketAddrV4>,
	peer: Option<(SocketId, SocketAddrV4)>,
	stream: VecDeque<u8>,
	messages: VecDeque<Vec<u8>>,
	backlog: VecDeque<SocketId>,
	backlog_max: usize,
	opts: Options,
	/// Address of a `NativeControl` created through `UDT_CC`.
	control: Option<usize>,
	stats: Stats,
}

impl Entry {
	fn new(kind: c_int, opts: Options) -> Self {
		Self {
			kind,
			status: INIT,
			local: None,
			peer: None,
			stream: VecDeque::new(),
			messages: VecDeque::new(),
			backlog: VecDeque::new(),
			backlog_max: 0,
			opts,
			control: None,
			stats: Stats::new(),
		}
	}

	fn pending(&self) -> usize {
		self.stream.len() + self.messages.iter().map(Vec::len).sum::<usize>()
	}

	fn readable(&self) -> bool {
		self.pending() > 0 || !self.backlog.is_empty() || self.status == BROKEN
	}

	fn packets(&self, bytes: usize) -> i64 {
		let payload = (self.opts.mss - HEADER_BYTES).max(1) as usize;
		bytes.div_ceil(payload) as i64
	}

	fn window(&self) -> CongestionWindow {
		match self.control {
			// Controls stay allocated while referenced from the table.
			Some(control) => unsafe { (*(control as *const NativeControl)).window },
			None => CongestionWindow::default(),
		}
	}

	fn trace(&self, avail_snd: usize) -> TraceInfo {
		let Stats { created, since, total, local } = &self.stats;
		let elapsed_us = since.elapsed().as_micros().max(1) as f64;
		let window = self.window();
		let avail_rcv = (self.opts.rcv_buf.max(0) as usize).saturating_sub(self.pending());
		TraceInfo {
			ms_time_stamp: created.elapsed().as_millis() as i64,
			pkt_sent_total: total.pkt_sent,
			pkt_recv_total: total.pkt_recv,
			pkt_sent_ack_total: total.sent_ack,
			pkt_recv_ack_total: total.recv_ack,
			pkt_sent: local.pkt_sent,
			pkt_recv: local.pkt_recv,
			pkt_sent_ack: local.sent_ack,
			pkt_recv_ack: local.recv_ack,
			mbps_send_rate: local.bytes_sent as f64 * 8.0 / elapsed_us,
			mbps_recv_rate: local.bytes_recv as f64 * 8.0 / elapsed_us,
			us_pkt_snd_period: window.packet_period_us,
			pkt_flow_window: self.opts.fc,
			pkt_congestion_window: window.window_size as c_int,
			ms_rtt: RTT_MS,
			mbps_bandwidth: BANDWIDTH_MBPS,
			byte_avail_snd_buf: avail_snd.min(c_int::MAX as usize) as c_int,
			byte_avail_rcv_buf: avail_rcv.min(c_int::MAX as usize) as c_int,
			..TraceInfo::default()
		}
	}
}

struct State {
	started: u32,
	next_socket: SocketId,
	next_poll: c_int,
	next_port: u16,
	sockets: HashMap<SocketId, Entry>,
	closed: HashSet<SocketId>,
	closed_order: VecDeque<SocketId>,
	polls: HashMap<c_int, HashMap<SocketId, c_int>>,
}

impl State {
	fn allocate_id(&mut self) -> SocketId {
		let id = self.next_socket;
		self.next_socket += 1;
		id
	}

	fn bury(&mut self, id: SocketId) {
		if self.closed.insert(id) {
			self.closed_order.push_back(id);
		}
		while self.closed_order.len() > CLOSED_HISTORY {
			if let Some(oldest) = self.closed_order.pop_front() {
				self.closed.remove(&oldest);
			}
		}
	}

	fn port_in_use(&self, port: u16) -> bool {
		self.sockets.values().any(|entry| entry.local.is_some_and(|local| local.port() == port))
	}

	fn ephemeral(&mut self) -> u16 {
		loop {
			let port = self.next_port;
			self.next_port = port.checked_add(1).unwrap_or(FIRST_EPHEMERAL);
			if !self.port_in_use(port) {
				return port;
			}
		}
	}

	fn listener_for(&self, target: SocketAddrV4) -> Option<SocketId> {
		self.sockets
			.iter()
			.find(|(_, entry)| entry.status == LISTENING && entry.local.is_some_and(|local| same_endpoint(local, target)))
			.map(|(id, _)| *id)
	}

	/// Bytes `entry` may still queue at its peer.
	fn send_space(&self, entry: &Entry) -> usize {
		let queued = entry
			.peer
			.and_then(|(peer, _)| self.sockets.get(&peer))
			.map_or(0, Entry::pending);
		(entry.opts.snd_buf.max(0) as usize).saturating_sub(queued)
	}

	fn writable(&self, id: SocketId) -> bool {
		match self.sockets.get(&id) {
			Some(entry) if entry.status == CONNECTED => self.send_space(entry) > 0,
			Some(entry) => entry.status == BROKEN,
			None => false,
		}
	}

	fn deliver(&mut self, from: SocketId, payload: &[u8], message: bool) {
		let Some((peer, _)) = self.sockets.get(&from).and_then(|entry| entry.peer) else {
			return;
		};
		let mut acked = false;
		if let Some(target) = self.sockets.get_mut(&peer) {
			let packets = target.packets(payload.len());
			if message {
				target.messages.push_back(payload.to_vec());
			} else {
				target.stream.extend(payload);
			}
			target.stats.received(packets, payload.len());
			acked = true;
		}
		if let Some(source) = self.sockets.get_mut(&from) {
			let packets = source.packets(payload.len());
			source.stats.sent(packets, payload.len(), acked);
		}
	}
}

fn same_endpoint(bound: SocketAddrV4, target: SocketAddrV4) -> bool {
	bound.port() == target.port()
		&& (bound.ip() == target.ip() || bound.ip().is_unspecified() || target.ip().is_unspecified())
}

/// Outcome of one attempt of a blocking call.
enum Step {
	Done(c_int),
	/// Not ready; park for at most this many milliseconds (negative: forever).
	Wait(i64),
}

/// In-process stand-in for the native UDT library.
///
/// Counts every primitive invoked through [`Transport`], which lets tests
/// prove that a failing boundary check never reached the native side.
pub struct Loopback {
	state: Mutex<State>,
	changed: Condvar,
	/// Last error per thread. An entry lives until that thread calls
	/// `clearlasterror`, so the map holds at most one entry per thread.
	errors: Mutex<HashMap<ThreadId, ErrorInfo>>,
	calls: AtomicUsize,
}

impl Default for Loopback {
	fn default() -> Self {
		Self::new()
	}
}

impl Loopback {
	pub fn new() -> Self {
		Self {
			state: Mutex::new(State {
				started: 0,
				next_socket: FIRST_SOCKET,
				next_poll: 1,
				next_port: FIRST_EPHEMERAL,
				sockets: HashMap::new(),
				closed: HashSet::new(),
				closed_order: VecDeque::new(),
				polls: HashMap::new(),
			}),
			changed: Condvar::new(),
			errors: Mutex::new(HashMap::new()),
			calls: AtomicUsize::new(0),
		}
	}

	/// Number of primitives invoked so far.
	pub fn native_calls(&self) -> usize {
		self.calls.load(Ordering::SeqCst)
	}

	/// Number of sockets currently open.
	pub fn open_sockets(&self) -> usize {
		self.state.lock().sockets.len()
	}

	#[inline]
	fn enter(&self) {
		self.calls.fetch_add(1, Ordering::SeqCst);
	}

	fn fail(&self, code: ErrorCode) -> c_int {
		self.errors
			.lock()
			.insert(thread::current().id(), ErrorInfo::new(code.code(), code.description()));
		UDT_ERROR
	}

	/// Runs `attempt` until it completes, parking between attempts.
	///
	/// The deadline is fixed by the first `Step::Wait`. When it passes,
	/// `attempt` gets one last look before `on_timeout` decides the result.
	fn block(
		&self,
		mut state: MutexGuard<'_, State>,
		mut attempt: impl FnMut(&mut State) -> Step,
		on_timeout: impl FnOnce() -> c_int,
	) -> c_int {
		let mut deadline = None;
		loop {
			let timeout_ms = match attempt(&mut state) {
				Step::Done(rv) => return rv,
				Step::Wait(timeout_ms) => timeout_ms,
			};
			let until = *deadline.get_or_insert_with(|| {
				u64::try_from(timeout_ms)
					.ok()
					.map(|ms| Instant::now() + Duration::from_millis(ms))
			});
			match until {
				None => self.changed.wait(&mut state),
				Some(at) => {
					if self.changed.wait_until(&mut state, at).timed_out() {
						return match attempt(&mut state) {
							Step::Done(rv) => rv,
							Step::Wait(_) => on_timeout(),
						};
					}
				}
			}
		}
	}

	unsafe fn set_control(&self, id: SocketId, optval: *const c_void, optlen: c_int) -> c_int {
		if optval.is_null() || optlen != std::mem::size_of::<*const c_void>() as c_int {
			return self.fail(ErrorCode::InvalidParam);
		}
		if !self.state.lock().sockets.contains_key(&id) {
			return self.fail(ErrorCode::InvalidSock);
		}

		// Factory code runs without the table lock held.
		let factory = unsafe { &*(optval as *const NativeFactory) };
		let control = unsafe { (factory.create)(factory.ctx) };
		if control.is_null() {
			return self.fail(ErrorCode::Resource);
		}
		unsafe { ((*(*control).vtable).init)(control) };

		let previous = self
			.state
			.lock()
			.sockets
			.get_mut(&id)
			.map(|entry| entry.control.replace(control as usize));
		match previous {
			Some(old) => {
				if let Some(old) = old {
					unsafe { retire(old) };
				}
				0
			}
			None => {
				unsafe { retire(control as usize) };
				self.fail(ErrorCode::InvalidSock)
			}
		}
	}
}

impl Drop for Loopback {
	fn drop(&mut self) {
		for entry in self.state.get_mut().sockets.values_mut() {
			if let Some(control) = entry.control.take() {
				unsafe { retire(control) };
			}
		}
	}
}

/// Closes and frees a control created through `UDT_CC`.
unsafe fn retire(control: usize) {
	let control = control as *mut NativeControl;
	unsafe {
		let vtable = &*(*control).vtable;
		(vtable.close)(control);
		(vtable.destroy)(control);
	}
}

unsafe fn bytes<'a>(buf: *const u8, len: c_int) -> Option<&'a [u8]> {
	match usize::try_from(len) {
		Ok(0) => Some(&[]),
		Ok(len) if !buf.is_null() => Some(unsafe { std::slice::from_raw_parts(buf, len) }),
		_ => None,
	}
}

unsafe fn bytes_mut<'a>(buf: *mut u8, len: c_int) -> Option<&'a mut [u8]> {
	match usize::try_from(len) {
		Ok(0) => Some(&mut []),
		Ok(len) if !buf.is_null() => Some(unsafe { std::slice::from_raw_parts_mut(buf, len) }),
		_ => None,
	}
}

unsafe fn put<T: Copy>(optval: *mut c_void, optlen: *mut c_int, value: T) -> bool {
	let size = std::mem::size_of::<T>() as c_int;
	if optval.is_null() || optlen.is_null() || unsafe { *optlen } < size {
		return false;
	}
	unsafe {
		std::ptr::write_unaligned(optval as *mut T, value);
		*optlen = size;
	}
	true
}

unsafe fn take<T: Copy>(optval: *const c_void, optlen: c_int) -> Option<T> {
	if optval.is_null() || optlen != std::mem::size_of::<T>() as c_int {
		return None;
	}
	Some(unsafe { std::ptr::read_unaligned(optval as *const T) })
}

impl Transport for Loopback {
	fn startup(&self) -> c_int {
		self.enter();
		self.state.lock().started += 1;
		0
	}

	fn cleanup(&self) -> c_int {
		self.enter();
		let mut state = self.state.lock();
		state.started = state.started.saturating_sub(1);
		0
	}

	fn socket(&self, af: c_int, kind: c_int, _protocol: c_int) -> SocketId {
		self.enter();
		if af != libc::AF_INET || (kind != libc::SOCK_STREAM && kind != libc::SOCK_DGRAM) {
			return self.fail(ErrorCode::InvalidParam);
		}
		let mut state = self.state.lock();
		let id = state.allocate_id();
		state.sockets.insert(id, Entry::new(kind, Options::default()));
		id
	}

	unsafe fn bind(&self, id: SocketId, name: *const libc::sockaddr, namelen: c_int) -> c_int {
		self.enter();
		let Some(mut requested) = (unsafe { SocketAddrV4::from_sockaddr(name, namelen) }) else {
			return self.fail(ErrorCode::InvalidParam);
		};
		let mut state = self.state.lock();
		let Some(entry) = state.sockets.get(&id) else {
			return self.fail(ErrorCode::InvalidSock);
		};
		if entry.status != INIT {
			return self.fail(ErrorCode::InvalidOp);
		}
		let reuse = entry.opts.reuse_addr;

		if requested.port() == 0 {
			let port = state.ephemeral();
			requested.set_port(port);
		} else {
			let taken = state.sockets.iter().any(|(other, entry)| {
				*other != id
					&& entry.local.is_some_and(|local| same_endpoint(local, requested))
					&& !(reuse && entry.opts.reuse_addr)
			});
			if taken {
				return self.fail(ErrorCode::SockFail);
			}
		}

		if let Some(entry) = state.sockets.get_mut(&id) {
			entry.local = Some(requested);
			entry.status = OPENED;
		}
		0
	}

	fn listen(&self, id: SocketId, backlog: c_int) -> c_int {
		self.enter();
		let mut state = self.state.lock();
		let Some(entry) = state.sockets.get(&id) else {
			return self.fail(ErrorCode::InvalidSock);
		};
		match entry.status {
			OPENED => {}
			LISTENING => return 0,
			INIT => return self.fail(ErrorCode::UnboundSock),
			_ => return self.fail(ErrorCode::ConnSock),
		}
		if entry.opts.rendezvous {
			return self.fail(ErrorCode::RendezvousNoServer);
		}
		let port = entry.local.map(|local| local.port());
		let duplicate = state
			.sockets
			.iter()
			.any(|(other, entry)| *other != id && entry.status == LISTENING && entry.local.map(|l| l.port()) == port);
		if duplicate {
			return self.fail(ErrorCode::DupListen);
		}
		if let Some(entry) = state.sockets.get_mut(&id) {
			entry.status = LISTENING;
			entry.backlog_max = backlog.max(1) as usize;
		}
		0
	}

	unsafe fn accept(&self, id: SocketId, addr: *mut libc::sockaddr, addrlen: *mut c_int) -> SocketId {
		self.enter();
		let state = self.state.lock();
		self.block(
			state,
			|state| {
				let Some(listener) = state.sockets.get_mut(&id) else {
					return Step::Done(self.fail(ErrorCode::InvalidSock));
				};
				if listener.status != LISTENING {
					return Step::Done(self.fail(ErrorCode::NoListen));
				}
				let Some(accepted) = listener.backlog.pop_front() else {
					return match listener.opts.rcv_syn {
						true => Step::Wait(-1),
						false => Step::Done(self.fail(ErrorCode::AsyncRecv)),
					};
				};
				if let Some((_, peer)) = state.sockets.get(&accepted).and_then(|entry| entry.peer) {
					if !addr.is_null() {
						unsafe { addr::write_sockaddr(&peer, addr, addrlen) };
					}
				}
				Step::Done(accepted)
			},
			|| UDT_ERROR,
		)
	}

	unsafe fn connect(&self, id: SocketId, name: *const libc::sockaddr, namelen: c_int) -> c_int {
		self.enter();
		let Some(target) = (unsafe { SocketAddrV4::from_sockaddr(name, namelen) }) else {
			return self.fail(ErrorCode::InvalidParam);
		};
		let mut state = self.state.lock();
		let Some(entry) = state.sockets.get(&id) else {
			return self.fail(ErrorCode::InvalidSock);
		};
		match entry.status {
			INIT | OPENED => {}
			LISTENING => return self.fail(ErrorCode::InvalidOp),
			_ => return self.fail(ErrorCode::ConnSock),
		}
		let (kind, bound) = (entry.kind, entry.local);

		let Some(listener_id) = state.listener_for(target) else {
			return self.fail(ErrorCode::NoServer);
		};
		let listener = &state.sockets[&listener_id];
		if listener.kind != kind || listener.backlog.len() >= listener.backlog_max {
			return self.fail(ErrorCode::ConnRejected);
		}
		let inherited = listener.opts;

		let local = match bound {
			Some(local) => local,
			None => SocketAddrV4::new(Ipv4Addr::LOCALHOST, state.ephemeral()),
		};
		let served_at = match target.ip().is_unspecified() {
			true => SocketAddrV4::new(Ipv4Addr::LOCALHOST, target.port()),
			false => target,
		};

		let server_id = state.allocate_id();
		let mut accepted = Entry::new(kind, inherited);
		accepted.status = CONNECTED;
		accepted.local = Some(served_at);
		accepted.peer = Some((id, local));
		state.sockets.insert(server_id, accepted);

		if let Some(entry) = state.sockets.get_mut(&id) {
			entry.status = CONNECTED;
			entry.local = Some(local);
			entry.peer = Some((server_id, served_at));
		}
		if let Some(listener) = state.sockets.get_mut(&listener_id) {
			listener.backlog.push_back(server_id);
		}
		self.changed.notify_all();
		0
	}

	fn close(&self, id: SocketId) -> c_int {
		self.enter();
		let mut retired = Vec::new();
		{
			let mut state = self.state.lock();
			if !state.sockets.contains_key(&id) {
				return self.fail(ErrorCode::InvalidSock);
			}
			// Closing a listener also drops the connections it never handed out.
			let mut doomed = vec![id];
			while let Some(victim) = doomed.pop() {
				let Some(entry) = state.sockets.remove(&victim) else {
					continue;
				};
				doomed.extend(entry.backlog.iter().copied());
				if let Some((peer, _)) = entry.peer {
					if let Some(peer) = state.sockets.get_mut(&peer) {
						if peer.status == CONNECTED {
							peer.status = BROKEN;
						}
					}
				}
				for group in state.polls.values_mut() {
					group.remove(&victim);
				}
				state.bury(victim);
				retired.extend(entry.control);
			}
			self.changed.notify_all();
		}
		for control in retired {
			unsafe { retire(control) };
		}
		0
	}

	unsafe fn send(&self, id: SocketId, buf: *const u8, len: c_int, _flags: c_int) -> c_int {
		self.enter();
		let Some(data) = (unsafe { bytes(buf, len) }) else {
			return self.fail(ErrorCode::InvalidParam);
		};
		let state = self.state.lock();
		self.block(
			state,
			|state| {
				let Some(entry) = state.sockets.get(&id) else {
					return Step::Done(self.fail(ErrorCode::InvalidSock));
				};
				if entry.kind != libc::SOCK_STREAM {
					return Step::Done(self.fail(ErrorCode::DgramIllegal));
				}
				match entry.status {
					CONNECTED => {}
					BROKEN => return Step::Done(self.fail(ErrorCode::ConnLost)),
					_ => return Step::Done(self.fail(ErrorCode::NoConn)),
				}
				let space = state.send_space(entry);
				if space == 0 {
					return match entry.opts.snd_syn {
						true => Step::Wait(entry.opts.snd_timeo as i64),
						false => Step::Done(self.fail(ErrorCode::AsyncSend)),
					};
				}
				let sent = space.min(data.len());
				state.deliver(id, &data[..sent], false);
				self.changed.notify_all();
				Step::Done(sent as c_int)
			},
			|| 0,
		)
	}

	unsafe fn recv(&self, id: SocketId, buf: *mut u8, len: c_int, _flags: c_int) -> c_int {
		self.enter();
		let Some(out) = (unsafe { bytes_mut(buf, len) }) else {
			return self.fail(ErrorCode::InvalidParam);
		};
		let state = self.state.lock();
		self.block(
			state,
			|state| {
				let Some(entry) = state.sockets.get_mut(&id) else {
					return Step::Done(self.fail(ErrorCode::InvalidSock));
				};
				if entry.kind != libc::SOCK_STREAM {
					return Step::Done(self.fail(ErrorCode::DgramIllegal));
				}
				if !entry.stream.is_empty() {
					let read = out.len().min(entry.stream.len());
					for (slot, byte) in out.iter_mut().zip(entry.stream.drain(..read)) {
						*slot = byte;
					}
					self.changed.notify_all();
					return Step::Done(read as c_int);
				}
				match entry.status {
					CONNECTED => {}
					BROKEN => return Step::Done(self.fail(ErrorCode::ConnLost)),
					_ => return Step::Done(self.fail(ErrorCode::NoConn)),
				}
				match entry.opts.rcv_syn {
					true => Step::Wait(entry.opts.rcv_timeo as i64),
					false => Step::Done(self.fail(ErrorCode::AsyncRecv)),
				}
			},
			|| 0,
		)
	}

	unsafe fn sendmsg(&self, id: SocketId, buf: *const u8, len: c_int, _ttl: c_int, _in_order: bool) -> c_int {
		self.enter();
		let Some(data) = (unsafe { bytes(buf, len) }) else {
			return self.fail(ErrorCode::InvalidParam);
		};
		let state = self.state.lock();
		self.block(
			state,
			|state| {
				let Some(entry) = state.sockets.get(&id) else {
					return Step::Done(self.fail(ErrorCode::InvalidSock));
				};
				if entry.kind != libc::SOCK_DGRAM {
					return Step::Done(self.fail(ErrorCode::StreamIllegal));
				}
				match entry.status {
					CONNECTED => {}
					BROKEN => return Step::Done(self.fail(ErrorCode::ConnLost)),
					_ => return Step::Done(self.fail(ErrorCode::NoConn)),
				}
				if data.len() > entry.opts.snd_buf.max(0) as usize {
					return Step::Done(self.fail(ErrorCode::LargeMsg));
				}
				if state.send_space(entry) < data.len() {
					return match entry.opts.snd_syn {
						true => Step::Wait(entry.opts.snd_timeo as i64),
						false => Step::Done(self.fail(ErrorCode::AsyncSend)),
					};
				}
				state.deliver(id, data, true);
				self.changed.notify_all();
				Step::Done(data.len() as c_int)
			},
			|| 0,
		)
	}

	unsafe fn recvmsg(&self, id: SocketId, buf: *mut u8, len: c_int) -> c_int {
		self.enter();
		let Some(out) = (unsafe { bytes_mut(buf, len) }) else {
			return self.fail(ErrorCode::InvalidParam);
		};
		let state = self.state.lock();
		self.block(
			state,
			|state| {
				let Some(entry) = state.sockets.get_mut(&id) else {
					return Step::Done(self.fail(ErrorCode::InvalidSock));
				};
				if entry.kind != libc::SOCK_DGRAM {
					return Step::Done(self.fail(ErrorCode::StreamIllegal));
				}
				// The tail of a message that does not fit is discarded.
				if let Some(message) = entry.messages.pop_front() {
					let read = out.len().min(message.len());
					out[..read].copy_from_slice(&message[..read]);
					self.changed.notify_all();
					return Step::Done(read as c_int);
				}
				match entry.status {
					CONNECTED => {}
					BROKEN => return Step::Done(self.fail(ErrorCode::ConnLost)),
					_ => return Step::Done(self.fail(ErrorCode::NoConn)),
				}
				match entry.opts.rcv_syn {
					true => Step::Wait(entry.opts.rcv_timeo as i64),
					false => Step::Done(self.fail(ErrorCode::AsyncRecv)),
				}
			},
			|| 0,
		)
	}

	unsafe fn getsockopt(&self, id: SocketId, _level: c_int, optname: c_int, optval: *mut c_void, optlen: *mut c_int) -> c_int {
		self.enter();
		let state = self.state.lock();
		let Some(entry) = state.sockets.get(&id) else {
			return self.fail(ErrorCode::InvalidSock);
		};
		let opts = &entry.opts;
		let written = unsafe {
			match optname {
				UDT_MSS => put(optval, optlen, opts.mss),
				UDT_SNDSYN => put(optval, optlen, opts.snd_syn),
				UDT_RCVSYN => put(optval, optlen, opts.rcv_syn),
				UDT_CC => {
					let builtin = std::ptr::addr_of!(BUILTIN_CONTROL) as usize;
					put(optval, optlen, entry.control.unwrap_or(builtin) as *mut c_void)
				}
				UDT_FC => put(optval, optlen, opts.fc),
				UDT_SNDBUF => put(optval, optlen, opts.snd_buf),
				UDT_RCVBUF => put(optval, optlen, opts.rcv_buf),
				UDT_LINGER => put(optval, optlen, opts.linger),
				UDP_SNDBUF => put(optval, optlen, opts.udp_snd_buf),
				UDP_RCVBUF => put(optval, optlen, opts.udp_rcv_buf),
				UDT_MAXMSG => put(optval, optlen, opts.max_msg),
				UDT_MSGTTL => put(optval, optlen, opts.msg_ttl),
				UDT_RENDEZVOUS => put(optval, optlen, opts.rendezvous),
				UDT_SNDTIMEO => put(optval, optlen, opts.snd_timeo),
				UDT_RCVTIMEO => put(optval, optlen, opts.rcv_timeo),
				UDT_REUSEADDR => put(optval, optlen, opts.reuse_addr),
				UDT_MAXBW => put(optval, optlen, opts.max_bw),
				UDT_STATE => put(optval, optlen, entry.status),
				UDT_EVENT => {
					let mut events = 0;
					if entry.readable() {
						events |= UDT_EPOLL_IN;
					}
					if state.writable(id) {
						events |= UDT_EPOLL_OUT;
					}
					if entry.status == BROKEN {
						events |= UDT_EPOLL_ERR;
					}
					put(optval, optlen, events)
				}
				UDT_SNDDATA => {
					let queued = (opts.snd_buf.max(0) as usize).saturating_sub(state.send_space(entry));
					put(optval, optlen, queued as c_int)
				}
				UDT_RCVDATA => put(optval, optlen, entry.pending() as c_int),
				_ => return self.fail(ErrorCode::InvalidOp),
			}
		};
		match written {
			true => 0,
			false => self.fail(ErrorCode::InvalidParam),
		}
	}

	unsafe fn setsockopt(&self, id: SocketId, _level: c_int, optname: c_int, optval: *const c_void, optlen: c_int) -> c_int {
		self.enter();
		if optname == UDT_CC {
			return unsafe { self.set_control(id, optval, optlen) };
		}
		let mut state = self.state.lock();
		let Some(entry) = state.sockets.get_mut(&id) else {
			return self.fail(ErrorCode::InvalidSock);
		};
		let int = || unsafe { take::<c_int>(optval, optlen) };
		let flag = || unsafe { take::<u8>(optval, optlen) }.map(|byte| byte != 0);
		let opts = &mut entry.opts;
		let applied = match optname {
			UDT_MSS => int().filter(|mss| *mss > HEADER_BYTES).map(|v| opts.mss = v),
			UDT_SNDSYN => flag().map(|v| opts.snd_syn = v),
			UDT_RCVSYN => flag().map(|v| opts.rcv_syn = v),
			UDT_FC => int().map(|v| opts.fc = v),
			UDT_SNDBUF => int().map(|v| opts.snd_buf = v),
			UDT_RCVBUF => int().map(|v| opts.rcv_buf = v),
			UDT_LINGER => unsafe { take::<libc::linger>(optval, optlen) }.map(|v| opts.linger = v),
			UDP_SNDBUF => int().map(|v| opts.udp_snd_buf = v),
			UDP_RCVBUF => int().map(|v| opts.udp_rcv_buf = v),
			UDT_MAXMSG => int().map(|v| opts.max_msg = v),
			UDT_MSGTTL => int().map(|v| opts.msg_ttl = v),
			UDT_RENDEZVOUS => flag().map(|v| opts.rendezvous = v),
			UDT_SNDTIMEO => int().map(|v| opts.snd_timeo = v),
			UDT_RCVTIMEO => int().map(|v| opts.rcv_timeo = v),
			UDT_REUSEADDR => flag().map(|v| opts.reuse_addr = v),
			UDT_MAXBW => unsafe { take::<i64>(optval, optlen) }.map(|v| opts.max_bw = v),
			_ => return self.fail(ErrorCode::InvalidOp),
		};
		match applied {
			Some(()) => {
				self.changed.notify_all();
				0
			}
			None => self.fail(ErrorCode::InvalidParam),
		}
	}

	unsafe fn getsockname(&self, id: SocketId, name: *mut libc::sockaddr, namelen: *mut c_int) -> c_int {
		self.enter();
		let state = self.state.lock();
		let Some(entry) = state.sockets.get(&id) else {
			return self.fail(ErrorCode::InvalidSock);
		};
		let Some(local) = entry.local else {
			return self.fail(ErrorCode::UnboundSock);
		};
		match unsafe { addr::write_sockaddr(&local, name, namelen) } {
			true => 0,
			false => self.fail(ErrorCode::InvalidParam),
		}
	}

	unsafe fn getpeername(&self, id: SocketId, name: *mut libc::sockaddr, namelen: *mut c_int) -> c_int {
		self.enter();
		let state = self.state.lock();
		let Some(entry) = state.sockets.get(&id) else {
			return self.fail(ErrorCode::InvalidSock);
		};
		let Some((_, peer)) = entry.peer else {
			return self.fail(ErrorCode::NoConn);
		};
		match unsafe { addr::write_sockaddr(&peer, name, namelen) } {
			true => 0,
			false => self.fail(ErrorCode::InvalidParam),
		}
	}

	fn getsockstate(&self, id: SocketId) -> c_int {
		self.enter();
		let state = self.state.lock();
		match state.sockets.get(&id) {
			Some(entry) => entry.status,
			None if state.closed.contains(&id) => CLOSED,
			None => NONEXIST,
		}
	}

	fn perfmon(&self, id: SocketId, perf: &mut TraceInfo, clear: bool) -> c_int {
		self.enter();
		let mut state = self.state.lock();
		let Some(space) = state.sockets.get(&id).map(|entry| state.send_space(entry)) else {
			return self.fail(ErrorCode::InvalidSock);
		};
		if let Some(entry) = state.sockets.get_mut(&id) {
			*perf = entry.trace(space);
			if clear {
				entry.stats.clear();
			}
		}
		0
	}

	fn epoll_create(&self) -> c_int {
		self.enter();
		let mut state = self.state.lock();
		let eid = state.next_poll;
		state.next_poll += 1;
		state.polls.insert(eid, HashMap::new());
		eid
	}

	fn epoll_release(&self, eid: c_int) -> c_int {
		self.enter();
		if self.state.lock().polls.remove(&eid).is_none() {
			return self.fail(ErrorCode::InvalidPollId);
		}
		self.changed.notify_all();
		0
	}

	fn epoll_add_usock(&self, eid: c_int, id: SocketId, events: &c_int) -> c_int {
		self.enter();
		let mut state = self.state.lock();
		if !state.polls.contains_key(&eid) {
			return self.fail(ErrorCode::InvalidPollId);
		}
		if !state.sockets.contains_key(&id) {
			return self.fail(ErrorCode::InvalidSock);
		}
		if let Some(group) = state.polls.get_mut(&eid) {
			group.insert(id, *events);
		}
		self.changed.notify_all();
		0
	}

	fn epoll_remove_usock(&self, eid: c_int, id: SocketId) -> c_int {
		self.enter();
		match self.state.lock().polls.get_mut(&eid) {
			Some(group) => {
				group.remove(&id);
				0
			}
			None => self.fail(ErrorCode::InvalidPollId),
		}
	}

	fn epoll_update_usock(&self, eid: c_int, id: SocketId, events: &c_int) -> c_int {
		self.enter();
		let mut state = self.state.lock();
		let Some(group) = state.polls.get_mut(&eid) else {
			return self.fail(ErrorCode::InvalidPollId);
		};
		let Some(current) = group.get_mut(&id) else {
			return self.fail(ErrorCode::InvalidSock);
		};
		*current = *events;
		self.changed.notify_all();
		0
	}

	fn epoll_verify_usock(&self, eid: c_int, id: SocketId, events: &mut c_int) -> c_int {
		self.enter();
		let state = self.state.lock();
		let Some(group) = state.polls.get(&eid) else {
			return self.fail(ErrorCode::InvalidPollId);
		};
		match group.get(&id) {
			Some(current) => {
				*events = *current;
				0
			}
			None => self.fail(ErrorCode::InvalidSock),
		}
	}

	fn epoll_wait(
		&self,
		eid: c_int,
		read: &mut HashSet<SocketId>,
		write: &mut HashSet<SocketId>,
		timeout_ms: i64,
	) -> c_int {
		self.enter();
		let state = self.state.lock();
		self.block(
			state,
			|state| {
				read.clear();
				write.clear();
				let Some(group) = state.polls.get(&eid) else {
					return Step::Done(self.fail(ErrorCode::InvalidPollId));
				};
				for (&id, &events) in group {
					let Some(entry) = state.sockets.get(&id) else {
						continue;
					};
					let error = (events & UDT_EPOLL_ERR) != 0 && entry.status == BROKEN;
					if error || ((events & UDT_EPOLL_IN) != 0 && entry.readable()) {
						read.insert(id);
					}
					if error || ((events & UDT_EPOLL_OUT) != 0 && state.writable(id)) {
						write.insert(id);
					}
				}
				match read.len() + write.len() {
					0 => Step::Wait(timeout_ms),
					ready => Step::Done(ready as c_int),
				}
			},
			|| self.fail(ErrorCode::Timeout),
		)
	}

	fn getlasterror(&self) -> ErrorInfo {
		self.enter();
		self.errors
			.lock()
			.get(&thread::current().id())
			.cloned()
			.unwrap_or_else(|| ErrorInfo::new(0, ErrorCode::Success.description()))
	}

	fn clearlasterror(&self) {
		self.enter();
		self.errors.lock().remove(&thread::current().id());
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::addr::ToSockAddr;

	fn loopback() -> SocketAddrV4 {
		SocketAddrV4::new(Ipv4Addr::LOCALHOST, 0)
	}

	fn bound_listener(udt: &Loopback, kind: c_int) -> (SocketId, SocketAddrV4) {
		let id = udt.socket(libc::AF_INET, kind, 0);
		assert!(id >= FIRST_SOCKET);
		let rv = loopback().with_raw(|name, len| unsafe { udt.bind(id, name, len) });
		assert_eq!(rv, 0);
		assert_eq!(udt.listen(id, 8), 0);
		let (mut storage, mut len) = addr::storage();
		let rv = unsafe { udt.getsockname(id, &mut storage as *mut _ as *mut libc::sockaddr, &mut len) };
		assert_eq!(rv, 0);
		let local = unsafe { SocketAddrV4::from_sockaddr(&storage as *const _ as *const libc::sockaddr, len) };
		(id, local.unwrap())
	}

	fn pair(udt: &Loopback, kind: c_int) -> (SocketId, SocketId) {
		let (listener, at) = bound_listener(udt, kind);
		let client = udt.socket(libc::AF_INET, kind, 0);
		let rv = at.with_raw(|name, len| unsafe { udt.connect(client, name, len) });
		assert_eq!(rv, 0);
		let server = unsafe { udt.accept(listener, std::ptr::null_mut(), std::ptr::null_mut()) };
		assert!(server >= FIRST_SOCKET);
		(client, server)
	}

	fn set_int(udt: &Loopback, id: SocketId, opt: c_int, value: c_int) {
		let rv = unsafe { udt.setsockopt(id, 0, opt, &value as *const c_int as *const c_void, 4) };
		assert_eq!(rv, 0);
	}

	fn set_flag(udt: &Loopback, id: SocketId, opt: c_int, value: bool) {
		let rv = unsafe { udt.setsockopt(id, 0, opt, &value as *const bool as *const c_void, 1) };
		assert_eq!(rv, 0);
	}

	#[test]
	fn stream_bytes_flow_between_peers() {
		let udt = Loopback::new();
		let (client, server) = pair(&udt, libc::SOCK_STREAM);

		let payload = *b"loopback";
		assert_eq!(unsafe { udt.send(client, payload.as_ptr(), 8, 0) }, 8);

		let mut out = [0u8; 4];
		assert_eq!(unsafe { udt.recv(server, out.as_mut_ptr(), 4, 0) }, 4);
		assert_eq!(&out, b"loop");
		assert_eq!(unsafe { udt.recv(server, out.as_mut_ptr(), 4, 0) }, 4);
		assert_eq!(&out, b"back");
	}

	#[test]
	fn messages_keep_boundaries_and_truncate() {
		let udt = Loopback::new();
		let (client, server) = pair(&udt, libc::SOCK_DGRAM);

		assert_eq!(unsafe { udt.sendmsg(client, b"abcdef".as_ptr(), 6, -1, true) }, 6);
		assert_eq!(unsafe { udt.sendmsg(client, b"xy".as_ptr(), 2, -1, true) }, 2);

		let mut out = [0u8; 3];
		assert_eq!(unsafe { udt.recvmsg(server, out.as_mut_ptr(), 3) }, 3);
		assert_eq!(&out, b"abc");
		assert_eq!(unsafe { udt.recvmsg(server, out.as_mut_ptr(), 3) }, 2);
		assert_eq!(&out[..2], b"xy");
	}

	#[test]
	fn nonblocking_recv_reports_async_code() {
		let udt = Loopback::new();
		let (_client, server) = pair(&udt, libc::SOCK_STREAM);
		set_flag(&udt, server, UDT_RCVSYN, false);

		let mut out = [0u8; 16];
		assert_eq!(unsafe { udt.recv(server, out.as_mut_ptr(), 16, 0) }, UDT_ERROR);
		assert_eq!(udt.getlasterror().code, ErrorCode::AsyncRecv.code());
	}

	#[test]
	fn blocking_recv_times_out_with_zero() {
		let udt = Loopback::new();
		let (_client, server) = pair(&udt, libc::SOCK_STREAM);
		set_int(&udt, server, UDT_RCVTIMEO, 20);

		let mut out = [0u8; 16];
		assert_eq!(unsafe { udt.recv(server, out.as_mut_ptr(), 16, 0) }, 0);
	}

	#[test]
	fn blocking_recv_wakes_on_send() {
		let udt = std::sync::Arc::new(Loopback::new());
		let (client, server) = pair(&udt, libc::SOCK_STREAM);

		let reader = {
			let udt = udt.clone();
			thread::spawn(move || {
				let mut out = [0u8; 3];
				let read = unsafe { udt.recv(server, out.as_mut_ptr(), 3, 0) };
				(read, out)
			})
		};
		thread::sleep(Duration::from_millis(20));
		assert_eq!(unsafe { udt.send(client, b"abc".as_ptr(), 3, 0) }, 3);

		let (read, out) = reader.join().unwrap();
		assert_eq!(read, 3);
		assert_eq!(&out, b"abc");
	}

	#[test]
	fn close_breaks_the_peer() {
		let udt = Loopback::new();
		let (client, server) = pair(&udt, libc::SOCK_STREAM);
		assert_eq!(unsafe { udt.send(client, b"z".as_ptr(), 1, 0) }, 1);
		assert_eq!(udt.close(client), 0);

		assert_eq!(udt.getsockstate(client), CLOSED);
		assert_eq!(udt.getsockstate(server), BROKEN);

		// Queued bytes drain before the loss is reported.
		let mut out = [0u8; 4];
		assert_eq!(unsafe { udt.recv(server, out.as_mut_ptr(), 4, 0) }, 1);
		assert_eq!(unsafe { udt.recv(server, out.as_mut_ptr(), 4, 0) }, UDT_ERROR);
		assert_eq!(udt.getlasterror().code, ErrorCode::ConnLost.code());
	}

	#[test]
	fn double_close_reports_invalid_socket() {
		let udt = Loopback::new();
		let id = udt.socket(libc::AF_INET, libc::SOCK_STREAM, 0);
		assert_eq!(udt.close(id), 0);
		assert_eq!(udt.close(id), UDT_ERROR);
		assert_eq!(udt.getlasterror().code, ErrorCode::InvalidSock.code());
	}

	#[test]
	fn connect_without_listener_is_refused() {
		let udt = Loopback::new();
		let id = udt.socket(libc::AF_INET, libc::SOCK_STREAM, 0);
		let target = SocketAddrV4::new(Ipv4Addr::LOCALHOST, 9);
		let rv = target.with_raw(|name, len| unsafe { udt.connect(id, name, len) });
		assert_eq!(rv, UDT_ERROR);
		assert_eq!(udt.getlasterror().code, ErrorCode::NoServer.code());
	}

	#[test]
	fn options_require_exact_size() {
		let udt = Loopback::new();
		let id = udt.socket(libc::AF_INET, libc::SOCK_STREAM, 0);
		let wide: i64 = 1400;
		let rv = unsafe { udt.setsockopt(id, 0, UDT_MSS, &wide as *const i64 as *const c_void, 8) };
		assert_eq!(rv, UDT_ERROR);
		assert_eq!(udt.getlasterror().code, ErrorCode::InvalidParam.code());

		set_int(&udt, id, UDT_MSS, 1400);
		let mut value: c_int = 0;
		let mut len: c_int = 4;
		let rv = unsafe { udt.getsockopt(id, 0, UDT_MSS, &mut value as *mut c_int as *mut c_void, &mut len) };
		assert_eq!(rv, 0);
		assert_eq!(value, 1400);
	}

	#[test]
	fn read_only_options_reject_writes() {
		let udt = Loopback::new();
		let id = udt.socket(libc::AF_INET, libc::SOCK_STREAM, 0);
		let value: c_int = 1;
		let rv = unsafe { udt.setsockopt(id, 0, UDT_STATE, &value as *const c_int as *const c_void, 4) };
		assert_eq!(rv, UDT_ERROR);
		assert_eq!(udt.getlasterror().code, ErrorCode::InvalidOp.code());
	}

	#[test]
	fn epoll_reports_readable_socket() {
		let udt = Loopback::new();
		let (client, server) = pair(&udt, libc::SOCK_STREAM);
		let eid = udt.epoll_create();
		assert_eq!(udt.epoll_add_usock(eid, server, &UDT_EPOLL_IN), 0);

		let (mut read, mut write) = (HashSet::new(), HashSet::new());
		assert_eq!(udt.epoll_wait(eid, &mut read, &mut write, 0), UDT_ERROR);
		assert_eq!(udt.getlasterror().code, ErrorCode::Timeout.code());

		assert_eq!(unsafe { udt.send(client, b"ping".as_ptr(), 4, 0) }, 4);
		assert_eq!(udt.epoll_wait(eid, &mut read, &mut write, 100), 1);
		assert!(read.contains(&server));
		assert!(write.is_empty());
		assert_eq!(udt.epoll_release(eid), 0);
	}

	#[test]
	fn epoll_verify_after_remove_fails() {
		let udt = Loopback::new();
		let id = udt.socket(libc::AF_INET, libc::SOCK_STREAM, 0);
		let eid = udt.epoll_create();
		assert_eq!(udt.epoll_add_usock(eid, id, &UDT_EPOLL_OUT), 0);
		let mut events = 0;
		assert_eq!(udt.epoll_verify_usock(eid, id, &mut events), 0);
		assert_eq!(events, UDT_EPOLL_OUT);

		assert_eq!(udt.epoll_remove_usock(eid, id), 0);
		assert_eq!(udt.epoll_verify_usock(eid, id, &mut events), UDT_ERROR);
		assert_eq!(udt.epoll_release(eid), 0);
		assert_eq!(udt.epoll_release(eid), UDT_ERROR);
		assert_eq!(udt.getlasterror().code, ErrorCode::InvalidPollId.code());
	}

	#[test]
	fn perfmon_counts_packets() {
		let udt = Loopback::new();
		let (client, server) = pair(&udt, libc::SOCK_STREAM);
		let data = [7u8; 3000];
		assert_eq!(unsafe { udt.send(client, data.as_ptr(), 3000, 0) }, 3000);

		let mut perf = TraceInfo::default();
		assert_eq!(udt.perfmon(client, &mut perf, true), 0);
		assert_eq!(perf.pkt_sent_total, 3);
		assert_eq!(perf.pkt_sent, 3);

		assert_eq!(udt.perfmon(client, &mut perf, false), 0);
		assert_eq!(perf.pkt_sent_total, 3);
		assert_eq!(perf.pkt_sent, 0);

		assert_eq!(udt.perfmon(server, &mut perf, false), 0);
		assert_eq!(perf.pkt_recv_total, 3);
	}

	#[test]
	fn closed_history_forgets_oldest_ids() {
		let udt = Loopback::new();
		let first = udt.socket(libc::AF_INET, libc::SOCK_STREAM, 0);
		assert_eq!(udt.close(first), 0);
		assert_eq!(udt.getsockstate(first), CLOSED);

		for _ in 0..CLOSED_HISTORY {
			let id = udt.socket(libc::AF_INET, libc::SOCK_STREAM, 0);
			assert_eq!(udt.close(id), 0);
		}
		let state = udt.state.lock();
		assert_eq!(state.closed.len(), CLOSED_HISTORY);
		assert_eq!(state.closed_order.len(), CLOSED_HISTORY);
		drop(state);
		assert_eq!(udt.getsockstate(first), NONEXIST);
		assert_eq!(udt.getsockstate(first + CLOSED_HISTORY as SocketId), CLOSED);
	}

	#[test]
	fn clearing_the_last_error_drops_the_thread_entry() {
		let udt = Loopback::new();
		assert_eq!(udt.close(4242), UDT_ERROR);
		assert_eq!(udt.errors.lock().len(), 1);
		assert_eq!(udt.getlasterror().code, ErrorCode::InvalidSock.code());

		udt.clearlasterror();
		assert!(udt.errors.lock().is_empty());
		assert_eq!(udt.getlasterror().code, ErrorCode::Success.code());
	}

	#[test]
	fn every_primitive_is_counted() {
		let udt = Loopback::new();
		assert_eq!(udt.native_calls(), 0);
		udt.startup();
		let id = udt.socket(libc::AF_INET, libc::SOCK_STREAM, 0);
		udt.getsockstate(id);
		assert_eq!(udt.native_calls(), 3);
	}
}
