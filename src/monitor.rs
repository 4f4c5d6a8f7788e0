//! Per-socket performance counters.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::native::TraceInfo;
use crate::socket::SocketUdt;

const PERFMON: &str = "monitor:perfmon";

/// Snapshot of a socket's native performance counters.
///
/// Global counters accumulate since the socket was created, local ones
/// since the last reset, and instant ones describe the moment of the sync.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MonitorUdt {
	// global
	/// Milliseconds since the socket was created.
	pub ms_time_stamp: i64,
	pub pkt_sent_total: i64,
	pub pkt_recv_total: i64,
	pub pkt_snd_loss_total: i32,
	pub pkt_rcv_loss_total: i32,
	pub pkt_retrans_total: i32,
	pub pkt_sent_ack_total: i32,
	pub pkt_recv_ack_total: i32,
	pub pkt_sent_nak_total: i32,
	pub pkt_recv_nak_total: i32,
	pub us_snd_duration_total: i64,

	// local
	pub pkt_sent: i64,
	pub pkt_recv: i64,
	pub pkt_snd_loss: i32,
	pub pkt_rcv_loss: i32,
	pub pkt_retrans: i32,
	pub pkt_sent_ack: i32,
	pub pkt_recv_ack: i32,
	pub pkt_sent_nak: i32,
	pub pkt_recv_nak: i32,
	pub mbps_send_rate: f64,
	pub mbps_recv_rate: f64,
	pub us_snd_duration: i64,

	// instant
	pub us_pkt_snd_period: f64,
	pub pkt_flow_window: i32,
	pub pkt_congestion_window: i32,
	pub pkt_flight_size: i32,
	pub ms_rtt: f64,
	pub mbps_bandwidth: f64,
	pub byte_avail_snd_buf: i32,
	pub byte_avail_rcv_buf: i32,
}

impl MonitorUdt {
	pub fn new() -> Self {
		Self::default()
	}

	/// Overwrites every field from a native snapshot.
	pub(crate) fn copy_from(&mut self, info: &TraceInfo) {
		self.ms_time_stamp = info.ms_time_stamp;
		self.pkt_sent_total = info.pkt_sent_total;
		self.pkt_recv_total = info.pkt_recv_total;
		self.pkt_snd_loss_total = info.pkt_snd_loss_total;
		self.pkt_rcv_loss_total = info.pkt_rcv_loss_total;
		self.pkt_retrans_total = info.pkt_retrans_total;
		self.pkt_sent_ack_total = info.pkt_sent_ack_total;
		self.pkt_recv_ack_total = info.pkt_recv_ack_total;
		self.pkt_sent_nak_total = info.pkt_sent_nak_total;
		self.pkt_recv_nak_total = info.pkt_recv_nak_total;
		self.us_snd_duration_total = info.us_snd_duration_total;

		self.pkt_sent = info.pkt_sent;
		self.pkt_recv = info.pkt_recv;
		self.pkt_snd_loss = info.pkt_snd_loss;
		self.pkt_rcv_loss = info.pkt_rcv_loss;
		self.pkt_retrans = info.pkt_retrans;
		self.pkt_sent_ack = info.pkt_sent_ack;
		self.pkt_recv_ack = info.pkt_recv_ack;
		self.pkt_sent_nak = info.pkt_sent_nak;
		self.pkt_recv_nak = info.pkt_recv_nak;
		self.mbps_send_rate = info.mbps_send_rate;
		self.mbps_recv_rate = info.mbps_recv_rate;
		self.us_snd_duration = info.us_snd_duration;

		self.us_pkt_snd_period = info.us_pkt_snd_period;
		self.pkt_flow_window = info.pkt_flow_window;
		self.pkt_congestion_window = info.pkt_congestion_window;
		self.pkt_flight_size = info.pkt_flight_size;
		self.ms_rtt = info.ms_rtt;
		self.mbps_bandwidth = info.mbps_bandwidth;
		self.byte_avail_snd_buf = info.byte_avail_snd_buf;
		self.byte_avail_rcv_buf = info.byte_avail_rcv_buf;
	}

	/// Equal in every field except the timestamp.
	pub fn same_counters(&self, other: &MonitorUdt) -> bool {
		MonitorUdt { ms_time_stamp: 0, ..*self } == MonitorUdt { ms_time_stamp: 0, ..*other }
	}
}

impl fmt::Display for MonitorUdt {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		macro_rules! row {
			($($field:ident),+ $(,)?) => {
				$(writeln!(f, "{:<24}{}", stringify!($field), self.$field)?;)+
			};
		}
		writeln!(f, "# global")?;
		row!(
			ms_time_stamp,
			pkt_sent_total,
			pkt_recv_total,
			pkt_snd_loss_total,
			pkt_rcv_loss_total,
			pkt_retrans_total,
			pkt_sent_ack_total,
			pkt_recv_ack_total,
			pkt_sent_nak_total,
			pkt_recv_nak_total,
			us_snd_duration_total,
		);
		writeln!(f, "# local")?;
		row!(
			pkt_sent,
			pkt_recv,
			pkt_snd_loss,
			pkt_rcv_loss,
			pkt_retrans,
			pkt_sent_ack,
			pkt_recv_ack,
			pkt_sent_nak,
			pkt_recv_nak,
			mbps_send_rate,
			mbps_recv_rate,
			us_snd_duration,
		);
		writeln!(f, "# instant")?;
		row!(
			us_pkt_snd_period,
			pkt_flow_window,
			pkt_congestion_window,
			pkt_flight_size,
			ms_rtt,
			mbps_bandwidth,
			byte_avail_snd_buf,
			byte_avail_rcv_buf,
		);
		Ok(())
	}
}

impl SocketUdt {
	/// Refreshes `monitor` from the native counters. With `reset`, local
	/// counters restart from zero after the read.
	pub fn update_monitor(&self, monitor: &mut MonitorUdt, reset: bool) -> Result<()> {
		let mut info = TraceInfo::default();
		let rv = self.transport().perfmon(self.id(), &mut info, reset);
		self.check(rv, PERFMON)?;
		monitor.copy_from(&info);
		tracing::trace!(socket = self.id(), reset, "monitor updated");
		Ok(())
	}

	pub fn monitor(&self, reset: bool) -> Result<MonitorUdt> {
		let mut monitor = MonitorUdt::default();
		self.update_monitor(&mut monitor, reset)?;
		Ok(monitor)
	}
}
