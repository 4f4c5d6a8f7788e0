//! Congestion-control plug-ins written in Rust, exposed to the native library.
//!
//! The native side sees two C-ABI objects:
//! - [`NativeFactory`] — handed over as the `UDT_CC` option value; native
//!   code calls `create` whenever it needs a control instance
//! - [`NativeControl`] — one per socket connection; native code drives it
//!   through its vtable and reads the window it publishes
//!
//! The layer-owned [`FactoryAdapter`] backs the factory handle. It is
//! reference counted and kept in the socket's congestion slot for as long
//! as the native option slot may call into it.

use std::collections::HashSet;
use std::sync::{Arc, Weak};

use libc::{c_int, c_void};
use parking_lot::Mutex;

/// Sending parameters a control publishes back to the native library.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CongestionWindow {
	/// Packet sending period, in microseconds.
	pub packet_period_us: f64,
	/// Congestion window size, in packets.
	pub window_size: f64,
}

impl Default for CongestionWindow {
	fn default() -> Self {
		Self { packet_period_us: 1.0, window_size: 16.0 }
	}
}

/// A congestion-control algorithm instance.
pub trait CongestionControl: Send {
	fn init(&mut self, _window: &mut CongestionWindow) {}
	fn close(&mut self) {}
	fn on_ack(&mut self, _window: &mut CongestionWindow, _ack: i32) {}
	fn on_loss(&mut self, _window: &mut CongestionWindow, _losses: &[i32]) {}
	fn on_timeout(&mut self, _window: &mut CongestionWindow) {}
}

/// Produces congestion-control instances for the native library.
pub trait CongestionFactory: Send + Sync {
	fn create(&self) -> Box<dyn CongestionControl>;

	fn name(&self) -> &str {
		"custom"
	}
}

impl std::fmt::Debug for dyn CongestionFactory {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("CongestionFactory").field("name", &self.name()).finish()
	}
}

/// Factory handle as the native library sees it.
#[repr(C)]
pub struct NativeFactory {
	pub ctx: *const c_void,
	pub create: unsafe extern "C" fn(ctx: *const c_void) -> *mut NativeControl,
}

/// Callbacks of a [`NativeControl`].
#[repr(C)]
pub struct ControlVtable {
	pub init: unsafe extern "C" fn(control: *mut NativeControl),
	pub close: unsafe extern "C" fn(control: *mut NativeControl),
	pub on_ack: unsafe extern "C" fn(control: *mut NativeControl, ack: c_int),
	pub on_loss: unsafe extern "C" fn(control: *mut NativeControl, losses: *const c_int, count: c_int),
	pub on_timeout: unsafe extern "C" fn(control: *mut NativeControl),
	/// Frees the control. The pointer is invalid afterwards.
	pub destroy: unsafe extern "C" fn(control: *mut NativeControl),
}

/// Control instance as the native library sees it.
#[repr(C)]
pub struct NativeControl {
	pub vtable: *const ControlVtable,
	pub window: CongestionWindow,
	ctx: *mut c_void,
}

static CONTROL_VTABLE: ControlVtable = ControlVtable {
	init: control_init,
	close: control_close,
	on_ack: control_on_ack,
	on_loss: control_on_loss,
	on_timeout: control_on_timeout,
	destroy: control_destroy,
};

struct ControlState {
	control: Box<dyn CongestionControl>,
	owner: Weak<AdapterInner>,
}

struct AdapterInner {
	factory: Arc<dyn CongestionFactory>,
	live: Mutex<HashSet<usize>>,
}

/// Layer-owned bridge between a native factory handle and a Rust factory.
pub(crate) struct FactoryAdapter {
	native: NativeFactory,
	inner: Arc<AdapterInner>,
}

// The raw pointers only reference `inner`, which the adapter owns.
unsafe impl Send for FactoryAdapter {}
unsafe impl Sync for FactoryAdapter {}

impl FactoryAdapter {
	pub(crate) fn new(factory: Arc<dyn CongestionFactory>) -> Arc<Self> {
		let inner = Arc::new(AdapterInner {
			factory,
			live: Mutex::new(HashSet::new()),
		});
		Arc::new(Self {
			native: NativeFactory {
				ctx: Arc::as_ptr(&inner) as *const c_void,
				create: factory_create,
			},
			inner,
		})
	}

	/// Address passed to native code as the option value.
	pub(crate) fn handle(&self) -> *const c_void {
		&self.native as *const NativeFactory as *const c_void
	}

	pub(crate) fn factory(&self) -> &Arc<dyn CongestionFactory> {
		&self.inner.factory
	}

	/// Whether `control` is a live instance this adapter created.
	pub(crate) fn owns(&self, control: *const c_void) -> bool {
		self.inner.live.lock().contains(&(control as usize))
	}

	pub(crate) fn live_controls(&self) -> usize {
		self.inner.live.lock().len()
	}
}

unsafe extern "C" fn factory_create(ctx: *const c_void) -> *mut NativeControl {
	// ctx is the AdapterInner of a FactoryAdapter kept alive by its socket.
	let inner = unsafe { &*(ctx as *const AdapterInner) };
	let owner = {
		// Rebuild a Weak without touching the strong count held by the adapter.
		let strong = unsafe {
			Arc::increment_strong_count(ctx as *const AdapterInner);
			Arc::from_raw(ctx as *const AdapterInner)
		};
		Arc::downgrade(&strong)
	};
	let state = Box::new(ControlState {
		control: inner.factory.create(),
		owner,
	});
	let control = Box::into_raw(Box::new(NativeControl {
		vtable: &CONTROL_VTABLE,
		window: CongestionWindow::default(),
		ctx: Box::into_raw(state) as *mut c_void,
	}));
	inner.live.lock().insert(control as usize);
	tracing::trace!(factory = inner.factory.name(), control = ?control, "congestion control created");
	control
}

unsafe fn with_state(control: *mut NativeControl, f: impl FnOnce(&mut dyn CongestionControl, &mut CongestionWindow)) {
	let control = unsafe { &mut *control };
	let state = unsafe { &mut *(control.ctx as *mut ControlState) };
	f(state.control.as_mut(), &mut control.window);
}

unsafe extern "C" fn control_init(control: *mut NativeControl) {
	unsafe { with_state(control, |ccc, window| ccc.init(window)) }
}

unsafe extern "C" fn control_close(control: *mut NativeControl) {
	unsafe { with_state(control, |ccc, _| ccc.close()) }
}

unsafe extern "C" fn control_on_ack(control: *mut NativeControl, ack: c_int) {
	unsafe { with_state(control, |ccc, window| ccc.on_ack(window, ack)) }
}

unsafe extern "C" fn control_on_loss(control: *mut NativeControl, losses: *const c_int, count: c_int) {
	let losses: &[i32] = if losses.is_null() || count <= 0 {
		&[]
	} else {
		unsafe { std::slice::from_raw_parts(losses, count as usize) }
	};
	unsafe { with_state(control, |ccc, window| ccc.on_loss(window, losses)) }
}

unsafe extern "C" fn control_on_timeout(control: *mut NativeControl) {
	unsafe { with_state(control, |ccc, window| ccc.on_timeout(window)) }
}

unsafe extern "C" fn control_destroy(control: *mut NativeControl) {
	let boxed = unsafe { Box::from_raw(control) };
	let state = unsafe { Box::from_raw(boxed.ctx as *mut ControlState) };
	if let Some(owner) = state.owner.upgrade() {
		owner.live.lock().remove(&(control as usize));
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::sync::atomic::{AtomicUsize, Ordering};

	struct Counting {
		acks: Arc<AtomicUsize>,
	}

	impl CongestionControl for Counting {
		fn init(&mut self, window: &mut CongestionWindow) {
			window.window_size = 32.0;
		}

		fn on_ack(&mut self, window: &mut CongestionWindow, _ack: i32) {
			self.acks.fetch_add(1, Ordering::SeqCst);
			window.window_size += 1.0;
		}
	}

	struct CountingFactory {
		acks: Arc<AtomicUsize>,
	}

	impl CongestionFactory for CountingFactory {
		fn create(&self) -> Box<dyn CongestionControl> {
			Box::new(Counting { acks: self.acks.clone() })
		}
	}

	#[test]
	fn native_side_drives_rust_control() {
		let acks = Arc::new(AtomicUsize::new(0));
		let adapter = FactoryAdapter::new(Arc::new(CountingFactory { acks: acks.clone() }));

		let factory = unsafe { &*(adapter.handle() as *const NativeFactory) };
		let control = unsafe { (factory.create)(factory.ctx) };
		assert!(adapter.owns(control as *const c_void));

		unsafe {
			let vtable = &*(*control).vtable;
			(vtable.init)(control);
			(vtable.on_ack)(control, 10);
			(vtable.on_ack)(control, 11);
			assert_eq!((*control).window.window_size, 34.0);
			(vtable.destroy)(control);
		}

		assert_eq!(acks.load(Ordering::SeqCst), 2);
		assert_eq!(adapter.live_controls(), 0);
	}

	#[test]
	fn foreign_pointer_is_not_owned() {
		let adapter = FactoryAdapter::new(Arc::new(CountingFactory { acks: Arc::new(AtomicUsize::new(0)) }));
		let foreign = 0x1000usize as *const c_void;
		assert!(!adapter.owns(foreign));
	}

	#[test]
	fn control_outlives_dropped_adapter() {
		let adapter = FactoryAdapter::new(Arc::new(CountingFactory { acks: Arc::new(AtomicUsize::new(0)) }));
		let factory = unsafe { &*(adapter.handle() as *const NativeFactory) };
		let control = unsafe { (factory.create)(factory.ctx) };
		drop(adapter);
		unsafe { ((*(*control).vtable).destroy)(control) };
	}
}
