//! Process-wide initialization of the native library.

use std::sync::Arc;

use crate::error::{Result, UdtError};
use crate::native::{ErrorInfo, Transport, UDT_ERROR};
use crate::registry::Registry;

const STARTUP: &str = "init:startup";
const CLEANUP: &str = "shutdown:cleanup";

/// An initialized native library.
///
/// Every socket and poll group holds an `Arc<Library>`, so the transport
/// outlives all handles created from it.
pub struct Library {
	transport: Arc<dyn Transport>,
	registry: &'static Registry,
}

impl Library {
	/// Populates the type registry and runs the native `startup()`.
	pub fn init(transport: Arc<dyn Transport>) -> Result<Arc<Library>> {
		let registry = Registry::install();
		if transport.startup() == UDT_ERROR {
			return Err(UdtError::last(transport.as_ref(), 0, STARTUP));
		}
		tracing::debug!(options = registry.options().len(), "native library started");
		Ok(Arc::new(Library { transport, registry }))
	}

	/// Initializes against the linked UDT library.
	#[cfg(feature = "native")]
	pub fn native() -> Result<Arc<Library>> {
		Self::init(Arc::new(crate::native::ffi::NativeUdt::new()))
	}

	#[inline]
	pub fn transport(&self) -> &dyn Transport {
		self.transport.as_ref()
	}

	#[inline]
	pub fn registry(&self) -> &'static Registry {
		self.registry
	}

	/// Runs the native `cleanup()`. Sockets still open stay owned by their
	/// handles and are closed when dropped.
	pub fn shutdown(&self) -> Result<()> {
		if self.transport.cleanup() == UDT_ERROR {
			return Err(UdtError::last(self.transport(), 0, CLEANUP));
		}
		tracing::debug!("native library cleaned up");
		Ok(())
	}

	/// The calling thread's last native error.
	pub fn last_error(&self) -> ErrorInfo {
		self.transport.getlasterror()
	}

	pub fn clear_error(&self) {
		self.transport.clearlasterror();
	}
}

impl std::fmt::Debug for Library {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Library")
			.field("options", &self.registry.options().len())
			.finish_non_exhaustive()
	}
}
