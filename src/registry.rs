//! Process-wide table of the type descriptors the boundary resolves once.
//!
//! Populated by the first `Library::init` and never mutated afterwards,
//! so readers on any thread go through `OnceLock::get` without locking.

use std::any::{Any, TypeId};
use std::sync::{Arc, OnceLock};

use libc::c_int;

use crate::ccc::CongestionFactory;
use crate::error::{Result, UdtError};
use crate::native::sockopt::*;
use crate::socket::options::Linger;

static REGISTRY: OnceLock<Registry> = OnceLock::new();

/// Runtime type descriptor supplied by the caller of the option marshaler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TypeTag {
	id: TypeId,
	name: &'static str,
}

impl TypeTag {
	pub fn of<T: Any>() -> Self {
		Self {
			id: TypeId::of::<T>(),
			name: std::any::type_name::<T>(),
		}
	}

	#[inline]
	pub fn type_id(&self) -> TypeId {
		self.id
	}

	#[inline]
	pub fn name(&self) -> &'static str {
		self.name
	}
}

/// The five value kinds an option slot can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OptionKind {
	Bool,
	Int,
	Long,
	Linger,
	Factory,
}

impl OptionKind {
	pub fn name(self) -> &'static str {
		match self {
			OptionKind::Bool => "boolean",
			OptionKind::Int => "32-bit integer",
			OptionKind::Long => "64-bit integer",
			OptionKind::Linger => "linger",
			OptionKind::Factory => "congestion control factory",
		}
	}
}

/// A known native option.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OptionDescriptor {
	pub code: c_int,
	pub name: &'static str,
	pub kind: OptionKind,
}

const CATALOG: &[OptionDescriptor] = &[
	OptionDescriptor { code: UDT_MSS, name: "UDT_MSS", kind: OptionKind::Int },
	OptionDescriptor { code: UDT_SNDSYN, name: "UDT_SNDSYN", kind: OptionKind::Bool },
	OptionDescriptor { code: UDT_RCVSYN, name: "UDT_RCVSYN", kind: OptionKind::Bool },
	OptionDescriptor { code: UDT_CC, name: "UDT_CC", kind: OptionKind::Factory },
	OptionDescriptor { code: UDT_FC, name: "UDT_FC", kind: OptionKind::Int },
	OptionDescriptor { code: UDT_SNDBUF, name: "UDT_SNDBUF", kind: OptionKind::Int },
	OptionDescriptor { code: UDT_RCVBUF, name: "UDT_RCVBUF", kind: OptionKind::Int },
	OptionDescriptor { code: UDT_LINGER, name: "UDT_LINGER", kind: OptionKind::Linger },
	OptionDescriptor { code: UDP_SNDBUF, name: "UDP_SNDBUF", kind: OptionKind::Int },
	OptionDescriptor { code: UDP_RCVBUF, name: "UDP_RCVBUF", kind: OptionKind::Int },
	OptionDescriptor { code: UDT_MAXMSG, name: "UDT_MAXMSG", kind: OptionKind::Int },
	OptionDescriptor { code: UDT_MSGTTL, name: "UDT_MSGTTL", kind: OptionKind::Int },
	OptionDescriptor { code: UDT_RENDEZVOUS, name: "UDT_RENDEZVOUS", kind: OptionKind::Bool },
	OptionDescriptor { code: UDT_SNDTIMEO, name: "UDT_SNDTIMEO", kind: OptionKind::Int },
	OptionDescriptor { code: UDT_RCVTIMEO, name: "UDT_RCVTIMEO", kind: OptionKind::Int },
	OptionDescriptor { code: UDT_REUSEADDR, name: "UDT_REUSEADDR", kind: OptionKind::Bool },
	OptionDescriptor { code: UDT_MAXBW, name: "UDT_MAXBW", kind: OptionKind::Long },
	OptionDescriptor { code: UDT_STATE, name: "UDT_STATE", kind: OptionKind::Int },
	OptionDescriptor { code: UDT_EVENT, name: "UDT_EVENT", kind: OptionKind::Int },
	OptionDescriptor { code: UDT_SNDDATA, name: "UDT_SNDDATA", kind: OptionKind::Int },
	OptionDescriptor { code: UDT_RCVDATA, name: "UDT_RCVDATA", kind: OptionKind::Int },
];

/// Resolved descriptors.
#[derive(Debug)]
pub struct Registry {
	kinds: [(TypeTag, OptionKind); 5],
	options: &'static [OptionDescriptor],
}

impl Registry {
	fn resolve() -> Self {
		Self {
			kinds: [
				(TypeTag::of::<bool>(), OptionKind::Bool),
				(TypeTag::of::<i32>(), OptionKind::Int),
				(TypeTag::of::<i64>(), OptionKind::Long),
				(TypeTag::of::<Linger>(), OptionKind::Linger),
				(TypeTag::of::<Arc<dyn CongestionFactory>>(), OptionKind::Factory),
			],
			options: CATALOG,
		}
	}

	/// Populates the registry on first use; later calls return the same table.
	pub(crate) fn install() -> &'static Registry {
		REGISTRY.get_or_init(Registry::resolve)
	}

	/// Returns the registry, or `NotInitialized` before the first `Library::init`.
	pub fn get() -> Result<&'static Registry> {
		REGISTRY.get().ok_or(UdtError::NotInitialized)
	}

	/// Resolves a caller-supplied tag to its value kind.
	pub fn kind_of(&self, tag: TypeTag) -> Option<OptionKind> {
		self.kinds
			.iter()
			.find(|(known, _)| known.type_id() == tag.type_id())
			.map(|(_, kind)| *kind)
	}

	pub fn option(&self, code: c_int) -> Option<&'static OptionDescriptor> {
		self.options.iter().find(|desc| desc.code == code)
	}

	pub fn option_name(&self, code: c_int) -> &'static str {
		self.option(code).map_or("UDT_UNKNOWN", |desc| desc.name)
	}

	pub fn options(&self) -> &'static [OptionDescriptor] {
		self.options
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn resolves_the_five_supported_tags() {
		let registry = Registry::install();
		assert_eq!(registry.kind_of(TypeTag::of::<bool>()), Some(OptionKind::Bool));
		assert_eq!(registry.kind_of(TypeTag::of::<i32>()), Some(OptionKind::Int));
		assert_eq!(registry.kind_of(TypeTag::of::<i64>()), Some(OptionKind::Long));
		assert_eq!(registry.kind_of(TypeTag::of::<Linger>()), Some(OptionKind::Linger));
		assert_eq!(
			registry.kind_of(TypeTag::of::<Arc<dyn CongestionFactory>>()),
			Some(OptionKind::Factory)
		);
	}

	#[test]
	fn other_tags_are_unsupported() {
		let registry = Registry::install();
		assert_eq!(registry.kind_of(TypeTag::of::<String>()), None);
		assert_eq!(registry.kind_of(TypeTag::of::<u32>()), None);
		assert_eq!(registry.kind_of(TypeTag::of::<f64>()), None);
	}

	#[test]
	fn install_is_idempotent() {
		let first = Registry::install() as *const Registry;
		let second = Registry::install() as *const Registry;
		assert_eq!(first, second);
		assert!(Registry::get().is_ok());
	}

	#[test]
	fn catalog_covers_every_option_code() {
		let registry = Registry::install();
		for code in 0..=20 {
			assert!(registry.option(code).is_some(), "missing option {code}");
		}
		assert_eq!(registry.option(UDT_LINGER).map(|d| d.kind), Some(OptionKind::Linger));
		assert_eq!(registry.option_name(99), "UDT_UNKNOWN");
	}
}
