// Allow unwrap in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]

//! Resolution passes of the platform description driver.
//!
//! This crate turns parsed descriptions into executable build plans:
//!
//! 1. [`include`] pulls in `using` directives (cycle detection, prefixing)
//!    and declares entries into the [`store::VariableStore`].
//! 2. [`validate`] resolves static types against the host catalog, checks
//!    every attribute, resolves registration interfaces and IRQ attributes,
//!    merges contributing entries per variable, and selects constructors
//!    ([`ctors`]) — producing [`validate::Plans`].
//! 3. [`sort`] derives creation and registration orders from the plans.

pub mod convert;
pub mod ctors;
pub mod include;
pub mod irq;
pub mod registration;
pub mod sort;
pub mod store;
pub mod validate;

use pdl_ast::SourceMap;
use pdl_host::{TypeCatalog, TypeId};

/// Shared read-only context of one driver pass.
pub struct Ctx<'a> {
    pub catalog: &'a TypeCatalog,
    pub sources: &'a SourceMap,
    /// Catalog type of the host machine; parameters of this type default to
    /// the ambient machine instance.
    pub machine_type: TypeId,
}
