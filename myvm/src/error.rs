//! Error kinds surfaced by the VM-CORE API.
//!
//! Invariant violations that indicate a bug rather than exhausted resources
//! (a corrupt TLB tag, an out-of-range bitmap index) panic instead of
//! appearing here; see the module docs on [`crate::Vm`].

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("virtual address does not resolve to a mapped page")]
    TranslationFault,
    #[error("page is already mapped")]
    AlreadyMapped,
    #[error("no contiguous run of {0} free virtual pages available")]
    OutOfVirtualSpace(usize),
    #[error("no free physical frames remain")]
    OutOfPhysicalSpace,
    #[error("address is not page-aligned")]
    Unaligned,
}

pub type Result<T> = std::result::Result<T, Error>;
