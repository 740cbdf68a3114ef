//! Core traits for encoding.

use enumset::EnumSet;
use tessel_ir::Stmt;

use crate::types::{Capability, KernelImage, KernelManifest};
use crate::Result;

/// Native instruction encoder.
///
/// Implementers turn a simplified kernel body and its manifest into an
/// opaque image for their target.
pub trait Encoder {
    /// Encode `body` as described by `manifest`.
    fn encode(&self, body: &Stmt, manifest: &KernelManifest) -> Result<KernelImage>;

    /// Backend name (e.g., "listing").
    fn backend_name(&self) -> &str;

    /// Capabilities this encoder can emit.
    fn capabilities(&self) -> EnumSet<Capability> {
        EnumSet::all()
    }
}
