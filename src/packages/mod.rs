// src/packages/mod.rs

//! Package format support
//!
//! Only RPM is understood; products may reference bundled RPM packages.

pub mod rpm;

pub use rpm::RpmHeader;
