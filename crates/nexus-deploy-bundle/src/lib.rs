//! Deployment bundle packaging.
//!
//! Provides:
//! - `Packager` - Stage the executable and asset tree, archive them
//! - `Bundle` - The produced `tar.gz` and its size

pub mod packager;

pub use packager::{Bundle, PackageError, Packager};
