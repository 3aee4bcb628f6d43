//! Web Bundle serialisation: the CBOR encoder, wire format constants and the builder.

pub mod builder;
pub mod cbor;
pub mod format;

pub use builder::BundleBuilder;
pub use format::Archive;
