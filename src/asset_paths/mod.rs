//! Helpers for turning asset paths into bundle URLs and validating what ends up in a bundle.
//!
//! The responsibilities are split into focused submodules so that URL resolution, URL and header
//! validation, and content type lookup can be tested independently. The collector and the bundle
//! builder share the same rules through this module.

mod content_type;
mod filters;
mod urls;

pub use content_type::content_type_for;
pub use filters::{validate_exchange_url, validate_header};
pub use urls::{AssetUrls, relative_url_path, resolve_asset_urls, resolve_resource_url};
