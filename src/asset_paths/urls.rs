use std::path::{Component, Path};

const INDEX_HTML: &str = "index.html";

/// URLs an asset is published under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetUrls {
  /// URL serving the asset content.
  pub url: String,
  /// Extra URL that should redirect to [`AssetUrls::url`], used for directory index pages.
  pub index_redirect: Option<String>,
}

/// Join a base URL and a relative asset path.
///
/// The generated URL always uses forward slashes so that bundles produced on Windows resolve
/// identically to those produced elsewhere.
pub fn resolve_resource_url(base_url: &str, relative_path: &str) -> String {
  let relative = relative_path.replace('\\', "/");
  format!("{}{}", base_url, relative.trim_start_matches("./"))
}

/// Resolve the URLs for an asset, serving `index.html` files at their directory URL.
///
/// `dir/index.html` is published at `base + "dir/"` and the original location becomes a
/// redirect to `./`, matching how static hosts treat directory index pages.
pub fn resolve_asset_urls(base_url: &str, relative_path: &str) -> AssetUrls {
  let url = resolve_resource_url(base_url, relative_path);
  let Some(directory_url) = url.strip_suffix(INDEX_HTML) else {
    return AssetUrls {
      url,
      index_redirect: None,
    };
  };

  if !directory_url.is_empty() && !directory_url.ends_with('/') {
    return AssetUrls {
      url,
      index_redirect: None,
    };
  }

  AssetUrls {
    url: directory_url.to_string(),
    index_redirect: Some(url.clone()),
  }
}

/// Convert a filesystem path relative to a static root into URL path segments.
pub fn relative_url_path(relative: &Path) -> String {
  relative
    .components()
    .filter_map(|component| match component {
      Component::Normal(segment) => Some(segment.to_string_lossy().into_owned()),
      _ => None,
    })
    .collect::<Vec<_>>()
    .join("/")
}
