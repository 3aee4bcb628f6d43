const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Guess the `content-type` of an asset from its file extension.
pub fn content_type_for(path: &str) -> &'static str {
  let file_name = path.rsplit(['/', '\\']).next().unwrap_or(path);
  let Some((_, extension)) = file_name.rsplit_once('.') else {
    return DEFAULT_CONTENT_TYPE;
  };

  match extension.to_ascii_lowercase().as_str() {
    "html" | "htm" => "text/html",
    "js" | "mjs" | "cjs" => "text/javascript",
    "css" => "text/css",
    "json" | "map" => "application/json",
    "webmanifest" => "application/manifest+json",
    "txt" => "text/plain",
    "xml" => "application/xml",
    "svg" => "image/svg+xml",
    "png" => "image/png",
    "jpg" | "jpeg" => "image/jpeg",
    "gif" => "image/gif",
    "webp" => "image/webp",
    "avif" => "image/avif",
    "ico" => "image/vnd.microsoft.icon",
    "wasm" => "application/wasm",
    "woff" => "font/woff",
    "woff2" => "font/woff2",
    "ttf" => "font/ttf",
    "otf" => "font/otf",
    "mp4" => "video/mp4",
    "webm" => "video/webm",
    "mp3" => "audio/mpeg",
    "wav" => "audio/wav",
    "pdf" => "application/pdf",
    _ => DEFAULT_CONTENT_TYPE,
  }
}

#[cfg(test)]
mod tests {
  use super::content_type_for;

  #[test]
  fn maps_common_web_extensions() {
    assert_eq!(content_type_for("index.html"), "text/html");
    assert_eq!(content_type_for("assets/app.JS"), "text/javascript");
    assert_eq!(content_type_for("pkg\\module_bg.wasm"), "application/wasm");
  }

  #[test]
  fn falls_back_to_octet_stream() {
    assert_eq!(content_type_for("LICENSE"), "application/octet-stream");
    assert_eq!(content_type_for("data.unknown"), "application/octet-stream");
    assert_eq!(content_type_for("dir.d/file"), "application/octet-stream");
  }
}
