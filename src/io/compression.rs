use std::path;

/// Whether `header` begins with the gzip magic bytes
pub fn is_gzipped(header: &[u8]) -> bool {
    header.starts_with(b"\x1f\x8b")
}

/// Check whether `path` carries a `.gz` extension, returning the path with
/// that extension removed if so.
pub fn is_gzipped_extension(path: path::PathBuf) -> (bool, path::PathBuf) {
    if let Some(ext) = path.extension() {
        if ext.to_ascii_lowercase() == "gz" {
            (true, path.with_extension(""))
        } else {
            (false, path)
        }
    } else {
        (false, path)
    }
}

/// Strip a trailing `.gz` from a bare file name
pub fn strip_gzip_suffix(name: &str) -> &str {
    if name.len() > 3 {
        let cut = name.len() - 3;
        if let Some(tail) = name.get(cut..) {
            if tail.eq_ignore_ascii_case(".gz") {
                return &name[..cut];
            }
        }
    }
    name
}
