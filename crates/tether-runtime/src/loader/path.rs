//! Script URL resolution

/// Everything up to and including the last `/`
pub fn base_path(url: &str) -> &str {
    match url.rfind('/') {
        Some(index) => &url[..=index],
        None => "",
    }
}

/// Everything after the last `/`
pub fn base_name(url: &str) -> &str {
    match url.rfind('/') {
        Some(index) => &url[index + 1..],
        None => url,
    }
}

/// Whether `path` starts with `<word>://`
pub fn has_scheme(path: &str) -> bool {
    scheme(path).is_some()
}

/// The scheme of `path` including the colon, e.g. `https:`
fn scheme(path: &str) -> Option<&str> {
    let index = path.find("://")?;
    let name = &path[..index];
    if !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        Some(&path[..=index])
    } else {
        None
    }
}

/// Append `.js` unless already present
pub fn with_js_extension(path: &str) -> String {
    if path.ends_with(".js") {
        path.to_string()
    } else {
        format!("{}.js", path)
    }
}

/// Resolve `path` against `base`.
///
/// - `scheme://...` passes through
/// - `//host/...` takes the scheme of `base`, `http:` if it has none
/// - anything else is appended to `base`
pub fn resolve(base: &str, path: &str) -> String {
    let path = if path.starts_with("//") {
        format!("{}{}", scheme(base).unwrap_or("http:"), path)
    } else {
        path.to_string()
    };

    if has_scheme(&path) {
        path
    } else {
        format!("{}{}", base, path)
    }
}

/// A main script URL without a scheme gets `http://`
pub fn normalize_main_url(url: &str) -> String {
    if url.is_empty() || url.starts_with("//") || has_scheme(url) {
        url.to_string()
    } else {
        format!("http://{}", url)
    }
}

/// Registry name of a package: its URL relative to the main script's base
/// path, or the whole URL when it lives elsewhere
pub fn package_name(main_base: &str, url: &str) -> String {
    match url.strip_prefix(main_base) {
        Some(relative) if !relative.is_empty() && !main_base.is_empty() => relative.to_string(),
        _ => url.to_string(),
    }
}

/// Identifier-safe form of a package name, used in diagnostics
pub fn execution_name(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_path_and_name() {
        assert_eq!(base_path("http://a.com/x/app.js"), "http://a.com/x/");
        assert_eq!(base_name("http://a.com/x/app.js"), "app.js");
        assert_eq!(base_path("app.js"), "");
        assert_eq!(base_name("app.js"), "app.js");
    }

    #[test]
    fn test_resolve_relative() {
        assert_eq!(
            resolve("http://a.com/x/", "lib/util.js"),
            "http://a.com/x/lib/util.js"
        );
    }

    #[test]
    fn test_resolve_scheme_relative() {
        assert_eq!(
            resolve("https://a.com/x/", "//cdn.com/lib.js"),
            "https://cdn.com/lib.js"
        );
        assert_eq!(resolve("", "//cdn.com/lib.js"), "http://cdn.com/lib.js");
    }

    #[test]
    fn test_resolve_absolute_passes_through() {
        assert_eq!(
            resolve("http://a.com/x/", "file:///tmp/lib.js"),
            "file:///tmp/lib.js"
        );
    }

    #[test]
    fn test_extension() {
        assert_eq!(with_js_extension("util"), "util.js");
        assert_eq!(with_js_extension("util.js"), "util.js");
    }

    #[test]
    fn test_normalize_main_url() {
        assert_eq!(normalize_main_url("a.com/app.js"), "http://a.com/app.js");
        assert_eq!(normalize_main_url("https://a.com/app.js"), "https://a.com/app.js");
        assert_eq!(normalize_main_url("//a.com/app.js"), "//a.com/app.js");
    }

    #[test]
    fn test_package_name() {
        assert_eq!(
            package_name("http://a.com/x/", "http://a.com/x/lib/util.js"),
            "lib/util.js"
        );
        assert_eq!(
            package_name("http://a.com/x/", "http://b.com/util.js"),
            "http://b.com/util.js"
        );
        assert_eq!(execution_name("lib/util.js"), "lib_util_js");
    }
}
