use anyhow::{Context, Result};
use url::Url;

/// Encode a value for use inside an OData string literal (`'...'`) in a query string
pub fn encode_query_parameter(value: &str) -> String {
    // Match encodeURIComponent, which leaves these unescaped
    urlencoding::encode(&value.replace('\'', "''"))
        .replace("%27", "'")
        .replace("%28", "(")
        .replace("%29", ")")
        .replace("%21", "!")
        .replace("%2A", "*")
}

/// Split a comma-separated option value, dropping empty items
pub fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

pub fn remove_trailing_slashes(url: &str) -> &str {
    url.trim_end_matches('/')
}

/// Decoded server-relative path of a web, without trailing slash (empty for the root web)
pub fn web_relative_path(web_url: &str) -> Result<String> {
    let url = Url::parse(web_url).with_context(|| format!("Invalid URL: {}", web_url))?;
    let path = urlencoding::decode(url.path())
        .with_context(|| format!("Invalid URL: {}", web_url))?;
    Ok(path.trim_end_matches('/').to_string())
}

/// Server-relative path of `path` in the web at `web_url`.
///
/// `path` may be absolute, server-relative or web-relative.
pub fn server_relative_path(web_url: &str, path: &str) -> Result<String> {
    let web_path = web_relative_path(web_url)?;

    let path = if path.starts_with("https://") || path.starts_with("http://") {
        web_relative_path(path)?
    } else {
        path.trim_end_matches('/').to_string()
    };

    let lower_path = path.to_lowercase();
    let lower_web = web_path.to_lowercase();
    let already_rooted = !web_path.is_empty()
        && lower_path.starts_with(&lower_web)
        && matches!(lower_path[lower_web.len()..].chars().next(), None | Some('/'));

    let result = if path.is_empty() {
        web_path
    } else if already_rooted {
        path
    } else {
        format!("{}/{}", web_path, path.trim_start_matches('/'))
    };

    Ok(if result.is_empty() {
        "/".to_string()
    } else {
        result
    })
}
