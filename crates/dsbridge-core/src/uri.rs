//! Filesystem classification and read-hint rewriting for file URIs.
//!
//! Local files (`file://` or bare absolute paths) are handed to the native
//! library as plain paths. Distributed files (`hdfs://`) keep their full URI
//! and gain a query parameter selecting the alternate native HDFS client.

use url::Url;

use crate::error::{BridgeError, Result};

/// Query parameter selecting the libhdfs3-based native client.
pub const DEFAULT_HDFS_CLIENT_HINT: &str = "use_hdfs3=1";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Filesystem {
    Local,
    Distributed,
}

/// Classify a URI by its scheme.
pub fn classify_filesystem(uri: &str) -> Result<Filesystem> {
    match Url::parse(uri) {
        Ok(url) => match url.scheme() {
            "file" => Ok(Filesystem::Local),
            "hdfs" => Ok(Filesystem::Distributed),
            scheme => Err(BridgeError::UnrecognizedScheme {
                scheme: scheme.to_string(),
                uri: uri.to_string(),
            }),
        },
        Err(url::ParseError::RelativeUrlWithoutBase) if uri.starts_with('/') => {
            Ok(Filesystem::Local)
        }
        Err(e) => Err(BridgeError::InvalidUri {
            uri: uri.to_string(),
            reason: e.to_string(),
        }),
    }
}

/// Rewrite a URI with the default HDFS client hint.
pub fn rewrite_for_read(uri: &str) -> Result<String> {
    UriRewriter::default().rewrite_for_read(uri)
}

/// Rewrites file URIs into the form the native library reads from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UriRewriter {
    hdfs_client_hint: Option<String>,
}

impl Default for UriRewriter {
    fn default() -> Self {
        Self::new(Some(DEFAULT_HDFS_CLIENT_HINT.to_string()))
    }
}

impl UriRewriter {
    pub fn new(hdfs_client_hint: Option<String>) -> Self {
        Self { hdfs_client_hint }
    }

    /// Local URIs become their decoded path. Distributed URIs get the client
    /// hint added to the query component; every other component is kept
    /// byte for byte.
    pub fn rewrite_for_read(&self, uri: &str) -> Result<String> {
        match classify_filesystem(uri)? {
            Filesystem::Local => Ok(local_path(uri)),
            Filesystem::Distributed => Ok(match &self.hdfs_client_hint {
                Some(hint) => append_query_param(uri, hint),
                None => uri.to_string(),
            }),
        }
    }
}

fn local_path(uri: &str) -> String {
    let Ok(url) = Url::parse(uri) else {
        // bare path
        return uri.to_string();
    };
    match url.to_file_path() {
        Ok(path) => path.to_string_lossy().into_owned(),
        Err(()) => url.path().to_string(),
    }
}

/// Add `param` to the query of `uri`, joining an existing query with `&`.
fn append_query_param(uri: &str, param: &str) -> String {
    let (before_fragment, fragment) = match uri.find('#') {
        Some(idx) => uri.split_at(idx),
        None => (uri, ""),
    };
    let (base, query) = match before_fragment.find('?') {
        Some(idx) => (&before_fragment[..idx], &before_fragment[idx + 1..]),
        None => (before_fragment, ""),
    };

    if query.split('&').any(|pair| pair == param) {
        return uri.to_string();
    }

    if query.is_empty() {
        format!("{}?{}{}", base, param, fragment)
    } else {
        format!("{}?{}&{}{}", base, query, param, fragment)
    }
}
