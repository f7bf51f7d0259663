use std::collections::HashMap;

use crate::core::errors::{ApiError, ApiResult};

/// Named segments captured from a route pattern such as `/posts/delete-post/:postId`.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct PathParams {
    params: HashMap<String, String>,
}

impl PathParams {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }

    /// Parameter that the route pattern guarantees; its absence is a bad request.
    pub fn require(&self, name: &str) -> ApiResult<&str> {
        self.get(name)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| ApiError::bad_request(format!("{name} is required")))
    }
}

/// Matches `path` against `pattern` segment by segment. `:name` segments
/// capture the URL-decoded value; all other segments must match literally.
pub fn match_path(pattern: &str, path: &str) -> Option<PathParams> {
    let mut pattern_segments = pattern.trim_matches('/').split('/');
    let mut path_segments = path.trim_matches('/').split('/');
    let mut params = HashMap::new();

    loop {
        match (pattern_segments.next(), path_segments.next()) {
            (None, None) => return Some(PathParams { params }),
            (Some(expected), Some(actual)) => {
                if let Some(name) = expected.strip_prefix(':') {
                    if actual.is_empty() {
                        return None;
                    }
                    let decoded = urlencoding::decode(actual)
                        .unwrap_or(std::borrow::Cow::Borrowed(actual))
                        .to_string();
                    params.insert(name.to_string(), decoded);
                } else if expected != actual {
                    return None;
                }
            }
            _ => return None,
        }
    }
}
