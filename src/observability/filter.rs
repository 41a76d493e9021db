/// Decides which requests get a log context at all.
///
/// Untracked requests never reach the sampling policy.
#[derive(Debug, Clone)]
pub struct RequestFilter {
    pub include_prefixes: Vec<String>,
    pub exclude_paths: Vec<String>,
    pub exclude_extensions: Vec<String>,
}

impl Default for RequestFilter {
    fn default() -> Self {
        Self {
            include_prefixes: vec!["/api/".to_string()],
            exclude_paths: vec!["/api/_auth/session".to_string(), "/api/health".to_string()],
            exclude_extensions: [
                "js", "css", "map", "png", "jpg", "svg", "ico", "woff", "woff2",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        }
    }
}

impl RequestFilter {
    pub fn should_track(&self, path: &str) -> bool {
        if !self.include_prefixes.iter().any(|p| path.starts_with(p.as_str())) {
            return false;
        }
        if self.exclude_paths.iter().any(|p| path.starts_with(p.as_str())) {
            return false;
        }
        !self.has_static_extension(path)
    }

    fn has_static_extension(&self, path: &str) -> bool {
        let last_segment = path.rsplit('/').next().unwrap_or(path);
        match last_segment.rsplit_once('.') {
            Some((_, ext)) => self
                .exclude_extensions
                .iter()
                .any(|e| e.trim_start_matches('.').eq_ignore_ascii_case(ext)),
            None => false,
        }
    }
}
