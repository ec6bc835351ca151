use std::env;

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind: String,
    /// 0 lets actix pick one worker per core.
    pub workers: usize,
    pub api_prefix: String,
    pub max_body_bytes: usize,
    pub log_level: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:5000".to_string(),
            workers: 0,
            api_prefix: "/api".to_string(),
            max_body_bytes: 64 * 1024,
            log_level: "info".to_string(),
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Self {
        Self::from_env_with(|k| env::var(k).ok())
    }

    pub fn from_env_with<F>(get: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = Self::default();
        if let Some(v) = get("BATTINSIGHT_BIND") {
            cfg.bind = v;
        }
        if let Some(v) = get("BATTINSIGHT_WORKERS") {
            if let Ok(n) = v.parse() {
                cfg.workers = n;
            }
        }
        if let Some(v) = get("BATTINSIGHT_API_PREFIX") {
            cfg.api_prefix = normalize_prefix(&v);
        }
        if let Some(v) = get("BATTINSIGHT_MAX_BODY_BYTES") {
            if let Ok(n) = v.parse() {
                cfg.max_body_bytes = n;
            }
        }
        if let Some(v) = get("BATTINSIGHT_LOG") {
            cfg.log_level = v;
        }
        cfg
    }
}

/// `api/` and `/api/` both become `/api`; an empty prefix mounts at root.
fn normalize_prefix(raw: &str) -> String {
    let trimmed = raw.trim().trim_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("/{trimmed}")
    }
}
