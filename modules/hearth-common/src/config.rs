use std::env;

/// Feed engine configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct FeedConfig {
    /// Postgres connection string for the activity store.
    pub database_url: String,
    /// Hard cap applied to feed page sizes regardless of what callers ask for.
    pub max_page_size: i64,
    /// Default aggregation window for windowed activities, in minutes.
    pub default_window_minutes: i64,
}

impl FeedConfig {
    /// Load configuration from environment variables.
    /// Panics with a clear message if required vars are missing.
    pub fn from_env() -> Self {
        Self {
            database_url: required_env("DATABASE_URL"),
            max_page_size: env::var("FEED_MAX_PAGE_SIZE")
                .unwrap_or_else(|_| "100".to_string())
                .parse()
                .expect("FEED_MAX_PAGE_SIZE must be a number"),
            default_window_minutes: env::var("FEED_DEFAULT_WINDOW_MINUTES")
                .unwrap_or_else(|_| "60".to_string())
                .parse()
                .expect("FEED_DEFAULT_WINDOW_MINUTES must be a number"),
        }
    }
}

fn required_env(key: &str) -> String {
    env::var(key).unwrap_or_else(|_| panic!("{key} environment variable is required"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_when_optional_vars_are_missing() {
        env::remove_var("FEED_MAX_PAGE_SIZE");
        env::remove_var("FEED_DEFAULT_WINDOW_MINUTES");
        env::set_var("DATABASE_URL", "postgres://localhost/hearth");

        let config = FeedConfig::from_env();
        assert_eq!(config.max_page_size, 100);
        assert_eq!(config.default_window_minutes, 60);
        assert_eq!(config.database_url, "postgres://localhost/hearth");
    }
}
