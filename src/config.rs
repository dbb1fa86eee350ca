use std::path::PathBuf;

/// Process settings read from the environment at start-up.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub frontend_url: String,
    /// Directory holding the in-memory store's JSON snapshot.
    pub data_dir: PathBuf,
    pub database_url: Option<String>,
}

pub const MIN_JWT_SECRET_LEN: usize = 32;

impl ServerConfig {
    pub fn from_env() -> Self {
        fn string_env(name: &str, default: &str) -> String { std::env::var(name).unwrap_or_else(|_| default.to_string()) }
        Self {
            host: string_env("STACKIT_HOST", "0.0.0.0"),
            port: std::env::var("STACKIT_PORT").ok().and_then(|v| v.parse().ok()).unwrap_or(8080),
            frontend_url: string_env("FRONTEND_URL", "http://localhost:3000"),
            data_dir: PathBuf::from(string_env("STACKIT_DATA_DIR", "data")),
            database_url: std::env::var("DATABASE_URL").ok(),
        }
    }
}

/// Checks the variables the server cannot start without. Returns one message per problem.
pub fn validate_env() -> Vec<String> {
    let mut problems = Vec::new();
    match std::env::var("JWT_SECRET") {
        Err(_) => problems.push("JWT_SECRET is not set".to_string()),
        Ok(secret) if secret.len() < MIN_JWT_SECRET_LEN => {
            problems.push(format!("JWT_SECRET must be at least {MIN_JWT_SECRET_LEN} characters long"))
        }
        Ok(_) => {}
    }
    #[cfg(feature = "postgres-store")]
    if std::env::var("DATABASE_URL").is_err() {
        problems.push("DATABASE_URL must be set for postgres-store".to_string());
    }
    problems
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn short_secret_is_rejected() {
        std::env::set_var("JWT_SECRET", "short");
        assert!(validate_env().iter().any(|p| p.contains("JWT_SECRET")));
        std::env::set_var("JWT_SECRET", "test-secret-must-be-32-bytes-long!!");
        assert!(!validate_env().iter().any(|p| p.contains("JWT_SECRET")));
    }

    #[test]
    #[serial]
    fn defaults_apply() {
        std::env::remove_var("STACKIT_PORT");
        std::env::remove_var("STACKIT_HOST");
        let cfg = ServerConfig::from_env();
        assert_eq!(cfg.port, 8080);
        assert_eq!(cfg.host, "0.0.0.0");
    }

    #[test]
    #[serial]
    fn data_dir_comes_from_env() {
        std::env::remove_var("STACKIT_DATA_DIR");
        assert_eq!(ServerConfig::from_env().data_dir, PathBuf::from("data"));
        std::env::set_var("STACKIT_DATA_DIR", "/tmp/stackit-data");
        assert_eq!(ServerConfig::from_env().data_dir, PathBuf::from("/tmp/stackit-data"));
        std::env::remove_var("STACKIT_DATA_DIR");
    }
}
