use std::time::Duration;

use crowdnest_common::{env_or, EnvVars};

pub struct ApiServerEnv {
    pub jwt_secret: String,
    pub port: u16,
    pub debug: bool,
    pub frontend_url: String,
    pub backend_url: String,
    pub local_storage_path: String,
    pub storage_backend: String,
    pub sweep_interval_secs: u64,
}

impl ApiServerEnv {
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }
}

impl EnvVars for ApiServerEnv {
    fn load() -> Self {
        Self {
            jwt_secret: env_or("JWT_SECRET", ""),
            port: env_or("PORT", "8080").parse().unwrap_or(8080),
            debug: env_or("DEBUG", "false").eq_ignore_ascii_case("true"),
            frontend_url: env_or("FRONTEND_URL", "http://localhost:3000"),
            backend_url: env_or("BACKEND_URL", "http://localhost:8080"),
            local_storage_path: env_or("LOCAL_STORAGE_PATH", "./uploads"),
            storage_backend: env_or("STORAGE_BACKEND", "local"),
            sweep_interval_secs: env_or("SWEEP_INTERVAL_SECS", "60").parse().unwrap_or(60),
        }
    }

    fn get_env_var(&self, key: &str) -> String {
        match key {
            "JWT_SECRET" => self.jwt_secret.clone(),
            "PORT" => self.port.to_string(),
            "DEBUG" => self.debug.to_string(),
            "FRONTEND_URL" => self.frontend_url.clone(),
            "BACKEND_URL" => self.backend_url.clone(),
            "LOCAL_STORAGE_PATH" => self.local_storage_path.clone(),
            "STORAGE_BACKEND" => self.storage_backend.clone(),
            "SWEEP_INTERVAL_SECS" => self.sweep_interval_secs.to_string(),
            _ => String::new(),
        }
    }
}
