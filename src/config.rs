use anyhow::Context;
use std::env;

#[derive(Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database_url: String,
    pub jwt: JwtConfig,
    pub google_client_id: String,
    /// When set, seeding promotes (or creates) this account as `Master`.
    pub master_email: Option<String>,
}

#[derive(Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Clone)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    pub expires_minutes: i64,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let host = env::var("HELPDESK_HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port = env::var("HELPDESK_PORT")
            .unwrap_or_else(|_| "8080".to_string())
            .parse::<u16>()
            .context("HELPDESK_PORT must be a port number")?;

        let database_url = env::var("DATABASE_URL")
            .unwrap_or_else(|_| "postgres://helpdesk:@localhost:5432/helpdesk".to_string());

        let jwt = JwtConfig {
            secret: env::var("HELPDESK_JWT_SECRET").context("HELPDESK_JWT_SECRET is required")?,
            issuer: env::var("HELPDESK_JWT_ISSUER").unwrap_or_else(|_| "helpdesk".to_string()),
            audience: env::var("HELPDESK_JWT_AUDIENCE")
                .unwrap_or_else(|_| "helpdesk-ui".to_string()),
            expires_minutes: env::var("HELPDESK_JWT_EXPIRES_MINUTES")
                .unwrap_or_else(|_| "480".to_string())
                .parse::<i64>()
                .context("HELPDESK_JWT_EXPIRES_MINUTES must be a number of minutes")?,
        };

        let google_client_id =
            env::var("GOOGLE_CLIENT_ID").context("GOOGLE_CLIENT_ID is required")?;

        let master_email = env::var("HELPDESK_MASTER_EMAIL")
            .ok()
            .map(|e| e.trim().to_lowercase())
            .filter(|e| !e.is_empty());

        Ok(Self {
            server: ServerConfig { host, port },
            database_url,
            jwt,
            google_client_id,
            master_email,
        })
    }
}
