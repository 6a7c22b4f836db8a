use std::env;

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub eventbrite: EventbriteConfig,
    pub membership: MembershipConfig,
    pub cache: CacheConfig,
    pub recaptcha: RecaptchaConfig,
    pub jwt: JwtConfig,
    pub rate_limit: RateLimitConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Public origin of the site; used for CORS and post-login redirects.
    pub public_url: String,
    /// Whether to set the `Secure` flag on cookies.
    /// If `None`, it is inferred from `public_url` (`https` -> true).
    /// Read from env var `COOKIE_SECURE` (accepted values: "true"/"false", "1"/"0", "yes"/"no").
    pub cookie_secure: Option<bool>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EventbriteConfig {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
    pub api_url: String,
    pub oauth_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MembershipConfig {
    pub api_url: String,
    pub api_key: String,
    /// Header carrying the API key on every validation request.
    pub api_key_header: String,
    /// JSON field whose presence marks a valid card.
    pub card_type_field: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    /// TTL for cached Eventbrite read responses. Zero disables caching.
    pub ttl_seconds: u64,
    /// When set, responses are cached in Redis instead of in-process.
    pub redis_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RecaptchaConfig {
    /// When `None`, only the presence of the captcha token is checked.
    pub secret: Option<String>,
    pub verify_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub expiration_hours: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    /// Allowed requests per second (per IP) for auth endpoints (e.g. /api/auth/login)
    pub auth_per_second: u32,
    /// Burst size for auth endpoints
    pub auth_burst: u32,
    /// Allowed requests per second (per IP) for the public landing pages and redeem form
    pub redeem_per_second: u32,
    /// Burst size for the public landing pages and redeem form
    pub redeem_burst: u32,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        Ok(Config {
            server: ServerConfig {
                host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                port: env::var("PORT")
                    .unwrap_or_else(|_| "8080".to_string())
                    .parse()
                    .map_err(|_| ConfigError::InvalidValue("PORT".to_string()))?,
                public_url: env::var("PUBLIC_URL")
                    .unwrap_or_else(|_| "http://localhost:8080".to_string()),
                cookie_secure: match env::var("COOKIE_SECURE") {
                    Ok(v) => parse_flag(&v),
                    Err(_) => None,
                },
            },
            database: DatabaseConfig {
                url: env::var("DATABASE_URL")
                    .unwrap_or_else(|_| "sqlite://data/app.db".to_string()),
                max_connections: env::var("DATABASE_MAX_CONNECTIONS")
                    .unwrap_or_else(|_| "5".to_string())
                    .parse()
                    .unwrap_or(5),
            },
            eventbrite: EventbriteConfig {
                client_id: env::var("EVENTBRITE_CLIENT_ID")
                    .map_err(|_| ConfigError::MissingEnv("EVENTBRITE_CLIENT_ID".to_string()))?,
                client_secret: env::var("EVENTBRITE_CLIENT_SECRET").map_err(|_| {
                    ConfigError::MissingEnv("EVENTBRITE_CLIENT_SECRET".to_string())
                })?,
                redirect_uri: env::var("EVENTBRITE_REDIRECT_URI")
                    .unwrap_or_else(|_| "http://localhost:8080/api/auth/callback".to_string()),
                api_url: env::var("EVENTBRITE_API_URL")
                    .unwrap_or_else(|_| "https://www.eventbriteapi.com/v3".to_string()),
                oauth_url: env::var("EVENTBRITE_OAUTH_URL")
                    .unwrap_or_else(|_| "https://www.eventbrite.com/oauth".to_string()),
            },
            membership: MembershipConfig {
                api_url: env::var("MEMBERSHIP_API_URL")
                    .unwrap_or_else(|_| "http://localhost:5000/ds/api/".to_string()),
                api_key: env::var("MEMBERSHIP_API_KEY")
                    .map_err(|_| ConfigError::MissingEnv("MEMBERSHIP_API_KEY".to_string()))?,
                api_key_header: env::var("MEMBERSHIP_API_KEY_HEADER")
                    .unwrap_or_else(|_| "apikey".to_string()),
                card_type_field: env::var("MEMBERSHIP_CARD_TYPE_FIELD")
                    .unwrap_or_else(|_| "Kartentyp".to_string()),
            },
            cache: CacheConfig {
                ttl_seconds: env::var("CACHE_TTL_SECONDS")
                    .unwrap_or_else(|_| "1800".to_string())
                    .parse()
                    .unwrap_or(1800u64),
                redis_url: env::var("REDIS_URL").ok().filter(|v| !v.is_empty()),
            },
            recaptcha: RecaptchaConfig {
                secret: env::var("RECAPTCHA_SECRET").ok().filter(|v| !v.is_empty()),
                verify_url: env::var("RECAPTCHA_VERIFY_URL").unwrap_or_else(|_| {
                    "https://www.google.com/recaptcha/api/siteverify".to_string()
                }),
            },
            jwt: JwtConfig {
                secret: env::var("JWT_SECRET")
                    .map_err(|_| ConfigError::MissingEnv("JWT_SECRET".to_string()))?,
                expiration_hours: env::var("JWT_EXPIRATION_HOURS")
                    .unwrap_or_else(|_| "24".to_string())
                    .parse()
                    .unwrap_or(24),
            },
            rate_limit: RateLimitConfig {
                auth_per_second: env::var("RATE_LIMIT_AUTH_PER_SECOND")
                    .unwrap_or_else(|_| "3".to_string())
                    .parse()
                    .unwrap_or(3),
                auth_burst: env::var("RATE_LIMIT_AUTH_BURST")
                    .unwrap_or_else(|_| "10".to_string())
                    .parse()
                    .unwrap_or(10),
                redeem_per_second: env::var("RATE_LIMIT_REDEEM_PER_SECOND")
                    .unwrap_or_else(|_| "2".to_string())
                    .parse()
                    .unwrap_or(2),
                redeem_burst: env::var("RATE_LIMIT_REDEEM_BURST")
                    .unwrap_or_else(|_| "20".to_string())
                    .parse()
                    .unwrap_or(20),
            },
        })
    }

    /// Whether cookies should carry the `Secure` flag.
    pub fn cookie_secure(&self) -> bool {
        self.server
            .cookie_secure
            .unwrap_or_else(|| self.server.public_url.starts_with("https://"))
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.to_lowercase().as_str() {
        "1" | "true" | "yes" => Some(true),
        "0" | "false" | "no" => Some(false),
        _ => None,
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnv(String),

    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(String),
}

impl Default for Config {
    fn default() -> Self {
        Config {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 8080,
                public_url: "http://localhost:8080".to_string(),
                cookie_secure: None,
            },
            database: DatabaseConfig {
                url: "sqlite://data/app.db".to_string(),
                max_connections: 5,
            },
            eventbrite: EventbriteConfig {
                client_id: String::new(),
                client_secret: String::new(),
                redirect_uri: "http://localhost:8080/api/auth/callback".to_string(),
                api_url: "https://www.eventbriteapi.com/v3".to_string(),
                oauth_url: "https://www.eventbrite.com/oauth".to_string(),
            },
            membership: MembershipConfig {
                api_url: "http://localhost:5000/ds/api/".to_string(),
                api_key: String::new(),
                api_key_header: "apikey".to_string(),
                card_type_field: "Kartentyp".to_string(),
            },
            cache: CacheConfig {
                ttl_seconds: 1800,
                redis_url: None,
            },
            recaptcha: RecaptchaConfig {
                secret: None,
                verify_url: "https://www.google.com/recaptcha/api/siteverify".to_string(),
            },
            jwt: JwtConfig {
                secret: String::new(),
                expiration_hours: 24,
            },
            rate_limit: RateLimitConfig {
                auth_per_second: 3,
                auth_burst: 10,
                redeem_per_second: 2,
                redeem_burst: 20,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_flag_accepts_common_spellings() {
        assert_eq!(parse_flag("YES"), Some(true));
        assert_eq!(parse_flag("0"), Some(false));
        assert_eq!(parse_flag("maybe"), None);
    }

    #[test]
    fn cookie_secure_is_inferred_from_public_url() {
        let mut config = Config::default();
        assert!(!config.cookie_secure());

        config.server.public_url = "https://discounts.example.org".to_string();
        assert!(config.cookie_secure());

        config.server.cookie_secure = Some(false);
        assert!(!config.cookie_secure());
    }
}
