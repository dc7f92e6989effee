use crate::error::ConfigError;

#[derive(serde::Deserialize, Clone)]
pub struct Settings {
    pub database: DatabaseSettings,
    pub application: ApplicationSettings,
    pub jwt: JwtSettings,
}

#[derive(serde::Deserialize, Clone)]
pub struct ApplicationSettings {
    pub host: String,
    pub port: u16,
}

#[derive(serde::Deserialize, Clone)]
pub struct DatabaseSettings {
    pub username: String,
    pub password: String,
    pub port: u16,
    pub host: String,
    pub database_name: String,
}

impl DatabaseSettings {
    pub fn connection_string(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{}",
            self.username, self.password, self.host, self.port, self.database_name
        )
    }

    /// Server URL without a database, for creating one
    pub fn connection_string_without_db(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}",
            self.username, self.password, self.host, self.port
        )
    }
}

/// Signing and token lifetime settings
///
/// Injected into the signer and the token issuer at construction; nothing
/// reads these values from global state.
#[derive(serde::Deserialize, Clone)]
pub struct JwtSettings {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    #[serde(default = "default_access_token_expiry")]
    pub access_token_expiry: i64, // seconds
    #[serde(default = "default_refresh_token_expiry_months")]
    pub refresh_token_expiry_months: u32,
    #[serde(default = "default_revoke_on_rotation")]
    pub revoke_on_rotation: bool,
}

/// Longest accepted access token lifetime, one day
pub const MAX_ACCESS_TOKEN_EXPIRY: i64 = 24 * 60 * 60;

fn default_access_token_expiry() -> i64 {
    5 * 60
}

fn default_refresh_token_expiry_months() -> u32 {
    6
}

fn default_revoke_on_rotation() -> bool {
    true
}

impl JwtSettings {
    /// Settings with the default lifetimes for the given signing parameters
    pub fn new(
        secret: impl Into<String>,
        issuer: impl Into<String>,
        audience: impl Into<String>,
    ) -> Self {
        Self {
            secret: secret.into(),
            issuer: issuer.into(),
            audience: audience.into(),
            access_token_expiry: default_access_token_expiry(),
            refresh_token_expiry_months: default_refresh_token_expiry_months(),
            revoke_on_rotation: default_revoke_on_rotation(),
        }
    }

    /// Reject settings the service cannot start with
    ///
    /// # Errors
    /// - `MissingRequired` if the secret, issuer or audience is blank
    /// - `InvalidValue` if a token lifetime is zero, negative, or the access
    ///   token lifetime exceeds [`MAX_ACCESS_TOKEN_EXPIRY`]
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.secret.trim().is_empty() {
            return Err(ConfigError::MissingRequired("jwt.secret".to_string()));
        }
        if self.issuer.trim().is_empty() {
            return Err(ConfigError::MissingRequired("jwt.issuer".to_string()));
        }
        if self.audience.trim().is_empty() {
            return Err(ConfigError::MissingRequired("jwt.audience".to_string()));
        }
        if self.access_token_expiry <= 0 {
            return Err(ConfigError::InvalidValue(
                "jwt.access_token_expiry must be positive".to_string(),
            ));
        }
        if self.access_token_expiry > MAX_ACCESS_TOKEN_EXPIRY {
            return Err(ConfigError::InvalidValue(format!(
                "jwt.access_token_expiry must not exceed {} seconds",
                MAX_ACCESS_TOKEN_EXPIRY
            )));
        }
        if self.refresh_token_expiry_months == 0 {
            return Err(ConfigError::InvalidValue(
                "jwt.refresh_token_expiry_months must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

pub fn get_configuration() -> Result<Settings, config::ConfigError> {
    let settings = config::Config::builder()
        .add_source(config::File::with_name("configuration").required(false))
        .add_source(
            config::Environment::with_prefix("APP")
                .prefix_separator("__")
                .separator("__"),
        )
        .build()?;
    settings.try_deserialize::<Settings>()
}
