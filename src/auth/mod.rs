/// Authentication module
///
/// Access token signing, refresh token records, pair issuance and the
/// rotation protocol.

mod claims;
mod coordinator;
mod issuer;
mod refresh_token;
mod signer;

use std::sync::Arc;

use crate::configuration::JwtSettings;
use crate::error::ConfigError;
use crate::identity::IdentityProvider;
use crate::store::RefreshTokenStore;

pub use claims::{Claims, TokenSubject};
pub use coordinator::{AccessTokenState, RefreshCoordinator, RefreshRecordState, RotationDecision};
pub use issuer::{JwtResponse, TokenIssuer};
pub use refresh_token::{generate_refresh_token, hash_token, RefreshToken};
pub use signer::{SignedToken, Signer, TokenError};

/// The token services wired together over one store and identity provider
#[derive(Clone)]
pub struct AuthServices {
    pub signer: Arc<Signer>,
    pub issuer: Arc<TokenIssuer>,
    pub coordinator: Arc<RefreshCoordinator>,
}

impl AuthServices {
    /// # Errors
    /// Returns `ConfigError` if the JWT settings are incomplete
    pub fn new(
        config: &JwtSettings,
        store: Arc<dyn RefreshTokenStore>,
        identity: Arc<dyn IdentityProvider>,
    ) -> Result<Self, ConfigError> {
        let signer = Arc::new(Signer::new(config)?);
        let issuer = Arc::new(TokenIssuer::new(
            config,
            signer.clone(),
            store.clone(),
            identity.clone(),
        )?);
        let coordinator = Arc::new(RefreshCoordinator::new(
            config,
            issuer.clone(),
            signer.clone(),
            store,
            identity,
        ));

        Ok(Self {
            signer,
            issuer,
            coordinator,
        })
    }
}
