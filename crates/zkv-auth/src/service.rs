//! Authentication service: the verifier half of the passphrase proof
//!
//! State lives in three injected collaborators: the metadata store (the one
//! registered public key), a challenge store, and a session store. Wire
//! integers arrive as decimal strings and are parsed and range-checked before
//! anything is mutated.

use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use num_bigint::BigUint;
use rand::rngs::OsRng;
use rand::RngCore;
use tracing::{debug, info, warn};
use zkv_core::types::{unix_now, IdentityRecord};
use zkv_core::{AuthFailure, ZkvError, ZkvResult};
use zkv_crypto::{
    group, new_challenge, parse_decimal, to_decimal, validate_commitment, validate_response,
    verify,
};
use zkv_storage::MetadataStore;

use crate::store::{ExpiringStore, MemoryStore};

/// Length of session ids and session tokens before encoding.
const TOKEN_BYTES: usize = 32;

/// A login between move 1 and move 2.
#[derive(Debug, Clone)]
pub struct PendingChallenge {
    pub commitment: BigUint,
    pub challenge: BigUint,
    pub created_at: u64,
}

/// A live session. The token itself is the store key.
#[derive(Debug, Clone)]
pub struct Session {
    pub created_at: u64,
}

/// What move 1 hands back to the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginChallenge {
    pub session_id: String,
    /// `c` as a decimal string
    pub challenge: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepStats {
    pub challenges_removed: usize,
    pub sessions_removed: usize,
}

pub struct AuthService {
    identities: Arc<dyn MetadataStore>,
    challenges: Arc<dyn ExpiringStore<PendingChallenge>>,
    sessions: Arc<dyn ExpiringStore<Session>>,
    /// Read-held from identity lookup to session insert in `login_step2`,
    /// write-held from identity update to session clear in
    /// `change_passphrase`. A proof checked against a replaced key can
    /// never leave a session behind.
    identity_gate: RwLock<()>,
    challenge_ttl: Duration,
    session_ttl: Duration,
}

impl AuthService {
    pub fn new(
        identities: Arc<dyn MetadataStore>,
        challenges: Arc<dyn ExpiringStore<PendingChallenge>>,
        sessions: Arc<dyn ExpiringStore<Session>>,
        challenge_ttl: Duration,
        session_ttl: Duration,
    ) -> Self {
        Self {
            identities,
            challenges,
            sessions,
            identity_gate: RwLock::new(()),
            challenge_ttl,
            session_ttl,
        }
    }

    /// Service backed by in-memory challenge and session stores.
    pub fn in_memory(
        identities: Arc<dyn MetadataStore>,
        challenge_ttl: Duration,
        session_ttl: Duration,
    ) -> Self {
        Self::new(
            identities,
            Arc::new(MemoryStore::new()),
            Arc::new(MemoryStore::new()),
            challenge_ttl,
            session_ttl,
        )
    }

    pub fn is_registered(&self) -> ZkvResult<bool> {
        Ok(self.identities.get_identity()?.is_some())
    }

    /// Store `X` as the deployment's only identity.
    pub fn register(&self, public_key: &str) -> ZkvResult<()> {
        let x = parse_public_key(public_key)?;
        let record = IdentityRecord {
            public_key: to_decimal(&x),
            updated_at: unix_now(),
        };
        if !self.identities.insert_identity_if_absent(record)? {
            warn!("registration refused: identity already exists");
            return Err(AuthFailure::AlreadyRegistered.into());
        }
        info!("identity registered");
        Ok(())
    }

    /// Move 1: accept `V`, answer with a fresh challenge `c`.
    pub fn login_step1(&self, commitment: &str) -> ZkvResult<LoginChallenge> {
        let v = parse_decimal(commitment)?;
        validate_commitment(&v)?;
        if !self.is_registered()? {
            debug!("login refused: not registered");
            return Err(AuthFailure::NotRegistered.into());
        }

        let c = new_challenge()?;
        let session_id = random_token();
        let challenge = to_decimal(&c);
        self.challenges.put(
            session_id.clone(),
            PendingChallenge {
                commitment: v,
                challenge: c,
                created_at: unix_now(),
            },
            self.challenge_ttl,
        );
        debug!(session = %token_prefix(&session_id), "login challenge issued");
        Ok(LoginChallenge {
            session_id,
            challenge,
        })
    }

    /// Move 2: consume the challenge, check `b`, mint a session token.
    ///
    /// The challenge is removed whatever the outcome, so a session id can be
    /// answered at most once.
    pub fn login_step2(&self, session_id: &str, response: &str) -> ZkvResult<String> {
        let b = parse_decimal(response)?;
        validate_response(&b)?;

        let pending = self.challenges.delete(session_id).ok_or_else(|| {
            debug!(session = %token_prefix(session_id), "unknown or expired challenge");
            ZkvError::from(AuthFailure::UnknownChallenge)
        })?;

        let gate = self
            .identity_gate
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        let identity = self
            .identities
            .get_identity()?
            .ok_or(ZkvError::Auth(AuthFailure::NotRegistered))?;
        let x = parse_decimal(&identity.public_key)?;

        if !verify(&x, &pending.commitment, &pending.challenge, &b)? {
            warn!(session = %token_prefix(session_id), "proof rejected");
            return Err(AuthFailure::ProofRejected.into());
        }

        let token = random_token();
        self.sessions.put(
            token.clone(),
            Session {
                created_at: unix_now(),
            },
            self.session_ttl,
        );
        drop(gate);
        info!(token = %token_prefix(&token), "login succeeded");
        Ok(token)
    }

    pub fn verify_session(&self, token: &str) -> bool {
        self.sessions.get(token).is_some()
    }

    /// `Ok` for a live session, `Auth(InvalidSession)` otherwise.
    pub fn require_session(&self, token: &str) -> ZkvResult<()> {
        if self.verify_session(token) {
            Ok(())
        } else {
            Err(AuthFailure::InvalidSession.into())
        }
    }

    /// End a session. Returns whether it was live.
    pub fn logout(&self, token: &str) -> bool {
        let removed = self.sessions.delete(token).is_some();
        if removed {
            info!(token = %token_prefix(token), "logged out");
        }
        removed
    }

    /// Replace `X` and end every session, the caller's included.
    ///
    /// Nothing changes unless the caller's session is live and the new key
    /// is valid.
    pub fn change_passphrase(&self, token: &str, new_public_key: &str) -> ZkvResult<()> {
        self.require_session(token)?;
        let x = parse_public_key(new_public_key)?;
        let ended = {
            let _gate = self
                .identity_gate
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            self.identities.update_identity(IdentityRecord {
                public_key: to_decimal(&x),
                updated_at: unix_now(),
            })?;
            self.sessions.clear()
        };
        info!(sessions_ended = ended, "passphrase changed");
        Ok(())
    }

    /// Drop expired challenges and sessions.
    pub fn sweep(&self) -> SweepStats {
        SweepStats {
            challenges_removed: self.challenges.sweep(),
            sessions_removed: self.sessions.sweep(),
        }
    }

    pub fn live_challenges(&self) -> usize {
        self.challenges.len()
    }

    pub fn live_sessions(&self) -> usize {
        self.sessions.len()
    }
}

fn parse_public_key(s: &str) -> ZkvResult<BigUint> {
    let x = parse_decimal(s)?;
    group().validate_public_key(&x)?;
    Ok(x)
}

/// 32 random bytes, base64url without padding.
fn random_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// First characters of a token, safe to log.
pub fn token_prefix(token: &str) -> &str {
    let end = token
        .char_indices()
        .nth(8)
        .map(|(i, _)| i)
        .unwrap_or(token.len());
    &token[..end]
}
