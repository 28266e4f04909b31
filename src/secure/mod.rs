//! Secure object pool and the charm codec.
//!
//! Secrets (charm keys and similar material) live in a [`SecretPool`] and are
//! only ever referenced through opaque [`SecretRef`] handles. Pooled bytes are
//! zeroed before their storage is released, on individual release and on
//! `dismiss`.
//!
//! A *charmed* resource is stored obfuscated on disk: a four byte magic, a
//! scheme byte, then the transformed payload. Resources without the magic are
//! passed through unchanged.

use crate::error::{ChassisError, Result};
use parking_lot::Mutex;
use std::sync::Arc;

/// Reference to an object held in the secure pool.
pub type SecretRef = u32;

/// Sentinel for "no secret".
pub const NULL_SECREF: SecretRef = u32::MAX;

/// Envelope magic for charmed resources.
pub const CHARM_MAGIC: [u8; 4] = *b"CHM1";

/// Scheme 0: enveloped but not transformed.
pub const SCHEME_CLEAR: u8 = 0;
/// Scheme 1: rotating XOR keystream.
pub const SCHEME_ROTOR: u8 = 1;

/// Built-in configuration charm key, used when the application does not supply
/// its own. Configuration charming is obfuscation, not secrecy.
pub const DEFAULT_CHARM_KEY: [u8; 16] = [
    0x7b, 0x2e, 0x91, 0x4c, 0xd3, 0x08, 0x66, 0xaf, 0x15, 0xe9, 0x3a, 0xc0, 0x58, 0x9d, 0x27, 0xf4,
];

struct SecretBytes(Vec<u8>);

impl Drop for SecretBytes {
    fn drop(&mut self) {
        // Zero before release so freed storage never carries key material.
        self.0.fill(0);
    }
}

/// Pool of secret byte objects addressed by [`SecretRef`].
#[derive(Clone, Default)]
pub struct SecretPool {
    objects: Arc<Mutex<Vec<Option<SecretBytes>>>>,
}

impl SecretPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy `bytes` into the pool and return the handle, or [`NULL_SECREF`]
    /// when the pool's storage cannot grow — callers must check.
    pub fn add(&self, bytes: &[u8]) -> SecretRef {
        let mut objects = self.objects.lock();
        if objects.try_reserve(1).is_err() {
            return NULL_SECREF;
        }
        let reference = objects.len() as SecretRef;
        objects.push(Some(SecretBytes(bytes.to_vec())));
        reference
    }

    /// Run `f` over the referenced bytes without copying them out.
    pub fn with<R>(&self, reference: SecretRef, f: impl FnOnce(&[u8]) -> R) -> Option<R> {
        if reference == NULL_SECREF {
            return None;
        }
        let objects = self.objects.lock();
        objects
            .get(reference as usize)
            .and_then(|slot| slot.as_ref())
            .map(|secret| f(&secret.0))
    }

    /// Release a single object, zeroing its storage.
    pub fn release(&self, reference: SecretRef) {
        if reference == NULL_SECREF {
            return;
        }
        if let Some(slot) = self.objects.lock().get_mut(reference as usize) {
            slot.take();
        }
    }

    /// Release every object in the pool.
    pub fn dismiss(&self) {
        self.objects.lock().clear();
    }
}

/// Charm scheme and key handle, set once at construction and reused for every
/// charmed load, including redirect targets.
#[derive(Clone)]
pub struct CharmContext {
    scheme: u8,
    key: SecretRef,
    pool: SecretPool,
}

impl CharmContext {
    /// Context backed by the secure pool, charming with `key`.
    pub fn new(pool: &SecretPool, scheme: u8, key: &[u8]) -> Self {
        Self {
            scheme,
            key: pool.add(key),
            pool: pool.clone(),
        }
    }

    /// Context using the built-in configuration key.
    pub fn with_default_key(pool: &SecretPool) -> Self {
        Self::new(pool, SCHEME_ROTOR, &DEFAULT_CHARM_KEY)
    }

    /// Context for applications without the secure capability: enveloped clear
    /// resources still decode, keyed schemes are rejected.
    pub fn cleartext() -> Self {
        Self {
            scheme: SCHEME_CLEAR,
            key: NULL_SECREF,
            pool: SecretPool::new(),
        }
    }

    pub fn scheme(&self) -> u8 {
        self.scheme
    }

    /// Decode a loaded resource. Bytes without the charm magic are returned
    /// as-is.
    pub fn decode(&self, raw: Vec<u8>) -> Result<Vec<u8>> {
        if raw.len() < 5 || raw[..4] != CHARM_MAGIC {
            return Ok(raw);
        }
        let scheme = raw[4];
        let payload = &raw[5..];
        match scheme {
            SCHEME_CLEAR => Ok(payload.to_vec()),
            SCHEME_ROTOR => self
                .pool
                .with(self.key, |key| rotor_apply(payload, key))
                .ok_or_else(|| {
                    ChassisError::config_invalid(
                        "charmed resource found but no charm key is configured",
                    )
                }),
            other => Err(ChassisError::UnknownScheme { scheme: other }),
        }
    }

    /// Charm a payload into the envelope format. Used by provisioning tooling
    /// and the test fixtures.
    pub fn encode(&self, payload: &[u8]) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        out.try_reserve(payload.len() + 5)
            .map_err(|_| ChassisError::Allocation {
                what: "charm envelope",
            })?;
        out.extend_from_slice(&CHARM_MAGIC);
        out.push(self.scheme);
        match self.scheme {
            SCHEME_CLEAR => out.extend_from_slice(payload),
            SCHEME_ROTOR => {
                let body = self
                    .pool
                    .with(self.key, |key| rotor_apply(payload, key))
                    .ok_or_else(|| {
                        ChassisError::config_invalid("cannot charm without a charm key")
                    })?;
                out.extend_from_slice(&body);
            }
            other => return Err(ChassisError::UnknownScheme { scheme: other }),
        }
        Ok(out)
    }
}

/// Rotating XOR keystream. Symmetric: applying it twice restores the input.
fn rotor_apply(data: &[u8], key: &[u8]) -> Vec<u8> {
    if key.is_empty() {
        return data.to_vec();
    }
    data.iter()
        .enumerate()
        .map(|(i, byte)| {
            let k = key[i % key.len()];
            byte ^ k.rotate_left((i % 7) as u32) ^ (i as u8).wrapping_mul(31)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_handles_resolve_until_released() {
        let pool = SecretPool::new();
        let r = pool.add(b"key material");
        assert_eq!(pool.with(r, <[u8]>::len), Some(12));
        pool.release(r);
        assert_eq!(pool.with(r, <[u8]>::len), None);
    }

    #[test]
    fn uncharmed_bytes_pass_through() {
        let ctx = CharmContext::cleartext();
        let raw = b"<config/>".to_vec();
        assert_eq!(ctx.decode(raw.clone()).unwrap(), raw);
    }

    #[test]
    fn charmed_payload_decodes_with_the_same_context() {
        let pool = SecretPool::new();
        let ctx = CharmContext::with_default_key(&pool);
        let charmed = ctx.encode(b"<config verbose=\"true\"/>").unwrap();
        assert_eq!(&charmed[..4], &CHARM_MAGIC);
        assert_ne!(&charmed[5..], b"<config verbose=\"true\"/>");
        assert_eq!(
            ctx.decode(charmed).unwrap(),
            b"<config verbose=\"true\"/>".to_vec()
        );
    }

    #[test]
    fn keyed_scheme_without_a_key_is_rejected() {
        let pool = SecretPool::new();
        let charmer = CharmContext::with_default_key(&pool);
        let charmed = charmer.encode(b"secret").unwrap();
        let keyless = CharmContext::cleartext();
        assert!(keyless.decode(charmed).is_err());
    }

    #[test]
    fn unknown_scheme_is_an_error() {
        let mut bogus = CHARM_MAGIC.to_vec();
        bogus.push(9);
        bogus.extend_from_slice(b"payload");
        let ctx = CharmContext::cleartext();
        assert!(matches!(
            ctx.decode(bogus),
            Err(ChassisError::UnknownScheme { scheme: 9 })
        ));
    }
}
