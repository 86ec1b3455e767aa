use argon2::{Algorithm, Argon2, Params, Version};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use rand::{rngs::OsRng, RngCore};
use std::fmt;
use subtle::ConstantTimeEq;

const SALT_BYTES: usize = 32;
const DIGEST_BYTES: usize = 32;

/// Newtype for password to prevent accidental logging
#[derive(Clone)]
pub struct Password(String);

impl Password {
    pub fn new(password: String) -> Self {
        Self(password)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Password {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Password(***)")
    }
}

/// Salted one-way password digests.
///
/// The salt is stored next to the digest, so `hash` is a pure function of
/// `(password, salt)` under a fixed set of Argon2id parameters.
#[derive(Clone)]
pub struct PasswordHasher {
    params: Params,
}

impl Default for PasswordHasher {
    fn default() -> Self {
        Self {
            params: Params::default(),
        }
    }
}

impl PasswordHasher {
    /// Build with explicit Argon2id cost parameters.
    pub fn with_cost(
        memory_kib: u32,
        iterations: u32,
        parallelism: u32,
    ) -> Result<Self, anyhow::Error> {
        let params = Params::new(memory_kib, iterations, parallelism, Some(DIGEST_BYTES))
            .map_err(|e| anyhow::anyhow!("Invalid Argon2 parameters: {}", e))?;
        Ok(Self { params })
    }

    fn argon2(&self) -> Argon2<'static> {
        Argon2::new(Algorithm::Argon2id, Version::V0x13, self.params.clone())
    }

    /// 32 bytes from the OS RNG, base64 encoded.
    pub fn generate_salt(&self) -> String {
        let mut bytes = [0u8; SALT_BYTES];
        OsRng.fill_bytes(&mut bytes);
        STANDARD.encode(bytes)
    }

    pub fn hash(&self, password: &Password, salt: &str) -> Result<String, anyhow::Error> {
        let mut digest = [0u8; DIGEST_BYTES];
        self.argon2()
            .hash_password_into(password.as_str().as_bytes(), salt.as_bytes(), &mut digest)
            .map_err(|e| anyhow::anyhow!("Failed to hash password: {}", e))?;
        Ok(STANDARD.encode(digest))
    }

    /// Full-value comparison in constant time.
    pub fn verify(
        &self,
        password: &Password,
        salt: &str,
        expected: &str,
    ) -> Result<bool, anyhow::Error> {
        let actual = self.hash(password, salt)?;
        Ok(actual.as_bytes().ct_eq(expected.as_bytes()).into())
    }
}
