use {
    crate::domain::{error::EncryptionError, provider::SecretEncryptor},
    base64::{Engine, engine::general_purpose::STANDARD},
    rsa::{Pkcs1v15Encrypt, RsaPublicKey, pkcs8::DecodePublicKey},
    std::path::Path,
    x509_cert::{
        Certificate,
        der::{Decode, DecodePem, Encode},
    },
};

/// Encrypts the B2C initiator password with the public key from Safaricom's
/// sandbox or production certificate (RSA, PKCS#1 v1.5, base64).
pub struct CertificateEncryptor {
    key: RsaPublicKey,
}

impl CertificateEncryptor {
    pub fn from_public_key(key: RsaPublicKey) -> Self {
        Self { key }
    }

    /// Accepts a PEM or DER encoded X.509 certificate.
    pub fn from_certificate(bytes: &[u8]) -> Result<Self, EncryptionError> {
        let cert = Certificate::from_pem(bytes)
            .or_else(|_| Certificate::from_der(bytes))
            .map_err(|e| EncryptionError::Certificate(e.to_string()))?;

        let spki = cert
            .tbs_certificate
            .subject_public_key_info
            .to_der()
            .map_err(|e| EncryptionError::Key(e.to_string()))?;
        let key = RsaPublicKey::from_public_key_der(&spki)
            .map_err(|e| EncryptionError::Key(e.to_string()))?;

        Ok(Self { key })
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, EncryptionError> {
        let bytes = std::fs::read(path)?;
        Self::from_certificate(&bytes)
    }
}

impl SecretEncryptor for CertificateEncryptor {
    fn encrypt(&self, secret: &str) -> Result<String, EncryptionError> {
        let mut rng = rand::thread_rng();
        let ciphertext = self
            .key
            .encrypt(&mut rng, Pkcs1v15Encrypt, secret.as_bytes())
            .map_err(|e| EncryptionError::Encrypt(e.to_string()))?;
        Ok(STANDARD.encode(ciphertext))
    }
}
