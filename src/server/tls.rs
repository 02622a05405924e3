//! Ephemeral TLS identity for the local callback server.

use rcgen::{
    CertificateParams, DistinguishedName, DnType, ExtendedKeyUsagePurpose, KeyPair,
    KeyUsagePurpose,
};
use time::OffsetDateTime;

use crate::spotify::SpotifyError;

/// How long the generated certificate stays valid.
pub const CERT_VALIDITY: time::Duration = time::Duration::hours(2);

/// PEM-encoded self-signed certificate and its private key.
pub struct EphemeralIdentity {
    pub cert_pem: String,
    pub key_pem: String,
}

impl EphemeralIdentity {
    /// Generates a fresh key pair and a certificate for `host`.
    ///
    /// `localhost` also gets `127.0.0.1` as a subject alternative name; IP
    /// hosts get an IP SAN.
    pub fn generate(host: &str) -> Result<Self, SpotifyError> {
        let mut names = vec![host.to_string()];
        if host.eq_ignore_ascii_case("localhost") {
            names.push("127.0.0.1".to_string());
        }

        let mut params = CertificateParams::new(names).map_err(tls_error)?;
        let mut dn = DistinguishedName::new();
        dn.push(DnType::CommonName, host);
        params.distinguished_name = dn;

        let now = OffsetDateTime::now_utc();
        params.not_before = now - time::Duration::minutes(1);
        params.not_after = now + CERT_VALIDITY;
        params.key_usages = vec![
            KeyUsagePurpose::DigitalSignature,
            KeyUsagePurpose::KeyEncipherment,
        ];
        params.extended_key_usages = vec![ExtendedKeyUsagePurpose::ServerAuth];

        let key_pair = KeyPair::generate().map_err(tls_error)?;
        let cert = params.self_signed(&key_pair).map_err(tls_error)?;

        Ok(Self {
            cert_pem: cert.pem(),
            key_pem: key_pair.serialize_pem(),
        })
    }
}

fn tls_error(e: rcgen::Error) -> SpotifyError {
    SpotifyError::Tls(e.to_string())
}
