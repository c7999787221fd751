//! PEM to PKCS#12 conversion for listener certificates
//!
//! The load balancer consumes TLS bundles as PKCS#12 archives while cluster
//! secrets carry PEM. The first certificate in the PEM chain is the leaf, the
//! rest are bundled as CA certificates. RSA keys in PKCS#1 form and P-256 or
//! P-384 keys in SEC1 form are re-encoded as PKCS#8 first.

use crate::collaborators::TlsMaterial;
use crate::error::{Error, Result};
use rsa::RsaPrivateKey;
use rsa::pkcs1::DecodeRsaPrivateKey;
use rsa::pkcs8::EncodePrivateKey;

const TAG_CERTIFICATE: &str = "CERTIFICATE";
const TAG_PKCS8: &str = "PRIVATE KEY";
const TAG_PKCS1_RSA: &str = "RSA PRIVATE KEY";
const TAG_SEC1_EC: &str = "EC PRIVATE KEY";

/// Builds an unencrypted PKCS#12 archive from a PEM certificate chain and key
pub fn pkcs12_from_pem(material: &TlsMaterial, friendly_name: &str) -> Result<Vec<u8>> {
    let certs = pem::parse_many(&material.certificate)
        .map_err(|e| Error::InvalidTls(format!("certificate is not valid PEM: {}", e)))?;
    let mut certs = certs
        .iter()
        .filter(|block| block.tag() == TAG_CERTIFICATE)
        .map(|block| block.contents());
    let leaf = certs
        .next()
        .ok_or_else(|| Error::InvalidTls("no certificate found in PEM data".to_string()))?;
    let chain: Vec<&[u8]> = certs.collect();

    let key = private_key_pkcs8(&material.private_key)?;

    let pfx = p12::PFX::new_with_cas(leaf, &key, &chain, "", friendly_name)
        .ok_or_else(|| Error::InvalidTls("failed to encode PKCS#12 archive".to_string()))?;
    Ok(pfx.to_der())
}

/// Returns the DER of the private key as PKCS#8
///
/// Blocks other than keys (`EC PARAMETERS` written by `openssl ecparam`) are
/// skipped.
fn private_key_pkcs8(pem_data: &[u8]) -> Result<Vec<u8>> {
    let blocks = pem::parse_many(pem_data)
        .map_err(|e| Error::InvalidTls(format!("private key is not valid PEM: {}", e)))?;
    let block = blocks
        .iter()
        .find(|block| block.tag().ends_with(TAG_PKCS8))
        .ok_or_else(|| Error::InvalidTls("no private key found in PEM data".to_string()))?;

    match block.tag() {
        TAG_PKCS8 => Ok(block.contents().to_vec()),
        TAG_PKCS1_RSA => {
            let key = RsaPrivateKey::from_pkcs1_der(block.contents())
                .map_err(|e| Error::InvalidTls(format!("invalid RSA private key: {}", e)))?;
            encode_pkcs8(&key)
        }
        TAG_SEC1_EC => ec_key_pkcs8(block.contents()),
        other => Err(Error::InvalidTls(format!(
            "unsupported private key type {:?}",
            other
        ))),
    }
}

/// SEC1 keys on P-256 or P-384
fn ec_key_pkcs8(sec1: &[u8]) -> Result<Vec<u8>> {
    if let Ok(key) = p256::SecretKey::from_sec1_der(sec1) {
        return encode_pkcs8(&key);
    }
    match p384::SecretKey::from_sec1_der(sec1) {
        Ok(key) => encode_pkcs8(&key),
        Err(_) => Err(Error::InvalidTls(
            "EC private key is not on a supported curve (P-256, P-384)".to_string(),
        )),
    }
}

fn encode_pkcs8(key: &impl EncodePrivateKey) -> Result<Vec<u8>> {
    let document = key
        .to_pkcs8_der()
        .map_err(|e| Error::InvalidTls(format!("cannot encode private key: {}", e)))?;
    Ok(document.as_bytes().to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rsa::pkcs8::DecodePrivateKey;

    const CERT: &[u8] = include_bytes!("../tests/fixtures/tls.crt");
    const CHAIN: &[u8] = include_bytes!("../tests/fixtures/chain.crt");
    const PKCS1_KEY: &[u8] = include_bytes!("../tests/fixtures/pkcs1.key");
    const PKCS8_KEY: &[u8] = include_bytes!("../tests/fixtures/pkcs8.key");
    const EC_CERT: &[u8] = include_bytes!("../tests/fixtures/ec.crt");
    const EC_KEY: &[u8] = include_bytes!("../tests/fixtures/ec.key");
    const P384_KEY: &[u8] = include_bytes!("../tests/fixtures/p384.key");
    const P521_KEY: &[u8] = include_bytes!("../tests/fixtures/p521.key");

    fn material(cert: &[u8], key: &[u8]) -> TlsMaterial {
        TlsMaterial {
            certificate: cert.to_vec(),
            private_key: key.to_vec(),
        }
    }

    fn key_bag(der: &[u8]) -> Vec<u8> {
        let pfx = p12::PFX::parse(der).unwrap();
        assert!(pfx.verify_mac(""));
        let mut keys = pfx.key_bags("").unwrap();
        assert_eq!(keys.len(), 1);
        keys.remove(0)
    }

    #[test]
    fn test_pkcs1_key_is_wrapped_as_pkcs8() {
        let der = pkcs12_from_pem(&material(CERT, PKCS1_KEY), "web").unwrap();

        let stored = RsaPrivateKey::from_pkcs8_der(&key_bag(&der)).unwrap();
        let expected = RsaPrivateKey::from_pkcs8_pem(std::str::from_utf8(PKCS8_KEY).unwrap()).unwrap();
        assert_eq!(stored, expected);
    }

    #[test]
    fn test_pkcs8_key_passes_through() {
        let der = pkcs12_from_pem(&material(CERT, PKCS8_KEY), "web").unwrap();

        assert_eq!(key_bag(&der), pem::parse(PKCS8_KEY).unwrap().contents());
    }

    #[test]
    fn test_sec1_ec_keys_are_wrapped_as_pkcs8() {
        let der = pkcs12_from_pem(&material(EC_CERT, EC_KEY), "web").unwrap();
        let stored = p256::SecretKey::from_pkcs8_der(&key_bag(&der)).unwrap();
        let expected = p256::SecretKey::from_sec1_pem(std::str::from_utf8(EC_KEY).unwrap()).unwrap();
        assert_eq!(stored, expected);

        // openssl ecparam output leads with an EC PARAMETERS block
        let der = pkcs12_from_pem(&material(EC_CERT, P384_KEY), "web").unwrap();
        assert!(p384::SecretKey::from_pkcs8_der(&key_bag(&der)).is_ok());
    }

    #[test]
    fn test_chain_certificates_are_bundled() {
        let leaf_only = pkcs12_from_pem(&material(CERT, PKCS8_KEY), "web").unwrap();
        let with_chain = pkcs12_from_pem(&material(CHAIN, PKCS8_KEY), "web").unwrap();

        assert!(with_chain.len() > leaf_only.len());
    }

    #[test]
    fn test_rejects_unusable_material() {
        let p521 = pkcs12_from_pem(&material(EC_CERT, P521_KEY), "web").unwrap_err();
        assert!(p521.to_string().contains("supported curve"));

        let no_cert = pkcs12_from_pem(&material(PKCS8_KEY, PKCS8_KEY), "web").unwrap_err();
        assert!(no_cert.to_string().contains("no certificate"));

        let no_key = pkcs12_from_pem(&material(CERT, CERT), "web").unwrap_err();
        assert!(no_key.to_string().contains("no private key"));

        let garbage = pkcs12_from_pem(&material(b"not pem", PKCS8_KEY), "web").unwrap_err();
        assert!(garbage.is_permanent());
    }
}
