//! Ticket (password) encryption for the link handshake.
//!
//! The server sends a DER-encoded RSA public key in its link reply; the client
//! answers with the NUL-terminated password encrypted under RSA-OAEP (SHA-1).

use crate::error::Result;

/// Encrypts the ticket plaintext with the server's public key.
pub trait TicketEncryptor: Send {
    fn encrypt(&mut self, public_key: &[u8], plaintext: &[u8]) -> Result<Vec<u8>>;
}

/// Ticket plaintext: the password bytes followed by a NUL.
pub fn ticket_plaintext(password: Option<&str>) -> Vec<u8> {
    let password = password.unwrap_or_default();
    let mut plaintext = Vec::with_capacity(password.len() + 1);
    plaintext.extend_from_slice(password.as_bytes());
    plaintext.push(0);
    plaintext
}

/// RSA-OAEP with SHA-1, as SPICE servers expect.
#[cfg(feature = "rsa")]
#[derive(Debug, Default, Clone, Copy)]
pub struct RsaOaepEncryptor;

#[cfg(feature = "rsa")]
impl TicketEncryptor for RsaOaepEncryptor {
    fn encrypt(&mut self, public_key: &[u8], plaintext: &[u8]) -> Result<Vec<u8>> {
        use rsa::pkcs8::DecodePublicKey;
        use rsa::{Oaep, RsaPublicKey};

        use crate::error::ChannelError;

        let key = RsaPublicKey::from_public_key_der(public_key)
            .map_err(|err| ChannelError::Encryption(format!("invalid server key: {err}")))?;
        key.encrypt(
            &mut rsa::rand_core::OsRng,
            Oaep::new::<sha1::Sha1>(),
            plaintext,
        )
        .map_err(|err| ChannelError::Encryption(err.to_string()))
    }
}

/// Fallback when the crate is built without RSA support.
#[cfg(not(feature = "rsa"))]
#[derive(Debug, Default, Clone, Copy)]
pub struct UnsupportedEncryptor;

#[cfg(not(feature = "rsa"))]
impl TicketEncryptor for UnsupportedEncryptor {
    fn encrypt(&mut self, _public_key: &[u8], _plaintext: &[u8]) -> Result<Vec<u8>> {
        Err(crate::error::ChannelError::Encryption(
            "built without the `rsa` feature; supply a TicketEncryptor".to_string(),
        ))
    }
}

/// The encryptor used when none is supplied.
pub fn default_encryptor() -> Box<dyn TicketEncryptor> {
    #[cfg(feature = "rsa")]
    {
        Box::new(RsaOaepEncryptor)
    }
    #[cfg(not(feature = "rsa"))]
    {
        Box::new(UnsupportedEncryptor)
    }
}
