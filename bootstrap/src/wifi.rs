//! Rules a WPA2 station applies to its network credentials.
use crate::BootstrapError;
use credentials::Secret;

pub const MAX_SSID_LEN: usize = 32;
pub const MIN_PASSPHRASE_LEN: usize = 8;
pub const MAX_PASSPHRASE_LEN: usize = 63;
/// A raw pre-shared key, as 64 hex digits.
pub const PSK_HEX_LEN: usize = 64;

/// SSIDs are 1 to 32 octets, in any encoding.
pub fn check_ssid(ssid: &str) -> Result<(), BootstrapError> {
    if ssid.is_empty() {
        return Err(BootstrapError::InvalidCredential(
            "Wi-Fi SSID is empty".to_owned(),
        ));
    }
    if ssid.len() > MAX_SSID_LEN {
        return Err(BootstrapError::InvalidCredential(format!(
            "Wi-Fi SSID is {} bytes long, at most {} are allowed",
            ssid.len(),
            MAX_SSID_LEN
        )));
    }
    Ok(())
}

/// An empty passphrase selects an open network. Otherwise it is either
/// 8 to 63 printable ASCII characters or a 64 hex digits PSK.
pub fn check_passphrase(passphrase: &Secret) -> Result<(), BootstrapError> {
    let passphrase = passphrase.expose();
    if passphrase.is_empty() {
        tracing::warn!("Wi-Fi passphrase is empty, joining an open network");
        return Ok(());
    }
    if passphrase.len() == PSK_HEX_LEN {
        if passphrase.chars().all(|c| c.is_ascii_hexdigit()) {
            return Ok(());
        }
        return Err(BootstrapError::InvalidCredential(
            "Wi-Fi passphrase of 64 characters must be a hex PSK".to_owned(),
        ));
    }
    // Never include the passphrase itself in errors.
    if !passphrase.chars().all(|c| (' '..='~').contains(&c)) {
        return Err(BootstrapError::InvalidCredential(
            "Wi-Fi passphrase contains non printable ASCII characters".to_owned(),
        ));
    }
    if !(MIN_PASSPHRASE_LEN..=MAX_PASSPHRASE_LEN).contains(&passphrase.len()) {
        return Err(BootstrapError::InvalidCredential(format!(
            "Wi-Fi passphrase is {} characters long, {} to {} are required",
            passphrase.len(),
            MIN_PASSPHRASE_LEN,
            MAX_PASSPHRASE_LEN
        )));
    }
    Ok(())
}
