#![allow(dead_code)]

use easypay::application::license::{APP_ID, License};
use ed25519_dalek::{Signer, SigningKey};
use std::collections::BTreeMap;
use std::path::Path;

/// Seed of the license issuer key matching the application's embedded
/// public key.
const ISSUER_SIGNING_KEY_HEX: &str =
    "9d61b19deffd5a60ba844af492ec2cc44449c5697b326919703bac031cae7f60";

pub const FAR_FUTURE: u64 = 4_102_444_800; // year 2100

pub fn issuer_key() -> SigningKey {
    let mut seed = [0u8; 32];
    hex::decode_to_slice(ISSUER_SIGNING_KEY_HEX, &mut seed).unwrap();
    SigningKey::from_bytes(&seed)
}

pub fn signed_license(expires_at: u64, app_id: Option<&str>) -> License {
    let mut attributes = BTreeMap::new();
    if let Some(app_id) = app_id {
        attributes.insert("AppID".to_string(), app_id.to_string());
    }
    let mut license = License {
        licensee: "Testkasse 1".to_string(),
        expires_at,
        attributes,
        signature: String::new(),
    };
    let signature = issuer_key().sign(&license.signing_preimage());
    license.signature = hex::encode(signature.to_bytes());
    license
}

/// Writes a license valid for this application into the data directory.
pub fn install_valid_license(data_dir: &Path) {
    write_license(
        &data_dir.join("license.json"),
        &signed_license(FAR_FUTURE, Some(APP_ID)),
    );
}

pub fn write_license(path: &Path, license: &License) {
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, serde_json::to_string_pretty(license).unwrap()).unwrap();
}

pub fn write_terminal_config(data_dir: &Path, json: &str) {
    std::fs::create_dir_all(data_dir).unwrap();
    std::fs::write(data_dir.join("terminal.json"), json).unwrap();
}

pub fn read_outcome(data_dir: &Path) -> serde_json::Value {
    let content = std::fs::read_to_string(data_dir.join("outcome.json")).unwrap();
    serde_json::from_str(&content).unwrap()
}
