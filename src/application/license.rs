use crate::error::{EasyPayError, Result};
use ed25519_dalek::{Signature, Verifier, VerifyingKey};
use log::{error, info};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

/// Application identifier a license must be issued for.
pub const APP_ID: &str = "8c2f1a6e-45d7-4b57-9c41-6f0a2e9d7f13";

/// Embedded Ed25519 public key of the license issuer.
const LICENSE_PUBLIC_KEY_HEX: &str =
    "d75a980182b10ab7d54bfed3c964073a0ee172f3daa62325af021a68f707511a";

const LICENSE_FILE_NAME: &str = "license.json";

const ATTRIBUTE_APP_ID: &str = "AppID";

/// Signed license artifact as stored on disk.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct License {
    pub licensee: String,
    /// Expiration as unix seconds.
    pub expires_at: u64,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
    /// Detached hex-encoded Ed25519 signature over [`License::signing_preimage`].
    pub signature: String,
}

impl License {
    /// Canonical byte string covered by the detached signature. Attributes
    /// contribute in key order, which `BTreeMap` already guarantees.
    pub fn signing_preimage(&self) -> Vec<u8> {
        let mut preimage = Vec::new();
        preimage.extend_from_slice(b"easypay-license:v1\n");
        preimage.extend_from_slice(self.licensee.as_bytes());
        preimage.push(b'\n');
        preimage.extend_from_slice(self.expires_at.to_string().as_bytes());
        for (key, value) in &self.attributes {
            preimage.push(b'\n');
            preimage.extend_from_slice(key.as_bytes());
            preimage.push(b'=');
            preimage.extend_from_slice(value.as_bytes());
        }
        preimage
    }
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum LicenseState {
    NoLicense,
    Accepted,
    Rejected,
}

/// Whether `valid()` re-reads and re-verifies the artifact on every call.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Default)]
pub enum CachePolicy {
    /// Always load the latest artifact from disk.
    #[default]
    AlwaysReload,
    /// Verify once and reuse the verdict for the lifetime of the gate.
    CacheFirstResult,
}

/// Guards application startup behind a signed license artifact.
///
/// Validation asserts, in order: the artifact is not expired (only
/// enforced when it declares an `AppID` attribute, an accommodation for
/// artifacts issued by older tooling), the detached signature verifies
/// against the embedded issuer key, and the `AppID` attribute matches the
/// application identifier case-insensitively. Callers only observe the
/// boolean; every individual failure is logged with a remediation hint.
pub struct LicenseGate {
    license_path: PathBuf,
    verifying_key: VerifyingKey,
    app_id: String,
    cache_policy: CachePolicy,
    cached: Mutex<Option<bool>>,
}

impl LicenseGate {
    /// Gate for the given data directory, using the embedded issuer key.
    pub fn new(data_dir: &Path) -> Self {
        let mut key_bytes = [0u8; 32];
        hex::decode_to_slice(LICENSE_PUBLIC_KEY_HEX, &mut key_bytes)
            .expect("embedded license key is valid hex");
        let verifying_key = VerifyingKey::from_bytes(&key_bytes)
            .expect("embedded license key is a valid Ed25519 key");
        Self {
            license_path: data_dir.join(LICENSE_FILE_NAME),
            verifying_key,
            app_id: APP_ID.to_string(),
            cache_policy: CachePolicy::default(),
            cached: Mutex::new(None),
        }
    }

    pub fn with_verifying_key(mut self, verifying_key: VerifyingKey) -> Self {
        self.verifying_key = verifying_key;
        self
    }

    pub fn with_app_id(mut self, app_id: impl Into<String>) -> Self {
        self.app_id = app_id.into();
        self
    }

    pub fn with_cache_policy(mut self, cache_policy: CachePolicy) -> Self {
        self.cache_policy = cache_policy;
        self
    }

    pub fn license_path(&self) -> &Path {
        &self.license_path
    }

    /// Does a license artifact exist at the known location.
    pub fn present(&self) -> bool {
        self.license_path.is_file()
    }

    /// Verifies the installed artifact. False on any failed assertion or
    /// any parse/verification error.
    pub fn valid(&self) -> bool {
        if self.cache_policy == CachePolicy::CacheFirstResult {
            let cached = self.cached.lock().expect("license cache lock poisoned");
            if let Some(verdict) = *cached {
                return verdict;
            }
        }
        let verdict = self.validate();
        if self.cache_policy == CachePolicy::CacheFirstResult {
            let mut cached = self.cached.lock().expect("license cache lock poisoned");
            *cached = Some(verdict);
        }
        verdict
    }

    pub fn state(&self) -> LicenseState {
        if !self.present() {
            LicenseState::NoLicense
        } else if self.valid() {
            LicenseState::Accepted
        } else {
            LicenseState::Rejected
        }
    }

    /// Installs a new license artifact, replacing any existing one.
    ///
    /// A failure leaves a previously installed artifact untouched.
    pub fn submit(&self, source: &Path) -> Result<()> {
        let content = std::fs::read(source)?;
        let dir = self
            .license_path
            .parent()
            .ok_or_else(|| EasyPayError::License("license path has no parent".to_string()))?;
        std::fs::create_dir_all(dir)?;
        let mut staged = tempfile::NamedTempFile::new_in(dir)?;
        staged.write_all(&content)?;
        staged
            .persist(&self.license_path)
            .map_err(|e| EasyPayError::Io(e.error))?;
        info!("license artifact installed, restart the application");
        Ok(())
    }

    fn validate(&self) -> bool {
        if !self.present() {
            error!(
                "no license artifact installed at {} | Install one with the license subcommand.",
                self.license_path.display()
            );
            return false;
        }
        let license = match self.load() {
            Ok(license) => license,
            Err(e) => {
                error!(
                    "license artifact could not be read: {e} | Reinstall the license artifact."
                );
                return false;
            }
        };

        let mut verdict = true;
        let app_id_attribute = license.attributes.get(ATTRIBUTE_APP_ID);

        // Expiration is only enforced for artifacts that carry an AppID
        // attribute; older issuing tooling emitted artifacts without one.
        if app_id_attribute.is_some() && self.expired(&license) {
            error!(
                "license expired at unix time {} | Contact your vendor to renew the license.",
                license.expires_at
            );
            verdict = false;
        }

        if !self.signature_verifies(&license) {
            error!(
                "license signature does not verify | The artifact is corrupt or tampered, request a fresh copy from your vendor."
            );
            verdict = false;
        }

        match app_id_attribute {
            Some(value) if value.eq_ignore_ascii_case(&self.app_id) => {}
            _ => {
                error!(
                    "the provided license is not valid for this product | Contact your vendor to obtain a valid license for this product."
                );
                verdict = false;
            }
        }

        verdict
    }

    fn load(&self) -> Result<License> {
        let content = std::fs::read_to_string(&self.license_path)?;
        Ok(serde_json::from_str(&content)?)
    }

    fn expired(&self, license: &License) -> bool {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        now > license.expires_at
    }

    fn signature_verifies(&self, license: &License) -> bool {
        let signature_bytes = match hex::decode(&license.signature) {
            Ok(bytes) => bytes,
            Err(_) => return false,
        };
        let signature = match Signature::from_slice(&signature_bytes) {
            Ok(signature) => signature,
            Err(_) => return false,
        };
        self.verifying_key
            .verify(&license.signing_preimage(), &signature)
            .is_ok()
    }
}
