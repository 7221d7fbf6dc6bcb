//! One-time phone verification codes with expiry
use crate::error::Result;
use crate::types::TimeStamp;
use crate::utils::{from_cbor, to_cbor};
use chrono::{Duration, Utc};
use tracing::debug;
use uuid7::uuid7;

pub const OTP_TREE: &str = "otp";
pub const MAX_ATTEMPTS: u8 = 3;

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
struct OtpRecord {
    #[n(0)]
    code_hash: String,
    #[n(1)]
    expires_at: TimeStamp<Utc>,
    #[n(2)]
    attempts: u8,
}

/// Codes are stored hashed, one live code per key. Issuing again replaces the
/// previous code.
#[derive(Clone)]
pub struct OtpStore {
    tree: sled::Tree,
    ttl: Duration,
}

impl OtpStore {
    pub fn open(db: &sled::Db, ttl: Duration) -> Result<Self> {
        Ok(Self {
            tree: db.open_tree(OTP_TREE)?,
            ttl,
        })
    }

    /// Create a six digit code for `key` valid until `now + ttl`.
    pub fn issue(&self, key: &str, now: &TimeStamp<Utc>) -> Result<String> {
        let id = uuid7();
        let bytes = id.as_bytes();
        // tail of a uuid7 is random
        let seed = u32::from_be_bytes([bytes[12], bytes[13], bytes[14], bytes[15]]);
        let code = format!("{:06}", seed % 1_000_000);

        let record = OtpRecord {
            code_hash: sha256::digest(code.as_str()),
            expires_at: now.plus(self.ttl),
            attempts: 0,
        };
        self.tree.insert(key.as_bytes(), to_cbor(&record)?)?;
        debug!(key, "otp issued");

        Ok(code)
    }

    /// Consume the code for `key`. Expired records and records that ran out of
    /// attempts are removed; a wrong code counts an attempt.
    pub fn verify(&self, key: &str, code: &str, now: &TimeStamp<Utc>) -> Result<bool> {
        let Some(bytes) = self.tree.get(key.as_bytes())? else {
            return Ok(false);
        };
        let mut record: OtpRecord = from_cbor(&bytes)?;

        if record.expires_at <= *now || record.attempts >= MAX_ATTEMPTS {
            self.tree.remove(key.as_bytes())?;
            return Ok(false);
        }

        if record.code_hash == sha256::digest(code.trim()) {
            self.tree.remove(key.as_bytes())?;
            return Ok(true);
        }

        record.attempts += 1;
        if record.attempts >= MAX_ATTEMPTS {
            self.tree.remove(key.as_bytes())?;
        } else {
            self.tree.insert(key.as_bytes(), to_cbor(&record)?)?;
        }
        Ok(false)
    }

    /// Drop every expired record; returns how many went.
    pub fn purge_expired(&self, now: &TimeStamp<Utc>) -> Result<usize> {
        let mut purged = 0;
        for entry in self.tree.iter() {
            let (key, bytes) = entry?;
            let record: OtpRecord = from_cbor(&bytes)?;
            if record.expires_at <= *now && self.tree.remove(&key)?.is_some() {
                purged += 1;
            }
        }
        Ok(purged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (tempfile::TempDir, OtpStore) {
        let dir = tempfile::tempdir().unwrap();
        let db = sled::open(dir.path().join("otp.db")).unwrap();
        let store = OtpStore::open(&db, Duration::minutes(5)).unwrap();
        (dir, store)
    }

    #[test]
    fn code_is_single_use() {
        let (_dir, otp) = store();
        let now = TimeStamp::new();

        let code = otp.issue("9800000000", &now).unwrap();
        assert_eq!(code.len(), 6);
        assert!(code.chars().all(|c| c.is_ascii_digit()));

        assert!(otp.verify("9800000000", &code, &now).unwrap());
        assert!(!otp.verify("9800000000", &code, &now).unwrap());
    }

    #[test]
    fn expired_code_is_rejected() {
        let (_dir, otp) = store();
        let now = TimeStamp::new();
        let code = otp.issue("9800000000", &now).unwrap();

        let later = now.plus(Duration::minutes(6));
        assert!(!otp.verify("9800000000", &code, &later).unwrap());
        assert_eq!(otp.purge_expired(&later).unwrap(), 0);
    }

    #[test]
    fn attempts_are_limited() {
        let (_dir, otp) = store();
        let now = TimeStamp::new();
        let code = otp.issue("k", &now).unwrap();
        let wrong = if code == "000000" { "111111" } else { "000000" };

        for _ in 0..MAX_ATTEMPTS {
            assert!(!otp.verify("k", wrong, &now).unwrap());
        }
        assert!(!otp.verify("k", &code, &now).unwrap());
    }
}
