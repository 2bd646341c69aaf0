//! Presigned URL minting and verification.
//!
//! URLs carry the target key, method, expiry and (for multipart parts) the
//! upload coordinates as query parameters, plus a keyed BLAKE3 MAC over a
//! domain-separated canonical string of those fields. Whoever holds the
//! secret (the object store) can verify a request without any other state.

use std::time::Duration;

use chrono::{DateTime, Utc};
use url::Url;

use crate::constants::MAX_PRESIGN_TTL;
use crate::error::{StoreError, StoreResult};
use crate::key::ObjectKey;
use crate::method::Method;
use crate::multipart::UploadId;

const DOMAIN: &str = "strata-presign-v1";

const PARAM_KEY: &str = "key";
const PARAM_METHOD: &str = "method";
const PARAM_EXPIRES: &str = "expires";
const PARAM_UPLOAD: &str = "uploadId";
const PARAM_PART: &str = "partNumber";
const PARAM_SIGNATURE: &str = "signature";

/// Multipart coordinates of a part upload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PartTarget {
    pub upload_id: UploadId,
    pub part_number: u32,
}

/// A request reconstructed from a presigned URL whose signature checked out.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VerifiedRequest {
    pub method: Method,
    pub key: ObjectKey,
    pub part: Option<PartTarget>,
    pub expires_at: DateTime<Utc>,
}

/// Signs and verifies presigned URLs for one bucket.
#[derive(Clone)]
pub struct UrlSigner {
    base: Url,
    secret: [u8; 32],
    ttl: Duration,
}

impl UrlSigner {
    pub fn new(endpoint: &str, bucket: &str, secret: [u8; 32], ttl: Duration) -> StoreResult<Self> {
        if ttl.is_zero() || ttl > MAX_PRESIGN_TTL {
            return Err(StoreError::InvalidRequest(format!(
                "presign TTL must be between 1s and {}s, got {}s",
                MAX_PRESIGN_TTL.as_secs(),
                ttl.as_secs()
            )));
        }
        let mut base = Url::parse(endpoint)
            .map_err(|e| StoreError::Backend(format!("invalid endpoint {endpoint:?}: {e}")))?;
        base.path_segments_mut()
            .map_err(|_| StoreError::Backend(format!("endpoint {endpoint:?} cannot carry a path")))?
            .pop_if_empty()
            .push(bucket);
        Ok(Self { base, secret, ttl })
    }

    /// Signer with a random secret, for tests and single-process setups.
    pub fn ephemeral(endpoint: &str, bucket: &str, ttl: Duration) -> StoreResult<Self> {
        Self::new(endpoint, bucket, rand::random(), ttl)
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Mint a URL valid from `now` for the signer's TTL.
    pub fn sign(
        &self,
        method: Method,
        key: &ObjectKey,
        part: Option<&PartTarget>,
        now: DateTime<Utc>,
    ) -> String {
        // The constructor caps the TTL, so only a `now` at the edge of
        // chrono's range can overflow; such a URL is minted already expired.
        let expires = chrono::Duration::from_std(self.ttl)
            .ok()
            .and_then(|ttl| now.checked_add_signed(ttl))
            .unwrap_or(now)
            .timestamp();
        let key_string = key.to_key_string();
        let signature = self.mac(method, &key_string, expires, part);

        let mut url = self.base.clone();
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair(PARAM_KEY, &key_string)
                .append_pair(PARAM_METHOD, method.as_str())
                .append_pair(PARAM_EXPIRES, &expires.to_string());
            if let Some(part) = part {
                query
                    .append_pair(PARAM_UPLOAD, part.upload_id.as_str())
                    .append_pair(PARAM_PART, &part.part_number.to_string());
            }
            query.append_pair(PARAM_SIGNATURE, &signature);
        }
        url.into()
    }

    /// Check a URL's signature and expiry and return what it grants.
    pub fn verify(&self, url: &str, now: DateTime<Utc>) -> StoreResult<VerifiedRequest> {
        let url = Url::parse(url).map_err(|e| StoreError::Signature(e.to_string()))?;
        if url.path() != self.base.path() || url.host_str() != self.base.host_str() {
            return Err(StoreError::Signature("URL targets another bucket".into()));
        }

        let mut key = None;
        let mut method = None;
        let mut expires = None;
        let mut upload = None;
        let mut part_number = None;
        let mut signature = None;
        for (name, value) in url.query_pairs() {
            match name.as_ref() {
                PARAM_KEY => key = Some(value.into_owned()),
                PARAM_METHOD => method = Some(value.into_owned()),
                PARAM_EXPIRES => expires = Some(value.into_owned()),
                PARAM_UPLOAD => upload = Some(value.into_owned()),
                PARAM_PART => part_number = Some(value.into_owned()),
                PARAM_SIGNATURE => signature = Some(value.into_owned()),
                _ => {}
            }
        }

        let missing = |name: &str| StoreError::Signature(format!("missing {name}"));
        let key_string = key.ok_or_else(|| missing(PARAM_KEY))?;
        let method: Method = method
            .ok_or_else(|| missing(PARAM_METHOD))?
            .parse()
            .map_err(|_| StoreError::Signature("bad method".into()))?;
        let expires: i64 = expires
            .ok_or_else(|| missing(PARAM_EXPIRES))?
            .parse()
            .map_err(|_| StoreError::Signature("bad expiry".into()))?;
        let signature = signature.ok_or_else(|| missing(PARAM_SIGNATURE))?;

        let part = match (upload, part_number) {
            (Some(upload_id), Some(number)) => Some(PartTarget {
                upload_id: UploadId::new(upload_id)?,
                part_number: number
                    .parse()
                    .map_err(|_| StoreError::Signature("bad part number".into()))?,
            }),
            (None, None) => None,
            _ => return Err(StoreError::Signature("incomplete multipart coordinates".into())),
        };

        let expected = self.mac(method, &key_string, expires, part.as_ref());
        if !constant_time_eq(expected.as_bytes(), signature.as_bytes()) {
            return Err(StoreError::Signature("signature mismatch".into()));
        }

        let expires_at = DateTime::<Utc>::from_timestamp(expires, 0)
            .ok_or_else(|| StoreError::Signature("bad expiry".into()))?;
        if now > expires_at {
            return Err(StoreError::Signature("URL expired".into()));
        }

        Ok(VerifiedRequest {
            method,
            key: ObjectKey::parse(&key_string)?,
            part,
            expires_at,
        })
    }

    fn mac(&self, method: Method, key: &str, expires: i64, part: Option<&PartTarget>) -> String {
        let (upload, number) = match part {
            Some(p) => (p.upload_id.as_str().to_string(), p.part_number.to_string()),
            None => (String::new(), String::new()),
        };
        let canonical = format!("{DOMAIN}\n{method}\n{key}\n{expires}\n{upload}\n{number}");
        hex::encode(blake3::keyed_hash(&self.secret, canonical.as_bytes()).as_bytes())
    }
}

impl std::fmt::Debug for UrlSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UrlSigner")
            .field("base", &self.base.as_str())
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_types::ProjectId;

    fn signer() -> UrlSigner {
        UrlSigner::new(
            "https://storage.example.com",
            "blobs",
            [7u8; 32],
            Duration::from_secs(600),
        )
        .unwrap()
    }

    fn key() -> ObjectKey {
        ObjectKey::new(ProjectId::new(), "art/hero sprite+v2.png").unwrap()
    }

    #[test]
    fn signed_url_verifies() {
        let s = signer();
        let key = key();
        let now = Utc::now();
        let url = s.sign(Method::Put, &key, None, now);
        assert!(url.starts_with("https://storage.example.com/blobs?"));

        let verified = s.verify(&url, now).unwrap();
        assert_eq!(verified.method, Method::Put);
        assert_eq!(verified.key, key);
        assert!(verified.part.is_none());
    }

    #[test]
    fn part_coordinates_are_signed() {
        let s = signer();
        let part = PartTarget {
            upload_id: UploadId::new("u-1").unwrap(),
            part_number: 2,
        };
        let now = Utc::now();
        let url = s.sign(Method::Put, &key(), Some(&part), now);
        assert_eq!(s.verify(&url, now).unwrap().part, Some(part));

        let tampered = url.replace("partNumber=2", "partNumber=3");
        assert!(matches!(
            s.verify(&tampered, now),
            Err(StoreError::Signature(_))
        ));
    }

    #[test]
    fn expired_urls_are_rejected() {
        let s = signer();
        let now = Utc::now();
        let url = s.sign(Method::Get, &key(), None, now);
        let later = now + chrono::Duration::seconds(601);
        assert!(matches!(s.verify(&url, later), Err(StoreError::Signature(_))));
    }

    #[test]
    fn ttl_is_bounded() {
        for ttl in [Duration::ZERO, MAX_PRESIGN_TTL + Duration::from_secs(1)] {
            let err = UrlSigner::new("https://storage.example.com", "blobs", [7u8; 32], ttl)
                .unwrap_err();
            assert!(matches!(err, StoreError::InvalidRequest(_)));
        }
        let longest =
            UrlSigner::new("https://storage.example.com", "blobs", [7u8; 32], MAX_PRESIGN_TTL)
                .unwrap();
        let now = Utc::now();
        let url = longest.sign(Method::Get, &key(), None, now);
        let expires = longest.verify(&url, now).unwrap().expires_at;
        let lifetime = (expires - now).num_seconds();
        let max = MAX_PRESIGN_TTL.as_secs() as i64;
        assert!(lifetime == max || lifetime == max - 1);
    }

    #[test]
    fn signing_near_the_end_of_time_does_not_panic() {
        let s = signer();
        let url = s.sign(Method::Get, &key(), None, DateTime::<Utc>::MAX_UTC);
        assert!(url.contains("signature="));
    }

    #[test]
    fn other_secret_cannot_verify() {
        let now = Utc::now();
        let url = signer().sign(Method::Get, &key(), None, now);
        let other = UrlSigner::new(
            "https://storage.example.com",
            "blobs",
            [8u8; 32],
            Duration::from_secs(600),
        )
        .unwrap();
        assert!(other.verify(&url, now).is_err());
    }
}
