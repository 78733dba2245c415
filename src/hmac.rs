// ---------------------------------------------------------------------------
// HMAC-SHA256
// RFC 2104: HMAC(K, m) = H((K XOR opad) || H((K XOR ipad) || m))
// ---------------------------------------------------------------------------

use core::ptr;

use crate::encoding::{ct_eq_ignore_case, eq_ignore_case, to_hex};
use crate::hashes::{Sha256, BLOCK_SIZE, DIGEST_SIZE};
use crate::sensor::{ReadingValue, SensorReading};

const IPAD: u8 = 0x36;
const OPAD: u8 = 0x5c;

/// Secret normalized to exactly one SHA-256 block.
///
/// Secrets longer than 64 bytes are replaced by their digest; shorter ones
/// are copied. Either way the rest is zero-filled. The bytes are wiped when
/// the key is dropped and never appear in `Debug` output.
#[derive(Clone)]
pub struct HmacKey {
    bytes: [u8; BLOCK_SIZE],
}

impl HmacKey {
    pub fn from_secret(secret: &[u8]) -> Self {
        let mut bytes = [0u8; BLOCK_SIZE];
        if secret.len() > BLOCK_SIZE {
            bytes[..DIGEST_SIZE].copy_from_slice(&Sha256::digest(secret));
        } else {
            bytes[..secret.len()].copy_from_slice(secret);
        }
        HmacKey { bytes }
    }

    pub fn as_bytes(&self) -> &[u8; BLOCK_SIZE] {
        &self.bytes
    }

    /// key XOR 0x36
    pub fn inner_pad(&self) -> [u8; BLOCK_SIZE] {
        self.bytes.map(|b| b ^ IPAD)
    }

    /// key XOR 0x5c
    pub fn outer_pad(&self) -> [u8; BLOCK_SIZE] {
        self.bytes.map(|b| b ^ OPAD)
    }
}

impl PartialEq for HmacKey {
    fn eq(&self, other: &Self) -> bool {
        self.bytes == other.bytes
    }
}

impl Eq for HmacKey {}

impl core::fmt::Debug for HmacKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("HmacKey")
            .field("bytes", &"<REDACTED: [u8; 64]>")
            .finish()
    }
}

impl Drop for HmacKey {
    fn drop(&mut self) {
        // Volatile writes so the wipe is not optimised out
        let p = self.bytes.as_mut_ptr();
        for i in 0..self.bytes.len() {
            unsafe { ptr::write_volatile(p.add(i), 0u8) };
        }
        core::sync::atomic::compiler_fence(core::sync::atomic::Ordering::SeqCst);
    }
}

/// Streaming HMAC-SHA256.
pub struct HmacSha256 {
    inner: Sha256,           // inner hasher, already fed the i-padded key
    okey: [u8; BLOCK_SIZE],  // outer key (k XOR opad)
}

impl HmacSha256 {
    pub fn new(key: &[u8]) -> Self {
        Self::from_key(&HmacKey::from_secret(key))
    }

    pub fn from_key(key: &HmacKey) -> Self {
        let mut inner = Sha256::new();
        inner.update(&key.inner_pad());
        HmacSha256 {
            inner,
            okey: key.outer_pad(),
        }
    }

    pub fn update(&mut self, data: &[u8]) {
        self.inner.update(data);
    }

    pub fn finalize(self) -> [u8; DIGEST_SIZE] {
        let inner_hash = self.inner.finalize();
        let mut outer = Sha256::new();
        outer.update(&self.okey);
        outer.update(&inner_hash);
        outer.finalize()
    }

    pub fn mac(key: &[u8], data: &[u8]) -> [u8; DIGEST_SIZE] {
        let mut h = HmacSha256::new(key);
        h.update(data);
        h.finalize()
    }
}

/// Signs messages with a fixed secret.
///
/// Each call to [`sign`](Self::sign) runs two fresh SHA-256 passes; the
/// signer itself only holds the immutable key, so it can be shared between
/// threads freely.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signer {
    key: HmacKey,
}

impl Signer {
    pub fn new(secret: impl AsRef<[u8]>) -> Self {
        let secret = secret.as_ref();
        tracing::debug!(
            secret_len = secret.len(),
            hashed = secret.len() > BLOCK_SIZE,
            "Derived HMAC key"
        );
        Signer {
            key: HmacKey::from_secret(secret),
        }
    }

    pub fn from_key(key: HmacKey) -> Self {
        Signer { key }
    }

    pub fn key(&self) -> &HmacKey {
        &self.key
    }

    /// Raw 32-byte HMAC-SHA256 of `message`.
    pub fn sign_bytes(&self, message: &[u8]) -> [u8; DIGEST_SIZE] {
        let mut mac = HmacSha256::from_key(&self.key);
        mac.update(message);
        mac.finalize()
    }

    /// HMAC-SHA256 of `message` as 64 lowercase hex digits.
    pub fn sign(&self, message: &str) -> String {
        tracing::trace!(len = message.len(), "Signing message");
        to_hex(&self.sign_bytes(message.as_bytes()))
    }

    /// True iff `signature` equals `sign(message)` ignoring letter case.
    ///
    /// The comparison stops at the first mismatch; use
    /// [`verify_constant_time`](Self::verify_constant_time) when timing
    /// matters.
    pub fn verify(&self, message: &str, signature: &str) -> bool {
        eq_ignore_case(&self.sign(message), signature)
    }

    pub fn verify_constant_time(&self, message: &str, signature: &str) -> bool {
        ct_eq_ignore_case(&self.sign(message), signature)
    }

    /// Format and sign a reading: `<kind>:<value>|ts:<timestamp>|sig:<hex>`.
    pub fn sign_sensor_data(
        &self,
        kind: &str,
        value: impl Into<ReadingValue>,
        timestamp: u64,
    ) -> String {
        self.sign_reading(&SensorReading::new(kind, value, timestamp))
    }

    pub fn sign_reading(&self, reading: &SensorReading) -> String {
        let payload = reading.payload();
        let signature = self.sign(&payload);
        format!("{payload}{}{signature}", crate::sensor::SIG_SEPARATOR)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mac_hex(key: &[u8], data: &[u8]) -> String {
        hex::encode(HmacSha256::mac(key, data))
    }

    #[test]
    fn test_hmac_sha256_rfc4231_case1() {
        assert_eq!(
            mac_hex(&[0x0bu8; 20], b"Hi There"),
            "b0344c61d8db38535ca8afceaf0bf12b881dc200c9833da726e9376c2e32cff7"
        );
    }

    #[test]
    fn test_hmac_sha256_rfc4231_case2() {
        assert_eq!(
            mac_hex(b"Jefe", b"what do ya want for nothing?"),
            "5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843"
        );
    }

    #[test]
    fn test_hmac_sha256_rfc4231_case3() {
        assert_eq!(
            mac_hex(&[0xaau8; 20], &[0xddu8; 50]),
            "773ea91e36800e46854db8ebd09181a72959098b3ef8c122d9635514ced565fe"
        );
    }

    #[test]
    fn test_hmac_sha256_rfc4231_case6_long_key() {
        assert_eq!(
            mac_hex(
                &[0xaau8; 131],
                b"Test Using Larger Than Block-Size Key - Hash Key First"
            ),
            "60e431591ee0b67f0d8a26aacbf5b77f8e0bc6213728c5140546040f0ee37f54"
        );
    }

    #[test]
    fn test_hmac_sha256_rfc4231_case7_long_key_and_data() {
        let data: &[u8] = b"This is a test using a larger than block-size key and a larger than \
block-size data. The key needs to be hashed before being used by the HMAC algorithm.";
        assert_eq!(
            mac_hex(&[0xaau8; 131], data),
            "9b09ffa71b942fcb27635fbcd5b0e944bfdc63644f0713938a7f51535c3a35e2"
        );
    }

    #[test]
    fn test_key_is_always_one_block() {
        for len in [0usize, 1, 32, 63, 64, 65, 200] {
            let secret = vec![0x5au8; len];
            let key = HmacKey::from_secret(&secret);
            assert_eq!(key.as_bytes().len(), BLOCK_SIZE);
        }
    }

    #[test]
    fn test_long_key_normalises_to_its_digest() {
        let secret = [0x42u8; 100];
        let digest = Sha256::digest(&secret);
        assert_eq!(HmacKey::from_secret(&secret), HmacKey::from_secret(&digest));
        assert_eq!(
            Signer::new(secret).sign("payload"),
            Signer::new(digest).sign("payload")
        );
    }

    #[test]
    fn test_exactly_block_sized_key_is_not_hashed() {
        let secret = [0x11u8; 64];
        assert_eq!(HmacKey::from_secret(&secret).as_bytes(), &secret);
    }

    #[test]
    fn test_pads() {
        let key = HmacKey::from_secret(b"\x01");
        assert_eq!(key.inner_pad()[0], 0x37);
        assert_eq!(key.outer_pad()[0], 0x5d);
        assert_eq!(key.inner_pad()[1], 0x36);
        assert_eq!(key.outer_pad()[63], 0x5c);
    }

    #[test]
    fn test_signer_matches_streaming_mac() {
        let signer = Signer::new([0x0bu8; 20]);
        assert_eq!(
            signer.sign("Hi There"),
            "b0344c61d8db38535ca8afceaf0bf12b881dc200c9833da726e9376c2e32cff7"
        );
        let mut mac = HmacSha256::from_key(signer.key());
        mac.update(b"Hi ");
        mac.update(b"There");
        assert_eq!(mac.finalize(), signer.sign_bytes(b"Hi There"));
    }

    #[test]
    fn test_verify_round_trip_and_case_swap() {
        let signer = Signer::new("campus-orion-iot-secret-2024");
        let sig = signer.sign("temperature:23.50|ts:1000");
        assert_eq!(sig.len(), 64);
        assert!(signer.verify("temperature:23.50|ts:1000", &sig));
        assert!(signer.verify("temperature:23.50|ts:1000", &sig.to_ascii_uppercase()));
        assert!(signer.verify_constant_time("temperature:23.50|ts:1000", &sig.to_ascii_uppercase()));
        assert!(!signer.verify("temperature:23.51|ts:1000", &sig));
        assert!(!signer.verify("temperature:23.50|ts:1000", &sig[..63]));
    }

    #[test]
    fn test_sign_sensor_data_float() {
        let signer = Signer::new("secret");
        let line = signer.sign_sensor_data("temperature", 23.5f32, 1000);
        let prefix = "temperature:23.50|ts:1000";
        assert!(line.starts_with("temperature:23.50|ts:1000|sig:"));
        let sig = &line[prefix.len() + "|sig:".len()..];
        assert_eq!(sig.len(), 64);
        assert_eq!(sig, signer.sign(prefix));
    }

    #[test]
    fn test_sign_sensor_data_int() {
        let signer = Signer::new("secret");
        let line = signer.sign_sensor_data("presence", 1, 42);
        assert!(line.starts_with("presence:1|ts:42|sig:"));
        assert!(signer.verify("presence:1|ts:42", &line[line.len() - 64..]));
    }

    #[test]
    fn test_sign_matches_manual_two_pass_construction() {
        let signer = Signer::new("campus-orion-iot-secret-2024");
        let message = b"temperature:23.50|ts:1000";

        let mut inner = Sha256::new();
        inner.update(&signer.key().inner_pad());
        inner.update(message);
        let mut outer = Sha256::new();
        outer.update(&signer.key().outer_pad());
        outer.update(&inner.finalize());

        assert_eq!(signer.sign_bytes(message), outer.finalize());
        assert_eq!(
            signer.sign_bytes(message),
            HmacSha256::mac(b"campus-orion-iot-secret-2024", message)
        );
    }

    #[test]
    fn test_debug_redacts_key() {
        let signer = Signer::new("hunter2");
        let rendered = format!("{signer:?}");
        assert!(rendered.contains("REDACTED"));
        assert!(!rendered.contains("hunter2"));
    }

    #[test]
    fn test_signer_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Signer>();
    }
}
