use lngraph_core::ChannelAnnouncement;
use sha2::{Digest, Sha256};

/// SHA-256 digest (32 bytes).
pub type Hash = [u8; 32];

pub fn sha256(data: &[u8]) -> Hash {
    Sha256::digest(data).into()
}

/// SHA-256 applied twice, the digest every gossip signature commits to.
pub fn double_sha256(data: &[u8]) -> Hash {
    sha256(&sha256(data))
}

/// Content digest of a full announcement, signatures included.
pub fn announcement_digest(ann: &ChannelAnnouncement) -> Hash {
    sha256(&ann.encode())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sha256_known_vector() {
        assert_eq!(
            hex::encode(sha256(b"")),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
        assert_eq!(
            hex::encode(sha256(b"abc")),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_double_sha256_known_vector() {
        assert_eq!(
            hex::encode(double_sha256(b"hello")),
            "9595c9df90075148eb06860365df33584b75bff782a510c6cd4883a419833d50"
        );
    }

    #[test]
    fn test_double_differs_from_single() {
        assert_ne!(sha256(b"lngraph"), double_sha256(b"lngraph"));
    }
}
