use lngraph_core::{ChannelAnnouncement, ChannelPolicy, NodeId, NodeInfo, PublicKey, Signature};
use secp256k1::{ecdsa, Message, SECP256K1};

use crate::error::CryptoError;
use crate::hashing::double_sha256;
use crate::keys::{parse_public_key, KeyPair};

fn digest(message: &[u8]) -> Message {
    Message::from_digest(double_sha256(message))
}

/// Sign `message` with ECDSA over its double SHA-256.
pub fn sign(message: &[u8], keypair: &KeyPair) -> Signature {
    let sig = SECP256K1.sign_ecdsa(&digest(message), keypair.secret_key());
    Signature(sig.serialize_compact())
}

/// Verify a compact ECDSA signature over the double SHA-256 of `message`.
pub fn verify(message: &[u8], signature: &Signature, pubkey: &PublicKey) -> Result<(), CryptoError> {
    let key = parse_public_key(pubkey)?;
    let sig = ecdsa::Signature::from_compact(signature.as_bytes())
        .map_err(|e| CryptoError::InvalidSignature(e.to_string()))?;
    SECP256K1
        .verify_ecdsa(&digest(message), &sig, &key)
        .map_err(|_| CryptoError::SignatureVerificationFailed)
}

pub fn sign_node_announcement(info: &NodeInfo, keypair: &KeyPair) -> Signature {
    sign(&info.signing_payload(), keypair)
}

/// The announcement must be signed by the key it names.
pub fn verify_node_announcement(info: &NodeInfo) -> Result<(), CryptoError> {
    verify(&info.signing_payload(), &info.signature, &info.node_id)
}

/// The four keys that co-sign a channel announcement.
pub struct AnnouncementSigners<'a> {
    pub node_1: &'a KeyPair,
    pub node_2: &'a KeyPair,
    pub bitcoin_1: &'a KeyPair,
    pub bitcoin_2: &'a KeyPair,
}

/// Fill in all four signatures of `ann`.
pub fn sign_channel_announcement(ann: &mut ChannelAnnouncement, signers: &AnnouncementSigners<'_>) {
    let payload = ann.signing_payload();
    ann.node_signature_1 = sign(&payload, signers.node_1);
    ann.node_signature_2 = sign(&payload, signers.node_2);
    ann.bitcoin_signature_1 = sign(&payload, signers.bitcoin_1);
    ann.bitcoin_signature_2 = sign(&payload, signers.bitcoin_2);
}

/// Check all four signatures; the error names the first one that fails.
pub fn verify_channel_announcement(ann: &ChannelAnnouncement) -> Result<(), CryptoError> {
    let payload = ann.signing_payload();
    let checks: [(&'static str, &Signature, &PublicKey); 4] = [
        ("node 1", &ann.node_signature_1, &ann.node_id_1),
        ("node 2", &ann.node_signature_2, &ann.node_id_2),
        ("bitcoin 1", &ann.bitcoin_signature_1, &ann.bitcoin_key_1),
        ("bitcoin 2", &ann.bitcoin_signature_2, &ann.bitcoin_key_2),
    ];
    for (signer, sig, key) in checks {
        if let Err(e) = verify(&payload, sig, key) {
            tracing::debug!(scid = %ann.short_channel_id, signer, error = %e, "announcement signature rejected");
            return Err(CryptoError::AnnouncementSignature { signer });
        }
    }
    Ok(())
}

pub fn sign_channel_update(policy: &ChannelPolicy, keypair: &KeyPair) -> Signature {
    sign(&policy.signing_payload(), keypair)
}

/// `signer` is the endpoint the policy's direction bit names.
pub fn verify_channel_update(policy: &ChannelPolicy, signer: &NodeId) -> Result<(), CryptoError> {
    verify(&policy.signing_payload(), &policy.signature, signer)
}
