pub mod error;
pub mod hashing;
pub mod keys;
pub mod script;
pub mod signing;

pub use error::CryptoError;
pub use hashing::{announcement_digest, double_sha256, sha256, Hash};
pub use keys::{parse_public_key, KeyPair};
pub use script::{funding_redeem_script, funding_script_pubkey, matches_funding_output};
pub use signing::{
    sign, sign_channel_announcement, sign_channel_update, sign_node_announcement, verify,
    verify_channel_announcement, verify_channel_update, verify_node_announcement,
    AnnouncementSigners,
};
