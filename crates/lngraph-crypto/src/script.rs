use lngraph_core::{ChannelAnnouncement, PublicKey, TxOut};

use crate::hashing::sha256;

const OP_0: u8 = 0x00;
const OP_2: u8 = 0x52;
const OP_PUSHBYTES_32: u8 = 0x20;
const OP_PUSHBYTES_33: u8 = 0x21;
const OP_CHECKMULTISIG: u8 = 0xae;

/// `2 <key_lo> <key_hi> 2 OP_CHECKMULTISIG`, keys in lexicographic order.
pub fn funding_redeem_script(key_a: &PublicKey, key_b: &PublicKey) -> Vec<u8> {
    let (lo, hi) = if key_a <= key_b {
        (key_a, key_b)
    } else {
        (key_b, key_a)
    };
    let mut script = Vec::with_capacity(71);
    script.push(OP_2);
    script.push(OP_PUSHBYTES_33);
    script.extend_from_slice(lo.as_bytes());
    script.push(OP_PUSHBYTES_33);
    script.extend_from_slice(hi.as_bytes());
    script.push(OP_2);
    script.push(OP_CHECKMULTISIG);
    script
}

/// P2WSH output script paying to the 2-of-2 funding redeem script.
pub fn funding_script_pubkey(key_a: &PublicKey, key_b: &PublicKey) -> Vec<u8> {
    let witness_program = sha256(&funding_redeem_script(key_a, key_b));
    let mut script = Vec::with_capacity(34);
    script.push(OP_0);
    script.push(OP_PUSHBYTES_32);
    script.extend_from_slice(&witness_program);
    script
}

/// Whether `output` is the funding output the announcement's bitcoin keys commit to.
pub fn matches_funding_output(ann: &ChannelAnnouncement, output: &TxOut) -> bool {
    output.script_pubkey == funding_script_pubkey(&ann.bitcoin_key_1, &ann.bitcoin_key_2)
}
