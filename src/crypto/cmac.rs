//! Parameterized CMAC engine reproducing the firmware's five MAC modes.
//!
//! Modes 1/3/5 use standard AES-CMAC subkey derivation (`K1`/`K2` from
//! encrypting a zero block); modes 2/4 replace subkey-XOR with a
//! firmware-specific "virtual extra block" quirk when the message length is
//! a positive multiple of 16. Modes 3/5 chain a caller-supplied `prev` tag
//! into the initial running state instead of starting from zero.

use super::aes_core::{AesCore, BLOCK_SIZE};

const RB: u8 = 0x87;

fn xor_128(a: &[u8; BLOCK_SIZE], b: &[u8; BLOCK_SIZE]) -> [u8; BLOCK_SIZE] {
    let mut out = [0u8; BLOCK_SIZE];
    for i in 0..BLOCK_SIZE {
        out[i] = a[i] ^ b[i];
    }
    out
}

fn leftshift_onebit(input: &[u8; BLOCK_SIZE]) -> [u8; BLOCK_SIZE] {
    let mut out = [0u8; BLOCK_SIZE];
    let mut carry = 0u8;
    for i in (0..BLOCK_SIZE).rev() {
        out[i] = (input[i] << 1) | carry;
        carry = (input[i] & 0x80) >> 7;
    }
    out
}

fn pad(partial: &[u8], len_mod_16: usize) -> [u8; BLOCK_SIZE] {
    let mut out = [0u8; BLOCK_SIZE];
    out[..len_mod_16].copy_from_slice(&partial[..len_mod_16]);
    out[len_mod_16] = 0x80;
    out
}

/// Which of the five firmware MAC modes to reproduce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MacParam {
    /// Inbound command MAC; standard subkey derivation, zero initial state.
    Inbound = 1,
    /// Firmware quirk mode with the virtual-extra-block padding; zero
    /// initial state.
    Quirk2 = 2,
    /// Standard subkey derivation, chained from `prev`.
    Chained3 = 3,
    /// Firmware quirk mode, chained from `prev`.
    PrevQuirk4 = 4,
    /// Standard subkey derivation, chained from `prev`.
    Response5 = 5,
}

impl MacParam {
    fn uses_prev(self) -> bool {
        matches!(self, MacParam::Chained3 | MacParam::Response5)
    }

    fn is_quirk(self) -> bool {
        matches!(self, MacParam::Quirk2 | MacParam::PrevQuirk4)
    }
}

pub struct CmacEngine {
    aes: AesCore,
}

impl CmacEngine {
    pub fn new(aes: AesCore) -> Self {
        CmacEngine { aes }
    }

    fn subkeys(&self) -> ([u8; BLOCK_SIZE], [u8; BLOCK_SIZE]) {
        let l = self.aes.encrypt([0u8; BLOCK_SIZE]);
        let msb_l = l[0] & 0x80 != 0;
        let mut k1 = leftshift_onebit(&l);
        if msb_l {
            k1[BLOCK_SIZE - 1] ^= RB;
        }
        let msb_k1 = k1[0] & 0x80 != 0;
        let mut k2 = leftshift_onebit(&k1);
        if msb_k1 {
            k2[BLOCK_SIZE - 1] ^= RB;
        }
        (k1, k2)
    }

    /// Computes the 16-byte tag for `input[..length]` under `param`. `prev`
    /// is the chained tag from a previous call; ignored by modes that don't
    /// use it.
    pub fn sign(
        &self,
        param: MacParam,
        input: &[u8],
        length: usize,
        prev: [u8; BLOCK_SIZE],
    ) -> [u8; BLOCK_SIZE] {
        assert!(input.len() >= length, "input shorter than declared length");

        let complete = length > 0 && length % BLOCK_SIZE == 0;
        let mut n = if length == 0 { 1 } else { (length + BLOCK_SIZE - 1) / BLOCK_SIZE };
        let extra_block = param.is_quirk() && complete;
        if extra_block {
            n += 1;
        }

        let mut x = if param.uses_prev() { prev } else { [0u8; BLOCK_SIZE] };

        for i in 0..n - 1 {
            let block: [u8; BLOCK_SIZE] =
                input[i * BLOCK_SIZE..(i + 1) * BLOCK_SIZE].try_into().unwrap();
            x = self.aes.encrypt(xor_128(&x, &block));
        }

        let m_last = if extra_block {
            let mut v = [0u8; BLOCK_SIZE];
            v[0] = 0x80;
            v
        } else if param.is_quirk() {
            // !complete, quirk modes: no subkey, just the padded partial block.
            pad(&input[(n - 1) * BLOCK_SIZE..length], length % BLOCK_SIZE)
        } else {
            let (k1, k2) = self.subkeys();
            if complete {
                let last: [u8; BLOCK_SIZE] =
                    input[(n - 1) * BLOCK_SIZE..n * BLOCK_SIZE].try_into().unwrap();
                xor_128(&last, &k1)
            } else {
                let partial = pad(&input[(n - 1) * BLOCK_SIZE..length], length % BLOCK_SIZE);
                xor_128(&partial, &k2)
            }
        };

        self.aes.encrypt(xor_128(&x, &m_last))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::aes_core::AesCore;

    // NIST SP 800-38B AES-128 CMAC test vectors (example 1 & 2), which
    // exercise the standard subkey-derivation path (param 1) with a zero
    // `prev` — the firmware's inbound-MAC mode is plain AES-CMAC.
    const KEY: [u8; 16] = [
        0x2b, 0x7e, 0x15, 0x16, 0x28, 0xae, 0xd2, 0xa6, 0xab, 0xf7, 0x15, 0x88, 0x09, 0xcf, 0x4f,
        0x3c,
    ];

    fn engine() -> CmacEngine {
        CmacEngine::new(AesCore::new(&KEY))
    }

    #[test]
    fn empty_message_matches_nist_vector() {
        let e = engine();
        let tag = e.sign(MacParam::Inbound, &[], 0, [0u8; 16]);
        let expected: [u8; 16] = [
            0xbb, 0x1d, 0x69, 0x29, 0xe9, 0x59, 0x37, 0x28, 0x7f, 0xa3, 0x7d, 0x12, 0x9b, 0x75,
            0x67, 0x46,
        ];
        assert_eq!(tag, expected);
    }

    #[test]
    fn sixteen_byte_message_matches_nist_vector() {
        let msg: [u8; 16] = [
            0x6b, 0xc1, 0xbe, 0xe2, 0x2e, 0x40, 0x9f, 0x96, 0xe9, 0x3d, 0x7e, 0x11, 0x73, 0x93,
            0x17, 0x2a,
        ];
        let e = engine();
        let tag = e.sign(MacParam::Inbound, &msg, 16, [0u8; 16]);
        let expected: [u8; 16] = [
            0x07, 0x0a, 0x16, 0xb4, 0x6b, 0x4d, 0x41, 0x44, 0xf7, 0x9b, 0xdd, 0x9d, 0xd0, 0x4a,
            0x28, 0x7c,
        ];
        assert_eq!(tag, expected);
    }

    #[test]
    fn quirk_mode_appends_virtual_block_on_exact_multiple() {
        let e = engine();
        let full_block = [0x11u8; 16];
        let with_extra = e.sign(MacParam::Quirk2, &full_block, 16, [0u8; 16]);
        // Sanity: quirk mode on a full block must differ from standard
        // mode 1 on the same input, since it pads an extra virtual block
        // rather than XORing K1 into the final block.
        let standard = e.sign(MacParam::Inbound, &full_block, 16, [0u8; 16]);
        assert_ne!(with_extra, standard);
    }

    #[test]
    fn chained_mode_depends_on_prev() {
        let e = engine();
        let msg = [0x22u8; 8];
        let a = e.sign(MacParam::Response5, &msg, 8, [0u8; 16]);
        let b = e.sign(MacParam::Response5, &msg, 8, [0xffu8; 16]);
        assert_ne!(a, b);
    }
}
