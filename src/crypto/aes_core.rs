//! AES-128 ECB single-block encryption, delegated to RustCrypto's `aes`
//! crate rather than a hand-rolled S-box/round-key table.

use aes::cipher::{generic_array::GenericArray, BlockEncrypt, KeyInit};
use aes::Aes128;

pub const BLOCK_SIZE: usize = 16;
pub const KEY_SIZE: usize = 16;

/// A fixed AES-128 key, encapsulated so callers never see the raw cipher
/// type and can't accidentally mix key sizes.
pub struct AesCore {
    cipher: Aes128,
}

impl AesCore {
    pub fn new(key: &[u8; KEY_SIZE]) -> Self {
        AesCore { cipher: Aes128::new(GenericArray::from_slice(key)) }
    }

    /// Encrypts one 16-byte block in place (ECB: no chaining, caller
    /// supplies the already-XORed input block).
    pub fn encrypt_block(&self, block: &mut [u8; BLOCK_SIZE]) {
        let mut ga = *GenericArray::from_slice(block);
        self.cipher.encrypt_block(&mut ga);
        block.copy_from_slice(ga.as_slice());
    }

    pub fn encrypt(&self, block: [u8; BLOCK_SIZE]) -> [u8; BLOCK_SIZE] {
        let mut out = block;
        self.encrypt_block(&mut out);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // FIPS-197 AES-128 test vector.
    #[test]
    fn fips197_test_vector() {
        let key: [u8; 16] = [
            0x00, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08, 0x09, 0x0a, 0x0b, 0x0c, 0x0d,
            0x0e, 0x0f,
        ];
        let plaintext: [u8; 16] = [
            0x00, 0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x77, 0x88, 0x99, 0xaa, 0xbb, 0xcc, 0xdd,
            0xee, 0xff,
        ];
        let expected: [u8; 16] = [
            0x69, 0xc4, 0xe0, 0xd8, 0x6a, 0x7b, 0x04, 0x30, 0xd8, 0xcd, 0xb7, 0x80, 0x70, 0xb4,
            0xc5, 0x5a,
        ];
        let core = AesCore::new(&key);
        assert_eq!(core.encrypt(plaintext), expected);
    }
}
