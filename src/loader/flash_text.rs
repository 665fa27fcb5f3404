//! Flash text loader: whitespace-separated 2-digit hex bytes, loaded
//! starting at the flash region base.

use crate::error::{SimError, SimResult};
use crate::memory::{AddressSpace, Page, FLASH_START};

pub fn load_flash_text(mem: &mut AddressSpace, text: &str, path: &str) -> SimResult<usize> {
    let mut address = FLASH_START as u16;
    let mut loaded = 0usize;
    for token in text.split_whitespace() {
        let byte = u8::from_str_radix(token, 16).map_err(|_| SimError::Parse {
            path: path.to_string(),
            reason: format!("invalid hex byte {token:?}"),
        })?;
        mem.store_raw(Page::Page0, address, byte);
        address = address.wrapping_add(1);
        loaded += 1;
    }
    Ok(loaded)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_whitespace_separated_bytes_at_flash_base() {
        let mut mem = AddressSpace::new();
        let loaded = load_flash_text(&mut mem, "9d 9d 81\n", "fixture.txt").unwrap();
        assert_eq!(loaded, 3);
        assert_eq!(mem.load_raw(Page::Page0, FLASH_START as u16), 0x9d);
        assert_eq!(mem.load_raw(Page::Page0, FLASH_START as u16 + 2), 0x81);
    }

    #[test]
    fn rejects_malformed_token() {
        let mut mem = AddressSpace::new();
        let err = load_flash_text(&mut mem, "zz", "fixture.txt").unwrap_err();
        assert!(matches!(err, SimError::Parse { .. }));
    }
}
