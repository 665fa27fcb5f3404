//! Motorola S-record reader. Only `S1` data records carry bytes into page-0
//! code memory; `S0`/`S9` are recognized and logged, `S2`/`S3` are accepted
//! but ignored (24/32-bit addressing the firmware images never use).

use crate::error::{SimError, SimResult};
use crate::memory::{AddressSpace, Page};

fn hex_byte(s: &str, path: &str) -> SimResult<u8> {
    u8::from_str_radix(s, 16).map_err(|_| SimError::Parse {
        path: path.to_string(),
        reason: format!("invalid hex byte {s:?}"),
    })
}

fn hex_u16(s: &str, path: &str) -> SimResult<u16> {
    u16::from_str_radix(s, 16).map_err(|_| SimError::Parse {
        path: path.to_string(),
        reason: format!("invalid hex address {s:?}"),
    })
}

/// Parses `text` as a Motorola S-record stream and loads `S1` records into
/// page-0 ROM starting at their encoded address.
pub fn load_srec(mem: &mut AddressSpace, text: &str, path: &str) -> SimResult<usize> {
    let mut loaded = 0usize;
    for line in text.lines() {
        let line = line.trim();
        if line.len() < 4 {
            continue;
        }
        let record_type = &line[0..2];
        match record_type {
            "S0" => log::info!("S-record header found in {path}"),
            "S9" => log::info!("S-record trailer found in {path}"),
            "S1" => {
                if line.len() < 8 {
                    return Err(SimError::Parse {
                        path: path.to_string(),
                        reason: "S1 record shorter than header".into(),
                    });
                }
                let bytecount = hex_byte(&line[2..4], path)? as usize;
                let mut address = hex_u16(&line[4..8], path)?;
                let expected_len = 8 + bytecount * 2;
                if line.len() < expected_len {
                    return Err(SimError::Parse {
                        path: path.to_string(),
                        reason: "S1 record truncated before declared byte count".into(),
                    });
                }
                // bytecount includes the 2 address bytes and the checksum
                // byte; only the data bytes in between are loaded.
                let data_bytes = bytecount.saturating_sub(3);
                let mut cursor = 8;
                for _ in 0..data_bytes {
                    let byte = hex_byte(&line[cursor..cursor + 2], path)?;
                    mem.store_raw(Page::Page0, address, byte);
                    address = address.wrapping_add(1);
                    cursor += 2;
                    loaded += 1;
                }
            }
            "S2" | "S3" => {}
            _ => {}
        }
    }
    Ok(loaded)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_s1_record_data_bytes() {
        let mut mem = AddressSpace::new();
        // bytecount=0x13 (19): 2 addr + 16 data + 1 checksum.
        let text = "S11310009CA602B780A600B7814F5F90AE06270E5C\n";
        let loaded = load_srec(&mut mem, text, "fixture.s19").unwrap();
        assert_eq!(loaded, 16);
        assert_eq!(mem.load_raw(Page::Page0, 0x1000), 0x9c);
        assert_eq!(mem.load_raw(Page::Page0, 0x1001), 0xa6);
    }
}
