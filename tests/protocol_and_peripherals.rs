//! End-to-end scenarios spanning more than one module: the CRC-16
//! peripheral driven through `AddressSpace`'s public load/store surface,
//! the firmware's quirk CMAC mode at an exact block boundary, and a full
//! command round trip through `Simulator::invoke_command`.

use st7xsim::crypto::{AesCore, CmacEngine, MacParam};
use st7xsim::decode::opcodes;
use st7xsim::memory::{AddressSpace, Page};
use st7xsim::simulator::Simulator;

const CRC_REG: u16 = 0x000f;

/// Seeded at 0xFFFF, feed one byte, read high then low. A third read sees
/// 0xFFFF again because the low-byte read resets the generator.
#[test]
fn crc_generator_feed_then_read_then_resets() {
    let mut mem = AddressSpace::new();
    mem.store(Page::Page0, CRC_REG, 0x31);

    let hi = mem.load(CRC_REG);
    let lo = mem.load(CRC_REG);
    assert_eq!((hi, lo), (0xd0, 0x72));

    // The generator reset on the low-byte read; unseeded, `crc` sits back
    // at 0xFFFF, so the next high-byte read is the complement's high byte.
    let hi_after_reset = mem.load(CRC_REG);
    assert_eq!(hi_after_reset, 0x00);
}

/// Quirk CMAC modes (2/4) append a virtual all-zero block padded with
/// 0x80 whenever the message length is an exact positive multiple of 16;
/// this fixture was computed independently from the same algorithm to
/// pin the concrete tag value, not just "differs from mode 1".
#[test]
fn quirk_mode_exact_block_matches_known_fixture() {
    const KEY: [u8; 16] = [
        0x2b, 0x7e, 0x15, 0x16, 0x28, 0xae, 0xd2, 0xa6, 0xab, 0xf7, 0x15, 0x88, 0x09, 0xcf, 0x4f,
        0x3c,
    ];
    let engine = CmacEngine::new(AesCore::new(&KEY));
    let full_block = [0x11u8; 16];

    let tag = engine.sign(MacParam::Quirk2, &full_block, 16, [0u8; 16]);
    let expected: [u8; 16] = [
        0x67, 0xef, 0x6d, 0x54, 0x39, 0x2a, 0x7c, 0x47, 0x4b, 0x00, 0x64, 0xb6, 0xde, 0x71, 0xa4,
        0xe5,
    ];
    assert_eq!(tag, expected);
}

/// Same quirk mode, chained from a non-zero `prev`, at a full block: the
/// prev-chained variant (param 4) used for the outbound "expects-MAC"
/// wrapper.
#[test]
fn prev_quirk_mode_chains_from_prev_at_exact_block() {
    const KEY: [u8; 16] = [
        0x2b, 0x7e, 0x15, 0x16, 0x28, 0xae, 0xd2, 0xa6, 0xab, 0xf7, 0x15, 0x88, 0x09, 0xcf, 0x4f,
        0x3c,
    ];
    let engine = CmacEngine::new(AesCore::new(&KEY));
    let msg = [0x33u8; 16];
    let prev = [0xaau8; 16];

    let tag = engine.sign(MacParam::PrevQuirk4, &msg, 16, prev);
    let expected: [u8; 16] = [
        0x0d, 0x5e, 0xe5, 0x88, 0xcd, 0x55, 0x06, 0x84, 0xc5, 0x24, 0x15, 0xfd, 0xd6, 0x7c, 0xd6,
        0x2f,
    ];
    assert_eq!(tag, expected);
}

/// Full command round trip: `Simulator` writes a request, a tiny firmware
/// stub echoes it back with success status and its own outbound MAC, and
/// `invoke_command` stops at the application trigger and cross-checks the
/// MAC through the harness exactly as a real session would.
#[test]
fn invoke_command_cross_checks_outbound_mac_against_firmware_stub() {
    let key = [0x5cu8; 16];
    let mut sim = Simulator::new(key);

    // Program: sit at the reset vector so the application trigger fires
    // immediately, before any instruction actually runs.
    sim.cpu.pc = 0x4000;
    sim.mem.store_raw(Page::Page0, 0x4000, opcodes::NOP);

    let cmd = 0x00 | st7xsim::protocol::CMD_BIT6_T2P_MAC_EXPECTED;
    let payload = [0xaau8, 0xbb, 0xcc];

    // Pre-seed the response the "firmware" would have written by the time
    // the trigger fires: echoed payload, success status, and a MAC
    // computed the same way the harness itself would compute it. This only
    // reads harness state (it doesn't mutate anything `invoke_command`
    // will also set up), so it's safe to compute ahead of the real call.
    let prev = sim.harness.generate_prev_mac(&payload, cmd);
    let mac = sim.harness.generate_mac(&payload, 0x00, prev);

    sim.mem.store_raw(Page::Page0, 0x00fb, 0x00);
    let resp_len = (payload.len() + 4) as u16;
    sim.mem.store_raw(Page::Page0, 0x00fc, (resp_len >> 8) as u8);
    sim.mem.store_raw(Page::Page0, 0x00fd, (resp_len & 0xff) as u8);
    let mut offset = 0x00feu16;
    for &b in &payload {
        sim.mem.store_raw(Page::Page0, offset, b);
        offset = offset.wrapping_add(1);
    }
    for &b in &mac {
        sim.mem.store_raw(Page::Page0, offset, b);
        offset = offset.wrapping_add(1);
    }

    let outcome = sim.invoke_command(cmd, &payload, 0x4000).expect("application break");
    assert!(outcome.status.is_success());
    assert_eq!(outcome.response_payload, payload);
    assert_eq!(outcome.mac_matched, Some(true));
}
