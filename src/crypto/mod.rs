//! Cryptographic core: AES-128 block encryption and the firmware-specific
//! CMAC engine built on top of it.

pub mod aes_core;
pub mod cmac;

pub use aes_core::AesCore;
pub use cmac::{CmacEngine, MacParam};
