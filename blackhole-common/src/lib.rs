#![cfg_attr(not(any(test, feature = "std")), no_std)]

pub mod address;
pub mod classify;
pub mod frame;
pub mod whitelist;
