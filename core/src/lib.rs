//! Firmware-agnostic core of the steamcl chainloader.
//!
//! Everything in this crate is pure data manipulation: UEFI scalar types
//! and status codes, raw table and protocol layouts, device-path byte
//! walking, the packed date-time stamp, the bootconf configuration store
//! and the PE32+ acceptance check. None of it calls into firmware, so all
//! of it builds and tests on a hosted target.
//!
//! The `steamcl` crate layers the actual firmware plumbing on top.
#![no_std]

extern crate alloc;

pub mod base;
pub mod config;
pub mod devpath;
pub mod error;
pub mod pe;
pub mod proto;
pub mod stamp;
pub mod table;
