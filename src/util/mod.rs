//! Byte-level utilities shared by the emitter, font subsetter and crypto
//! modules: fixed-point number formatting, PDF string escaping, UTF-16BE
//! encoding, zlib wrappers and a small buffer pool.

pub mod hexutil;
pub mod num;
pub mod pool;
pub mod text;
pub mod zlib;
