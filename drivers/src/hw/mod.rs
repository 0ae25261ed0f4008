//! Register maps.

pub mod litex;
