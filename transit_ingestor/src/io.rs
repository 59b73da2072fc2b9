//! Serialization of canonical models for staging and inspection.

pub mod csv;
