pub mod hd;
pub mod kdf;
pub mod sjcl;
