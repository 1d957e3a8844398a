pub mod assemble;
pub mod backup;
pub mod credentials;
