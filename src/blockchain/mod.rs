pub mod bitcoin;
pub mod traits;
