pub mod analysis;
pub mod score;
pub mod signals;
