pub mod dec_float;
pub mod fix64;
pub mod text;

pub use dec_float::DecFloat;
pub use fix64::Fix64;
