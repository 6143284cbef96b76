pub mod patterns;
pub mod text;
