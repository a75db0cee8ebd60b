pub mod hash;
pub mod secret;
pub mod track;
