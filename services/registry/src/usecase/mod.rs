pub mod registration;
pub mod sweep;
pub mod team;
pub mod verification;
