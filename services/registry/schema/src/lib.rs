//! sea-orm entities for the registry database.

pub mod registrants;
pub mod teams;
pub mod verification_codes;
pub mod verified_accounts;
