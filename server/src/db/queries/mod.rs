pub mod companies;
pub mod invites;
pub mod members;
