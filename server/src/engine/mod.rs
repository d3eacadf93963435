pub mod company;
pub mod directory;
pub mod error;
pub mod events;
pub mod influence;
pub mod leaderboard;
pub mod membership;
pub mod validation;
pub mod war_resolver;

#[cfg(test)]
pub(crate) mod test_support;
