// Crew portal access: one pluggable backend per airline behind a common trait.

pub mod netline;
pub mod registry;
pub mod retry;
pub mod roster;
pub mod traits;
