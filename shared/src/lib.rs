pub mod candidates;
pub mod error;
pub mod identity;
pub mod models;
pub mod validation;

pub use candidates::{CANDIDATES, MAX_VOTES_PER_VOTER};
pub use error::{ErrorCode, ErrorResponse, Result, VotingError};
pub use identity::*;
pub use models::*;
pub use validation::*;
