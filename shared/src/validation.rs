use crate::error::VotingError;

pub const MAX_VOTER_ID_LENGTH: usize = 100;
pub const MAX_CANDIDATE_ID_LENGTH: usize = 50;

/// Trims the supplied identity and rejects empty or oversized ids.
pub fn validate_voter_id(voter_id: Option<&str>) -> Result<&str, VotingError> {
    let id = voter_id.map(str::trim).unwrap_or_default();
    if id.is_empty() || id.len() > MAX_VOTER_ID_LENGTH {
        return Err(VotingError::InvalidVoter);
    }
    Ok(id)
}

/// Only shape is checked here; membership is decided by storage.
pub fn validate_candidate_id(candidate_id: Option<&str>) -> Result<&str, VotingError> {
    let id = candidate_id.map(str::trim).unwrap_or_default();
    if id.is_empty() || id.len() > MAX_CANDIDATE_ID_LENGTH {
        return Err(VotingError::UnknownCandidate(id.to_string()));
    }
    Ok(id)
}
