/// Total votes a single voter identity may cast.
pub const MAX_VOTES_PER_VOTER: u32 = 3;

/// Candidate set seeded into storage on first startup.
pub const CANDIDATES: [&str; 10] = [
    "jon", "dany", "tywin", "tyrion", "bran", "robert", "stannis", "arya", "sansa", "ramsay",
];
