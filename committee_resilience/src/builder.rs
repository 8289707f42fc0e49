pub use crate::config::*;
use crate::profile::{CandidateId, Profile};

/// A builder for fixed approval profiles.
///
/// Sampled profiles come from [`crate::sampler`]; the builder is meant for hand-written
/// elections such as regression scenarios.
///
/// ```
/// pub use committee_resilience::builder::ProfileBuilder;
/// # use committee_resilience::ResilienceError;
///
/// let profile = ProfileBuilder::new(5)
///     .voters(9, &[0, 1])?
///     .voter(&[0, 4])?
///     .build()?;
///
/// assert_eq!(profile.len(), 10);
///
/// # Ok::<(), ResilienceError>(())
/// ```
pub struct ProfileBuilder {
    pub(crate) _num_candidates: u32,
    pub(crate) _approvals: Vec<Vec<u32>>,
}

impl ProfileBuilder {
    pub fn new(num_candidates: u32) -> ProfileBuilder {
        ProfileBuilder {
            _num_candidates: num_candidates,
            _approvals: Vec::new(),
        }
    }

    /// Adds one voter approving the given candidate indices.
    ///
    /// Duplicated indices are approved once.
    pub fn voter(self, approved: &[u32]) -> ResilienceResult<ProfileBuilder> {
        self.voters(1, approved)
    }

    /// Adds `count` identical voters.
    pub fn voters(mut self, count: usize, approved: &[u32]) -> ResilienceResult<ProfileBuilder> {
        if let Some(c) = approved.iter().find(|c| **c >= self._num_candidates) {
            return InvalidParameterSnafu {
                detail: format!(
                    "candidate {} is outside of the universe of {} candidates",
                    c, self._num_candidates
                ),
            }
            .fail();
        }
        for _ in 0..count {
            self._approvals.push(approved.to_vec());
        }
        Ok(self)
    }

    pub fn build(self) -> ResilienceResult<Profile> {
        let mut profile = Profile::new(self._num_candidates);
        for approved in self._approvals.iter() {
            profile.add_voter(approved.iter().map(|c| CandidateId(*c)))?;
        }
        Ok(profile)
    }
}
