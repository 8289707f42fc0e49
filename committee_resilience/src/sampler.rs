//! Sampling of the base approval profile of a trial.

use log::debug;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::config::*;
use crate::profile::{CandidateId, Profile};

type Point = [f64; 2];

fn random_point<R: Rng + ?Sized>(rng: &mut R, distribution: PointDistribution) -> Point {
    match distribution {
        PointDistribution::Interval => [rng.gen_range(-0.5..0.5), 0.0],
        PointDistribution::Square => [rng.gen_range(-0.5..0.5), rng.gen_range(-0.5..0.5)],
        PointDistribution::Disc => loop {
            let p = [rng.gen_range(-0.5..0.5), rng.gen_range(-0.5..0.5)];
            if p[0] * p[0] + p[1] * p[1] <= 0.25 {
                break p;
            }
        },
    }
}

fn euclidean(p: &Point, q: &Point) -> f64 {
    ((p[0] - q[0]).powi(2) + (p[1] - q[1]).powi(2)).sqrt()
}

/// Voter-candidate-range profile: voters and candidates are placed independently according
/// to `distribution`, and a voter approves a candidate iff their distance is at most
/// `voter_radius + candidate_radius`.
pub fn random_vcr_profile<R: Rng + ?Sized>(
    rng: &mut R,
    num_voters: usize,
    num_candidates: u32,
    distribution: PointDistribution,
    voter_radius: f64,
    candidate_radius: f64,
) -> ResilienceResult<Profile> {
    let voter_points: Vec<Point> = (0..num_voters)
        .map(|_| random_point(rng, distribution))
        .collect();
    let candidate_points: Vec<Point> = (0..num_candidates)
        .map(|_| random_point(rng, distribution))
        .collect();

    let mut profile = Profile::new(num_candidates);
    for vp in voter_points.iter() {
        let approved = candidate_points
            .iter()
            .enumerate()
            .filter(|(_, cp)| euclidean(vp, cp) <= voter_radius + candidate_radius)
            .map(|(idx, _)| CandidateId(idx as u32));
        profile.add_voter(approved)?;
    }
    Ok(profile)
}

/// Resampling model: every voter starts from the central vote made of the first
/// `floor(rho * num_candidates)` candidates, and each of their approvals is independently
/// redrawn with probability `phi` (approved with probability `rho`).
pub fn random_resampling_profile<R: Rng + ?Sized>(
    rng: &mut R,
    num_voters: usize,
    num_candidates: u32,
    rho: f64,
    phi: f64,
) -> ResilienceResult<Profile> {
    let central_size = (rho * num_candidates as f64) as u32;
    let mut profile = Profile::new(num_candidates);
    for _ in 0..num_voters {
        let mut approved: Vec<CandidateId> = Vec::new();
        for c in 0..num_candidates {
            let approves = if rng.gen::<f64>() < phi {
                rng.gen::<f64>() < rho
            } else {
                c < central_size
            };
            if approves {
                approved.push(CandidateId(c));
            }
        }
        profile.add_voter(approved)?;
    }
    Ok(profile)
}

/// Redraws each (voter, candidate) approval with probability `phi`.
///
/// A redrawn pair is approved with probability `|approved(v)| / num_candidates`, where the
/// rate is taken from the voter's approvals before any of their pairs is redrawn.
/// The generator is forked from `rng`, so every call uses its own stream.
pub fn resample_profile<R: Rng + ?Sized>(
    rng: &mut R,
    profile: &mut Profile,
    phi: f64,
) -> ResilienceResult<()> {
    let mut local = StdRng::from_rng(rng).map_err(|e| ResilienceError::InvalidParameter {
        detail: format!("cannot fork the random generator: {}", e),
    })?;
    let num_candidates = profile.num_candidates();
    if num_candidates == 0 {
        return Ok(());
    }
    for voter in profile.voters_mut().iter_mut() {
        let v_rho = voter.num_approved() as f64 / num_candidates as f64;
        for c in 0..num_candidates as u32 {
            if local.gen::<f64>() < phi {
                if local.gen::<f64>() < v_rho {
                    voter.approve(CandidateId(c));
                } else {
                    voter.disapprove(CandidateId(c));
                }
            }
        }
    }
    Ok(())
}

/// Samples the base profile of one trial.
pub fn sample_election<R: Rng + ?Sized>(
    rng: &mut R,
    config: &ExperimentConfig,
    params: &SamplingParameters,
) -> ResilienceResult<Profile> {
    let num_candidates = config.num_candidates as u32;
    let profile = match params {
        SamplingParameters::OneD(sp) | SamplingParameters::TwoD(sp) => {
            let mut profile = random_vcr_profile(
                rng,
                config.num_voters,
                num_candidates,
                sp.distribution,
                sp.radius,
                0.0,
            )?;
            if let Some(phi) = sp.resample_phi {
                resample_profile(rng, &mut profile, phi)?;
            }
            profile
        }
        SamplingParameters::Resampling(rp) => {
            random_resampling_profile(rng, config.num_voters, num_candidates, rp.rho, rp.phi)?
        }
    };
    debug!(
        "sample_election: {}: {} voters, {} approvals",
        params.file_stem(),
        profile.len(),
        profile.num_approvals()
    );
    Ok(profile)
}
