/*!

This is the long-form manual for `committee_resilience` and `resilience`.

## What is measured

An experiment samples a base approval profile, computes the committee of each rule on it
(the *baseline*), then repeatedly perturbs the profile by a small random amount and computes
the committees again. Three experiments are run on the same perturbations:

* `EXP1` the distance from the baseline committee to the new committee, for additions only
  (`ADD`), deletions only (`DEL`) and both (`MIX`).
* `EXP2` for `MIX` only: the number of committees tied under the perturbed profile and how
  close the closest of them is to the baseline.
* `EXP3` for `MIX` only: for each position in the order in which the baseline committee was
  selected, how often the candidate at that position left the committee.

The distance between two committees `A` and `B` is the number of members of `A` that are
not in `B`. It is always measured from the baseline.

## Rules

* `seqcc` sequential Chamberlin-Courant
* `seqpav` sequential proportional approval voting

Both add candidates one at a time, picking the candidate with the largest marginal score.
Ties are broken in favour of the candidate with the lowest index. The tied committees of
`EXP2` are all the committees that some other tie-breaking would produce.

## Preference models

The study is made of fifteen sampling configurations:

| name | model |
|---|---|
| `1D_0.025`, `1D_0.051`, `1D_0.078` | voters and candidates uniform on an interval, approval within the radius |
| `2D_0.134`, `2D_0.195`, `2D_0.244` | the same on a square |
| `1D+res_...`, `2D+res_...` | the same, followed by resampling of 10% of the approvals |
| `Res_0.05_0.75`, `Res_0.1_0.75`, `Res_0.15_0.75` | resampling model around a central vote |

The radii are chosen so that a voter approves about 5%, 10% and 15% of the candidates.

## Perturbations

A perturbation of size `p` changes `p` times the number of approvals of the base profile.
The sizes follow the percentage grid: 15 values between 0 and 0.1, closer to each other near
0. The changes of a size always include the changes of the smaller sizes. `MIX` takes the
first half of the additions and the first half of the deletions of each size, so it changes
about as many approvals as `ADD` or `DEL`, split between both.

If a profile has fewer addable positions than the perturbation requires, the trial fails
and so does its configuration.

## Output format

One JSON file is written per configuration, named after it (`1D_0.025.json`):

```text
{
  "seqcc": {
    "EXP1": {
      "Approval_Counts": [n, ...],            one per election
      "ADD": { "0.0": [[d, ...], ...], ... }, one list per election, one distance per iteration
      "DEL": { ... },
      "MIX": { ... }
    },
    "EXP2": {
      "Approval_Counts": [n, ...],
      "MIX": { "0.0": [[{"tied": t, "min_distance": m, "excess": e}, ...], ...], ... }
    },
    "EXP3": {
      "Approval_Counts": [n, ...],
      "MIX": { "0.0": [[c1, ..., ck], ...], ... }  one histogram per election, summed over iterations
    }
  },
  "seqpav": { ... }
}
```

`Approval_Counts` is the number of (voter, approved candidate) pairs of the base profile.
`excess` is the distance of the resolute committee minus `min_distance`.

## Configuration file

Every key is optional:

```text
{
  "numVoters": 1000,
  "numCandidates": 100,
  "committeeSize": 10,
  "numElections": 100,
  "numIterations": 100,
  "maxNumCommittees": 100,
  "percentagePower": 2.0,
  "maxPercentage": 0.1,
  "numPercentages": 15,
  "rules": ["seqcc", "seqpav"],
  "algorithm": "fastest",
  "seed": 1234,
  "outputDirectory": "jsons",
  "multiprocessing": true,
  "writeData": true,
  "threads": 8,
  "parameters": [
    {"id": "1D", "distId": "1d_interval", "euclidResample": false, "radius": 0.025, "rho": -1, "phi": -1}
  ]
}
```

Without `parameters`, the fifteen configurations above are run. Without `seed`, every run is
different.

*/
