use crate::study::*;
use committee_resilience::*;
use log::{debug, info, warn};
use snafu::prelude::*;

use serde_json::json;
use serde_json::Map as JSMap;
use serde_json::Value as JSValue;
use std::fs;
use std::path::{Path, PathBuf};
use text_diff::print_diff;

/// One entry per percentage tier, keyed by the printed percentage.
fn by_tier<F>(acc: &ResultAccumulator, f: F) -> JSMap<String, JSValue>
where
    F: Fn(usize) -> JSValue,
{
    let grid = acc.percentages();
    (0..grid.len()).map(|t| (grid.label(t), f(t))).collect()
}

/// The nested layout of the result files: rule, then experiment, then operation or
/// metric, then percentage tier.
pub fn accumulator_to_json(acc: &ResultAccumulator) -> JSValue {
    let approval_counts = json!(acc.approval_counts());
    let mut rules: JSMap<String, JSValue> = JSMap::new();
    for rule in acc.rules() {
        let series = match acc.rule_series(rule) {
            Some(s) => s,
            None => continue,
        };

        let mut exp1: JSMap<String, JSValue> = JSMap::new();
        exp1.insert("Approval_Counts".to_string(), approval_counts.clone());
        for op in Operation::ALL {
            let distances = by_tier(acc, |t| json!(series.distances(op, t)));
            exp1.insert(op.id().to_string(), JSValue::Object(distances));
        }

        let exp2 = json!({
            "Approval_Counts": approval_counts.clone(),
            "MIX": by_tier(acc, |t| json!(series.ties(t))),
        });
        let exp3 = json!({
            "Approval_Counts": approval_counts.clone(),
            "MIX": by_tier(acc, |t| json!(series.replacements(t))),
        });

        rules.insert(
            rule.id().to_string(),
            json!({"EXP1": exp1, "EXP2": exp2, "EXP3": exp3}),
        );
    }
    JSValue::Object(rules)
}

pub fn result_path(dir: &Path, stem: &str) -> PathBuf {
    dir.join(format!("{}.json", stem))
}

/// Writes `<dir>/<stem>.json`, creating the directory if needed.
pub fn write_json(dir: &Path, stem: &str, js: &JSValue) -> StudyResult<PathBuf> {
    let path = result_path(dir, stem);
    let path_str = path.display().to_string();
    fs::create_dir_all(dir).context(WritingFileSnafu {
        path: dir.display().to_string(),
    })?;
    let pretty = serde_json::to_string_pretty(js).context(ParsingJsonSnafu {
        path: path_str.clone(),
    })?;
    fs::write(&path, pretty).context(WritingFileSnafu { path: path_str })?;
    info!("Wrote {}", path.display());
    Ok(path)
}

pub fn read_json(path: &Path) -> StudyResult<JSValue> {
    let path_str = path.display().to_string();
    let contents = fs::read_to_string(path).context(OpeningFileSnafu {
        path: path_str.clone(),
    })?;
    let js: JSValue =
        serde_json::from_str(contents.as_str()).context(ParsingJsonSnafu { path: path_str })?;
    Ok(js)
}

/// Compares the pretty-printed results with the file of the same name in the reference
/// directory, and prints the differences.
pub fn compare_with_reference(reference_dir: &Path, stem: &str, js: &JSValue) -> StudyResult<()> {
    let path = result_path(reference_dir, stem);
    let path_str = path.display().to_string();
    let reference = read_json(&path)?;
    debug!("compare_with_reference: read {}", path_str);
    let pretty_ref = serde_json::to_string_pretty(&reference).context(ParsingJsonSnafu {
        path: path_str.clone(),
    })?;
    let pretty = serde_json::to_string_pretty(js).context(ParsingJsonSnafu {
        path: path_str.clone(),
    })?;
    if pretty_ref != pretty {
        warn!("Found differences with the reference file {}", path_str);
        print_diff(pretty_ref.as_str(), pretty.as_ref(), "\n");
        return ReferenceMismatchSnafu { path: path_str }.fail();
    }
    info!("{} matches the reference", stem);
    Ok(())
}
