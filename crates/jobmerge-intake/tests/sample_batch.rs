use std::path::{Path, PathBuf};

use jobmerge_core::Platform;
use jobmerge_intake::{load_batch, prepare, RejectReason, UrlPolicy};

fn sample_batch_path() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("../..")
        .join("fixtures/sample-batch/jobs.json")
}

#[test]
fn sample_batch_loads_and_prepares() {
    let batch = load_batch(sample_batch_path()).expect("load sample batch");
    assert_eq!(batch.batch_id.as_deref(), Some("sample-2026-03-01"));
    assert_eq!(batch.jobs.len(), 12);

    let intake = prepare(&batch, &UrlPolicy::default());
    assert_eq!(intake.accepted.len(), 10);
    assert_eq!(intake.rejected.len(), 2);
    assert_eq!(intake.rejected[0].id.as_deref(), Some("careerbuilder-77"));
    assert_eq!(intake.rejected[0].reason, RejectReason::MissingTitle);
    assert_eq!(intake.rejected[1].id.as_deref(), Some("unknown-board-1"));

    // "#", an expired Dice link and a missing ZipRecruiter link.
    assert_eq!(intake.repaired_urls, 3);
    let policy = UrlPolicy::default();
    assert!(intake
        .accepted
        .iter()
        .all(|job| job.url.as_deref().is_some_and(|url| policy.is_usable(url))));

    let sources: Vec<Platform> = intake.accepted.iter().map(|job| job.source).collect();
    assert_eq!(sources[0], Platform::Indeed);
    assert_eq!(sources[9], Platform::ZipRecruiter);
}
