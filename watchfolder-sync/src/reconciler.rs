//! Reconciler: diff the state record against the directory listing.
//!
//! | prior entry         | current mtime | upload? | proposed | revert to     |
//! |---------------------|---------------|---------|----------|---------------|
//! | absent / never      | `t`           | yes     | `t`      | never tracked |
//! | `t`                 | `t`           | no      | `t`      | -             |
//! | `t0`                | `t1 != t0`    | yes     | `t1`     | `t0`          |
//! | `t0` (file deleted) | -             | no      | `t0`     | -             |
//!
//! [`diff`] is a pure function of its inputs.

use watchfolder_core::types::{DirectoryListing, StateMapping, Tracked, UploadPlan, UploadTask};

/// Compute the upload plan and the proposed next mapping.
///
/// The proposed mapping optimistically records every scheduled file at its
/// current mtime; [`crate::upload::execute`] reverts entries whose upload fails.
pub fn diff(prior: &StateMapping, current: &DirectoryListing) -> (UploadPlan, StateMapping) {
    let mut proposed = prior.clone();
    let mut plan = UploadPlan::new();

    for (name, &modified) in &current.files {
        let revert_to = match prior.get(name) {
            Some(Tracked::At(recorded)) if *recorded == modified => continue,
            Some(Tracked::At(recorded)) => Tracked::At(*recorded),
            Some(Tracked::NeverTracked) | None => Tracked::NeverTracked,
        };

        proposed.insert(name.clone(), Tracked::At(modified));
        plan.push(UploadTask {
            file_name: name.clone(),
            full_path: current.full_path(name),
            revert_to,
        });
    }

    (plan, proposed)
}
