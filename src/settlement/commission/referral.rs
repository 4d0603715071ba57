//! Referral forest and the bounded ancestor walk.

use std::collections::{HashMap, HashSet};

use tracing::warn;

use crate::settlement::domain::{DriverId, ReferralLink};

/// Recruit → recruiter edges from the active links. Admin tooling is meant
/// to keep this a forest; the walk still guards against cycles so one bad
/// edit cannot hang a settlement run.
#[derive(Debug, Default)]
pub struct ReferralForest {
    recruiter_of: HashMap<DriverId, DriverId>,
}

impl ReferralForest {
    pub fn from_links(links: &[ReferralLink]) -> Self {
        let mut recruiter_of = HashMap::new();
        for link in links.iter().filter(|l| l.active) {
            if link.recruiter == link.recruit {
                warn!(driver = %link.recruit, "ignoring self-referral link");
                continue;
            }
            if let Some(previous) =
                recruiter_of.insert(link.recruit.clone(), link.recruiter.clone())
            {
                if previous != link.recruiter {
                    warn!(
                        recruit = %link.recruit,
                        kept = %link.recruiter,
                        dropped = %previous,
                        "recruit has multiple active recruiters; keeping the last link"
                    );
                }
            }
        }
        Self { recruiter_of }
    }

    /// Ancestors of `driver` as `(ancestor, level)` pairs, level 1 being the
    /// direct recruiter, walking at most `max_levels` up. Stops early on a
    /// cycle instead of revisiting.
    pub fn ancestors(&self, driver: &DriverId, max_levels: u8) -> Vec<(DriverId, u8)> {
        let mut out = Vec::new();
        let mut seen: HashSet<&DriverId> = HashSet::new();
        seen.insert(driver);

        let mut current = driver;
        for level in 1..=max_levels {
            let Some(recruiter) = self.recruiter_of.get(current) else {
                break;
            };
            if !seen.insert(recruiter) {
                warn!(driver = %driver, at = %recruiter, "referral cycle detected; truncating walk");
                break;
            }
            out.push((recruiter.clone(), level));
            current = recruiter;
        }
        out
    }
}
