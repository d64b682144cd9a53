//! Guest reconciliation shared by the diff and commit engines.

use std::collections::BTreeSet;

use serde::Serialize;

use crate::staff::StaffDirectory;

/// Addresses to add and remove, lowercased and sorted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GuestMerge {
    pub to_add: BTreeSet<String>,
    pub to_remove: BTreeSet<String>,
}

impl GuestMerge {
    pub fn is_empty(&self) -> bool {
        self.to_add.is_empty() && self.to_remove.is_empty()
    }

    /// The guest list after applying this merge to `current`.
    pub fn apply(&self, current: &BTreeSet<String>) -> BTreeSet<String> {
        current
            .iter()
            .map(|g| g.to_lowercase())
            .filter(|g| !self.to_remove.contains(g))
            .chain(self.to_add.iter().cloned())
            .collect()
    }
}

/// Add what's desired and missing; remove what's present and undesired, but only
/// when the directory recognizes it as staff. Outside invitees are never removed.
pub fn merge_guests(
    desired: &BTreeSet<String>,
    current: &BTreeSet<String>,
    directory: &StaffDirectory,
) -> GuestMerge {
    let desired: BTreeSet<String> = desired.iter().map(|g| g.trim().to_lowercase()).collect();
    let current: BTreeSet<String> = current.iter().map(|g| g.trim().to_lowercase()).collect();

    GuestMerge {
        to_add: desired.difference(&current).cloned().collect(),
        to_remove: current
            .difference(&desired)
            .filter(|g| directory.is_known(g))
            .cloned()
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::staff::StaffMember;
    use proptest::prelude::*;

    fn set(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn directory() -> StaffDirectory {
        let mut directory = StaffDirectory::new(Some("x.org"));
        directory.insert(StaffMember::new("cy@y.org", "Cy Diaz"));
        directory
    }

    #[test]
    fn test_adds_missing_desired_guest() {
        let merge = merge_guests(&set(&["Alice@x.org"]), &set(&["bob@z.com"]), &directory());
        assert_eq!(merge.to_add, set(&["alice@x.org"]));
        assert!(merge.to_remove.is_empty());
    }

    #[test]
    fn test_removes_only_known_staff() {
        let merge = merge_guests(
            &set(&["alice@x.org"]),
            &set(&["alice@x.org", "old@x.org", "CY@y.org", "parent@gmail.com"]),
            &directory(),
        );
        assert!(merge.to_add.is_empty());
        assert_eq!(merge.to_remove, set(&["cy@y.org", "old@x.org"]));
    }

    #[test]
    fn test_apply() {
        let current = set(&["old@x.org", "parent@gmail.com"]);
        let merge = merge_guests(&set(&["alice@x.org"]), &current, &directory());
        assert_eq!(merge.apply(&current), set(&["alice@x.org", "parent@gmail.com"]));
    }

    fn address() -> impl Strategy<Value = String> {
        (
            prop::sample::select(vec!["ann", "bo", "cy", "dee"]),
            prop::sample::select(vec!["x.org", "y.org", "gmail.com"]),
            any::<bool>(),
        )
            .prop_map(|(user, host, upper)| {
                let addr = format!("{user}@{host}");
                if upper { addr.to_uppercase() } else { addr }
            })
    }

    proptest! {
        #[test]
        fn merge_is_deterministic_and_never_drops_outsiders(
            desired in prop::collection::btree_set(address(), 0..4),
            current in prop::collection::btree_set(address(), 0..6),
        ) {
            let dir = directory();
            let preview = merge_guests(&desired, &current, &dir);
            let commit = merge_guests(&desired, &current, &dir);
            prop_assert_eq!(&preview, &commit);

            for removed in &preview.to_remove {
                prop_assert!(dir.is_known(removed));
            }

            let after = preview.apply(&current);
            for wanted in &desired {
                prop_assert!(after.contains(&wanted.to_lowercase()));
            }
            for guest in &current {
                let guest = guest.to_lowercase();
                if !dir.is_known(&guest) {
                    prop_assert!(after.contains(&guest));
                }
            }
        }
    }
}
