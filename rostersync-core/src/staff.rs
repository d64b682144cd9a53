//! Staff directory and staff-to-row assignments.
//!
//! The directory decides two things: which address a row's assigned principal maps
//! to, and which current guests are "ours" and may be removed when unassigned.

use std::collections::{BTreeMap, HashMap};

use serde::Serialize;

use crate::config::SyncConfig;
use crate::error::SyncResult;
use crate::sheet::{CellValue, SheetStore, Table};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StaffMember {
    /// Staff ID, which is the member's address.
    pub id: String,
    pub full_name: String,
    pub roles: Vec<String>,
}

impl StaffMember {
    pub fn new(id: &str, full_name: &str) -> Self {
        StaffMember {
            id: id.trim().to_lowercase(),
            full_name: full_name.to_string(),
            roles: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct StaffDirectory {
    members: BTreeMap<String, StaffMember>,
    domain: Option<String>,
    /// reference id (row id) -> staff id
    assignments: HashMap<String, String>,
}

impl StaffDirectory {
    pub fn new(domain: Option<&str>) -> Self {
        StaffDirectory {
            domain: domain
                .map(|d| d.trim().trim_start_matches('@').to_lowercase())
                .filter(|d| !d.is_empty()),
            ..Default::default()
        }
    }

    pub fn insert(&mut self, member: StaffMember) {
        self.members.insert(member.id.clone(), member);
    }

    pub fn assign(&mut self, reference_id: &str, staff_id: &str) {
        self.assignments
            .insert(reference_id.to_string(), staff_id.trim().to_lowercase());
    }

    pub fn get(&self, id: &str) -> Option<&StaffMember> {
        self.members.get(&id.trim().to_lowercase())
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Active directory member, or an address in the staff domain.
    pub fn is_known(&self, address: &str) -> bool {
        let address = address.trim().to_lowercase();
        if self.members.contains_key(&address) {
            return true;
        }
        match (&self.domain, address.rsplit_once('@')) {
            (Some(domain), Some((_, host))) => host == domain,
            _ => false,
        }
    }

    /// Address for a row's principal: the explicit cell if present, else the
    /// assignment recorded against the row id.
    pub fn resolve_principal(
        &self,
        row_id: Option<&str>,
        explicit: Option<&str>,
    ) -> Option<String> {
        let principal = explicit
            .map(str::to_string)
            .or_else(|| row_id.and_then(|id| self.assignments.get(id).cloned()))?;
        let principal = principal.trim().to_lowercase();

        if self.members.contains_key(&principal) || principal.contains('@') {
            Some(principal)
        } else {
            tracing::debug!(principal, "principal is not a known address");
            None
        }
    }

    /// Load active staff and assignments. Either tab may be absent.
    pub fn load(sheet: &dyn SheetStore, config: &SyncConfig) -> SyncResult<Self> {
        let mut directory = StaffDirectory::new(config.staff_domain.as_deref());

        if sheet.has_tab(&config.staff_tab) {
            let table = Table::read(sheet, &config.staff_tab, "staffid")?;
            let col = |name: &str| table.columns.index_of(name);
            let (id_col, name_col, roles_col, active_col) =
                (col("staffid"), col("fullname"), col("roles"), col("isactive"));

            for (_, cells) in &table.rows {
                let text = |i: Option<usize>| {
                    i.and_then(|i| cells.get(i))
                        .map(CellValue::as_text)
                        .unwrap_or_default()
                };
                let id = text(id_col);
                if id.is_empty() {
                    continue;
                }
                let active = match active_col.and_then(|i| cells.get(i)) {
                    None | Some(CellValue::Empty) => true,
                    Some(cell) => cell.as_bool(),
                };
                if !active {
                    continue;
                }

                let mut member = StaffMember::new(&id, &text(name_col));
                member.roles = text(roles_col)
                    .split(',')
                    .map(|r| r.trim().to_string())
                    .filter(|r| !r.is_empty())
                    .collect();
                directory.insert(member);
            }
        } else {
            tracing::warn!(
                tab = %config.staff_tab,
                "no staff tab; guest removal limited to staff domain"
            );
        }

        if sheet.has_tab(&config.assignments_tab) {
            let table = Table::read(sheet, &config.assignments_tab, "referenceid")?;
            let staff_col = table.columns.index_of("staffid");
            let ref_col = table.columns.index_of("referenceid");

            for (_, cells) in &table.rows {
                let get = |i: Option<usize>| i.and_then(|i| cells.get(i)).map(CellValue::as_text);
                if let (Some(reference), Some(staff)) = (get(ref_col), get(staff_col)) {
                    if !reference.is_empty() && !staff.is_empty() {
                        directory.assign(&reference, &staff);
                    }
                }
            }
        }

        tracing::info!(
            staff = directory.len(),
            assignments = directory.assignments.len(),
            "loaded staff directory"
        );
        Ok(directory)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sheet::MemorySheet;

    fn sheet() -> MemorySheet {
        MemorySheet::new()
            .with_tab(
                "Staff",
                vec![
                    vec!["Staff ID".into(), "Full Name".into(), "Roles".into(), "Is Active".into()],
                    vec![
                        "Ann@X.org".into(),
                        "Ann Lee".into(),
                        "tech, lead".into(),
                        CellValue::Bool(true),
                    ],
                    vec![
                        "bo@x.org".into(),
                        "Bo Park".into(),
                        "tech".into(),
                        CellValue::Bool(false),
                    ],
                    vec!["cy@y.org".into(), "Cy Diaz".into(), CellValue::Empty, CellValue::Empty],
                ],
            )
            .with_tab(
                "Assignments",
                vec![
                    vec![
                        "Assignment ID".into(),
                        "Staff ID".into(),
                        "Reference ID".into(),
                        "Assignment Type".into(),
                    ],
                    vec!["A1".into(), "cy@y.org".into(), "C1".into(), "course".into()],
                ],
            )
    }

    #[test]
    fn test_load_skips_inactive_staff() {
        let config = SyncConfig::default();
        let directory = StaffDirectory::load(&sheet(), &config).unwrap();
        assert_eq!(directory.len(), 2);
        assert!(directory.is_known("ann@x.org"));
        assert!(!directory.is_known("bo@x.org"));
        assert_eq!(directory.get("ANN@x.org").unwrap().roles, vec!["tech", "lead"]);
    }

    #[test]
    fn test_staff_domain_counts_as_known() {
        let directory = StaffDirectory::new(Some("@X.org"));
        assert!(directory.is_known("anyone@x.org"));
        assert!(!directory.is_known("alice@other.org"));
        assert!(!directory.is_known("not-an-address"));
    }

    #[test]
    fn test_principal_resolution() {
        let config = SyncConfig::default();
        let directory = StaffDirectory::load(&sheet(), &config).unwrap();

        assert_eq!(
            directory.resolve_principal(Some("C2"), Some("Ann@x.org ")),
            Some("ann@x.org".into())
        );
        assert_eq!(directory.resolve_principal(Some("C1"), None), Some("cy@y.org".into()));
        assert_eq!(directory.resolve_principal(Some("C9"), None), None);
        assert_eq!(directory.resolve_principal(None, Some("Ann Lee")), None);
    }

    #[test]
    fn test_missing_tabs_give_empty_directory() {
        let config = SyncConfig::default();
        let directory = StaffDirectory::load(&MemorySheet::new(), &config).unwrap();
        assert!(directory.is_empty());
    }
}
