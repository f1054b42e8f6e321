//! Role -> privilege table.
//!
//! Privileges are never stored. They are looked up here from the role name,
//! and an unknown role simply has none.

use mdk_schemas::{Privilege, User, UserRecord};

const NURSE: &[Privilege] = &[Privilege::Create];
const PLUMBER: &[Privilege] = &[Privilege::Respond];
const ELECTRICIAN: &[Privilege] = &[Privilege::Respond, Privilege::Escalate];
const DEAN: &[Privilege] = &[Privilege::Approve, Privilege::Escalate, Privilege::Monitor];

pub fn privileges_for(role: &str) -> &'static [Privilege] {
    match role {
        "Nurse" => NURSE,
        "Plumber" => PLUMBER,
        "Electrician" => ELECTRICIAN,
        "Dean" => DEAN,
        _ => &[],
    }
}

pub fn privilege_names(role: &str) -> Vec<&'static str> {
    privileges_for(role).iter().map(Privilege::as_str).collect()
}

/// Served view of a stored user, privileges filled in from the table.
pub fn user_view(record: UserRecord) -> User {
    let privileges = privileges_for(record.role.as_str()).to_vec();
    User {
        user_id: record.user_id,
        phone: record.phone,
        role: record.role,
        privileges,
    }
}
