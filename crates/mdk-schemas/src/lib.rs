//! mdk-schemas
//!
//! Wire and storage shapes shared by every MemoDesk crate: memos, drafts,
//! patches, filters, snapshots, users, and the error taxonomy.
//!
//! No IO and no business rules beyond draft normalization and patch merge.

mod error;
mod memo;
mod user;

pub use error::MemoError;
pub use memo::{
    Memo, MemoDraft, MemoFilter, MemoId, MemoPatch, MemoSnapshot, MemoStatus, DEPARTMENTS,
};
pub use user::{Privilege, Role, User, UserRecord};
