//! Share-link codes.

use rand::Rng;
use rusqlite::{params, ErrorCode, OptionalExtension};

use super::{StoreError, WorkspaceStore};
use crate::model::{Access, ShareLink};

/// Length of a generated share code.
pub const SHARE_CODE_LEN: usize = 6;

/// Insert attempts before giving up on a colliding code.
pub const SHARE_CODE_ATTEMPTS: usize = 5;

const CODE_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";

/// Random alphanumeric code of `len` characters.
pub fn generate_code(len: usize) -> String {
    let mut rng = rand::rng();
    (0..len)
        .map(|_| CODE_ALPHABET[rng.random_range(0..CODE_ALPHABET.len())] as char)
        .collect()
}

impl WorkspaceStore {
    /// Create a share link for an existing workspace and return its code.
    pub fn create_share_link(&self, workspace_id: &str, access: Access) -> Result<String, StoreError> {
        self.create_share_link_with(workspace_id, access, || generate_code(SHARE_CODE_LEN))
    }

    /// Same as [`create_share_link`](Self::create_share_link) with a caller-supplied code source.
    pub fn create_share_link_with(
        &self,
        workspace_id: &str,
        access: Access,
        mut next_code: impl FnMut() -> String,
    ) -> Result<String, StoreError> {
        for _ in 0..SHARE_CODE_ATTEMPTS {
            let code = next_code();
            let inserted = self.write(|tx| {
                tx.execute(
                    "INSERT INTO share_link (code, workspace_id, access) VALUES (?1, ?2, ?3)",
                    params![code, workspace_id, access.as_str()],
                )?;
                Ok(())
            });
            match inserted {
                Ok(()) => return Ok(code),
                Err(StoreError::Database(e)) if is_code_collision(&e) => {
                    log::debug!("Share code {code} already taken, retrying");
                }
                Err(e) => return Err(e),
            }
        }
        Err(StoreError::ShareCodeExhausted {
            attempts: SHARE_CODE_ATTEMPTS,
        })
    }

    /// Look up a share code. `None` when the code is unknown.
    pub fn resolve_share_link(&self, code: &str) -> Result<Option<ShareLink>, StoreError> {
        let row = self.read(|conn| {
            let row = conn
                .query_row(
                    "SELECT workspace_id, access FROM share_link WHERE code = ?1",
                    [code],
                    |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)),
                )
                .optional()?;
            Ok(row)
        })?;

        row.map(|(workspace_id, access)| {
            let access = Access::parse(&access).ok_or(StoreError::UnknownAccess(access))?;
            Ok(ShareLink {
                code: code.to_string(),
                workspace_id,
                access,
            })
        })
        .transpose()
    }
}

fn is_code_collision(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if e.code == ErrorCode::ConstraintViolation
                && e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY
    )
}
