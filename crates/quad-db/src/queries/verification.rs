use anyhow::Result;

use super::OptionalExt;
use crate::Database;

impl Database {
    /// Store a verification code for (student_id, purpose), replacing any
    /// earlier one. The code expires after `ttl_minutes`.
    pub fn store_verification_code(
        &self,
        student_id: &str,
        email: &str,
        purpose: &str,
        code: &str,
        ttl_minutes: u32,
    ) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT OR REPLACE INTO verification_codes
                    (code, student_id, email, purpose, expires_at)
                 VALUES (?1, ?2, ?3, ?4, datetime('now', '+' || ?5 || ' minutes'))",
                rusqlite::params![code, student_id, email, purpose, ttl_minutes],
            )?;
            Ok(())
        })
    }

    /// Consume a code: valid and unexpired codes are deleted and return the
    /// bound email; anything else (wrong code, expired, absent) is None.
    /// Expired rows are swept on the way through.
    pub fn consume_verification_code(
        &self,
        student_id: &str,
        purpose: &str,
        code: &str,
    ) -> Result<Option<String>> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            tx.execute(
                "DELETE FROM verification_codes WHERE expires_at <= datetime('now')",
                [],
            )?;

            let email: Option<String> = tx
                .query_row(
                    "SELECT email FROM verification_codes
                     WHERE student_id = ?1 AND purpose = ?2 AND code = ?3",
                    [student_id, purpose, code],
                    |row| row.get(0),
                )
                .optional()?;

            if email.is_some() {
                tx.execute(
                    "DELETE FROM verification_codes WHERE student_id = ?1 AND purpose = ?2",
                    [student_id, purpose],
                )?;
            }

            tx.commit()?;
            Ok(email)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_util::test_db;

    #[test]
    fn code_is_single_use() {
        let db = test_db();
        db.store_verification_code("s100", "s100@campus.edu", "registration", "482913", 15)
            .unwrap();

        let email = db
            .consume_verification_code("s100", "registration", "482913")
            .unwrap();
        assert_eq!(email.as_deref(), Some("s100@campus.edu"));

        // Second consume fails: the code was deleted
        assert!(db
            .consume_verification_code("s100", "registration", "482913")
            .unwrap()
            .is_none());
    }

    #[test]
    fn wrong_code_rejected() {
        let db = test_db();
        db.store_verification_code("s200", "s200@campus.edu", "registration", "111111", 15)
            .unwrap();

        assert!(db
            .consume_verification_code("s200", "registration", "999999")
            .unwrap()
            .is_none());
        // The right code still works afterwards
        assert!(db
            .consume_verification_code("s200", "registration", "111111")
            .unwrap()
            .is_some());
    }

    #[test]
    fn expired_code_rejected() {
        let db = test_db();
        db.store_verification_code("s300", "s300@campus.edu", "registration", "222222", 0)
            .unwrap();

        assert!(db
            .consume_verification_code("s300", "registration", "222222")
            .unwrap()
            .is_none());
    }

    #[test]
    fn purposes_do_not_cross() {
        let db = test_db();
        db.store_verification_code("s400", "s400@campus.edu", "password_reset", "333333", 15)
            .unwrap();

        assert!(db
            .consume_verification_code("s400", "registration", "333333")
            .unwrap()
            .is_none());
    }
}
