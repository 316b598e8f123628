//! Per-user rewrite rules: aliases, language mappings and project labels.

use rusqlite::params;

use ct_core::{Alias, EntityType, LanguageMapping, ProjectLabel, UserId};

use crate::{Database, DbError, parse_entity_type, parse_user_id};

impl Database {
    /// Stores an alias and returns its id. Re-adding an existing alias
    /// returns the existing id.
    pub fn insert_alias(
        &self,
        user_id: &UserId,
        entity_type: EntityType,
        key: &str,
        value: &str,
    ) -> Result<i64, DbError> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT OR IGNORE INTO aliases (user_id, type, key, value) VALUES (?, ?, ?, ?)",
            params![user_id.as_str(), entity_type.code(), key, value],
        )?;
        Ok(conn.query_row(
            "SELECT id FROM aliases WHERE user_id = ? AND type = ? AND key = ? AND value = ?",
            params![user_id.as_str(), entity_type.code(), key, value],
            |row| row.get(0),
        )?)
    }

    pub fn list_aliases(&self, user_id: &UserId) -> Result<Vec<Alias>, DbError> {
        let raw = {
            let conn = self.conn()?;
            let mut stmt = conn.prepare(
                "SELECT id, user_id, type, key, value FROM aliases \
                 WHERE user_id = ? ORDER BY type, key, value",
            )?;
            let rows = stmt.query_map([user_id.as_str()], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, u8>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                ))
            })?;
            rows.collect::<Result<Vec<_>, _>>()?
        };
        raw.into_iter()
            .map(|(id, user_id, code, key, value)| {
                Ok(Alias {
                    id,
                    user_id: parse_user_id(user_id, "aliases")?,
                    entity_type: parse_entity_type(code, "aliases")?,
                    key,
                    value,
                })
            })
            .collect()
    }

    /// Deletes one of a user's aliases. Returns `false` if it did not exist.
    pub fn delete_alias(&self, user_id: &UserId, id: i64) -> Result<bool, DbError> {
        let conn = self.conn()?;
        Ok(conn.execute(
            "DELETE FROM aliases WHERE user_id = ? AND id = ?",
            params![user_id.as_str(), id],
        )? > 0)
    }

    /// Sets the language for an extension, replacing an earlier mapping.
    pub fn upsert_language_mapping(
        &self,
        user_id: &UserId,
        extension: &str,
        language: &str,
    ) -> Result<i64, DbError> {
        let conn = self.conn()?;
        conn.execute(
            "
            INSERT INTO language_mappings (user_id, extension, language) VALUES (?, ?, ?)
            ON CONFLICT (user_id, extension) DO UPDATE SET language = excluded.language
            ",
            params![user_id.as_str(), extension, language],
        )?;
        Ok(conn.query_row(
            "SELECT id FROM language_mappings WHERE user_id = ? AND extension = ?",
            params![user_id.as_str(), extension],
            |row| row.get(0),
        )?)
    }

    pub fn list_language_mappings(
        &self,
        user_id: &UserId,
    ) -> Result<Vec<LanguageMapping>, DbError> {
        let raw = {
            let conn = self.conn()?;
            let mut stmt = conn.prepare(
                "SELECT id, user_id, extension, language FROM language_mappings \
                 WHERE user_id = ? ORDER BY extension",
            )?;
            let rows = stmt.query_map([user_id.as_str()], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                ))
            })?;
            rows.collect::<Result<Vec<_>, _>>()?
        };
        raw.into_iter()
            .map(|(id, user_id, extension, language)| {
                Ok(LanguageMapping {
                    id,
                    user_id: parse_user_id(user_id, "language_mappings")?,
                    extension,
                    language,
                })
            })
            .collect()
    }

    pub fn delete_language_mapping(&self, user_id: &UserId, id: i64) -> Result<bool, DbError> {
        let conn = self.conn()?;
        Ok(conn.execute(
            "DELETE FROM language_mappings WHERE user_id = ? AND id = ?",
            params![user_id.as_str(), id],
        )? > 0)
    }

    pub fn insert_project_label(
        &self,
        user_id: &UserId,
        project_key: &str,
        label: &str,
    ) -> Result<i64, DbError> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT OR IGNORE INTO project_labels (user_id, project_key, label) VALUES (?, ?, ?)",
            params![user_id.as_str(), project_key, label],
        )?;
        Ok(conn.query_row(
            "SELECT id FROM project_labels WHERE user_id = ? AND project_key = ? AND label = ?",
            params![user_id.as_str(), project_key, label],
            |row| row.get(0),
        )?)
    }

    pub fn list_project_labels(&self, user_id: &UserId) -> Result<Vec<ProjectLabel>, DbError> {
        let raw = {
            let conn = self.conn()?;
            let mut stmt = conn.prepare(
                "SELECT id, user_id, project_key, label FROM project_labels \
                 WHERE user_id = ? ORDER BY label, project_key",
            )?;
            let rows = stmt.query_map([user_id.as_str()], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                ))
            })?;
            rows.collect::<Result<Vec<_>, _>>()?
        };
        raw.into_iter()
            .map(|(id, user_id, project_key, label)| {
                Ok(ProjectLabel {
                    id,
                    user_id: parse_user_id(user_id, "project_labels")?,
                    project_key,
                    label,
                })
            })
            .collect()
    }

    pub fn delete_project_label(&self, user_id: &UserId, id: i64) -> Result<bool, DbError> {
        let conn = self.conn()?;
        Ok(conn.execute(
            "DELETE FROM project_labels WHERE user_id = ? AND id = ?",
            params![user_id.as_str(), id],
        )? > 0)
    }
}

#[cfg(test)]
mod tests {
    use chrono::DateTime;
    use ct_core::User;

    use super::*;

    fn setup() -> (Database, UserId) {
        let db = Database::open_in_memory().unwrap();
        let user_id = UserId::new("alice").unwrap();
        db.insert_user(&User::new(user_id.clone(), DateTime::UNIX_EPOCH)).unwrap();
        (db, user_id)
    }

    #[test]
    fn aliases_are_unique_per_value() {
        let (db, user_id) = setup();
        let insert = || db.insert_alias(&user_id, EntityType::Project, "wakapi", "wakapi-mobile");
        let first = insert().unwrap();
        let again = insert().unwrap();
        assert_eq!(first, again);

        let aliases = db.list_aliases(&user_id).unwrap();
        assert_eq!(aliases.len(), 1);
        assert_eq!(aliases[0].entity_type, EntityType::Project);
        assert_eq!(aliases[0].value, "wakapi-mobile");

        assert!(db.delete_alias(&user_id, first).unwrap());
        assert!(!db.delete_alias(&user_id, first).unwrap());
    }

    #[test]
    fn language_mapping_upsert_replaces() {
        let (db, user_id) = setup();
        let id = db.upsert_language_mapping(&user_id, "tpl", "HTML").unwrap();
        let same = db.upsert_language_mapping(&user_id, "tpl", "Go Template").unwrap();
        assert_eq!(id, same);
        let mappings = db.list_language_mappings(&user_id).unwrap();
        assert_eq!(mappings.len(), 1);
        assert_eq!(mappings[0].language, "Go Template");
        assert!(db.delete_language_mapping(&user_id, id).unwrap());
    }

    #[test]
    fn project_labels_many_to_many() {
        let (db, user_id) = setup();
        db.insert_project_label(&user_id, "ct", "work").unwrap();
        db.insert_project_label(&user_id, "ct", "oss").unwrap();
        let id = db.insert_project_label(&user_id, "blog", "work").unwrap();

        let labels = db.list_project_labels(&user_id).unwrap();
        let pairs: Vec<(&str, &str)> = labels
            .iter()
            .map(|l| (l.label.as_str(), l.project_key.as_str()))
            .collect();
        assert_eq!(pairs, vec![("oss", "ct"), ("work", "blog"), ("work", "ct")]);
        assert!(db.delete_project_label(&user_id, id).unwrap());
    }
}
