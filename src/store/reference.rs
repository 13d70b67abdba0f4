//! Read-only reference-database access (`spec.md` §3 `SpeciesReference`,
//! §9 "Reference-database attach at query time").
//!
//! The reference DB (taxonomy + translations, maintained independently of
//! the detection store) is attached read-only for the lifetime of a single
//! borrowed connection rather than joined through a second pool, matching
//! the preference `spec.md` §9 states directly: "prefer the attach
//! approach because the reference DB is updated independently."

use std::path::Path;

use sqlx::{Row, SqlitePool};

use crate::types::SpeciesReference;

use super::StoreError;

pub struct ReferenceStore<'a> {
    pool: &'a SqlitePool,
    reference_db_path: String,
}

impl<'a> ReferenceStore<'a> {
    pub fn new(pool: &'a SqlitePool, reference_db_path: &Path) -> Self {
        Self {
            pool,
            reference_db_path: reference_db_path.display().to_string(),
        }
    }

    async fn attached_conn(
        &self,
    ) -> Result<sqlx::pool::PoolConnection<sqlx::Sqlite>, StoreError> {
        let mut conn = self.pool.acquire().await?;
        sqlx::query(&format!(
            "ATTACH DATABASE '{}' AS ioc",
            self.reference_db_path.replace('\'', "''")
        ))
        .execute(&mut *conn)
        .await?;
        Ok(conn)
    }

    /// Looks up taxonomy plus the localized common name for `scientific_name`,
    /// falling back to the reference DB's English name when no translation
    /// exists for `language_code`.
    pub async fn lookup(
        &self,
        scientific_name: &str,
        language_code: &str,
    ) -> Result<Option<(SpeciesReference, String)>, StoreError> {
        let mut conn = self.attached_conn().await?;

        let row = sqlx::query(
            "SELECT r.scientific_name, r.english_name, r.\"order\", r.family, r.genus, \
                    r.species_epithet, r.authority, \
                    COALESCE(t.common_name, r.english_name) AS display_name \
             FROM ioc.species_reference r \
             LEFT JOIN ioc.translations t \
               ON t.scientific_name = r.scientific_name AND t.language_code = ? \
             WHERE r.scientific_name = ?",
        )
        .bind(language_code)
        .bind(scientific_name)
        .fetch_optional(&mut *conn)
        .await?;

        Ok(row.map(|r| {
            let reference = SpeciesReference {
                scientific_name: r.get("scientific_name"),
                english_name: r.get("english_name"),
                order: r.get("order"),
                family: r.get("family"),
                genus: r.get("genus"),
                species_epithet: r.get("species_epithet"),
                authority: r.get("authority"),
            };
            let display_name: String = r.get("display_name");
            (reference, display_name)
        }))
    }

    /// Distinct families present among detected species, via the
    /// cross-database JOIN used by `GET /api/detections/taxonomy/families`.
    pub async fn families_with_detections(&self) -> Result<Vec<String>, StoreError> {
        let mut conn = self.attached_conn().await?;

        let rows = sqlx::query(
            "SELECT DISTINCT r.family FROM ioc.species_reference r \
             INNER JOIN detections d ON d.scientific_name = r.scientific_name \
             ORDER BY r.family",
        )
        .fetch_all(&mut *conn)
        .await?;

        Ok(rows.into_iter().map(|r| r.get("family")).collect())
    }
}
