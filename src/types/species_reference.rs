//! Read-only reference/taxonomy types (`spec.md` §3 `SpeciesReference`).
//!
//! Values here are never written by this crate; they describe rows read
//! out of the attached reference database (see `store::reference`).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SpeciesReference {
    pub scientific_name: String,
    pub english_name: String,
    pub order: String,
    pub family: String,
    pub genus: String,
    pub species_epithet: String,
    pub authority: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SpeciesTranslation {
    pub scientific_name: String,
    pub language_code: String,
    pub common_name: String,
}
