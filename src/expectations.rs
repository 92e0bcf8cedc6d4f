//! Reference values the verifiers check before and after the migration.
//!
//! Defaults describe the Poweradmin 4.0.x → 4.1.0 upgrade. Every field can
//! be overridden from the `[expectations]` table of `migverify.toml`.

use serde::Deserialize;

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct Expectations {
    /// Tables the migration creates
    pub new_tables: Vec<String>,
    /// Existing table that gains a column
    pub new_column_table: String,
    pub new_column: String,
    /// Value backfilled into the new column for pre-existing rows
    pub new_column_default: String,

    pub perm_items_before: i64,
    pub perm_items_after: i64,
    pub new_permissions: Vec<String>,

    pub perm_templ_before: i64,
    pub perm_templ_after: i64,
    pub new_templates: Vec<String>,

    pub indexes: Vec<String>,

    /// Administrator template → `user_is_ueberuser` mapping that must survive
    pub admin_templ_id: i64,
    pub admin_perm_id: i64,
}

impl Default for Expectations {
    fn default() -> Self {
        Self {
            new_tables: strings(&["oidc_user_links", "saml_user_links", "user_agreements"]),
            new_column_table: "users".to_string(),
            new_column: "auth_method".to_string(),
            new_column_default: "sql".to_string(),
            perm_items_before: 24,
            perm_items_after: 27,
            new_permissions: strings(&["zone_delete_own", "zone_delete_others", "user_enforce_mfa"]),
            perm_templ_before: 1,
            perm_templ_after: 5,
            new_templates: strings(&["Zone Manager", "Client Editor", "Read Only", "No Access"]),
            indexes: strings(&[
                "idx_users_auth_method",
                "idx_oidc_user_links_user_id",
                "idx_saml_user_links_user_id",
                "idx_user_agreements_user_id",
            ]),
            admin_templ_id: 1,
            admin_perm_id: 53,
        }
    }
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}
